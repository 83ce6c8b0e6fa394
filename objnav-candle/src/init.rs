use anyhow::Result;
use candle_core::{Device, Tensor};
use candle_nn::Init;

/// Gain of a rectified-linear activation.
pub const RELU_GAIN: f64 = std::f64::consts::SQRT_2;

/// Uniform init over `±gain * sqrt(6 / (fan_in + fan_out))`.
pub fn scaled_uniform(fan_in: usize, fan_out: usize, gain: f64) -> Init {
    let bound = gain * (6. / (fan_in + fan_out) as f64).sqrt();
    Init::Uniform {
        lo: -bound,
        up: bound,
    }
}

/// A `(rows, cols)` gaussian matrix whose rows are rescaled to norm `std`.
pub fn normalized_columns(rows: usize, cols: usize, std: f64, device: &Device) -> Result<Tensor> {
    let x = Tensor::randn(0f32, 1f32, (rows, cols), device)?;
    let norm = x.sqr()?.sum_keepdim(1)?.sqrt()?;
    Ok(x.broadcast_div(&norm)?.affine(std, 0.)?)
}
