use anyhow::{Result, ensure};
use candle_core::{DType, Device, Tensor};

/// Converts a row-major RGB frame into a `(3, height, width)` f32 tensor with values in `[0, 1]`,
/// nearest-neighbour resized to `target`.
pub fn frame_to_tensor(
    bytes: &[u8],
    height: usize,
    width: usize,
    target: [usize; 2],
) -> Result<Tensor> {
    ensure!(
        bytes.len() == height * width * 3,
        "frame of {height}x{width} needs {} bytes, got {}",
        height * width * 3,
        bytes.len()
    );
    let frame = Tensor::from_slice(bytes, (height, width, 3), &Device::Cpu)?
        .permute((2, 0, 1))?
        .to_dtype(DType::F32)?
        .affine(1. / 255., 0.)?
        .contiguous()?;
    let [target_height, target_width] = target;
    if target_height == height && target_width == width {
        return Ok(frame);
    }
    Ok(frame
        .unsqueeze(0)?
        .upsample_nearest2d(target_height, target_width)?
        .squeeze(0)?)
}
