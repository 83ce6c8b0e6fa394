use crate::init::{RELU_GAIN, normalized_columns, scaled_uniform};
use anyhow::{Result, bail, ensure};
use candle_core::{DType, Device, Module, Tensor};
use candle_nn::{
    Conv2d, Conv2dConfig, Init, LSTM, LSTMConfig, Linear, RNN, VarBuilder, VarMap, lstm,
    rnn::LSTMState,
};
use derive_more::Deref;
use serde::{Deserialize, Serialize};
use tracing::debug;

// (in_channels, out_channels, kernel, padding) of the four conv stages, all with stride 1
const CONV_STAGES: [(usize, usize, usize, usize); 4] =
    [(3, 32, 5, 2), (32, 32, 5, 1), (32, 64, 4, 1), (64, 64, 3, 1)];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// `[height, width]` of the input frames.
    pub frame_size: [usize; 2],
    pub hidden_state_size: usize,
    pub action_space: usize,
    /// Length of the auxiliary vector (the episode's seen flags). `None` disables the pathway.
    pub aux_state_size: Option<usize>,
    pub aux_hidden_size: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            frame_size: [84, 84],
            hidden_state_size: 512,
            action_space: 7,
            aux_state_size: None,
            aux_hidden_size: 64,
        }
    }
}

/// Length of the flattened conv features for frames of the given size.
pub fn embedding_size(height: usize, width: usize) -> Result<usize> {
    let (mut h, mut w) = (height, width);
    let mut channels = 0;
    for (_, out_channels, kernel, padding) in CONV_STAGES {
        ensure!(
            h + 2 * padding >= kernel && w + 2 * padding >= kernel,
            "frames of {height}x{width} are too small for the conv stack"
        );
        h = (h + 2 * padding - kernel + 1) / 2;
        w = (w + 2 * padding - kernel + 1) / 2;
        channels = out_channels;
    }
    ensure!(
        h > 0 && w > 0,
        "frames of {height}x{width} vanish in the conv stack"
    );
    Ok(channels * h * w)
}

/// The recurrent memory carried between steps. Both tensors are `(batch, hidden_state_size)`.
#[derive(Debug, Clone)]
pub struct RecurrentMemory {
    pub hx: Tensor,
    pub cx: Tensor,
}

impl RecurrentMemory {
    pub fn zeros(batch: usize, hidden_state_size: usize, device: &Device) -> Result<Self> {
        let hx = Tensor::zeros((batch, hidden_state_size), DType::F32, device)?;
        let cx = hx.zeros_like()?;
        Ok(Self { hx, cx })
    }
}

#[derive(Debug, Clone)]
pub struct ModelInput {
    /// `(batch, 3, height, width)`, or a single `(3, height, width)` frame.
    pub state: Tensor,
    pub memory: RecurrentMemory,
    /// `(batch, aux_state_size)`, required iff the auxiliary pathway is enabled.
    pub aux: Option<Tensor>,
}

/// Unnormalized action scores, `(batch, action_space)`.
#[derive(Deref, Debug, Clone)]
pub struct PolicyLogits(pub Tensor);

/// `(batch, 1)`.
#[derive(Deref, Debug, Clone)]
pub struct ValueEstimate(pub Tensor);

#[derive(Debug, Clone)]
pub struct ModelOutput {
    pub policy: PolicyLogits,
    pub value: ValueEstimate,
    pub memory: RecurrentMemory,
}

fn conv_stage(
    in_channels: usize,
    out_channels: usize,
    kernel: usize,
    padding: usize,
    vb: VarBuilder,
) -> Result<Conv2d> {
    let init = scaled_uniform(
        in_channels * kernel * kernel,
        out_channels * kernel * kernel,
        RELU_GAIN,
    );
    let weight = vb.get_with_hints((out_channels, in_channels, kernel, kernel), "weight", init)?;
    let bias = vb.get_with_hints(out_channels, "bias", Init::Const(0.))?;
    let config = Conv2dConfig {
        padding,
        stride: 1,
        ..Default::default()
    };
    Ok(Conv2d::new(weight, Some(bias), config))
}

fn linear_layer(in_dim: usize, out_dim: usize, init: Init, vb: VarBuilder) -> Result<Linear> {
    let weight = vb.get_with_hints((out_dim, in_dim), "weight", init)?;
    let bias = vb.get_with_hints(out_dim, "bias", Init::Const(0.))?;
    Ok(Linear::new(weight, Some(bias)))
}

/// Folds the auxiliary vector into the visual features before the recurrent step.
#[derive(Debug, Clone)]
struct AuxPathway {
    state_size: usize,
    encode: Linear,
    combine: Linear,
}

impl AuxPathway {
    fn forward(&self, features: &Tensor, aux: Option<&Tensor>) -> Result<Tensor> {
        let Some(aux) = aux else {
            bail!("the model expects an auxiliary input of size {}", self.state_size);
        };
        let aux = if aux.rank() == 1 {
            aux.unsqueeze(0)?
        } else {
            aux.clone()
        };
        ensure!(
            aux.dims() == [features.dim(0)?, self.state_size],
            "auxiliary input has shape {:?}, expected ({}, {})",
            aux.dims(),
            features.dim(0)?,
            self.state_size
        );
        let encoded = self.encode.forward(&aux)?.relu()?;
        let joined = Tensor::cat(&[features, &encoded], 1)?;
        Ok(self.combine.forward(&joined)?.relu()?)
    }
}

/// Conv encoder, LSTM core and actor/critic heads. Holds no per-episode state: the recurrent
/// memory is always passed in and handed back.
#[derive(Debug, Clone)]
pub struct PolicyValueNet {
    config: ModelConfig,
    convs: Vec<Conv2d>,
    aux: Option<AuxPathway>,
    lstm: LSTM,
    actor_linear: Linear,
    critic_linear: Linear,
}

impl PolicyValueNet {
    /// Builds a freshly initialized network whose variables live in `varmap`.
    pub fn new(config: ModelConfig, varmap: &mut VarMap, device: &Device) -> Result<Self> {
        let vb = VarBuilder::from_varmap(varmap, DType::F32, device);
        let net = Self::build(config, vb)?;
        let hidden = net.config.hidden_state_size;
        // near-uniform action preference, unit-scale value
        let actor = normalized_columns(net.config.action_space, hidden, 0.01, device)?;
        varmap.set_one("actor_linear.weight", &actor)?;
        let critic = normalized_columns(1, hidden, 1.0, device)?;
        varmap.set_one("critic_linear.weight", &critic)?;
        Ok(net)
    }

    /// Builds the layers from `vb`. Variables missing from `vb` get the default initialization,
    /// except for the heads' normalized rows which only [`PolicyValueNet::new`] applies.
    pub fn build(config: ModelConfig, vb: VarBuilder) -> Result<Self> {
        let [height, width] = config.frame_size;
        let embedding = embedding_size(height, width)?;
        let hidden = config.hidden_state_size;

        let convs = CONV_STAGES
            .iter()
            .enumerate()
            .map(|(idx, (in_c, out_c, kernel, padding))| {
                conv_stage(*in_c, *out_c, *kernel, *padding, vb.pp(format!("conv{}", idx + 1)))
            })
            .collect::<Result<Vec<_>>>()?;

        let aux = match config.aux_state_size {
            Some(state_size) => {
                let aux_hidden = config.aux_hidden_size;
                let encode = linear_layer(
                    state_size,
                    aux_hidden,
                    scaled_uniform(state_size, aux_hidden, 1.),
                    vb.pp("aux_linear"),
                )?;
                let combine = linear_layer(
                    embedding + aux_hidden,
                    embedding,
                    scaled_uniform(embedding + aux_hidden, embedding, 1.),
                    vb.pp("aux_combination"),
                )?;
                Some(AuxPathway {
                    state_size,
                    encode,
                    combine,
                })
            }
            None => None,
        };

        let bound = 1. / (hidden as f64).sqrt();
        let lstm_config = LSTMConfig {
            w_ih_init: Init::Uniform {
                lo: -bound,
                up: bound,
            },
            w_hh_init: Init::Uniform {
                lo: -bound,
                up: bound,
            },
            b_ih_init: Some(Init::Const(0.)),
            b_hh_init: Some(Init::Const(0.)),
            ..LSTMConfig::default()
        };
        let lstm = lstm(embedding, hidden, lstm_config, vb.pp("lstm"))?;

        let actor_linear = linear_layer(
            hidden,
            config.action_space,
            Init::Randn {
                mean: 0.,
                stdev: 1.,
            },
            vb.pp("actor_linear"),
        )?;
        let critic_linear = linear_layer(
            hidden,
            1,
            Init::Randn {
                mean: 0.,
                stdev: 1.,
            },
            vb.pp("critic_linear"),
        )?;
        debug!(embedding, hidden, actions = config.action_space, "built policy/value net");
        Ok(Self {
            config,
            convs,
            aux,
            lstm,
            actor_linear,
            critic_linear,
        })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Four (conv, max-pool, relu) stages flattened to `(batch, embedding_size)`.
    pub fn embedding(&self, state: &Tensor) -> Result<Tensor> {
        let mut xs = state.clone();
        for conv in self.convs.iter() {
            xs = conv.forward(&xs)?.max_pool2d(2)?.relu()?;
        }
        Ok(xs.flatten_from(1)?)
    }

    pub fn forward(&self, input: &ModelInput) -> Result<ModelOutput> {
        let [height, width] = self.config.frame_size;
        let state = match input.state.rank() {
            3 => input.state.unsqueeze(0)?,
            4 => input.state.clone(),
            rank => bail!("expected a (batch, 3, h, w) frame tensor, got rank {rank}"),
        };
        let (batch, channels, h, w) = state.dims4()?;
        ensure!(
            channels == 3 && h == height && w == width,
            "frame has shape {:?}, expected (_, 3, {height}, {width})",
            state.dims()
        );
        let hidden = self.config.hidden_state_size;
        for memory in [&input.memory.hx, &input.memory.cx] {
            ensure!(
                memory.dims() == [batch, hidden],
                "recurrent memory has shape {:?}, expected ({batch}, {hidden})",
                memory.dims()
            );
        }

        let mut xs = self.embedding(&state)?;
        match &self.aux {
            Some(aux) => xs = aux.forward(&xs, input.aux.as_ref())?,
            None if input.aux.is_some() => bail!("the model has no auxiliary pathway"),
            None => {}
        }
        let previous = LSTMState::new(input.memory.hx.clone(), input.memory.cx.clone());
        let next = self.lstm.step(&xs, &previous)?;
        let policy = self.actor_linear.forward(next.h())?;
        let value = self.critic_linear.forward(next.h())?;
        Ok(ModelOutput {
            policy: PolicyLogits(policy),
            value: ValueEstimate(value),
            memory: RecurrentMemory {
                hx: next.h().clone(),
                cx: next.c().clone(),
            },
        })
    }
}
