use crate::{
    categorical::{greedy_action, sample_action},
    model::{ModelInput, PolicyValueNet, RecurrentMemory},
};
use anyhow::Result;
use candle_core::{Device, Tensor};
use objnav_core::rollout::{PolicyStep, RecurrentPolicy};
use rand::rngs::StdRng;

/// Drives episodes with a [`PolicyValueNet`], one frame at a time.
pub struct ModelPolicy {
    net: PolicyValueNet,
    device: Device,
    greedy: bool,
}

impl ModelPolicy {
    pub fn new(net: PolicyValueNet, device: Device) -> Self {
        Self {
            net,
            device,
            greedy: false,
        }
    }

    /// Always take the most likely action instead of sampling.
    pub fn greedy(mut self) -> Self {
        self.greedy = true;
        self
    }

    pub fn net(&self) -> &PolicyValueNet {
        &self.net
    }
}

impl RecurrentPolicy for ModelPolicy {
    type Memory = RecurrentMemory;

    fn initial_memory(&self) -> Result<RecurrentMemory> {
        RecurrentMemory::zeros(1, self.net.config().hidden_state_size, &self.device)
    }

    fn act(
        &self,
        frame: &Tensor,
        seen: &[f32],
        memory: &RecurrentMemory,
        rng: &mut StdRng,
    ) -> Result<PolicyStep<RecurrentMemory>> {
        let aux = match self.net.config().aux_state_size {
            Some(_) => Some(Tensor::from_slice(seen, (1, seen.len()), &self.device)?),
            None => None,
        };
        let input = ModelInput {
            state: frame.to_device(&self.device)?,
            memory: memory.clone(),
            aux,
        };
        let output = self.net.forward(&input)?;
        let (action, log_prob) = if self.greedy {
            greedy_action(&output.policy)?
        } else {
            sample_action(&output.policy, rng)?
        };
        let value = output.value.squeeze(1)?.get(0)?.to_scalar::<f32>()?;
        Ok(PolicyStep {
            action,
            value,
            log_prob,
            memory: output.memory,
        })
    }
}
