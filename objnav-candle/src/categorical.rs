use anyhow::{Result, ensure};
use candle_core::{D, Tensor};
use candle_nn::ops::{log_softmax, softmax};
use rand::Rng;
use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;

fn single_row(logits: &Tensor) -> Result<Tensor> {
    match logits.dims() {
        [_] => Ok(logits.clone()),
        [1, _] => Ok(logits.squeeze(0)?),
        dims => anyhow::bail!("expected logits for a single state, got shape {dims:?}"),
    }
}

/// Samples an action index from unnormalized scores and returns it with its log-probability.
pub fn sample_action<R: Rng + ?Sized>(logits: &Tensor, rng: &mut R) -> Result<(usize, f32)> {
    let logits = single_row(logits)?;
    let action_probs: Vec<f32> = softmax(&logits, 0)?.to_vec1()?;
    let log_probs: Vec<f32> = log_softmax(&logits, 0)?.to_vec1()?;
    let distribution = WeightedIndex::new(&action_probs)?;
    let action = distribution.sample(rng);
    Ok((action, log_probs[action]))
}

/// The highest-scoring action, for evaluation runs.
pub fn greedy_action(logits: &Tensor) -> Result<(usize, f32)> {
    let logits = single_row(logits)?;
    ensure!(logits.dim(0)? > 0, "empty logits");
    let action = logits.argmax(D::Minus1)?.to_scalar::<u32>()? as usize;
    let log_probs: Vec<f32> = log_softmax(&logits, 0)?.to_vec1()?;
    Ok((action, log_probs[action]))
}

#[cfg(test)]
mod test {
    use super::*;
    use candle_core::Device;
    use rand::{SeedableRng, rngs::StdRng};

    #[test]
    fn dominant_logit_is_always_sampled() -> Result<()> {
        let logits = Tensor::new(&[[0f32, 0., 100., 0.]], &Device::Cpu)?;
        let mut rng = StdRng::seed_from_u64(0);
        for _ in 0..50 {
            let (action, log_prob) = sample_action(&logits, &mut rng)?;
            assert_eq!(action, 2);
            assert!(log_prob.abs() < 1e-4);
        }
        Ok(())
    }

    #[test]
    fn uniform_logits_cover_every_action() -> Result<()> {
        let logits = Tensor::zeros(7, candle_core::DType::F32, &Device::Cpu)?;
        let mut rng = StdRng::seed_from_u64(3);
        let mut hits = [0usize; 7];
        for _ in 0..700 {
            let (action, log_prob) = sample_action(&logits, &mut rng)?;
            hits[action] += 1;
            assert!((log_prob + 7f32.ln()).abs() < 1e-5);
        }
        assert!(hits.iter().all(|h| *h > 0));
        Ok(())
    }

    #[test]
    fn batched_logits_are_rejected() -> Result<()> {
        let logits = Tensor::zeros((2, 7), candle_core::DType::F32, &Device::Cpu)?;
        assert!(sample_action(&logits, &mut StdRng::seed_from_u64(0)).is_err());
        Ok(())
    }

    #[test]
    fn greedy_picks_the_argmax() -> Result<()> {
        let logits = Tensor::new(&[0.1f32, 2., -1.], &Device::Cpu)?;
        assert_eq!(greedy_action(&logits)?.0, 1);
        Ok(())
    }
}
