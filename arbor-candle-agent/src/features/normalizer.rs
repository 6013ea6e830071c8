//! Running statistics of observations.
use anyhow::{anyhow, Result};
use candle_core::Tensor;
use serde::{Deserialize, Serialize};

/// Per-dimension running mean and variance, updated with Welford's algorithm.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RunningNorm {
    count: u64,
    mean: Vec<f64>,
    m2: Vec<f64>,
    frozen: bool,
}

impl RunningNorm {
    const EPS: f64 = 1e-8;

    /// Creates empty statistics of `dim`-dimensional observations.
    pub fn new(dim: usize) -> Self {
        Self {
            count: 0,
            mean: vec![0.0; dim],
            m2: vec![0.0; dim],
            frozen: false,
        }
    }

    /// Adds an observation to the statistics, unless they are frozen.
    pub fn observe(&mut self, obs: &[f32]) -> Result<()> {
        if self.frozen {
            return Ok(());
        }
        if obs.len() != self.mean.len() {
            return Err(anyhow!(
                "observation of length {} given to a normalizer of dimension {}",
                obs.len(),
                self.mean.len()
            ));
        }

        self.count += 1;
        let n = self.count as f64;
        for ((x, mean), m2) in obs.iter().zip(self.mean.iter_mut()).zip(self.m2.iter_mut()) {
            let x = *x as f64;
            let delta = x - *mean;
            *mean += delta / n;
            *m2 += delta * (x - *mean);
        }
        Ok(())
    }

    /// Stops updating the statistics.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    /// Returns `true` when the statistics are frozen.
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Number of observations seen.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Running mean.
    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    /// Running population variance.
    pub fn var(&self) -> Vec<f64> {
        match self.count {
            0 => vec![1.0; self.m2.len()],
            n => self.m2.iter().map(|m2| m2 / n as f64).collect(),
        }
    }

    /// Standardizes a `[batch, dim]` tensor. Identity before the first observation.
    pub fn normalize(&self, xs: &Tensor) -> Result<Tensor> {
        if self.count == 0 {
            return Ok(xs.clone());
        }
        let dim = self.mean.len();
        let mean = self.mean.iter().map(|&m| m as f32).collect::<Vec<_>>();
        let std = self
            .var()
            .iter()
            .map(|&v| (v.sqrt() + Self::EPS) as f32)
            .collect::<Vec<_>>();
        let mean = Tensor::from_vec(mean, (1, dim), xs.device())?;
        let std = Tensor::from_vec(std, (1, dim), xs.device())?;
        Ok(xs.broadcast_sub(&mean)?.broadcast_div(&std)?)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use candle_core::Device;

    #[test]
    fn test_running_statistics() -> Result<()> {
        let mut norm = RunningNorm::new(2);
        for obs in [[1f32, 10.0], [2.0, 20.0], [3.0, 30.0], [4.0, 40.0]].iter() {
            norm.observe(obs)?;
        }
        assert_eq!(norm.count(), 4);
        assert!((norm.mean()[0] - 2.5).abs() < 1e-12);
        assert!((norm.mean()[1] - 25.0).abs() < 1e-12);
        assert!((norm.var()[0] - 1.25).abs() < 1e-12);
        assert!((norm.var()[1] - 125.0).abs() < 1e-9);

        let xs = Tensor::from_slice(&[2.5f32, 25.0], (1, 2), &Device::Cpu)?;
        let ys = norm.normalize(&xs)?.to_vec2::<f32>()?;
        assert!(ys[0][0].abs() < 1e-6 && ys[0][1].abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn test_frozen_statistics_do_not_move() -> Result<()> {
        let mut norm = RunningNorm::new(1);
        norm.observe(&[1.0])?;
        norm.freeze();
        norm.observe(&[100.0])?;
        assert_eq!(norm.count(), 1);
        assert_eq!(norm.mean(), &[1.0]);
        assert!(norm.observe(&[1.0, 2.0]).is_ok());
        Ok(())
    }
}
