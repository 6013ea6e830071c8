//! Utilities.
use anyhow::{anyhow, Result};
use candle_core::{DType, Device, Tensor, D};
use candle_nn::VarMap;
use log::trace;
use serde::{Deserialize, Serialize};

/// Per-row regression loss of critics.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone, Copy)]
pub enum CriticLoss {
    /// Squared error.
    Mse,

    /// Smoothed L1 (Huber with threshold 1).
    SmoothL1,
}

impl CriticLoss {
    /// Elementwise loss, without reduction.
    pub fn elementwise(&self, x: &Tensor, y: &Tensor) -> Result<Tensor> {
        match self {
            Self::Mse => Ok(x.sub(y)?.sqr()?),
            Self::SmoothL1 => smooth_l1(x, y),
        }
    }
}

/// Elementwise smoothed L1 loss: `0.5 d^2` for `|d| < 1`, `|d| - 0.5` otherwise.
pub fn smooth_l1(x: &Tensor, y: &Tensor) -> Result<Tensor> {
    let d = x.sub(y)?.abs()?;
    let m = d.lt(1.0)?.to_dtype(d.dtype())?;
    let quad = d.sqr()?.affine(0.5, 0.0)?;
    let lin = d.affine(1.0, -0.5)?;
    Ok(quad.mul(&m)?.add(&lin.mul(&m.affine(-1.0, 1.0)?)?)?)
}

/// Mean of a per-row loss, each row scaled by its importance weight if given.
pub fn weighted_mean(loss: &Tensor, weights: Option<&Tensor>) -> Result<Tensor> {
    match weights {
        Some(w) => Ok(loss.broadcast_mul(w)?.mean_all()?),
        None => Ok(loss.mean_all()?),
    }
}

/// Blends the variables of `src` into `dest`: `dest = tau * src + (1 - tau) * dest`.
pub fn track(dest: &VarMap, src: &VarMap, tau: f64) -> Result<()> {
    trace!("track with tau = {}", tau);
    let dest = dest.data().lock().map_err(|_| anyhow!("poisoned varmap"))?;
    let src = src.data().lock().map_err(|_| anyhow!("poisoned varmap"))?;

    for (k, v_dest) in dest.iter() {
        let v_src = src
            .get(k)
            .ok_or_else(|| anyhow!("variable {} is missing in the source network", k))?;
        let t_dest = v_src
            .as_tensor()
            .affine(tau, 0.0)?
            .add(&v_dest.as_tensor().affine(1.0 - tau, 0.0)?)?;
        v_dest.set(&t_dest)?;
    }
    Ok(())
}

/// Copies the variables of `src` into `dest` exactly.
pub fn hard_copy(dest: &VarMap, src: &VarMap) -> Result<()> {
    let dest = dest.data().lock().map_err(|_| anyhow!("poisoned varmap"))?;
    let src = src.data().lock().map_err(|_| anyhow!("poisoned varmap"))?;

    for (k, v_dest) in dest.iter() {
        let v_src = src
            .get(k)
            .ok_or_else(|| anyhow!("variable {} is missing in the source network", k))?;
        v_dest.set(v_src.as_tensor())?;
    }
    Ok(())
}

/// 1-dimensional `u32` index tensor.
pub fn index_tensor(ixs: &[usize], device: &Device) -> Result<Tensor> {
    let n = ixs.len();
    let ixs = ixs.iter().map(|&ix| ix as u32).collect::<Vec<_>>();
    Ok(Tensor::from_vec(ixs, (n,), device)?)
}

/// Column of `u32` indices, shaped `[n, 1]`, for [`Tensor::gather`].
pub fn index_column(ixs: &[u32], device: &Device) -> Result<Tensor> {
    Ok(Tensor::from_vec(ixs.to_vec(), (ixs.len(), 1), device)?)
}

/// Per-row index of the largest value of a 2-dimensional tensor.
pub fn argmax_rows(t: &Tensor) -> Result<Vec<u32>> {
    Ok(t.argmax(D::Minus1)?.to_vec1::<u32>()?)
}

/// One-hot rows of width `n`.
pub fn one_hot(ixs: &[u32], n: usize, device: &Device) -> Result<Tensor> {
    let mut v = vec![0f32; ixs.len() * n];
    for (row, &ix) in ixs.iter().enumerate() {
        let ix = ix as usize;
        if ix >= n {
            return Err(anyhow!("index {} out of range for one-hot width {}", ix, n));
        }
        v[row * n + ix] = 1.0;
    }
    Ok(Tensor::from_vec(v, (ixs.len(), n), device)?)
}

/// Column vector `[n, 1]` of `f32` values.
pub fn column(v: Vec<f32>, device: &Device) -> Result<Tensor> {
    let n = v.len();
    Ok(Tensor::from_vec(v, (n, 1), device)?)
}

/// Flattens a `[n, 1]` tensor into a vector.
pub fn column_to_vec(t: &Tensor) -> Result<Vec<f32>> {
    Ok(t.flatten_all()?.to_dtype(DType::F32)?.to_vec1::<f32>()?)
}

#[cfg(test)]
mod test {
    use super::*;
    use candle_nn::Init;

    fn varmap_with(values: &[f32]) -> Result<VarMap> {
        let vm = VarMap::new();
        let init = Init::Randn {
            mean: 0.0,
            stdev: 1.0,
        };
        vm.get((values.len(),), "w", init, DType::F32, &Device::Cpu)?;
        let t = Tensor::from_slice(values, (values.len(),), &Device::Cpu)?;
        vm.data().lock().unwrap().get("w").unwrap().set(&t)?;
        Ok(vm)
    }

    fn values(vm: &VarMap) -> Vec<f32> {
        vm.data().lock().unwrap()["w"]
            .as_tensor()
            .to_vec1::<f32>()
            .unwrap()
    }

    #[test]
    fn test_track() -> Result<()> {
        let tau = 0.7;
        let src = varmap_with(&[1.0, 2.0, 3.0])?;
        let dest = varmap_with(&[4.0, 5.0, 6.0])?;
        track(&dest, &src, tau)?;

        let expected = [0.7 * 1.0 + 0.3 * 4.0, 0.7 * 2.0 + 0.3 * 5.0, 0.7 * 3.0 + 0.3 * 6.0];
        for (v, e) in values(&dest).iter().zip(expected.iter()) {
            assert!((v - e).abs() < 1e-5);
        }
        Ok(())
    }

    #[test]
    fn test_hard_copy_is_exact() -> Result<()> {
        let src = varmap_with(&[0.1, -2.3e-7, 1e8])?;
        let dest = varmap_with(&[4.0, 5.0, 6.0])?;
        hard_copy(&dest, &src)?;
        assert_eq!(values(&dest), values(&src));
        Ok(())
    }

    #[test]
    fn test_smooth_l1() -> Result<()> {
        let x = Tensor::from_slice(&[0.0f32, 0.5, 3.0, -2.0], (4, 1), &Device::Cpu)?;
        let y = Tensor::zeros((4, 1), DType::F32, &Device::Cpu)?;
        let l = column_to_vec(&smooth_l1(&x, &y)?)?;
        assert_eq!(l, vec![0.0, 0.125, 2.5, 1.5]);
        Ok(())
    }

    #[test]
    fn test_weighted_mean() -> Result<()> {
        let loss = Tensor::from_slice(&[1f32, 2.0, 3.0, 6.0], (4, 1), &Device::Cpu)?;
        let w = Tensor::from_slice(&[1f32, 0.5, 0.0, 1.0], (4, 1), &Device::Cpu)?;
        assert_eq!(weighted_mean(&loss, None)?.to_scalar::<f32>()?, 3.0);
        assert_eq!(weighted_mean(&loss, Some(&w))?.to_scalar::<f32>()?, 2.0);
        Ok(())
    }

    #[test]
    fn test_one_hot() -> Result<()> {
        let t = one_hot(&[2, 0], 3, &Device::Cpu)?;
        assert_eq!(t.to_vec2::<f32>()?, vec![vec![0.0, 0.0, 1.0], vec![1.0, 0.0, 0.0]]);
        assert!(one_hot(&[3], 3, &Device::Cpu).is_err());
        assert_eq!(argmax_rows(&t)?, vec![2, 0]);
        Ok(())
    }
}
