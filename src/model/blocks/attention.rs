use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::PaddingConfig2d;
use burn::prelude::*;
use burn::tensor::activation::sigmoid;

use super::conv::msra_fill;
use crate::error::{HeadError, HeadResult};

/// Channel-wise max with an explicit empty-batch branch: a batch of zero
/// regions yields an empty `(0, 1, H, W)` map instead of reducing over
/// nothing.
pub fn channel_max<B: Backend>(x: Tensor<B, 4>) -> Tensor<B, 4> {
    let [r, _, h, w] = x.dims();
    if r == 0 {
        return Tensor::zeros([0, 1, h, w], &x.device());
    }
    x.max_dim(1)
}

/// Spatial attention gate: a per-pixel sigmoid mask computed from the
/// channel-wise mean and max, multiplied back onto the input.
#[derive(Module, Debug)]
pub struct SpatialAttention<B: Backend> {
    conv: Conv2d<B>,
}

impl<B: Backend> SpatialAttention<B> {
    pub fn new(device: &B::Device, kernel_size: usize) -> HeadResult<Self> {
        let padding = match kernel_size {
            3 => 1,
            7 => 3,
            other => return Err(HeadError::InvalidKernelSize(other)),
        };

        let conv = Conv2dConfig::new([2, 1], [kernel_size, kernel_size])
            .with_padding(PaddingConfig2d::Explicit(padding, padding))
            .with_bias(false)
            .with_initializer(msra_fill(1, kernel_size))
            .init(device);

        Ok(Self { conv })
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let [r, _, _, _] = x.dims();
        if r == 0 {
            return x;
        }

        let avg_out = x.clone().mean_dim(1);
        let max_out = channel_max(x.clone());
        let scale = Tensor::cat(vec![avg_out, max_out], 1);
        let gate = sigmoid(self.conv.forward(scale));

        x * gate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type TestBackend = NdArray;

    #[test]
    fn test_rejects_unsupported_kernel() {
        let device = Default::default();
        let result = SpatialAttention::<TestBackend>::new(&device, 5);
        assert!(matches!(result, Err(HeadError::InvalidKernelSize(5))));
    }

    #[test]
    fn test_gate_preserves_shape_and_attenuates() {
        let device = Default::default();
        for kernel in [3, 7] {
            let gate = SpatialAttention::<TestBackend>::new(&device, kernel).unwrap();
            let x = Tensor::<TestBackend, 4>::random([2, 8, 14, 14], Distribution::Uniform(0.0, 1.0), &device);
            let y = gate.forward(x.clone());
            assert_eq!(y.dims(), [2, 8, 14, 14]);

            // Non-negative input, gate in (0, 1): output never exceeds input.
            let excess = (y - x).max().into_scalar().elem::<f32>();
            assert!(excess <= 0.0);
        }
    }

    #[test]
    fn test_empty_batch_passes_through() {
        let device = Default::default();
        let gate = SpatialAttention::<TestBackend>::new(&device, 3).unwrap();
        let x = Tensor::<TestBackend, 4>::zeros([0, 8, 14, 14], &device);
        assert_eq!(gate.forward(x).dims(), [0, 8, 14, 14]);
    }

    #[test]
    fn test_channel_max_empty_batch() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 4>::zeros([0, 4, 6, 6], &device);
        assert_eq!(channel_max(x).dims(), [0, 1, 6, 6]);
    }

    #[test]
    fn test_channel_max_values() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 4>::from_floats([[[[1.0, 5.0]], [[3.0, 2.0]]]], &device);
        let m = channel_max(x);
        assert_eq!(m.dims(), [1, 1, 1, 2]);
        assert_eq!(m.into_data().to_vec::<f32>().unwrap(), vec![3.0, 5.0]);
    }
}
