use burn::module::Param;
use burn::nn::conv::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig};
use burn::nn::{Initializer, PaddingConfig2d};
use burn::prelude::*;
use burn::tensor::activation;

/// MSRA fill: zero-mean normal tuned for ReLU, scaled by the fan-out of the
/// weight tensor as stored (`dim0 * kh * kw`).
pub fn msra_fill(dim0: usize, kernel_size: usize) -> Initializer {
    let fan_out = (dim0 * kernel_size * kernel_size) as f64;
    Initializer::Normal {
        mean: 0.0,
        std: (2.0 / fan_out).sqrt(),
    }
}

/// Same-resolution 3x3 convolution followed by ReLU.
#[derive(Module, Debug)]
pub struct ConvRelu<B: Backend> {
    conv: Conv2d<B>,
}

impl<B: Backend> ConvRelu<B> {
    pub fn new(device: &B::Device, in_channels: usize, out_channels: usize) -> Self {
        let mut conv = Conv2dConfig::new([in_channels, out_channels], [3, 3])
            .with_stride([1, 1])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .with_initializer(msra_fill(out_channels, 3))
            .init(device);
        conv.bias = Some(Param::from_tensor(Tensor::zeros([out_channels], device)));

        Self { conv }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        activation::relu(self.conv.forward(x))
    }
}

/// Stride-2 transposed convolution (kernel 4, padding 1): doubles spatial
/// resolution while mapping to `out_channels`.
pub fn score_lowres<B: Backend>(
    device: &B::Device,
    in_channels: usize,
    out_channels: usize,
) -> ConvTranspose2d<B> {
    let kernel = 4;
    let mut deconv = ConvTranspose2dConfig::new([in_channels, out_channels], [kernel, kernel])
        .with_stride([2, 2])
        .with_padding([kernel / 2 - 1, kernel / 2 - 1])
        .with_initializer(msra_fill(in_channels, kernel))
        .init(device);
    deconv.bias = Some(Param::from_tensor(Tensor::zeros([out_channels], device)));
    deconv
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type TestBackend = NdArray;

    #[test]
    fn test_conv_relu_keeps_resolution() {
        let device = Default::default();
        let block = ConvRelu::<TestBackend>::new(&device, 4, 6);
        let x = Tensor::<TestBackend, 4>::random([2, 4, 7, 7], Distribution::Default, &device);
        let y = block.forward(x);
        assert_eq!(y.dims(), [2, 6, 7, 7]);
        let min = y.min().into_scalar().elem::<f32>();
        assert!(min >= 0.0);
    }

    #[test]
    fn test_score_lowres_doubles_resolution() {
        let device = Default::default();
        let deconv = score_lowres::<TestBackend>(&device, 6, 3);
        let x = Tensor::<TestBackend, 4>::random([1, 6, 5, 5], Distribution::Default, &device);
        assert_eq!(deconv.forward(x).dims(), [1, 3, 10, 10]);
    }

    #[test]
    fn test_biases_start_at_zero() {
        let device = Default::default();
        let block = ConvRelu::<TestBackend>::new(&device, 2, 3);
        let bias = block.conv.bias.as_ref().map(|b| b.val()).unwrap();
        assert_eq!(bias.abs().sum().into_scalar().elem::<f32>(), 0.0);
    }

    #[test]
    fn test_score_lowres_bias_is_zero_and_weight_is_in_out_kk() {
        let device = Default::default();
        let deconv = score_lowres::<TestBackend>(&device, 6, 3);
        assert_eq!(deconv.weight.val().dims(), [6, 3, 4, 4]);
        let bias = deconv.bias.as_ref().map(|b| b.val()).unwrap();
        assert_eq!(bias.dims(), [3]);
        assert_eq!(bias.abs().sum().into_scalar().elem::<f32>(), 0.0);
    }

    #[test]
    fn test_msra_fill_scales_by_dim0_fan_out() {
        match msra_fill(6, 4) {
            Initializer::Normal { mean, std } => {
                assert_eq!(mean, 0.0);
                assert!((std - (2.0f64 / 96.0).sqrt()).abs() < 1e-12);
            }
            other => panic!("unexpected initializer {other:?}"),
        }
    }
}
