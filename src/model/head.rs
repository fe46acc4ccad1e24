use burn::nn::conv::ConvTranspose2d;
use burn::prelude::*;

use crate::error::{HeadError, HeadResult};
use crate::model::blocks::{score_lowres, BilinearUpsample2d, ConvRelu, SpatialAttention};
use crate::training::HeadConfig;

/// Maps pooled region features `(R, C, H, W)` to keypoint heatmap logits
/// `(R, K, S, S)`.
pub trait KeypointLayers<B: Backend> {
    fn layers(&self, _x: Tensor<B, 4>) -> HeadResult<Tensor<B, 4>> {
        Err(HeadError::LayersNotImplemented(std::any::type_name::<Self>()))
    }

    fn num_keypoints(&self) -> usize;
}

/// Attention gate, a stack of 3x3 convs, a stride-2 transposed conv to K
/// channels, then a fixed bilinear upsample.
#[derive(Module, Debug)]
pub struct ConvDeconvUpsampleHead<B: Backend> {
    spatial_att: SpatialAttention<B>,
    blocks: Vec<ConvRelu<B>>,
    score_lowres: ConvTranspose2d<B>,
    upsample: BilinearUpsample2d,
    num_keypoints: usize,
}

impl<B: Backend> ConvDeconvUpsampleHead<B> {
    pub fn new(device: &B::Device, config: &HeadConfig, in_channels: usize) -> HeadResult<Self> {
        config.validate()?;

        let spatial_att = SpatialAttention::new(device, config.attention_kernel_size)?;

        let mut blocks = Vec::with_capacity(config.conv_dims.len());
        let mut channels = in_channels;
        for &layer_channels in &config.conv_dims {
            blocks.push(ConvRelu::new(device, channels, layer_channels));
            channels = layer_channels;
        }

        log::info!("ConvDeconvUpsampleHead init:");
        log::info!("  in_channels = {}", in_channels);
        log::info!("  conv_dims = {:?}", config.conv_dims);
        log::info!("  num_keypoints = {}", config.num_keypoints);
        log::info!("  attention kernel = {}", config.attention_kernel_size);

        Ok(Self {
            spatial_att,
            blocks,
            score_lowres: score_lowres(device, channels, config.num_keypoints),
            upsample: BilinearUpsample2d::new(config.up_scale),
            num_keypoints: config.num_keypoints,
        })
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let [r, _, h, w] = x.dims();
        if r == 0 {
            let scale = 2 * self.upsample.scale_factor();
            return Tensor::zeros([0, self.num_keypoints, h * scale, w * scale], &x.device());
        }

        let mut x = self.spatial_att.forward(x);
        for block in &self.blocks {
            x = block.forward(x);
        }
        let x = self.score_lowres.forward(x);
        log::debug!("  score_lowres: {:?}", x.dims());

        let x = self.upsample.forward(x);
        log::debug!("  heatmap logits: {:?}", x.dims());
        x
    }
}

impl<B: Backend> KeypointLayers<B> for ConvDeconvUpsampleHead<B> {
    fn layers(&self, x: Tensor<B, 4>) -> HeadResult<Tensor<B, 4>> {
        Ok(self.forward(x))
    }

    fn num_keypoints(&self) -> usize {
        self.num_keypoints
    }
}
