//! Head variants, selected by tag at configuration time.

use burn::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::head::{ConvDeconvUpsampleHead, KeypointLayers};
use super::keypoint_head::KeypointRcnnHead;
use crate::error::{HeadError, HeadResult};
use crate::training::HeadConfig;

/// Shape of the pooled region features fed to the head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShapeSpec {
    pub channels: usize,
    pub height: usize,
    pub width: usize,
}

impl ShapeSpec {
    pub fn from_config(config: &HeadConfig) -> Self {
        Self {
            channels: config.in_channels,
            height: config.pooler_resolution,
            width: config.pooler_resolution,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeadKind {
    #[default]
    ConvDeconvUpsample,
}

impl HeadKind {
    pub const ALL: [HeadKind; 1] = [HeadKind::ConvDeconvUpsample];

    pub fn as_str(&self) -> &'static str {
        match self {
            HeadKind::ConvDeconvUpsample => "conv_deconv_upsample",
        }
    }

    pub fn constructor<B: Backend>(self) -> HeadConstructor<B> {
        match self {
            HeadKind::ConvDeconvUpsample => build_conv_deconv_upsample::<B>,
        }
    }
}

impl fmt::Display for HeadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HeadKind {
    type Err = HeadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HeadKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| HeadError::UnknownHead(s.to_string()))
    }
}

pub type HeadConstructor<B> =
    fn(&<B as Backend>::Device, &HeadConfig, ShapeSpec) -> HeadResult<KeypointHeadNet<B>>;

fn build_conv_deconv_upsample<B: Backend>(
    device: &B::Device,
    config: &HeadConfig,
    input_shape: ShapeSpec,
) -> HeadResult<KeypointHeadNet<B>> {
    ConvDeconvUpsampleHead::new(device, config, input_shape.channels)
        .map(KeypointHeadNet::ConvDeconvUpsample)
}

/// Every buildable head network.
#[derive(Module, Debug)]
pub enum KeypointHeadNet<B: Backend> {
    ConvDeconvUpsample(ConvDeconvUpsampleHead<B>),
}

impl<B: Backend> KeypointLayers<B> for KeypointHeadNet<B> {
    fn layers(&self, x: Tensor<B, 4>) -> HeadResult<Tensor<B, 4>> {
        match self {
            KeypointHeadNet::ConvDeconvUpsample(head) => head.layers(x),
        }
    }

    fn num_keypoints(&self) -> usize {
        match self {
            KeypointHeadNet::ConvDeconvUpsample(head) => head.num_keypoints(),
        }
    }
}

/// Build the head named by `config.name` for features of `input_shape`.
pub fn build_keypoint_head<B: Backend>(
    config: &HeadConfig,
    input_shape: ShapeSpec,
    device: &B::Device,
) -> HeadResult<KeypointRcnnHead<KeypointHeadNet<B>>> {
    log::info!("building keypoint head `{}` for {:?}", config.name, input_shape);
    let layers = (config.name.constructor::<B>())(device, config, input_shape)?;
    Ok(KeypointRcnnHead::new(layers, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_parse_known_and_unknown_names() {
        assert_eq!("conv_deconv_upsample".parse::<HeadKind>().unwrap(), HeadKind::ConvDeconvUpsample);
        assert!(matches!("fcn".parse::<HeadKind>(), Err(HeadError::UnknownHead(name)) if name == "fcn"));
    }

    #[test]
    fn test_build_from_config() {
        let device = Default::default();
        let config = HeadConfig {
            num_keypoints: 4,
            conv_dims: vec![8],
            in_channels: 6,
            pooler_resolution: 5,
            ..Default::default()
        };
        let head = build_keypoint_head::<TestBackend>(&config, ShapeSpec::from_config(&config), &device).unwrap();
        assert_eq!(head.layers().num_keypoints(), 4);

        let x = Tensor::<TestBackend, 4>::zeros([2, 6, 5, 5], &device);
        let logits = head.layers().layers(x).unwrap();
        assert_eq!(logits.dims(), [2, 4, config.heatmap_side_len(), config.heatmap_side_len()]);
    }

    #[test]
    fn test_build_rejects_bad_kernel() {
        let device = Default::default();
        let config = HeadConfig {
            attention_kernel_size: 9,
            ..Default::default()
        };
        let result = build_keypoint_head::<TestBackend>(&config, ShapeSpec::from_config(&config), &device);
        assert!(matches!(result, Err(HeadError::InvalidKernelSize(9))));
    }
}
