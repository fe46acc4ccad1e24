use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{HeadError, HeadResult};
use crate::model::registry::HeadKind;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HeadConfig {
    // Variant
    pub name: HeadKind,

    // Architecture
    pub num_keypoints: usize,
    pub conv_dims: Vec<usize>,
    pub attention_kernel_size: usize,
    pub up_scale: usize,
    pub pooler_resolution: usize,
    pub in_channels: usize,

    // Loss
    pub loss_weight: f32,
    pub normalize_by_visible_keypoints: bool,
    pub batch_size_per_image: usize,
    pub positive_fraction: f32,
}

impl Default for HeadConfig {
    fn default() -> Self {
        Self {
            name: HeadKind::ConvDeconvUpsample,
            num_keypoints: 17,
            conv_dims: vec![512; 8],
            attention_kernel_size: 3,
            up_scale: 2,
            pooler_resolution: 14,
            in_channels: 256,
            loss_weight: 1.0,
            normalize_by_visible_keypoints: true,
            batch_size_per_image: 512,
            positive_fraction: 0.25,
        }
    }
}

impl HeadConfig {
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> HeadResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| HeadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: HeadConfig = serde_yaml::from_str(&content).map_err(|source| HeadError::Yaml {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> HeadResult<()> {
        let path = path.as_ref();
        let yaml = serde_yaml::to_string(self).map_err(|source| HeadError::Yaml {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, yaml).map_err(|source| HeadError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> HeadResult<()> {
        if !matches!(self.attention_kernel_size, 3 | 7) {
            return Err(HeadError::InvalidKernelSize(self.attention_kernel_size));
        }
        if self.num_keypoints == 0 {
            return Err(HeadError::InvalidConfig("num_keypoints must be positive".into()));
        }
        if self.in_channels == 0 || self.pooler_resolution == 0 {
            return Err(HeadError::InvalidConfig(
                "in_channels and pooler_resolution must be positive".into(),
            ));
        }
        if self.conv_dims.contains(&0) {
            return Err(HeadError::InvalidConfig(format!(
                "conv_dims entries must be positive, got {:?}",
                self.conv_dims
            )));
        }
        if self.up_scale == 0 {
            return Err(HeadError::InvalidConfig("up_scale must be positive".into()));
        }
        if self.batch_size_per_image == 0 {
            return Err(HeadError::InvalidConfig(
                "batch_size_per_image must be positive".into(),
            ));
        }
        if !(self.positive_fraction > 0.0 && self.positive_fraction <= 1.0) {
            return Err(HeadError::InvalidConfig(format!(
                "positive_fraction must be in (0, 1], got {}",
                self.positive_fraction
            )));
        }
        Ok(())
    }

    /// Expected foreground keypoints per image, used as the fixed loss
    /// normalizer when not normalizing by visible keypoints.
    pub fn normalizer_per_image(&self) -> f32 {
        self.num_keypoints as f32 * self.batch_size_per_image as f32 * self.positive_fraction
    }

    /// Side length of the output heatmaps: pooled resolution, doubled by the
    /// deconvolution, then scaled by the bilinear upsample.
    pub fn heatmap_side_len(&self) -> usize {
        self.pooler_resolution * 2 * self.up_scale
    }
}
