use burn::prelude::*;
use burn::tensor::activation::log_softmax;
use burn::tensor::TensorData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{HeadError, HeadResult};
use crate::structures::{HeatmapTargets, Instances};
use crate::training::{EventStorage, HeadConfig, LogEventStorage};

pub const SKIPPED_BATCHES_SCALAR: &str = "kpts_num_skipped_batches";

/// Counts training batches that had no valid keypoint at all.
#[derive(Debug, Default)]
pub struct SkippedBatchCounter {
    count: AtomicU64,
}

impl SkippedBatchCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the count after the increment.
    pub fn increment(&self) -> u64 {
        self.count.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn get(&self) -> u64 {
        self.count.load(Ordering::SeqCst)
    }
}

/// How the summed cross-entropy is scaled before the loss weight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LossNormalizer {
    /// Divide by the number of valid keypoints in the batch.
    VisibleKeypoints,
    /// Divide by `per_image * num_images`, independent of visibility.
    PerImage(f32),
}

/// Per-keypoint spatial cross-entropy over heatmap logits.
pub struct KeypointLoss {
    loss_weight: f32,
    normalizer: LossNormalizer,
    skipped: Arc<SkippedBatchCounter>,
    storage: Arc<dyn EventStorage>,
}

impl std::fmt::Debug for KeypointLoss {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeypointLoss")
            .field("loss_weight", &self.loss_weight)
            .field("normalizer", &self.normalizer)
            .field("skipped", &self.skipped.get())
            .finish()
    }
}

impl KeypointLoss {
    pub fn new(config: &HeadConfig) -> Self {
        let normalizer = if config.normalize_by_visible_keypoints {
            LossNormalizer::VisibleKeypoints
        } else {
            LossNormalizer::PerImage(config.normalizer_per_image())
        };

        Self {
            loss_weight: config.loss_weight,
            normalizer,
            skipped: Arc::new(SkippedBatchCounter::new()),
            storage: Arc::new(LogEventStorage),
        }
    }

    pub fn with_storage(mut self, storage: Arc<dyn EventStorage>) -> Self {
        self.storage = storage;
        self
    }

    pub fn with_counter(mut self, skipped: Arc<SkippedBatchCounter>) -> Self {
        self.skipped = skipped;
        self
    }

    pub fn skipped_batches(&self) -> Arc<SkippedBatchCounter> {
        Arc::clone(&self.skipped)
    }

    pub fn normalizer(&self) -> LossNormalizer {
        self.normalizer
    }

    /// Weighted keypoint loss for `(R, K, S, S)` logits against the
    /// ground truth of `instances`, whose flattened order must match R.
    ///
    /// `normalizer` overrides the configured policy when given.
    pub fn compute<B: Backend>(
        &self,
        logits: Tensor<B, 4>,
        instances: &[Instances],
        normalizer: Option<f32>,
    ) -> HeadResult<Tensor<B, 1>> {
        let [n, k, h, w] = logits.dims();
        let device = logits.device();

        let mut targets = HeatmapTargets::default();
        let mut encoded_images = 0;
        for (image, instances_per_image) in instances.iter().enumerate() {
            if instances_per_image.is_empty() {
                continue;
            }
            let rois = instances_per_image.require_proposal_boxes(image)?;
            let keypoints = instances_per_image.require_gt_keypoints(image)?;
            if keypoints.len() != rois.len() || keypoints.num_keypoints() != k {
                return Err(HeadError::Data(format!(
                    "image {}: {} boxes, {} keypoint sets of {} for {} heatmap channels",
                    image,
                    rois.len(),
                    keypoints.len(),
                    keypoints.num_keypoints(),
                    k
                )));
            }
            let per_image = keypoints.to_heatmap(rois.as_slice(), h);
            targets.bins.extend(per_image.bins);
            targets.valid.extend(per_image.valid);
            encoded_images += 1;
        }

        if encoded_images > 0 && targets.len() != n * k {
            return Err(HeadError::Data(format!(
                "keypoint loss: {} targets for {} regions x {} keypoints",
                targets.len(),
                n,
                k
            )));
        }

        let valid: Vec<i64> = targets
            .valid
            .iter()
            .enumerate()
            .filter_map(|(idx, &v)| v.then_some(idx as i64))
            .collect();

        if encoded_images == 0 || valid.is_empty() {
            let total = self.skipped.increment();
            log::warn!("keypoint loss: no valid keypoints in batch, skipped {} so far", total);
            self.storage.put_scalar(SKIPPED_BATCHES_SCALAR, total as f64, false);
            return Ok(logits.sum() * 0.0);
        }

        let num_valid = valid.len();
        let valid_idx = Tensor::<B, 1, Int>::from_data(TensorData::new(valid, [num_valid]), &device);
        let bins = Tensor::<B, 1, Int>::from_data(
            TensorData::new(targets.bins, [n * k]),
            &device,
        );
        let bins = bins.select(0, valid_idx.clone()).reshape([num_valid, 1]);

        let rows = logits.reshape([n * k, h * w]).select(0, valid_idx);
        let log_probs = log_softmax(rows, 1);
        let keypoint_loss = log_probs.gather(1, bins).sum().neg();

        let normalizer = normalizer.unwrap_or(match self.normalizer {
            LossNormalizer::VisibleKeypoints => num_valid as f32,
            LossNormalizer::PerImage(per_image) => per_image * instances.len() as f32,
        });
        log::debug!(
            "keypoint loss: {} valid of {} rows, normalizer {}",
            num_valid,
            n * k,
            normalizer
        );

        Ok(keypoint_loss / normalizer * self.loss_weight)
    }
}
