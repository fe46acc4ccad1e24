use burn::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::head::KeypointLayers;
use super::inference::keypoint_rcnn_inference;
use super::loss::{KeypointLoss, SkippedBatchCounter};
use crate::error::HeadResult;
use crate::structures::Instances;
use crate::training::{EventStorage, HeadConfig};

pub const KEYPOINT_LOSS_KEY: &str = "loss_keypoint";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadMode {
    Training,
    Inference,
}

#[derive(Debug)]
pub enum HeadOutput<B: Backend> {
    Losses(BTreeMap<String, Tensor<B, 1>>),
    Instances(Vec<Instances>),
}

/// Keypoint R-CNN head: runs the layers, then either the loss (training) or
/// the heatmap decoding (inference).
#[derive(Debug)]
pub struct KeypointRcnnHead<L> {
    layers: L,
    loss: KeypointLoss,
}

impl<L> KeypointRcnnHead<L> {
    pub fn new(layers: L, config: &HeadConfig) -> Self {
        Self {
            layers,
            loss: KeypointLoss::new(config),
        }
    }

    pub fn with_storage(mut self, storage: Arc<dyn EventStorage>) -> Self {
        self.loss = self.loss.with_storage(storage);
        self
    }

    pub fn with_counter(mut self, skipped: Arc<SkippedBatchCounter>) -> Self {
        self.loss = self.loss.with_counter(skipped);
        self
    }

    pub fn layers(&self) -> &L {
        &self.layers
    }

    /// Swap in updated layers, e.g. after an optimizer step.
    pub fn set_layers(&mut self, layers: L) {
        self.layers = layers;
    }

    pub fn into_layers(self) -> L {
        self.layers
    }

    pub fn loss(&self) -> &KeypointLoss {
        &self.loss
    }

    pub fn skipped_batches(&self) -> u64 {
        self.loss.skipped_batches().get()
    }

    pub fn forward<B: Backend>(
        &self,
        x: Tensor<B, 4>,
        instances: Vec<Instances>,
        mode: HeadMode,
    ) -> HeadResult<HeadOutput<B>>
    where
        L: KeypointLayers<B>,
    {
        match mode {
            HeadMode::Training => self.losses(x, &instances).map(HeadOutput::Losses),
            HeadMode::Inference => self.predict(x, instances).map(HeadOutput::Instances),
        }
    }

    pub fn losses<B: Backend>(
        &self,
        x: Tensor<B, 4>,
        instances: &[Instances],
    ) -> HeadResult<BTreeMap<String, Tensor<B, 1>>>
    where
        L: KeypointLayers<B>,
    {
        let logits = self.layers.layers(x)?;
        let loss = self.loss.compute(logits, instances, None)?;

        let mut losses = BTreeMap::new();
        losses.insert(KEYPOINT_LOSS_KEY.to_string(), loss);
        Ok(losses)
    }

    pub fn predict<B: Backend>(
        &self,
        x: Tensor<B, 4>,
        mut instances: Vec<Instances>,
    ) -> HeadResult<Vec<Instances>>
    where
        L: KeypointLayers<B>,
    {
        let logits = self.layers.layers(x)?;
        keypoint_rcnn_inference(logits, &mut instances)?;
        Ok(instances)
    }
}
