use burn::module::AutodiffModule;
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::{Adam, AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::record::{BinFileRecorder, FullPrecisionSettings, Recorder};
use burn::tensor::backend::AutodiffBackend;
use std::path::{Path, PathBuf};

use crate::error::{HeadError, HeadResult};
use crate::model::{build_keypoint_head, KeypointHeadNet, KeypointRcnnHead, ShapeSpec};
use crate::structures::Instances;
use crate::training::HeadConfig;

pub struct Trainer<B: AutodiffBackend> {
    head: KeypointRcnnHead<KeypointHeadNet<B>>,
    optimizer: OptimizerAdaptor<Adam, KeypointHeadNet<B>, B>,
    config: HeadConfig,
    learning_rate: f64,
    steps: usize,
}

impl<B: AutodiffBackend> Trainer<B> {
    pub fn new(config: HeadConfig, learning_rate: f64, device: &B::Device) -> HeadResult<Self> {
        let head = build_keypoint_head::<B>(&config, ShapeSpec::from_config(&config), device)?;
        let optimizer = AdamConfig::new().init::<B, KeypointHeadNet<B>>();

        Ok(Self {
            head,
            optimizer,
            config,
            learning_rate,
            steps: 0,
        })
    }

    /// Use an already configured head (custom metrics sink or counter).
    pub fn with_head(mut self, head: KeypointRcnnHead<KeypointHeadNet<B>>) -> Self {
        self.head = head;
        self
    }

    pub fn head(&self) -> &KeypointRcnnHead<KeypointHeadNet<B>> {
        &self.head
    }

    pub fn config(&self) -> &HeadConfig {
        &self.config
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    /// One optimization step on a batch of pooled features and the matching
    /// per-image training instances. Returns the loss value.
    pub fn train_step(&mut self, features: Tensor<B, 4>, instances: &[Instances]) -> HeadResult<f32> {
        let no_regions = features.dims()[0] == 0;
        let losses = self.head.losses(features, instances)?;
        if no_regions {
            // Empty-batch logits are detached from the parameters.
            self.steps += 1;
            return Ok(0.0);
        }
        let loss = losses
            .into_values()
            .reduce(|acc, l| acc + l)
            .ok_or_else(|| HeadError::Data("head produced no losses".into()))?;

        let loss_value = loss.clone().into_scalar().elem::<f32>();

        let grads = loss.backward();
        let grads = GradientsParams::from_grads(grads, self.head.layers());
        let layers = self
            .optimizer
            .step(self.learning_rate, self.head.layers().clone(), grads);
        self.head.set_layers(layers);
        self.steps += 1;

        log::debug!("step {}: loss={:.4}", self.steps, loss_value);
        Ok(loss_value)
    }

    /// Inference copy of the head on the inner (non-autodiff) backend.
    pub fn inference_head(&self) -> KeypointRcnnHead<KeypointHeadNet<B::InnerBackend>> {
        KeypointRcnnHead::new(self.head.layers().valid(), &self.config)
    }

    /// Write `<dir>/<name>/model.bin`, `config.yaml` and `summary.json`.
    pub fn save_checkpoint<P: AsRef<Path>>(&self, dir: P, name: &str) -> HeadResult<PathBuf> {
        let checkpoint_dir = dir.as_ref().join(name);
        std::fs::create_dir_all(&checkpoint_dir).map_err(|source| HeadError::Io {
            path: checkpoint_dir.clone(),
            source,
        })?;

        let record = self.head.layers().clone().into_record();
        BinFileRecorder::<FullPrecisionSettings>::new()
            .record(record, checkpoint_dir.join("model"))
            .map_err(|e| HeadError::Checkpoint(format!("failed to save model: {e:?}")))?;

        self.config.save(checkpoint_dir.join("config.yaml"))?;

        let summary = serde_json::json!({
            "head": self.config.name.as_str(),
            "num_keypoints": self.config.num_keypoints,
            "heatmap_side_len": self.config.heatmap_side_len(),
            "steps": self.steps,
            "skipped_batches": self.head.skipped_batches(),
            "checkpoint_name": name,
        });
        let summary_path = checkpoint_dir.join("summary.json");
        let summary = serde_json::to_string_pretty(&summary)
            .map_err(|e| HeadError::Checkpoint(e.to_string()))?;
        std::fs::write(&summary_path, summary).map_err(|source| HeadError::Io {
            path: summary_path,
            source,
        })?;

        log::info!("checkpoint saved to {}", checkpoint_dir.display());
        Ok(checkpoint_dir)
    }
}

/// Load weights saved by [`Trainer::save_checkpoint`] into freshly built
/// layers. `path` is the checkpoint file without its extension.
pub fn load_checkpoint<B: Backend, P: AsRef<Path>>(
    layers: KeypointHeadNet<B>,
    path: P,
    device: &B::Device,
) -> HeadResult<KeypointHeadNet<B>> {
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    layers
        .load_file(path.as_ref().to_path_buf(), &recorder, device)
        .map_err(|e| {
            HeadError::Checkpoint(format!(
                "failed to load {}: {e:?}",
                path.as_ref().display()
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::KeypointLayers;
    use crate::structures::{Boxes, Keypoints};
    use burn::backend::{Autodiff, NdArray};
    use burn::tensor::Distribution;

    type TestBackend = Autodiff<NdArray>;

    fn config() -> HeadConfig {
        HeadConfig {
            num_keypoints: 3,
            conv_dims: vec![8],
            in_channels: 4,
            pooler_resolution: 4,
            ..Default::default()
        }
    }

    fn batch(visibility: f32) -> Vec<Instances> {
        vec![
            Instances::for_training(
                (32, 32),
                Boxes(vec![[0.0, 0.0, 16.0, 16.0]]),
                Keypoints::new(vec![vec![[3.0, 3.0, visibility], [8.0, 12.0, visibility], [15.0, 1.0, visibility]]]),
            ),
            Instances::for_training(
                (32, 32),
                Boxes(vec![[4.0, 4.0, 20.0, 24.0]]),
                Keypoints::new(vec![vec![[5.0, 6.0, visibility], [10.0, 10.0, visibility], [19.0, 23.0, visibility]]]),
            ),
        ]
    }

    #[test]
    fn test_train_steps_reduce_loss() {
        let device = Default::default();
        let mut trainer = Trainer::<TestBackend>::new(config(), 1e-2, &device).unwrap();
        let features = Tensor::<TestBackend, 4>::random([2, 4, 4, 4], Distribution::Default, &device);
        let instances = batch(2.0);

        let first = trainer.train_step(features.clone(), &instances).unwrap();
        let mut last = first;
        for _ in 0..20 {
            last = trainer.train_step(features.clone(), &instances).unwrap();
        }
        assert!(first.is_finite() && last.is_finite());
        assert!(last < first);
        assert_eq!(trainer.steps(), 21);
    }

    #[test]
    fn test_degenerate_batch_step_is_zero() {
        let device = Default::default();
        let mut trainer = Trainer::<TestBackend>::new(config(), 1e-3, &device).unwrap();
        let features = Tensor::<TestBackend, 4>::random([2, 4, 4, 4], Distribution::Default, &device);
        let loss = trainer.train_step(features, &batch(0.0)).unwrap();
        assert_eq!(loss, 0.0);
        assert_eq!(trainer.head().skipped_batches(), 1);
    }

    #[test]
    fn test_checkpoint_round_trip() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let mut trainer = Trainer::<TestBackend>::new(config(), 1e-3, &device).unwrap();
        let features = Tensor::<TestBackend, 4>::random([2, 4, 4, 4], Distribution::Default, &device);
        trainer.train_step(features, &batch(2.0)).unwrap();

        let saved = trainer.save_checkpoint(dir.path(), "latest").unwrap();
        assert!(saved.join("config.yaml").exists());
        assert!(saved.join("summary.json").exists());

        let inner_device = Default::default();
        let loaded_config = HeadConfig::from_yaml(saved.join("config.yaml")).unwrap();
        let fresh = build_keypoint_head::<NdArray>(&loaded_config, ShapeSpec::from_config(&loaded_config), &inner_device)
            .unwrap()
            .into_layers();
        let loaded = load_checkpoint(fresh, saved.join("model"), &inner_device).unwrap();

        let x = Tensor::<NdArray, 4>::random([1, 4, 4, 4], Distribution::Default, &inner_device);
        let expected = trainer.inference_head().layers().layers(x.clone()).unwrap();
        let actual = loaded.layers(x).unwrap();
        let diff = (expected - actual).abs().max().into_scalar().elem::<f32>();
        assert!(diff < 1e-5);
    }
}
