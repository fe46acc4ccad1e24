use burn::backend::{Autodiff, NdArray};
use burn::prelude::*;
use burn::tensor::Distribution;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use rand::Rng;
use std::path::Path;

use keypoint_rcnn_head::{Boxes, HeadConfig, Instances, Keypoints, Trainer};

type MyBackend = NdArray;
type MyAutodiffBackend = Autodiff<MyBackend>;

#[derive(Parser, Debug)]
#[command(author, version, about = "Train the keypoint head on synthetic region features")]
struct Args {
    /// Head config (created with defaults if missing)
    #[arg(short, long, default_value = "configs/keypoint_head.yaml")]
    config: String,

    /// Number of optimization steps
    #[arg(long, default_value_t = 100)]
    steps: usize,

    /// Images per batch
    #[arg(long, default_value_t = 2)]
    images: usize,

    /// Maximum instances per image (actual count is random, possibly zero)
    #[arg(long, default_value_t = 4)]
    max_instances: usize,

    /// Learning rate
    #[arg(long, default_value_t = 1e-3)]
    lr: f64,

    /// Checkpoint directory
    #[arg(long, default_value = "runs/keypoint_head")]
    save_dir: String,
}

/// Random pooled features plus per-image instances with boxes inside a
/// 256x256 image and keypoints scattered over (and slightly past) each box.
fn synthetic_batch<B: Backend, R: Rng>(
    rng: &mut R,
    config: &HeadConfig,
    images: usize,
    max_instances: usize,
    device: &B::Device,
) -> (Tensor<B, 4>, Vec<Instances>) {
    let mut instances = Vec::with_capacity(images);
    for _ in 0..images {
        let count = rng.gen_range(0..=max_instances);
        let mut boxes = Vec::with_capacity(count);
        let mut keypoints = Vec::with_capacity(count);
        for _ in 0..count {
            let x0 = rng.gen_range(0.0..160.0f32);
            let y0 = rng.gen_range(0.0..160.0f32);
            let w = rng.gen_range(16.0..96.0f32);
            let h = rng.gen_range(16.0..96.0f32);
            boxes.push([x0, y0, x0 + w, y0 + h]);

            let kps = (0..config.num_keypoints)
                .map(|_| {
                    let x = x0 + rng.gen_range(-0.1..1.1f32) * w;
                    let y = y0 + rng.gen_range(-0.1..1.1f32) * h;
                    let v = if rng.gen_bool(0.7) { 2.0 } else { 0.0 };
                    [x, y, v]
                })
                .collect();
            keypoints.push(kps);
        }
        instances.push(Instances::for_training((256, 256), Boxes(boxes), Keypoints::new(keypoints)));
    }

    let total: usize = instances.iter().map(Instances::len).sum();
    let side = config.pooler_resolution;
    let features = Tensor::<B, 4>::random(
        [total, config.in_channels, side, side],
        Distribution::Normal(0.0, 1.0),
        device,
    );
    (features, instances)
}

fn main() -> anyhow::Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args = Args::parse();

    let config = if Path::new(&args.config).exists() {
        log::info!("loading config from {}", args.config);
        HeadConfig::from_yaml(&args.config)?
    } else {
        let config = HeadConfig::default();
        if let Some(parent) = Path::new(&args.config).parent() {
            std::fs::create_dir_all(parent)?;
        }
        config.save(&args.config)?;
        log::info!("created default config at {}", args.config);
        config
    };

    log::info!("head: {}", config.name);
    log::info!("  conv_dims: {:?}", config.conv_dims);
    log::info!("  num_keypoints: {}", config.num_keypoints);
    log::info!("  heatmap: {0}x{0}", config.heatmap_side_len());
    log::info!("  normalize by visible keypoints: {}", config.normalize_by_visible_keypoints);

    let device = Default::default();
    let mut trainer = Trainer::<MyAutodiffBackend>::new(config.clone(), args.lr, &device)?;
    let mut rng = rand::thread_rng();

    let pb = ProgressBar::new(args.steps as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")?,
    );

    let mut running = 0.0f32;
    for step in 1..=args.steps {
        let (features, instances) =
            synthetic_batch::<MyAutodiffBackend, _>(&mut rng, &config, args.images, args.max_instances, &device);
        let loss = trainer.train_step(features, &instances)?;

        running = if step == 1 { loss } else { 0.9 * running + 0.1 * loss };
        pb.set_message(format!("loss={:.4} skipped={}", running, trainer.head().skipped_batches()));
        pb.inc(1);
    }
    pb.finish_with_message(format!("done, loss={:.4}", running));

    let saved = trainer.save_checkpoint(&args.save_dir, "final")?;
    log::info!("checkpoint written to {}", saved.display());
    Ok(())
}
