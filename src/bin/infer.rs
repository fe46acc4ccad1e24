use burn::backend::ndarray::NdArrayDevice;
use burn::backend::NdArray;
use burn::prelude::*;
use burn::tensor::Distribution;
use clap::Parser;
use std::path::PathBuf;

use keypoint_rcnn_head::training::load_checkpoint;
use keypoint_rcnn_head::{build_keypoint_head, Boxes, HeadConfig, Instances, KeypointRcnnHead, ShapeSpec};

#[derive(Parser, Debug)]
#[command(author, version, about = "Decode keypoints from synthetic region features")]
struct Args {
    /// Checkpoint directory written by `train` (contains config.yaml and model.bin)
    #[arg(short, long)]
    checkpoint: Option<PathBuf>,

    /// Comma-separated instance counts per image
    #[arg(long, default_value = "2,0,1", value_delimiter = ',')]
    instances: Vec<usize>,
}

fn main() -> anyhow::Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args = Args::parse();

    type MyBackend = NdArray;
    let device = NdArrayDevice::default();

    let config = match &args.checkpoint {
        Some(dir) => HeadConfig::from_yaml(dir.join("config.yaml"))?,
        None => HeadConfig::default(),
    };

    let head = build_keypoint_head::<MyBackend>(&config, ShapeSpec::from_config(&config), &device)?;
    let head = match &args.checkpoint {
        Some(dir) => {
            let layers = load_checkpoint(head.into_layers(), dir.join("model"), &device)?;
            log::info!("loaded weights from {}", dir.display());
            KeypointRcnnHead::new(layers, &config)
        }
        None => {
            log::warn!("no checkpoint given, decoding with freshly initialized weights");
            head
        }
    };

    let instances: Vec<Instances> = args
        .instances
        .iter()
        .map(|&count| {
            let boxes = (0..count)
                .map(|i| {
                    let offset = 20.0 * i as f32;
                    [offset, offset, offset + 64.0, offset + 96.0]
                })
                .collect();
            Instances::for_inference((256, 256), Boxes(boxes))
        })
        .collect();

    let total: usize = args.instances.iter().sum();
    let side = config.pooler_resolution;
    let features = Tensor::<MyBackend, 4>::random(
        [total, config.in_channels, side, side],
        Distribution::Normal(0.0, 1.0),
        &device,
    );

    let instances = head.predict(features, instances)?;

    for (image, instances_per_image) in instances.iter().enumerate() {
        let Some(preds) = instances_per_image.pred_keypoints.as_ref() else {
            continue;
        };
        println!("image {}: {} instances", image, preds.len());
        for i in 0..preds.len() {
            println!("  instance {}:", i);
            for (k, [x, y, score]) in preds.instance(i).iter().enumerate() {
                println!("    kp {:>2}: ({:7.2}, {:7.2}) score={:.4}", k, x, y, score);
            }
        }
    }

    Ok(())
}
