pub mod instances;
pub mod keypoints;

pub use instances::{Boxes, Instances, KeypointPredictions};
pub use keypoints::{heatmaps_to_keypoints, HeatmapTargets, Keypoints};
