pub mod error;
pub mod model;
pub mod structures;
pub mod training;

// Re-exports for convenience
pub use error::{HeadError, HeadResult};
pub use model::{
    build_keypoint_head, HeadKind, HeadMode, HeadOutput, KeypointHeadNet, KeypointLayers,
    KeypointRcnnHead, ShapeSpec,
};
pub use structures::{Boxes, Instances, KeypointPredictions, Keypoints};
pub use training::{HeadConfig, Trainer};
