pub mod blocks;
pub mod head;
pub mod inference;
pub mod keypoint_head;
pub mod loss;
pub mod registry;

pub use head::{ConvDeconvUpsampleHead, KeypointLayers};
pub use inference::keypoint_rcnn_inference;
pub use keypoint_head::{HeadMode, HeadOutput, KeypointRcnnHead, KEYPOINT_LOSS_KEY};
pub use loss::{KeypointLoss, LossNormalizer, SkippedBatchCounter, SKIPPED_BATCHES_SCALAR};
pub use registry::{build_keypoint_head, HeadKind, KeypointHeadNet, ShapeSpec};
