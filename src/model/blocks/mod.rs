pub mod attention;
pub mod conv;
pub mod upsample;

pub use attention::{channel_max, SpatialAttention};
pub use conv::{msra_fill, score_lowres, ConvRelu};
pub use upsample::BilinearUpsample2d;
