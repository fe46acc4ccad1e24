pub mod config;
pub mod events;
pub mod trainer;

pub use config::HeadConfig;
pub use events::{EventStorage, LogEventStorage, ScalarHistory};
pub use trainer::{load_checkpoint, Trainer};
