use std::path::PathBuf;
use thiserror::Error;

pub type HeadResult<T> = Result<T, HeadError>;

#[derive(Debug, Error)]
pub enum HeadError {
    #[error("attention kernel size must be 3 or 7, got {0}")]
    InvalidKernelSize(usize),
    #[error("invalid head config: {0}")]
    InvalidConfig(String),
    #[error("{0} does not implement layers()")]
    LayersNotImplemented(&'static str),
    #[error("unknown keypoint head `{0}`")]
    UnknownHead(String),
    #[error("instances of image {image} have no `{field}` field")]
    MissingField { image: usize, field: &'static str },
    #[error("data error: {0}")]
    Data(String),
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("yaml error at {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("checkpoint error: {0}")]
    Checkpoint(String),
}
