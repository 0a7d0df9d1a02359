use std::path::PathBuf;

/// A configuration value no stage can work with.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ParamsError {
    #[error("invalid parameter `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Page-level failures. Everything after decoding the input recovers locally.
#[derive(thiserror::Error, Debug)]
pub enum GradeError {
    #[error("failed to load image: {0}")]
    Load(#[from] image::ImageError),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
