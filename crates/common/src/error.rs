//! Configuration and I/O errors shared by the binaries

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// A value failed validation
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("reading configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("parsing configuration: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
