pub mod bio;
pub mod cli;
pub mod core;
pub mod report;
pub mod utils;

pub use crate::core::config::ClassifyConfig;
pub use crate::core::pipeline::ClassificationPipeline;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LinnaeaError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Unclassifiable input: {0}")]
    FatalInput(String),

    #[error("Taxonomy service error: {0}")]
    Resolver(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, LinnaeaError>;
