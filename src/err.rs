use std::path::PathBuf;
use strum::Display;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Broad failure classes reported to the user.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    ResourceLoad,
    DataFormat,
    Render,
    Packaging,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("no font files found in {0:?}")]
    EmptyFontSet(PathBuf),
    #[error("invalid font choice {index}, expected a number between 1 and {count}")]
    FontIndex { index: usize, count: usize },
    #[error("font {0:?} is not inside the fonts directory")]
    FontOutsideDir(PathBuf),
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("cannot load font {path:?} at size {size}: {reason}")]
    FontLoad {
        path: PathBuf,
        size: f32,
        reason: String,
    },
    #[error("cannot load background {path:?}: {source}")]
    Background {
        path: PathBuf,
        source: image::ImageError,
    },

    #[error("missing required column {0:?}")]
    MissingColumn(String),
    #[error("row {row}: {reason}")]
    MalformedRow { row: usize, reason: String },

    #[error("record {row}: {reason}")]
    Render { row: usize, reason: String },

    #[error("packaging failed: {0}")]
    Packaging(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::EmptyFontSet(_)
            | Error::FontIndex { .. }
            | Error::FontOutsideDir(_)
            | Error::Config(_)
            | Error::Json(_) => ErrorKind::Configuration,
            Error::FontLoad { .. } | Error::Background { .. } | Error::Io(_) => {
                ErrorKind::ResourceLoad
            }
            Error::MissingColumn(_) | Error::MalformedRow { .. } | Error::Csv(_) => {
                ErrorKind::DataFormat
            }
            Error::Render { .. } => ErrorKind::Render,
            Error::Packaging(_) => ErrorKind::Packaging,
        }
    }
}

impl From<printpdf::Error> for Error {
    fn from(err: printpdf::Error) -> Self {
        Error::Packaging(err.to_string())
    }
}

impl From<lopdf::Error> for Error {
    fn from(err: lopdf::Error) -> Self {
        Error::Packaging(err.to_string())
    }
}
