use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum OcrError {
    #[error("ONNX Runtime error: {0}")]
    Runtime(#[from] ort::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Tensor shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("{stage} model file does not exist: {path:?}")]
    ModelNotFound { stage: &'static str, path: PathBuf },

    #[error("Recognizer keys file does not exist: {0:?}")]
    KeysNotFound(PathBuf),

    #[error("No keys file given and the recognizer model has no `character` metadata")]
    MissingVocabulary,

    #[error("Model produced no output tensor")]
    EmptyOutput,

    #[error("Unexpected output shape {0:?}")]
    UnexpectedShape(Vec<usize>),

    #[error("A text box needs exactly 4 points, got {0}")]
    InvalidBox(usize),
}

pub type Result<T> = std::result::Result<T, OcrError>;
