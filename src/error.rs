//! 错误类型
//!
//! 所有错误都同步返回给调用方，不自动重试，也不会让进程退出。

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TeachableError {
    #[error("Invalid class {index} (num_classes = {num_classes})")]
    InvalidClass { index: usize, num_classes: usize },
    #[error("Not ready: {0}")]
    NotReady(&'static str),
    #[error("Label does not exist: {0}")]
    LabelNotFound(String),
    #[error("No more available classes for label: {0}")]
    NoAvailableSlots(String),
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("Cannot reshape {len} values into rows of {dim}")]
    ShapeMismatch { len: usize, dim: usize },
    #[error("Invalid frame: expected {expected} bytes, got {actual}")]
    InvalidFrame { expected: usize, actual: usize },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TeachableError>;

/// 上报给 UI 层的错误码
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    LabelDoesNotExist,
    NoMoreAvailableClasses,
}

impl ErrorCode {
    pub fn code(&self) -> i32 {
        match self {
            Self::LabelDoesNotExist => -1,
            Self::NoMoreAvailableClasses => -2,
        }
    }
}

impl TeachableError {
    /// 只有标签相关的错误有 UI 错误码
    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            Self::LabelNotFound(_) => Some(ErrorCode::LabelDoesNotExist),
            Self::NoAvailableSlots(_) => Some(ErrorCode::NoMoreAvailableClasses),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = TeachableError::LabelNotFound("cat".to_string());
        assert_eq!(err.error_code(), Some(ErrorCode::LabelDoesNotExist));
        assert_eq!(err.error_code().unwrap().code(), -1);

        let err = TeachableError::NoAvailableSlots("dog".to_string());
        assert_eq!(err.error_code().unwrap().code(), -2);

        let err = TeachableError::InvalidClass { index: 5, num_classes: 3 };
        assert!(err.error_code().is_none());
        assert_eq!(err.to_string(), "Invalid class 5 (num_classes = 3)");
    }
}
