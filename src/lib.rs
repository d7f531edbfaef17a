//! 示教机器核心库
//!
//! 核心机制：摄像头帧 → embedding → k 近邻投票
//! - 训练时把当前帧的 embedding 加入所选类别
//! - 每帧把 embedding 与所有样本比较，取最相似的 k 个投票
//! - 用户用标签训练，标签映射到有限的类别槽

pub mod buffer;
pub mod config;
pub mod core;
pub mod error;
pub mod utils;

// Re-exports - 分类器
pub use crate::core::classifier::{KnnClassifier, Prediction};
pub use crate::core::extractor::{EmbeddingExtractor, GridPoolExtractor};

// Re-exports - 会话
pub use crate::core::session::{TeachableSession, FrameOutcome, SessionStats};
pub use crate::core::labels::LabelMap;
pub use crate::core::event::SessionEvent;
pub use crate::core::snapshot::{SessionSnapshot, ClassSnapshot};
pub use crate::core::stream::{FrameLoop, FrameLoopStats, FrameSource, LoopHandle, ReplaySource, SharedSession};

// Re-exports - 缓冲区
pub use crate::buffer::{ExampleStore, Frame};

pub use crate::config::{ConfigError, TeachableConfig};
pub use crate::error::{ErrorCode, Result, TeachableError};
