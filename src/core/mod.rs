//! 核心模块

pub mod classifier;
pub mod event;
pub mod extractor;
pub mod labels;
pub mod session;
pub mod snapshot;
pub mod stream;
