//! 工具

pub mod time;
