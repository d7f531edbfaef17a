//! 缓冲区模块

pub mod frame;
pub mod examples;

pub use frame::Frame;
pub use examples::ExampleStore;
