//! 核心层：统一错误类型

pub mod error;

pub use error::SleuthError;
