//! 生成构件：存储与生成管线

pub mod builder;
pub mod store;

pub use builder::{ArtifactBuilder, LlmArtifactBuilder};
pub use store::{extract_html_title, ArtifactEntry, ArtifactKind, ArtifactStore};
