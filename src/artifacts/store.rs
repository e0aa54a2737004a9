//! 生成构件的文件存储
//!
//! 仪表盘、报告、组件各占一个分类目录，文件名由 HTML `<title>`（缺省用兜底名）+
//! 时间戳 + 进程内单调序号组成。同秒内重复标题靠序号消歧，时间戳粒度不再是
//! 唯一性来源。文件可按名读取，目录可倒序列出（新的在前）。

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use serde::Serialize;

use crate::core::SleuthError;

/// 构件分类，决定落盘子目录
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Dashboard,
    Report,
    Widget,
}

impl ArtifactKind {
    pub fn dir_name(&self) -> &'static str {
        match self {
            ArtifactKind::Dashboard => "generated_dashboards",
            ArtifactKind::Report => "generated_reports",
            ArtifactKind::Widget => "generated_widgets",
        }
    }

    pub fn fallback_title(&self) -> &'static str {
        match self {
            ArtifactKind::Dashboard => "dashboard",
            ArtifactKind::Report => "Data_Analysis_Report",
            ArtifactKind::Widget => "widget",
        }
    }
}

/// 目录列表里的一项
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactEntry {
    pub file_name: String,
    /// 文件修改时间（unix 秒）
    pub modified: u64,
}

/// 构件文件存储
pub struct ArtifactStore {
    root: PathBuf,
    counter: AtomicU64,
}

/// 从 HTML 提取 `<title>` 内容
pub fn extract_html_title(html: &str) -> Option<String> {
    let after = html.split("<title>").nth(1)?;
    let title = after.split("</title>").next()?;
    let trimmed = title.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

impl ArtifactStore {
    /// 创建存储并确保全部分类目录存在
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, SleuthError> {
        let root = root.into();
        for kind in [
            ArtifactKind::Dashboard,
            ArtifactKind::Report,
            ArtifactKind::Widget,
        ] {
            std::fs::create_dir_all(root.join(kind.dir_name()))
                .map_err(|e| SleuthError::Artifact(e.to_string()))?;
        }
        Ok(Self {
            root,
            counter: AtomicU64::new(0),
        })
    }

    fn dir(&self, kind: ArtifactKind) -> PathBuf {
        self.root.join(kind.dir_name())
    }

    /// 保存 HTML 构件，返回生成的文件名
    pub fn save(&self, kind: ArtifactKind, html: &str) -> Result<String, SleuthError> {
        let title = extract_html_title(html)
            .map(|t| sanitize(&t))
            .unwrap_or_else(|| kind.fallback_title().to_string());
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        let file_name = format!("{}_{}_{}.html", title, timestamp, seq);
        let path = self.dir(kind).join(&file_name);
        std::fs::write(&path, html).map_err(|e| SleuthError::Artifact(e.to_string()))?;
        tracing::info!(kind = kind.dir_name(), file = %file_name, "artifact saved");
        Ok(file_name)
    }

    /// 按文件名读取；拒绝带路径成分的名字
    pub fn read(&self, kind: ArtifactKind, file_name: &str) -> Result<String, SleuthError> {
        if file_name.contains('/') || file_name.contains('\\') || file_name.contains("..") {
            return Err(SleuthError::Artifact(format!(
                "invalid artifact name: {}",
                file_name
            )));
        }
        std::fs::read_to_string(self.dir(kind).join(file_name))
            .map_err(|e| SleuthError::Artifact(e.to_string()))
    }

    /// 列出某分类下的全部 .html 构件，按修改时间倒序
    pub fn list(&self, kind: ArtifactKind) -> Result<Vec<ArtifactEntry>, SleuthError> {
        let mut entries = Vec::new();
        let dir = std::fs::read_dir(self.dir(kind)).map_err(|e| SleuthError::Artifact(e.to_string()))?;
        for entry in dir.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            if !name.ends_with(".html") {
                continue;
            }
            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
                .map(|d| d.as_secs())
                .unwrap_or(0);
            entries.push(ArtifactEntry {
                file_name: name,
                modified,
            });
        }
        entries.sort_by(|a, b| b.modified.cmp(&a.modified).then(b.file_name.cmp(&a.file_name)));
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_title() {
        let html = "<html><head><title>Device Fleet Overview</title></head></html>";
        assert_eq!(
            extract_html_title(html).as_deref(),
            Some("Device Fleet Overview")
        );
        assert!(extract_html_title("<html></html>").is_none());
    }

    #[test]
    fn test_save_uses_title_and_is_listable() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path()).unwrap();
        let html = "<html><head><title>Fleet Report</title></head><body></body></html>";
        let name = store.save(ArtifactKind::Dashboard, html).unwrap();
        assert!(name.starts_with("Fleet_Report_"));
        assert!(name.ends_with(".html"));

        let listed = store.list(ArtifactKind::Dashboard).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].file_name, name);
        assert_eq!(store.read(ArtifactKind::Dashboard, &name).unwrap(), html);
    }

    #[test]
    fn test_identical_titles_in_same_second_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path()).unwrap();
        let html = "<html><head><title>Same</title></head></html>";
        let a = store.save(ArtifactKind::Widget, html).unwrap();
        let b = store.save(ArtifactKind::Widget, html).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_read_rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path()).unwrap();
        assert!(store.read(ArtifactKind::Report, "../secret.html").is_err());
    }
}
