//! Document identifiers and on-disk artifact layout.
//!
//! Every stage output lives at `{root}/{stage}/{YYYYMMDD}/{document_id}.{ext}`.
//! A file's presence is the only record that the stage completed, so files
//! are written through a temp file in the same directory and renamed.

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use marketbrief_common::dates::compact;
use serde::{Deserialize, Serialize};

/// Replace characters that are unsafe in file names and object keys with `_`.
pub fn sanitize_component(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_whitespace() || c.is_control() => '_',
            c => c,
        })
        .collect()
}

/// Stable identifier of a report, derived from company and title.
///
/// Distinct reports can collide (`"A B"` and `"A_B"`); the later one is then
/// treated as already processed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(company: &str, title: &str) -> Self {
        Self(sanitize_component(&format!("{company}_{title}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Artifact kinds that are archived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactStage {
    Raw,
    Text,
    Summary,
}

impl ArtifactStage {
    pub fn dir(&self) -> &'static str {
        match self {
            ArtifactStage::Raw => "raw",
            ArtifactStage::Text => "text",
            ArtifactStage::Summary => "summary",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ArtifactStage::Raw => "pdf",
            ArtifactStage::Text => "txt",
            ArtifactStage::Summary => "sum",
        }
    }
}

const EMBEDDED_DIR: &str = "embedded";

/// Root of the artifact tree.
#[derive(Debug, Clone)]
pub struct ArtifactLayout {
    root: PathBuf,
}

/// Resolved paths for one report on one date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub raw: PathBuf,
    pub text: PathBuf,
    pub summary: PathBuf,
    pub embedded_marker: PathBuf,
}

impl ArtifactLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Pure path computation, no I/O.
    pub fn resolve(&self, id: &DocumentId, date: NaiveDate) -> ArtifactPaths {
        let day = compact(date);
        let file = |dir: &str, ext: &str| {
            self.root.join(dir).join(&day).join(format!("{}.{ext}", id.as_str()))
        };
        ArtifactPaths {
            raw: file(ArtifactStage::Raw.dir(), ArtifactStage::Raw.extension()),
            text: file(ArtifactStage::Text.dir(), ArtifactStage::Text.extension()),
            summary: file(ArtifactStage::Summary.dir(), ArtifactStage::Summary.extension()),
            embedded_marker: file(EMBEDDED_DIR, "json"),
        }
    }

    /// Object key for an artifact: `data/{stage}/{YYYYMMDD}/{file}`.
    pub fn remote_key(stage: ArtifactStage, date: NaiveDate, local: &Path) -> String {
        let file = local
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!("data/{}/{}/{}", stage.dir(), compact(date), file)
    }
}

impl ArtifactPaths {
    pub fn get(&self, stage: ArtifactStage) -> &Path {
        match stage {
            ArtifactStage::Raw => &self.raw,
            ArtifactStage::Text => &self.text,
            ArtifactStage::Summary => &self.summary,
        }
    }

    /// Create every stage directory for this report.
    pub fn create_dirs(&self) -> std::io::Result<()> {
        for path in [&self.raw, &self.text, &self.summary, &self.embedded_marker] {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }
}

/// Write `bytes` to `path` atomically, creating the parent directory.
pub fn write_artifact(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    #[test]
    fn test_document_id_from_company_and_title() {
        assert_eq!(DocumentId::new("AcmeCo", "Q3 Outlook").as_str(), "AcmeCo_Q3_Outlook");
        assert_eq!(
            DocumentId::new("미래에셋", "2024/03 ETF: 전망").as_str(),
            "미래에셋_2024_03_ETF__전망"
        );
    }

    #[test]
    fn test_sanitize_is_total() {
        assert_eq!(sanitize_component(""), "");
        assert_eq!(sanitize_component("a\tb\nc\u{3000}d"), "a_b_c_d");
        assert_eq!(sanitize_component(r#"x*y?"<>|\"#), "x_y______");
    }

    #[test]
    fn test_resolve_layout() {
        let layout = ArtifactLayout::new("data");
        let paths = layout.resolve(&DocumentId::new("AcmeCo", "Q3 Outlook"), date());
        assert_eq!(paths.raw, PathBuf::from("data/raw/20240301/AcmeCo_Q3_Outlook.pdf"));
        assert_eq!(paths.text, PathBuf::from("data/text/20240301/AcmeCo_Q3_Outlook.txt"));
        assert_eq!(paths.summary, PathBuf::from("data/summary/20240301/AcmeCo_Q3_Outlook.sum"));
        assert_eq!(
            paths.embedded_marker,
            PathBuf::from("data/embedded/20240301/AcmeCo_Q3_Outlook.json")
        );
    }

    #[test]
    fn test_remote_key() {
        let key = ArtifactLayout::remote_key(
            ArtifactStage::Summary,
            date(),
            Path::new("/tmp/x/summary/20240301/AcmeCo_Q3_Outlook.sum"),
        );
        assert_eq!(key, "data/summary/20240301/AcmeCo_Q3_Outlook.sum");
    }

    #[test]
    fn test_write_artifact_creates_dirs_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("text/20240301/doc.txt");
        write_artifact(&path, "본문".as_bytes()).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "본문");
        let entries: Vec<_> = std::fs::read_dir(path.parent().unwrap()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_create_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ArtifactLayout::new(dir.path()).resolve(&DocumentId::new("a", "b"), date());
        paths.create_dirs().unwrap();
        assert!(paths.raw.parent().unwrap().is_dir());
        assert!(paths.embedded_marker.parent().unwrap().is_dir());
        assert!(!paths.raw.exists());
    }
}
