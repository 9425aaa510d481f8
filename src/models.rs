use crate::target::CrawlTarget;
use serde::{Deserialize, Serialize};

/// An `<img>` element found in a rendered page.
///
/// `best_src` is the effective source: the highest-resolution candidate
/// from `srcset` when one exists, otherwise the plain `src`.
#[derive(Debug, Clone, Deserialize)]
pub struct ImageRef {
    /// Effective source URL, absolute.
    pub best_src: String,
    /// Raw `src` attribute, if present.
    pub src: Option<String>,
    /// Raw `srcset` attribute, if present.
    pub srcset: Option<String>,
}

/// A `<script src>` element found in a rendered page.
#[derive(Debug, Clone, Deserialize)]
pub struct ScriptRef {
    /// Absolute script URL.
    pub src: String,
}

/// A `<link rel="stylesheet">` element found in a rendered page.
#[derive(Debug, Clone, Deserialize)]
pub struct StylesheetRef {
    /// Absolute stylesheet URL.
    pub href: String,
}

/// Everything extracted from one headless-browser page load.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    /// The target this page was rendered for.
    pub target: CrawlTarget,
    /// Final serialized document markup.
    pub html: String,
    /// Images in document order.
    pub images: Vec<ImageRef>,
    /// External scripts in document order.
    pub scripts: Vec<ScriptRef>,
    /// Stylesheets in document order.
    pub stylesheets: Vec<StylesheetRef>,
    /// Same-origin links, normalized and deduplicated.
    pub links: Vec<CrawlTarget>,
}

/// Kind of a relocated asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Image,
    Script,
    Stylesheet,
}

/// One fetched asset and where it landed in the mirror tree.
#[derive(Debug, Clone, Serialize)]
pub struct AssetRecord {
    /// URL the asset was fetched from.
    pub remote_url: String,
    /// Path relative to the mirror root, e.g. `assets/img_...jpg`.
    pub local_path: String,
    pub kind: AssetKind,
}

/// A node in the mirror's folder-structure report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FileNode {
    File {
        name: String,
    },
    Folder {
        name: String,
        children: Vec<FileNode>,
    },
}

impl FileNode {
    pub fn name(&self) -> &str {
        match self {
            FileNode::File { name } => name,
            FileNode::Folder { name, .. } => name,
        }
    }
}

/// Result of a completed crawl run, returned to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct CrawlSummary {
    /// Number of distinct targets dispatched (including failed renders).
    pub pages_visited: usize,
    /// Folder structure of the mirror root, assets excluded.
    pub tree: FileNode,
    /// Base URL the mirror is served under.
    pub server_url: String,
}
