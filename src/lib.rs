pub mod assets;
pub mod config;
pub mod error;
pub mod models;
pub mod renderer;
pub mod report;
pub mod rewrite;
pub mod scheduler;
pub mod server;
pub mod target;

// Re-export important types
pub use config::MirrorConfig;
pub use error::MirrorError;
pub use models::{AssetKind, AssetRecord, CrawlSummary, FileNode, RenderedPage};
pub use renderer::Renderer;
pub use scheduler::Crawler;
pub use server::MirrorServer;
pub use target::CrawlTarget;
