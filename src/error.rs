use thiserror::Error;

/// Errors produced by the mirroring engine.
///
/// Per-unit failures (`Navigation`, `AssetFetch`) are contained at their
/// own scope by the scheduler and relocator and never abort a run; only
/// `Scrape` (browser engine startup) is fatal to the caller.
#[derive(Error, Debug)]
pub enum MirrorError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("navigation failed for {url}: {reason}")]
    Navigation { url: String, reason: String },

    #[error("asset fetch failed for {url}: {reason}")]
    AssetFetch { url: String, reason: String },

    #[error("scrape failure: {0}")]
    Scrape(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MirrorError>;
