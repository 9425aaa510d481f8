use std::path::PathBuf;
use std::time::Duration;

/// Tunables for a mirror run.
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    /// Directory the mirror tree is written to.
    pub output_dir: PathBuf,
    /// Port the mirror server binds to. 0 picks an ephemeral port.
    pub port: u16,
    /// Mount prefix the mirror root is served under.
    pub mount_path: String,
    /// Maximum page renders in flight at once.
    pub concurrency: usize,
    /// Targets dequeued from the frontier per batch.
    pub batch_size: usize,
    /// Per-page navigation timeout.
    pub nav_timeout: Duration,
    /// Pixels per synthetic scroll increment.
    pub scroll_step: u32,
    /// Delay between scroll increments.
    pub scroll_delay: Duration,
    /// User agent for asset fetches.
    pub user_agent: String,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("mirror"),
            port: 4173,
            mount_path: "/mirror".to_string(),
            concurrency: 5,
            batch_size: 5,
            nav_timeout: Duration::from_secs(30),
            scroll_step: 400,
            scroll_delay: Duration::from_millis(120),
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36".to_string(),
        }
    }
}

impl MirrorConfig {
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_concurrency(mut self, limit: usize) -> Self {
        self.concurrency = limit.max(1);
        self
    }

    pub fn with_nav_timeout(mut self, timeout: Duration) -> Self {
        self.nav_timeout = timeout;
        self
    }

    /// Directory image assets are stored in, relative to the mirror root.
    pub fn asset_dir(&self) -> PathBuf {
        self.output_dir.join("assets")
    }

    /// Directory relocated scripts are stored in.
    pub fn script_dir(&self) -> PathBuf {
        self.asset_dir().join("js")
    }
}
