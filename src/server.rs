use crate::config::MirrorConfig;
use crate::error::MirrorError;
use axum::response::Redirect;
use axum::routing::get;
use axum::Router;
use log::{info, warn};
use std::net::SocketAddr;
use std::path::Path;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tower_http::services::ServeDir;

/// One bound HTTP listener over the mirror root.
struct ServerHandle {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<std::io::Result<()>>,
    addr: SocketAddr,
}

/// Lifecycle manager for the mirror's HTTP listener.
///
/// The listening socket is the one process-wide shared resource of the
/// system: at most one handle is bound at a time, and every bind, rebind
/// and release is sequenced through the internal mutex. Binding while a
/// handle exists closes the old listener completely before the new one
/// starts, so the port is never double-held and no request is served
/// against half-written content.
pub struct MirrorServer {
    handle: Mutex<Option<ServerHandle>>,
}

impl Default for MirrorServer {
    fn default() -> Self {
        Self::new()
    }
}

impl MirrorServer {
    pub fn new() -> Self {
        Self {
            handle: Mutex::new(None),
        }
    }

    /// Bind the mirror root, closing any existing listener first.
    /// Returns the base URL the mirror is served under.
    pub async fn bind(&self, config: &MirrorConfig) -> Result<String, MirrorError> {
        let mut guard = self.handle.lock().await;
        if let Some(existing) = guard.take() {
            info!("Releasing existing mirror listener on {}", existing.addr);
            shutdown_handle(existing).await;
        }

        let handle = start_listener(&config.output_dir, config.port, &config.mount_path).await?;
        let url = format!("http://{}{}", handle.addr, config.mount_path);
        info!("Mirror served at {url}");
        *guard = Some(handle);
        Ok(url)
    }

    /// Re-serve the mirror after its content changed on disk. Close
    /// before reopen: a brief unavailability window is accepted over
    /// serving inconsistent state.
    pub async fn rebind(&self, config: &MirrorConfig) -> Result<String, MirrorError> {
        self.bind(config).await
    }

    /// Shut the listener down and wait for it to finish. No-op when
    /// nothing is bound.
    pub async fn release(&self) {
        let mut guard = self.handle.lock().await;
        if let Some(handle) = guard.take() {
            info!("Releasing mirror listener on {}", handle.addr);
            shutdown_handle(handle).await;
        }
    }

    /// Address of the currently bound listener, if any.
    pub async fn bound_addr(&self) -> Option<SocketAddr> {
        self.handle.lock().await.as_ref().map(|h| h.addr)
    }
}

async fn start_listener(
    root: &Path,
    port: u16,
    mount_path: &str,
) -> Result<ServerHandle, MirrorError> {
    let index = format!("{mount_path}/index.html");
    let app = Router::new()
        .route(
            "/",
            get(move || async move { Redirect::permanent(&index) }),
        )
        .nest_service(mount_path, ServeDir::new(root));

    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    let addr = listener.local_addr()?;

    let (shutdown, rx) = oneshot::channel::<()>();
    let task = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = rx.await;
            })
            .await
    });

    Ok(ServerHandle {
        shutdown,
        task,
        addr,
    })
}

/// Hard ordering requirement: signal shutdown, then await the serve task
/// to completion so the OS port is actually free when this returns.
async fn shutdown_handle(handle: ServerHandle) {
    let _ = handle.shutdown.send(());
    match handle.task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Mirror listener exited with error: {e}"),
        Err(e) => warn!("Mirror listener task failed: {e}"),
    }
}
