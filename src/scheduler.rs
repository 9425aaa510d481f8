use crate::assets::AssetRelocator;
use crate::config::MirrorConfig;
use crate::error::MirrorError;
use crate::models::{CrawlSummary, RenderedPage};
use crate::renderer::Renderer;
use crate::report;
use crate::rewrite;
use crate::server::MirrorServer;
use crate::target::CrawlTarget;
use futures::future::join_all;
use log::{debug, info, warn};
use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Semaphore;

/// Crawl-run lifecycle. `Draining` is entered when a completed batch
/// produced no new discoveries and the frontier is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CrawlState {
    Idle,
    Running,
    Draining,
    Done,
}

/// Work queue plus dedup bookkeeping, owned exclusively by the scheduler.
///
/// `seen` holds every key ever enqueued so overlapping discoveries land
/// in the frontier once; `visited` holds keys actually dispatched, and a
/// key enters it at dequeue time, before its render starts.
struct Frontier {
    queue: VecDeque<CrawlTarget>,
    seen: HashSet<String>,
    visited: HashSet<String>,
}

impl Frontier {
    fn seeded(seed: CrawlTarget) -> Self {
        let mut seen = HashSet::new();
        seen.insert(seed.as_str().to_string());
        let mut queue = VecDeque::new();
        queue.push_back(seed);
        Self {
            queue,
            seen,
            visited: HashSet::new(),
        }
    }

    /// Dequeue up to `n` targets, marking each visited before dispatch.
    fn next_batch(&mut self, n: usize) -> Vec<CrawlTarget> {
        let mut batch = Vec::new();
        while batch.len() < n {
            let Some(target) = self.queue.pop_front() else {
                break;
            };
            self.visited.insert(target.as_str().to_string());
            batch.push(target);
        }
        batch
    }

    /// Enqueue newly discovered targets, skipping anything seen before.
    /// Returns how many were admitted.
    fn admit(&mut self, links: impl IntoIterator<Item = CrawlTarget>) -> usize {
        let mut admitted = 0;
        for link in links {
            if self.seen.insert(link.as_str().to_string()) {
                self.queue.push_back(link);
                admitted += 1;
            }
        }
        admitted
    }

    fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    fn visited_count(&self) -> usize {
        self.visited.len()
    }
}

/// Drives a full mirror run: BFS traversal over same-origin pages with a
/// bounded number of concurrent renders, then hands the finished tree to
/// the mirror server and the folder reporter.
pub struct Crawler {
    relocator: AssetRelocator,
    server: MirrorServer,
    config: MirrorConfig,
    in_flight: AtomicUsize,
}

impl Crawler {
    pub fn new(config: MirrorConfig) -> Self {
        Self {
            relocator: AssetRelocator::new(&config),
            server: MirrorServer::new(),
            config,
            in_flight: AtomicUsize::new(0),
        }
    }

    pub fn config(&self) -> &MirrorConfig {
        &self.config
    }

    /// The serving lifecycle manager. The only legitimate write path into
    /// the mirror after a crawl is an external edit followed by `rebind`
    /// through this handle.
    pub fn server(&self) -> &MirrorServer {
        &self.server
    }

    /// Mirror the site reachable from `seed` and serve the result.
    ///
    /// A seed that does not parse aborts immediately; a page that fails
    /// to render is logged and counted as visited with no output.
    pub async fn crawl(&self, seed: &str) -> Result<CrawlSummary, MirrorError> {
        let seed = CrawlTarget::normalize(seed)?;
        tokio::fs::create_dir_all(&self.config.output_dir).await?;

        let mut renderer = Renderer::launch().await?;
        let result = self
            .run_traversal(seed, |target| {
                let renderer = &renderer;
                async move { self.process_target(renderer, &target).await }
            })
            .await;
        renderer.close().await;
        let pages_visited = result?;

        let server_url = self.server.bind(&self.config).await?;
        let tree = report::describe(&self.config.output_dir)?;

        info!("Crawl done: {pages_visited} pages, serving at {server_url}");
        Ok(CrawlSummary {
            pages_visited,
            tree,
            server_url,
        })
    }

    /// Traversal bookkeeping over a pluggable per-target render function;
    /// production passes `process_target`.
    async fn run_traversal<F, Fut>(&self, seed: CrawlTarget, render: F) -> Result<usize, MirrorError>
    where
        F: Fn(CrawlTarget) -> Fut,
        Fut: Future<Output = Result<Vec<CrawlTarget>, MirrorError>>,
    {
        info!("Starting crawl of {seed}");
        let mut frontier = Frontier::seeded(seed);
        let limiter = Semaphore::new(self.config.concurrency);
        let mut state = CrawlState::Idle;

        while !frontier.is_empty() {
            if state != CrawlState::Running {
                state = CrawlState::Running;
                debug!("Crawl state -> {state:?}");
            }
            let batch = frontier.next_batch(self.config.batch_size);
            debug!("Dispatching batch of {}", batch.len());

            let workers = batch.iter().map(|target| {
                let limiter = &limiter;
                let render = &render;
                async move {
                    let permit = limiter
                        .acquire()
                        .await
                        .map_err(|_| MirrorError::Scrape("render limiter closed".to_string()));
                    let _permit = match permit {
                        Ok(p) => p,
                        Err(e) => return (target, Err(e)),
                    };
                    let gauge = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    debug!("Renders in flight: {gauge}");
                    let result = render(target.clone()).await;
                    self.in_flight.fetch_sub(1, Ordering::SeqCst);
                    (target, result)
                }
            });

            let mut discovered = 0;
            for (target, result) in join_all(workers).await {
                match result {
                    Ok(links) => {
                        discovered += frontier.admit(links);
                    }
                    Err(e) => {
                        // Visited with no output; the run keeps going.
                        warn!("Page failed, continuing: {e}");
                        debug!("Failed target was {target}");
                    }
                }
            }

            if discovered == 0 && frontier.is_empty() {
                state = CrawlState::Draining;
                debug!("Crawl state -> {state:?}");
            }
        }

        state = CrawlState::Done;
        debug!("Crawl state -> {state:?}");
        Ok(frontier.visited_count())
    }

    /// Render one page, relocate its assets, rewrite its references and
    /// persist the mirror document. Returns the page's discoveries.
    async fn process_target(
        &self,
        renderer: &Renderer,
        target: &CrawlTarget,
    ) -> Result<Vec<CrawlTarget>, MirrorError> {
        let page = renderer.render(target, &self.config).await?;
        let html = self.localize_page(&page).await?;

        let path = target.local_path(&self.config.output_dir);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, html).await?;
        info!("Mirrored {target} -> {}", path.display());

        Ok(page.links)
    }

    /// Asset fetches within a page run sequentially and do not count
    /// against the page-level render limiter.
    async fn localize_page(&self, page: &RenderedPage) -> Result<String, MirrorError> {
        let images = self
            .relocator
            .relocate_images(&page.images, &self.config)
            .await?;
        let scripts = self
            .relocator
            .relocate_scripts(&page.scripts, &self.config)
            .await?;
        let css = self.relocator.collect_stylesheets(&page.stylesheets).await;

        let page_url = page.target.url();
        let mount = &self.config.mount_path;

        let html = rewrite::rewrite_image_srcs(&page.html, page_url, &images.rewrites);
        let html = rewrite::rewrite_script_srcs(&html, page_url, &scripts.rewrites);
        let html = rewrite::comment_out_scripts(&html);
        let html = rewrite::rewrite_anchors(&html, &page.target, page_url, mount);
        let html = rewrite::inline_styles(&html, &css);
        Ok(rewrite::inject_base(&html, mount))
    }
}
