use crate::config::MirrorConfig;
use crate::error::MirrorError;
use crate::models::{ImageRef, RenderedPage, ScriptRef, StylesheetRef};
use crate::target::CrawlTarget;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use log::{debug, info, warn};
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::timeout;

/// Extraction payload returned by the in-page harvesting script.
#[derive(Debug, Deserialize)]
struct ExtractPayload {
    images: Vec<ImageRef>,
    scripts: Vec<ScriptRef>,
    stylesheets: Vec<StylesheetRef>,
    links: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ScrollState {
    pos: f64,
    height: f64,
}

/// Single script evaluation keeps extraction to one CDP round-trip and
/// resolves every reference against the live document base. The best
/// image source is the widest `srcset` candidate, falling back to `src`.
const EXTRACT_SCRIPT: &str = r#"
(() => {
    const abs = (u) => { try { return new URL(u, document.baseURI).href; } catch (e) { return null; } };
    const bestFromSrcset = (srcset) => {
        let best = null, bestW = -1;
        for (const part of srcset.split(',')) {
            const fields = part.trim().split(/\s+/);
            const u = fields[0];
            if (!u) continue;
            const w = fields[1] ? (parseFloat(fields[1]) || 0) : 0;
            if (w >= bestW) { bestW = w; best = u; }
        }
        return best;
    };
    const images = [];
    for (const img of document.querySelectorAll('img')) {
        const src = img.getAttribute('src');
        const srcset = img.getAttribute('srcset');
        const candidate = (srcset && bestFromSrcset(srcset)) || src;
        const best = candidate ? abs(candidate) : null;
        if (best) images.push({ best_src: best, src: src, srcset: srcset });
    }
    const scripts = [];
    for (const s of document.querySelectorAll('script[src]')) {
        const a = abs(s.getAttribute('src'));
        if (a) scripts.push({ src: a });
    }
    const stylesheets = [];
    for (const l of document.querySelectorAll('link[rel="stylesheet"]')) {
        const a = abs(l.getAttribute('href'));
        if (a) stylesheets.push({ href: a });
    }
    const links = [];
    for (const a of document.querySelectorAll('a[href]')) {
        if (a.href) links.push(a.href);
    }
    return { images, scripts, stylesheets, links };
})()
"#;

/// Headless Chrome wrapper that loads one page at a time and exposes its
/// rendered DOM, sub-resources and outgoing links.
pub struct Renderer {
    browser: Option<Browser>,
}

impl Renderer {
    /// Launch the browser engine. Failure here is the one fatal error of
    /// the whole system.
    pub async fn launch() -> Result<Self, MirrorError> {
        info!("Starting headless Chrome browser");

        let config = BrowserConfig::builder()
            .no_sandbox()
            .incognito()
            .args(vec![
                "--disable-web-security",
                "--disable-extensions",
                "--disable-gpu",
                "--disable-dev-shm-usage",
                "--disable-setuid-sandbox",
                "--no-first-run",
                "--no-zygote",
            ])
            .build()
            .map_err(|e| MirrorError::Scrape(format!("failed to build browser config: {e}")))?;

        let mut retries = 3;
        let mut last_error = None;

        while retries > 0 {
            match Browser::launch(config.clone()).await {
                Ok((browser, mut handler)) => {
                    tokio::spawn(async move {
                        while let Some(h) = handler.next().await {
                            if let Err(e) = h {
                                warn!("Browser handler error: {e}");
                            }
                        }
                    });

                    info!("Headless Chrome browser started");
                    return Ok(Self {
                        browser: Some(browser),
                    });
                }
                Err(e) => {
                    warn!("Failed to launch browser (attempt {}): {e}", 4 - retries);
                    last_error = Some(e);
                    retries -= 1;
                    if retries > 0 {
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        }

        Err(MirrorError::Scrape(format!(
            "failed to start Chrome after multiple attempts: {last_error:?}"
        )))
    }

    /// Shut the browser down.
    pub async fn close(&mut self) {
        if let Some(mut browser) = self.browser.take() {
            info!("Stopping headless Chrome browser");
            if let Err(e) = browser.close().await {
                warn!("Error closing browser: {e}");
            }
            if let Err(e) = browser.wait().await {
                debug!("Error waiting for browser exit: {e}");
            }
        }
    }

    /// Load one target in a fresh page context and extract its rendered
    /// document, sub-resources and same-origin links.
    pub async fn render(
        &self,
        target: &CrawlTarget,
        config: &MirrorConfig,
    ) -> Result<RenderedPage, MirrorError> {
        let browser = self
            .browser
            .as_ref()
            .ok_or_else(|| MirrorError::Scrape("browser not started".to_string()))?;

        debug!("Rendering {target}");

        let page = browser
            .new_page(target.as_str())
            .await
            .map_err(|e| nav_err(target, format!("failed to open page: {e}")))?;

        let rendered = self.render_on_page(&page, target, config).await;

        // Close on every path so contexts never leak.
        if let Err(e) = page.close().await {
            warn!("Error closing page for {target}: {e}");
        }

        rendered
    }

    async fn render_on_page(
        &self,
        page: &Page,
        target: &CrawlTarget,
        config: &MirrorConfig,
    ) -> Result<RenderedPage, MirrorError> {
        timeout(config.nav_timeout, page.wait_for_navigation())
            .await
            .map_err(|_| nav_err(target, "navigation timed out".to_string()))?
            .map_err(|e| nav_err(target, format!("navigation failed: {e}")))?;

        // Let late XHRs settle before poking the page.
        tokio::time::sleep(Duration::from_millis(500)).await;

        self.scroll_to_bottom(page, config).await;

        let payload: ExtractPayload = page
            .evaluate(EXTRACT_SCRIPT)
            .await
            .map_err(|e| nav_err(target, format!("extraction failed: {e}")))?
            .into_value()
            .map_err(|e| nav_err(target, format!("bad extraction payload: {e}")))?;

        let html = timeout(Duration::from_secs(10), page.content())
            .await
            .map_err(|_| nav_err(target, "timeout getting page content".to_string()))?
            .map_err(|e| nav_err(target, format!("failed to get page content: {e}")))?;

        let links = filter_links(target, &payload.links);
        debug!(
            "Rendered {target}: {} images, {} scripts, {} stylesheets, {} same-origin links",
            payload.images.len(),
            payload.scripts.len(),
            payload.stylesheets.len(),
            links.len()
        );

        Ok(RenderedPage {
            target: target.clone(),
            html,
            images: payload.images,
            scripts: payload.scripts,
            stylesheets: payload.stylesheets,
            links,
        })
    }

    /// Fixed-increment scroll loop to trigger lazy-loaded content.
    /// Stops when the viewport bottom reaches the current scroll height.
    async fn scroll_to_bottom(&self, page: &Page, config: &MirrorConfig) {
        // Cap iterations so pages that grow on every scroll still terminate.
        for _ in 0..200 {
            let script = format!(
                "(() => {{ window.scrollBy(0, {}); return {{ pos: window.scrollY + window.innerHeight, height: document.body.scrollHeight }}; }})()",
                config.scroll_step
            );
            let evaluated = match page.evaluate(script).await {
                Ok(v) => v,
                Err(e) => {
                    debug!("Scroll step failed: {e}");
                    return;
                }
            };
            let state: ScrollState = match evaluated.into_value() {
                Ok(state) => state,
                Err(e) => {
                    debug!("Bad scroll payload: {e}");
                    return;
                }
            };
            if state.pos >= state.height {
                return;
            }
            tokio::time::sleep(config.scroll_delay).await;
        }
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if self.browser.is_some() {
            info!("Renderer dropped with browser still running");
        }
    }
}

fn nav_err(target: &CrawlTarget, reason: String) -> MirrorError {
    MirrorError::Navigation {
        url: target.to_string(),
        reason,
    }
}

/// Keep same-origin links only, normalized and deduplicated.
fn filter_links(origin: &CrawlTarget, raw: &[String]) -> Vec<CrawlTarget> {
    let mut seen = HashSet::new();
    let mut links = Vec::new();
    for href in raw {
        let Ok(candidate) = CrawlTarget::normalize(href) else {
            // Unparsable discoveries are dropped silently.
            continue;
        };
        if !origin.same_origin(candidate.url()) {
            continue;
        }
        if seen.insert(candidate.as_str().to_string()) {
            links.push(candidate);
        }
    }
    links
}
