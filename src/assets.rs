use crate::config::MirrorConfig;
use crate::error::MirrorError;
use crate::models::{AssetKind, AssetRecord, ImageRef, ScriptRef, StylesheetRef};
use log::{debug, warn};
use reqwest::Client;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Body and content type of one downloaded asset.
pub struct FetchedAsset {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// The one fetch primitive every asset kind goes through. Non-2xx is an
/// error here; the fall-back-to-remote policy lives at the call sites.
pub async fn fetch_asset(client: &Client, url: &str) -> Result<FetchedAsset, MirrorError> {
    let fetch_err = |reason: String| MirrorError::AssetFetch {
        url: url.to_string(),
        reason,
    };

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| fetch_err(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(fetch_err(format!("status {status}")));
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string());

    let bytes = response
        .bytes()
        .await
        .map_err(|e| fetch_err(e.to_string()))?
        .to_vec();

    Ok(FetchedAsset {
        bytes,
        content_type,
    })
}

/// Result of relocating one kind of asset for one page: the old -> new
/// URL rewrite map (falling back to the remote URL on fetch failure) and
/// the records of assets that actually landed on disk.
#[derive(Debug, Default)]
pub struct Relocation {
    pub rewrites: HashMap<String, String>,
    pub records: Vec<AssetRecord>,
}

/// Downloads page sub-resources into the mirror's asset tree.
///
/// Each page gets its own copies; there is no cross-page dedup.
pub struct AssetRelocator {
    client: Client,
    mount_path: String,
    seq: AtomicU64,
}

impl AssetRelocator {
    pub fn new(config: &MirrorConfig) -> Self {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .gzip(true)
            .redirect(reqwest::redirect::Policy::limited(10))
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            mount_path: config.mount_path.clone(),
            seq: AtomicU64::new(0),
        }
    }

    /// Fetch every image and store it under `<root>/assets/`, named by a
    /// time-based unique token with an extension inferred from the
    /// response content type.
    pub async fn relocate_images(
        &self,
        images: &[ImageRef],
        config: &MirrorConfig,
    ) -> Result<Relocation, MirrorError> {
        let asset_dir = config.asset_dir();
        tokio::fs::create_dir_all(&asset_dir).await?;

        let mut out = Relocation::default();
        for image in images {
            let url = &image.best_src;
            if out.rewrites.contains_key(url) {
                continue;
            }
            match fetch_asset(&self.client, url).await {
                Ok(asset) => {
                    let ext = extension_for(asset.content_type.as_deref());
                    let name = format!(
                        "img_{}_{}{ext}",
                        chrono::Utc::now().timestamp_millis(),
                        self.seq.fetch_add(1, Ordering::Relaxed)
                    );
                    tokio::fs::write(asset_dir.join(&name), &asset.bytes).await?;
                    debug!("Relocated image {url} -> assets/{name}");
                    out.rewrites
                        .insert(url.clone(), format!("{}/assets/{name}", self.mount_path));
                    out.records.push(AssetRecord {
                        remote_url: url.clone(),
                        local_path: format!("assets/{name}"),
                        kind: AssetKind::Image,
                    });
                }
                Err(e) => {
                    // Page keeps referencing the remote resource.
                    warn!("{e}; keeping remote reference");
                    out.rewrites.insert(url.clone(), url.clone());
                }
            }
        }
        Ok(out)
    }

    /// Fetch every external script into `<root>/assets/js/`, named by the
    /// remote path's basename. Distinct remote scripts sharing a basename
    /// overwrite each other; unresolved by design.
    pub async fn relocate_scripts(
        &self,
        scripts: &[ScriptRef],
        config: &MirrorConfig,
    ) -> Result<Relocation, MirrorError> {
        let script_dir = config.script_dir();
        tokio::fs::create_dir_all(&script_dir).await?;

        let mut out = Relocation::default();
        for script in scripts {
            let url = &script.src;
            if out.rewrites.contains_key(url) {
                continue;
            }
            match fetch_asset(&self.client, url).await {
                Ok(asset) => {
                    let name = script_basename(url);
                    tokio::fs::write(script_dir.join(&name), &asset.bytes).await?;
                    debug!("Relocated script {url} -> assets/js/{name}");
                    out.rewrites
                        .insert(url.clone(), format!("{}/assets/js/{name}", self.mount_path));
                    out.records.push(AssetRecord {
                        remote_url: url.clone(),
                        local_path: format!("assets/js/{name}"),
                        kind: AssetKind::Script,
                    });
                }
                Err(e) => {
                    warn!("{e}; keeping remote reference");
                    out.rewrites.insert(url.clone(), url.clone());
                }
            }
        }
        Ok(out)
    }

    /// Fetch every stylesheet and concatenate their text, each prefixed
    /// with a source-URL comment. The result is inlined as one `<style>`
    /// block by the link rewriter; sheets that fail to fetch are skipped
    /// and their `<link>` tags keep pointing at the remote resource.
    pub async fn collect_stylesheets(&self, stylesheets: &[StylesheetRef]) -> String {
        let mut combined = String::new();
        for sheet in stylesheets {
            match fetch_asset(&self.client, &sheet.href).await {
                Ok(asset) => {
                    let css = String::from_utf8_lossy(&asset.bytes);
                    combined.push_str(&format!("/* source: {} */\n", sheet.href));
                    combined.push_str(&css);
                    combined.push('\n');
                }
                Err(e) => {
                    warn!("{e}; stylesheet left remote");
                }
            }
        }
        combined
    }
}

fn extension_for(content_type: Option<&str>) -> &'static str {
    match content_type {
        Some(ct) if ct.contains("png") => ".png",
        Some(ct) if ct.contains("jpeg") || ct.contains("jpg") => ".jpg",
        _ => ".jpg",
    }
}

fn script_basename(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|segments| segments.last().map(|s| s.to_string()))
        })
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "script.js".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(root: &std::path::Path) -> MirrorConfig {
        MirrorConfig::default().with_output_dir(root)
    }

    #[test]
    fn extension_follows_content_type() {
        assert_eq!(extension_for(Some("image/png")), ".png");
        assert_eq!(extension_for(Some("image/jpeg")), ".jpg");
        assert_eq!(extension_for(Some("application/octet-stream")), ".jpg");
        assert_eq!(extension_for(None), ".jpg");
    }

    #[test]
    fn script_basename_from_remote_path() {
        assert_eq!(script_basename("https://a.test/js/app.min.js"), "app.min.js");
        assert_eq!(script_basename("https://a.test/"), "script.js");
    }

    #[tokio::test]
    async fn relocated_image_lands_in_asset_dir() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/logo.png"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(vec![0x89u8, 0x50, 0x4e, 0x47])
                    .insert_header("content-type", "image/png"),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let relocator = AssetRelocator::new(&config);

        let images = vec![ImageRef {
            best_src: format!("{}/logo.png", server.uri()),
            src: Some("/logo.png".to_string()),
            srcset: None,
        }];
        let out = relocator.relocate_images(&images, &config).await.unwrap();

        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].kind, AssetKind::Image);
        assert!(out.records[0].local_path.ends_with(".png"));

        let local = &out.rewrites[&images[0].best_src];
        assert!(local.starts_with("/mirror/assets/img_"), "got {local}");
        assert!(dir.path().join(&out.records[0].local_path).exists());
    }

    #[tokio::test]
    async fn failed_image_fetch_falls_back_to_remote_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing.png"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let relocator = AssetRelocator::new(&config);

        let remote = format!("{}/missing.png", server.uri());
        let images = vec![ImageRef {
            best_src: remote.clone(),
            src: None,
            srcset: None,
        }];
        let out = relocator.relocate_images(&images, &config).await.unwrap();

        assert!(out.records.is_empty());
        assert_eq!(out.rewrites[&remote], remote);
    }

    #[tokio::test]
    async fn scripts_keep_their_basename() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/static/app.js"))
            .respond_with(ResponseTemplate::new(200).set_body_string("console.log(1)"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let relocator = AssetRelocator::new(&config);

        let scripts = vec![ScriptRef {
            src: format!("{}/static/app.js", server.uri()),
        }];
        let out = relocator.relocate_scripts(&scripts, &config).await.unwrap();

        assert_eq!(out.rewrites[&scripts[0].src], "/mirror/assets/js/app.js");
        assert!(dir.path().join("assets/js/app.js").exists());
    }

    #[tokio::test]
    async fn stylesheets_concatenate_in_order_with_source_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a.css"))
            .respond_with(ResponseTemplate::new(200).set_body_string("body{margin:0}"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/b.css"))
            .respond_with(ResponseTemplate::new(200).set_body_string("h1{color:red}"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/broken.css"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let relocator = AssetRelocator::new(&test_config(dir.path()));

        let sheets = vec![
            StylesheetRef {
                href: format!("{}/a.css", server.uri()),
            },
            StylesheetRef {
                href: format!("{}/broken.css", server.uri()),
            },
            StylesheetRef {
                href: format!("{}/b.css", server.uri()),
            },
        ];
        let css = relocator.collect_stylesheets(&sheets).await;

        let a_pos = css.find("body{margin:0}").unwrap();
        let b_pos = css.find("h1{color:red}").unwrap();
        assert!(a_pos < b_pos);
        assert!(css.contains(&format!("/* source: {}/a.css */", server.uri())));
        assert!(!css.contains("broken.css */"));
    }
}
