use crate::error::MirrorError;
use std::path::{Path, PathBuf};
use url::Url;

/// A normalized URL identifying one page to mirror.
///
/// Fragment and query string are stripped and a single trailing slash is
/// removed, so URL variants that differ only in those components map to
/// the same target. Identity is the normalized string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CrawlTarget(Url);

impl CrawlTarget {
    /// Normalize a raw URL string into a crawl target.
    ///
    /// Rejects anything that is not http(s) or fails to parse.
    pub fn normalize(raw: &str) -> Result<Self, MirrorError> {
        let mut url = Url::parse(raw).map_err(|e| MirrorError::InvalidUrl(format!("{raw}: {e}")))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(MirrorError::InvalidUrl(format!(
                "unsupported scheme '{}' in {raw}",
                url.scheme()
            )));
        }
        if url.host_str().is_none() {
            return Err(MirrorError::InvalidUrl(format!("{raw} has no host")));
        }

        url.set_fragment(None);
        url.set_query(None);

        let path = url.path().to_string();
        if path.len() > 1 {
            if let Some(stripped) = path.strip_suffix('/') {
                url.set_path(stripped);
            }
        }

        Ok(Self(url))
    }

    /// The normalized string form, used as the dedup key.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn url(&self) -> &Url {
        &self.0
    }

    /// Path component of the target, always starting with `/`.
    pub fn pathname(&self) -> &str {
        self.0.path()
    }

    /// Whether `other` shares scheme, host and port with this target.
    pub fn same_origin(&self, other: &Url) -> bool {
        self.0.scheme() == other.scheme()
            && self.0.host_str() == other.host_str()
            && self.0.port_or_known_default() == other.port_or_known_default()
    }

    /// Map this target to its on-disk mirror document path.
    ///
    /// `/` maps to `<root>/index.html`, any other pathname to
    /// `<root>/<pathname>.html`. Not injective for every conceivable
    /// URL pair, but unambiguous for realistic site structures.
    pub fn local_path(&self, root: &Path) -> PathBuf {
        let path = self.pathname().trim_start_matches('/');
        if path.is_empty() {
            root.join("index.html")
        } else {
            root.join(format!("{path}.html"))
        }
    }
}

impl std::fmt::Display for CrawlTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fragment_and_query() {
        let a = CrawlTarget::normalize("https://example.test/page?q=1#sec").unwrap();
        let b = CrawlTarget::normalize("https://example.test/page").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn strips_single_trailing_slash() {
        let a = CrawlTarget::normalize("https://example.test/docs/").unwrap();
        assert_eq!(a.pathname(), "/docs");
    }

    #[test]
    fn root_path_is_preserved() {
        let a = CrawlTarget::normalize("https://example.test/").unwrap();
        assert_eq!(a.pathname(), "/");
    }

    #[test]
    fn normalization_is_idempotent() {
        let inputs = [
            "https://example.test/",
            "https://example.test/a/b/?x=2#frag",
            "http://example.test:8080/path/",
        ];
        for raw in inputs {
            let once = CrawlTarget::normalize(raw).unwrap();
            let twice = CrawlTarget::normalize(once.as_str()).unwrap();
            assert_eq!(once, twice, "not idempotent for {raw}");
        }
    }

    #[test]
    fn rejects_unparsable_and_non_http() {
        assert!(CrawlTarget::normalize("not a url").is_err());
        assert!(CrawlTarget::normalize("ftp://example.test/file").is_err());
        assert!(CrawlTarget::normalize("data:text/plain,hi").is_err());
    }

    #[test]
    fn local_path_maps_root_to_index() {
        let t = CrawlTarget::normalize("https://example.test/").unwrap();
        assert_eq!(t.local_path(Path::new("/m")), PathBuf::from("/m/index.html"));
    }

    #[test]
    fn local_path_appends_html() {
        let t = CrawlTarget::normalize("https://example.test/about").unwrap();
        assert_eq!(t.local_path(Path::new("/m")), PathBuf::from("/m/about.html"));

        let nested = CrawlTarget::normalize("https://example.test/docs/intro").unwrap();
        assert_eq!(
            nested.local_path(Path::new("/m")),
            PathBuf::from("/m/docs/intro.html")
        );
    }

    #[test]
    fn same_origin_checks_scheme_host_port() {
        let t = CrawlTarget::normalize("https://example.test/").unwrap();
        assert!(t.same_origin(&Url::parse("https://example.test/other").unwrap()));
        assert!(!t.same_origin(&Url::parse("http://example.test/other").unwrap()));
        assert!(!t.same_origin(&Url::parse("https://cdn.example.test/x").unwrap()));
        assert!(!t.same_origin(&Url::parse("https://example.test:8443/x").unwrap()));
    }
}
