//! Multi-stage, string-level rewriting of a rendered document so every
//! internal reference resolves inside the mirror. The browser serializer
//! emits double-quoted attributes, which is what these patterns match.

use crate::target::CrawlTarget;
use log::debug;
use regex::{Captures, Regex};
use std::collections::HashMap;
use url::Url;

fn regex(pattern: &str) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            debug!("Bad rewrite pattern {pattern}: {e}");
            None
        }
    }
}

/// Pick the widest candidate from a `srcset` attribute, mirroring how
/// the renderer chose the effective image source.
fn best_from_srcset(srcset: &str) -> Option<String> {
    let mut best = None;
    let mut best_width = -1.0f64;
    for part in srcset.split(',') {
        let mut fields = part.split_whitespace();
        let Some(candidate) = fields.next() else {
            continue;
        };
        let width = fields
            .next()
            .and_then(|d| d.trim_end_matches(|c: char| c.is_alphabetic()).parse().ok())
            .unwrap_or(0.0);
        if width >= best_width {
            best_width = width;
            best = Some(candidate.to_string());
        }
    }
    best
}

fn attr_value<'a>(tag: &'a str, attr: &str) -> Option<&'a str> {
    let re = regex(&format!(r#"(?i)\b{attr}\s*=\s*"([^"]*)""#))?;
    re.captures(tag)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

fn set_attr(tag: &str, attr: &str, value: &str) -> String {
    let Some(re) = regex(&format!(r#"(?i)\b({attr}\s*=\s*)"[^"]*""#)) else {
        return tag.to_string();
    };
    re.replace(tag, format!(r#"${{1}}"{value}""#)).to_string()
}

fn drop_attr(tag: &str, attr: &str) -> String {
    let Some(re) = regex(&format!(r#"(?i)\s+{attr}\s*=\s*"[^"]*""#)) else {
        return tag.to_string();
    };
    re.replace(tag, "").to_string()
}

/// Rewrite every `<img>` whose effective source appears in the rewrite
/// map, in document order, and strip `srcset` from rewritten tags so the
/// browser cannot re-resolve to a remote high-DPI variant.
pub fn rewrite_image_srcs(
    html: &str,
    page_url: &Url,
    rewrites: &HashMap<String, String>,
) -> String {
    let Some(re) = regex(r"(?i)<img\b[^>]*>") else {
        return html.to_string();
    };
    re.replace_all(html, |caps: &Captures| {
        let tag = &caps[0];
        let src = attr_value(tag, "src");
        let srcset = attr_value(tag, "srcset");
        let candidate = srcset
            .and_then(best_from_srcset)
            .or_else(|| src.map(|s| s.to_string()));
        let Some(candidate) = candidate else {
            return tag.to_string();
        };
        let Ok(absolute) = page_url.join(&candidate) else {
            return tag.to_string();
        };
        let Some(new_src) = rewrites.get(absolute.as_str()) else {
            return tag.to_string();
        };
        let tag = set_attr(tag, "src", new_src);
        drop_attr(&tag, "srcset")
    })
    .to_string()
}

/// Point `<script src>` tags at their relocated local copies.
pub fn rewrite_script_srcs(
    html: &str,
    page_url: &Url,
    rewrites: &HashMap<String, String>,
) -> String {
    let Some(re) = regex(r"(?i)<script\b[^>]*>") else {
        return html.to_string();
    };
    re.replace_all(html, |caps: &Captures| {
        let tag = &caps[0];
        let Some(src) = attr_value(tag, "src") else {
            return tag.to_string();
        };
        let Ok(absolute) = page_url.join(src) else {
            return tag.to_string();
        };
        match rewrites.get(absolute.as_str()) {
            Some(local) => set_attr(tag, "src", local),
            None => tag.to_string(),
        }
    })
    .to_string()
}

/// Replace every `<script>` element, inline ones included, with an HTML
/// comment wrapping its serialized form. Script execution is disabled in
/// the mirror while the original markup stays inspectable.
pub fn comment_out_scripts(html: &str) -> String {
    let Some(re) = regex(r"(?is)<script\b[^>]*>.*?</script>") else {
        return html.to_string();
    };
    re.replace_all(html, |caps: &Captures| {
        // "--" would terminate the comment early.
        let body = caps[0].replace("--", "- -");
        format!("<!-- {body} -->")
    })
    .to_string()
}

/// Rewrite same-origin anchors to `<mount>/<pathname>.html<#fragment>`;
/// the fragment survives, the query does not. Cross-origin anchors are
/// left untouched.
pub fn rewrite_anchors(html: &str, origin: &CrawlTarget, page_url: &Url, mount: &str) -> String {
    let Some(re) = regex(r"(?i)<a\b[^>]*>") else {
        return html.to_string();
    };
    re.replace_all(html, |caps: &Captures| {
        let tag = &caps[0];
        let Some(href) = attr_value(tag, "href") else {
            return tag.to_string();
        };
        let Ok(absolute) = page_url.join(href) else {
            return tag.to_string();
        };
        if !origin.same_origin(&absolute) {
            return tag.to_string();
        }
        let Ok(target) = CrawlTarget::normalize(absolute.as_str()) else {
            return tag.to_string();
        };
        let mut local = mirror_href(mount, &target);
        if let Some(fragment) = absolute.fragment() {
            local.push('#');
            local.push_str(fragment);
        }
        set_attr(tag, "href", &local)
    })
    .to_string()
}

/// Mirror path for a target: `<mount>/<pathname>.html`, root maps to
/// `<mount>/index.html`.
pub fn mirror_href(mount: &str, target: &CrawlTarget) -> String {
    let path = target.pathname().trim_start_matches('/');
    if path.is_empty() {
        format!("{mount}/index.html")
    } else {
        format!("{mount}/{path}.html")
    }
}

/// Inject a `<base href="<mount>/">` tag so relative resolution inside
/// the mirror matches the local root.
pub fn inject_base(html: &str, mount: &str) -> String {
    let base = format!(r#"<base href="{mount}/">"#);
    if let Some(re) = regex(r"(?i)<head\b[^>]*>") {
        if let Some(m) = re.find(html) {
            let mut out = String::with_capacity(html.len() + base.len());
            out.push_str(&html[..m.end()]);
            out.push_str(&base);
            out.push_str(&html[m.end()..]);
            return out;
        }
    }
    format!("{base}{html}")
}

/// Inline collected stylesheet text as a single `<style>` block placed
/// before `</head>`.
pub fn inline_styles(html: &str, css: &str) -> String {
    if css.is_empty() {
        return html.to_string();
    }
    let block = format!("<style>\n{css}</style>");
    if let Some(pos) = html.to_ascii_lowercase().find("</head>") {
        let mut out = String::with_capacity(html.len() + block.len());
        out.push_str(&html[..pos]);
        out.push_str(&block);
        out.push_str(&html[pos..]);
        out
    } else {
        format!("{html}{block}")
    }
}
