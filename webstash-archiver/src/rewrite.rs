//! Rewrites intra-site references inside captured markup so a snapshot
//! browses correctly from local storage.
//!
//! Same-origin references become `prefix + path` (the prefix is the
//! relative distance from the page's saved location back to the capture
//! root); cross-origin references stay absolute and untouched. Rewriting
//! is purely document-local and idempotent per occurrence, so it runs
//! synchronously inside the fetch-and-save step. A reference that fails
//! to parse is left exactly as found - never fatal to the page.

use regex::{Captures, Regex};
use scraper::{Html, Node};
use std::sync::LazyLock;
use tracing::warn;
use url::Url;

use crate::urls::{self, UrlOutcome};

/// (tag, attribute) pairs whose values may reference same-origin
/// resources.
const URL_ATTRIBUTES: &[(&str, &str)] = &[
    ("a", "href"),
    ("link", "href"),
    ("script", "src"),
    ("img", "src"),
    ("source", "src"),
    ("video", "src"),
    ("audio", "src"),
    ("iframe", "src"),
    ("form", "action"),
];

/// Social-preview meta keys whose `content` attribute carries a URL.
const META_URL_KEYS: &[&str] = &["og:image", "og:url", "twitter:image", "twitter:url"];

static CSS_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"url\(\s*['"]?([^'"()]+)['"]?\s*\)"#).expect("hardcoded regex pattern is valid")
});

/// Rewrite every known reference in `html` (a page fetched from
/// `page_url`) to point at the snapshot-local copy.
pub fn rewrite_html(html: &str, page_url: &str, prefix: &str) -> String {
    let mut document = Html::parse_document(html);
    let node_ids: Vec<_> = document.tree.nodes().map(|node| node.id()).collect();

    // Text inside <style> elements goes through the CSS pass. Work out the
    // replacements before taking mutable borrows on the tree.
    let mut style_edits = Vec::new();
    for &id in &node_ids {
        let Some(node) = document.tree.get(id) else { continue };
        let Node::Text(text) = node.value() else { continue };
        let in_style = node.parent().is_some_and(|parent| match parent.value() {
            Node::Element(element) => element.name() == "style",
            _ => false,
        });
        if in_style {
            let current: &str = &text.text;
            let rewritten = rewrite_css_urls(current, page_url, prefix);
            if rewritten != current {
                style_edits.push((id, rewritten));
            }
        }
    }
    for (id, rewritten) in style_edits {
        if let Some(mut node) = document.tree.get_mut(id)
            && let Node::Text(text) = node.value()
        {
            text.text = rewritten.as_str().into();
        }
    }

    for id in node_ids {
        let Some(mut node) = document.tree.get_mut(id) else { continue };
        let Node::Element(element) = node.value() else { continue };
        let tag = element.name().to_string();

        if tag == "meta" {
            let key = element
                .attr("property")
                .or_else(|| element.attr("name"))
                .map(str::to_string);
            if key.as_deref().is_some_and(|key| META_URL_KEYS.contains(&key)) {
                for (name, value) in element.attrs.iter_mut() {
                    if &*name.local == "content"
                        && let Some(local) = localize(value, page_url, prefix)
                    {
                        *value = local.as_str().into();
                    }
                }
            }
            continue;
        }

        let rewritable = URL_ATTRIBUTES
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|(_, attribute)| *attribute);
        for (name, value) in element.attrs.iter_mut() {
            let attribute = &*name.local;
            if Some(attribute) == rewritable {
                if let Some(local) = localize(value, page_url, prefix) {
                    *value = local.as_str().into();
                }
            } else if attribute == "srcset" && (tag == "img" || tag == "source") {
                let rewritten = rewrite_srcset(value, page_url, prefix);
                *value = rewritten.as_str().into();
            }
        }
    }

    document.html()
}

/// Rewrite `url(...)` references in stylesheet text. Used for inline
/// `<style>` blocks during page rewriting.
pub fn rewrite_css_urls(css: &str, page_url: &str, prefix: &str) -> String {
    CSS_URL
        .replace_all(css, |caps: &Captures| {
            match localize(caps[1].trim(), page_url, prefix) {
                Some(local) => format!("url('{local}')"),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// The URL tokens referenced by `url(...)` in stylesheet text, in document
/// order. The crawler feeds these into the frontier as assets.
pub fn css_url_candidates(css: &str) -> Vec<String> {
    CSS_URL
        .captures_iter(css)
        .map(|caps| caps[1].trim().to_string())
        .collect()
}

/// Rewrite each comma-separated srcset candidate. Only the URL token is
/// touched; width/density descriptors are preserved verbatim.
fn rewrite_srcset(srcset: &str, page_url: &str, prefix: &str) -> String {
    srcset
        .split(',')
        .map(|candidate| {
            let trimmed = candidate.trim();
            let mut parts = trimmed.split_whitespace();
            let Some(url_token) = parts.next() else {
                return trimmed.to_string();
            };
            let descriptor = parts.collect::<Vec<_>>().join(" ");
            match localize(url_token, page_url, prefix) {
                Some(local) if descriptor.is_empty() => local,
                Some(local) => format!("{local} {descriptor}"),
                None => trimmed.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Map one reference found on `page_url` to a snapshot-local relative
/// path: `prefix` plus the resolved URL's path, query and fragment with
/// the leading slash stripped. `None` means the occurrence stays as-is,
/// either because it is cross-origin or because it did not parse.
fn localize(reference: &str, page_url: &str, prefix: &str) -> Option<String> {
    let resolved = match urls::resolve(reference, page_url) {
        UrlOutcome::Resolved(url) => url,
        UrlOutcome::Fallback { original, reason } => {
            warn!("could not resolve {original} for rewriting: {reason}");
            return None;
        }
    };
    if !urls::same_origin(&resolved, page_url) {
        return None;
    }

    let parsed = Url::parse(&resolved).ok()?;
    let mut portion = parsed.path().to_string();
    if let Some(query) = parsed.query() {
        portion.push('?');
        portion.push_str(query);
    }
    if let Some(fragment) = parsed.fragment() {
        portion.push('#');
        portion.push_str(fragment);
    }
    let portion = portion.strip_prefix('/').unwrap_or(&portion);
    Some(format!("{prefix}{portion}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE_URL: &str = "https://example.com/blog/post/";

    #[test]
    fn test_rewrites_same_origin_links_and_assets() {
        let html = r#"<html><head>
            <link rel="stylesheet" href="/css/style.css">
            <script src="/js/app.js"></script>
        </head><body>
            <a href="/about">About</a>
            <img src="/images/logo.png">
        </body></html>"#;

        let rewritten = rewrite_html(html, PAGE_URL, "../../");
        assert!(rewritten.contains(r#"href="../../css/style.css""#));
        assert!(rewritten.contains(r#"src="../../js/app.js""#));
        assert!(rewritten.contains(r#"href="../../about""#));
        assert!(rewritten.contains(r#"src="../../images/logo.png""#));
    }

    #[test]
    fn test_leaves_cross_origin_references_absolute() {
        let html = r#"<html><body>
            <a href="https://other.example.net/page">external</a>
            <img src="https://cdn.unrelated.org/pic.png">
        </body></html>"#;

        let rewritten = rewrite_html(html, PAGE_URL, "../../");
        assert!(rewritten.contains(r#"href="https://other.example.net/page""#));
        assert!(rewritten.contains(r#"src="https://cdn.unrelated.org/pic.png""#));
    }

    #[test]
    fn test_resolves_relative_references_against_page() {
        let html = r#"<a href="../archive">archive</a>"#;
        let rewritten = rewrite_html(html, PAGE_URL, "../../");
        // /blog/post/../archive resolves to /blog/archive
        assert!(rewritten.contains(r#"href="../../blog/archive""#));
    }

    #[test]
    fn test_preserves_query_and_fragment_in_rewritten_path() {
        let html = r#"<a href="/search?q=rust#results">search</a>"#;
        let rewritten = rewrite_html(html, PAGE_URL, "../../");
        assert!(rewritten.contains(r##"href="../../search?q=rust#results""##));
    }

    #[test]
    fn test_rewrites_form_action_and_iframe() {
        let html = r#"<form action="/submit"></form><iframe src="/embed"></iframe>"#;
        let rewritten = rewrite_html(html, PAGE_URL, "../../");
        assert!(rewritten.contains(r#"action="../../submit""#));
        assert!(rewritten.contains(r#"src="../../embed""#));
    }

    #[test]
    fn test_rewrites_social_preview_meta_only() {
        let html = r#"<html><head>
            <meta property="og:image" content="/images/card.png">
            <meta name="twitter:url" content="https://example.com/blog/post/">
            <meta name="description" content="/not-a-url-key">
        </head></html>"#;

        let rewritten = rewrite_html(html, PAGE_URL, "../../");
        assert!(rewritten.contains(r#"content="../../images/card.png""#));
        assert!(rewritten.contains(r#"content="../../blog/post/""#));
        assert!(rewritten.contains(r#"content="/not-a-url-key""#));
    }

    #[test]
    fn test_rewrites_srcset_candidates_preserving_descriptors() {
        let html = r#"<img srcset="/img/small.png 480w, /img/large.png 2x, https://cdn.unrelated.org/x.png 800w">"#;
        let rewritten = rewrite_html(html, PAGE_URL, "../../");
        assert!(rewritten.contains("../../img/small.png 480w"));
        assert!(rewritten.contains("../../img/large.png 2x"));
        assert!(rewritten.contains("https://cdn.unrelated.org/x.png 800w"));
    }

    #[test]
    fn test_rewrites_inline_style_urls() {
        let html = r#"<style>body { background: url('/images/bg.png'); }
            .hero { background-image: url("https://cdn.unrelated.org/far.png"); }</style>"#;
        let rewritten = rewrite_html(html, PAGE_URL, "../../");
        assert!(rewritten.contains("url('../../images/bg.png')"));
        assert!(rewritten.contains("https://cdn.unrelated.org/far.png"));
    }

    #[test]
    fn test_rewrite_css_urls_directly() {
        let css = "div { background: url( '/a/b.png' ); }";
        let rewritten = rewrite_css_urls(css, PAGE_URL, "./");
        assert_eq!(rewritten, "div { background: url('./a/b.png'); }");
    }

    #[test]
    fn test_css_url_candidates() {
        let css = r#"a { background: url('/one.png'); } b { background: url("two.png"); }"#;
        assert_eq!(css_url_candidates(css), vec!["/one.png", "two.png"]);
    }

    #[test]
    fn test_unparseable_reference_left_unchanged() {
        // A page URL that cannot serve as a join base makes every
        // occurrence fall back untouched.
        let css = "div { background: url('/a.png'); }";
        let rewritten = rewrite_css_urls(css, "not-a-valid-url", "./");
        assert_eq!(rewritten, css);
    }

    #[test]
    fn test_empty_prefix_for_root_level_page() {
        let html = r#"<link rel="stylesheet" href="/style.css">"#;
        let rewritten = rewrite_html(html, "https://example.com/", "");
        assert!(rewritten.contains(r#"href="style.css""#));
    }
}
