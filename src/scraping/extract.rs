//! URL extraction over one DOM snapshot.
//!
//! The results markup is unversioned and inconsistent across elements, so a
//! single selector is never enough. Extraction applies a fixed priority
//! order of strategies — explicit link parameters first, then attribute
//! probes over image elements from the narrowest plausible scope down to
//! bare `img` tags — and keeps only candidates that survive the scheme /
//! length / vocabulary checks. Every probe is an `Option`-returning read;
//! a malformed element yields nothing and is skipped.

use std::collections::HashSet;
use std::sync::OnceLock;

use aho_corasick::AhoCorasick;
use scraper::{ElementRef, Html, Selector};
use url::Url;

/// Candidates shorter than this are placeholder chrome, not image sources.
pub const MIN_CANDIDATE_LEN: usize = 30;

/// Substrings identifying decorative chrome: avatars, logos, icons, UI
/// buttons, and the reverse-search trigger thumbnail (`cbir`).
const EXCLUDED_FRAGMENTS: &[&str] = &[
    "avatar", "logo", "icon", "favicon", "sprite", "button", "btn-", "cbir",
];

/// Attribute probe order for strategy 2b: direct source, lazy-load source,
/// then the generic data attributes some result variants use.
const SOURCE_ATTRIBUTES: &[&str] = &["src", "data-src", "data-image", "data-url"];

/// Key names the structured `data-bem` attribute is known to hide the true
/// source under.
const BEM_URL_KEYS: &[&str] = &["url", "img_url", "origin_url", "preview_url"];

/// CSS scopes tried in order, narrowest (result-item thumbs) to broadest
/// (bare image tags). Bare tags attract the most avatars and icons, which
/// is what the exclusion vocabulary is for.
const IMAGE_SCOPES: &[&str] = &[
    ".serp-item__thumb, .serp-item img",
    ".SimpleImage, .ContentImage-Image",
    "img.MMImage-Origin",
    "img",
];

static EXCLUDE_MATCHER: OnceLock<AhoCorasick> = OnceLock::new();

fn exclude_matcher() -> &'static AhoCorasick {
    EXCLUDE_MATCHER.get_or_init(|| {
        AhoCorasick::builder()
            .ascii_case_insensitive(true)
            .build(EXCLUDED_FRAGMENTS)
            .expect("valid exclusion patterns")
    })
}

/// Does `url` satisfy the candidate invariants: HTTP(S) scheme, plausible
/// length, free of the exclusion vocabulary?
pub fn is_candidate(url: &str) -> bool {
    (url.starts_with("http://") || url.starts_with("https://"))
        && url.len() > MIN_CANDIDATE_LEN
        && !exclude_matcher().is_match(url)
}

/// Pull the decoded `img_url` query parameter out of an href, resolving
/// relative hrefs against the site base.
fn img_url_param(href: &str) -> Option<String> {
    if !href.contains("img_url") {
        return None;
    }
    let parsed = Url::parse(href).ok().or_else(|| {
        Url::parse(&format!("{}/", crate::core::config::search_base_url()))
            .ok()?
            .join(href)
            .ok()
    })?;
    parsed
        .query_pairs()
        .find(|(k, v)| k == "img_url" && !v.is_empty())
        .map(|(_, v)| v.to_string())
}

/// The reverse-search trigger thumbnail is markup chrome, not a result.
fn is_reverse_search_trigger(el: &ElementRef<'_>) -> bool {
    el.value()
        .attr("class")
        .map(|c| c.to_ascii_lowercase().contains("cbir"))
        .unwrap_or(false)
}

/// Recursive search of a `data-bem` JSON blob for the first known URL key.
/// Direct keys win over nested ones at every level.
fn bem_url(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Object(map) => {
            for key in BEM_URL_KEYS {
                if let Some(serde_json::Value::String(s)) = map.get(*key) {
                    if !s.is_empty() {
                        return Some(s.clone());
                    }
                }
            }
            map.values().find_map(bem_url)
        }
        serde_json::Value::Array(items) => items.iter().find_map(bem_url),
        _ => None,
    }
}

fn is_absolute_http(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// Probe one image element for a source URL, first present wins:
/// plain/lazy/data attributes, then srcset, then the structured `data-bem`
/// blob, then the containing element's `img_url` link parameter.
fn probe_element(el: &ElementRef<'_>) -> Option<String> {
    for attr in SOURCE_ATTRIBUTES {
        if let Some(v) = el.value().attr(attr) {
            if is_absolute_http(v) {
                return Some(v.to_string());
            }
        }
    }

    // First URL token of the first srcset candidate.
    if let Some(srcset) = el.value().attr("srcset") {
        if let Some(first) = srcset.split(',').next() {
            if let Some(token) = first.split_whitespace().next() {
                if is_absolute_http(token) {
                    return Some(token.to_string());
                }
            }
        }
    }

    // A parse failure here is non-fatal: this probe yields nothing and the
    // parent-href probe still runs.
    if let Some(bem) = el.value().attr("data-bem") {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(bem) {
            if let Some(url) = bem_url(&value) {
                return Some(url);
            }
        }
    }

    el.parent()
        .and_then(ElementRef::wrap)
        .and_then(|parent| parent.value().attr("href").and_then(img_url_param))
}

/// Extract fresh candidate URLs from one snapshot.
///
/// Idempotent for an unchanged snapshot. Returns only candidates not in
/// `already_found`, and stops as soon as `remaining_quota` fresh ones are
/// collected.
pub fn extract(
    doc: &Html,
    already_found: &HashSet<String>,
    remaining_quota: usize,
) -> HashSet<String> {
    let mut fresh = HashSet::new();
    if remaining_quota == 0 {
        return fresh;
    }

    let offer = |url: String, fresh: &mut HashSet<String>| -> bool {
        if is_candidate(&url) && !already_found.contains(&url) {
            fresh.insert(url);
        }
        fresh.len() >= remaining_quota
    };

    // Strategy 1: anchors carrying an explicit img_url parameter — the
    // least likely to be decorative chrome.
    if let Ok(anchor_sel) = Selector::parse("a[href]") {
        for a in doc.select(&anchor_sel) {
            let Some(url) = a.value().attr("href").and_then(img_url_param) else {
                continue;
            };
            if offer(url, &mut fresh) {
                return fresh;
            }
        }
    }

    // Strategy 2: attribute mining over image elements, narrow scopes first.
    for scope in IMAGE_SCOPES {
        let Ok(sel) = Selector::parse(scope) else {
            continue;
        };
        for el in doc.select(&sel) {
            if is_reverse_search_trigger(&el) {
                continue;
            }
            let Some(url) = probe_element(&el) else {
                continue;
            };
            if offer(url, &mut fresh) {
                return fresh;
            }
        }
    }

    fresh
}

#[cfg(test)]
mod tests {
    use super::*;

    fn long_url(name: &str) -> String {
        format!("https://images.example.net/full/resolution/{}.jpg", name)
    }

    fn extract_all(html: &str, quota: usize) -> HashSet<String> {
        let doc = Html::parse_document(html);
        extract(&doc, &HashSet::new(), quota)
    }

    #[test]
    fn test_candidate_invariants() {
        assert!(is_candidate(&long_url("a")));
        // Scheme required.
        assert!(!is_candidate("ftp://images.example.net/some/very/long/path.jpg"));
        assert!(!is_candidate("//images.example.net/some/very/long/path.jpg"));
        // Too short to be a real image source.
        assert!(!is_candidate("https://e.net/a.jpg"));
        // Exclusion vocabulary, case-insensitive.
        assert!(!is_candidate("https://images.example.net/user/Avatar/large/photo.jpg"));
        assert!(!is_candidate("https://cdn.example.net/assets/site-logo-header-2x.png"));
        assert!(!is_candidate("https://cdn.example.net/ui/icons/chevron-right-large.svg"));
        assert!(!is_candidate("https://cdn.example.net/cbir/thumb/0123456789abcdef.jpg"));
    }

    #[test]
    fn test_direct_and_lazy_attributes() {
        let html = format!(
            r#"<div class="serp-item"><img class="serp-item__thumb" src="{}"></div>
               <div class="serp-item"><img class="serp-item__thumb" data-src="{}"></div>"#,
            long_url("direct"),
            long_url("lazy"),
        );
        let found = extract_all(&html, 10);
        assert!(found.contains(&long_url("direct")));
        assert!(found.contains(&long_url("lazy")));
    }

    #[test]
    fn test_scenario_a_avatar_rejected() {
        // 3 valid image elements and 1 avatar-classed element, quota 10.
        let html = format!(
            r#"<img class="SimpleImage" src="{}">
               <img class="SimpleImage" src="{}">
               <img class="SimpleImage" src="{}">
               <img src="https://images.example.net/profile/avatar/user-98127312.jpg">"#,
            long_url("one"),
            long_url("two"),
            long_url("three"),
        );
        let found = extract_all(&html, 10);
        assert_eq!(found.len(), 3);
    }

    #[test]
    fn test_reverse_search_trigger_skipped() {
        let html = format!(
            r#"<img class="CbirPreview-Thumb" src="{}">
               <img class="SimpleImage" src="{}">"#,
            long_url("trigger"),
            long_url("result"),
        );
        let found = extract_all(&html, 10);
        assert_eq!(found.len(), 1);
        assert!(found.contains(&long_url("result")));
    }

    #[test]
    fn test_link_mining_decodes_img_url_param() {
        let target = long_url("linked");
        let encoded: String = url::form_urlencoded::byte_serialize(target.as_bytes()).collect();
        let html = format!(
            r#"<a href="/images/search?pos=3&img_url={}&rpt=simage">open</a>"#,
            encoded
        );
        let found = extract_all(&html, 10);
        assert_eq!(found.len(), 1);
        assert!(found.contains(&target));
    }

    #[test]
    fn test_srcset_first_candidate() {
        let html = format!(
            r#"<img class="ContentImage-Image" srcset="{} 1x, {} 2x">"#,
            long_url("small"),
            long_url("large"),
        );
        let found = extract_all(&html, 10);
        assert_eq!(found.len(), 1);
        assert!(found.contains(&long_url("small")));
    }

    #[test]
    fn test_data_bem_json_probe() {
        let target = long_url("structured");
        let html = format!(
            r#"<img class="serp-item__thumb" data-bem='{{"serp-item": {{"preview": [{{"origin_url": "{}"}}]}}}}'>"#,
            target
        );
        let found = extract_all(&html, 10);
        assert!(found.contains(&target));
    }

    #[test]
    fn test_malformed_data_bem_is_skipped() {
        let html = r#"<img class="serp-item__thumb" data-bem='{"broken json'>"#;
        assert!(extract_all(html, 10).is_empty());
    }

    #[test]
    fn test_parent_href_probe() {
        let target = long_url("parented");
        let encoded: String = url::form_urlencoded::byte_serialize(target.as_bytes()).collect();
        // The img itself has no usable attribute; its containing anchor does.
        let html = format!(
            r#"<a href="/images/search?img_url={}&rpt=simage"><img class="SimpleImage"></a>"#,
            encoded
        );
        let found = extract_all(&html, 10);
        assert!(found.contains(&target));
    }

    #[test]
    fn test_quota_short_circuit() {
        let html: String = (0..8)
            .map(|i| format!(r#"<img class="SimpleImage" src="{}">"#, long_url(&i.to_string())))
            .collect();
        let found = extract_all(&html, 3);
        assert_eq!(found.len(), 3);
    }

    #[test]
    fn test_zero_quota_yields_nothing() {
        let html = format!(r#"<img class="SimpleImage" src="{}">"#, long_url("any"));
        assert!(extract_all(&html, 0).is_empty());
    }

    #[test]
    fn test_already_found_deduplicated() {
        let html = format!(
            r#"<img class="SimpleImage" src="{}"><img class="SimpleImage" src="{}">"#,
            long_url("seen"),
            long_url("new"),
        );
        let doc = Html::parse_document(&html);
        let already: HashSet<String> = [long_url("seen")].into_iter().collect();
        let found = extract(&doc, &already, 10);
        assert_eq!(found.len(), 1);
        assert!(found.contains(&long_url("new")));
    }

    #[test]
    fn test_idempotent_on_unchanged_snapshot() {
        let html = format!(
            r#"<img class="SimpleImage" src="{}">
               <img class="serp-item__thumb" data-src="{}">
               <a href="/images/search?img_url={}">x</a>"#,
            long_url("a"),
            long_url("b"),
            url::form_urlencoded::byte_serialize(long_url("c").as_bytes()).collect::<String>(),
        );
        let doc = Html::parse_document(&html);
        let first = extract(&doc, &HashSet::new(), 10);
        let second = extract(&doc, &HashSet::new(), 10);
        assert_eq!(first, second);
    }

    #[test]
    fn test_output_satisfies_invariants() {
        // Mixed garbage: relative src, short URL, excluded fragments, valid one.
        let html = format!(
            r#"<img src="/relative/thumb.jpg">
               <img src="https://e.net/s.jpg">
               <img src="https://cdn.example.net/buttons/play-button-overlay-large.png">
               <img src="{}">"#,
            long_url("only-valid"),
        );
        let found = extract_all(&html, 10);
        assert!(found.iter().all(|u| is_candidate(u)));
        assert_eq!(found.len(), 1);
    }
}
