//! Finds the category and download link of the post a user is looking at.
//!
//! Everything here is a pure function over page markup so it can be tested
//! without a browser.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::domain::Category;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error(
        "Incorrect mod category: only camouflage, mission and sight mods are handled. \
         Open a supported mod post and try again"
    )]
    UnsupportedCategory,

    #[error("No new download links found on this page")]
    NoDownloadLinks,

    #[error("Invalid page url {url}: {reason}")]
    InvalidPageUrl { url: String, reason: String },
}

/// Result of looking for a category marker inside a search scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeMatch<'a> {
    NotFound,
    Found { category: Category, scope: &'a str },
}

/// A download reference found on a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedLink {
    pub url: String,
    pub category: Category,
}

// An expanded post is rendered inside the lightbox container with display: block.
static ACTIVE_POST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<div id="clb".*?style="display:\s*block;".*?>(.*?)</div>\s*</div>"#)
        .expect("valid lightbox pattern")
});

static CATEGORY_MARKERS: LazyLock<[(Regex, Category); 3]> = LazyLock::new(|| {
    [
        (marker(r#"href="/feed/camouflages/""#), Category::Camouflage),
        (marker(r#"href="/feed/missions/""#), Category::Mission),
        (marker(r#"href="/feed/sights/""#), Category::Sight),
    ]
});

static DOWNLOAD_LINKS: LazyLock<[Regex; 2]> = LazyLock::new(|| {
    [
        marker(r#"href=["']?(https?://live\.warthunder\.com/dl/[^"'>\s]+)"#),
        marker(r#"href=["']?(/downloads/start/\d+)"#),
    ]
});

fn marker(pattern: &str) -> Regex {
    Regex::new(&format!("(?i){}", pattern)).expect("valid marker pattern")
}

/// Content of the expanded post if one is open, otherwise the whole page.
pub fn active_scope(html: &str) -> &str {
    ACTIVE_POST
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or(html)
}

/// First category marker found in `scope`, in camouflage, mission, sight order.
pub fn detect_category(scope: &str) -> ScopeMatch<'_> {
    CATEGORY_MARKERS
        .iter()
        .find(|(pattern, _)| pattern.is_match(scope))
        .map(|(_, category)| ScopeMatch::Found {
            category: *category,
            scope,
        })
        .unwrap_or(ScopeMatch::NotFound)
}

/// All download references on the page, absolute links first, relative
/// links resolved against the page's scheme and host.
///
/// `page_url` is only parsed when a relative link needs it.
pub fn download_links(html: &str, page_url: &str) -> Result<Vec<String>, ExtractError> {
    let invalid = |e: url::ParseError| ExtractError::InvalidPageUrl {
        url: page_url.to_string(),
        reason: e.to_string(),
    };

    let mut parsed_base: Option<Url> = None;
    let mut links = Vec::new();
    for pattern in DOWNLOAD_LINKS.iter() {
        for caps in pattern.captures_iter(html) {
            let raw = &caps[1];
            let link = if raw.to_ascii_lowercase().starts_with("http") {
                raw.to_string()
            } else {
                let base = match parsed_base.take() {
                    Some(base) => base,
                    None => Url::parse(page_url).map_err(invalid)?,
                };
                let link = base.join(raw).map_err(invalid)?.to_string();
                parsed_base = Some(base);
                link
            };
            if !links.contains(&link) {
                links.push(link);
            }
        }
    }
    Ok(links)
}

/// Category and first not-yet-queued download link of the current post.
///
/// At most one link is returned per call, even when the page holds several.
pub fn extract(
    html: &str,
    page_url: &str,
    is_queued: impl Fn(&str) -> bool,
) -> Result<ExtractedLink, ExtractError> {
    let category = match detect_category(active_scope(html)) {
        ScopeMatch::Found { category, .. } => category,
        ScopeMatch::NotFound => {
            debug!(page_url, "no supported category marker on page");
            return Err(ExtractError::UnsupportedCategory);
        }
    };

    let url = download_links(html, page_url)?
        .into_iter()
        .find(|link| !is_queued(link))
        .ok_or(ExtractError::NoDownloadLinks)?;

    debug!(page_url, %category, url = %url, "extracted download link");
    Ok(ExtractedLink { url, category })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = "https://live.warthunder.com/feed/all/";

    fn lightbox(inner: &str) -> String {
        format!(
            r#"<div id="clb" class="lightbox" style="display: block;"><div class="post">{}</div></div>"#,
            inner
        )
    }

    #[test]
    fn test_active_scope_restricts_to_lightbox() {
        let html = format!(
            r#"<a href="/feed/camouflages/">teaser</a>{}"#,
            lightbox(r#"<a href="/feed/sights/" class="category">Added sight</a>"#)
        );

        let scope = active_scope(&html);
        assert!(!scope.contains("camouflages"));
        assert!(matches!(
            detect_category(scope),
            ScopeMatch::Found {
                category: Category::Sight,
                ..
            }
        ));
    }

    #[test]
    fn test_hidden_lightbox_is_ignored() {
        let html = r#"<div id="clb" style="display: none;"><div></div></div>
            <a href="/feed/missions/">missions</a>"#;
        assert_eq!(active_scope(html), html);
        assert!(matches!(
            detect_category(html),
            ScopeMatch::Found {
                category: Category::Mission,
                ..
            }
        ));
    }

    #[test]
    fn test_category_order_and_case() {
        let scope = r#"<A HREF="/feed/sights/">x</A><a href="/feed/Camouflages/">y</a>"#;
        assert!(matches!(
            detect_category(scope),
            ScopeMatch::Found {
                category: Category::Camouflage,
                ..
            }
        ));
        assert_eq!(detect_category("<a href=\"/feed/vehicles/\">"), ScopeMatch::NotFound);
    }

    #[test]
    fn test_download_links_absolute_then_relative() {
        let html = r#"<a href="/downloads/start/991">dl</a>
            <a href='https://live.warthunder.com/dl/abc123/'>dl</a>
            <a href="/downloads/start/991">again</a>"#;

        let links = download_links(html, "https://live.warthunder.com/post/1/?lang=en").unwrap();
        assert_eq!(
            links,
            vec![
                "https://live.warthunder.com/dl/abc123/".to_string(),
                "https://live.warthunder.com/downloads/start/991".to_string(),
            ]
        );
    }

    #[test]
    fn test_relative_link_uses_page_port() {
        let links = download_links(r#"href="/downloads/start/5""#, "http://127.0.0.1:8080/feed/").unwrap();
        assert_eq!(links, vec!["http://127.0.0.1:8080/downloads/start/5".to_string()]);
    }

    #[test]
    fn test_extract_returns_first_new_link_only() {
        let html = lightbox(
            r#"<a href="/feed/camouflages/">Added camouflage</a>
               <a href="https://live.warthunder.com/dl/one/">1</a>
               <a href="https://live.warthunder.com/dl/two/">2</a>"#,
        );

        let link = extract(&html, PAGE, |_| false).unwrap();
        assert_eq!(link.url, "https://live.warthunder.com/dl/one/");
        assert_eq!(link.category, Category::Camouflage);

        let next = extract(&html, PAGE, |url| url.ends_with("/one/")).unwrap();
        assert_eq!(next.url, "https://live.warthunder.com/dl/two/");
    }

    #[test]
    fn test_extract_all_queued_is_no_links() {
        let html = lightbox(
            r#"<a href="/feed/missions/">m</a><a href="/downloads/start/3">dl</a>"#,
        );
        let err = extract(&html, PAGE, |_| true).unwrap_err();
        assert_eq!(err, ExtractError::NoDownloadLinks);
    }

    #[test]
    fn test_unrecognized_category_is_rejected() {
        let html = lightbox(
            r#"<a href="/feed/images/">Added image</a>
               <a href="https://live.warthunder.com/dl/img/">dl</a>"#,
        );
        let err = extract(&html, PAGE, |_| false).unwrap_err();
        assert_eq!(err, ExtractError::UnsupportedCategory);
    }

    #[test]
    fn test_invalid_page_url() {
        let html = r#"<a href="/feed/sights/">s</a><a href="/downloads/start/1">d</a>"#;
        let err = extract(html, "not a url", |_| false).unwrap_err();
        assert!(matches!(err, ExtractError::InvalidPageUrl { .. }));
    }

    #[test]
    fn test_absolute_links_need_no_page_url() {
        let html = r#"<a href="/feed/sights/">s</a>
            <a href="https://live.warthunder.com/dl/abc/pack.zip">d</a>"#;

        let link = extract(html, "not a url", |_| false).unwrap();

        assert_eq!(link.url, "https://live.warthunder.com/dl/abc/pack.zip");
        assert_eq!(link.category, Category::Sight);
    }
}
