// Markup scanning shared by both extraction strategies.

use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

use playlink_common::ServerSet;

/// Absolute URLs pointing at known destination hosts. Matches are candidates
/// even when the page carries no recognizable anchors.
const HOST_URL_PATTERN: &str =
    r#"(?i)https?://[^\s'"<>]+(?:pixeldrain|fsl|10gbps|pixelserver|vcloud)[^\s'"<>]*"#;

/// Scan anchor elements for candidate links.
///
/// An anchor qualifies when its visible text or href contains one of the
/// server-name fragments (case-insensitive). Key is the lowercased visible
/// text, falling back to the raw href when the text is empty; value is the
/// href resolved against `base_url`.
pub(crate) fn anchor_candidates(html: &str, base_url: &str, keywords: &[String]) -> ServerSet {
    let document = Html::parse_document(html);
    let selector = Selector::parse("a[href]").expect("valid selector");
    let base = Url::parse(base_url).ok();

    let mut candidates = ServerSet::new();

    for element in document.select(&selector) {
        let href = match element.value().attr("href") {
            Some(h) => h.trim(),
            None => continue,
        };
        if href.is_empty()
            || href.starts_with('#')
            || href.starts_with("javascript:")
            || href.starts_with("mailto:")
        {
            continue;
        }

        let text: String = element.text().collect::<Vec<_>>().join(" ");
        let text = text.trim().to_lowercase();
        let href_lower = href.to_lowercase();

        let matched = keywords
            .iter()
            .any(|k| text.contains(k.as_str()) || href_lower.contains(k.as_str()));
        if !matched {
            continue;
        }

        let resolved = match &base {
            Some(b) => match b.join(href) {
                Ok(u) => u.to_string(),
                Err(_) => continue,
            },
            None if href.starts_with("http://") || href.starts_with("https://") => {
                href.to_string()
            }
            None => continue,
        };

        let key = if text.is_empty() { href.to_string() } else { text };
        candidates.insert(key, resolved);
    }

    candidates
}

/// Absolute destination-host URLs found anywhere in the text.
pub(crate) fn host_matches(text: &str) -> Vec<String> {
    let re = Regex::new(HOST_URL_PATTERN).expect("valid regex");
    re.find_iter(text).map(|m| m.as_str().to_string()).collect()
}

/// Candidates from `<source src>` elements of rendered media players.
/// Named by a truncated src prefix so distinct sources do not collide.
pub(crate) fn media_source_candidates(html: &str) -> ServerSet {
    let document = Html::parse_document(html);
    let selector = Selector::parse("source[src]").expect("valid selector");

    let mut candidates = ServerSet::new();
    for element in document.select(&selector) {
        if let Some(src) = element.value().attr("src") {
            let src = src.trim();
            if src.is_empty() {
                continue;
            }
            candidates.insert(format!("source:{}", truncate(src, 30)), src);
        }
    }
    candidates
}

/// Char-boundary-safe prefix.
pub(crate) fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keywords() -> Vec<String> {
        vec![
            "pixel".to_string(),
            "fsl".to_string(),
            "10gbps".to_string(),
            "server".to_string(),
        ]
    }

    #[test]
    fn anchors_match_on_text_or_href() {
        let html = r#"
            <a href="/dl/1">Pixel Mirror</a>
            <a href="https://cdn.example/fsl/2">mirror two</a>
            <a href="/other">unrelated</a>
        "#;
        let found = anchor_candidates(html, "https://up.example/ep1", &keywords());

        assert_eq!(found.len(), 2);
        assert_eq!(found.get("pixel mirror"), Some("https://up.example/dl/1"));
        assert_eq!(found.get("mirror two"), Some("https://cdn.example/fsl/2"));
    }

    #[test]
    fn empty_anchor_text_falls_back_to_href() {
        let html = r#"<a href="/dl/pixel9"></a>"#;
        let found = anchor_candidates(html, "https://up.example/ep1", &keywords());

        assert_eq!(found.len(), 1);
        assert_eq!(found.get("/dl/pixel9"), Some("https://up.example/dl/pixel9"));
    }

    #[test]
    fn non_navigable_hrefs_are_skipped() {
        let html = r##"
            <a href="#pixel">anchor</a>
            <a href="javascript:pixel()">js</a>
            <a href="mailto:pixel@example.com">mail</a>
        "##;
        let found = anchor_candidates(html, "https://up.example/ep1", &keywords());
        assert!(found.is_empty());
    }

    #[test]
    fn host_pattern_finds_absolute_urls_case_insensitively() {
        let text = "redirecting to HTTPS://Files.PixelDrain.example/abc?k=1 shortly";
        let matches = host_matches(text);
        assert_eq!(matches.len(), 1);
        assert!(matches[0].contains("PixelDrain"));
    }

    #[test]
    fn host_pattern_stops_at_quotes_and_whitespace() {
        let text = r#"var u = "http://a.example/10gbps/file";"#;
        let matches = host_matches(text);
        assert_eq!(matches, vec!["http://a.example/10gbps/file".to_string()]);
    }

    #[test]
    fn source_elements_get_truncated_names() {
        let long_src = format!("https://cdn.example/{}", "x".repeat(50));
        let html = format!(r#"<video><source src="{long_src}"></video>"#);
        let found = media_source_candidates(&html);

        assert_eq!(found.len(), 1);
        let link = found.iter().next().unwrap();
        assert_eq!(link.name, format!("source:{}", truncate(&long_src, 30)));
        assert_eq!(link.url, long_src);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo wörld", 5), "héllo");
        assert_eq!(truncate("ab", 5), "ab");
    }
}
