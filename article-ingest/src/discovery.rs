use crate::parser::FeedParser;
use crate::utils::{text, url};
use once_cell::sync::Lazy;
use scraper::{Html, Selector};

static ALTERNATE_LINKS: Lazy<Option<Selector>> = Lazy::new(|| Selector::parse("link[rel][href]").ok());

static IFRAMES: Lazy<Option<Selector>> = Lazy::new(|| Selector::parse("iframe[src]").ok());

/// A body is treated as a web page when it carries HTML markers and does not
/// open like a feed document.
pub fn looks_like_html(body: &str) -> bool {
    if FeedParser::starts_like_feed(body) {
        return false;
    }
    let head = text::document_head(body, 2048);
    head.starts_with("<!doctype html") || head.starts_with("<html") || head.contains("<html") || head.contains("<head")
}

/// Absolute URL of the first `<link rel="alternate">` advertising a feed.
pub fn find_feed_link(html: &str, base_url: &str) -> Option<String> {
    let selector = ALTERNATE_LINKS.as_ref()?;
    let document = Html::parse_document(html);

    document
        .select(selector)
        .filter(|link| {
            link.value()
                .attr("rel")
                .is_some_and(|rel| rel.split_whitespace().any(|r| r.eq_ignore_ascii_case("alternate")))
        })
        .filter(|link| {
            link.value().attr("type").is_some_and(|kind| {
                let kind = kind.to_lowercase();
                ["rss", "atom", "xml", "feed"].iter().any(|marker| kind.contains(marker))
            })
        })
        .find_map(|link| link.value().attr("href").and_then(|href| url::resolve(base_url, href)))
}

/// Absolute URL of the first `<iframe src>`, if any.
pub fn find_iframe_src(html: &str, base_url: &str) -> Option<String> {
    let selector = IFRAMES.as_ref()?;
    let document = Html::parse_document(html);

    document
        .select(selector)
        .find_map(|frame| frame.value().attr("src").and_then(|src| url::resolve(base_url, src)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_html_pages() {
        assert!(looks_like_html("<!DOCTYPE html><html><body></body></html>"));
        assert!(looks_like_html("  <HTML lang=\"en\"></HTML>"));
        assert!(looks_like_html("<!-- comment --><head><title>x</title></head>"));
        assert!(!looks_like_html("<?xml version=\"1.0\"?><rss version=\"2.0\"><channel></channel></rss>"));
        assert!(!looks_like_html("{\"articles\": []}"));
        assert!(!looks_like_html(
            "\u{feff}<?xml version=\"1.0\"?><rss><channel><description><![CDATA[<head>x</head>]]></description></channel></rss>"
        ));
    }

    #[test]
    fn test_find_feed_link() {
        let html = r#"<html><head>
            <link rel="stylesheet" href="/style.css">
            <link rel="alternate" type="text/html" href="/mobile">
            <link rel="alternate" type="application/rss+xml" href="/feed.xml">
        </head><body></body></html>"#;
        assert_eq!(
            find_feed_link(html, "https://blog.example.com/").as_deref(),
            Some("https://blog.example.com/feed.xml")
        );
        assert_eq!(find_feed_link("<html><head></head></html>", "https://blog.example.com/"), None);
    }

    #[test]
    fn test_find_iframe_src() {
        let html = r#"<html><body><iframe src="embed/news.html"></iframe><iframe src="/other"></iframe></body></html>"#;
        assert_eq!(
            find_iframe_src(html, "https://portal.example.com/home/").as_deref(),
            Some("https://portal.example.com/home/embed/news.html")
        );
    }
}
