use crate::extractor::html_to_text;
use crate::types::{IngestError, ParsedEntry, ParsedFeed, Result};
use crate::utils::text;
use chrono::Utc;
use feed_rs::parser;
use tracing::{debug, info};

pub struct FeedParser;

impl FeedParser {
    /// Parse RSS or Atom. Entry bodies are converted from HTML to plain text.
    pub fn parse_feed(content: &str) -> Result<ParsedFeed> {
        debug!("Parsing feed content ({} bytes)", content.len());

        let feed = parser::parse(content.trim_start_matches('\u{feff}').as_bytes())
            .map_err(|e| IngestError::Parse(format!("Failed to parse feed: {}", e)))?;

        let title = feed.title.map(|t| t.content);
        let entries: Vec<ParsedEntry> = feed.entries.into_iter().filter_map(Self::parse_entry).collect();

        info!("Parsed feed with {} entries", entries.len());

        Ok(ParsedFeed { title, entries })
    }

    fn parse_entry(entry: feed_rs::model::Entry) -> Option<ParsedEntry> {
        let url = entry
            .links
            .iter()
            .find(|l| l.rel.as_deref().map_or(true, |rel| rel == "alternate"))
            .or_else(|| entry.links.first())
            .map(|l| l.href.clone())
            .or_else(|| entry.id.starts_with("http").then(|| entry.id.clone()));

        let Some(url) = url else {
            debug!("Skipping feed entry without a link: {}", entry.id);
            return None;
        };

        let title = entry
            .title
            .map(|t| html_to_text(&t.content))
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "Untitled".to_string());

        let summary = entry
            .summary
            .map(|s| html_to_text(&s.content))
            .filter(|s| !s.is_empty());

        let content = entry
            .content
            .and_then(|c| c.body)
            .map(|body| html_to_text(&body))
            .filter(|c| !c.is_empty());

        let published_at = entry.published.or(entry.updated).map(|dt| dt.with_timezone(&Utc));

        Some(ParsedEntry {
            url,
            title,
            summary,
            content,
            published_at,
        })
    }

    /// True when the document opens like RSS, Atom or RDF rather than a web page.
    pub fn starts_like_feed(content: &str) -> bool {
        let head = text::document_head(content, 1024);
        let is_feed_root = |s: &str| s.starts_with("<rss") || s.starts_with("<feed") || s.starts_with("<rdf");
        if is_feed_root(&head) {
            return true;
        }
        head.starts_with("<?xml") && (head.contains("<rss") || head.contains("<feed") || head.contains("<rdf:rdf"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Example News</title>
    <link>https://news.example.com</link>
    <description>Latest</description>
    <item>
      <title>First story</title>
      <link>https://news.example.com/a</link>
      <description>&lt;p&gt;Summary &lt;b&gt;one&lt;/b&gt;&lt;/p&gt;</description>
      <pubDate>Fri, 01 Mar 2024 10:00:00 +0000</pubDate>
    </item>
    <item>
      <title>Second story</title>
      <link>https://news.example.com/b</link>
    </item>
  </channel>
</rss>"#;

    const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom Example</title>
  <id>urn:example</id>
  <updated>2024-03-01T10:00:00Z</updated>
  <entry>
    <title>Atom entry</title>
    <id>urn:entry:1</id>
    <link rel="alternate" href="https://atom.example.com/1"/>
    <updated>2024-03-01T10:00:00Z</updated>
    <content type="html">&lt;p&gt;Full body text&lt;/p&gt;</content>
  </entry>
</feed>"#;

    #[test]
    fn test_parse_rss_entries() {
        let feed = FeedParser::parse_feed(RSS).unwrap();
        assert_eq!(feed.title.as_deref(), Some("Example News"));
        assert_eq!(feed.entries.len(), 2);

        let first = &feed.entries[0];
        assert_eq!(first.url, "https://news.example.com/a");
        assert_eq!(first.summary.as_deref(), Some("Summary one"));
        assert!(first.published_at.is_some());
        assert!(feed.entries[1].summary.is_none());
    }

    #[test]
    fn test_parse_atom_content() {
        let feed = FeedParser::parse_feed(ATOM).unwrap();
        assert_eq!(feed.entries.len(), 1);
        assert_eq!(feed.entries[0].url, "https://atom.example.com/1");
        assert_eq!(feed.entries[0].content.as_deref(), Some("Full body text"));
    }

    #[test]
    fn test_starts_like_feed() {
        assert!(FeedParser::starts_like_feed(RSS));
        assert!(FeedParser::starts_like_feed(ATOM));
        assert!(!FeedParser::starts_like_feed("<!DOCTYPE html><html><head></head></html>"));
        assert!(!FeedParser::starts_like_feed("<?xml version=\"1.0\"?><html><head></head></html>"));
    }

    #[test]
    fn test_byte_order_mark_before_feed() {
        let feed = "\u{feff}<?xml version=\"1.0\"?><rss version=\"2.0\"><channel><title>Bom</title>\
             <item><title>One</title><link>https://bom.example.com/1</link>\
             <description><![CDATA[<header>Section</header><p>Body</p>]]></description></item>\
             </channel></rss>";
        assert!(FeedParser::starts_like_feed(feed));
        assert_eq!(FeedParser::parse_feed(feed).unwrap().entries.len(), 1);
    }

    #[test]
    fn test_garbage_is_a_parse_error() {
        assert!(matches!(FeedParser::parse_feed("not xml at all"), Err(IngestError::Parse(_))));
    }
}
