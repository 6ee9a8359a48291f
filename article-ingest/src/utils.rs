/// Text processing utilities. All lengths are counted in chars, never bytes.
pub mod text {
    const SENTENCE_TERMINATORS: [char; 8] = ['.', '!', '?', '。', '！', '？', '；', '…'];

    pub fn char_len(text: &str) -> usize {
        text.chars().count()
    }

    /// First `max_chars` chars of `text`.
    pub fn prefix(text: &str, max_chars: usize) -> &str {
        match text.char_indices().nth(max_chars) {
            Some((idx, _)) => &text[..idx],
            None => text,
        }
    }

    /// Cut to at most `max_chars`, preferring the last sentence terminator
    /// inside the window. Falls back to a hard cut.
    pub fn truncate_at_sentence(text: &str, max_chars: usize) -> String {
        let window = prefix(text, max_chars);
        if window.len() == text.len() {
            return text.to_string();
        }
        match window.rfind(|c: char| SENTENCE_TERMINATORS.contains(&c)) {
            Some(idx) => {
                let end = idx + window[idx..].chars().next().map(char::len_utf8).unwrap_or(1);
                window[..end].trim_end().to_string()
            }
            None => window.trim_end().to_string(),
        }
    }

    /// Collapse every whitespace run to a single space.
    pub fn collapse_whitespace(text: &str) -> String {
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    pub fn is_blank(text: &str) -> bool {
        text.trim().is_empty()
    }

    /// Lowercased opening of a document, past any byte order mark and leading whitespace.
    pub fn document_head(text: &str, max_chars: usize) -> String {
        let start = text.trim_start_matches(|c: char| c == '\u{feff}' || c.is_whitespace());
        prefix(start, max_chars).to_lowercase()
    }
}

/// URL utilities
pub mod url {
    use url::Url;

    /// Resolve `href` against `base`, keeping only http(s) and dropping fragments.
    pub fn resolve(base: &str, href: &str) -> Option<String> {
        let href = href.trim();
        if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") || href.starts_with("mailto:") {
            return None;
        }
        let base = Url::parse(base).ok()?;
        let mut resolved = base.join(href).ok()?;
        if resolved.scheme() != "http" && resolved.scheme() != "https" {
            return None;
        }
        resolved.set_fragment(None);
        Some(resolved.to_string())
    }
}

/// Time utilities
pub mod time {
    use chrono::{DateTime, Utc};

    /// Parse the date formats seen in JSON APIs.
    pub fn parse_loose(raw: &str) -> Option<DateTime<Utc>> {
        let raw = raw.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
            return Some(naive.and_utc());
        }
        chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|naive| naive.and_utc())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_is_char_safe() {
        assert_eq!(text::prefix("新闻报道内容", 2), "新闻");
        assert_eq!(text::prefix("abc", 10), "abc");
    }

    #[test]
    fn test_truncate_at_sentence() {
        let input = "第一句话。第二句话很长很长。第三句";
        assert_eq!(text::truncate_at_sentence(input, 12), "第一句话。");
        assert_eq!(text::truncate_at_sentence("One. Two three four", 12), "One.");
        assert_eq!(text::truncate_at_sentence("no terminator here", 7), "no term");
        assert_eq!(text::truncate_at_sentence("short", 50), "short");
    }

    #[test]
    fn test_resolve_urls() {
        let base = "https://news.example.com/section/index.html";
        assert_eq!(
            url::resolve(base, "/feed.xml").as_deref(),
            Some("https://news.example.com/feed.xml")
        );
        assert_eq!(
            url::resolve(base, "story/1#comments").as_deref(),
            Some("https://news.example.com/section/story/1")
        );
        assert_eq!(url::resolve(base, "mailto:desk@example.com"), None);
        assert_eq!(url::resolve(base, "ftp://example.com/file"), None);
        assert_eq!(url::resolve(base, "#top"), None);
    }

    #[test]
    fn test_parse_loose_dates() {
        assert!(time::parse_loose("2024-03-01T10:00:00Z").is_some());
        assert!(time::parse_loose("Fri, 01 Mar 2024 10:00:00 +0000").is_some());
        assert!(time::parse_loose("2024-03-01").is_some());
        assert!(time::parse_loose("yesterday").is_none());
    }
}
