use crate::config::ExtractionConfig;
use crate::traits::PageFetcher;
use crate::types::RawArticle;
use crate::utils::{text, time, url};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::node::Element;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Elements whose text never counts as article content.
const IGNORED_TAGS: [&str; 8] = ["script", "style", "noscript", "iframe", "header", "footer", "nav", "aside"];

/// Class or id fragments marking page chrome.
const NOISE_MARKERS: [&str; 11] = [
    "nav",
    "breadcrumb",
    "footer",
    "header",
    "subscribe",
    "share",
    "related",
    "comments",
    "advert",
    "ads",
    "cookie",
];

const BOILERPLATE_PHRASES: [&str; 9] = [
    "privacy policy",
    "terms of use",
    "terms of service",
    "all rights reserved",
    "cookie policy",
    "关于我们",
    "免责声明",
    "隐私政策",
    "版权所有",
];

const BLOCK_TAGS: [&str; 24] = [
    "p", "div", "section", "article", "main", "blockquote", "pre", "table", "tr", "ul", "ol", "dl", "dt", "dd",
    "h1", "h2", "h3", "h4", "h5", "h6", "figure", "figcaption", "header", "footer",
];

// Evaluated in priority order.
static CONTENT_SELECTORS: Lazy<Vec<Selector>> = Lazy::new(|| {
    parse_selectors(&[
        "article",
        "main",
        "#content",
        "#main",
        "[class*=article-body]",
        "[class*=article-content]",
        "[class*=post-content]",
        "[class*=entry-content]",
        "[class*=story-body]",
        "[itemprop=articleBody]",
    ])
});

static LISTING_CONTAINERS: Lazy<Vec<Selector>> =
    Lazy::new(|| parse_selectors(&[".article-list", ".news-list", ".post-list", ".list-news", "#news-list"]));

static ARTICLE_ANCHORS: Lazy<Vec<Selector>> = Lazy::new(|| parse_selectors(&["article a[href]"]));

static HEADING_ANCHORS: Lazy<Vec<Selector>> =
    Lazy::new(|| parse_selectors(&["h1 a[href]", "h2 a[href]", "h3 a[href]"]));

static ANY_ANCHOR: Lazy<Vec<Selector>> = Lazy::new(|| parse_selectors(&["a[href]"]));

static BODY: Lazy<Vec<Selector>> = Lazy::new(|| parse_selectors(&["body"]));

static OG_TITLE: Lazy<Vec<Selector>> =
    Lazy::new(|| parse_selectors(&[r#"meta[property="og:title"]"#, r#"meta[name="og:title"]"#]));

static TITLE: Lazy<Vec<Selector>> = Lazy::new(|| parse_selectors(&["title", "h1"]));

static PUBLISHED_META: Lazy<Vec<Selector>> = Lazy::new(|| {
    parse_selectors(&[
        r#"meta[property="article:published_time"]"#,
        r#"meta[name="pubdate"]"#,
        r#"meta[name="publishdate"]"#,
        r#"meta[itemprop="datePublished"]"#,
    ])
});

static ARTICLE_HREF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(/news|/article|/story|/artikel|/(19|20)\d{2}/|rss)").expect("article href pattern compiles")
});

fn parse_selectors(css: &[&str]) -> Vec<Selector> {
    css.iter().filter_map(|s| Selector::parse(s).ok()).collect()
}

/// Title and cleaned body of a single article page.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedPage {
    pub title: String,
    pub body: String,
    pub published_at: Option<DateTime<Utc>>,
}

/// Heuristic main-content extraction for single pages and article listings.
#[derive(Debug, Clone, Default)]
pub struct ContentExtractor {
    config: ExtractionConfig,
}

impl ContentExtractor {
    pub fn new(config: ExtractionConfig) -> Self {
        Self { config }
    }

    /// Returns `None` when the page does not look like an article.
    pub fn extract(&self, html: &str) -> Option<ExtractedPage> {
        let document = Html::parse_document(html);

        let body = self
            .best_candidate(&document)
            .or_else(|| largest_body_child(&document))
            .map(|raw| text::collapse_whitespace(&raw))?;

        let title = page_title(&document).unwrap_or_default();
        let body = strip_leading_title(&body, &title);

        if text::char_len(&body) < self.config.min_text_chars {
            debug!("Rejecting page: only {} chars of text", text::char_len(&body));
            return None;
        }
        if self.is_boilerplate(&body) {
            debug!("Rejecting page: boilerplate phrases near the top");
            return None;
        }

        Some(ExtractedPage {
            title: if title.is_empty() { "Untitled".to_string() } else { title },
            body,
            published_at: published_time(&document),
        })
    }

    fn best_candidate(&self, document: &Html) -> Option<String> {
        let mut best: Option<(usize, String)> = None;

        'selectors: for selector in CONTENT_SELECTORS.iter() {
            for element in document.select(selector) {
                if is_noise(element.value()) || has_noise_ancestor(element) {
                    continue;
                }
                let candidate = visible_text(element);
                let len = text::char_len(candidate.trim());
                if best.as_ref().map_or(true, |(best_len, _)| len > *best_len) {
                    best = Some((len, candidate));
                }
                if len > self.config.early_stop_chars {
                    break 'selectors;
                }
            }
        }

        best.filter(|(len, _)| *len > 0).map(|(_, text)| text)
    }

    fn is_boilerplate(&self, body: &str) -> bool {
        let head = text::prefix(body, self.config.boilerplate_window_chars).to_lowercase();
        let hits = BOILERPLATE_PHRASES.iter().filter(|p| head.contains(*p)).count();
        hits >= self.config.boilerplate_rejection_hits
    }

    /// Candidate article URLs on a listing page, absolute, unique, capped.
    pub fn discover_links(&self, html: &str, base_url: &str) -> Vec<String> {
        let document = Html::parse_document(html);

        let containers: Vec<ElementRef<'_>> = LISTING_CONTAINERS
            .iter()
            .flat_map(|selector| document.select(selector))
            .collect();

        let hrefs: Vec<String> = if !containers.is_empty() {
            containers
                .iter()
                .flat_map(|container| {
                    ANY_ANCHOR
                        .iter()
                        .flat_map(move |selector| container.select(selector))
                })
                .filter_map(|a| a.value().attr("href").map(str::to_string))
                .collect()
        } else {
            let from = |selectors: &[Selector]| -> Vec<String> {
                selectors
                    .iter()
                    .flat_map(|selector| document.select(selector))
                    .filter_map(|a| a.value().attr("href").map(str::to_string))
                    .collect()
            };
            let mut merged = from(ARTICLE_ANCHORS.as_slice());
            merged.extend(from(HEADING_ANCHORS.as_slice()));
            merged.extend(from(ANY_ANCHOR.as_slice()).into_iter().filter(|href| ARTICLE_HREF.is_match(href)));
            merged
        };

        let base_normalized = url::resolve(base_url, base_url);
        let mut seen = HashSet::new();
        hrefs
            .iter()
            .filter_map(|href| url::resolve(base_url, href))
            .filter(|link| Some(link) != base_normalized.as_ref())
            .filter(|link| seen.insert(link.clone()))
            .take(self.config.max_listing_links)
            .collect()
    }

    /// Fetch one page and extract it. Fetch failures and rejected pages yield `None`.
    pub async fn extract_url(
        &self,
        page_url: &str,
        pages: &dyn PageFetcher,
        language_hint: Option<&str>,
    ) -> Option<RawArticle> {
        let html = match pages.fetch_text(page_url).await {
            Ok(html) => html,
            Err(e) => {
                warn!("Failed to fetch article page {}: {}", page_url, e);
                return None;
            }
        };

        let page = self.extract(&html)?;
        Some(RawArticle {
            title: page.title,
            body: page.body,
            source_url: page_url.to_string(),
            published_at: page.published_at.unwrap_or_else(Utc::now),
            language_hint: language_hint.map(str::to_string),
        })
    }

    /// Listing mode: discover links and extract each page in order.
    pub async fn discover_articles(
        &self,
        html: &str,
        base_url: &str,
        pages: &dyn PageFetcher,
        language_hint: Option<&str>,
    ) -> Vec<RawArticle> {
        let links = self.discover_links(html, base_url);
        debug!("Discovered {} candidate links on {}", links.len(), base_url);

        let mut articles = Vec::with_capacity(links.len());
        for link in links {
            if let Some(article) = self.extract_url(&link, pages, language_hint).await {
                articles.push(article);
            }
        }
        articles
    }
}

fn is_noise(element: &Element) -> bool {
    if IGNORED_TAGS.contains(&element.name()) {
        return true;
    }
    let class = element.attr("class").unwrap_or("").to_lowercase();
    let id = element.id().unwrap_or("").to_lowercase();
    NOISE_MARKERS.iter().any(|m| class.contains(m) || id.contains(m))
}

fn has_noise_ancestor(element: ElementRef<'_>) -> bool {
    element
        .ancestors()
        .filter_map(|node| node.value().as_element())
        .any(is_noise)
}

fn visible_text(element: ElementRef<'_>) -> String {
    let mut out = String::new();
    collect_visible(element, &mut out);
    out
}

fn collect_visible(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
        } else if let Some(child_el) = ElementRef::wrap(child) {
            if is_noise(child_el.value()) {
                continue;
            }
            let block = BLOCK_TAGS.contains(&child_el.value().name()) || child_el.value().name() == "br";
            if block {
                out.push(' ');
            }
            collect_visible(child_el, out);
            if block {
                out.push(' ');
            }
        }
    }
}

fn largest_body_child(document: &Html) -> Option<String> {
    let body = BODY.iter().find_map(|selector| document.select(selector).next())?;

    let largest = body
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|child| !is_noise(child.value()))
        .map(visible_text)
        .max_by_key(|candidate| text::char_len(candidate.trim()));

    match largest {
        Some(candidate) if !text::is_blank(&candidate) => Some(candidate),
        _ => Some(visible_text(body)).filter(|all| !text::is_blank(all)),
    }
}

fn page_title(document: &Html) -> Option<String> {
    let og_title = OG_TITLE
        .iter()
        .flat_map(|selector| document.select(selector))
        .filter_map(|meta| meta.value().attr("content"))
        .map(text::collapse_whitespace)
        .find(|t| !t.is_empty());

    og_title.or_else(|| {
        TITLE
            .iter()
            .filter_map(|selector| document.select(selector).next())
            .map(|el| text::collapse_whitespace(&el.text().collect::<String>()))
            .find(|t| !t.is_empty())
    })
}

fn published_time(document: &Html) -> Option<DateTime<Utc>> {
    PUBLISHED_META
        .iter()
        .flat_map(|selector| document.select(selector))
        .filter_map(|meta| meta.value().attr("content"))
        .find_map(time::parse_loose)
}

fn strip_leading_title(body: &str, title: &str) -> String {
    if !title.is_empty() {
        if let Some(rest) = body.strip_prefix(title) {
            return rest.trim_start().to_string();
        }
    }
    body.to_string()
}

/// Plain text from an HTML fragment, keeping paragraph breaks and list items.
pub fn html_to_text(fragment: &str) -> String {
    if !fragment.contains('<') && !fragment.contains('&') {
        return normalize_lines(fragment);
    }

    let document = Html::parse_fragment(fragment);
    let mut out = String::new();
    collect_structured(document.root_element(), &mut out);
    normalize_lines(&out)
}

fn collect_structured(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
        } else if let Some(child_el) = ElementRef::wrap(child) {
            let name = child_el.value().name();
            if IGNORED_TAGS[..4].contains(&name) {
                continue;
            }
            match name {
                "br" => out.push('\n'),
                "li" => {
                    out.push_str("\n- ");
                    collect_structured(child_el, out);
                }
                _ if BLOCK_TAGS.contains(&name) => {
                    out.push_str("\n\n");
                    collect_structured(child_el, out);
                    out.push_str("\n\n");
                }
                _ => collect_structured(child_el, out),
            }
        }
    }
}

fn normalize_lines(raw: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    for line in raw.lines() {
        let collapsed = text::collapse_whitespace(line);
        if collapsed.is_empty() && lines.last().map_or(true, |l| l.is_empty()) {
            continue;
        }
        lines.push(collapsed);
    }
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOREM: &str = "The city council approved the new transit budget on Tuesday after a long debate \
        about bus routes, bike lanes and the future of the downtown rail corridor.";

    fn extractor() -> ContentExtractor {
        ContentExtractor::new(ExtractionConfig::default())
    }

    #[test]
    fn test_extracts_article_and_ignores_chrome() {
        let html = format!(
            r#"<html><head><title>Budget approved</title></head><body>
            <nav>Home News Sports</nav>
            <article><h1>Budget approved</h1><p>{LOREM}</p>
              <div class="share-buttons">Share on social</div>
              <script>var x = 1;</script></article>
            <footer>Footer text</footer></body></html>"#
        );
        let page = extractor().extract(&html).unwrap();
        assert_eq!(page.title, "Budget approved");
        assert!(page.body.starts_with("The city council"));
        assert!(!page.body.contains("Share on social"));
        assert!(!page.body.contains("var x"));
        assert!(!page.body.contains("  "));
    }

    #[test]
    fn test_noise_classed_candidate_is_skipped() {
        let comments = "Reader comment: I totally disagree with the council and its priorities this year. ".repeat(4);
        let html = format!(
            r#"<html><body>
            <article class="comments"><p>{comments}</p></article>
            <main><p>{LOREM}</p></main></body></html>"#
        );
        let page = extractor().extract(&html).unwrap();
        assert!(page.body.starts_with("The city council"));
        assert!(!page.body.contains("Reader comment"));
    }

    #[test]
    fn test_og_title_wins_over_title_tag() {
        let html = format!(
            r#"<html><head><meta property="og:title" content="Real headline"><title>Site | Real headline</title></head>
            <body><main><p>{LOREM}</p></main></body></html>"#
        );
        assert_eq!(extractor().extract(&html).unwrap().title, "Real headline");
    }

    #[test]
    fn test_falls_back_to_largest_body_child() {
        let html = format!(
            r#"<html><body><div class="sidebar-nav">menu</div><div class="column">{LOREM}</div><div>tiny</div></body></html>"#
        );
        let page = extractor().extract(&html).unwrap();
        assert!(page.body.contains("transit budget"));
        assert!(!page.body.contains("menu"));
    }

    #[test]
    fn test_rejects_short_and_boilerplate_pages() {
        let short = "<html><body><article><p>Too short.</p></article></body></html>";
        assert!(extractor().extract(short).is_none());

        let legal = format!(
            "<html><body><main><p>Privacy Policy. Terms of Use. All rights reserved. {LOREM}</p></main></body></html>"
        );
        assert!(extractor().extract(&legal).is_none());

        let chinese = format!("<html><body><main><p>关于我们 免责声明 {LOREM}</p></main></body></html>");
        assert!(extractor().extract(&chinese).is_none());
    }

    #[test]
    fn test_discover_links_from_listing_container() {
        let html = r#"<html><body>
            <ul class="news-list">
              <li><a href="/local/one">One</a></li>
              <li><a href="/local/two#comments">Two</a></li>
              <li><a href="/local/one">One again</a></li>
            </ul>
            <a href="/news/ignored">Not in container</a>
        </body></html>"#;
        let links = extractor().discover_links(html, "https://site.example/");
        assert_eq!(
            links,
            vec!["https://site.example/local/one", "https://site.example/local/two"]
        );
    }

    #[test]
    fn test_discover_links_by_heuristics() {
        let mut html = String::from(r#"<html><body><article><a href="/a/first">First</a></article>"#);
        html.push_str(r#"<h2><a href="https://other.example/x">Heading link</a></h2>"#);
        html.push_str(r#"<a href="/about">About</a><a href="mailto:x@y.z">Mail</a>"#);
        for i in 0..30 {
            html.push_str(&format!(r#"<a href="/2024/03/story-{i}">Story {i}</a>"#));
        }
        html.push_str("</body></html>");

        let links = extractor().discover_links(&html, "https://site.example/index.html");
        assert_eq!(links.len(), 20);
        assert_eq!(links[0], "https://site.example/a/first");
        assert_eq!(links[1], "https://other.example/x");
        assert_eq!(links[2], "https://site.example/2024/03/story-0");
        assert!(!links.iter().any(|l| l.ends_with("/about")));
    }

    #[test]
    fn test_html_to_text_keeps_structure() {
        let text = html_to_text("<p>First   paragraph</p><p>Second <b>bold</b></p><ul><li>a</li><li>b</li></ul>");
        assert_eq!(text, "First paragraph\n\nSecond bold\n\n- a\n- b");
        assert_eq!(html_to_text("Tom &amp; Jerry"), "Tom & Jerry");
        assert_eq!(html_to_text("plain\n\n\n\ntext"), "plain\n\ntext");
    }
}
