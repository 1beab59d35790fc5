//! `HttpCrawler`: fetch a web page and pull out a title and plain body text.

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;

use crate::services::error::ServiceError;
use crate::services::traits::{ArticleCrawler, CrawledArticle};

const SERVICE: &str = "Crawl";

/// Title used when the page has none.
pub const FALLBACK_TITLE: &str = "Extracted Title";

/// Body text is cut to this many characters.
pub const MAX_CONTENT_CHARS: usize = 5000;

pub struct HttpCrawler {
    client: reqwest::Client,
}

impl HttpCrawler {
    pub fn new(timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client }
    }
}

struct Patterns {
    title: Regex,
    body: Regex,
    hidden: Regex,
    block: Regex,
    tag: Regex,
    spaces: Regex,
    blank_lines: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let re = |p: &str| Regex::new(p).expect("valid HTML pattern");
        Patterns {
            title: re(r"(?is)<title[^>]*>(.*?)</title>"),
            body: re(r"(?is)<body[^>]*>(.*)</body>"),
            hidden: re(r"(?is)<(script|style|noscript)[^>]*>.*?</(script|style|noscript)>|<!--.*?-->"),
            block: re(r"(?i)<(br|/p|/div|/h[1-6]|/li|/tr|/section|/article)[^>]*>"),
            tag: re(r"(?s)<[^>]+>"),
            spaces: re(r"[ \t\r\f]+"),
            blank_lines: re(r"\n\s*\n+"),
        }
    })
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Extract title and body text from an HTML document.
pub fn extract_article(html: &str) -> CrawledArticle {
    let p = patterns();

    let title = p
        .title
        .captures(html)
        .map(|c| decode_entities(c[1].trim()))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| FALLBACK_TITLE.to_string());

    let body = p
        .body
        .captures(html)
        .map(|c| c[1].to_string())
        .unwrap_or_else(|| html.to_string());

    let text = p.hidden.replace_all(&body, "");
    let text = p.block.replace_all(&text, "\n");
    let text = p.tag.replace_all(&text, "");
    let text = decode_entities(&text);
    let text = p.spaces.replace_all(&text, " ");
    let text: String = text
        .lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n");
    let text = p.blank_lines.replace_all(&text, "\n\n");

    CrawledArticle {
        title,
        content: text.trim().chars().take(MAX_CONTENT_CHARS).collect(),
    }
}

#[async_trait]
impl ArticleCrawler for HttpCrawler {
    async fn crawl(&self, url: &str) -> Result<CrawledArticle, ServiceError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        let html = response.text().await?;
        if !status.is_success() {
            return Err(ServiceError::from_response(SERVICE, status.as_u16(), &html));
        }
        log::debug!("Fetched {} bytes from {url}", html.len());
        Ok(extract_article(&html))
    }
}
