//! HTTP page fetch and regex-based article extraction.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use realpress_core::normalize::domain_from_host;
use regex::Regex;
use reqwest::{Client, StatusCode};
use sha2::{Digest, Sha256};

use crate::collaborators::{ExtractedPage, ExtractionError, Extractor};

/// Pages with less extracted text than this are treated as failed extractions.
pub const MIN_TEXT_LEN: usize = 200;

static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title\b[^>]*>(.*?)</title>").expect("valid regex"));
static META_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<meta\b[^>]*>").expect("valid regex"));
static ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)([a-z_:.-]+)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("valid regex")
});
static NON_CONTENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script\b.*?</script>|<style\b.*?</style>|<noscript\b.*?</noscript>|<!--.*?-->")
        .expect("valid regex")
});
static PARAGRAPH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<p\b[^>]*>(.*?)</p>").expect("valid regex"));
static BODY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<body\b[^>]*>(.*?)</body>").expect("valid regex"));
static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid regex"));
static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

const PERMANENT_STATUSES: [StatusCode; 3] =
    [StatusCode::FORBIDDEN, StatusCode::NOT_FOUND, StatusCode::GONE];

/// Fetches a page over HTTP and pulls out its title, description, and
/// paragraph text.
///
/// 403, 404, and 410 responses are reported as
/// [`ExtractionError::Permanent`]; every other failure, including thin
/// content, is retryable.
pub struct HttpExtractor {
    client: Client,
}

impl HttpExtractor {
    /// # Errors
    ///
    /// Returns [`reqwest::Error`] if the HTTP client cannot be constructed.
    pub fn new(timeout_secs: u64, user_agent: &str) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Extractor for HttpExtractor {
    async fn extract(&self, url: &str) -> Result<ExtractedPage, ExtractionError> {
        let failed = |reason: String| ExtractionError::Failed {
            url: url.to_string(),
            reason,
        };

        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "text/html,application/xhtml+xml")
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;

        let status = response.status();
        if PERMANENT_STATUSES.contains(&status) {
            return Err(ExtractionError::Permanent {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(failed(format!("HTTP {}", status.as_u16())));
        }

        let domain = response
            .url()
            .host_str()
            .map(domain_from_host)
            .unwrap_or_default();
        let html = response.text().await.map_err(|e| failed(e.to_string()))?;

        let parsed = parse_html(&html);
        let len = parsed.text.chars().count();
        if len < MIN_TEXT_LEN {
            return Err(ExtractionError::TooShort {
                url: url.to_string(),
                len,
            });
        }

        tracing::debug!(url, domain = %domain, text_len = len, "extracted page");
        let content_hash = format!("{:x}", Sha256::digest(parsed.text.as_bytes()));
        Ok(ExtractedPage {
            domain,
            title: parsed.title,
            description: parsed.description,
            text: parsed.text,
            content_hash,
        })
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct ParsedHtml {
    pub title: Option<String>,
    pub description: Option<String>,
    pub text: String,
}

pub(crate) fn parse_html(html: &str) -> ParsedHtml {
    let title = find_meta_content(html, "property", "og:title").or_else(|| {
        TITLE_RE
            .captures(html)
            .and_then(|c| c.get(1))
            .map(|m| clean_text(m.as_str()))
            .filter(|t| !t.is_empty())
    });
    let description = find_meta_content(html, "name", "description")
        .or_else(|| find_meta_content(html, "property", "og:description"));

    ParsedHtml {
        title,
        description,
        text: article_text(html),
    }
}

/// Paragraph text joined by blank lines, falling back to the whole body when
/// the page has too little paragraph markup.
fn article_text(html: &str) -> String {
    let stripped = NON_CONTENT_RE.replace_all(html, " ");

    let paragraphs: Vec<String> = PARAGRAPH_RE
        .captures_iter(&stripped)
        .filter_map(|c| c.get(1))
        .map(|m| clean_text(m.as_str()))
        .filter(|p| !p.is_empty())
        .collect();
    let joined = paragraphs.join("\n\n");
    if joined.chars().count() >= MIN_TEXT_LEN {
        return joined;
    }

    let body = BODY_RE
        .captures(&stripped)
        .and_then(|c| c.get(1))
        .map_or(&*stripped, |m| m.as_str());
    let fallback = clean_text(body);
    if fallback.chars().count() > joined.chars().count() {
        fallback
    } else {
        joined
    }
}

fn find_meta_content(html: &str, key_attr: &str, key_value: &str) -> Option<String> {
    META_TAG_RE.find_iter(html).find_map(|m| {
        let tag = m.as_str();
        let key = extract_attr(tag, key_attr)?;
        if key.eq_ignore_ascii_case(key_value) {
            extract_attr(tag, "content")
                .map(|c| clean_text(&c))
                .filter(|c| !c.is_empty())
        } else {
            None
        }
    })
}

fn extract_attr(tag: &str, attr: &str) -> Option<String> {
    ATTR_RE.captures_iter(tag).find_map(|c| {
        let name = c.get(1)?.as_str();
        if name.eq_ignore_ascii_case(attr) {
            c.get(2).or_else(|| c.get(3)).map(|v| v.as_str().to_string())
        } else {
            None
        }
    })
}

/// Drop tags, decode the common entities, and collapse whitespace.
fn clean_text(fragment: &str) -> String {
    let without_tags = TAG_RE.replace_all(fragment, " ");
    let decoded = decode_entities(&without_tags);
    WHITESPACE_RE.replace_all(&decoded, " ").trim().to_string()
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&rsquo;", "\u{2019}")
        .replace("&lsquo;", "\u{2018}")
        .replace("&amp;", "&")
}

#[cfg(test)]
#[path = "extractor_test.rs"]
mod tests;
