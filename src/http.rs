//! Shared HTTP plumbing for the external adapters.
//!
//! Maps transport errors and HTTP statuses onto [`ExternalError`] and
//! provides the small text helpers both adapters need.

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use triage_harness_core::error::ExternalError;

pub const USER_AGENT: &str = concat!("triage-harness/", env!("CARGO_PKG_VERSION"));

pub fn build_client(timeout_secs: u64) -> anyhow::Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(USER_AGENT)
        .gzip(true)
        .build()?)
}

/// Timeouts, connection failures and the like are worth retrying.
pub fn transport_error(err: reqwest::Error) -> ExternalError {
    if err.is_decode() {
        ExternalError::Malformed(err.to_string())
    } else {
        ExternalError::Transient(err.to_string())
    }
}

/// `Retry-After` in seconds, if present and numeric.
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Classify a non-success status.
///
/// - 429 → rate limited
/// - 5xx → transient
/// - other 4xx → rejected
pub fn classify_status(status: StatusCode, headers: &HeaderMap, body: &str) -> ExternalError {
    let message = first_line(body, 200);
    match status.as_u16() {
        429 => ExternalError::RateLimited {
            retry_after: retry_after(headers),
        },
        500..=599 => ExternalError::Transient(format!("HTTP {}: {}", status.as_u16(), message)),
        code => ExternalError::Rejected {
            status: code,
            message,
        },
    }
}

fn first_line(body: &str, max: usize) -> String {
    let line = body.lines().next().unwrap_or("").trim();
    triage_harness_core::signals::truncate_chars(line, max)
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<[^>]*>").expect("static tag pattern"))
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("static whitespace pattern"))
}

/// Decode the handful of HTML entities the Q&A API emits in titles.
pub fn decode_entities(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

/// Strip tags, decode entities, and collapse whitespace.
pub fn strip_html(html: &str) -> String {
    let text = tag_re().replace_all(html, " ");
    let text = decode_entities(&text);
    whitespace_re().replace_all(text.trim(), " ").into_owned()
}


/// Minimal HTTP/1.1 server for adapter tests. Serves `pages[n - 1]` for a
/// request carrying `page=n`, and `[]` past the end.
#[cfg(test)]
pub(crate) mod stub {
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn requested_page(request: &str) -> usize {
        request
            .split_whitespace()
            .nth(1)
            .and_then(|target| {
                target
                    .split(['?', '&'])
                    .find_map(|pair| pair.strip_prefix("page="))
            })
            .and_then(|n| n.parse().ok())
            .unwrap_or(1)
    }

    /// Start the server and return its base URL.
    pub async fn serve_pages(pages: Vec<String>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let pages = Arc::new(pages);
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let pages = pages.clone();
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 16 * 1024];
                    let mut read = 0;
                    while read < buf.len() {
                        let n = stream.read(&mut buf[read..]).await.unwrap_or(0);
                        if n == 0 {
                            break;
                        }
                        read += n;
                        if buf[..read].windows(4).any(|w| w == b"\r\n\r\n") {
                            break;
                        }
                    }
                    let request = String::from_utf8_lossy(&buf[..read]).to_string();
                    let body = pages
                        .get(requested_page(&request).saturating_sub(1))
                        .cloned()
                        .unwrap_or_else(|| "[]".to_string());
                    let response = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    let _ = stream.write_all(response.as_bytes()).await;
                    let _ = stream.shutdown().await;
                });
            }
        });
        format!("http://{}", addr)
    }

    #[test]
    fn test_requested_page() {
        assert_eq!(requested_page("GET /x?state=all&per_page=2&page=3 HTTP/1.1"), 3);
        assert_eq!(requested_page("GET /x?per_page=2 HTTP/1.1"), 1);
    }
}
