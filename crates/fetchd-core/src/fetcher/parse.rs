//! Parse raw response header lines collected from libcurl.

/// Headers the fetcher and webhook sender care about from the final response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ResponseHeaders {
    pub content_type: Option<String>,
    pub location: Option<String>,
    pub retry_after: Option<String>,
}

fn is_status_line(line: &str) -> bool {
    line.as_bytes()
        .get(..5)
        .is_some_and(|p| p.eq_ignore_ascii_case(b"HTTP/"))
}

/// Parse header lines. A status line (`HTTP/...`) starts a new response block,
/// so interim responses such as `100 Continue` do not leak into the result.
pub(crate) fn parse_headers(lines: &[String]) -> ResponseHeaders {
    let mut out = ResponseHeaders::default();
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if is_status_line(line) {
            out = ResponseHeaders::default();
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            let name = name.trim();
            let value = value.trim();
            if name.eq_ignore_ascii_case("content-type") {
                out.content_type = Some(value.to_string());
            }
            if name.eq_ignore_ascii_case("location") {
                out.location = Some(value.to_string());
            }
            if name.eq_ignore_ascii_case("retry-after") {
                out.retry_after = Some(value.to_string());
            }
        }
    }
    out
}
