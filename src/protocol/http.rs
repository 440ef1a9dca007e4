//! Minimal HTTP framing for the update server.
//! Builds the fixed GET request and splits the first chunk of a reply into
//! content length and the body bytes already received.

/// Headers following `Host`, byte for byte what deployed update servers expect.
pub const REQUEST_HEADERS: &str = "Connection: keep-alive\r\n\
                                   Cache-Control: no-cache\r\n\
                                   User-Agent: rBoot-Sample/1.0\r\n\
                                   Accept: */*\r\n\r\n";

const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

pub const STATUS_OK: u16 = 200;

#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    /// Header block did not fit in the first received segment
    #[error("response head not terminated within the first segment")]
    IncompleteHead,
    #[error("response head is not valid UTF-8")]
    NotUtf8,
    #[error("malformed status line {0:?}")]
    MalformedStatusLine(String),
    #[error("server answered with status {0}")]
    Status(u16),
    #[error("response has no Content-Length header")]
    MissingContentLength,
    #[error("invalid Content-Length {0:?}")]
    BadContentLength(String),
}

/// Length and leading body bytes of a `200` reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHead<'a> {
    pub content_length: u32,
    /// Body bytes that arrived in the same segment as the head
    pub body: &'a [u8],
}

/// Render `GET <path><file>` for `host`.
pub fn build_get_request(host: &str, path: &str, file: &str) -> Vec<u8> {
    format!("GET {path}{file} HTTP/1.1\r\nHost: \"{host}\"\r\n{REQUEST_HEADERS}").into_bytes()
}

/// Parse the first segment of a response. Only `200` replies are accepted.
pub fn parse_response_head(chunk: &[u8]) -> Result<ResponseHead<'_>, HttpError> {
    let head_end = chunk
        .windows(HEAD_TERMINATOR.len())
        .position(|w| w == HEAD_TERMINATOR)
        .ok_or(HttpError::IncompleteHead)?;

    let head = std::str::from_utf8(&chunk[..head_end]).map_err(|_| HttpError::NotUtf8)?;
    let mut lines = head.split("\r\n");

    let status = parse_status_line(lines.next().unwrap_or_default())?;
    if status != STATUS_OK {
        return Err(HttpError::Status(status));
    }

    let mut content_length = None;
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                let value = value.trim();
                content_length = Some(
                    value
                        .parse::<u32>()
                        .map_err(|_| HttpError::BadContentLength(value.to_string()))?,
                );
            }
        }
    }

    Ok(ResponseHead {
        content_length: content_length.ok_or(HttpError::MissingContentLength)?,
        body: &chunk[head_end + HEAD_TERMINATOR.len()..],
    })
}

/// `HTTP/1.x NNN reason` → `NNN`
fn parse_status_line(line: &str) -> Result<u16, HttpError> {
    let malformed = || HttpError::MalformedStatusLine(line.to_string());

    let mut parts = line.split_whitespace();
    let version = parts.next().ok_or_else(malformed)?;
    if !version.starts_with("HTTP/") {
        return Err(malformed());
    }

    let code = parts.next().ok_or_else(malformed)?;
    if code.len() != 3 || !code.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed());
    }
    code.parse().map_err(|_| malformed())
}
