//! Incremental HTTP/1.1 response parser.
//!
//! Bytes are fed in as they arrive; [`ResponseParser::try_complete`] yields a
//! [`Response`] once a full message is buffered. Framing follows the message:
//! no body for HEAD responses and 1xx/204/304 statuses, `Content-Length` when
//! present, chunked transfer coding, and otherwise read-until-close resolved
//! by [`ResponseParser::finish_eof`]. Bytes past the end of a message stay
//! buffered for the next one.

use crate::error::ParseError;
use crate::http::message::Response;

pub struct ResponseParser {
    buf: Vec<u8>,
    head_only: bool,
}

enum Framing {
    None,
    Length(usize),
    Chunked,
    UntilClose,
}

struct Head {
    status: u16,
    reason: String,
    headers: Vec<(String, String)>,
}

impl Head {
    fn into_response(self, body: Vec<u8>) -> Response {
        Response {
            status: self.status,
            reason: self.reason,
            headers: self.headers,
            body,
        }
    }
}

impl ResponseParser {
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            head_only: false,
        }
    }

    /// Clears buffered state for a new exchange. `head_only` marks a HEAD
    /// request, whose response carries headers but never a body.
    pub fn reset(&mut self, head_only: bool) {
        self.buf.clear();
        self.head_only = head_only;
    }

    pub fn feed(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Returns a complete response if one is buffered, `None` if more bytes
    /// are needed.
    pub fn try_complete(&mut self) -> Result<Option<Response>, ParseError> {
        let Some(head_end) = find(&self.buf, b"\r\n\r\n") else {
            return Ok(None);
        };
        let head = parse_head(&self.buf[..head_end])?;
        let body_start = head_end + 4;

        match framing(&head, self.head_only)? {
            Framing::None => {
                self.buf.drain(..body_start);
                Ok(Some(head.into_response(Vec::new())))
            }
            Framing::Length(length) => {
                if self.buf.len() - body_start < length {
                    return Ok(None);
                }
                let body = self.buf[body_start..body_start + length].to_vec();
                self.buf.drain(..body_start + length);
                Ok(Some(head.into_response(body)))
            }
            Framing::Chunked => match decode_chunked(&self.buf[body_start..])? {
                Some((body, consumed)) => {
                    self.buf.drain(..body_start + consumed);
                    Ok(Some(head.into_response(body)))
                }
                None => Ok(None),
            },
            Framing::UntilClose => Ok(None),
        }
    }

    /// Resolves the exchange after the peer closed the connection.
    ///
    /// Completes a read-until-close body, returns `Ok(None)` if nothing was
    /// received at all, and reports a truncated length-framed or chunked
    /// message as [`ParseError::UnexpectedEof`].
    pub fn finish_eof(&mut self) -> Result<Option<Response>, ParseError> {
        if let Some(response) = self.try_complete()? {
            return Ok(Some(response));
        }

        let Some(head_end) = find(&self.buf, b"\r\n\r\n") else {
            if self.buf.is_empty() {
                return Ok(None);
            }
            return Err(ParseError::UnexpectedEof);
        };
        let head = parse_head(&self.buf[..head_end])?;
        let body_start = head_end + 4;

        match framing(&head, self.head_only)? {
            Framing::UntilClose => {
                let body = self.buf[body_start..].to_vec();
                self.buf.clear();
                Ok(Some(head.into_response(body)))
            }
            _ => Err(ParseError::UnexpectedEof),
        }
    }
}

impl Default for ResponseParser {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_head(head: &[u8]) -> Result<Head, ParseError> {
    let text = std::str::from_utf8(head).map_err(|_| ParseError::BadHeader)?;
    let mut lines = text.split("\r\n");

    let status_line = lines.next().ok_or(ParseError::BadStatusLine)?;
    let mut parts = status_line.splitn(3, ' ');
    let version = parts.next().ok_or(ParseError::BadStatusLine)?;
    if !version.starts_with("HTTP/") {
        return Err(ParseError::BadStatusLine);
    }
    let status = parts
        .next()
        .and_then(|s| s.parse::<u16>().ok())
        .ok_or(ParseError::BadStatusLine)?;
    let reason = parts.next().unwrap_or("").to_string();

    let mut headers = Vec::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let (name, value) = line.split_once(':').ok_or(ParseError::BadHeader)?;
        headers.push((name.trim().to_string(), value.trim().to_string()));
    }

    Ok(Head {
        status,
        reason,
        headers,
    })
}

fn framing(head: &Head, head_only: bool) -> Result<Framing, ParseError> {
    if head_only || head.status / 100 == 1 || head.status == 204 || head.status == 304 {
        return Ok(Framing::None);
    }

    let lookup = |name: &str| {
        head.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    };

    if lookup("Transfer-Encoding").is_some_and(|v| v.to_ascii_lowercase().contains("chunked")) {
        return Ok(Framing::Chunked);
    }
    if let Some(value) = lookup("Content-Length") {
        let length = value
            .trim()
            .parse::<usize>()
            .map_err(|_| ParseError::BadContentLength)?;
        return Ok(Framing::Length(length));
    }
    Ok(Framing::UntilClose)
}

/// Decodes a complete chunked body, returning it with the number of input
/// bytes consumed, or `None` if the input is still incomplete.
fn decode_chunked(data: &[u8]) -> Result<Option<(Vec<u8>, usize)>, ParseError> {
    let mut pos = 0;
    let mut body = Vec::new();

    loop {
        let Some(line_end) = find(&data[pos..], b"\r\n") else {
            return Ok(None);
        };
        let line = std::str::from_utf8(&data[pos..pos + line_end])
            .map_err(|_| ParseError::BadChunk)?;
        let size_text = line.split(';').next().unwrap_or("").trim();
        let size = usize::from_str_radix(size_text, 16).map_err(|_| ParseError::BadChunk)?;
        let chunk_start = pos + line_end + 2;

        if size == 0 {
            // Optional trailers, then a final CRLF.
            let rest = &data[chunk_start..];
            if rest.starts_with(b"\r\n") {
                return Ok(Some((body, chunk_start + 2)));
            }
            return match find(rest, b"\r\n\r\n") {
                Some(end) => Ok(Some((body, chunk_start + end + 4))),
                None => Ok(None),
            };
        }

        if data.len() < chunk_start + size + 2 {
            return Ok(None);
        }
        body.extend_from_slice(&data[chunk_start..chunk_start + size]);
        if &data[chunk_start + size..chunk_start + size + 2] != b"\r\n" {
            return Err(ParseError::BadChunk);
        }
        pos = chunk_start + size + 2;
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
