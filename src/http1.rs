//! HTTP/1.1 response decoding over one finished connection buffer.
//!
//! The status line and header block are parsed with `httparse`. The body is
//! framed by, in order of precedence: a body-less status code, chunked
//! transfer coding, `Content-Length`, and finally the end of the buffer.
//! Header values and the body are slices of the input buffer.

use bytes::Bytes;
use thiserror::Error;

use crate::error::ProtocolParseError;

/// Maximum number of headers accepted in one response.
pub const MAX_HEADERS: usize = 64;

/// HTTP/1 decode failure.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum Http1Error {
    /// The buffer does not start with a valid `HTTP/1.x <code>` line.
    #[error("missing or invalid status line")]
    InvalidStatusLine,
    /// The header block is not terminated by an empty line.
    #[error("header block is not terminated")]
    UnterminatedHeaders,
    /// A header line is malformed.
    #[error("malformed header: {0}")]
    InvalidHeader(httparse::Error),
    /// The response carries more than [`MAX_HEADERS`] headers.
    #[error("more than {MAX_HEADERS} headers")]
    TooManyHeaders,
    /// `Content-Length` is not a decimal integer, or repeated with
    /// conflicting values.
    #[error("invalid Content-Length")]
    InvalidContentLength,
    /// The buffer ends before the declared body length.
    #[error("body too short: declared {declared} bytes, {available} available")]
    BodyTooShort {
        /// Length announced by `Content-Length`.
        declared: usize,
        /// Bytes present after the header block.
        available: usize,
    },
    /// A chunk size line is malformed.
    #[error("invalid chunk size")]
    InvalidChunkSize,
    /// The chunked body ends before its terminating chunk.
    #[error("incomplete chunked body")]
    IncompleteChunked,
}

/// A decoded HTTP/1.x response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Http1Message {
    /// Numeric status code.
    pub status_code: u16,
    /// Reason phrase, possibly empty.
    pub reason: String,
    /// Minor protocol version (`1` for HTTP/1.1).
    pub version: u8,
    /// Headers in wire order.
    pub headers: Vec<(String, Bytes)>,
    /// Body with transfer coding removed.
    pub body: Bytes,
}

impl Http1Message {
    /// First value of header `name`, compared case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&Bytes> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    /// Declared `Content-Length`, if present and valid.
    #[must_use]
    pub fn content_length(&self) -> Option<usize> {
        self.header("content-length")
            .and_then(|v| std::str::from_utf8(v).ok())
            .and_then(|v| v.trim().parse().ok())
    }

    /// `Content-Type` value, if present and UTF-8.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
            .and_then(|v| std::str::from_utf8(v).ok())
    }
}

/// Decode `buf` as exactly one HTTP/1.x response.
///
/// Bytes after a `Content-Length` body are ignored.
///
/// # Errors
///
/// Returns [`ProtocolParseError::Http1`] for a missing or invalid status
/// line, an unterminated or malformed header block, an invalid
/// `Content-Length`, a body shorter than declared, or an incomplete chunked
/// body.
///
/// # Examples
///
/// ```
/// use bytes::Bytes;
/// use streamtap::http1::decode_response;
///
/// let msg = decode_response(Bytes::from_static(
///     b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello",
/// ))
/// .expect("valid response");
/// assert_eq!(msg.status_code, 200);
/// assert_eq!(msg.body.as_ref(), b"hello");
/// ```
pub fn decode_response(buf: Bytes) -> Result<Http1Message, ProtocolParseError> {
    let mut slots = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut response = httparse::Response::new(&mut slots);

    let body_start = match response.parse(&buf) {
        Ok(httparse::Status::Complete(end)) => end,
        Ok(httparse::Status::Partial) if response.code.is_some() && buf.contains(&b'\n') => {
            return Err(Http1Error::UnterminatedHeaders.into());
        }
        Ok(httparse::Status::Partial) => return Err(Http1Error::InvalidStatusLine.into()),
        Err(httparse::Error::TooManyHeaders) => return Err(Http1Error::TooManyHeaders.into()),
        Err(
            httparse::Error::Status | httparse::Error::Version | httparse::Error::Token,
        ) => return Err(Http1Error::InvalidStatusLine.into()),
        Err(other) => return Err(Http1Error::InvalidHeader(other).into()),
    };

    let (Some(status_code), Some(version)) = (response.code, response.version) else {
        return Err(Http1Error::InvalidStatusLine.into());
    };
    let reason = response.reason.unwrap_or_default().to_owned();
    let headers: Vec<(String, Bytes)> = response
        .headers
        .iter()
        .map(|h| (h.name.to_owned(), buf.slice_ref(h.value)))
        .collect();

    let rest = buf.slice(body_start..);
    let body = if has_no_body(status_code) {
        Bytes::new()
    } else if is_chunked(&headers) {
        decode_chunked(&rest)?
    } else if let Some(declared) = declared_length(&headers)? {
        if rest.len() < declared {
            return Err(Http1Error::BodyTooShort {
                declared,
                available: rest.len(),
            }
            .into());
        }
        rest.slice(..declared)
    } else {
        rest
    };

    Ok(Http1Message {
        status_code,
        reason,
        version,
        headers,
        body,
    })
}

fn has_no_body(status: u16) -> bool { (100..200).contains(&status) || status == 204 || status == 304 }

fn is_chunked(headers: &[(String, Bytes)]) -> bool {
    headers
        .iter()
        .filter(|(n, _)| n.eq_ignore_ascii_case("transfer-encoding"))
        .filter_map(|(_, v)| std::str::from_utf8(v).ok())
        .flat_map(|v| v.split(','))
        .last()
        .is_some_and(|coding| coding.trim().eq_ignore_ascii_case("chunked"))
}

fn declared_length(headers: &[(String, Bytes)]) -> Result<Option<usize>, Http1Error> {
    let mut declared = None;
    for (_, value) in headers
        .iter()
        .filter(|(n, _)| n.eq_ignore_ascii_case("content-length"))
    {
        let parsed: usize = std::str::from_utf8(value)
            .ok()
            .map(str::trim)
            .filter(|v| !v.is_empty() && v.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|v| v.parse().ok())
            .ok_or(Http1Error::InvalidContentLength)?;
        match declared {
            Some(previous) if previous != parsed => return Err(Http1Error::InvalidContentLength),
            _ => declared = Some(parsed),
        }
    }
    Ok(declared)
}

/// Remove chunked transfer coding. Trailer fields are skipped.
fn decode_chunked(mut rest: &[u8]) -> Result<Bytes, Http1Error> {
    let mut body = Vec::new();
    loop {
        let (consumed, size) = match httparse::parse_chunk_size(rest) {
            Ok(httparse::Status::Complete(parsed)) => parsed,
            Ok(httparse::Status::Partial) => return Err(Http1Error::IncompleteChunked),
            Err(httparse::InvalidChunkSize) => return Err(Http1Error::InvalidChunkSize),
        };
        rest = &rest[consumed..];

        if size == 0 {
            return if rest.starts_with(b"\r\n") || contains_crlf_crlf(rest) {
                Ok(body.into())
            } else {
                Err(Http1Error::IncompleteChunked)
            };
        }

        let size = usize::try_from(size).map_err(|_| Http1Error::IncompleteChunked)?;
        let chunk = rest
            .get(..size)
            .ok_or(Http1Error::IncompleteChunked)?;
        body.extend_from_slice(chunk);
        rest = rest
            .get(size..)
            .and_then(|tail| tail.strip_prefix(b"\r\n"))
            .ok_or(Http1Error::IncompleteChunked)?;
    }
}

fn contains_crlf_crlf(bytes: &[u8]) -> bool { bytes.windows(4).any(|w| w == b"\r\n\r\n") }
