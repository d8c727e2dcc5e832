//! Response content decoding.
//!
//! Every request advertises `Accept-Encoding: br, zstd, gzip`; the bodies are
//! decoded here before they reach the XML parser.

use async_compression::tokio::bufread::{BrotliDecoder, GzipDecoder, ZstdDecoder};
use bytes::Bytes;
use futures_util::TryStreamExt;
use http_body_util::BodyStream;
use hyper::body::Incoming;
use hyper::{HeaderMap, header, http};
use tokio::io::{AsyncBufRead, AsyncReadExt, BufReader};
use tokio_util::io::StreamReader;

use crate::error::{Error, Result};

/// Content encodings the client can decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentEncoding {
    Identity,
    Br,
    Gzip,
    Zstd,
}

impl ContentEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentEncoding::Identity => "identity",
            ContentEncoding::Br => "br",
            ContentEncoding::Gzip => "gzip",
            ContentEncoding::Zstd => "zstd",
        }
    }
}

/// Read the response `Content-Encoding` header into the ordered chain of encodings.
///
/// Ordered from first applied to last applied, as sent by the server. Empty means
/// identity.
pub fn detect_encodings(headers: &HeaderMap) -> Vec<ContentEncoding> {
    let Some(val) = headers.get(header::CONTENT_ENCODING) else {
        return Vec::new();
    };

    let Ok(raw) = val.to_str() else {
        return Vec::new();
    };

    raw.split(',')
        .filter_map(|token| match token.trim().to_ascii_lowercase().as_str() {
            "br" => Some(ContentEncoding::Br),
            "gzip" | "x-gzip" => Some(ContentEncoding::Gzip),
            "zstd" | "zst" => Some(ContentEncoding::Zstd),
            _ => None,
        })
        .collect()
}

/// Insert an `Accept-Encoding` header (`br, zstd, gzip`) if not already present.
pub fn add_accept_encoding(h: &mut HeaderMap) {
    if !h.contains_key(header::ACCEPT_ENCODING) {
        h.insert(
            header::ACCEPT_ENCODING,
            http::HeaderValue::from_static("br, zstd, gzip"),
        );
    }
}

/// Aggregate a response body, undoing the given encodings.
pub async fn decompress_body(body: Incoming, encodings: &[ContentEncoding]) -> Result<Bytes> {
    let stream = BodyStream::new(body)
        .map_ok(|frame| frame.into_data().unwrap_or_default())
        .map_err(std::io::Error::other);
    let reader = BufReader::new(StreamReader::new(stream));
    let mut current: Box<dyn AsyncBufRead + Unpin + Send> = Box::new(reader);

    for encoding in encodings.iter().rev() {
        current = match encoding {
            ContentEncoding::Identity => current,
            ContentEncoding::Br => Box::new(BufReader::new(BrotliDecoder::new(current))),
            ContentEncoding::Gzip => Box::new(BufReader::new(GzipDecoder::new(current))),
            ContentEncoding::Zstd => Box::new(BufReader::new(ZstdDecoder::new(current))),
        };
    }

    let mut out = Vec::with_capacity(32 * 1024);
    current
        .read_to_end(&mut out)
        .await
        .map_err(|err| Error::transport("failed to read response body", err))?;

    Ok(Bytes::from(out))
}
