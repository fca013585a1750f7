//! Compression stages: gzip request bodies, decode compressed replies.

use std::io::{Read, Write};

use async_trait::async_trait;
use flate2::read::{GzDecoder, ZlibDecoder};
use flate2::write::GzEncoder;
use flate2::Compression;
use reqwest::header::{HeaderValue, ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_LENGTH};

use super::{Next, Plugin};
use crate::error::Result;
use crate::transport::request::{OutgoingRequest, Reply};

/// Decoded replies are truncated to this many bytes.
pub const MAX_DECODED_REPLY: u64 = 1024 * 1024;

/// Gzip-encodes the request body and sets `Content-Encoding: gzip`.
pub struct GzipEncoderPlugin;

#[async_trait]
impl Plugin for GzipEncoderPlugin {
    fn name(&self) -> &'static str {
        "gzip_encoder"
    }

    async fn handle(&self, mut request: OutgoingRequest, next: Next<'_>) -> Result<Reply> {
        request.body = gzip(&request.body)?;
        request
            .headers
            .insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        request.headers.remove(CONTENT_LENGTH);
        next.run(request).await
    }
}

/**
 * Advertises `gzip` and `deflate` support and transparently decodes replies
 * that use either encoding, up to `MAX_DECODED_REPLY` bytes. Unknown
 * encodings are passed through as-is.
 */
pub struct DecoderPlugin;

#[async_trait]
impl Plugin for DecoderPlugin {
    fn name(&self) -> &'static str {
        "decoder"
    }

    async fn handle(&self, mut request: OutgoingRequest, next: Next<'_>) -> Result<Reply> {
        request
            .headers
            .insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip, deflate"));

        let mut reply = next.run(request).await?;

        let encoding = reply
            .headers
            .get(CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_ascii_lowercase());

        let decoded = match encoding.as_deref() {
            Some("gzip") | Some("x-gzip") => Some(read_all(GzDecoder::new(reply.body.as_slice()))?),
            Some("deflate") => Some(read_all(ZlibDecoder::new(reply.body.as_slice()))?),
            _ => None,
        };

        if let Some(body) = decoded {
            reply.body = body;
            reply.headers.remove(CONTENT_ENCODING);
            reply.headers.remove(CONTENT_LENGTH);
        }

        Ok(reply)
    }
}

fn gzip(body: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(body)?;
    encoder.finish()
}

fn read_all(reader: impl Read) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    reader.take(MAX_DECODED_REPLY).read_to_end(&mut out)?;
    Ok(out)
}
