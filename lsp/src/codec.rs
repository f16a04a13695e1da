//! JSON-RPC framing codec.
//!
//! Both sides of the bridge speak `Content-Length: N\r\n\r\n{json}` framing:
//! language servers over their stdio, and the editor over ours. This module
//! provides [`FrameReader`] and [`FrameWriter`] for async reading and writing
//! of framed JSON-RPC messages.

use anyhow::{Context, Result, bail};
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// Default maximum frame size. Full-document `didOpen` payloads from the
/// editor are the largest frames in practice.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Reads JSON-RPC frames from an async reader.
pub struct FrameReader<R> {
    reader: BufReader<R>,
    max_frame_bytes: usize,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self::with_limit(reader, DEFAULT_MAX_FRAME_BYTES)
    }

    pub fn with_limit(reader: R, max_frame_bytes: usize) -> Self {
        Self {
            reader: BufReader::new(reader),
            max_frame_bytes,
        }
    }

    /// Read the next JSON-RPC frame.
    ///
    /// Returns `Ok(None)` on a clean EOF between frames.
    pub async fn read_frame(&mut self) -> Result<Option<Value>> {
        let Some(content_length) = self.read_headers().await? else {
            return Ok(None);
        };

        if content_length > self.max_frame_bytes {
            bail!(
                "Content-Length {content_length} exceeds maximum {}",
                self.max_frame_bytes
            );
        }

        let mut body = vec![0u8; content_length];
        self.reader
            .read_exact(&mut body)
            .await
            .context("reading frame body")?;

        let value = serde_json::from_slice(&body).context("parsing JSON-RPC frame")?;
        Ok(Some(value))
    }

    async fn read_headers(&mut self) -> Result<Option<usize>> {
        let mut content_length = None;
        let mut line = String::new();
        let mut started = false;

        loop {
            line.clear();
            let bytes_read = self
                .reader
                .read_line(&mut line)
                .await
                .context("reading header line")?;

            if bytes_read == 0 {
                if started {
                    bail!("unexpected EOF while reading headers");
                }
                return Ok(None);
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                // Blank lines before the first header are tolerated.
                if started {
                    break;
                }
                continue;
            }
            started = true;

            if let Some(len) = parse_content_length(trimmed)? {
                content_length = Some(len);
            }
        }

        content_length
            .map(Some)
            .context("missing Content-Length header")
    }
}

/// `Ok(Some(n))` for a `Content-Length` header, `Ok(None)` for any other header.
fn parse_content_length(header: &str) -> Result<Option<usize>> {
    let Some((key, value)) = header.split_once(':') else {
        return Ok(None);
    };
    if !key.trim().eq_ignore_ascii_case("Content-Length") {
        return Ok(None);
    }
    let len = value
        .trim()
        .parse()
        .with_context(|| format!("invalid Content-Length value {:?}", value.trim()))?;
    Ok(Some(len))
}

/// Writes JSON-RPC frames to an async writer.
pub struct FrameWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Serialize `msg` and write it with its `Content-Length` header.
    pub async fn write_frame<T: Serialize + ?Sized>(&mut self, msg: &T) -> Result<()> {
        let body = serde_json::to_vec(msg).context("serializing JSON-RPC frame")?;
        let header = format!("Content-Length: {}\r\n\r\n", body.len());

        self.writer
            .write_all(header.as_bytes())
            .await
            .context("writing frame header")?;
        self.writer
            .write_all(&body)
            .await
            .context("writing frame body")?;
        self.writer.flush().await.context("flushing frame")?;

        Ok(())
    }

    /// Flush and shut down the underlying writer, closing the peer's input.
    pub async fn close(&mut self) -> Result<()> {
        self.writer.shutdown().await.context("closing frame writer")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn encode(msgs: &[Value]) -> Vec<u8> {
        let mut buf = Vec::new();
        let mut writer = FrameWriter::new(&mut buf);
        for msg in msgs {
            writer.write_frame(msg).await.unwrap();
        }
        buf
    }

    #[tokio::test]
    async fn reads_back_consecutive_frames() {
        let first = serde_json::json!({"jsonrpc": "2.0", "id": 1, "method": "initialize"});
        let second = serde_json::json!({"jsonrpc": "2.0", "method": "initialized", "params": {}});
        let buf = encode(&[first.clone(), second.clone()]).await;

        let mut reader = FrameReader::new(buf.as_slice());
        assert_eq!(reader.read_frame().await.unwrap(), Some(first));
        assert_eq!(reader.read_frame().await.unwrap(), Some(second));
        assert_eq!(reader.read_frame().await.unwrap(), None);
    }

    #[tokio::test]
    async fn eof_before_any_header_is_clean() {
        let mut reader = FrameReader::new(&b""[..]);
        assert!(reader.read_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn eof_inside_headers_is_an_error() {
        let mut reader = FrameReader::new(&b"Content-Length: 10\r\n"[..]);
        assert!(reader.read_frame().await.is_err());
    }

    #[tokio::test]
    async fn eof_inside_body_is_an_error() {
        let mut reader = FrameReader::new(&b"Content-Length: 100\r\n\r\nhello"[..]);
        assert!(reader.read_frame().await.is_err());
    }

    #[tokio::test]
    async fn missing_content_length_is_an_error() {
        let mut reader = FrameReader::new(&b"Content-Type: application/json\r\n\r\n{}"[..]);
        assert!(reader.read_frame().await.is_err());
    }

    #[tokio::test]
    async fn header_name_is_case_insensitive_and_extras_ignored() {
        let body = r#"{"jsonrpc":"2.0","id":1}"#;
        let frame = format!(
            "content-type: application/vscode-jsonrpc; charset=utf-8\r\ncontent-length: {}\r\n\r\n{body}",
            body.len()
        );
        let mut reader = FrameReader::new(frame.as_bytes());
        let value = reader.read_frame().await.unwrap().unwrap();
        assert_eq!(value["id"], 1);
    }

    #[tokio::test]
    async fn leading_blank_lines_are_skipped() {
        let body = r#"{"id":3}"#;
        let frame = format!("\r\nContent-Length: {}\r\n\r\n{body}", body.len());
        let mut reader = FrameReader::new(frame.as_bytes());
        assert_eq!(reader.read_frame().await.unwrap().unwrap()["id"], 3);
    }

    #[tokio::test]
    async fn frame_limit_is_enforced() {
        let frame = b"Content-Length: 65\r\n\r\n";
        let mut reader = FrameReader::with_limit(&frame[..], 64);
        let err = reader.read_frame().await.unwrap_err();
        assert!(err.to_string().contains("exceeds maximum 64"));
    }

    #[tokio::test]
    async fn invalid_length_and_body_are_errors() {
        let mut reader = FrameReader::new(&b"Content-Length: twelve\r\n\r\n"[..]);
        assert!(reader.read_frame().await.is_err());

        let mut reader = FrameReader::new(&b"Content-Length: 3\r\n\r\n{{{"[..]);
        assert!(reader.read_frame().await.is_err());
    }

    #[tokio::test]
    async fn content_length_counts_bytes() {
        let msg = serde_json::json!({"text": "é"});
        let buf = encode(std::slice::from_ref(&msg)).await;
        let body = serde_json::to_vec(&msg).unwrap();
        let header = format!("Content-Length: {}\r\n\r\n", body.len());
        assert!(buf.starts_with(header.as_bytes()));

        let mut reader = FrameReader::new(buf.as_slice());
        assert_eq!(reader.read_frame().await.unwrap(), Some(msg));
    }
}
