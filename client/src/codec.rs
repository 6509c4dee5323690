//! Newline-delimited JSON framing over the server's stdio.
//!
//! Each frame is one line of JSON. This module provides [`LineDecoder`]
//! for splitting a byte stream into lines, and [`FrameReader`] /
//! [`FrameWriter`] for async reading and writing of frames.
//!
//! Lines are only converted to text once complete, so a frame split across
//! two reads (even in the middle of a multi-byte character) decodes exactly
//! as if it had arrived in one piece.

use std::collections::VecDeque;

use anyhow::{Context, Result};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::protocol::{IncomingFrame, Request, decode_line};

/// Maximum line size (64 MiB). Longer lines are dropped up to the next newline.
pub const MAX_LINE_BYTES: usize = 64 * 1024 * 1024;

const READ_CHUNK_BYTES: usize = 16 * 1024;

#[cfg(windows)]
pub const LINE_TERMINATOR: &str = "\r\n";
#[cfg(not(windows))]
pub const LINE_TERMINATOR: &str = "\n";

/// Serialize a request frame, including the line terminator.
pub(crate) fn encode(seq: u64, command: &str, arguments: &Value) -> serde_json::Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec(&Request::new(seq, command, arguments))?;
    bytes.extend_from_slice(LINE_TERMINATOR.as_bytes());
    Ok(bytes)
}

/// Splits a byte stream on `\n`, carrying partial lines between pushes.
#[derive(Debug)]
pub struct LineDecoder {
    partial: Vec<u8>,
    max_line: usize,
    /// Set after an oversized line; bytes are dropped until the next newline.
    discarding: bool,
}

impl Default for LineDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl LineDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_line(MAX_LINE_BYTES)
    }

    #[must_use]
    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            partial: Vec::new(),
            max_line,
            discarding: false,
        }
    }

    /// Feed a chunk and collect every line it completes.
    ///
    /// Returned lines exclude the `\n` and any trailing `\r`.
    pub fn push(&mut self, mut chunk: &[u8]) -> Vec<Vec<u8>> {
        let mut lines = Vec::new();

        while let Some(pos) = chunk.iter().position(|&b| b == b'\n') {
            let (head, tail) = chunk.split_at(pos);
            if self.discarding {
                self.discarding = false;
                self.partial.clear();
            } else {
                self.partial.extend_from_slice(head);
                let mut line = std::mem::take(&mut self.partial);
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                lines.push(line);
            }
            chunk = &tail[1..];
        }

        if !self.discarding {
            self.partial.extend_from_slice(chunk);
            if self.partial.len() > self.max_line {
                tracing::warn!(
                    bytes = self.partial.len(),
                    max = self.max_line,
                    "Dropping oversized line from server"
                );
                self.partial = Vec::new();
                self.discarding = true;
            }
        }

        lines
    }

    /// Bytes buffered for the current incomplete line.
    #[must_use]
    pub fn pending_bytes(&self) -> usize {
        self.partial.len()
    }
}

/// Reads frames from an async reader.
pub struct FrameReader<R> {
    reader: R,
    decoder: LineDecoder,
    ready: VecDeque<Vec<u8>>,
    chunk: Box<[u8]>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            decoder: LineDecoder::new(),
            ready: VecDeque::new(),
            chunk: vec![0u8; READ_CHUNK_BYTES].into_boxed_slice(),
        }
    }

    /// Read the next frame.
    ///
    /// Returns `Ok(None)` on EOF. Non-frame lines are skipped and malformed
    /// frames are logged and discarded; only IO failures are errors.
    pub async fn read_frame(&mut self) -> std::io::Result<Option<IncomingFrame>> {
        loop {
            while let Some(line) = self.ready.pop_front() {
                match decode_line(&line) {
                    Some(Ok(frame)) => return Ok(Some(frame)),
                    Some(Err(e)) => {
                        tracing::warn!(
                            line = %String::from_utf8_lossy(&line[..line.len().min(200)]),
                            "Discarding undecodable frame: {e}"
                        );
                    }
                    None => {
                        if !line.is_empty() {
                            tracing::trace!(
                                line = %String::from_utf8_lossy(&line),
                                "Ignoring non-frame output"
                            );
                        }
                    }
                }
            }

            let n = self.reader.read(&mut self.chunk).await?;
            if n == 0 {
                if self.decoder.pending_bytes() > 0 {
                    tracing::debug!(
                        bytes = self.decoder.pending_bytes(),
                        "Discarding unterminated line at EOF"
                    );
                }
                return Ok(None);
            }
            self.ready.extend(self.decoder.push(&self.chunk[..n]));
        }
    }
}

/// Writes pre-encoded frames to an async writer.
pub struct FrameWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub async fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        self.writer
            .write_all(frame)
            .await
            .context("writing frame")?;
        self.writer.flush().await.context("flushing frame")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESPONSE: &str = r#"{"seq":1,"type":"response","command":"quickinfo","request_seq":1,"success":true,"body":{"text":"héllo"}}"#;

    fn decode_all(chunks: &[&[u8]]) -> Vec<Vec<u8>> {
        let mut decoder = LineDecoder::new();
        chunks.iter().flat_map(|c| decoder.push(c)).collect()
    }

    #[test]
    fn test_encode_appends_terminator() {
        let bytes = encode(3, "open", &serde_json::json!({"file": "a.ts"})).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.ends_with(LINE_TERMINATOR));
        let json: Value = serde_json::from_str(text.trim_end()).unwrap();
        assert_eq!(json["seq"], 3);
        assert_eq!(json["type"], "request");
    }

    #[test]
    fn test_split_at_every_boundary_yields_one_line() {
        let frame = format!("{RESPONSE}\n");
        let bytes = frame.as_bytes();
        let whole = decode_all(&[bytes]);
        assert_eq!(whole.len(), 1);

        for cut in 1..bytes.len() {
            let (a, b) = bytes.split_at(cut);
            let split = decode_all(&[a, b]);
            assert_eq!(split, whole, "split at byte {cut}");
        }
    }

    #[test]
    fn test_split_inside_multibyte_character() {
        let frame = format!("{RESPONSE}\n");
        let bytes = frame.as_bytes();
        let e_acute = frame.find('é').unwrap();
        let (a, b) = bytes.split_at(e_acute + 1);
        assert!(std::str::from_utf8(a).is_err(), "cut must split the character");

        let lines = decode_all(&[a, b]);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0], RESPONSE.as_bytes());
    }

    #[test]
    fn test_multiple_lines_in_one_chunk() {
        let lines = decode_all(&[b"{\"a\":1}\n{\"b\":2}\n{\"c\""]);
        assert_eq!(lines, vec![b"{\"a\":1}".to_vec(), b"{\"b\":2}".to_vec()]);
    }

    #[test]
    fn test_crlf_is_stripped() {
        let lines = decode_all(&[b"{\"a\":1}\r\n"]);
        assert_eq!(lines, vec![b"{\"a\":1}".to_vec()]);
    }

    #[test]
    fn test_partial_line_is_held() {
        let mut decoder = LineDecoder::new();
        assert!(decoder.push(b"{\"seq\":1").is_empty());
        assert_eq!(decoder.pending_bytes(), 8);
    }

    #[test]
    fn test_oversized_line_dropped_until_newline() {
        let mut decoder = LineDecoder::with_max_line(8);
        assert!(decoder.push(b"{\"aaaaaaaaaaaa").is_empty());
        assert_eq!(decoder.pending_bytes(), 0);
        assert!(decoder.push(b"aaaa").is_empty());
        let lines = decoder.push(b"aa}\n{\"b\":1}\n");
        assert_eq!(lines, vec![b"{\"b\":1}".to_vec()]);
    }

    #[tokio::test]
    async fn test_reader_skips_noise_and_bad_frames() {
        let stream = format!(
            "Content-Length: 120\r\n\r\n{{not json}}\n{RESPONSE}\n{{\"seq\":0,\"type\":\"event\",\"event\":\"telemetry\",\"body\":{{}}}}\n"
        );
        let mut reader = FrameReader::new(stream.as_bytes());

        match reader.read_frame().await.unwrap().unwrap() {
            IncomingFrame::Response(r) => assert_eq!(r.request_seq, 1),
            IncomingFrame::Event(e) => panic!("expected response, got {e:?}"),
        }
        match reader.read_frame().await.unwrap().unwrap() {
            IncomingFrame::Event(e) => assert_eq!(e.event, "telemetry"),
            IncomingFrame::Response(r) => panic!("expected event, got {r:?}"),
        }
        assert!(reader.read_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reader_eof_with_partial_line() {
        let mut reader = FrameReader::new(&b"{\"seq\":1,\"type\":\"resp"[..]);
        assert!(reader.read_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reader_handles_split_reads() {
        let (mut tx, rx) = tokio::io::duplex(64);
        let mut reader = FrameReader::new(rx);

        let writer = tokio::spawn(async move {
            tx.write_all(br#"{"seq":1,"typ"#).await.unwrap();
            tx.flush().await.unwrap();
            tokio::task::yield_now().await;
            tx.write_all(b"e\":\"response\",\"request_seq\":1,\"success\":true}\n")
                .await
                .unwrap();
        });

        match reader.read_frame().await.unwrap().unwrap() {
            IncomingFrame::Response(r) => {
                assert_eq!(r.request_seq, 1);
                assert!(r.success);
            }
            IncomingFrame::Event(e) => panic!("expected response, got {e:?}"),
        }
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_writer_flushes_frame() {
        let mut buf = Vec::new();
        let mut writer = FrameWriter::new(&mut buf);
        let frame = encode(0, "reloadProjects", &Value::Null).unwrap();
        writer.write_frame(&frame).await.unwrap();
        assert_eq!(buf, frame);
    }
}
