use std::io;

use serde_json::Value;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, Stdin,
    Stdout,
};
use tracing::trace;

use crate::errors::TransportError;

/// Newline-delimited JSON framing over an async reader/writer pair.
///
/// Each frame is one JSON value on a single line. Lines whose content, not
/// counting the `\n` or `\r\n` terminator, is longer than `max_frame_bytes`
/// are skipped entirely and reported as framing errors.
#[derive(Debug)]
pub struct LineTransport<R, W> {
    reader: R,
    writer: W,
    max_frame_bytes: usize,
    buffer: Vec<u8>,
}

pub type StdioTransport = LineTransport<BufReader<Stdin>, Stdout>;

impl StdioTransport {
    pub fn stdio(max_frame_bytes: usize) -> Self {
        Self::new(
            BufReader::new(tokio::io::stdin()),
            tokio::io::stdout(),
            max_frame_bytes,
        )
    }
}

impl<R, W> LineTransport<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W, max_frame_bytes: usize) -> Self {
        Self {
            reader,
            writer,
            max_frame_bytes,
            buffer: Vec::new(),
        }
    }

    /// Reads the next frame. `Ok(None)` means the peer closed the stream.
    pub async fn read_frame(&mut self) -> Result<Option<Value>, TransportError> {
        loop {
            self.buffer.clear();
            // Room for the content plus a `\r\n` terminator.
            let limit = self.max_frame_bytes as u64 + 2;
            let read = (&mut self.reader)
                .take(limit)
                .read_until(b'\n', &mut self.buffer)
                .await?;

            if read == 0 {
                return Ok(None);
            }

            let terminated = self.buffer.last() == Some(&b'\n');
            if !terminated && read as u64 == limit {
                self.discard_line().await?;
                return Err(self.oversized());
            }

            let line = trim_line_ending(&self.buffer);
            if line.len() > self.max_frame_bytes {
                return Err(self.oversized());
            }
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            let text = std::str::from_utf8(line)
                .map_err(|_| TransportError::framing("frame is not valid UTF-8"))?;
            trace!(bytes = line.len(), "frame received");

            return serde_json::from_str(text)
                .map(Some)
                .map_err(|err| TransportError::framing(format!("invalid JSON: {err}")));
        }
    }

    pub async fn write_frame(&mut self, frame: &Value) -> Result<(), TransportError> {
        let mut encoded = serde_json::to_vec(frame)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        encoded.push(b'\n');

        self.writer.write_all(&encoded).await?;
        self.writer.flush().await?;
        trace!(bytes = encoded.len(), "frame sent");
        Ok(())
    }

    fn oversized(&self) -> TransportError {
        TransportError::framing(format!("frame exceeds {} bytes", self.max_frame_bytes))
    }

    /// Consumes input up to and including the next newline without buffering it.
    async fn discard_line(&mut self) -> Result<(), TransportError> {
        loop {
            let (consumed, done) = {
                let available = self.reader.fill_buf().await?;
                if available.is_empty() {
                    (0, true)
                } else {
                    match available.iter().position(|byte| *byte == b'\n') {
                        Some(position) => (position + 1, true),
                        None => (available.len(), false),
                    }
                }
            };

            self.reader.consume(consumed);
            if done {
                return Ok(());
            }
        }
    }

    pub fn into_parts(self) -> (R, W) {
        (self.reader, self.writer)
    }
}

fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
