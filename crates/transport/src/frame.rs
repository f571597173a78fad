//! Newline-delimited JSON framing.
//!
//! One frame per line. Requests are multiplexed by `id`; a request's answer is
//! zero or more `Record` frames followed by exactly one `Done` or `Failed`.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};

use kvsoak_rpc::{Request, Response, RpcError};

/// Longest line accepted from a peer, in bytes.
pub const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// One message on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Request id chosen by the client; echoed on every answer frame.
    pub id: u64,
    /// Payload.
    pub body: FrameBody,
}

/// Frame payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FrameBody {
    /// Client to server: a request.
    Request(Request),
    /// Server to client: one streamed row.
    Record(serde_json::Value),
    /// Server to client: final success.
    Done(Response),
    /// Server to client: final failure.
    Failed(RpcError),
}

impl FrameBody {
    /// True for `Done` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, FrameBody::Done(_) | FrameBody::Failed(_))
    }
}

impl Frame {
    /// Serialize to one newline-terminated line.
    pub fn encode(&self) -> Result<Vec<u8>, RpcError> {
        let mut buf = serde_json::to_vec(self)
            .map_err(|e| RpcError::protocol(format!("cannot encode frame {}: {}", self.id, e)))?;
        buf.push(b'\n');
        Ok(buf)
    }

    /// Parse one line (without its terminator).
    pub fn decode(line: &str) -> Result<Frame, RpcError> {
        Self::decode_slice(line.as_bytes())
    }

    fn decode_slice(line: &[u8]) -> Result<Frame, RpcError> {
        if line.len() > MAX_FRAME_BYTES {
            return Err(too_long(line.len(), MAX_FRAME_BYTES));
        }
        serde_json::from_slice(line).map_err(|e| RpcError::protocol(format!("bad frame: {}", e)))
    }
}

fn too_long(len: usize, limit: usize) -> RpcError {
    RpcError::protocol(format!(
        "frame of {} bytes exceeds limit of {}",
        len, limit
    ))
}

/// Reads frames off a byte stream, never buffering more than one line of at
/// most `limit` bytes.
///
/// [`next_frame`](Self::next_frame) is cancel safe: a partial line survives a
/// dropped call and is completed by the next one.
pub struct FrameReader<R> {
    inner: BufReader<R>,
    line: Vec<u8>,
    limit: usize,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Reader with the [`MAX_FRAME_BYTES`] limit.
    pub fn new(inner: R) -> Self {
        Self::with_limit(inner, MAX_FRAME_BYTES)
    }

    pub fn with_limit(inner: R, limit: usize) -> Self {
        Self {
            inner: BufReader::new(inner),
            line: Vec::new(),
            limit,
        }
    }

    /// Next frame, skipping blank lines. `Ok(None)` at end of stream.
    ///
    /// I/O failures are `TransportUnavailable`; oversized or malformed lines
    /// are `ProtocolError`.
    pub async fn next_frame(&mut self) -> Result<Option<Frame>, RpcError> {
        loop {
            // Room for the line plus its terminator; one byte more is a violation.
            let budget = (self.limit + 1).saturating_sub(self.line.len()) as u64;
            let read = (&mut self.inner)
                .take(budget)
                .read_until(b'\n', &mut self.line)
                .await
                .map_err(|e| RpcError::transport(format!("read failed: {}", e)))?;

            if self.line.last() == Some(&b'\n') {
                self.line.pop();
                if self.line.last() == Some(&b'\r') {
                    self.line.pop();
                }
                let line = std::mem::take(&mut self.line);
                if line.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }
                return Frame::decode_slice(&line).map(Some);
            }
            if self.line.len() > self.limit {
                let len = self.line.len();
                self.line = Vec::new();
                return Err(too_long(len, self.limit));
            }
            if read == 0 {
                // End of stream, possibly after an unterminated last line.
                let line = std::mem::take(&mut self.line);
                if line.iter().all(u8::is_ascii_whitespace) {
                    return Ok(None);
                }
                return Frame::decode_slice(&line).map(Some);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvsoak_rpc::ErrorKind;

    #[test]
    fn encoded_frame_is_one_line() {
        let frame = Frame {
            id: 7,
            body: FrameBody::Request(Request::Ping),
        };
        let bytes = frame.encode().unwrap();
        assert_eq!(bytes.last(), Some(&b'\n'));
        assert_eq!(bytes.iter().filter(|b| **b == b'\n').count(), 1);

        let line = std::str::from_utf8(&bytes).unwrap().trim_end();
        assert_eq!(Frame::decode(line).unwrap(), frame);
    }

    #[test]
    fn garbage_is_a_protocol_error() {
        let err = Frame::decode("{not json").unwrap_err();
        assert_eq!(err.kind, ErrorKind::ProtocolError);
    }

    fn ping_line(id: u64) -> Vec<u8> {
        Frame {
            id,
            body: FrameBody::Request(Request::Ping),
        }
        .encode()
        .unwrap()
    }

    #[tokio::test]
    async fn reader_yields_frames_and_skips_blank_lines() {
        let mut input = ping_line(1);
        input.extend_from_slice(b"\n  \r\n");
        input.extend_from_slice(&ping_line(2));
        let mut reader = FrameReader::new(input.as_slice());

        assert_eq!(reader.next_frame().await.unwrap().unwrap().id, 1);
        assert_eq!(reader.next_frame().await.unwrap().unwrap().id, 2);
        assert!(reader.next_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reader_accepts_unterminated_last_line() {
        let mut input = ping_line(5);
        input.pop();
        let mut reader = FrameReader::new(input.as_slice());
        assert_eq!(reader.next_frame().await.unwrap().unwrap().id, 5);
        assert!(reader.next_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn oversized_line_is_rejected_at_the_limit() {
        // No terminator anywhere: the reader must stop at limit + 1 bytes.
        let input = vec![b'x'; 4096];
        let mut reader = FrameReader::with_limit(input.as_slice(), 64);
        let err = reader.next_frame().await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::ProtocolError);
        assert!(err.message.contains("65 bytes"), "{}", err.message);
    }

    #[tokio::test]
    async fn line_exactly_at_the_limit_is_accepted() {
        let line = ping_line(9);
        let limit = line.len() - 1;
        let mut reader = FrameReader::with_limit(line.as_slice(), limit);
        assert_eq!(reader.next_frame().await.unwrap().unwrap().id, 9);
    }

    #[tokio::test]
    async fn partial_line_survives_a_cancelled_read() {
        let (mut tx, rx) = tokio::io::duplex(4096);
        let mut reader = FrameReader::new(rx);
        let line = ping_line(3);
        let (head, tail) = line.split_at(4);

        use tokio::io::AsyncWriteExt;
        tx.write_all(head).await.unwrap();
        let pending = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            reader.next_frame(),
        )
        .await;
        assert!(pending.is_err());

        tx.write_all(tail).await.unwrap();
        assert_eq!(reader.next_frame().await.unwrap().unwrap().id, 3);
    }

    #[test]
    fn terminal_bodies() {
        assert!(FrameBody::Done(Response::Unit).is_terminal());
        assert!(FrameBody::Failed(RpcError::transport("x")).is_terminal());
        assert!(!FrameBody::Record(serde_json::json!({})).is_terminal());
    }
}
