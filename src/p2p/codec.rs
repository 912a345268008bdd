use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder, LinesCodec};

use super::messages::Message;
use crate::error::NodeError;

/// Default cap on one framed line.
pub const MAX_LINE_LENGTH: usize = 1024 * 1024;

/// Newline-delimited JSON framing for [`Message`].
///
/// Lines longer than the configured maximum are rejected rather than
/// buffered, so a peer that never sends `\n` cannot grow our memory.
#[derive(Debug, Clone)]
pub struct MessageCodec {
    lines: LinesCodec,
}

impl MessageCodec {
    pub fn new(max_line_length: usize) -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(max_line_length),
        }
    }
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::new(MAX_LINE_LENGTH)
    }
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = NodeError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, NodeError> {
        match self.lines.decode(src)? {
            Some(line) => Message::from_line(&line).map(Some),
            None => Ok(None),
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Message>, NodeError> {
        match self.lines.decode_eof(src)? {
            Some(line) if line.trim().is_empty() => Ok(None),
            Some(line) => Message::from_line(&line).map(Some),
            None => Ok(None),
        }
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = NodeError;

    fn encode(&mut self, msg: Message, dst: &mut BytesMut) -> Result<(), NodeError> {
        let line = msg.to_line()?;
        self.lines.encode(line, dst)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{SinkExt, StreamExt};
    use tokio_util::codec::{FramedRead, FramedWrite};

    #[tokio::test]
    async fn test_reads_one_message_per_line() {
        let mock = tokio_test::io::Builder::new()
            .read(b"{\"type\":\"ping\"}\n{\"type\":\"get_")
            .read(b"peers\"}\n")
            .build();
        let mut framed = FramedRead::new(mock, MessageCodec::default());

        assert_eq!(framed.next().await.unwrap().unwrap(), Message::Ping);
        assert_eq!(framed.next().await.unwrap().unwrap(), Message::GetPeers);
        assert!(framed.next().await.is_none());
    }

    #[tokio::test]
    async fn test_writes_newline_terminated_json() {
        let mock = tokio_test::io::Builder::new()
            .write(b"{\"type\":\"pong\"}\n")
            .build();
        let mut framed = FramedWrite::new(mock, MessageCodec::default());
        framed.send(Message::Pong).await.unwrap();
    }

    #[tokio::test]
    async fn test_garbage_line_is_decode_error() {
        let mock = tokio_test::io::Builder::new().read(b"hello there\n").build();
        let mut framed = FramedRead::new(mock, MessageCodec::default());

        let err = framed.next().await.unwrap().unwrap_err();
        assert!(matches!(err, NodeError::Decode(_)));
    }

    #[tokio::test]
    async fn test_overlong_line_rejected() {
        let mock = tokio_test::io::Builder::new()
            .read(b"{\"type\":\"ping\",\"pad\":\"xxxxxxxxxxxxxxxxxxxxxxxxxxxx\"}\n")
            .build();
        let mut framed = FramedRead::new(mock, MessageCodec::new(16));

        let err = framed.next().await.unwrap().unwrap_err();
        assert!(matches!(err, NodeError::Codec(_)));
    }
}
