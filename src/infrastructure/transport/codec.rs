//! 主题帧编解码器
//!
//! 在 `tokio_util` 的长度前缀编解码器之上再加一层主题头：
//!
//! ```text
//! +----------------+----------------+-------------+-----------+
//! | frame len (u32)| topic len (u16)| topic (utf8)| payload   |
//! +----------------+----------------+-------------+-----------+
//! ```
//!
//! 负载原样透传，由上层决定如何解析。

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

/// 默认最大帧长度（1MB）
pub const DEFAULT_MAX_FRAME_LEN: usize = 1024 * 1024;

/// 主题名最大长度
pub const MAX_TOPIC_LEN: usize = 255;

/// 一个带主题的帧
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicFrame {
    pub topic: String,
    pub payload: Bytes,
}

impl TopicFrame {
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// 编解码错误
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Frame too large: {len} bytes (max: {max})")]
    FrameTooLarge { len: usize, max: usize },

    #[error("Topic too long: {len} bytes (max: {max})")]
    TopicTooLong { len: usize, max: usize },

    #[error("Frame truncated: topic header needs {needed} bytes, got {got}")]
    Truncated { needed: usize, got: usize },

    #[error("Topic is not valid UTF-8")]
    InvalidTopic,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// 主题帧编解码器
pub struct TopicCodec {
    inner: LengthDelimitedCodec,
    max_frame_len: usize,
}

impl TopicCodec {
    pub fn new() -> Self {
        Self::with_max_frame_len(DEFAULT_MAX_FRAME_LEN)
    }

    pub fn with_max_frame_len(max_frame_len: usize) -> Self {
        Self {
            inner: LengthDelimitedCodec::builder()
                .max_frame_length(max_frame_len)
                .new_codec(),
            max_frame_len,
        }
    }
}

impl Default for TopicCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for TopicCodec {
    type Item = TopicFrame;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let mut frame = match self.inner.decode(src)? {
            Some(frame) => frame,
            None => return Ok(None), // 需要更多数据
        };

        if frame.len() < 2 {
            return Err(CodecError::Truncated {
                needed: 2,
                got: frame.len(),
            });
        }

        let topic_len = frame.get_u16() as usize;
        if frame.len() < topic_len {
            return Err(CodecError::Truncated {
                needed: topic_len,
                got: frame.len(),
            });
        }

        let topic_bytes = frame.split_to(topic_len);
        let topic = std::str::from_utf8(&topic_bytes)
            .map_err(|_| CodecError::InvalidTopic)?
            .to_string();

        Ok(Some(TopicFrame {
            topic,
            payload: frame.freeze(),
        }))
    }
}

impl Encoder<TopicFrame> for TopicCodec {
    type Error = CodecError;

    fn encode(&mut self, item: TopicFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let topic_len = item.topic.len();
        if topic_len > MAX_TOPIC_LEN {
            return Err(CodecError::TopicTooLong {
                len: topic_len,
                max: MAX_TOPIC_LEN,
            });
        }

        let len = 2 + topic_len + item.payload.len();
        if len > self.max_frame_len {
            return Err(CodecError::FrameTooLarge {
                len,
                max: self.max_frame_len,
            });
        }

        let mut body = BytesMut::with_capacity(len);
        body.put_u16(topic_len as u16);
        body.put_slice(item.topic.as_bytes());
        body.put_slice(&item.payload);

        self.inner.encode(body.freeze(), dst)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_frame_layout() {
        let mut codec = TopicCodec::new();
        let mut buf = BytesMut::new();
        codec
            .encode(TopicFrame::new("order_id", "o1"), &mut buf)
            .unwrap();

        // 验证长度前缀
        let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        assert_eq!(len, 2 + "order_id".len() + 2);
        assert_eq!(u16::from_be_bytes([buf[4], buf[5]]), 8);

        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame.topic, "order_id");
        assert_eq!(frame.payload, Bytes::from("o1"));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_partial_frame() {
        let mut codec = TopicCodec::new();
        let mut full = BytesMut::new();
        codec
            .encode(TopicFrame::new("json_data", "{}"), &mut full)
            .unwrap();

        // 只有一部分数据
        let mut partial = BytesMut::from(&full[..5]);
        assert!(codec.decode(&mut partial).unwrap().is_none());
    }

    #[test]
    fn test_two_frames_in_one_buffer() {
        let mut codec = TopicCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(TopicFrame::new("a", "1"), &mut buf).unwrap();
        codec.encode(TopicFrame::new("b", ""), &mut buf).unwrap();

        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().topic, "a");
        let second = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(second.topic, "b");
        assert!(second.payload.is_empty());
    }

    #[test]
    fn test_frame_too_large() {
        let mut codec = TopicCodec::with_max_frame_len(16);
        let mut buf = BytesMut::new();
        let result = codec.encode(TopicFrame::new("t", vec![0u8; 32]), &mut buf);
        assert!(matches!(result, Err(CodecError::FrameTooLarge { .. })));
    }

    #[test]
    fn test_truncated_topic_header() {
        let mut codec = TopicCodec::new();
        // 帧体只有 1 字节，不够主题长度
        let mut buf = BytesMut::from(&[0u8, 0, 0, 1, 7][..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(CodecError::Truncated { needed: 2, got: 1 })
        ));
    }
}
