//! 传输层
//!
//! 服务只通过 `Transport` trait 收发消息，消息按通道（topic）区分：
//! - `ChannelTransport`: 进程内实现，每个通道一个有界 tokio mpsc
//! - `Gateway`: TCP 前门，把客户端帧路由进 `ChannelTransport`，
//!   并把响应通道上的消息广播给所有连接
//!
//! 帧格式见 `codec` 模块。

pub mod channel;
pub mod codec;
pub mod gateway;

pub use channel::ChannelTransport;
pub use codec::{CodecError, TopicCodec, TopicFrame};
pub use gateway::{Gateway, GatewayConfig, GatewayError};

use async_trait::async_trait;
use bytes::Bytes;

/// 从某个通道收到的一条消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub channel: String,
    /// 通道内单调递增的序号
    pub offset: u64,
    pub payload: Bytes,
}

/// 传输层错误
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport closed")]
    Closed,

    #[error("channel '{0}' is full")]
    Full(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// 消息收发接口
#[async_trait]
pub trait Transport: Send + Sync {
    /// 接收下一条消息；`None` 表示传输已关闭且没有剩余消息
    async fn receive(&self, channel: &str) -> Result<Option<Message>, TransportError>;

    /// 向通道发送一条消息
    async fn send(&self, channel: &str, payload: Bytes) -> Result<(), TransportError>;
}
