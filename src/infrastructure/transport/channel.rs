//! 进程内传输
//!
//! 每个通道在第一次使用时创建一个有界 mpsc；发送方在通道满时等待
//! （背压），接收方通过互斥锁独占接收端。`close()` 之后拒绝新消息，
//! 接收方先取完已缓冲的消息再得到 `None`。

use super::{Message, Transport, TransportError};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

struct Lane {
    tx: mpsc::Sender<Message>,
    rx: tokio::sync::Mutex<mpsc::Receiver<Message>>,
    next_offset: AtomicU64,
}

impl Lane {
    fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx: tokio::sync::Mutex::new(rx),
            next_offset: AtomicU64::new(0),
        }
    }
}

/// 基于 tokio mpsc 的进程内传输
pub struct ChannelTransport {
    lanes: Mutex<HashMap<String, Arc<Lane>>>,
    capacity: usize,
    closed: CancellationToken,
}

impl ChannelTransport {
    /// `capacity` 为每个通道的缓冲消息数（至少为 1）
    pub fn new(capacity: usize) -> Self {
        Self {
            lanes: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
            closed: CancellationToken::new(),
        }
    }

    fn lane(&self, channel: &str) -> Arc<Lane> {
        let mut lanes = self.lanes.lock();
        if let Some(lane) = lanes.get(channel) {
            return lane.clone();
        }
        let lane = Arc::new(Lane::new(self.capacity));
        lanes.insert(channel.to_string(), lane.clone());
        lane
    }

    /// 不阻塞的发送；通道满时返回 `TransportError::Full`
    pub fn try_send(&self, channel: &str, payload: Bytes) -> Result<(), TransportError> {
        if self.closed.is_cancelled() {
            return Err(TransportError::Closed);
        }

        let lane = self.lane(channel);
        let message = Message {
            channel: channel.to_string(),
            offset: lane.next_offset.fetch_add(1, Ordering::Relaxed),
            payload,
        };
        lane.tx.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => TransportError::Full(channel.to_string()),
            mpsc::error::TrySendError::Closed(_) => TransportError::Closed,
        })
    }

    /// 关闭传输：之后的发送失败，接收方取完缓冲后得到 `None`
    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn receive(&self, channel: &str) -> Result<Option<Message>, TransportError> {
        let lane = self.lane(channel);
        let mut rx = lane.rx.lock().await;

        if self.closed.is_cancelled() {
            return Ok(rx.try_recv().ok());
        }

        tokio::select! {
            biased;
            message = rx.recv() => Ok(message),
            _ = self.closed.cancelled() => Ok(rx.try_recv().ok()),
        }
    }

    async fn send(&self, channel: &str, payload: Bytes) -> Result<(), TransportError> {
        if self.closed.is_cancelled() {
            return Err(TransportError::Closed);
        }

        let lane = self.lane(channel);
        let message = Message {
            channel: channel.to_string(),
            offset: lane.next_offset.fetch_add(1, Ordering::Relaxed),
            payload,
        };

        tokio::select! {
            result = lane.tx.send(message) => result.map_err(|_| TransportError::Closed),
            _ = self.closed.cancelled() => Err(TransportError::Closed),
        }
    }
}
