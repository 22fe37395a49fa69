//! TCP 网关
//!
//! 客户端用主题帧（见 `codec`）连接：
//! - 入站帧按主题写入传输层（只接受配置的入站主题）
//! - 出站主题上的消息广播给所有已连接的客户端
//!
//! 没有客户端连接时出站消息被丢弃。

use super::codec::{TopicCodec, TopicFrame};
use super::Transport;
use crate::shared::metrics::METRICS;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 网关错误
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("failed to bind gateway on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// 网关配置
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub listen: SocketAddr,
    /// 客户端可以写入的主题
    pub inbound_topics: Vec<String>,
    /// 广播给客户端的主题
    pub outbound_topics: Vec<String>,
    /// 每个连接可积压的出站帧数
    pub broadcast_capacity: usize,
}

/// TCP 网关
pub struct Gateway {
    listener: TcpListener,
    transport: Arc<dyn Transport>,
    config: GatewayConfig,
}

impl Gateway {
    /// 绑定监听地址
    pub async fn bind(config: GatewayConfig, transport: Arc<dyn Transport>) -> Result<Self, GatewayError> {
        let listener = TcpListener::bind(config.listen)
            .await
            .map_err(|source| GatewayError::Bind {
                addr: config.listen,
                source,
            })?;
        info!(addr = %config.listen, "gateway listening");

        Ok(Self {
            listener,
            transport,
            config,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// 运行直到 `shutdown` 被取消
    pub async fn run(self, shutdown: CancellationToken) {
        let (broadcast_tx, _) = broadcast::channel::<TopicFrame>(self.config.broadcast_capacity.max(1));
        let inbound: Arc<[String]> = self.config.inbound_topics.clone().into();

        // 每个出站主题一个转发任务
        let mut forwarders = JoinSet::new();
        for topic in &self.config.outbound_topics {
            forwarders.spawn(forward_outbound(
                topic.clone(),
                self.transport.clone(),
                broadcast_tx.clone(),
                shutdown.clone(),
            ));
        }

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            debug!(%peer, "client connected");
                            let broadcast_rx = broadcast_tx.subscribe();
                            tokio::spawn(handle_connection(
                                stream,
                                peer,
                                self.transport.clone(),
                                inbound.clone(),
                                broadcast_rx,
                                shutdown.clone(),
                            ));
                        }
                        Err(e) => {
                            warn!(error = %e, "failed to accept connection");
                        }
                    }
                }
            }
        }

        while forwarders.join_next().await.is_some() {}
        info!("gateway stopped");
    }
}

async fn forward_outbound(
    topic: String,
    transport: Arc<dyn Transport>,
    broadcast_tx: broadcast::Sender<TopicFrame>,
    shutdown: CancellationToken,
) {
    loop {
        let received = tokio::select! {
            _ = shutdown.cancelled() => break,
            received = transport.receive(&topic) => received,
        };

        match received {
            Ok(Some(message)) => {
                // 没有订阅者时发送失败，属于正常情况
                let _ = broadcast_tx.send(TopicFrame {
                    topic: topic.clone(),
                    payload: message.payload,
                });
            }
            Ok(None) => break,
            Err(e) => {
                METRICS
                    .transport_errors
                    .with_label_values(&[topic.as_str(), "receive"])
                    .inc();
                warn!(topic = %topic, error = %e, "outbound receive failed");
                break;
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    transport: Arc<dyn Transport>,
    inbound: Arc<[String]>,
    mut broadcast_rx: broadcast::Receiver<TopicFrame>,
    shutdown: CancellationToken,
) {
    let mut framed = Framed::new(stream, TopicCodec::new());

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            // 从客户端接收数据
            result = framed.next() => {
                match result {
                    Some(Ok(frame)) => {
                        if !inbound.iter().any(|topic| *topic == frame.topic) {
                            warn!(%peer, topic = %frame.topic, "frame on unknown inbound topic dropped");
                            continue;
                        }
                        if let Err(e) = transport.send(&frame.topic, frame.payload).await {
                            METRICS
                                .transport_errors
                                .with_label_values(&[frame.topic.as_str(), "send"])
                                .inc();
                            warn!(%peer, topic = %frame.topic, error = %e, "failed to route inbound frame");
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        warn!(%peer, error = %e, "connection error");
                        break;
                    }
                    None => break, // 连接已关闭
                }
            }
            // 广播给客户端
            outbound = broadcast_rx.recv() => {
                match outbound {
                    Ok(frame) => {
                        if let Err(e) = framed.send(frame).await {
                            warn!(%peer, error = %e, "failed to send frame to client");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(%peer, skipped, "client lagging, outbound frames dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    debug!(%peer, "connection closed");
}
