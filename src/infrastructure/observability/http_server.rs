//! HTTP Observability Server
//!
//! 提供 Prometheus metrics、健康检查和缓存管理端点
//!
//! ## 端点
//! - `GET /metrics` - Prometheus 格式的指标
//! - `GET /health` - 健康检查（含缓存统计）
//! - `GET /health/ready` - 就绪检查（会 ping 存储）
//! - `GET /health/live` - 存活检查
//! - `GET /cache/stats` - 缓存容量、驻留数和游标
//! - `DELETE /cache/:order_uid` - 从缓存中删除一个订单（不影响存储）
//!
//! ## 使用示例
//! ```rust,ignore
//! let server = ObservabilityServer::bind(addr, state).await?;
//! server.run(shutdown.clone()).await?;
//! ```

use super::health::{HealthChecker, HealthDetails, HealthStatus};
use crate::domain::cache::OrderCache;
use crate::domain::ports::OrderStore;
use crate::shared::metrics::METRICS;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get},
    Json, Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// 就绪检查中 ping 存储的超时
const PING_TIMEOUT: Duration = Duration::from_secs(2);

/// 处理器共享状态
#[derive(Clone)]
pub struct AppState {
    pub health: Arc<HealthChecker>,
    pub cache: Arc<OrderCache>,
    pub store: Arc<dyn OrderStore>,
}

impl AppState {
    async fn store_reachable(&self) -> bool {
        matches!(
            tokio::time::timeout(PING_TIMEOUT, self.store.ping()).await,
            Ok(Ok(()))
        )
    }
}

/// 可观测性服务器
pub struct ObservabilityServer {
    listener: TcpListener,
    state: AppState,
}

impl ObservabilityServer {
    /// 绑定监听地址
    pub async fn bind(addr: SocketAddr, state: AppState) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, state })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// 构造路由
    pub fn router(state: AppState) -> Router {
        Router::new()
            .route("/metrics", get(metrics_handler))
            .route("/health", get(health_handler))
            .route("/health/ready", get(readiness_handler))
            .route("/health/live", get(liveness_handler))
            .route("/cache/stats", get(cache_stats_handler))
            .route("/cache/:order_uid", delete(cache_delete_handler))
            .with_state(state)
    }

    /// 启动 HTTP 服务器，`shutdown` 取消后优雅退出
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = self.listener.local_addr()?;
        info!("可观测性服务器启动于 {}", addr);
        info!("Metrics端点: http://{}/metrics", addr);

        let app = Self::router(self.state);
        axum::serve(self.listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        info!("可观测性服务器已停止");
        Ok(())
    }
}

/// Prometheus metrics 端点
async fn metrics_handler() -> Response {
    (StatusCode::OK, METRICS.export()).into_response()
}

/// 健康检查端点
async fn health_handler(State(state): State<AppState>) -> Response {
    let details = HealthDetails {
        cache: state.cache.stats(),
        store_reachable: state.store_reachable().await,
    };

    let response = state.health.check_health(Some(details));
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(response)).into_response()
}

/// 就绪检查端点（用于 Kubernetes readiness probe）
async fn readiness_handler(State(state): State<AppState>) -> Response {
    let reachable = state.store_reachable().await;
    if state.health.check_readiness(reachable) {
        StatusCode::OK.into_response()
    } else {
        StatusCode::SERVICE_UNAVAILABLE.into_response()
    }
}

/// 存活检查端点（用于 Kubernetes liveness probe）
async fn liveness_handler(State(state): State<AppState>) -> Response {
    if state.health.check_liveness() {
        StatusCode::OK.into_response()
    } else {
        StatusCode::SERVICE_UNAVAILABLE.into_response()
    }
}

async fn cache_stats_handler(State(state): State<AppState>) -> Response {
    (StatusCode::OK, Json(state.cache.stats())).into_response()
}

async fn cache_delete_handler(
    State(state): State<AppState>,
    Path(order_uid): Path<String>,
) -> Response {
    let evicted = state.cache.delete(&order_uid).await;
    info!(order_uid = %order_uid, evicted, "cache delete requested");

    let status = if evicted {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    };
    (status, Json(json!({ "order_uid": order_uid, "evicted": evicted }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::storage::{MemorySnapshotStore, MemoryStore};
    use crate::shared::fixtures::sample_order;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn state(store: Arc<MemoryStore>) -> AppState {
        AppState {
            health: Arc::new(HealthChecker::new("1.0.0")),
            cache: Arc::new(OrderCache::new(3, Arc::new(MemorySnapshotStore::new())).unwrap()),
            store,
        }
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_cache_stats() {
        let state = state(Arc::new(MemoryStore::new()));
        state.cache.admit("o1", Arc::new(sample_order("o1"))).await;

        let response = cache_stats_handler(State(state)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["capacity"], 3);
        assert_eq!(body["resident"], 1);
    }

    #[tokio::test]
    async fn test_cache_delete() {
        let state = state(Arc::new(MemoryStore::new()));
        state.cache.admit("o1", Arc::new(sample_order("o1"))).await;

        let response = cache_delete_handler(State(state.clone()), Path("o1".to_string())).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["evicted"], true);
        assert!(state.cache.is_empty());

        let response = cache_delete_handler(State(state), Path("o1".to_string())).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_readiness_follows_store() {
        let store = Arc::new(MemoryStore::new());
        let state = state(store.clone());

        let response = readiness_handler(State(state.clone())).await;
        assert_eq!(response.status(), StatusCode::OK);

        store.fail_reads(true);
        let response = readiness_handler(State(state.clone())).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        // 存储不可达时 /health 仍返回 200，但状态降级
        let response = health_handler(State(state)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "degraded");
    }

    #[tokio::test]
    async fn test_served_over_http() {
        let state = state(Arc::new(MemoryStore::new()));
        let server = ObservabilityServer::bind("127.0.0.1:0".parse().unwrap(), state)
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(server.run(shutdown.clone()));

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /health/live HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200"));

        shutdown.cancel();
        handle.await.unwrap().unwrap();
    }
}
