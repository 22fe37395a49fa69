//! Observability Module
//!
//! 提供服务可观测性功能：
//! - Prometheus metrics 导出
//! - 健康检查端点
//! - 缓存统计与删除端点
//!
//! ## 模块结构
//! - `health` - 健康检查
//! - `http_server` - HTTP 可观测性服务器

pub mod health;
pub mod http_server;

pub use health::{HealthChecker, HealthDetails, HealthResponse, HealthStatus};
pub use http_server::{AppState, ObservabilityServer};
