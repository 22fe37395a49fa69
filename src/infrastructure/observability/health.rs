//! Health Check Endpoint
//!
//! 提供服务健康状态检查，用于负载均衡器和监控系统
//!
//! ## 健康检查端点
//! - `/health` - 带缓存统计的健康信息
//! - `/health/ready` - 就绪检查（状态健康且存储可达）
//! - `/health/live` - 存活检查（进程仍在运行）
//!
//! ## 响应格式
//! ```json
//! {
//!   "status": "healthy",
//!   "uptime_seconds": 3600,
//!   "version": "0.1.0",
//!   "timestamp": 1234567890,
//!   "details": {
//!     "cache": { "capacity": 1000, "resident": 812, "cursor": 812 },
//!     "store_reachable": true
//!   }
//! }
//! ```

use crate::domain::cache::CacheStats;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// 健康状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// 健康
    Healthy,
    /// 降级（仍可服务，例如冷启动或快照不可写）
    Degraded,
    /// 不健康
    Unhealthy,
}

/// 健康检查响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub uptime_seconds: u64,
    pub version: String,
    pub timestamp: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HealthDetails>,
}

/// 详细健康信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthDetails {
    /// 缓存统计
    pub cache: CacheStats,
    /// 存储是否可达
    pub store_reachable: bool,
}

/// 健康检查器
pub struct HealthChecker {
    start_time: SystemTime,
    status: RwLock<HealthStatus>,
    version: String,
}

impl HealthChecker {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            start_time: SystemTime::now(),
            status: RwLock::new(HealthStatus::Healthy),
            version: version.into(),
        }
    }

    /// 运行时间（秒）
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time
            .elapsed()
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }

    fn current_timestamp() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }

    pub fn set_status(&self, status: HealthStatus) {
        *self.status.write() = status;
    }

    pub fn get_status(&self) -> HealthStatus {
        *self.status.read()
    }

    /// 生成健康检查响应
    ///
    /// 存储不可达时整体状态至少降为 `Degraded`
    pub fn check_health(&self, details: Option<HealthDetails>) -> HealthResponse {
        let mut status = self.get_status();
        if status == HealthStatus::Healthy
            && details.as_ref().is_some_and(|d| !d.store_reachable)
        {
            status = HealthStatus::Degraded;
        }

        HealthResponse {
            status,
            uptime_seconds: self.uptime_seconds(),
            version: self.version.clone(),
            timestamp: Self::current_timestamp(),
            details,
        }
    }

    /// 存活检查（liveness probe）
    /// 只要能返回就说明进程还活着
    pub fn check_liveness(&self) -> bool {
        true
    }

    /// 就绪检查（readiness probe）
    pub fn check_readiness(&self, store_reachable: bool) -> bool {
        store_reachable && self.get_status() != HealthStatus::Unhealthy
    }
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new(env!("CARGO_PKG_VERSION"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn details(store_reachable: bool) -> HealthDetails {
        HealthDetails {
            cache: CacheStats {
                capacity: 3,
                resident: 2,
                cursor: 2,
            },
            store_reachable,
        }
    }

    #[test]
    fn test_status_change() {
        let checker = HealthChecker::new("1.0.0");
        assert_eq!(checker.get_status(), HealthStatus::Healthy);

        checker.set_status(HealthStatus::Degraded);
        assert_eq!(checker.get_status(), HealthStatus::Degraded);
    }

    #[test]
    fn test_unreachable_store_degrades() {
        let checker = HealthChecker::new("1.0.0");

        assert_eq!(checker.check_health(Some(details(true))).status, HealthStatus::Healthy);
        assert_eq!(checker.check_health(Some(details(false))).status, HealthStatus::Degraded);
        assert_eq!(checker.check_health(None).status, HealthStatus::Healthy);
    }

    #[test]
    fn test_readiness_probe() {
        let checker = HealthChecker::new("1.0.0");
        assert!(checker.check_readiness(true));
        assert!(!checker.check_readiness(false));

        // 降级仍可接受流量
        checker.set_status(HealthStatus::Degraded);
        assert!(checker.check_readiness(true));

        checker.set_status(HealthStatus::Unhealthy);
        assert!(!checker.check_readiness(true));
    }

    #[test]
    fn test_serialization() {
        let checker = HealthChecker::new("1.0.0");
        let json = serde_json::to_value(checker.check_health(Some(details(true)))).unwrap();

        assert_eq!(json["status"], "healthy");
        assert_eq!(json["version"], "1.0.0");
        assert_eq!(json["details"]["cache"]["resident"], 2);
        assert_eq!(json["details"]["store_reachable"], true);
    }
}
