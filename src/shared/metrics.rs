//! Prometheus Metrics Module
//!
//! 提供订单查询服务的核心指标监控
//!
//! ## 指标类型
//! - **Counter**: 准入/淘汰次数、缓存命中/未命中、摄入与查询结果
//! - **Histogram**: 存储访问延迟
//! - **Gauge**: 缓存驻留订单数
//!
//! ## 使用示例
//! ```rust,ignore
//! use order_cache::shared::metrics::METRICS;
//!
//! // 记录缓存命中
//! METRICS.cache_lookups.with_label_values(&["hit"]).inc();
//!
//! // 记录存储延迟
//! let timer = METRICS.store_duration.with_label_values(&["get_by_key"]).start_timer();
//! // ... 访问存储 ...
//! timer.observe_duration();
//! ```

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_histogram_vec, CounterVec, Encoder, Gauge,
    HistogramVec, TextEncoder,
};

lazy_static! {
    /// 全局Metrics实例
    pub static ref METRICS: Metrics = Metrics::new();
}

/// 服务核心指标
pub struct Metrics {
    /// 缓存查询 (hit/miss)
    pub cache_lookups: CounterVec,

    /// 缓存准入 (inserted/replaced)
    pub cache_admissions: CounterVec,

    /// 缓存淘汰 (fifo/delete)
    pub cache_evictions: CounterVec,

    /// 当前驻留订单数
    pub cache_resident: Gauge,

    /// 快照写入失败次数
    pub snapshot_failures: CounterVec,

    /// 摄入结果 (accepted/validation/conflict/io/decode)
    pub ingest_total: CounterVec,

    /// 查询结果 (cache/store/not_found/error)
    pub lookup_total: CounterVec,

    /// 存储访问延迟分布 (秒)
    pub store_duration: HistogramVec,

    /// 传输层错误 (按通道)
    pub transport_errors: CounterVec,
}

impl Metrics {
    /// 创建并注册到全局 registry（只能调用一次，通过 `METRICS` 访问）
    fn new() -> Self {
        Self {
            cache_lookups: register_counter_vec!(
                "order_cache_lookups_total",
                "Cache lookups by outcome",
                &["outcome"]
            )
            .expect("cache_lookups metric registers once"),

            cache_admissions: register_counter_vec!(
                "order_cache_admissions_total",
                "Cache admissions by kind",
                &["kind"]
            )
            .expect("cache_admissions metric registers once"),

            cache_evictions: register_counter_vec!(
                "order_cache_evictions_total",
                "Keys removed from the cache by reason",
                &["reason"]
            )
            .expect("cache_evictions metric registers once"),

            cache_resident: register_gauge!(
                "order_cache_resident_orders",
                "Number of orders currently resident in the cache"
            )
            .expect("cache_resident metric registers once"),

            snapshot_failures: register_counter_vec!(
                "order_cache_snapshot_failures_total",
                "Snapshot read/write failures",
                &["op"]
            )
            .expect("snapshot_failures metric registers once"),

            ingest_total: register_counter_vec!(
                "order_cache_ingest_total",
                "Ingested order messages by result",
                &["result"]
            )
            .expect("ingest_total metric registers once"),

            lookup_total: register_counter_vec!(
                "order_cache_lookup_requests_total",
                "Lookup requests by resolution",
                &["resolution"]
            )
            .expect("lookup_total metric registers once"),

            store_duration: register_histogram_vec!(
                "order_cache_store_duration_seconds",
                "Durable store operation latency in seconds",
                &["op"],
                vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]
            )
            .expect("store_duration metric registers once"),

            transport_errors: register_counter_vec!(
                "order_cache_transport_errors_total",
                "Transport receive/send failures",
                &["channel", "op"]
            )
            .expect("transport_errors metric registers once"),
        }
    }

    /// 导出Prometheus格式的指标
    pub fn export(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = prometheus::gather();
        let mut buffer = vec![];
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::warn!(error = %e, "failed to encode metrics");
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}
