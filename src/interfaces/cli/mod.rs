/// CLI Interface Module
///
/// Command-line entry point of the order lookup service.
///
/// ## Responsibilities
/// - Parse command-line arguments (each also readable from `ORDER_CACHE_*`)
/// - Open the durable store and build the cache (restored or cold)
/// - Start the TCP gateway, the observability server and both run-loops
/// - Handle graceful shutdown on SIGINT / SIGTERM

use crate::application::{
    ConflictPolicy, IngestOrderUseCase, IngestionService, LookupOrderUseCase, LookupService,
};
use crate::domain::cache::OrderCache;
use crate::domain::ports::OrderStore;
use crate::domain::validation::OrderValidator;
use crate::infrastructure::observability::{AppState, HealthChecker, ObservabilityServer};
use crate::infrastructure::storage::{FileSnapshotStore, MemoryStore, PgStore, PgStoreConfig};
use crate::infrastructure::transport::{ChannelTransport, Gateway, GatewayConfig};
use clap::{Parser, ValueEnum};
use std::error::Error;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// 持久存储类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreKind {
    /// 进程内存储（重启后丢失，用于本地运行）
    Memory,
    /// PostgreSQL
    Postgres,
}

/// 订单查询服务命令行配置
#[derive(Parser, Debug, Clone)]
#[command(name = "order-cache")]
#[command(version)]
#[command(about = "订单查询服务：有界 FIFO 缓存 + 持久存储", long_about = None)]
pub struct CliConfig {
    /// 缓存容量（订单数）
    #[arg(short = 'c', long, env = "ORDER_CACHE_CAPACITY", default_value_t = 1000)]
    pub capacity: usize,

    /// 缓存快照文件
    #[arg(long, env = "ORDER_CACHE_SNAPSHOT_PATH", default_value = "cache_meta.json")]
    pub snapshot_path: PathBuf,

    /// 持久存储类型
    #[arg(long, env = "ORDER_CACHE_STORE", value_enum, default_value_t = StoreKind::Memory)]
    pub store: StoreKind,

    /// PostgreSQL 连接串（--store postgres 时必填）
    #[arg(long, env = "ORDER_CACHE_DATABASE_URL")]
    pub database_url: Option<String>,

    /// 连接池最大连接数
    #[arg(long, env = "ORDER_CACHE_DB_MAX_CONNECTIONS", default_value_t = 25)]
    pub db_max_connections: u32,

    /// TCP 网关监听地址
    #[arg(long, env = "ORDER_CACHE_LISTEN", default_value = "127.0.0.1:9092")]
    pub listen: SocketAddr,

    /// metrics/health 端口（0 表示不启动）
    #[arg(long, env = "ORDER_CACHE_METRICS_PORT", default_value_t = 9090)]
    pub metrics_port: u16,

    /// 完整订单入站主题
    #[arg(long, env = "ORDER_CACHE_ORDERS_TOPIC", default_value = "json_data")]
    pub orders_topic: String,

    /// 查询请求入站主题
    #[arg(long, env = "ORDER_CACHE_LOOKUP_TOPIC", default_value = "order_id")]
    pub lookup_topic: String,

    /// 查询响应出站主题
    #[arg(long, env = "ORDER_CACHE_RESPONSE_TOPIC", default_value = "order_response")]
    pub response_topic: String,

    /// 摄入报告出站主题
    #[arg(long, env = "ORDER_CACHE_INGEST_REPORT_TOPIC", default_value = "order_ingest_result")]
    pub ingest_report_topic: String,

    /// 重复订单处理策略
    #[arg(long, env = "ORDER_CACHE_CONFLICT_POLICY", value_enum, default_value_t = ConflictPolicy::Reject)]
    pub conflict_policy: ConflictPolicy,

    /// 存储命中后回填缓存
    #[arg(long, env = "ORDER_CACHE_READ_THROUGH", default_value_t = false)]
    pub read_through: bool,

    /// 每个通道的缓冲消息数
    #[arg(long, env = "ORDER_CACHE_CHANNEL_CAPACITY", default_value_t = 1024)]
    pub channel_capacity: usize,

    /// 单次存储调用超时（毫秒）
    #[arg(long, env = "ORDER_CACHE_OP_TIMEOUT_MS", default_value_t = 5000)]
    pub op_timeout_ms: u64,

    /// 日志级别
    #[arg(short = 'l', long, env = "ORDER_CACHE_LOG_LEVEL", default_value = "info", value_parser = ["trace", "debug", "info", "warn", "error"])]
    pub log_level: String,

    /// 仅显示配置不启动服务（用于调试）
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

impl CliConfig {
    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }
}

/// Runs the CLI application
///
/// Only startup resource failures (store, gateway or metrics bind) are
/// returned as errors; per-message failures are reported on the transport.
pub async fn run() -> Result<(), Box<dyn Error>> {
    let config = CliConfig::parse();

    init_logging(&config.log_level);
    info!(?config, "订单查询服务启动");

    println!("========================================");
    println!("  订单查询服务 v{}", env!("CARGO_PKG_VERSION"));
    println!("========================================");
    println!("缓存容量:     {}", config.capacity);
    println!("快照文件:     {}", config.snapshot_path.display());
    println!("持久存储:     {:?}", config.store);
    println!("网关地址:     {}", config.listen);
    println!("Metrics端口:  {}", config.metrics_port);
    println!("冲突策略:     {:?}", config.conflict_policy);
    println!("回填缓存:     {}", if config.read_through { "启用" } else { "禁用" });
    println!("日志级别:     {}", config.log_level);
    println!("========================================");

    if config.dry_run {
        println!("\nDry-run 模式 - 不启动服务");
        return Ok(());
    }

    serve(config).await
}

/// Wires every component together and blocks until a shutdown signal
pub async fn serve(config: CliConfig) -> Result<(), Box<dyn Error>> {
    let store = open_store(&config).await?;

    let snapshot = Arc::new(FileSnapshotStore::new(&config.snapshot_path));
    let cache = Arc::new(OrderCache::open(config.capacity, snapshot, store.as_ref()).await?);
    info!(resident = cache.len(), capacity = cache.capacity(), "cache ready");

    let transport = Arc::new(ChannelTransport::new(config.channel_capacity));
    let shutdown = CancellationToken::new();

    let gateway = Gateway::bind(
        GatewayConfig {
            listen: config.listen,
            inbound_topics: vec![config.orders_topic.clone(), config.lookup_topic.clone()],
            outbound_topics: vec![config.response_topic.clone(), config.ingest_report_topic.clone()],
            broadcast_capacity: config.channel_capacity,
        },
        transport.clone(),
    )
    .await?;
    let gateway_task = tokio::spawn(gateway.run(shutdown.clone()));

    let metrics_task = if config.metrics_port != 0 {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
        let server = ObservabilityServer::bind(
            addr,
            AppState {
                health: Arc::new(HealthChecker::default()),
                cache: cache.clone(),
                store: store.clone(),
            },
        )
        .await?;
        Some(tokio::spawn(server.run(shutdown.clone())))
    } else {
        None
    };

    let ingest = IngestOrderUseCase::new(store.clone(), cache.clone(), OrderValidator::new())
        .with_policy(config.conflict_policy)
        .with_op_timeout(config.op_timeout());
    let ingestion_task = tokio::spawn(
        IngestionService::new(transport.clone(), ingest, config.orders_topic.clone())
            .with_report_channel(config.ingest_report_topic.clone())
            .run(shutdown.clone()),
    );

    let lookup = LookupOrderUseCase::new(store.clone(), cache.clone())
        .with_read_through(config.read_through)
        .with_op_timeout(config.op_timeout());
    let lookup_task = tokio::spawn(
        LookupService::new(
            transport.clone(),
            lookup,
            config.lookup_topic.clone(),
            config.response_topic.clone(),
        )
        .run(shutdown.clone()),
    );

    wait_for_signal().await;
    info!("shutdown signal received");
    shutdown.cancel();

    // 两条路径先处理完手上的消息（发送最多再等一个宽限期），再关闭传输层
    let ingest_stats = ingestion_task.await?;
    let lookup_stats = lookup_task.await?;
    transport.close();
    gateway_task.await?;

    if let Some(task) = metrics_task {
        if let Err(e) = task.await? {
            warn!(error = %e, "observability server stopped with error");
        }
    }

    info!(?ingest_stats, ?lookup_stats, "订单查询服务已停止");
    Ok(())
}

async fn open_store(config: &CliConfig) -> Result<Arc<dyn OrderStore>, Box<dyn Error>> {
    match config.store {
        StoreKind::Memory => {
            warn!("using in-memory store; orders are lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreKind::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .ok_or("--database-url is required with --store postgres")?;

            let mut pg_config = PgStoreConfig::new(url);
            pg_config.max_connections = config.db_max_connections;
            Ok(Arc::new(PgStore::connect(&pg_config).await?))
        }
    }
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// 初始化日志系统
fn init_logging(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_config_default() {
        let config = CliConfig::parse_from(["order-cache"]);
        assert_eq!(config.capacity, 1000);
        assert_eq!(config.snapshot_path, PathBuf::from("cache_meta.json"));
        assert_eq!(config.store, StoreKind::Memory);
        assert_eq!(config.db_max_connections, 25);
        assert_eq!(config.listen.to_string(), "127.0.0.1:9092");
        assert_eq!(config.metrics_port, 9090);
        assert_eq!(config.orders_topic, "json_data");
        assert_eq!(config.lookup_topic, "order_id");
        assert_eq!(config.response_topic, "order_response");
        assert_eq!(config.conflict_policy, ConflictPolicy::Reject);
        assert!(!config.read_through);
        assert_eq!(config.op_timeout(), Duration::from_secs(5));
        assert_eq!(config.log_level, "info");
        assert!(!config.dry_run);
    }

    #[test]
    fn test_cli_config_custom() {
        let config = CliConfig::parse_from([
            "order-cache",
            "--capacity", "3",
            "--snapshot-path", "/tmp/meta.json",
            "--store", "postgres",
            "--database-url", "postgres://localhost/orders",
            "--listen", "0.0.0.0:7000",
            "--metrics-port", "0",
            "--conflict-policy", "upsert",
            "--read-through",
            "--log-level", "debug",
            "--dry-run",
        ]);

        assert_eq!(config.capacity, 3);
        assert_eq!(config.store, StoreKind::Postgres);
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/orders"));
        assert_eq!(config.listen.port(), 7000);
        assert_eq!(config.metrics_port, 0);
        assert_eq!(config.conflict_policy, ConflictPolicy::Upsert);
        assert!(config.read_through);
        assert_eq!(config.log_level, "debug");
        assert!(config.dry_run);
    }

    #[test]
    fn test_cli_config_rejects_unknown_values() {
        assert!(CliConfig::try_parse_from(["order-cache", "--store", "redis"]).is_err());
        assert!(CliConfig::try_parse_from(["order-cache", "--log-level", "loud"]).is_err());
    }

    #[tokio::test]
    async fn test_postgres_requires_url() {
        let config = CliConfig::parse_from(["order-cache", "--store", "postgres"]);
        assert!(open_store(&config).await.is_err());
    }
}
