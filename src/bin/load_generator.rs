use clap::Parser;
use futures::{SinkExt, StreamExt};
use order_cache::infrastructure::transport::{TopicCodec, TopicFrame};
use order_cache::shared::fixtures::sample_order;
use order_cache::shared::protocol::{IngestReport, LookupRequest, LookupResponse, ResolvedFrom};
use rand::Rng;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

/// 向网关发送随机订单和查询的压测工具
#[derive(Parser, Debug)]
#[command(name = "load_generator")]
struct Args {
    /// 网关地址
    #[arg(long, default_value = "127.0.0.1:9092")]
    addr: SocketAddr,

    /// 模拟的并发客户端数量
    #[arg(long, default_value_t = 4)]
    clients: u32,

    /// 测试持续时间（秒）
    #[arg(long, default_value_t = 10)]
    duration_secs: u64,

    /// 查询占全部请求的比例 (0.0-1.0)
    #[arg(long, default_value_t = 0.7)]
    lookup_ratio: f64,

    #[arg(long, default_value = "json_data")]
    orders_topic: String,

    #[arg(long, default_value = "order_id")]
    lookup_topic: String,
}

#[derive(Default)]
struct Counters {
    orders_sent: AtomicU64,
    lookups_sent: AtomicU64,
    accepted: AtomicU64,
    rejected: AtomicU64,
    cache_hits: AtomicU64,
    store_hits: AtomicU64,
    not_found: AtomicU64,
    errors: AtomicU64,
}

#[tokio::main]
async fn main() {
    let args = Arc::new(Args::parse());
    let duration = Duration::from_secs(args.duration_secs);

    println!("启动订单查询压测...");
    println!("网关地址: {}", args.addr);
    println!("模拟客户端数量: {}", args.clients);
    println!("测试持续时间: {:?}", duration);

    let counters = Arc::new(Counters::default());
    let started = Instant::now();

    for client_id in 0..args.clients {
        let args = args.clone();
        let counters = counters.clone();
        tokio::spawn(async move {
            run_client(client_id, args, counters).await;
        });
    }

    tokio::time::sleep(duration).await;
    let elapsed = started.elapsed().as_secs_f64();

    let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
    let sent = load(&counters.orders_sent) + load(&counters.lookups_sent);

    println!("\n--- 测试结果 ---");
    println!("发送订单数:     {}", load(&counters.orders_sent));
    println!("发送查询数:     {}", load(&counters.lookups_sent));
    println!("请求速率 (RPS): {:.2}", sent as f64 / elapsed);
    println!("摄入成功/拒绝:  {} / {}", load(&counters.accepted), load(&counters.rejected));
    println!(
        "查询 缓存/存储/未找到/错误: {} / {} / {} / {}",
        load(&counters.cache_hits),
        load(&counters.store_hits),
        load(&counters.not_found),
        load(&counters.errors)
    );

    std::process::exit(0);
}

async fn run_client(client_id: u32, args: Arc<Args>, counters: Arc<Counters>) {
    let stream = match TcpStream::connect(args.addr).await {
        Ok(s) => s,
        Err(e) => {
            eprintln!("[客户端 {}] 连接失败: {}", client_id, e);
            return;
        }
    };

    let (mut writer, mut reader) = Framed::new(stream, TopicCodec::new()).split();

    // 统计服务器广播的响应
    let reader_counters = counters.clone();
    tokio::spawn(async move {
        while let Some(Ok(frame)) = reader.next().await {
            if let Ok(report) = IngestReport::from_slice(&frame.payload) {
                let counter = match report {
                    IngestReport::Accepted { .. } => &reader_counters.accepted,
                    IngestReport::Rejected { .. } => &reader_counters.rejected,
                };
                counter.fetch_add(1, Ordering::Relaxed);
            } else if let Ok(response) = LookupResponse::from_slice(&frame.payload) {
                let counter = match response {
                    LookupResponse::Found { source: ResolvedFrom::Cache, .. } => &reader_counters.cache_hits,
                    LookupResponse::Found { source: ResolvedFrom::Store, .. } => &reader_counters.store_hits,
                    LookupResponse::NotFound { .. } => &reader_counters.not_found,
                    LookupResponse::Error { .. } => &reader_counters.errors,
                };
                counter.fetch_add(1, Ordering::Relaxed);
            }
        }
    });

    let mut next_order: u64 = 0;
    loop {
        let frame = {
            let mut rng = rand::thread_rng();
            if next_order > 0 && rng.gen_bool(args.lookup_ratio.clamp(0.0, 1.0)) {
                // 大部分查询已发送的订单，少量查询不存在的订单
                let key = if rng.gen_bool(0.9) {
                    format!("lg-{}-{}", client_id, rng.gen_range(0..next_order))
                } else {
                    format!("missing-{}", rng.gen::<u32>())
                };
                counters.lookups_sent.fetch_add(1, Ordering::Relaxed);
                match serde_json::to_vec(&LookupRequest::new(key)) {
                    Ok(payload) => TopicFrame::new(args.lookup_topic.clone(), payload),
                    Err(_) => continue,
                }
            } else {
                let mut order = sample_order(&format!("lg-{}-{}", client_id, next_order));
                order.items[0].price = rng.gen_range(100..10_000);
                order.sm_id = rng.gen_range(0..100);
                next_order += 1;
                counters.orders_sent.fetch_add(1, Ordering::Relaxed);
                match serde_json::to_vec(&order) {
                    Ok(payload) => TopicFrame::new(args.orders_topic.clone(), payload),
                    Err(_) => continue,
                }
            }
        };

        if writer.send(frame).await.is_err() {
            break; // 连接断开
        }
    }
}
