//! PostgreSQL 订单存储
//!
//! 使用 sqlx 连接池（`PgPool`），池大小限制了两条路径同时进行的
//! 存储操作数量，与消息到达速率无关。
//!
//! ## 表结构
//! - `orders`      - 订单标量字段（主键 order_uid）
//! - `deliveries`  - 配送信息（一对一）
//! - `payments`    - 支付信息（一对一）
//! - `items`       - 商品行（一对多，按 position 保持顺序）
//!
//! 每次写入在一个事务内完成订单和三个子实体，任何一步失败整体回滚。

use crate::domain::order::{Delivery, Item, Order, Payment};
use crate::domain::ports::{OrderStore, StoreError};
use crate::shared::metrics::METRICS;
use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

/// 建表语句（幂等）
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS orders (
    order_uid           TEXT PRIMARY KEY,
    track_number        TEXT NOT NULL,
    entry               TEXT NOT NULL,
    locale              TEXT NOT NULL,
    internal_signature  TEXT NOT NULL DEFAULT '',
    customer_id         TEXT NOT NULL,
    delivery_service    TEXT NOT NULL,
    shardkey            TEXT NOT NULL DEFAULT '',
    sm_id               BIGINT NOT NULL DEFAULT 0,
    date_created        TIMESTAMPTZ NOT NULL,
    oof_shard           TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS deliveries (
    order_uid   TEXT PRIMARY KEY REFERENCES orders(order_uid) ON DELETE CASCADE,
    name        TEXT NOT NULL,
    phone       TEXT NOT NULL,
    zip         TEXT NOT NULL DEFAULT '',
    city        TEXT NOT NULL,
    address     TEXT NOT NULL,
    region      TEXT NOT NULL DEFAULT '',
    email       TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS payments (
    order_uid       TEXT PRIMARY KEY REFERENCES orders(order_uid) ON DELETE CASCADE,
    transaction_id  TEXT NOT NULL,
    request_id      TEXT NOT NULL DEFAULT '',
    currency        TEXT NOT NULL,
    provider        TEXT NOT NULL,
    amount          BIGINT NOT NULL,
    payment_dt      BIGINT NOT NULL,
    bank            TEXT NOT NULL DEFAULT '',
    delivery_cost   BIGINT NOT NULL DEFAULT 0,
    goods_total     BIGINT NOT NULL DEFAULT 0,
    custom_fee      BIGINT NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS items (
    order_uid       TEXT NOT NULL REFERENCES orders(order_uid) ON DELETE CASCADE,
    position        INTEGER NOT NULL,
    chrt_id         BIGINT NOT NULL,
    track_number    TEXT NOT NULL,
    price           BIGINT NOT NULL,
    rid             TEXT NOT NULL,
    name            TEXT NOT NULL,
    sale            INTEGER NOT NULL DEFAULT 0,
    size            TEXT NOT NULL DEFAULT '',
    total_price     BIGINT NOT NULL,
    nm_id           BIGINT NOT NULL DEFAULT 0,
    brand           TEXT NOT NULL DEFAULT '',
    status          INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (order_uid, position)
);
"#;

const SELECT_ORDERS: &str = r#"
SELECT o.order_uid, o.track_number, o.entry, o.locale, o.internal_signature,
       o.customer_id, o.delivery_service, o.shardkey, o.sm_id, o.date_created, o.oof_shard,
       d.name AS d_name, d.phone AS d_phone, d.zip AS d_zip, d.city AS d_city,
       d.address AS d_address, d.region AS d_region, d.email AS d_email,
       p.transaction_id, p.request_id, p.currency, p.provider, p.amount, p.payment_dt,
       p.bank, p.delivery_cost, p.goods_total, p.custom_fee
FROM orders o
JOIN deliveries d ON d.order_uid = o.order_uid
JOIN payments p ON p.order_uid = o.order_uid
WHERE o.order_uid = ANY($1)
"#;

const SELECT_ITEMS: &str = r#"
SELECT order_uid, chrt_id, track_number, price, rid, name, sale, size,
       total_price, nm_id, brand, status
FROM items
WHERE order_uid = ANY($1)
ORDER BY order_uid, position
"#;

/// 连接池配置
#[derive(Debug, Clone)]
pub struct PgStoreConfig {
    pub database_url: String,
    /// 最大连接数
    pub max_connections: u32,
    /// 获取连接的超时时间
    pub acquire_timeout: Duration,
}

impl PgStoreConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: 25,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

/// PostgreSQL 订单存储
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// 建立连接池并确保表存在
    pub async fn connect(config: &PgStoreConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.database_url)
            .await
            .map_err(io_error)?;

        let store = Self { pool };
        store.ensure_schema().await?;

        info!(
            max_connections = config.max_connections,
            "connected to PostgreSQL"
        );
        Ok(store)
    }

    /// 使用已有连接池（不建表）
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// 幂等建表
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA_SQL)
            .execute(&self.pool)
            .await
            .map_err(io_error)?;
        Ok(())
    }

    /// 在事务内写入订单行，返回是否真正插入（已存在时为 false）
    async fn write_order(tx: &mut Transaction<'_, Postgres>, order: &Order) -> Result<bool, sqlx::Error> {
        let inserted = sqlx::query(
            r#"INSERT INTO orders (order_uid, track_number, entry, locale, internal_signature,
                   customer_id, delivery_service, shardkey, sm_id, date_created, oof_shard)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
               ON CONFLICT (order_uid) DO NOTHING"#,
        )
        .bind(&order.order_uid)
        .bind(&order.track_number)
        .bind(&order.entry)
        .bind(&order.locale)
        .bind(&order.internal_signature)
        .bind(&order.customer_id)
        .bind(&order.delivery_service)
        .bind(&order.shardkey)
        .bind(order.sm_id)
        .bind(order.date_created)
        .bind(&order.oof_shard)
        .execute(&mut **tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            return Ok(false);
        }

        let delivery = &order.delivery;
        sqlx::query(
            r#"INSERT INTO deliveries (order_uid, name, phone, zip, city, address, region, email)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"#,
        )
        .bind(&order.order_uid)
        .bind(&delivery.name)
        .bind(&delivery.phone)
        .bind(&delivery.zip)
        .bind(&delivery.city)
        .bind(&delivery.address)
        .bind(&delivery.region)
        .bind(&delivery.email)
        .execute(&mut **tx)
        .await?;

        let payment = &order.payment;
        sqlx::query(
            r#"INSERT INTO payments (order_uid, transaction_id, request_id, currency, provider,
                   amount, payment_dt, bank, delivery_cost, goods_total, custom_fee)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"#,
        )
        .bind(&order.order_uid)
        .bind(&payment.transaction)
        .bind(&payment.request_id)
        .bind(&payment.currency)
        .bind(&payment.provider)
        .bind(payment.amount)
        .bind(payment.payment_dt)
        .bind(&payment.bank)
        .bind(payment.delivery_cost)
        .bind(payment.goods_total)
        .bind(payment.custom_fee)
        .execute(&mut **tx)
        .await?;

        for (position, item) in order.items.iter().enumerate() {
            sqlx::query(
                r#"INSERT INTO items (order_uid, position, chrt_id, track_number, price, rid,
                       name, sale, size, total_price, nm_id, brand, status)
                   VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)"#,
            )
            .bind(&order.order_uid)
            .bind(position as i32)
            .bind(item.chrt_id)
            .bind(&item.track_number)
            .bind(item.price)
            .bind(&item.rid)
            .bind(&item.name)
            .bind(item.sale)
            .bind(&item.size)
            .bind(item.total_price)
            .bind(item.nm_id)
            .bind(&item.brand)
            .bind(item.status)
            .execute(&mut **tx)
            .await?;
        }

        Ok(true)
    }

    async fn fetch(&self, keys: &[String]) -> Result<HashMap<String, Order>, StoreError> {
        let rows = sqlx::query(SELECT_ORDERS)
            .bind(keys)
            .fetch_all(&self.pool)
            .await
            .map_err(io_error)?;

        let mut orders = HashMap::with_capacity(rows.len());
        for row in &rows {
            let order = order_from_row(row).map_err(corrupt)?;
            orders.insert(order.order_uid.clone(), order);
        }

        if orders.is_empty() {
            return Ok(orders);
        }

        let item_rows = sqlx::query(SELECT_ITEMS)
            .bind(keys)
            .fetch_all(&self.pool)
            .await
            .map_err(io_error)?;

        for row in &item_rows {
            let order_uid: String = row.try_get("order_uid").map_err(corrupt)?;
            if let Some(order) = orders.get_mut(&order_uid) {
                order.items.push(item_from_row(row).map_err(corrupt)?);
            }
        }

        Ok(orders)
    }
}

#[async_trait]
impl OrderStore for PgStore {
    async fn insert(&self, order: &Order) -> Result<(), StoreError> {
        let _timer = METRICS.store_duration.with_label_values(&["insert"]).start_timer();

        let mut tx = self.pool.begin().await.map_err(io_error)?;
        let inserted = Self::write_order(&mut tx, order).await.map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Conflict(order.order_uid.clone())
            } else {
                io_error(e)
            }
        })?;

        if !inserted {
            // 事务在 drop 时回滚
            return Err(StoreError::Conflict(order.order_uid.clone()));
        }

        tx.commit().await.map_err(io_error)?;
        debug!(order_uid = %order.order_uid, items = order.items.len(), "order stored");
        Ok(())
    }

    async fn upsert(&self, order: &Order) -> Result<(), StoreError> {
        let _timer = METRICS.store_duration.with_label_values(&["upsert"]).start_timer();

        let mut tx = self.pool.begin().await.map_err(io_error)?;

        // 子实体通过 ON DELETE CASCADE 一并删除
        sqlx::query("DELETE FROM orders WHERE order_uid = $1")
            .bind(&order.order_uid)
            .execute(&mut *tx)
            .await
            .map_err(io_error)?;

        let inserted = Self::write_order(&mut tx, order).await.map_err(io_error)?;
        if !inserted {
            return Err(StoreError::Io(format!(
                "concurrent write to order '{}' during upsert",
                order.order_uid
            )));
        }

        tx.commit().await.map_err(io_error)?;
        debug!(order_uid = %order.order_uid, "order upserted");
        Ok(())
    }

    async fn get_by_key(&self, key: &str) -> Result<Option<Order>, StoreError> {
        let _timer = METRICS.store_duration.with_label_values(&["get_by_key"]).start_timer();

        let keys = [key.to_string()];
        let mut found = self.fetch(&keys).await?;
        Ok(found.remove(key))
    }

    async fn get_many_by_keys(&self, keys: &[String]) -> Result<HashMap<String, Order>, StoreError> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }

        let _timer = METRICS.store_duration.with_label_values(&["get_many_by_keys"]).start_timer();
        self.fetch(keys).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(io_error)?;
        Ok(())
    }
}

fn order_from_row(row: &PgRow) -> Result<Order, sqlx::Error> {
    Ok(Order {
        order_uid: row.try_get("order_uid")?,
        track_number: row.try_get("track_number")?,
        entry: row.try_get("entry")?,
        delivery: Delivery {
            name: row.try_get("d_name")?,
            phone: row.try_get("d_phone")?,
            zip: row.try_get("d_zip")?,
            city: row.try_get("d_city")?,
            address: row.try_get("d_address")?,
            region: row.try_get("d_region")?,
            email: row.try_get("d_email")?,
        },
        payment: Payment {
            transaction: row.try_get("transaction_id")?,
            request_id: row.try_get("request_id")?,
            currency: row.try_get("currency")?,
            provider: row.try_get("provider")?,
            amount: row.try_get("amount")?,
            payment_dt: row.try_get("payment_dt")?,
            bank: row.try_get("bank")?,
            delivery_cost: row.try_get("delivery_cost")?,
            goods_total: row.try_get("goods_total")?,
            custom_fee: row.try_get("custom_fee")?,
        },
        items: Vec::new(),
        locale: row.try_get("locale")?,
        internal_signature: row.try_get("internal_signature")?,
        customer_id: row.try_get("customer_id")?,
        delivery_service: row.try_get("delivery_service")?,
        shardkey: row.try_get("shardkey")?,
        sm_id: row.try_get("sm_id")?,
        date_created: row.try_get("date_created")?,
        oof_shard: row.try_get("oof_shard")?,
    })
}

fn item_from_row(row: &PgRow) -> Result<Item, sqlx::Error> {
    Ok(Item {
        chrt_id: row.try_get("chrt_id")?,
        track_number: row.try_get("track_number")?,
        price: row.try_get("price")?,
        rid: row.try_get("rid")?,
        name: row.try_get("name")?,
        sale: row.try_get("sale")?,
        size: row.try_get("size")?,
        total_price: row.try_get("total_price")?,
        nm_id: row.try_get("nm_id")?,
        brand: row.try_get("brand")?,
        status: row.try_get("status")?,
    })
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn io_error(err: sqlx::Error) -> StoreError {
    StoreError::Io(err.to_string())
}

fn corrupt(err: sqlx::Error) -> StoreError {
    StoreError::Corrupt(err.to_string())
}
