//! 内存存储实现
//!
//! `MemoryStore` 用于测试和 `--store memory` 的本地运行；
//! `MemorySnapshotStore` 用于测试和基准测试。两者都支持故障注入，
//! 用来覆盖 I/O 失败路径。

use crate::domain::order::Order;
use crate::domain::ports::{OrderStore, SnapshotError, SnapshotStore, StoreError};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// 内存订单存储
#[derive(Default)]
pub struct MemoryStore {
    orders: RwLock<HashMap<String, Order>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 故障注入：之后的读取返回 I/O 错误
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// 故障注入：之后的写入返回 I/O 错误
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// 直接删除订单（模拟存储侧清理）
    pub fn remove(&self, key: &str) -> Option<Order> {
        self.orders.write().remove(key)
    }

    pub fn len(&self) -> usize {
        self.orders.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_read(&self) -> Result<(), StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Io("injected read failure".to_string()));
        }
        Ok(())
    }

    fn check_write(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Io("injected write failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn insert(&self, order: &Order) -> Result<(), StoreError> {
        self.check_write()?;

        let mut orders = self.orders.write();
        if orders.contains_key(&order.order_uid) {
            return Err(StoreError::Conflict(order.order_uid.clone()));
        }
        orders.insert(order.order_uid.clone(), order.clone());
        Ok(())
    }

    async fn upsert(&self, order: &Order) -> Result<(), StoreError> {
        self.check_write()?;

        self.orders
            .write()
            .insert(order.order_uid.clone(), order.clone());
        Ok(())
    }

    async fn get_by_key(&self, key: &str) -> Result<Option<Order>, StoreError> {
        self.check_read()?;
        Ok(self.orders.read().get(key).cloned())
    }

    async fn get_many_by_keys(&self, keys: &[String]) -> Result<HashMap<String, Order>, StoreError> {
        self.check_read()?;

        let orders = self.orders.read();
        Ok(keys
            .iter()
            .filter_map(|key| orders.get(key).map(|order| (key.clone(), order.clone())))
            .collect())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check_read()
    }
}

/// 内存快照存储
#[derive(Default)]
pub struct MemorySnapshotStore {
    keys: Mutex<Option<Vec<String>>>,
    writes: AtomicUsize,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置一份快照
    pub fn with_keys(keys: &[&str]) -> Self {
        let store = Self::new();
        *store.keys.lock() = Some(keys.iter().map(|k| k.to_string()).collect());
        store
    }

    /// 当前持久化的 key 列表
    pub fn keys(&self) -> Option<Vec<String>> {
        self.keys.lock().clone()
    }

    /// 成功写入次数
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn write(&self, keys: &[String]) -> Result<(), SnapshotError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::Other, "injected snapshot write failure").into());
        }

        *self.keys.lock() = Some(keys.to_vec());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn read(&self) -> Result<Option<Vec<String>>, SnapshotError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::Other, "injected snapshot read failure").into());
        }
        Ok(self.keys.lock().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::fixtures::sample_order;

    #[tokio::test]
    async fn test_insert_conflict() {
        let store = MemoryStore::new();
        store.insert(&sample_order("o1")).await.unwrap();

        let result = store.insert(&sample_order("o1")).await;
        assert!(matches!(result, Err(StoreError::Conflict(key)) if key == "o1"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_upsert_replaces() {
        let store = MemoryStore::new();
        store.insert(&sample_order("o1")).await.unwrap();

        let mut updated = sample_order("o1");
        updated.entry = "UPDATED".to_string();
        store.upsert(&updated).await.unwrap();

        let stored = store.get_by_key("o1").await.unwrap().unwrap();
        assert_eq!(stored.entry, "UPDATED");
    }

    #[tokio::test]
    async fn test_get_many_skips_missing() {
        let store = MemoryStore::new();
        store.insert(&sample_order("a")).await.unwrap();
        store.insert(&sample_order("c")).await.unwrap();

        let keys = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let found = store.get_many_by_keys(&keys).await.unwrap();
        assert_eq!(found.len(), 2);
        assert!(found.contains_key("a"));
        assert!(!found.contains_key("b"));
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let store = MemoryStore::new();
        store.fail_writes(true);
        assert!(matches!(
            store.insert(&sample_order("o1")).await,
            Err(StoreError::Io(_))
        ));

        store.fail_reads(true);
        assert!(store.get_by_key("o1").await.is_err());
        assert!(store.ping().await.is_err());
    }

    #[tokio::test]
    async fn test_snapshot_store() {
        let snapshot = MemorySnapshotStore::new();
        assert_eq!(snapshot.read().await.unwrap(), None);

        snapshot.write(&["a".to_string()]).await.unwrap();
        assert_eq!(snapshot.read().await.unwrap(), Some(vec!["a".to_string()]));
        assert_eq!(snapshot.writes(), 1);

        snapshot.fail_writes(true);
        assert!(snapshot.write(&[]).await.is_err());
        assert_eq!(snapshot.writes(), 1);
    }
}
