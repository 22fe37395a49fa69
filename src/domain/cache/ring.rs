/// 缓存准入顺序环（Slot Ring）
///
/// 固定容量的槽位数组 + 存活位图，记录 key 的准入顺序：
/// - 预分配固定容量，准入时零动态分配
/// - O(1) 准入/淘汰/释放
/// - 游标单调递增（对容量取模），指向下一个要被覆盖的槽位
///
/// # 不变量
///
/// - 从游标开始环绕一周，存活槽位按准入时间从旧到新排列
/// - 游标处的槽位如果存活，它就是最早准入、仍然存活的 key
/// - `live_count` 等于存活位图中 1 的个数
///
/// # 释放与复用
///
/// `release` 只清除存活标记，不压缩环。被释放的槽位在游标下一次
/// 转到它时被复用；在那之前，准入总是写入游标处的槽位（游标处存活
/// 则淘汰它），这样淘汰顺序始终是严格的 FIFO。
///
/// ```text
/// capacity = 3, 准入 o1 o2 o3 o4:
///
///   slot:    0    1    2
///           [o4] [o2] [o3]
///                 ^ cursor (o2 最旧，下一个被淘汰)
/// ```

use crate::shared::collections::FastBitmap;
use std::sync::Arc;

/// 一次准入的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Installed {
    /// 新 key 所在槽位
    pub slot: usize,
    /// 被覆盖的存活 key（淘汰）
    pub displaced: Option<Arc<str>>,
}

/// 准入顺序环
pub struct SlotRing {
    /// 槽位 key（预分配）
    slots: Box<[Option<Arc<str>>]>,

    /// 槽位存活标记
    live: FastBitmap,

    /// 容量（固定）
    capacity: usize,

    /// 下一个要覆盖的槽位
    cursor: usize,

    /// 存活槽位数量
    live_count: usize,
}

impl SlotRing {
    /// 创建指定容量的环
    ///
    /// # 参数
    /// - `capacity`: 最大存活 key 数量
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "Capacity must be greater than 0");

        let slots = (0..capacity)
            .map(|_| None)
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            slots,
            live: FastBitmap::new(capacity),
            capacity,
            cursor: 0,
            live_count: 0,
        }
    }

    /// 在游标处安装 key，游标前进一格
    ///
    /// 游标处槽位存活时，其中的 key 被淘汰并通过 `displaced` 返回；
    /// 否则占用空闲槽位，`live_count` 加一。
    ///
    /// # 性能
    /// O(1) - 一次位图读写和一次索引递增
    #[inline]
    pub fn install(&mut self, key: Arc<str>) -> Installed {
        let slot = self.cursor;

        let displaced = if self.live.get(slot) {
            self.slots[slot].take()
        } else {
            self.live_count += 1;
            None
        };

        self.slots[slot] = Some(key);
        self.live.set(slot, true);
        self.cursor = (slot + 1) % self.capacity;

        debug_assert_eq!(self.live_count, self.live.count_ones());

        Installed { slot, displaced }
    }

    /// 释放槽位（清除存活标记，不压缩）
    ///
    /// # 返回
    /// 槽位原本存活则返回 true
    #[inline]
    pub fn release(&mut self, slot: usize) -> bool {
        if slot >= self.capacity || !self.live.get(slot) {
            return false;
        }

        self.live.set(slot, false);
        self.slots[slot] = None;
        self.live_count -= 1;

        true
    }

    /// 获取槽位中的存活 key
    #[inline]
    pub fn key_at(&self, slot: usize) -> Option<&Arc<str>> {
        if slot < self.capacity && self.live.get(slot) {
            self.slots[slot].as_ref()
        } else {
            None
        }
    }

    /// 按准入顺序（从旧到新）遍历存活 key
    pub fn live_keys(&self) -> impl Iterator<Item = &Arc<str>> + '_ {
        (0..self.capacity)
            .map(move |offset| (self.cursor + offset) % self.capacity)
            .filter_map(move |slot| self.key_at(slot))
    }

    /// 下一个被淘汰的 key（游标处存活时）
    #[inline]
    pub fn next_victim(&self) -> Option<&Arc<str>> {
        self.key_at(self.cursor)
    }

    /// 存活 key 数量
    #[inline]
    pub fn live_count(&self) -> usize {
        self.live_count
    }

    /// 是否没有存活 key
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.live_count == 0
    }

    /// 获取容量
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 获取游标位置
    #[inline]
    pub fn cursor(&self) -> usize {
        self.cursor
    }
}
