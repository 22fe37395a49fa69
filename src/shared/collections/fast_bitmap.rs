/// 槽位存活位图
///
/// 基于Vec<u64>实现，每个块存储64个bit，第 i 位表示缓存环第 i 个槽位
/// 是否持有仍然有效的key。
///
/// 性能特点：
/// - set/get: O(1) 位操作
/// - count_ones: O(n/64) 使用 POPCNT 指令
/// - 创建后不再分配内存
///
/// 对于容量10000的缓存：
/// - 仅需157个u64块
/// - 与 HashMap<String, bool> 相比没有逐key的堆分配

#[derive(Clone, Debug)]
pub struct FastBitmap {
    /// u64块数组，每块存储64个bit
    blocks: Vec<u64>,
    /// 总bit数
    len: usize,
}

impl FastBitmap {
    /// 创建新的位图（全部为0）
    ///
    /// # 参数
    /// * `len` - bit总数
    pub fn new(len: usize) -> Self {
        let num_blocks = (len + 63) / 64; // 向上取整
        Self {
            blocks: vec![0u64; num_blocks],
            len,
        }
    }

    /// 设置指定位置的bit
    ///
    /// # 参数
    /// * `index` - bit位置 (0-based)
    /// * `value` - true设置为1，false设置为0
    #[inline]
    pub fn set(&mut self, index: usize, value: bool) {
        debug_assert!(index < self.len, "Index out of bounds");

        let block_idx = index / 64;
        let bit_offset = index % 64;

        if value {
            self.blocks[block_idx] |= 1u64 << bit_offset;
        } else {
            self.blocks[block_idx] &= !(1u64 << bit_offset);
        }
    }

    /// 获取指定位置的bit
    #[inline]
    pub fn get(&self, index: usize) -> bool {
        debug_assert!(index < self.len, "Index out of bounds");

        let block_idx = index / 64;
        let bit_offset = index % 64;

        (self.blocks[block_idx] & (1u64 << bit_offset)) != 0
    }

    /// 返回位图总长度
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// 是否为空（所有bit都是0）
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.blocks.iter().all(|&block| block == 0)
    }

    /// 统计设置的bit数量
    pub fn count_ones(&self) -> usize {
        self.blocks.iter().map(|&block| block.count_ones() as usize).sum()
    }
}
