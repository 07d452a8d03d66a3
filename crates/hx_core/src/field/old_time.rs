// crates/hx_core/src/field/old_time.rs

//! 旧时间层环形缓冲
//!
//! 固定深度的环形存储：`store` 把当前值写入下一个槽位，
//! 第 1 层为上一时间步，第 2 层为再上一步。槽位内存复用，不随时间步重新分配。

/// 默认保留的旧时间层数
pub const OLD_TIME_DEPTH: usize = 2;

/// 旧时间层环形缓冲
#[derive(Debug, Clone)]
pub struct OldTimeRing<T> {
    slots: Vec<Vec<T>>,
    head: usize,
    len: usize,
}

impl<T: Copy> OldTimeRing<T> {
    /// 创建深度为 `depth` 的缓冲
    pub fn new(depth: usize) -> Self {
        Self {
            slots: (0..depth.max(1)).map(|_| Vec::new()).collect(),
            head: 0,
            len: 0,
        }
    }

    /// 深度
    #[inline]
    pub fn depth(&self) -> usize {
        self.slots.len()
    }

    /// 已保存的层数
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// 是否为空
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 保存当前值为第 1 层，原有各层后移
    pub fn store(&mut self, current: &[T]) {
        let depth = self.depth();
        self.head = (self.head + 1) % depth;
        let slot = &mut self.slots[self.head];
        slot.clear();
        slot.extend_from_slice(current);
        self.len = (self.len + 1).min(depth);
    }

    /// 第 k 层（k ≥ 1）
    pub fn level(&self, k: usize) -> Option<&[T]> {
        if k == 0 || k > self.len {
            return None;
        }
        let depth = self.depth();
        let idx = (self.head + depth - (k - 1)) % depth;
        Some(&self.slots[idx])
    }

    /// 覆盖第 1 层（子循环结束后恢复旧值）
    pub fn overwrite_latest(&mut self, values: &[T]) {
        if self.len == 0 {
            self.store(values);
            return;
        }
        let slot = &mut self.slots[self.head];
        slot.clear();
        slot.extend_from_slice(values);
    }

    /// 清空
    pub fn clear(&mut self) {
        self.len = 0;
        for s in &mut self.slots {
            s.clear();
        }
    }
}

impl<T: Copy> Default for OldTimeRing<T> {
    fn default() -> Self {
        Self::new(OLD_TIME_DEPTH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_levels() {
        let mut ring = OldTimeRing::new(2);
        assert!(ring.level(1).is_none());
        ring.store(&[1.0]);
        ring.store(&[2.0]);
        assert_eq!(ring.level(1), Some(&[2.0][..]));
        assert_eq!(ring.level(2), Some(&[1.0][..]));
        ring.store(&[3.0]);
        assert_eq!(ring.level(1), Some(&[3.0][..]));
        assert_eq!(ring.level(2), Some(&[2.0][..]));
        assert!(ring.level(3).is_none());
        assert_eq!(ring.len(), 2);
    }

    #[test]
    fn test_overwrite_latest() {
        let mut ring = OldTimeRing::new(2);
        ring.store(&[1.0, 1.0]);
        ring.overwrite_latest(&[5.0, 6.0]);
        assert_eq!(ring.level(1), Some(&[5.0, 6.0][..]));
        ring.clear();
        assert!(ring.is_empty());
    }
}
