use alloc::{sync::Arc, vec::Vec};
use core::{
    fmt,
    sync::atomic::{AtomicUsize, Ordering},
};

use bytes::BytesMut;
use spin::Mutex;
use tracing::{debug, trace};

use crate::memory::{BufferRecycler, OwnedMemory, ReclaimedBuffer};

/// 缓冲池策略配置。
///
/// # 契约说明（What）
/// - `max_free_slots`：自由链表最多缓存的区域数量，超出部分直接丢弃并按“丢失”计入统计；
/// - `zero_on_reclaim`：回收时是否先擦除区域内容再放回自由链表。
///   租借路径总是返回全零区域，因此该开关只影响闲置区域在内存中的残留，默认关闭。
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PoolConfig {
    pub max_free_slots: usize,
    pub zero_on_reclaim: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_free_slots: 1024,
            zero_on_reclaim: false,
        }
    }
}

impl PoolConfig {
    /// 设置自由链表上限。
    pub fn with_max_free_slots(mut self, max_free_slots: usize) -> Self {
        self.max_free_slots = max_free_slots;
        self
    }

    /// 设置回收时是否擦除内容。
    pub fn with_zero_on_reclaim(mut self, zero_on_reclaim: bool) -> Self {
        self.zero_on_reclaim = zero_on_reclaim;
        self
    }
}

/// 缓冲池统计快照。
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PoolStats {
    /// 池累计持有的区域字节数（租出 + 闲置）。
    pub allocated_bytes: usize,
    /// 常驻内存字节数。
    pub resident_bytes: usize,
    /// 自由链表中的闲置字节数。
    pub available_bytes: usize,
    /// 尚未退役的租约数量。
    pub active_leases: usize,
    /// 自由链表中的区域数量。
    pub free_slots: usize,
    /// 自由链表未命中、被迫新分配的次数。
    pub pool_misses: usize,
}

/// `SlabMemoryPool` 提供基于自由链表（Free List）的池化内存块来源，
/// 作为分段缓冲的“池化内存提供者”协作者。
///
/// # 模块角色（Why）
/// - 生产者从池中租借区域、填充数据并冻结为 [`OwnedMemory`] 后挂入段链；
/// - 段链退役、最后一个持有者释放时，区域经由 [`BufferRecycler`] 自动回到自由链表。
///
/// # 核心机制（How）
/// - 内部维护 `spin::Mutex<Vec<BytesMut>>` 作为自由链表，租借时优先复用容量足够的块；
/// - `PoolMetrics` 通过原子计数跟踪字节与租约统计，支撑 [`SlabMemoryPool::statistics`]。
///
/// # 契约说明（What）
/// - **线程安全**：共享状态均由 `spin::Mutex` 与原子计数保护，可在多线程间克隆使用；
/// - **后置条件**：`rent(n)` 返回长度恰为 `n` 的全零区域。
#[derive(Clone)]
pub struct SlabMemoryPool {
    inner: Arc<PoolInner>,
}

impl Default for SlabMemoryPool {
    fn default() -> Self {
        Self::with_config(PoolConfig::default())
    }
}

impl SlabMemoryPool {
    /// 使用默认配置创建空池。
    pub fn new() -> Self {
        Self::default()
    }

    /// 使用给定配置创建空池。
    pub fn with_config(config: PoolConfig) -> Self {
        Self {
            inner: Arc::new(PoolInner::new(config)),
        }
    }

    /// 当前生效的配置。
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// 租借一块长度为 `capacity` 的全零可写区域。
    pub fn rent(&self, capacity: usize) -> PooledRegion {
        let buffer = self.inner.acquire_buffer(capacity);
        let recycler: Arc<dyn BufferRecycler> = self.inner.clone();
        PooledRegion {
            buffer: Some(buffer),
            recycler,
        }
    }

    /// 租借区域、写入 `data` 并冻结为只读内存块。
    pub fn acquire_copy(&self, data: &[u8]) -> OwnedMemory {
        let mut region = self.rent(data.len());
        region.as_mut_slice().copy_from_slice(data);
        region.freeze()
    }

    /// 清空自由链表，返回释放的字节数。
    pub fn shrink_to_fit(&self) -> usize {
        self.inner.shrink_free_list()
    }

    /// 读取统计快照。
    pub fn statistics(&self) -> PoolStats {
        self.inner.snapshot()
    }
}

impl fmt::Debug for SlabMemoryPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlabMemoryPool")
            .field("config", &self.inner.config)
            .field("stats", &self.inner.snapshot())
            .finish()
    }
}

/// 尚未发布的池化区域，生产阶段可写。
///
/// - [`PooledRegion::freeze`] 将其转为只读的 [`OwnedMemory`]，之后只能读；
/// - 未冻结即被丢弃时，区域直接归还池。
pub struct PooledRegion {
    buffer: Option<BytesMut>,
    recycler: Arc<dyn BufferRecycler>,
}

impl PooledRegion {
    /// 区域长度。
    pub fn len(&self) -> usize {
        self.buffer.as_ref().map_or(0, BytesMut::len)
    }

    /// 区域是否为空。
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 可写视图。
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        match self.buffer.as_mut() {
            Some(buffer) => buffer.as_mut(),
            None => &mut [],
        }
    }

    /// 冻结为只读内存块。
    pub fn freeze(mut self) -> OwnedMemory {
        let buffer = self.buffer.take().unwrap_or_default();
        OwnedMemory::pooled(buffer, Arc::clone(&self.recycler))
    }
}

impl Drop for PooledRegion {
    fn drop(&mut self) {
        if let Some(mut buffer) = self.buffer.take() {
            let capacity = buffer.capacity();
            buffer.clear();
            self.recycler
                .reclaim(ReclaimedBuffer::new(capacity, Some(buffer)));
        }
    }
}

impl fmt::Debug for PooledRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledRegion")
            .field("len", &self.len())
            .finish()
    }
}

struct PoolInner {
    config: PoolConfig,
    free_list: Mutex<Vec<BytesMut>>,
    metrics: PoolMetrics,
}

impl PoolInner {
    fn new(config: PoolConfig) -> Self {
        Self {
            config,
            free_list: Mutex::new(Vec::new()),
            metrics: PoolMetrics::default(),
        }
    }

    /// 从自由链表或堆上获取一个满足容量的 `BytesMut`，并填充为 `capacity` 个零字节。
    fn acquire_buffer(&self, capacity: usize) -> BytesMut {
        let reused = {
            let mut list = self.free_list.lock();
            list.iter()
                .position(|buf| buf.capacity() >= capacity)
                .map(|index| list.swap_remove(index))
        };

        let mut buffer = match reused {
            Some(buf) => {
                self.metrics.decrease_available(buf.capacity());
                trace!(capacity, reused = true, "pooled region leased");
                buf
            }
            None => {
                let buf = BytesMut::with_capacity(capacity);
                self.metrics.increase_on_new_allocation(buf.capacity());
                self.metrics.pool_misses.fetch_add(1, Ordering::Relaxed);
                trace!(capacity, reused = false, "pooled region leased");
                buf
            }
        };
        buffer.clear();
        buffer.resize(capacity, 0);
        self.metrics.active_leases.fetch_add(1, Ordering::Relaxed);
        buffer
    }

    fn shrink_free_list(&self) -> usize {
        let mut list = self.free_list.lock();
        let reclaimed: usize = list.iter().map(BytesMut::capacity).sum();
        list.clear();
        self.metrics.decrease_available(reclaimed);
        self.metrics.decrease_on_loss(reclaimed);
        debug!(reclaimed, "pool free list shrunk");
        reclaimed
    }

    fn snapshot(&self) -> PoolStats {
        let free_slots = self.free_list.lock().len();
        PoolStats {
            allocated_bytes: self.metrics.allocated_bytes.load(Ordering::Relaxed),
            resident_bytes: self.metrics.resident_bytes.load(Ordering::Relaxed),
            available_bytes: self.metrics.available_bytes.load(Ordering::Relaxed),
            active_leases: self.metrics.active_leases.load(Ordering::Relaxed),
            free_slots,
            pool_misses: self.metrics.pool_misses.load(Ordering::Relaxed),
        }
    }
}

impl BufferRecycler for PoolInner {
    fn reclaim(&self, reclaimed: ReclaimedBuffer) {
        saturating_sub(&self.metrics.active_leases, 1);
        let capacity = reclaimed.capacity();
        let Some(mut buf) = reclaimed.into_buffer() else {
            trace!(capacity, "pooled region lost to outstanding aliases");
            self.metrics.decrease_on_loss(capacity);
            return;
        };
        if self.config.zero_on_reclaim {
            let len = buf.capacity();
            buf.clear();
            buf.resize(len, 0);
        }
        buf.clear();

        let mut list = self.free_list.lock();
        if list.len() >= self.config.max_free_slots {
            drop(list);
            debug!(capacity, "pool free list full, dropping region");
            self.metrics.decrease_on_loss(buf.capacity());
            return;
        }
        self.metrics.increase_available(buf.capacity());
        list.push(buf);
    }
}

#[derive(Default)]
struct PoolMetrics {
    allocated_bytes: AtomicUsize,
    resident_bytes: AtomicUsize,
    available_bytes: AtomicUsize,
    active_leases: AtomicUsize,
    pool_misses: AtomicUsize,
}

impl PoolMetrics {
    fn increase_on_new_allocation(&self, capacity: usize) {
        self.allocated_bytes.fetch_add(capacity, Ordering::Relaxed);
        self.resident_bytes.fetch_add(capacity, Ordering::Relaxed);
    }

    fn increase_available(&self, capacity: usize) {
        self.available_bytes.fetch_add(capacity, Ordering::Relaxed);
    }

    fn decrease_available(&self, capacity: usize) {
        saturating_sub(&self.available_bytes, capacity);
    }

    fn decrease_on_loss(&self, capacity: usize) {
        saturating_sub(&self.allocated_bytes, capacity);
        saturating_sub(&self.resident_bytes, capacity);
    }
}

fn saturating_sub(target: &AtomicUsize, value: usize) {
    let _ = target.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
        Some(current.saturating_sub(value))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn released_memory_returns_to_free_list() {
        let pool = SlabMemoryPool::new();
        let memory = pool.acquire_copy(&[1, 2, 3, 4]);
        assert_eq!(pool.statistics().active_leases, 1);
        assert!(memory.release());

        let stats = pool.statistics();
        assert_eq!(stats.active_leases, 0);
        assert_eq!(stats.free_slots, 1);
        assert!(stats.available_bytes >= 4);
    }

    #[test]
    fn lost_region_releases_its_full_allocation() {
        let pool = SlabMemoryPool::new();
        drop(pool.rent(64));
        let memory = pool.acquire_copy(&[9; 16]);
        assert_eq!(pool.statistics().pool_misses, 1, "复用自由链表中的大块");

        let alias = memory.slice(0, 4).expect("合法区间");
        drop(memory);
        let stats = pool.statistics();
        assert_eq!(stats.active_leases, 0);
        assert_eq!(stats.allocated_bytes, 0);
        assert_eq!(stats.resident_bytes, 0);
        assert_eq!(alias.len(), 4);
    }

    #[test]
    fn unfrozen_region_is_returned_on_drop() {
        let pool = SlabMemoryPool::new();
        {
            let region = pool.rent(32);
            assert_eq!(region.len(), 32);
        }
        let stats = pool.statistics();
        assert_eq!(stats.active_leases, 0);
        assert_eq!(stats.free_slots, 1);
    }
}
