//! 段链：生产者构造、消费者只读的内存段节点。
//!
//! # 模块定位（Why）
//! - 流控层按到达顺序把离散内存块挂成单向链，消费者借助游标在链上随机访问，全程不复制字节；
//! - 每个段在挂链时即固定自己的累计偏移（running index），使位置比较只与段数相关，与字节数无关。
//!
//! # 生命周期（How）
//! - **构造期**：段以值的形式存在，生产者通过 `&mut` 调用 [`Segment::set_memory`]；
//! - **发布期**：段进入 `Arc` 后只读，唯一允许的写入是一次性的 [`Segment::set_next`]，
//!   且被挂接的后继段此时仍是值，累计偏移与链标识在其进入 `Arc` 之前写定。

use alloc::sync::Arc;
use core::{
    fmt, mem,
    sync::atomic::{AtomicU64, Ordering},
};
use std::sync::OnceLock;

use bytes::Bytes;
use tracing::{debug, trace};

use crate::{buf_view::BufView, cursor::Cursor, memory::OwnedMemory};

/// 段链节点。
///
/// # 契约说明（What）
/// - `0 <= start <= end <= memory.capacity()`；
/// - `next` 至多设置一次，此后不再变化；
/// - `next.running_index == running_index + (end - start)`，在挂链时写定，永不重算；
/// - 同一条链上的段共享链标识：未挂链的段各自持有新标识，挂链时后继继承前驱的标识。
pub struct Segment {
    memory: OwnedMemory,
    start: usize,
    end: usize,
    running_index: usize,
    chain: u64,
    next: OnceLock<Arc<Segment>>,
}

static NEXT_CHAIN: AtomicU64 = AtomicU64::new(0);

impl Segment {
    /// 创建未装填内存、未挂链的空段。
    pub fn new() -> Self {
        Self {
            memory: OwnedMemory::empty(),
            start: 0,
            end: 0,
            running_index: 0,
            chain: NEXT_CHAIN.fetch_add(1, Ordering::Relaxed),
            next: OnceLock::new(),
        }
    }

    /// 创建装填了 `memory[start..end]` 的段。
    ///
    /// # Panics
    /// 与 [`Segment::set_memory`] 相同。
    pub fn with_memory(memory: OwnedMemory, start: usize, end: usize) -> Self {
        let mut segment = Self::new();
        segment.set_memory(memory, start, end);
        segment
    }

    /// 设置段的后备内存与有效区间 `[start, end)`。
    ///
    /// 只能在构造期调用：`&mut self` 保证段尚未被任何游标引用。
    ///
    /// # Panics
    /// `start > end` 或 `end` 超出内存容量时 panic；这是生产者缺陷，不属于可恢复错误。
    pub fn set_memory(&mut self, memory: OwnedMemory, start: usize, end: usize) {
        assert!(
            start <= end,
            "segment range is inverted: start {start} > end {end}"
        );
        assert!(
            end <= memory.capacity(),
            "segment end {end} exceeds memory capacity {}",
            memory.capacity()
        );
        self.memory = memory;
        self.start = start;
        self.end = end;
    }

    /// 挂接后继段并写定其累计偏移，返回已发布的后继段。
    ///
    /// # Panics
    /// 当前段已经挂接过后继，或 `next` 自身已带有后继（其后继的累计偏移无法再修正）时 panic。
    pub fn set_next(&self, mut next: Segment) -> Arc<Segment> {
        assert!(
            next.next.get().is_none(),
            "successor segment is already linked to its own successor"
        );
        next.running_index = self.running_index + self.len();
        next.chain = self.chain;
        let running_index = next.running_index;
        let next = Arc::new(next);
        if self.next.set(Arc::clone(&next)).is_err() {
            panic!("segment is already linked to a successor");
        }
        trace!(running_index, len = next.len(), "segment linked");
        next
    }

    /// 有效区间起点（相对后备内存）。
    pub fn start(&self) -> usize {
        self.start
    }

    /// 有效区间终点（相对后备内存，开区间）。
    pub fn end(&self) -> usize {
        self.end
    }

    /// 有效字节数。
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// 是否不含有效字节。
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// 链首到本段起点之间的字节总数。
    pub fn running_index(&self) -> usize {
        self.running_index
    }

    /// 所属链的标识；用于在不遍历的前提下拒绝来自其它链的游标。
    pub(crate) fn chain(&self) -> u64 {
        self.chain
    }

    /// 后继段。
    pub fn next(&self) -> Option<&Arc<Segment>> {
        self.next.get()
    }

    /// 后备内存。
    pub fn memory(&self) -> &OwnedMemory {
        &self.memory
    }

    /// 有效区间的字节。
    pub fn as_slice(&self) -> &[u8] {
        &self.memory.as_slice()[self.start..self.end]
    }

    /// 后备内存中 `[from, to)` 的零拷贝视图，调用方保证区间落在有效区间内。
    pub(crate) fn bytes(&self, from: usize, to: usize) -> Bytes {
        debug_assert!(self.start <= from && from <= to && to <= self.end);
        self.memory.as_bytes().slice(from..to)
    }
}

impl Default for Segment {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Segment {
    fn drop(&mut self) {
        // 逐段摘链，避免长链（例如每字节一段）递归析构耗尽栈空间。
        let mut next = mem::take(&mut self.next).into_inner();
        while let Some(segment) = next {
            next = match Arc::try_unwrap(segment) {
                Ok(mut owned) => mem::take(&mut owned.next).into_inner(),
                Err(_) => None,
            };
        }
    }
}

impl fmt::Debug for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Segment")
            .field("start", &self.start)
            .field("end", &self.end)
            .field("running_index", &self.running_index)
            .field("linked", &self.next.get().is_some())
            .finish()
    }
}

/// 生产者侧的链构建器：按顺序追加字节区域，最后发布为 [`BufView`]。
///
/// # 教案式说明
/// - **意图 (Why)**：大多数生产者只需“把若干块内存按顺序串起来交给读者”，
///   无需手动维护链尾与游标。
/// - **逻辑 (How)**：首段在第一次追加时进入 `Arc`，之后每次追加都通过 [`Segment::set_next`]
///   挂在链尾；`build` 以 `(首段, start)` 与 `(尾段, end)` 构造视图。
/// - **契约 (What)**：空构建器发布为空视图；空区域同样会成为一个段，保证物理布局如实反映输入。
#[derive(Default)]
pub struct ChainBuilder {
    head: Option<Arc<Segment>>,
    tail: Option<Arc<Segment>>,
    segments: usize,
}

impl ChainBuilder {
    /// 创建空构建器。
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加 `memory[start..end]`。
    ///
    /// # Panics
    /// 与 [`Segment::set_memory`] 相同。
    pub fn push_memory(&mut self, memory: OwnedMemory, start: usize, end: usize) -> &mut Self {
        self.push(Segment::with_memory(memory, start, end))
    }

    /// 追加一整块字节区域，不复制数据。
    pub fn push_bytes(&mut self, bytes: impl Into<Bytes>) -> &mut Self {
        let memory = OwnedMemory::from_bytes(bytes);
        let end = memory.capacity();
        self.push_memory(memory, 0, end)
    }

    /// 追加一个构造好的段。
    pub fn push(&mut self, segment: Segment) -> &mut Self {
        let linked = match self.tail.take() {
            Some(tail) => tail.set_next(segment),
            None => {
                let head = Arc::new(segment);
                self.head = Some(Arc::clone(&head));
                head
            }
        };
        self.tail = Some(linked);
        self.segments += 1;
        self
    }

    /// 已追加的段数。
    pub fn segments(&self) -> usize {
        self.segments
    }

    /// 发布链，返回覆盖全部段的视图。
    pub fn build(&mut self) -> BufView {
        let (Some(head), Some(tail)) = (self.head.take(), self.tail.take()) else {
            return BufView::empty();
        };
        let begin = Cursor::from_parts(Arc::clone(&head), head.start());
        let end_index = tail.end();
        let end = Cursor::from_parts(tail, end_index);
        let view = BufView::from_cursors(begin, end);
        debug!(
            segments = self.segments,
            len = view.len(),
            "segment chain published"
        );
        self.segments = 0;
        view
    }
}

impl fmt::Debug for ChainBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainBuilder")
            .field("segments", &self.segments)
            .finish()
    }
}
