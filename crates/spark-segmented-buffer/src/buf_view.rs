use alloc::{sync::Arc, vec::Vec};
use core::{fmt, iter::FusedIterator};

use bytes::{Buf, Bytes, BytesMut};

use crate::{
    cursor::Cursor,
    error::{BufferError, Result, non_negative},
    memory::OwnedMemory,
    segment::{ChainBuilder, Segment},
};

/// `BufView` 是段链上的逻辑窗口 `[begin, end)`，与物理分段布局无关。
///
/// # 设计背景（Why）
/// - 传输层按到达顺序产出离散内存块，协议层却希望面对一段连续字节；
///   视图在不复制的前提下把多段内存呈现为一个序列，直到调用方显式要求物化。
/// - 多个视图可共享同一条链并拥有各自的窗口（重叠、嵌套或不相交），彼此互不影响。
///
/// # 逻辑解析（How）
/// - 长度 = `end.position() - begin.position()`，只依赖段上写定的累计偏移；
/// - 移动与切片全部委派给 [`Cursor::seek`]，且始终以本视图的 `end` 为边界，
///   即使物理链在 `end` 之后仍有数据；
/// - 物化（[`BufView::to_vec`]）按段顺序逐块复制，成本与长度线性相关。
///
/// # 契约说明（What）
/// - `begin.position() <= end.position()`；
/// - 视图从不拥有内存，只持有段的共享引用；段及其内存在最后一个游标释放后才可回收；
/// - 所有越界请求都返回错误，从不钳制或截断；
/// - 来自其它链的游标一律视为越界：段在挂链时继承链标识，校验只需比较标识与绝对位置。
#[derive(Clone)]
pub struct BufView {
    begin: Cursor,
    end: Cursor,
}

impl BufView {
    /// 空视图。
    pub fn empty() -> Self {
        let segment = Arc::new(Segment::new());
        let begin = Cursor::from_parts(Arc::clone(&segment), 0);
        let end = Cursor::from_parts(segment, 0);
        Self { begin, end }
    }

    /// 以单段覆盖整块字节区域，不复制数据。
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        ChainBuilder::new().push_bytes(bytes).build()
    }

    /// 以单段覆盖 `memory[offset..offset + len]`。
    ///
    /// 区间超出内存容量时返回 [`BufferError::Range`]。
    pub fn from_memory(memory: OwnedMemory, offset: usize, len: usize) -> Result<Self> {
        let capacity = memory.capacity();
        match offset.checked_add(len) {
            Some(end) if end <= capacity => {
                Ok(ChainBuilder::new().push_memory(memory, offset, end).build())
            }
            _ => Err(BufferError::range(
                "len",
                alloc::format!("offset {offset} + len {len} exceeds capacity {capacity}"),
            )),
        }
    }

    /// 由生产者发布的游标对构造视图。
    ///
    /// `end` 位于 `begin` 之前、或两者不属于同一条链时返回 [`BufferError::OutOfRange`]。
    pub fn new(begin: Cursor, end: Cursor) -> Result<Self> {
        begin.check_within(&end, "new")?;
        Ok(Self { begin, end })
    }

    pub(crate) fn from_cursors(begin: Cursor, end: Cursor) -> Self {
        debug_assert!(begin <= end);
        Self { begin, end }
    }

    /// 起始游标。
    pub fn begin(&self) -> &Cursor {
        &self.begin
    }

    /// 结束游标（开区间）。
    pub fn end(&self) -> &Cursor {
        &self.end
    }

    /// 视图长度。
    pub fn len(&self) -> usize {
        self.end.position() - self.begin.position()
    }

    /// 视图是否为空。
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 在本视图边界内移动游标，等价于 `cursor.seek(count, self.end(), false)`。
    pub fn move_cursor(&self, cursor: &Cursor, count: isize) -> Result<Cursor> {
        cursor.seek(count, &self.end, false)
    }

    /// 自 `offset` 起至视图末尾的子视图。
    pub fn slice_from(&self, offset: isize) -> Result<Self> {
        let begin = self.move_cursor(&self.begin, offset)?;
        Ok(Self::from_cursors(begin, self.end.clone()))
    }

    /// 自 `offset` 起长度为 `len` 的子视图。
    pub fn slice(&self, offset: isize, len: isize) -> Result<Self> {
        let len = non_negative("len", len)?;
        let begin = self.move_cursor(&self.begin, offset)?;
        let end = self.walk_within(&begin, len)?;
        Ok(Self::from_cursors(begin, end))
    }

    /// 自 `cursor` 起至视图末尾的子视图。
    pub fn slice_from_cursor(&self, cursor: &Cursor) -> Result<Self> {
        self.check_inside(cursor, "slice")?;
        Ok(Self::from_cursors(cursor.clone(), self.end.clone()))
    }

    /// 自 `cursor` 起长度为 `len` 的子视图。
    pub fn slice_at(&self, cursor: &Cursor, len: isize) -> Result<Self> {
        let len = non_negative("len", len)?;
        self.check_inside(cursor, "slice")?;
        let end = self.walk_within(cursor, len)?;
        Ok(Self::from_cursors(cursor.clone(), end))
    }

    /// `[begin, end)` 子视图；两个游标都必须落在本视图内且顺序正确。
    pub fn slice_between(&self, begin: &Cursor, end: &Cursor) -> Result<Self> {
        self.check_inside(begin, "slice")?;
        self.check_inside(end, "slice")?;
        if begin > end {
            return Err(BufferError::out_of_range(
                "slice",
                begin.position(),
                end.position(),
            ));
        }
        Ok(Self::from_cursors(begin.clone(), end.clone()))
    }

    /// 自 `offset` 起至 `end` 游标的子视图。
    pub fn slice_to_cursor(&self, offset: isize, end: &Cursor) -> Result<Self> {
        let begin = self.move_cursor(&self.begin, offset)?;
        self.check_inside(end, "slice")?;
        if &begin > end {
            return Err(BufferError::out_of_range(
                "slice",
                begin.position(),
                end.position(),
            ));
        }
        Ok(Self::from_cursors(begin, end.clone()))
    }

    /// 物化为新分配的连续字节序列。
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len());
        for chunk in self.chunks() {
            out.extend_from_slice(chunk);
        }
        out
    }

    /// 物化为 `Bytes`；视图落在单个段内时与后备内存共享存储，否则复制。
    pub fn to_bytes(&self) -> Bytes {
        let mut spans = self.spans().filter(|(_, from, to)| from < to);
        let Some((segment, from, to)) = spans.next() else {
            return Bytes::new();
        };
        if to - from == self.len() {
            return segment.bytes(from, to);
        }
        let mut out = BytesMut::with_capacity(self.len());
        out.extend_from_slice(&segment.memory().as_slice()[from..to]);
        for (segment, from, to) in spans {
            out.extend_from_slice(&segment.memory().as_slice()[from..to]);
        }
        out.freeze()
    }

    /// 将视图内容复制到 `dst`，`dst` 长度必须等于视图长度。
    pub fn copy_into_slice(&self, dst: &mut [u8]) -> Result<()> {
        if dst.len() != self.len() {
            return Err(BufferError::range(
                "dst",
                alloc::format!("length {} does not match view length {}", dst.len(), self.len()),
            ));
        }
        let mut written = 0;
        for chunk in self.chunks() {
            dst[written..written + chunk.len()].copy_from_slice(chunk);
            written += chunk.len();
        }
        Ok(())
    }

    /// 按段顺序迭代非空字节块。
    pub fn chunks(&self) -> Chunks<'_> {
        Chunks {
            spans: self.spans(),
        }
    }

    /// 第一个非空字节块；空视图返回空切片。
    pub fn first_chunk(&self) -> &[u8] {
        self.chunks().next().unwrap_or(&[])
    }

    /// 查找 `byte` 第一次出现的位置。
    pub fn position_of(&self, byte: u8) -> Option<Cursor> {
        self.spans().find_map(|(segment, from, to)| {
            segment.memory().as_slice()[from..to]
                .iter()
                .position(|candidate| *candidate == byte)
                .map(|offset| Cursor::from_parts(Arc::clone(segment), from + offset))
        })
    }

    fn spans(&self) -> Spans<'_> {
        Spans {
            segment: Some(self.begin.segment()),
            index: self.begin.index(),
            remaining: self.len(),
        }
    }

    /// 在本视图内从 `cursor` 前移 `count` 字节。
    fn walk_within(&self, cursor: &Cursor, count: usize) -> Result<Cursor> {
        let candidate = cursor.walk(count, false)?;
        candidate.check_within(&self.end, "slice")?;
        Ok(candidate)
    }

    /// 游标必须与本视图同属一条链，且位于 `[begin, end]` 之内。
    fn check_inside(&self, cursor: &Cursor, operation: &'static str) -> Result<()> {
        if !cursor.same_chain(&self.begin) || cursor < &self.begin {
            return Err(BufferError::out_of_range(
                operation,
                cursor.position(),
                self.begin.position(),
            ));
        }
        if cursor > &self.end {
            return Err(BufferError::out_of_range(
                operation,
                cursor.position(),
                self.end.position(),
            ));
        }
        Ok(())
    }
}

impl Default for BufView {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Vec<u8>> for BufView {
    fn from(value: Vec<u8>) -> Self {
        Self::from_bytes(value)
    }
}

impl From<Bytes> for BufView {
    fn from(value: Bytes) -> Self {
        Self::from_bytes(value)
    }
}

impl From<&'static [u8]> for BufView {
    fn from(value: &'static [u8]) -> Self {
        Self::from_bytes(value)
    }
}

impl fmt::Debug for BufView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufView")
            .field("begin", &self.begin.position())
            .field("end", &self.end.position())
            .finish()
    }
}

/// 以视图为消费型读取器：`advance` 只推进 `begin`，不触碰共享的段。
impl Buf for BufView {
    fn remaining(&self) -> usize {
        self.len()
    }

    fn chunk(&self) -> &[u8] {
        self.first_chunk()
    }

    fn advance(&mut self, cnt: usize) {
        assert!(
            cnt <= self.len(),
            "cannot advance past the end of the view: {cnt} > {}",
            self.len()
        );
        // 前一步已证明目标落在视图内，可信模式不会失败。
        if let Ok(begin) = self.begin.walk(cnt, true) {
            self.begin = begin;
        }
    }
}

/// 视图内每个段的 `(段, from, to)` 区间，按链顺序产出。
struct Spans<'a> {
    segment: Option<&'a Arc<Segment>>,
    index: usize,
    remaining: usize,
}

impl<'a> Iterator for Spans<'a> {
    type Item = (&'a Arc<Segment>, usize, usize);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let segment = self.segment?;
        let from = self.index;
        let to = from + (segment.end() - from).min(self.remaining);
        self.remaining -= to - from;
        self.segment = segment.next();
        if let Some(next) = self.segment {
            self.index = next.start();
        }
        Some((segment, from, to))
    }
}

/// `Chunks` 按段顺序产出视图内的非空字节块，零拷贝。
pub struct Chunks<'a> {
    spans: Spans<'a>,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        self.spans.by_ref().find_map(|(segment, from, to)| {
            (from < to).then(|| &segment.memory().as_slice()[from..to])
        })
    }
}

impl FusedIterator for Chunks<'_> {}

impl fmt::Debug for Chunks<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chunks")
            .field("remaining", &self.spans.remaining)
            .finish()
    }
}
