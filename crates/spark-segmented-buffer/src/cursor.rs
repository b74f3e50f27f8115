use alloc::{format, sync::Arc};
use core::{cmp::Ordering, fmt};

use crate::{
    error::{BufferError, Result, non_negative},
    segment::Segment,
};

/// `Cursor` 是段链上的不可变位置值：`(段, 段内下标)`。
///
/// # 设计背景（Why）
/// - 协议解析代码需要在多段内存上反复“记位置、往前走、回头切片”，
///   位置必须是廉价可复制的值，而不是原地推进的指针，才能在多个视图间自由传递。
/// - 段在挂链时写定累计偏移，因而任意两个游标的先后与距离只需比较绝对位置，
///   不必从链首重新遍历。
///
/// # 逻辑解析（How）
/// - 绝对位置 = `segment.running_index + (index - segment.start)`；
/// - 相等与排序均基于绝对位置：段末边界 `(A, A.end)` 与后继段起点 `(B, B.start)` 视为同一位置，
///   保证半开区间语义跨段成立；
/// - [`Cursor::seek`] 返回新的游标，输入游标保持不变。
///
/// # 契约说明（What）
/// - `segment.start <= index <= segment.end`；
/// - `index == segment.end` 合法，表示与后继段的边界，或链尾（终止位置）。
///
/// # 设计考量（Trade-offs）
/// - 相等性不区分游标来自哪条链；跨链的安全性由 [`Cursor::seek`] 与视图切片的链标识校验承担。
#[derive(Clone)]
pub struct Cursor {
    segment: Arc<Segment>,
    index: usize,
}

impl Cursor {
    /// 在 `segment` 的 `index` 处创建游标。
    ///
    /// `index` 不在 `[segment.start, segment.end]` 内时返回 [`BufferError::Range`]。
    pub fn new(segment: Arc<Segment>, index: usize) -> Result<Self> {
        if index < segment.start() || index > segment.end() {
            return Err(BufferError::range(
                "index",
                format!(
                    "{index} is outside segment range [{}, {}]",
                    segment.start(),
                    segment.end()
                ),
            ));
        }
        Ok(Self::from_parts(segment, index))
    }

    pub(crate) fn from_parts(segment: Arc<Segment>, index: usize) -> Self {
        debug_assert!(segment.start() <= index && index <= segment.end());
        Self { segment, index }
    }

    /// 所在段。
    pub fn segment(&self) -> &Arc<Segment> {
        &self.segment
    }

    /// 段内下标（相对后备内存）。
    pub fn index(&self) -> usize {
        self.index
    }

    /// 相对链首的绝对位置。
    pub fn position(&self) -> usize {
        self.segment.running_index() + (self.index - self.segment.start())
    }

    /// 是否位于链尾。
    pub fn is_terminal(&self) -> bool {
        self.index == self.segment.end() && self.segment.next().is_none()
    }

    /// 向前移动 `count` 字节，返回新的游标。
    ///
    /// # 教案式说明
    /// - **意图 (Why)**：这是分段缓冲唯一的核心算法，视图的移动与切片全部委派于此。
    /// - **逻辑 (How)**：
    ///   1. `count` 为负时立即返回 [`BufferError::Range`]，不做任何遍历；
    ///   2. 在当前段内至多消耗 `end - index` 字节，不足则跳到后继段起点继续；
    ///   3. 链在 `count` 耗尽前结束：`trust_bound` 为真时停在链尾，否则返回越界；
    ///   4. `trust_bound` 为假时，结果的绝对位置不得超过 `bound`，且 `bound` 必须属于同一条链；
    ///      该校验只比较链标识与累计偏移，不做结构遍历。
    /// - **契约 (What)**：
    ///   - `trust_bound == true` 表示调用方已证明目标落在 `bound` 之内，跳过对 `bound` 的校验；
    ///   - 遍历成本与跨越的段数成正比，与字节数无关。
    pub fn seek(&self, count: isize, bound: &Cursor, trust_bound: bool) -> Result<Cursor> {
        let count = non_negative("count", count)?;
        let candidate = self.walk(count, trust_bound)?;
        if !trust_bound {
            candidate.check_within(bound, "seek")?;
        }
        Ok(candidate)
    }

    /// 无符号版本的前移，供视图内部在已完成参数校验后使用。
    pub(crate) fn walk(&self, count: usize, trust_bound: bool) -> Result<Cursor> {
        let mut segment = &self.segment;
        let mut index = self.index;
        let mut remaining = count;
        loop {
            let available = segment.end() - index;
            if remaining <= available {
                return Ok(Self::from_parts(Arc::clone(segment), index + remaining));
            }
            remaining -= available;
            match segment.next() {
                Some(next) => {
                    segment = next;
                    index = next.start();
                }
                None if trust_bound => {
                    return Ok(Self::from_parts(Arc::clone(segment), segment.end()));
                }
                None => {
                    let limit = segment.running_index() + segment.len();
                    return Err(BufferError::out_of_range(
                        "seek",
                        self.position().saturating_add(count),
                        limit,
                    ));
                }
            }
        }
    }

    /// 校验 `self` 不越过 `bound`：两者同属一条链，且绝对位置不超过它。
    ///
    /// 只比较链标识与累计偏移，成本为常数，与链长无关。
    pub(crate) fn check_within(&self, bound: &Cursor, operation: &'static str) -> Result<()> {
        let position = self.position();
        let limit = bound.position();
        if !self.same_chain(bound) || position > limit {
            return Err(BufferError::out_of_range(operation, position, limit));
        }
        Ok(())
    }

    /// 两个游标是否位于同一条链。
    pub(crate) fn same_chain(&self, other: &Cursor) -> bool {
        self.segment.chain() == other.segment.chain()
    }
}

impl PartialEq for Cursor {
    fn eq(&self, other: &Self) -> bool {
        self.position() == other.position()
    }
}

impl Eq for Cursor {}

impl PartialOrd for Cursor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Cursor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.position().cmp(&other.position())
    }
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("index", &self.index)
            .field("position", &self.position())
            .finish()
    }
}
