use alloc::{format, sync::Arc};
use core::{fmt, mem};

use bytes::{Bytes, BytesMut};
use tracing::trace;

use crate::error::{BufferError, Result, non_negative};

/// `BufferRecycler` 描述内存池在区域退役时的回收入口。
///
/// # 设计初衷（Why）
/// - 分段缓冲只依赖池的“租借/归还”契约，不关心其淘汰与扩容策略；
///   通过该接口在 [`OwnedMemory`] 的最后一个持有者释放时统一通知池，
///   避免在流控层散落自定义回收逻辑。
///
/// # 使用方式（How）
/// - 池实现将自身或内部回收句柄封装为 `Arc<dyn BufferRecycler>`，
///   在构造池化内存块（[`OwnedMemory::pooled`]）时一并注入。
/// - 当引用同一区域的所有持有者全部释放后，`reclaim` 会被调用恰好一次。
///
/// # 契约定义（What）
/// - **前置条件**：实现必须线程安全，且调用过程中不得 panic，
///   否则 `Drop` 路径上的 panic 将导致进程异常终止。
/// - **后置条件**：成功执行后，池应当已记录该容量的可用性。
pub trait BufferRecycler: Send + Sync + 'static {
    /// 通知池回收一块区域。
    fn reclaim(&self, reclaimed: ReclaimedBuffer);
}

/// 一次回收动作所携带的上下文。
///
/// # 数据结构解析（How）
/// - `capacity`：区域底层分配的真实容量（`BytesMut::capacity`，可能大于请求长度），
///   池以它扣减统计，保证与分配时登记的字节数一致；
/// - `buffer`：若成功夺回底层 `BytesMut` 所有权则为 `Some`；
///   若仍有 `Bytes` 别名（例如调用方保留了 [`OwnedMemory::slice`] 的结果）则为 `None`，
///   池只能更新统计并在下次租借时重新分配。
#[derive(Debug)]
pub struct ReclaimedBuffer {
    capacity: usize,
    buffer: Option<BytesMut>,
}

impl ReclaimedBuffer {
    /// 创建携带完整上下文的回收结果。
    pub fn new(capacity: usize, buffer: Option<BytesMut>) -> Self {
        Self { capacity, buffer }
    }

    /// 返回本次回收的容量。
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 消耗结构并返回可复用的 `BytesMut`，若不存在则为 `None`。
    pub fn into_buffer(self) -> Option<BytesMut> {
        self.buffer
    }
}

/// 区域的实际承载者，只存在于 `Arc` 之内。
///
/// - `bytes`：区域内容，发布后只读；
/// - `allocation`：池化区域底层分配的容量，回收时原样回报给池；
/// - `recycler`：池化区域的回收句柄，普通区域为 `None`；
/// - `Drop`：最后一个持有者离开时触发，池化区域在此归还。
struct MemoryBlock {
    bytes: Bytes,
    allocation: usize,
    recycler: Option<Arc<dyn BufferRecycler>>,
}

impl Drop for MemoryBlock {
    fn drop(&mut self) {
        let Some(recycler) = self.recycler.take() else {
            return;
        };
        let capacity = self.allocation;
        let bytes = mem::take(&mut self.bytes);
        // `try_into_mut` 仅在没有其它 `Bytes` 别名时成功；失败时只回报容量。
        let buffer = bytes.try_into_mut().ok().map(|mut writable| {
            writable.clear();
            writable
        });
        trace!(
            capacity,
            recovered = buffer.is_some(),
            "pooled memory block retired"
        );
        recycler.reclaim(ReclaimedBuffer::new(capacity, buffer));
    }
}

/// `OwnedMemory` 是对一段连续原始字节区域的所有权句柄（Owned Memory Block）。
///
/// # 设计动机（Why）
/// - 段链中的每个节点都需要共享其背后的内存，直到最后一个游标不再可达；
///   以 `Arc` 作为持有者计数，天然满足“所有段退役后才可回收”的约束。
/// - 普通数组与池化区域是封闭的两种后端：前者释放无可观测副作用，
///   后者在持有者计数归零时经由 [`BufferRecycler`] 归还池。
///
/// # 架构关系（How）
/// - `Clone` 等价于 acquire 一个新的持有者；`Drop` 等价于作用域结束时的 release；
/// - [`OwnedMemory::release`] 以消耗 `self` 的方式显式释放，同一句柄不可能被释放两次；
/// - [`OwnedMemory::slice`] 借助 `Bytes::slice` 返回零拷贝的有界视图。
///
/// # 契约说明（What）
/// - 区域容量在构造时固定，此后内容只读；
/// - 任意时刻至多一个 `MemoryBlock` 持有区域的处置权，重复回收在类型层面不可表达。
#[derive(Clone)]
pub struct OwnedMemory {
    inner: Arc<MemoryBlock>,
}

impl OwnedMemory {
    /// 包装已有的字节区域，不复制数据。
    ///
    /// `Vec<u8>`、`Bytes`、`&'static [u8]` 等均可直接传入。
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self {
            inner: Arc::new(MemoryBlock {
                bytes: bytes.into(),
                allocation: 0,
                recycler: None,
            }),
        }
    }

    /// 分配一块容量为 `capacity`、内容全零的普通区域。
    pub fn zeroed(capacity: usize) -> Self {
        Self::from_bytes(alloc::vec![0u8; capacity])
    }

    /// 空区域，作为未装填段的占位。
    pub fn empty() -> Self {
        Self::from_bytes(Bytes::new())
    }

    /// 包装一块池化区域。
    ///
    /// # 前置条件
    /// - `buffer` 为独占所有权（新租借或已从池中取出），其长度即区域容量；
    /// - `recycler` 的生命周期至少与区域等长（由 `Arc` 保证）。
    ///
    /// # 后置条件
    /// - 最后一个持有者释放时，`recycler.reclaim` 收到恰好一次通知。
    pub fn pooled(buffer: BytesMut, recycler: Arc<dyn BufferRecycler>) -> Self {
        Self {
            inner: Arc::new(MemoryBlock {
                allocation: buffer.capacity(),
                bytes: buffer.freeze(),
                recycler: Some(recycler),
            }),
        }
    }

    /// 区域容量（字节）。
    pub fn capacity(&self) -> usize {
        self.inner.bytes.len()
    }

    /// 以切片形式暴露整块区域。
    pub fn as_slice(&self) -> &[u8] {
        &self.inner.bytes
    }

    pub(crate) fn as_bytes(&self) -> &Bytes {
        &self.inner.bytes
    }

    /// 是否由池提供。
    pub fn is_pooled(&self) -> bool {
        self.inner.recycler.is_some()
    }

    /// 当前持有者数量（含 `self`）。
    pub fn holders(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// 获取 `[offset, offset + count)` 的有界视图，零拷贝。
    ///
    /// # 契约说明（What）
    /// - 任一参数为负，或 `offset + count` 超出容量时返回 [`BufferError::Range`]；
    /// - 返回的 `Bytes` 与区域共享存储；在其存活期间池化区域无法夺回原始 `BytesMut`。
    pub fn slice(&self, offset: isize, count: isize) -> Result<Bytes> {
        let offset = non_negative("offset", offset)?;
        let count = non_negative("count", count)?;
        let capacity = self.capacity();
        match offset.checked_add(count) {
            Some(end) if end <= capacity => Ok(self.inner.bytes.slice(offset..end)),
            _ => Err(BufferError::range(
                "count",
                format!("offset {offset} + count {count} exceeds capacity {capacity}"),
            )),
        }
    }

    /// 显式释放本持有者。
    ///
    /// 返回 `true` 表示本次释放是最后一个持有者，区域已退役（池化区域已归还池）。
    pub fn release(self) -> bool {
        match Arc::try_unwrap(self.inner) {
            Ok(block) => {
                drop(block);
                true
            }
            Err(_) => false,
        }
    }
}

impl fmt::Debug for OwnedMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnedMemory")
            .field("capacity", &self.capacity())
            .field("pooled", &self.is_pooled())
            .field("holders", &self.holders())
            .finish()
    }
}
