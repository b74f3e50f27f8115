//! `spark-segmented-buffer` 提供多段内存链上的零拷贝只读缓冲视图。
//!
//! # 模块定位（Why）
//! - 作为高吞吐 I/O 流水线最底层的缓冲原语：生产者把到达的数据以离散内存块的形式挂链，
//!   消费者把整条链当作一段连续序列读取、切片与扫描，直到显式物化前不发生任何复制。
//! - 无论物理布局是单个大块、每字节一块，还是池化与普通内存混用，逻辑行为逐字节一致。
//!
//! # 设计概要（How）
//! - [`memory`]：`OwnedMemory` 所有权句柄与 `BufferRecycler` 回收契约；
//! - [`pool`]：基于自由链表的 `SlabMemoryPool`，作为池化内存提供者；
//! - [`segment`]：段节点与生产者侧的 `ChainBuilder`；
//! - [`cursor`]：不可变位置值与唯一的核心算法 `seek`；
//! - [`buf_view`]：`[begin, end)` 逻辑窗口上的长度、移动、切片与物化。
//!
//! # 并发模型（What）
//! - 核心内没有锁、阻塞或挂起，所有操作同步完成，成本受所跨越的段数约束；
//! - 段与内存一经发布即只读，可跨线程共享；多个视图无需协调即可并存。
//! - 段的退役时机由上层流控负责，本 crate 只提供持有者计数意义上的 acquire/release 原语。

extern crate alloc;

pub mod buf_view;
pub mod cursor;
pub mod error;
pub mod memory;
pub mod pool;
pub mod segment;

pub use buf_view::{BufView, Chunks};
pub use cursor::Cursor;
pub use error::{BufferError, Result, codes};
pub use memory::{BufferRecycler, OwnedMemory, ReclaimedBuffer};
pub use pool::{PoolConfig, PoolStats, PooledRegion, SlabMemoryPool};
pub use segment::{ChainBuilder, Segment};
