//! 测试专用的物理布局工厂。
//!
//! # 设计动机（Why）
//! - 分段缓冲承诺“逻辑行为与物理布局无关”，因此每条契约都需要在多种布局下重复验证；
//! - 工厂只存在于测试目录，不属于生产 API。
//!
//! # 布局说明（How）
//! - `Array`：普通数组，数据位于偏移 10 处，前后各留 10 字节填充；
//! - `OwnedMemory`：同上，但通过 `OwnedMemory` 句柄与 `BufView::from_memory` 构造；
//! - `Pooled`：从 `SlabMemoryPool` 租借区域后写入，同样留出填充；
//! - `SingleSegment`：由 `ChainBuilder` 发布的单段链；
//! - `SegmentPerByte`：每个字节一段，并在每两段之间插入空段。

#![allow(dead_code)]

use spark_segmented_buffer::{BufView, ChainBuilder, OwnedMemory, SlabMemoryPool};

const PADDING: usize = 10;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Layout {
    Array,
    OwnedMemory,
    Pooled,
    SingleSegment,
    SegmentPerByte,
}

impl Layout {
    pub const ALL: [Layout; 5] = [
        Layout::Array,
        Layout::OwnedMemory,
        Layout::Pooled,
        Layout::SingleSegment,
        Layout::SegmentPerByte,
    ];

    /// 构造长度为 `size` 的全零视图。
    pub fn of_size(self, size: usize) -> BufView {
        self.with_content(&vec![0u8; size])
    }

    /// 以 `data` 为内容构造视图。
    pub fn with_content(self, data: &[u8]) -> BufView {
        match self {
            Layout::Array => {
                let padded = padded(data);
                BufView::from_bytes(bytes::Bytes::from(padded).slice(PADDING..PADDING + data.len()))
            }
            Layout::OwnedMemory => {
                let memory = OwnedMemory::from_bytes(padded(data));
                BufView::from_memory(memory, PADDING, data.len()).expect("填充区间必然合法")
            }
            Layout::Pooled => {
                let pool = SlabMemoryPool::new();
                let mut region = pool.rent(data.len() + 2 * PADDING);
                region.as_mut_slice()[PADDING..PADDING + data.len()].copy_from_slice(data);
                BufView::from_memory(region.freeze(), PADDING, data.len())
                    .expect("填充区间必然合法")
            }
            Layout::SingleSegment => ChainBuilder::new().push_bytes(data.to_vec()).build(),
            Layout::SegmentPerByte => {
                let mut builder = ChainBuilder::new();
                builder.push_bytes(Vec::new());
                for byte in data {
                    builder.push_bytes(vec![*byte]);
                    builder.push_bytes(Vec::new());
                }
                builder.build()
            }
        }
    }
}

fn padded(data: &[u8]) -> Vec<u8> {
    let mut padded = vec![0xEEu8; data.len() + 2 * PADDING];
    padded[PADDING..PADDING + data.len()].copy_from_slice(data);
    padded
}

/// 以 `0, 1, 2, ...` 填充的测试数据。
pub fn sequence(len: usize) -> Vec<u8> {
    (0..len).map(|i| i as u8).collect()
}
