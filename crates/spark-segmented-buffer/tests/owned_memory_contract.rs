//! `owned_memory_contract` 集成测试：聚焦 `OwnedMemory` 的持有者计数与回收契约。
//!
//! # 测试总览（Why）
//! - 校验 acquire（克隆）/release 与池化区域的回收通知严格一一对应；
//! - 覆盖越界切片的错误路径，确保返回的 `BufferError` 与约束一致；
//! - 以 `RecordingRecycler` 观察回收事件，验证内存块与池之间的协作协议。

use std::sync::{Arc, Mutex};

use bytes::BytesMut;
use spark_segmented_buffer::{
    BufView, BufferRecycler, ChainBuilder, OwnedMemory, ReclaimedBuffer, codes,
};

/// `RecordingRecycler`：测试场景下用于捕获回收事件的探针实现。
///
/// # 行为描述（How）
/// - 利用 `Mutex<Vec<(usize, bool)>>` 保存每一次 `reclaim` 的容量与是否成功夺回底层 `BytesMut`；
/// - `take_events` 在断言前清空事件队列，确保各个测试相互独立。
#[derive(Default)]
struct RecordingRecycler {
    events: Mutex<Vec<(usize, bool)>>,
}

impl RecordingRecycler {
    fn take_events(&self) -> Vec<(usize, bool)> {
        self.events
            .lock()
            .expect("mutex poisoned")
            .drain(..)
            .collect()
    }
}

impl BufferRecycler for RecordingRecycler {
    fn reclaim(&self, reclaimed: ReclaimedBuffer) {
        let capacity = reclaimed.capacity();
        let had_buffer = reclaimed.into_buffer().is_some();
        self.events
            .lock()
            .expect("mutex poisoned")
            .push((capacity, had_buffer));
    }
}

fn pooled(recycler: &Arc<RecordingRecycler>, content: &[u8]) -> OwnedMemory {
    let mut buffer = BytesMut::with_capacity(content.len());
    buffer.extend_from_slice(content);
    OwnedMemory::pooled(buffer, recycler.clone())
}

/// 最后一个持有者释放时恰好通知一次回收，且能夺回底层缓冲。
#[test]
fn last_release_recycles_exactly_once() {
    let recycler = Arc::new(RecordingRecycler::default());
    let memory = pooled(&recycler, b"abcdef");
    let second = memory.clone();
    let third = memory.clone();
    assert_eq!(memory.holders(), 3);
    assert!(memory.is_pooled());

    assert!(!memory.release());
    assert!(!second.release());
    assert!(recycler.take_events().is_empty(), "仍有持有者时不得回收");

    assert!(third.release());
    assert_eq!(recycler.take_events(), vec![(6, true)]);
}

/// 作用域结束的隐式释放与显式 `release` 等价。
#[test]
fn scope_exit_is_equivalent_to_release() {
    let recycler = Arc::new(RecordingRecycler::default());
    {
        let memory = pooled(&recycler, b"xyz");
        let _alias = memory.clone();
    }
    assert_eq!(recycler.take_events(), vec![(3, true)]);
}

/// 普通内存释放没有任何可观测副作用。
#[test]
fn plain_memory_release_has_no_side_effects() {
    let memory = OwnedMemory::from_bytes(vec![7u8; 16]);
    assert!(!memory.is_pooled());
    assert_eq!(memory.capacity(), 16);
    assert!(memory.release());
}

/// 有界视图在区间合法时零拷贝返回，越界或负数参数返回 Range 错误。
#[test]
fn slice_is_bounded_by_capacity() {
    let memory = OwnedMemory::from_bytes(&b"0123456789"[..]);
    assert_eq!(&memory.slice(2, 3).expect("合法区间")[..], b"234");
    assert_eq!(memory.slice(10, 0).expect("末端空区间").len(), 0);

    for (offset, count) in [(0isize, 11isize), (11, 0), (-1, 1), (1, -1), (isize::MAX, 1)] {
        let err = memory.slice(offset, count).expect_err("越界区间");
        assert_eq!(err.code(), codes::BUFFER_RANGE, "({offset}, {count})");
    }
}

/// 外部仍持有 `slice` 结果时，回收器只能得到容量而无法夺回缓冲。
#[test]
fn outstanding_slice_prevents_buffer_recovery() {
    let recycler = Arc::new(RecordingRecycler::default());
    let memory = pooled(&recycler, b"retained");
    let alias = memory.slice(0, 4).expect("合法区间");
    assert!(memory.release());
    assert_eq!(recycler.take_events(), vec![(8, false)]);
    assert_eq!(&alias[..], b"reta");
}

/// 段链是内存的持有者：视图存活期间不回收，整条链退役后才回收。
#[test]
fn segment_chain_holds_memory_until_views_retire() {
    let recycler = Arc::new(RecordingRecycler::default());
    let first = pooled(&recycler, b"head");
    let second = pooled(&recycler, b"tail");

    let view = ChainBuilder::new()
        .push_memory(first, 0, 4)
        .push_memory(second, 0, 4)
        .build();
    let narrow = view.slice(2, 4).expect("跨段切片");
    drop(view);
    assert!(recycler.take_events().is_empty(), "子视图仍引用整条链");

    assert_eq!(narrow.to_vec(), b"adta");
    drop(narrow);
    let mut events = recycler.take_events();
    events.sort_unstable();
    assert_eq!(events, vec![(4, true), (4, true)]);
}

/// 由单个内存块构造视图时，超出容量的区间返回 Range 错误。
#[test]
fn from_memory_rejects_range_beyond_capacity() {
    let memory = OwnedMemory::zeroed(8);
    let err = BufView::from_memory(memory.clone(), 4, 5).expect_err("超出容量");
    assert!(err.is_range());
    let view = BufView::from_memory(memory, 4, 4).expect("恰好到末尾");
    assert_eq!(view.len(), 4);
}
