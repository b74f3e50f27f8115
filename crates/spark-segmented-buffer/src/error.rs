//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 分段缓冲只有两类可恢复失败：参数本身非法（无需触碰数据即可判定）与位置越界（需要比较或遍历才能判定），
//!   集中定义便于上层协议解析代码按类别分流。
//! - 段内部不变量被破坏（例如 `start > end`）属于生产者缺陷，直接 panic，不进入本模块。
//!
//! ## 设计要求（What）
//! - 错误类型派生 `thiserror::Error`，与 `std::error::Error` 生态兼容；
//! - 每个变体都对应一个稳定错误码，遵循 `<域>.<语义>` 命名约定。

use alloc::borrow::Cow;

use thiserror::Error;

/// 稳定错误码集合。
///
/// # 契约说明（What）
/// - 码值一经发布不得修改，日志检索与告警规则依赖其字面量。
pub mod codes {
    /// 参数在触碰缓冲内容之前即可判定为非法（负数计数、超出容量的偏移等）。
    pub const BUFFER_RANGE: &str = "buffer.range";
    /// 目标位置超出链尾、视图逻辑末端或游标顺序颠倒。
    pub const BUFFER_OUT_OF_RANGE: &str = "buffer.out_of_range";
}

/// 分段缓冲错误域。
///
/// # 教案式说明
/// - **意图 (Why)**：区分“调用方给出的参数不可能合法”与“参数在当前链形态下越界”两种语义，
///   让帧解析等上层代码能够把前者视为编程错误、把后者视为数据不足或协议违规。
/// - **契约 (What)**：
///   - 所有变体均为 `Send + Sync + 'static`，可跨线程传播；
///   - 不会静默截断或钳制：凡越界一律返回错误；
///   - [`BufferError::code`] 返回 [`codes`] 中的稳定码值。
/// - **设计权衡 (Trade-offs)**：`Range` 使用 `Cow<'static, str>` 承载原因，常见路径为静态字符串，
///   仅在需要拼接数值时才分配。
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum BufferError {
    /// 参数非法，在任何遍历之前即被拒绝。
    #[error("argument `{argument}` is out of range: {reason}")]
    Range {
        argument: &'static str,
        reason: Cow<'static, str>,
    },

    /// 目标绝对位置 `position` 超出允许的上限 `limit`，或与其顺序不符。
    #[error("`{operation}` is out of range: position {position}, limit {limit}")]
    OutOfRange {
        operation: &'static str,
        position: usize,
        limit: usize,
    },
}

impl BufferError {
    pub(crate) fn range(argument: &'static str, reason: impl Into<Cow<'static, str>>) -> Self {
        BufferError::Range {
            argument,
            reason: reason.into(),
        }
    }

    pub(crate) fn out_of_range(operation: &'static str, position: usize, limit: usize) -> Self {
        BufferError::OutOfRange {
            operation,
            position,
            limit,
        }
    }

    /// 获取稳定错误码，供日志聚合或告警规则使用。
    pub fn code(&self) -> &'static str {
        match self {
            BufferError::Range { .. } => codes::BUFFER_RANGE,
            BufferError::OutOfRange { .. } => codes::BUFFER_OUT_OF_RANGE,
        }
    }

    /// 是否为参数类错误。
    pub fn is_range(&self) -> bool {
        matches!(self, BufferError::Range { .. })
    }

    /// 是否为越界类错误。
    pub fn is_out_of_range(&self) -> bool {
        matches!(self, BufferError::OutOfRange { .. })
    }
}

/// crate 内统一的结果别名。
pub type Result<T, E = BufferError> = core::result::Result<T, E>;

/// 将有符号计数转换为字节数；负数直接判定为 [`BufferError::Range`]。
pub(crate) fn non_negative(argument: &'static str, value: isize) -> Result<usize> {
    usize::try_from(value).map_err(|_| BufferError::range(argument, "must not be negative"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_count_maps_to_range_code() {
        let err = non_negative("count", -1).expect_err("负数应被拒绝");
        assert!(err.is_range());
        assert_eq!(err.code(), codes::BUFFER_RANGE);
    }

    #[test]
    fn out_of_range_display_carries_positions() {
        let err = BufferError::out_of_range("seek", 12, 10);
        assert_eq!(err.code(), codes::BUFFER_OUT_OF_RANGE);
        assert_eq!(
            err.to_string(),
            "`seek` is out of range: position 12, limit 10"
        );
    }
}
