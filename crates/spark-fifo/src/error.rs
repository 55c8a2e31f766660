//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 为多路复用核心对外暴露的失败语义提供集中定义，覆盖容量、空队列、独占访问、
//!   身份未注册、内存耗尽、阻塞中断与配置错误等路径；
//! - 核心从不“记录后吞掉”改变调用方结果的失败，所有错误均通过 `Result` 显式返回。
//!
//! ## 设计要求（What）
//! - 所有错误类型实现 `thiserror::Error`，兼容 `std::error::Error`；
//! - 每个变体提供稳定的点分错误码（[`FifoError::code`]），便于设备门面映射为 errno 或指标标签；
//! - 任一身份队列上的失败不得波及其他队列，因此错误只携带局部上下文。

use thiserror::Error;

use crate::core::directory::Identity;

/// crate 内统一的返回类型别名。
pub type Result<T, E = FifoError> = std::result::Result<T, E>;

/// 多路复用核心错误域。
///
/// # 教案式说明
/// - **意图 (Why)**：区分“节流类”非致命条件（`Full`、`Empty`）与必须上抛给调用方的失败
///   （`Busy`、`NoSuchQueue`、`OutOfMemory` 等），避免上层误判重试策略；
/// - **契约 (What)**：
///   - 所有变体均满足 `Send + Sync + 'static`，可跨线程传播；
///   - `Full`/`Empty` 仅由 [`ByteQueue`](crate::core::queue::ByteQueue) 的单字节操作返回，
///     协调器会把它们转化为阻塞或短读写，而不会直接透传；
///   - `OutOfMemory` 返回时队列结构保持一致，不会出现半插入的数据。
/// - **设计权衡 (Trade-offs)**：上下文以 `String`/`Identity` 保存，牺牲少量分配换取可读诊断。
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum FifoError {
    /// 队列已达到容量上限。
    #[error("queue is full ({capacity} bytes)", capacity = crate::core::queue::CAPACITY)]
    Full,

    /// 队列中没有可读数据。
    #[error("queue is empty")]
    Empty,

    /// 单一访问策略下已有活跃句柄，本次打开被拒绝且不会在内部重试。
    #[error("device is busy: single-access policy already has an active handle")]
    Busy,

    /// 读写路径上找不到调用方身份对应的队列。
    ///
    /// - **契约 (What)**：等价于设备门面的“非法参数”条件，调用方不应阻塞等待该队列出现。
    #[error("no queue registered for identity {identity}")]
    NoSuchQueue { identity: Identity },

    /// 为队列存储申请内存失败。
    ///
    /// - **契约 (What)**：`requested` 为本次申请的字节数；操作整体放弃，队列长度不变。
    #[error("out of memory while reserving {requested} bytes")]
    OutOfMemory { requested: usize },

    /// 阻塞中的读写被外部取消信号打断，未传输任何数据。
    #[error("blocked transfer interrupted before any byte was moved")]
    Interrupted,

    /// 多路复用器已执行关停清扫，拒绝新的打开请求。
    #[error("multiplexer has been shut down")]
    ShutDown,

    /// 启动配置中给出了无法识别的策略名。
    #[error("unsupported policy `{value}`: only default/single/multi are supported")]
    InvalidPolicy { value: String },

    /// 配置文本无法解析或字段取值非法。
    #[error("invalid configuration: {detail}")]
    InvalidConfig { detail: String },
}

impl FifoError {
    /// 稳定错误码，供设备门面映射为 errno、日志字段或指标标签。
    ///
    /// # 教案式说明
    /// - **意图 (Why)**：错误消息面向人类阅读，可能随版本调整；错误码作为机器可读的稳定契约；
    /// - **契约 (What)**：返回 `'static` 字符串，前缀统一为 `fifo.`。
    pub fn code(&self) -> &'static str {
        match self {
            FifoError::Full => "fifo.queue.full",
            FifoError::Empty => "fifo.queue.empty",
            FifoError::Busy => "fifo.open.busy",
            FifoError::NoSuchQueue { .. } => "fifo.queue.missing",
            FifoError::OutOfMemory { .. } => "fifo.alloc.exhausted",
            FifoError::Interrupted => "fifo.transfer.interrupted",
            FifoError::ShutDown => "fifo.lifecycle.shutdown",
            FifoError::InvalidPolicy { .. } => "fifo.config.policy",
            FifoError::InvalidConfig { .. } => "fifo.config.invalid",
        }
    }

    /// 是否属于“仅节流”的非致命条件。
    ///
    /// `Full` 与 `Empty` 只代表调用方需要等待或缩短传输，其余错误都会改变调用结果。
    pub fn is_throttle(&self) -> bool {
        matches!(self, FifoError::Full | FifoError::Empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable_and_prefixed() {
        let samples = [
            FifoError::Full,
            FifoError::Empty,
            FifoError::Busy,
            FifoError::NoSuchQueue {
                identity: Identity::new(7),
            },
            FifoError::OutOfMemory { requested: 3 },
            FifoError::Interrupted,
            FifoError::ShutDown,
            FifoError::InvalidPolicy {
                value: "fast".to_owned(),
            },
            FifoError::InvalidConfig {
                detail: "x".to_owned(),
            },
        ];
        for err in &samples {
            assert!(err.code().starts_with("fifo."), "错误码缺少前缀: {err:?}");
        }
        assert_eq!(FifoError::Busy.code(), "fifo.open.busy");
    }

    #[test]
    fn throttle_errors_are_distinguished() {
        assert!(FifoError::Full.is_throttle());
        assert!(FifoError::Empty.is_throttle());
        assert!(!FifoError::Busy.is_throttle());
        assert!(!FifoError::Interrupted.is_throttle());
    }

    #[test]
    fn display_carries_context() {
        let err = FifoError::NoSuchQueue {
            identity: Identity::new(42),
        };
        assert_eq!(err.to_string(), "no queue registered for identity 42");
        assert_eq!(FifoError::Full.to_string(), "queue is full (1000 bytes)");
    }
}
