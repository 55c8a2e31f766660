//! 阻塞读写的取消令牌。

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

/// 取消原语，表达“阻塞中的读写必须可被外部打断”的契约。
///
/// # 设计背景（Why）
/// - 挂起在空队列或满队列上的调用方必须能被外部信号（例如进程终止）唤醒，不能变成无法结束的等待；
///
/// # 逻辑解析（How）
/// - 内部以 [`AtomicBool`] 表达取消状态，并通过 [`Arc`] 在句柄与其他线程间共享；
/// - `cancel` 首次成功置位时返回 `true`，重复调用返回 `false`；
/// - 协调器在每次等待切片结束或被唤醒后都会重新检查该标记。
///
/// # 契约说明（What）
/// - 令牌一旦取消便不可恢复；被取消的句柄上任何需要挂起的调用都会立即返回
///   [`FifoError::Interrupted`](crate::FifoError::Interrupted)，不需要挂起的调用照常完成。
#[derive(Clone, Debug, Default)]
pub struct Cancellation {
    flag: Arc<AtomicBool>,
}

impl Cancellation {
    /// 创建处于“未取消”状态的令牌。
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// 标记取消；返回 `true` 表示本次调用首次触发取消。
    pub fn cancel(&self) -> bool {
        self.flag
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// 派生共享同一标记的子令牌。
    pub fn child(&self) -> Self {
        self.clone()
    }
}
