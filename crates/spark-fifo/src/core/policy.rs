//! # PolicySelector：身份到队列的映射与打开互斥
//!
//! ## 核心意图（Why）
//! - 策略在启动时选定、进程生命周期内固定，只决定两件事：调用方身份映射到哪个队列键，
//!   以及并发打开是否互斥；
//! - 读写协议本身与策略无关，全部由 [`Coordinator`](super::coordinator::Coordinator) 处理。
//!
//! ## 行为契约（What）
//! - `Default`：所有调用方共享哨兵键上的队列，允许多个并发写者；
//! - `Single`：同样共享单一队列，但打开受 try-lock 闸门约束，第二个并发打开立即得到 `Busy`；
//! - `Multi`：每个身份映射到自己的队列，互不可见。

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::warn;

use crate::{
    config::Policy,
    core::directory::Identity,
    error::{FifoError, Result},
};

/// 策略选择器。
#[derive(Debug)]
pub struct PolicySelector {
    policy: Policy,
    gate: AtomicBool,
}

impl PolicySelector {
    pub fn new(policy: Policy) -> Self {
        Self {
            policy,
            gate: AtomicBool::new(false),
        }
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    /// 调用方身份对应的队列键。
    pub fn queue_key(&self, caller: Identity) -> Identity {
        match self.policy {
            Policy::Default | Policy::Single => Identity::SHARED,
            Policy::Multi => caller,
        }
    }

    /// 打开前的准入检查。
    ///
    /// # 教案式注释
    /// - **执行 (How)**：`Single` 策略下以比较交换实现 try-lock，失败即返回 [`FifoError::Busy`]，
    ///   不会阻塞也不会在内部重试；其余策略直接放行；
    /// - **契约 (What)**：成功进入后，调用方必须在句柄关闭（或打开失败）时调用 [`leave`](Self::leave)。
    pub fn try_enter(&self, caller: Identity) -> Result<()> {
        if self.policy != Policy::Single {
            return Ok(());
        }
        match self
            .gate
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => Ok(()),
            Err(_) => {
                warn!(identity = %caller, "single-access device already opened");
                Err(FifoError::Busy)
            }
        }
    }

    /// 释放 `Single` 策略的打开闸门；其余策略为无操作。
    pub fn leave(&self) {
        if self.policy == Policy::Single {
            self.gate.store(false, Ordering::Release);
        }
    }

    /// 闸门当前是否被占用。
    pub fn is_engaged(&self) -> bool {
        self.gate.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_policies_map_to_sentinel() {
        for policy in [Policy::Default, Policy::Single] {
            let selector = PolicySelector::new(policy);
            assert_eq!(selector.queue_key(Identity::new(77)), Identity::SHARED);
        }
        let multi = PolicySelector::new(Policy::Multi);
        assert_eq!(multi.queue_key(Identity::new(77)), Identity::new(77));
    }

    #[test]
    fn single_gate_rejects_second_entry() {
        let selector = PolicySelector::new(Policy::Single);
        assert_eq!(selector.try_enter(Identity::new(1)), Ok(()));
        assert_eq!(selector.try_enter(Identity::new(2)), Err(FifoError::Busy));
        selector.leave();
        assert_eq!(selector.try_enter(Identity::new(2)), Ok(()));
    }

    #[test]
    fn other_policies_never_engage_gate() {
        let selector = PolicySelector::new(Policy::Default);
        assert!(selector.try_enter(Identity::new(1)).is_ok());
        assert!(selector.try_enter(Identity::new(2)).is_ok());
        assert!(!selector.is_engaged());
    }
}
