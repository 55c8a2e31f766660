//! # Coordinator：单队列的阻塞读写协议
//!
//! ## 核心意图（Why）
//! - 以“锁 + 两个条件变量（readable / writable）”的监视器模型协调生产者与消费者，
//!   既不忙等，也不产生数据竞争；
//! - 空队列上的读者挂起直到数据到达或写入侧断开；满队列上的写者挂起直到腾出空间。
//!
//! ## 状态机约束（What）
//! - `Empty → HasData`：前一长度为 0 时追加成功；
//! - `HasData → Full`：追加使长度达到容量；
//! - `Full/HasData → Empty`：移除使长度归零；
//! - 任意状态 `→ Closing`：写入侧断开，空队列上的读者得到流结束（0 字节，不是错误）。
//!
//! ## 等待纪律（How）
//! - “检查 → 挂起 → 复查”必须是循环：被唤醒后重新持锁并复查条件，
//!   同时防御丢失唤醒与虚假唤醒；
//! - 挂起前由条件变量释放队列锁，返回前重新获取，读写双方不会相互死锁；
//! - 每次等待最多持续一个等待切片，随后复查取消令牌，
//!   因此即便取消方没有发出通知，阻塞调用也能及时返回。
//!
//! ## 锁序（Trade-offs）
//! - 协调器只持有自己队列的锁，永远不会同时持有两个队列的锁。

use std::time::Duration;

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::debug;

use crate::{
    config::Backpressure,
    core::{
        cancel::Cancellation,
        directory::Identity,
        queue::{ByteQueue, QueueState},
    },
    error::{FifoError, Result},
};

/// 队列锁保护的全部可变状态。
#[derive(Debug)]
struct Slot {
    queue: ByteQueue,
    /// 写入侧已断开；新的打开会清除该标记。
    closing: bool,
    /// 队列已从目录中释放，数据已丢弃，不再接受任何写入。
    retired: bool,
}

/// 单个队列的访问协调器。
#[derive(Debug)]
pub struct Coordinator {
    identity: Identity,
    wait_slice: Duration,
    slot: Mutex<Slot>,
    readable: Condvar,
    writable: Condvar,
}

impl Coordinator {
    /// 为 `identity` 构造空队列的协调器。
    ///
    /// `wait_slice` 为单次条件等待的最长时间，用于周期性复查取消令牌，必须大于零。
    pub fn new(identity: Identity, wait_slice: Duration) -> Self {
        Self {
            identity,
            wait_slice,
            slot: Mutex::new(Slot {
                queue: ByteQueue::new(),
                closing: false,
                retired: false,
            }),
            readable: Condvar::new(),
            writable: Condvar::new(),
        }
    }

    pub fn identity(&self) -> Identity {
        self.identity
    }

    /// 当前队列长度。
    pub fn len(&self) -> usize {
        self.slot.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 队列的（可读, 可写）闸门。
    pub fn gates(&self) -> (bool, bool) {
        let slot = self.slot.lock();
        (slot.queue.is_readable(), slot.queue.is_writable())
    }

    /// 当前协调状态。
    pub fn state(&self) -> QueueState {
        let slot = self.slot.lock();
        slot.queue.state(slot.closing || slot.retired)
    }

    /// 读取至多 `out.len()` 个字节。
    ///
    /// # 教案式注释
    /// - **执行 (How)**：
    ///   1. 持锁检查；队列非空时立即搬运 `min(out.len(), len)` 个字节，逐个移出并唤醒写者；
    ///   2. 队列为空且处于 `Closing`（或已释放）时返回 `Ok(0)` 表示流结束；
    ///   3. 令牌已取消时返回 [`FifoError::Interrupted`]；
    ///   4. 否则在 `readable` 上挂起一个等待切片，醒来后回到第 1 步复查。
    /// - **契约 (What)**：返回实际搬运的字节数，允许短读；`out` 为空时立即返回 `Ok(0)`。
    pub fn read(&self, out: &mut [u8], cancel: &Cancellation) -> Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }
        let mut slot = self.slot.lock();
        loop {
            if !slot.queue.is_empty() {
                let count = slot.queue.drain_into(out);
                let remaining = slot.queue.len();
                drop(slot);
                self.writable.notify_all();
                debug!(identity = %self.identity, count, remaining, "bytes delivered to reader");
                return Ok(count);
            }
            if slot.closing || slot.retired {
                debug!(identity = %self.identity, "reader observed end of stream");
                return Ok(0);
            }
            if cancel.is_cancelled() {
                debug!(identity = %self.identity, "blocked read interrupted");
                return Err(FifoError::Interrupted);
            }
            debug!(identity = %self.identity, "queue is empty, reader suspends");
            self.wait(&self.readable, &mut slot);
        }
    }

    /// 写入 `data` 中能够放下的最长前缀。
    ///
    /// # 教案式注释
    /// - **执行 (How)**：
    ///   1. 持锁检查；队列已释放时返回 [`FifoError::NoSuchQueue`]；
    ///   2. 队列已满时按 `backpressure` 决定：`Block` 挂起在 `writable` 上并复查，
    ///      `Reject` 立即返回 `Ok(0)`；挂起前若令牌已取消则返回 [`FifoError::Interrupted`]；
    ///   3. 有空间时追加最长前缀，至少追加一个字节后唤醒读者。
    /// - **契约 (What)**：超出剩余容量的部分被拒绝而非排队（短写）；`data` 为空时立即返回 `Ok(0)`；
    ///   内存不足时返回 [`FifoError::OutOfMemory`] 且队列不变。
    pub fn write(
        &self,
        data: &[u8],
        cancel: &Cancellation,
        backpressure: Backpressure,
    ) -> Result<usize> {
        if data.is_empty() {
            return Ok(0);
        }
        let mut slot = self.slot.lock();
        loop {
            if slot.retired {
                return Err(FifoError::NoSuchQueue {
                    identity: self.identity,
                });
            }
            if !slot.queue.is_full() {
                let accepted = slot.queue.push_prefix(data)?;
                let length = slot.queue.len();
                drop(slot);
                self.readable.notify_all();
                debug!(
                    identity = %self.identity,
                    accepted,
                    rejected = data.len() - accepted,
                    length,
                    "bytes accepted from writer"
                );
                return Ok(accepted);
            }
            if backpressure == Backpressure::Reject {
                debug!(identity = %self.identity, "queue is full, write rejected");
                return Ok(0);
            }
            if cancel.is_cancelled() {
                debug!(identity = %self.identity, "blocked write interrupted");
                return Err(FifoError::Interrupted);
            }
            debug!(identity = %self.identity, "queue is full, writer suspends");
            self.wait(&self.writable, &mut slot);
        }
    }

    /// 写入侧断开：进入 `Closing` 并唤醒所有读者。
    pub fn mark_closing(&self) {
        self.slot.lock().closing = true;
        self.readable.notify_all();
    }

    /// 新句柄打开时清除 `Closing`，恢复正常阻塞语义。
    pub fn reopen(&self) {
        self.slot.lock().closing = false;
    }

    /// 队列被释放：丢弃剩余数据并唤醒双方；返回丢弃的字节数。
    pub fn retire(&self) -> usize {
        let discarded = {
            let mut slot = self.slot.lock();
            slot.retired = true;
            slot.closing = true;
            slot.queue.clear()
        };
        self.readable.notify_all();
        self.writable.notify_all();
        discarded
    }

    /// 唤醒所有等待者，使其复查各自的取消令牌。
    pub fn interrupt(&self) {
        // 持锁通知，保证处于“已检查令牌、尚未挂起”窗口中的线程不会错过唤醒。
        let _slot = self.slot.lock();
        self.readable.notify_all();
        self.writable.notify_all();
    }

    fn wait(&self, signal: &Condvar, slot: &mut MutexGuard<'_, Slot>) {
        let _ = signal.wait_for(slot, self.wait_slice);
    }
}
