//! # ByteQueue：有界字节 FIFO
//!
//! ## 核心意图（Why）
//! - 以拥有所有权的双端队列承载单个身份的字节流，尾部追加、头部移除；
//! - 容量检查退化为一次长度比较，不再需要手工维护前后链接。
//!
//! ## 行为契约（What）
//! - `len() <= CAPACITY` 恒成立；`len() == 0` 当且仅当队列没有任何元素；
//! - 读取是破坏性的：字节一旦交付给读者立即移出队列，不支持窥视或重读；
//! - 存储在第一次接收字节时才真正分配，释放队列时整体归还。
//!
//! ## 并发前提（Trade-offs）
//! - 本类型自身不加锁，所有变更都必须在 [`Coordinator`](super::coordinator::Coordinator)
//!   的队列锁内完成，因此追加/移除相对协调器锁是原子的。

use std::collections::VecDeque;

use crate::error::{FifoError, Result};

/// 每个队列的固定容量（字节）。
pub const CAPACITY: usize = 1000;

/// 由队列内容与关闭标记推导出的协调状态。
///
/// # 教案式说明
/// - **意图 (Why)**：把读写协议依赖的条件收敛为一个枚举，便于日志与诊断快照输出；
/// - **契约 (What)**：`Closing` 优先于其他状态，表示写入侧已断开或队列已被释放。
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum QueueState {
    /// 没有可读数据。
    Empty,
    /// 有数据且仍有剩余空间。
    HasData,
    /// 长度达到 [`CAPACITY`]，写入方需等待或被拒绝。
    Full,
    /// 写入侧断开，空队列上的读者会得到流结束。
    Closing,
}

/// 有界字节队列。
#[derive(Debug)]
pub struct ByteQueue {
    bytes: VecDeque<u8>,
    readable: bool,
    writable: bool,
}

impl ByteQueue {
    /// 创建空队列；不会预先分配存储。
    pub fn new() -> Self {
        Self {
            bytes: VecDeque::new(),
            readable: false,
            writable: true,
        }
    }

    /// 当前字节数。
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.bytes.len() >= CAPACITY
    }

    /// 剩余可追加的字节数。
    pub fn remaining(&self) -> usize {
        CAPACITY - self.bytes.len()
    }

    /// “可读”闸门：最近一次变更后队列非空。
    pub fn is_readable(&self) -> bool {
        self.readable
    }

    /// “可写”闸门：达到容量后关闭，直到至少移除一个字节。
    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// 结合外部关闭标记推导当前状态。
    pub fn state(&self, closing: bool) -> QueueState {
        if closing {
            QueueState::Closing
        } else if self.bytes.is_empty() {
            QueueState::Empty
        } else if self.is_full() {
            QueueState::Full
        } else {
            QueueState::HasData
        }
    }

    /// 在尾部追加一个字节。
    ///
    /// # 教案式注释
    /// - **契约 (What)**：长度等于 [`CAPACITY`] 时返回 [`FifoError::Full`] 且不修改队列；
    ///   成功后 `readable` 置位，若恰好填满则 `writable` 复位；
    /// - **异常 (Trade-offs)**：存储扩容失败返回 [`FifoError::OutOfMemory`]，队列保持原状。
    pub fn append(&mut self, byte: u8) -> Result<()> {
        if self.is_full() {
            self.writable = false;
            return Err(FifoError::Full);
        }
        self.reserve(1)?;
        self.bytes.push_back(byte);
        self.mark_after_append();
        Ok(())
    }

    /// 从头部移除一个字节。
    ///
    /// - **契约 (What)**：空队列返回 [`FifoError::Empty`]；成功后 `writable` 置位，
    ///   若队列因此变空则 `readable` 复位。
    pub fn remove_front(&mut self) -> Result<u8> {
        let byte = self.bytes.pop_front().ok_or(FifoError::Empty)?;
        self.mark_after_remove();
        Ok(byte)
    }

    /// 追加 `data` 中能够放下的最长前缀，返回实际接收的字节数。
    ///
    /// # 教案式注释
    /// - **意图 (Why)**：超出剩余容量的写入不是错误，而是短写；剩余部分被拒绝而非排队；
    /// - **执行 (How)**：先按前缀长度一次性尝试预留存储，成功后再批量追加，
    ///   因而内存不足时不会留下部分插入的数据；
    /// - **契约 (What)**：返回值满足 `n == min(data.len(), remaining())`。
    pub fn push_prefix(&mut self, data: &[u8]) -> Result<usize> {
        let accepted = data.len().min(self.remaining());
        if accepted == 0 {
            if self.is_full() {
                self.writable = false;
            }
            return Ok(0);
        }
        self.reserve(accepted)?;
        self.bytes.extend(&data[..accepted]);
        self.mark_after_append();
        Ok(accepted)
    }

    /// 将队首字节依次移入 `out`，返回移动的字节数 `min(out.len(), len())`。
    pub fn drain_into(&mut self, out: &mut [u8]) -> usize {
        let count = out.len().min(self.bytes.len());
        for (slot, byte) in out.iter_mut().zip(self.bytes.drain(..count)) {
            *slot = byte;
        }
        if count > 0 {
            self.mark_after_remove();
        }
        count
    }

    /// 丢弃全部剩余字节并归还存储，返回被丢弃的字节数。
    pub fn clear(&mut self) -> usize {
        let discarded = self.bytes.len();
        self.bytes = VecDeque::new();
        self.readable = false;
        self.writable = true;
        discarded
    }

    #[cfg(test)]
    fn allocated(&self) -> usize {
        self.bytes.capacity()
    }

    fn reserve(&mut self, additional: usize) -> Result<()> {
        self.bytes.try_reserve(additional).map_err(|_| {
            tracing::error!(requested = additional, "cannot allocate queue storage");
            FifoError::OutOfMemory {
                requested: additional,
            }
        })
    }

    fn mark_after_append(&mut self) {
        self.readable = true;
        if self.is_full() {
            self.writable = false;
        }
    }

    fn mark_after_remove(&mut self) {
        self.writable = true;
        if self.bytes.is_empty() {
            self.readable = false;
        }
    }
}

impl Default for ByteQueue {
    fn default() -> Self {
        Self::new()
    }
}
