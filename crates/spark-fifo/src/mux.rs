//! # Multiplexer：面向设备门面的上下文对象
//!
//! ## 核心意图（Why）
//! - 以显式的上下文对象持有目录与策略选择器，启动时构造一次并传递给每个操作，
//!   取代模块级的全局可变状态；
//! - 设备门面（注册设备节点、解析模块参数等）只需把 open/read/write/close 翻译为这里的四个调用，
//!   并携带调用方身份。
//!
//! ## 数据流（How）
//! - `open` → 策略准入 → `Directory::acquire` → 清除 `Closing`；
//! - `write` → 查目录 → 协调器加锁追加 → 唤醒读者；
//! - `read` → 查目录 → 协调器加锁移除或挂起 → 唤醒写者；
//! - `close` → 标记 `Closing` 并唤醒读者 → 按释放策略决定是否移除队列。
//!
//! ## 行为契约（What）
//! - 每次读写都重新查目录，身份对应的队列不存在时返回 [`FifoError::NoSuchQueue`]，不阻塞也不崩溃；
//! - `shutdown` 之后拒绝新的打开，并按身份升序释放全部队列、唤醒所有等待者。

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use bytes::{Bytes, BytesMut};
use tracing::{debug, info};

use crate::{
    config::{MuxConfig, Policy, ReleasePolicy},
    core::{
        cancel::Cancellation,
        directory::{Directory, Identity, QueueHandle},
        policy::PolicySelector,
        queue::QueueState,
    },
    error::{FifoError, Result},
};

/// 单个队列的诊断快照。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct QueueSnapshot {
    pub identity: Identity,
    pub len: usize,
    pub state: QueueState,
    pub handles: usize,
    /// 队列的“可读”闸门。
    pub readable: bool,
    /// 队列的“可写”闸门。
    pub writable: bool,
}

/// 字节流多路复用器。
///
/// # 教案式说明
/// - **意图 (Why)**：把“身份 → 队列”的映射、打开互斥与阻塞读写组合成设备门面可直接调用的表面；
/// - **契约 (What)**：`Clone` 仅复制内部 `Arc`，所有克隆共享同一组队列；
///   实例满足 `Send + Sync`，可被任意多个线程同时使用；
/// - **风险 (Trade-offs)**：句柄持有上下文的强引用，关停后句柄仍可安全调用，只是读写会得到
///   `NoSuchQueue`。
#[derive(Clone, Debug)]
pub struct Multiplexer {
    inner: Arc<MuxInner>,
}

#[derive(Debug)]
struct MuxInner {
    config: MuxConfig,
    selector: PolicySelector,
    directory: Directory,
    shut_down: AtomicBool,
}

impl Multiplexer {
    /// 按配置构造多路复用器。
    ///
    /// - **契约 (What)**：配置先经过 [`MuxConfig::validate`]，非法取值返回 [`FifoError::InvalidConfig`]；
    ///   成功时输出一次启动日志。
    pub fn new(config: MuxConfig) -> Result<Self> {
        let config = config.validate()?;
        info!(
            policy = %config.policy,
            release = ?config.release,
            backpressure = ?config.backpressure,
            wait_slice_ms = config.wait_slice_ms,
            "multiplexer started"
        );
        Ok(Self {
            inner: Arc::new(MuxInner {
                selector: PolicySelector::new(config.policy),
                directory: Directory::new(config.wait_slice_duration()),
                shut_down: AtomicBool::new(false),
                config,
            }),
        })
    }

    /// 以指定策略和默认配置构造。
    pub fn with_policy(policy: Policy) -> Result<Self> {
        Self::new(MuxConfig::with_policy(policy))
    }

    pub fn config(&self) -> &MuxConfig {
        &self.inner.config
    }

    pub fn policy(&self) -> Policy {
        self.inner.config.policy
    }

    /// 为调用方打开一个句柄。
    ///
    /// # 教案式注释
    /// - **执行 (How)**：
    ///   1. 已关停则返回 [`FifoError::ShutDown`]；
    ///   2. 策略准入：`Single` 策略下已有活跃句柄时立即返回 [`FifoError::Busy`]；
    ///   3. 在目录中获取或创建映射后的队列，登记句柄并清除 `Closing`；
    /// - **契约 (What)**：准入成功但后续步骤失败时，闸门会被归还。
    pub fn open(&self, caller: impl Into<Identity>) -> Result<Handle> {
        let caller = caller.into();
        let inner = &self.inner;
        if inner.shut_down.load(Ordering::Acquire) {
            return Err(FifoError::ShutDown);
        }
        inner.selector.try_enter(caller)?;

        let key = inner.selector.queue_key(caller);
        let entry = inner.directory.acquire(key);
        if inner.shut_down.load(Ordering::Acquire) {
            // 与关停清扫竞态：撤销刚才的登记。
            entry.detach();
            inner.directory.release_if_idle(&entry);
            inner.selector.leave();
            return Err(FifoError::ShutDown);
        }
        entry.coordinator().reopen();
        info!(identity = %caller, queue = %key, handles = entry.handles(), "device opened");

        Ok(Handle {
            mux: Arc::clone(inner),
            caller,
            key,
            entry,
            cancel: Cancellation::new(),
            closed: AtomicBool::new(false),
        })
    }

    /// 释放 `identity` 对应的队列；对不存在的身份是无操作。
    pub fn release(&self, identity: impl Into<Identity>) -> bool {
        self.inner.directory.release(identity.into())
    }

    /// 关停：拒绝新的打开，并按身份升序释放全部队列。返回释放的队列数。
    pub fn shutdown(&self) -> usize {
        self.inner.shut_down.store(true, Ordering::Release);
        let released = self.inner.directory.sweep();
        info!(released, "multiplexer shut down");
        released
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::Acquire)
    }

    /// 调用方身份当前映射到的队列长度。
    pub fn queue_len(&self, caller: impl Into<Identity>) -> Option<usize> {
        let key = self.inner.selector.queue_key(caller.into());
        self.inner
            .directory
            .lookup(key)
            .map(|entry| entry.coordinator().len())
    }

    /// 调用方身份当前映射到的队列状态。
    pub fn queue_state(&self, caller: impl Into<Identity>) -> Option<QueueState> {
        let key = self.inner.selector.queue_key(caller.into());
        self.inner
            .directory
            .lookup(key)
            .map(|entry| entry.coordinator().state())
    }

    /// 当前登记的队列数量。
    pub fn queue_count(&self) -> usize {
        self.inner.directory.len()
    }

    /// `Single` 策略下是否已有活跃句柄占用打开闸门；其他策略恒为 `false`。
    pub fn single_access_held(&self) -> bool {
        self.inner.selector.is_engaged()
    }

    /// 全部队列的有序诊断快照。
    pub fn snapshot(&self) -> Vec<QueueSnapshot> {
        let directory = &self.inner.directory;
        directory
            .identities()
            .into_iter()
            .filter_map(|identity| directory.lookup(identity))
            .map(|entry| {
                let (readable, writable) = entry.coordinator().gates();
                QueueSnapshot {
                    identity: entry.identity(),
                    len: entry.coordinator().len(),
                    state: entry.coordinator().state(),
                    handles: entry.handles(),
                    readable,
                    writable,
                }
            })
            .collect()
    }
}

/// 调用方打开设备后得到的句柄。
///
/// # 教案式说明
/// - **契约 (What)**：
///   - `read`/`write` 可在多个线程上通过共享引用并发调用；
///   - `close` 幂等，`Drop` 时自动关闭；
///   - `interrupt` 打断当前（以及之后任何需要挂起的）阻塞调用，返回 [`FifoError::Interrupted`]。
/// - **风险 (Trade-offs)**：句柄绑定打开时登记的那个目录条目，而不只是队列键；
///   队列被释放后即便同一身份重新打开，旧句柄也只会得到 `NoSuchQueue`，其关闭不会触及新队列。
#[derive(Debug)]
pub struct Handle {
    mux: Arc<MuxInner>,
    caller: Identity,
    key: Identity,
    entry: QueueHandle,
    cancel: Cancellation,
    closed: AtomicBool,
}

impl Handle {
    /// 打开句柄的调用方身份。
    pub fn identity(&self) -> Identity {
        self.caller
    }

    /// 句柄映射到的队列键。
    pub fn queue_key(&self) -> Identity {
        self.key
    }

    /// 阻塞读取至多 `buf.len()` 个字节，返回实际读取数；0 表示流结束。
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let entry = self.lookup()?;
        debug!(identity = %self.caller, requested = buf.len(), "device read");
        entry.coordinator().read(buf, &self.cancel)
    }

    /// 阻塞读取至多 `max_len` 个字节并以 [`Bytes`] 返回，长度即读取数。
    pub fn read_bytes(&self, max_len: usize) -> Result<Bytes> {
        let mut buf = BytesMut::zeroed(max_len);
        let count = self.read(&mut buf)?;
        buf.truncate(count);
        Ok(buf.freeze())
    }

    /// 写入 `data` 中能够放下的最长前缀，返回实际接收数（允许短写）。
    pub fn write(&self, data: &[u8]) -> Result<usize> {
        let entry = self.lookup()?;
        debug!(identity = %self.caller, offered = data.len(), "device write");
        entry
            .coordinator()
            .write(data, &self.cancel, self.mux.config.backpressure)
    }

    /// 打断阻塞中的读写，并唤醒队列上的等待者。
    pub fn interrupt(&self) {
        self.cancel.cancel();
        self.entry.coordinator().interrupt();
    }

    /// 与本句柄共享取消标记的令牌，可交给其他线程用于打断。
    ///
    /// 通过该令牌取消时不会主动唤醒等待者，阻塞调用会在当前等待切片结束时返回。
    pub fn cancellation(&self) -> Cancellation {
        self.cancel.child()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// 关闭句柄。
    ///
    /// # 教案式注释
    /// - **执行 (How)**：标记队列 `Closing` 并唤醒读者；`Single` 策略下归还打开闸门；
    ///   `OnClose` 释放策略下，若这是队列上最后一个句柄则释放队列；
    /// - **契约 (What)**：重复调用为无操作。
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let mux = &self.mux;
        // 先标记再摘除，并发 open 的 reopen 不会被覆盖。
        self.entry.coordinator().mark_closing();
        let remaining = self.entry.detach();
        if remaining == 0 && mux.config.release == ReleasePolicy::OnClose {
            mux.directory.release_if_idle(&self.entry);
        }
        mux.selector.leave();
        info!(
            identity = %self.caller,
            queue = %self.key,
            remaining,
            drained = self.entry.coordinator().is_empty(),
            "device closed"
        );
    }

    fn lookup(&self) -> Result<QueueHandle> {
        self.mux
            .directory
            .lookup_same(&self.entry)
            .ok_or(FifoError::NoSuchQueue { identity: self.key })
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        self.close();
    }
}
