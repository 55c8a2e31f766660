//! # Directory：按身份索引的队列仓储
//!
//! ## 核心意图（Why）
//! - 提供基于 `DashMap` 的并发安全存储，保证多线程下队列的“不存在则创建”、查询、回收具备原子语义；
//! - 在 multi 策略下每个身份各占一个队列，互不相关的身份可以并发推进；
//!   default/single 策略下退化为固定哨兵键上的单一条目。
//!
//! ## 行为契约（What）
//! - `acquire`：条目存在则直接返回，否则原子创建空队列并插入，同一身份永远不会出现两个条目；
//! - `lookup`：只读查询，供读写路径使用；
//! - `release`：移除并销毁条目、丢弃剩余字节；对不存在的身份调用是无操作而非错误；
//! - `sweep`：按身份升序遍历释放全部条目，用于关停清扫。
//!
//! ## 风险提示（Trade-offs）
//! - `DashMap` guard 在持有期间会阻塞同分片的写操作，因此所有公开方法都只克隆出 `Arc` 后立即释放 guard，
//!   绝不会在持有分片锁时进入队列等待；
//! - 哈希表本身无序，清扫前先对键排序以保持有序遍历。

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use dashmap::{DashMap, mapref::entry::Entry};
use tracing::{debug, info};

use crate::core::coordinator::Coordinator;

/// 调用方身份：不透明的有符号整数键（源头上是进程号）。
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Identity(i32);

impl Identity {
    /// default/single 策略共用队列的哨兵身份。
    pub const SHARED: Identity = Identity(0);

    pub const fn new(raw: i32) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> i32 {
        self.0
    }
}

impl From<i32> for Identity {
    fn from(raw: i32) -> Self {
        Self(raw)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// 目录条目：拥有一个队列的协调器，并统计挂在其上的句柄数。
///
/// # 教案式注释
/// - **契约 (What)**：句柄计数只在目录分片锁内递增，并在分片锁内做“空闲才移除”的判断，
///   因而与并发的 `acquire` 不会竞态出悬空句柄。
#[derive(Debug)]
pub struct DirectoryEntry {
    coordinator: Arc<Coordinator>,
    handles: AtomicUsize,
}

impl DirectoryEntry {
    fn new(identity: Identity, wait_slice: Duration) -> Self {
        Self {
            coordinator: Arc::new(Coordinator::new(identity, wait_slice)),
            handles: AtomicUsize::new(0),
        }
    }

    pub fn identity(&self) -> Identity {
        self.coordinator.identity()
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    /// 当前打开的句柄数量。
    pub fn handles(&self) -> usize {
        self.handles.load(Ordering::Acquire)
    }

    /// 句柄关闭时调用，返回剩余句柄数。
    pub(crate) fn detach(&self) -> usize {
        let previous = self
            .handles
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                Some(count.saturating_sub(1))
            })
            .unwrap_or_default();
        previous.saturating_sub(1)
    }
}

/// 队列句柄：对目录条目的共享引用。
pub type QueueHandle = Arc<DirectoryEntry>;

/// 按身份索引的队列目录。
#[derive(Debug)]
pub struct Directory {
    entries: DashMap<Identity, QueueHandle>,
    wait_slice: Duration,
}

impl Directory {
    /// 创建空目录；`wait_slice` 会传递给每个新建队列的协调器。
    pub fn new(wait_slice: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            wait_slice,
        }
    }

    /// 获取（必要时创建）`identity` 的队列，并把句柄计数加一。
    ///
    /// # 教案式注释
    /// - **意图 (Why)**：打开路径需要“查找或创建”与“登记句柄”在同一临界区内完成；
    /// - **执行 (How)**：借助 `DashMap::entry` 在分片写锁内完成判断与插入，随后递增计数；
    /// - **契约 (What)**：同一身份并发调用只会创建一个条目；队列存储惰性分配，
    ///   因此这里不会因内存耗尽失败。
    pub fn acquire(&self, identity: Identity) -> QueueHandle {
        match self.entries.entry(identity) {
            Entry::Occupied(occupied) => {
                let entry = occupied.get();
                entry.handles.fetch_add(1, Ordering::AcqRel);
                Arc::clone(entry)
            }
            Entry::Vacant(vacant) => {
                let entry = Arc::new(DirectoryEntry::new(identity, self.wait_slice));
                entry.handles.fetch_add(1, Ordering::AcqRel);
                debug!(%identity, "queue created");
                Arc::clone(vacant.insert(entry).value())
            }
        }
    }

    /// 只读查询 `identity` 的队列。
    pub fn lookup(&self, identity: Identity) -> Option<QueueHandle> {
        self.entries.get(&identity).map(|entry| Arc::clone(entry.value()))
    }

    /// 移除并销毁 `identity` 的队列；返回是否确实移除了条目。
    ///
    /// - **契约 (What)**：被移除的队列会丢弃剩余字节并唤醒所有等待者；
    ///   对已释放或从未创建的身份调用是无操作。
    pub fn release(&self, identity: Identity) -> bool {
        match self.entries.remove(&identity) {
            Some((_, entry)) => {
                retire(&entry);
                true
            }
            None => false,
        }
    }

    /// 仅当目录中登记的仍是 `mine` 且其上已无句柄时释放，用于“关闭即释放”策略。
    ///
    /// - **契约 (What)**：同一身份被释放后重新创建的新条目与 `mine` 不是同一个对象，
    ///   旧句柄的关闭不会移除它；判断与移除都在分片锁内完成。
    pub(crate) fn release_if_idle(&self, mine: &QueueHandle) -> bool {
        match self.entries.remove_if(&mine.identity(), |_, entry| {
            Arc::ptr_eq(entry, mine) && entry.handles() == 0
        }) {
            Some((_, entry)) => {
                retire(&entry);
                true
            }
            None => false,
        }
    }

    /// 按身份升序释放全部条目，返回释放数量。
    pub fn sweep(&self) -> usize {
        self.identities()
            .into_iter()
            .filter(|identity| self.release(*identity))
            .count()
    }

    /// 当 `identity` 下登记的仍是 `mine` 时返回它；条目已释放或被新条目替换时返回 `None`。
    pub fn lookup_same(&self, mine: &QueueHandle) -> Option<QueueHandle> {
        self.lookup(mine.identity())
            .filter(|current| Arc::ptr_eq(current, mine))
    }

    /// 已登记身份的升序列表。
    pub fn identities(&self) -> Vec<Identity> {
        let mut keys: Vec<Identity> = self.entries.iter().map(|entry| *entry.key()).collect();
        keys.sort_unstable();
        keys
    }

    /// 当前条目数量。
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn retire(entry: &DirectoryEntry) {
    let discarded = entry.coordinator.retire();
    info!(identity = %entry.identity(), discarded, "queue released");
}
