//! # spark-fifo
//!
//! ## 定位与职责（Why）
//! - 单个设备节点背后的字节流多路复用核心：调用方打开设备、写入字节、再按 FIFO 顺序读回；
//! - 难点集中在缓冲管理：按身份索引的有界队列集合、队列创建/查询/回收的并发安全，
//!   以及不忙等、无数据竞争的阻塞读写协调。
//!
//! ## 架构嵌入（Where）
//! - `core` 模块承载队列、目录、访问协调器与策略选择器；
//! - `mux` 模块提供设备门面调用的上下文对象与句柄（open / read / write / close）；
//! - `config` 模块定义启动时固定的策略、释放时机与背压行为；
//! - `error` 模块集中定义 `thiserror` 风格的错误类型。
//!
//! ## 使用示例（How）
//! ```
//! use spark_fifo::{Multiplexer, Policy};
//!
//! let mux = Multiplexer::with_policy(Policy::Multi).expect("valid config");
//! let handle = mux.open(7).expect("open");
//! assert_eq!(handle.write(b"abc").expect("write"), 3);
//! assert_eq!(handle.read_bytes(5).expect("read").as_ref(), b"abc");
//! ```
//!
//! ## 非目标（Trade-offs）
//! - 不跨重启持久化、不做多字节原子分帧、除固定容量外不做流控、不定义任何线协议；
//! - 设备节点注册、模块参数解析等系统集成由外部门面负责。

pub mod config;
pub mod core;
pub mod error;
pub mod mux;

pub use crate::config::{Backpressure, MuxConfig, Policy, ReleasePolicy};
pub use crate::core::{
    cancel::Cancellation,
    directory::{Directory, DirectoryEntry, Identity, QueueHandle},
    queue::{ByteQueue, CAPACITY, QueueState},
};
pub use crate::error::{FifoError, Result};
pub use crate::mux::{Handle, Multiplexer, QueueSnapshot};
