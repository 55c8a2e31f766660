//! 缓冲管理核心：队列、目录、访问协调器与策略选择器。
//!
//! - `queue`：有界字节 FIFO；
//! - `directory`：按身份索引的队列仓储；
//! - `coordinator`：单队列的阻塞读写协议；
//! - `policy`：身份到队列键的映射与单一访问闸门；
//! - `cancel`：打断阻塞调用的取消令牌。

pub mod cancel;
pub mod coordinator;
pub mod directory;
pub mod policy;
pub mod queue;
