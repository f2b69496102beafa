//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 同步原语 (Synchronization Primitives)
//!
//! - `synch`: 同步对象核心（优先级等待队列、所有者、优先级继承）
//! - `mutex`: 实时互斥锁
//! - `condvar`: 条件变量（解锁时投递延迟信号）

pub mod condvar;
pub mod mutex;
pub mod synch;

pub use condvar::{Cond, CondWait};
pub use mutex::{Mutex, MutexAttr, MutexKind, MutexProtocol};
pub use synch::{LockStatus, SynchId};
