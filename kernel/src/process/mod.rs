//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 线程管理模块
//!
//! - `thread`: 线程控制块、状态位与信息位
//! - `timer`: 线程超时定时器
//! - `pod`: 实时核心状态 (nklock) 与对外接口

pub mod pod;
pub mod thread;
pub mod timer;

pub use pod::Pod;
pub use thread::{ThreadAttr, ThreadId, ThreadInfo, ThreadSnapshot, ThreadState};
pub use timer::{Ticks, Timeout};
