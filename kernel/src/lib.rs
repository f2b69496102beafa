//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! Rux 实时核心 (nucleus)
//!
//! 多调度类、每 CPU 调度器、带优先级继承的互斥锁和条件变量：
//! - `sched`: 优先级队列、调度类（idle/rt/weak/tp/sporadic）、每 CPU 调度器
//! - `process`: 线程控制块、超时定时器、实时核心 (Pod)
//! - `sync`: 同步对象、互斥锁、条件变量
//! - `smp`: CPU 集合与重调度 IPI
//!
//! 调度在宿主机上建模：上下文切换就是改写每 CPU 的当前线程，
//! 由调用者驱动时钟滴答、IPI 和调度点。

#![cfg_attr(not(test), no_std)]

extern crate alloc;
extern crate log;

pub mod collection;
pub mod config;
pub mod errno;
pub mod process;
pub mod sched;
pub mod smp;
pub mod sync;

#[cfg(test)]
mod tests;

pub use errno::Errno;
pub use process::pod::Pod;
