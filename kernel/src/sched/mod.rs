//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 调度器模块
//!
//! 实时核心的多调度类调度器：
//! - `queue`: 位图多级优先级队列
//! - `class`: 调度类接口与权重
//! - `idle` / `rt` / `weak` / `tp` / `sporadic`: 各调度类
//! - `registry`: 按权重排序的调度类注册表
//! - `sched`: 每 CPU 调度器（pick_next、重调度协议、僵尸回收）

pub mod class;
pub mod idle;
pub mod queue;
pub mod registry;
pub mod rt;
#[allow(clippy::module_inception)]
pub mod sched;
#[cfg(feature = "sched-sporadic")]
pub mod sporadic;
#[cfg(feature = "sched-tp")]
pub mod tp;
#[cfg(feature = "sched-weak")]
pub mod weak;

pub use class::{
    ClassId, PolicyParam, SchedClass, IDLE_PRIO, RUNPRIO, SCHED_FIFO, SCHED_IDLE, SCHED_RR,
    SCHED_SPORADIC, SCHED_TP, SCHED_WEAK,
};
pub use queue::SchedQueue;
pub use sched::{SchedLflags, SchedStats, SchedStatus, Switch};
#[cfg(feature = "sched-sporadic")]
pub use sporadic::PssParam;
#[cfg(feature = "sched-tp")]
pub use tp::{TpSchedule, TpWindow};
