//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 单元测试模块
//!
//! 在宿主机上驱动实时核心：测试代码扮演时钟中断、IPI 和各线程，
//! 通过 `Pod` 的检视接口观察调度结果。
//!
//! 运行测试：
//! ```bash
//! cargo test --package rux-nucleus
//! ```

use crate::process::pod::Pod;
use crate::process::thread::{ThreadAttr, ThreadId};
use crate::sched::class::{ClassId, PolicyParam};

pub mod mutex;
#[cfg(all(feature = "sched-weak", feature = "sched-tp", feature = "sched-sporadic"))]
pub mod sched_classes;
#[cfg(feature = "smp")]
pub mod smp_schedule;

/// 启动一个 `nr_cpus` 核的实时核心
pub fn boot(nr_cpus: usize) -> Pod {
    match Pod::new(nr_cpus) {
        Ok(pod) => pod,
        Err(e) => panic!("test: pod boot failed: {:?}", e),
    }
}

/// 在 cpu0 上以 `cpu` 为发起方创建并启动线程
pub fn spawn_attr(pod: &Pod, attr: ThreadAttr) -> ThreadId {
    let cpu = attr.cpu;
    let thread = pod.create_thread(cpu, attr).expect("test: create_thread");
    pod.start_thread(cpu, thread).expect("test: start_thread");
    thread
}

/// 创建并启动一个 rt 线程
pub fn spawn_rt(pod: &Pod, name: &str, cpu: usize, prio: i32) -> ThreadId {
    spawn_attr(pod, ThreadAttr::rt(name, cpu, prio))
}

/// 创建并启动一个其它调度类的线程
pub fn spawn_class(pod: &Pod, name: &str, cpu: usize, class: ClassId, param: PolicyParam) -> ThreadId {
    spawn_attr(pod, ThreadAttr::rt(name, cpu, 0).with_policy(class, param))
}

/// 调度 `cpu` 并返回它的当前线程
pub fn run(pod: &Pod, cpu: usize) -> ThreadId {
    pod.schedule(cpu).expect("test: schedule");
    pod.current(cpu).expect("test: current")
}

/// 连续 `n` 个时钟滴答
pub fn ticks(pod: &Pod, cpu: usize, n: usize) {
    for _ in 0..n {
        pod.tick(cpu).expect("test: tick");
    }
}
