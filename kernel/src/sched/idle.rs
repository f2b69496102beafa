//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! idle 调度类
//!
//! 权重最低，从不入队；其它类都没有候选时 pick 返回本 CPU 的根线程。

use crate::process::pod::Nucleus;
use crate::process::thread::{Thread, ThreadId};
use crate::sched::class::{class_weight, ClassId, PolicyParam, SchedClass, IDLE_PRIO, SCHED_IDLE};

pub struct IdleClass;

pub static IDLE_CLASS: IdleClass = IdleClass;

impl SchedClass for IdleClass {
    fn id(&self) -> ClassId {
        ClassId::Idle
    }

    fn name(&self) -> &'static str {
        "idle"
    }

    fn policy(&self) -> i32 {
        SCHED_IDLE
    }

    fn weight(&self) -> i32 {
        class_weight(0)
    }

    fn enqueue(&self, _nk: &mut Nucleus, _thread: ThreadId) {}

    fn dequeue(&self, _nk: &mut Nucleus, _thread: ThreadId) {}

    fn requeue(&self, _nk: &mut Nucleus, _thread: ThreadId) {}

    fn pick(&self, nk: &mut Nucleus, cpu: usize) -> Option<ThreadId> {
        Some(nk.scheds[cpu].root)
    }

    fn setparam(&self, thread: &mut Thread, _param: &PolicyParam) {
        thread.cprio = IDLE_PRIO;
    }

    fn getparam(&self, thread: &Thread) -> PolicyParam {
        PolicyParam::Idle { prio: thread.cprio }
    }

    fn trackprio(&self, thread: &mut Thread, param: Option<&PolicyParam>) {
        thread.cprio = match param {
            Some(p) => p.prio(),
            None => thread.bprio,
        };
    }
}
