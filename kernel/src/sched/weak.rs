//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! weak 调度类
//!
//! 权重仅高于 idle，给非实时但仍由本核心调度的线程使用。
//! 优先级 [0, WEAK_MAX_PRIO]，同优先级 FIFO，可选时间片轮转。

use crate::config::WEAK_MAX_PRIO;
use crate::errno::Errno;
use crate::process::pod::Nucleus;
use crate::process::thread::{Thread, ThreadId};
use crate::sched::class::{class_weight, rr_tick, ClassId, PolicyParam, SchedClass, SCHED_WEAK};

pub struct WeakClass;

pub static WEAK_CLASS: WeakClass = WeakClass;

impl SchedClass for WeakClass {
    fn id(&self) -> ClassId {
        ClassId::Weak
    }

    fn name(&self) -> &'static str {
        "weak"
    }

    fn policy(&self) -> i32 {
        SCHED_WEAK
    }

    fn weight(&self) -> i32 {
        class_weight(1)
    }

    fn enqueue(&self, nk: &mut Nucleus, thread: ThreadId) {
        let t = &nk.threads[thread];
        let (cpu, prio) = (t.sched, t.cprio);
        nk.scheds[cpu].weak.insert_fifo(thread, prio);
    }

    fn enqueue_front(&self, nk: &mut Nucleus, thread: ThreadId) {
        let t = &nk.threads[thread];
        let (cpu, prio) = (t.sched, t.cprio);
        nk.scheds[cpu].weak.insert_lifo(thread, prio);
    }

    fn dequeue(&self, nk: &mut Nucleus, thread: ThreadId) {
        let t = &nk.threads[thread];
        let (cpu, prio) = (t.sched, t.cprio);
        if nk.scheds[cpu].weak.remove(thread, prio).is_err() {
            log::error!("weak: {} not on cpu{} runqueue at prio {}", t.name, cpu, prio);
            panic!("weak: dequeue of unqueued thread");
        }
    }

    fn pick(&self, nk: &mut Nucleus, cpu: usize) -> Option<ThreadId> {
        nk.scheds[cpu].weak.pick_highest()
    }

    fn tick(&self, nk: &mut Nucleus, thread: ThreadId) {
        rr_tick(nk, thread);
    }

    fn setparam(&self, thread: &mut Thread, param: &PolicyParam) {
        thread.cprio = param.prio();
    }

    fn getparam(&self, thread: &Thread) -> PolicyParam {
        PolicyParam::Weak { prio: thread.cprio }
    }

    fn trackprio(&self, thread: &mut Thread, param: Option<&PolicyParam>) {
        thread.cprio = match param {
            Some(p) => p.prio(),
            None => thread.bprio,
        };
    }

    fn declare(&self, _thread: &mut Thread, param: &PolicyParam) -> Result<(), Errno> {
        match *param {
            PolicyParam::Weak { prio } if (0..=WEAK_MAX_PRIO).contains(&prio) => Ok(()),
            _ => Err(Errno::InvalidArgument),
        }
    }
}
