//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! rt 调度类
//!
//! 对应 Linux 的 kernel/sched/rt.c：固定优先级抢占，同优先级 FIFO，
//! 可选时间片轮转。每个 CPU 一个位图多级队列 (`Sched::rt`)。

use crate::config::{RT_MAX_PRIO, RT_MIN_PRIO};
use crate::errno::Errno;
use crate::process::pod::Nucleus;
use crate::process::thread::{Thread, ThreadId, BLOCK_BITS, ThreadState};
use crate::sched::class::{
    class_weight, rr_tick, ClassId, PolicyParam, SchedClass, RUNPRIO, SCHED_FIFO,
};

pub struct RtClass;

pub static RT_CLASS: RtClass = RtClass;

impl SchedClass for RtClass {
    fn id(&self) -> ClassId {
        ClassId::Rt
    }

    fn name(&self) -> &'static str {
        "rt"
    }

    fn policy(&self) -> i32 {
        SCHED_FIFO
    }

    fn weight(&self) -> i32 {
        class_weight(4)
    }

    fn enqueue(&self, nk: &mut Nucleus, thread: ThreadId) {
        let t = &nk.threads[thread];
        let (cpu, prio) = (t.sched, t.cprio);
        nk.scheds[cpu].rt.insert_fifo(thread, prio);
    }

    fn enqueue_front(&self, nk: &mut Nucleus, thread: ThreadId) {
        let t = &nk.threads[thread];
        let (cpu, prio) = (t.sched, t.cprio);
        nk.scheds[cpu].rt.insert_lifo(thread, prio);
    }

    fn dequeue(&self, nk: &mut Nucleus, thread: ThreadId) {
        let t = &nk.threads[thread];
        let (cpu, prio) = (t.sched, t.cprio);
        if nk.scheds[cpu].rt.remove(thread, prio).is_err() {
            log::error!("rt: {} not on cpu{} runqueue at prio {}", t.name, cpu, prio);
            panic!("rt: dequeue of unqueued thread");
        }
    }

    fn pick(&self, nk: &mut Nucleus, cpu: usize) -> Option<ThreadId> {
        nk.scheds[cpu].rt.pick_highest()
    }

    fn tick(&self, nk: &mut Nucleus, thread: ThreadId) {
        rr_tick(nk, thread);
    }

    /// 把指定优先级的队首放到队尾；`RUNPRIO` 表示当前线程
    fn rotate(&self, nk: &mut Nucleus, cpu: usize, param: &PolicyParam) {
        if nk.scheds[cpu].rt.is_empty() {
            return;
        }
        let curr = nk.scheds[cpu].curr;
        let thread = if param.prio() == RUNPRIO {
            curr
        } else {
            match nk.scheds[cpu].rt.find(param.prio()) {
                Some(thread) => thread,
                None => return,
            }
        };
        if thread == curr {
            // 当前线程已阻塞、持有调度锁或不在本类时不能放回队列
            let t = &nk.threads[curr];
            if t.state.intersects(BLOCK_BITS | ThreadState::LOCK) || t.sched_class != ClassId::Rt {
                return;
            }
        }
        nk.putback(thread);
    }

    fn setparam(&self, thread: &mut Thread, param: &PolicyParam) {
        thread.cprio = param.prio();
    }

    fn getparam(&self, thread: &Thread) -> PolicyParam {
        PolicyParam::Rt { prio: thread.cprio }
    }

    fn trackprio(&self, thread: &mut Thread, param: Option<&PolicyParam>) {
        thread.cprio = match param {
            Some(p) => p.prio(),
            None => thread.bprio,
        };
    }

    fn declare(&self, _thread: &mut Thread, param: &PolicyParam) -> Result<(), Errno> {
        match *param {
            PolicyParam::Rt { prio } if (RT_MIN_PRIO..=RT_MAX_PRIO).contains(&prio) => Ok(()),
            _ => Err(Errno::InvalidArgument),
        }
    }
}
