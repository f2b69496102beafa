//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! sporadic 调度类（POSIX sporadic server）
//!
//! 线程以 normal_prio 运行，消耗执行预算；预算耗尽后降到 low_prio，
//! 直到补充 (replenishment) 到期把预算还回来。
//!
//! 补充规则：
//! - 一段连续执行从 activation 时刻开始计时
//! - 这段执行结束（预算耗尽或线程让出 CPU）时，在 activation + repl_period
//!   处登记一次补充，数额等于这段执行消耗的预算
//! - 待处理的补充最多 max_repl 个，超出时并入最后一个

use alloc::boxed::Box;
use alloc::collections::VecDeque;
use alloc::vec::Vec;

use crate::config::{PSS_MAX_REPL, RT_MAX_PRIO, RT_MIN_PRIO};
use crate::errno::Errno;
use crate::process::pod::Nucleus;
use crate::process::thread::{Thread, ThreadId, ThreadState};
use crate::process::timer::Ticks;
use crate::sched::class::{class_weight, ClassId, PolicyParam, SchedClass, SCHED_SPORADIC};
use crate::sched::queue::SchedQueue;

/// sporadic 调度参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PssParam {
    pub low_prio: i32,
    pub normal_prio: i32,
    /// 当前生效的优先级（getparam 时填写）
    pub current_prio: i32,
    pub init_budget: Ticks,
    pub repl_period: Ticks,
    pub max_repl: usize,
}

impl PssParam {
    pub fn new(low_prio: i32, normal_prio: i32, init_budget: Ticks, repl_period: Ticks, max_repl: usize) -> Self {
        Self {
            low_prio,
            normal_prio,
            current_prio: normal_prio,
            init_budget,
            repl_period,
            max_repl,
        }
    }

    fn validate(&self) -> Result<(), Errno> {
        let prio_range = RT_MIN_PRIO..=RT_MAX_PRIO;
        if !prio_range.contains(&self.low_prio)
            || !prio_range.contains(&self.normal_prio)
            || self.low_prio >= self.normal_prio
        {
            return Err(Errno::InvalidArgument);
        }
        if self.init_budget == 0 || self.repl_period < self.init_budget {
            return Err(Errno::InvalidArgument);
        }
        if self.max_repl == 0 || self.max_repl > PSS_MAX_REPL {
            return Err(Errno::InvalidArgument);
        }
        Ok(())
    }
}

/// 线程的 sporadic server 状态
#[derive(Debug, Clone)]
pub struct PssThread {
    pub(crate) param: PssParam,
    /// 剩余预算
    pub(crate) budget: Ticks,
    /// 本段执行已消耗的预算
    pub(crate) consumed: Ticks,
    /// 本段执行的起点
    pub(crate) activation: Option<Ticks>,
    /// 预算耗尽，降在 low_prio
    pub(crate) dropped: bool,
    /// 待处理的补充 (到期时间, 数额)，按到期时间排序
    pub(crate) repl: VecDeque<(Ticks, Ticks)>,
}

impl PssThread {
    fn new(param: PssParam) -> Self {
        Self {
            param,
            budget: param.init_budget,
            consumed: 0,
            activation: None,
            dropped: false,
            repl: VecDeque::new(),
        }
    }

    /// 结束当前这段执行，登记补充
    fn post_replenishment(&mut self) {
        let (Some(activation), true) = (self.activation, self.consumed > 0) else {
            return;
        };
        let date = activation + self.param.repl_period;
        if self.repl.len() >= self.param.max_repl {
            if let Some(last) = self.repl.back_mut() {
                last.1 += self.consumed;
            }
        } else {
            self.repl.push_back((date, self.consumed));
        }
        self.consumed = 0;
        self.activation = None;
    }

    /// 应用所有到期的补充，返回预算是否从 0 恢复
    fn replenish(&mut self, now: Ticks) -> bool {
        let mut refilled = false;
        while let Some(&(date, amount)) = self.repl.front() {
            if date > now {
                break;
            }
            self.repl.pop_front();
            self.budget = (self.budget + amount).min(self.param.init_budget);
            refilled = true;
        }
        refilled && self.dropped && self.budget > 0
    }
}

/// 每 CPU 的 sporadic 运行队列
pub struct PssSched {
    pub(crate) runnable: SchedQueue,
}

impl PssSched {
    pub fn new() -> Self {
        Self {
            runnable: SchedQueue::new(RT_MIN_PRIO, RT_MAX_PRIO),
        }
    }
}

impl Default for PssSched {
    fn default() -> Self {
        Self::new()
    }
}

pub struct SporadicClass;

pub static SPORADIC_CLASS: SporadicClass = SporadicClass;

impl SporadicClass {
    fn pss(thread: &Thread) -> &PssThread {
        match thread.pss.as_deref() {
            Some(pss) => pss,
            None => panic!("sporadic: {} has no server state", thread.name),
        }
    }
}

impl SchedClass for SporadicClass {
    fn id(&self) -> ClassId {
        ClassId::Sporadic
    }

    fn name(&self) -> &'static str {
        "pss"
    }

    fn policy(&self) -> i32 {
        SCHED_SPORADIC
    }

    fn weight(&self) -> i32 {
        class_weight(3)
    }

    fn sched_init(&self, sched: &mut crate::sched::sched::Sched) {
        sched.pss = PssSched::new();
    }

    fn enqueue(&self, nk: &mut Nucleus, thread: ThreadId) {
        let t = &nk.threads[thread];
        let (cpu, prio) = (t.sched, t.cprio);
        nk.scheds[cpu].pss.runnable.insert_fifo(thread, prio);
    }

    fn enqueue_front(&self, nk: &mut Nucleus, thread: ThreadId) {
        let t = &nk.threads[thread];
        let (cpu, prio) = (t.sched, t.cprio);
        nk.scheds[cpu].pss.runnable.insert_lifo(thread, prio);
    }

    fn dequeue(&self, nk: &mut Nucleus, thread: ThreadId) {
        let t = &nk.threads[thread];
        let (cpu, prio) = (t.sched, t.cprio);
        if nk.scheds[cpu].pss.runnable.remove(thread, prio).is_err() {
            log::error!("pss: {} not on cpu{} runqueue at prio {}", t.name, cpu, prio);
            panic!("pss: dequeue of unqueued thread");
        }
    }

    fn pick(&self, nk: &mut Nucleus, cpu: usize) -> Option<ThreadId> {
        nk.scheds[cpu].pss.runnable.pick_highest()
    }

    /// 预算记账与补充
    fn sched_tick(&self, nk: &mut Nucleus, cpu: usize) {
        let now = nk.clock;
        let curr = nk.scheds[cpu].curr;
        let members: Vec<ThreadId> = nk
            .threads
            .iter()
            .filter(|(_, t)| t.sched == cpu && t.pss.is_some())
            .map(|(id, _)| id)
            .collect();

        for id in members {
            let running = id == curr;
            let (class, boosted) = {
                let t = &nk.threads[id];
                (t.sched_class, t.state.contains(ThreadState::BOOST))
            };
            let Some(pss) = nk.threads[id].pss.as_deref_mut() else {
                continue;
            };

            let mut exhausted = false;
            if running && class == ClassId::Sporadic && !boosted && !pss.dropped {
                if pss.activation.is_none() {
                    pss.activation = Some(now);
                }
                pss.consumed += 1;
                pss.budget = pss.budget.saturating_sub(1);
                if pss.budget == 0 {
                    pss.post_replenishment();
                    pss.dropped = true;
                    exhausted = true;
                }
            } else if !running {
                pss.post_replenishment();
            }

            let refilled = pss.replenish(now);
            if refilled {
                pss.dropped = false;
            }
            let (low, normal) = (pss.param.low_prio, pss.param.normal_prio);

            if exhausted && !refilled {
                log::debug!("pss: {} budget exhausted, drops to prio {}", nk.threads[id].name, low);
                nk.change_prio(id, low);
                nk.set_self_resched(cpu);
            } else if refilled && !boosted && nk.threads[id].cprio != normal {
                log::debug!("pss: {} replenished, back to prio {}", nk.threads[id].name, normal);
                nk.change_prio(id, normal);
                nk.set_resched(cpu);
            }
        }
    }

    fn setparam(&self, thread: &mut Thread, param: &PolicyParam) {
        if let PolicyParam::Sporadic(p) = *param {
            thread.pss = Some(Box::new(PssThread::new(p)));
            thread.cprio = p.normal_prio;
        }
    }

    /// 被继承提升进本类的线程没有 server 状态，只报告当前优先级
    fn getparam(&self, thread: &Thread) -> PolicyParam {
        let mut param = match thread.pss.as_deref() {
            Some(pss) => pss.param,
            None => PssParam::new(thread.cprio, thread.cprio, 0, 0, 0),
        };
        param.current_prio = thread.cprio;
        PolicyParam::Sporadic(param)
    }

    fn trackprio(&self, thread: &mut Thread, param: Option<&PolicyParam>) {
        thread.cprio = match param {
            Some(p) => p.prio(),
            None => {
                let pss = Self::pss(thread);
                if pss.dropped {
                    pss.param.low_prio
                } else {
                    pss.param.normal_prio
                }
            }
        };
    }

    fn declare(&self, _thread: &mut Thread, param: &PolicyParam) -> Result<(), Errno> {
        match param {
            PolicyParam::Sporadic(p) => p.validate(),
            _ => Err(Errno::InvalidArgument),
        }
    }

    fn forget(&self, thread: &mut Thread) {
        thread.pss = None;
    }
}
