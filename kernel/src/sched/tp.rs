//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! tp 调度类（时间分区）
//!
//! 每个 CPU 一张全局分区调度表：主帧 (major frame) 被切成若干时间窗，
//! 每个时间窗激活一个分区（或不激活任何分区）。
//! 只有当前激活分区里的线程能被 pick，分区内按 rt 规则调度。
//!
//! 分区调度表是 CPU 私有的，线程迁移到别的 CPU 时转入 rt 类。

use alloc::vec::Vec;

use crate::config::{RT_MAX_PRIO, RT_MIN_PRIO, TP_NR_PART};
use crate::errno::Errno;
use crate::process::pod::Nucleus;
use crate::process::thread::{Thread, ThreadId};
use crate::process::timer::Ticks;
use crate::sched::class::{class_weight, ClassId, PolicyParam, SchedClass, SCHED_TP};
use crate::sched::queue::SchedQueue;

/// 时间窗
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TpWindow {
    /// 相对主帧起点的偏移
    pub offset: Ticks,
    /// 激活的分区，None 表示空闲窗
    pub ptid: Option<usize>,
}

/// 分区调度表
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpSchedule {
    pub major_frame: Ticks,
    pub windows: Vec<TpWindow>,
}

impl TpSchedule {
    /// 第一个窗必须从 0 开始，偏移严格递增且落在主帧内
    pub fn validate(&self) -> Result<(), Errno> {
        if self.major_frame == 0 || self.windows.is_empty() || self.windows[0].offset != 0 {
            return Err(Errno::InvalidArgument);
        }
        let mut prev: Option<Ticks> = None;
        for w in &self.windows {
            if w.offset >= self.major_frame || prev.map_or(false, |p| w.offset <= p) {
                return Err(Errno::InvalidArgument);
            }
            if w.ptid.map_or(false, |ptid| ptid >= TP_NR_PART) {
                return Err(Errno::InvalidArgument);
            }
            prev = Some(w.offset);
        }
        Ok(())
    }

    /// 主帧内位置 `pos` 所在的时间窗
    fn window_at(&self, pos: Ticks) -> usize {
        self.windows
            .iter()
            .rposition(|w| w.offset <= pos)
            .unwrap_or(0)
    }
}

/// 每 CPU 的 tp 上下文
pub struct TpSched {
    partitions: Vec<SchedQueue>,
    gps: Option<TpSchedule>,
    running: bool,
    /// 主帧内位置
    pos: Ticks,
    /// 当前时间窗下标
    window: usize,
}

impl TpSched {
    pub fn new() -> Self {
        Self {
            partitions: (0..TP_NR_PART)
                .map(|_| SchedQueue::new(RT_MIN_PRIO, RT_MAX_PRIO))
                .collect(),
            gps: None,
            running: false,
            pos: 0,
            window: 0,
        }
    }

    /// 当前激活的分区
    pub fn active_partition(&self) -> Option<usize> {
        if !self.running {
            return None;
        }
        self.gps.as_ref().and_then(|gps| gps.windows[self.window].ptid)
    }

    fn partition_of(thread: &Thread) -> usize {
        match thread.tps {
            Some(ptid) => ptid,
            None => {
                log::error!("tp: {} has no partition", thread.name);
                panic!("tp: queueing a thread without partition");
            }
        }
    }
}

impl Default for TpSched {
    fn default() -> Self {
        Self::new()
    }
}

pub struct TpClass;

pub static TP_CLASS: TpClass = TpClass;

impl SchedClass for TpClass {
    fn id(&self) -> ClassId {
        ClassId::Tp
    }

    fn name(&self) -> &'static str {
        "tp"
    }

    fn policy(&self) -> i32 {
        SCHED_TP
    }

    fn weight(&self) -> i32 {
        class_weight(2)
    }

    fn sched_init(&self, sched: &mut crate::sched::sched::Sched) {
        sched.tp = TpSched::new();
    }

    fn enqueue(&self, nk: &mut Nucleus, thread: ThreadId) {
        let t = &nk.threads[thread];
        let (cpu, prio, ptid) = (t.sched, t.cprio, TpSched::partition_of(t));
        nk.scheds[cpu].tp.partitions[ptid].insert_fifo(thread, prio);
    }

    fn enqueue_front(&self, nk: &mut Nucleus, thread: ThreadId) {
        let t = &nk.threads[thread];
        let (cpu, prio, ptid) = (t.sched, t.cprio, TpSched::partition_of(t));
        nk.scheds[cpu].tp.partitions[ptid].insert_lifo(thread, prio);
    }

    fn dequeue(&self, nk: &mut Nucleus, thread: ThreadId) {
        let t = &nk.threads[thread];
        let (cpu, prio, ptid) = (t.sched, t.cprio, TpSched::partition_of(t));
        if nk.scheds[cpu].tp.partitions[ptid].remove(thread, prio).is_err() {
            log::error!("tp: {} not on cpu{} partition {}", t.name, cpu, ptid);
            panic!("tp: dequeue of unqueued thread");
        }
    }

    fn pick(&self, nk: &mut Nucleus, cpu: usize) -> Option<ThreadId> {
        let tp = &mut nk.scheds[cpu].tp;
        let ptid = tp.active_partition()?;
        tp.partitions[ptid].pick_highest()
    }

    /// 推进时间窗，分区切换时请求重新调度
    fn sched_tick(&self, nk: &mut Nucleus, cpu: usize) {
        let tp = &mut nk.scheds[cpu].tp;
        if !tp.running {
            return;
        }
        let gps = match tp.gps.as_ref() {
            Some(gps) => gps,
            None => return,
        };
        tp.pos = (tp.pos + 1) % gps.major_frame;
        let window = gps.window_at(tp.pos);
        if window != tp.window {
            tp.window = window;
            log::trace!("tp: cpu{} switches to window {} ({:?})", cpu, window, gps.windows[window].ptid);
            nk.set_self_resched(cpu);
        }
    }

    /// 分区调度表是 CPU 私有的，迁移后改按 rt 类调度
    ///
    /// 基础调度类是 tp 时按基础优先级改成 rt 线程（set_policy 会重新评估提升）；
    /// 只是被继承提升进 tp 时，有效参数换成同优先级的 rt，基础参数不变。
    fn migrate(&self, nk: &mut Nucleus, thread: ThreadId, _cpu: usize) {
        let t = &nk.threads[thread];
        if t.base_class() == ClassId::Tp {
            let prio = t.bprio;
            if let Err(e) = nk.set_policy(thread, ClassId::Rt, &PolicyParam::Rt { prio }) {
                log::warn!("tp: cannot move {} to rt on migration: {:?}", nk.threads[thread].name, e);
            }
        } else if t.sched_class == ClassId::Tp {
            let param = PolicyParam::Rt { prio: t.cprio };
            let t = &mut nk.threads[thread];
            t.sched_class = ClassId::Rt;
            t.tps = None;
            ClassId::Rt.ops().trackprio(t, Some(&param));
            nk.recompute_wprio(thread);
        }
    }

    fn setparam(&self, thread: &mut Thread, param: &PolicyParam) {
        if let PolicyParam::Tp { ptid, .. } = *param {
            thread.tps = Some(ptid);
        }
        thread.cprio = param.prio();
    }

    fn getparam(&self, thread: &Thread) -> PolicyParam {
        PolicyParam::Tp {
            prio: thread.cprio,
            ptid: thread.tps.unwrap_or(0),
        }
    }

    /// 继承提升不改变已分配的分区，只改优先级
    fn trackprio(&self, thread: &mut Thread, param: Option<&PolicyParam>) {
        match param {
            Some(p) => {
                if let (None, PolicyParam::Tp { ptid, .. }) = (thread.tps, *p) {
                    thread.tps = Some(ptid);
                }
                thread.cprio = p.prio();
            }
            None => thread.cprio = thread.bprio,
        }
    }

    fn declare(&self, _thread: &mut Thread, param: &PolicyParam) -> Result<(), Errno> {
        match *param {
            PolicyParam::Tp { prio, ptid }
                if ptid < TP_NR_PART && (RT_MIN_PRIO..=RT_MAX_PRIO).contains(&prio) =>
            {
                Ok(())
            }
            _ => Err(Errno::InvalidArgument),
        }
    }

    fn forget(&self, thread: &mut Thread) {
        thread.tps = None;
    }
}

impl Nucleus {
    /// 安装分区调度表（会先停止当前调度表）
    pub(crate) fn tp_install(&mut self, cpu: usize, gps: TpSchedule) -> Result<(), Errno> {
        gps.validate()?;
        let tp = &mut self.scheds[cpu].tp;
        tp.running = false;
        tp.pos = 0;
        tp.window = 0;
        log::debug!("tp: cpu{} installs {} window(s), frame {}", cpu, gps.windows.len(), gps.major_frame);
        tp.gps = Some(gps);
        self.set_self_resched(cpu);
        Ok(())
    }

    /// 从主帧起点开始执行调度表
    pub(crate) fn tp_start(&mut self, cpu: usize) -> Result<(), Errno> {
        let tp = &mut self.scheds[cpu].tp;
        if tp.gps.is_none() {
            return Err(Errno::InvalidArgument);
        }
        tp.running = true;
        tp.pos = 0;
        tp.window = 0;
        self.set_self_resched(cpu);
        Ok(())
    }

    pub(crate) fn tp_stop(&mut self, cpu: usize) {
        self.scheds[cpu].tp.running = false;
        self.set_self_resched(cpu);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_validation() {
        let ok = TpSchedule {
            major_frame: 10,
            windows: alloc::vec![
                TpWindow { offset: 0, ptid: Some(0) },
                TpWindow { offset: 4, ptid: Some(1) },
                TpWindow { offset: 8, ptid: None },
            ],
        };
        assert_eq!(ok.validate(), Ok(()));
        assert_eq!(ok.window_at(0), 0);
        assert_eq!(ok.window_at(5), 1);
        assert_eq!(ok.window_at(9), 2);

        let not_from_zero = TpSchedule {
            major_frame: 10,
            windows: alloc::vec![TpWindow { offset: 2, ptid: Some(0) }],
        };
        assert_eq!(not_from_zero.validate(), Err(Errno::InvalidArgument));

        let bad_ptid = TpSchedule {
            major_frame: 10,
            windows: alloc::vec![TpWindow { offset: 0, ptid: Some(TP_NR_PART) }],
        };
        assert_eq!(bad_ptid.validate(), Err(Errno::InvalidArgument));

        let unordered = TpSchedule {
            major_frame: 10,
            windows: alloc::vec![
                TpWindow { offset: 0, ptid: Some(0) },
                TpWindow { offset: 0, ptid: Some(1) },
            ],
        };
        assert_eq!(unordered.validate(), Err(Errno::InvalidArgument));
    }
}
