//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 每 CPU 调度器
//!
//! 每个 CPU 一个 `Sched`：根线程、当前线程、状态位、各调度类的运行队列、
//! 待重调度的远端 CPU 掩码、僵尸队列。
//!
//! 调度入口：schedule() -> pick_next() -> 切换 curr -> finalize_zombie()
//!
//! 宿主机模型下不做真正的寄存器上下文切换：切换就是在 nklock 下改写
//! `curr`，并把 (prev, next) 报告给调用者。
//!
//! 重调度请求协议：
//! - 目标是本 CPU：只置本地 RESCHED 位
//! - 目标是远端 CPU：在本 CPU 的 resched 掩码里标记目标、置目标和本 CPU 的
//!   RESCHED 位；本 CPU 下次 schedule() 时向掩码中的 CPU 发 IPI

use alloc::vec::Vec;
use bitflags::bitflags;

use crate::config::{RT_MAX_PRIO, RT_MIN_PRIO};
#[cfg(feature = "watchdog")]
use crate::config::WATCHDOG_TICKS;
#[cfg(feature = "sched-weak")]
use crate::config::WEAK_MAX_PRIO;
use crate::errno::Errno;
use crate::process::pod::Nucleus;
use crate::process::thread::{ThreadId, ThreadState, BLOCK_BITS};
#[cfg(feature = "watchdog")]
use crate::process::thread::ThreadInfo;
#[cfg(feature = "watchdog")]
use crate::process::timer::Deadline;
use crate::sched::class::{tick_allowed, ClassId, PolicyParam};
use crate::sched::queue::SchedQueue;
use crate::sched::registry;
use crate::smp::CpuSet;
#[cfg(feature = "smp")]
use crate::smp::CpuMask;
#[cfg(feature = "sched-tp")]
use crate::sched::tp::TpSched;
#[cfg(feature = "sched-sporadic")]
use crate::sched::sporadic::PssSched;

bitflags! {
    /// 调度器状态位
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SchedStatus: u32 {
        /// 需要重新调度
        const RESCHED = 0x1000_0000;
        /// 正在切换
        const INSW    = 0x2000_0000;
        /// 正在处理时钟滴答
        const INTCK   = 0x4000_0000;
    }
}

bitflags! {
    /// 调度器本地标志，只由本 CPU 读写
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SchedLflags: u32 {
        /// 有待转发给宿主的时钟滴答
        const HTICK  = 0x8000;
        /// 在中断上下文中
        const INIRQ  = 0x4000;
        /// 当前线程持有调度锁
        const INLOCK = 0x1000;
    }
}

/// 一次上下文切换
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Switch {
    pub cpu: usize,
    pub prev: ThreadId,
    pub next: ThreadId,
}

/// 每 CPU 调度器
pub struct Sched {
    pub cpu: usize,
    pub(crate) status: SchedStatus,
    pub(crate) lflags: SchedLflags,
    /// 当前线程
    pub(crate) curr: ThreadId,
    /// 根线程（idle 类）
    pub(crate) root: ThreadId,
    /// 上一次被切换出去的线程
    pub(crate) last: Option<ThreadId>,
    /// 中断嵌套层数
    pub(crate) inesting: u32,
    /// 需要 IPI 通知的远端 CPU
    #[cfg(feature = "smp")]
    pub(crate) resched: CpuMask,
    pub(crate) rt: SchedQueue,
    #[cfg(feature = "sched-weak")]
    pub(crate) weak: SchedQueue,
    #[cfg(feature = "sched-tp")]
    pub(crate) tp: TpSched,
    #[cfg(feature = "sched-sporadic")]
    pub(crate) pss: PssSched,
    /// 切换完成后待回收的线程
    pub(crate) zombie: Vec<ThreadId>,
    pub(crate) fpuholder: Option<ThreadId>,
    #[cfg(feature = "watchdog")]
    pub(crate) wdcount: u32,
    pub(crate) nr_switches: u64,
    pub(crate) htick_relayed: u64,
}

impl Sched {
    pub(crate) fn new(cpu: usize, root: ThreadId) -> Self {
        Self {
            cpu,
            status: SchedStatus::empty(),
            lflags: SchedLflags::empty(),
            curr: root,
            root,
            last: None,
            inesting: 0,
            #[cfg(feature = "smp")]
            resched: CpuMask::new(),
            rt: SchedQueue::new(RT_MIN_PRIO, RT_MAX_PRIO),
            #[cfg(feature = "sched-weak")]
            weak: SchedQueue::new(0, WEAK_MAX_PRIO),
            #[cfg(feature = "sched-tp")]
            tp: TpSched::new(),
            #[cfg(feature = "sched-sporadic")]
            pss: PssSched::new(),
            zombie: Vec::new(),
            fpuholder: None,
            #[cfg(feature = "watchdog")]
            wdcount: 0,
            nr_switches: 0,
            htick_relayed: 0,
        }
    }

    pub(crate) fn stats(&self) -> SchedStats {
        SchedStats {
            cpu: self.cpu,
            curr: self.curr,
            last: self.last,
            status: self.status,
            lflags: self.lflags,
            inesting: self.inesting,
            #[cfg(feature = "smp")]
            resched: self.resched.snapshot(),
            #[cfg(not(feature = "smp"))]
            resched: CpuSet::empty(),
            fpuholder: self.fpuholder,
            nr_switches: self.nr_switches,
            htick_relayed: self.htick_relayed,
        }
    }
}

/// 调度器快照（只读检视）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedStats {
    pub cpu: usize,
    pub curr: ThreadId,
    pub last: Option<ThreadId>,
    pub status: SchedStatus,
    pub lflags: SchedLflags,
    pub inesting: u32,
    pub resched: CpuSet,
    pub fpuholder: Option<ThreadId>,
    pub nr_switches: u64,
    pub htick_relayed: u64,
}

impl Nucleus {
    /// 初始化一个 CPU 的调度器：创建根线程，运行各调度类的每 CPU 初始化
    pub(crate) fn sched_init(&mut self, cpu: usize) -> Result<(), Errno> {
        let root = self.create_root_thread(cpu)?;
        let mut sched = Sched::new(cpu, root);
        for class in registry::classes() {
            class.sched_init(&mut sched);
        }
        debug_assert_eq!(self.scheds.len(), cpu);
        self.scheds.push(sched);
        log::debug!("sched: cpu{} initialized", cpu);
        Ok(())
    }

    /// 销毁一个 CPU 的调度器
    ///
    /// 调用时该 CPU 上除根线程外不能再有线程。
    pub(crate) fn sched_destroy(&mut self, cpu: usize) {
        self.finalize_zombie(cpu);
        let root = self.scheds[cpu].root;
        let live: Vec<ThreadId> = self
            .threads
            .iter()
            .filter(|(id, t)| t.sched == cpu && *id != root)
            .map(|(id, _)| id)
            .collect();
        assert!(
            live.is_empty(),
            "sched: destroying cpu{} with {} live thread(s)",
            cpu,
            live.len()
        );
        self.forget(root);
        self.threads.remove(root);
        log::debug!("sched: cpu{} destroyed", cpu);
    }

    // ============================================================
    // 重调度请求
    // ============================================================

    #[inline]
    pub(crate) fn set_self_resched(&mut self, cpu: usize) {
        self.scheds[cpu].status.insert(SchedStatus::RESCHED);
    }

    /// 请求 `cpu` 重新调度，请求方是 `self.this_cpu`
    pub(crate) fn set_resched(&mut self, cpu: usize) {
        let from = self.this_cpu;
        if cpu == from {
            self.set_self_resched(cpu);
            return;
        }
        #[cfg(feature = "smp")]
        {
            if !self.scheds[cpu].status.contains(SchedStatus::RESCHED) {
                self.scheds[from].resched.set(cpu);
                self.scheds[cpu].status.insert(SchedStatus::RESCHED);
                self.scheds[from].status.insert(SchedStatus::RESCHED);
            }
        }
        #[cfg(not(feature = "smp"))]
        self.set_self_resched(cpu);
    }

    #[inline]
    pub(crate) fn resched_p(&self, cpu: usize) -> bool {
        self.scheds[cpu].status.contains(SchedStatus::RESCHED)
    }

    // ============================================================
    // 调度类分发（idle 类从不入队）
    // ============================================================

    pub(crate) fn enqueue(&mut self, thread: ThreadId) {
        let class = self.threads[thread].sched_class;
        if class != ClassId::Idle {
            class.ops().enqueue(self, thread);
        }
    }

    pub(crate) fn enqueue_front(&mut self, thread: ThreadId) {
        let class = self.threads[thread].sched_class;
        if class != ClassId::Idle {
            class.ops().enqueue_front(self, thread);
        }
    }

    pub(crate) fn dequeue(&mut self, thread: ThreadId) {
        let class = self.threads[thread].sched_class;
        if class != ClassId::Idle {
            class.ops().dequeue(self, thread);
        }
    }

    pub(crate) fn requeue(&mut self, thread: ThreadId) {
        let class = self.threads[thread].sched_class;
        if class != ClassId::Idle {
            class.ops().requeue(self, thread);
        }
    }

    /// 基础调度类成员数减一并释放类私有资源
    pub(crate) fn forget(&mut self, thread: ThreadId) {
        let class = self.threads[thread].base_class();
        self.nthreads[class.index()] -= 1;
        class.ops().forget(&mut self.threads[thread]);
    }

    #[inline]
    pub(crate) fn recompute_wprio(&mut self, thread: ThreadId) {
        let t = &mut self.threads[thread];
        t.wprio = t.cprio + t.sched_class.ops().weight();
    }

    /// 修改当前优先级并保持队列位置一致（队尾）
    pub(crate) fn change_prio(&mut self, thread: ThreadId, prio: i32) {
        let ready = self.threads[thread].state.contains(ThreadState::READY);
        if ready {
            self.dequeue(thread);
        }
        self.threads[thread].cprio = prio;
        self.recompute_wprio(thread);
        if ready {
            self.enqueue(thread);
        }
    }

    // ============================================================
    // 分发入口
    // ============================================================

    /// 选出下一个要运行的线程
    ///
    /// 当前线程仍可运行时先插回所在优先级的队首，再按权重从高到低
    /// 询问各调度类。idle 类总能给出根线程。
    pub(crate) fn pick_next(&mut self, cpu: usize) -> ThreadId {
        let curr = self.scheds[cpu].curr;
        let (state, home) = {
            let t = &self.threads[curr];
            (t.state, t.sched)
        };

        if !state.intersects(BLOCK_BITS | ThreadState::ZOMBIE) && home == cpu {
            if state.contains(ThreadState::LOCK) {
                // 持有调度锁：不抢占，解锁时再调度
                if state.contains(ThreadState::READY) {
                    self.dequeue(curr);
                    self.threads[curr].state.remove(ThreadState::READY);
                }
                self.set_self_resched(cpu);
                return curr;
            }
            if !state.contains(ThreadState::READY) {
                self.enqueue_front(curr);
                self.threads[curr].state.insert(ThreadState::READY);
            }
        }

        for class in registry::classes() {
            if let Some(next) = class.pick(self, cpu) {
                self.threads[next].state.remove(ThreadState::READY);
                return next;
            }
        }

        log::error!("sched: cpu{} has no runnable thread", cpu);
        panic!("sched: idle fallback missing on cpu{}", cpu);
    }

    /// 把线程放回所属调度类的队尾，并请求其 CPU 重新调度
    pub(crate) fn putback(&mut self, thread: ThreadId) {
        if self.threads[thread].state.contains(ThreadState::READY) {
            self.requeue(thread);
        } else {
            self.threads[thread].state.insert(ThreadState::READY);
            self.enqueue(thread);
        }
        let cpu = self.threads[thread].sched;
        self.set_resched(cpu);
    }

    /// 设置线程的调度类和参数
    ///
    /// 先在新类上 declare（失败则什么都不改），再出队、forget 旧类、
    /// setparam、按需入队。被继承提升的线程在更新基础参数后重新评估提升。
    pub(crate) fn set_policy(
        &mut self,
        thread: ThreadId,
        class: ClassId,
        param: &PolicyParam,
    ) -> Result<(), Errno> {
        let ops = class.ops();
        let old_base = self.threads[thread].base_class;

        ops.declare(&mut self.threads[thread], param)?;
        if old_base != Some(class) {
            self.nthreads[class.index()] += 1;
        }

        let state = self.threads[thread].state;
        let ready = state.contains(ThreadState::READY);
        if let Some(old) = old_base {
            if ready {
                self.dequeue(thread);
            }
            if old != class {
                self.forget(thread);
            }
        }

        let t = &mut self.threads[thread];
        t.sched_class = class;
        t.base_class = Some(class);
        ops.setparam(t, param);
        t.bprio = t.cprio;
        t.wprio = t.cprio + ops.weight();
        let cpu = t.sched;
        log::debug!("sched: {} -> class {} prio {}", t.name, ops.name(), t.cprio);

        if ready {
            self.enqueue(thread);
        }
        if state.contains(ThreadState::BOOST) || !self.threads[thread].claimq.is_empty() {
            // 只要还有等待者高于新的基础优先级，提升继续有效
            self.adjust_boost(thread);
        }
        if state.contains(ThreadState::STARTED) {
            self.set_resched(cpu);
        }
        Ok(())
    }

    /// 让线程采用 `target` 的有效调度类和优先级；`target == thread` 时恢复基础参数
    pub(crate) fn track_policy(&mut self, thread: ThreadId, target: ThreadId) {
        let ready = self.threads[thread].state.contains(ThreadState::READY);
        if ready {
            self.dequeue(thread);
        }

        if target == thread {
            let t = &mut self.threads[thread];
            t.sched_class = t.base_class();
            let ops = t.sched_class.ops();
            ops.trackprio(t, None);
        } else {
            let (class, param) = {
                let tt = &self.threads[target];
                (tt.sched_class, tt.sched_class.ops().getparam(tt))
            };
            let t = &mut self.threads[thread];
            t.sched_class = class;
            class.ops().trackprio(t, Some(&param));
        }
        self.recompute_wprio(thread);

        if ready {
            self.enqueue(thread);
        }
        let t = &self.threads[thread];
        log::trace!("sched: {} tracks class {} prio {}", t.name, t.sched_class.name(), t.cprio);
        let cpu = t.sched;
        self.set_resched(cpu);
    }

    fn migrate_thread(&mut self, thread: ThreadId, cpu: usize) {
        if self.threads[thread].state.contains(ThreadState::READY) {
            self.dequeue(thread);
            self.threads[thread].state.remove(ThreadState::READY);
        }
        // 迁移钩子可能改变线程的调度类：先按基础调度类处理，
        // 被提升进别的类时再由有效调度类处理
        let base = self.threads[thread].base_class();
        base.ops().migrate(self, thread, cpu);
        let effective = self.threads[thread].sched_class;
        if effective != self.threads[thread].base_class() {
            effective.ops().migrate(self, thread, cpu);
        }

        let old = self.threads[thread].sched;
        self.set_resched(old);
        self.threads[thread].sched = cpu;
        log::debug!("sched: {} migrated cpu{} -> cpu{}", self.threads[thread].name, old, cpu);
    }

    /// 迁移正在运行的线程：到目标 CPU 的队尾
    pub(crate) fn migrate(&mut self, thread: ThreadId, cpu: usize) {
        self.migrate_thread(thread, cpu);
        if !self.threads[thread].is_blocked() {
            self.putback(thread);
        }
    }

    /// 迁移未在运行的线程：可运行时保持队首位置
    pub(crate) fn migrate_passive(&mut self, thread: ThreadId, cpu: usize) {
        self.migrate_thread(thread, cpu);
        if !self.threads[thread].is_blocked() {
            self.enqueue_front(thread);
            self.threads[thread].state.insert(ThreadState::READY);
            self.set_resched(cpu);
        }
    }

    pub(crate) fn rotate(&mut self, cpu: usize, class: ClassId, param: &PolicyParam) {
        class.ops().rotate(self, cpu, param);
    }

    // ============================================================
    // 切换
    // ============================================================

    /// 重新调度 `cpu`
    ///
    /// 中断嵌套中推迟到最外层 irq_exit；没有 RESCHED 时什么都不做。
    pub(crate) fn schedule(&mut self, cpu: usize) -> Option<Switch> {
        if self.scheds[cpu].inesting > 0 || !self.resched_p(cpu) {
            return None;
        }
        self.scheds[cpu].status.remove(SchedStatus::RESCHED);
        #[cfg(feature = "smp")]
        {
            let ipis = self.scheds[cpu].resched.take();
            self.outbox = self.outbox.union(ipis);
        }

        self.scheds[cpu].status.insert(SchedStatus::INSW);
        let prev = self.scheds[cpu].curr;
        let next = self.pick_next(cpu);

        if next == prev {
            self.scheds[cpu].status.remove(SchedStatus::INSW);
            if self.threads[prev].is_root() {
                self.relay_htick(cpu);
            }
            return None;
        }

        if self.threads[prev].state.contains(ThreadState::ZOMBIE) {
            self.scheds[cpu].zombie.push(prev);
        }

        let next_state = self.threads[next].state;
        let sched = &mut self.scheds[cpu];
        sched.last = Some(prev);
        sched.curr = next;
        sched.nr_switches += 1;
        sched.lflags.set(SchedLflags::INLOCK, next_state.contains(ThreadState::LOCK));
        if next_state.contains(ThreadState::FPU) {
            sched.fpuholder = Some(next);
        }
        if next_state.contains(ThreadState::ROOT) {
            #[cfg(feature = "watchdog")]
            {
                sched.wdcount = 0;
            }
            self.relay_htick(cpu);
        }
        self.scheds[cpu].status.remove(SchedStatus::INSW);

        log::trace!(
            "sched: cpu{} switch {} -> {}",
            cpu,
            self.threads.get(prev).map_or("<zombie>", |t| t.name.as_str()),
            self.threads[next].name
        );

        self.finalize_zombie(cpu);
        Some(Switch { cpu, prev, next })
    }

    /// 回收切换出去的僵尸线程
    pub(crate) fn finalize_zombie(&mut self, cpu: usize) {
        let zombies = core::mem::take(&mut self.scheds[cpu].zombie);
        for zombie in zombies {
            self.release_thread(zombie);
        }
    }

    /// 宿主时钟滴答在根线程恢复运行时转发
    fn relay_htick(&mut self, cpu: usize) {
        let sched = &mut self.scheds[cpu];
        if sched.lflags.contains(SchedLflags::HTICK) {
            sched.lflags.remove(SchedLflags::HTICK);
            sched.htick_relayed += 1;
        }
    }

    /// 一个 CPU 的时钟滴答处理（已在中断上下文中）
    pub(crate) fn sched_tick(&mut self, cpu: usize) {
        let curr = self.scheds[cpu].curr;

        if self.threads[curr].is_root() {
            self.scheds[cpu].htick_relayed += 1;
        } else {
            self.scheds[cpu].lflags.insert(SchedLflags::HTICK);
        }

        if tick_allowed(&self.threads[curr]) {
            let class = self.threads[curr].sched_class;
            class.ops().tick(self, curr);
        }

        for class in registry::classes() {
            class.sched_tick(self, cpu);
        }

        #[cfg(feature = "watchdog")]
        self.watchdog_tick(cpu);
    }

    /// 实时线程连续占用 CPU 超过阈值时将其挂起
    #[cfg(feature = "watchdog")]
    fn watchdog_tick(&mut self, cpu: usize) {
        let curr = self.scheds[cpu].curr;
        if self.threads[curr].is_root() {
            self.scheds[cpu].wdcount = 0;
            return;
        }
        self.scheds[cpu].wdcount += 1;
        if self.scheds[cpu].wdcount < WATCHDOG_TICKS {
            return;
        }
        self.scheds[cpu].wdcount = 0;
        log::warn!(
            "watchdog triggered on cpu{}: runaway thread {} suspended",
            cpu,
            self.threads[curr].name
        );
        self.threads[curr].info.insert(ThreadInfo::KICKED);
        self.suspend_thread(curr, ThreadState::SUSP, Deadline::Never, None);
    }
}
