//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 实时核心 (Pod)
//!
//! 所有调度状态集中在一个 `Nucleus` 里，由一把全局自旋锁 nklock 保护：
//! 线程表、每 CPU 调度器、同步对象表、超时定时器、时钟。
//!
//! `Pod` 是对外接口：每个操作都带上发起操作的 CPU 编号，在 nklock 下执行，
//! 解锁后再把积攒的重调度 IPI 发出去。
//!
//! 线程之间、线程与同步对象之间只通过句柄互相引用，
//! 跨对象的修改都在 `impl Nucleus` 里完成。

use alloc::format;
use alloc::vec::Vec;
use spin::Mutex;

use crate::collection::Slab;
use crate::config::{DEFAULT_RR_QUANTUM, KERNEL_NAME, KERNEL_VERSION, MAX_CPUS};
use crate::errno::Errno;
use crate::process::thread::{
    Thread, ThreadAttr, ThreadId, ThreadInfo, ThreadSnapshot, ThreadState, BLOCK_BITS,
};
use crate::process::timer::{Deadline, Ticks, Timeout, TimerQueue};
use crate::sched::class::{ClassId, PolicyParam, IDLE_PRIO, NR_CLASSES};
use crate::sched::registry;
use crate::sched::sched::{SchedLflags, SchedStats, SchedStatus, Switch};
#[cfg(feature = "sched-tp")]
use crate::sched::tp::TpSchedule;
use crate::smp::{CpuSet, IpiMailbox};
use crate::sync::synch::{Synch, SynchId};

/// nklock 保护的全部核心状态
pub struct Nucleus {
    pub(crate) threads: Slab<ThreadId, Thread>,
    pub(crate) scheds: Vec<crate::sched::sched::Sched>,
    pub(crate) synchs: Slab<SynchId, Synch>,
    pub(crate) timers: TimerQueue,
    /// 单调时钟（由 cpu0 的时钟滴答推进）
    pub(crate) clock: Ticks,
    /// 各调度类的成员数（按基础调度类计）
    pub(crate) nthreads: [i32; NR_CLASSES],
    /// 持锁期间发起操作的 CPU
    pub(crate) this_cpu: usize,
    /// 解锁后要发送重调度 IPI 的 CPU
    pub(crate) outbox: CpuSet,
}

impl Nucleus {
    fn new() -> Self {
        Self {
            threads: Slab::new(),
            scheds: Vec::new(),
            synchs: Slab::new(),
            timers: TimerQueue::new(),
            clock: 0,
            nthreads: [0; NR_CLASSES],
            this_cpu: 0,
            outbox: CpuSet::empty(),
        }
    }

    #[inline]
    pub(crate) fn nr_cpus(&self) -> usize {
        self.scheds.len()
    }

    fn check_thread(&self, thread: ThreadId) -> Result<(), Errno> {
        if self.threads.contains(thread) {
            Ok(())
        } else {
            Err(Errno::NoSuchProcess)
        }
    }

    /// 根线程不接受外部的状态和调度参数修改
    fn check_user_thread(&self, thread: ThreadId) -> Result<(), Errno> {
        self.check_thread(thread)?;
        if self.threads[thread].is_root() {
            return Err(Errno::InvalidArgument);
        }
        Ok(())
    }

    // ============================================================
    // 线程生命周期
    // ============================================================

    /// 创建某个 CPU 的根线程（idle 类，创建即运行）
    pub(crate) fn create_root_thread(&mut self, cpu: usize) -> Result<ThreadId, Errno> {
        let mut thread = Thread::new(
            format!("root{}", cpu),
            cpu,
            CpuSet::only(cpu),
            ThreadState::ROOT | ThreadState::STARTED,
        );
        let ops = ClassId::Idle.ops();
        ops.init_thread(&mut thread);
        thread.sched_class = ClassId::Idle;
        thread.base_class = Some(ClassId::Idle);
        ops.setparam(&mut thread, &PolicyParam::Idle { prio: IDLE_PRIO });
        thread.bprio = thread.cprio;
        thread.wprio = thread.cprio + ops.weight();

        let id = self.threads.insert(thread).map_err(|_| Errno::OutOfMemory)?;
        self.nthreads[ClassId::Idle.index()] += 1;
        Ok(id)
    }

    /// 创建线程，初始为 DORMANT
    pub(crate) fn create_thread(&mut self, attr: ThreadAttr) -> Result<ThreadId, Errno> {
        if attr.cpu >= self.nr_cpus() || !attr.affinity.contains(attr.cpu) {
            return Err(Errno::InvalidArgument);
        }
        if attr.class == ClassId::Idle {
            return Err(Errno::InvalidArgument);
        }

        let mut state = ThreadState::DORMANT;
        if attr.fpu {
            state |= ThreadState::FPU;
        }
        let mut thread = Thread::new(attr.name, attr.cpu, attr.affinity, state);
        thread.rrperiod = DEFAULT_RR_QUANTUM;
        thread.rrcredit = DEFAULT_RR_QUANTUM;
        attr.class.ops().init_thread(&mut thread);

        let id = self.threads.insert(thread).map_err(|_| Errno::OutOfMemory)?;
        if let Err(e) = self.set_policy(id, attr.class, &attr.param) {
            self.threads.remove(id);
            return Err(e);
        }
        log::debug!("nucleus: thread {} created on cpu{}", self.threads[id].name, attr.cpu);
        Ok(id)
    }

    pub(crate) fn start_thread(&mut self, thread: ThreadId) -> Result<(), Errno> {
        if !self.threads[thread].state.contains(ThreadState::DORMANT) {
            return Err(Errno::DeviceOrResourceBusy);
        }
        self.threads[thread].state.insert(ThreadState::STARTED);
        self.resume_thread(thread, ThreadState::DORMANT);
        log::debug!("nucleus: thread {} started", self.threads[thread].name);
        Ok(())
    }

    /// 给线程加上阻塞位
    ///
    /// 等待类的阻塞（PEND/DELAY）先清除上一次等待的结果位；
    /// 超时已经过期时不阻塞，直接置 TIMEO 并返回 false。
    pub(crate) fn suspend_thread(
        &mut self,
        thread: ThreadId,
        mask: ThreadState,
        deadline: Deadline,
        wchan: Option<SynchId>,
    ) -> bool {
        let waiting = mask.intersects(ThreadState::PEND | ThreadState::DELAY);
        {
            let t = &mut self.threads[thread];
            if waiting {
                t.info.remove(ThreadInfo::WAIT_OUTCOME);
                if deadline == Deadline::Expired {
                    t.info.insert(ThreadInfo::TIMEO);
                    return false;
                }
            }
        }

        if self.threads[thread].state.contains(ThreadState::READY) {
            self.dequeue(thread);
            self.threads[thread].state.remove(ThreadState::READY);
        }

        let t = &mut self.threads[thread];
        t.state.insert(mask);
        if wchan.is_some() {
            t.wchan = wchan;
        }
        if let Deadline::At(date) = deadline {
            t.state.insert(ThreadState::DELAY);
            t.rtimer = Some(date);
            self.timers.arm(date, thread);
        }
        let cpu = self.threads[thread].sched;
        log::trace!(
            "nucleus: {} suspended {:?}",
            self.threads[thread].name,
            self.threads[thread].state
        );
        if self.scheds[cpu].curr == thread {
            self.set_resched(cpu);
        }
        true
    }

    fn cancel_rtimer(&mut self, thread: ThreadId) {
        if let Some(date) = self.threads[thread].rtimer.take() {
            self.timers.cancel(date, thread);
        }
    }

    /// 清除线程的阻塞位，全部清除后放回运行队列
    ///
    /// - 清 PEND（得到资源、被唤醒）时一并取消等待超时
    /// - 清 DELAY 时若线程还在等待同步对象，按超时处理：从等待队列摘除
    pub(crate) fn resume_thread(&mut self, thread: ThreadId, mask: ThreadState) {
        let old = self.threads[thread].state;
        let mut mask = mask;

        if mask.contains(ThreadState::PEND) && old.contains(ThreadState::DELAY) {
            mask |= ThreadState::DELAY;
        }
        if mask.contains(ThreadState::DELAY) && old.contains(ThreadState::PEND) {
            mask |= ThreadState::PEND;
        }
        if mask.contains(ThreadState::DELAY) {
            self.cancel_rtimer(thread);
        }
        self.threads[thread].state.remove(mask);

        if mask.contains(ThreadState::PEND) && self.threads[thread].wchan.is_some() {
            self.forget_sleeper(thread);
        }

        let t = &mut self.threads[thread];
        if t.state.intersects(BLOCK_BITS | ThreadState::ZOMBIE | ThreadState::READY) {
            return;
        }
        t.state.insert(ThreadState::READY);
        let cpu = t.sched;
        log::trace!("nucleus: {} resumed", t.name);
        self.enqueue(thread);
        self.set_resched(cpu);
    }

    /// 打断线程的等待，返回线程是否确实在等待
    pub(crate) fn unblock_thread(&mut self, thread: ThreadId) -> bool {
        let state = self.threads[thread].state;
        if !state.intersects(ThreadState::PEND | ThreadState::DELAY) {
            return false;
        }
        self.threads[thread].info.insert(ThreadInfo::BREAK);
        self.resume_thread(thread, ThreadState::PEND | ThreadState::DELAY);
        true
    }

    /// 删除线程
    ///
    /// 正在运行的线程变成僵尸，切换出去后由 finalize_zombie 回收；
    /// 其它线程立即回收。
    pub(crate) fn delete_thread(&mut self, thread: ThreadId) {
        if self.threads[thread].wchan.is_some() {
            self.forget_sleeper(thread);
        }
        self.cancel_rtimer(thread);
        self.release_all_ownerships(thread);

        if self.threads[thread].state.contains(ThreadState::READY) {
            self.dequeue(thread);
        }
        let cpu = self.threads[thread].sched;
        let t = &mut self.threads[thread];
        t.state.remove(ThreadState::READY | ThreadState::BOOST);
        t.state.insert(ThreadState::ZOMBIE);
        log::debug!("nucleus: thread {} deleted", t.name);

        if self.scheds[cpu].curr == thread {
            self.set_resched(cpu);
        } else {
            self.release_thread(thread);
        }
    }

    /// 回收线程控制块
    pub(crate) fn release_thread(&mut self, thread: ThreadId) {
        self.forget(thread);
        for sched in self.scheds.iter_mut() {
            if sched.fpuholder == Some(thread) {
                sched.fpuholder = None;
            }
        }
        if let Some(t) = self.threads.remove(thread) {
            log::trace!("nucleus: {} released", t.name);
        }
    }

    /// 设置时间片；None 关闭时间片轮转
    pub(crate) fn set_rr(&mut self, thread: ThreadId, quantum: Option<Ticks>) -> Result<(), Errno> {
        let t = &mut self.threads[thread];
        match quantum {
            Some(0) => return Err(Errno::InvalidArgument),
            Some(q) => {
                t.rrperiod = q;
                t.rrcredit = q;
                t.state.insert(ThreadState::RRB);
            }
            None => t.state.remove(ThreadState::RRB),
        }
        Ok(())
    }

    // ============================================================
    // 调度锁与中断上下文
    // ============================================================

    pub(crate) fn lock_sched(&mut self, cpu: usize) {
        let curr = self.scheds[cpu].curr;
        let t = &mut self.threads[curr];
        t.lock_depth += 1;
        t.state.insert(ThreadState::LOCK);
        self.scheds[cpu].lflags.insert(SchedLflags::INLOCK);
    }

    /// 返回调度锁是否完全释放
    pub(crate) fn unlock_sched(&mut self, cpu: usize) -> Result<bool, Errno> {
        let curr = self.scheds[cpu].curr;
        let t = &mut self.threads[curr];
        if t.lock_depth == 0 {
            return Err(Errno::OperationNotPermitted);
        }
        t.lock_depth -= 1;
        if t.lock_depth > 0 {
            return Ok(false);
        }
        t.state.remove(ThreadState::LOCK);
        self.scheds[cpu].lflags.remove(SchedLflags::INLOCK);
        Ok(true)
    }

    pub(crate) fn irq_enter(&mut self, cpu: usize) {
        let sched = &mut self.scheds[cpu];
        sched.inesting += 1;
        sched.lflags.insert(SchedLflags::INIRQ);
    }

    pub(crate) fn irq_exit(&mut self, cpu: usize) {
        let sched = &mut self.scheds[cpu];
        sched.inesting = sched.inesting.saturating_sub(1);
        if sched.inesting == 0 {
            sched.lflags.remove(SchedLflags::INIRQ);
        }
    }

    /// 时钟中断
    ///
    /// cpu0 推进时钟并处理到期的超时，各 CPU 各自做调度类的周期处理。
    pub(crate) fn tick(&mut self, cpu: usize) {
        self.irq_enter(cpu);
        self.scheds[cpu].status.insert(SchedStatus::INTCK);

        if cpu == 0 {
            self.clock += 1;
            let expired = self.timers.expire(self.clock);
            for thread in expired {
                self.timeout_thread(thread);
            }
        }
        self.sched_tick(cpu);

        self.scheds[cpu].status.remove(SchedStatus::INTCK);
        self.irq_exit(cpu);
    }

    fn timeout_thread(&mut self, thread: ThreadId) {
        let Some(t) = self.threads.get_mut(thread) else {
            return;
        };
        if t.rtimer.take().is_none() {
            return;
        }
        t.info.insert(ThreadInfo::TIMEO);
        log::trace!("nucleus: {} timed out", t.name);
        self.resume_thread(thread, ThreadState::DELAY);
    }

    /// 当前线程让出 CPU（排到同优先级队尾）
    pub(crate) fn yield_now(&mut self, cpu: usize) {
        let curr = self.scheds[cpu].curr;
        if self.threads[curr].is_root() || self.threads[curr].is_blocked() {
            return;
        }
        self.putback(curr);
    }
}

/// 实时核心
pub struct Pod {
    nklock: Mutex<Nucleus>,
    ipi: IpiMailbox,
    nr_cpus: usize,
}

impl Pod {
    /// 启动实时核心：初始化调度类，为每个 CPU 建立调度器和根线程
    pub fn new(nr_cpus: usize) -> Result<Self, Errno> {
        if nr_cpus == 0 || nr_cpus > MAX_CPUS {
            log::error!("pod: unsupported cpu count {}", nr_cpus);
            return Err(Errno::InvalidArgument);
        }
        registry::init_classes();

        let mut nk = Nucleus::new();
        for cpu in 0..nr_cpus {
            nk.this_cpu = cpu;
            nk.sched_init(cpu)?;
        }
        log::info!("pod: {} {} nucleus, {} cpu(s) online", KERNEL_NAME, KERNEL_VERSION, nr_cpus);

        Ok(Self {
            nklock: Mutex::new(nk),
            ipi: IpiMailbox::new(nr_cpus),
            nr_cpus,
        })
    }

    #[inline]
    pub fn nr_cpus(&self) -> usize {
        self.nr_cpus
    }

    fn check_cpu(&self, cpu: usize) -> Result<(), Errno> {
        if cpu < self.nr_cpus {
            Ok(())
        } else {
            Err(Errno::InvalidArgument)
        }
    }

    /// 以 `cpu` 的身份持 nklock 执行 `f`，解锁后发送积攒的 IPI
    pub(crate) fn with_nucleus<R>(&self, cpu: usize, f: impl FnOnce(&mut Nucleus) -> R) -> R {
        let (ret, outbox) = {
            let mut nk = self.nklock.lock();
            nk.this_cpu = cpu;
            let ret = f(&mut nk);
            (ret, core::mem::take(&mut nk.outbox))
        };
        if !outbox.is_empty() {
            self.ipi.send_resched(outbox);
        }
        ret
    }

    /// 以线程所在 CPU 的身份执行（同步对象操作的调用方是线程本身）
    pub(crate) fn with_thread<R>(
        &self,
        thread: ThreadId,
        f: impl FnOnce(&mut Nucleus, usize) -> Result<R, Errno>,
    ) -> Result<R, Errno> {
        let (ret, outbox) = {
            let mut nk = self.nklock.lock();
            let ret = match nk.threads.get(thread) {
                Some(t) => {
                    let cpu = t.sched;
                    nk.this_cpu = cpu;
                    f(&mut nk, cpu)
                }
                None => Err(Errno::NoSuchProcess),
            };
            (ret, core::mem::take(&mut nk.outbox))
        };
        if !outbox.is_empty() {
            self.ipi.send_resched(outbox);
        }
        ret
    }

    // ============================================================
    // 线程服务
    // ============================================================

    pub fn create_thread(&self, cpu: usize, attr: ThreadAttr) -> Result<ThreadId, Errno> {
        self.check_cpu(cpu)?;
        self.with_nucleus(cpu, |nk| nk.create_thread(attr))
    }

    pub fn start_thread(&self, cpu: usize, thread: ThreadId) -> Result<(), Errno> {
        self.check_cpu(cpu)?;
        self.with_nucleus(cpu, |nk| {
            nk.check_user_thread(thread)?;
            nk.start_thread(thread)
        })
    }

    /// 显式挂起
    pub fn suspend_thread(&self, cpu: usize, thread: ThreadId) -> Result<(), Errno> {
        self.check_cpu(cpu)?;
        self.with_nucleus(cpu, |nk| {
            nk.check_user_thread(thread)?;
            nk.suspend_thread(thread, ThreadState::SUSP, Deadline::Never, None);
            Ok(())
        })
    }

    /// 定时睡眠；超时已过期时立即返回
    pub fn sleep(&self, cpu: usize, thread: ThreadId, timeout: Timeout) -> Result<(), Errno> {
        self.check_cpu(cpu)?;
        self.with_nucleus(cpu, |nk| {
            nk.check_user_thread(thread)?;
            let deadline = timeout.deadline(nk.clock);
            nk.suspend_thread(thread, ThreadState::DELAY, deadline, None);
            Ok(())
        })
    }

    pub fn resume_thread(&self, cpu: usize, thread: ThreadId, mask: ThreadState) -> Result<(), Errno> {
        self.check_cpu(cpu)?;
        if !BLOCK_BITS.contains(mask) || mask.contains(ThreadState::DORMANT) {
            return Err(Errno::InvalidArgument);
        }
        self.with_nucleus(cpu, |nk| {
            nk.check_user_thread(thread)?;
            nk.resume_thread(thread, mask);
            Ok(())
        })
    }

    /// 打断等待，返回线程是否确实在等待
    pub fn unblock_thread(&self, cpu: usize, thread: ThreadId) -> Result<bool, Errno> {
        self.check_cpu(cpu)?;
        self.with_nucleus(cpu, |nk| {
            nk.check_user_thread(thread)?;
            Ok(nk.unblock_thread(thread))
        })
    }

    pub fn delete_thread(&self, cpu: usize, thread: ThreadId) -> Result<(), Errno> {
        self.check_cpu(cpu)?;
        self.with_nucleus(cpu, |nk| {
            nk.check_user_thread(thread)?;
            nk.delete_thread(thread);
            Ok(())
        })
    }

    pub fn set_policy(
        &self,
        cpu: usize,
        thread: ThreadId,
        class: ClassId,
        param: PolicyParam,
    ) -> Result<(), Errno> {
        self.check_cpu(cpu)?;
        if class == ClassId::Idle {
            return Err(Errno::InvalidArgument);
        }
        self.with_nucleus(cpu, |nk| {
            nk.check_user_thread(thread)?;
            nk.renice_thread(thread, class, &param)
        })
    }

    /// 当前有效的调度类和参数（被继承提升时反映提升后的值）
    pub fn get_policy(&self, thread: ThreadId) -> Result<(ClassId, PolicyParam), Errno> {
        let nk = self.nklock.lock();
        let t = nk.threads.get(thread).ok_or(Errno::NoSuchProcess)?;
        Ok((t.sched_class, t.sched_class.ops().getparam(t)))
    }

    pub fn set_rr(&self, cpu: usize, thread: ThreadId, quantum: Option<Ticks>) -> Result<(), Errno> {
        self.check_cpu(cpu)?;
        self.with_nucleus(cpu, |nk| {
            nk.check_user_thread(thread)?;
            nk.set_rr(thread, quantum)
        })
    }

    /// 把线程迁移到 `dest`
    pub fn migrate_thread(&self, cpu: usize, thread: ThreadId, dest: usize) -> Result<(), Errno> {
        self.check_cpu(cpu)?;
        self.check_cpu(dest)?;
        self.with_nucleus(cpu, |nk| {
            nk.check_user_thread(thread)?;
            let t = &nk.threads[thread];
            if !t.affinity.contains(dest) {
                return Err(Errno::InvalidArgument);
            }
            let home = t.sched;
            if home == dest {
                return Ok(());
            }
            if nk.scheds[home].curr == thread {
                nk.migrate(thread, dest);
            } else {
                nk.migrate_passive(thread, dest);
            }
            Ok(())
        })
    }

    /// 轮转 `class` 在 `cpu` 上某个优先级的线程；`RUNPRIO` 表示当前线程
    pub fn rotate(&self, cpu: usize, class: ClassId, param: PolicyParam) -> Result<(), Errno> {
        self.check_cpu(cpu)?;
        self.with_nucleus(cpu, |nk| nk.rotate(cpu, class, &param));
        Ok(())
    }

    pub fn yield_now(&self, cpu: usize) -> Result<Option<Switch>, Errno> {
        self.check_cpu(cpu)?;
        Ok(self.with_nucleus(cpu, |nk| {
            nk.yield_now(cpu);
            nk.schedule(cpu)
        }))
    }

    // ============================================================
    // 调度入口
    // ============================================================

    pub fn lock_sched(&self, cpu: usize) -> Result<(), Errno> {
        self.check_cpu(cpu)?;
        self.with_nucleus(cpu, |nk| nk.lock_sched(cpu));
        Ok(())
    }

    /// 释放调度锁，完全释放时处理被推迟的重调度
    pub fn unlock_sched(&self, cpu: usize) -> Result<Option<Switch>, Errno> {
        self.check_cpu(cpu)?;
        self.with_nucleus(cpu, |nk| {
            if nk.unlock_sched(cpu)? {
                Ok(nk.schedule(cpu))
            } else {
                Ok(None)
            }
        })
    }

    pub fn irq_enter(&self, cpu: usize) -> Result<(), Errno> {
        self.check_cpu(cpu)?;
        self.with_nucleus(cpu, |nk| nk.irq_enter(cpu));
        Ok(())
    }

    /// 退出中断；最外层时处理中断期间积攒的重调度
    pub fn irq_exit(&self, cpu: usize) -> Result<Option<Switch>, Errno> {
        self.check_cpu(cpu)?;
        Ok(self.with_nucleus(cpu, |nk| {
            nk.irq_exit(cpu);
            nk.schedule(cpu)
        }))
    }

    pub fn schedule(&self, cpu: usize) -> Result<Option<Switch>, Errno> {
        self.check_cpu(cpu)?;
        Ok(self.with_nucleus(cpu, |nk| nk.schedule(cpu)))
    }

    /// 时钟中断入口
    pub fn tick(&self, cpu: usize) -> Result<Option<Switch>, Errno> {
        self.check_cpu(cpu)?;
        Ok(self.with_nucleus(cpu, |nk| {
            nk.tick(cpu);
            nk.schedule(cpu)
        }))
    }

    /// 重调度 IPI 处理
    pub fn handle_ipi(&self, cpu: usize) -> Result<Option<Switch>, Errno> {
        self.check_cpu(cpu)?;
        if !self.ipi.ack(cpu) {
            return Ok(None);
        }
        Ok(self.with_nucleus(cpu, |nk| nk.schedule(cpu)))
    }

    pub fn ipi_pending(&self, cpu: usize) -> bool {
        self.ipi.is_pending(cpu)
    }

    pub fn ipi_count(&self, cpu: usize) -> u32 {
        self.ipi.count(cpu)
    }

    // ============================================================
    // 检视
    // ============================================================

    pub fn current(&self, cpu: usize) -> Option<ThreadId> {
        let nk = self.nklock.lock();
        nk.scheds.get(cpu).map(|s| s.curr)
    }

    pub fn root(&self, cpu: usize) -> Option<ThreadId> {
        let nk = self.nklock.lock();
        nk.scheds.get(cpu).map(|s| s.root)
    }

    pub fn inspect(&self, thread: ThreadId) -> Option<ThreadSnapshot> {
        let nk = self.nklock.lock();
        nk.threads.get(thread).map(Thread::snapshot)
    }

    pub fn sched_stats(&self, cpu: usize) -> Option<SchedStats> {
        let nk = self.nklock.lock();
        nk.scheds.get(cpu).map(|s| s.stats())
    }

    pub fn clock(&self) -> Ticks {
        self.nklock.lock().clock
    }

    /// 基础调度类为 `class` 的线程数（含根线程）
    pub fn nr_threads(&self, class: ClassId) -> i32 {
        self.nklock.lock().nthreads[class.index()]
    }

    // ============================================================
    // tp 分区调度表
    // ============================================================

    #[cfg(feature = "sched-tp")]
    pub fn tp_install(&self, cpu: usize, schedule: TpSchedule) -> Result<(), Errno> {
        self.check_cpu(cpu)?;
        self.with_nucleus(cpu, |nk| nk.tp_install(cpu, schedule))
    }

    #[cfg(feature = "sched-tp")]
    pub fn tp_start(&self, cpu: usize) -> Result<(), Errno> {
        self.check_cpu(cpu)?;
        self.with_nucleus(cpu, |nk| nk.tp_start(cpu))
    }

    #[cfg(feature = "sched-tp")]
    pub fn tp_stop(&self, cpu: usize) -> Result<(), Errno> {
        self.check_cpu(cpu)?;
        self.with_nucleus(cpu, |nk| nk.tp_stop(cpu));
        Ok(())
    }

    /// 关闭实时核心
    ///
    /// 所有非根线程必须已经删除。
    pub fn shutdown(self) -> Result<(), Errno> {
        let mut nk = self.nklock.lock();
        let live = nk.threads.iter().filter(|(_, t)| !t.is_root()).count();
        if live > 0 {
            log::warn!("pod: shutdown refused, {} thread(s) alive", live);
            return Err(Errno::DeviceOrResourceBusy);
        }
        for cpu in 0..nk.nr_cpus() {
            nk.this_cpu = cpu;
            nk.sched_destroy(cpu);
        }
        drop(nk);
        registry::cleanup_classes();
        log::info!("pod: shut down");
        Ok(())
    }
}
