//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 调度类 (Scheduling Class)
//!
//! 对应 Linux 的 struct sched_class (kernel/sched/sched.h)，但按实时核心的
//! 规则组合：每个调度类有一个权重，线程的加权优先级
//! `wprio = cprio + weight` 是跨调度类比较的唯一依据。
//!
//! 调度类集合是封闭的，用 `ClassId` 标识，通过 `SchedClass` trait 对象分发。
//! 所有钩子都在 nklock 保护下调用。

use crate::config::CLASS_MAX_PRIO;
use crate::process::pod::Nucleus;
use crate::process::thread::{Thread, ThreadId, ThreadState, BLOCK_BITS};
use crate::errno::Errno;
use crate::sched::sched::Sched;
#[cfg(feature = "sched-sporadic")]
use crate::sched::sporadic::PssParam;

/// 调度类权重：序号 * 每类优先级跨度
pub const fn class_weight(n: i32) -> i32 {
    n * CLASS_MAX_PRIO
}

/// rotate 时表示"当前线程所在的优先级"
pub const RUNPRIO: i32 = i32::MIN;

/// 根线程的优先级
pub const IDLE_PRIO: i32 = -1;

/// 调度策略编号
pub const SCHED_WEAK: i32 = 0;
pub const SCHED_FIFO: i32 = 1;
pub const SCHED_RR: i32 = 2;
pub const SCHED_IDLE: i32 = 5;
pub const SCHED_SPORADIC: i32 = 10;
pub const SCHED_TP: i32 = 11;

/// 调度类数量上限（与编译选项无关）
pub const NR_CLASSES: usize = 5;

/// 调度类标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassId {
    Idle = 0,
    Rt = 1,
    #[cfg(feature = "sched-weak")]
    Weak = 2,
    #[cfg(feature = "sched-tp")]
    Tp = 3,
    #[cfg(feature = "sched-sporadic")]
    Sporadic = 4,
}

impl ClassId {
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// 调度类实现
    pub fn ops(self) -> &'static dyn SchedClass {
        match self {
            ClassId::Idle => &crate::sched::idle::IDLE_CLASS,
            ClassId::Rt => &crate::sched::rt::RT_CLASS,
            #[cfg(feature = "sched-weak")]
            ClassId::Weak => &crate::sched::weak::WEAK_CLASS,
            #[cfg(feature = "sched-tp")]
            ClassId::Tp => &crate::sched::tp::TP_CLASS,
            #[cfg(feature = "sched-sporadic")]
            ClassId::Sporadic => &crate::sched::sporadic::SPORADIC_CLASS,
        }
    }

    pub fn name(self) -> &'static str {
        self.ops().name()
    }
}

/// 调度参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyParam {
    Idle { prio: i32 },
    Rt { prio: i32 },
    #[cfg(feature = "sched-weak")]
    Weak { prio: i32 },
    #[cfg(feature = "sched-tp")]
    Tp { prio: i32, ptid: usize },
    #[cfg(feature = "sched-sporadic")]
    Sporadic(PssParam),
}

impl PolicyParam {
    /// 参数携带的（当前）优先级
    pub fn prio(&self) -> i32 {
        match *self {
            PolicyParam::Idle { prio } => prio,
            PolicyParam::Rt { prio } => prio,
            #[cfg(feature = "sched-weak")]
            PolicyParam::Weak { prio } => prio,
            #[cfg(feature = "sched-tp")]
            PolicyParam::Tp { prio, .. } => prio,
            #[cfg(feature = "sched-sporadic")]
            PolicyParam::Sporadic(ref p) => p.current_prio,
        }
    }
}

/// 调度类接口
///
/// 约定：
/// - `enqueue`/`dequeue`/`requeue` 只由调度核心在 READY 位变化时调用，
///   idle 类永远不参与
/// - `pick` 返回该类在指定 CPU 上最高优先级的可运行线程并将其出队
/// - `setparam`/`trackprio` 只改 cprio 和类私有数据，wprio 由调度核心重算
/// - `declare` 失败时线程保持原调度类不变
pub trait SchedClass: Sync {
    fn id(&self) -> ClassId;

    fn name(&self) -> &'static str;

    fn policy(&self) -> i32;

    fn weight(&self) -> i32;

    /// 子系统启动时调用一次
    fn class_init(&self) {
        log::info!("sched: class {} ready (weight {})", self.name(), self.weight());
    }

    /// 子系统关闭时调用一次
    fn class_cleanup(&self) {
        log::info!("sched: class {} released", self.name());
    }

    /// 每 CPU 调度器初始化
    fn sched_init(&self, _sched: &mut Sched) {}

    /// 线程创建时的类私有初始化
    fn init_thread(&self, _thread: &mut Thread) {}

    /// 插入同优先级队尾
    fn enqueue(&self, nk: &mut Nucleus, thread: ThreadId);

    /// 插入同优先级队首（被抢占的当前线程）
    fn enqueue_front(&self, nk: &mut Nucleus, thread: ThreadId) {
        self.enqueue(nk, thread);
    }

    fn dequeue(&self, nk: &mut Nucleus, thread: ThreadId);

    /// 移到同优先级队尾
    fn requeue(&self, nk: &mut Nucleus, thread: ThreadId) {
        self.dequeue(nk, thread);
        self.enqueue(nk, thread);
    }

    fn pick(&self, nk: &mut Nucleus, cpu: usize) -> Option<ThreadId>;

    /// 当前线程的时间片滴答（由调度核心按状态门控后调用）
    fn tick(&self, _nk: &mut Nucleus, _thread: ThreadId) {}

    /// 每 CPU 的周期钩子，不论当前线程属于哪个类
    fn sched_tick(&self, _nk: &mut Nucleus, _cpu: usize) {}

    fn rotate(&self, _nk: &mut Nucleus, _cpu: usize, _param: &PolicyParam) {}

    /// 迁移到另一个 CPU 之前调用，线程已不在运行队列上
    fn migrate(&self, _nk: &mut Nucleus, _thread: ThreadId, _cpu: usize) {}

    fn setparam(&self, thread: &mut Thread, param: &PolicyParam);

    fn getparam(&self, thread: &Thread) -> PolicyParam;

    /// `Some(p)` 时采用 p 的优先级（继承提升）；`None` 时恢复基础优先级
    fn trackprio(&self, thread: &mut Thread, param: Option<&PolicyParam>);

    fn declare(&self, _thread: &mut Thread, _param: &PolicyParam) -> Result<(), Errno> {
        Ok(())
    }

    fn forget(&self, _thread: &mut Thread) {}
}

/// 时间片轮转滴答，rt 与 weak 共用
///
/// 第 N 次滴答用完时间片：重新装填并放回同优先级队尾。
pub(crate) fn rr_tick(nk: &mut Nucleus, thread: ThreadId) {
    let t = &mut nk.threads[thread];
    if t.rrcredit <= 1 {
        t.rrcredit = t.rrperiod;
        log::trace!("sched: {} time slice exhausted", t.name);
        nk.putback(thread);
    } else {
        t.rrcredit -= 1;
    }
}

/// 时间片滴答门控
///
/// 线程必须运行在自己的基础调度类中（没有被提升到别的类），不阻塞、
/// 不持有调度锁，并且开启了时间片轮转。
pub(crate) fn tick_allowed(thread: &Thread) -> bool {
    thread.sched_class != ClassId::Idle
        && thread.sched_class == thread.base_class()
        && (thread.state & (BLOCK_BITS | ThreadState::LOCK | ThreadState::RRB)) == ThreadState::RRB
}
