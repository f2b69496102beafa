//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 实时线程控制块 (Thread Control Block)
//!
//! 对应实时核心的 xnthread：
//! 1. 状态位 (state) 与信息位 (info) 分开，阻塞原因可以叠加
//! 2. 调度字段：当前调度类、基础调度类、bprio/cprio/wprio
//! 3. 线程之间、线程与同步对象之间只通过句柄互相引用

use alloc::string::String;
use alloc::vec::Vec;
#[cfg(feature = "sched-sporadic")]
use alloc::boxed::Box;
use bitflags::bitflags;

use crate::collection::{Handle, SlabKey};
use crate::process::timer::Ticks;
use crate::sched::class::{ClassId, PolicyParam};
use crate::smp::CpuSet;
use crate::sync::synch::SynchId;
#[cfg(feature = "sched-sporadic")]
use crate::sched::sporadic::PssThread;

/// 线程句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(Handle);

impl SlabKey for ThreadId {
    fn from_handle(handle: Handle) -> Self {
        ThreadId(handle)
    }

    fn handle(self) -> Handle {
        self.0
    }
}

impl ThreadId {
    /// 打包成快速锁字里的 owner 值
    #[inline]
    pub const fn to_raw(self) -> u32 {
        self.0.to_raw()
    }

    #[inline]
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match Handle::from_raw(raw) {
            Some(handle) => Some(ThreadId(handle)),
            None => None,
        }
    }
}

bitflags! {
    /// 线程状态位
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ThreadState: u32 {
        /// 被显式挂起
        const SUSP    = 0x0000_0001;
        /// 在同步对象上等待
        const PEND    = 0x0000_0002;
        /// 定时睡眠（或带超时的等待）
        const DELAY   = 0x0000_0004;
        /// 在运行队列上
        const READY   = 0x0000_0008;
        /// 已创建、尚未启动
        const DORMANT = 0x0000_0010;
        /// 已删除，等待切换后回收
        const ZOMBIE  = 0x0000_0020;
        /// 已启动
        const STARTED = 0x0000_0080;
        /// 优先级被继承提升
        const BOOST   = 0x0000_1000;
        /// 持有调度锁
        const LOCK    = 0x0000_4000;
        /// 启用时间片轮转
        const RRB     = 0x0000_8000;
        /// 使用 FPU
        const FPU     = 0x0010_0000;
        /// 每 CPU 的根线程
        const ROOT    = 0x0040_0000;
    }
}

/// 阻塞位：任何一个置位，线程都不可运行
pub const BLOCK_BITS: ThreadState = ThreadState::SUSP
    .union(ThreadState::PEND)
    .union(ThreadState::DELAY)
    .union(ThreadState::DORMANT);

bitflags! {
    /// 线程信息位（最近一次等待的结果）
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ThreadInfo: u32 {
        /// 等待超时
        const TIMEO  = 0x01;
        /// 等待的对象被删除
        const RMID   = 0x02;
        /// 等待被打断
        const BREAK  = 0x04;
        /// 被看门狗踢出
        const KICKED = 0x08;
        /// 被同步对象唤醒（得到资源或信号）
        const WAKEN  = 0x10;
    }
}

impl ThreadInfo {
    /// 每次进入等待前需要清除的结果位
    pub const WAIT_OUTCOME: ThreadInfo = ThreadInfo::TIMEO
        .union(ThreadInfo::RMID)
        .union(ThreadInfo::BREAK)
        .union(ThreadInfo::WAKEN);
}

/// 线程创建属性
#[derive(Debug, Clone)]
pub struct ThreadAttr {
    pub name: String,
    pub cpu: usize,
    pub affinity: CpuSet,
    pub class: ClassId,
    pub param: PolicyParam,
    pub fpu: bool,
}

impl ThreadAttr {
    /// rt 类线程，亲和所有 CPU
    pub fn rt(name: &str, cpu: usize, prio: i32) -> Self {
        Self {
            name: String::from(name),
            cpu,
            affinity: CpuSet::from_bits(u64::MAX),
            class: ClassId::Rt,
            param: PolicyParam::Rt { prio },
            fpu: false,
        }
    }

    pub fn with_policy(mut self, class: ClassId, param: PolicyParam) -> Self {
        self.class = class;
        self.param = param;
        self
    }

    pub fn with_affinity(mut self, affinity: CpuSet) -> Self {
        self.affinity = affinity;
        self
    }

    pub fn with_fpu(mut self) -> Self {
        self.fpu = true;
        self
    }
}

/// 线程控制块
pub struct Thread {
    pub(crate) name: String,
    /// 所属 CPU
    pub(crate) sched: usize,
    /// 当前（有效）调度类
    pub(crate) sched_class: ClassId,
    /// 基础调度类；首次 set_policy 之前为 None
    pub(crate) base_class: Option<ClassId>,
    /// 基础优先级
    pub(crate) bprio: i32,
    /// 当前优先级
    pub(crate) cprio: i32,
    /// 加权优先级 = cprio + 调度类权重
    pub(crate) wprio: i32,
    pub(crate) state: ThreadState,
    pub(crate) info: ThreadInfo,
    pub(crate) rrperiod: Ticks,
    pub(crate) rrcredit: Ticks,
    pub(crate) affinity: CpuSet,
    /// 正在等待的同步对象
    pub(crate) wchan: Option<SynchId>,
    /// 超时定时器到期时间
    pub(crate) rtimer: Option<Ticks>,
    /// 由本线程持有、且等待者提升了本线程优先级的同步对象
    pub(crate) claimq: Vec<SynchId>,
    /// 调度锁嵌套深度
    pub(crate) lock_depth: u32,
    /// tp 分区号
    #[cfg(feature = "sched-tp")]
    pub(crate) tps: Option<usize>,
    /// sporadic server 状态
    #[cfg(feature = "sched-sporadic")]
    pub(crate) pss: Option<Box<PssThread>>,
}

impl Thread {
    pub(crate) fn new(name: String, cpu: usize, affinity: CpuSet, state: ThreadState) -> Self {
        Self {
            name,
            sched: cpu,
            sched_class: ClassId::Idle,
            base_class: None,
            bprio: 0,
            cprio: 0,
            wprio: 0,
            state,
            info: ThreadInfo::empty(),
            rrperiod: 0,
            rrcredit: 0,
            affinity,
            wchan: None,
            rtimer: None,
            claimq: Vec::new(),
            lock_depth: 0,
            #[cfg(feature = "sched-tp")]
            tps: None,
            #[cfg(feature = "sched-sporadic")]
            pss: None,
        }
    }

    #[inline]
    pub fn base_class(&self) -> ClassId {
        self.base_class.unwrap_or(self.sched_class)
    }

    #[inline]
    pub fn is_blocked(&self) -> bool {
        self.state.intersects(BLOCK_BITS)
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.state.contains(ThreadState::ROOT)
    }

    /// 基础调度类下的加权优先级（不含继承提升）
    #[inline]
    pub fn base_wprio(&self) -> i32 {
        self.bprio + self.base_class().ops().weight()
    }

    pub(crate) fn snapshot(&self) -> ThreadSnapshot {
        ThreadSnapshot {
            name: self.name.clone(),
            cpu: self.sched,
            sched_class: self.sched_class,
            base_class: self.base_class(),
            bprio: self.bprio,
            cprio: self.cprio,
            wprio: self.wprio,
            state: self.state,
            info: self.info,
            rrcredit: self.rrcredit,
        }
    }
}

/// 线程快照（只读检视）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadSnapshot {
    pub name: String,
    pub cpu: usize,
    pub sched_class: ClassId,
    pub base_class: ClassId,
    pub bprio: i32,
    pub cprio: i32,
    pub wprio: i32,
    pub state: ThreadState,
    pub info: ThreadInfo,
    pub rrcredit: Ticks,
}
