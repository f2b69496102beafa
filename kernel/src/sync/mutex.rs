//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 实时互斥锁
//!
//! 建立在带所有者的同步对象上：
//! - 无竞争时加锁/解锁只对快速锁字做 CAS
//! - 有竞争时进入 nklock，按优先级排队，可选优先级继承
//! - 解锁时所有权直接交给最高优先级的等待者
//!
//! 加锁可能阻塞。宿主机模型下阻塞分两步完成：`lock` 返回 `Pending`
//! 表示调用线程已经挂起，等它重新被调度后调用 `lock_finish` 取结果。

use alloc::sync::Arc;
use bitflags::bitflags;
use core::sync::atomic::{AtomicU32, Ordering};

use crate::errno::Errno;
use crate::process::pod::{Nucleus, Pod};
use crate::process::thread::{ThreadId, ThreadInfo, ThreadState};
use crate::process::timer::Timeout;
use crate::sync::synch::{FastLock, LockStatus, SynchFlags, SynchId};

const MUTEX_MAGIC: u32 = 0x8686_0303;

bitflags! {
    /// 快速锁字旁的互斥锁标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MutexFlags: u32 {
        /// 有条件变量信号等到解锁时投递
        const COND_SIGNAL = 0x1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MutexKind {
    #[default]
    Normal,
    /// 所有者可以重复加锁
    Recursive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MutexProtocol {
    None,
    /// 优先级继承
    #[default]
    Inherit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MutexAttr {
    pub kind: MutexKind,
    pub protocol: MutexProtocol,
}

/// 互斥锁
pub struct Mutex<'a> {
    pod: &'a Pod,
    magic: AtomicU32,
    pub(crate) synch: SynchId,
    pub(crate) fastlock: Arc<FastLock>,
    attr: MutexAttr,
    /// 递归加锁计数，只由所有者修改
    pub(crate) lockcnt: AtomicU32,
}

impl<'a> Mutex<'a> {
    pub fn new(pod: &'a Pod, attr: MutexAttr) -> Result<Self, Errno> {
        let mut flags = SynchFlags::PRIO | SynchFlags::OWNER;
        if attr.protocol == MutexProtocol::Inherit {
            flags |= SynchFlags::PIP;
        }
        let fastlock = Arc::new(FastLock::new());
        let synch = pod.with_nucleus(0, |nk| nk.synch_init(flags, Some(fastlock.clone())))?;
        Ok(Self {
            pod,
            magic: AtomicU32::new(MUTEX_MAGIC),
            synch,
            fastlock,
            attr,
            lockcnt: AtomicU32::new(0),
        })
    }

    pub(crate) fn check(&self) -> Result<(), Errno> {
        if self.magic.load(Ordering::Acquire) == MUTEX_MAGIC {
            Ok(())
        } else {
            Err(Errno::InvalidArgument)
        }
    }

    pub fn owner(&self) -> Option<ThreadId> {
        self.fastlock.owner()
    }

    pub fn attr(&self) -> MutexAttr {
        self.attr
    }

    /// 所有者的递归加锁层数
    pub fn lock_count(&self) -> u32 {
        self.lockcnt.load(Ordering::Acquire)
    }

    /// 所有者重复加锁：递归锁计数加一，否则按 `relock` 报错
    fn relock(&self, relock: Errno) -> Result<(), Errno> {
        if self.attr.kind != MutexKind::Recursive {
            return Err(relock);
        }
        let count = self.lockcnt.load(Ordering::Acquire);
        if count == u32::MAX {
            return Err(Errno::TryAgain);
        }
        self.lockcnt.store(count + 1, Ordering::Release);
        Ok(())
    }

    /// 不阻塞地加锁
    pub fn trylock(&self, thread: ThreadId) -> Result<(), Errno> {
        self.check()?;
        if self.fastlock.owner() == Some(thread) {
            return self.relock(Errno::DeviceOrResourceBusy);
        }
        if !self.fastlock.try_acquire(thread) {
            let status = self
                .pod
                .with_thread(thread, |nk, _| nk.acquire(self.synch, thread, Timeout::Relative(0)))
                .map_err(|e| match e {
                    Errno::TimedOut => Errno::DeviceOrResourceBusy,
                    e => e,
                })?;
            debug_assert_eq!(status, LockStatus::Acquired);
        }
        self.lockcnt.store(1, Ordering::Release);
        Ok(())
    }

    pub fn lock(&self, thread: ThreadId) -> Result<LockStatus, Errno> {
        self.timedlock(thread, Timeout::Infinite)
    }

    /// 加锁，锁被占用时阻塞调用线程并立即重新调度它所在的 CPU
    pub fn timedlock(&self, thread: ThreadId, timeout: Timeout) -> Result<LockStatus, Errno> {
        self.check()?;
        if self.fastlock.owner() == Some(thread) {
            self.relock(Errno::ResourceDeadlock)?;
            return Ok(LockStatus::Acquired);
        }
        if self.fastlock.try_acquire(thread) {
            self.lockcnt.store(1, Ordering::Release);
            return Ok(LockStatus::Acquired);
        }

        let status = self.pod.with_thread(thread, |nk, cpu| {
            let status = nk.acquire(self.synch, thread, timeout)?;
            if status == LockStatus::Pending {
                nk.schedule(cpu);
            }
            Ok(status)
        })?;
        if status == LockStatus::Acquired {
            self.lockcnt.store(1, Ordering::Release);
        }
        Ok(status)
    }

    /// 阻塞的加锁在线程恢复运行后取结果
    pub fn lock_finish(&self, thread: ThreadId) -> Result<(), Errno> {
        self.pod.with_thread(thread, |nk, _| nk.wait_outcome(thread, self.synch))?;
        if self.fastlock.owner() != Some(thread) {
            return Err(Errno::InvalidArgument);
        }
        self.lockcnt.store(1, Ordering::Release);
        Ok(())
    }

    /// 解锁
    pub fn unlock(&self, thread: ThreadId) -> Result<(), Errno> {
        self.do_release(thread, true).map(|_| ())
    }

    /// 解锁但不重新调度；返回是否走了慢路径（可能已把锁交给等待者）
    pub fn release(&self, thread: ThreadId) -> Result<bool, Errno> {
        self.do_release(thread, false)
    }

    fn do_release(&self, thread: ThreadId, resched: bool) -> Result<bool, Errno> {
        self.check()?;
        if self.fastlock.owner() != Some(thread) {
            return Err(Errno::OperationNotPermitted);
        }
        let count = self.lockcnt.load(Ordering::Acquire);
        if count > 1 {
            self.lockcnt.store(count - 1, Ordering::Release);
            return Ok(false);
        }
        self.lockcnt.store(0, Ordering::Release);

        let deferred = self.fastlock.flags() & MutexFlags::COND_SIGNAL.bits() != 0;
        if !deferred && self.fastlock.try_release(thread) {
            return Ok(false);
        }
        self.pod.with_thread(thread, |nk, cpu| {
            nk.mutex_release(self.synch, thread);
            if resched {
                nk.schedule(cpu);
            }
            Ok(true)
        })
    }

    /// 销毁未加锁的互斥锁
    pub fn destroy(&self) -> Result<(), Errno> {
        self.check()?;
        if self.fastlock.owner().is_some() {
            return Err(Errno::DeviceOrResourceBusy);
        }
        self.magic.store(0, Ordering::Release);
        self.pod.with_nucleus(0, |nk| nk.synch_destroy(self.synch));
        Ok(())
    }

    /// 强制删除：所有等待者以"对象已删除"唤醒；返回是否有等待者
    pub fn delete(&self, cpu: usize) -> Result<bool, Errno> {
        self.check()?;
        self.magic.store(0, Ordering::Release);
        Ok(self.pod.with_nucleus(cpu, |nk| {
            let flushed = nk.synch_destroy(self.synch);
            if flushed {
                nk.schedule(cpu);
            }
            flushed
        }))
    }
}

impl Nucleus {
    /// 阻塞等待的结果
    ///
    /// 线程还在等待返回 TryAgain；否则按 打断 > 超时 > 对象被删除 的顺序报告。
    pub(crate) fn wait_outcome(&self, thread: ThreadId, synch: SynchId) -> Result<(), Errno> {
        let t = &self.threads[thread];
        if t.state.contains(ThreadState::PEND) && t.wchan == Some(synch) {
            return Err(Errno::TryAgain);
        }
        if t.info.contains(ThreadInfo::BREAK) {
            Err(Errno::InterruptedSystemCall)
        } else if t.info.contains(ThreadInfo::TIMEO) {
            Err(Errno::TimedOut)
        } else if t.info.contains(ThreadInfo::RMID) {
            Err(Errno::InvalidArgument)
        } else {
            Ok(())
        }
    }

    /// 慢路径解锁：先投递延迟的条件变量信号，再交出所有权
    pub(crate) fn mutex_release(&mut self, synch: SynchId, thread: ThreadId) -> Option<ThreadId> {
        let fastlock = self.synchs[synch].fastlock.clone()?;
        if fastlock.flags() & MutexFlags::COND_SIGNAL.bits() != 0 {
            let conds = core::mem::take(&mut self.synchs[synch].conds);
            for cond in conds {
                self.cond_deliver(cond);
            }
            fastlock.clear_flags(MutexFlags::COND_SIGNAL.bits());
        }
        self.release(synch, thread)
    }
}
