//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 条件变量 (Condition Variable) 机制
//!
//! 核心概念：
//! - 必须与互斥锁配合使用，第一次等待时绑定互斥锁，直到没有等待者
//! - wait 原子地释放互斥锁并在条件变量上睡眠，醒来后重新加锁
//! - 持有互斥锁时发出的 signal/broadcast 被延迟到解锁时投递，
//!   被唤醒的线程不会马上撞上仍被持有的锁
//!
//! 等待分两步：`wait_prologue` 释放锁并挂起调用线程，
//! 线程重新运行后 `wait_epilogue` 取等待结果并重新加锁。

use core::sync::atomic::{AtomicU32, Ordering};

use crate::errno::Errno;
use crate::process::pod::{Nucleus, Pod};
use crate::process::thread::{ThreadId, ThreadInfo};
use crate::process::timer::{Deadline, Timeout};
use crate::sync::mutex::{Mutex, MutexFlags};
use crate::sync::synch::{LockStatus, SynchFlags, SynchId};

const COND_MAGIC: u32 = 0x8686_0505;

/// 广播
const SIGNAL_ALL: u32 = u32::MAX;

/// 一次条件等待的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CondWait {
    /// 等待本身的结果（被唤醒、超时、被打断、条件变量被删除）
    pub outcome: Result<(), Errno>,
    /// 重新加锁的状态；`Pending` 时需要再调用 `Mutex::lock_finish`
    pub relock: LockStatus,
}

/// 条件变量
///
/// # 使用示例
/// ```no_run
/// # use nucleus::process::pod::Pod;
/// # use nucleus::process::thread::ThreadId;
/// # use nucleus::process::timer::Timeout;
/// # use nucleus::sync::{Cond, Mutex, MutexAttr, LockStatus};
/// # fn test(pod: &Pod, me: ThreadId) -> Result<(), nucleus::errno::Errno> {
/// let mutex = Mutex::new(pod, MutexAttr::default())?;
/// let cond = Cond::new(pod)?;
///
/// mutex.lock(me)?;
/// cond.wait_prologue(me, &mutex, Timeout::Infinite)?;
/// // ... 被 signal 唤醒、重新被调度之后 ...
/// let wait = cond.wait_epilogue(me, &mutex)?;
/// if wait.relock == LockStatus::Pending {
///     // ... 再次被调度之后 ...
///     mutex.lock_finish(me)?;
/// }
/// mutex.unlock(me)?;
/// # Ok(())
/// # }
/// ```
pub struct Cond<'a> {
    pod: &'a Pod,
    magic: AtomicU32,
    synch: SynchId,
}

impl<'a> Cond<'a> {
    pub fn new(pod: &'a Pod) -> Result<Self, Errno> {
        let synch = pod.with_nucleus(0, |nk| nk.synch_init(SynchFlags::PRIO, None))?;
        Ok(Self {
            pod,
            magic: AtomicU32::new(COND_MAGIC),
            synch,
        })
    }

    fn check(&self) -> Result<(), Errno> {
        if self.magic.load(Ordering::Acquire) == COND_MAGIC {
            Ok(())
        } else {
            Err(Errno::InvalidArgument)
        }
    }

    /// 释放互斥锁并开始等待
    ///
    /// # 行为
    /// 1. 检查调用线程持有互斥锁，且条件变量没有绑定到别的互斥锁
    /// 2. 超时已过期时不释放锁，直接返回 TimedOut
    /// 3. 释放互斥锁（投递延迟的信号）
    /// 4. 加入等待队列并挂起，重新调度调用线程所在的 CPU
    pub fn wait_prologue(
        &self,
        thread: ThreadId,
        mutex: &Mutex<'_>,
        timeout: Timeout,
    ) -> Result<LockStatus, Errno> {
        self.check()?;
        mutex.check()?;
        if mutex.owner() != Some(thread) {
            return Err(Errno::OperationNotPermitted);
        }
        // 递归锁只允许持有一层时等待
        if mutex.lock_count() > 1 {
            return Err(Errno::DeviceOrResourceBusy);
        }

        let status = self.pod.with_thread(thread, |nk, cpu| {
            match nk.synchs[self.synch].mutex {
                Some(bound) if bound != mutex.synch => return Err(Errno::InvalidArgument),
                _ => {}
            }
            if timeout.deadline(nk.clock) == Deadline::Expired {
                return Err(Errno::TimedOut);
            }
            nk.synchs[self.synch].mutex = Some(mutex.synch);
            nk.mutex_release(mutex.synch, thread);
            let status = nk.sleep_on(self.synch, thread, timeout)?;
            nk.schedule(cpu);
            Ok(status)
        })?;
        mutex.lockcnt.store(0, Ordering::Release);
        Ok(status)
    }

    /// 等待结束：取结果并重新加锁
    pub fn wait_epilogue(&self, thread: ThreadId, mutex: &Mutex<'_>) -> Result<CondWait, Errno> {
        mutex.check()?;
        let synch = self.synch;
        let (outcome, relock) = self.pod.with_thread(thread, |nk, cpu| {
            let outcome = match nk.wait_outcome(thread, synch) {
                Err(Errno::TryAgain) => return Err(Errno::TryAgain),
                outcome => outcome,
            };
            if let Some(cond) = nk.synchs.get_mut(synch) {
                if cond.pendq.is_empty() {
                    cond.mutex = None;
                }
            }
            let relock = nk.acquire(mutex.synch, thread, Timeout::Infinite)?;
            if relock == LockStatus::Pending {
                nk.schedule(cpu);
            }
            Ok((outcome, relock))
        })?;
        if relock == LockStatus::Acquired {
            mutex.lockcnt.store(1, Ordering::Release);
        }
        Ok(CondWait { outcome, relock })
    }

    /// 唤醒一个等待者
    pub fn signal(&self, thread: ThreadId) -> Result<(), Errno> {
        self.check()?;
        let synch = self.synch;
        self.pod.with_thread(thread, |nk, cpu| {
            nk.cond_signal(synch, thread, 1, cpu);
            Ok(())
        })
    }

    /// 唤醒所有等待者
    pub fn broadcast(&self, thread: ThreadId) -> Result<(), Errno> {
        self.check()?;
        let synch = self.synch;
        self.pod.with_thread(thread, |nk, cpu| {
            nk.cond_signal(synch, thread, SIGNAL_ALL, cpu);
            Ok(())
        })
    }

    /// 销毁没有等待者的条件变量
    pub fn destroy(&self) -> Result<(), Errno> {
        self.check()?;
        let synch = self.synch;
        self.pod.with_nucleus(0, |nk| {
            if !nk.synchs[synch].pendq.is_empty() {
                return Err(Errno::DeviceOrResourceBusy);
            }
            nk.cond_detach(synch);
            nk.synch_destroy(synch);
            Ok(())
        })?;
        self.magic.store(0, Ordering::Release);
        Ok(())
    }
}

impl Nucleus {
    /// 发信号：持有绑定的互斥锁时延迟到解锁，否则立即唤醒
    fn cond_signal(&mut self, cond: SynchId, thread: ThreadId, count: u32, cpu: usize) {
        if self.synchs[cond].pendq.is_empty() {
            return;
        }
        let held = self.synchs[cond]
            .mutex
            .filter(|&m| self.synchs.get(m).is_some())
            .filter(|&m| self.synch_owner(m) == Some(thread));

        match held {
            Some(mutex) => {
                let c = &mut self.synchs[cond];
                c.pending_signals = if count == SIGNAL_ALL {
                    SIGNAL_ALL
                } else {
                    c.pending_signals.saturating_add(count)
                };
                let m = &mut self.synchs[mutex];
                if !m.conds.contains(&cond) {
                    m.conds.push(cond);
                }
                if let Some(fastlock) = m.fastlock.as_ref() {
                    fastlock.set_flags(MutexFlags::COND_SIGNAL.bits());
                }
                log::trace!("cond: signal deferred until mutex release");
            }
            None => {
                self.cond_wake(cond, count);
                self.schedule(cpu);
            }
        }
    }

    fn cond_wake(&mut self, cond: SynchId, count: u32) {
        if count == SIGNAL_ALL {
            self.flush(cond, ThreadInfo::WAKEN);
        } else {
            for _ in 0..count {
                if self.wakeup_one_sleeper(cond).is_none() {
                    break;
                }
            }
        }
    }

    /// 投递延迟的信号（互斥锁解锁时调用）
    pub(crate) fn cond_deliver(&mut self, cond: SynchId) {
        let Some(c) = self.synchs.get_mut(cond) else {
            return;
        };
        let count = core::mem::take(&mut c.pending_signals);
        if count > 0 {
            self.cond_wake(cond, count);
        }
    }

    /// 从绑定互斥锁的延迟投递列表中摘除
    fn cond_detach(&mut self, cond: SynchId) {
        if let Some(mutex) = self.synchs[cond].mutex.take() {
            if let Some(m) = self.synchs.get_mut(mutex) {
                m.conds.retain(|&c| c != cond);
            }
        }
    }
}
