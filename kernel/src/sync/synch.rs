//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 同步对象核心 (xnsynch)
//!
//! 互斥锁和条件变量共用的等待队列：
//! - 等待队列按加权优先级排序（同优先级 FIFO），或纯 FIFO
//! - 带所有者的对象用快速锁字记录所有者，可选优先级继承 (PIP)
//!
//! 优先级继承：
//! - 有等待者的 PIP 对象进入所有者的 claimq；claimq 中最高的等待者比所有者的
//!   基础优先级高时，所有者被提升到该等待者的调度类和优先级
//! - 所有者自己也在等待另一个 PIP 对象时，提升沿等待链传递
//! - 等待者离开（超时、被打断、被删除）或所有者释放对象时重新评估提升

use alloc::sync::Arc;
use alloc::vec::Vec;
use bitflags::bitflags;
use core::sync::atomic::{AtomicU32, Ordering};

use crate::collection::{Handle, SlabKey};
use crate::errno::Errno;
use crate::process::pod::Nucleus;
use crate::process::thread::{ThreadId, ThreadInfo, ThreadState};
use crate::process::timer::{Deadline, Timeout};
use crate::sched::class::{ClassId, PolicyParam};

/// 同步对象句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SynchId(Handle);

impl SlabKey for SynchId {
    fn from_handle(handle: Handle) -> Self {
        SynchId(handle)
    }

    fn handle(self) -> Handle {
        self.0
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SynchFlags: u32 {
        /// 等待队列按优先级排序
        const PRIO    = 0x01;
        /// 优先级继承
        const PIP     = 0x02;
        /// 有所有者（互斥锁）
        const OWNER   = 0x08;
        /// 已进入所有者的 claimq
        const CLAIMED = 0x10;
    }
}

/// 快速锁字中的"有竞争"标志
pub const FLCLAIM: u32 = 0x8000_0000;

/// 快速锁字
///
/// `owner` 为 0 表示空闲，否则是所有者句柄，有等待者时带 FLCLAIM。
/// 无竞争的加锁/解锁只在这个字上做 CAS，不进 nklock。
#[derive(Debug, Default)]
pub struct FastLock {
    owner: AtomicU32,
    flags: AtomicU32,
}

impl FastLock {
    pub const fn new() -> Self {
        Self {
            owner: AtomicU32::new(0),
            flags: AtomicU32::new(0),
        }
    }

    /// 当前所有者
    pub fn owner(&self) -> Option<ThreadId> {
        ThreadId::from_raw(self.owner.load(Ordering::Acquire) & !FLCLAIM)
    }

    pub fn is_claimed(&self) -> bool {
        self.owner.load(Ordering::Acquire) & FLCLAIM != 0
    }

    /// 空闲时取得所有权
    #[inline]
    pub fn try_acquire(&self, thread: ThreadId) -> bool {
        self.owner
            .compare_exchange(0, thread.to_raw(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// 没有等待者时释放
    #[inline]
    pub fn try_release(&self, thread: ThreadId) -> bool {
        self.owner
            .compare_exchange(thread.to_raw(), 0, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// 锁字原值（含 FLCLAIM）
    fn raw(&self) -> u32 {
        self.owner.load(Ordering::Acquire)
    }

    /// 锁字仍为 `current` 时换成 `new`
    fn replace(&self, current: u32, new: u32) -> bool {
        self.owner
            .compare_exchange(current, new, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// 所有者仍是 `owner` 时置 FLCLAIM
    ///
    /// 所有者在快速路径上解锁后返回 false，调用者要重新尝试加锁。
    /// 置位之后所有者的快速解锁 CAS 必然失败，只能走 nklock 下的慢路径。
    fn claim_from(&self, owner: ThreadId) -> bool {
        let mut cur = self.raw();
        loop {
            if cur & !FLCLAIM != owner.to_raw() {
                return false;
            }
            if cur & FLCLAIM != 0 {
                return true;
            }
            match self.owner.compare_exchange_weak(
                cur,
                cur | FLCLAIM,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(now) => cur = now,
            }
        }
    }

    fn set_owner(&self, owner: Option<ThreadId>, claimed: bool) {
        let raw = owner.map_or(0, ThreadId::to_raw) | if claimed { FLCLAIM } else { 0 };
        self.owner.store(raw, Ordering::Release);
    }

    /// 等待队列清空时去掉 FLCLAIM
    fn clear_claimed(&self) {
        self.owner.fetch_and(!FLCLAIM, Ordering::AcqRel);
    }

    pub(crate) fn flags(&self) -> u32 {
        self.flags.load(Ordering::Acquire)
    }

    pub(crate) fn set_flags(&self, bits: u32) {
        self.flags.fetch_or(bits, Ordering::AcqRel);
    }

    pub(crate) fn clear_flags(&self, bits: u32) {
        self.flags.fetch_and(!bits, Ordering::AcqRel);
    }
}

/// 加锁结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockStatus {
    /// 已取得
    Acquired,
    /// 调用线程已阻塞，等它重新运行后再取结果
    Pending,
}

/// 同步对象
pub struct Synch {
    pub(crate) flags: SynchFlags,
    pub(crate) pendq: Vec<ThreadId>,
    pub(crate) fastlock: Option<Arc<FastLock>>,
    /// 互斥锁：有延迟信号要投递的条件变量
    pub(crate) conds: Vec<SynchId>,
    /// 条件变量：绑定的互斥锁
    pub(crate) mutex: Option<SynchId>,
    /// 条件变量：延迟投递的信号数，`u32::MAX` 表示广播
    pub(crate) pending_signals: u32,
}

impl Synch {
    fn owner(&self) -> Option<ThreadId> {
        self.fastlock.as_ref().and_then(|f| f.owner())
    }
}

impl Nucleus {
    pub(crate) fn synch_init(
        &mut self,
        flags: SynchFlags,
        fastlock: Option<Arc<FastLock>>,
    ) -> Result<SynchId, Errno> {
        debug_assert!(flags.contains(SynchFlags::OWNER) == fastlock.is_some());
        self.synchs
            .insert(Synch {
                flags,
                pendq: Vec::new(),
                fastlock,
                conds: Vec::new(),
                mutex: None,
                pending_signals: 0,
            })
            .map_err(|_| Errno::OutOfMemory)
    }

    pub(crate) fn synch_owner(&self, synch: SynchId) -> Option<ThreadId> {
        self.synchs[synch].owner()
    }

    /// 按加权优先级插入等待队列，同优先级排在后面
    fn insert_waiter(&mut self, synch: SynchId, thread: ThreadId) {
        let wprio = self.threads[thread].wprio;
        let s = &self.synchs[synch];
        let pos = if s.flags.contains(SynchFlags::PRIO) {
            s.pendq
                .iter()
                .position(|&w| self.threads[w].wprio < wprio)
                .unwrap_or(s.pendq.len())
        } else {
            s.pendq.len()
        };
        self.synchs[synch].pendq.insert(pos, thread);
    }

    /// 在无所有者的对象上等待
    pub(crate) fn sleep_on(
        &mut self,
        synch: SynchId,
        thread: ThreadId,
        timeout: Timeout,
    ) -> Result<LockStatus, Errno> {
        let deadline = timeout.deadline(self.clock);
        if deadline == Deadline::Expired {
            self.threads[thread].info.insert(ThreadInfo::TIMEO);
            return Err(Errno::TimedOut);
        }
        self.insert_waiter(synch, thread);
        self.suspend_thread(thread, ThreadState::PEND, deadline, Some(synch));
        Ok(LockStatus::Pending)
    }

    /// 所有者是否（经由等待链）在等待 `thread` 持有的对象
    fn would_deadlock(&self, owner: ThreadId, thread: ThreadId) -> bool {
        let mut cur = owner;
        for _ in 0..self.threads.len() {
            if cur == thread {
                return true;
            }
            let next = self.threads[cur]
                .wchan
                .and_then(|s| self.synchs.get(s))
                .and_then(|s| s.owner())
                .filter(|&o| self.threads.contains(o));
            match next {
                Some(next) => cur = next,
                None => return false,
            }
        }
        true
    }

    /// 取得带所有者的对象，必要时阻塞并提升所有者
    pub(crate) fn acquire(
        &mut self,
        synch: SynchId,
        thread: ThreadId,
        timeout: Timeout,
    ) -> Result<LockStatus, Errno> {
        let fastlock = match self.synchs[synch].fastlock.clone() {
            Some(fastlock) => fastlock,
            None => return Err(Errno::InvalidArgument),
        };

        let deadline = timeout.deadline(self.clock);
        let owner = loop {
            if fastlock.try_acquire(thread) {
                return Ok(LockStatus::Acquired);
            }
            let raw = fastlock.raw();
            let owner = match ThreadId::from_raw(raw & !FLCLAIM) {
                // 刚被释放
                _ if raw == 0 => continue,
                Some(owner) if self.threads.contains(owner) => owner,
                stale => {
                    // 所有者已不存在，直接接管
                    let claimed = !self.synchs[synch].pendq.is_empty();
                    let new = thread.to_raw() | if claimed { FLCLAIM } else { 0 };
                    if fastlock.replace(raw, new) {
                        log::warn!("synch: reclaimed lock from stale owner {:?}", stale);
                        return Ok(LockStatus::Acquired);
                    }
                    continue;
                }
            };
            if owner == thread {
                return Err(Errno::ResourceDeadlock);
            }
            if deadline == Deadline::Expired {
                self.threads[thread].info.insert(ThreadInfo::TIMEO);
                return Err(Errno::TimedOut);
            }
            if self.would_deadlock(owner, thread) {
                log::warn!(
                    "synch: {} would deadlock waiting on {}",
                    self.threads[thread].name,
                    self.threads[owner].name
                );
                return Err(Errno::ResourceDeadlock);
            }
            if fastlock.claim_from(owner) {
                break owner;
            }
            // 所有者刚在快速路径上解锁，重新加锁
        };

        self.insert_waiter(synch, thread);
        self.suspend_thread(thread, ThreadState::PEND, deadline, Some(synch));

        if self.synchs[synch].flags.contains(SynchFlags::PIP) {
            self.claim(synch, owner);
            self.adjust_boost(owner);
        }
        Ok(LockStatus::Pending)
    }

    fn claim(&mut self, synch: SynchId, owner: ThreadId) {
        let s = &mut self.synchs[synch];
        if !s.flags.contains(SynchFlags::CLAIMED) {
            s.flags.insert(SynchFlags::CLAIMED);
            self.threads[owner].claimq.push(synch);
        }
    }

    fn drop_claim(&mut self, synch: SynchId, owner: ThreadId) {
        let s = &mut self.synchs[synch];
        if s.flags.contains(SynchFlags::CLAIMED) {
            s.flags.remove(SynchFlags::CLAIMED);
            if let Some(t) = self.threads.get_mut(owner) {
                t.claimq.retain(|&c| c != synch);
            }
        }
    }

    /// claimq 中优先级最高的等待者
    fn top_claim_waiter(&self, owner: ThreadId) -> Option<ThreadId> {
        self.threads[owner]
            .claimq
            .iter()
            .filter_map(|&s| self.synchs.get(s).and_then(|s| s.pendq.first().copied()))
            .max_by_key(|&w| self.threads[w].wprio)
    }

    /// 按 claimq 重新评估所有者的继承提升，并沿等待链传递
    pub(crate) fn adjust_boost(&mut self, owner: ThreadId) {
        let claims: Vec<SynchId> = self.threads[owner].claimq.clone();
        for s in claims {
            if self.synchs.get(s).map_or(true, |s| s.pendq.is_empty()) {
                self.drop_claim(s, owner);
            }
        }

        let base = self.threads[owner].base_wprio();
        let boosted = self.threads[owner].state.contains(ThreadState::BOOST);
        let before = self.threads[owner].wprio;
        match self.top_claim_waiter(owner) {
            Some(top) if self.threads[top].wprio > base => {
                self.threads[owner].state.insert(ThreadState::BOOST);
                self.track_policy(owner, top);
            }
            _ if boosted => {
                self.threads[owner].state.remove(ThreadState::BOOST);
                self.track_policy(owner, owner);
            }
            _ => return,
        }

        let t = &self.threads[owner];
        log::debug!(
            "synch: {} {} to wprio {}",
            t.name,
            if t.state.contains(ThreadState::BOOST) { "boosted" } else { "unboosted" },
            t.wprio
        );
        if t.wprio != before && t.wchan.is_some() {
            self.requeue_sleeper(owner);
        }
    }

    /// 线程优先级变化后调整它在等待队列中的位置，并传递给该对象的所有者
    pub(crate) fn requeue_sleeper(&mut self, thread: ThreadId) {
        let Some(synch) = self.threads[thread].wchan else {
            return;
        };
        let flags = self.synchs[synch].flags;
        if flags.contains(SynchFlags::PRIO) {
            self.synchs[synch].pendq.retain(|&w| w != thread);
            self.insert_waiter(synch, thread);
        }
        if !flags.contains(SynchFlags::PIP) {
            return;
        }
        let Some(owner) = self.synch_owner(synch).filter(|&o| self.threads.contains(o)) else {
            return;
        };
        self.claim(synch, owner);
        self.adjust_boost(owner);
    }

    /// 修改调度参数；线程在等待时同步调整等待队列
    pub(crate) fn renice_thread(
        &mut self,
        thread: ThreadId,
        class: ClassId,
        param: &PolicyParam,
    ) -> Result<(), Errno> {
        self.set_policy(thread, class, param)?;
        if self.threads[thread].wchan.is_some() {
            self.requeue_sleeper(thread);
        }
        Ok(())
    }

    /// 把等待者从等待队列摘除（超时、被打断、被删除）
    pub(crate) fn forget_sleeper(&mut self, thread: ThreadId) {
        let Some(synch) = self.threads[thread].wchan.take() else {
            return;
        };
        let Some(s) = self.synchs.get_mut(synch) else {
            return;
        };
        s.pendq.retain(|&w| w != thread);
        let empty = s.pendq.is_empty();
        if let Some(fastlock) = s.fastlock.as_ref() {
            if empty {
                fastlock.clear_claimed();
            }
        }
        if s.flags.contains(SynchFlags::PIP) {
            if let Some(owner) = self.synch_owner(synch).filter(|&o| self.threads.contains(o)) {
                self.adjust_boost(owner);
            }
        }
    }

    /// 唤醒最高优先级的等待者
    pub(crate) fn wakeup_one_sleeper(&mut self, synch: SynchId) -> Option<ThreadId> {
        let s = &mut self.synchs[synch];
        if s.pendq.is_empty() {
            return None;
        }
        let thread = s.pendq.remove(0);
        let t = &mut self.threads[thread];
        t.wchan = None;
        t.info.insert(ThreadInfo::WAKEN);
        self.resume_thread(thread, ThreadState::PEND);
        Some(thread)
    }

    /// 唤醒所有等待者，`reason` 记入它们的信息位；返回是否有等待者
    pub(crate) fn flush(&mut self, synch: SynchId, reason: ThreadInfo) -> bool {
        let waiters = core::mem::take(&mut self.synchs[synch].pendq);
        if waiters.is_empty() {
            return false;
        }
        if let Some(owner) = self.synch_owner(synch) {
            if let Some(fastlock) = self.synchs[synch].fastlock.as_ref() {
                fastlock.clear_claimed();
            }
            self.drop_claim(synch, owner);
            if self.threads.contains(owner) {
                self.adjust_boost(owner);
            }
        }
        for thread in waiters {
            let t = &mut self.threads[thread];
            t.wchan = None;
            t.info.insert(reason);
            self.resume_thread(thread, ThreadState::PEND);
        }
        true
    }

    /// 释放带所有者的对象，所有权直接交给最高优先级的等待者
    pub(crate) fn release(&mut self, synch: SynchId, thread: ThreadId) -> Option<ThreadId> {
        let Some(fastlock) = self.synchs[synch].fastlock.clone() else {
            return None;
        };
        debug_assert_eq!(fastlock.owner(), Some(thread));

        if self.synchs[synch].flags.contains(SynchFlags::CLAIMED) {
            self.drop_claim(synch, thread);
            self.adjust_boost(thread);
        }

        let s = &mut self.synchs[synch];
        if s.pendq.is_empty() {
            fastlock.set_owner(None, false);
            return None;
        }
        let next = s.pendq.remove(0);
        let more = !s.pendq.is_empty();
        fastlock.set_owner(Some(next), more);

        let t = &mut self.threads[next];
        t.wchan = None;
        t.info.insert(ThreadInfo::WAKEN);
        self.resume_thread(next, ThreadState::PEND);

        if more && self.synchs[synch].flags.contains(SynchFlags::PIP) {
            self.claim(synch, next);
            self.adjust_boost(next);
        }
        log::trace!(
            "synch: ownership {} -> {}",
            self.threads.get(thread).map_or("<gone>", |t| t.name.as_str()),
            self.threads[next].name
        );
        Some(next)
    }

    /// 线程删除时释放它持有的所有对象
    pub(crate) fn release_all_ownerships(&mut self, thread: ThreadId) {
        let owned: Vec<SynchId> = self
            .synchs
            .iter()
            .filter(|(_, s)| s.owner() == Some(thread))
            .map(|(id, _)| id)
            .collect();
        for synch in owned {
            log::debug!("synch: {} released on owner deletion", self.threads[thread].name);
            self.mutex_release(synch, thread);
        }
    }

    /// 删除对象：所有等待者以 RMID 唤醒；返回是否有等待者
    pub(crate) fn synch_destroy(&mut self, synch: SynchId) -> bool {
        let flushed = self.flush(synch, ThreadInfo::RMID);
        if let Some(owner) = self.synch_owner(synch) {
            self.drop_claim(synch, owner);
        }
        self.synchs.remove(synch);
        flushed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tid(raw: u32) -> ThreadId {
        match ThreadId::from_raw(raw) {
            Some(t) => t,
            None => panic!("test: bad thread handle {:#x}", raw),
        }
    }

    #[test]
    fn test_claim_follows_owner() {
        let lock = FastLock::new();
        let a = tid(1);
        assert!(lock.try_acquire(a));

        // 所有者没变：置 FLCLAIM，之后快速解锁失败
        assert!(lock.claim_from(a));
        assert!(lock.is_claimed());
        assert!(!lock.try_release(a));
        lock.clear_claimed();
        assert_eq!(lock.owner(), Some(a));
    }

    #[test]
    fn test_claim_after_fast_release() {
        let lock = FastLock::new();
        let a = tid(1);
        let b = tid(2);
        assert!(lock.try_acquire(a));

        // a 在快速路径上解锁：按旧所有者置位失败，锁字保持为 0
        assert!(lock.try_release(a));
        assert!(!lock.claim_from(a));
        assert!(!lock.is_claimed());
        assert_eq!(lock.owner(), None);

        // 所有者已换成 b 时同样失败
        assert!(lock.try_acquire(b));
        assert!(!lock.claim_from(a));
        assert!(lock.claim_from(b));
        assert_eq!(lock.owner(), Some(b));
    }
}
