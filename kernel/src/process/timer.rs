//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 线程超时定时器
//!
//! 对应 xntimer 的一个子集：每个线程最多一个超时定时器 (rtimer)，
//! 按绝对到期时间排序，时钟中断时批量到期。

use alloc::collections::BTreeSet;
use alloc::vec::Vec;

use crate::process::thread::ThreadId;

/// 时钟滴答
pub type Ticks = u64;

/// 等待超时
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// 永不超时
    Infinite,
    /// 相对当前时刻；0 表示立即超时
    Relative(Ticks),
    /// 绝对时刻；不晚于当前时刻表示立即超时
    Absolute(Ticks),
}

/// 换算后的到期时间
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Deadline {
    Never,
    At(Ticks),
    /// 已经过期，不必睡眠
    Expired,
}

impl Timeout {
    pub(crate) fn deadline(self, now: Ticks) -> Deadline {
        match self {
            Timeout::Infinite => Deadline::Never,
            Timeout::Relative(0) => Deadline::Expired,
            Timeout::Relative(delta) => Deadline::At(now.saturating_add(delta)),
            Timeout::Absolute(date) if date <= now => Deadline::Expired,
            Timeout::Absolute(date) => Deadline::At(date),
        }
    }
}

/// 定时器队列
#[derive(Default)]
pub struct TimerQueue {
    entries: BTreeSet<(Ticks, ThreadId)>,
}

impl TimerQueue {
    pub const fn new() -> Self {
        Self { entries: BTreeSet::new() }
    }

    pub fn arm(&mut self, date: Ticks, thread: ThreadId) {
        self.entries.insert((date, thread));
    }

    pub fn cancel(&mut self, date: Ticks, thread: ThreadId) -> bool {
        self.entries.remove(&(date, thread))
    }

    /// 取出所有到期时间不晚于 `now` 的线程，按到期先后排列
    pub fn expire(&mut self, now: Ticks) -> Vec<ThreadId> {
        let mut expired = Vec::new();
        while let Some(&(date, thread)) = self.entries.first() {
            if date > now {
                break;
            }
            self.entries.pop_first();
            expired.push(thread);
        }
        expired
    }

    pub fn next_date(&self) -> Option<Ticks> {
        self.entries.first().map(|(date, _)| *date)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
