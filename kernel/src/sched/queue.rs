//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 多级优先级队列
//!
//! 对应 Linux 的 kernel/sched/rt.c::rt_prio_array:
//! - 每个优先级一条 FIFO 链表
//! - 一个"非空优先级"位图，取最高优先级是 O(1)
//!
//! 同优先级内严格 FIFO；被抢占的当前线程可以插回队首 (LIFO)。

use alloc::collections::VecDeque;
use alloc::vec::Vec;

use crate::process::thread::ThreadId;

/// 队列错误
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    /// 线程不在指定优先级的队列上
    NotQueued,
}

/// 位图多级队列
pub struct SchedQueue {
    min: i32,
    max: i32,
    levels: Vec<VecDeque<ThreadId>>,
    bitmap: Vec<u64>,
    len: usize,
}

impl SchedQueue {
    /// 创建覆盖 `[min, max]` 优先级区间的队列
    pub fn new(min: i32, max: i32) -> Self {
        assert!(min <= max, "sched queue: empty priority range");
        let nr_levels = (max - min + 1) as usize;
        Self {
            min,
            max,
            levels: (0..nr_levels).map(|_| VecDeque::new()).collect(),
            bitmap: alloc::vec![0; (nr_levels + 63) / 64],
            len: 0,
        }
    }

    #[inline]
    fn level(&self, prio: i32) -> usize {
        assert!(
            prio >= self.min && prio <= self.max,
            "sched queue: priority {} out of [{}, {}]",
            prio,
            self.min,
            self.max
        );
        (prio - self.min) as usize
    }

    #[inline]
    fn mark(&mut self, level: usize) {
        self.bitmap[level / 64] |= 1u64 << (level % 64);
    }

    #[inline]
    fn unmark_if_empty(&mut self, level: usize) {
        if self.levels[level].is_empty() {
            self.bitmap[level / 64] &= !(1u64 << (level % 64));
        }
    }

    /// 最高非空级别
    fn highest_level(&self) -> Option<usize> {
        for (i, word) in self.bitmap.iter().enumerate().rev() {
            if *word != 0 {
                return Some(i * 64 + 63 - word.leading_zeros() as usize);
            }
        }
        None
    }

    /// 插入到同优先级队尾
    pub fn insert_fifo(&mut self, thread: ThreadId, prio: i32) {
        let level = self.level(prio);
        debug_assert!(!self.levels[level].contains(&thread), "sched queue: thread queued twice");
        self.levels[level].push_back(thread);
        self.mark(level);
        self.len += 1;
    }

    /// 插入到同优先级队首
    pub fn insert_lifo(&mut self, thread: ThreadId, prio: i32) {
        let level = self.level(prio);
        debug_assert!(!self.levels[level].contains(&thread), "sched queue: thread queued twice");
        self.levels[level].push_front(thread);
        self.mark(level);
        self.len += 1;
    }

    /// 按身份移除
    pub fn remove(&mut self, thread: ThreadId, prio: i32) -> Result<(), QueueError> {
        let level = self.level(prio);
        let pos = self.levels[level]
            .iter()
            .position(|t| *t == thread)
            .ok_or(QueueError::NotQueued)?;
        self.levels[level].remove(pos);
        self.unmark_if_empty(level);
        self.len -= 1;
        Ok(())
    }

    /// 最高优先级的队首（不出队）
    pub fn first(&self) -> Option<ThreadId> {
        let level = self.highest_level()?;
        self.levels[level].front().copied()
    }

    /// 最高优先级
    pub fn highest_prio(&self) -> Option<i32> {
        self.highest_level().map(|level| level as i32 + self.min)
    }

    /// 取出最高优先级的队首
    pub fn pick_highest(&mut self) -> Option<ThreadId> {
        let level = self.highest_level()?;
        let thread = self.levels[level].pop_front();
        self.unmark_if_empty(level);
        self.len -= 1;
        thread
    }

    /// 指定优先级的队首
    pub fn find(&self, prio: i32) -> Option<ThreadId> {
        if prio < self.min || prio > self.max {
            return None;
        }
        self.levels[(prio - self.min) as usize].front().copied()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 从高到低、同级 FIFO 遍历
    pub fn iter(&self) -> impl Iterator<Item = ThreadId> + '_ {
        self.levels.iter().rev().flat_map(|q| q.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::{Handle, SlabKey};

    fn tid(n: u32) -> ThreadId {
        ThreadId::from_handle(Handle::from_raw(n).unwrap())
    }

    #[test]
    fn test_pick_highest_first() {
        let mut q = SchedQueue::new(0, 257);
        q.insert_fifo(tid(1), 3);
        q.insert_fifo(tid(2), 200);
        q.insert_fifo(tid(3), 64);
        assert_eq!(q.highest_prio(), Some(200));
        assert_eq!(q.pick_highest(), Some(tid(2)));
        assert_eq!(q.pick_highest(), Some(tid(3)));
        assert_eq!(q.pick_highest(), Some(tid(1)));
        assert_eq!(q.pick_highest(), None);
        assert!(q.is_empty());
    }

    #[test]
    fn test_fifo_among_equals() {
        let mut q = SchedQueue::new(0, 99);
        q.insert_fifo(tid(1), 10);
        q.insert_fifo(tid(2), 10);
        q.insert_lifo(tid(3), 10);
        assert_eq!(q.find(10), Some(tid(3)));
        let order: Vec<ThreadId> = q.iter().collect();
        assert_eq!(order, alloc::vec![tid(3), tid(1), tid(2)]);
    }

    #[test]
    fn test_remove_absent_is_error() {
        let mut q = SchedQueue::new(0, 99);
        q.insert_fifo(tid(1), 5);
        assert_eq!(q.remove(tid(2), 5), Err(QueueError::NotQueued));
        assert_eq!(q.remove(tid(1), 6), Err(QueueError::NotQueued));
        assert_eq!(q.remove(tid(1), 5), Ok(()));
        assert_eq!(q.first(), None);
        assert_eq!(q.len(), 0);
    }

    #[test]
    fn test_pick_is_max_by_prio_then_insertion() {
        // 随机插入/删除后，队首永远是 (cprio, 入队顺序) 的最大者
        let mut q = SchedQueue::new(0, 127);
        let mut model: Vec<(i32, u32, ThreadId)> = Vec::new();
        let mut seq = 0u32;
        let mut seed = 0x2545_f491u32;
        for n in 1..200u32 {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            if seed % 4 == 0 && !model.is_empty() {
                let victim = model.remove((seed as usize / 4) % model.len());
                q.remove(victim.2, victim.0).unwrap();
            } else {
                let prio = (seed % 128) as i32;
                q.insert_fifo(tid(n), prio);
                model.push((prio, seq, tid(n)));
                seq += 1;
            }
            let expected = model
                .iter()
                .max_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)))
                .map(|e| e.2);
            assert_eq!(q.first(), expected);
        }
    }
}
