//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! SMP 支持：CPU 集合与重调度 IPI
//!
//! 对应 Linux 的 include/linux/cpumask.h 和 kernel/smp.c:
//! - `CpuSet`: 普通的 CPU 位图（线程亲和性）
//! - `CpuMask`: 原子 CPU 位图（每 CPU 的待重调度掩码，跨 CPU 读写不加锁）
//! - `IpiMailbox`: 重调度 IPI 的投递与应答

use alloc::vec::Vec;
use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// CPU 位图（最多 64 个 CPU）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CpuSet(u64);

impl CpuSet {
    pub const fn empty() -> Self {
        CpuSet(0)
    }

    /// 前 `nr_cpus` 个 CPU
    pub const fn first(nr_cpus: usize) -> Self {
        if nr_cpus >= 64 {
            CpuSet(u64::MAX)
        } else {
            CpuSet((1u64 << nr_cpus) - 1)
        }
    }

    pub const fn only(cpu: usize) -> Self {
        CpuSet(1u64 << cpu)
    }

    pub const fn from_bits(bits: u64) -> Self {
        CpuSet(bits)
    }

    #[inline]
    pub const fn bits(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn contains(self, cpu: usize) -> bool {
        cpu < 64 && self.0 & (1u64 << cpu) != 0
    }

    #[inline]
    pub fn set(&mut self, cpu: usize) {
        self.0 |= 1u64 << cpu;
    }

    #[inline]
    pub fn clear(&mut self, cpu: usize) {
        self.0 &= !(1u64 << cpu);
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn union(self, other: CpuSet) -> CpuSet {
        CpuSet(self.0 | other.0)
    }

    /// 按编号从小到大遍历
    pub fn iter(self) -> impl Iterator<Item = usize> {
        let mut bits = self.0;
        core::iter::from_fn(move || {
            if bits == 0 {
                return None;
            }
            let cpu = bits.trailing_zeros() as usize;
            bits &= bits - 1;
            Some(cpu)
        })
    }
}

/// 原子 CPU 位图
///
/// 对应 xnsched 的 resched 掩码：本 CPU 记录需要被 IPI 通知的远端 CPU。
#[derive(Debug, Default)]
pub struct CpuMask(AtomicU64);

impl CpuMask {
    pub const fn new() -> Self {
        CpuMask(AtomicU64::new(0))
    }

    #[inline]
    pub fn set(&self, cpu: usize) {
        self.0.fetch_or(1u64 << cpu, Ordering::AcqRel);
    }

    #[inline]
    pub fn test(&self, cpu: usize) -> bool {
        self.0.load(Ordering::Acquire) & (1u64 << cpu) != 0
    }

    /// 取出并清空
    #[inline]
    pub fn take(&self) -> CpuSet {
        CpuSet(self.0.swap(0, Ordering::AcqRel))
    }

    #[inline]
    pub fn snapshot(&self) -> CpuSet {
        CpuSet(self.0.load(Ordering::Acquire))
    }
}

/// 重调度 IPI 信箱
///
/// 对应 Linux 的 smp_send_reschedule() / scheduler_ipi()。
/// 发送方只置位，接收方在中断处理中应答并检查自己的 RESCHED 标志。
pub struct IpiMailbox {
    pending: CpuMask,
    count: Vec<AtomicU32>,
}

impl IpiMailbox {
    pub fn new(nr_cpus: usize) -> Self {
        Self {
            pending: CpuMask::new(),
            count: (0..nr_cpus).map(|_| AtomicU32::new(0)).collect(),
        }
    }

    /// 向一组 CPU 发送重调度 IPI
    pub fn send_resched(&self, targets: CpuSet) {
        for cpu in targets.iter() {
            if cpu >= self.count.len() {
                log::warn!("ipi: invalid target cpu {}", cpu);
                continue;
            }
            log::trace!("ipi: reschedule -> cpu {}", cpu);
            self.pending.set(cpu);
            self.count[cpu].fetch_add(1, Ordering::Relaxed);
        }
    }

    /// 应答本 CPU 的 IPI，返回是否有待处理的 IPI
    pub fn ack(&self, cpu: usize) -> bool {
        let bit = 1u64 << cpu;
        self.pending.0.fetch_and(!bit, Ordering::AcqRel) & bit != 0
    }

    pub fn is_pending(&self, cpu: usize) -> bool {
        self.pending.test(cpu)
    }

    /// 发往某个 CPU 的 IPI 总数（统计用）
    pub fn count(&self, cpu: usize) -> u32 {
        self.count.get(cpu).map_or(0, |c| c.load(Ordering::Relaxed))
    }
}
