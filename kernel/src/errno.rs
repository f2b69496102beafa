//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 标准错误代码定义
//!
//! 和 include/uapi/asm-generic/errno.h 编号一致，只保留调度核心
//! 与互斥锁会返回的错误。

/// 标准错误代码
///
/// 互斥锁等待的几种结果互不重叠：
/// - 超时 `TimedOut`
/// - 被 unblock 打断 `InterruptedSystemCall`
/// - 对象在等待期间被删除 `InvalidArgument`
///
/// 使用方法：
/// ```rust
/// use nucleus::errno::Errno;
///
/// fn check(owner: bool) -> Result<(), Errno> {
///     if !owner {
///         return Err(Errno::OperationNotPermitted);
///     }
///     Ok(())
/// }
/// assert_eq!(check(false).unwrap_err().as_neg_i32(), -1);
/// ```
#[repr(i32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Errno {
    /// Operation not permitted (EPERM, 1)
    OperationNotPermitted = 1,

    /// No such process (ESRCH, 3)
    NoSuchProcess = 3,

    /// Interrupted system call (EINTR, 4)
    InterruptedSystemCall = 4,

    /// Try again (EAGAIN, 11)
    TryAgain = 11,

    /// Out of memory (ENOMEM, 12)
    OutOfMemory = 12,

    /// Device or resource busy (EBUSY, 16)
    DeviceOrResourceBusy = 16,

    /// Invalid argument (EINVAL, 22)
    InvalidArgument = 22,

    /// Resource deadlock would occur (EDEADLK, 35)
    ResourceDeadlock = 35,

    /// Connection timed out (ETIMEDOUT, 110)
    TimedOut = 110,
}

impl Errno {
    /// 获取错误代码的正数值（用于比较）
    #[inline]
    pub const fn as_i32(self) -> i32 {
        self as i32
    }

    /// 获取错误代码的负数值（用于系统调用返回）
    #[inline]
    pub const fn as_neg_i32(self) -> i32 {
        -(self as i32)
    }
}

/// 错误代码常量
pub mod constants {
    pub const EPERM: i32 = 1;
    pub const ESRCH: i32 = 3;
    pub const EINTR: i32 = 4;
    pub const EAGAIN: i32 = 11;
    pub const ENOMEM: i32 = 12;
    pub const EBUSY: i32 = 16;
    pub const EINVAL: i32 = 22;
    pub const EDEADLK: i32 = 35;
    pub const EWOULDBLOCK: i32 = 11;
    pub const ETIMEDOUT: i32 = 110;
}
