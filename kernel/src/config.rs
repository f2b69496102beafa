//! Rux 实时内核核心配置（自动生成）
//!
//! 此文件由 build.rs 根据 Kernel.toml 自动生成，请勿手动修改

// ============================================================
// 基本信息
// ============================================================

/// 内核名称
pub const KERNEL_NAME: &str = "Rux";

/// 内核版本
pub const KERNEL_VERSION: &str = "0.1.0";

// ============================================================
// SMP 配置
// ============================================================

/// 最大CPU数量
pub const MAX_CPUS: usize = 4;

// ============================================================
// 调度器配置
// ============================================================

/// 每个调度类的优先级跨度
pub const CLASS_MAX_PRIO: i32 = 1024;

/// rt 类最低优先级
pub const RT_MIN_PRIO: i32 = 0;

/// rt 类最高优先级
pub const RT_MAX_PRIO: i32 = 257;

/// weak 类最高优先级
pub const WEAK_MAX_PRIO: i32 = 99;

/// 默认时间片 (滴答数)
pub const DEFAULT_RR_QUANTUM: u64 = 10;

/// tp 类分区数量
pub const TP_NR_PART: usize = 4;

/// sporadic server 最大挂起补充数
pub const PSS_MAX_REPL: usize = 8;

/// 看门狗阈值 (滴答数)
pub const WATCHDOG_TICKS: u32 = 4000;

// ============================================================
// 调试配置
// ============================================================

/// 日志级别
pub const LOG_LEVEL: &str = "info";
