//! Rux 实时内核核心构建脚本
//!
//! 这个脚本在编译前运行，负责：
//! 1. 解析 Kernel.toml 配置文件
//! 2. 生成配置代码 (src/config.rs)
//! 3. 导出编译期环境变量

use std::env;
use std::fs;
use std::path::PathBuf;

/// 读取整数配置项，缺省时使用默认值
fn int_of(config: &toml::Value, section: &str, key: &str, default: i64) -> i64 {
    config.get(section)
        .and_then(|s| s.get(key))
        .and_then(|v| v.as_integer())
        .unwrap_or(default)
}

/// 读取字符串配置项，缺省时使用默认值
fn str_of<'a>(config: &'a toml::Value, section: &str, key: &str, default: &'a str) -> &'a str {
    config.get(section)
        .and_then(|s| s.get(key))
        .and_then(|v| v.as_str())
        .unwrap_or(default)
}

fn main() {
    println!("cargo:rerun-if-changed=../Kernel.toml");

    // Kernel.toml 缺失时全部使用默认值
    let config: toml::Value = match fs::read_to_string("../Kernel.toml") {
        Ok(content) => toml::from_str(&content).expect("Kernel.toml 解析失败"),
        Err(_) => {
            println!("cargo:warning=Kernel.toml not found, using defaults");
            toml::Value::Table(toml::map::Map::new())
        }
    };

    let name = str_of(&config, "general", "name", "Rux");
    let version = str_of(&config, "general", "version", "0.1.0");
    println!("cargo:rustc-env=CARGO_KERNEL_NAME={}", name);
    println!("cargo:rustc-env=CARGO_KERNEL_VERSION={}", version);

    let log_level = str_of(&config, "debug", "log_level", "info");
    println!("cargo:rustc-env=RUX_LOG_LEVEL={}", log_level);

    generate_config_code(&config);
}

fn generate_config_code(config: &toml::Value) {
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());

    let max_cpus = int_of(config, "smp", "max_cpus", 4);
    // 重调度掩码是 64 位原子字
    assert!(max_cpus >= 1 && max_cpus <= 64, "smp.max_cpus 必须在 1..=64 之间");

    let class_max_prio = int_of(config, "scheduler", "class_max_prio", 1024);
    let rt_min_prio = int_of(config, "scheduler", "rt_min_prio", 0);
    let rt_max_prio = int_of(config, "scheduler", "rt_max_prio", 257);
    let weak_max_prio = int_of(config, "scheduler", "weak_max_prio", 99);
    assert!(rt_min_prio >= 0 && rt_min_prio < rt_max_prio, "rt 优先级范围非法");
    assert!(rt_max_prio < class_max_prio, "rt_max_prio 必须小于 class_max_prio");
    assert!(weak_max_prio < class_max_prio, "weak_max_prio 必须小于 class_max_prio");

    let config_code = format!(
        r#"//! Rux 实时内核核心配置（自动生成）
//!
//! 此文件由 build.rs 根据 Kernel.toml 自动生成，请勿手动修改

// ============================================================
// 基本信息
// ============================================================

/// 内核名称
pub const KERNEL_NAME: &str = "{}";

/// 内核版本
pub const KERNEL_VERSION: &str = "{}";

// ============================================================
// SMP 配置
// ============================================================

/// 最大CPU数量
pub const MAX_CPUS: usize = {};

// ============================================================
// 调度器配置
// ============================================================

/// 每个调度类的优先级跨度
pub const CLASS_MAX_PRIO: i32 = {};

/// rt 类最低优先级
pub const RT_MIN_PRIO: i32 = {};

/// rt 类最高优先级
pub const RT_MAX_PRIO: i32 = {};

/// weak 类最高优先级
pub const WEAK_MAX_PRIO: i32 = {};

/// 默认时间片 (滴答数)
pub const DEFAULT_RR_QUANTUM: u64 = {};

/// tp 类分区数量
pub const TP_NR_PART: usize = {};

/// sporadic server 最大挂起补充数
pub const PSS_MAX_REPL: usize = {};

/// 看门狗阈值 (滴答数)
pub const WATCHDOG_TICKS: u32 = {};

// ============================================================
// 调试配置
// ============================================================

/// 日志级别
pub const LOG_LEVEL: &str = "{}";
"#,
        str_of(config, "general", "name", "Rux"),
        str_of(config, "general", "version", "0.1.0"),
        max_cpus,
        class_max_prio,
        rt_min_prio,
        rt_max_prio,
        weak_max_prio,
        int_of(config, "scheduler", "rr_quantum_ticks", 10),
        int_of(config, "scheduler", "tp_nr_part", 4),
        int_of(config, "scheduler", "pss_max_repl", 8),
        int_of(config, "scheduler", "watchdog_ticks", 4000),
        str_of(config, "debug", "log_level", "info"),
    );

    // 内容不变时不重写，避免触发无谓的重新编译
    let config_path = manifest_dir.join("src/config.rs");
    let unchanged = fs::read_to_string(&config_path)
        .map(|old| old == config_code)
        .unwrap_or(false);
    if !unchanged {
        fs::write(&config_path, config_code).expect("无法写入 src/config.rs");
    }
}
