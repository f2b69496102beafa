//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 调度类注册表
//!
//! 编译进来的调度类按权重从高到低排成一张表，pick_next 按这个顺序询问。
//! 表在第一次访问时建立，之后只读。

use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, Ordering};
use lazy_static::lazy_static;

use crate::sched::class::{ClassId, SchedClass};

lazy_static! {
    static ref SCHED_CLASSES: Vec<&'static dyn SchedClass> = {
        let mut classes: Vec<&'static dyn SchedClass> = Vec::new();
        classes.push(ClassId::Idle.ops());
        classes.push(ClassId::Rt.ops());
        #[cfg(feature = "sched-weak")]
        classes.push(ClassId::Weak.ops());
        #[cfg(feature = "sched-tp")]
        classes.push(ClassId::Tp.ops());
        #[cfg(feature = "sched-sporadic")]
        classes.push(ClassId::Sporadic.ops());
        classes.sort_by(|a, b| b.weight().cmp(&a.weight()));
        classes
    };
}

static CLASSES_READY: AtomicBool = AtomicBool::new(false);

/// 按权重降序的调度类表，idle 总在最后
pub fn classes() -> &'static [&'static dyn SchedClass] {
    &SCHED_CLASSES
}

pub fn lookup_name(name: &str) -> Option<ClassId> {
    classes().iter().find(|c| c.name() == name).map(|c| c.id())
}

/// 按策略编号查找；SCHED_RR 由 rt 类承担
pub fn lookup_policy(policy: i32) -> Option<ClassId> {
    if policy == crate::sched::class::SCHED_RR {
        return Some(ClassId::Rt);
    }
    classes().iter().find(|c| c.policy() == policy).map(|c| c.id())
}

/// 权重次低的调度类
pub fn next_class(class: ClassId) -> Option<ClassId> {
    let pos = classes().iter().position(|c| c.id() == class)?;
    classes().get(pos + 1).map(|c| c.id())
}

/// 子系统启动：依次初始化各调度类（只做一次）
pub fn init_classes() {
    if CLASSES_READY.swap(true, Ordering::AcqRel) {
        return;
    }
    for class in classes() {
        class.class_init();
    }
}

/// 子系统关闭：按相反顺序清理各调度类
pub fn cleanup_classes() {
    if !CLASSES_READY.swap(false, Ordering::AcqRel) {
        return;
    }
    for class in classes().iter().rev() {
        class.class_cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weight_order() {
        let list = classes();
        for pair in list.windows(2) {
            assert!(pair[0].weight() > pair[1].weight());
        }
        assert_eq!(list[0].id(), ClassId::Rt);
        assert_eq!(list[list.len() - 1].id(), ClassId::Idle);
        assert_eq!(next_class(ClassId::Idle), None);
    }

    #[test]
    fn test_lookup() {
        use crate::sched::class::{SCHED_FIFO, SCHED_IDLE, SCHED_RR};

        assert_eq!(lookup_name("rt"), Some(ClassId::Rt));
        assert_eq!(lookup_name("idle"), Some(ClassId::Idle));
        assert_eq!(lookup_name("nope"), None);
        assert_eq!(lookup_policy(SCHED_FIFO), Some(ClassId::Rt));
        assert_eq!(lookup_policy(SCHED_RR), Some(ClassId::Rt));
        assert_eq!(lookup_policy(SCHED_IDLE), Some(ClassId::Idle));
        assert_eq!(lookup_policy(99), None);
    }
}
