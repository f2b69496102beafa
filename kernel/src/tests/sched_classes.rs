// 测试：调度类
//
// 测试内容：
// 1. 权重：rt 总是高于 weak，与优先级数值无关
// 2. set_policy 跨类切换，成员计数跟随基础调度类
// 3. tp 分区调度表按时间窗切换分区
// 4. tp 线程迁移后改按 rt 调度；被提升进 tp 的线程迁移后基础参数不变
// 5. sporadic server 预算耗尽降级、补充后恢复

use alloc::vec;

use super::{boot, run, spawn_class, spawn_rt, ticks};
use crate::config::TP_NR_PART;
use crate::errno::Errno;
use crate::process::thread::ThreadAttr;
use crate::sched::class::{ClassId, PolicyParam};
use crate::sched::sporadic::PssParam;
use crate::sched::tp::{TpSchedule, TpWindow};
use crate::sync::{LockStatus, Mutex, MutexAttr};

fn weak(prio: i32) -> PolicyParam {
    PolicyParam::Weak { prio }
}

fn tp(prio: i32, ptid: usize) -> PolicyParam {
    PolicyParam::Tp { prio, ptid }
}

#[test]
fn test_class_weight() {
    let pod = boot(1);
    let w = spawn_class(&pod, "w", 0, ClassId::Weak, weak(99));
    assert_eq!(run(&pod, 0), w);

    // 测试 1: 最低的 rt 优先级也抢占最高的 weak 优先级
    let r = spawn_rt(&pod, "r", 0, 0);
    assert_eq!(run(&pod, 0), r);
    assert!(pod.inspect(r).unwrap().wprio > pod.inspect(w).unwrap().wprio);

    // 测试 2: 参数范围
    let bad = ThreadAttr::rt("bad", 0, 0).with_policy(ClassId::Weak, weak(100));
    assert_eq!(pod.create_thread(0, bad).err(), Some(Errno::InvalidArgument));
    let idle = ThreadAttr::rt("idle", 0, 0).with_policy(ClassId::Idle, PolicyParam::Idle { prio: 0 });
    assert_eq!(pod.create_thread(0, idle).err(), Some(Errno::InvalidArgument));
}

#[test]
fn test_set_policy_across_classes() {
    let pod = boot(1);
    let w = spawn_class(&pod, "w", 0, ClassId::Weak, weak(50));
    let r = spawn_rt(&pod, "r", 0, 5);
    assert_eq!(run(&pod, 0), r);
    assert_eq!(pod.nr_threads(ClassId::Rt), 1);
    assert_eq!(pod.nr_threads(ClassId::Weak), 1);

    // 测试 1: rt -> weak，weak 内按优先级让出 CPU
    pod.set_policy(0, r, ClassId::Weak, weak(10)).unwrap();
    assert_eq!(run(&pod, 0), w);
    assert_eq!(pod.get_policy(r), Ok((ClassId::Weak, weak(10))));
    assert_eq!(pod.nr_threads(ClassId::Rt), 0);
    assert_eq!(pod.nr_threads(ClassId::Weak), 2);

    // 测试 2: 非法参数不改变原调度类
    assert_eq!(
        pod.set_policy(0, r, ClassId::Rt, PolicyParam::Rt { prio: -3 }),
        Err(Errno::InvalidArgument)
    );
    assert_eq!(
        pod.set_policy(0, r, ClassId::Idle, PolicyParam::Idle { prio: 0 }),
        Err(Errno::InvalidArgument)
    );
    assert_eq!(pod.get_policy(r), Ok((ClassId::Weak, weak(10))));

    // 测试 3: 参数与类不匹配
    assert_eq!(
        pod.set_policy(0, r, ClassId::Rt, weak(10)),
        Err(Errno::InvalidArgument)
    );

    // 测试 4: 回到 rt 立即抢占
    pod.set_policy(0, r, ClassId::Rt, PolicyParam::Rt { prio: 1 }).unwrap();
    assert_eq!(run(&pod, 0), r);
    assert_eq!(pod.nr_threads(ClassId::Weak), 1);
}

#[test]
fn test_tp_windows() {
    let pod = boot(1);
    let root = pod.root(0).unwrap();
    let a = spawn_class(&pod, "a", 0, ClassId::Tp, tp(5, 0));
    let b = spawn_class(&pod, "b", 0, ClassId::Tp, tp(5, 1));

    // 测试 1: 调度表启动之前 tp 线程不运行
    assert_eq!(run(&pod, 0), root);
    assert_eq!(pod.tp_start(0), Err(Errno::InvalidArgument));

    // 测试 2: 非法调度表
    let bad = TpSchedule {
        major_frame: 10,
        windows: vec![TpWindow { offset: 3, ptid: Some(0) }],
    };
    assert_eq!(pod.tp_install(0, bad), Err(Errno::InvalidArgument));

    // 测试 3: [0, 5) 分区 0，[5, 10) 分区 1
    let gps = TpSchedule {
        major_frame: 10,
        windows: vec![
            TpWindow { offset: 0, ptid: Some(0) },
            TpWindow { offset: 5, ptid: Some(1) },
        ],
    };
    pod.tp_install(0, gps).unwrap();
    pod.tp_start(0).unwrap();
    assert_eq!(run(&pod, 0), a);

    ticks(&pod, 0, 4);
    assert_eq!(pod.current(0), Some(a));
    assert_eq!(pod.tick(0).unwrap().map(|s| s.next), Some(b));

    // 测试 4: 主帧结束回到分区 0
    ticks(&pod, 0, 4);
    assert_eq!(pod.current(0), Some(b));
    assert_eq!(pod.tick(0).unwrap().map(|s| s.next), Some(a));

    // 测试 5: rt 线程不受时间窗限制
    let r = spawn_rt(&pod, "r", 0, 1);
    assert_eq!(run(&pod, 0), r);
    pod.suspend_thread(0, r).unwrap();
    assert_eq!(run(&pod, 0), a);

    // 测试 6: 停止调度表
    pod.tp_stop(0).unwrap();
    assert_eq!(run(&pod, 0), root);

    // 测试 7: 分区号越界
    let bad = ThreadAttr::rt("bad", 0, 0).with_policy(ClassId::Tp, tp(1, TP_NR_PART));
    assert_eq!(pod.create_thread(0, bad).err(), Some(Errno::InvalidArgument));
}

#[cfg(feature = "smp")]
#[test]
fn test_tp_migration_falls_back_to_rt() {
    let pod = boot(2);
    let t = spawn_class(&pod, "t", 0, ClassId::Tp, tp(4, 1));
    assert_eq!(pod.nr_threads(ClassId::Tp), 1);

    // 测试 1: 迁移后是 rt 线程，保持优先级
    pod.migrate_thread(0, t, 1).unwrap();
    assert_eq!(pod.get_policy(t), Ok((ClassId::Rt, PolicyParam::Rt { prio: 4 })));
    assert_eq!(pod.nr_threads(ClassId::Tp), 0);
    assert_eq!(pod.nr_threads(ClassId::Rt), 1);

    // 测试 2: 在目标 CPU 上直接可运行
    pod.schedule(0).unwrap();
    assert_eq!(pod.handle_ipi(1).unwrap().map(|s| s.next), Some(t));
    assert_eq!(pod.inspect(t).unwrap().cpu, 1);
}

#[cfg(feature = "smp")]
#[test]
fn test_migrate_boosted_into_tp() {
    let pod = boot(2);
    let w = spawn_class(&pod, "w", 0, ClassId::Weak, weak(10));
    assert_eq!(run(&pod, 0), w);
    let m = Mutex::new(&pod, MutexAttr::default()).unwrap();
    m.lock(w).unwrap();

    // 测试 1: tp 线程等待，w 被提升进 tp
    let t = spawn_class(&pod, "t", 0, ClassId::Tp, tp(50, 0));
    let gps = TpSchedule {
        major_frame: 10,
        windows: vec![TpWindow { offset: 0, ptid: Some(0) }],
    };
    pod.tp_install(0, gps).unwrap();
    pod.tp_start(0).unwrap();
    assert_eq!(run(&pod, 0), t);
    assert_eq!(m.lock(t), Ok(LockStatus::Pending));
    assert_eq!(pod.current(0), Some(w));
    let snap = pod.inspect(w).unwrap();
    assert_eq!((snap.sched_class, snap.base_class), (ClassId::Tp, ClassId::Weak));

    // 测试 2: 迁移后有效调度类换成 rt，基础参数不变
    pod.migrate_thread(0, w, 1).unwrap();
    let snap = pod.inspect(w).unwrap();
    assert_eq!((snap.sched_class, snap.base_class), (ClassId::Rt, ClassId::Weak));
    assert_eq!((snap.bprio, snap.cprio), (10, 50));
    assert_eq!(pod.get_policy(w), Ok((ClassId::Rt, PolicyParam::Rt { prio: 50 })));
    assert_eq!(pod.nr_threads(ClassId::Weak), 1);
    pod.schedule(0).unwrap();
    assert_eq!(pod.handle_ipi(1).unwrap().map(|s| s.next), Some(w));

    // 测试 3: 解锁后回到 weak 10
    m.unlock(w).unwrap();
    assert_eq!(m.owner(), Some(t));
    let snap = pod.inspect(w).unwrap();
    assert_eq!((snap.sched_class, snap.base_class), (ClassId::Weak, ClassId::Weak));
    assert_eq!((snap.bprio, snap.cprio), (10, 10));
}

#[test]
fn test_sporadic_budget() {
    let pod = boot(1);
    let s1 = spawn_class(
        &pod,
        "s1",
        0,
        ClassId::Sporadic,
        PolicyParam::Sporadic(PssParam::new(2, 10, 3, 10, 4)),
    );
    let s2 = spawn_class(
        &pod,
        "s2",
        0,
        ClassId::Sporadic,
        PolicyParam::Sporadic(PssParam::new(1, 5, 100, 200, 4)),
    );
    assert_eq!(run(&pod, 0), s1);

    // 测试 1: 三个滴答耗尽预算，降到 low_prio
    ticks(&pod, 0, 2);
    assert_eq!(pod.current(0), Some(s1));
    assert_eq!(pod.tick(0).unwrap().map(|s| s.next), Some(s2));
    assert_eq!(pod.inspect(s1).unwrap().cprio, 2);
    match pod.get_policy(s1) {
        Ok((ClassId::Sporadic, PolicyParam::Sporadic(p))) => {
            assert_eq!((p.current_prio, p.normal_prio, p.low_prio), (2, 10, 2));
        }
        other => panic!("test: unexpected policy {:?}", other),
    }

    // 测试 2: 第一次消耗后一个补充周期（第 11 个滴答）恢复
    ticks(&pod, 0, 7);
    assert_eq!(pod.current(0), Some(s2));
    assert_eq!(pod.tick(0).unwrap().map(|s| s.next), Some(s1));
    assert_eq!(pod.inspect(s1).unwrap().cprio, 10);
    assert_eq!(pod.clock(), 11);

    // 测试 3: 非法参数
    let bad = ThreadAttr::rt("bad", 0, 0).with_policy(
        ClassId::Sporadic,
        PolicyParam::Sporadic(PssParam::new(5, 5, 3, 10, 4)),
    );
    assert_eq!(pod.create_thread(0, bad).err(), Some(Errno::InvalidArgument));
}
