// 测试：多核调度与重调度 IPI
//
// 测试内容：
// 1. 远端唤醒：发起方调度时才发出 IPI，目标 CPU 在 IPI 处理中切换
// 2. 同一个目标的多次请求合并成一个 IPI
// 3. 迁移正在运行 / 就绪的线程
// 4. 亲和性检查
// 5. 只有 cpu0 推进时钟

use super::{boot, run, spawn_attr, spawn_rt};
use crate::errno::Errno;
use crate::process::thread::ThreadAttr;
use crate::sched::sched::SchedStatus;
use crate::smp::CpuSet;

#[test]
fn test_remote_wakeup() {
    let pod = boot(2);
    let root1 = pod.root(1).unwrap();

    // 测试 1: cpu0 启动 cpu1 上的线程，只记下请求
    let t = pod.create_thread(0, ThreadAttr::rt("remote", 1, 5)).unwrap();
    pod.start_thread(0, t).unwrap();
    assert!(!pod.ipi_pending(1));
    assert!(pod.sched_stats(1).unwrap().status.contains(SchedStatus::RESCHED));
    assert!(pod.sched_stats(0).unwrap().resched.contains(1));
    assert_eq!(pod.current(1), Some(root1));

    // 测试 2: cpu0 调度时发出 IPI
    assert_eq!(pod.schedule(0), Ok(None));
    assert!(pod.ipi_pending(1));
    assert_eq!(pod.ipi_count(1), 1);
    assert!(pod.sched_stats(0).unwrap().resched.is_empty());

    // 测试 3: cpu1 处理 IPI 后运行新线程
    let sw = pod.handle_ipi(1).unwrap().unwrap();
    assert_eq!((sw.cpu, sw.prev, sw.next), (1, root1, t));
    assert!(!pod.ipi_pending(1));

    // 测试 4: 没有待处理的 IPI
    assert_eq!(pod.handle_ipi(1), Ok(None));
}

#[test]
fn test_ipi_coalescing() {
    let pod = boot(2);
    let a = pod.create_thread(0, ThreadAttr::rt("a", 1, 5)).unwrap();
    let b = pod.create_thread(0, ThreadAttr::rt("b", 1, 7)).unwrap();

    // 测试 1: 两次远端唤醒只产生一个 IPI
    pod.start_thread(0, a).unwrap();
    pod.start_thread(0, b).unwrap();
    pod.schedule(0).unwrap();
    assert_eq!(pod.ipi_count(1), 1);
    assert_eq!(pod.ipi_count(0), 0);

    // 测试 2: cpu1 一次选出最高优先级
    assert_eq!(pod.handle_ipi(1).unwrap().map(|s| s.next), Some(b));
}

#[test]
fn test_migrate_running_thread() {
    let pod = boot(2);
    let t = spawn_rt(&pod, "mover", 1, 5);
    assert_eq!(run(&pod, 1), t);

    // 测试 1: 线程自己迁移到 cpu0：cpu1 让出，cpu0 收到 IPI
    pod.migrate_thread(1, t, 0).unwrap();
    assert_eq!(pod.inspect(t).unwrap().cpu, 0);
    let sw = pod.schedule(1).unwrap().unwrap();
    assert_eq!((sw.prev, sw.next), (t, pod.root(1).unwrap()));
    assert!(pod.ipi_pending(0));

    // 测试 2: cpu0 处理 IPI 后运行该线程
    assert_eq!(pod.handle_ipi(0).unwrap().map(|s| s.next), Some(t));
    assert_eq!(pod.current(0), Some(t));

    // 测试 3: 迁移到自己所在的 CPU 什么都不做
    pod.migrate_thread(0, t, 0).unwrap();
    assert_eq!(pod.schedule(0), Ok(None));
}

#[test]
fn test_migrate_ready_thread() {
    let pod = boot(2);
    let high = spawn_rt(&pod, "high", 1, 10);
    let low = spawn_rt(&pod, "low", 1, 5);
    assert_eq!(run(&pod, 1), high);

    // 测试 1: 就绪线程被动迁移
    pod.migrate_thread(1, low, 0).unwrap();
    assert_eq!(run(&pod, 1), high);
    assert_eq!(pod.handle_ipi(0).unwrap().map(|s| s.next), Some(low));
    assert_eq!(pod.inspect(low).unwrap().cpu, 0);

    // 测试 2: 亲和性不允许
    let pinned = spawn_attr(
        &pod,
        ThreadAttr::rt("pinned", 1, 3).with_affinity(CpuSet::only(1)),
    );
    assert_eq!(pod.migrate_thread(1, pinned, 0), Err(Errno::InvalidArgument));
    assert_eq!(pod.migrate_thread(1, pinned, 2), Err(Errno::InvalidArgument));
    assert_eq!(pod.inspect(pinned).unwrap().cpu, 1);

    // 测试 3: 创建在亲和性之外的 CPU 上
    let bad = ThreadAttr::rt("bad", 0, 3).with_affinity(CpuSet::only(1));
    assert_eq!(pod.create_thread(0, bad).err(), Some(Errno::InvalidArgument));
}

#[test]
fn test_clock_owner() {
    let pod = boot(2);
    pod.tick(1).unwrap();
    pod.tick(1).unwrap();
    assert_eq!(pod.clock(), 0);
    pod.tick(0).unwrap();
    assert_eq!(pod.clock(), 1);
}
