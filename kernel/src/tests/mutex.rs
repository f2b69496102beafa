// 测试：实时互斥锁
//
// 测试内容：
// 1. 快速路径加锁 / 解锁，普通锁重复加锁报死锁
// 2. 递归锁计数
// 3. trylock 与非所有者解锁
// 4. 等待者被打断、锁被删除
// 5. 两把锁的循环等待
// 6. 所有者被删除时所有权交给等待者
// 7. 等待者按优先级得到锁；release 不重新调度
// 8. 两个 CPU 上并发加锁 / 解锁：互斥，且等待者不会挂在空闲的锁上

use core::sync::atomic::{AtomicU32, Ordering};
use std::thread;

use super::{boot, run, spawn_rt};
use crate::errno::Errno;
use crate::process::pod::Pod;
use crate::process::thread::{ThreadId, ThreadState};
use crate::sync::{LockStatus, Mutex, MutexAttr, MutexKind};

fn recursive() -> MutexAttr {
    MutexAttr {
        kind: MutexKind::Recursive,
        ..MutexAttr::default()
    }
}

#[test]
fn test_fast_path() {
    let pod = boot(1);
    let t = spawn_rt(&pod, "t", 0, 5);
    let other = spawn_rt(&pod, "other", 0, 1);
    assert_eq!(run(&pod, 0), t);
    let m = Mutex::new(&pod, MutexAttr::default()).unwrap();

    // 测试 1: 无竞争加锁
    assert_eq!(m.lock(t), Ok(LockStatus::Acquired));
    assert_eq!(m.owner(), Some(t));
    assert_eq!(m.lock_count(), 1);

    // 测试 2: 普通锁重复加锁
    assert_eq!(m.lock(t), Err(Errno::ResourceDeadlock));
    assert_eq!(m.trylock(t), Err(Errno::DeviceOrResourceBusy));

    // 测试 3: 其它线程 trylock 不阻塞
    assert_eq!(m.trylock(other), Err(Errno::DeviceOrResourceBusy));
    assert!(!pod.inspect(other).unwrap().state.contains(ThreadState::PEND));

    // 测试 4: 非所有者解锁
    assert_eq!(m.unlock(other), Err(Errno::OperationNotPermitted));

    // 测试 5: 解锁后可以销毁，销毁后不可再用
    assert_eq!(m.destroy(), Err(Errno::DeviceOrResourceBusy));
    m.unlock(t).unwrap();
    assert_eq!(m.owner(), None);
    assert_eq!(m.unlock(t), Err(Errno::OperationNotPermitted));
    m.destroy().unwrap();
    assert_eq!(m.lock(t), Err(Errno::InvalidArgument));
}

#[test]
fn test_recursive() {
    let pod = boot(1);
    let t = spawn_rt(&pod, "t", 0, 5);
    assert_eq!(run(&pod, 0), t);
    let m = Mutex::new(&pod, recursive()).unwrap();

    // 测试 1: 重复加锁计数
    m.lock(t).unwrap();
    m.lock(t).unwrap();
    m.trylock(t).unwrap();
    assert_eq!(m.lock_count(), 3);

    // 测试 2: 最后一次解锁才释放
    m.unlock(t).unwrap();
    m.unlock(t).unwrap();
    assert_eq!(m.owner(), Some(t));
    m.unlock(t).unwrap();
    assert_eq!(m.owner(), None);
    assert_eq!(m.lock_count(), 0);
}

#[test]
fn test_contended_handoff() {
    let pod = boot(1);
    let low = spawn_rt(&pod, "low", 0, 2);
    assert_eq!(run(&pod, 0), low);
    let m = Mutex::new(&pod, MutexAttr::default()).unwrap();
    m.lock(low).unwrap();

    // 测试 1: 高优先级线程阻塞在锁上
    let high = spawn_rt(&pod, "high", 0, 5);
    assert_eq!(run(&pod, 0), high);
    assert_eq!(m.lock(high), Ok(LockStatus::Pending));
    assert_eq!(pod.current(0), Some(low));
    assert_eq!(m.lock_finish(high), Err(Errno::TryAgain));

    // 测试 2: 解锁直接把所有权交给等待者
    m.unlock(low).unwrap();
    assert_eq!(m.owner(), Some(high));
    assert_eq!(pod.current(0), Some(high));
    assert_eq!(m.lock_finish(high), Ok(()));
    assert_eq!(m.lock_count(), 1);

    // 测试 3: 没有等待者时走快速路径
    m.unlock(high).unwrap();
    assert_eq!(m.owner(), None);
}

#[test]
fn test_interrupted_waiter() {
    let pod = boot(1);
    let low = spawn_rt(&pod, "low", 0, 2);
    assert_eq!(run(&pod, 0), low);
    let m = Mutex::new(&pod, MutexAttr::default()).unwrap();
    m.lock(low).unwrap();

    let high = spawn_rt(&pod, "high", 0, 5);
    run(&pod, 0);
    assert_eq!(m.lock(high), Ok(LockStatus::Pending));
    assert_eq!(pod.inspect(low).unwrap().cprio, 5);

    // 测试 1: 打断等待，所有者的提升撤销
    assert_eq!(pod.unblock_thread(0, high), Ok(true));
    assert_eq!(run(&pod, 0), high);
    assert_eq!(m.lock_finish(high), Err(Errno::InterruptedSystemCall));
    let snap = pod.inspect(low).unwrap();
    assert_eq!(snap.cprio, 2);
    assert!(!snap.state.contains(ThreadState::BOOST));

    // 测试 2: 所有权不变，等待队列已空
    assert_eq!(m.owner(), Some(low));
    pod.suspend_thread(0, high).unwrap();
    assert_eq!(run(&pod, 0), low);
    m.unlock(low).unwrap();
    assert_eq!(m.owner(), None);
}

#[test]
fn test_delete_with_waiter() {
    let pod = boot(1);
    let low = spawn_rt(&pod, "low", 0, 2);
    assert_eq!(run(&pod, 0), low);
    let m = Mutex::new(&pod, MutexAttr::default()).unwrap();
    m.lock(low).unwrap();

    let high = spawn_rt(&pod, "high", 0, 5);
    run(&pod, 0);
    assert_eq!(m.lock(high), Ok(LockStatus::Pending));

    // 测试 1: 删除时唤醒等待者
    assert_eq!(m.delete(0), Ok(true));
    assert_eq!(pod.current(0), Some(high));
    assert_eq!(m.lock_finish(high), Err(Errno::InvalidArgument));
    assert_eq!(pod.inspect(low).unwrap().cprio, 2);

    // 测试 2: 删除后的锁不可用
    assert_eq!(m.trylock(high), Err(Errno::InvalidArgument));
}

#[test]
fn test_deadlock_cycle() {
    let pod = boot(1);
    let a = spawn_rt(&pod, "a", 0, 5);
    let b = spawn_rt(&pod, "b", 0, 4);
    assert_eq!(run(&pod, 0), a);
    let m1 = Mutex::new(&pod, MutexAttr::default()).unwrap();
    let m2 = Mutex::new(&pod, MutexAttr::default()).unwrap();

    m1.lock(a).unwrap();
    m2.lock(b).unwrap();

    // 测试 1: a 等待 b 持有的 m2，b 被提升后运行
    assert_eq!(m2.lock(a), Ok(LockStatus::Pending));
    assert_eq!(pod.current(0), Some(b));
    assert_eq!(pod.inspect(b).unwrap().cprio, 5);

    // 测试 2: b 再等待 a 持有的 m1 会形成环
    assert_eq!(m1.lock(b), Err(Errno::ResourceDeadlock));
    assert!(!pod.inspect(b).unwrap().state.contains(ThreadState::PEND));

    // 测试 3: b 解开 m2，a 得到锁
    m2.unlock(b).unwrap();
    assert_eq!(pod.current(0), Some(a));
    assert_eq!(m2.lock_finish(a), Ok(()));
    assert_eq!(pod.inspect(b).unwrap().cprio, 4);
}

#[test]
fn test_owner_deleted() {
    let pod = boot(1);
    let low = spawn_rt(&pod, "low", 0, 2);
    assert_eq!(run(&pod, 0), low);
    let m = Mutex::new(&pod, MutexAttr::default()).unwrap();
    m.lock(low).unwrap();

    let high = spawn_rt(&pod, "high", 0, 5);
    run(&pod, 0);
    assert_eq!(m.lock(high), Ok(LockStatus::Pending));
    assert_eq!(pod.current(0), Some(low));

    // 测试 1: 删除所有者，等待者得到锁
    pod.delete_thread(0, low).unwrap();
    assert_eq!(m.owner(), Some(high));
    assert_eq!(run(&pod, 0), high);
    assert_eq!(m.lock_finish(high), Ok(()));
    assert!(pod.inspect(low).is_none());

    // 测试 2: 新所有者正常解锁
    m.unlock(high).unwrap();
    assert_eq!(m.owner(), None);
}

#[test]
fn test_waiter_priority_order() {
    let pod = boot(1);
    let owner = spawn_rt(&pod, "owner", 0, 20);
    let w1 = spawn_rt(&pod, "w1", 0, 1);
    let w5 = spawn_rt(&pod, "w5", 0, 5);
    let w10 = spawn_rt(&pod, "w10", 0, 10);
    assert_eq!(run(&pod, 0), owner);
    let m = Mutex::new(&pod, MutexAttr::default()).unwrap();
    m.lock(owner).unwrap();

    // 测试 1: 按 1 / 5 / 10 的顺序阻塞，所有者不被提升
    for w in [w1, w5, w10] {
        assert_eq!(m.lock(w), Ok(LockStatus::Pending));
    }
    assert_eq!(pod.current(0), Some(owner));
    assert!(!pod.inspect(owner).unwrap().state.contains(ThreadState::BOOST));

    // 测试 2: 最高优先级的等待者先得到锁
    m.unlock(owner).unwrap();
    assert_eq!(m.owner(), Some(w10));
    pod.suspend_thread(0, owner).unwrap();
    assert_eq!(run(&pod, 0), w10);
    assert_eq!(m.lock_finish(w10), Ok(()));

    // 测试 3: 然后是 5，最后是 1
    m.unlock(w10).unwrap();
    assert_eq!(m.owner(), Some(w5));
    pod.suspend_thread(0, w10).unwrap();
    assert_eq!(run(&pod, 0), w5);
    m.unlock(w5).unwrap();
    assert_eq!(m.owner(), Some(w1));
}

#[test]
fn test_release_without_schedule() {
    let pod = boot(1);
    let low = spawn_rt(&pod, "low", 0, 2);
    assert_eq!(run(&pod, 0), low);
    let m = Mutex::new(&pod, MutexAttr::default()).unwrap();

    // 测试 1: 没有等待者，走快速路径
    m.lock(low).unwrap();
    assert_eq!(m.release(low), Ok(false));
    assert_eq!(m.owner(), None);

    // 测试 2: 交给等待者，但不切换
    m.lock(low).unwrap();
    let high = spawn_rt(&pod, "high", 0, 5);
    run(&pod, 0);
    assert_eq!(m.lock(high), Ok(LockStatus::Pending));
    assert_eq!(m.release(low), Ok(true));
    assert_eq!(m.owner(), Some(high));
    assert_eq!(pod.current(0), Some(low));

    // 测试 3: 调用者自己重新调度
    assert_eq!(run(&pod, 0), high);
    assert_eq!(m.lock_finish(high), Ok(()));
}

/// 阻塞的加锁：一边处理本 CPU 的 IPI，一边等所有权交到手上
fn wait_grant(pod: &Pod, m: &Mutex<'_>, me: ThreadId, cpu: usize) {
    for _ in 0..50_000_000u64 {
        match m.lock_finish(me) {
            Ok(()) => return,
            Err(Errno::TryAgain) => {
                pod.handle_ipi(cpu).unwrap();
                core::hint::spin_loop();
            }
            Err(e) => panic!("test: lock_finish failed: {:?}", e),
        }
    }
    panic!(
        "test: waiter never granted, owner {:?} claimed {}",
        m.owner(),
        m.fastlock.is_claimed()
    );
}

#[cfg(feature = "smp")]
#[test]
fn test_concurrent_lock_unlock() {
    const ROUNDS: usize = 20_000;
    let pod = boot(2);
    let a = spawn_rt(&pod, "a", 0, 5);
    let b = spawn_rt(&pod, "b", 1, 5);
    assert_eq!(run(&pod, 0), a);
    assert_eq!(run(&pod, 1), b);
    let m = Mutex::new(&pod, MutexAttr::default()).unwrap();
    let inside = AtomicU32::new(0);
    let acquired = AtomicU32::new(0);

    let worker = |me: ThreadId, cpu: usize| {
        for i in 0..ROUNDS {
            let held = if i % 4 == 3 {
                match m.trylock(me) {
                    Ok(()) => true,
                    Err(Errno::DeviceOrResourceBusy) => false,
                    Err(e) => panic!("test: trylock failed: {:?}", e),
                }
            } else {
                match m.lock(me) {
                    Ok(LockStatus::Acquired) => true,
                    Ok(LockStatus::Pending) => {
                        wait_grant(&pod, &m, me, cpu);
                        true
                    }
                    Err(e) => panic!("test: lock failed: {:?}", e),
                }
            };
            if !held {
                continue;
            }
            // 测试 1: 临界区里只有一个所有者
            assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
            assert_eq!(m.owner(), Some(me));
            acquired.fetch_add(1, Ordering::Relaxed);
            inside.fetch_sub(1, Ordering::SeqCst);
            m.unlock(me).unwrap();
        }
    };

    thread::scope(|s| {
        s.spawn(|| worker(a, 0));
        s.spawn(|| worker(b, 1));
    });

    // 测试 2: 结束时锁空闲，没有残留的竞争标志和等待者
    assert_eq!(m.owner(), None);
    assert!(!m.fastlock.is_claimed());
    for t in [a, b] {
        assert!(!pod.inspect(t).unwrap().state.contains(ThreadState::PEND));
    }
    assert!(acquired.load(Ordering::Relaxed) as usize >= ROUNDS);
}
