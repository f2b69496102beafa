//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 带代数校验的句柄表 (Slab)
//!
//! 线程、同步对象之间互相引用时不持有指针，而是持有句柄。
//! 句柄 = 槽位下标 + 代数；槽位释放时代数加一，旧句柄随之失效，
//! 不会误指向复用后的新对象。
//!
//! 句柄可以打包成一个 u32 放进互斥锁的快速路径锁字里：
//! - bit 0..16: 槽位下标 + 1（0 表示"无句柄"）
//! - bit 16..31: 代数（15 位回绕）
//! - bit 31: 保留给调用者做标志位

use alloc::vec::Vec;
use core::marker::PhantomData;
use core::ops::{Index, IndexMut};

/// 代数掩码（15 位）
const GEN_MASK: u32 = 0x7fff;

/// 槽位上限（下标 + 1 必须能放进 16 位）
pub const SLAB_MAX_ENTRIES: usize = 0xffff;

/// 原始句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle {
    index: u16,
    gen: u16,
}

impl Handle {
    /// 槽位下标
    #[inline]
    pub const fn index(self) -> usize {
        self.index as usize
    }

    /// 打包成 u32，永远不为 0 且 bit 31 为 0
    #[inline]
    pub const fn to_raw(self) -> u32 {
        ((self.gen as u32 & GEN_MASK) << 16) | (self.index as u32 + 1)
    }

    /// 从 u32 解包，忽略 bit 31
    #[inline]
    pub const fn from_raw(raw: u32) -> Option<Self> {
        let idx = raw & 0xffff;
        if idx == 0 {
            return None;
        }
        Some(Handle {
            index: (idx - 1) as u16,
            gen: ((raw >> 16) & GEN_MASK) as u16,
        })
    }
}

/// 可以用作 Slab 键的强类型句柄
pub trait SlabKey: Copy {
    fn from_handle(handle: Handle) -> Self;
    fn handle(self) -> Handle;
}

/// Slab 错误
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlabError {
    /// 槽位耗尽
    Full,
}

struct Entry<T> {
    gen: u16,
    value: Option<T>,
}

/// 句柄表
pub struct Slab<K: SlabKey, T> {
    entries: Vec<Entry<T>>,
    free: Vec<u16>,
    len: usize,
    _key: PhantomData<K>,
}

impl<K: SlabKey, T> Slab<K, T> {
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
            free: Vec::new(),
            len: 0,
            _key: PhantomData,
        }
    }

    /// 插入一个值，返回其句柄
    pub fn insert(&mut self, value: T) -> Result<K, SlabError> {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                if self.entries.len() >= SLAB_MAX_ENTRIES {
                    return Err(SlabError::Full);
                }
                self.entries.push(Entry { gen: 0, value: None });
                (self.entries.len() - 1) as u16
            }
        };
        let entry = &mut self.entries[index as usize];
        entry.value = Some(value);
        self.len += 1;
        Ok(K::from_handle(Handle { index, gen: entry.gen }))
    }

    /// 移除句柄对应的值，旧句柄随之失效
    pub fn remove(&mut self, key: K) -> Option<T> {
        let handle = key.handle();
        let entry = self.entries.get_mut(handle.index())?;
        if entry.gen != handle.gen || entry.value.is_none() {
            return None;
        }
        let value = entry.value.take();
        entry.gen = (entry.gen + 1) & GEN_MASK as u16;
        self.free.push(handle.index);
        self.len -= 1;
        value
    }

    pub fn get(&self, key: K) -> Option<&T> {
        let handle = key.handle();
        self.entries
            .get(handle.index())
            .filter(|e| e.gen == handle.gen)
            .and_then(|e| e.value.as_ref())
    }

    pub fn get_mut(&mut self, key: K) -> Option<&mut T> {
        let handle = key.handle();
        self.entries
            .get_mut(handle.index())
            .filter(|e| e.gen == handle.gen)
            .and_then(|e| e.value.as_mut())
    }

    #[inline]
    pub fn contains(&self, key: K) -> bool {
        self.get(key).is_some()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 遍历所有存活的 (句柄, 值)
    pub fn iter(&self) -> impl Iterator<Item = (K, &T)> + '_ {
        self.entries.iter().enumerate().filter_map(|(i, e)| {
            e.value.as_ref().map(|v| {
                (K::from_handle(Handle { index: i as u16, gen: e.gen }), v)
            })
        })
    }
}

impl<K: SlabKey, T> Default for Slab<K, T> {
    fn default() -> Self {
        Self::new()
    }
}

/// 按句柄直接索引；句柄失效属于内部一致性错误
impl<K: SlabKey + core::fmt::Debug, T> Index<K> for Slab<K, T> {
    type Output = T;

    fn index(&self, key: K) -> &T {
        match self.get(key) {
            Some(value) => value,
            None => panic!("slab: stale handle {:?}", key),
        }
    }
}

impl<K: SlabKey + core::fmt::Debug, T> IndexMut<K> for Slab<K, T> {
    fn index_mut(&mut self, key: K) -> &mut T {
        match self.get_mut(key) {
            Some(value) => value,
            None => panic!("slab: stale handle {:?}", key),
        }
    }
}
