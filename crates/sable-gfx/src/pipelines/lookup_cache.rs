use std::hash::{BuildHasher, BuildHasherDefault, Hash};
use std::rc::Rc;

use rustc_hash::FxHasher;

/// 默认的查找缓存槽位数
pub const GFX_PIPELINE_LOOKUP_CACHE_SIZE: usize = 4096;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GfxLookupCacheStats {
    pub hits: u64,
    pub misses: u64,
    /// 因为哈希冲突被覆盖掉的条目数
    pub evictions: u64,
}

/// 定长、直接映射的 pipeline 查找缓存
///
/// 每个 key 只可能落在 `hash(key) % capacity` 这一个槽位上，冲突时直接覆盖旧条目。
/// 被覆盖的 pipeline 只是从缓存中移除，之后再次需要时重新构建，因此淘汰只影响查找开销，不影响正确性。
/// 内存占用在创建时就固定下来，不会随 shader 组合的数量增长。
pub struct GfxPipelineLookupCache<K, V> {
    slots: Box<[Option<(K, Rc<V>)>]>,
    hasher: BuildHasherDefault<FxHasher>,
    stats: GfxLookupCacheStats,
}

impl<K: Hash + Eq + Clone, V> Default for GfxPipelineLookupCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Hash + Eq + Clone, V> GfxPipelineLookupCache<K, V> {
    pub fn new() -> Self {
        Self::with_capacity(GFX_PIPELINE_LOOKUP_CACHE_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "lookup cache needs at least one slot");
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            hasher: BuildHasherDefault::default(),
            stats: GfxLookupCacheStats::default(),
        }
    }

    #[inline]
    fn slot_index(&self, key: &K) -> usize {
        (self.hasher.hash_one(key) % self.slots.len() as u64) as usize
    }

    /// 查找 key 对应的 pipeline，未命中时返回 None
    pub fn lookup(&mut self, key: &K) -> Option<Rc<V>> {
        let index = self.slot_index(key);
        match &self.slots[index] {
            Some((cached_key, value)) if cached_key == key => {
                self.stats.hits += 1;
                Some(value.clone())
            }
            _ => {
                self.stats.misses += 1;
                None
            }
        }
    }

    /// 插入条目，返回被覆盖的旧 pipeline（如果 key 不同）
    pub fn insert(&mut self, key: K, value: Rc<V>) -> Option<Rc<V>> {
        let index = self.slot_index(&key);
        let evicted = match self.slots[index].take() {
            Some((old_key, old_value)) if old_key != key => {
                self.stats.evictions += 1;
                Some(old_value)
            }
            _ => None,
        };
        self.slots[index] = Some((key, value));
        evicted
    }

    /// 查找，未命中时使用 `create` 构建并插入
    pub fn get_or_try_insert_with<E>(&mut self, key: &K, create: impl FnOnce() -> Result<V, E>) -> Result<Rc<V>, E> {
        if let Some(value) = self.lookup(key) {
            return Ok(value);
        }

        let value = Rc::new(create()?);
        if self.insert(key.clone(), value.clone()).is_some() {
            log::debug!("pipeline lookup cache: slot collision, previous entry evicted");
        }
        Ok(value)
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// 当前被占用的槽位数
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn stats(&self) -> GfxLookupCacheStats {
        self.stats
    }
}
