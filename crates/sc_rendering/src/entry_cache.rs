//! 通用条目缓存
//!
//! 键值存储，带三种约束：
//! - 条目数量上限
//! - 累计字节上限
//! - 距离最后访问超过 TTL 即过期
//!
//! 超出预算时按淘汰优先级逐个移除：
//! `recency_weight * 陈旧度 + complexity_weight * 1/(1+complexity)`，
//! 陈旧度是按最后访问顺序归一化的排名（最旧为 1，最新为 0）。
//! 越旧、越容易重新计算的条目越先被淘汰。刚插入的条目不会因自身插入而被淘汰，
//! 因此单个超出整个预算的条目仍会被保留。

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::clock::{Clock, SystemClock};

/// 缓存配置
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheConfig {
    /// 最大条目数（至少为 1）
    pub max_entries: usize,
    /// 最大累计字节数
    pub max_bytes: usize,
    /// 默认过期时间，`None` 表示永不过期
    pub ttl: Option<Duration>,
    /// 周期清扫间隔
    pub sweep_interval: Duration,
    /// 陈旧度权重
    pub recency_weight: f32,
    /// 重算代价权重
    pub complexity_weight: f32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 256,
            max_bytes: 64 * 1024 * 1024,
            ttl: Some(Duration::from_secs(120)),
            sweep_interval: Duration::from_secs(5),
            recency_weight: 1.0,
            complexity_weight: 1.0,
        }
    }
}

/// 插入条目时附带的元信息
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EntryMeta {
    /// 重新生成该条目的代价估计
    pub complexity: f32,
    /// 条目占用字节数
    pub size_bytes: usize,
    /// 覆盖默认 TTL
    pub ttl: Option<Duration>,
}

impl EntryMeta {
    pub fn new(complexity: f32, size_bytes: usize) -> Self {
        Self {
            complexity,
            size_bytes,
            ttl: None,
        }
    }
}

/// 缓存条目
#[derive(Debug, Clone)]
pub struct CacheEntry<K, V> {
    pub key: K,
    pub value: V,
    pub size_bytes: usize,
    pub complexity: f32,
    pub created_at: Instant,
    pub last_accessed: Instant,
    pub ttl: Option<Duration>,
    /// 单调递增的访问序号，用于计算访问先后排名
    access_seq: u64,
}

impl<K, V> CacheEntry<K, V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.ttl
            .is_some_and(|ttl| now.saturating_duration_since(self.last_accessed) >= ttl)
    }
}

/// 缓存统计信息
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntryCacheStats {
    pub entries: usize,
    pub bytes: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
}

impl EntryCacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// 通用条目缓存
pub struct EntryCache<K, V> {
    entries: HashMap<K, CacheEntry<K, V>>,
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    total_bytes: usize,
    next_seq: u64,
    last_sweep: Instant,
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
}

impl<K, V> EntryCache<K, V>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
{
    /// 使用系统时钟创建
    pub fn new(config: CacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// 使用指定时钟创建
    pub fn with_clock(mut config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        config.max_entries = config.max_entries.max(1);
        let last_sweep = clock.now();
        Self {
            entries: HashMap::new(),
            config,
            clock,
            total_bytes: 0,
            next_seq: 0,
            last_sweep,
            hits: 0,
            misses: 0,
            evictions: 0,
            expirations: 0,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// 获取条目并刷新最后访问时间
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let now = self.clock.now();
        self.maybe_sweep(now);

        let expired = match self.entries.get(key) {
            Some(entry) => entry.is_expired(now),
            None => {
                self.misses += 1;
                return None;
            }
        };
        if expired {
            self.remove_entry(key);
            self.expirations += 1;
            self.misses += 1;
            return None;
        }

        let seq = self.bump_seq();
        self.hits += 1;
        let entry = self.entries.get_mut(key)?;
        entry.last_accessed = now;
        entry.access_seq = seq;
        Some(&entry.value)
    }

    /// 只读查看，不刷新访问时间也不计入命中统计
    pub fn peek(&self, key: &K) -> Option<&V> {
        let now = self.clock.now();
        self.entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| &entry.value)
    }

    /// 是否存在未过期的条目
    pub fn contains(&self, key: &K) -> bool {
        self.peek(key).is_some()
    }

    /// 插入或覆盖条目，然后执行淘汰直到满足预算
    pub fn set(&mut self, key: K, value: V, meta: EntryMeta) {
        let now = self.clock.now();
        self.maybe_sweep(now);

        self.remove_entry(&key);

        let seq = self.bump_seq();
        let entry = CacheEntry {
            key: key.clone(),
            value,
            size_bytes: meta.size_bytes,
            complexity: sanitize_complexity(meta.complexity),
            created_at: now,
            last_accessed: now,
            ttl: meta.ttl.or(self.config.ttl),
            access_seq: seq,
        };
        self.total_bytes = self.total_bytes.saturating_add(meta.size_bytes);
        self.entries.insert(key.clone(), entry);

        if meta.size_bytes > self.config.max_bytes {
            tracing::debug!(
                ?key,
                size = meta.size_bytes,
                budget = self.config.max_bytes,
                "keeping single entry larger than the cache budget"
            );
        }

        self.evict_until(self.config.max_entries, self.config.max_bytes, Some(&key));
    }

    /// 删除条目
    pub fn delete(&mut self, key: &K) -> Option<V> {
        self.remove_entry(key).map(|entry| entry.value)
    }

    /// 清空缓存（统计计数保留）
    pub fn clear(&mut self) {
        self.entries.clear();
        self.total_bytes = 0;
    }

    /// 移除所有已过期条目，返回移除数量
    pub fn sweep_expired(&mut self) -> usize {
        let now = self.clock.now();
        self.last_sweep = now;
        let expired: Vec<K> = self
            .entries
            .values()
            .filter(|entry| entry.is_expired(now))
            .map(|entry| entry.key.clone())
            .collect();
        for key in &expired {
            self.remove_entry(key);
        }
        self.expirations += expired.len() as u64;
        if !expired.is_empty() {
            tracing::trace!(count = expired.len(), "swept expired cache entries");
        }
        expired.len()
    }

    /// 按淘汰优先级收缩到指定字节数以下，返回淘汰数量
    pub fn shrink_to(&mut self, max_bytes: usize) -> usize {
        let before = self.evictions;
        self.evict_until(self.config.max_entries, max_bytes, None);
        (self.evictions - before) as usize
    }

    /// 调整字节预算，立即按新预算淘汰
    pub fn set_max_bytes(&mut self, max_bytes: usize) {
        self.config.max_bytes = max_bytes;
        self.evict_until(self.config.max_entries, max_bytes, None);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.keys()
    }

    pub fn stats(&self) -> EntryCacheStats {
        EntryCacheStats {
            entries: self.entries.len(),
            bytes: self.total_bytes,
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            expirations: self.expirations,
        }
    }

    /// 重置统计计数器
    pub fn reset_stats(&mut self) {
        self.hits = 0;
        self.misses = 0;
        self.evictions = 0;
        self.expirations = 0;
    }

    fn bump_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn maybe_sweep(&mut self, now: Instant) {
        if now.saturating_duration_since(self.last_sweep) >= self.config.sweep_interval {
            self.sweep_expired();
        }
    }

    fn remove_entry(&mut self, key: &K) -> Option<CacheEntry<K, V>> {
        let entry = self.entries.remove(key)?;
        self.total_bytes = self.total_bytes.saturating_sub(entry.size_bytes);
        Some(entry)
    }

    fn evict_until(&mut self, max_entries: usize, max_bytes: usize, protect: Option<&K>) {
        while self.entries.len() > max_entries || self.total_bytes > max_bytes {
            let Some(victim) = self.pick_victim(protect) else {
                break;
            };
            tracing::trace!(key = ?victim, "evicting cache entry");
            self.remove_entry(&victim);
            self.evictions += 1;
        }
    }

    /// 选出淘汰优先级最高的条目；并列时淘汰更早访问的
    fn pick_victim(&self, protect: Option<&K>) -> Option<K> {
        let mut candidates: Vec<&CacheEntry<K, V>> = self
            .entries
            .values()
            .filter(|entry| protect != Some(&entry.key))
            .collect();
        if candidates.is_empty() {
            return None;
        }
        candidates.sort_by_key(|entry| entry.access_seq);

        let span = (self.entries.len().max(2) - 1) as f32;
        let w_recency = self.config.recency_weight.max(0.0);
        let w_complexity = self.config.complexity_weight.max(0.0);

        let mut best: Option<(f32, &CacheEntry<K, V>)> = None;
        for (rank, entry) in candidates.iter().enumerate() {
            let staleness = 1.0 - rank as f32 / span;
            let cheapness = 1.0 / (1.0 + entry.complexity);
            let priority = w_recency * staleness + w_complexity * cheapness;
            // 严格大于：并列时保留排名更靠前（更旧）的候选
            if best.is_none_or(|(p, _)| priority > p) {
                best = Some((priority, entry));
            }
        }
        best.map(|(_, entry)| entry.key.clone())
    }
}

fn sanitize_complexity(complexity: f32) -> f32 {
    if complexity.is_finite() {
        complexity.max(0.0)
    } else if complexity == f32::INFINITY {
        f32::MAX
    } else {
        0.0
    }
}
