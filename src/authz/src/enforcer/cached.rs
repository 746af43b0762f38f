//! Decision cache decorator

use async_trait::async_trait;
use blake3::Hasher;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use super::Authorizer;
use crate::config::CacheConfig;
use crate::error::Result;
use crate::matcher::Value;
use crate::types::{Decision, EnforceContext};

/// Cache key type (BLAKE3 hash)
type CacheKey = [u8; 32];

/// Cached entry with TTL
#[derive(Clone)]
struct CachedEntry {
    decision: Decision,
    cached_at: Instant,
}

impl CachedEntry {
    fn new(decision: Decision) -> Self {
        Self {
            decision,
            cached_at: Instant::now(),
        }
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.cached_at.elapsed() > ttl
    }
}

/// Memoizes decisions of an inner [`Authorizer`]
///
/// Provides:
/// - Thread-safe decision map keyed by a BLAKE3 hash of the request
/// - TTL-based expiration and a capacity bound
/// - Full invalidation on every policy mutation
pub struct CachedEnforcer<E> {
    inner: E,

    /// Decision cache (thread-safe)
    cache: Arc<DashMap<CacheKey, CachedEntry>>,

    config: CacheConfig,

    /// Cache statistics
    stats: Arc<DashMap<&'static str, usize>>,
}

impl<E: Authorizer> CachedEnforcer<E> {
    pub fn new(inner: E) -> Self {
        Self::with_config(inner, CacheConfig::default())
    }

    pub fn with_config(inner: E, config: CacheConfig) -> Self {
        Self {
            inner,
            cache: Arc::new(DashMap::new()),
            config,
            stats: Arc::new(DashMap::new()),
        }
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }

    /// Mutable access to the wrapped authorizer. Clears the cache, since
    /// the caller may change anything through it.
    pub fn inner_mut(&mut self) -> &mut E {
        self.invalidate();
        &mut self.inner
    }

    /// Drop every cached decision
    pub fn invalidate(&self) {
        self.cache.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.get_stat("hits"),
            misses: self.get_stat("misses"),
            expirations: self.get_stat("expirations"),
            entries: self.cache.len(),
            max_entries: self.config.capacity,
        }
    }

    /// Compute cache key from the definitions used and the request values
    fn compute_key(ctx: &EnforceContext, rvals: &[Value]) -> CacheKey {
        let mut hasher = Hasher::new();

        for ty in [&ctx.r_type, &ctx.p_type, &ctx.e_type, &ctx.m_type] {
            hasher.update(ty.as_bytes());
            hasher.update(&[0]);
        }

        // Type tags keep `1` and `"1"` apart
        for value in rvals {
            hasher.update(value.type_name().as_bytes());
            hasher.update(value.to_string().as_bytes());
            hasher.update(&[0]);
        }

        *hasher.finalize().as_bytes()
    }

    fn get(&self, key: &CacheKey) -> Option<Decision> {
        if let Some(entry) = self.cache.get(key) {
            if entry.is_expired(self.config.ttl) {
                drop(entry);
                self.cache.remove(key);
                self.increment_stat("expirations");
                return None;
            }

            self.increment_stat("hits");
            return Some(entry.decision.clone());
        }

        self.increment_stat("misses");
        None
    }

    fn put(&self, key: CacheKey, decision: Decision) {
        if self.cache.len() >= self.config.capacity {
            self.evict_oldest();
        }
        self.cache.insert(key, CachedEntry::new(decision));
    }

    /// Evict expired entries, then the oldest tenth if still full
    fn evict_oldest(&self) {
        let ttl = self.config.ttl;
        self.cache.retain(|_, entry| !entry.is_expired(ttl));
        if self.cache.len() < self.config.capacity {
            return;
        }

        let mut ages: Vec<(CacheKey, Instant)> = self
            .cache
            .iter()
            .map(|entry| (*entry.key(), entry.value().cached_at))
            .collect();
        ages.sort_by_key(|(_, at)| *at);

        let to_remove = (self.config.capacity / 10).max(1);
        for (key, _) in ages.into_iter().take(to_remove) {
            self.cache.remove(&key);
        }
        debug!("Evicted {} cached decision(s)", to_remove);
    }

    fn increment_stat(&self, key: &'static str) {
        *self.stats.entry(key).or_insert(0) += 1;
    }

    fn get_stat(&self, key: &'static str) -> usize {
        self.stats.get(key).map(|v| *v).unwrap_or(0)
    }

    async fn cached(&self, ctx: EnforceContext, rvals: Vec<Value>) -> Result<Decision> {
        let key = Self::compute_key(&ctx, &rvals);
        if let Some(decision) = self.get(&key) {
            return Ok(decision);
        }

        let decision = self.inner.authorize_with_context(ctx, rvals).await?;
        self.put(key, decision.clone());
        Ok(decision)
    }
}

#[async_trait]
impl<E: Authorizer> Authorizer for CachedEnforcer<E> {
    async fn authorize_ex(&self, rvals: Vec<Value>) -> Result<Decision> {
        self.cached(EnforceContext::default(), rvals).await
    }

    async fn authorize_with_context(&self, ctx: EnforceContext, rvals: Vec<Value>) -> Result<Decision> {
        self.cached(ctx, rvals).await
    }

    async fn get_rules(&self, sec: &str, ptype: &str) -> Vec<Vec<String>> {
        self.inner.get_rules(sec, ptype).await
    }

    async fn get_filtered_rules(
        &self,
        sec: &str,
        ptype: &str,
        field_index: usize,
        field_values: Vec<String>,
    ) -> Vec<Vec<String>> {
        self.inner
            .get_filtered_rules(sec, ptype, field_index, field_values)
            .await
    }

    async fn has_rule(&self, sec: &str, ptype: &str, rule: Vec<String>) -> bool {
        self.inner.has_rule(sec, ptype, rule).await
    }

    async fn direct_roles(&self, ptype: &str, name: &str, domain: Option<&str>) -> Result<Vec<String>> {
        self.inner.direct_roles(ptype, name, domain).await
    }

    async fn direct_users(&self, ptype: &str, name: &str, domain: Option<&str>) -> Result<Vec<String>> {
        self.inner.direct_users(ptype, name, domain).await
    }

    async fn add_rules(&mut self, sec: &str, ptype: &str, rules: Vec<Vec<String>>) -> Result<bool> {
        let result = self.inner.add_rules(sec, ptype, rules).await;
        self.invalidate();
        result
    }

    async fn remove_rules(&mut self, sec: &str, ptype: &str, rules: Vec<Vec<String>>) -> Result<bool> {
        let result = self.inner.remove_rules(sec, ptype, rules).await;
        self.invalidate();
        result
    }

    async fn remove_filtered_rules(
        &mut self,
        sec: &str,
        ptype: &str,
        field_index: usize,
        field_values: Vec<String>,
    ) -> Result<bool> {
        let result = self
            .inner
            .remove_filtered_rules(sec, ptype, field_index, field_values)
            .await;
        self.invalidate();
        result
    }

    async fn update_rule(
        &mut self,
        sec: &str,
        ptype: &str,
        old: Vec<String>,
        new: Vec<String>,
    ) -> Result<bool> {
        let result = self.inner.update_rule(sec, ptype, old, new).await;
        self.invalidate();
        result
    }

    async fn load_policy(&mut self) -> Result<()> {
        let result = self.inner.load_policy().await;
        self.invalidate();
        result
    }

    async fn save_policy(&mut self) -> Result<()> {
        self.inner.save_policy().await
    }

    async fn clear_policy(&mut self) -> Result<()> {
        let result = self.inner.clear_policy().await;
        self.invalidate();
        result
    }
}

/// Cache statistics
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub expirations: usize,
    pub entries: usize,
    pub max_entries: usize,
}

impl CacheStats {
    /// Calculate cache hit rate
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
