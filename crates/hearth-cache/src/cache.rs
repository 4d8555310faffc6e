use std::collections::{BTreeMap, HashMap};

use serde_json::{Map, Value};
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::slot::{Slot, SlotData, SlotKind, SlotSpec, SlotStats};

/// Registry of named cache slots.
///
/// Lookups on an unregistered name return `None` and touch no counters.
/// Reading a scalar that holds JSON `null` is indistinguishable from a miss;
/// `null` is never stored.
pub struct Cache {
    slots: HashMap<String, Slot>,
    clock: Box<dyn Clock>,
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("slots", &self.slots.len())
            .finish()
    }
}

impl Default for Cache {
    fn default() -> Self {
        Self::new()
    }
}

impl Cache {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }

    /// Create a cache whose TTLs are measured against `clock`.
    pub fn with_clock(clock: impl Clock + 'static) -> Self {
        Self {
            slots: HashMap::new(),
            clock: Box::new(clock),
        }
    }

    /// Register a slot. Registering an existing name replaces the slot and
    /// resets its counters.
    pub fn register(&mut self, name: impl Into<String>, spec: SlotSpec) {
        let name = name.into();
        debug!(slot = %name, kind = ?spec.kind, ttl = ?spec.ttl, "cache slot registered");
        let now = self.clock.now();
        self.slots.insert(name, Slot::new(spec, now));
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    /// Live container of a mapping or sequence slot.
    ///
    /// An expired slot is emptied first and counted as a miss and an
    /// expiry. Returns `None` for unregistered names and for scalar kinds,
    /// which go through [`get_val`](Self::get_val) / [`set_val`](Self::set_val).
    pub fn store(&mut self, name: &str) -> Option<&mut SlotData> {
        let now = self.clock.now();
        let slot = self.slots.get_mut(name)?;
        if matches!(slot.data.kind(), SlotKind::Scalar | SlotKind::Constant) {
            return None;
        }
        if !slot.expire_if_due(now) {
            slot.hits += 1;
        }
        Some(&mut slot.data)
    }

    /// Mutable map of a mapping slot.
    pub fn mapping(&mut self, name: &str) -> Option<&mut Map<String, Value>> {
        match self.store(name)? {
            SlotData::Mapping(map) => Some(map),
            _ => None,
        }
    }

    /// Mutable list of a sequence slot.
    pub fn sequence(&mut self, name: &str) -> Option<&mut Vec<Value>> {
        match self.store(name)? {
            SlotData::Sequence(items) => Some(items),
            _ => None,
        }
    }

    /// Copy of a scalar or constant slot's value.
    pub fn get_val(&mut self, name: &str) -> Option<Value> {
        let now = self.clock.now();
        let slot = self.slots.get_mut(name)?;
        if slot.expire_if_due(now) {
            return None;
        }
        let value = match &slot.data {
            SlotData::Scalar(value) | SlotData::Constant(value) => value.clone(),
            _ => return None,
        };
        if value.is_some() {
            slot.hits += 1;
        } else {
            slot.misses += 1;
        }
        value
    }

    /// Scalar value as an unsigned integer.
    pub fn get_u64(&mut self, name: &str) -> Option<u64> {
        self.get_val(name).and_then(|v| v.as_u64())
    }

    /// Write a scalar slot. A non-null value restarts the TTL clock; `null`
    /// empties the slot without touching the clock. Constants and containers
    /// ignore the write.
    pub fn set_val(&mut self, name: &str, value: Value) {
        let now = self.clock.now();
        let Some(slot) = self.slots.get_mut(name) else {
            return;
        };
        if let SlotData::Scalar(current) = &mut slot.data {
            if value.is_null() {
                *current = None;
            } else {
                *current = Some(value);
                slot.refreshed = now;
            }
        }
    }

    /// Clear a whole slot, or with `key` remove one entry of a mapping slot.
    pub fn invalidate(&mut self, name: &str, key: Option<&str>) {
        let now = self.clock.now();
        let Some(slot) = self.slots.get_mut(name) else {
            return;
        };
        match (key, &mut slot.data) {
            (Some(key), SlotData::Mapping(map)) => {
                map.shift_remove(key);
            }
            _ => slot.reset(now),
        }
    }

    /// Evict the oldest-inserted entries of a mapping slot until it holds at
    /// most its configured `max_size`. Returns the number evicted.
    pub fn enforce_max_size(&mut self, name: &str) -> usize {
        let Some(slot) = self.slots.get_mut(name) else {
            return 0;
        };
        let Some(max) = slot.max_size else {
            return 0;
        };
        let SlotData::Mapping(map) = &mut slot.data else {
            return 0;
        };
        let mut evicted = 0;
        while map.len() > max {
            let Some(oldest) = map.keys().next().cloned() else {
                break;
            };
            map.shift_remove(&oldest);
            evicted += 1;
        }
        if evicted > 0 {
            debug!(slot = %name, evicted, "cache slot trimmed");
        }
        evicted
    }

    /// Counters for every slot, keyed by name.
    pub fn stats(&self) -> BTreeMap<String, SlotStats> {
        self.slots
            .iter()
            .map(|(name, slot)| (name.clone(), slot.stats()))
            .collect()
    }

    /// Drop the content of every slot except constants.
    pub fn flush_all(&mut self) {
        let now = self.clock.now();
        for slot in self.slots.values_mut() {
            slot.reset(now);
        }
        debug!(slots = self.slots.len(), "cache flushed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn manual() -> (Arc<ManualClock>, Cache) {
        let clock = Arc::new(ManualClock::new());
        let cache = Cache::with_clock(clock.clone());
        (clock, cache)
    }

    #[test]
    fn unregistered_slots_are_absent() {
        let mut cache = Cache::new();
        assert!(cache.store("nope").is_none());
        assert!(cache.get_val("nope").is_none());
        cache.set_val("nope", json!(1));
        assert!(!cache.is_registered("nope"));
        assert!(cache.stats().is_empty());
    }

    #[test]
    fn scalar_roundtrip() {
        let mut cache = Cache::new();
        cache.register("n", SlotSpec::scalar());
        assert_eq!(cache.get_val("n"), None);
        cache.set_val("n", json!(41));
        assert_eq!(cache.get_u64("n"), Some(41));
        cache.set_val("n", Value::Null);
        assert_eq!(cache.get_val("n"), None);
    }

    #[test]
    fn scalar_ttl_window() {
        let (clock, mut cache) = manual();
        cache.register("v", SlotSpec::scalar().with_ttl(Duration::from_secs(10)));
        cache.set_val("v", json!("warm"));

        clock.advance(Duration::from_secs(9));
        assert_eq!(cache.get_val("v"), Some(json!("warm")));

        clock.advance(Duration::from_secs(1));
        assert_eq!(cache.get_val("v"), None);

        let stats = &cache.stats()["v"];
        assert_eq!(stats.expires, 1);
        assert_eq!(stats.hits, 1);
    }

    #[test]
    fn ttl_restarts_on_write_not_read() {
        let (clock, mut cache) = manual();
        cache.register("v", SlotSpec::scalar().with_ttl(Duration::from_secs(10)));
        cache.set_val("v", json!(1));

        clock.advance(Duration::from_secs(8));
        assert!(cache.get_val("v").is_some());
        cache.set_val("v", json!(2));

        clock.advance(Duration::from_secs(8));
        assert_eq!(cache.get_val("v"), Some(json!(2)));

        clock.advance(Duration::from_secs(2));
        assert_eq!(cache.get_val("v"), None);
    }

    #[test]
    fn null_write_does_not_restart_ttl() {
        let (clock, mut cache) = manual();
        cache.register("v", SlotSpec::scalar().with_ttl(Duration::from_secs(10)));
        cache.set_val("v", json!(1));
        clock.advance(Duration::from_secs(6));
        cache.set_val("v", Value::Null);
        cache.set_val("v", json!(3));
        clock.advance(Duration::from_secs(9));
        assert_eq!(cache.get_val("v"), Some(json!(3)));
    }

    #[test]
    fn constants_ignore_writes_and_ttl() {
        let (clock, mut cache) = manual();
        let mut spec = SlotSpec::constant(json!("k3y"));
        spec.ttl = Some(Duration::from_secs(1));
        cache.register("secret", spec);

        cache.set_val("secret", json!("other"));
        cache.invalidate("secret", None);
        clock.advance(Duration::from_secs(60));
        cache.flush_all();
        assert_eq!(cache.get_val("secret"), Some(json!("k3y")));
    }

    #[test]
    fn mapping_is_mutated_in_place() {
        let mut cache = Cache::new();
        cache.register("sessions", SlotSpec::mapping());
        cache.mapping("sessions").unwrap().insert("a".into(), json!(1));
        cache.mapping("sessions").unwrap().insert("b".into(), json!(2));
        assert_eq!(cache.mapping("sessions").unwrap().len(), 2);

        cache.invalidate("sessions", Some("a"));
        let map = cache.mapping("sessions").unwrap();
        assert!(!map.contains_key("a"));
        assert!(map.contains_key("b"));
    }

    #[test]
    fn store_refuses_scalars() {
        let mut cache = Cache::new();
        cache.register("n", SlotSpec::scalar());
        assert!(cache.store("n").is_none());
        assert!(cache.mapping("n").is_none());
    }

    #[test]
    fn sequence_expiry_returns_empty_container() {
        let (clock, mut cache) = manual();
        cache.register(
            "recent",
            SlotSpec::sequence()
                .with_ttl(Duration::from_secs(5))
                .with_initial(json!([1, 2, 3])),
        );
        assert_eq!(cache.sequence("recent").unwrap().len(), 3);

        clock.advance(Duration::from_secs(5));
        assert!(cache.sequence("recent").unwrap().is_empty());

        let stats = &cache.stats()["recent"];
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.expires, 1);
    }

    #[test]
    fn fifo_eviction_keeps_newest() {
        let mut cache = Cache::new();
        cache.register("chat", SlotSpec::mapping().with_max_size(3));
        for i in 0..5 {
            cache
                .mapping("chat")
                .unwrap()
                .insert(format!("m{i}"), json!(i));
        }
        assert_eq!(cache.enforce_max_size("chat"), 2);

        let keys: Vec<String> = cache.mapping("chat").unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["m2", "m3", "m4"]);
    }

    #[test]
    fn eviction_order_survives_single_key_invalidation() {
        let mut cache = Cache::new();
        cache.register("m", SlotSpec::mapping().with_max_size(2));
        for key in ["a", "b", "c"] {
            cache.mapping("m").unwrap().insert(key.into(), json!(key));
        }
        cache.invalidate("m", Some("b"));
        cache.mapping("m").unwrap().insert("d".into(), json!("d"));
        cache.enforce_max_size("m");

        let keys: Vec<String> = cache.mapping("m").unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["c", "d"]);
    }

    #[test]
    fn enforce_without_limit_is_noop() {
        let mut cache = Cache::new();
        cache.register("m", SlotSpec::mapping());
        cache.mapping("m").unwrap().insert("a".into(), json!(1));
        assert_eq!(cache.enforce_max_size("m"), 0);
        assert_eq!(cache.enforce_max_size("missing"), 0);
    }

    #[test]
    fn flush_all_clears_everything_but_constants() {
        let mut cache = Cache::new();
        cache.register("m", SlotSpec::mapping().with_initial(json!({"a": 1})));
        cache.register("s", SlotSpec::scalar().with_initial(json!(5)));
        cache.register("c", SlotSpec::constant(json!(7)));
        cache.flush_all();

        let stats = cache.stats();
        assert_eq!(stats["m"].size, 0);
        assert_eq!(stats["s"].size, 0);
        assert_eq!(stats["c"].size, 1);
    }

    #[test]
    fn stats_report_config() {
        let mut cache = Cache::new();
        cache.register(
            "tokens",
            SlotSpec::mapping()
                .with_ttl(Duration::from_secs(3600))
                .with_max_size(32),
        );
        let stats = &cache.stats()["tokens"];
        assert_eq!(stats.kind, SlotKind::Mapping);
        assert_eq!(stats.ttl, Some(3600));
        assert_eq!(stats.max_size, Some(32));
        assert_eq!(stats.hit_rate, 0);
    }
}
