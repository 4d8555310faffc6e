use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The four kinds of cache slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotKind {
    /// Key/value map with reference semantics.
    Mapping,
    /// Ordered list with reference semantics.
    Sequence,
    /// Single value with copy semantics.
    Scalar,
    /// Scalar fixed at registration; writes are ignored and it never expires.
    Constant,
}

/// Registration parameters for a slot.
#[derive(Clone, Debug)]
pub struct SlotSpec {
    pub kind: SlotKind,
    /// Lifetime measured from the last refresh. `None` or zero never expires.
    pub ttl: Option<Duration>,
    /// Maximum entry count for mapping slots, enforced by
    /// [`Cache::enforce_max_size`](crate::Cache::enforce_max_size).
    pub max_size: Option<usize>,
    /// Initial content. Must be an object for mappings and an array for
    /// sequences; anything else starts the container empty.
    pub initial: Option<Value>,
}

impl SlotSpec {
    pub fn new(kind: SlotKind) -> Self {
        Self {
            kind,
            ttl: None,
            max_size: None,
            initial: None,
        }
    }

    pub fn mapping() -> Self {
        Self::new(SlotKind::Mapping)
    }

    pub fn sequence() -> Self {
        Self::new(SlotKind::Sequence)
    }

    pub fn scalar() -> Self {
        Self::new(SlotKind::Scalar)
    }

    pub fn constant(value: Value) -> Self {
        Self::new(SlotKind::Constant).with_initial(value)
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = Some(max_size);
        self
    }

    pub fn with_initial(mut self, initial: Value) -> Self {
        self.initial = Some(initial);
        self
    }
}

/// The live content of a slot.
#[derive(Clone, Debug, PartialEq)]
pub enum SlotData {
    Mapping(Map<String, Value>),
    Sequence(Vec<Value>),
    Scalar(Option<Value>),
    Constant(Option<Value>),
}

impl SlotData {
    fn from_initial(kind: SlotKind, initial: Option<Value>) -> Self {
        match kind {
            SlotKind::Mapping => match initial {
                Some(Value::Object(map)) => Self::Mapping(map),
                _ => Self::Mapping(Map::new()),
            },
            SlotKind::Sequence => match initial {
                Some(Value::Array(items)) => Self::Sequence(items),
                _ => Self::Sequence(Vec::new()),
            },
            SlotKind::Scalar => Self::Scalar(initial.filter(|v| !v.is_null())),
            SlotKind::Constant => Self::Constant(initial.filter(|v| !v.is_null())),
        }
    }

    pub fn kind(&self) -> SlotKind {
        match self {
            Self::Mapping(_) => SlotKind::Mapping,
            Self::Sequence(_) => SlotKind::Sequence,
            Self::Scalar(_) => SlotKind::Scalar,
            Self::Constant(_) => SlotKind::Constant,
        }
    }

    /// Entry count for containers; 0 or 1 for scalars.
    pub fn len(&self) -> usize {
        match self {
            Self::Mapping(map) => map.len(),
            Self::Sequence(items) => items.len(),
            Self::Scalar(value) | Self::Constant(value) => usize::from(value.is_some()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Empty the slot. Constants are left untouched.
    pub(crate) fn clear(&mut self) {
        match self {
            Self::Mapping(map) => map.clear(),
            Self::Sequence(items) => items.clear(),
            Self::Scalar(value) => *value = None,
            Self::Constant(_) => {}
        }
    }
}

/// Per-slot counters exposed for monitoring.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotStats {
    pub kind: SlotKind,
    pub size: usize,
    /// TTL in whole seconds.
    pub ttl: Option<u64>,
    pub max_size: Option<usize>,
    pub hits: u64,
    pub misses: u64,
    pub expires: u64,
    /// Hits as a rounded percentage of all lookups.
    pub hit_rate: u64,
}

pub(crate) struct Slot {
    pub(crate) data: SlotData,
    pub(crate) ttl: Option<Duration>,
    pub(crate) max_size: Option<usize>,
    pub(crate) refreshed: Instant,
    pub(crate) hits: u64,
    pub(crate) misses: u64,
    pub(crate) expires: u64,
}

impl Slot {
    pub(crate) fn new(spec: SlotSpec, now: Instant) -> Self {
        Self {
            data: SlotData::from_initial(spec.kind, spec.initial),
            ttl: spec.ttl.filter(|ttl| !ttl.is_zero()),
            max_size: spec.max_size,
            refreshed: now,
            hits: 0,
            misses: 0,
            expires: 0,
        }
    }

    pub(crate) fn is_expired(&self, now: Instant) -> bool {
        if self.data.kind() == SlotKind::Constant {
            return false;
        }
        match self.ttl {
            Some(ttl) => now.saturating_duration_since(self.refreshed) >= ttl,
            None => false,
        }
    }

    /// Clear the content and restart the TTL clock.
    pub(crate) fn reset(&mut self, now: Instant) {
        self.data.clear();
        self.refreshed = now;
    }

    /// Clear the slot if its TTL has run out, recording the expiry.
    /// Returns `true` when the slot expired.
    pub(crate) fn expire_if_due(&mut self, now: Instant) -> bool {
        if !self.is_expired(now) {
            return false;
        }
        self.reset(now);
        self.misses += 1;
        self.expires += 1;
        true
    }

    pub(crate) fn stats(&self) -> SlotStats {
        let lookups = self.hits + self.misses;
        let hit_rate = if lookups == 0 {
            0
        } else {
            (self.hits * 100 + lookups / 2) / lookups
        };
        SlotStats {
            kind: self.data.kind(),
            size: self.data.len(),
            ttl: self.ttl.map(|ttl| ttl.as_secs()),
            max_size: self.max_size,
            hits: self.hits,
            misses: self.misses,
            expires: self.expires,
            hit_rate,
        }
    }
}
