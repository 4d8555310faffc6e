//! Named in-memory cache slots for the hearth record server.
//!
//! A [`Cache`] holds a set of process-wide slots, each registered once at
//! boot under a unique name. Four slot kinds exist:
//!
//! - [`SlotKind::Mapping`] -- key/value map, handed out by mutable reference
//! - [`SlotKind::Sequence`] -- ordered list, handed out by mutable reference
//! - [`SlotKind::Scalar`] -- single value, read and written by copy
//! - [`SlotKind::Constant`] -- write-once scalar fixed at registration
//!
//! Any slot except a constant may carry a TTL measured from its last
//! refresh. Mapping slots may carry a maximum entry count enforced with
//! first-in-first-out eviction when the caller asks for it.
//!
//! The cache does no locking of its own. It is owned by the application
//! context and mutated only by the single request in flight.

pub mod cache;
pub mod clock;
pub mod slot;

pub use cache::Cache;
pub use clock::{Clock, ManualClock, SystemClock};
pub use slot::{SlotData, SlotKind, SlotSpec, SlotStats};
