//! Injectable marker ID generation.
//!
//! Every directive gets a stable opaque identifier the first time one is
//! needed (marker encoding, key defaulting). The generator is supplied by
//! the [`Document`](crate::dom::Document) rather than read from a global, so
//! deterministic runs are a constructor argument away.

use std::cell::Cell;
use std::fmt;

use ulid::Ulid;

/// Opaque identifier for a directive and its marker
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MarkerId(String);

impl MarkerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MarkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MarkerId {
    fn from(s: &str) -> Self {
        MarkerId(s.to_string())
    }
}

/// A source of fresh marker IDs
pub trait IdSource {
    fn next_id(&self) -> MarkerId;
}

/// Monotonic counter source. Deterministic; the default.
#[derive(Debug, Default)]
pub struct CounterIds {
    next: Cell<u64>,
}

impl CounterIds {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdSource for CounterIds {
    fn next_id(&self) -> MarkerId {
        let n = self.next.get();
        self.next.set(n + 1);
        MarkerId(format!("d{}", n))
    }
}

/// Random source backed by ULIDs. Collision-resistant across documents,
/// suitable when rendered markers may be mixed from several engines.
#[derive(Debug, Default)]
pub struct UlidIds;

impl UlidIds {
    pub fn new() -> Self {
        Self
    }
}

impl IdSource for UlidIds {
    fn next_id(&self) -> MarkerId {
        MarkerId(Ulid::new().to_string().to_ascii_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_ids_are_sequential() {
        let ids = CounterIds::new();
        assert_eq!(ids.next_id().as_str(), "d0");
        assert_eq!(ids.next_id().as_str(), "d1");
        assert_eq!(ids.next_id().as_str(), "d2");
    }

    #[test]
    fn test_ulid_ids_are_distinct() {
        let ids = UlidIds::new();
        let a = ids.next_id();
        let b = ids.next_id();
        assert_ne!(a, b);
    }
}
