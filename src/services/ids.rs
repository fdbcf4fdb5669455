//! Identifier generation

use uuid::Uuid;

/// Source of new entity ids, injected into constructors so tests can
/// predict them
pub trait IdentifierSource: Send + Sync {
    fn next_id(&self) -> Uuid;
}

/// Random v4 UUIDs
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidSource;

impl IdentifierSource for UuidSource {
    fn next_id(&self) -> Uuid {
        Uuid::new_v4()
    }
}

/// Deterministic ids `1, 2, 3, ...` encoded as UUIDs
#[cfg(test)]
#[derive(Debug, Default)]
pub struct SequentialIds {
    counter: std::sync::atomic::AtomicU64,
}

#[cfg(test)]
impl IdentifierSource for SequentialIds {
    fn next_id(&self) -> Uuid {
        let n = self.counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
        Uuid::from_u128(n as u128)
    }
}
