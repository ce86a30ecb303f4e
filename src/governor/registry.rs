//! Live-position registry
//!
//! At most one pending or live position per mint. The governor reserves a
//! mint before submitting the buy; the reservation becomes live once the
//! buy confirms and is released when the position closes or the buy fails.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use solana_sdk::pubkey::Pubkey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// Buy submitted or being reconciled
    Pending,
    Live,
}

#[derive(Default)]
pub struct PositionRegistry {
    slots: DashMap<Pubkey, Slot>,
}

impl PositionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically claim `mint`; `false` when it is already pending or live
    pub fn reserve(&self, mint: &Pubkey) -> bool {
        match self.slots.entry(*mint) {
            Entry::Occupied(_) => false,
            Entry::Vacant(vacant) => {
                vacant.insert(Slot::Pending);
                true
            }
        }
    }

    pub fn mark_live(&self, mint: &Pubkey) {
        self.slots.insert(*mint, Slot::Live);
    }

    pub fn release(&self, mint: &Pubkey) {
        self.slots.remove(mint);
    }

    pub fn contains(&self, mint: &Pubkey) -> bool {
        self.slots.contains_key(mint)
    }

    pub fn slot(&self, mint: &Pubkey) -> Option<Slot> {
        self.slots.get(mint).map(|slot| *slot)
    }

    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|s| *s.value() == Slot::Live).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserve_is_exclusive() {
        let registry = PositionRegistry::new();
        let mint = Pubkey::new_unique();

        assert!(registry.reserve(&mint));
        assert!(!registry.reserve(&mint));
        assert_eq!(registry.slot(&mint), Some(Slot::Pending));

        registry.mark_live(&mint);
        assert!(!registry.reserve(&mint));
        assert_eq!(registry.live_count(), 1);

        registry.release(&mint);
        assert!(!registry.contains(&mint));
        assert!(registry.reserve(&mint));
    }

    #[test]
    fn test_concurrent_reservations_admit_one() {
        let registry = std::sync::Arc::new(PositionRegistry::new());
        let mint = Pubkey::new_unique();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || registry.reserve(&mint))
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }
}
