//! Fixed-size connection pool.
//!
//! `N` slots are allocated once at startup (implicitly, as `Mutex`-guarded
//! entries in a `Vec` of fixed length — "pre-allocated" here means "never
//! resized", not "zero-cost at construction" the way the original's single
//! `malloc(max_conn * sizeof(Conn))` was). Allocation is a linear scan for
//! a `Disconnected` slot, exactly as the original's `conn_accept` loop
//! does; a `tokio::sync::Semaphore` sized to the pool makes "no free slot"
//! ( `PoolFull` ) cheap to detect without scanning when the pool is
//! actually full, and guarantees the scan always finds a slot once a
//! permit has been acquired.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::state::ConnState;

struct SlotInfo {
    state: ConnState,
    peer_addr: Option<SocketAddr>,
}

impl Default for SlotInfo {
    fn default() -> Self {
        Self {
            state: ConnState::Disconnected,
            peer_addr: None,
        }
    }
}

/// The fixed-size array of `N` connection slots.
pub struct Pool {
    slots: Vec<Mutex<SlotInfo>>,
    semaphore: Arc<Semaphore>,
}

impl Pool {
    /// Pre-allocate a pool of `capacity` slots.
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            slots: (0..capacity).map(|_| Mutex::new(SlotInfo::default())).collect(),
            semaphore: Arc::new(Semaphore::new(capacity)),
        })
    }

    /// Number of slots, `N`.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Try to claim a `Disconnected` slot for a newly accepted peer.
    ///
    /// Returns `None` ("`PoolFull`" in spec.md §4.1 terms) if every slot
    /// is already in use; the caller is expected to close the accepted
    /// socket immediately and log an error, per spec.md §4.1/§7.
    pub fn try_allocate(self: &Arc<Self>, peer_addr: SocketAddr) -> Option<SlotGuard> {
        let permit = self.semaphore.clone().try_acquire_owned().ok()?;

        for (index, slot) in self.slots.iter().enumerate() {
            let mut info = slot.lock().expect("slot lock");
            if info.state == ConnState::Disconnected {
                info.state = ConnState::Accept;
                info.peer_addr = Some(peer_addr);
                return Some(SlotGuard {
                    pool: self.clone(),
                    index,
                    _permit: permit,
                });
            }
        }

        unreachable!("semaphore admitted a permit but found no disconnected slot")
    }

    /// Current state of a given slot index (for introspection/tests).
    pub fn state(&self, index: usize) -> ConnState {
        self.slots[index].lock().expect("slot lock").state
    }

    /// Count of slots currently in the given state.
    pub fn count_by_state(&self, state: ConnState) -> usize {
        self.slots
            .iter()
            .filter(|s| s.lock().expect("slot lock").state == state)
            .count()
    }
}

/// RAII handle to one claimed slot.
///
/// Ties the slot's lifetime to the task processing that connection:
/// dropping the guard — whether from normal teardown, an early error
/// return, or a task panic — returns the slot to `Disconnected` and
/// releases its semaphore permit, matching spec.md §4.4 step 4.
pub struct SlotGuard {
    pool: Arc<Pool>,
    index: usize,
    _permit: OwnedSemaphorePermit,
}

impl SlotGuard {
    /// Stable index identity of this slot within the pool.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Move the slot to a new state.
    pub fn set_state(&self, state: ConnState) {
        self.pool.slots[self.index].lock().expect("slot lock").state = state;
    }

    /// Current state of this slot.
    pub fn state(&self) -> ConnState {
        self.pool.state(self.index)
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        let mut info = self.pool.slots[self.index].lock().expect("slot lock");
        info.state = ConnState::Disconnected;
        info.peer_addr = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        "127.0.0.1:9999".parse().unwrap()
    }

    #[test]
    fn allocates_into_accept_state() {
        let pool = Pool::new(4);
        let guard = pool.try_allocate(addr()).unwrap();
        assert_eq!(guard.state(), ConnState::Accept);
        assert_eq!(pool.count_by_state(ConnState::Accept), 1);
    }

    #[test]
    fn pool_full_returns_none() {
        let pool = Pool::new(2);
        let _g1 = pool.try_allocate(addr()).unwrap();
        let _g2 = pool.try_allocate(addr()).unwrap();
        assert!(pool.try_allocate(addr()).is_none());
    }

    #[test]
    fn dropping_guard_frees_slot() {
        let pool = Pool::new(1);
        {
            let _guard = pool.try_allocate(addr()).unwrap();
            assert!(pool.try_allocate(addr()).is_none());
        }
        let guard2 = pool.try_allocate(addr());
        assert!(guard2.is_some());
    }

    #[test]
    fn slot_count_invariant_holds() {
        let pool = Pool::new(8);
        let mut guards = Vec::new();
        for _ in 0..3 {
            guards.push(pool.try_allocate(addr()).unwrap());
        }
        let total: usize = [
            ConnState::Disconnected,
            ConnState::Accept,
            ConnState::Connected,
            ConnState::Closing,
        ]
        .into_iter()
        .map(|s| pool.count_by_state(s))
        .sum();
        assert_eq!(total, pool.capacity());
        assert_eq!(pool.count_by_state(ConnState::Disconnected), 5);
    }

    #[test]
    fn state_transitions_via_guard() {
        let pool = Pool::new(1);
        let guard = pool.try_allocate(addr()).unwrap();
        guard.set_state(ConnState::Connected);
        assert_eq!(pool.state(guard.index()), ConnState::Connected);
        guard.set_state(ConnState::Closing);
        assert_eq!(pool.state(guard.index()), ConnState::Closing);
    }

    #[test]
    fn reused_slot_index_after_teardown() {
        let pool = Pool::new(1);
        let first_index = {
            let guard = pool.try_allocate(addr()).unwrap();
            guard.index()
        };
        let guard2 = pool.try_allocate(addr()).unwrap();
        assert_eq!(guard2.index(), first_index);
    }
}
