//! Process-wide UDP port reservation.
//!
//! The reservation table is the only state shared between concurrent
//! sessions. Every reserve/release goes through one mutex, and candidates
//! are bind-probed while it is held, so two `reserve` calls can never hand
//! out the same port.

use std::collections::HashMap;
use std::net::UdpSocket;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::errors::PortError;
use crate::domain::models::{LeaseState, PortLease, PortsConfig};

#[derive(Debug, Clone, Copy)]
struct LiveLease {
    lease_id: Uuid,
    session_id: Uuid,
    state: LeaseState,
}

#[derive(Debug, Default)]
struct ReservationTable {
    live: HashMap<u16, LiveLease>,
    /// Released ports and when they were released
    draining: HashMap<u16, Instant>,
}

/// Point-in-time view of the reservation table, ordered by port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocatorSnapshot {
    pub live: Vec<(u16, Uuid, LeaseState)>,
    pub draining: Vec<u16>,
}

/// Exclusive port reservation with a deterministic fallback range.
#[derive(Debug)]
pub struct PortAllocator {
    bind_host: String,
    fallback_start: u16,
    fallback_end: u16,
    release_cooldown: Duration,
    table: Mutex<ReservationTable>,
}

impl PortAllocator {
    pub fn new(
        bind_host: impl Into<String>,
        fallback_start: u16,
        fallback_end: u16,
        release_cooldown: Duration,
    ) -> Result<Self, PortError> {
        if fallback_start == 0 || fallback_start > fallback_end {
            return Err(PortError::InvalidRange {
                start: fallback_start,
                end: fallback_end,
            });
        }
        Ok(Self {
            bind_host: bind_host.into(),
            fallback_start,
            fallback_end,
            release_cooldown,
            table: Mutex::new(ReservationTable::default()),
        })
    }

    pub fn from_config(bind_host: impl Into<String>, config: &PortsConfig) -> Result<Self, PortError> {
        Self::new(
            bind_host,
            config.fallback_start,
            config.fallback_end,
            Duration::from_millis(config.release_cooldown_ms),
        )
    }

    fn table(&self) -> MutexGuard<'_, ReservationTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reserve `hint`, or the first free port of the fallback range.
    ///
    /// A port is free when it is not leased, not cooling down after a
    /// release, and the OS lets us bind it. The probe socket is closed
    /// before returning so the mock can bind the port itself.
    pub fn reserve(&self, hint: u16, session_id: Uuid) -> Result<PortLease, PortError> {
        let mut table = self.table();
        let now = Instant::now();
        let cooldown = self.release_cooldown;
        table
            .draining
            .retain(|_, released_at| now.duration_since(*released_at) < cooldown);

        let hint_candidate = (hint != 0).then_some(hint);
        let fallback = (self.fallback_start..=self.fallback_end).filter(|port| Some(*port) != hint_candidate);

        for port in hint_candidate.into_iter().chain(fallback) {
            if table.live.contains_key(&port) || table.draining.contains_key(&port) {
                continue;
            }
            if !self.probe_bind(port) {
                debug!(port, "port refused by OS bind probe");
                continue;
            }

            let lease = PortLease {
                id: Uuid::new_v4(),
                port,
                requested_port: hint,
                session_id,
                reserved_at: Utc::now(),
            };
            table.live.insert(
                port,
                LiveLease {
                    lease_id: lease.id,
                    session_id,
                    state: LeaseState::Reserved,
                },
            );

            if lease.is_substituted() {
                info!(requested = hint, actual = port, %session_id, "hinted port unavailable, substituted fallback port");
            } else {
                debug!(port, %session_id, "port reserved");
            }
            return Ok(lease);
        }

        warn!(requested = hint, start = self.fallback_start, end = self.fallback_end, "no free port available");
        Err(PortError::Unavailable {
            requested: hint,
            start: self.fallback_start,
            end: self.fallback_end,
        })
    }

    /// Record that the mock holding `lease` is listening.
    ///
    /// Returns `false` if the lease is no longer live.
    pub fn mark_bound(&self, lease: &PortLease) -> bool {
        let mut table = self.table();
        match table.live.get_mut(&lease.port) {
            Some(live) if live.lease_id == lease.id => {
                live.state = LeaseState::Bound;
                true
            }
            _ => false,
        }
    }

    /// Return a lease. Releasing an already-released lease is a no-op.
    pub fn release(&self, lease: &PortLease) {
        let mut table = self.table();
        let owned = table
            .live
            .get(&lease.port)
            .is_some_and(|live| live.lease_id == lease.id);
        if !owned {
            return;
        }
        table.live.remove(&lease.port);
        table.draining.insert(lease.port, Instant::now());
        debug!(port = lease.port, session_id = %lease.session_id, "port released");
    }

    /// Current state of a lease.
    pub fn state_of(&self, lease: &PortLease) -> LeaseState {
        self.table()
            .live
            .get(&lease.port)
            .filter(|live| live.lease_id == lease.id)
            .map_or(LeaseState::Released, |live| live.state)
    }

    /// Ports currently leased, ascending.
    pub fn live_ports(&self) -> Vec<u16> {
        let mut ports: Vec<u16> = self.table().live.keys().copied().collect();
        ports.sort_unstable();
        ports
    }

    pub fn snapshot(&self) -> AllocatorSnapshot {
        let table = self.table();
        let mut live: Vec<(u16, Uuid, LeaseState)> = table
            .live
            .iter()
            .map(|(port, live)| (*port, live.session_id, live.state))
            .collect();
        live.sort_unstable_by_key(|(port, _, _)| *port);
        let mut draining: Vec<u16> = table.draining.keys().copied().collect();
        draining.sort_unstable();
        AllocatorSnapshot { live, draining }
    }

    fn probe_bind(&self, port: u16) -> bool {
        UdpSocket::bind((self.bind_host.as_str(), port)).is_ok()
    }
}

/// Scoped lease ownership: the port is released on every exit path.
#[derive(Debug)]
pub struct LeaseGuard {
    allocator: Arc<PortAllocator>,
    lease: PortLease,
    released: bool,
}

impl LeaseGuard {
    pub fn new(allocator: Arc<PortAllocator>, lease: PortLease) -> Self {
        Self {
            allocator,
            lease,
            released: false,
        }
    }

    pub fn lease(&self) -> &PortLease {
        &self.lease
    }

    pub fn port(&self) -> u16 {
        self.lease.port
    }

    pub fn mark_bound(&self) -> bool {
        self.allocator.mark_bound(&self.lease)
    }

    pub fn release(&mut self) {
        if !self.released {
            self.allocator.release(&self.lease);
            self.released = true;
        }
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allocator(start: u16, end: u16) -> PortAllocator {
        PortAllocator::new("127.0.0.1", start, end, Duration::ZERO).unwrap()
    }

    fn free_port() -> u16 {
        UdpSocket::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port()
    }

    #[test]
    fn test_invalid_range_rejected() {
        assert!(matches!(
            PortAllocator::new("127.0.0.1", 500, 400, Duration::ZERO),
            Err(PortError::InvalidRange { start: 500, end: 400 })
        ));
    }

    #[test]
    fn test_reserve_uses_hint_when_free() {
        let hint = free_port();
        let alloc = allocator(45100, 45110);
        let lease = alloc.reserve(hint, Uuid::new_v4()).unwrap();
        assert_eq!(lease.port, hint);
        assert!(!lease.is_substituted());
        assert_eq!(alloc.state_of(&lease), LeaseState::Reserved);
    }

    #[test]
    fn test_leased_hint_falls_back_to_range() {
        let hint = free_port();
        let alloc = allocator(45120, 45130);
        let first = alloc.reserve(hint, Uuid::new_v4()).unwrap();
        let second = alloc.reserve(hint, Uuid::new_v4()).unwrap();

        assert_eq!(first.port, hint);
        assert_ne!(second.port, first.port);
        assert!(second.is_substituted());
        assert!((45120..=45130).contains(&second.port));
    }

    #[test]
    fn test_os_refused_hint_falls_back() {
        let held = UdpSocket::bind("127.0.0.1:0").unwrap();
        let hint = held.local_addr().unwrap().port();
        let alloc = allocator(45140, 45150);

        let lease = alloc.reserve(hint, Uuid::new_v4()).unwrap();
        assert_ne!(lease.port, hint);
        assert_eq!(lease.requested_port, hint);
    }

    #[test]
    fn test_exhausted_range_reports_unavailable() {
        let held = UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = held.local_addr().unwrap().port();
        let alloc = allocator(port, port);

        assert!(matches!(
            alloc.reserve(port, Uuid::new_v4()),
            Err(PortError::Unavailable { .. })
        ));
    }

    #[test]
    fn test_release_is_idempotent() {
        let alloc = allocator(45160, 45170);
        let lease = alloc.reserve(0, Uuid::new_v4()).unwrap();

        alloc.release(&lease);
        let once = alloc.snapshot();
        alloc.release(&lease);
        assert_eq!(alloc.snapshot(), once);
        assert_eq!(alloc.state_of(&lease), LeaseState::Released);
    }

    #[test]
    fn test_stale_lease_cannot_release_new_owner() {
        let alloc = allocator(45180, 45180);
        let stale = alloc.reserve(0, Uuid::new_v4()).unwrap();
        alloc.release(&stale);

        let fresh = alloc.reserve(0, Uuid::new_v4()).unwrap();
        assert_eq!(fresh.port, stale.port);
        alloc.release(&stale);
        assert_eq!(alloc.state_of(&fresh), LeaseState::Reserved);
    }

    #[test]
    fn test_cooldown_skips_recently_released_port() {
        let alloc = PortAllocator::new("127.0.0.1", 45190, 45191, Duration::from_secs(60)).unwrap();
        let first = alloc.reserve(0, Uuid::new_v4()).unwrap();
        alloc.release(&first);

        let second = alloc.reserve(0, Uuid::new_v4()).unwrap();
        assert_ne!(second.port, first.port);
    }

    #[test]
    fn test_mark_bound() {
        let alloc = allocator(45200, 45205);
        let lease = alloc.reserve(0, Uuid::new_v4()).unwrap();
        assert!(alloc.mark_bound(&lease));
        assert_eq!(alloc.state_of(&lease), LeaseState::Bound);
        alloc.release(&lease);
        assert!(!alloc.mark_bound(&lease));
    }

    #[test]
    fn test_guard_releases_on_drop() {
        let alloc = Arc::new(allocator(45210, 45215));
        let lease = alloc.reserve(0, Uuid::new_v4()).unwrap();
        {
            let _guard = LeaseGuard::new(alloc.clone(), lease.clone());
            assert_eq!(alloc.live_ports(), vec![lease.port]);
        }
        assert!(alloc.live_ports().is_empty());
    }

    #[test]
    fn test_concurrent_reservations_are_exclusive() {
        let alloc = Arc::new(allocator(45220, 45259));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let alloc = alloc.clone();
                std::thread::spawn(move || alloc.reserve(45220, Uuid::new_v4()).map(|l| l.port))
            })
            .collect();

        let mut ports: Vec<u16> = handles
            .into_iter()
            .filter_map(|h| h.join().unwrap().ok())
            .collect();
        let reserved = ports.len();
        ports.sort_unstable();
        ports.dedup();
        assert_eq!(ports.len(), reserved, "no port handed out twice");
    }
}
