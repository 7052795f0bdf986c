//! Per-IP concurrent connection accounting
//!
//! Every admitted connection holds a [`ConnectionGuard`]. The slot is
//! released when the guard is dropped, which covers every way a connection
//! can end: normal completion, a policy rejection after the slot was taken,
//! a transport error, or the task being cancelled mid-decision.
//!
//! # Example
//! ```no_run
//! use inbound_rs::security::ConnectionTracker;
//! use std::net::IpAddr;
//! use std::sync::Arc;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let tracker = Arc::new(ConnectionTracker::new());
//! let ip: IpAddr = "192.0.2.1".parse()?;
//!
//! let guard = tracker.acquire(ip)?;
//! assert_eq!(guard.active(), 1);
//! drop(guard);
//! assert_eq!(tracker.active(&ip), 0);
//! # Ok(())
//! # }
//! ```

use crate::error::{InboundError, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, error};

/// Active connection counts keyed by client IP
pub struct ConnectionTracker {
    active: DashMap<IpAddr, usize>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self {
            active: DashMap::new(),
        }
    }

    /// Count a new connection from `ip`
    ///
    /// The returned guard reports the count including this connection and
    /// gives the slot back when dropped.
    pub fn acquire(self: &Arc<Self>, ip: IpAddr) -> Result<ConnectionGuard> {
        let active = {
            let mut count = self.active.entry(ip).or_insert(0);
            *count = count
                .checked_add(1)
                .ok_or_else(|| InboundError::Counter(format!("count overflow for {}", ip)))?;
            *count
        };

        debug!("Connection from {} acquired ({} active)", ip, active);

        Ok(ConnectionGuard {
            tracker: Arc::clone(self),
            ip,
            active,
        })
    }

    /// Current count for `ip`
    pub fn active(&self, ip: &IpAddr) -> usize {
        self.active.get(ip).map(|count| *count).unwrap_or(0)
    }

    /// Number of IPs with at least one open connection
    pub fn tracked_ips(&self) -> usize {
        self.active.len()
    }

    fn release(&self, ip: IpAddr) {
        match self.active.entry(ip) {
            Entry::Occupied(mut occupied) => {
                let remaining = occupied.get().saturating_sub(1);
                if remaining == 0 {
                    occupied.remove();
                } else {
                    *occupied.get_mut() = remaining;
                }
                debug!("Connection from {} released ({} active)", ip, remaining);
            }
            Entry::Vacant(_) => {
                error!("Connection counter for {} missing on release", ip);
            }
        }
    }
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Slot held by one connection
#[must_use = "dropping the guard releases the connection slot"]
pub struct ConnectionGuard {
    tracker: Arc<ConnectionTracker>,
    ip: IpAddr,
    active: usize,
}

impl ConnectionGuard {
    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    /// Count for this IP at the moment the slot was taken
    pub fn active(&self) -> usize {
        self.active
    }
}

impl std::fmt::Debug for ConnectionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionGuard")
            .field("ip", &self.ip)
            .field("active", &self.active)
            .finish()
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.tracker.release(self.ip);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_and_release() {
        let tracker = Arc::new(ConnectionTracker::new());
        let ip: IpAddr = "192.0.2.1".parse().unwrap();

        let first = tracker.acquire(ip).unwrap();
        let second = tracker.acquire(ip).unwrap();
        assert_eq!(first.active(), 1);
        assert_eq!(second.active(), 2);
        assert_eq!(tracker.active(&ip), 2);

        drop(first);
        assert_eq!(tracker.active(&ip), 1);
        drop(second);
        assert_eq!(tracker.active(&ip), 0);
        assert_eq!(tracker.tracked_ips(), 0);
    }

    #[test]
    fn test_ips_are_independent() {
        let tracker = Arc::new(ConnectionTracker::new());
        let a: IpAddr = "192.0.2.1".parse().unwrap();
        let b: IpAddr = "2001:db8::1".parse().unwrap();

        let _ga = tracker.acquire(a).unwrap();
        let _gb1 = tracker.acquire(b).unwrap();
        let _gb2 = tracker.acquire(b).unwrap();

        assert_eq!(tracker.active(&a), 1);
        assert_eq!(tracker.active(&b), 2);
        assert_eq!(tracker.tracked_ips(), 2);
    }

    #[test]
    fn test_release_without_entry_does_not_underflow() {
        let tracker = ConnectionTracker::new();
        let ip: IpAddr = "192.0.2.1".parse().unwrap();

        tracker.release(ip);
        assert_eq!(tracker.active(&ip), 0);
    }

    #[tokio::test]
    async fn test_balance_under_concurrency() {
        let tracker = Arc::new(ConnectionTracker::new());
        let ip: IpAddr = "192.0.2.1".parse().unwrap();
        let mut handles = Vec::new();

        for i in 0..64 {
            let tracker = tracker.clone();
            handles.push(tokio::spawn(async move {
                let guard = tracker.acquire(ip).unwrap();
                if i % 3 == 0 {
                    tokio::task::yield_now().await;
                }
                drop(guard);
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(tracker.active(&ip), 0);
    }

    #[tokio::test]
    async fn test_aborted_task_releases_slot() {
        let tracker = Arc::new(ConnectionTracker::new());
        let ip: IpAddr = "192.0.2.1".parse().unwrap();

        let held = tracker.clone();
        let task = tokio::spawn(async move {
            let _guard = held.acquire(ip).unwrap();
            std::future::pending::<()>().await;
        });

        while tracker.active(&ip) == 0 {
            tokio::task::yield_now().await;
        }
        task.abort();
        let _ = task.await;

        assert_eq!(tracker.active(&ip), 0);
    }
}
