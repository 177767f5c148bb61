//! Re-entrancy lock with token-checked release.

/// Suppresses synchronization while a programmatic scroll is in flight.
///
/// Every acquisition bumps `token`. A release only clears the lock when it
/// carries the current token, so a delayed release from an earlier round can
/// never unlock a later one.
///
/// # Example
///
/// ```
/// use marksync::sync::SyncLock;
///
/// let mut lock = SyncLock::default();
/// let first = lock.acquire();
/// let second = lock.acquire();
/// assert!(!lock.release(first));
/// assert!(lock.is_active());
/// assert!(lock.release(second));
/// assert!(!lock.is_active());
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncLock {
    active: bool,
    token: u64,
}

impl SyncLock {
    /// Returns true while a synchronization round owns the lock.
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// The most recently issued token.
    pub const fn token(&self) -> u64 {
        self.token
    }

    /// Take the lock for a new round and return that round's token.
    pub const fn acquire(&mut self) -> u64 {
        self.token = self.token.wrapping_add(1);
        self.active = true;
        self.token
    }

    /// Release the lock if `token` is still current.
    ///
    /// Returns true if the lock was cleared.
    pub const fn release(&mut self, token: u64) -> bool {
        if self.active && self.token == token {
            self.active = false;
            true
        } else {
            false
        }
    }
}

/// Pending lock-release timers, one per acquisition.
#[derive(Debug, Clone, Default)]
pub struct ReleaseQueue {
    pending: Vec<(u64, u64)>,
}

impl ReleaseQueue {
    /// Schedule release of `token` at `due_ms`.
    pub fn schedule(&mut self, token: u64, due_ms: u64) {
        self.pending.push((token, due_ms));
    }

    /// Remove and return the tokens whose timers have fired, oldest first.
    pub fn take_due(&mut self, now_ms: u64) -> Vec<u64> {
        let mut due = Vec::new();
        self.pending.retain(|&(token, due_ms)| {
            if due_ms <= now_ms {
                due.push(token);
                false
            } else {
                true
            }
        });
        due
    }

    /// The earliest pending deadline.
    pub fn next_deadline(&self) -> Option<u64> {
        self.pending.iter().map(|&(_, due_ms)| due_ms).min()
    }

    /// Returns true if any release is still scheduled.
    pub fn is_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Drop every scheduled release.
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_lock_is_inactive() {
        let lock = SyncLock::default();
        assert!(!lock.is_active());
        assert_eq!(lock.token(), 0);
    }

    #[test]
    fn test_acquire_bumps_token() {
        let mut lock = SyncLock::default();
        let a = lock.acquire();
        let b = lock.acquire();
        assert_ne!(a, b);
        assert_eq!(lock.token(), b);
    }

    #[test]
    fn test_stale_release_keeps_newer_round_active() {
        let mut lock = SyncLock::default();
        let t1 = lock.acquire();
        let t2 = lock.acquire();
        assert!(!lock.release(t1));
        assert!(lock.is_active());
        assert!(lock.release(t2));
        assert!(!lock.is_active());
    }

    #[test]
    fn test_release_twice_is_noop() {
        let mut lock = SyncLock::default();
        let t = lock.acquire();
        assert!(lock.release(t));
        assert!(!lock.release(t));
    }

    #[test]
    fn test_release_queue_fires_in_order() {
        let mut queue = ReleaseQueue::default();
        queue.schedule(1, 50);
        queue.schedule(2, 70);
        assert_eq!(queue.next_deadline(), Some(50));
        assert!(queue.take_due(49).is_empty());
        assert_eq!(queue.take_due(60), vec![1]);
        assert_eq!(queue.take_due(100), vec![2]);
        assert!(!queue.is_pending());
    }
}
