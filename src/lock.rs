//! The agent-wide lock: a single passphrase-guarded on/off switch that,
//! while engaged, denies every non-privileged operation regardless of
//! policy.

use parking_lot::Mutex;
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

enum LockState {
    Unlocked,
    Locked(Vec<u8>),
}

/// Thread-safe `Unlocked` / `Locked{passphrase}` cell.
///
/// `lock`/`unlock` take `&self` -- callers share one `LockCell` behind an
/// `Arc`, not behind an outer mutex of their own.
pub struct LockCell {
    state: Mutex<LockState>,
}

impl LockCell {
    pub fn new() -> Self {
        LockCell {
            state: Mutex::new(LockState::Unlocked),
        }
    }

    pub fn is_locked(&self) -> bool {
        matches!(*self.state.lock(), LockState::Locked(_))
    }

    /// Engage the lock with `passphrase`. Fails (state unchanged) if
    /// already locked.
    pub fn lock(&self, passphrase: Vec<u8>) -> bool {
        let mut state = self.state.lock();
        match *state {
            LockState::Unlocked => {
                *state = LockState::Locked(passphrase);
                true
            }
            LockState::Locked(_) => false,
        }
    }

    /// Disengage the lock if `passphrase` matches the one supplied to
    /// `lock`, compared in constant time. Fails (state unchanged) if
    /// unlocked already or the passphrase doesn't match.
    pub fn unlock(&self, passphrase: &[u8]) -> bool {
        let mut state = self.state.lock();
        let matches = match &*state {
            LockState::Locked(expected) => {
                expected.len() == passphrase.len()
                    && bool::from(expected.as_slice().ct_eq(passphrase))
            }
            LockState::Unlocked => false,
        };
        if matches {
            if let LockState::Locked(mut expected) = std::mem::replace(&mut *state, LockState::Unlocked) {
                expected.zeroize();
            }
        }
        matches
    }
}

impl Default for LockCell {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for LockState {
    fn drop(&mut self) {
        if let LockState::Locked(passphrase) = self {
            passphrase.zeroize();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_unlocked() {
        let cell = LockCell::new();
        assert!(!cell.is_locked());
    }

    #[test]
    fn lock_then_unlock_with_matching_passphrase_succeeds() {
        let cell = LockCell::new();
        assert!(cell.lock(b"hunter2".to_vec()));
        assert!(cell.is_locked());
        assert!(cell.unlock(b"hunter2"));
        assert!(!cell.is_locked());
    }

    #[test]
    fn unlock_with_wrong_passphrase_fails_and_stays_locked() {
        let cell = LockCell::new();
        assert!(cell.lock(b"hunter2".to_vec()));
        assert!(!cell.unlock(b"wrong"));
        assert!(cell.is_locked());
    }

    #[test]
    fn double_lock_fails() {
        let cell = LockCell::new();
        assert!(cell.lock(b"first".to_vec()));
        assert!(!cell.lock(b"second".to_vec()));
        assert!(cell.unlock(b"first"));
    }

    #[test]
    fn unlock_while_already_unlocked_fails() {
        let cell = LockCell::new();
        assert!(!cell.unlock(b"anything"));
    }
}
