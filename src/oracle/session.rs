//! Oracle session with exclusive access.
//!
//! The oracle holds process-wide mutable state: the consulted specification
//! and everything derived from it. A session owns one oracle behind a mutex
//! and counts loads, so a specification handle can tell whether the facts in
//! the session are still its own.

use std::sync::{Mutex, MutexGuard};
use std::thread::{self, ThreadId};

use crate::error::{OracleError, OracleResult};

use super::Oracle;

struct SessionState {
    oracle: Box<dyn Oracle>,
    generation: u64,
}

/// Owner of one oracle backend.
///
/// Every query acquires the session lock for its whole duration; an open
/// enumerator keeps it until it is dropped.
pub struct OracleSession {
    state: Mutex<SessionState>,
    holder: Mutex<Option<ThreadId>>,
}

impl OracleSession {
    /// Wraps an oracle backend. No specification is loaded yet.
    pub fn new(oracle: impl Oracle + 'static) -> Self {
        Self::from_boxed(Box::new(oracle))
    }

    /// Wraps an already boxed backend.
    #[must_use]
    pub fn from_boxed(oracle: Box<dyn Oracle>) -> Self {
        Self {
            state: Mutex::new(SessionState {
                oracle,
                generation: 0,
            }),
            holder: Mutex::new(None),
        }
    }

    /// Acquires exclusive access, blocking while another thread holds it.
    ///
    /// # Errors
    /// - [`OracleError::SessionBusy`] if the calling thread already holds the
    ///   session, for example through an open enumerator
    /// - [`OracleError::SessionPoisoned`] if a previous holder panicked
    pub fn lock(&self) -> OracleResult<SessionGuard<'_>> {
        let me = thread::current().id();
        if *self.holder()? == Some(me) {
            return Err(OracleError::SessionBusy);
        }
        let guard = self.state.lock().map_err(|_| OracleError::SessionPoisoned)?;
        *self.holder()? = Some(me);
        Ok(SessionGuard {
            guard,
            holder: &self.holder,
        })
    }

    fn holder(&self) -> OracleResult<MutexGuard<'_, Option<ThreadId>>> {
        self.holder.lock().map_err(|_| OracleError::SessionPoisoned)
    }

    /// Generation of the most recent load; 0 before the first one.
    ///
    /// # Errors
    /// Returns [`OracleError::SessionPoisoned`] if a previous holder panicked.
    pub fn generation(&self) -> OracleResult<u64> {
        Ok(self.lock()?.generation())
    }
}

impl std::fmt::Debug for OracleSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OracleSession").finish_non_exhaustive()
    }
}

/// Exclusive access to the session's oracle.
pub struct SessionGuard<'a> {
    guard: MutexGuard<'a, SessionState>,
    holder: &'a Mutex<Option<ThreadId>>,
}

impl SessionGuard<'_> {
    /// Generation of the facts currently in the session.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.guard.generation
    }

    /// The oracle backend.
    pub fn oracle(&mut self) -> &mut dyn Oracle {
        self.guard.oracle.as_mut()
    }

    /// Marks the start of a new load and returns its generation.
    pub(crate) fn begin_load(&mut self) -> u64 {
        self.guard.generation += 1;
        self.guard.generation
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        // Cleared before the state lock is released.
        if let Ok(mut holder) = self.holder.lock() {
            *holder = None;
        }
    }
}

impl std::fmt::Debug for SessionGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionGuard")
            .field("generation", &self.guard.generation)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::DependencyOracle;

    #[test]
    fn test_generation_starts_at_zero() {
        let session = OracleSession::new(DependencyOracle::new());
        assert_eq!(session.generation().unwrap(), 0);
    }

    #[test]
    fn test_begin_load_advances_generation() {
        let session = OracleSession::new(DependencyOracle::new());
        {
            let mut guard = session.lock().unwrap();
            assert_eq!(guard.begin_load(), 1);
            assert_eq!(guard.begin_load(), 2);
        }
        assert_eq!(session.generation().unwrap(), 2);
    }

    #[test]
    fn test_relock_from_holding_thread_is_busy() {
        let session = OracleSession::new(DependencyOracle::new());
        let guard = session.lock().unwrap();
        assert!(matches!(session.lock(), Err(OracleError::SessionBusy)));
        assert!(matches!(session.generation(), Err(OracleError::SessionBusy)));
        drop(guard);
        assert!(session.lock().is_ok());
    }

    #[test]
    fn test_other_threads_wait_for_the_holder() {
        let session = std::sync::Arc::new(OracleSession::new(DependencyOracle::new()));
        let guard = session.lock().unwrap();
        let contender = std::sync::Arc::clone(&session);
        let waiter = std::thread::spawn(move || {
            let acquired = contender.lock().is_ok();
            acquired
        });
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert!(!waiter.is_finished());
        drop(guard);
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn test_poisoned_lock_is_reported() {
        let session = std::sync::Arc::new(OracleSession::new(DependencyOracle::new()));
        let poisoner = std::sync::Arc::clone(&session);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("poison the session");
        })
        .join();
        assert!(matches!(session.lock(), Err(OracleError::SessionPoisoned)));
    }
}
