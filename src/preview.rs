//! Per-session preview state.
//!
//! Each client preview (one embedded document) maps to a [`PreviewSurface`].
//! The surface tracks the code currently shown, a mount key the client uses
//! to recreate its embedded document, and the latest "fix images" ticket so
//! that an older annotation pass finishing late cannot overwrite a newer one.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Issued when a fix-images pass starts; redeemed when it finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixTicket {
    seq: u64,
    code_revision: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StaleFix {
    #[error("a newer image fix was started")]
    Superseded,
    #[error("the preview code changed while the fix was running")]
    CodeChanged,
}

#[derive(Debug, Default, Clone)]
pub struct PreviewSurface {
    code: String,
    code_revision: u64,
    mount_key: u64,
    last_ticket: u64,
}

impl PreviewSurface {
    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn mount_key(&self) -> u64 {
        self.mount_key
    }

    /// Replace the shown code (new generation, manual edit, applied fix).
    /// Outstanding tickets become stale.
    pub fn set_code(&mut self, code: impl Into<String>) {
        self.code = code.into();
        self.code_revision += 1;
    }

    /// Recreate the embedded document. The injected runtime guard lives on
    /// that document, so it starts fresh too.
    pub fn remount(&mut self) -> u64 {
        self.mount_key += 1;
        self.mount_key
    }

    pub fn begin_fix(&mut self) -> FixTicket {
        self.last_ticket += 1;
        FixTicket {
            seq: self.last_ticket,
            code_revision: self.code_revision,
        }
    }

    /// Apply a finished fix if it is still the latest one. Last write wins.
    pub fn complete_fix(&mut self, ticket: FixTicket, html: String) -> Result<(), StaleFix> {
        self.check_ticket(ticket)?;
        self.set_code(html);
        Ok(())
    }

    pub fn check_ticket(&self, ticket: FixTicket) -> Result<(), StaleFix> {
        if ticket.seq != self.last_ticket {
            return Err(StaleFix::Superseded);
        }
        if ticket.code_revision != self.code_revision {
            return Err(StaleFix::CodeChanged);
        }
        Ok(())
    }
}

/// Default bound on live sessions; the least recently used is evicted first.
pub const DEFAULT_MAX_SESSIONS: usize = 256;

#[derive(Debug)]
struct Slot {
    surface: PreviewSurface,
    last_used: u64,
}

#[derive(Debug, Default)]
struct Slots {
    by_session: HashMap<String, Slot>,
    clock: u64,
}

impl Slots {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn touch(&mut self, session: &str) -> Option<&mut PreviewSurface> {
        let now = self.tick();
        self.by_session.get_mut(session).map(|slot| {
            slot.last_used = now;
            &mut slot.surface
        })
    }

    fn evict_least_recent(&mut self) -> Option<String> {
        let oldest = self
            .by_session
            .iter()
            .min_by_key(|(_, slot)| slot.last_used)
            .map(|(session, _)| session.clone())?;
        self.by_session.remove(&oldest);
        Some(oldest)
    }
}

/// All preview surfaces, keyed by client-chosen session id and bounded to
/// `max_sessions` entries.
#[derive(Debug)]
pub struct PreviewRegistry {
    slots: Mutex<Slots>,
    max_sessions: usize,
}

impl Default for PreviewRegistry {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_MAX_SESSIONS)
    }
}

impl PreviewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(max_sessions: usize) -> Self {
        Self {
            slots: Mutex::new(Slots::default()),
            max_sessions: max_sessions.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run `f` against the session's surface, creating it on first use.
    pub fn with_surface<R>(&self, session: &str, f: impl FnOnce(&mut PreviewSurface) -> R) -> R {
        let mut slots = self.lock();
        if !slots.by_session.contains_key(session) {
            while slots.by_session.len() >= self.max_sessions {
                match slots.evict_least_recent() {
                    Some(evicted) => tracing::debug!(session = %evicted, "evicted preview session"),
                    None => break,
                }
            }
        }
        let now = slots.tick();
        let slot = slots
            .by_session
            .entry(session.to_string())
            .or_insert_with(|| Slot {
                surface: PreviewSurface::default(),
                last_used: now,
            });
        slot.last_used = now;
        f(&mut slot.surface)
    }

    /// Read-only snapshot of `(code, mount_key)` for an existing session.
    pub fn snapshot(&self, session: &str) -> Option<(String, u64)> {
        self.lock()
            .touch(session)
            .map(|s| (s.code.clone(), s.mount_key))
    }

    pub fn remount(&self, session: &str) -> Option<u64> {
        self.lock().touch(session).map(PreviewSurface::remount)
    }

    /// Drop a session. Returns whether it existed.
    pub fn remove(&self, session: &str) -> bool {
        self.lock().by_session.remove(session).is_some()
    }

    pub fn len(&self) -> usize {
        self.lock().by_session.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
