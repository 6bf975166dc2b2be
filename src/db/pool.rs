//! Identity-keyed session pool.
//!
//! The pool holds at most one session per [`IdentityKey`] and at most
//! `capacity` keys. The slot map is guarded by a plain mutex that is never
//! held across an `.await`; opening and closing sessions always happens
//! outside of it.

use crate::auth::constant_time_eq;
use crate::config::{PoolOptions, WaitPolicy};
use crate::db::factory::ConnectionFactory;
use crate::db::session::{CatalogRow, DbSession};
use crate::error::{DbError, DbResult};
use crate::identity::{Identity, IdentityKey};
use crate::models::DatabaseType;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

enum SlotState {
    /// Reserved while the factory opens a session for this key.
    Opening,
    Idle(Box<dyn DbSession>),
    InUse,
}

struct Slot {
    state: SlotState,
    session_id: Uuid,
    last_used_at: Instant,
    /// Caller token the session logged in with (passthrough only)
    login_token: Option<String>,
}

impl Slot {
    fn opening(login_token: Option<&str>) -> Self {
        Self {
            state: SlotState::Opening,
            session_id: Uuid::new_v4(),
            last_used_at: Instant::now(),
            login_token: login_token.map(String::from),
        }
    }

    /// A session opened with one token is never handed to a request with another.
    fn logged_in_with(&self, token: Option<&str>) -> bool {
        match (self.login_token.as_deref(), token) {
            (None, None) => true,
            (Some(held), Some(given)) => constant_time_eq(held.as_bytes(), given.as_bytes()),
            _ => false,
        }
    }
}

/// Snapshot of pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, schemars::JsonSchema)]
pub struct PoolStats {
    pub capacity: usize,
    pub open: usize,
    pub idle: usize,
    pub in_use: usize,
    pub opening: usize,
}

enum Decision {
    Reuse {
        session: Box<dyn DbSession>,
        session_id: Uuid,
    },
    Open {
        discard: Option<Box<dyn DbSession>>,
    },
    Wait,
}

struct PoolInner {
    factory: ConnectionFactory,
    options: PoolOptions,
    capacity: usize,
    slots: Mutex<HashMap<IdentityKey, Slot>>,
    released: Notify,
    closed: std::sync::atomic::AtomicBool,
}

impl PoolInner {
    fn slots(&self) -> MutexGuard<'_, HashMap<IdentityKey, Slot>> {
        // A poisoned map is still structurally valid
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(std::sync::atomic::Ordering::Acquire)
    }

    fn decide(&self, key: &IdentityKey, login_token: Option<&str>) -> DbResult<Decision> {
        if self.is_closed() {
            return Err(DbError::connection(
                "Session pool is shut down",
                "The server is stopping",
            ));
        }
        let mut slots = self.slots();

        if let Some(slot) = slots.get_mut(key) {
            let same_login = slot.logged_in_with(login_token);
            return Ok(match std::mem::replace(&mut slot.state, SlotState::InUse) {
                SlotState::Idle(session) if same_login && !session.is_broken() => {
                    slot.last_used_at = Instant::now();
                    Decision::Reuse {
                        session,
                        session_id: slot.session_id,
                    }
                }
                SlotState::Idle(session) => {
                    // Replace a broken or differently authenticated idle session in place
                    if !same_login {
                        debug!(key = %key, "Caller token changed, reopening session");
                    }
                    *slot = Slot::opening(login_token);
                    Decision::Open {
                        discard: Some(session),
                    }
                }
                other => {
                    slot.state = other;
                    Decision::Wait
                }
            });
        }

        let mut discard = None;
        if slots.len() >= self.capacity {
            let victim = slots
                .iter()
                .filter(|(_, slot)| matches!(slot.state, SlotState::Idle(_)))
                .min_by_key(|(_, slot)| slot.last_used_at)
                .map(|(k, _)| k.clone());
            let Some(victim) = victim else {
                return Ok(Decision::Wait);
            };
            if let Some(Slot {
                state: SlotState::Idle(session),
                ..
            }) = slots.remove(&victim)
            {
                debug!(evicted = %victim, "Evicting least recently used session");
                discard = Some(session);
            }
        }
        slots.insert(key.clone(), Slot::opening(login_token));
        Ok(Decision::Open { discard })
    }

    /// Opening -> InUse. `None` if the slot vanished (pool shut down).
    fn commit(&self, key: &IdentityKey) -> Option<Uuid> {
        let mut slots = self.slots();
        let slot = slots.get_mut(key)?;
        slot.state = SlotState::InUse;
        slot.last_used_at = Instant::now();
        Some(slot.session_id)
    }

    fn remove(&self, key: &IdentityKey, session_id: Option<Uuid>) {
        {
            let mut slots = self.slots();
            let matches = slots
                .get(key)
                .is_some_and(|slot| session_id.is_none_or(|id| slot.session_id == id));
            if matches {
                slots.remove(key);
            }
        }
        self.released.notify_waiters();
    }

    async fn check_in(
        &self,
        key: &IdentityKey,
        session_id: Uuid,
        mut session: Box<dyn DbSession>,
        healthy: bool,
    ) {
        if healthy && !session.is_broken() {
            let returned = {
                let mut slots = self.slots();
                match slots.get_mut(key) {
                    Some(slot) if slot.session_id == session_id => {
                        slot.state = SlotState::Idle(session);
                        slot.last_used_at = Instant::now();
                        None
                    }
                    _ => Some(session),
                }
            };
            self.released.notify_waiters();
            if let Some(mut orphan) = returned {
                orphan.close().await;
            }
            return;
        }

        debug!(key = %key, session_id = %session_id, "Discarding unhealthy session");
        self.remove(key, Some(session_id));
        session.close().await;
    }
}

/// Pool of authenticated sessions keyed by caller identity.
#[derive(Clone)]
pub struct SessionPool {
    inner: Arc<PoolInner>,
}

impl std::fmt::Debug for SessionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionPool")
            .field("factory", &self.inner.factory)
            .field("stats", &self.stats())
            .finish()
    }
}

impl SessionPool {
    pub fn new(factory: ConnectionFactory, options: PoolOptions) -> Self {
        let capacity = factory.trust_mode().pool_capacity().max(1);
        Self {
            inner: Arc::new(PoolInner {
                factory,
                options,
                capacity,
                slots: Mutex::new(HashMap::new()),
                released: Notify::new(),
                closed: std::sync::atomic::AtomicBool::new(false),
            }),
        }
    }

    pub fn factory(&self) -> &ConnectionFactory {
        &self.inner.factory
    }

    pub fn options(&self) -> &PoolOptions {
        &self.inner.options
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Borrow the caller's session, opening one if needed.
    pub async fn acquire(&self, identity: Option<&Identity>) -> DbResult<ScopedSession> {
        let key = self.inner.factory.key_for(identity)?;
        let login_token = self.inner.factory.login_token(identity);
        let timeout = self.inner.options.acquire_timeout_or_default();
        let deadline = Instant::now() + timeout;

        loop {
            // Register before inspecting the map so a release in between is not missed
            let notified = self.inner.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.inner.decide(&key, login_token)? {
                Decision::Reuse {
                    session,
                    session_id,
                } => {
                    debug!(key = %key, session_id = %session_id, "Reusing pooled session");
                    return Ok(ScopedSession::new(
                        Arc::clone(&self.inner),
                        key,
                        session_id,
                        session,
                    ));
                }
                Decision::Open { discard } => {
                    return self.open(key, identity, discard).await;
                }
                Decision::Wait => {
                    if self.inner.options.wait_policy_or_default() == WaitPolicy::FailFast {
                        return Err(DbError::pool_exhausted(format!(
                            "no session available for '{}' ({} of {} slots busy)",
                            key,
                            self.stats().open,
                            self.inner.capacity
                        )));
                    }
                    debug!(key = %key, "Waiting for a pooled session");
                    if tokio::time::timeout_at(deadline, notified.as_mut())
                        .await
                        .is_err()
                    {
                        return Err(DbError::pool_exhausted(format!(
                            "timed out after {}s waiting for a session for '{}'",
                            timeout.as_secs(),
                            key
                        )));
                    }
                }
            }
        }
    }

    async fn open(
        &self,
        key: IdentityKey,
        identity: Option<&Identity>,
        discard: Option<Box<dyn DbSession>>,
    ) -> DbResult<ScopedSession> {
        let reservation = Reservation {
            inner: Arc::clone(&self.inner),
            key,
            armed: true,
        };
        if let Some(mut old) = discard {
            old.close().await;
        }
        let mut session = self.inner.factory.acquire(identity).await?;
        let key = reservation.key.clone();
        match reservation.commit() {
            Some(session_id) => {
                info!(key = %key, session_id = %session_id, "Opened pooled session");
                Ok(ScopedSession::new(
                    Arc::clone(&self.inner),
                    key,
                    session_id,
                    session,
                ))
            }
            None => {
                session.close().await;
                Err(DbError::connection(
                    "Session pool is shut down",
                    "The server is stopping",
                ))
            }
        }
    }

    pub fn stats(&self) -> PoolStats {
        let slots = self.inner.slots();
        let mut stats = PoolStats {
            capacity: self.inner.capacity,
            open: slots.len(),
            idle: 0,
            in_use: 0,
            opening: 0,
        };
        for slot in slots.values() {
            match slot.state {
                SlotState::Idle(_) => stats.idle += 1,
                SlotState::InUse => stats.in_use += 1,
                SlotState::Opening => stats.opening += 1,
            }
        }
        stats
    }

    /// Close idle sessions and refuse new acquires.
    pub async fn close_all(&self) {
        self.inner
            .closed
            .store(true, std::sync::atomic::Ordering::Release);
        let drained: Vec<Slot> = {
            let mut slots = self.inner.slots();
            slots.drain().map(|(_, slot)| slot).collect()
        };
        self.inner.released.notify_waiters();
        let count = drained.len();
        for slot in drained {
            if let SlotState::Idle(mut session) = slot.state {
                session.close().await;
            }
        }
        info!(sessions = count, "Session pool closed");
    }
}

/// Removes an `Opening` slot unless committed, so a cancelled or failed
/// open leaves nothing behind.
struct Reservation {
    inner: Arc<PoolInner>,
    key: IdentityKey,
    armed: bool,
}

impl Reservation {
    fn commit(mut self) -> Option<Uuid> {
        self.armed = false;
        self.inner.commit(&self.key)
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if self.armed {
            debug!(key = %self.key, "Dropping unfinished session reservation");
            self.inner.remove(&self.key, None);
        }
    }
}

/// Stand-in left behind once a scoped session has been handed back.
struct Detached(DatabaseType);

#[async_trait]
impl DbSession for Detached {
    fn dialect(&self) -> DatabaseType {
        self.0
    }

    async fn fetch(&mut self, _sql: &str, _params: &[String]) -> DbResult<Vec<CatalogRow>> {
        Err(DbError::internal("session already released"))
    }

    async fn execute(&mut self, _sql: &str) -> DbResult<()> {
        Err(DbError::internal("session already released"))
    }

    async fn current_user(&mut self) -> DbResult<String> {
        Err(DbError::internal("session already released"))
    }

    async fn ping(&mut self) -> DbResult<()> {
        Err(DbError::internal("session already released"))
    }

    fn is_broken(&self) -> bool {
        true
    }

    async fn close(&mut self) {}
}

/// A session borrowed from the pool.
///
/// Hand it back with [`ScopedSession::release`]. Dropping it instead (early
/// return, panic, cancelled task) discards the session as unhealthy.
pub struct ScopedSession {
    inner: Arc<PoolInner>,
    key: IdentityKey,
    session_id: Uuid,
    session: Box<dyn DbSession>,
    released: bool,
}

impl std::fmt::Debug for ScopedSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedSession")
            .field("key", &self.key)
            .field("session_id", &self.session_id)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

impl ScopedSession {
    fn new(
        inner: Arc<PoolInner>,
        key: IdentityKey,
        session_id: Uuid,
        session: Box<dyn DbSession>,
    ) -> Self {
        Self {
            inner,
            key,
            session_id,
            session,
            released: false,
        }
    }

    pub fn key(&self) -> &IdentityKey {
        &self.key
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn session(&mut self) -> &mut dyn DbSession {
        self.session.as_mut()
    }

    /// Return the session. Unhealthy sessions are closed and forgotten.
    pub async fn release(mut self, healthy: bool) {
        self.released = true;
        let dialect = self.session.dialect();
        let session = std::mem::replace(&mut self.session, Box::new(Detached(dialect)));
        self.inner
            .check_in(&self.key, self.session_id, session, healthy)
            .await;
    }
}

impl Drop for ScopedSession {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        warn!(
            key = %self.key,
            session_id = %self.session_id,
            "Session dropped without release - discarding"
        );
        self.inner.remove(&self.key, Some(self.session_id));
    }
}
