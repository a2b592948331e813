//! Watchlist membership with optimistic updates.
//!
//! Every entity has a local [`MembershipStatus`]. A toggle flips it to
//! `Pending` before the remote call and settles it to the confirmed value, or
//! back to exactly what it was, once the call finishes. While an entity is
//! pending no other mutation for it is started.
//!
//! The backend stores bare provider ids, so membership is tracked per id: a
//! movie and a show sharing an id share one watchlist entry. State belongs to
//! the current session; results of calls made under an earlier session are
//! discarded.

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::WatchlistApi;
use crate::error::{ReconcileFailure, RequestFailure};
use crate::models::EntityRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipStatus {
    Unknown,
    Absent,
    Present,
    Pending,
}

/// Local membership view for the current session.
///
/// `revisions` counts local mutations per id so a refresh can tell that an
/// entry moved while its list request was in flight. `epoch` changes with the
/// session; anything stamped with an older epoch may not write here.
#[derive(Debug, Default)]
struct Ledger {
    statuses: HashMap<i64, MembershipStatus>,
    revisions: HashMap<i64, u64>,
    epoch: u64,
}

impl Ledger {
    fn status(&self, id: i64) -> MembershipStatus {
        self.statuses
            .get(&id)
            .copied()
            .unwrap_or(MembershipStatus::Unknown)
    }

    fn revision(&self, id: i64) -> u64 {
        self.revisions.get(&id).copied().unwrap_or(0)
    }

    fn mutate(&mut self, id: i64, status: MembershipStatus) {
        self.statuses.insert(id, status);
        *self.revisions.entry(id).or_default() += 1;
    }
}

pub struct MembershipReconciler {
    backend: Arc<dyn WatchlistApi>,
    session: RwLock<Option<String>>,
    ledger: Mutex<Ledger>,
}

impl MembershipReconciler {
    pub fn new(backend: Arc<dyn WatchlistApi>, session: Option<String>) -> Self {
        Self {
            backend,
            session: RwLock::new(session),
            ledger: Mutex::new(Ledger::default()),
        }
    }

    /// Swaps the session. Membership is session-scoped: known state is
    /// dropped, and calls still in flight for the old session settle without
    /// touching the new one.
    pub fn set_session(&self, session: Option<String>) {
        let mut ledger = self.ledger.lock();
        *self.session.write() = session;
        ledger.statuses.clear();
        ledger.revisions.clear();
        ledger.epoch += 1;
    }

    pub fn read(&self, entity: EntityRef) -> MembershipStatus {
        self.ledger.lock().status(entity.id)
    }

    /// Adds the entity if it is absent or unknown, removes it if present.
    /// Returns the confirmed status.
    pub async fn toggle(
        &self,
        entity: EntityRef,
        cancel: &CancellationToken,
    ) -> Result<MembershipStatus, ReconcileFailure> {
        let token = self.token()?;
        let slot = self.begin(entity.id)?;
        let (result, next) = match slot.previous {
            MembershipStatus::Present => (
                self.backend.remove(&token, entity.id, cancel).await,
                MembershipStatus::Absent,
            ),
            _ => (
                self.backend.add(&token, entity.id, cancel).await,
                MembershipStatus::Present,
            ),
        };
        Self::finish(entity, slot, result, next)
    }

    /// Removes the entity; already-absent entries succeed without a call.
    pub async fn remove(
        &self,
        entity: EntityRef,
        cancel: &CancellationToken,
    ) -> Result<MembershipStatus, ReconcileFailure> {
        let token = self.token()?;
        if self.read(entity) == MembershipStatus::Absent {
            return Ok(MembershipStatus::Absent);
        }
        let slot = self.begin(entity.id)?;
        let result = self.backend.remove(&token, entity.id, cancel).await;
        Self::finish(entity, slot, result, MembershipStatus::Absent)
    }

    /// Pulls the authoritative list. Listed ids become present, other known
    /// entries absent. Entries that are pending, or that changed locally while
    /// the list was in flight, keep their local status. A list fetched under a
    /// session that has since been replaced is discarded as `Cancelled`.
    pub async fn refresh(&self, cancel: &CancellationToken) -> Result<Vec<i64>, ReconcileFailure> {
        let token = self.token()?;
        let (epoch, revisions) = {
            let ledger = self.ledger.lock();
            (ledger.epoch, ledger.revisions.clone())
        };
        let ids = self.backend.list(&token, cancel).await.map_err(|e| {
            warn!("Failed to fetch watchlist: {}", e);
            ReconcileFailure::from(e)
        })?;

        let mut ledger = self.ledger.lock();
        if ledger.epoch != epoch {
            debug!("Session changed during refresh, dropping stale list");
            return Err(ReconcileFailure::Cancelled);
        }
        let listed: HashSet<i64> = ids.iter().copied().collect();
        let candidates: Vec<i64> = ledger
            .statuses
            .keys()
            .copied()
            .chain(listed.iter().copied())
            .collect();
        for id in candidates {
            let unchanged = ledger.revision(id) == revisions.get(&id).copied().unwrap_or(0);
            if !unchanged || ledger.status(id) == MembershipStatus::Pending {
                continue;
            }
            let status = if listed.contains(&id) {
                MembershipStatus::Present
            } else {
                MembershipStatus::Absent
            };
            ledger.statuses.insert(id, status);
        }
        info!("Watchlist refreshed: {} items", ids.len());
        Ok(ids)
    }

    fn token(&self) -> Result<String, ReconcileFailure> {
        self.session
            .read()
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or(ReconcileFailure::Unauthenticated)
    }

    fn begin(&self, id: i64) -> Result<PendingSlot<'_>, ReconcileFailure> {
        let mut ledger = self.ledger.lock();
        let previous = ledger.status(id);
        if previous == MembershipStatus::Pending {
            return Err(ReconcileFailure::AlreadyPending);
        }
        ledger.mutate(id, MembershipStatus::Pending);
        Ok(PendingSlot {
            ledger: &self.ledger,
            id,
            previous,
            epoch: ledger.epoch,
            settled: false,
        })
    }

    fn finish(
        entity: EntityRef,
        mut slot: PendingSlot<'_>,
        result: Result<(), RequestFailure>,
        confirmed: MembershipStatus,
    ) -> Result<MembershipStatus, ReconcileFailure> {
        match result {
            Ok(()) => {
                slot.settle(confirmed);
                Ok(confirmed)
            }
            Err(e) => {
                warn!(
                    "Watchlist change for {} failed, restoring {:?}: {}",
                    entity, slot.previous, e
                );
                let previous = slot.previous;
                slot.settle(previous);
                Err(e.into())
            }
        }
    }
}

/// Marks one id as pending; restores the previous status if dropped without
/// being settled (e.g. the toggle future was abandoned mid-call). Writes
/// nothing once the session it started under is gone.
struct PendingSlot<'a> {
    ledger: &'a Mutex<Ledger>,
    id: i64,
    previous: MembershipStatus,
    epoch: u64,
    settled: bool,
}

impl PendingSlot<'_> {
    fn settle(&mut self, status: MembershipStatus) {
        self.settled = true;
        let mut ledger = self.ledger.lock();
        if ledger.epoch != self.epoch {
            debug!("Dropping watchlist result for {} from a previous session", self.id);
            return;
        }
        ledger.mutate(self.id, status);
    }
}

impl Drop for PendingSlot<'_> {
    fn drop(&mut self) {
        if !self.settled {
            let previous = self.previous;
            self.settle(previous);
        }
    }
}
