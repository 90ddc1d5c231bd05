//! Per-entity correlation table.
//!
//! Maps correlation ids to one-shot continuations. Ids start at 1 and
//! strictly increase for the lifetime of the table; an id is never reused.
//! Every entry is removed exactly once: by [`Correlator::resolve`] when the
//! matching response arrives, by [`Correlator::cancel`] when the caller gives
//! up, or by [`Correlator::close`] when the owning entity is torn down.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use hive_types::{HiveError, PageRef};
use serde_json::Value;
use tokio::sync::oneshot;

/// What a continuation receives: the response arguments or the failure.
pub type Reply = Result<Vec<Value>, HiveError>;

#[derive(Debug)]
struct Table {
    pending: HashMap<i64, oneshot::Sender<Reply>>,
    closed: bool,
}

/// Correlation table owned by one controller-side entity.
#[derive(Debug)]
pub struct Correlator {
    owner: PageRef,
    next_id: AtomicI64,
    table: Mutex<Table>,
}

impl Correlator {
    pub fn new(owner: PageRef) -> Self {
        Self {
            owner,
            next_id: AtomicI64::new(1),
            table: Mutex::new(Table {
                pending: HashMap::new(),
                closed: false,
            }),
        }
    }

    /// Allocate a fresh correlation id.
    pub fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Store the continuation for `id`.
    ///
    /// Fails if the id is already pending or the table has been closed.
    pub fn register(&self, id: i64, continuation: oneshot::Sender<Reply>) -> Result<(), HiveError> {
        let mut table = self.lock();
        if table.closed {
            return Err(self.closed_error());
        }
        if table.pending.contains_key(&id) {
            return Err(HiveError::DuplicateCorrelation(id));
        }
        table.pending.insert(id, continuation);
        Ok(())
    }

    /// Remove and fire the continuation for `id`.
    ///
    /// Returns `false` when nothing was pending under that id (late or
    /// duplicate response). Event sentinels never match.
    pub fn resolve(&self, id: i64, reply: Reply) -> bool {
        let continuation = self.lock().pending.remove(&id);
        match continuation {
            Some(tx) => {
                // The waiter may have stopped listening; the entry is gone either way.
                let _ = tx.send(reply);
                true
            }
            None => false,
        }
    }

    /// Remove the entry for `id` without firing it.
    pub fn cancel(&self, id: i64) -> bool {
        self.lock().pending.remove(&id).is_some()
    }

    /// Fail every pending continuation and refuse new registrations.
    pub fn close(&self) {
        let drained: Vec<_> = {
            let mut table = self.lock();
            table.closed = true;
            table.pending.drain().collect()
        };
        for (_, tx) in drained {
            let _ = tx.send(Err(self.closed_error()));
        }
    }

    /// Whether a continuation is still waiting under `id`.
    pub fn is_pending(&self, id: i64) -> bool {
        self.lock().pending.contains_key(&id)
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    /// The error waiters observe once the owner is gone.
    pub fn closed_error(&self) -> HiveError {
        match &self.owner {
            PageRef::Session(id) => HiveError::SessionClosed(id.to_string()),
            PageRef::Entity(id) => HiveError::EntityClosed(*id),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(|e| e.into_inner())
    }
}
