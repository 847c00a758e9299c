//! Bookkeeping of the operations active on one duplex connection.

use std::collections::HashMap;
use std::sync::Arc;

use super::frame::StartPayload;
use super::handle::OperationHandler;
use crate::error::{ClientError, Result};

/// One active operation.
#[derive(Clone)]
pub(crate) struct OperationEntry {
    /// The payload of the `start` frame that opened the operation.
    pub(crate) payload: StartPayload,
    pub(crate) handler: Arc<dyn OperationHandler>,
    /// Generation of the handle the last `start` frame was sent on.
    pub(crate) started_on: u64,
}

impl OperationEntry {
    pub(crate) fn new(payload: StartPayload, handler: Arc<dyn OperationHandler>) -> Self {
        Self {
            payload,
            handler,
            started_on: 0,
        }
    }

    pub(crate) fn started_on(mut self, generation: u64) -> Self {
        self.started_on = generation;
        self
    }
}

/// Mapping from operation identifier to operation state.
///
/// Identifiers come from [`allocate_id`](Self::allocate_id): a monotonic
/// counter that skips any value still present, so an identifier is never
/// handed out twice while it is registered.
#[derive(Default)]
pub(crate) struct OperationRegistry {
    entries: HashMap<String, OperationEntry>,
    next_id: u64,
}

impl OperationRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn allocate_id(&mut self) -> String {
        loop {
            self.next_id += 1;
            let id = self.next_id.to_string();
            if !self.entries.contains_key(&id) {
                return id;
            }
        }
    }

    pub(crate) fn register(&mut self, id: String, entry: OperationEntry) -> Result<()> {
        if self.entries.contains_key(&id) {
            return Err(ClientError::DuplicateIdentifier(id));
        }
        self.entries.insert(id, entry);
        Ok(())
    }

    pub(crate) fn lookup(&self, id: &str) -> Option<&OperationEntry> {
        self.entries.get(id)
    }

    /// Remove an entry; absent identifiers are ignored.
    pub(crate) fn remove(&mut self, id: &str) -> Option<OperationEntry> {
        self.entries.remove(id)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entries.keys().cloned().collect();
        ids.sort_by_key(|id| id.parse::<u64>().unwrap_or(u64::MAX));
        ids
    }

    /// Entries last started on a handle older than `generation`, ordered by
    /// identifier. They are marked as started on `generation`, so each one
    /// is returned at most once per handle.
    pub(crate) fn restart(&mut self, generation: u64) -> Vec<(String, StartPayload)> {
        let mut restarted = Vec::new();
        for id in self.ids() {
            if let Some(entry) = self.entries.get_mut(&id)
                && entry.started_on < generation
            {
                entry.started_on = generation;
                restarted.push((id, entry.payload.clone()));
            }
        }
        restarted
    }

    pub(crate) fn drain(&mut self) -> Vec<(String, OperationEntry)> {
        self.entries.drain().collect()
    }
}
