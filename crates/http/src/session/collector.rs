//! Calls rejected with 401, held until the next refresh

use serde_json::Value;
use std::collections::BTreeSet;
use tokio::sync::oneshot;

use crate::client::{ApiCall, CallKind, ClientError};

pub(crate) type Reply = oneshot::Sender<Result<Value, ClientError>>;

/// A rejected call and the caller waiting for its replayed result
pub(crate) struct ParkedCall {
    pub call: ApiCall,
    /// Replays already spent on this call
    pub attempt: u32,
    pub reply: Reply,
}

/// Everything collected since the previous refresh
#[derive(Default)]
pub(crate) struct FailureBatch {
    pub failed_queries: BTreeSet<String>,
    pub queries: Vec<ParkedCall>,
    pub mutations: Vec<ParkedCall>,
}

impl FailureBatch {
    pub fn is_empty(&self) -> bool {
        self.queries.is_empty() && self.mutations.is_empty()
    }

    /// Every caller waiting on this batch
    pub fn into_replies(self) -> impl Iterator<Item = Reply> {
        self.queries
            .into_iter()
            .chain(self.mutations)
            .map(|parked| parked.reply)
    }
}

/// Snapshot of the failure sets, for status output and tests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingFailures {
    /// Distinct failed query identifiers
    pub queries: usize,
    pub mutations: usize,
    pub refresh_in_flight: bool,
}

#[derive(Default)]
pub(crate) struct FailureCollector {
    batch: FailureBatch,
}

impl FailureCollector {
    /// Queries are deduplicated by identifier; mutations are appended in
    /// arrival order so they can be replayed with their original input.
    pub fn record(&mut self, call: ApiCall, attempt: u32, reply: Reply) {
        let parked = ParkedCall {
            call,
            attempt,
            reply,
        };
        match parked.call.kind {
            CallKind::Query => {
                self.batch
                    .failed_queries
                    .insert(parked.call.identifier().to_string());
                self.batch.queries.push(parked);
            }
            CallKind::Mutation => self.batch.mutations.push(parked),
        }
    }

    pub fn take(&mut self) -> FailureBatch {
        std::mem::take(&mut self.batch)
    }

    pub fn failed_query_count(&self) -> usize {
        self.batch.failed_queries.len()
    }

    pub fn failed_mutation_count(&self) -> usize {
        self.batch.mutations.len()
    }
}
