//! Replays collected calls once a refresh has stored a new access token

use futures::future::join_all;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use super::SessionInner;
use super::collector::{FailureBatch, ParkedCall, Reply};
use crate::client::{ApiCall, ClientError};

/// Parked queries sharing one compound key
struct ReplayGroup {
    call: ApiCall,
    attempt: u32,
    replies: Vec<Reply>,
}

fn group_queries(failed: &std::collections::BTreeSet<String>, queries: Vec<ParkedCall>) -> Vec<ReplayGroup> {
    let mut groups: Vec<ReplayGroup> = Vec::new();
    for parked in queries {
        if !failed.iter().any(|id| parked.call.key_contains(id)) {
            continue;
        }
        match groups.iter_mut().find(|g| g.call.key == parked.call.key) {
            Some(group) => {
                group.attempt = group.attempt.max(parked.attempt);
                group.replies.push(parked.reply);
            }
            None => groups.push(ReplayGroup {
                call: parked.call,
                attempt: parked.attempt,
                replies: vec![parked.reply],
            }),
        }
    }
    groups
}

fn deliver(replies: Vec<Reply>, result: Result<Value, ClientError>) {
    if replies.len() == 1 {
        if let Some(reply) = replies.into_iter().next() {
            let _ = reply.send(result);
        }
        return;
    }
    match result {
        Ok(value) => {
            for reply in replies {
                let _ = reply.send(Ok(value.clone()));
            }
        }
        Err(err) => {
            let err = Arc::new(err);
            for reply in replies {
                let _ = reply.send(Err(ClientError::Shared(err.clone())));
            }
        }
    }
}

/// Re-fetch each failed query once per distinct key, concurrently, and
/// replay mutations one after another in the order they failed. Results go
/// back to the callers that are still waiting.
pub(super) async fn dispatch(inner: Arc<SessionInner>, batch: FailureBatch) {
    inner.lock_state().coordinator.take_retry();

    let FailureBatch {
        failed_queries,
        queries,
        mutations,
    } = batch;
    let parked_queries = queries.len();
    let groups = group_queries(&failed_queries, queries);
    debug!(
        identifiers = failed_queries.len(),
        parked_queries,
        refetches = groups.len(),
        mutations = mutations.len(),
        "Replaying failed calls"
    );

    let refetch = join_all(groups.into_iter().map(|group| {
        let inner = inner.clone();
        async move {
            let result = inner.perform(group.call, group.attempt + 1).await;
            deliver(group.replies, result);
        }
    }));

    let replay = {
        let inner = inner.clone();
        async move {
            for parked in mutations {
                let result = inner.clone().perform(parked.call, parked.attempt + 1).await;
                let _ = parked.reply.send(result);
            }
        }
    };

    futures::join!(refetch, replay);
}
