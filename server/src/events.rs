// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use chrono::Utc;
use common::{ChangeKind, TaskChange};
use tokio::sync::broadcast;
use tracing::debug;

const CHANGE_FEED_CAPACITY: usize = 256;

/// Realtime row-change notifications for the tasks table.
///
/// Subscribers that fall behind lose events and are expected to refetch.
#[derive(Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<TaskChange>,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(CHANGE_FEED_CAPACITY)
    }
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskChange> {
        self.tx.subscribe()
    }

    pub fn publish(&self, kind: ChangeKind, task_id: i64) {
        let change = TaskChange {
            kind,
            task_id,
            at: Utc::now(),
        };
        // No subscribers is not an error.
        if self.tx.send(change).is_err() {
            debug!("No change feed subscribers for task {}.", task_id);
        }
    }

    pub fn publish_many(&self, kind: ChangeKind, task_ids: &[i64]) {
        for id in task_ids {
            self.publish(kind, *id);
        }
    }
}
