// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use crate::Task;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// A change announced by the server for a single row.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteChange {
    Upserted(Task),
    Deleted { id: i64, at: DateTime<Utc> },
}

/// Everything that can modify a client's list of tasks.
///
/// Local mutations and remote notifications go through the same reducer so a
/// late response can never overwrite a newer row.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskEvent {
    LocalMutation(Task),
    RemoteChange(RemoteChange),
    Refetched(Vec<Task>),
}

/// Client-side list of tasks keyed by id.
///
/// Rows carry `updated_at` as their version. An incoming row is accepted only
/// if it is at least as new as the one held.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskListState {
    rows: BTreeMap<i64, Task>,
}

impl TaskListState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: i64) -> Option<&Task> {
        self.rows.get(&id)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.rows.values()
    }

    /// Applies an event and reports whether the state changed.
    pub fn apply(&mut self, event: TaskEvent) -> bool {
        match event {
            TaskEvent::LocalMutation(task) => self.accept(task),
            TaskEvent::RemoteChange(RemoteChange::Upserted(task)) => self.accept(task),
            TaskEvent::RemoteChange(RemoteChange::Deleted { id, at }) => {
                match self.rows.get(&id) {
                    Some(held) if held.updated_at > at => false,
                    Some(_) => {
                        self.rows.remove(&id);
                        true
                    }
                    None => false,
                }
            }
            TaskEvent::Refetched(snapshot) => {
                let mut next = BTreeMap::new();
                for task in snapshot {
                    // Keep a held row that is newer than the snapshot's copy.
                    let row = match self.rows.remove(&task.id) {
                        Some(held) if held.updated_at > task.updated_at => held,
                        _ => task,
                    };
                    next.insert(row.id, row);
                }
                let changed = next != self.rows;
                self.rows = next;
                changed
            }
        }
    }

    fn accept(&mut self, task: Task) -> bool {
        if let Some(held) = self.rows.get(&task.id) {
            if held.updated_at > task.updated_at {
                return false;
            }
        }
        self.rows.insert(task.id, task);
        true
    }
}
