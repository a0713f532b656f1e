// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! In-memory storage for tests and embedding

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::DataStorage;
use crate::error::Result;
use crate::invalidation::SignalStore;
use crate::tracking::{Goal, TrackingEntry};

#[derive(Default)]
pub struct MemoryStorage {
    entries: RwLock<HashMap<String, Vec<TrackingEntry>>>,
    goals: RwLock<HashMap<String, Vec<Goal>>>,
    signals: RwLock<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_entries(&self, entries: Vec<TrackingEntry>) {
        let mut map = self.entries.write();
        for entry in entries {
            map.entry(entry.student_id.clone()).or_default().push(entry);
        }
        for list in map.values_mut() {
            list.sort_by_key(|e| e.timestamp);
        }
    }

    pub fn set_goals(&self, student_id: &str, goals: Vec<Goal>) {
        self.goals.write().insert(student_id.to_string(), goals);
    }

    pub fn remove_student(&self, student_id: &str) {
        self.entries.write().remove(student_id);
        self.goals.write().remove(student_id);
    }
}

#[async_trait]
impl DataStorage for MemoryStorage {
    async fn entries_for_student(&self, student_id: &str) -> Result<Vec<TrackingEntry>> {
        Ok(self.entries.read().get(student_id).cloned().unwrap_or_default())
    }

    async fn goals_for_student(&self, student_id: &str) -> Result<Vec<Goal>> {
        Ok(self.goals.read().get(student_id).cloned().unwrap_or_default())
    }

    async fn students(&self) -> Result<Vec<String>> {
        let mut students: Vec<String> = self.entries.read().keys().cloned().collect();
        students.sort();
        Ok(students)
    }
}

impl SignalStore for MemoryStorage {
    fn write_signal(&self, key: &str, value: &str) -> Result<()> {
        self.signals.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn read_signal(&self, key: &str) -> Result<Option<String>> {
        Ok(self.signals.read().get(key).cloned())
    }
}
