use chrono::Utc;
use parking_lot::Mutex;
use std::collections::VecDeque;

use crate::models::{HistoryRecord, QueryType};

/// Fixed-capacity log of answered queries, most recent first.
pub struct QueryHistory {
    capacity: usize,
    records: Mutex<VecDeque<HistoryRecord>>,
}

impl QueryHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            records: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn add(&self, query: &str, query_type: QueryType) {
        self.push(HistoryRecord {
            query: query.to_string(),
            query_type,
            timestamp: Utc::now(),
        });
    }

    pub fn push(&self, record: HistoryRecord) {
        let mut records = self.records.lock();
        if records.len() == self.capacity {
            records.pop_back();
        }
        records.push_front(record);
    }

    pub fn list(&self) -> Vec<HistoryRecord> {
        self.records.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
