//! Scripted store for tests.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};

use crate::error::{Result, StoreError};
use crate::query::{AggregateQuery, FieldQuery, ValuesQuery};
use crate::store::AnalyticsStore;

/// A call received by [`MockStore`].
#[derive(Debug, Clone, PartialEq)]
pub enum StoreCall {
    Aggregate(AggregateQuery),
    Explore(FieldQuery),
    Values(ValuesQuery),
}

type Scripted = std::result::Result<Value, String>;

/// Store returning scripted envelopes per operation.
///
/// Each operation pops its queue in order; the last entry is repeated once
/// the queue is down to one. An operation with nothing scripted returns an
/// empty envelope.
#[derive(Debug, Default)]
pub struct MockStore {
    aggregate: Mutex<VecDeque<Scripted>>,
    explore: Mutex<VecDeque<Scripted>>,
    values: Mutex<VecDeque<Scripted>>,
    calls: Mutex<Vec<StoreCall>>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_aggregate(self, envelope: Value) -> Self {
        self.aggregate.lock().push_back(Ok(envelope));
        self
    }

    pub fn with_aggregate_error(self, message: impl Into<String>) -> Self {
        self.aggregate.lock().push_back(Err(message.into()));
        self
    }

    pub fn with_explore(self, envelope: Value) -> Self {
        self.explore.lock().push_back(Ok(envelope));
        self
    }

    pub fn with_explore_error(self, message: impl Into<String>) -> Self {
        self.explore.lock().push_back(Err(message.into()));
        self
    }

    pub fn with_values(self, envelope: Value) -> Self {
        self.values.lock().push_back(Ok(envelope));
        self
    }

    pub fn with_values_error(self, message: impl Into<String>) -> Self {
        self.values.lock().push_back(Err(message.into()));
        self
    }

    /// All calls received so far, in order.
    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    fn next(queue: &Mutex<VecDeque<Scripted>>, empty: Value) -> Result<Value> {
        let mut queue = queue.lock();
        let entry = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        match entry {
            Some(Ok(envelope)) => Ok(envelope),
            Some(Err(message)) => Err(StoreError::Api {
                status: 503,
                message,
            }),
            None => Ok(empty),
        }
    }
}

#[async_trait]
impl AnalyticsStore for MockStore {
    async fn aggregate(&self, query: AggregateQuery) -> Result<Value> {
        self.calls.lock().push(StoreCall::Aggregate(query));
        Self::next(&self.aggregate, json!({"groups": []}))
    }

    async fn explore_field(&self, query: FieldQuery) -> Result<Value> {
        let field = query.field.clone();
        self.calls.lock().push(StoreCall::Explore(query));
        Self::next(
            &self.explore,
            json!({"field": field, "distinct_count": 0, "total_records": 0, "top_values": []}),
        )
    }

    async fn fetch_values(&self, query: ValuesQuery) -> Result<Value> {
        self.calls.lock().push(StoreCall::Values(query));
        Self::next(&self.values, json!({"values": []}))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Aggregation;

    #[tokio::test]
    async fn test_scripted_then_repeated() {
        let store = MockStore::new()
            .with_aggregate(json!({"groups": [{"group": "a", "value": 1}]}))
            .with_aggregate_error("down");

        let q = || AggregateQuery::new("c1", Aggregation::Count);
        assert!(store.aggregate(q()).await.is_ok());
        assert!(store.aggregate(q()).await.is_err());
        assert!(store.aggregate(q()).await.is_err());
        assert_eq!(store.call_count(), 3);
    }

    #[tokio::test]
    async fn test_empty_envelopes_by_default() {
        let store = MockStore::new();
        let envelope = store
            .fetch_values(ValuesQuery::new("c1", "cost"))
            .await
            .unwrap();
        assert_eq!(envelope, json!({"values": []}));
        assert!(matches!(store.calls()[0], StoreCall::Values(_)));
    }
}
