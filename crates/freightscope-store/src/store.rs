//! The analytical store trait.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::query::{AggregateQuery, FieldQuery, ValuesQuery};

/// Aggregation primitives over the logistics dataset.
///
/// Every method returns the store's raw envelope. Callers pass it through the
/// matching adapter in [`crate::normalize`] before reading it.
#[async_trait]
pub trait AnalyticsStore: Send + Sync {
    /// Group-and-aggregate.
    async fn aggregate(&self, query: AggregateQuery) -> Result<Value>;

    /// Field cardinality, coverage and top values.
    async fn explore_field(&self, query: FieldQuery) -> Result<Value>;

    /// Raw values of one numeric metric.
    async fn fetch_values(&self, query: ValuesQuery) -> Result<Value>;

    /// Store name for logging.
    fn name(&self) -> &str;
}

/// A store shared across requests.
pub type SharedStore = Arc<dyn AnalyticsStore>;
