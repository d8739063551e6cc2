//! Analytical data store abstraction for freightscope.
//!
//! Investigation tools never talk to the data directly. They build typed
//! queries, send them through [`AnalyticsStore`], and read the raw envelope
//! back through one of the [`normalize`] adapters.
//!
//! Implementations:
//! - [`HttpStore`]: remote store over HTTP
//! - [`DatasetStore`]: records held in memory, loaded from JSON / NDJSON
//! - `MockStore`: scripted envelopes for tests (`testing` feature)

pub mod dataset;
pub mod error;
pub mod http;
#[cfg(any(test, feature = "testing"))]
pub mod mock;
pub mod normalize;
pub mod period;
pub mod query;
pub mod store;

pub use dataset::{DEFAULT_DATE_FIELD, DatasetStore};
pub use error::{Result, StoreError};
pub use http::{HttpStore, HttpStoreBuilder};
#[cfg(any(test, feature = "testing"))]
pub use mock::{MockStore, StoreCall};
pub use normalize::{FieldProfile, GroupRow, ValueCount};
pub use period::{DateRange, Period};
pub use query::{AggregateQuery, Aggregation, Bucket, FieldQuery, Filters, ValuesQuery};
pub use store::{AnalyticsStore, SharedStore};
