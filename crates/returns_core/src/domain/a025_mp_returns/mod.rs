//! Возвраты маркетплейса: кэш, склейка запросов, снимок, группировка, пометки.

pub mod annotations;
pub mod api;
pub mod controller;
pub mod error;
pub mod fetcher;
pub mod hierarchy;
pub mod query;
pub mod query_controller;
pub mod sku;
pub mod snapshot;

pub use annotations::{Annotation, AnnotationStore, ANNOTATIONS_KEY, ANNOTATION_RETENTION_DAYS};
pub use api::{HttpReturnsApi, ReturnsApi};
pub use controller::{LoadPhase, ReturnsController, ReturnsView};
pub use error::FetchError;
pub use fetcher::{CacheEntry, FetchOutcome, FetchSettings, Revalidation, ReturnsFetcher, ReturnsPage};
pub use hierarchy::{aggregate, Hierarchy, ReturnGroup};
pub use query::{CacheKey, ReturnsQuery};
pub use query_controller::QueryController;
pub use sku::base_key;
pub use snapshot::{PersistedSnapshot, SnapshotPatch, SnapshotStore, SCHEMA_VERSION, SNAPSHOT_KEY};
