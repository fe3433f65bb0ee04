//! # memory-index
//!
//! Embedded, in-process index over memory entries.
//!
//! Filtered and full-text queries run against four cooperating indexes
//! instead of scanning the whole collection:
//!
//! - [`TagIndex`]: lowercase tag -> ids
//! - [`PrivacyIndex`]: privacy level -> ids (a partition)
//! - [`ContentIndex`]: term -> ids, with a reverse map for cheap removal
//! - [`TemporalIndex`]: timestamp-sorted ids for range queries
//!
//! [`IndexCoordinator`] owns them together with an [`EntryCache`], and
//! handles the build lifecycle (single-flight, all-or-nothing), incremental
//! updates, the memory budget, snapshots and search. Below
//! `index_threshold` entries, or before a build, searches fall back to a
//! linear scan with identical filter semantics.
//!
//! ## Example
//!
//! ```ignore
//! use memory_index::{IndexCoordinator, SearchQuery};
//! use memory_types::IndexConfig;
//!
//! let coordinator = IndexCoordinator::new(IndexConfig::default());
//! coordinator.build_index(entries.clone()).await?;
//!
//! let page = coordinator.search(&SearchQuery::new().with_tags(["urgent"]), &entries);
//! for hit in page.hits {
//!     println!("{} {}", hit.score, hit.entry.id);
//! }
//!
//! let snapshot = coordinator.serialize()?;
//! ```

pub mod cache;
pub mod content;
pub mod coordinator;
pub mod error;
pub mod memory;
pub mod privacy;
pub mod query;
pub mod set;
pub mod snapshot;
pub mod stats;
pub mod tag;
pub mod temporal;
pub mod tokenizer;

pub use cache::EntryCache;
pub use content::ContentIndex;
pub use coordinator::{IndexCoordinator, RestoreOutcome};
pub use error::IndexError;
pub use privacy::PrivacyIndex;
pub use query::{search_linear, SearchHit, SearchPage, SearchQuery, DEFAULT_LIMIT};
pub use set::IndexSet;
pub use snapshot::{IndexSnapshot, RestoreReport, SNAPSHOT_VERSION};
pub use stats::{BuildOutcome, BuildState, BuildStats, IndexStats};
pub use tag::TagIndex;
pub use temporal::TemporalIndex;
pub use tokenizer::Tokenizer;
