//! QuoteVault Core — versioned artifact store, trading calendars, freshness oracle.
//!
//! This crate contains:
//! - Blob backends (filesystem and in-memory) with checksummed payloads
//! - Artifact records, record repositories and schema migrations
//! - The artifact store with staged write → commit transfer
//! - Trading calendars (rule-based NYSE, fixed session lists)
//! - The freshness oracle deciding whether a cached copy may be reused

pub mod blob;
pub mod calendar;
pub mod freshness;
pub mod store;

pub use blob::{BlobBackend, BlobError, BlobRef, FsBlobBackend, MemoryBlobBackend};
pub use calendar::{latest_session, CalendarError, FixedCalendar, NyseCalendar, Session, TradingCalendar};
pub use freshness::{Freshness, FreshnessOracle};
pub use store::{
    Artifact, ArtifactStore, Parameters, RecordError, RecordRepository, StoreError, WriteStep,
    DEFAULT_VERSION,
};
