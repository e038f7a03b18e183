//! Structured logging schema and field name constants for termbase.
//!
//! Both crates use these names for structured `tracing` fields so that log
//! aggregation can query persistence events uniformly.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | A compensating write failed; storage may hold a partial record |
//! | WARN  | A persist was rejected or rolled back |
//! | INFO  | Resource/version created, version released, resource retired |
//! | DEBUG | Decision points (seed source, release swap target, index replace vs append) |
//! | TRACE | Per-document store access |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "db", "cli"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "sources", "concepts", "memory_store", "pg_store", "pool"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "persist_new", "persist_changes", "retire", "update_concept_version"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Resource type label ("Source", "Concept", ...).
pub const RESOURCE_TYPE: &str = "resource_type";

/// UUID of the resource being operated on.
pub const RESOURCE_ID: &str = "resource_id";

/// UUID of the version record being operated on.
pub const VERSION_ID: &str = "version_id";

/// UUID of the container version whose member index changes.
pub const CONTAINER_VERSION_ID: &str = "container_version_id";

/// Mnemonic of the resource or version.
pub const MNEMONIC: &str = "mnemonic";

/// Storage collection name.
pub const COLLECTION: &str = "collection";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of documents returned by a query.
pub const RESULT_COUNT: &str = "result_count";

/// Number of members in a container version index.
pub const MEMBER_COUNT: &str = "member_count";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";
