//! Centralized default constants for termbase.
//!
//! Shared defaults live here so the repositories, the CLI, and the
//! configuration loader agree on the same values.

// =============================================================================
// LOCALES
// =============================================================================

/// Locale assigned to a source when none is given.
pub const DEFAULT_LOCALE: &str = "en";

// =============================================================================
// VERSIONING
// =============================================================================

/// Label given to the first version synthesized for a new resource, before
/// the version's own id replaces it.
pub const INITIAL_VERSION_LABEL: &str = "INITIAL";

/// Placeholder label for versions whose mnemonic is assigned on persist.
pub const TEMP_VERSION_LABEL: &str = "_TEMP";

// =============================================================================
// DATABASE
// =============================================================================

/// Default maximum number of connections in the pool.
pub const DB_MAX_CONNECTIONS: u32 = 10;

/// Default connection timeout in seconds.
pub const DB_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default idle timeout in seconds.
pub const DB_IDLE_TIMEOUT_SECS: u64 = 600;

/// Default maximum connection lifetime in seconds.
pub const DB_MAX_LIFETIME_SECS: u64 = 1800;

// =============================================================================
// AUTH
// =============================================================================

/// Length in hex characters of generated auth token keys.
pub const AUTH_TOKEN_LENGTH: usize = 40;
