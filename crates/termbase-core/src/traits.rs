//! Core traits for termbase abstractions.
//!
//! The storage traits define what the versioning protocol needs from a
//! backend; the resource traits describe what the protocol needs from the
//! records it manages.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use uuid::Uuid;

use crate::error::Result;
use crate::models::ParentRef;
use crate::validation::Validate;

// =============================================================================
// RECORD TRAITS
// =============================================================================

/// A persisted document with a stable id.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Storage collection holding records of this type.
    const COLLECTION: &'static str;

    fn id(&self) -> Uuid;
}

/// Fields shared by every resource and version: mnemonic, soft-delete flag,
/// timestamps.
pub trait Resource: Record + Validate {
    /// Human-readable type label ("Source", "Concept Version", ...).
    const RESOURCE_TYPE: &'static str;

    fn mnemonic(&self) -> &str;

    fn is_active(&self) -> bool;

    fn set_active(&mut self, active: bool);

    /// Bump `updated_at`.
    fn touch(&mut self);
}

/// A resource whose mnemonic is unique only among siblings under the same
/// parent.
pub trait SubResource: Resource {
    fn owner_id(&self) -> Option<Uuid>;

    fn parent(&self) -> Option<ParentRef>;

    /// Attach owner and parent before validation.
    fn bind(&mut self, owner_id: Uuid, parent: ParentRef);
}

/// An immutable snapshot of a resource, linked into a version chain.
pub trait ResourceVersion: Resource {
    /// Whether "current" means the latest *released* version (containers)
    /// rather than the latest active one.
    const CURRENT_REQUIRES_RELEASE: bool;

    /// Collection holding the versioned resources.
    const VERSIONED_COLLECTION: &'static str;

    fn versioned_object_id(&self) -> Uuid;

    fn set_mnemonic(&mut self, mnemonic: String);

    fn released(&self) -> bool;

    fn set_released(&mut self, released: bool);

    fn previous_version_id(&self) -> Option<Uuid>;

    fn set_previous_version_id(&mut self, id: Option<Uuid>);

    fn parent_version_id(&self) -> Option<Uuid>;

    fn set_parent_version_id(&mut self, id: Option<Uuid>);

    /// Unsaved copy of every snapshot field, with a fresh id and
    /// `previous_version_id` pointing at `self`.
    fn clone_version(&self) -> Self;
}

/// A sub-resource with a version chain.
pub trait Versioned: SubResource {
    type Version: ResourceVersion;

    /// Unsaved version built from the resource's current field values.
    fn snapshot(&self, label: &str, previous: Option<&Self::Version>) -> Self::Version;
}

// =============================================================================
// STORAGE
// =============================================================================

/// Conjunction of top-level field equalities.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<(String, JsonValue)>,
}

impl Filter {
    /// Filter matching every document.
    pub fn all() -> Self {
        Self::default()
    }

    /// Require `field == value`.
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.conditions.push((field.into(), value.into()));
        self
    }

    /// Require `field` to hold the given id.
    pub fn eq_id(self, field: impl Into<String>, id: Uuid) -> Self {
        self.eq(field, JsonValue::String(id.to_string()))
    }

    /// Require `field` to hold the given parent reference.
    pub fn eq_parent(self, field: impl Into<String>, parent: &ParentRef) -> Self {
        self.eq(field, parent.to_json())
    }

    pub fn conditions(&self) -> &[(String, JsonValue)] {
        &self.conditions
    }

    /// Whether a document satisfies every condition.
    pub fn matches(&self, doc: &JsonValue) -> bool {
        self.conditions
            .iter()
            .all(|(field, value)| doc.get(field) == Some(value))
    }

    /// JSON object form, suitable for containment queries.
    pub fn to_json_object(&self) -> JsonValue {
        let map: Map<String, JsonValue> = self.conditions.iter().cloned().collect();
        JsonValue::Object(map)
    }
}

/// Minimal document storage the versioning protocol runs on.
///
/// Every call either completes or reports failure; no multi-call atomicity
/// is assumed. `find` returns documents in ascending creation order.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a new document. Fails with `Conflict` if the id is taken.
    async fn insert(&self, collection: &str, id: Uuid, doc: JsonValue) -> Result<()>;

    /// Replace an existing document. Fails with `NotFound` if absent.
    async fn update(&self, collection: &str, id: Uuid, doc: JsonValue) -> Result<()>;

    /// Delete a document, returning whether it existed.
    async fn delete(&self, collection: &str, id: Uuid) -> Result<bool>;

    /// Fetch a document by id.
    async fn get(&self, collection: &str, id: Uuid) -> Result<Option<JsonValue>>;

    /// Fetch all matching documents, oldest first.
    async fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<JsonValue>>;

    /// Count matching documents.
    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64>;
}
