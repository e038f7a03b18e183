//! Core data models for termbase.
//!
//! Resources are the mutable "current" records (organizations, user
//! profiles, sources, concepts). Versions are immutable snapshots of a
//! source or concept, chained through `previous_version_id` and branched
//! through `parent_version_id`.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use uuid::Uuid;

use crate::defaults::{DEFAULT_LOCALE, TEMP_VERSION_LABEL};
use crate::error::Error;
use crate::localized::{HasNames, LocalizedText};
use crate::traits::{Record, Resource, ResourceVersion, SubResource, Versioned};
use crate::uuid_utils::new_v7;
use crate::validation::{check_mnemonic, check_required, Validate, ValidationErrors, ALL_FIELDS};

/// Free-form extension map carried by every record.
pub type Extras = Map<String, JsonValue>;

// =============================================================================
// RESOURCE TYPE LABELS
// =============================================================================

pub const ORGANIZATION_TYPE: &str = "Organization";
pub const USER_TYPE: &str = "User";
pub const SOURCE_TYPE: &str = "Source";
pub const SOURCE_VERSION_TYPE: &str = "Source Version";
pub const CONCEPT_TYPE: &str = "Concept";
pub const CONCEPT_VERSION_TYPE: &str = "Concept Version";

// =============================================================================
// ENUMERATED METADATA
// =============================================================================

/// Public access level of a concept container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum AccessType {
    #[default]
    View,
    Edit,
    None,
}

impl fmt::Display for AccessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::View => write!(f, "View"),
            Self::Edit => write!(f, "Edit"),
            Self::None => write!(f, "None"),
        }
    }
}

impl FromStr for AccessType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "view" => Ok(Self::View),
            "edit" => Ok(Self::Edit),
            "none" => Ok(Self::None),
            _ => Err(Error::InvalidInput(format!("Unknown access type: {}", s))),
        }
    }
}

/// Kind of dictionary a source represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SourceType {
    #[default]
    #[serde(rename = "dictionary")]
    Dictionary,
    #[serde(rename = "reference")]
    Reference,
    #[serde(rename = "externalDictionary")]
    ExternalDictionary,
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dictionary => write!(f, "dictionary"),
            Self::Reference => write!(f, "reference"),
            Self::ExternalDictionary => write!(f, "externalDictionary"),
        }
    }
}

impl FromStr for SourceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dictionary" => Ok(Self::Dictionary),
            "reference" => Ok(Self::Reference),
            "externalDictionary" | "external-dictionary" => Ok(Self::ExternalDictionary),
            _ => Err(Error::InvalidInput(format!("Unknown source type: {}", s))),
        }
    }
}

// =============================================================================
// PARENT REFERENCES
// =============================================================================

/// Typed link from a sub-resource to the resource that scopes it.
///
/// Sources live under an organization or a user profile; concepts live
/// under a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ParentRef {
    Organization(Uuid),
    UserProfile(Uuid),
    Source(Uuid),
}

impl ParentRef {
    pub fn id(&self) -> Uuid {
        match self {
            Self::Organization(id) | Self::UserProfile(id) | Self::Source(id) => *id,
        }
    }

    /// Resource type label of the referenced parent.
    pub fn resource_type(&self) -> &'static str {
        match self {
            Self::Organization(_) => ORGANIZATION_TYPE,
            Self::UserProfile(_) => USER_TYPE,
            Self::Source(_) => SOURCE_TYPE,
        }
    }

    /// Whether this reference can own a concept container.
    pub fn is_container_owner(&self) -> bool {
        matches!(self, Self::Organization(_) | Self::UserProfile(_))
    }

    /// JSON form used in storage filters.
    pub fn to_json(&self) -> JsonValue {
        serde_json::to_value(self).unwrap_or(JsonValue::Null)
    }
}

impl fmt::Display for ParentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource_type(), self.id())
    }
}

// =============================================================================
// USERS AND BASE RESOURCES
// =============================================================================

/// Account that owns sub-resources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(username: impl Into<String>, email: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: new_v7(),
            username: username.into(),
            email: email.into(),
            first_name: String::new(),
            last_name: String::new(),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Record for User {
    const COLLECTION: &'static str = "user";

    fn id(&self) -> Uuid {
        self.id
    }
}

impl Validate for User {
    fn validate(&self) -> ValidationErrors {
        let mut errors = ValidationErrors::new();
        check_required(&mut errors, "username", &self.username);
        errors
    }
}

/// API token issued to a user when the account is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub key: String,
    pub created_at: DateTime<Utc>,
}

impl Record for AuthToken {
    const COLLECTION: &'static str = "auth_token";

    fn id(&self) -> Uuid {
        self.id
    }
}

/// Organization: a base resource whose mnemonic is globally unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organization {
    pub id: Uuid,
    pub mnemonic: String,
    pub name: String,
    pub company: Option<String>,
    pub website: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub extras: Extras,
}

impl Organization {
    pub fn new(mnemonic: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: new_v7(),
            mnemonic: mnemonic.into(),
            name: name.into(),
            company: None,
            website: None,
            is_active: true,
            created_at: now,
            updated_at: now,
            extras: Extras::new(),
        }
    }
}

impl Record for Organization {
    const COLLECTION: &'static str = "organization";

    fn id(&self) -> Uuid {
        self.id
    }
}

impl Resource for Organization {
    const RESOURCE_TYPE: &'static str = ORGANIZATION_TYPE;

    fn mnemonic(&self) -> &str {
        &self.mnemonic
    }

    fn is_active(&self) -> bool {
        self.is_active
    }

    fn set_active(&mut self, active: bool) {
        self.is_active = active;
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

impl Validate for Organization {
    fn validate(&self) -> ValidationErrors {
        let mut errors = ValidationErrors::new();
        check_mnemonic(&mut errors, "mnemonic", &self.mnemonic);
        check_required(&mut errors, "name", &self.name);
        errors
    }
}

/// Public profile of a user: a base resource that can own sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub mnemonic: String,
    pub full_name: Option<String>,
    pub company: Option<String>,
    pub location: Option<String>,
    pub preferred_locale: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub extras: Extras,
}

impl UserProfile {
    pub fn new(user_id: Uuid, mnemonic: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: new_v7(),
            user_id,
            mnemonic: mnemonic.into(),
            full_name: None,
            company: None,
            location: None,
            preferred_locale: None,
            is_active: true,
            created_at: now,
            updated_at: now,
            extras: Extras::new(),
        }
    }
}

impl Record for UserProfile {
    const COLLECTION: &'static str = "user_profile";

    fn id(&self) -> Uuid {
        self.id
    }
}

impl Resource for UserProfile {
    const RESOURCE_TYPE: &'static str = USER_TYPE;

    fn mnemonic(&self) -> &str {
        &self.mnemonic
    }

    fn is_active(&self) -> bool {
        self.is_active
    }

    fn set_active(&mut self, active: bool) {
        self.is_active = active;
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

impl Validate for UserProfile {
    fn validate(&self) -> ValidationErrors {
        let mut errors = ValidationErrors::new();
        check_mnemonic(&mut errors, "mnemonic", &self.mnemonic);
        errors
    }
}

// =============================================================================
// SOURCES
// =============================================================================

/// A concept container: a dictionary or vocabulary owned by an organization
/// or user profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub id: Uuid,
    pub mnemonic: String,
    pub owner_id: Option<Uuid>,
    pub parent: Option<ParentRef>,
    pub name: String,
    pub full_name: Option<String>,
    #[serde(default)]
    pub source_type: SourceType,
    #[serde(default)]
    pub public_access: AccessType,
    pub default_locale: String,
    #[serde(default)]
    pub supported_locales: Vec<String>,
    pub website: Option<String>,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub extras: Extras,
}

impl Source {
    pub fn new(mnemonic: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: new_v7(),
            mnemonic: mnemonic.into(),
            owner_id: None,
            parent: None,
            name: name.into(),
            full_name: None,
            source_type: SourceType::default(),
            public_access: AccessType::default(),
            default_locale: DEFAULT_LOCALE.to_string(),
            supported_locales: Vec::new(),
            website: None,
            description: None,
            is_active: true,
            created_at: now,
            updated_at: now,
            extras: Extras::new(),
        }
    }
}

impl Record for Source {
    const COLLECTION: &'static str = "source";

    fn id(&self) -> Uuid {
        self.id
    }
}

impl Resource for Source {
    const RESOURCE_TYPE: &'static str = SOURCE_TYPE;

    fn mnemonic(&self) -> &str {
        &self.mnemonic
    }

    fn is_active(&self) -> bool {
        self.is_active
    }

    fn set_active(&mut self, active: bool) {
        self.is_active = active;
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

impl SubResource for Source {
    fn owner_id(&self) -> Option<Uuid> {
        self.owner_id
    }

    fn parent(&self) -> Option<ParentRef> {
        self.parent
    }

    fn bind(&mut self, owner_id: Uuid, parent: ParentRef) {
        self.owner_id = Some(owner_id);
        self.parent = Some(parent);
    }
}

impl Validate for Source {
    fn validate(&self) -> ValidationErrors {
        let mut errors = ValidationErrors::new();
        check_mnemonic(&mut errors, "mnemonic", &self.mnemonic);
        check_required(&mut errors, "name", &self.name);
        if self.owner_id.is_none() {
            errors.add("owner", "This field cannot be null.");
        }
        match self.parent {
            None => errors.add("parent", "This field cannot be null."),
            Some(parent) if !parent.is_container_owner() => errors.add(
                "parent",
                "Source parent must be an Organization or a User.",
            ),
            Some(_) => {}
        }
        errors
    }
}

impl Versioned for Source {
    type Version = SourceVersion;

    fn snapshot(&self, label: &str, previous: Option<&SourceVersion>) -> SourceVersion {
        SourceVersion::for_base_object(self, label, previous, None, false)
    }
}

/// Immutable snapshot of a source, carrying the concept-version ids the
/// source held at that point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceVersion {
    pub id: Uuid,
    pub mnemonic: String,
    pub versioned_object_id: Uuid,
    pub released: bool,
    pub previous_version_id: Option<Uuid>,
    pub parent_version_id: Option<Uuid>,
    pub name: String,
    pub full_name: Option<String>,
    #[serde(default)]
    pub source_type: SourceType,
    #[serde(default)]
    pub public_access: AccessType,
    pub default_locale: String,
    #[serde(default)]
    pub supported_locales: Vec<String>,
    pub website: Option<String>,
    pub description: Option<String>,
    /// Member index: ids of the concept versions this version holds.
    #[serde(default)]
    pub concepts: Vec<Uuid>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub extras: Extras,
}

impl SourceVersion {
    /// Build an unsaved version of `source` from its current field values.
    pub fn for_base_object(
        source: &Source,
        label: &str,
        previous: Option<&SourceVersion>,
        parent: Option<&SourceVersion>,
        released: bool,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: new_v7(),
            mnemonic: label.to_string(),
            versioned_object_id: source.id,
            released,
            previous_version_id: previous.map(|v| v.id),
            parent_version_id: parent.map(|v| v.id),
            name: source.name.clone(),
            full_name: source.full_name.clone(),
            source_type: source.source_type,
            public_access: source.public_access,
            default_locale: source.default_locale.clone(),
            supported_locales: source.supported_locales.clone(),
            website: source.website.clone(),
            description: source.description.clone(),
            concepts: Vec::new(),
            is_active: true,
            created_at: now,
            updated_at: now,
            extras: Extras::new(),
        }
    }

    /// Insert or replace a concept version in the member index.
    ///
    /// When `previous_version_id` is already a member its slot is reused so
    /// the index keeps one entry per concept in stable order; otherwise the
    /// new id is appended. Returns `false` when the id was already present.
    pub fn update_concept_version(
        &mut self,
        concept_version_id: Uuid,
        previous_version_id: Option<Uuid>,
    ) -> bool {
        if self.concepts.contains(&concept_version_id) {
            return false;
        }
        let slot = previous_version_id
            .and_then(|prev| self.concepts.iter().position(|id| *id == prev));
        match slot {
            Some(index) => self.concepts[index] = concept_version_id,
            None => self.concepts.push(concept_version_id),
        }
        true
    }
}

impl Record for SourceVersion {
    const COLLECTION: &'static str = "source_version";

    fn id(&self) -> Uuid {
        self.id
    }
}

impl Resource for SourceVersion {
    const RESOURCE_TYPE: &'static str = SOURCE_VERSION_TYPE;

    fn mnemonic(&self) -> &str {
        &self.mnemonic
    }

    fn is_active(&self) -> bool {
        self.is_active
    }

    fn set_active(&mut self, active: bool) {
        self.is_active = active;
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

impl ResourceVersion for SourceVersion {
    const CURRENT_REQUIRES_RELEASE: bool = true;
    const VERSIONED_COLLECTION: &'static str = Source::COLLECTION;

    fn versioned_object_id(&self) -> Uuid {
        self.versioned_object_id
    }

    fn set_mnemonic(&mut self, mnemonic: String) {
        self.mnemonic = mnemonic;
    }

    fn released(&self) -> bool {
        self.released
    }

    fn set_released(&mut self, released: bool) {
        self.released = released;
    }

    fn previous_version_id(&self) -> Option<Uuid> {
        self.previous_version_id
    }

    fn set_previous_version_id(&mut self, id: Option<Uuid>) {
        self.previous_version_id = id;
    }

    fn parent_version_id(&self) -> Option<Uuid> {
        self.parent_version_id
    }

    fn set_parent_version_id(&mut self, id: Option<Uuid>) {
        self.parent_version_id = id;
    }

    fn clone_version(&self) -> Self {
        let now = Utc::now();
        Self {
            id: new_v7(),
            mnemonic: TEMP_VERSION_LABEL.to_string(),
            released: false,
            previous_version_id: Some(self.id),
            concepts: self.concepts.clone(),
            created_at: now,
            updated_at: now,
            ..self.clone()
        }
    }
}

impl Validate for SourceVersion {
    fn validate(&self) -> ValidationErrors {
        let mut errors = ValidationErrors::new();
        check_mnemonic(&mut errors, "mnemonic", &self.mnemonic);
        check_required(&mut errors, "name", &self.name);
        check_self_links(&mut errors, self);
        errors
    }
}

// =============================================================================
// CONCEPTS
// =============================================================================

/// A coded term inside a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concept {
    pub id: Uuid,
    pub mnemonic: String,
    pub owner_id: Option<Uuid>,
    pub parent: Option<ParentRef>,
    pub concept_class: String,
    pub datatype: Option<String>,
    #[serde(default)]
    pub names: Vec<LocalizedText>,
    #[serde(default)]
    pub descriptions: Vec<LocalizedText>,
    #[serde(default)]
    pub retired: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub extras: Extras,
}

impl Concept {
    pub fn new(mnemonic: impl Into<String>, concept_class: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: new_v7(),
            mnemonic: mnemonic.into(),
            owner_id: None,
            parent: None,
            concept_class: concept_class.into(),
            datatype: None,
            names: Vec::new(),
            descriptions: Vec::new(),
            retired: false,
            is_active: true,
            created_at: now,
            updated_at: now,
            extras: Extras::new(),
        }
    }

    /// Id of the containing source, if the parent is one.
    pub fn source_id(&self) -> Option<Uuid> {
        match self.parent {
            Some(ParentRef::Source(id)) => Some(id),
            _ => None,
        }
    }
}

impl HasNames for Concept {
    fn names(&self) -> &[LocalizedText] {
        &self.names
    }
}

impl Record for Concept {
    const COLLECTION: &'static str = "concept";

    fn id(&self) -> Uuid {
        self.id
    }
}

impl Resource for Concept {
    const RESOURCE_TYPE: &'static str = CONCEPT_TYPE;

    fn mnemonic(&self) -> &str {
        &self.mnemonic
    }

    fn is_active(&self) -> bool {
        self.is_active
    }

    fn set_active(&mut self, active: bool) {
        self.is_active = active;
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

impl SubResource for Concept {
    fn owner_id(&self) -> Option<Uuid> {
        self.owner_id
    }

    fn parent(&self) -> Option<ParentRef> {
        self.parent
    }

    fn bind(&mut self, owner_id: Uuid, parent: ParentRef) {
        self.owner_id = Some(owner_id);
        self.parent = Some(parent);
    }
}

impl Validate for Concept {
    fn validate(&self) -> ValidationErrors {
        let mut errors = ValidationErrors::new();
        check_mnemonic(&mut errors, "mnemonic", &self.mnemonic);
        check_required(&mut errors, "concept_class", &self.concept_class);
        if self.owner_id.is_none() {
            errors.add("owner", "This field cannot be null.");
        }
        match self.parent {
            None => errors.add("parent", "This field cannot be null."),
            Some(ParentRef::Source(_)) => {}
            Some(_) => errors.add("parent", "Concept parent must be a Source."),
        }
        validate_texts(&mut errors, "names", &self.names);
        validate_texts(&mut errors, "descriptions", &self.descriptions);
        errors
    }
}

impl Versioned for Concept {
    type Version = ConceptVersion;

    fn snapshot(&self, label: &str, previous: Option<&ConceptVersion>) -> ConceptVersion {
        ConceptVersion::for_concept(self, label, previous)
    }
}

/// Immutable snapshot of a concept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptVersion {
    pub id: Uuid,
    pub mnemonic: String,
    pub versioned_object_id: Uuid,
    pub released: bool,
    pub previous_version_id: Option<Uuid>,
    pub parent_version_id: Option<Uuid>,
    pub concept_class: String,
    pub datatype: Option<String>,
    #[serde(default)]
    pub names: Vec<LocalizedText>,
    #[serde(default)]
    pub descriptions: Vec<LocalizedText>,
    #[serde(default)]
    pub retired: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub extras: Extras,
}

impl ConceptVersion {
    /// Build an unsaved, unreleased version of `concept` from its current
    /// field values.
    pub fn for_concept(
        concept: &Concept,
        label: &str,
        previous: Option<&ConceptVersion>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: new_v7(),
            mnemonic: label.to_string(),
            versioned_object_id: concept.id,
            released: false,
            previous_version_id: previous.map(|v| v.id),
            parent_version_id: None,
            concept_class: concept.concept_class.clone(),
            datatype: concept.datatype.clone(),
            names: concept.names.clone(),
            descriptions: concept.descriptions.clone(),
            retired: concept.retired,
            is_active: true,
            created_at: now,
            updated_at: now,
            extras: Extras::new(),
        }
    }
}

impl HasNames for ConceptVersion {
    fn names(&self) -> &[LocalizedText] {
        &self.names
    }
}

impl Record for ConceptVersion {
    const COLLECTION: &'static str = "concept_version";

    fn id(&self) -> Uuid {
        self.id
    }
}

impl Resource for ConceptVersion {
    const RESOURCE_TYPE: &'static str = CONCEPT_VERSION_TYPE;

    fn mnemonic(&self) -> &str {
        &self.mnemonic
    }

    fn is_active(&self) -> bool {
        self.is_active
    }

    fn set_active(&mut self, active: bool) {
        self.is_active = active;
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

impl ResourceVersion for ConceptVersion {
    const CURRENT_REQUIRES_RELEASE: bool = false;
    const VERSIONED_COLLECTION: &'static str = Concept::COLLECTION;

    fn versioned_object_id(&self) -> Uuid {
        self.versioned_object_id
    }

    fn set_mnemonic(&mut self, mnemonic: String) {
        self.mnemonic = mnemonic;
    }

    fn released(&self) -> bool {
        self.released
    }

    fn set_released(&mut self, released: bool) {
        self.released = released;
    }

    fn previous_version_id(&self) -> Option<Uuid> {
        self.previous_version_id
    }

    fn set_previous_version_id(&mut self, id: Option<Uuid>) {
        self.previous_version_id = id;
    }

    fn parent_version_id(&self) -> Option<Uuid> {
        self.parent_version_id
    }

    fn set_parent_version_id(&mut self, id: Option<Uuid>) {
        self.parent_version_id = id;
    }

    fn clone_version(&self) -> Self {
        let now = Utc::now();
        Self {
            id: new_v7(),
            mnemonic: TEMP_VERSION_LABEL.to_string(),
            released: false,
            previous_version_id: Some(self.id),
            created_at: now,
            updated_at: now,
            ..self.clone()
        }
    }
}

impl Validate for ConceptVersion {
    fn validate(&self) -> ValidationErrors {
        let mut errors = ValidationErrors::new();
        check_mnemonic(&mut errors, "mnemonic", &self.mnemonic);
        check_required(&mut errors, "concept_class", &self.concept_class);
        validate_texts(&mut errors, "names", &self.names);
        validate_texts(&mut errors, "descriptions", &self.descriptions);
        check_self_links(&mut errors, self);
        errors
    }
}

fn validate_texts(errors: &mut ValidationErrors, field: &str, texts: &[LocalizedText]) {
    for text in texts {
        text.validate_into(errors, field);
    }
}

fn check_self_links<V: ResourceVersion>(errors: &mut ValidationErrors, version: &V) {
    if version.parent_version_id() == Some(version.id()) {
        errors.add(ALL_FIELDS, "version cannot be its own parent");
    }
    if version.previous_version_id() == Some(version.id()) {
        errors.add(ALL_FIELDS, "version cannot be its own previous version");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bound_concept() -> Concept {
        let mut concept = Concept::new("concept1", "First");
        concept.bind(new_v7(), ParentRef::Source(new_v7()));
        concept
    }

    #[test]
    fn test_parent_ref_serializes_with_kind_tag() {
        let id = Uuid::nil();
        let json = serde_json::to_value(ParentRef::UserProfile(id)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "kind": "user_profile", "id": id.to_string() })
        );
        assert_eq!(ParentRef::UserProfile(id).resource_type(), USER_TYPE);
        assert_eq!(ParentRef::UserProfile(id).to_json(), json);
    }

    #[test]
    fn test_source_type_round_trips_names() {
        assert_eq!(
            serde_json::to_value(SourceType::ExternalDictionary).unwrap(),
            serde_json::json!("externalDictionary")
        );
        assert_eq!(
            "reference".parse::<SourceType>().unwrap(),
            SourceType::Reference
        );
        assert!("bogus".parse::<SourceType>().is_err());
    }

    #[test]
    fn test_access_type_parse_is_case_insensitive() {
        assert_eq!("EDIT".parse::<AccessType>().unwrap(), AccessType::Edit);
        assert_eq!(AccessType::default(), AccessType::View);
    }

    #[test]
    fn test_concept_valid_when_bound() {
        assert!(bound_concept().validate().is_empty());
    }

    #[test]
    fn test_concept_requires_mnemonic() {
        let mut concept = bound_concept();
        concept.mnemonic.clear();
        assert!(concept.validate().contains("mnemonic"));
    }

    #[test]
    fn test_concept_requires_owner_and_parent() {
        let concept = Concept::new("concept1", "First");
        let errors = concept.validate();
        assert!(errors.contains("owner"));
        assert!(errors.contains("parent"));
    }

    #[test]
    fn test_concept_requires_class() {
        let mut concept = bound_concept();
        concept.concept_class.clear();
        assert!(concept.validate().contains("concept_class"));
    }

    #[test]
    fn test_concept_parent_must_be_source() {
        let mut concept = bound_concept();
        concept.parent = Some(ParentRef::Organization(new_v7()));
        assert!(concept.validate().contains("parent"));
    }

    #[test]
    fn test_source_parent_must_own_containers() {
        let mut source = Source::new("source1", "source1");
        source.bind(new_v7(), ParentRef::Source(new_v7()));
        assert!(source.validate().contains("parent"));

        source.parent = Some(ParentRef::Organization(new_v7()));
        assert!(source.validate().is_empty());
    }

    #[test]
    fn test_for_concept_copies_snapshot_fields() {
        let mut concept = bound_concept();
        concept.datatype = Some("Boolean".to_string());
        concept.names.push(LocalizedText::new("concept1", "en"));

        let version = ConceptVersion::for_concept(&concept, "version1", None);
        assert_eq!(version.mnemonic, "version1");
        assert_eq!(version.versioned_object_id, concept.id);
        assert_eq!(version.concept_class, concept.concept_class);
        assert_eq!(version.datatype, concept.datatype);
        assert_eq!(version.names, concept.names);
        assert_eq!(version.descriptions, concept.descriptions);
        assert_eq!(version.retired, concept.retired);
        assert!(!version.released);
    }

    #[test]
    fn test_version_cannot_be_its_own_parent() {
        let concept = bound_concept();
        let mut version = ConceptVersion::for_concept(&concept, "v1", None);
        version.parent_version_id = Some(version.id);
        assert!(version.validate().contains(ALL_FIELDS));
    }

    #[test]
    fn test_clone_version_links_previous() {
        let concept = bound_concept();
        let original = ConceptVersion::for_concept(&concept, "v1", None);
        let cloned = original.clone_version();

        assert_ne!(cloned.id, original.id);
        assert_eq!(cloned.previous_version_id, Some(original.id));
        assert_eq!(cloned.concept_class, original.concept_class);
        assert_eq!(cloned.versioned_object_id, original.versioned_object_id);
    }

    #[test]
    fn test_update_concept_version_replaces_in_place() {
        let source = Source::new("source1", "source1");
        let mut version = SourceVersion::for_base_object(&source, "v1", None, None, true);
        let (a, b, c) = (new_v7(), new_v7(), new_v7());
        version.concepts = vec![a, b];

        assert!(version.update_concept_version(c, Some(a)));
        assert_eq!(version.concepts, vec![c, b]);
    }

    #[test]
    fn test_update_concept_version_appends_new_members() {
        let source = Source::new("source1", "source1");
        let mut version = SourceVersion::for_base_object(&source, "v1", None, None, true);
        let (a, b) = (new_v7(), new_v7());
        version.concepts = vec![a];

        assert!(version.update_concept_version(b, None));
        assert!(version.update_concept_version(new_v7(), Some(new_v7())));
        assert_eq!(version.concepts.len(), 3);
        assert_eq!(version.concepts[1], b);
    }

    #[test]
    fn test_update_concept_version_ignores_existing_member() {
        let source = Source::new("source1", "source1");
        let mut version = SourceVersion::for_base_object(&source, "v1", None, None, true);
        let a = new_v7();
        version.concepts = vec![a];

        assert!(!version.update_concept_version(a, None));
        assert_eq!(version.concepts, vec![a]);
    }

    #[test]
    fn test_source_version_copies_source_metadata() {
        let mut source = Source::new("source1", "source1");
        source.full_name = Some("Source One".to_string());
        source.source_type = SourceType::Reference;
        source.supported_locales = vec!["fr".to_string()];

        let version = SourceVersion::for_base_object(&source, "INITIAL", None, None, true);
        assert_eq!(version.full_name.as_deref(), Some("Source One"));
        assert_eq!(version.source_type, SourceType::Reference);
        assert_eq!(version.supported_locales, vec!["fr".to_string()]);
        assert!(version.released);
        assert!(version.concepts.is_empty());
    }
}
