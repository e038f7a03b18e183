//! Concepts and concept versions.
//!
//! Creating or retiring a concept writes a new concept version and records
//! it in the containing source's member index.

use std::time::Instant;

use tracing::{error, info, warn};
use uuid::Uuid;

use termbase_core::defaults::TEMP_VERSION_LABEL;
use termbase_core::{
    Concept, ConceptVersion, Filter, ParentRef, Record, Resource, Result, Source, SourceVersion,
    SubResource, User, Validate, ValidationErrors, Versioned, ALL_FIELDS, CONCEPT_TYPE,
    NON_FIELD_ERRORS,
};

use crate::locks::{scope_key, versions_key};
use crate::resources::{
    parent_exists, parent_mnemonic, sibling_mnemonic_taken, soft_delete, source_url, undelete,
};
use crate::sources::SourceVersionRepository;
use crate::store::RecordStore;
use crate::versions::{
    assign_generated_mnemonic, insert_with_initial_version, latest_version_of, linked_mnemonic,
    list_versions, num_versions, persist_clone, persist_failure, rollback_creation,
};

/// Repository for concepts.
#[derive(Clone)]
pub struct ConceptRepository {
    store: RecordStore,
    source_versions: SourceVersionRepository,
}

impl ConceptRepository {
    pub fn new(store: RecordStore) -> Self {
        Self {
            source_versions: SourceVersionRepository::new(store.clone()),
            store,
        }
    }

    /// Create a concept inside `parent` with its released initial version.
    ///
    /// The version is added to `parent_version`'s member index when given,
    /// otherwise to the source's current released version.
    pub async fn persist_new(
        &self,
        concept: &mut Concept,
        owner: Option<&User>,
        parent: Option<&Source>,
        parent_version: Option<&SourceVersion>,
    ) -> ValidationErrors {
        let start = Instant::now();
        let mut errors = ValidationErrors::new();
        if parent.is_none() {
            errors.add("parent", "Concept parent cannot be None.");
        }
        if owner.is_none() {
            errors.add("owner", "Concept owner cannot be None.");
        }
        let (Some(owner), Some(parent)) = (owner, parent) else {
            warn!(
                subsystem = "db",
                component = "concepts",
                op = "persist_new",
                error = %errors,
                "Rejected concept without owner or parent"
            );
            return errors;
        };

        concept.bind(owner.id, ParentRef::Source(parent.id));
        errors.merge(concept.validate());
        if let Some(container) = parent_version {
            if container.versioned_object_id != parent.id {
                errors.add(
                    "parent_resource_version",
                    "Source version does not belong to the parent source.",
                );
            }
        }
        if !errors.is_empty() {
            return errors;
        }
        match parent_exists(&self.store, &ParentRef::Source(parent.id)).await {
            Ok(true) => {}
            Ok(false) => {
                errors.add("parent", "Parent resource does not exist.");
                return errors;
            }
            Err(e) => return persist_failure(CONCEPT_TYPE, &e),
        }

        let _scope = self
            .store
            .locks()
            .lock(scope_key(Concept::COLLECTION, concept.parent.as_ref()))
            .await;
        match sibling_mnemonic_taken(&self.store, &*concept).await {
            Ok(false) => {}
            Ok(true) => {
                errors.add(ALL_FIELDS, "Concept with this Mnemonic and Parent already exists.");
                return errors;
            }
            Err(e) => return persist_failure(CONCEPT_TYPE, &e),
        }

        let version = match insert_with_initial_version(&self.store, &*concept).await {
            Ok(version) => version,
            Err(e) => return persist_failure(CONCEPT_TYPE, &e),
        };

        let indexed = match parent_version {
            Some(container) => self
                .source_versions
                .update_concept_version(container.id, &version)
                .await
                .map(|_| Some(container.id)),
            None => {
                self.source_versions
                    .update_current_concept_version(parent.id, &version)
                    .await
            }
        };
        let container_version_id = match indexed {
            Ok(id) => id,
            Err(e) => {
                rollback_creation::<Concept>(&self.store, concept.id, Some(version.id)).await;
                return persist_failure(CONCEPT_TYPE, &e);
            }
        };

        info!(
            subsystem = "db",
            component = "concepts",
            op = "persist_new",
            resource_id = %concept.id,
            version_id = %version.id,
            container_version_id = ?container_version_id,
            mnemonic = %concept.mnemonic,
            duration_ms = start.elapsed().as_millis() as u64,
            "Created concept"
        );
        errors
    }

    /// Save field edits to an existing concept. No version is created.
    pub async fn persist_changes(&self, concept: &mut Concept) -> ValidationErrors {
        let mut errors = concept.validate();
        if !errors.is_empty() {
            return errors;
        }
        let _scope = self
            .store
            .locks()
            .lock(scope_key(Concept::COLLECTION, concept.parent.as_ref()))
            .await;
        match sibling_mnemonic_taken(&self.store, &*concept).await {
            Ok(false) => {}
            Ok(true) => {
                errors.add(ALL_FIELDS, "Concept with this Mnemonic and Parent already exists.");
                return errors;
            }
            Err(e) => {
                errors.add(NON_FIELD_ERRORS, e.to_string());
                return errors;
            }
        }

        concept.touch();
        if let Err(e) = self.store.update(&*concept).await {
            errors.add(NON_FIELD_ERRORS, e.to_string());
        }
        errors
    }

    /// Retire a concept: mark its stored record retired and write a released
    /// retirement version that replaces its predecessor in the source's
    /// current member index. Returns `Ok(false)` if the concept was already
    /// retired.
    ///
    /// Unsaved edits on `concept` are not written; only its `retired` flag and
    /// timestamp are refreshed from the stored record.
    pub async fn retire(&self, concept: &mut Concept) -> Result<bool> {
        let _chain = self
            .store
            .locks()
            .lock(versions_key(ConceptVersion::COLLECTION, concept.id))
            .await;

        let mut stored = self.store.require::<Concept>(concept.id).await?;
        if stored.retired {
            concept.retired = true;
            return Ok(false);
        }
        let previous = latest_version_of::<ConceptVersion>(&self.store, stored.id).await?;

        stored.retired = true;
        stored.touch();
        self.store.update(&stored).await?;

        let mut version = stored.snapshot(TEMP_VERSION_LABEL, previous.as_ref());
        version.released = true;
        assign_generated_mnemonic(&mut version);
        if let Err(e) = self.store.insert(&version).await {
            self.restore_unretired(&mut stored).await;
            return Err(e);
        }

        if let Some(source_id) = stored.source_id() {
            if let Err(e) = self
                .source_versions
                .update_current_concept_version(source_id, &version)
                .await
            {
                if let Err(cleanup) = self.store.delete::<ConceptVersion>(version.id).await {
                    error!(
                        subsystem = "db",
                        component = "concepts",
                        op = "retire",
                        version_id = %version.id,
                        error = %cleanup,
                        "Failed to delete retirement version"
                    );
                }
                self.restore_unretired(&mut stored).await;
                return Err(e);
            }
        }

        concept.retired = true;
        concept.updated_at = stored.updated_at;
        info!(
            subsystem = "db",
            component = "concepts",
            op = "retire",
            resource_id = %stored.id,
            version_id = %version.id,
            "Retired concept"
        );
        Ok(true)
    }

    async fn restore_unretired(&self, stored: &mut Concept) {
        stored.retired = false;
        if let Err(e) = self.store.update(&*stored).await {
            error!(
                subsystem = "db",
                component = "concepts",
                op = "retire",
                resource_id = %stored.id,
                error = %e,
                "Failed to restore concept after retire failure"
            );
        }
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Concept>> {
        self.store.get(id).await
    }

    /// Active concept with the given mnemonic in a source.
    pub async fn get_by_mnemonic(&self, source_id: Uuid, mnemonic: &str) -> Result<Option<Concept>> {
        self.store
            .find_one(
                &Filter::all()
                    .eq_parent("parent", &ParentRef::Source(source_id))
                    .eq("mnemonic", mnemonic)
                    .eq("is_active", true),
            )
            .await
    }

    pub async fn list_for_source(&self, source_id: Uuid) -> Result<Vec<Concept>> {
        self.store
            .find(&Filter::all().eq_parent("parent", &ParentRef::Source(source_id)))
            .await
    }

    pub async fn soft_delete(&self, concept: &mut Concept) -> Result<bool> {
        soft_delete(&self.store, concept).await
    }

    pub async fn undelete(&self, concept: &mut Concept) -> Result<bool> {
        undelete(&self.store, concept).await
    }

    /// Newest active version of the concept.
    pub async fn latest_version(&self, concept: &Concept) -> Result<Option<ConceptVersion>> {
        latest_version_of(&self.store, concept.id).await
    }

    pub async fn num_versions(&self, concept: &Concept) -> Result<u64> {
        num_versions::<ConceptVersion>(&self.store, concept.id).await
    }

    async fn source_of(&self, concept: &Concept) -> Result<Option<Source>> {
        match concept.source_id() {
            Some(id) => self.store.get(id).await,
            None => Ok(None),
        }
    }

    /// Mnemonic of the containing source.
    pub async fn parent_resource(&self, concept: &Concept) -> Result<Option<String>> {
        Ok(self.source_of(concept).await?.map(|s| s.mnemonic))
    }

    /// Mnemonic of the organization or user profile owning the source.
    pub async fn owner_name(&self, concept: &Concept) -> Result<Option<String>> {
        match self.source_of(concept).await?.and_then(|s| s.parent) {
            Some(parent) => parent_mnemonic(&self.store, &parent).await,
            None => Ok(None),
        }
    }

    /// Type label of the source's owner.
    pub async fn owner_type(&self, concept: &Concept) -> Result<Option<&'static str>> {
        Ok(self
            .source_of(concept)
            .await?
            .and_then(|s| s.parent)
            .map(|p| p.resource_type()))
    }

    pub async fn url(&self, concept: &Concept) -> Result<Option<String>> {
        let Some(source) = self.source_of(concept).await? else {
            return Ok(None);
        };
        Ok(source_url(&self.store, &source)
            .await?
            .map(|base| format!("{}concepts/{}/", base, concept.mnemonic)))
    }
}

/// Repository for concept versions.
#[derive(Clone)]
pub struct ConceptVersionRepository {
    store: RecordStore,
    concepts: ConceptRepository,
}

impl ConceptVersionRepository {
    pub fn new(store: RecordStore) -> Self {
        Self {
            concepts: ConceptRepository::new(store.clone()),
            store,
        }
    }

    /// Save a hand-built version after field and link validation.
    pub async fn persist_new(&self, version: &mut ConceptVersion) -> ValidationErrors {
        persist_clone(&self.store, version).await
    }

    /// Persist a version produced by `clone_version`. It becomes the
    /// concept's latest version; source member indexes are left to the
    /// caller.
    pub async fn persist_clone(&self, version: &mut ConceptVersion) -> ValidationErrors {
        persist_clone(&self.store, version).await
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<ConceptVersion>> {
        self.store.get(id).await
    }

    pub async fn list(&self, concept_id: Uuid) -> Result<Vec<ConceptVersion>> {
        list_versions(&self.store, concept_id).await
    }

    pub async fn latest(&self, concept_id: Uuid) -> Result<Option<ConceptVersion>> {
        latest_version_of(&self.store, concept_id).await
    }

    pub async fn num_versions(&self, concept_id: Uuid) -> Result<u64> {
        num_versions::<ConceptVersion>(&self.store, concept_id).await
    }

    pub async fn soft_delete(&self, version: &mut ConceptVersion) -> Result<bool> {
        soft_delete(&self.store, version).await
    }

    async fn concept_of(&self, version: &ConceptVersion) -> Result<Option<Concept>> {
        self.store.get(version.versioned_object_id).await
    }

    /// Name of a version: its concept's mnemonic.
    pub async fn name(&self, version: &ConceptVersion) -> Result<Option<String>> {
        Ok(self.concept_of(version).await?.map(|c| c.mnemonic))
    }

    pub async fn owner_name(&self, version: &ConceptVersion) -> Result<Option<String>> {
        match self.concept_of(version).await? {
            Some(concept) => self.concepts.owner_name(&concept).await,
            None => Ok(None),
        }
    }

    pub async fn owner_type(&self, version: &ConceptVersion) -> Result<Option<&'static str>> {
        match self.concept_of(version).await? {
            Some(concept) => self.concepts.owner_type(&concept).await,
            None => Ok(None),
        }
    }

    pub async fn previous_version_mnemonic(&self, version: &ConceptVersion) -> Result<Option<String>> {
        linked_mnemonic::<ConceptVersion>(&self.store, version.previous_version_id).await
    }

    pub async fn parent_version_mnemonic(&self, version: &ConceptVersion) -> Result<Option<String>> {
        linked_mnemonic::<ConceptVersion>(&self.store, version.parent_version_id).await
    }

    pub async fn url(&self, version: &ConceptVersion) -> Result<Option<String>> {
        let Some(concept) = self.concept_of(version).await? else {
            return Ok(None);
        };
        Ok(self
            .concepts
            .url(&concept)
            .await?
            .map(|base| format!("{}{}/", base, version.mnemonic)))
    }
}
