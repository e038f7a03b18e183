//! Sources and source versions.
//!
//! A source is a concept container. Its current version is the newest
//! *released* source version, and each source version keeps a member index
//! of the concept-version ids it holds.

use std::time::Instant;

use tracing::{debug, info, warn};
use uuid::Uuid;

use termbase_core::{
    ConceptVersion, Filter, ParentRef, Record, Resource, Result, Source, SourceVersion,
    SubResource, User, Validate, ValidationErrors, ALL_FIELDS, NON_FIELD_ERRORS, SOURCE_TYPE,
    SOURCE_VERSION_TYPE,
};

use crate::locks::{record_key, scope_key, versions_key};
use crate::resources::{
    owner_url, parent_exists, parent_mnemonic, sibling_mnemonic_taken, soft_delete, source_url,
    undelete,
};
use crate::store::RecordStore;
use crate::versions::{
    assign_generated_mnemonic, check_version, insert_with_initial_version, latest_version_of,
    linked_mnemonic, list_versions, num_versions, persist_clone, persist_failure,
    version_by_mnemonic, write_version, VersionLinks,
};

/// Repository for sources.
#[derive(Clone)]
pub struct SourceRepository {
    store: RecordStore,
}

impl SourceRepository {
    pub fn new(store: RecordStore) -> Self {
        Self { store }
    }

    /// Create a source under an organization or user profile, together with
    /// its released initial version.
    pub async fn persist_new(
        &self,
        source: &mut Source,
        owner: Option<&User>,
        parent: Option<ParentRef>,
    ) -> ValidationErrors {
        let start = Instant::now();
        let mut errors = ValidationErrors::new();
        if parent.is_none() {
            errors.add("parent", "Source parent cannot be None.");
        }
        if owner.is_none() {
            errors.add("owner", "Source owner cannot be None.");
        }
        let (Some(owner), Some(parent)) = (owner, parent) else {
            warn!(
                subsystem = "db",
                component = "sources",
                op = "persist_new",
                error = %errors,
                "Rejected source without owner or parent"
            );
            return errors;
        };

        source.bind(owner.id, parent);
        errors.merge(source.validate());
        if !errors.is_empty() {
            return errors;
        }
        match parent_exists(&self.store, &parent).await {
            Ok(true) => {}
            Ok(false) => {
                errors.add("parent", "Parent resource does not exist.");
                return errors;
            }
            Err(e) => return persist_failure(SOURCE_TYPE, &e),
        }

        let _scope = self
            .store
            .locks()
            .lock(scope_key(Source::COLLECTION, Some(&parent)))
            .await;
        match sibling_mnemonic_taken(&self.store, &*source).await {
            Ok(false) => {}
            Ok(true) => {
                errors.add(ALL_FIELDS, "Source with this Mnemonic and Parent already exists.");
                return errors;
            }
            Err(e) => return persist_failure(SOURCE_TYPE, &e),
        }

        match insert_with_initial_version(&self.store, &*source).await {
            Ok(version) => {
                info!(
                    subsystem = "db",
                    component = "sources",
                    op = "persist_new",
                    resource_id = %source.id,
                    version_id = %version.id,
                    mnemonic = %source.mnemonic,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Created source"
                );
                errors
            }
            Err(e) => persist_failure(SOURCE_TYPE, &e),
        }
    }

    /// Save field edits to an existing source. No version is created.
    pub async fn persist_changes(&self, source: &mut Source) -> ValidationErrors {
        let mut errors = source.validate();
        if !errors.is_empty() {
            return errors;
        }
        let _scope = self
            .store
            .locks()
            .lock(scope_key(Source::COLLECTION, source.parent.as_ref()))
            .await;
        match sibling_mnemonic_taken(&self.store, &*source).await {
            Ok(false) => {}
            Ok(true) => {
                errors.add(ALL_FIELDS, "Source with this Mnemonic and Parent already exists.");
                return errors;
            }
            Err(e) => {
                errors.add(NON_FIELD_ERRORS, e.to_string());
                return errors;
            }
        }

        source.touch();
        if let Err(e) = self.store.update(&*source).await {
            errors.add(NON_FIELD_ERRORS, e.to_string());
        }
        errors
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Source>> {
        self.store.get(id).await
    }

    /// Active source with the given mnemonic under `parent`.
    pub async fn get_by_mnemonic(&self, parent: &ParentRef, mnemonic: &str) -> Result<Option<Source>> {
        self.store
            .find_one(
                &Filter::all()
                    .eq_parent("parent", parent)
                    .eq("mnemonic", mnemonic)
                    .eq("is_active", true),
            )
            .await
    }

    pub async fn list_for_parent(&self, parent: &ParentRef) -> Result<Vec<Source>> {
        self.store
            .find(&Filter::all().eq_parent("parent", parent))
            .await
    }

    pub async fn soft_delete(&self, source: &mut Source) -> Result<bool> {
        soft_delete(&self.store, source).await
    }

    pub async fn undelete(&self, source: &mut Source) -> Result<bool> {
        undelete(&self.store, source).await
    }

    /// Mnemonic of the owning organization or user profile.
    pub async fn parent_resource(&self, source: &Source) -> Result<Option<String>> {
        match source.parent {
            Some(parent) => parent_mnemonic(&self.store, &parent).await,
            None => Ok(None),
        }
    }

    pub fn parent_resource_type(&self, source: &Source) -> Option<&'static str> {
        source.parent.map(|p| p.resource_type())
    }

    pub async fn owner_url(&self, source: &Source) -> Result<Option<String>> {
        match source.parent {
            Some(parent) => owner_url(&self.store, &parent).await,
            None => Ok(None),
        }
    }

    pub async fn url(&self, source: &Source) -> Result<Option<String>> {
        source_url(&self.store, source).await
    }

    pub async fn num_versions(&self, source: &Source) -> Result<u64> {
        num_versions::<SourceVersion>(&self.store, source.id).await
    }

    /// Newest released version of the source.
    pub async fn latest_version(&self, source: &Source) -> Result<Option<SourceVersion>> {
        latest_version_of(&self.store, source.id).await
    }
}

/// Edits applied by [`SourceVersionRepository::persist_changes`].
#[derive(Debug, Clone, Default)]
pub struct VersionChanges {
    /// New mnemonic for the version.
    pub mnemonic: Option<String>,
    /// Link the version to the sibling version with this mnemonic.
    pub previous_version_mnemonic: Option<String>,
    /// Branch the version from the sibling version with this mnemonic.
    pub parent_version_mnemonic: Option<String>,
    /// Copy the member index from the previous (else parent) version.
    pub seed_concepts: bool,
}

/// Copy the member index from `previous` if given, else from `parent`,
/// else leave it empty.
pub fn seed_concepts(
    version: &mut SourceVersion,
    previous: Option<&SourceVersion>,
    parent: Option<&SourceVersion>,
) {
    let seed = previous.or(parent);
    debug!(
        subsystem = "db",
        component = "sources",
        op = "seed_concepts",
        version_id = %version.id,
        seed_version_id = ?seed.map(|v| v.id),
        member_count = seed.map_or(0, |v| v.concepts.len()),
        "Seeding member index"
    );
    version.concepts = seed.map(|v| v.concepts.clone()).unwrap_or_default();
}

/// Repository for source versions and their member indexes.
#[derive(Clone)]
pub struct SourceVersionRepository {
    store: RecordStore,
}

impl SourceVersionRepository {
    pub fn new(store: RecordStore) -> Self {
        Self { store }
    }

    /// Create a released version, seeded from its previous or parent version.
    /// The source's former release loses its `released` flag.
    pub async fn persist_new(
        &self,
        version: &mut SourceVersion,
        mut changes: VersionChanges,
    ) -> ValidationErrors {
        version.released = true;
        changes.seed_concepts = true;
        self.save(version, changes, true).await
    }

    /// Apply edits to a version (or create it if unsaved), resolving
    /// previous/parent links by mnemonic.
    pub async fn persist_changes(
        &self,
        version: &mut SourceVersion,
        changes: VersionChanges,
    ) -> ValidationErrors {
        self.save(version, changes, false).await
    }

    /// Persist a version produced by `clone_version`, keeping the copied
    /// member index.
    pub async fn persist_clone(&self, version: &mut SourceVersion) -> ValidationErrors {
        persist_clone(&self.store, version).await
    }

    async fn save(
        &self,
        version: &mut SourceVersion,
        changes: VersionChanges,
        expect_new: bool,
    ) -> ValidationErrors {
        let start = Instant::now();
        let source_id = version.versioned_object_id;
        let _chain = self
            .store
            .locks()
            .lock(versions_key(SourceVersion::COLLECTION, source_id))
            .await;

        let mut errors = ValidationErrors::new();
        let stored = match self.store.get::<SourceVersion>(version.id).await {
            Ok(stored) => stored,
            Err(e) => {
                errors.add(NON_FIELD_ERRORS, e.to_string());
                return errors;
            }
        };
        if expect_new && stored.is_some() {
            errors.add(ALL_FIELDS, "Source Version already exists.");
            return errors;
        }

        if let Some(mnemonic) = &changes.mnemonic {
            version.mnemonic = mnemonic.clone();
        }
        assign_generated_mnemonic(version);

        let links = match self
            .resolve_links(version, &changes, stored.as_ref(), &mut errors)
            .await
        {
            Ok(links) => links,
            Err(e) => {
                errors.add(NON_FIELD_ERRORS, e.to_string());
                return errors;
            }
        };
        if !errors.is_empty() {
            warn!(
                subsystem = "db",
                component = "sources",
                op = "persist_changes",
                version_id = %version.id,
                error = %errors,
                "Rejected source version"
            );
            return errors;
        }

        let seeded = changes.seed_concepts;
        if seeded {
            seed_concepts(version, links.previous.as_ref(), links.parent.as_ref());
        }

        let stored_released = stored.as_ref().map(|s| s.released);
        let written = write_version(&self.store, version, stored_released, move |v, s| {
            if !seeded {
                v.concepts = s.concepts.clone();
            }
        })
        .await;
        if let Err(e) = written {
            warn!(
                subsystem = "db",
                component = "sources",
                op = "persist_changes",
                version_id = %version.id,
                error = %e,
                "Failed to save source version"
            );
            errors.add(NON_FIELD_ERRORS, "Encountered an error while updating version.");
            return errors;
        }

        info!(
            subsystem = "db",
            component = "sources",
            op = if stored_released.is_none() { "persist_new" } else { "persist_changes" },
            resource_type = SOURCE_VERSION_TYPE,
            resource_id = %source_id,
            version_id = %version.id,
            mnemonic = %version.mnemonic,
            released = version.released,
            member_count = version.concepts.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Saved source version"
        );
        errors
    }

    /// Resolve mnemonic references into links, then run the shared version
    /// checks.
    async fn resolve_links(
        &self,
        version: &mut SourceVersion,
        changes: &VersionChanges,
        stored: Option<&SourceVersion>,
        errors: &mut ValidationErrors,
    ) -> Result<VersionLinks<SourceVersion>> {
        if let Some(m) = &changes.previous_version_mnemonic {
            if let Some(id) = self
                .resolve_link(version, m, "previousVersion", "Previous", errors)
                .await?
            {
                version.previous_version_id = Some(id);
            }
        }
        if let Some(m) = &changes.parent_version_mnemonic {
            if let Some(id) = self
                .resolve_link(version, m, "parentVersion", "Parent", errors)
                .await?
            {
                version.parent_version_id = Some(id);
            }
        }
        check_version(&self.store, &*version, stored, errors).await
    }

    async fn resolve_link(
        &self,
        version: &SourceVersion,
        mnemonic: &str,
        field: &str,
        label: &str,
        errors: &mut ValidationErrors,
    ) -> Result<Option<Uuid>> {
        let found = version_by_mnemonic::<SourceVersion>(
            &self.store,
            version.versioned_object_id,
            mnemonic,
        )
        .await?;
        match found {
            None => {
                errors.add(field, format!("{} version {} does not exist.", label, mnemonic));
                Ok(None)
            }
            Some(linked) if linked.id == version.id => {
                errors.add(
                    field,
                    format!("{} version cannot be the same as current version.", label),
                );
                Ok(None)
            }
            Some(linked) => Ok(Some(linked.id)),
        }
    }

    /// Add a concept version to a source version's member index, replacing
    /// its previous version in place when present. Returns whether the index
    /// changed.
    pub async fn update_concept_version(
        &self,
        container_version_id: Uuid,
        concept_version: &ConceptVersion,
    ) -> Result<bool> {
        let _record = self
            .store
            .locks()
            .lock(record_key(SourceVersion::COLLECTION, container_version_id))
            .await;
        let mut container = self
            .store
            .require::<SourceVersion>(container_version_id)
            .await?;

        let replacing = concept_version
            .previous_version_id
            .map_or(false, |prev| container.concepts.contains(&prev));
        let changed =
            container.update_concept_version(concept_version.id, concept_version.previous_version_id);
        if changed {
            container.touch();
            self.store.update(&container).await?;
        }

        debug!(
            subsystem = "db",
            component = "sources",
            op = "update_concept_version",
            container_version_id = %container_version_id,
            version_id = %concept_version.id,
            replaced = replacing,
            changed,
            member_count = container.concepts.len(),
            "Updated member index"
        );
        Ok(changed)
    }

    /// Propagate a concept version into the source's current released
    /// version. Returns the updated container version id, or `None` when
    /// the source has no released version.
    pub async fn update_current_concept_version(
        &self,
        source_id: Uuid,
        concept_version: &ConceptVersion,
    ) -> Result<Option<Uuid>> {
        // Held so a concurrent release swap cannot hide the current version.
        let _chain = self
            .store
            .locks()
            .lock(versions_key(SourceVersion::COLLECTION, source_id))
            .await;
        let Some(current) = latest_version_of::<SourceVersion>(&self.store, source_id).await? else {
            info!(
                subsystem = "db",
                component = "sources",
                op = "update_concept_version",
                resource_id = %source_id,
                version_id = %concept_version.id,
                "Source has no released version; member index not updated"
            );
            return Ok(None);
        };
        self.update_concept_version(current.id, concept_version).await?;
        Ok(Some(current.id))
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<SourceVersion>> {
        self.store.get(id).await
    }

    pub async fn get_by_mnemonic(&self, source_id: Uuid, mnemonic: &str) -> Result<Option<SourceVersion>> {
        version_by_mnemonic(&self.store, source_id, mnemonic).await
    }

    /// All versions of a source, oldest first.
    pub async fn list(&self, source_id: Uuid) -> Result<Vec<SourceVersion>> {
        list_versions(&self.store, source_id).await
    }

    /// Newest released version of a source.
    pub async fn latest(&self, source_id: Uuid) -> Result<Option<SourceVersion>> {
        latest_version_of(&self.store, source_id).await
    }

    pub async fn soft_delete(&self, version: &mut SourceVersion) -> Result<bool> {
        soft_delete(&self.store, version).await
    }

    pub async fn previous_version_mnemonic(&self, version: &SourceVersion) -> Result<Option<String>> {
        linked_mnemonic::<SourceVersion>(&self.store, version.previous_version_id).await
    }

    pub async fn parent_version_mnemonic(&self, version: &SourceVersion) -> Result<Option<String>> {
        linked_mnemonic::<SourceVersion>(&self.store, version.parent_version_id).await
    }

    /// URL of a version, under its source's URL.
    pub async fn url(&self, version: &SourceVersion) -> Result<Option<String>> {
        let Some(source) = self.store.get::<Source>(version.versioned_object_id).await? else {
            return Ok(None);
        };
        Ok(source_url(&self.store, &source)
            .await?
            .map(|base| format!("{}{}/", base, version.mnemonic)))
    }
}
