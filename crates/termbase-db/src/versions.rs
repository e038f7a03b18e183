//! Version-chain operations shared by source and concept versions.
//!
//! Writers call these with the chain lock (`versions:<collection>:<id>`)
//! already held; readers call them freely.

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use termbase_core::defaults::{INITIAL_VERSION_LABEL, TEMP_VERSION_LABEL};
use termbase_core::{
    Error, Filter, Record, ResourceVersion, Result, ValidationErrors, Versioned, NON_FIELD_ERRORS,
};

use crate::locks::{record_key, versions_key};
use crate::store::RecordStore;

/// Filter selecting every version of one object.
pub fn versions_filter(versioned_object_id: Uuid) -> Filter {
    Filter::all().eq_id("versioned_object_id", versioned_object_id)
}

/// Current version of an object: the newest released version for
/// containers, the newest active version otherwise.
pub async fn latest_version_of<V: ResourceVersion>(
    store: &RecordStore,
    versioned_object_id: Uuid,
) -> Result<Option<V>> {
    let filter = if V::CURRENT_REQUIRES_RELEASE {
        versions_filter(versioned_object_id).eq("released", true)
    } else {
        versions_filter(versioned_object_id).eq("is_active", true)
    };
    store.latest(&filter).await
}

/// Every version of an object, oldest first.
pub async fn list_versions<V: ResourceVersion>(
    store: &RecordStore,
    versioned_object_id: Uuid,
) -> Result<Vec<V>> {
    store.find(&versions_filter(versioned_object_id)).await
}

/// Count of version records for an object.
pub async fn num_versions<V: ResourceVersion>(
    store: &RecordStore,
    versioned_object_id: Uuid,
) -> Result<u64> {
    store.count::<V>(&versions_filter(versioned_object_id)).await
}

/// Version of an object with the given mnemonic.
pub async fn version_by_mnemonic<V: ResourceVersion>(
    store: &RecordStore,
    versioned_object_id: Uuid,
    mnemonic: &str,
) -> Result<Option<V>> {
    store
        .find_one(&versions_filter(versioned_object_id).eq("mnemonic", mnemonic))
        .await
}

/// Mnemonic of a linked version, if the link is set and resolves.
pub async fn linked_mnemonic<V: ResourceVersion>(
    store: &RecordStore,
    link: Option<Uuid>,
) -> Result<Option<String>> {
    match link {
        Some(id) => Ok(store
            .get::<V>(id)
            .await?
            .map(|v| v.mnemonic().to_string())),
        None => Ok(None),
    }
}

/// Versions a new version links to, loaded during validation.
#[derive(Debug)]
pub(crate) struct VersionLinks<V> {
    pub previous: Option<V>,
    pub parent: Option<V>,
}

/// Replace the `_TEMP` placeholder with the version's own id.
pub(crate) fn assign_generated_mnemonic<V: ResourceVersion>(version: &mut V) {
    if version.mnemonic() == TEMP_VERSION_LABEL {
        version.set_mnemonic(version.id().to_string());
    }
}

/// Validate a version about to be written and load the versions it links to.
///
/// `stored` is the persisted copy when the version already exists. Problems
/// are appended to `errors`; only storage failures are returned as `Err`.
pub(crate) async fn check_version<V: ResourceVersion>(
    store: &RecordStore,
    version: &V,
    stored: Option<&V>,
    errors: &mut ValidationErrors,
) -> Result<VersionLinks<V>> {
    errors.merge(version.validate());

    let object_id = version.versioned_object_id();
    if !store.exists(V::VERSIONED_COLLECTION, object_id).await? {
        errors.add(NON_FIELD_ERRORS, "Must specify a versioned object.");
    }

    let mnemonic_changed = stored.map_or(true, |s| s.mnemonic() != version.mnemonic());
    if mnemonic_changed && !version.mnemonic().is_empty() {
        let clash = version_by_mnemonic::<V>(store, object_id, version.mnemonic()).await?;
        if clash.map_or(false, |v| v.id() != version.id()) {
            errors.add(
                "mnemonic",
                format!(
                    "{} with mnemonic {} already exists for this object.",
                    V::RESOURCE_TYPE,
                    version.mnemonic()
                ),
            );
        }
    }

    let previous = load_link(
        store,
        version,
        version.previous_version_id(),
        "previousVersion",
        "Previous",
        errors,
    )
    .await?;
    let parent = load_link(
        store,
        version,
        version.parent_version_id(),
        "parentVersion",
        "Parent",
        errors,
    )
    .await?;

    Ok(VersionLinks { previous, parent })
}

async fn load_link<V: ResourceVersion>(
    store: &RecordStore,
    version: &V,
    link: Option<Uuid>,
    field: &str,
    label: &str,
    errors: &mut ValidationErrors,
) -> Result<Option<V>> {
    let Some(id) = link else {
        return Ok(None);
    };
    // Self links are reported by field validation.
    if id == version.id() {
        return Ok(None);
    }
    match store.get::<V>(id).await? {
        Some(linked) if linked.versioned_object_id() == version.versioned_object_id() => {
            Ok(Some(linked))
        }
        _ => {
            errors.add(field, format!("{} version {} does not exist.", label, id));
            Ok(None)
        }
    }
}

/// Save a version; when this write releases a new one, un-release the
/// object's previous release afterwards.
///
/// The new release is written before the old one is demoted, so readers
/// always find a released version. For an existing version the stored copy is
/// re-read under its record lock and handed to `keep_from_stored` so fields
/// maintained by other writers survive. If the demotion fails the new release
/// is undone: a new version is deleted, an edited one is un-released.
pub(crate) async fn write_version<V, F>(
    store: &RecordStore,
    version: &mut V,
    stored_released: Option<bool>,
    keep_from_stored: F,
) -> Result<()>
where
    V: ResourceVersion,
    F: FnOnce(&mut V, &V) + Send,
{
    let is_new = stored_released.is_none();
    let swap_needed =
        V::CURRENT_REQUIRES_RELEASE && version.released() && !stored_released.unwrap_or(false);

    let to_demote = if swap_needed {
        latest_version_of::<V>(store, version.versioned_object_id())
            .await?
            .map(|current| current.id())
            .filter(|id| *id != version.id())
    } else {
        None
    };

    if is_new {
        store.insert(&*version).await?;
    } else {
        let _record = store
            .locks()
            .lock(record_key(V::COLLECTION, version.id()))
            .await;
        let stored = store.require::<V>(version.id()).await?;
        keep_from_stored(version, &stored);
        version.touch();
        store.update(&*version).await?;
    }

    let Some(previous_id) = to_demote else {
        return Ok(());
    };
    debug!(
        subsystem = "db",
        component = "versions",
        op = "release_swap",
        resource_type = V::RESOURCE_TYPE,
        version_id = %previous_id,
        "Un-releasing previous version"
    );
    if let Err(e) = set_released::<V>(store, previous_id, false).await {
        let undone = if is_new {
            store.delete::<V>(version.id()).await.map(|_| ())
        } else {
            set_released::<V>(store, version.id(), false).await
        };
        match undone {
            Ok(()) => {
                if !is_new {
                    version.set_released(false);
                }
            }
            Err(undo_err) => error!(
                subsystem = "db",
                component = "versions",
                op = "release_swap",
                version_id = %version.id(),
                error = %undo_err,
                "Failed to undo release after demotion failure"
            ),
        }
        return Err(e);
    }
    Ok(())
}

async fn set_released<V: ResourceVersion>(store: &RecordStore, id: Uuid, released: bool) -> Result<()> {
    let _record = store.locks().lock(record_key(V::COLLECTION, id)).await;
    let mut stored = store.require::<V>(id).await?;
    stored.set_released(released);
    stored.touch();
    store.update(&stored).await
}

/// Persist a cloned version: same validation and linking as any new version,
/// `_TEMP` mnemonics replaced by the version id. Container indexes are left
/// to the caller.
pub async fn persist_clone<V: ResourceVersion>(
    store: &RecordStore,
    version: &mut V,
) -> ValidationErrors {
    let _chain = store
        .locks()
        .lock(versions_key(V::COLLECTION, version.versioned_object_id()))
        .await;

    assign_generated_mnemonic(version);
    let mut errors = ValidationErrors::new();
    if let Err(e) = check_version(store, version, None, &mut errors).await {
        errors.add(NON_FIELD_ERRORS, e.to_string());
    }
    if !errors.is_empty() {
        warn!(
            subsystem = "db",
            component = "versions",
            op = "persist_clone",
            resource_type = V::RESOURCE_TYPE,
            error = %errors,
            "Rejected version clone"
        );
        return errors;
    }

    if let Err(e) = write_version(store, version, None, |_, _| {}).await {
        warn!(
            subsystem = "db",
            component = "versions",
            op = "persist_clone",
            resource_type = V::RESOURCE_TYPE,
            error = %e,
            "Failed to persist version clone"
        );
        errors.add(
            NON_FIELD_ERRORS,
            format!("An error occurred while trying to persist new {}.", V::RESOURCE_TYPE),
        );
        return errors;
    }

    info!(
        subsystem = "db",
        component = "versions",
        op = "persist_clone",
        resource_type = V::RESOURCE_TYPE,
        version_id = %version.id(),
        previous_version_id = ?version.previous_version_id(),
        "Persisted version clone"
    );
    errors
}

/// Save a new resource with its released initial version, whose mnemonic is
/// its own id. If the version cannot be saved both writes are undone.
pub(crate) async fn insert_with_initial_version<R: Versioned>(
    store: &RecordStore,
    resource: &R,
) -> Result<R::Version> {
    store.insert(resource).await?;

    let mut version = resource.snapshot(INITIAL_VERSION_LABEL, None);
    version.set_released(true);
    version.set_mnemonic(version.id().to_string());

    if let Err(e) = store.insert(&version).await {
        rollback_creation::<R>(store, resource.id(), Some(version.id())).await;
        return Err(e);
    }
    Ok(version)
}

/// Compensating deletes for a failed create. Failures here are logged, not
/// returned: the caller is already reporting the original error.
pub(crate) async fn rollback_creation<R: Versioned>(
    store: &RecordStore,
    resource_id: Uuid,
    version_id: Option<Uuid>,
) {
    if let Some(version_id) = version_id {
        if let Err(e) = store.delete::<R::Version>(version_id).await {
            error!(
                subsystem = "db",
                component = "versions",
                op = "rollback",
                resource_type = R::RESOURCE_TYPE,
                version_id = %version_id,
                error = %e,
                "Failed to delete version during rollback"
            );
        }
    }
    if let Err(e) = store.delete::<R>(resource_id).await {
        error!(
            subsystem = "db",
            component = "versions",
            op = "rollback",
            resource_type = R::RESOURCE_TYPE,
            resource_id = %resource_id,
            error = %e,
            "Failed to delete resource during rollback"
        );
    }
    warn!(
        subsystem = "db",
        component = "versions",
        op = "rollback",
        resource_type = R::RESOURCE_TYPE,
        resource_id = %resource_id,
        "Rolled back resource creation"
    );
}

/// Map a protocol-step failure to the generic persist error.
pub(crate) fn persist_failure(resource_type: &str, e: &Error) -> ValidationErrors {
    warn!(
        subsystem = "db",
        op = "persist_new",
        resource_type,
        error = %e,
        "Persist failed"
    );
    ValidationErrors::single(
        NON_FIELD_ERRORS,
        format!("An error occurred while trying to persist new {}.", resource_type),
    )
}
