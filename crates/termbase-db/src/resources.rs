//! Helpers shared by every resource repository: soft delete, mnemonic
//! uniqueness scopes, and parent resolution.

use tracing::info;

use termbase_core::{
    Filter, Organization, ParentRef, Record, Resource, Result, Source, SubResource, UserProfile,
};

use crate::store::RecordStore;

/// Mark a resource inactive. Returns `false` if it already was.
pub async fn soft_delete<R: Resource>(store: &RecordStore, resource: &mut R) -> Result<bool> {
    set_active(store, resource, false).await
}

/// Reactivate a soft-deleted resource. Returns `false` if it was active.
pub async fn undelete<R: Resource>(store: &RecordStore, resource: &mut R) -> Result<bool> {
    set_active(store, resource, true).await
}

async fn set_active<R: Resource>(store: &RecordStore, resource: &mut R, active: bool) -> Result<bool> {
    if resource.is_active() == active {
        return Ok(false);
    }
    resource.set_active(active);
    resource.touch();
    if let Err(e) = store.update(&*resource).await {
        resource.set_active(!active);
        return Err(e);
    }
    info!(
        subsystem = "db",
        component = "resources",
        op = if active { "undelete" } else { "soft_delete" },
        resource_type = R::RESOURCE_TYPE,
        resource_id = %resource.id(),
        "Resource active flag changed"
    );
    Ok(true)
}

/// Whether another active resource of this type already uses the mnemonic.
pub(crate) async fn global_mnemonic_taken<R: Resource>(store: &RecordStore, resource: &R) -> Result<bool> {
    let filter = Filter::all()
        .eq("mnemonic", resource.mnemonic())
        .eq("is_active", true);
    Ok(store
        .find::<R>(&filter)
        .await?
        .iter()
        .any(|other| other.id() != resource.id()))
}

/// Whether an active sibling under the same parent already uses the mnemonic.
pub(crate) async fn sibling_mnemonic_taken<R: SubResource>(
    store: &RecordStore,
    resource: &R,
) -> Result<bool> {
    let Some(parent) = resource.parent() else {
        return Ok(false);
    };
    let filter = Filter::all()
        .eq_parent("parent", &parent)
        .eq("mnemonic", resource.mnemonic())
        .eq("is_active", true);
    Ok(store
        .find::<R>(&filter)
        .await?
        .iter()
        .any(|other| other.id() != resource.id()))
}

/// Whether the referenced parent exists.
pub async fn parent_exists(store: &RecordStore, parent: &ParentRef) -> Result<bool> {
    let collection = match parent {
        ParentRef::Organization(_) => Organization::COLLECTION,
        ParentRef::UserProfile(_) => UserProfile::COLLECTION,
        ParentRef::Source(_) => Source::COLLECTION,
    };
    store.exists(collection, parent.id()).await
}

/// Mnemonic of the referenced parent.
pub async fn parent_mnemonic(store: &RecordStore, parent: &ParentRef) -> Result<Option<String>> {
    Ok(match parent {
        ParentRef::Organization(id) => store
            .get::<Organization>(*id)
            .await?
            .map(|org| org.mnemonic),
        ParentRef::UserProfile(id) => store
            .get::<UserProfile>(*id)
            .await?
            .map(|profile| profile.mnemonic),
        ParentRef::Source(id) => store.get::<Source>(*id).await?.map(|source| source.mnemonic),
    })
}

/// URL of an organization.
pub fn organization_url(org: &Organization) -> String {
    format!("/orgs/{}/", org.mnemonic)
}

/// URL of a user profile.
pub fn profile_url(profile: &UserProfile) -> String {
    format!("/users/{}/", profile.mnemonic)
}

/// URL of a container owner (organization or user profile).
pub async fn owner_url(store: &RecordStore, parent: &ParentRef) -> Result<Option<String>> {
    Ok(match parent {
        ParentRef::Organization(id) => store.get::<Organization>(*id).await?.map(|o| organization_url(&o)),
        ParentRef::UserProfile(id) => store.get::<UserProfile>(*id).await?.map(|p| profile_url(&p)),
        ParentRef::Source(_) => None,
    })
}

/// URL of a source, built under its owner's URL.
pub async fn source_url(store: &RecordStore, source: &Source) -> Result<Option<String>> {
    let Some(parent) = source.parent else {
        return Ok(None);
    };
    Ok(owner_url(store, &parent)
        .await?
        .map(|base| format!("{}sources/{}/", base, source.mnemonic)))
}
