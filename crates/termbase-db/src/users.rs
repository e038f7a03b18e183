//! Users, their profiles, API tokens, and organizations.
//!
//! Token issuance and owner deactivation run as explicit steps of the owning
//! write, so a failed write leaves neither behind.

use chrono::Utc;
use rand::RngCore;
use tracing::{error, info, warn};
use uuid::Uuid;

use termbase_core::defaults::AUTH_TOKEN_LENGTH;
use termbase_core::{
    new_v7, AuthToken, Error, Filter, Organization, Record, Resource, Result, Source, User,
    UserProfile, Validate, ValidationErrors, NON_FIELD_ERRORS,
};

use crate::locks::scope_key;
use crate::resources::{global_mnemonic_taken, organization_url, profile_url, soft_delete, undelete};
use crate::store::RecordStore;

/// Random hex token of [`AUTH_TOKEN_LENGTH`] characters.
fn generate_token_key() -> String {
    let mut bytes = vec![0u8; AUTH_TOKEN_LENGTH / 2];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Save a base resource after field checks and a global mnemonic check.
async fn persist_base<R: Resource>(store: &RecordStore, resource: &mut R, is_new: bool) -> ValidationErrors {
    let mut errors = resource.validate();
    if !errors.is_empty() {
        return errors;
    }

    let _scope = store.locks().lock(scope_key(R::COLLECTION, None)).await;
    match global_mnemonic_taken(store, resource).await {
        Ok(true) => {
            errors.add(
                "mnemonic",
                format!("{} with this Mnemonic already exists.", R::RESOURCE_TYPE),
            );
            return errors;
        }
        Ok(false) => {}
        Err(e) => {
            errors.add(NON_FIELD_ERRORS, e.to_string());
            return errors;
        }
    }

    let saved = if is_new {
        store.insert(&*resource).await
    } else {
        resource.touch();
        store.update(&*resource).await
    };
    if let Err(e) = saved {
        warn!(
            subsystem = "db",
            component = "users",
            op = "persist",
            resource_type = R::RESOURCE_TYPE,
            error = %e,
            "Failed to save resource"
        );
        errors.add(
            NON_FIELD_ERRORS,
            format!("An error occurred while trying to persist new {}.", R::RESOURCE_TYPE),
        );
        return errors;
    }

    info!(
        subsystem = "db",
        component = "users",
        op = if is_new { "persist_new" } else { "persist_changes" },
        resource_type = R::RESOURCE_TYPE,
        resource_id = %resource.id(),
        mnemonic = resource.mnemonic(),
        "Saved resource"
    );
    errors
}

/// Repository for organizations.
#[derive(Clone)]
pub struct OrganizationRepository {
    store: RecordStore,
}

impl OrganizationRepository {
    pub fn new(store: RecordStore) -> Self {
        Self { store }
    }

    pub async fn persist_new(&self, org: &mut Organization) -> ValidationErrors {
        persist_base(&self.store, org, true).await
    }

    pub async fn persist_changes(&self, org: &mut Organization) -> ValidationErrors {
        persist_base(&self.store, org, false).await
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Organization>> {
        self.store.get(id).await
    }

    /// Active organization with the given mnemonic.
    pub async fn get_by_mnemonic(&self, mnemonic: &str) -> Result<Option<Organization>> {
        self.store
            .find_one(&Filter::all().eq("mnemonic", mnemonic).eq("is_active", true))
            .await
    }

    pub async fn soft_delete(&self, org: &mut Organization) -> Result<bool> {
        soft_delete(&self.store, org).await
    }

    pub async fn undelete(&self, org: &mut Organization) -> Result<bool> {
        undelete(&self.store, org).await
    }

    pub fn url(&self, org: &Organization) -> String {
        organization_url(org)
    }
}

/// Repository for users, their profiles and tokens.
#[derive(Clone)]
pub struct UserRepository {
    store: RecordStore,
}

impl UserRepository {
    pub fn new(store: RecordStore) -> Self {
        Self { store }
    }

    /// Create a user and issue its API token. The user is removed again if
    /// the token cannot be saved.
    pub async fn create_user(&self, user: &User) -> Result<AuthToken> {
        let errors = user.validate();
        if !errors.is_empty() {
            return Err(Error::InvalidInput(errors.to_string()));
        }

        let _scope = self.store.locks().lock(scope_key(User::COLLECTION, None)).await;
        if self.get_by_username(&user.username).await?.is_some() {
            return Err(Error::Conflict(format!(
                "User with username {} already exists",
                user.username
            )));
        }

        self.store.insert(user).await?;

        let token = AuthToken {
            id: new_v7(),
            user_id: user.id,
            key: generate_token_key(),
            created_at: Utc::now(),
        };
        if let Err(e) = self.store.insert(&token).await {
            if let Err(cleanup) = self.store.delete::<User>(user.id).await {
                error!(
                    subsystem = "db",
                    component = "users",
                    op = "create_user",
                    resource_id = %user.id,
                    error = %cleanup,
                    "Failed to delete user after token failure"
                );
            }
            return Err(e);
        }

        info!(
            subsystem = "db",
            component = "users",
            op = "create_user",
            resource_id = %user.id,
            "Created user with API token"
        );
        Ok(token)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<User>> {
        self.store.get(id).await
    }

    pub async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        self.store
            .find_one(&Filter::all().eq("username", username))
            .await
    }

    pub async fn token_for(&self, user_id: Uuid) -> Result<Option<AuthToken>> {
        self.store
            .find_one(&Filter::all().eq_id("user_id", user_id))
            .await
    }

    /// Activate or deactivate a user, carrying the change to every source
    /// the user owns. Returns how many sources changed state.
    pub async fn set_active(&self, user: &mut User, active: bool) -> Result<usize> {
        if user.is_active != active {
            user.is_active = active;
            user.updated_at = Utc::now();
            if let Err(e) = self.store.update(&*user).await {
                user.is_active = !active;
                return Err(e);
            }
        }

        let owned: Vec<Source> = self
            .store
            .find(&Filter::all().eq_id("owner_id", user.id))
            .await?;
        let mut changed = 0;
        for mut source in owned {
            let toggled = if active {
                undelete(&self.store, &mut source).await?
            } else {
                soft_delete(&self.store, &mut source).await?
            };
            if toggled {
                changed += 1;
            }
        }

        info!(
            subsystem = "db",
            component = "users",
            op = "set_active",
            resource_id = %user.id,
            active,
            result_count = changed,
            "Propagated owner status to sources"
        );
        Ok(changed)
    }

    /// Create a profile for an existing user.
    pub async fn create_profile(&self, profile: &mut UserProfile) -> ValidationErrors {
        match self.store.exists(User::COLLECTION, profile.user_id).await {
            Ok(true) => persist_base(&self.store, profile, true).await,
            Ok(false) => ValidationErrors::single("user", "User does not exist."),
            Err(e) => ValidationErrors::single(NON_FIELD_ERRORS, e.to_string()),
        }
    }

    pub async fn persist_profile_changes(&self, profile: &mut UserProfile) -> ValidationErrors {
        persist_base(&self.store, profile, false).await
    }

    pub async fn profile_for_user(&self, user_id: Uuid) -> Result<Option<UserProfile>> {
        self.store
            .find_one(&Filter::all().eq_id("user_id", user_id))
            .await
    }

    /// Active profile with the given mnemonic.
    pub async fn profile_by_mnemonic(&self, mnemonic: &str) -> Result<Option<UserProfile>> {
        self.store
            .find_one(&Filter::all().eq("mnemonic", mnemonic).eq("is_active", true))
            .await
    }

    pub fn profile_url(&self, profile: &UserProfile) -> String {
        profile_url(profile)
    }
}
