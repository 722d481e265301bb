//! Registration, login and profile management on top of the graph store.

use crate::error::AccountError;
use crate::pipeline::materialize::{
    email_for, is_placeholder_email, is_placeholder_username, username_for,
};
use crate::store::{GraphStore, NewUser, ProfileUpdate, StoredUser};
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct Registration<'a> {
    pub username: &'a str,
    pub password: &'a str,
    pub email: &'a str,
    pub name: &'a str,
    pub bio: &'a str,
    /// Claim the imported user with this dataset id instead of creating one.
    pub dataset_id: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub user: StoredUser,
    pub following_count: u64,
    pub followers_count: u64,
}

fn required(field: &'static str, value: &str) -> Result<(), AccountError> {
    if value.trim().is_empty() {
        Err(AccountError::EmptyField(field))
    } else {
        Ok(())
    }
}

/// Placeholder usernames and emails belong to the import. Only the row with
/// dataset id `own_id` may hold the pair derived from it.
fn check_not_reserved(
    username: Option<&str>,
    email: Option<&str>,
    own_id: Option<&str>,
) -> Result<(), AccountError> {
    let own_username = own_id.map(username_for);
    if let Some(username) = username {
        if is_placeholder_username(username) && own_username.as_deref() != Some(username) {
            return Err(AccountError::UsernameTaken);
        }
    }
    if let Some(email) = email {
        let own_email = own_username.as_deref().map(email_for);
        if is_placeholder_email(email) && own_email.as_deref() != Some(email) {
            return Err(AccountError::EmailTaken);
        }
    }
    Ok(())
}

pub struct Accounts<'s> {
    store: &'s GraphStore,
    hash_cost: u32,
}

impl<'s> Accounts<'s> {
    pub fn new(store: &'s GraphStore) -> Self {
        Self {
            store,
            hash_cost: bcrypt::DEFAULT_COST,
        }
    }

    pub fn with_hash_cost(mut self, cost: u32) -> Self {
        self.hash_cost = cost;
        self
    }

    pub fn register(&self, reg: &Registration<'_>) -> Result<StoredUser, AccountError> {
        required("username", reg.username)?;
        required("password", reg.password)?;
        required("email", reg.email)?;
        required("name", reg.name)?;

        let claiming = match reg.dataset_id {
            Some(id) => {
                let existing = self
                    .store
                    .user_by_user_id(id)?
                    .ok_or_else(|| AccountError::UnknownDatasetUser(id.to_string()))?;
                if existing.is_claimed() {
                    return Err(AccountError::AlreadyClaimed(id.to_string()));
                }
                Some(existing.node_id)
            }
            None => None,
        };
        check_not_reserved(Some(reg.username), Some(reg.email), reg.dataset_id)?;

        let taken_by_other = |user: Option<StoredUser>| {
            user.is_some_and(|u| Some(u.node_id) != claiming)
        };
        if taken_by_other(self.store.user_by_username(reg.username)?) {
            return Err(AccountError::UsernameTaken);
        }
        if taken_by_other(self.store.user_by_email(reg.email)?) {
            return Err(AccountError::EmailTaken);
        }

        let new_user = NewUser {
            username: reg.username.to_string(),
            email: reg.email.to_string(),
            name: reg.name.to_string(),
            bio: reg.bio.to_string(),
            password_hash: bcrypt::hash(reg.password, self.hash_cost)?,
        };
        match (claiming, reg.dataset_id) {
            (Some(node_id), Some(id)) => {
                if !self.store.claim_user(node_id, &new_user)? {
                    return Err(AccountError::AlreadyClaimed(id.to_string()));
                }
                info!(username = reg.username, dataset_id = id, "claimed imported user");
            }
            _ => {
                self.store.insert_user(&new_user)?;
                info!(username = reg.username, "registered user");
            }
        }

        self.store
            .user_by_username(reg.username)?
            .ok_or(AccountError::UnknownUser)
    }

    pub fn login(&self, username: &str, password: &str) -> Result<StoredUser, AccountError> {
        let user = self
            .store
            .user_by_username(username)?
            .ok_or(AccountError::UnknownUser)?;
        let hash = user
            .password_hash
            .as_deref()
            .ok_or(AccountError::NoCredentials)?;
        if !bcrypt::verify(password, hash)? {
            return Err(AccountError::WrongPassword);
        }
        Ok(user)
    }

    pub fn view_profile(&self, username: &str) -> Result<Profile, AccountError> {
        let user = self
            .store
            .user_by_username(username)?
            .ok_or(AccountError::UnknownUser)?;
        let (following_count, followers_count) = self.store.follow_counts(user.node_id)?;
        Ok(Profile {
            user,
            following_count,
            followers_count,
        })
    }

    pub fn edit_profile(
        &self,
        username: &str,
        update: &ProfileUpdate,
    ) -> Result<StoredUser, AccountError> {
        if update.is_empty() {
            return Err(AccountError::NothingToUpdate);
        }
        if let Some(name) = &update.name {
            required("name", name)?;
        }
        let user = self
            .store
            .user_by_username(username)?
            .ok_or(AccountError::UnknownUser)?;
        if let Some(email) = &update.email {
            required("email", email)?;
            check_not_reserved(None, Some(email), user.user_id.as_deref())?;
            if self
                .store
                .user_by_email(email)?
                .is_some_and(|u| u.node_id != user.node_id)
            {
                return Err(AccountError::EmailTaken);
            }
        }

        if !self.store.update_profile(username, update)? {
            return Err(AccountError::UnknownUser);
        }
        info!(username, "profile updated");
        self.store
            .user_by_username(username)?
            .ok_or(AccountError::UnknownUser)
    }
}
