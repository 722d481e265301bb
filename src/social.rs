//! Follow relationships between users, addressed by username.

use crate::error::SocialError;
use crate::store::{GraphStore, StoredUser, UserSummary};
use tracing::info;

pub const SEARCH_LIMIT: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Connections {
    pub following: Vec<UserSummary>,
    pub followers: Vec<UserSummary>,
}

fn find(store: &GraphStore, username: &str) -> Result<StoredUser, SocialError> {
    store
        .user_by_username(username)?
        .ok_or_else(|| SocialError::UnknownUser(username.to_string()))
}

pub fn follow(store: &GraphStore, follower: &str, followee: &str) -> Result<(), SocialError> {
    if follower == followee {
        return Err(SocialError::SelfFollow);
    }
    let source = find(store, follower)?;
    let target = find(store, followee)?;
    if !store.follow(source.node_id, target.node_id)? {
        return Err(SocialError::AlreadyFollowing(followee.to_string()));
    }
    info!(follower, followee, "followed");
    Ok(())
}

pub fn unfollow(store: &GraphStore, follower: &str, followee: &str) -> Result<(), SocialError> {
    if follower == followee {
        return Err(SocialError::SelfUnfollow);
    }
    let source = find(store, follower)?;
    let target = find(store, followee)?;
    if !store.unfollow(source.node_id, target.node_id)? {
        return Err(SocialError::NotFollowing(followee.to_string()));
    }
    info!(follower, followee, "unfollowed");
    Ok(())
}

pub fn connections(store: &GraphStore, username: &str) -> Result<Connections, SocialError> {
    let user = find(store, username)?;
    Ok(Connections {
        following: store.following(user.node_id)?,
        followers: store.followers(user.node_id)?,
    })
}

/// Users that both `first` and `second` follow.
pub fn mutual(
    store: &GraphStore,
    first: &str,
    second: &str,
) -> Result<Vec<UserSummary>, SocialError> {
    let a = find(store, first)?;
    let b = find(store, second)?;
    Ok(store.mutual_following(a.node_id, b.node_id)?)
}

pub fn search(
    store: &GraphStore,
    term: &str,
    exclude_username: Option<&str>,
) -> Result<Vec<UserSummary>, SocialError> {
    Ok(store.search_users(term, exclude_username, SEARCH_LIMIT)?)
}
