use crate::core::records::UserEntity;
use crate::error::ImportError;
use std::collections::HashMap;

pub const EMAIL_DOMAIN: &str = "college.edu";

/// Placeholder username for a dataset identifier: `user_` followed by the id
/// lowercased, with anything outside `[a-z0-9_]` replaced by `_`.
pub fn username_for(user_id: &str) -> String {
    let normalized = user_id
        .chars()
        .map(|c| match c.to_ascii_lowercase() {
            c @ ('a'..='z' | '0'..='9' | '_') => c,
            _ => '_',
        })
        .collect::<String>();
    format!("user_{normalized}")
}

pub fn email_for(username: &str) -> String {
    format!("{username}@{EMAIL_DOMAIN}")
}

/// True for any name `username_for` could produce for some identifier.
pub fn is_placeholder_username(username: &str) -> bool {
    username.strip_prefix("user_").is_some_and(|rest| {
        !rest.is_empty()
            && rest
                .chars()
                .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '_'))
    })
}

pub fn is_placeholder_email(email: &str) -> bool {
    email
        .strip_suffix(EMAIL_DOMAIN)
        .and_then(|local| local.strip_suffix('@'))
        .is_some_and(is_placeholder_username)
}

/// One `UserEntity` per identifier, in input order.
///
/// Fails if two identifiers would share a username; nothing is overwritten.
pub fn materialize<'a, I>(ids: I) -> Result<Vec<UserEntity>, ImportError>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut claimed: HashMap<String, &'a str> = HashMap::new();
    let mut users = Vec::new();

    for user_id in ids {
        let username = username_for(user_id);
        if let Some(first) = claimed.get(&username) {
            if *first == user_id {
                continue;
            }
            return Err(ImportError::DuplicateEntityConflict {
                first: first.to_string(),
                second: user_id.to_string(),
                username,
            });
        }
        claimed.insert(username.clone(), user_id);

        let email = email_for(&username);
        users.push(UserEntity::new(
            user_id,
            username,
            email,
            format!("User_{user_id}"),
        )?);
    }

    Ok(users)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_fields() {
        let users = materialize(["1", "2"]).unwrap();
        assert_eq!(
            vec![
                UserEntity::new("1", "user_1", "user_1@college.edu", "User_1").unwrap(),
                UserEntity::new("2", "user_2", "user_2@college.edu", "User_2").unwrap(),
            ],
            users
        );
    }

    #[test]
    fn test_order_is_preserved() {
        let ids = ["30", "4", "1000", "2"];
        let users = materialize(ids).unwrap();
        assert_eq!(
            ids.to_vec(),
            users.iter().map(|u| u.user_id.as_str()).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_username_normalization() {
        assert_eq!("user_abc_9", username_for("ABC-9"));
        assert_eq!("user_a_b", username_for("a.b"));
        assert_eq!("user__", username_for("é"));
    }

    #[test]
    fn test_placeholder_namespace() {
        for id in ["1", "ABC-9", "é"] {
            assert!(is_placeholder_username(&username_for(id)));
            assert!(is_placeholder_email(&email_for(&username_for(id))));
        }
        assert!(!is_placeholder_username("user_"));
        assert!(!is_placeholder_username("user_Bob"));
        assert!(!is_placeholder_username("alice"));
        assert!(!is_placeholder_email("user_1@example.com"));
        assert!(!is_placeholder_email("alice@college.edu"));
    }

    #[test]
    fn test_repeated_identifier_is_not_a_conflict() {
        let users = materialize(["7", "7"]).unwrap();
        assert_eq!(1, users.len());
    }

    #[test]
    fn test_colliding_usernames_fail() {
        match materialize(["Bob", "x", "bob"]) {
            Err(ImportError::DuplicateEntityConflict {
                first,
                second,
                username,
            }) => {
                assert_eq!("Bob", first);
                assert_eq!("bob", second);
                assert_eq!("user_bob", username);
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }
}
