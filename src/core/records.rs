use crate::error::RecordError;

fn non_empty(field: &'static str, value: String) -> Result<String, RecordError> {
    if value.is_empty() {
        Err(RecordError::EmptyField(field))
    } else {
        Ok(value)
    }
}

/// One line of the temporal edge list: `source` sent a message to `target`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEvent {
    pub source_id: String,
    pub target_id: String,
    pub timestamp: u64,
}

impl MessageEvent {
    pub fn new(
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        timestamp: u64,
    ) -> Result<Self, RecordError> {
        Ok(Self {
            source_id: non_empty("sourceId", source_id.into())?,
            target_id: non_empty("targetId", target_id.into())?,
            timestamp,
        })
    }

    pub fn is_self_loop(&self) -> bool {
        self.source_id == self.target_id
    }
}

/// A `User` node as produced by materialization or read back from staging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserEntity {
    pub user_id: String,
    pub username: String,
    pub email: String,
    pub name: String,
}

impl UserEntity {
    pub fn new(
        user_id: impl Into<String>,
        username: impl Into<String>,
        email: impl Into<String>,
        name: impl Into<String>,
    ) -> Result<Self, RecordError> {
        Ok(Self {
            user_id: non_empty("userId", user_id.into())?,
            username: non_empty("username", username.into())?,
            email: non_empty("email", email.into())?,
            name: non_empty("name", name.into())?,
        })
    }
}

/// A directed `FOLLOWS` relationship between two dataset users.
///
/// `message_count` counts messages sent in this direction only. Edges that
/// exist only as the reciprocal of an observed pair carry 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowEdge {
    pub source: String,
    pub target: String,
    pub message_count: u64,
}

impl FollowEdge {
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        message_count: u64,
    ) -> Result<Self, RecordError> {
        Ok(Self {
            source: non_empty("source", source.into())?,
            target: non_empty("target", target.into())?,
            message_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_rejects_empty_ids() {
        assert_eq!(
            Err(RecordError::EmptyField("sourceId")),
            MessageEvent::new("", "2", 1)
        );
        assert_eq!(
            Err(RecordError::EmptyField("targetId")),
            MessageEvent::new("1", "", 1)
        );
    }

    #[test]
    fn test_self_loop() {
        assert!(MessageEvent::new("5", "5", 0).unwrap().is_self_loop());
        assert!(!MessageEvent::new("5", "6", 0).unwrap().is_self_loop());
    }

    #[test]
    fn test_user_requires_every_field() {
        assert!(UserEntity::new("1", "user_1", "user_1@college.edu", "User_1").is_ok());
        assert_eq!(
            Err(RecordError::EmptyField("email")),
            UserEntity::new("1", "user_1", "", "User_1")
        );
    }

    #[test]
    fn test_follow_edge_allows_zero_count() {
        let edge = FollowEdge::new("2", "1", 0).unwrap();
        assert_eq!(0, edge.message_count);
        assert_eq!(
            Err(RecordError::EmptyField("target")),
            FollowEdge::new("2", "", 3)
        );
    }
}
