//! Embedded graph store backed by SQLite.

pub mod schema;

use crate::core::records::{FollowEdge, UserEntity};
use crate::error::StoreError;
use rusqlite::{Connection, OptionalExtension, Row, Transaction, params};
use schema::{DECLARATIONS, DeclarationKind, SchemaEntry, TABLES};
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, instrument};

const USER_COLUMNS: &str =
    "node_id, user_id, username, email, name, bio, password_hash, created_at, last_modified";

const UPSERT_USER: &str = "
INSERT INTO users (user_id, username, email, name, created_at)
VALUES (?1, ?2, ?3, ?4, ?5)
ON CONFLICT(user_id) DO UPDATE SET
    username = excluded.username,
    email = excluded.email,
    name = excluded.name
WHERE users.password_hash IS NULL";

const UPSERT_FOLLOW: &str = "
INSERT INTO follows (source_node, target_node, message_count, created_at)
SELECT s.node_id, t.node_id, ?3, ?4
FROM users s, users t
WHERE s.user_id = ?1 AND t.user_id = ?2
ON CONFLICT(source_node, target_node) DO UPDATE SET
    message_count = excluded.message_count";

pub(crate) fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// A `User` node as stored, including rows created by registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredUser {
    pub node_id: i64,
    /// Dataset identifier; `None` for users that only registered.
    pub user_id: Option<String>,
    pub username: String,
    pub email: String,
    pub name: String,
    pub bio: Option<String>,
    pub password_hash: Option<String>,
    pub created_at: i64,
    pub last_modified: Option<i64>,
}

impl StoredUser {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            node_id: row.get("node_id")?,
            user_id: row.get("user_id")?,
            username: row.get("username")?,
            email: row.get("email")?,
            name: row.get("name")?,
            bio: row.get("bio")?,
            password_hash: row.get("password_hash")?,
            created_at: row.get("created_at")?,
            last_modified: row.get("last_modified")?,
        })
    }

    pub fn is_claimed(&self) -> bool {
        self.password_hash.is_some()
    }
}

/// Fields written when a user registers or claims an imported row.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub name: String,
    pub bio: String,
    pub password_hash: String,
}

#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub bio: Option<String>,
    pub email: Option<String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.bio.is_none() && self.email.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSummary {
    pub username: String,
    pub name: String,
    pub bio: Option<String>,
}

impl UserSummary {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            username: row.get(0)?,
            name: row.get(1)?,
            bio: row.get(2)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreStats {
    pub users: u64,
    pub imported_users: u64,
    pub registered_users: u64,
    pub follows: u64,
}

pub struct GraphStore {
    conn: Connection,
}

impl GraphStore {
    /// Opens (creating if needed) the store file at `path`.
    pub fn open(path: &Path, timeout: Duration) -> Result<Self, StoreError> {
        let location = path.display().to_string();
        let conn = Connection::open(path).and_then(|conn| {
            conn.busy_timeout(timeout)?;
            Ok(conn)
        });
        match conn {
            Ok(conn) => Self::init(conn, location),
            Err(source) => Err(StoreError::Connection { location, source }),
        }
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let location = ":memory:".to_string();
        match Connection::open_in_memory() {
            Ok(conn) => Self::init(conn, location),
            Err(source) => Err(StoreError::Connection { location, source }),
        }
    }

    fn init(conn: Connection, location: String) -> Result<Self, StoreError> {
        conn.pragma_update(None, "foreign_keys", "ON")
            .and_then(|_| conn.execute_batch(TABLES))
            .map_err(|source| StoreError::Connection {
                location: location.clone(),
                source,
            })?;
        info!(store = %location, "opened graph store");
        Ok(Self { conn })
    }

    /// Declares every uniqueness constraint and lookup index. Safe to repeat.
    pub fn apply_schema(&self) -> Result<usize, StoreError> {
        for declaration in DECLARATIONS {
            self.conn
                .execute(declaration.statement, [])
                .map_err(StoreError::sql("apply_schema"))?;
            debug!(
                name = declaration.name,
                kind = declaration.kind.as_str(),
                "declared"
            );
        }
        Ok(DECLARATIONS.len())
    }

    pub fn schema_info(&self) -> Result<Vec<SchemaEntry>, StoreError> {
        let op = StoreError::sql("schema_info");
        let mut stmt = self
            .conn
            .prepare(
                "SELECT name, tbl_name, sql FROM sqlite_master
                 WHERE type = 'index' AND sql IS NOT NULL
                 ORDER BY name",
            )
            .map_err(&op)?;
        let entries = stmt
            .query_map([], |row| {
                let sql: String = row.get(2)?;
                let kind = if sql.starts_with("CREATE UNIQUE") {
                    DeclarationKind::Constraint
                } else {
                    DeclarationKind::Index
                };
                Ok(SchemaEntry {
                    name: row.get(0)?,
                    kind,
                    table: row.get(1)?,
                })
            })
            .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
            .map_err(&op)?;
        Ok(entries)
    }

    fn in_transaction<T>(
        &mut self,
        operation: &'static str,
        f: impl FnOnce(&Transaction<'_>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let tx = self
            .conn
            .transaction()
            .map_err(StoreError::sql(operation))?;
        let out = f(&tx)?;
        tx.commit().map_err(StoreError::sql(operation))?;
        Ok(out)
    }

    /// Upserts a batch of users keyed by `userId` in one transaction.
    ///
    /// Rows that already carry credentials keep their profile fields.
    #[instrument(skip(self, batch), fields(rows = batch.len()))]
    pub fn upsert_users(&mut self, batch: &[UserEntity]) -> Result<usize, StoreError> {
        let now = unix_now();
        self.in_transaction("upsert_users", |tx| {
            let op = StoreError::sql("upsert_users");
            let mut stmt = tx.prepare_cached(UPSERT_USER).map_err(&op)?;
            for user in batch {
                stmt.execute(params![
                    user.user_id,
                    user.username,
                    user.email,
                    user.name,
                    now
                ])
                .map_err(&op)?;
            }
            Ok(batch.len())
        })
    }

    /// Upserts a batch of `FOLLOWS` keyed by the ordered pair in one
    /// transaction. `messageCount` is overwritten.
    #[instrument(skip(self, batch), fields(rows = batch.len()))]
    pub fn upsert_follows(&mut self, batch: &[FollowEdge]) -> Result<usize, StoreError> {
        let now = unix_now();
        self.in_transaction("upsert_follows", |tx| {
            let op = StoreError::sql("upsert_follows");
            let mut stmt = tx.prepare_cached(UPSERT_FOLLOW).map_err(&op)?;
            for edge in batch {
                let count = i64::try_from(edge.message_count).map_err(|_| {
                    StoreError::OutOfRange {
                        operation: "upsert_follows",
                        field: "messageCount",
                        value: edge.message_count,
                    }
                })?;
                let changed = stmt
                    .execute(params![edge.source, edge.target, count, now])
                    .map_err(&op)?;
                if changed == 0 {
                    return Err(StoreError::ConstraintViolation {
                        operation: "upsert_follows",
                        message: format!(
                            "{} -> {} references a user that is not in the store",
                            edge.source, edge.target
                        ),
                    });
                }
            }
            Ok(batch.len())
        })
    }

    fn user_where(
        &self,
        operation: &'static str,
        column: &str,
        value: &str,
    ) -> Result<Option<StoredUser>, StoreError> {
        self.conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1"),
                [value],
                StoredUser::from_row,
            )
            .optional()
            .map_err(StoreError::sql(operation))
    }

    pub fn user_by_username(&self, username: &str) -> Result<Option<StoredUser>, StoreError> {
        self.user_where("user_by_username", "username", username)
    }

    pub fn user_by_email(&self, email: &str) -> Result<Option<StoredUser>, StoreError> {
        self.user_where("user_by_email", "email", email)
    }

    pub fn user_by_user_id(&self, user_id: &str) -> Result<Option<StoredUser>, StoreError> {
        self.user_where("user_by_user_id", "user_id", user_id)
    }

    /// Creates a registered user with no dataset identifier.
    pub fn insert_user(&self, user: &NewUser) -> Result<i64, StoreError> {
        self.conn
            .execute(
                "INSERT INTO users (username, email, name, bio, password_hash, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    user.username,
                    user.email,
                    user.name,
                    user.bio,
                    user.password_hash,
                    unix_now()
                ],
            )
            .map_err(StoreError::sql("insert_user"))?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Attaches credentials and profile fields to an imported row that has
    /// none yet. Returns false if the row is missing or already claimed.
    pub fn claim_user(&self, node_id: i64, user: &NewUser) -> Result<bool, StoreError> {
        let changed = self
            .conn
            .execute(
                "UPDATE users
                 SET username = ?2, email = ?3, name = ?4, bio = ?5,
                     password_hash = ?6, last_modified = ?7
                 WHERE node_id = ?1 AND password_hash IS NULL",
                params![
                    node_id,
                    user.username,
                    user.email,
                    user.name,
                    user.bio,
                    user.password_hash,
                    unix_now()
                ],
            )
            .map_err(StoreError::sql("claim_user"))?;
        Ok(changed == 1)
    }

    pub fn update_profile(
        &self,
        username: &str,
        update: &ProfileUpdate,
    ) -> Result<bool, StoreError> {
        let changed = self
            .conn
            .execute(
                "UPDATE users
                 SET name = COALESCE(?2, name),
                     bio = COALESCE(?3, bio),
                     email = COALESCE(?4, email),
                     last_modified = ?5
                 WHERE username = ?1",
                params![username, update.name, update.bio, update.email, unix_now()],
            )
            .map_err(StoreError::sql("update_profile"))?;
        Ok(changed == 1)
    }

    /// `(following, followers)` for a node.
    pub fn follow_counts(&self, node_id: i64) -> Result<(u64, u64), StoreError> {
        self.conn
            .query_row(
                "SELECT
                    (SELECT COUNT(*) FROM follows WHERE source_node = ?1),
                    (SELECT COUNT(*) FROM follows WHERE target_node = ?1)",
                [node_id],
                |row| Ok((row.get::<_, i64>(0)? as u64, row.get::<_, i64>(1)? as u64)),
            )
            .map_err(StoreError::sql("follow_counts"))
    }

    /// Creates a `FOLLOWS` with no messages. Returns false if it already existed.
    pub fn follow(&self, source_node: i64, target_node: i64) -> Result<bool, StoreError> {
        let changed = self
            .conn
            .execute(
                "INSERT INTO follows (source_node, target_node, message_count, created_at)
                 VALUES (?1, ?2, 0, ?3)
                 ON CONFLICT(source_node, target_node) DO NOTHING",
                params![source_node, target_node, unix_now()],
            )
            .map_err(StoreError::sql("follow"))?;
        Ok(changed == 1)
    }

    pub fn unfollow(&self, source_node: i64, target_node: i64) -> Result<bool, StoreError> {
        let changed = self
            .conn
            .execute(
                "DELETE FROM follows WHERE source_node = ?1 AND target_node = ?2",
                params![source_node, target_node],
            )
            .map_err(StoreError::sql("unfollow"))?;
        Ok(changed == 1)
    }

    /// `messageCount` of the `FOLLOWS` between two dataset users, if any.
    pub fn follow_edge(
        &self,
        source_user_id: &str,
        target_user_id: &str,
    ) -> Result<Option<u64>, StoreError> {
        self.conn
            .query_row(
                "SELECT f.message_count
                 FROM follows f
                 JOIN users s ON s.node_id = f.source_node
                 JOIN users t ON t.node_id = f.target_node
                 WHERE s.user_id = ?1 AND t.user_id = ?2",
                [source_user_id, target_user_id],
                |row| row.get::<_, i64>(0),
            )
            .optional()
            .map(|count| count.map(|c| c as u64))
            .map_err(StoreError::sql("follow_edge"))
    }

    fn summaries(
        &self,
        operation: &'static str,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<UserSummary>, StoreError> {
        let op = StoreError::sql(operation);
        let mut stmt = self.conn.prepare(sql).map_err(&op)?;
        let rows = stmt
            .query_map(params, UserSummary::from_row)
            .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
            .map_err(&op)?;
        Ok(rows)
    }

    pub fn following(&self, node_id: i64) -> Result<Vec<UserSummary>, StoreError> {
        self.summaries(
            "following",
            "SELECT u.username, u.name, u.bio
             FROM follows f JOIN users u ON u.node_id = f.target_node
             WHERE f.source_node = ?1
             ORDER BY u.name, u.username",
            [node_id],
        )
    }

    pub fn followers(&self, node_id: i64) -> Result<Vec<UserSummary>, StoreError> {
        self.summaries(
            "followers",
            "SELECT u.username, u.name, u.bio
             FROM follows f JOIN users u ON u.node_id = f.source_node
             WHERE f.target_node = ?1
             ORDER BY u.name, u.username",
            [node_id],
        )
    }

    /// Users followed by both `a` and `b`, excluding `a` and `b`.
    pub fn mutual_following(&self, a: i64, b: i64) -> Result<Vec<UserSummary>, StoreError> {
        self.summaries(
            "mutual_following",
            "SELECT u.username, u.name, u.bio
             FROM follows fa
             JOIN follows fb ON fb.target_node = fa.target_node
             JOIN users u ON u.node_id = fa.target_node
             WHERE fa.source_node = ?1 AND fb.source_node = ?2
               AND u.node_id <> ?1 AND u.node_id <> ?2
             ORDER BY u.name, u.username",
            [a, b],
        )
    }

    /// Case-sensitive substring match on username or name.
    pub fn search_users(
        &self,
        term: &str,
        exclude_username: Option<&str>,
        limit: usize,
    ) -> Result<Vec<UserSummary>, StoreError> {
        self.summaries(
            "search_users",
            "SELECT username, name, bio FROM users
             WHERE (instr(username, ?1) > 0 OR instr(name, ?1) > 0)
               AND (?2 IS NULL OR username <> ?2)
             ORDER BY name, username
             LIMIT ?3",
            params![term, exclude_username, limit as i64],
        )
    }

    pub fn stats(&self) -> Result<StoreStats, StoreError> {
        self.conn
            .query_row(
                "SELECT
                    (SELECT COUNT(*) FROM users),
                    (SELECT COUNT(*) FROM users WHERE user_id IS NOT NULL),
                    (SELECT COUNT(*) FROM users WHERE password_hash IS NOT NULL),
                    (SELECT COUNT(*) FROM follows)",
                [],
                |row| {
                    Ok(StoreStats {
                        users: row.get::<_, i64>(0)? as u64,
                        imported_users: row.get::<_, i64>(1)? as u64,
                        registered_users: row.get::<_, i64>(2)? as u64,
                        follows: row.get::<_, i64>(3)? as u64,
                    })
                },
            )
            .map_err(StoreError::sql("stats"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> GraphStore {
        let store = GraphStore::open_in_memory().unwrap();
        store.apply_schema().unwrap();
        store
    }

    fn entity(id: &str) -> UserEntity {
        UserEntity::new(
            id,
            format!("user_{id}"),
            format!("user_{id}@college.edu"),
            format!("User_{id}"),
        )
        .unwrap()
    }

    fn registered(username: &str) -> NewUser {
        NewUser {
            username: username.to_string(),
            email: format!("{username}@example.com"),
            name: username.to_uppercase(),
            bio: String::new(),
            password_hash: "hash".to_string(),
        }
    }

    #[test]
    fn test_apply_schema_is_idempotent() {
        let store = store();
        store.apply_schema().unwrap();
        store.apply_schema().unwrap();

        let info = store.schema_info().unwrap();
        assert_eq!(DECLARATIONS.len(), info.len());
        let constraints = info
            .iter()
            .filter(|e| e.kind == DeclarationKind::Constraint)
            .count();
        assert_eq!(3, constraints);
    }

    #[test]
    fn test_upsert_users_does_not_duplicate() {
        let mut store = store();
        store.upsert_users(&[entity("1"), entity("2")]).unwrap();
        store.upsert_users(&[entity("1"), entity("2")]).unwrap();

        assert_eq!(2, store.stats().unwrap().users);
        let user = store.user_by_user_id("1").unwrap().unwrap();
        assert_eq!("user_1", user.username);
        assert!(!user.is_claimed());
    }

    #[test]
    fn test_upsert_follows_overwrites_count() {
        let mut store = store();
        store.upsert_users(&[entity("1"), entity("2")]).unwrap();
        store
            .upsert_follows(&[FollowEdge::new("1", "2", 5).unwrap()])
            .unwrap();
        store
            .upsert_follows(&[FollowEdge::new("1", "2", 3).unwrap()])
            .unwrap();

        assert_eq!(Some(3), store.follow_edge("1", "2").unwrap());
        assert_eq!(None, store.follow_edge("2", "1").unwrap());
        assert_eq!(1, store.stats().unwrap().follows);
    }

    #[test]
    fn test_follow_to_missing_user_rolls_back_batch() {
        let mut store = store();
        store.upsert_users(&[entity("1"), entity("2")]).unwrap();

        let err = store
            .upsert_follows(&[
                FollowEdge::new("1", "2", 1).unwrap(),
                FollowEdge::new("1", "9", 1).unwrap(),
            ])
            .unwrap_err();

        assert!(err.is_constraint_violation());
        assert_eq!(0, store.stats().unwrap().follows);
    }

    #[test]
    fn test_message_count_beyond_store_range() {
        let mut store = store();
        store.upsert_users(&[entity("1"), entity("2")]).unwrap();

        let err = store
            .upsert_follows(&[
                FollowEdge::new("2", "1", 4).unwrap(),
                FollowEdge::new("1", "2", u64::MAX).unwrap(),
            ])
            .unwrap_err();

        assert!(matches!(
            err,
            StoreError::OutOfRange {
                field: "messageCount",
                value: u64::MAX,
                ..
            }
        ));
        assert!(!err.is_constraint_violation());
        assert_eq!(0, store.stats().unwrap().follows);
    }

    #[test]
    fn test_upsert_users_before_schema_is_declared() {
        let mut store = GraphStore::open_in_memory().unwrap();
        store.upsert_users(&[entity("1"), entity("2")]).unwrap();
        store.upsert_users(&[entity("1")]).unwrap();

        assert_eq!(2, store.stats().unwrap().users);
        assert!(store.schema_info().unwrap().is_empty());
    }

    #[test]
    fn test_username_conflict_is_constraint_violation() {
        let mut store = store();
        store.insert_user(&registered("user_7")).unwrap();

        let err = store.upsert_users(&[entity("6"), entity("7")]).unwrap_err();
        assert!(err.is_constraint_violation());
        assert_eq!(1, store.stats().unwrap().users);
    }

    #[test]
    fn test_claimed_rows_keep_profile_on_reimport() {
        let mut store = store();
        store.upsert_users(&[entity("1")]).unwrap();
        let node = store.user_by_user_id("1").unwrap().unwrap().node_id;
        assert!(store.claim_user(node, &registered("alice")).unwrap());
        assert!(!store.claim_user(node, &registered("mallory")).unwrap());

        store.upsert_users(&[entity("1")]).unwrap();

        let user = store.user_by_user_id("1").unwrap().unwrap();
        assert_eq!("alice", user.username);
        assert!(user.is_claimed());
    }

    #[test]
    fn test_update_profile_partial() {
        let store = store();
        store.insert_user(&registered("bob")).unwrap();
        let update = ProfileUpdate {
            bio: Some("hello".to_string()),
            ..ProfileUpdate::default()
        };

        assert!(store.update_profile("bob", &update).unwrap());
        assert!(!store.update_profile("nobody", &update).unwrap());

        let bob = store.user_by_username("bob").unwrap().unwrap();
        assert_eq!(Some("hello".to_string()), bob.bio);
        assert_eq!("BOB", bob.name);
        assert!(bob.last_modified.is_some());
    }

    #[test]
    fn test_follow_queries() {
        let store = store();
        let a = store.insert_user(&registered("a")).unwrap();
        let b = store.insert_user(&registered("b")).unwrap();
        let c = store.insert_user(&registered("c")).unwrap();

        assert!(store.follow(a, c).unwrap());
        assert!(!store.follow(a, c).unwrap());
        assert!(store.follow(b, c).unwrap());
        assert!(store.follow(a, b).unwrap());

        assert_eq!((2, 0), store.follow_counts(a).unwrap());
        assert_eq!((0, 2), store.follow_counts(c).unwrap());
        let mutual = store.mutual_following(a, b).unwrap();
        assert_eq!(vec!["c"], mutual.iter().map(|u| u.username.as_str()).collect::<Vec<_>>());
        assert_eq!(2, store.followers(c).unwrap().len());

        assert!(store.unfollow(a, c).unwrap());
        assert!(!store.unfollow(a, c).unwrap());
        assert_eq!(1, store.following(a).unwrap().len());
    }

    #[test]
    fn test_search_users() {
        let mut store = store();
        store
            .upsert_users(&[entity("10"), entity("11"), entity("20")])
            .unwrap();

        let found = store.search_users("user_1", None, 20).unwrap();
        assert_eq!(2, found.len());
        let found = store.search_users("user_1", Some("user_10"), 20).unwrap();
        assert_eq!(vec!["user_11"], found.iter().map(|u| u.username.as_str()).collect::<Vec<_>>());
        assert_eq!(1, store.search_users("User_", None, 1).unwrap().len());
    }

    #[test]
    fn test_open_file_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.db");
        {
            let mut store = GraphStore::open(&path, Duration::from_millis(100)).unwrap();
            store.apply_schema().unwrap();
            store.upsert_users(&[entity("1")]).unwrap();
        }
        let store = GraphStore::open(&path, Duration::from_millis(100)).unwrap();
        assert_eq!(1, store.stats().unwrap().imported_users);
    }

    #[test]
    fn test_open_unreachable_path() {
        let err = GraphStore::open(Path::new("/no/such/dir/graph.db"), Duration::from_millis(10));
        assert!(matches!(err, Err(StoreError::Connection { .. })));
    }
}
