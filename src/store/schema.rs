//! Storage layout and the declared constraints of the social graph.
//!
//! `users` holds `User` nodes, `follows` holds directed `FOLLOWS`
//! relationships keyed on the ordered node pair. Uniqueness constraints and
//! lookup indexes are declared separately from the tables so that declaring
//! them is an explicit, repeatable pipeline step. `user_id` is also unique at
//! the table level, since it is the upsert key for imported users.

pub const NODE_LABEL: &str = "User";
pub const RELATIONSHIP_TYPE: &str = "FOLLOWS";

pub(crate) const TABLES: &str = "
CREATE TABLE IF NOT EXISTS users (
    node_id       INTEGER PRIMARY KEY,
    user_id       TEXT UNIQUE,
    username      TEXT NOT NULL,
    email         TEXT NOT NULL,
    name          TEXT NOT NULL,
    bio           TEXT,
    password_hash TEXT,
    created_at    INTEGER NOT NULL,
    last_modified INTEGER
);
CREATE TABLE IF NOT EXISTS follows (
    source_node   INTEGER NOT NULL REFERENCES users(node_id) ON DELETE CASCADE,
    target_node   INTEGER NOT NULL REFERENCES users(node_id) ON DELETE CASCADE,
    message_count INTEGER NOT NULL DEFAULT 0 CHECK (message_count >= 0),
    created_at    INTEGER NOT NULL,
    PRIMARY KEY (source_node, target_node)
);
";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclarationKind {
    Constraint,
    Index,
}

impl DeclarationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeclarationKind::Constraint => "UNIQUENESS",
            DeclarationKind::Index => "RANGE",
        }
    }
}

pub struct Declaration {
    pub name: &'static str,
    pub kind: DeclarationKind,
    pub statement: &'static str,
}

pub const DECLARATIONS: &[Declaration] = &[
    Declaration {
        name: "user_userId_unique",
        kind: DeclarationKind::Constraint,
        statement: "CREATE UNIQUE INDEX IF NOT EXISTS user_userId_unique ON users(user_id)",
    },
    Declaration {
        name: "user_username_unique",
        kind: DeclarationKind::Constraint,
        statement: "CREATE UNIQUE INDEX IF NOT EXISTS user_username_unique ON users(username)",
    },
    Declaration {
        name: "user_email_unique",
        kind: DeclarationKind::Constraint,
        statement: "CREATE UNIQUE INDEX IF NOT EXISTS user_email_unique ON users(email)",
    },
    Declaration {
        name: "user_userId_index",
        kind: DeclarationKind::Index,
        statement: "CREATE INDEX IF NOT EXISTS user_userId_index ON users(user_id)",
    },
    Declaration {
        name: "user_username_index",
        kind: DeclarationKind::Index,
        statement: "CREATE INDEX IF NOT EXISTS user_username_index ON users(username)",
    },
    Declaration {
        name: "user_email_index",
        kind: DeclarationKind::Index,
        statement: "CREATE INDEX IF NOT EXISTS user_email_index ON users(email)",
    },
    Declaration {
        name: "follows_target_index",
        kind: DeclarationKind::Index,
        statement: "CREATE INDEX IF NOT EXISTS follows_target_index ON follows(target_node)",
    },
];

/// A declared constraint or index as found in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaEntry {
    pub name: String,
    pub kind: DeclarationKind,
    pub table: String,
}
