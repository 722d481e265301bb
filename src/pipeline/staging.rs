use crate::core::records::{FollowEdge, UserEntity};
use crate::error::ImportError;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub const USERS_FILE: &str = "users.csv";
pub const FOLLOWS_FILE: &str = "follows.csv";
pub const USERS_HEADER: [&str; 4] = ["userId", "username", "email", "name"];
pub const FOLLOWS_HEADER: [&str; 3] = ["source", "target", "messageCount"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingPaths {
    pub users: PathBuf,
    pub follows: PathBuf,
}

impl StagingPaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            users: dir.join(USERS_FILE),
            follows: dir.join(FOLLOWS_FILE),
        }
    }
}

/// Writes both staging tables into `dir`, creating it if needed.
pub fn stage(
    dir: &Path,
    users: &[UserEntity],
    edges: &[FollowEdge],
) -> Result<StagingPaths, ImportError> {
    fs::create_dir_all(dir)?;
    let paths = StagingPaths::in_dir(dir);
    write_users(&paths.users, users)?;
    write_follows(&paths.follows, edges)?;
    info!(
        users = users.len(),
        follows = edges.len(),
        dir = %dir.display(),
        "staged import tables"
    );
    Ok(paths)
}

pub fn write_users(path: &Path, users: &[UserEntity]) -> Result<(), ImportError> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(USERS_HEADER)?;
    for user in users {
        writer.write_record([&user.user_id, &user.username, &user.email, &user.name])?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_follows(path: &Path, edges: &[FollowEdge]) -> Result<(), ImportError> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(FOLLOWS_HEADER)?;
    for edge in edges {
        let count = edge.message_count.to_string();
        writer.write_record([edge.source.as_str(), edge.target.as_str(), count.as_str()])?;
    }
    writer.flush()?;
    Ok(())
}

/// Streams `users.csv` back as validated records.
pub fn read_users(
    path: &Path,
) -> Result<impl Iterator<Item = Result<UserEntity, ImportError>> + use<>, ImportError> {
    let reader = open_staged(path, &USERS_HEADER)?;
    let path = path.to_path_buf();
    Ok(reader.into_records().enumerate().map(
        move |(i, record)| -> Result<UserEntity, ImportError> {
            let record = record?;
            UserEntity::new(&record[0], &record[1], &record[2], &record[3])
                .map_err(|e| bad_row(&path, i, e.to_string()))
        },
    ))
}

/// Streams `follows.csv` back as validated records.
pub fn read_follows(
    path: &Path,
) -> Result<impl Iterator<Item = Result<FollowEdge, ImportError>> + use<>, ImportError> {
    let reader = open_staged(path, &FOLLOWS_HEADER)?;
    let path = path.to_path_buf();
    Ok(reader.into_records().enumerate().map(
        move |(i, record)| -> Result<FollowEdge, ImportError> {
            let record = record?;
            let count = record[2].parse::<u64>().map_err(|_| {
                bad_row(&path, i, format!("messageCount {:?} is not an integer", &record[2]))
            })?;
            FollowEdge::new(&record[0], &record[1], count)
                .map_err(|e| bad_row(&path, i, e.to_string()))
        },
    ))
}

fn open_staged(path: &Path, expected: &[&str]) -> Result<csv::Reader<fs::File>, ImportError> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?;
    if !headers.iter().eq(expected.iter().copied()) {
        return Err(ImportError::Staging {
            path: path.to_path_buf(),
            reason: format!("expected header {expected:?}, found {headers:?}"),
        });
    }
    Ok(reader)
}

fn bad_row(path: &Path, index: usize, reason: String) -> ImportError {
    ImportError::Staging {
        path: path.to_path_buf(),
        // header is row 1
        reason: format!("row {}: {reason}", index + 2),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> Vec<UserEntity> {
        vec![
            UserEntity::new("1", "user_1", "user_1@college.edu", "User_1").unwrap(),
            UserEntity::new("2", "user_2", "user_2@college.edu", "User_2").unwrap(),
        ]
    }

    fn edges() -> Vec<FollowEdge> {
        vec![
            FollowEdge::new("1", "2", 2).unwrap(),
            FollowEdge::new("2", "1", 0).unwrap(),
        ]
    }

    #[test]
    fn test_files_have_headers() {
        let dir = tempfile::tempdir().unwrap();
        let paths = stage(dir.path(), &users(), &edges()).unwrap();

        let users_csv = fs::read_to_string(&paths.users).unwrap();
        let follows_csv = fs::read_to_string(&paths.follows).unwrap();
        assert_eq!(
            "userId,username,email,name\n1,user_1,user_1@college.edu,User_1\n2,user_2,user_2@college.edu,User_2\n",
            users_csv
        );
        assert_eq!("source,target,messageCount\n1,2,2\n2,1,0\n", follows_csv);
    }

    #[test]
    fn test_stage_creates_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let paths = stage(&nested, &users(), &edges()).unwrap();
        assert!(paths.users.exists());
        assert!(paths.follows.exists());
    }

    #[test]
    fn test_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let paths = stage(dir.path(), &users(), &edges()).unwrap();

        let staged_users = read_users(&paths.users)
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        let staged_edges = read_follows(&paths.follows)
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(users(), staged_users);
        assert_eq!(edges(), staged_edges);
    }

    #[test]
    fn test_wrong_header_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(USERS_FILE);
        fs::write(&path, "userId,name,email\n1,User_1,a@b\n").unwrap();

        assert!(matches!(
            read_users(&path),
            Err(ImportError::Staging { .. })
        ));
    }

    #[test]
    fn test_bad_count_reports_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(FOLLOWS_FILE);
        fs::write(&path, "source,target,messageCount\n1,2,3\n2,1,many\n").unwrap();

        let rows = read_follows(&path).unwrap().collect::<Vec<_>>();
        assert!(rows[0].is_ok());
        match &rows[1] {
            Err(ImportError::Staging { reason, .. }) => assert!(reason.starts_with("row 3:")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_empty_field_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(USERS_FILE);
        fs::write(&path, "userId,username,email,name\n1,,a@b,A\n").unwrap();

        let rows = read_users(&path).unwrap().collect::<Vec<_>>();
        assert!(matches!(rows[0], Err(ImportError::Staging { .. })));
    }
}
