//! CSV/JSON file storage implementation
//!
//! Every table lives in its own file under the data directory:
//!
//! ```text
//! {data_dir}/
//! ├── users.log.csv             # crawl log
//! ├── user_data.csv             # profiles
//! ├── friends_connections.csv   # friendship edges
//! ├── user_groups.json          # group memberships
//! └── config.sha256             # hash of the configuration last crawled with
//! ```
//!
//! Saves rewrite the whole file through a temporary file and a rename, so a
//! crash mid-write leaves the previous version intact.

use crate::profile::UserProfile;
use crate::state::LogEntry;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{Connection, ConnectionTable, GroupMemberships, LogTable, ProfileTable};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};

pub const LOG_FILE: &str = "users.log.csv";
pub const PROFILES_FILE: &str = "user_data.csv";
pub const CONNECTIONS_FILE: &str = "friends_connections.csv";
pub const GROUPS_FILE: &str = "user_groups.json";
pub const CONFIG_HASH_FILE: &str = "config.sha256";

const LOG_COLUMNS: &[&str] = &[
    "user_id",
    "is_closed",
    "data_parsed",
    "friends_parsed",
    "groups_parsed",
];

const PROFILE_COLUMNS: &[&str] = &[
    "user_id",
    "is_closed",
    "sex",
    "bdate",
    "verified",
    "city",
    "country",
    "university_name",
    "faculty_name",
    "last_seen",
    "can_write_private_message",
    "can_send_friend_request",
    "followers_count",
    "friends_count",
];

const CONNECTION_COLUMNS: &[&str] = &["user_a", "user_b"];

/// File-backed storage rooted at a data directory
#[derive(Debug, Clone)]
pub struct FileStorage {
    data_dir: PathBuf,
    /// Whether loading a missing table writes it out empty
    create_missing: bool,
}

impl FileStorage {
    /// Opens the storage for crawling, creating the data directory if needed
    pub fn open(data_dir: impl Into<PathBuf>) -> StorageResult<Self> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir).map_err(|source| StorageError::Io {
            path: data_dir.clone(),
            source,
        })?;
        Ok(Self {
            data_dir,
            create_missing: true,
        })
    }

    /// Opens a data directory for reading only
    ///
    /// Missing tables load as empty and nothing is created on disk.
    pub fn inspect(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            create_missing: false,
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Full path of a table file
    pub fn path(&self, file: &str) -> PathBuf {
        self.data_dir.join(file)
    }

    /// Writes bytes atomically (write to temp, then rename)
    fn write_bytes(&self, file: &str, bytes: &[u8]) -> StorageResult<()> {
        let path = self.path(file);
        let tmp = path.with_extension("tmp");
        let io_error = |source| StorageError::Io {
            path: path.clone(),
            source,
        };

        std::fs::write(&tmp, bytes).map_err(io_error)?;
        std::fs::rename(&tmp, &path).map_err(io_error)?;
        Ok(())
    }

    fn write_csv<T: Serialize>(&self, file: &str, columns: &[&str], rows: &[T]) -> StorageResult<()> {
        let csv_error = |source| StorageError::Csv {
            path: self.path(file),
            source,
        };

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());
        writer.write_record(columns).map_err(csv_error)?;
        for row in rows {
            writer.serialize(row).map_err(csv_error)?;
        }

        let bytes = writer.into_inner().map_err(|e| StorageError::Io {
            path: self.path(file),
            source: e.into_error(),
        })?;
        self.write_bytes(file, &bytes)
    }

    /// Reads every row of a CSV table, or `None` if the file does not exist
    fn read_csv<T: DeserializeOwned>(&self, file: &str) -> StorageResult<Option<Vec<T>>> {
        let path = self.path(file);
        if !path.exists() {
            return Ok(None);
        }

        let csv_error = |source| StorageError::Csv {
            path: path.clone(),
            source,
        };

        let mut reader = csv::Reader::from_path(&path).map_err(csv_error)?;
        let rows = reader
            .deserialize()
            .collect::<Result<Vec<T>, _>>()
            .map_err(csv_error)?;
        Ok(Some(rows))
    }

    /// Returns an empty table for a missing file, writing it out unless inspecting
    fn create_empty<T>(
        &self,
        file: &str,
        empty: T,
        save: impl FnOnce(&Self, &T) -> StorageResult<()>,
    ) -> StorageResult<T> {
        if self.create_missing {
            tracing::debug!("Creating empty {}", file);
            save(self, &empty)?;
        }
        Ok(empty)
    }

    fn write_json<T: Serialize>(&self, file: &str, value: &T) -> StorageResult<()> {
        let bytes = serde_json::to_vec_pretty(value).map_err(|source| StorageError::Json {
            path: self.path(file),
            source,
        })?;
        self.write_bytes(file, &bytes)
    }

    fn read_json<T: DeserializeOwned>(&self, file: &str) -> StorageResult<Option<T>> {
        let path = self.path(file);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StorageError::Io { path, source }),
        };

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| StorageError::Json { path, source })
    }
}

impl Storage for FileStorage {
    // ===== Crawl Log =====

    fn load_log(&self) -> StorageResult<LogTable> {
        match self.read_csv::<LogEntry>(LOG_FILE)? {
            Some(rows) => Ok(LogTable::from_entries(rows)),
            None => self.create_empty(LOG_FILE, LogTable::new(), Self::save_log),
        }
    }

    fn save_log(&self, log: &LogTable) -> StorageResult<()> {
        self.write_csv(LOG_FILE, LOG_COLUMNS, log.entries())
    }

    // ===== Profiles =====

    fn load_profiles(&self) -> StorageResult<ProfileTable> {
        match self.read_csv::<UserProfile>(PROFILES_FILE)? {
            Some(rows) => Ok(ProfileTable::from_rows(rows)),
            None => self.create_empty(PROFILES_FILE, ProfileTable::new(), Self::save_profiles),
        }
    }

    fn save_profiles(&self, profiles: &ProfileTable) -> StorageResult<()> {
        self.write_csv(PROFILES_FILE, PROFILE_COLUMNS, profiles.rows())
    }

    // ===== Friend Connections =====

    fn load_connections(&self) -> StorageResult<ConnectionTable> {
        match self.read_csv::<Connection>(CONNECTIONS_FILE)? {
            Some(rows) => Ok(ConnectionTable::from_edges(rows)),
            None => self.create_empty(CONNECTIONS_FILE, ConnectionTable::new(), Self::save_connections),
        }
    }

    fn save_connections(&self, connections: &ConnectionTable) -> StorageResult<()> {
        self.write_csv(CONNECTIONS_FILE, CONNECTION_COLUMNS, connections.edges())
    }

    // ===== Group Memberships =====

    fn load_group_memberships(&self) -> StorageResult<GroupMemberships> {
        match self.read_json::<GroupMemberships>(GROUPS_FILE)? {
            Some(groups) => Ok(groups),
            None => self.create_empty(GROUPS_FILE, GroupMemberships::new(), Self::save_group_memberships),
        }
    }

    fn save_group_memberships(&self, groups: &GroupMemberships) -> StorageResult<()> {
        self.write_json(GROUPS_FILE, groups)
    }

    // ===== Crawl Metadata =====

    fn load_config_hash(&self) -> StorageResult<Option<String>> {
        let path = self.path(CONFIG_HASH_FILE);
        match std::fs::read_to_string(&path) {
            Ok(hash) => Ok(Some(hash.trim().to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Io { path, source }),
        }
    }

    fn save_config_hash(&self, hash: &str) -> StorageResult<()> {
        self.write_bytes(CONFIG_HASH_FILE, format!("{}\n", hash).as_bytes())
    }
}
