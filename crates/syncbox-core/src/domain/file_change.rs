//! FileChange domain entity
//!
//! A [`FileChange`] records one detected filesystem mutation together with
//! the metadata the sync engine needs to process it: content hash, size,
//! timestamps, the server event id once assigned, and the per-change failure
//! counters used by the retry bookkeeping.
//!
//! ## Lifecycle
//!
//! ```text
//!   watcher detects ──► FileChange::new ──► server ack ──► set_event_id
//!                                                              │
//!                        archived / discarded ◄── completed ◄──┘
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::{ChangeId, EventId, Md5Hash};

// ============================================================================
// ChangeKind
// ============================================================================

/// Kind of filesystem mutation
///
/// A rename always carries the path it was renamed from, so a rename
/// without an old path cannot be constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum ChangeKind {
    /// A new file or folder appeared
    Created,
    /// File content or metadata changed
    Modified,
    /// The file or folder was removed
    Deleted,
    /// The file or folder was moved
    Renamed {
        /// Path before the rename
        old_path: PathBuf,
    },
}

impl ChangeKind {
    /// Returns the kind name (without rename details)
    pub fn name(&self) -> &'static str {
        match self {
            ChangeKind::Created => "created",
            ChangeKind::Modified => "modified",
            ChangeKind::Deleted => "deleted",
            ChangeKind::Renamed { .. } => "renamed",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Renamed { old_path } => write!(f, "renamed from {}", old_path.display()),
            other => f.write_str(other.name()),
        }
    }
}

// ============================================================================
// TransferDirection
// ============================================================================

/// Which way content flows for a change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferDirection {
    /// Local change pushed to the server
    Upload,
    /// Server change pulled to the local filesystem
    Download,
}

impl TransferDirection {
    /// Returns the direction name
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferDirection::Upload => "upload",
            TransferDirection::Download => "download",
        }
    }
}

impl fmt::Display for TransferDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TransferDirection {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upload" => Ok(TransferDirection::Upload),
            "download" => Ok(TransferDirection::Download),
            other => Err(DomainError::ValidationFailed(format!(
                "Unknown transfer direction: {other}"
            ))),
        }
    }
}

// ============================================================================
// FileChange
// ============================================================================

/// A single detected filesystem mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    id: ChangeId,
    kind: ChangeKind,
    path: PathBuf,
    direction: TransferDirection,
    is_folder: bool,
    md5: Option<Md5Hash>,
    size: Option<u64>,
    event_id: Option<EventId>,
    last_modified: Option<DateTime<Utc>>,
    created_at: Option<DateTime<Utc>>,
    detected_at: DateTime<Utc>,
    failure_counter: u8,
    not_found_counter: u8,
}

impl FileChange {
    /// Creates a change for an absolute path
    ///
    /// # Errors
    /// Returns `DomainError::InvalidPath` if `path` (or the rename source)
    /// is not absolute
    pub fn new(
        kind: ChangeKind,
        path: impl Into<PathBuf>,
        direction: TransferDirection,
    ) -> Result<Self, DomainError> {
        let path = path.into();
        Self::validate_path(&path)?;
        if let ChangeKind::Renamed { old_path } = &kind {
            Self::validate_path(old_path)?;
        }

        Ok(Self {
            id: ChangeId::new(),
            kind,
            path,
            direction,
            is_folder: false,
            md5: None,
            size: None,
            event_id: None,
            last_modified: None,
            created_at: None,
            detected_at: Utc::now(),
            failure_counter: 0,
            not_found_counter: 0,
        })
    }

    /// Creates a rename from `old_path` to `new_path`
    ///
    /// # Errors
    /// Returns `DomainError::InvalidPath` if either path is not absolute
    pub fn renamed(
        old_path: impl Into<PathBuf>,
        new_path: impl Into<PathBuf>,
        direction: TransferDirection,
    ) -> Result<Self, DomainError> {
        Self::new(
            ChangeKind::Renamed {
                old_path: old_path.into(),
            },
            new_path,
            direction,
        )
    }

    fn validate_path(path: &Path) -> Result<(), DomainError> {
        if path.as_os_str().is_empty() {
            return Err(DomainError::InvalidPath("Path cannot be empty".to_string()));
        }
        if !path.is_absolute() {
            return Err(DomainError::InvalidPath(format!(
                "Path must be absolute: {}",
                path.display()
            )));
        }
        Ok(())
    }

    // --- builder-style setters ---

    /// Marks the change as concerning a folder
    pub fn with_folder(mut self, is_folder: bool) -> Self {
        self.is_folder = is_folder;
        self
    }

    /// Sets the content size in bytes
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    /// Sets the content hash
    pub fn with_md5(mut self, md5: Md5Hash) -> Self {
        self.md5 = Some(md5);
        self
    }

    /// Sets the last-modified and creation timestamps
    pub fn with_times(
        mut self,
        last_modified: Option<DateTime<Utc>>,
        created_at: Option<DateTime<Utc>>,
    ) -> Self {
        self.last_modified = last_modified;
        self.created_at = created_at;
        self
    }

    // --- accessors ---

    /// Returns the local identity of this change
    pub fn id(&self) -> &ChangeId {
        &self.id
    }

    /// Returns the kind of mutation
    pub fn kind(&self) -> &ChangeKind {
        &self.kind
    }

    /// Returns the (new) path of the change
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the previous path for renames
    pub fn old_path(&self) -> Option<&Path> {
        match &self.kind {
            ChangeKind::Renamed { old_path } => Some(old_path),
            _ => None,
        }
    }

    /// Returns the transfer direction
    pub fn direction(&self) -> TransferDirection {
        self.direction
    }

    /// Returns true if the change concerns a folder
    pub fn is_folder(&self) -> bool {
        self.is_folder
    }

    /// Returns the content hash, if known
    pub fn md5(&self) -> Option<&Md5Hash> {
        self.md5.as_ref()
    }

    /// Returns the content size, if known
    pub fn size(&self) -> Option<u64> {
        self.size
    }

    /// Returns the server event id, once assigned
    pub fn event_id(&self) -> Option<EventId> {
        self.event_id
    }

    /// Returns the last-modified timestamp
    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        self.last_modified
    }

    /// Returns the creation timestamp
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    /// Returns when the change was detected
    pub fn detected_at(&self) -> DateTime<Utc> {
        self.detected_at
    }

    /// Returns how many generic failures this change has accumulated
    pub fn failure_counter(&self) -> u8 {
        self.failure_counter
    }

    /// Returns how many not-found failures this change has accumulated
    pub fn not_found_counter(&self) -> u8 {
        self.not_found_counter
    }

    // --- mutation ---

    /// Sets (or clears) the content hash from raw bytes
    ///
    /// # Errors
    /// Returns `DomainError::InvalidHash` if the bytes are not exactly
    /// 16 long; the current hash is left untouched in that case
    pub fn set_md5(&mut self, bytes: Option<&[u8]>) -> Result<(), DomainError> {
        self.md5 = match bytes {
            Some(bytes) => Some(Md5Hash::from_slice(bytes)?),
            None => None,
        };
        Ok(())
    }

    /// Records the event id assigned by the server
    pub fn set_event_id(&mut self, event_id: EventId) {
        self.event_id = Some(event_id);
    }

    /// Increments the generic failure counter, returning the new value
    pub fn record_failure(&mut self) -> u8 {
        self.failure_counter = self.failure_counter.saturating_add(1);
        self.failure_counter
    }

    /// Increments the not-found counter, returning the new value
    pub fn record_not_found(&mut self) -> u8 {
        self.not_found_counter = self.not_found_counter.saturating_add(1);
        self.not_found_counter
    }

    /// Restores persisted failure counters
    pub fn restore_counters(&mut self, failure_counter: u8, not_found_counter: u8) {
        self.failure_counter = failure_counter;
        self.not_found_counter = not_found_counter;
    }

    /// Restores the persisted identity of a change loaded from storage
    pub fn restore_id(&mut self, id: ChangeId) {
        self.id = id;
    }

    /// Returns true if `current` (the latest known local state for the same
    /// path) differs from this change in kind, folder flag, size or hash
    pub fn differs_from(&self, current: &FileChange) -> bool {
        self.kind != current.kind
            || self.is_folder != current.is_folder
            || self.size != current.size
            || self.md5 != current.md5
    }
}

impl fmt::Display for FileChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.kind, self.path.display(), self.direction)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn modified(path: &str) -> FileChange {
        FileChange::new(ChangeKind::Modified, path, TransferDirection::Upload).unwrap()
    }

    #[test]
    fn test_new_requires_absolute_path() {
        let result = FileChange::new(ChangeKind::Created, "a/b.txt", TransferDirection::Upload);
        assert!(matches!(result, Err(DomainError::InvalidPath(_))));

        let result = FileChange::new(ChangeKind::Created, "", TransferDirection::Upload);
        assert!(matches!(result, Err(DomainError::InvalidPath(_))));
    }

    #[test]
    fn test_new_defaults() {
        let change = modified("/a/b.txt");
        assert_eq!(change.path(), Path::new("/a/b.txt"));
        assert_eq!(change.kind(), &ChangeKind::Modified);
        assert!(change.old_path().is_none());
        assert!(change.md5().is_none());
        assert!(change.event_id().is_none());
        assert_eq!(change.failure_counter(), 0);
        assert_eq!(change.not_found_counter(), 0);
    }

    #[test]
    fn test_renamed_carries_both_paths() {
        let change =
            FileChange::renamed("/a/old.txt", "/a/new.txt", TransferDirection::Upload).unwrap();
        assert_eq!(change.path(), Path::new("/a/new.txt"));
        assert_eq!(change.old_path(), Some(Path::new("/a/old.txt")));
        assert_eq!(change.kind().name(), "renamed");
    }

    #[test]
    fn test_renamed_requires_absolute_old_path() {
        let result = FileChange::renamed("old.txt", "/a/new.txt", TransferDirection::Upload);
        assert!(matches!(result, Err(DomainError::InvalidPath(_))));
    }

    #[test]
    fn test_set_md5_wrong_length_fails_and_keeps_previous() {
        let mut change = modified("/a/b.txt");
        let good: Vec<u8> = (0u8..16).collect();
        change.set_md5(Some(&good)).unwrap();

        let result = change.set_md5(Some(&[1, 2, 3]));
        assert!(matches!(result, Err(DomainError::InvalidHash(_))));
        assert_eq!(change.md5().unwrap().as_bytes().as_slice(), good.as_slice());
    }

    #[test]
    fn test_set_md5_roundtrip_and_clear() {
        let mut change = modified("/a/b.txt");
        let bytes = [0xEEu8; 16];
        change.set_md5(Some(&bytes)).unwrap();
        assert_eq!(change.md5().unwrap().as_bytes(), &bytes);

        change.set_md5(None).unwrap();
        assert!(change.md5().is_none());
    }

    #[test]
    fn test_event_id_assignment() {
        let mut change = modified("/a/b.txt");
        change.set_event_id(EventId::new(17).unwrap());
        assert_eq!(change.event_id().map(|e| e.as_i64()), Some(17));
    }

    #[test]
    fn test_counters_are_independent() {
        let mut change = modified("/a/b.txt");
        assert_eq!(change.record_failure(), 1);
        assert_eq!(change.record_failure(), 2);
        assert_eq!(change.record_not_found(), 1);
        assert_eq!(change.failure_counter(), 2);
        assert_eq!(change.not_found_counter(), 1);
    }

    #[test]
    fn test_counters_saturate() {
        let mut change = modified("/a/b.txt");
        change.restore_counters(u8::MAX, u8::MAX);
        assert_eq!(change.record_failure(), u8::MAX);
        assert_eq!(change.record_not_found(), u8::MAX);
    }

    #[test]
    fn test_differs_from() {
        let a = modified("/a/b.txt").with_size(10).with_md5(Md5Hash::compute(b"x"));
        let same = modified("/a/b.txt").with_size(10).with_md5(Md5Hash::compute(b"x"));
        let other = modified("/a/b.txt").with_size(10).with_md5(Md5Hash::compute(b"y"));

        assert!(!a.differs_from(&same));
        assert!(a.differs_from(&other));
        assert!(a.differs_from(&same.clone().with_folder(true)));
    }

    #[test]
    fn test_serde_roundtrip() {
        let change = FileChange::renamed("/x/1", "/x/2", TransferDirection::Download)
            .unwrap()
            .with_size(5)
            .with_md5(Md5Hash::compute(b"hello"));
        let json = serde_json::to_string(&change).unwrap();
        let parsed: FileChange = serde_json::from_str(&json).unwrap();
        assert_eq!(change, parsed);
    }

    #[test]
    fn test_direction_parse() {
        assert_eq!(
            "download".parse::<TransferDirection>().unwrap(),
            TransferDirection::Download
        );
        assert!("sideways".parse::<TransferDirection>().is_err());
    }

    #[test]
    fn test_display() {
        let change = modified("/a/b.txt");
        assert_eq!(change.to_string(), "modified /a/b.txt (upload)");
    }
}
