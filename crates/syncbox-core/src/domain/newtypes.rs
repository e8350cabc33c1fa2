//! Domain newtypes with validation
//!
//! This module provides strongly-typed wrappers for identifiers and values
//! that flow through the change-tracking pipeline. Each newtype ensures data
//! validity at construction time.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::DomainError;

// ============================================================================
// ChangeId
// ============================================================================

/// Local identity of a single detected change
///
/// Assigned when the change is first observed and kept for its whole life
/// in the queue, the persistent store and the failed-changes queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeId(Uuid);

impl ChangeId {
    /// Create a new random ChangeId
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a ChangeId from an existing UUID
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID value
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ChangeId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for ChangeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ChangeId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| DomainError::InvalidId(format!("Invalid ChangeId: {e}")))
    }
}

impl From<Uuid> for ChangeId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

// ============================================================================
// Server-side identifiers
// ============================================================================

/// Server-assigned event identifier
///
/// Only exists once the metadata server has acknowledged a change, so the
/// value is always strictly positive. The "no event yet" case is expressed
/// as `Option<EventId>` by the types that hold one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct EventId(i64);

impl EventId {
    /// Create an EventId, rejecting zero and negative values
    ///
    /// # Errors
    /// Returns `DomainError::InvalidEventId` if `id <= 0`
    pub fn new(id: i64) -> Result<Self, DomainError> {
        if id <= 0 {
            return Err(DomainError::InvalidEventId(format!(
                "event id must be positive, got {id}"
            )));
        }
        Ok(Self(id))
    }

    /// Get the inner i64 value
    #[must_use]
    pub const fn as_i64(&self) -> i64 {
        self.0
    }
}

impl Display for EventId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<i64> for EventId {
    type Error = DomainError;

    fn try_from(id: i64) -> Result<Self, Self::Error> {
        Self::new(id)
    }
}

impl From<EventId> for i64 {
    fn from(id: EventId) -> Self {
        id.0
    }
}

/// Identifier of a syncbox (a synchronized folder / account scope)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncboxId(i64);

impl SyncboxId {
    /// Create a SyncboxId from an i64 value
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner i64 value
    #[must_use]
    pub const fn as_i64(&self) -> i64 {
        self.0
    }
}

impl Display for SyncboxId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for SyncboxId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

// ============================================================================
// Md5Hash
// ============================================================================

/// MD5 digest of a file's content
///
/// Always exactly 16 bytes. Serialized as a lowercase hex string.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Md5Hash([u8; 16]);

impl Md5Hash {
    /// Length of an MD5 digest in bytes
    pub const LEN: usize = 16;

    /// Create an Md5Hash from a byte slice
    ///
    /// # Errors
    /// Returns `DomainError::InvalidHash` unless `bytes.len() == 16`
    pub fn from_slice(bytes: &[u8]) -> Result<Self, DomainError> {
        let digest: [u8; 16] = bytes.try_into().map_err(|_| {
            DomainError::InvalidHash(format!(
                "MD5 must be exactly {} bytes, got {} bytes",
                Self::LEN,
                bytes.len()
            ))
        })?;
        Ok(Self(digest))
    }

    /// Parse a 32-character hex string
    ///
    /// # Errors
    /// Returns `DomainError::InvalidHash` if the string is not valid hex or
    /// does not decode to 16 bytes
    pub fn from_hex(hex: &str) -> Result<Self, DomainError> {
        if hex.len() != Self::LEN * 2 || !hex.is_ascii() {
            return Err(DomainError::InvalidHash(format!(
                "MD5 hex must be {} characters: {hex}",
                Self::LEN * 2
            )));
        }

        let mut digest = [0u8; 16];
        for (i, byte) in digest.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16)
                .map_err(|_| DomainError::InvalidHash(format!("MD5 is not valid hex: {hex}")))?;
        }
        Ok(Self(digest))
    }

    /// Compute the MD5 digest of in-memory content
    #[must_use]
    pub fn compute(data: &[u8]) -> Self {
        Self(md5::compute(data).0)
    }

    /// Get the raw digest bytes
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Lowercase hex representation
    #[must_use]
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Debug for Md5Hash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Md5Hash({})", self.to_hex())
    }
}

impl Display for Md5Hash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Md5Hash {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl TryFrom<String> for Md5Hash {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_hex(&s)
    }
}

impl From<Md5Hash> for String {
    fn from(hash: Md5Hash) -> Self {
        hash.to_hex()
    }
}

impl TryFrom<&[u8]> for Md5Hash {
    type Error = DomainError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        Self::from_slice(bytes)
    }
}

// ============================================================================
// ResultOrder
// ============================================================================

/// Index of the request that produced a batch result
///
/// Batch lookups complete in arbitrary order; consumers sort by this key to
/// match each result back to its request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultOrder(usize);

impl ResultOrder {
    /// Create a ResultOrder for the request at `index`
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Get the request index
    #[must_use]
    pub const fn index(&self) -> usize {
        self.0
    }
}

impl Display for ResultOrder {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================
