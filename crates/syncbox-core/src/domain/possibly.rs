//! Change-result wrappers
//!
//! Values produced by batch lookups and queue intake. Each wrapper is only
//! constructible with all of its required parts, so a wrapper that exists is
//! always valid. The "no result here" case is a separate type,
//! [`ResultSlot`], used wherever a collection is pre-sized before its results
//! arrive.
//!
//! | Wrapper                                                   | Carries |
//! |-----------------------------------------------------------|---------|
//! | [`PossiblyChangedFileChange`]                             | change, changed flag, order |
//! | [`PossiblyStreamableFileChange`]                          | change, optional stream, order |
//! | [`PossiblyStreamableAndPossiblyChangedFileChange`]        | change, changed flag, optional stream, order |
//! | [`PossiblyStreamableAndPossiblyChangedFileChangeWithError`] | all of the above plus the failure |

use std::fmt;

use super::errors::DomainError;
use super::failure::TransferFailure;
use super::file_change::FileChange;
use super::newtypes::ResultOrder;
use super::stream_context::StreamContext;

/// Anything tagged with the index of the request that produced it
pub trait HasResultOrder {
    /// Index of the originating request
    fn result_order(&self) -> ResultOrder;
}

impl<T: HasResultOrder, E: HasResultOrder> HasResultOrder for Result<T, E> {
    fn result_order(&self) -> ResultOrder {
        match self {
            Ok(value) => value.result_order(),
            Err(err) => err.result_order(),
        }
    }
}

// ============================================================================
// ResultSlot
// ============================================================================

/// A cell that either holds a result or is still empty
///
/// `ResultSlot::default()` is empty. Reading an empty slot fails with
/// [`DomainError::InvalidState`].
pub enum ResultSlot<T> {
    /// No result has been stored
    Empty,
    /// A result is present
    Filled(T),
}

impl<T> Default for ResultSlot<T> {
    fn default() -> Self {
        ResultSlot::Empty
    }
}

impl<T> ResultSlot<T> {
    /// Returns true if the slot holds a result
    pub fn is_valid(&self) -> bool {
        matches!(self, ResultSlot::Filled(_))
    }

    /// Stores a result, returning the previous one if any
    pub fn fill(&mut self, value: T) -> Option<T> {
        match std::mem::replace(self, ResultSlot::Filled(value)) {
            ResultSlot::Filled(previous) => Some(previous),
            ResultSlot::Empty => None,
        }
    }

    /// Borrows the result
    ///
    /// # Errors
    /// Returns `DomainError::InvalidState` if the slot is empty
    pub fn get(&self) -> Result<&T, DomainError> {
        match self {
            ResultSlot::Filled(value) => Ok(value),
            ResultSlot::Empty => Err(Self::invalid()),
        }
    }

    /// Mutably borrows the result
    ///
    /// # Errors
    /// Returns `DomainError::InvalidState` if the slot is empty
    pub fn get_mut(&mut self) -> Result<&mut T, DomainError> {
        match self {
            ResultSlot::Filled(value) => Ok(value),
            ResultSlot::Empty => Err(Self::invalid()),
        }
    }

    /// Consumes the slot, returning the result
    ///
    /// # Errors
    /// Returns `DomainError::InvalidState` if the slot is empty
    pub fn into_inner(self) -> Result<T, DomainError> {
        match self {
            ResultSlot::Filled(value) => Ok(value),
            ResultSlot::Empty => Err(Self::invalid()),
        }
    }

    /// Converts into an `Option`
    pub fn into_option(self) -> Option<T> {
        match self {
            ResultSlot::Filled(value) => Some(value),
            ResultSlot::Empty => None,
        }
    }

    fn invalid() -> DomainError {
        DomainError::InvalidState {
            type_name: short_type_name::<T>(),
        }
    }
}

impl<T> From<T> for ResultSlot<T> {
    fn from(value: T) -> Self {
        ResultSlot::Filled(value)
    }
}

impl<T: fmt::Debug> fmt::Debug for ResultSlot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultSlot::Empty => f.write_str("Empty"),
            ResultSlot::Filled(value) => f.debug_tuple("Filled").field(value).finish(),
        }
    }
}

fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

// ============================================================================
// PossiblyChangedFileChange
// ============================================================================

/// A change plus whether it differs from the last known state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PossiblyChangedFileChange {
    result_order: ResultOrder,
    changed: bool,
    file_change: FileChange,
}

impl PossiblyChangedFileChange {
    /// Creates the wrapper
    pub fn new(result_order: ResultOrder, changed: bool, file_change: FileChange) -> Self {
        Self {
            result_order,
            changed,
            file_change,
        }
    }

    /// Returns true if the change differs from the last known state
    pub fn changed(&self) -> bool {
        self.changed
    }

    /// Returns the wrapped change
    pub fn file_change(&self) -> &FileChange {
        &self.file_change
    }

    /// Unwraps into the change
    pub fn into_file_change(self) -> FileChange {
        self.file_change
    }
}

impl HasResultOrder for PossiblyChangedFileChange {
    fn result_order(&self) -> ResultOrder {
        self.result_order
    }
}

// ============================================================================
// PossiblyStreamableFileChange
// ============================================================================

/// A change with the stream its transfer reads from, if it has one
#[derive(Debug)]
pub struct PossiblyStreamableFileChange {
    result_order: ResultOrder,
    file_change: FileChange,
    stream: Option<StreamContext>,
}

impl PossiblyStreamableFileChange {
    /// Creates the wrapper
    pub fn new(
        result_order: ResultOrder,
        file_change: FileChange,
        stream: Option<StreamContext>,
    ) -> Self {
        Self {
            result_order,
            file_change,
            stream,
        }
    }

    /// Returns the wrapped change
    pub fn file_change(&self) -> &FileChange {
        &self.file_change
    }

    /// Returns the stream, if any
    pub fn stream(&self) -> Option<&StreamContext> {
        self.stream.as_ref()
    }

    /// Splits into change and stream
    pub fn into_parts(self) -> (FileChange, Option<StreamContext>) {
        (self.file_change, self.stream)
    }
}

impl HasResultOrder for PossiblyStreamableFileChange {
    fn result_order(&self) -> ResultOrder {
        self.result_order
    }
}

// ============================================================================
// PossiblyStreamableAndPossiblyChangedFileChange
// ============================================================================

/// A change with its changed flag and optional stream
#[derive(Debug)]
pub struct PossiblyStreamableAndPossiblyChangedFileChange {
    result_order: ResultOrder,
    changed: bool,
    file_change: FileChange,
    stream: Option<StreamContext>,
}

impl PossiblyStreamableAndPossiblyChangedFileChange {
    /// Creates the wrapper
    pub fn new(
        result_order: ResultOrder,
        changed: bool,
        file_change: FileChange,
        stream: Option<StreamContext>,
    ) -> Self {
        Self {
            result_order,
            changed,
            file_change,
            stream,
        }
    }

    /// Returns true if the change differs from the last known state
    pub fn changed(&self) -> bool {
        self.changed
    }

    /// Returns the wrapped change
    pub fn file_change(&self) -> &FileChange {
        &self.file_change
    }

    /// Returns the stream, if any
    pub fn stream(&self) -> Option<&StreamContext> {
        self.stream.as_ref()
    }

    /// Attaches a failure, producing the error variant
    pub fn with_error(
        self,
        error: TransferFailure,
    ) -> PossiblyStreamableAndPossiblyChangedFileChangeWithError {
        PossiblyStreamableAndPossiblyChangedFileChangeWithError { inner: self, error }
    }

    /// Splits into change and stream
    pub fn into_parts(self) -> (FileChange, Option<StreamContext>) {
        (self.file_change, self.stream)
    }
}

impl HasResultOrder for PossiblyStreamableAndPossiblyChangedFileChange {
    fn result_order(&self) -> ResultOrder {
        self.result_order
    }
}

impl From<PossiblyStreamableAndPossiblyChangedFileChange> for PossiblyChangedFileChange {
    fn from(value: PossiblyStreamableAndPossiblyChangedFileChange) -> Self {
        let PossiblyStreamableAndPossiblyChangedFileChange {
            result_order,
            changed,
            file_change,
            stream,
        } = value;
        drop(stream);
        PossiblyChangedFileChange::new(result_order, changed, file_change)
    }
}

// ============================================================================
// PossiblyStreamableAndPossiblyChangedFileChangeWithError
// ============================================================================

/// A result whose lookup or transfer failed
///
/// The failure is always present alongside the change it belongs to.
#[derive(Debug)]
pub struct PossiblyStreamableAndPossiblyChangedFileChangeWithError {
    inner: PossiblyStreamableAndPossiblyChangedFileChange,
    error: TransferFailure,
}

impl PossiblyStreamableAndPossiblyChangedFileChangeWithError {
    /// Creates the wrapper
    pub fn new(
        result_order: ResultOrder,
        changed: bool,
        file_change: FileChange,
        stream: Option<StreamContext>,
        error: TransferFailure,
    ) -> Self {
        PossiblyStreamableAndPossiblyChangedFileChange::new(
            result_order,
            changed,
            file_change,
            stream,
        )
        .with_error(error)
    }

    /// Returns true if the change differs from the last known state
    pub fn changed(&self) -> bool {
        self.inner.changed
    }

    /// Returns the wrapped change
    pub fn file_change(&self) -> &FileChange {
        &self.inner.file_change
    }

    /// Returns the stream, if any
    pub fn stream(&self) -> Option<&StreamContext> {
        self.inner.stream.as_ref()
    }

    /// Returns the failure
    pub fn error(&self) -> &TransferFailure {
        &self.error
    }

    /// Splits into the successful shape and the failure
    pub fn into_parts(
        self,
    ) -> (
        PossiblyStreamableAndPossiblyChangedFileChange,
        TransferFailure,
    ) {
        (self.inner, self.error)
    }
}

impl HasResultOrder for PossiblyStreamableAndPossiblyChangedFileChangeWithError {
    fn result_order(&self) -> ResultOrder {
        self.inner.result_order
    }
}

impl fmt::Display for PossiblyStreamableAndPossiblyChangedFileChangeWithError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.inner.file_change, self.error)
    }
}

// ============================================================================
// Tests
// ============================================================================
