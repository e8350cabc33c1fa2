//! Domain entities and business logic
//!
//! This module contains the core domain types for Syncbox:
//! - Newtypes for identifiers and validated values
//! - The `FileChange` entity and its transfer direction
//! - `StreamContext`, the scoped owner of a transfer stream
//! - Result wrappers and `ResultSlot`
//! - The transfer failure taxonomy and retry policy
//! - Domain-specific error types

pub mod errors;
pub mod failure;
pub mod file_change;
pub mod newtypes;
pub mod possibly;
pub mod stream_context;

// Re-export commonly used types
pub use errors::DomainError;
pub use failure::{FailureKind, RetryDecision, RetryPolicy, TransferFailure};
pub use file_change::{ChangeKind, FileChange, TransferDirection};
pub use newtypes::*;
pub use possibly::{
    HasResultOrder, PossiblyChangedFileChange, PossiblyStreamableAndPossiblyChangedFileChange,
    PossiblyStreamableAndPossiblyChangedFileChangeWithError, PossiblyStreamableFileChange,
    ResultSlot,
};
pub use stream_context::{StreamContext, StreamLease, TransferSource, TransferStream};
