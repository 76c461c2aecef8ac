//! Error types for the state container.

use thiserror::Error;

/// Usage errors raised synchronously at the call site.
///
/// Message text is part of the public contract; callers and tests match on
/// it. Clone-path failures never appear here: the clone algorithm resolves
/// them internally and is total.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("the store state has already been initialized; initialize_state() can only be called once, before any state has been set")]
    AlreadyInitialized,

    #[error("pass an object or a function for the state parameter when calling set_state()")]
    InvalidStateParameter,

    #[error("global settings may only be set once, when the application first loads")]
    GlobalSettingsAlreadySet,

    #[error("provide the global settings to apply to the store; an empty value is not a configuration")]
    EmptyGlobalSettings,
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
