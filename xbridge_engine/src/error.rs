//! The engine's error taxonomy: one distinct variant per named failure,
//! each carrying its own fixed message through `thiserror`'s `Display`
//! impl rather than a separate string-lookup table.

use thiserror::Error;

/// Errors the engine can report, from `Engine::init` through runtime.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum EngineError {
    #[error("failed to initialize the USB context")]
    UsbInit,

    #[error("no device found at the given bus/address")]
    DeviceNotFound,

    #[error("failed to set the USB configuration")]
    SetConfiguration,

    #[error("failed to claim a USB interface")]
    ClaimInterface,

    #[error("failed to set a USB alternate setting")]
    SetAltSetting,

    #[error("failed to clear a USB endpoint halt")]
    ClearEndpoint,

    #[error("failed to prepare a USB transfer")]
    PrepareTransfer,

    #[error("collaborator did not supply `{0}`")]
    MissingCollaboratorHook(&'static str),

    #[error("failed to spawn an engine thread")]
    ThreadSpawn,

    #[error("invalid engine configuration: {0}")]
    InvalidConfig(&'static str),

    #[error("{0}")]
    Generic(String),
}

/// Result type alias for engine operations.
pub type Result<T> = core::result::Result<T, EngineError>;

/// Returns the fixed diagnostic string for an error code. Just
/// `ToString`/`Display` under the hood, since `thiserror` already
/// generates it.
pub fn get_err_str(err: &EngineError) -> String {
    err.to_string()
}
