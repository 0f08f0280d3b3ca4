//! Error types surfaced by the loader and the handle registry.

use crate::abi::AbiStage;
use crate::handles::Ptr;
use crate::loader::LoadError;

/// Result alias used throughout the crate.
pub type Result<T, E = LoaderError> = core::result::Result<T, E>;

/// Every failure a collaborator can observe.
#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    #[error("failed to load module: {0}")]
    Load(#[from] LoadError),

    /// Only raised when `strict_imports` is set.
    #[error("module import {module}.{name} has no host implementation")]
    MissingImport { module: String, name: String },

    #[error("ABI initialization failed during {stage:?}: {reason}")]
    InitializationFailed {
        stage: AbiStage,
        reason: anyhow::Error,
    },

    #[error("export `{0}` not found")]
    ExportNotFound(String),

    #[error("handle {0:?} was already released")]
    DoubleFree(Ptr),

    #[error("{0} has no live native handle")]
    NotInitialized(&'static str),

    #[error("{0} cannot be constructed without an explicit handle")]
    ResurrectUnsupported(&'static str),

    #[error("indirect function table slot {0} is not callable")]
    MissingIndirectTarget(u32),

    #[error("module aborted: {0}")]
    Abort(String),

    #[error("module requested process exit with status {0}")]
    ProcessExit(i32),

    #[error("call trapped: {0:#}")]
    Trap(anyhow::Error),

    #[error(transparent)]
    Memory(#[from] wasmtime::MemoryAccessError),
}

/// Traps raised by host imports while the module is running.
///
/// These travel through wasmtime as `anyhow::Error` and are recovered by
/// [`LoaderError::from_call`] once the outermost call returns.
#[derive(Debug, thiserror::Error)]
pub enum HostTrap {
    #[error("{0}")]
    Abort(String),

    #[error("Assertion failed: {condition}, at: {file}:{line} ({function})")]
    AssertionFailed {
        condition: String,
        file: String,
        line: i32,
        function: String,
    },

    #[error("exit({0})")]
    Exit(i32),

    #[error("indirect function table slot {0} is not callable")]
    MissingIndirectTarget(u32),

    #[error("module has no linear memory")]
    MissingMemory,

    #[error("module has no indirect function table")]
    MissingTable,

    #[error("import `{import}` argument {index} has an unexpected type")]
    BadArgument { import: &'static str, index: usize },
}

impl LoaderError {
    /// Classify an error returned by a call into the module.
    pub(crate) fn from_call(err: anyhow::Error) -> Self {
        match err.downcast::<HostTrap>() {
            Ok(HostTrap::Exit(code)) => LoaderError::ProcessExit(code),
            Ok(HostTrap::MissingIndirectTarget(index)) => LoaderError::MissingIndirectTarget(index),
            Ok(trap) => LoaderError::Abort(trap.to_string()),
            Err(err) => match err.downcast::<LoaderError>() {
                Ok(inner) => inner,
                Err(err) => LoaderError::Trap(err),
            },
        }
    }
}
