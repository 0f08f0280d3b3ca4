//! wasmlink-core: loads a natively compiled, statically linked WASM module
//! without the toolchain's own startup glue.
//!
//! The module was built expecting a runtime that would:
//! - satisfy every import it declares, including helper symbols from
//!   dynamic-linking address tables and a thin syscall-lite surface,
//! - initialize its stack protocol and run its constructors,
//! - manage the opaque native handles it hands back.
//!
//! This crate is that runtime, on top of Wasmtime:
//! - [`loader`]: bytes (WASM or WAT) -> [`LoadedModule`].
//! - [`runtime`]: engine setup and the import synthesizer.
//! - [`abi`]: ABI names and the bring-up state machine.
//! - [`memory`]: growth-safe typed access to linear memory.
//! - [`exports`]: export lookup with legacy `_` fallback and negative caching.
//! - [`handles`]: `Ptr` / `ManagedObj` ownership with deterministic deferred release.
//!
//! ```no_run
//! use wasmlink_core::{LoaderConfig, load};
//! use wasmtime::Val;
//!
//! let bytes = std::fs::read("canvas.wasm")?;
//! let mut module = load(&bytes, LoaderConfig::default())?;
//! let sum = module.invoke_i32("add", &[Val::I32(2), Val::I32(3)])?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod abi;
pub mod config;
pub mod error;
pub mod exports;
pub mod handles;
pub mod instance;
pub mod loader;
pub mod memory;
pub mod runtime;
pub mod state;

#[cfg(test)]
mod tests;

pub use config::LoaderConfig;
pub use error::{HostTrap, LoaderError};
pub use handles::{HandleArena, Invoke, ManagedObj, NativeKind, Ptr};
pub use instance::LoadedModule;
pub use loader::{LoadError, Loader, load};
pub use memory::MemoryView;
pub use state::{OutputSink, TracingSink};
