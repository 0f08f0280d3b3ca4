//! Wasmtime-backed runtime glue.
//!
//! Responsibilities:
//! - Create a Wasmtime `Engine`/`Store`/`Linker` per loaded instance.
//! - Synthesize every import the module declares (`imports`), backed by the
//!   concrete `"env"` helpers (`env`) and the syscall-lite shim (`wasi`).
//! - Compile and instantiate the module.
//!
//! ABI bring-up after instantiation lives in `crate::abi::init`.

mod env;
pub mod imports;
pub mod runtime;
mod wasi;

pub use imports::{ImportPolicy, ImportSynthesizer};
pub use runtime::WasmtimeRuntime;
