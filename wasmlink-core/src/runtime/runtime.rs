//! Engine / store / linker container for one instance.

use wasmtime::{Instance, Linker, Module, Store};

use super::imports::ImportSynthesizer;
use crate::error::LoaderError;
use crate::loader::LoadError;
use crate::state::HostState;

/// Host-side runtime container.
pub struct WasmtimeRuntime {
    pub engine: wasmtime::Engine,
    pub store: Store<HostState>,
    pub linker: Linker<HostState>,
}

impl WasmtimeRuntime {
    /// Create a new Wasmtime runtime with a broad set of WebAssembly features enabled.
    ///
    /// Notes:
    /// - We enable a wide range of Wasm proposal features so that whatever the toolchain
    ///   emitted at least validates.
    /// - Threads/shared memory still need embedding work beyond the config bit; a module
    ///   that actually imports a shared memory fails to load.
    pub fn new(state: HostState) -> Result<Self, anyhow::Error> {
        let mut cfg = wasmtime::Config::new();

        cfg.wasm_multi_value(true);
        cfg.wasm_bulk_memory(true);
        cfg.wasm_reference_types(true);
        cfg.wasm_simd(true);

        cfg.wasm_multi_memory(true);
        cfg.wasm_memory64(true);
        cfg.wasm_relaxed_simd(true);
        cfg.wasm_tail_call(true);
        cfg.wasm_function_references(true);
        cfg.wasm_gc(true);
        cfg.wasm_threads(true);

        // C++ toolchains may emit native exception handling.
        cfg.wasm_exceptions(true);

        let engine = wasmtime::Engine::new(&cfg)?;
        let store = Store::new(&engine, state);
        let linker = Linker::new(&engine);

        Ok(Self {
            engine,
            store,
            linker,
        })
    }

    pub fn compile(&self, wasm_bytes: &[u8]) -> Result<Module, LoadError> {
        Module::new(&self.engine, wasm_bytes).map_err(LoadError::CompileFailed)
    }

    /// Define every import `module` declares.
    ///
    /// Must be called before `instantiate`.
    pub fn define_imports(
        &mut self,
        module: &Module,
        synthesizer: &mut ImportSynthesizer,
    ) -> Result<(), LoaderError> {
        synthesizer.synthesize(&mut self.store, &mut self.linker, module)
    }

    pub fn instantiate(&mut self, module: &Module) -> Result<Instance, LoadError> {
        self.linker
            .instantiate(&mut self.store, module)
            .map_err(LoadError::InstantiateFailed)
    }
}
