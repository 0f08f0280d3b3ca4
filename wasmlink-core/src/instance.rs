//! The loaded-instance context object handed to collaborators.

use wasmtime::{Func, Store, Val};

use crate::abi::{AbiState, module_exports};
use crate::error::LoaderError;
use crate::exports::ExportResolver;
use crate::handles::{HandleArena, Invoke};
use crate::memory::MemoryView;
use crate::state::HostState;

/// One instantiated, ABI-ready module.
///
/// Every call runs synchronously to completion on the calling thread. Two
/// `LoadedModule`s never share state.
pub struct LoadedModule {
    store: Store<HostState>,
    exports: ExportResolver,
    memory: MemoryView,
    abi: AbiState,
    handles: HandleArena,
    stubbed_imports: Vec<String>,
}

impl LoadedModule {
    pub(crate) fn new(
        store: Store<HostState>,
        exports: ExportResolver,
        memory: MemoryView,
        abi: AbiState,
        stubbed_imports: Vec<String>,
    ) -> Self {
        Self {
            store,
            exports,
            memory,
            abi,
            handles: HandleArena::new(),
            stubbed_imports,
        }
    }

    pub fn abi_state(&self) -> &AbiState {
        &self.abi
    }

    /// Imports that were satisfied with a zero-stub.
    pub fn stubbed_imports(&self) -> &[String] {
        &self.stubbed_imports
    }

    /// Times the module's memory grew through a host-visible path.
    pub fn growth_events(&self) -> u64 {
        self.store.data().growth_events()
    }

    pub fn memory(&self) -> &MemoryView {
        &self.memory
    }

    pub fn memory_size(&self) -> usize {
        self.memory.byte_len(&self.store)
    }

    pub fn store(&self) -> &Store<HostState> {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut Store<HostState> {
        &mut self.store
    }

    // --- exports ---

    pub fn resolve(&mut self, name: &str) -> Option<Func> {
        self.exports.resolve(&mut self.store, name)
    }

    pub fn has_export(&mut self, name: &str) -> bool {
        self.exports.has_export(&mut self.store, name)
    }

    pub fn invoke(&mut self, name: &str, args: &[Val]) -> Result<Vec<Val>, LoaderError> {
        self.exports.invoke(&mut self.store, name, args)
    }

    /// `invoke` for the common single-`i32` result.
    pub fn invoke_i32(&mut self, name: &str, args: &[Val]) -> Result<i32, LoaderError> {
        let out = self.invoke(name, args)?;
        out.first().and_then(Val::i32).ok_or_else(|| {
            LoaderError::Trap(anyhow::anyhow!("export `{name}` did not return an i32"))
        })
    }

    // --- allocation ---

    pub fn malloc(&mut self, size: u32) -> Result<u32, LoaderError> {
        self.invoke_i32(module_exports::MALLOC, &[Val::I32(size as i32)])
            .map(|p| p as u32)
    }

    pub fn free(&mut self, ptr: u32) -> Result<(), LoaderError> {
        self.invoke(module_exports::FREE, &[Val::I32(ptr as i32)])?;
        Ok(())
    }

    /// `malloc` + copy `bytes` in.
    pub fn alloc(&mut self, bytes: &[u8]) -> Result<u32, LoaderError> {
        let ptr = self.malloc(bytes.len() as u32)?;
        self.memory.write_u8_array(&mut self.store, ptr, bytes)?;
        Ok(ptr)
    }

    // --- typed memory access ---

    pub fn get_u8(&self, ptr: u32) -> Result<u8, LoaderError> {
        Ok(self.memory.get_u8(&self.store, ptr)?)
    }

    pub fn set_u8(&mut self, ptr: u32, value: u8) -> Result<(), LoaderError> {
        Ok(self.memory.set_u8(&mut self.store, ptr, value)?)
    }

    pub fn get_u32(&self, ptr: u32) -> Result<u32, LoaderError> {
        Ok(self.memory.get_u32(&self.store, ptr)?)
    }

    pub fn set_u32(&mut self, ptr: u32, value: u32) -> Result<(), LoaderError> {
        Ok(self.memory.set_u32(&mut self.store, ptr, value)?)
    }

    pub fn get_f32(&self, ptr: u32) -> Result<f32, LoaderError> {
        Ok(self.memory.get_f32(&self.store, ptr)?)
    }

    pub fn set_f32(&mut self, ptr: u32, value: f32) -> Result<(), LoaderError> {
        Ok(self.memory.set_f32(&mut self.store, ptr, value)?)
    }

    pub fn read_u8_array(&self, ptr: u32, len: usize) -> Result<Vec<u8>, LoaderError> {
        Ok(self.memory.read_u8_array(&self.store, ptr, len)?)
    }

    pub fn write_u8_array(&mut self, ptr: u32, values: &[u8]) -> Result<(), LoaderError> {
        Ok(self.memory.write_u8_array(&mut self.store, ptr, values)?)
    }

    pub fn read_u32_array(&self, ptr: u32, len: usize) -> Result<Vec<u32>, LoaderError> {
        Ok(self.memory.read_u32_array(&self.store, ptr, len)?)
    }

    pub fn write_u32_array(&mut self, ptr: u32, values: &[u32]) -> Result<(), LoaderError> {
        Ok(self.memory.write_u32_array(&mut self.store, ptr, values)?)
    }

    pub fn read_f32_array(&self, ptr: u32, len: usize) -> Result<Vec<f32>, LoaderError> {
        Ok(self.memory.read_f32_array(&self.store, ptr, len)?)
    }

    pub fn write_f32_array(&mut self, ptr: u32, values: &[f32]) -> Result<(), LoaderError> {
        Ok(self.memory.write_f32_array(&mut self.store, ptr, values)?)
    }

    pub fn read_c_string(&self, ptr: u32) -> Result<String, LoaderError> {
        Ok(self.memory.read_c_string(&self.store, ptr)?)
    }

    // --- handles ---

    /// The arena native-handle wrappers for this instance register with.
    pub fn handles(&self) -> &HandleArena {
        &self.handles
    }

    /// Idle tick: release every handle queued since the last sweep.
    pub fn sweep(&mut self) -> Result<usize, LoaderError> {
        let arena = self.handles.clone();
        arena.sweep(self)
    }
}

impl Invoke for LoadedModule {
    fn invoke(&mut self, name: &str, args: &[Val]) -> Result<Vec<Val>, LoaderError> {
        LoadedModule::invoke(self, name, args)
    }
}
