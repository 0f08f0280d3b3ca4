//! Per-instance host state.
//!
//! Lives in the wasmtime `Store` so every host import reaches it through its
//! `Caller`. Each loaded module owns its own copy; nothing here is global.

use std::time::Instant;

use tracing::{info, warn};
use wasmtime::{Caller, Extern, Memory, Table};

use crate::abi::module_exports;
use crate::config::LoaderConfig;

/// Receives text the module writes to its output streams.
pub trait OutputSink: Send {
    fn write(&mut self, fd: u32, text: &str);
}

/// Default sink: stdout at `info`, everything else at `warn`.
#[derive(Debug, Default)]
pub struct TracingSink;

impl OutputSink for TracingSink {
    fn write(&mut self, fd: u32, text: &str) {
        let text = text.trim_end_matches('\n');
        if text.is_empty() {
            return;
        }
        if fd == 1 {
            info!(target: "wasmlink::stdio", fd, "{text}");
        } else {
            warn!(target: "wasmlink::stdio", fd, "{text}");
        }
    }
}

/// Data stored in the wasmtime `Store`.
pub struct HostState {
    pub config: LoaderConfig,
    sink: Box<dyn OutputSink>,
    started: Instant,
    /// Set when the module imports its memory instead of defining it.
    memory: Option<Memory>,
    /// Set when the module imports its indirect function table.
    table: Option<Table>,
    growth_events: u64,
}

impl HostState {
    pub fn new(config: LoaderConfig, sink: Box<dyn OutputSink>) -> Self {
        Self {
            config,
            sink,
            started: Instant::now(),
            memory: None,
            table: None,
            growth_events: 0,
        }
    }

    pub fn sink(&mut self) -> &mut dyn OutputSink {
        self.sink.as_mut()
    }

    /// Milliseconds since this instance was created.
    pub fn elapsed_millis(&self) -> f64 {
        self.started.elapsed().as_secs_f64() * 1000.0
    }

    pub fn elapsed_nanos(&self) -> u64 {
        self.started.elapsed().as_nanos() as u64
    }

    pub fn imported_memory(&self) -> Option<Memory> {
        self.memory
    }

    pub fn set_imported_memory(&mut self, memory: Memory) {
        self.memory = Some(memory);
    }

    pub fn imported_table(&self) -> Option<Table> {
        self.table
    }

    pub fn set_imported_table(&mut self, table: Table) {
        self.table = Some(table);
    }

    pub fn growth_events(&self) -> u64 {
        self.growth_events
    }

    pub fn record_growth(&mut self) {
        self.growth_events += 1;
    }
}

/// The module's linear memory, exported or host-allocated.
pub fn guest_memory(caller: &mut Caller<'_, HostState>) -> Option<Memory> {
    caller
        .get_export(module_exports::MEMORY)
        .and_then(Extern::into_memory)
        .or_else(|| caller.data().imported_memory())
}

/// The module's indirect function table, exported or host-allocated.
pub fn guest_table(caller: &mut Caller<'_, HostState>) -> Option<Table> {
    caller
        .get_export(module_exports::INDIRECT_FUNCTION_TABLE)
        .and_then(Extern::into_table)
        .or_else(|| caller.data().imported_table())
}
