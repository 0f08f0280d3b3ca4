//! Loader: bytes in, a ready-to-call [`LoadedModule`] out.
//!
//! Responsibilities:
//! - Detect whether the provided bytes are a `.wasm` binary or `.wat` text.
//! - If it looks like WAT, convert it to WASM bytes (via the `wat` crate).
//! - Compile, synthesize the import table, instantiate, and run ABI bring-up.
//!
//! A failed load leaves nothing behind: every piece of state lives in the
//! runtime created for that one load and is dropped with it.

use std::path::Path;

use tracing::{debug, warn};

use crate::abi::{AbiState, module_exports};
use crate::config::LoaderConfig;
use crate::error::LoaderError;
use crate::exports::ExportResolver;
use crate::instance::LoadedModule;
use crate::memory::MemoryView;
use crate::runtime::{ImportSynthesizer, WasmtimeRuntime};
use crate::state::{HostState, OutputSink, TracingSink};

/// Failures before the module is instantiated.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The input was empty or otherwise not recognized as WASM/WAT.
    #[error("unrecognized module format (expected wasm or wat)")]
    UnrecognizedFormat,
    #[error("failed to parse WAT: {0}")]
    WatParseFailed(#[from] wat::Error),
    #[error("failed to read module: {0}")]
    Io(#[from] std::io::Error),
    /// The host could not build an engine; unrelated to the module bytes.
    #[error("failed to configure the wasm engine: {0:#}")]
    EngineSetup(anyhow::Error),
    #[error("failed to compile WASM module: {0:#}")]
    CompileFailed(anyhow::Error),
    #[error("failed to instantiate WASM module: {0:#}")]
    InstantiateFailed(anyhow::Error),
    #[error("module neither exports nor imports a linear memory")]
    NoMemory,
}

/// What kind of module the loader inferred from the bytes.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DetectedFormat {
    Wasm,
    Wat,
}

/// Result of normalizing (detecting + possibly converting) the input.
#[derive(Clone, Debug)]
pub struct Detected {
    pub format: DetectedFormat,
    /// Always valid WASM bytes (for WASM/WAT inputs).
    pub wasm_bytes: Vec<u8>,
}

/// Load sequence driver.
pub struct Loader {
    config: LoaderConfig,
    sink: Box<dyn OutputSink>,
}

impl Default for Loader {
    fn default() -> Self {
        Self::new(LoaderConfig::default())
    }
}

impl Loader {
    pub fn new(config: LoaderConfig) -> Self {
        Self {
            config,
            sink: Box::new(TracingSink),
        }
    }

    /// Replace the sink that receives the module's stdout/stderr.
    pub fn with_sink(mut self, sink: Box<dyn OutputSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    pub fn load_file(self, path: impl AsRef<Path>) -> Result<LoadedModule, LoaderError> {
        let bytes = std::fs::read(path.as_ref()).map_err(LoadError::Io)?;
        self.load(&bytes)
    }

    /// detect -> (optional) wat->wasm -> compile -> imports -> instantiate -> ABI bring-up.
    pub fn load(self, bytes: &[u8]) -> Result<LoadedModule, LoaderError> {
        let Detected { format, wasm_bytes } = normalize_to_wasm(bytes)?;
        let config = self.config;
        debug!(?format, len = wasm_bytes.len(), ?config, "loading module");

        let mut runtime = WasmtimeRuntime::new(HostState::new(config, self.sink))
            .map_err(LoadError::EngineSetup)?;
        let module = runtime.compile(&wasm_bytes)?;

        let mut synthesizer = ImportSynthesizer::new((&config).into());
        runtime.define_imports(&module, &mut synthesizer)?;
        let instance = runtime.instantiate(&module)?;

        let WasmtimeRuntime { mut store, .. } = runtime;

        let memory = instance
            .get_memory(&mut store, module_exports::MEMORY)
            .or_else(|| store.data().imported_memory())
            .ok_or(LoadError::NoMemory)?;
        let memory = MemoryView::new(memory);

        if config.zero_memory {
            let heap_base = instance
                .get_global(&mut store, module_exports::HEAP_BASE)
                .and_then(|g| g.get(&mut store).i32());
            match heap_base {
                Some(base) => memory.zero_from(&mut store, base as u32),
                None => warn!("zero_memory set but module exports no __heap_base; memory left as is"),
            }
        }

        let mut exports = ExportResolver::new(instance);
        let abi = AbiState::bring_up(&mut store, &mut exports, config.skip_init)?;

        debug!(
            stubbed = synthesizer.stubbed().len(),
            limits = ?abi.limits(),
            "module ready"
        );
        Ok(LoadedModule::new(
            store,
            exports,
            memory,
            abi,
            synthesizer.stubbed().to_vec(),
        ))
    }
}

/// Load `bytes` with `config` and the default tracing sink.
pub fn load(bytes: &[u8], config: LoaderConfig) -> Result<LoadedModule, LoaderError> {
    Loader::new(config).load(bytes)
}

/// Detect format and normalize to valid WASM bytes.
pub fn normalize_to_wasm(bytes: &[u8]) -> Result<Detected, LoadError> {
    let format = detect_format(bytes).ok_or(LoadError::UnrecognizedFormat)?;

    match format {
        DetectedFormat::Wasm => Ok(Detected {
            format,
            wasm_bytes: bytes.to_vec(),
        }),
        DetectedFormat::Wat => {
            let wasm_bytes = wat::parse_bytes(bytes)?;
            Ok(Detected {
                format,
                wasm_bytes: wasm_bytes.into_owned(),
            })
        }
    }
}

/// Best-effort detection.
///
/// Rules:
/// - If the first 4 bytes are `\0asm`, treat as WASM.
/// - Else, after stripping UTF-8 BOM / leading whitespace, if the first non-ws byte is `(`,
///   treat as WAT (common WAT starts with `(module ...)`).
///
/// This intentionally avoids requiring valid UTF-8 for WAT; `wat::parse_bytes` accepts bytes.
pub fn detect_format(bytes: &[u8]) -> Option<DetectedFormat> {
    if is_wasm_magic(bytes) {
        return Some(DetectedFormat::Wasm);
    }

    let i = skip_bom_and_leading_ws(bytes);
    if i < bytes.len() && bytes[i] == b'(' {
        return Some(DetectedFormat::Wat);
    }

    None
}

fn is_wasm_magic(bytes: &[u8]) -> bool {
    bytes.len() >= 4 && bytes[0..4] == *b"\0asm"
}

fn skip_bom_and_leading_ws(bytes: &[u8]) -> usize {
    let mut i = 0;

    // UTF-8 BOM: EF BB BF
    if bytes.len() >= 3 && bytes[0] == 0xEF && bytes[1] == 0xBB && bytes[2] == 0xBF {
        i = 3;
    }

    while i < bytes.len() {
        match bytes[i] {
            b' ' | b'\t' | b'\r' | b'\n' => i += 1,
            _ => break,
        }
    }

    i
}
