//! Import synthesis.
//!
//! A statically linked module built by a dynamic-linking-oriented toolchain
//! declares far more imports than it ever calls. The synthesizer walks the
//! module's import list once, before instantiation, and produces a host object
//! for every entry:
//!
//! - known `"env"` / syscall-lite functions get their concrete implementation,
//! - `env.invoke_*` gets the indirect-call trampoline,
//! - `"GOT.mem"` / `"GOT.func"` entries get a zero-valued mutable global,
//! - `env.memory`, `env.__indirect_function_table`, the `env` base globals and
//!   the exception tags get a host-allocated object of the declared type,
//! - anything else follows the [`ImportPolicy`]: a zero stub of the declared
//!   kind, or a hard [`LoaderError::MissingImport`].
//!
//! Every host function is created against the import's *declared* type, so the
//! exact signature never has to be known ahead of time.

use std::collections::HashMap;

use anyhow::anyhow;
use tracing::{debug, trace};
use wasmtime::{
    Caller, Extern, ExternType, Func, FuncType, Global, Linker, Memory, Module, Ref,
    Store, Table, Tag, Val, ValType,
};

use super::{env, wasi};
use crate::abi::{GOT_FUNC, GOT_MEM, IMPORT_MODULE, INVOKE_PREFIX, WASI_MODULE, env_imports};
use crate::config::LoaderConfig;
use crate::error::{HostTrap, LoaderError};
use crate::loader::LoadError;
use crate::memory::MemoryView;
use crate::state::{HostState, guest_memory};

/// Signature shared by every concrete host import.
///
/// Results arrive pre-filled with zeros of the declared result types.
pub(crate) type HostFn = fn(&mut Caller<'_, HostState>, &[Val], &mut [Val]) -> anyhow::Result<()>;

/// What to do with an import the host does not recognize.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ImportPolicy {
    Strict,
    LenientZero,
}

impl From<&LoaderConfig> for ImportPolicy {
    fn from(config: &LoaderConfig) -> Self {
        if config.strict_imports {
            ImportPolicy::Strict
        } else {
            ImportPolicy::LenientZero
        }
    }
}

/// Builds, and remembers, the host side of a module's import table.
pub struct ImportSynthesizer {
    policy: ImportPolicy,
    cache: HashMap<(String, String), Extern>,
    stubbed: Vec<String>,
}

impl ImportSynthesizer {
    pub fn new(policy: ImportPolicy) -> Self {
        Self {
            policy,
            cache: HashMap::new(),
            stubbed: Vec::new(),
        }
    }

    pub fn policy(&self) -> ImportPolicy {
        self.policy
    }

    /// `module.name` of every import that was satisfied with a zero-stub.
    pub fn stubbed(&self) -> &[String] {
        &self.stubbed
    }

    /// Number of distinct host objects created so far.
    pub fn synthesized(&self) -> usize {
        self.cache.len()
    }

    /// Define a host object on `linker` for every import `module` declares.
    pub fn synthesize(
        &mut self,
        store: &mut Store<HostState>,
        linker: &mut Linker<HostState>,
        module: &Module,
    ) -> Result<(), LoaderError> {
        for import in module.imports() {
            let key = (import.module().to_owned(), import.name().to_owned());
            if self.cache.contains_key(&key) {
                continue;
            }
            let item = self.resolve(store, import.module(), import.name(), import.ty())?;
            linker
                .define(&mut *store, import.module(), import.name(), item)
                .map_err(LoadError::InstantiateFailed)?;
        }
        debug!(
            imports = self.cache.len(),
            stubbed = self.stubbed.len(),
            "import table synthesized"
        );
        Ok(())
    }

    /// The host object for `module.name`, creating it on first access.
    ///
    /// Repeated calls return the same object.
    pub fn resolve(
        &mut self,
        store: &mut Store<HostState>,
        module: &str,
        name: &str,
        ty: ExternType,
    ) -> Result<Extern, LoaderError> {
        let key = (module.to_owned(), name.to_owned());
        if let Some(existing) = self.cache.get(&key) {
            return Ok(existing.clone());
        }

        let item = match ty {
            ExternType::Func(func_ty) => self.build_func(store, module, name, func_ty)?,
            other => {
                if !is_known_object(module, name) {
                    self.unmatched(module, name)?;
                }
                build_object(store, other).map_err(LoadError::InstantiateFailed)?
            }
        };

        self.cache.insert(key, item.clone());
        Ok(item)
    }

    fn build_func(
        &mut self,
        store: &mut Store<HostState>,
        module: &str,
        name: &str,
        ty: FuncType,
    ) -> Result<Extern, LoaderError> {
        let known = match module {
            IMPORT_MODULE if name.starts_with(INVOKE_PREFIX) => Some(env::dispatch_indirect as HostFn),
            IMPORT_MODULE => env::lookup(name),
            WASI_MODULE => wasi::lookup(name),
            _ => None,
        };

        if let Some(host) = known {
            return Ok(host_func(store, ty, host).into());
        }

        let qualified = self.unmatched(module, name)?;
        let result_types: Vec<ValType> = ty.results().collect();
        let func = Func::new(&mut *store, ty, move |_caller, _params, results| {
            trace!(import = %qualified, "zero-stub called");
            zero_fill(results, &result_types)
        });
        Ok(func.into())
    }

    /// Strict: fail. Lenient: record `module.name` as stubbed and return it.
    fn unmatched(&mut self, module: &str, name: &str) -> Result<String, LoaderError> {
        if self.policy == ImportPolicy::Strict {
            return Err(missing(module, name));
        }
        let qualified = format!("{module}.{name}");
        debug!(import = %qualified, "no host implementation; using zero-stub");
        self.stubbed.push(qualified.clone());
        Ok(qualified)
    }
}

/// Non-function imports the host provides on purpose.
fn is_known_object(module: &str, name: &str) -> bool {
    match module {
        // Never dereferenced as live cross-module addresses.
        GOT_MEM | GOT_FUNC => true,
        IMPORT_MODULE => matches!(
            name,
            env_imports::MEMORY
                | env_imports::INDIRECT_FUNCTION_TABLE
                | env_imports::MEMORY_BASE
                | env_imports::TABLE_BASE
                | env_imports::STACK_POINTER
                | env_imports::CPP_EXCEPTION_TAG
                | env_imports::LONGJMP_TAG
        ),
        _ => false,
    }
}

/// A fresh host object of the declared non-function type.
///
/// The first memory and table created are the ones host imports operate on.
fn build_object(store: &mut Store<HostState>, ty: ExternType) -> anyhow::Result<Extern> {
    let item = match ty {
        ExternType::Global(global_ty) => {
            let zero = Val::default_for_ty(global_ty.content())
                .ok_or_else(|| anyhow!("global type {global_ty:?} has no zero value"))?;
            Global::new(&mut *store, global_ty, zero)?.into()
        }
        ExternType::Memory(memory_ty) => {
            let memory = Memory::new(&mut *store, memory_ty)?;
            if store.data().imported_memory().is_none() {
                store.data_mut().set_imported_memory(memory);
            }
            memory.into()
        }
        ExternType::Table(table_ty) => {
            let init = Ref::null(table_ty.element().heap_type());
            let table = Table::new(&mut *store, table_ty, init)?;
            if store.data().imported_table().is_none() {
                store.data_mut().set_imported_table(table);
            }
            table.into()
        }
        ExternType::Tag(tag_ty) => Extern::Tag(Tag::new(&mut *store, &tag_ty)?),
        #[allow(unreachable_patterns)]
        other => return Err(anyhow!("unsupported import kind {other:?}")),
    };
    Ok(item)
}

fn missing(module: &str, name: &str) -> LoaderError {
    LoaderError::MissingImport {
        module: module.to_owned(),
        name: name.to_owned(),
    }
}

fn host_func(store: &mut Store<HostState>, ty: FuncType, host: HostFn) -> Func {
    let result_types: Vec<ValType> = ty.results().collect();
    Func::new(store, ty, move |mut caller, params, results| {
        zero_fill(results, &result_types)?;
        host(&mut caller, params, results)
    })
}

fn zero_fill(results: &mut [Val], types: &[ValType]) -> anyhow::Result<()> {
    for (slot, ty) in results.iter_mut().zip(types) {
        *slot = Val::default_for_ty(ty).ok_or_else(|| anyhow!("no zero value for {ty}"))?;
    }
    Ok(())
}

pub(crate) fn arg_i32(params: &[Val], index: usize, import: &'static str) -> Result<i32, HostTrap> {
    params
        .get(index)
        .and_then(Val::i32)
        .ok_or(HostTrap::BadArgument { import, index })
}

pub(crate) fn arg_u32(params: &[Val], index: usize, import: &'static str) -> Result<u32, HostTrap> {
    arg_i32(params, index, import).map(|v| v as u32)
}

/// Write an integer into the first result, matching its declared width.
pub(crate) fn set_int_result(results: &mut [Val], value: i64) {
    if let Some(slot) = results.first_mut() {
        *slot = match slot {
            Val::I64(_) => Val::I64(value),
            Val::F64(_) => Val::F64((value as f64).to_bits()),
            _ => Val::I32(value as i32),
        };
    }
}

pub(crate) fn set_f64_result(results: &mut [Val], value: f64) {
    if let Some(slot) = results.first_mut() {
        *slot = match slot {
            Val::F32(_) => Val::F32((value as f32).to_bits()),
            Val::I64(_) => Val::I64(value as i64),
            Val::I32(_) => Val::I32(value as i32),
            _ => Val::F64(value.to_bits()),
        };
    }
}

pub(crate) fn guest_view(caller: &mut Caller<'_, HostState>) -> Result<MemoryView, HostTrap> {
    guest_memory(caller)
        .map(MemoryView::new)
        .ok_or(HostTrap::MissingMemory)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_results_follow_the_declared_slot_width() {
        let mut results = [Val::F64(0f64.to_bits())];
        set_int_result(&mut results, 7);
        assert_eq!(results[0].unwrap_f64(), 7.0);

        let mut results = [Val::I64(0)];
        set_int_result(&mut results, 1 << 40);
        assert_eq!(results[0].unwrap_i64(), 1 << 40);

        let mut results = [Val::I32(0)];
        set_int_result(&mut results, -3);
        assert_eq!(results[0].unwrap_i32(), -3);

        set_int_result(&mut [], 1);
    }

    #[test]
    fn float_results_follow_the_declared_slot_width() {
        let mut results = [Val::F32(0)];
        set_f64_result(&mut results, 2.5);
        assert_eq!(results[0].unwrap_f32(), 2.5);

        let mut results = [Val::I32(0)];
        set_f64_result(&mut results, 9.75);
        assert_eq!(results[0].unwrap_i32(), 9);
    }

    #[test]
    fn known_objects_are_limited_to_the_toolchain_abi() {
        assert!(is_known_object(GOT_MEM, "anything"));
        assert!(is_known_object(GOT_FUNC, "on_frame"));
        assert!(is_known_object(IMPORT_MODULE, "memory"));
        assert!(is_known_object(IMPORT_MODULE, "__cpp_exception"));
        assert!(!is_known_object(IMPORT_MODULE, "g_flags"));
        assert!(!is_known_object("js", "memory"));
    }
}
