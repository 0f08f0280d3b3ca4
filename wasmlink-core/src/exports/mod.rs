//! Export resolution and invocation.
//!
//! An instance's export set is fixed for its lifetime, so every lookup result,
//! including absence, is cached permanently.

use std::collections::HashMap;

use tracing::trace;
use wasmtime::{AsContextMut, Func, Instance, Val};

use crate::abi::LEGACY_EXPORT_PREFIX;
use crate::error::LoaderError;

/// Name -> function cache over one instance.
pub struct ExportResolver {
    instance: Instance,
    cache: HashMap<String, Option<Func>>,
}

impl ExportResolver {
    pub fn new(instance: Instance) -> Self {
        Self {
            instance,
            cache: HashMap::new(),
        }
    }

    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    /// Resolve `name`, falling back to `_name`.
    pub fn resolve(&mut self, mut store: impl AsContextMut, name: &str) -> Option<Func> {
        if let Some(cached) = self.cache.get(name) {
            return cached.clone();
        }

        let found = self.instance.get_func(&mut store, name).or_else(|| {
            let legacy = format!("{LEGACY_EXPORT_PREFIX}{name}");
            self.instance.get_func(&mut store, &legacy)
        });

        if found.is_none() {
            trace!(export = name, "export absent; caching miss");
        }
        self.cache.insert(name.to_owned(), found.clone());
        found
    }

    pub fn has_export(&mut self, store: impl AsContextMut, name: &str) -> bool {
        self.resolve(store, name).is_some()
    }

    /// Call `name` with `args` exactly as given.
    ///
    /// Returns one value per declared result.
    pub fn invoke(
        &mut self,
        mut store: impl AsContextMut,
        name: &str,
        args: &[Val],
    ) -> Result<Vec<Val>, LoaderError> {
        let func = self
            .resolve(&mut store, name)
            .ok_or_else(|| LoaderError::ExportNotFound(name.to_owned()))?;

        let ty = func.ty(&store);
        let mut results: Vec<Val> = ty
            .results()
            .map(|t| Val::default_for_ty(&t).unwrap_or(Val::I32(0)))
            .collect();

        func.call(&mut store, args, &mut results)
            .map_err(LoaderError::from_call)?;
        Ok(results)
    }

    /// Number of names confirmed absent so far.
    pub fn cached_misses(&self) -> usize {
        self.cache.values().filter(|f| f.is_none()).count()
    }
}
