//! ABI bring-up for a freshly instantiated module.
//!
//! `Uninitialized -> StackReady -> LimitsApplied -> CtorsRun -> Ready`
//!
//! Each step calls into the module's own exports. Any failing step aborts the
//! load with [`LoaderError::InitializationFailed`]; a half-initialized instance
//! is never returned.

use tracing::{debug, warn};
use wasmtime::{AsContextMut, Val};

use super::{AbiStage, module_exports};
use crate::error::LoaderError;
use crate::exports::ExportResolver;

/// Stack bounds the module reported after its stack was initialized.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct StackLimits {
    pub base: u32,
    pub end: u32,
}

/// Progress of the bring-up state machine.
#[derive(Clone, Debug)]
pub struct AbiState {
    stage: AbiStage,
    limits: Option<StackLimits>,
}

impl Default for AbiState {
    fn default() -> Self {
        Self {
            stage: AbiStage::Uninitialized,
            limits: None,
        }
    }
}

impl AbiState {
    pub fn stage(&self) -> AbiStage {
        self.stage
    }

    pub fn is_ready(&self) -> bool {
        self.stage == AbiStage::Ready
    }

    /// `None` when the module did not report usable stack bounds.
    pub fn limits(&self) -> Option<StackLimits> {
        self.limits
    }

    fn advance(&mut self, next: AbiStage) {
        debug_assert!(next > self.stage, "ABI stage moved backwards");
        debug!(from = ?self.stage, to = ?next, "ABI stage");
        self.stage = next;
    }

    /// Run every bring-up step against `exports`.
    ///
    /// With `skip_init` the embedder has already run the module's initializers,
    /// so the state machine goes straight to `Ready`.
    pub fn bring_up(
        mut store: impl AsContextMut,
        exports: &mut ExportResolver,
        skip_init: bool,
    ) -> Result<Self, LoaderError> {
        let mut state = Self::default();

        if skip_init {
            debug!("skip_init set; module initializers are left to the embedder");
            state.advance(AbiStage::Ready);
            return Ok(state);
        }

        call_if_present(&mut store, exports, module_exports::STACK_INIT, &[])
            .map_err(|e| failed(AbiStage::StackReady, e))?;
        state.advance(AbiStage::StackReady);

        let base = read_u32(&mut store, exports, module_exports::STACK_GET_BASE)
            .map_err(|e| failed(AbiStage::LimitsApplied, e))?;
        let end = read_u32(&mut store, exports, module_exports::STACK_GET_END)
            .map_err(|e| failed(AbiStage::LimitsApplied, e))?;

        if base != 0 && end != 0 {
            let setter = [module_exports::SET_STACK_LIMITS, module_exports::STACK_SET_LIMITS]
                .into_iter()
                .find(|name| exports.has_export(&mut store, name));
            match setter {
                Some(name) => {
                    let args = [Val::I32(base as i32), Val::I32(end as i32)];
                    exports
                        .invoke(&mut store, name, &args)
                        .map_err(|e| failed(AbiStage::LimitsApplied, e))?;
                    state.limits = Some(StackLimits { base, end });
                }
                None => warn!(base, end, "module exports no stack-limit setter; limits left unset"),
            }
        } else {
            // The next stack-checked call will fail loudly instead.
            warn!(base, end, "module reported no stack bounds; limits left unset");
        }
        state.advance(AbiStage::LimitsApplied);

        call_if_present(&mut store, exports, module_exports::CALL_CTORS, &[])
            .map_err(|e| failed(AbiStage::CtorsRun, e))?;
        state.advance(AbiStage::CtorsRun);

        state.advance(AbiStage::Ready);
        Ok(state)
    }
}

fn failed(stage: AbiStage, err: LoaderError) -> LoaderError {
    LoaderError::InitializationFailed {
        stage,
        reason: anyhow::Error::new(err),
    }
}

fn call_if_present(
    mut store: impl AsContextMut,
    exports: &mut ExportResolver,
    name: &str,
    args: &[Val],
) -> Result<(), LoaderError> {
    if exports.has_export(&mut store, name) {
        exports.invoke(&mut store, name, args)?;
    } else {
        debug!(export = name, "optional ABI export absent");
    }
    Ok(())
}

/// Missing accessors read as zero.
fn read_u32(
    mut store: impl AsContextMut,
    exports: &mut ExportResolver,
    name: &str,
) -> Result<u32, LoaderError> {
    if !exports.has_export(&mut store, name) {
        return Ok(0);
    }
    let results = exports.invoke(&mut store, name, &[])?;
    Ok(results.first().and_then(Val::i32).unwrap_or(0) as u32)
}
