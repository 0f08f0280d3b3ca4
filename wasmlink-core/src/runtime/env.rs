//! Concrete `"env"` imports and the indirect-call trampoline.

use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use tracing::debug;
use wasmtime::{Caller, Val};

use super::imports::{HostFn, arg_i32, arg_u32, guest_view, set_f64_result, set_int_result};
use crate::abi::env_imports;
use crate::error::HostTrap;
use crate::state::{HostState, guest_memory, guest_table};

/// Upper bound reported when the memory declares no maximum.
const DEFAULT_HEAP_MAX: u64 = 2 * 1024 * 1024 * 1024;

pub(crate) fn lookup(name: &str) -> Option<HostFn> {
    let f: HostFn = match name {
        env_imports::ABORT | env_imports::ABORT_JS => abort,
        env_imports::ASSERT_FAIL => assert_fail,
        env_imports::NOTIFY_MEMORY_GROWTH => notify_memory_growth,
        env_imports::RESIZE_HEAP => resize_heap,
        env_imports::GET_HEAP_MAX => get_heap_max,
        env_imports::DATE_NOW => date_now,
        env_imports::GET_NOW => get_now,
        env_imports::GET_NOW_IS_MONOTONIC => get_now_is_monotonic,
        env_imports::MEMCPY_JS | env_imports::MEMCPY_JS_LEGACY => memcpy_js,
        _ => return None,
    };
    Some(f)
}

fn abort(_caller: &mut Caller<'_, HostState>, _params: &[Val], _results: &mut [Val]) -> Result<()> {
    Err(HostTrap::Abort("native code called abort()".to_owned()).into())
}

fn assert_fail(
    caller: &mut Caller<'_, HostState>,
    params: &[Val],
    _results: &mut [Val],
) -> Result<()> {
    const NAME: &str = env_imports::ASSERT_FAIL;
    let view = guest_view(caller)?;
    let condition = view.read_c_string(&*caller, arg_u32(params, 0, NAME)?)?;
    let file = view.read_c_string(&*caller, arg_u32(params, 1, NAME)?)?;
    let line = arg_i32(params, 2, NAME)?;
    let function = view.read_c_string(&*caller, arg_u32(params, 3, NAME)?)?;
    Err(HostTrap::AssertionFailed {
        condition,
        file,
        line,
        function,
    }
    .into())
}

fn notify_memory_growth(
    caller: &mut Caller<'_, HostState>,
    params: &[Val],
    _results: &mut [Val],
) -> Result<()> {
    let index = arg_u32(params, 0, env_imports::NOTIFY_MEMORY_GROWTH)?;
    caller.data_mut().record_growth();
    let bytes = guest_memory(caller).map(|m| m.data_size(&*caller));
    debug!(memory_index = index, bytes, "module memory grew");
    Ok(())
}

fn resize_heap(
    caller: &mut Caller<'_, HostState>,
    params: &[Val],
    results: &mut [Val],
) -> Result<()> {
    let requested = u64::from(arg_u32(params, 0, env_imports::RESIZE_HEAP)?);
    let memory = guest_memory(caller).ok_or(HostTrap::MissingMemory)?;

    let page = memory.page_size(&*caller);
    let current = memory.size(&*caller);
    let wanted = requested.div_ceil(page);

    let grown = if wanted <= current {
        true
    } else {
        match memory.grow(&mut *caller, wanted - current) {
            Ok(_) => {
                caller.data_mut().record_growth();
                true
            }
            Err(e) => {
                debug!(requested, error = %e, "heap resize refused");
                false
            }
        }
    };
    set_int_result(results, i64::from(grown));
    Ok(())
}

fn get_heap_max(
    caller: &mut Caller<'_, HostState>,
    _params: &[Val],
    results: &mut [Val],
) -> Result<()> {
    let memory = guest_memory(caller).ok_or(HostTrap::MissingMemory)?;
    let page = memory.page_size(&*caller);
    let max = memory
        .ty(&*caller)
        .maximum()
        .map(|pages| pages.saturating_mul(page))
        .unwrap_or(DEFAULT_HEAP_MAX)
        .min(DEFAULT_HEAP_MAX);
    set_int_result(results, max as i64);
    Ok(())
}

fn date_now(_caller: &mut Caller<'_, HostState>, _params: &[Val], results: &mut [Val]) -> Result<()> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    set_f64_result(results, now.as_secs_f64() * 1000.0);
    Ok(())
}

fn get_now(caller: &mut Caller<'_, HostState>, _params: &[Val], results: &mut [Val]) -> Result<()> {
    set_f64_result(results, caller.data().elapsed_millis());
    Ok(())
}

fn get_now_is_monotonic(
    _caller: &mut Caller<'_, HostState>,
    _params: &[Val],
    results: &mut [Val],
) -> Result<()> {
    set_int_result(results, 1);
    Ok(())
}

fn memcpy_js(caller: &mut Caller<'_, HostState>, params: &[Val], _results: &mut [Val]) -> Result<()> {
    const NAME: &str = env_imports::MEMCPY_JS;
    let dest = arg_u32(params, 0, NAME)?;
    let src = arg_u32(params, 1, NAME)?;
    let len = arg_u32(params, 2, NAME)? as usize;

    let view = guest_view(caller)?;
    let bytes = view.read_u8_array(&*caller, src, len)?;
    view.write_u8_array(&mut *caller, dest, &bytes)?;
    Ok(())
}

/// `invoke_*(index, args...)`: call table slot `index` with the remaining arguments.
pub(crate) fn dispatch_indirect(
    caller: &mut Caller<'_, HostState>,
    params: &[Val],
    results: &mut [Val],
) -> Result<()> {
    let index = arg_u32(params, 0, "invoke_*")?;
    let table = guest_table(caller).ok_or(HostTrap::MissingTable)?;

    let target = table
        .get(&mut *caller, u64::from(index))
        .and_then(|slot| slot.as_func().flatten().cloned())
        .ok_or(HostTrap::MissingIndirectTarget(index))?;

    target.call(&mut *caller, &params[1..], results)
}
