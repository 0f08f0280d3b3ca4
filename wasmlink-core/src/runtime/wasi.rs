//! Syscall-lite shim: the handful of `wasi_snapshot_preview1` calls the
//! module's startup and stdio code actually makes.
//!
//! There is no environment, no argv, and no readable or seekable file. Output
//! streams are forwarded to the instance's [`OutputSink`](crate::state::OutputSink).

use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use wasmtime::{Caller, Val};

use super::imports::{HostFn, arg_i32, arg_u32, guest_view, set_int_result};
use crate::abi::{errno, wasi_imports};
use crate::error::HostTrap;
use crate::state::HostState;

/// WASI iovec: `{ buf: u32, buf_len: u32 }`.
const IOVEC_SIZE: u32 = 8;

/// `__WASI_CLOCKID_REALTIME`
const CLOCK_REALTIME: i32 = 0;

pub(crate) fn lookup(name: &str) -> Option<HostFn> {
    let f: HostFn = match name {
        wasi_imports::ENVIRON_SIZES_GET | wasi_imports::ARGS_SIZES_GET => empty_sizes_get,
        wasi_imports::ENVIRON_GET | wasi_imports::ARGS_GET => empty_get,
        wasi_imports::FD_WRITE => fd_write,
        wasi_imports::FD_READ => fd_read,
        wasi_imports::FD_SEEK => fd_seek,
        wasi_imports::FD_PREAD => fd_pread,
        wasi_imports::FD_CLOSE => fd_close,
        wasi_imports::CLOCK_TIME_GET => clock_time_get,
        wasi_imports::PROC_EXIT => proc_exit,
        _ => return None,
    };
    Some(f)
}

/// `(count_ptr, buf_size_ptr) -> errno`, both written as zero.
fn empty_sizes_get(
    caller: &mut Caller<'_, HostState>,
    params: &[Val],
    results: &mut [Val],
) -> Result<()> {
    const NAME: &str = wasi_imports::ENVIRON_SIZES_GET;
    let view = guest_view(caller)?;
    view.set_u32(&mut *caller, arg_u32(params, 0, NAME)?, 0)?;
    view.set_u32(&mut *caller, arg_u32(params, 1, NAME)?, 0)?;
    set_int_result(results, i64::from(errno::SUCCESS));
    Ok(())
}

fn empty_get(_caller: &mut Caller<'_, HostState>, _params: &[Val], results: &mut [Val]) -> Result<()> {
    set_int_result(results, i64::from(errno::SUCCESS));
    Ok(())
}

/// `(fd, iovs, iovs_len, nwritten_ptr) -> errno`
fn fd_write(caller: &mut Caller<'_, HostState>, params: &[Val], results: &mut [Val]) -> Result<()> {
    const NAME: &str = wasi_imports::FD_WRITE;
    let fd = arg_u32(params, 0, NAME)?;
    let iovs = arg_u32(params, 1, NAME)?;
    let iovs_len = arg_u32(params, 2, NAME)?;
    let nwritten_ptr = arg_u32(params, 3, NAME)?;

    let view = guest_view(caller)?;
    let mut text = Vec::new();
    for i in 0..iovs_len {
        let iov = iovs.wrapping_add(i.wrapping_mul(IOVEC_SIZE));
        let ptr = view.get_u32(&*caller, iov)?;
        let len = view.get_u32(&*caller, iov.wrapping_add(4))?;
        text.extend(view.read_u8_array(&*caller, ptr, len as usize)?);
    }

    view.set_u32(&mut *caller, nwritten_ptr, text.len() as u32)?;
    caller
        .data_mut()
        .sink()
        .write(fd, &String::from_utf8_lossy(&text));
    set_int_result(results, i64::from(errno::SUCCESS));
    Ok(())
}

/// `(fd, iovs, iovs_len, nread_ptr) -> errno`
fn fd_read(caller: &mut Caller<'_, HostState>, params: &[Val], results: &mut [Val]) -> Result<()> {
    let nread_ptr = arg_u32(params, 3, wasi_imports::FD_READ)?;
    guest_view(caller)?.set_u32(&mut *caller, nread_ptr, 0)?;
    set_int_result(results, i64::from(errno::BADF));
    Ok(())
}

/// `(fd, offset: i64, whence, newoffset_ptr) -> errno`
fn fd_seek(caller: &mut Caller<'_, HostState>, params: &[Val], results: &mut [Val]) -> Result<()> {
    let newoffset_ptr = arg_u32(params, 3, wasi_imports::FD_SEEK)?;
    guest_view(caller)?.set_u64(&mut *caller, newoffset_ptr, 0)?;
    set_int_result(results, i64::from(errno::BADF));
    Ok(())
}

/// `(fd, iovs, iovs_len, offset: i64, nread_ptr) -> errno`
fn fd_pread(caller: &mut Caller<'_, HostState>, params: &[Val], results: &mut [Val]) -> Result<()> {
    let nread_ptr = arg_u32(params, 4, wasi_imports::FD_PREAD)?;
    guest_view(caller)?.set_u32(&mut *caller, nread_ptr, 0)?;
    set_int_result(results, i64::from(errno::BADF));
    Ok(())
}

fn fd_close(_caller: &mut Caller<'_, HostState>, _params: &[Val], results: &mut [Val]) -> Result<()> {
    set_int_result(results, i64::from(errno::SUCCESS));
    Ok(())
}

/// `(clock_id, precision: i64, time_ptr) -> errno`
fn clock_time_get(
    caller: &mut Caller<'_, HostState>,
    params: &[Val],
    results: &mut [Val],
) -> Result<()> {
    const NAME: &str = wasi_imports::CLOCK_TIME_GET;
    let clock_id = arg_i32(params, 0, NAME)?;
    let time_ptr = arg_u32(params, 2, NAME)?;

    let nanos = if clock_id == CLOCK_REALTIME {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64
    } else {
        caller.data().elapsed_nanos()
    };
    guest_view(caller)?.set_u64(&mut *caller, time_ptr, nanos)?;
    set_int_result(results, i64::from(errno::SUCCESS));
    Ok(())
}

/// Unwinds back to the host as a catchable [`HostTrap::Exit`].
fn proc_exit(_caller: &mut Caller<'_, HostState>, params: &[Val], _results: &mut [Val]) -> Result<()> {
    let code = arg_i32(params, 0, wasi_imports::PROC_EXIT)?;
    Err(HostTrap::Exit(code).into())
}
