//! ABI contract between the host and a toolchain-produced module.
//!
//! The module was linked assuming a runtime that would:
//! - satisfy every import under `"env"`, the dynamic-linking address tables
//!   (`"GOT.mem"` / `"GOT.func"`) and the syscall-lite namespace,
//! - bring up its stack protocol and run its constructors before any real call.
//!
//! ## Imports (module -> host)
//! See [`env_imports`] and [`wasi_imports`] for the symbols that have concrete
//! host implementations. `invoke_*` functions under `"env"` are indirect-call
//! trampolines: argument 0 is an index into the shared function table, the rest
//! are forwarded to the referenced function.
//!
//! ## Exports (host -> module)
//! See [`module_exports`]. Every lookup also tries the `_`-prefixed spelling.

pub mod init;

pub use init::{AbiState, StackLimits};

/// Import namespace for toolchain runtime helpers.
pub const IMPORT_MODULE: &str = "env";

/// Address table for cross-module data symbols.
pub const GOT_MEM: &str = "GOT.mem";

/// Address table for cross-module function symbols.
pub const GOT_FUNC: &str = "GOT.func";

/// Syscall-lite namespace.
pub const WASI_MODULE: &str = "wasi_snapshot_preview1";

/// Prefix of the indirect-call trampoline family.
pub const INVOKE_PREFIX: &str = "invoke_";

/// Prefix some toolchains put in front of every export.
pub const LEGACY_EXPORT_PREFIX: &str = "_";

/// Known `"env"` imports.
pub mod env_imports {
    pub const ABORT: &str = "abort";
    pub const ABORT_JS: &str = "_abort_js";
    pub const ASSERT_FAIL: &str = "__assert_fail";
    pub const NOTIFY_MEMORY_GROWTH: &str = "emscripten_notify_memory_growth";
    pub const RESIZE_HEAP: &str = "emscripten_resize_heap";
    pub const GET_HEAP_MAX: &str = "emscripten_get_heap_max";
    pub const DATE_NOW: &str = "emscripten_date_now";
    pub const GET_NOW: &str = "emscripten_get_now";
    pub const GET_NOW_IS_MONOTONIC: &str = "_emscripten_get_now_is_monotonic";
    pub const MEMCPY_JS: &str = "emscripten_memcpy_js";
    pub const MEMCPY_JS_LEGACY: &str = "_emscripten_memcpy_js";

    // Non-function imports the host allocates itself.
    pub const MEMORY: &str = "memory";
    pub const INDIRECT_FUNCTION_TABLE: &str = "__indirect_function_table";
    pub const MEMORY_BASE: &str = "__memory_base";
    pub const TABLE_BASE: &str = "__table_base";
    pub const STACK_POINTER: &str = "__stack_pointer";
    pub const CPP_EXCEPTION_TAG: &str = "__cpp_exception";
    pub const LONGJMP_TAG: &str = "__c_longjmp";
}

/// Known syscall-lite imports.
pub mod wasi_imports {
    pub const ENVIRON_SIZES_GET: &str = "environ_sizes_get";
    pub const ENVIRON_GET: &str = "environ_get";
    pub const ARGS_SIZES_GET: &str = "args_sizes_get";
    pub const ARGS_GET: &str = "args_get";
    pub const FD_WRITE: &str = "fd_write";
    pub const FD_READ: &str = "fd_read";
    pub const FD_SEEK: &str = "fd_seek";
    pub const FD_PREAD: &str = "fd_pread";
    pub const FD_CLOSE: &str = "fd_close";
    pub const CLOCK_TIME_GET: &str = "clock_time_get";
    pub const PROC_EXIT: &str = "proc_exit";
}

/// Exports the host looks for.
pub mod module_exports {
    pub const MEMORY: &str = "memory";
    pub const INDIRECT_FUNCTION_TABLE: &str = "__indirect_function_table";
    pub const HEAP_BASE: &str = "__heap_base";

    pub const STACK_INIT: &str = "emscripten_stack_init";
    pub const STACK_GET_BASE: &str = "emscripten_stack_get_base";
    pub const STACK_GET_END: &str = "emscripten_stack_get_end";
    pub const SET_STACK_LIMITS: &str = "__set_stack_limits";
    /// Newer toolchains export the limit setter under this name instead.
    pub const STACK_SET_LIMITS: &str = "emscripten_stack_set_limits";
    pub const CALL_CTORS: &str = "__wasm_call_ctors";

    pub const MALLOC: &str = "malloc";
    pub const FREE: &str = "free";
}

/// WASI errno values returned by the syscall-lite shim.
pub mod errno {
    pub const SUCCESS: i32 = 0;
    pub const BADF: i32 = 8;
    pub const INVAL: i32 = 28;
}

/// Bring-up stages, in order. There are no backward transitions.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum AbiStage {
    Uninitialized,
    StackReady,
    LimitsApplied,
    CtorsRun,
    Ready,
}
