use std::sync::{Arc, Mutex};

use wasmtime::Val;

use crate::abi::{AbiStage, StackLimits};
use crate::config::LoaderConfig;
use crate::error::LoaderError;
use crate::handles::{Invoke, ManagedObj, NativeKind, Ptr};
use crate::instance::LoadedModule;
use crate::loader::{Loader, load};
use crate::state::OutputSink;

/// A module shaped like toolchain output: runtime imports it mostly never
/// calls, its own stack/ctor exports, a bump allocator and a handle-based API.
const CANVAS: &str = r#"
(module
  (import "env" "mystery_feature" (func $mystery (param i32) (result i32)))
  (import "env" "invoke_iii" (func $invoke_iii (param i32 i32 i32) (result i32)))
  (import "GOT.mem" "shared_data" (global $got_a (mut i32)))
  (import "GOT.mem" "shared_data" (global $got_b (mut i32)))
  (import "GOT.func" "on_frame" (global $got_fn (mut i32)))
  (import "wasi_snapshot_preview1" "fd_write" (func $fd_write (param i32 i32 i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "fd_read" (func $fd_read (param i32 i32 i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "environ_sizes_get" (func $environ_sizes (param i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "proc_exit" (func $exit (param i32)))
  (import "env" "emscripten_resize_heap" (func $resize (param i32) (result i32)))
  (import "env" "__assert_fail" (func $assert_fail (param i32 i32 i32 i32)))
  (import "env" "emscripten_get_now" (func $now (result f64)))

  (memory (export "memory") 1 16)
  (table (export "__indirect_function_table") 4 funcref)
  (elem (i32.const 1) $add_impl)

  (global $heap (mut i32) (i32.const 4096))
  (global $deletes (mut i32) (i32.const 0))
  (global $ctors (mut i32) (i32.const 0))
  (global $stack_base (mut i32) (i32.const 0))
  (global $stack_end (mut i32) (i32.const 0))
  (global $limit_base (mut i32) (i32.const 0))
  (global $limit_end (mut i32) (i32.const 0))
  (global (export "__heap_base") i32 (i32.const 4096))

  (data (i32.const 256) "hello from native\n")
  (data (i32.const 512) "x != 0\00paint.cpp\00draw\00")
  (data (i32.const 8192) "dirty")

  (func $add_impl (param i32 i32) (result i32)
    local.get 0 local.get 1 i32.add)
  (func (export "_add") (param i32 i32) (result i32)
    local.get 0 local.get 1 i32.add)

  (func $malloc (export "malloc") (param $n i32) (result i32) (local $p i32)
    global.get $heap local.set $p
    global.get $heap local.get $n i32.add i32.const 7 i32.add i32.const -8 i32.and
    global.set $heap
    local.get $p)
  (func (export "free") (param i32))

  (func (export "emscripten_stack_init")
    (global.set $stack_base (i32.const 65536))
    (global.set $stack_end (i32.const 32768)))
  (func (export "emscripten_stack_get_base") (result i32) global.get $stack_base)
  (func (export "emscripten_stack_get_end") (result i32) global.get $stack_end)
  (func (export "__set_stack_limits") (param i32 i32)
    local.get 0 global.set $limit_base
    local.get 1 global.set $limit_end)
  (func (export "__wasm_call_ctors")
    global.get $ctors i32.const 1 i32.add global.set $ctors)
  (func (export "ctor_count") (result i32) global.get $ctors)
  (func (export "limit_base") (result i32) global.get $limit_base)

  (func (export "Paint_new") (result i32) i32.const 16 call $malloc)
  (func (export "Paint_delete") (param i32)
    global.get $deletes i32.const 1 i32.add global.set $deletes)
  (func (export "delete_count") (result i32) global.get $deletes)

  (func (export "call_mystery") (result i32) i32.const 7 call $mystery)
  (func (export "indirect_add") (param i32 i32 i32) (result i32)
    local.get 0 local.get 1 local.get 2 call $invoke_iii)
  (func (export "set_got") (param i32) local.get 0 global.set $got_a)
  (func (export "get_got_b") (result i32) global.get $got_b)
  (func (export "get_got_fn") (result i32) global.get $got_fn)

  (func (export "say_hello") (result i32)
    (i32.store (i32.const 128) (i32.const 256))
    (i32.store (i32.const 132) (i32.const 18))
    (drop (call $fd_write (i32.const 1) (i32.const 128) (i32.const 1) (i32.const 136)))
    (i32.load (i32.const 136)))
  (func (export "try_read") (result i32)
    (i32.store (i32.const 140) (i32.const 99))
    (call $fd_read (i32.const 0) (i32.const 128) (i32.const 1) (i32.const 140)))
  (func (export "nread") (result i32) (i32.load (i32.const 140)))
  (func (export "environ_count") (result i32)
    (i32.store (i32.const 144) (i32.const 5))
    (drop (call $environ_sizes (i32.const 144) (i32.const 148)))
    (i32.load (i32.const 144)))
  (func (export "quit") (call $exit (i32.const 3)))
  (func (export "resize") (param i32) (result i32) local.get 0 call $resize)
  (func (export "check")
    (call $assert_fail (i32.const 512) (i32.const 519) (i32.const 42) (i32.const 529)))
  (func (export "now") (result f64) call $now)
  (func (export "grow") (param i32) (result i32) local.get 0 memory.grow))
"#;

const PAGE: u32 = 64 * 1024;

fn canvas() -> LoadedModule {
    load(CANVAS.as_bytes(), LoaderConfig::default()).unwrap()
}

fn i32s(values: &[i32]) -> Vec<Val> {
    values.iter().map(|&v| Val::I32(v)).collect()
}

struct Paint;

impl NativeKind for Paint {
    const NAME: &'static str = "Paint";
    const DESTRUCTOR: &'static str = "Paint_delete";

    fn resurrect(module: &mut dyn Invoke) -> Result<Ptr, LoaderError> {
        let out = module.invoke("Paint_new", &[])?;
        Ok(Ptr::new(out[0].unwrap_i32()))
    }
}

#[derive(Clone, Default)]
struct CaptureSink(Arc<Mutex<Vec<(u32, String)>>>);

impl OutputSink for CaptureSink {
    fn write(&mut self, fd: u32, text: &str) {
        self.0.lock().unwrap().push((fd, text.to_owned()));
    }
}

#[test]
fn legacy_underscore_export_is_invoked_by_plain_name() {
    let mut module = canvas();
    assert_eq!(module.invoke_i32("add", &i32s(&[2, 3])).unwrap(), 5);
    assert_eq!(module.invoke_i32("_add", &i32s(&[2, 3])).unwrap(), 5);
}

#[test]
fn absent_exports_stay_absent() {
    let mut module = canvas();
    assert!(!module.has_export("gpu_surface"));
    assert!(!module.has_export("gpu_surface"));
    assert!(module.resolve("gpu_surface").is_none());
    assert!(matches!(
        module.invoke("gpu_surface", &[]),
        Err(LoaderError::ExportNotFound(_))
    ));
    assert!(module.has_export("delete_count"));
}

#[test]
fn malloc_round_trips_u32_array() {
    let mut module = canvas();
    let ptr = module.malloc(16).unwrap();
    module.write_u32_array(ptr, &[1, 2, 3, 4]).unwrap();
    assert_eq!(module.read_u32_array(ptr, 4).unwrap(), vec![1, 2, 3, 4]);
    module.free(ptr).unwrap();
}

#[test]
fn alloc_copies_bytes_and_scalars_round_trip() {
    let mut module = canvas();
    let ptr = module.alloc(b"skia\0").unwrap();
    assert_eq!(module.read_c_string(ptr).unwrap(), "skia");

    let floats = module.malloc(8).unwrap();
    module.write_f32_array(floats, &[0.25, -2.0]).unwrap();
    assert_eq!(module.read_f32_array(floats, 2).unwrap(), vec![0.25, -2.0]);
    module.set_f32(floats, 3.5).unwrap();
    assert_eq!(module.get_f32(floats).unwrap(), 3.5);
    module.set_u8(floats, 9).unwrap();
    assert_eq!(module.get_u8(floats).unwrap(), 9);
}

#[test]
fn writes_after_module_side_growth_land_in_new_pages() {
    let mut module = canvas();
    assert_eq!(module.memory_size(), PAGE as usize);
    assert_eq!(module.invoke_i32("grow", &i32s(&[2])).unwrap(), 1);

    let ptr = 2 * PAGE + 64;
    module.write_u8_array(ptr, &[5, 6, 7]).unwrap();
    assert_eq!(module.read_u8_array(ptr, 3).unwrap(), vec![5, 6, 7]);
    module.set_u32(ptr + 8, 0xDEAD_BEEF).unwrap();
    assert_eq!(module.get_u32(ptr + 8).unwrap(), 0xDEAD_BEEF);
}

#[test]
fn abi_bring_up_applies_stack_limits_and_runs_ctors_once() {
    let mut module = canvas();
    assert_eq!(module.abi_state().stage(), AbiStage::Ready);
    assert_eq!(
        module.abi_state().limits(),
        Some(StackLimits {
            base: 65536,
            end: 32768
        })
    );
    assert_eq!(module.invoke_i32("limit_base", &[]).unwrap(), 65536);
    assert_eq!(module.invoke_i32("ctor_count", &[]).unwrap(), 1);
}

#[test]
fn skip_init_leaves_initializers_to_embedder() {
    let config = LoaderConfig::default().with_skip_init(true);
    let mut module = load(CANVAS.as_bytes(), config).unwrap();
    assert!(module.abi_state().is_ready());
    assert_eq!(module.abi_state().limits(), None);
    assert_eq!(module.invoke_i32("ctor_count", &[]).unwrap(), 0);
    assert_eq!(module.invoke_i32("limit_base", &[]).unwrap(), 0);
}

#[test]
fn missing_stack_exports_leave_limits_unset() {
    let module = load(
        br#"(module (memory (export "memory") 1) (func (export "__wasm_call_ctors")))"#,
        LoaderConfig::default(),
    )
    .unwrap();
    assert!(module.abi_state().is_ready());
    assert_eq!(module.abi_state().limits(), None);
}

#[test]
fn failing_constructor_fails_the_load() {
    let result = load(
        br#"(module (memory (export "memory") 1) (func (export "__wasm_call_ctors") unreachable))"#,
        LoaderConfig::default(),
    );
    assert!(matches!(
        result,
        Err(LoaderError::InitializationFailed {
            stage: AbiStage::CtorsRun,
            ..
        })
    ));
}

#[test]
fn zero_memory_clears_heap_but_keeps_static_data() {
    let config = LoaderConfig::default().with_zero_memory(true);
    let module = load(CANVAS.as_bytes(), config).unwrap();
    assert_eq!(module.get_u8(8192).unwrap(), 0);
    assert_eq!(module.read_u8_array(256, 5).unwrap(), b"hello");

    let untouched = canvas();
    assert_eq!(untouched.get_u8(8192).unwrap(), b'd');
}

#[test]
fn lenient_unknown_import_returns_zero() {
    let mut module = canvas();
    assert_eq!(module.invoke_i32("call_mystery", &[]).unwrap(), 0);
    assert_eq!(module.stubbed_imports(), ["env.mystery_feature"]);
}

#[test]
fn strict_mode_rejects_unknown_import() {
    let config = LoaderConfig::default().with_strict_imports(true);
    match load(CANVAS.as_bytes(), config) {
        Err(LoaderError::MissingImport { module, name }) => {
            assert_eq!(module, "env");
            assert_eq!(name, "mystery_feature");
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("strict load should fail"),
    }
}

#[test]
fn got_entries_are_zero_and_shared_per_name() {
    let mut module = canvas();
    assert_eq!(module.invoke_i32("get_got_b", &[]).unwrap(), 0);
    assert_eq!(module.invoke_i32("get_got_fn", &[]).unwrap(), 0);

    module.invoke("set_got", &i32s(&[77])).unwrap();
    assert_eq!(module.invoke_i32("get_got_b", &[]).unwrap(), 77);
}

#[test]
fn trampoline_dispatches_through_function_table() {
    let mut module = canvas();
    assert_eq!(
        module.invoke_i32("indirect_add", &i32s(&[1, 40, 2])).unwrap(),
        42
    );
}

#[test]
fn trampoline_on_empty_slot_is_missing_target() {
    let mut module = canvas();
    assert!(matches!(
        module.invoke("indirect_add", &i32s(&[0, 1, 1])),
        Err(LoaderError::MissingIndirectTarget(0))
    ));
    assert!(matches!(
        module.invoke("indirect_add", &i32s(&[9, 1, 1])),
        Err(LoaderError::MissingIndirectTarget(9))
    ));
    assert_eq!(module.invoke_i32("add", &i32s(&[1, 1])).unwrap(), 2);
}

#[test]
fn fd_write_forwards_text_to_sink() {
    let sink = CaptureSink::default();
    let mut module = Loader::new(LoaderConfig::default())
        .with_sink(Box::new(sink.clone()))
        .load(CANVAS.as_bytes())
        .unwrap();

    assert_eq!(module.invoke_i32("say_hello", &[]).unwrap(), 18);
    let lines = sink.0.lock().unwrap();
    assert_eq!(lines.as_slice(), [(1, "hello from native\n".to_owned())]);
}

#[test]
fn reads_report_bad_descriptor_and_zero_count() {
    let mut module = canvas();
    assert_eq!(module.invoke_i32("try_read", &[]).unwrap(), 8);
    assert_eq!(module.invoke_i32("nread", &[]).unwrap(), 0);
    assert_eq!(module.invoke_i32("environ_count", &[]).unwrap(), 0);
}

#[test]
fn proc_exit_is_catchable_and_instance_survives() {
    let mut module = canvas();
    assert!(matches!(
        module.invoke("quit", &[]),
        Err(LoaderError::ProcessExit(3))
    ));
    assert_eq!(module.invoke_i32("add", &i32s(&[4, 4])).unwrap(), 8);
}

#[test]
fn assert_fail_decodes_diagnostics() {
    let mut module = canvas();
    match module.invoke("check", &[]) {
        Err(LoaderError::Abort(msg)) => {
            assert!(msg.contains("x != 0"), "{msg}");
            assert!(msg.contains("paint.cpp:42"), "{msg}");
            assert!(msg.contains("draw"), "{msg}");
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn resize_heap_grows_within_declared_maximum() {
    let mut module = canvas();
    assert_eq!(module.invoke_i32("resize", &i32s(&[3 * PAGE as i32])).unwrap(), 1);
    assert_eq!(module.memory_size(), 3 * PAGE as usize);
    assert_eq!(module.growth_events(), 1);

    assert_eq!(module.invoke_i32("resize", &i32s(&[PAGE as i32])).unwrap(), 1);
    assert_eq!(module.invoke_i32("resize", &i32s(&[32 * PAGE as i32])).unwrap(), 0);
    assert_eq!(module.memory_size(), 3 * PAGE as usize);
}

#[test]
fn monotonic_clock_moves_forward() {
    let mut module = canvas();
    let a = module.invoke("now", &[]).unwrap()[0].unwrap_f64();
    let b = module.invoke("now", &[]).unwrap()[0].unwrap_f64();
    assert!(a >= 0.0);
    assert!(b >= a);
}

#[test]
fn host_allocates_imported_memory_and_table() {
    const DYLINK: &str = r#"
    (module
      (import "env" "memory" (memory 1))
      (import "env" "__indirect_function_table" (table 2 funcref))
      (import "env" "__memory_base" (global i32))
      (import "env" "__stack_pointer" (global (mut i32)))
      (import "env" "invoke_ii" (func $invoke_ii (param i32 i32) (result i32)))
      (func (export "store_byte") (param i32 i32)
        local.get 0 local.get 1 i32.store8)
      (func (export "call_slot") (param i32 i32) (result i32)
        local.get 0 local.get 1 call $invoke_ii))
    "#;
    let config = LoaderConfig::default().with_strict_imports(true);
    let mut module = load(DYLINK.as_bytes(), config).unwrap();

    module.invoke("store_byte", &i32s(&[10, 42])).unwrap();
    assert_eq!(module.get_u8(10).unwrap(), 42);
    assert!(matches!(
        module.invoke("call_slot", &i32s(&[1, 0])),
        Err(LoaderError::MissingIndirectTarget(1))
    ));
}

#[test]
fn strict_mode_rejects_unknown_global() {
    const WAT: &str = r#"
    (module
      (import "env" "g_flags" (global i32))
      (memory (export "memory") 1))
    "#;
    assert!(load(WAT.as_bytes(), LoaderConfig::default()).is_ok());
    assert!(matches!(
        load(WAT.as_bytes(), LoaderConfig::default().with_strict_imports(true)),
        Err(LoaderError::MissingImport { .. })
    ));
}

#[test]
fn managed_objects_release_once_across_paths() {
    let mut module = canvas();
    let arena = module.handles().clone();

    let mut paint = ManagedObj::<Paint>::resurrect(&arena, &mut module).unwrap();
    paint.delete_later();
    paint.delete(&mut module).unwrap();
    assert!(matches!(
        paint.delete(&mut module),
        Err(LoaderError::DoubleFree(_))
    ));
    module.sweep().unwrap();
    assert_eq!(module.invoke_i32("delete_count", &[]).unwrap(), 1);

    let mut other = ManagedObj::<Paint>::resurrect(&arena, &mut module).unwrap();
    let replacement = Ptr::new(module.invoke_i32("Paint_new", &[]).unwrap());
    other.set_ptr(&mut module, replacement).unwrap();
    assert_eq!(module.invoke_i32("delete_count", &[]).unwrap(), 2);
    assert_eq!(other.ptr().unwrap(), replacement);
}

#[test]
fn dropping_a_thousand_wrappers_drains_on_sweep() {
    let mut module = canvas();
    let arena = module.handles().clone();

    let objects: Vec<ManagedObj<Paint>> = (0..1000)
        .map(|_| ManagedObj::<Paint>::resurrect(&arena, &mut module).unwrap())
        .collect();
    assert_eq!(arena.pending(), 0);
    drop(objects);
    assert_eq!(arena.pending(), 1000);

    assert_eq!(module.sweep().unwrap(), 1000);
    assert_eq!(arena.pending(), 0);
    assert_eq!(module.invoke_i32("delete_count", &[]).unwrap(), 1000);
    assert_eq!(arena.released(), 1000);
}

#[test]
fn loaded_instances_are_independent() {
    let mut a = canvas();
    let mut b = canvas();
    a.invoke("set_got", &i32s(&[5])).unwrap();
    assert_eq!(a.invoke_i32("get_got_b", &[]).unwrap(), 5);
    assert_eq!(b.invoke_i32("get_got_b", &[]).unwrap(), 0);
}

/// Runtime helpers `CANVAS` never calls, each behind a one-line export.
const RUNTIME_HELPERS: &str = r#"
(module
  (import "wasi_snapshot_preview1" "fd_seek" (func $fd_seek (param i32 i64 i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "fd_pread" (func $fd_pread (param i32 i32 i32 i64 i32) (result i32)))
  (import "wasi_snapshot_preview1" "clock_time_get" (func $clock (param i32 i64 i32) (result i32)))
  (import "env" "emscripten_get_heap_max" (func $heap_max (result i32)))
  (import "env" "emscripten_notify_memory_growth" (func $notify (param i32)))
  (import "env" "emscripten_memcpy_js" (func $memcpy (param i32 i32 i32)))
  (import "env" "abort" (func $abort))
  (import "env" "_abort_js" (func $abort_js))
  (import "env" "_emscripten_get_now_is_monotonic" (func $is_monotonic (result f64)))

  (memory (export "memory") 1 4)
  (data (i32.const 64) "stroke!")

  (func (export "seek") (result i32)
    (i64.store (i32.const 16) (i64.const -1))
    (call $fd_seek (i32.const 3) (i64.const 10) (i32.const 0) (i32.const 16)))
  (func (export "seek_offset") (result i64) (i64.load (i32.const 16)))
  (func (export "pread") (result i32)
    (i32.store (i32.const 24) (i32.const 99))
    (call $fd_pread (i32.const 3) (i32.const 0) (i32.const 0) (i64.const 0) (i32.const 24)))
  (func (export "pread_count") (result i32) (i32.load (i32.const 24)))
  (func (export "clock") (param i32) (result i64)
    (drop (call $clock (local.get 0) (i64.const 1) (i32.const 32)))
    (i64.load (i32.const 32)))
  (func (export "heap_max") (result i32) call $heap_max)
  (func (export "grow_and_notify") (result i32)
    (drop (memory.grow (i32.const 1)))
    (call $notify (i32.const 0))
    (memory.size))
  (func (export "copy") (call $memcpy (i32.const 128) (i32.const 64) (i32.const 7)))
  (func (export "do_abort") call $abort)
  (func (export "do_abort_js") call $abort_js)
  (func (export "is_monotonic") (result f64) call $is_monotonic))
"#;

fn runtime_helpers() -> LoadedModule {
    let config = LoaderConfig::default().with_strict_imports(true);
    load(RUNTIME_HELPERS.as_bytes(), config).unwrap()
}

#[test]
fn seek_and_pread_report_bad_descriptor_with_zeroed_outputs() {
    let mut module = runtime_helpers();
    assert_eq!(module.invoke_i32("seek", &[]).unwrap(), 8);
    assert_eq!(module.invoke("seek_offset", &[]).unwrap()[0].unwrap_i64(), 0);
    assert_eq!(module.invoke_i32("pread", &[]).unwrap(), 8);
    assert_eq!(module.invoke_i32("pread_count", &[]).unwrap(), 0);
}

#[test]
fn clock_time_get_distinguishes_realtime_from_monotonic() {
    let mut module = runtime_helpers();
    let realtime = module.invoke("clock", &i32s(&[0])).unwrap()[0].unwrap_i64();
    let first = module.invoke("clock", &i32s(&[1])).unwrap()[0].unwrap_i64();
    let second = module.invoke("clock", &i32s(&[1])).unwrap()[0].unwrap_i64();

    // Nanoseconds since the epoch, well past 2020.
    assert!(realtime > 1_577_836_800_000_000_000, "{realtime}");
    assert!(first >= 0);
    assert!(second >= first);
    assert!(second < realtime);
}

#[test]
fn heap_max_reports_declared_maximum() {
    let mut module = runtime_helpers();
    assert_eq!(module.invoke_i32("heap_max", &[]).unwrap(), 4 * PAGE as i32);
}

#[test]
fn heap_max_without_declared_maximum_is_two_gib() {
    const WAT: &str = r#"
    (module
      (import "env" "emscripten_get_heap_max" (func $max (result i32)))
      (memory (export "memory") 1)
      (func (export "heap_max") (result i32) call $max))
    "#;
    let mut module = load(WAT.as_bytes(), LoaderConfig::default()).unwrap();
    let max = module.invoke_i32("heap_max", &[]).unwrap() as u32;
    assert_eq!(max, 2 * 1024 * 1024 * 1024);
}

#[test]
fn memory_growth_notification_is_counted() {
    let mut module = runtime_helpers();
    assert_eq!(module.growth_events(), 0);
    assert_eq!(module.invoke_i32("grow_and_notify", &[]).unwrap(), 2);
    assert_eq!(module.growth_events(), 1);
    assert_eq!(module.memory_size(), 2 * PAGE as usize);
}

#[test]
fn memcpy_js_copies_within_memory() {
    let mut module = runtime_helpers();
    module.invoke("copy", &[]).unwrap();
    assert_eq!(module.read_u8_array(128, 7).unwrap(), b"stroke!");
}

#[test]
fn abort_imports_surface_as_abort() {
    let mut module = runtime_helpers();
    assert!(matches!(module.invoke("do_abort", &[]), Err(LoaderError::Abort(_))));
    assert!(matches!(module.invoke("do_abort_js", &[]), Err(LoaderError::Abort(_))));
    assert!(module.invoke("copy", &[]).is_ok());
}

#[test]
fn integer_helper_fills_float_result() {
    let mut module = runtime_helpers();
    let out = module.invoke("is_monotonic", &[]).unwrap();
    assert_eq!(out[0].unwrap_f64(), 1.0);
}

#[test]
fn exception_tags_are_provided_in_both_modes() {
    const WAT: &str = r#"
    (module
      (import "env" "__cpp_exception" (tag (param i32)))
      (import "env" "__c_longjmp" (tag (param i32)))
      (memory (export "memory") 1))
    "#;
    let lenient = load(WAT.as_bytes(), LoaderConfig::default()).unwrap();
    assert!(lenient.stubbed_imports().is_empty());
    assert!(load(WAT.as_bytes(), LoaderConfig::default().with_strict_imports(true)).is_ok());
}

#[test]
fn unknown_tag_is_stubbed_when_lenient_and_rejected_when_strict() {
    const WAT: &str = r#"
    (module
      (import "env" "__engine_fault" (tag (param i32 i32)))
      (memory (export "memory") 1))
    "#;
    let module = load(WAT.as_bytes(), LoaderConfig::default()).unwrap();
    assert_eq!(module.stubbed_imports(), ["env.__engine_fault"]);
    assert!(matches!(
        load(WAT.as_bytes(), LoaderConfig::default().with_strict_imports(true)),
        Err(LoaderError::MissingImport { .. })
    ));
}

#[test]
fn memory_from_unknown_namespace_follows_import_policy() {
    const WAT: &str = r#"
    (module
      (import "js" "mem" (memory 1))
      (func (export "peek") (result i32) (i32.load8_u (i32.const 3))))
    "#;
    let mut module = load(WAT.as_bytes(), LoaderConfig::default()).unwrap();
    assert_eq!(module.stubbed_imports(), ["js.mem"]);
    module.set_u8(3, 7).unwrap();
    assert_eq!(module.invoke_i32("peek", &[]).unwrap(), 7);

    match load(WAT.as_bytes(), LoaderConfig::default().with_strict_imports(true)) {
        Err(LoaderError::MissingImport { module, name }) => {
            assert_eq!((module.as_str(), name.as_str()), ("js", "mem"));
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("strict load should fail"),
    }
}

#[test]
fn stack_limits_use_newer_setter_name() {
    const WAT: &str = r#"
    (module
      (memory (export "memory") 1)
      (global $limit (mut i32) (i32.const 0))
      (func (export "emscripten_stack_get_base") (result i32) i32.const 65536)
      (func (export "emscripten_stack_get_end") (result i32) i32.const 16384)
      (func (export "emscripten_stack_set_limits") (param i32 i32)
        local.get 1 global.set $limit)
      (func (export "limit_end") (result i32) global.get $limit))
    "#;
    let mut module = load(WAT.as_bytes(), LoaderConfig::default()).unwrap();
    assert_eq!(
        module.abi_state().limits(),
        Some(StackLimits {
            base: 65536,
            end: 16384
        })
    );
    assert_eq!(module.invoke_i32("limit_end", &[]).unwrap(), 16384);
}

#[test]
fn stack_bounds_without_a_setter_are_not_recorded() {
    const WAT: &str = r#"
    (module
      (memory (export "memory") 1)
      (func (export "emscripten_stack_get_base") (result i32) i32.const 65536)
      (func (export "emscripten_stack_get_end") (result i32) i32.const 16384))
    "#;
    let module = load(WAT.as_bytes(), LoaderConfig::default()).unwrap();
    assert!(module.abi_state().is_ready());
    assert_eq!(module.abi_state().limits(), None);
}
