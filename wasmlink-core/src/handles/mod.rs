//! Ownership of opaque native handles.
//!
//! The module hands back integer handles ([`Ptr`]) for objects it allocated on
//! its own heap. Each one must reach its native destructor exactly once.
//!
//! - [`ManagedObj::delete`] releases synchronously and fails with
//!   [`LoaderError::DoubleFree`] if the handle is already gone.
//! - [`ManagedObj::delete_later`], and dropping a live [`ManagedObj`], queue the
//!   handle on its [`HandleArena`]. The embedder calls [`HandleArena::sweep`]
//!   from its own idle tick; nothing calls back into native code from `Drop`.
//!
//! Everything here is single-threaded (`Rc`/`Cell`), like the instance itself.

use std::cell::{Cell, RefCell};
use std::marker::PhantomData;
use std::rc::Rc;

use tracing::{error, trace};
use wasmtime::Val;

use crate::error::LoaderError;

/// Opaque native handle. Either valid or [`Ptr::DELETED`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Ptr(i32);

impl Ptr {
    pub const DELETED: Ptr = Ptr(-1);

    pub const fn new(raw: i32) -> Self {
        Ptr(raw)
    }

    pub const fn raw(self) -> i32 {
        self.0
    }

    pub const fn is_deleted(self) -> bool {
        self.0 == Self::DELETED.0
    }

    pub fn to_val(self) -> Val {
        Val::I32(self.0)
    }
}

impl From<i32> for Ptr {
    fn from(raw: i32) -> Self {
        Ptr(raw)
    }
}

/// Call path into the module used to run destructors and constructors.
pub trait Invoke {
    fn invoke(&mut self, name: &str, args: &[Val]) -> Result<Vec<Val>, LoaderError>;
}

/// A kind of native object: how to destroy it and, optionally, how to make a
/// default one.
pub trait NativeKind: 'static {
    const NAME: &'static str;
    /// Export taking the handle as its only argument.
    const DESTRUCTOR: &'static str;

    fn resurrect(module: &mut dyn Invoke) -> Result<Ptr, LoaderError> {
        let _ = module;
        Err(LoaderError::ResurrectUnsupported(Self::NAME))
    }
}

#[derive(Debug)]
struct Slot {
    ptr: Ptr,
    kind: &'static str,
    destructor: &'static str,
    released: Cell<bool>,
    queued: Cell<bool>,
}

impl Slot {
    fn new(ptr: Ptr, kind: &'static str, destructor: &'static str) -> Self {
        Self {
            ptr,
            kind,
            destructor,
            released: Cell::new(ptr.is_deleted()),
            queued: Cell::new(false),
        }
    }

    fn is_live(&self) -> bool {
        !self.released.get()
    }

    /// Marked released before the call: a failing destructor is never retried.
    fn release(&self, module: &mut dyn Invoke) -> Result<(), LoaderError> {
        if !self.is_live() {
            return Err(LoaderError::DoubleFree(self.ptr));
        }
        self.released.set(true);
        module.invoke(self.destructor, &[self.ptr.to_val()])?;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct ArenaInner {
    queue: RefCell<Vec<Rc<Slot>>>,
    released: Cell<u64>,
}

/// Owner of the deferred-release queue. Clones share the same queue.
#[derive(Clone, Debug, Default)]
pub struct HandleArena {
    inner: Rc<ArenaInner>,
}

impl HandleArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handles waiting for the next sweep.
    pub fn pending(&self) -> usize {
        self.inner.queue.borrow().len()
    }

    /// Destructor calls made for handles owned through this arena.
    pub fn released(&self) -> u64 {
        self.inner.released.get()
    }

    fn enqueue(&self, slot: &Rc<Slot>) {
        if slot.is_live() && !slot.queued.replace(true) {
            self.inner.queue.borrow_mut().push(Rc::clone(slot));
        }
    }

    fn count_release(&self) {
        self.inner.released.set(self.inner.released.get() + 1);
    }

    /// Drain the queue to empty, skipping handles already released elsewhere.
    ///
    /// A failing destructor does not stop the drain; the first failure is
    /// returned once the queue is empty.
    pub fn sweep(&self, module: &mut dyn Invoke) -> Result<usize, LoaderError> {
        let mut released = 0;
        let mut first_failure = None;

        loop {
            let batch = std::mem::take(&mut *self.inner.queue.borrow_mut());
            if batch.is_empty() {
                break;
            }
            for slot in batch {
                slot.queued.set(false);
                if !slot.is_live() {
                    continue;
                }
                self.count_release();
                match slot.release(module) {
                    Ok(()) => released += 1,
                    Err(e) => {
                        error!(kind = slot.kind, ptr = slot.ptr.raw(), error = %e, "deferred release failed");
                        first_failure.get_or_insert(e);
                    }
                }
            }
        }

        trace!(released, "handle sweep finished");
        match first_failure {
            Some(e) => Err(e),
            None => Ok(released),
        }
    }
}

/// Owns exactly one native handle of kind `K` at a time.
pub struct ManagedObj<K: NativeKind> {
    slot: Rc<Slot>,
    arena: HandleArena,
    _kind: PhantomData<K>,
}

impl<K: NativeKind> ManagedObj<K> {
    /// Take ownership of `ptr`.
    pub fn new(arena: &HandleArena, ptr: Ptr) -> Self {
        Self {
            slot: Rc::new(Slot::new(ptr, K::NAME, K::DESTRUCTOR)),
            arena: arena.clone(),
            _kind: PhantomData,
        }
    }

    /// Construct with a fresh default handle from [`NativeKind::resurrect`].
    pub fn resurrect(arena: &HandleArena, module: &mut dyn Invoke) -> Result<Self, LoaderError> {
        let ptr = K::resurrect(module)?;
        Ok(Self::new(arena, ptr))
    }

    /// The live handle.
    pub fn ptr(&self) -> Result<Ptr, LoaderError> {
        if self.slot.is_live() {
            Ok(self.slot.ptr)
        } else {
            Err(LoaderError::NotInitialized(K::NAME))
        }
    }

    pub fn is_deleted(&self) -> bool {
        !self.slot.is_live()
    }

    /// Release the current handle, then adopt `next`.
    ///
    /// `next` is adopted even if releasing the old handle fails.
    pub fn set_ptr(&mut self, module: &mut dyn Invoke, next: Ptr) -> Result<(), LoaderError> {
        if self.slot.is_live() && self.slot.ptr == next {
            return Ok(());
        }
        let released = if self.slot.is_live() {
            self.release_now(module)
        } else {
            Ok(())
        };
        self.slot = Rc::new(Slot::new(next, K::NAME, K::DESTRUCTOR));
        released
    }

    /// Release the handle now.
    pub fn delete(&mut self, module: &mut dyn Invoke) -> Result<(), LoaderError> {
        if !self.slot.is_live() {
            return Err(LoaderError::DoubleFree(self.slot.ptr));
        }
        self.release_now(module)
    }

    /// Queue the handle for the next [`HandleArena::sweep`].
    pub fn delete_later(&self) {
        self.arena.enqueue(&self.slot);
    }

    fn release_now(&self, module: &mut dyn Invoke) -> Result<(), LoaderError> {
        self.arena.count_release();
        self.slot.release(module)
    }
}

impl<K: NativeKind> Drop for ManagedObj<K> {
    fn drop(&mut self) {
        self.arena.enqueue(&self.slot);
    }
}

impl<K: NativeKind> core::fmt::Debug for ManagedObj<K> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ManagedObj")
            .field("kind", &K::NAME)
            .field("ptr", &self.slot.ptr)
            .field("deleted", &self.is_deleted())
            .finish()
    }
}
