//! Nested Context Stack
//!
//! Per-thread scope stack giving a manager deterministic "current value"
//! semantics even when scopes are closed out of order.
//!
//! Frames live in a thread-local arena keyed by the owning stack. A frame links
//! to the frame that was current when it was activated through an index, never
//! through ownership. Closing the current frame unwinds the back-links to the
//! nearest open ancestor; closing any other frame only marks it closed, so the
//! close stays invisible until every newer open frame above it is gone.

use crate::error::ManagerError;
use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{trace, warn};

static NEXT_STACK_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static ARENAS: RefCell<HashMap<StackId, Box<dyn Any>>> = RefCell::new(HashMap::new());
}

/// Callback mirroring the visible value into an external facility.
pub type SyncHook<T> = Arc<dyn Fn(Option<&T>) -> Result<(), ManagerError> + Send + Sync>;

/// Identity of one stack; selects its arena on every thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StackId(u64);

impl StackId {
    fn next() -> Self {
        StackId(NEXT_STACK_ID.fetch_add(1, Ordering::Relaxed))
    }
}

struct Frame<T> {
    serial: u64,
    value: Option<T>,
    previous: Option<usize>,
    closed: bool,
}

struct Arena<T> {
    frames: Vec<Frame<T>>,
    current: Option<usize>,
}

impl<T> Arena<T> {
    fn new() -> Self {
        Arena {
            frames: Vec::new(),
            current: None,
        }
    }

    fn push(&mut self, value: Option<T>) -> (usize, u64) {
        let serial = NEXT_SERIAL.fetch_add(1, Ordering::Relaxed);
        let index = self.frames.len();
        self.frames.push(Frame {
            serial,
            value,
            previous: self.current,
            closed: false,
        });
        self.current = Some(index);
        (index, serial)
    }

    /// Nearest open frame reachable from `start` through back-links.
    fn nearest_open(&self, start: Option<usize>) -> Option<usize> {
        let mut cursor = start;
        while let Some(index) = cursor {
            let frame = &self.frames[index];
            if !frame.closed {
                return Some(index);
            }
            cursor = frame.previous;
        }
        None
    }

    fn current_value(&self) -> Option<&T> {
        self.nearest_open(self.current)
            .and_then(|index| self.frames[index].value.as_ref())
    }

    fn open_depth(&self) -> usize {
        let mut depth = 0;
        let mut cursor = self.nearest_open(self.current);
        while let Some(index) = cursor {
            depth += 1;
            cursor = self.nearest_open(self.frames[index].previous);
        }
        depth
    }

    /// Marks the frame closed. Returns the frames discarded by the unwind and
    /// whether the visible current frame changed.
    fn close(&mut self, index: usize, serial: u64) -> (bool, Vec<Frame<T>>) {
        match self.frames.get_mut(index) {
            Some(frame) if frame.serial == serial && !frame.closed => frame.closed = true,
            _ => return (false, Vec::new()),
        }
        if self.current != Some(index) {
            return (false, Vec::new());
        }

        // Every frame above the nearest open ancestor is closed: a frame only
        // links past frames that were already closed when it was activated.
        let ancestor = self.nearest_open(self.frames[index].previous);
        self.current = ancestor;
        let keep = ancestor.map(|i| i + 1).unwrap_or(0);
        let discarded = self.frames.split_off(keep);
        (true, discarded)
    }

    fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

fn with_arena<T: 'static, R>(id: StackId, f: impl FnOnce(&mut Arena<T>) -> R) -> Option<R> {
    ARENAS
        .try_with(|arenas| {
            let mut arenas = arenas.borrow_mut();
            let entry = arenas
                .entry(id)
                .or_insert_with(|| Box::new(Arena::<T>::new()));
            let arena = entry.downcast_mut::<Arena<T>>()?;
            let result = f(arena);
            if arena.is_empty() {
                arenas.remove(&id);
            }
            Some(result)
        })
        .ok()
        .flatten()
}

/// Read-only access; a thread with no arena for `id` yields `None`.
fn read_arena<T: 'static, R>(id: StackId, f: impl FnOnce(&Arena<T>) -> R) -> Option<R> {
    ARENAS
        .try_with(|arenas| {
            let arenas = arenas.borrow();
            let arena = arenas.get(&id)?.downcast_ref::<Arena<T>>()?;
            Some(f(arena))
        })
        .ok()
        .flatten()
}

/// Per-thread nested scopes for one category of value.
///
/// Cloning yields another handle to the same stack.
pub struct NestedStack<T> {
    id: StackId,
    name: Arc<str>,
    sync: Option<SyncHook<T>>,
    _values: PhantomData<fn(T) -> T>,
}

impl<T> Clone for NestedStack<T> {
    fn clone(&self) -> Self {
        NestedStack {
            id: self.id,
            name: self.name.clone(),
            sync: self.sync.clone(),
            _values: PhantomData,
        }
    }
}

impl<T> fmt::Debug for NestedStack<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NestedStack")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("sync", &self.sync.is_some())
            .finish()
    }
}

impl<T: Clone + 'static> NestedStack<T> {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        NestedStack {
            id: StackId::next(),
            name: name.into(),
            sync: None,
            _values: PhantomData,
        }
    }

    /// Stack whose visible value is mirrored through `hook` on every change.
    pub fn with_sync_hook<F>(name: impl Into<Arc<str>>, hook: F) -> Self
    where
        F: Fn(Option<&T>) -> Result<(), ManagerError> + Send + Sync + 'static,
    {
        NestedStack {
            sync: Some(Arc::new(hook)),
            ..Self::new(name)
        }
    }

    pub fn id(&self) -> StackId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Open a new frame on the calling thread and make it current.
    ///
    /// `None` opens a frame that hides any enclosing value. If the sync hook
    /// rejects the new value the frame is closed again and the error returned.
    pub fn activate(&self, value: Option<T>) -> Result<NestedContext<T>, ManagerError> {
        let (index, serial) = with_arena::<T, _>(self.id, |arena| arena.push(value.clone()))
            .ok_or_else(|| {
                ManagerError::failed(format!(
                    "context storage for '{}' is unavailable on this thread",
                    self.name
                ))
            })?;
        let mut context = NestedContext {
            stack: self.clone(),
            index,
            serial,
            value,
            closed: false,
            _thread_bound: PhantomData,
        };
        trace!(stack = %self.name, index, "activated nested context");

        if let Some(hook) = &self.sync {
            if let Err(err) = hook(context.value.as_ref()) {
                context.close();
                return Err(err);
            }
        }
        Ok(context)
    }

    /// Value of the newest still-open frame on the calling thread.
    pub fn current(&self) -> Option<T> {
        read_arena::<T, _>(self.id, |arena| arena.current_value().cloned()).flatten()
    }

    /// Number of open frames on the calling thread.
    pub fn depth(&self) -> usize {
        read_arena::<T, _>(self.id, |arena| arena.open_depth()).unwrap_or(0)
    }

    /// Drop every frame of this stack on the calling thread.
    ///
    /// Contexts opened before the clear become inert.
    pub fn clear(&self) {
        let removed = ARENAS
            .try_with(|arenas| arenas.borrow_mut().remove(&self.id))
            .ok()
            .flatten();
        let had_frames = removed.is_some();
        drop(removed);
        if had_frames {
            trace!(stack = %self.name, "cleared nested contexts");
            self.restore(None);
        }
    }

    fn close_frame(&self, index: usize, serial: u64) {
        let outcome = with_arena::<T, _>(self.id, |arena| {
            let (changed, discarded) = arena.close(index, serial);
            let visible = if changed {
                Some(arena.current_value().cloned())
            } else {
                None
            };
            (visible, discarded)
        });
        let Some((visible, discarded)) = outcome else {
            return;
        };
        drop(discarded);
        if let Some(visible) = visible {
            self.restore(visible.as_ref());
        }
    }

    fn restore(&self, value: Option<&T>) {
        if let Some(hook) = &self.sync {
            if let Err(err) = hook(value) {
                warn!(
                    stack = %self.name,
                    error = %err,
                    "failed to restore previous context value"
                );
            }
        }
    }
}

/// Handle for one activated frame. Bound to the thread that created it.
///
/// Closing is idempotent; dropping an open context closes it.
pub struct NestedContext<T: Clone + 'static> {
    stack: NestedStack<T>,
    index: usize,
    serial: u64,
    value: Option<T>,
    closed: bool,
    _thread_bound: PhantomData<*const ()>,
}

impl<T: Clone + 'static> NestedContext<T> {
    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.stack.close_frame(self.index, self.serial);
    }
}

impl<T: Clone + 'static> Drop for NestedContext<T> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<T: Clone + fmt::Debug + 'static> fmt::Debug for NestedContext<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NestedContext")
            .field("stack", &self.stack.name)
            .field("value", &self.value)
            .field("closed", &self.closed)
            .finish()
    }
}
