//! Ordered teardown of GPU resources.
//!
//! Vulkan objects have manual lifetimes with strict destruction ordering: a
//! pipeline must go before the layout it was built against, a buffer before
//! the allocator that backs it, everything before the device. Rather than
//! scattering destroy calls across shutdown code, every setup site pushes its
//! own teardown action onto a [`DeletionQueue`] immediately after creating
//! the resource, in the same scope. Draining the queue newest-first then
//! replays destruction in exactly the reverse of acquisition order.

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use parking_lot::Mutex;

use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use crate::memory::GpuBuffer;

/// A LIFO ledger of teardown actions.
///
/// Append-only during setup; drained exactly once at shutdown, after the
/// device has been confirmed idle and before the device itself is destroyed.
#[derive(Default)]
pub struct DeletionQueue {
    deletors: Vec<Box<dyn FnOnce()>>,
}

impl DeletionQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a teardown action.
    ///
    /// Push order must mirror required destruction order: push an action
    /// *before* pushing actions for resources that depend on it.
    pub fn push(&mut self, action: impl FnOnce() + 'static) {
        self.deletors.push(Box::new(action));
    }

    /// Execute all actions, most recently pushed first, then clear the queue.
    ///
    /// A drain of an empty queue performs zero actions, so calling this again
    /// after a full drain is a no-op.
    pub fn drain(&mut self) {
        while let Some(action) = self.deletors.pop() {
            action();
        }
    }

    /// Number of pending actions.
    pub fn len(&self) -> usize {
        self.deletors.len()
    }

    /// Returns `true` if no actions are pending.
    pub fn is_empty(&self) -> bool {
        self.deletors.is_empty()
    }
}

/// A host-visible buffer whose release is registered at construction.
///
/// The buffer stays writable for as long as the engine runs; the deletion
/// queue owns the teardown action, so call sites cannot forget to release it.
/// After the queue drains, writes fail with [`GpuError::InvalidState`].
pub struct TrackedBuffer {
    inner: Arc<Mutex<Option<GpuBuffer>>>,
    handle: vk::Buffer,
    size: u64,
}

impl TrackedBuffer {
    /// Allocate a buffer and push its release onto the deletion queue.
    pub fn new(
        gpu: &Arc<GpuContext>,
        queue: &mut DeletionQueue,
        size: u64,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
        name: &str,
    ) -> Result<Self> {
        let buffer = gpu
            .allocator()
            .lock()
            .create_buffer(size, usage, location, name)?;
        let handle = buffer.buffer;

        let inner = Arc::new(Mutex::new(Some(buffer)));
        let slot = Arc::clone(&inner);
        let ctx = Arc::clone(gpu);
        queue.push(move || {
            if let Some(mut buffer) = slot.lock().take() {
                if let Err(err) = ctx.allocator().lock().free_buffer(&mut buffer) {
                    tracing::warn!("failed to free tracked buffer: {err}");
                }
            }
        });

        Ok(Self {
            inner,
            handle,
            size,
        })
    }

    /// The raw buffer handle, valid until the deletion queue drains.
    pub fn handle(&self) -> vk::Buffer {
        self.handle
    }

    /// Buffer size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Write typed data at the start of the buffer.
    pub fn write<T: Copy>(&self, data: &[T]) -> Result<()> {
        let guard = self.inner.lock();
        let buffer = guard
            .as_ref()
            .ok_or_else(|| GpuError::InvalidState("buffer already released".to_string()))?;
        buffer.write(data)
    }

    /// Write raw bytes at the given offset.
    pub fn write_bytes(&self, offset: u64, data: &[u8]) -> Result<()> {
        let guard = self.inner.lock();
        let buffer = guard
            .as_ref()
            .ok_or_else(|| GpuError::InvalidState("buffer already released".to_string()))?;
        buffer.write_bytes(offset, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn drain_runs_in_reverse_push_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut queue = DeletionQueue::new();

        for label in ["a", "b", "c"] {
            let log = Rc::clone(&log);
            queue.push(move || log.borrow_mut().push(label));
        }

        assert_eq!(queue.len(), 3);
        queue.drain();
        assert_eq!(*log.borrow(), vec!["c", "b", "a"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn drain_on_empty_queue_is_a_no_op() {
        let counter = Rc::new(RefCell::new(0));
        let mut queue = DeletionQueue::new();
        {
            let counter = Rc::clone(&counter);
            queue.push(move || *counter.borrow_mut() += 1);
        }

        queue.drain();
        assert_eq!(*counter.borrow(), 1);

        // Second drain must execute nothing.
        queue.drain();
        assert_eq!(*counter.borrow(), 1);
    }

    #[test]
    fn interleaved_pushes_still_reverse() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut queue = DeletionQueue::new();

        let l = Rc::clone(&log);
        queue.push(move || l.borrow_mut().push(1));
        let l = Rc::clone(&log);
        queue.push(move || l.borrow_mut().push(2));
        queue.drain();

        let l = Rc::clone(&log);
        queue.push(move || l.borrow_mut().push(3));
        queue.drain();

        assert_eq!(*log.borrow(), vec![2, 1, 3]);
    }
}
