//! Frame ring rotation and the per-frame protocol.
//!
//! The CPU prepares frame k+1 while the GPU still executes frame k. Each of
//! the N ring slots owns its command recording state and sync objects; the
//! fence wait at the top of the protocol is the sole backpressure keeping at
//! most N frames in flight. The protocol itself is a fixed sequence and lives
//! here, behind the [`FrameBackend`] seam, so its ordering can be exercised
//! without a device.

use lantern_gpu::error::Result;
use lantern_gpu::sync::FENCE_TIMEOUT_NS;

/// Default number of frame slots.
pub const FRAME_OVERLAP: usize = 2;

/// Device operations the per-frame protocol drives.
///
/// The engine implements this over real Vulkan; tests implement it over
/// counters and mock fences. Every method maps to one step of the protocol
/// and is called exactly once per frame, in declaration order.
pub trait FrameBackend {
    /// Block until the slot's previous submission has retired, bounded by
    /// `timeout_ns`. Expiry means the GPU is stuck and must surface an error.
    fn wait_slot(&mut self, slot: usize, timeout_ns: u64) -> Result<()>;

    /// Reset the slot's fence to unsignaled and its command recording state
    /// so it can be rewritten.
    fn reset_slot(&mut self, slot: usize) -> Result<()>;

    /// Acquire the next presentable surface image, signaling the slot's
    /// acquire semaphore. The returned index is unrelated to the ring index.
    fn acquire_image(&mut self, slot: usize) -> Result<u32>;

    /// Record the frame's commands into the slot, bracketed by begin/end.
    fn record(&mut self, slot: usize, image_index: u32, frame_number: u64) -> Result<()>;

    /// Submit the slot's commands: wait the acquire semaphore before color
    /// output, signal the render semaphore, signal the fence on retire.
    fn submit(&mut self, slot: usize) -> Result<()>;

    /// Present the image, waiting on the slot's render semaphore.
    fn present(&mut self, slot: usize, image_index: u32) -> Result<()>;
}

/// Rotates the frame ring and sequences the per-frame protocol.
pub struct FramePipeline {
    slot_count: usize,
    frame_number: u64,
    fence_timeout_ns: u64,
}

impl FramePipeline {
    /// Create a pipeline over `slot_count` ring slots.
    ///
    /// # Panics
    /// Panics if `slot_count` is zero.
    pub fn new(slot_count: usize) -> Self {
        assert!(slot_count > 0, "frame ring needs at least one slot");
        Self {
            slot_count,
            frame_number: 0,
            fence_timeout_ns: FENCE_TIMEOUT_NS,
        }
    }

    /// Override the bounded fence wait.
    pub fn with_fence_timeout(mut self, timeout_ns: u64) -> Self {
        self.fence_timeout_ns = timeout_ns;
        self
    }

    /// Number of ring slots.
    pub fn slot_count(&self) -> usize {
        self.slot_count
    }

    /// Frames completed so far.
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// The ring slot the next frame will use.
    pub fn slot_index(&self) -> usize {
        (self.frame_number % self.slot_count as u64) as usize
    }

    /// Run one frame through the protocol.
    ///
    /// The steps run in this exact order: wait → reset → acquire → record →
    /// submit → present; the frame counter increments only after present
    /// succeeds. Any error aborts the frame and propagates; no step is
    /// retried.
    pub fn render_frame<B: FrameBackend>(&mut self, backend: &mut B) -> Result<()> {
        let slot = self.slot_index();

        backend.wait_slot(slot, self.fence_timeout_ns)?;
        backend.reset_slot(slot)?;

        let image_index = backend.acquire_image(slot)?;
        backend.record(slot, image_index, self.frame_number)?;
        backend.submit(slot)?;
        backend.present(slot, image_index)?;

        self.frame_number += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lantern_gpu::{DeletionQueue, GpuError};
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    #[derive(Debug, PartialEq, Eq)]
    enum Step {
        Wait(usize),
        Reset(usize),
        Acquire(usize),
        Record(usize, u32, u64),
        Submit(usize),
        Present(usize, u32),
    }

    /// Backend that logs every protocol step.
    #[derive(Default)]
    struct LoggingBackend {
        steps: Vec<Step>,
        /// Swapchain image indices to hand out, decoupled from slot indices.
        image_indices: Vec<u32>,
        acquires: usize,
    }

    impl FrameBackend for LoggingBackend {
        fn wait_slot(&mut self, slot: usize, _timeout_ns: u64) -> Result<()> {
            self.steps.push(Step::Wait(slot));
            Ok(())
        }

        fn reset_slot(&mut self, slot: usize) -> Result<()> {
            self.steps.push(Step::Reset(slot));
            Ok(())
        }

        fn acquire_image(&mut self, slot: usize) -> Result<u32> {
            self.steps.push(Step::Acquire(slot));
            let index = self.image_indices[self.acquires % self.image_indices.len()];
            self.acquires += 1;
            Ok(index)
        }

        fn record(&mut self, slot: usize, image_index: u32, frame_number: u64) -> Result<()> {
            self.steps.push(Step::Record(slot, image_index, frame_number));
            Ok(())
        }

        fn submit(&mut self, slot: usize) -> Result<()> {
            self.steps.push(Step::Submit(slot));
            Ok(())
        }

        fn present(&mut self, slot: usize, image_index: u32) -> Result<()> {
            self.steps.push(Step::Present(slot, image_index));
            Ok(())
        }
    }

    #[test]
    fn steps_run_in_protocol_order() {
        let mut backend = LoggingBackend {
            image_indices: vec![7],
            ..Default::default()
        };
        let mut pipeline = FramePipeline::new(2);

        pipeline.render_frame(&mut backend).unwrap();

        assert_eq!(
            backend.steps,
            vec![
                Step::Wait(0),
                Step::Reset(0),
                Step::Acquire(0),
                Step::Record(0, 7, 0),
                Step::Submit(0),
                Step::Present(0, 7),
            ]
        );
        assert_eq!(pipeline.frame_number(), 1);
    }

    #[test]
    fn slots_alternate_for_two_in_flight() {
        let mut backend = LoggingBackend {
            image_indices: vec![0],
            ..Default::default()
        };
        let mut pipeline = FramePipeline::new(2);

        let mut observed = Vec::new();
        for _ in 0..4 {
            observed.push(pipeline.slot_index());
            pipeline.render_frame(&mut backend).unwrap();
        }

        assert_eq!(observed, vec![0, 1, 0, 1]);
    }

    #[test]
    fn image_index_is_tracked_separately_from_slot() {
        // A 3-image swapchain against a 2-slot ring: the image index handed
        // to record/present must be the acquired one, never the slot index.
        let mut backend = LoggingBackend {
            image_indices: vec![2, 0, 1],
            ..Default::default()
        };
        let mut pipeline = FramePipeline::new(2);

        for _ in 0..3 {
            pipeline.render_frame(&mut backend).unwrap();
        }

        let presents: Vec<&Step> = backend
            .steps
            .iter()
            .filter(|s| matches!(s, Step::Present(..)))
            .collect();
        assert_eq!(
            presents,
            vec![
                &Step::Present(0, 2),
                &Step::Present(1, 0),
                &Step::Present(0, 1),
            ]
        );
    }

    #[test]
    fn failed_step_stops_the_frame_and_counter() {
        struct FailingAcquire;

        impl FrameBackend for FailingAcquire {
            fn wait_slot(&mut self, _: usize, _: u64) -> Result<()> {
                Ok(())
            }
            fn reset_slot(&mut self, _: usize) -> Result<()> {
                Ok(())
            }
            fn acquire_image(&mut self, _: usize) -> Result<u32> {
                Err(GpuError::Other("device lost".to_string()))
            }
            fn record(&mut self, _: usize, _: u32, _: u64) -> Result<()> {
                panic!("record must not run after a failed acquire");
            }
            fn submit(&mut self, _: usize) -> Result<()> {
                panic!("submit must not run after a failed acquire");
            }
            fn present(&mut self, _: usize, _: u32) -> Result<()> {
                panic!("present must not run after a failed acquire");
            }
        }

        let mut pipeline = FramePipeline::new(2);
        assert!(pipeline.render_frame(&mut FailingAcquire).is_err());
        assert_eq!(pipeline.frame_number(), 0);
    }

    /// Backend whose slot-0 fence only signals after a controlled delay.
    struct SlowFenceBackend {
        fence_signaled: Arc<AtomicBool>,
        waited: Duration,
    }

    impl FrameBackend for SlowFenceBackend {
        fn wait_slot(&mut self, slot: usize, timeout_ns: u64) -> Result<()> {
            let start = Instant::now();
            if slot == 0 {
                while !self.fence_signaled.load(Ordering::Acquire) {
                    if start.elapsed() > Duration::from_nanos(timeout_ns) {
                        return Err(GpuError::FenceTimeout {
                            waited_ns: timeout_ns,
                        });
                    }
                    std::thread::yield_now();
                }
            }
            self.waited = start.elapsed();
            Ok(())
        }

        fn reset_slot(&mut self, _: usize) -> Result<()> {
            Ok(())
        }
        fn acquire_image(&mut self, _: usize) -> Result<u32> {
            Ok(0)
        }
        fn record(&mut self, _: usize, _: u32, _: u64) -> Result<()> {
            Ok(())
        }
        fn submit(&mut self, _: usize) -> Result<()> {
            Ok(())
        }
        fn present(&mut self, _: usize, _: u32) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn slot_is_not_reused_before_its_fence_signals() {
        let fence_signaled = Arc::new(AtomicBool::new(false));
        let delay = Duration::from_millis(50);

        let signal = Arc::clone(&fence_signaled);
        let signaler = std::thread::spawn(move || {
            std::thread::sleep(delay);
            signal.store(true, Ordering::Release);
        });

        let mut backend = SlowFenceBackend {
            fence_signaled,
            waited: Duration::ZERO,
        };
        let mut pipeline = FramePipeline::new(2);

        pipeline.render_frame(&mut backend).unwrap();

        // The CPU must have blocked in the wait until the mock fence fired.
        assert!(
            backend.waited >= delay,
            "wait returned after {:?}, before the fence signaled at {:?}",
            backend.waited,
            delay
        );
        signaler.join().unwrap();
    }

    #[test]
    fn expired_fence_wait_is_an_error() {
        let mut backend = SlowFenceBackend {
            fence_signaled: Arc::new(AtomicBool::new(false)),
            waited: Duration::ZERO,
        };
        // Never signaled: the bounded wait must fail, not spin forever.
        let mut pipeline = FramePipeline::new(2).with_fence_timeout(5_000_000);

        match pipeline.render_frame(&mut backend) {
            Err(GpuError::FenceTimeout { .. }) => {}
            other => panic!("expected fence timeout, got {other:?}"),
        }
    }

    /// Counting backend for the end-to-end scenario.
    #[derive(Default)]
    struct CountingBackend {
        fence_waits: usize,
        submissions: usize,
        draws_recorded: usize,
    }

    impl FrameBackend for CountingBackend {
        fn wait_slot(&mut self, _: usize, _: u64) -> Result<()> {
            self.fence_waits += 1;
            Ok(())
        }
        fn reset_slot(&mut self, _: usize) -> Result<()> {
            Ok(())
        }
        fn acquire_image(&mut self, _: usize) -> Result<u32> {
            Ok(0)
        }
        fn record(&mut self, _: usize, _: u32, _: u64) -> Result<()> {
            self.draws_recorded += 1;
            Ok(())
        }
        fn submit(&mut self, _: usize) -> Result<()> {
            self.submissions += 1;
            Ok(())
        }
        fn present(&mut self, _: usize, _: u32) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn five_frames_then_teardown() {
        // Simulated engine run: N=2, one renderable, five frames, shutdown.
        let mut backend = CountingBackend::default();
        let mut pipeline = FramePipeline::new(FRAME_OVERLAP);

        let teardown_log = Rc::new(RefCell::new(Vec::new()));
        let mut deletion_queue = DeletionQueue::new();
        for stage in ["device", "frame_slots", "pipeline", "mesh_buffer"] {
            let log = Rc::clone(&teardown_log);
            deletion_queue.push(move || log.borrow_mut().push(stage));
        }

        for _ in 0..5 {
            pipeline.render_frame(&mut backend).unwrap();
        }

        assert_eq!(pipeline.frame_number(), 5);
        assert_eq!(backend.fence_waits, 5);
        assert_eq!(backend.submissions, 5);
        assert_eq!(backend.draws_recorded, 5);

        deletion_queue.drain();
        assert_eq!(
            *teardown_log.borrow(),
            vec!["mesh_buffer", "pipeline", "frame_slots", "device"]
        );

        // Teardown actions run exactly once.
        deletion_queue.drain();
        assert_eq!(teardown_log.borrow().len(), 4);
    }
}
