//! Frames in flight.
//!
//! [`FrameSynchronizer`] rotates over N frame slots. Each slot owns an
//! "image available" semaphore, a "render finished" semaphore, an in-flight
//! fence and a command list. One [`render_frame`](FrameSynchronizer::render_frame)
//! call:
//!
//! 1. waits (bounded) for the slot's fence, so the slot's command list is
//!    no longer read by the GPU
//! 2. acquires a presentable image; anything but a clean acquisition idles
//!    the device, rebuilds the surface and skips the frame
//! 3. begins recording, resets the fence and records: surface to
//!    `ColorAttachment`, clear, caller commands, surface to `PresentSrc`
//! 4. submits (wait image available, signal render finished and the fence)
//! 5. presents and advances to the next slot
//!
//! ```text
//! slot 0: [wait F0][acquire][record][submit]--GPU frame k----->
//! slot 1:            [wait F1][acquire][record][submit]--GPU frame k+1-->
//! slot 0:                       [wait F0 (frame k done)][acquire]...
//! ```
//!
//! # Shutdown
//!
//! Call [`wait_idle`](FrameSynchronizer::wait_idle) before destroying
//! resources the GPU may still read, then [`destroy`](FrameSynchronizer::destroy).

use std::time::Duration;

use crate::backend::{AcquireResult, GpuBackend, GpuFence, GpuSemaphore, PresentResult};
use crate::command::{CommandList, CommandState};
use crate::config::RendererConfig;
use crate::error::GraphicsError;
use crate::types::{ClearColor, Extent2d, LayoutTransition, TextureLayout};

/// Outcome of one [`FrameSynchronizer::render_frame`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    Presented { image_index: u32 },
    /// Nothing was submitted; the same slot is used by the next frame.
    Skipped,
}

/// Per-frame information handed to the record callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    pub image_index: u32,
    pub slot: usize,
    pub extent: Extent2d,
    /// Number of frames submitted before this one.
    pub frame_number: u64,
}

struct FrameSlot {
    image_available: GpuSemaphore,
    render_finished: GpuSemaphore,
    in_flight: GpuFence,
    commands: CommandList,
}

impl FrameSlot {
    fn new(backend: &dyn GpuBackend, index: usize) -> Result<Self, GraphicsError> {
        let image_available = backend.create_semaphore()?;
        let render_finished = match backend.create_semaphore() {
            Ok(semaphore) => semaphore,
            Err(err) => {
                backend.destroy_semaphore(image_available);
                return Err(err);
            }
        };
        // Signaled so the first wait on each slot returns immediately.
        let in_flight = match backend.create_fence(true) {
            Ok(fence) => fence,
            Err(err) => {
                backend.destroy_semaphore(image_available);
                backend.destroy_semaphore(render_finished);
                return Err(err);
            }
        };
        let commands = match CommandList::new(backend, format!("frame slot {index}")) {
            Ok(commands) => commands,
            Err(err) => {
                backend.destroy_semaphore(image_available);
                backend.destroy_semaphore(render_finished);
                backend.destroy_fence(in_flight);
                return Err(err);
            }
        };
        Ok(Self {
            image_available,
            render_finished,
            in_flight,
            commands,
        })
    }

    fn record<F>(
        &mut self,
        backend: &dyn GpuBackend,
        image_index: u32,
        clear_color: ClearColor,
        record: F,
    ) -> Result<(), GraphicsError>
    where
        F: FnOnce(&CommandList) -> Result<(), GraphicsError>,
    {
        backend.cmd_surface_barrier(
            self.commands.raw(),
            image_index,
            LayoutTransition::new(TextureLayout::Undefined, TextureLayout::ColorAttachment),
        );
        backend.cmd_clear_surface(self.commands.raw(), image_index, clear_color);

        record(&self.commands)?;

        backend.cmd_surface_barrier(
            self.commands.raw(),
            image_index,
            LayoutTransition::new(TextureLayout::ColorAttachment, TextureLayout::PresentSrc),
        );
        self.commands.end(backend)
    }

    /// Stop recording without submitting.
    fn discard(&mut self, backend: &dyn GpuBackend) {
        if let Err(err) = self.commands.end(backend) {
            log::warn!("FrameSynchronizer: could not end discarded frame: {err}");
        }
    }

    /// Submit whatever was recorded so the fence signals again and the
    /// acquire semaphore is waited on.
    fn abandon(&mut self, backend: &dyn GpuBackend) {
        if self.commands.state() == CommandState::Recording {
            if let Err(err) = self.commands.end(backend) {
                log::warn!("FrameSynchronizer: could not end abandoned frame: {err}");
                return;
            }
        }
        if let Err(err) = self.commands.submit(
            backend,
            Some(&self.image_available),
            None,
            Some(&self.in_flight),
        ) {
            log::warn!("FrameSynchronizer: could not submit abandoned frame: {err}");
        }
    }

    fn destroy(self, backend: &dyn GpuBackend) {
        backend.destroy_semaphore(self.image_available);
        backend.destroy_semaphore(self.render_finished);
        backend.destroy_fence(self.in_flight);
        self.commands.destroy(backend);
    }
}

/// Coordinates N frames in flight over one presentation surface.
pub struct FrameSynchronizer {
    slots: Vec<FrameSlot>,
    current: usize,
    frame_count: u64,
    skipped_count: u64,
    /// Latest known window size, applied on the next surface rebuild.
    pending_extent: Extent2d,
    rebuild_requested: bool,
    acquire_timeout: Duration,
    fence_timeout: Duration,
    clear_color: ClearColor,
}

impl FrameSynchronizer {
    /// Create `config.frames_in_flight` slots.
    pub fn new(backend: &dyn GpuBackend, config: &RendererConfig) -> Result<Self, GraphicsError> {
        let count = config.frames_in_flight.max(1);
        let mut slots = Vec::with_capacity(count);
        for index in 0..count {
            match FrameSlot::new(backend, index) {
                Ok(slot) => slots.push(slot),
                Err(err) => {
                    for slot in slots {
                        slot.destroy(backend);
                    }
                    return Err(err);
                }
            }
        }

        log::info!(
            "FrameSynchronizer: {} frames in flight over {} surface images",
            count,
            backend.surface_image_count()
        );
        Ok(Self {
            slots,
            current: 0,
            frame_count: 0,
            skipped_count: 0,
            pending_extent: backend.surface_extent(),
            rebuild_requested: false,
            acquire_timeout: config.acquire_timeout,
            fence_timeout: config.fence_timeout,
            clear_color: config.clear_color,
        })
    }

    pub fn frames_in_flight(&self) -> usize {
        self.slots.len()
    }

    /// Slot the next frame records into.
    pub fn current_slot(&self) -> usize {
        self.current
    }

    /// Frames presented so far.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn skipped_count(&self) -> u64 {
        self.skipped_count
    }

    pub fn pending_extent(&self) -> Extent2d {
        self.pending_extent
    }

    /// Whether a surface rebuild is scheduled for the next frame.
    pub fn rebuild_requested(&self) -> bool {
        self.rebuild_requested
    }

    pub fn set_clear_color(&mut self, color: ClearColor) {
        self.clear_color = color;
    }

    /// Record new window dimensions.
    ///
    /// The surface is rebuilt at this size on the next acquisition failure
    /// or out-of-date present, not immediately.
    pub fn notify_resize(&mut self, width: u32, height: u32) {
        log::debug!("FrameSynchronizer: resize notified {width}x{height}");
        self.pending_extent = Extent2d::new(width, height);
    }

    /// Run one frame.
    ///
    /// `record` appends the frame's commands to the slot's command list,
    /// which is already recording with the target image in `ColorAttachment`
    /// layout and cleared. A skipped frame never calls `record`.
    ///
    /// Errors are fatal to the frame loop: a fence timeout, device loss, or
    /// an error returned by `record`.
    pub fn render_frame<F>(
        &mut self,
        backend: &dyn GpuBackend,
        record: F,
    ) -> Result<FrameStatus, GraphicsError>
    where
        F: FnOnce(&CommandList, FrameInfo) -> Result<(), GraphicsError>,
    {
        ironframe_core::profile_function!();

        if self.pending_extent.is_empty() {
            // Minimized: nothing to present into.
            return Ok(self.skip());
        }
        if self.rebuild_requested {
            self.rebuild_surface(backend)?;
        }

        let current = self.current;

        {
            ironframe_core::profile_scope!("wait_fence");
            let fence = &self.slots[current].in_flight;
            if !backend.wait_fence(fence, self.fence_timeout)? {
                log::error!(
                    "FrameSynchronizer: slot {current} fence not signaled after {:?}",
                    self.fence_timeout
                );
                return Err(GraphicsError::Timeout {
                    what: "frame slot fence",
                    timeout: self.fence_timeout,
                });
            }
        }

        let acquired = backend.acquire_next_image(&self.slots[current].image_available, self.acquire_timeout)?;
        let image_index = match acquired {
            AcquireResult::Acquired {
                image_index,
                suboptimal: false,
            } => image_index,
            AcquireResult::Acquired {
                suboptimal: true, ..
            } => {
                log::warn!("FrameSynchronizer: suboptimal surface, rebuilding");
                backend.wait_idle()?;
                // The acquisition signaled the semaphore and nothing will wait on it.
                self.replace_image_available(backend, current)?;
                self.rebuild_surface(backend)?;
                return Ok(self.skip());
            }
            AcquireResult::OutOfDate | AcquireResult::Timeout => {
                log::warn!("FrameSynchronizer: acquire returned {acquired:?}, rebuilding surface");
                backend.wait_idle()?;
                self.rebuild_surface(backend)?;
                return Ok(self.skip());
            }
        };

        // The fence stays signaled until the slot is recording.
        let began = match self.slots[current].commands.begin(backend) {
            Ok(()) => {
                let slot = &mut self.slots[current];
                let reset = backend.reset_fence(&slot.in_flight);
                if reset.is_err() {
                    slot.discard(backend);
                }
                reset
            }
            Err(err) => Err(err),
        };
        if let Err(err) = began {
            log::error!("FrameSynchronizer: slot {current} could not start recording: {err}");
            // The acquisition signaled the semaphore and nothing will wait on it.
            self.replace_image_available(backend, current)?;
            return Err(err);
        }

        let clear_color = self.clear_color;
        let slot = &mut self.slots[current];

        let info = FrameInfo {
            image_index,
            slot: current,
            extent: backend.surface_extent(),
            frame_number: self.frame_count,
        };
        let recorded = {
            ironframe_core::profile_scope!("record");
            slot.record(backend, image_index, clear_color, |commands| record(commands, info))
        };
        if let Err(err) = recorded {
            log::error!("FrameSynchronizer: recording slot {current} failed: {err}");
            slot.abandon(backend);
            return Err(err);
        }

        slot.commands.submit(
            backend,
            Some(&slot.image_available),
            Some(&slot.render_finished),
            Some(&slot.in_flight),
        )?;

        match backend.present(image_index, &slot.render_finished)? {
            PresentResult::Presented => {}
            result @ (PresentResult::Suboptimal | PresentResult::OutOfDate) => {
                log::debug!("FrameSynchronizer: present returned {result:?}, rebuild scheduled");
                self.rebuild_requested = true;
            }
        }

        self.current = (self.current + 1) % self.slots.len();
        self.frame_count += 1;
        ironframe_core::frame_mark!();
        log::trace!(
            "FrameSynchronizer: frame {} presented image {image_index} from slot {current}",
            self.frame_count
        );
        Ok(FrameStatus::Presented { image_index })
    }

    fn skip(&mut self) -> FrameStatus {
        self.skipped_count += 1;
        ironframe_core::profile_plot!("skipped frames", self.skipped_count);
        FrameStatus::Skipped
    }

    /// Rebuild the surface at the latest known size. The device must be idle.
    fn rebuild_surface(&mut self, backend: &dyn GpuBackend) -> Result<(), GraphicsError> {
        if self.pending_extent.is_empty() {
            self.rebuild_requested = true;
            return Ok(());
        }
        if self.rebuild_requested {
            backend.wait_idle()?;
        }
        backend.resize_surface(self.pending_extent)?;
        self.rebuild_requested = false;
        log::info!(
            "FrameSynchronizer: surface rebuilt at {}x{}",
            self.pending_extent.width,
            self.pending_extent.height
        );
        Ok(())
    }

    fn replace_image_available(
        &mut self,
        backend: &dyn GpuBackend,
        slot: usize,
    ) -> Result<(), GraphicsError> {
        let fresh = backend.create_semaphore()?;
        let stale = std::mem::replace(&mut self.slots[slot].image_available, fresh);
        backend.destroy_semaphore(stale);
        Ok(())
    }

    /// Block until every slot's last submission completed.
    pub fn wait_idle(&self, backend: &dyn GpuBackend) -> Result<(), GraphicsError> {
        for (index, slot) in self.slots.iter().enumerate() {
            if !backend.wait_fence(&slot.in_flight, self.fence_timeout)? {
                log::error!("FrameSynchronizer: slot {index} did not complete during shutdown");
                return Err(GraphicsError::Timeout {
                    what: "frame slot fence",
                    timeout: self.fence_timeout,
                });
            }
        }
        Ok(())
    }

    /// Release every slot's objects. Call after [`wait_idle`](Self::wait_idle).
    pub fn destroy(self, backend: &dyn GpuBackend) {
        log::debug!("FrameSynchronizer: destroying {} slots", self.slots.len());
        for slot in self.slots {
            slot.destroy(backend);
        }
    }
}

impl std::fmt::Debug for FrameSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSynchronizer")
            .field("frames_in_flight", &self.slots.len())
            .field("current", &self.current)
            .field("frame_count", &self.frame_count)
            .field("rebuild_requested", &self.rebuild_requested)
            .finish()
    }
}
