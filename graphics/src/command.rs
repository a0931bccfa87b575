//! Command recording target.
//!
//! A [`CommandList`] wraps one backend command buffer and tracks its
//! recording state. Each frame slot owns one list; the upload path uses a
//! one-shot list that is flushed (submitted and waited on) immediately.

use std::time::Duration;

use crate::backend::{GpuBackend, GpuCommandBuffer, GpuFence, GpuSemaphore};
use crate::error::GraphicsError;

/// Recording state of a [`CommandList`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandState {
    /// Freshly allocated or completed.
    Initial,
    Recording,
    /// Recorded and not yet submitted.
    Executable,
    /// Submitted; completion is tracked by the fence passed to submit.
    Pending,
}

#[derive(Debug)]
pub struct CommandList {
    buffer: GpuCommandBuffer,
    state: CommandState,
    label: String,
}

impl CommandList {
    pub fn new(backend: &dyn GpuBackend, label: impl Into<String>) -> Result<Self, GraphicsError> {
        Ok(Self {
            buffer: backend.allocate_command_buffer()?,
            state: CommandState::Initial,
            label: label.into(),
        })
    }

    /// Raw backend command buffer, for `GpuBackend::cmd_*` calls.
    pub fn raw(&self) -> &GpuCommandBuffer {
        &self.buffer
    }

    pub fn state(&self) -> CommandState {
        self.state
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Reset and start recording.
    ///
    /// A `Pending` list may only be restarted once the fence of its last
    /// submission has been observed signaled.
    pub fn begin(&mut self, backend: &dyn GpuBackend) -> Result<(), GraphicsError> {
        if self.state == CommandState::Recording {
            return Err(GraphicsError::InvalidParameter(format!(
                "command list '{}' is already recording",
                self.label
            )));
        }
        backend.begin_commands(&self.buffer)?;
        self.state = CommandState::Recording;
        Ok(())
    }

    pub fn end(&mut self, backend: &dyn GpuBackend) -> Result<(), GraphicsError> {
        if self.state != CommandState::Recording {
            return Err(GraphicsError::InvalidParameter(format!(
                "command list '{}' is not recording",
                self.label
            )));
        }
        backend.end_commands(&self.buffer)?;
        self.state = CommandState::Executable;
        Ok(())
    }

    pub fn submit(
        &mut self,
        backend: &dyn GpuBackend,
        wait: Option<&GpuSemaphore>,
        signal: Option<&GpuSemaphore>,
        fence: Option<&GpuFence>,
    ) -> Result<(), GraphicsError> {
        if self.state != CommandState::Executable {
            return Err(GraphicsError::InvalidParameter(format!(
                "command list '{}' submitted in state {:?}",
                self.label, self.state
            )));
        }
        backend.submit(&self.buffer, wait, signal, fence)?;
        self.state = CommandState::Pending;
        Ok(())
    }

    /// End recording if needed, submit, and block until the work completed.
    pub fn flush(&mut self, backend: &dyn GpuBackend, timeout: Duration) -> Result<(), GraphicsError> {
        if self.state == CommandState::Recording {
            self.end(backend)?;
        }

        let fence = backend.create_fence(false)?;
        let result = self
            .submit(backend, None, None, Some(&fence))
            .and_then(|()| {
                if backend.wait_fence(&fence, timeout)? {
                    Ok(())
                } else {
                    Err(GraphicsError::Timeout {
                        what: "command list flush",
                        timeout,
                    })
                }
            });
        backend.destroy_fence(fence);
        result?;

        self.state = CommandState::Initial;
        log::trace!("CommandList '{}': flushed", self.label);
        Ok(())
    }

    /// Debug label in the command stream.
    pub fn marker(&self, backend: &dyn GpuBackend, label: &str) {
        backend.cmd_marker(&self.buffer, label);
    }

    /// Release the backend command buffer.
    pub fn destroy(self, backend: &dyn GpuBackend) {
        backend.free_command_buffer(self.buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendEvent, DummyBackend, DummyConfig, FenceMode};

    const TIMEOUT: Duration = Duration::from_millis(50);

    #[test]
    fn state_transitions() {
        let backend = DummyBackend::new();
        let mut list = CommandList::new(&backend, "test").unwrap();
        assert_eq!(list.state(), CommandState::Initial);

        list.begin(&backend).unwrap();
        assert_eq!(list.state(), CommandState::Recording);
        assert!(list.begin(&backend).is_err());

        list.end(&backend).unwrap();
        assert_eq!(list.state(), CommandState::Executable);
        assert!(list.end(&backend).is_err());

        list.submit(&backend, None, None, None).unwrap();
        assert_eq!(list.state(), CommandState::Pending);
        list.destroy(&backend);
        assert_eq!(backend.live_objects(), 0);
    }

    #[test]
    fn submit_requires_executable() {
        let backend = DummyBackend::new();
        let mut list = CommandList::new(&backend, "test").unwrap();
        assert!(list.submit(&backend, None, None, None).is_err());
    }

    #[test]
    fn flush_waits_and_releases_fence() {
        let backend = DummyBackend::with_config(DummyConfig {
            fence_mode: FenceMode::OnWait,
            ..Default::default()
        });
        let mut list = CommandList::new(&backend, "upload").unwrap();
        list.begin(&backend).unwrap();
        list.marker(&backend, "copy");
        list.flush(&backend, TIMEOUT).unwrap();

        assert_eq!(list.state(), CommandState::Initial);
        let events = backend.events();
        assert!(events.iter().any(|e| matches!(e, BackendEvent::Submit { fence: Some(_), .. })));
        assert!(events.iter().any(|e| matches!(e, BackendEvent::WaitFence { signaled: true, .. })));
        list.destroy(&backend);
        assert_eq!(backend.live_objects(), 0);
    }

    #[test]
    fn flush_times_out_when_gpu_never_finishes() {
        let backend = DummyBackend::with_config(DummyConfig {
            fence_mode: FenceMode::Manual,
            ..Default::default()
        });
        let mut list = CommandList::new(&backend, "upload").unwrap();
        list.begin(&backend).unwrap();
        let err = list.flush(&backend, TIMEOUT).unwrap_err();
        assert!(matches!(err, GraphicsError::Timeout { .. }));
    }
}
