//! Renderer configuration.

use std::time::Duration;

use crate::backend::BackendKind;
use crate::types::{ClearColor, Extent2d};

/// Presentation synchronization mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PresentMode {
    /// No synchronization. May tear but has the lowest latency.
    Immediate,
    /// Triple buffering. Low latency without tearing.
    Mailbox,
    /// VSync. Always supported.
    #[default]
    Fifo,
}

/// Settings for [`Renderer`](crate::Renderer) and the backend it creates.
#[derive(Debug, Clone, PartialEq)]
pub struct RendererConfig {
    /// Application name reported to the driver.
    pub app_name: String,
    pub backend: BackendKind,
    /// Number of frame slots recorded ahead of the GPU. Default: 2.
    pub frames_in_flight: usize,
    /// Bound on acquiring a presentable image. Default: 100 ms.
    pub acquire_timeout: Duration,
    /// Bound on waiting for a frame slot's fence. Default: 2 s.
    pub fence_timeout: Duration,
    /// Bound on the one-shot upload submission. Default: 30 s.
    pub upload_timeout: Duration,
    pub present_mode: PresentMode,
    /// Enable API validation and the debug messenger. Default: on in debug builds.
    pub validation: bool,
    /// Initial surface size, replaced by the real window size once known.
    pub surface_extent: Extent2d,
    pub clear_color: ClearColor,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            app_name: "ironframe".into(),
            backend: BackendKind::default(),
            frames_in_flight: 2,
            acquire_timeout: Duration::from_millis(100),
            fence_timeout: Duration::from_secs(2),
            upload_timeout: Duration::from_secs(30),
            present_mode: PresentMode::default(),
            validation: cfg!(debug_assertions),
            surface_extent: Extent2d::new(1280, 720),
            clear_color: ClearColor::default(),
        }
    }
}

impl RendererConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    /// Clamped to at least one slot.
    pub fn with_frames_in_flight(mut self, frames: usize) -> Self {
        self.frames_in_flight = frames.max(1);
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn with_fence_timeout(mut self, timeout: Duration) -> Self {
        self.fence_timeout = timeout;
        self
    }

    pub fn with_upload_timeout(mut self, timeout: Duration) -> Self {
        self.upload_timeout = timeout;
        self
    }

    pub fn with_present_mode(mut self, mode: PresentMode) -> Self {
        self.present_mode = mode;
        self
    }

    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.validation = enabled;
        self
    }

    pub fn with_surface_extent(mut self, width: u32, height: u32) -> Self {
        self.surface_extent = Extent2d::new(width, height);
        self
    }

    pub fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_color = ClearColor(color);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = RendererConfig::default();
        assert_eq!(config.frames_in_flight, 2);
        assert_eq!(config.backend, BackendKind::Auto);
        assert_eq!(config.present_mode, PresentMode::Fifo);
        assert_eq!(config.surface_extent, Extent2d::new(1280, 720));
        assert!(config.fence_timeout > Duration::ZERO);
    }

    #[test]
    fn builder() {
        let config = RendererConfig::new()
            .with_app_name("viewer")
            .with_backend(BackendKind::Dummy)
            .with_frames_in_flight(0)
            .with_acquire_timeout(Duration::from_millis(5))
            .with_present_mode(PresentMode::Mailbox)
            .with_validation(false)
            .with_surface_extent(800, 600)
            .with_clear_color([0.1, 0.2, 0.3, 1.0]);

        assert_eq!(config.app_name, "viewer");
        assert_eq!(config.frames_in_flight, 1);
        assert_eq!(config.acquire_timeout, Duration::from_millis(5));
        assert_eq!(config.present_mode, PresentMode::Mailbox);
        assert!(!config.validation);
        assert_eq!(config.surface_extent, Extent2d::new(800, 600));
        assert_eq!(config.clear_color, ClearColor([0.1, 0.2, 0.3, 1.0]));
    }
}
