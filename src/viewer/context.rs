//! Host-facing viewport state: size, runtime handle, and event subscription.

use tokio::runtime::Handle;

/// Drawable size in physical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ViewportSize {
    pub width: u32,
    pub height: u32,
}

impl ViewportSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// True when either side is zero.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Width over height. `None` for an empty size.
    pub fn aspect(&self) -> Option<f32> {
        if self.is_empty() {
            None
        } else {
            Some(self.width as f32 / self.height as f32)
        }
    }
}

/// Events the host window delivers to the viewer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HostEvent {
    Resized(ViewportSize),
    /// One display frame; `dt` is the elapsed time in seconds
    Frame { dt: f32 },
}

/// Created at mount, released at teardown.
#[derive(Debug)]
pub struct ViewportContext {
    size: ViewportSize,
    runtime: Handle,
    resize_subscribed: bool,
    frames: u64,
}

impl ViewportContext {
    pub fn new(size: ViewportSize, runtime: Handle) -> Self {
        Self {
            size,
            runtime,
            resize_subscribed: true,
            frames: 0,
        }
    }

    pub fn size(&self) -> ViewportSize {
        self.size
    }

    pub(crate) fn set_size(&mut self, size: ViewportSize) {
        self.size = size;
    }

    pub fn runtime(&self) -> &Handle {
        &self.runtime
    }

    pub fn is_resize_subscribed(&self) -> bool {
        self.resize_subscribed
    }

    pub(crate) fn unsubscribe_resize(&mut self) {
        self.resize_subscribed = false;
    }

    pub fn frame_count(&self) -> u64 {
        self.frames
    }

    pub(crate) fn record_frame(&mut self) {
        self.frames += 1;
    }
}
