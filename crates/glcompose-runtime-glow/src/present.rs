//! Buffer presentation, supplied by the windowing layer.

/// Called once at the end of every displayed frame (typically a buffer swap).
pub trait Present {
    fn present(&mut self);
}

/// Headless presenter.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPresent;

impl Present for NoopPresent {
    #[inline]
    fn present(&mut self) {}
}

/// Counts presented frames; handy for headless hosts and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameCounter {
    pub frames: u64,
}

impl Present for FrameCounter {
    fn present(&mut self) {
        self.frames += 1;
    }
}
