//! Read-side backpressure for the backend connection.

use std::fmt;
use std::rc::Rc;

use crate::connection::ReadHandle;

/// Why backend reads are paused. Each reason is tracked independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PauseReason {
    /// The staged response body has no room left.
    NoBuffer,
    /// The frontend cannot accept more of the message yet.
    MsgBlock,
}

impl PauseReason {
    fn bit(self) -> u8 {
        match self {
            PauseReason::NoBuffer => 1 << 0,
            PauseReason::MsgBlock => 1 << 1,
        }
    }
}

/// Keeps the backend read side suspended while any pause reason is active.
#[derive(Default)]
pub struct IoControl {
    handle: Option<Rc<dyn ReadHandle>>,
    reasons: u8,
}

impl IoControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind to the read handle of a newly attached backend, or to none. An
    /// active pause carries over to the new handle.
    pub fn set_handle(&mut self, handle: Option<Rc<dyn ReadHandle>>) {
        self.handle = handle;
        if self.is_paused() {
            if let Some(handle) = &self.handle {
                handle.disable_read();
            }
        }
    }

    pub fn pause_read(&mut self, reason: PauseReason) {
        self.reasons |= reason.bit();
        if let Some(handle) = &self.handle {
            handle.disable_read();
        }
    }

    /// Clear `reason`. Returns true only if reads were paused and this call
    /// cleared the last remaining reason.
    pub fn resume_read(&mut self, reason: PauseReason) -> bool {
        let was_paused = self.is_paused();
        self.reasons &= !reason.bit();
        if self.reasons != 0 {
            return false;
        }
        if let Some(handle) = &self.handle {
            handle.enable_read();
        }
        was_paused
    }

    pub fn force_resume_read(&mut self) {
        self.reasons = 0;
        if let Some(handle) = &self.handle {
            handle.enable_read();
        }
    }

    pub fn is_paused(&self) -> bool {
        self.reasons != 0
    }

    pub fn is_paused_for(&self, reason: PauseReason) -> bool {
        self.reasons & reason.bit() != 0
    }
}

impl fmt::Debug for IoControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IoControl")
            .field("bound", &self.handle.is_some())
            .field("no_buffer", &self.is_paused_for(PauseReason::NoBuffer))
            .field("msg_block", &self.is_paused_for(PauseReason::MsgBlock))
            .finish()
    }
}
