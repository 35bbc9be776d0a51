use serde::Serialize;

use crate::{Error, Result};

/// Progress of one HTTP message. Only ever moves forward one step at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageState {
    #[default]
    Initial,
    HeaderComplete,
    MsgComplete,
}

impl MessageState {
    pub fn next(self) -> Option<Self> {
        match self {
            MessageState::Initial => Some(MessageState::HeaderComplete),
            MessageState::HeaderComplete => Some(MessageState::MsgComplete),
            MessageState::MsgComplete => None,
        }
    }

    pub fn advance(&mut self, to: MessageState) -> Result<()> {
        if self.next() != Some(to) {
            return Err(Error::StateTransition { from: *self, to });
        }
        *self = to;
        Ok(())
    }
}
