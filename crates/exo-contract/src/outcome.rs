//! # Request Outcomes
//!
//! Each request ends in exactly one [`Signal`]. Verification results reply
//! to the requester with the literal text `OK` or `ERROR`; relays emit the
//! owner's messages; aborts carry an exit code and emit nothing.

use exo_cell::Cell;
use exo_core::{Address, CellError, Coins, ContractError, NodeHash};
use serde::Serialize;

use crate::dispatcher::DispatchPhase;
use crate::message::{text_comment, OutboundMessage, SendMode};

/// Exit codes a request aborts with.
pub mod exit_code {
    /// A cell read ran past its end.
    pub const CELL_UNDERFLOW: u32 = 9;
    /// Relay from a sender other than the owner.
    pub const NOT_OWNER: u32 = 0x2001;
    /// Contract state or configuration out of range.
    pub const CONFIG_INVALID: u32 = 0x2002;
    /// Unrecognized op code, under the `reject` policy.
    pub const UNKNOWN_OP: u32 = 0xffff;
}

/// Reply text on success.
pub const REPLY_OK: &str = "OK";
/// Reply text on verification failure.
pub const REPLY_ERROR: &str = "ERROR";

/// The single signal a request produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum Signal {
    /// Verification succeeded; `OK` reply sent.
    Ok,
    /// Verification failed; `ERROR` reply sent.
    Error,
    /// Owner's messages forwarded.
    Relayed {
        /// Number of messages sent.
        count: usize,
    },
    /// Accepted with no effect.
    Accepted,
    /// Aborted; no actions.
    Aborted {
        /// Exit code.
        exit_code: u32,
    },
}

impl Signal {
    /// Abort signal for a contract error.
    pub fn abort(err: &ContractError) -> Self {
        let exit_code = match err {
            ContractError::NotOwner { .. } => exit_code::NOT_OWNER,
            ContractError::UnknownRequest { .. } => exit_code::UNKNOWN_OP,
            ContractError::MalformedRequest(_) => exit_code::CELL_UNDERFLOW,
            ContractError::Config(_) => exit_code::CONFIG_INVALID,
        };
        Self::Aborted { exit_code }
    }

    /// Exit code, when aborted.
    pub fn exit_code(&self) -> Option<u32> {
        match self {
            Self::Aborted { exit_code } => Some(*exit_code),
            _ => None,
        }
    }
}

/// An outbound message action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutAction {
    /// Mode the message is sent with.
    pub mode: SendMode,
    /// Message cell, as sent.
    pub message: Cell,
}

impl OutAction {
    /// Reply to `requester` with a text comment, carrying the remaining
    /// inbound value back.
    pub fn reply(requester: &Address, text: &str) -> Result<Self, CellError> {
        let message = OutboundMessage::new(*requester, Coins::ZERO, false, text_comment(text)?).to_cell()?;
        Ok(Self {
            mode: SendMode::CARRY_ALL_REMAINING_INCOMING_VALUE,
            message,
        })
    }
}

/// Result of processing one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// The request's signal.
    pub signal: Signal,
    /// Actions emitted, in order. Empty unless the signal is `Ok`, `Error`
    /// or `Relayed`.
    pub actions: Vec<OutAction>,
    /// New root reported by a successful update.
    pub new_root: Option<NodeHash>,
    /// Query id of a tagged request.
    pub query_id: Option<u64>,
    /// Phases the request passed through.
    pub phases: Vec<DispatchPhase>,
}

impl Outcome {
    /// Whether the request aborted.
    pub fn is_aborted(&self) -> bool {
        matches!(self.signal, Signal::Aborted { .. })
    }

    /// Text of the reply, for `Ok` and `Error` signals.
    pub fn reply_text(&self) -> Option<&'static str> {
        match self.signal {
            Signal::Ok => Some(REPLY_OK),
            Signal::Error => Some(REPLY_ERROR),
            _ => None,
        }
    }
}
