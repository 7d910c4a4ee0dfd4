//! # exo-contract — Owner-Gated Relay and Proof Dispatch
//!
//! Models the on-chain contract: a single stored owner, three request
//! kinds, and one outcome per inbound message.
//!
//! - [`config`]: deployment configuration (YAML).
//! - [`state`]: the persistent storage cell.
//! - [`auth`]: the authorization gate.
//! - [`request`] and [`message`]: inbound request and outbound message codecs.
//! - [`dispatcher`]: the per-request typestate machine and [`Contract`].
//! - [`outcome`]: signals, reply texts, exit codes.
//!
//! ## Crate Policy
//!
//! - Every failure is handled inside [`Contract::handle()`]; callers always
//!   receive an [`Outcome`], never an error.
//! - No partial side effects: an aborted request emits no actions.

pub mod auth;
pub mod config;
pub mod dispatcher;
pub mod message;
pub mod outcome;
pub mod request;
pub mod state;

pub use auth::authorize;
pub use config::{ConfigError, ContractConfig, UnknownRequestPolicy};
pub use dispatcher::{Contract, DispatchPhase, Transaction};
pub use message::{parse_text_comment, text_comment, OutboundMessage, SendMode, StateInit, TickTock};
pub use outcome::{exit_code, OutAction, Outcome, Signal, REPLY_ERROR, REPLY_OK};
pub use request::{
    relay_body, verify_proof_body, verify_update_body, Envelope, InboundMessage, RelayPayload,
    RequestHeader, RequestTag, VerifyPayload,
};
pub use state::ContractState;
