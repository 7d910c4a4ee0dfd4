//! # Dispatcher — Per-Request Typestate Machine
//!
//! Routes one inbound message to proof verification, update verification
//! or relay, and produces exactly one [`Outcome`].
//!
//! ## Phases
//!
//! ```text
//! Idle ──decode()──▶ Decoding ──verify()──▶ Verifying ──respond()──▶ Responding
//!   │                                                                    ▲
//!   └──── transfer / unknown op / malformed header ──────────────────────┘
//! ```
//!
//! Each phase is a distinct type; a [`Transaction`] can only move forward.
//! Nothing persists between requests.
//!
//! ## Security Invariant
//!
//! A relay is authorized before its payload is parsed, and a rejected or
//! malformed relay emits no actions at all. Verification failures of any
//! class reply `ERROR`; only authorization failures abort with `0x2001`.

use exo_cell::Cell;
use exo_core::{Address, ContractError, NodeHash, VerifyError};
use exo_merkle::{MerkleVerifier, ProofDecoder, ProofSkeleton, UpdateSkeleton, UpdateVerifier};
use serde::Serialize;

use crate::auth::authorize;
use crate::config::{ContractConfig, UnknownRequestPolicy};
use crate::outcome::{OutAction, Outcome, Signal, REPLY_ERROR, REPLY_OK};
use crate::request::{Envelope, InboundMessage, RelayPayload, RequestTag, VerifyPayload};
use crate::state::ContractState;

/// Phase of request processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchPhase {
    /// Message received, nothing decoded.
    Idle,
    /// Header and structure decoded.
    Decoding,
    /// Verifier or authorization gate has run.
    Verifying,
    /// Outcome assembled.
    Responding,
}

impl std::fmt::Display for DispatchPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "IDLE",
            Self::Decoding => "DECODING",
            Self::Verifying => "VERIFYING",
            Self::Responding => "RESPONDING",
        };
        f.write_str(s)
    }
}

/// Marker trait for transaction phases.
pub trait Phase: private::Sealed {
    /// The phase as a value.
    const PHASE: DispatchPhase;
}

mod private {
    pub trait Sealed {}
    impl Sealed for super::Idle {}
    impl Sealed for super::Decoding {}
    impl Sealed for super::Verifying {}
}

/// Nothing decoded yet.
#[derive(Debug)]
pub struct Idle;

/// Request header and structure decoded.
#[derive(Debug)]
pub struct Decoding {
    query_id: u64,
    request: Decoded,
}

/// Verdict reached.
#[derive(Debug)]
pub struct Verifying {
    query_id: u64,
    verdict: Verdict,
}

impl Phase for Idle {
    const PHASE: DispatchPhase = DispatchPhase::Idle;
}

impl Phase for Decoding {
    const PHASE: DispatchPhase = DispatchPhase::Decoding;
}

impl Phase for Verifying {
    const PHASE: DispatchPhase = DispatchPhase::Verifying;
}

#[derive(Debug)]
enum Decoded {
    Proof(Result<(NodeHash, ProofSkeleton), VerifyError>),
    Update(Result<(NodeHash, UpdateSkeleton), VerifyError>),
    Relay,
}

#[derive(Debug)]
enum Verdict {
    Verified { new_root: Option<NodeHash> },
    Failed(VerifyError),
    Relay(Result<RelayPayload, ContractError>),
}

/// One inbound message on its way through the phases.
#[derive(Debug)]
pub struct Transaction<'m, S: Phase> {
    msg: &'m InboundMessage,
    phases: Vec<DispatchPhase>,
    state: S,
}

impl<'m, S: Phase> Transaction<'m, S> {
    /// Current phase.
    pub fn phase(&self) -> DispatchPhase {
        S::PHASE
    }

    fn advance<T: Phase>(mut self, state: T) -> Transaction<'m, T> {
        self.phases.push(T::PHASE);
        Transaction {
            msg: self.msg,
            phases: self.phases,
            state,
        }
    }

    fn finish(
        mut self,
        signal: Signal,
        actions: Vec<OutAction>,
        new_root: Option<NodeHash>,
        query_id: Option<u64>,
    ) -> Outcome {
        self.phases.push(DispatchPhase::Responding);
        Outcome {
            signal,
            actions,
            new_root,
            query_id,
            phases: self.phases,
        }
    }

    fn reply(self, text: &str, new_root: Option<NodeHash>, query_id: u64) -> Outcome {
        let signal = if text == REPLY_OK { Signal::Ok } else { Signal::Error };
        match OutAction::reply(&self.msg.sender, text) {
            Ok(action) => self.finish(signal, vec![action], new_root, Some(query_id)),
            Err(err) => {
                let err = ContractError::from(err);
                self.finish(Signal::abort(&err), Vec::new(), None, Some(query_id))
            }
        }
    }
}

impl<'m> Transaction<'m, Idle> {
    /// Start processing `msg`.
    pub fn new(msg: &'m InboundMessage) -> Self {
        Self {
            msg,
            phases: vec![DispatchPhase::Idle],
            state: Idle,
        }
    }

    /// Read the header and decode any proof structure. Messages that need
    /// no further work complete here.
    pub fn decode(self, contract: &Contract) -> Result<Transaction<'m, Decoding>, Outcome> {
        let header = match Envelope::parse(self.msg) {
            Ok(Envelope::Transfer) => {
                tracing::debug!(sender = %self.msg.sender, "transfer accepted");
                return Err(self.finish(Signal::Accepted, Vec::new(), None, None));
            }
            Ok(Envelope::Request(header)) => header,
            Err(err @ ContractError::UnknownRequest { .. })
                if contract.config.unknown_request == UnknownRequestPolicy::Ignore =>
            {
                tracing::debug!(error = %err, "unknown request ignored");
                return Err(self.finish(Signal::Accepted, Vec::new(), None, None));
            }
            Err(err) => {
                tracing::info!(error = %err, sender = %self.msg.sender, "request aborted");
                return Err(self.finish(Signal::abort(&err), Vec::new(), None, None));
            }
        };

        tracing::info!(
            op = header.tag.op(),
            query_id = header.query_id,
            sender = %self.msg.sender,
            request = %header.tag,
            "request received"
        );
        let body = &self.msg.body;
        let request = match header.tag {
            RequestTag::VerifyProof => Decoded::Proof(decode_payload(body, |c| {
                contract.decoder.decode_proof(c)
            })),
            RequestTag::VerifyUpdate => Decoded::Update(decode_payload(body, |c| {
                contract.decoder.decode_update(c)
            })),
            RequestTag::Relay => Decoded::Relay,
        };
        Ok(self.advance(Decoding {
            query_id: header.query_id,
            request,
        }))
    }
}

fn decode_payload<T>(
    body: &Cell,
    decode: impl FnOnce(&Cell) -> Result<T, VerifyError>,
) -> Result<(NodeHash, T), VerifyError> {
    let payload = VerifyPayload::parse(body).map_err(|e| VerifyError::MalformedStructure(e.to_string()))?;
    let skeleton = decode(&payload.structure)?;
    Ok((payload.root, skeleton))
}

impl<'m> Transaction<'m, Decoding> {
    /// Run the verifier, or the authorization gate for relays.
    pub fn verify(self, contract: &Contract) -> Transaction<'m, Verifying> {
        let Decoding { query_id, request } = &self.state;
        let query_id = *query_id;
        let verdict = match request {
            Decoded::Proof(Ok((root, skeleton))) => match contract.proofs.verify(skeleton, root) {
                Ok(_) => Verdict::Verified { new_root: None },
                Err(err) => Verdict::Failed(err),
            },
            Decoded::Update(Ok((root, skeleton))) => {
                match contract.updates.verify_update(skeleton, root) {
                    Ok(outcome) => Verdict::Verified {
                        new_root: Some(outcome.new_root),
                    },
                    Err(err) => Verdict::Failed(err),
                }
            }
            Decoded::Proof(Err(err)) | Decoded::Update(Err(err)) => Verdict::Failed(err.clone()),
            Decoded::Relay => Verdict::Relay(
                authorize(&self.msg.sender, contract.owner())
                    .and_then(|()| RelayPayload::parse(&self.msg.body)),
            ),
        };
        self.advance(Verifying { query_id, verdict })
    }
}

impl<'m> Transaction<'m, Verifying> {
    /// Assemble the outcome.
    pub fn respond(self) -> Outcome {
        let query_id = self.state.query_id;
        match &self.state.verdict {
            Verdict::Verified { new_root } => {
                let new_root = *new_root;
                match new_root {
                    Some(root) => tracing::info!(query_id, new_root = %root, "update verified"),
                    None => tracing::info!(query_id, "proof verified"),
                }
                self.reply(REPLY_OK, new_root, query_id)
            }
            Verdict::Failed(err) => {
                tracing::info!(query_id, error = %err, "verification failed");
                self.reply(REPLY_ERROR, None, query_id)
            }
            Verdict::Relay(Ok(payload)) => {
                let actions: Vec<OutAction> = payload
                    .messages
                    .iter()
                    .map(|message| OutAction {
                        mode: payload.mode,
                        message: message.clone(),
                    })
                    .collect();
                tracing::info!(query_id, count = actions.len(), mode = %payload.mode, "relayed");
                let signal = Signal::Relayed {
                    count: actions.len(),
                };
                self.finish(signal, actions, None, Some(query_id))
            }
            Verdict::Relay(Err(err)) => {
                let signal = Signal::abort(err);
                self.finish(signal, Vec::new(), None, Some(query_id))
            }
        }
    }
}

/// A deployed contract: immutable configuration, owner and verifiers.
#[derive(Debug, Clone)]
pub struct Contract {
    config: ContractConfig,
    state: ContractState,
    decoder: ProofDecoder,
    proofs: MerkleVerifier,
    updates: UpdateVerifier,
}

impl Contract {
    /// Deploy with the owner from `config`.
    pub fn deploy(config: ContractConfig) -> Result<Self, ContractError> {
        let state = ContractState::new(config.owner);
        Self::with_state(config, state)
    }

    /// Resume from a storage cell; the stored owner wins over the config.
    pub fn from_storage(config: ContractConfig, storage: &Cell) -> Result<Self, ContractError> {
        let state = ContractState::from_cell(storage)?;
        Self::with_state(config, state)
    }

    fn with_state(config: ContractConfig, state: ContractState) -> Result<Self, ContractError> {
        config.validate()?;
        let decoder = ProofDecoder::new(config.key_bits, config.limits)
            .map_err(|e| ContractError::Config(e.to_string()))?;
        tracing::info!(owner = %state.owner(), key_bits = config.key_bits, "contract deployed");
        Ok(Self {
            config,
            state,
            decoder,
            proofs: MerkleVerifier::sha256(),
            updates: UpdateVerifier::sha256(),
        })
    }

    /// Configuration in effect.
    pub fn config(&self) -> &ContractConfig {
        &self.config
    }

    /// The stored owner.
    pub fn owner(&self) -> &Address {
        self.state.owner()
    }

    /// Current storage cell.
    pub fn storage(&self) -> Result<Cell, ContractError> {
        self.state.to_cell()
    }

    /// Process one inbound message to completion.
    pub fn handle(&self, msg: &InboundMessage) -> Outcome {
        let decoded = match Transaction::new(msg).decode(self) {
            Ok(tx) => tx,
            Err(outcome) => return outcome,
        };
        decoded.verify(self).respond()
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::message::{text_comment, OutboundMessage, SendMode};
    use crate::request::relay_body;
    use exo_cell::CellBuilder;
    use exo_core::Coins;
    use exo_merkle::testkit::seeded_address;
    use proptest::prelude::*;

    fn contract() -> Contract {
        Contract::deploy(ContractConfig::new(seeded_address("owner"))).unwrap()
    }

    proptest! {
        #[test]
        fn stranger_relay_never_sends(account in any::<[u8; 32]>(), workchain in prop_oneof![Just(0i8), Just(-1i8)]) {
            let sender = Address::new(workchain, account);
            prop_assume!(sender != seeded_address("owner"));
            let inner = OutboundMessage::new(sender, Coins::ZERO, false, text_comment("x").unwrap());
            let body = relay_body(1, SendMode::CARRY_ALL_REMAINING_INCOMING_VALUE, &[inner.to_cell().unwrap()]).unwrap();
            let outcome = contract().handle(&InboundMessage::new(sender, Coins::ZERO, body));
            prop_assert_eq!(outcome.signal.exit_code(), Some(0x2001));
            prop_assert!(outcome.actions.is_empty());
        }

        #[test]
        fn arbitrary_bodies_yield_one_signal(op in 0u32..6, bits in proptest::collection::vec(any::<bool>(), 0..200)) {
            let mut b = CellBuilder::new();
            b.store_uint(u64::from(op), 32).unwrap();
            for bit in bits {
                b.store_bit(bit).unwrap();
            }
            let outcome = contract().handle(&InboundMessage::new(seeded_address("anyone"), Coins::ZERO, b.build().unwrap()));
            if outcome.is_aborted() {
                prop_assert!(outcome.actions.is_empty());
            } else {
                prop_assert!(outcome.actions.len() <= 1);
            }
        }
    }
}
