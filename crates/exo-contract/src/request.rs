//! # Inbound Requests
//!
//! Every request body starts with `op:uint32 query_id:uint64`:
//!
//! | op  | request        | payload                                  |
//! |-----|----------------|------------------------------------------|
//! | `0` | text comment   | ignored                                  |
//! | `1` | verify proof   | `merkle_root:uint256 proof:^Cell`        |
//! | `2` | verify update  | `merkle_root:uint256 update:^Cell`       |
//! | `3` | relay          | `mode:uint8`, 1 to 4 message references |
//!
//! Decoding is split in two. [`Envelope::parse()`] reads only the header,
//! so that the dispatcher knows which kind of request failed; payloads are
//! parsed afterwards. Relay payloads in particular are only parsed once
//! the sender has been authorized.

use exo_cell::{Cell, CellBuilder, CellSlice, MAX_REFS};
use exo_core::{Address, CellError, Coins, ContractError, NodeHash};

use crate::message::{OutboundMessage, SendMode};

/// Op codes.
pub mod op {
    /// Text comment.
    pub const COMMENT: u32 = 0x0000_0000;
    /// Verify a Merkle proof.
    pub const VERIFY_PROOF: u32 = 0x0000_0001;
    /// Verify a Merkle update.
    pub const VERIFY_UPDATE: u32 = 0x0000_0002;
    /// Relay owner messages.
    pub const RELAY: u32 = 0x0000_0003;
}

const HEADER_BITS: usize = 32 + 64;

/// A recognized request kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestTag {
    /// Verify a Merkle proof against a root.
    VerifyProof,
    /// Verify a Merkle update against the prior root.
    VerifyUpdate,
    /// Forward messages on behalf of the owner.
    Relay,
}

impl RequestTag {
    /// The op code of this request kind.
    pub fn op(self) -> u32 {
        match self {
            Self::VerifyProof => op::VERIFY_PROOF,
            Self::VerifyUpdate => op::VERIFY_UPDATE,
            Self::Relay => op::RELAY,
        }
    }
}

impl TryFrom<u32> for RequestTag {
    type Error = ContractError;

    fn try_from(op: u32) -> Result<Self, ContractError> {
        match op {
            op::VERIFY_PROOF => Ok(Self::VerifyProof),
            op::VERIFY_UPDATE => Ok(Self::VerifyUpdate),
            op::RELAY => Ok(Self::Relay),
            _ => Err(ContractError::UnknownRequest { op }),
        }
    }
}

impl std::fmt::Display for RequestTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::VerifyProof => "verify_proof",
            Self::VerifyUpdate => "verify_update",
            Self::Relay => "relay",
        };
        f.write_str(s)
    }
}

/// An internal message delivered to the contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Source address.
    pub sender: Address,
    /// Attached value.
    pub value: Coins,
    /// Whether this is a bounce of a message the contract sent.
    pub bounced: bool,
    /// Message body.
    pub body: Cell,
}

impl InboundMessage {
    /// A non-bounced message.
    pub fn new(sender: Address, value: Coins, body: Cell) -> Self {
        Self {
            sender,
            value,
            bounced: false,
            body,
        }
    }
}

/// Header of a tagged request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestHeader {
    /// Request kind.
    pub tag: RequestTag,
    /// Caller-chosen correlation id.
    pub query_id: u64,
}

/// First decoding step of an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Envelope {
    /// Empty body, text comment, or bounce: accepted with no effect.
    Transfer,
    /// A tagged request.
    Request(RequestHeader),
}

impl Envelope {
    /// Read the request header.
    ///
    /// Unknown op codes yield [`ContractError::UnknownRequest`]; a body too
    /// short for its header yields [`ContractError::MalformedRequest`].
    pub fn parse(msg: &InboundMessage) -> Result<Self, ContractError> {
        if msg.bounced {
            return Ok(Self::Transfer);
        }
        let body = &msg.body;
        if body.bit_len() == 0 && body.refs().is_empty() {
            return Ok(Self::Transfer);
        }
        let mut s = body.parser();
        let op = s.load_uint(32)? as u32;
        if op == op::COMMENT {
            return Ok(Self::Transfer);
        }
        let tag = RequestTag::try_from(op)?;
        let query_id = s.load_uint(64)?;
        Ok(Self::Request(RequestHeader { tag, query_id }))
    }
}

fn payload(body: &Cell) -> Result<CellSlice<'_>, ContractError> {
    let mut s = body.parser();
    s.skip(HEADER_BITS)?;
    Ok(s)
}

/// Payload of a verify-proof or verify-update request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyPayload {
    /// Expected root (the prior root, for updates).
    pub root: NodeHash,
    /// The Merkle proof or Merkle update cell.
    pub structure: Cell,
}

impl VerifyPayload {
    /// Parse the payload following the header of `body`.
    pub fn parse(body: &Cell) -> Result<Self, ContractError> {
        let mut s = payload(body)?;
        let root = s.load_hash()?;
        let structure = s.load_reference()?.clone();
        Ok(Self { root, structure })
    }
}

/// Payload of a relay request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayPayload {
    /// Mode every message is sent with.
    pub mode: SendMode,
    /// Message cells, in the order they are sent.
    pub messages: Vec<Cell>,
}

impl RelayPayload {
    /// Parse the payload following the header of `body`. Every message is
    /// decoded once to check that it is a well-formed internal message.
    pub fn parse(body: &Cell) -> Result<Self, ContractError> {
        let mut s = payload(body)?;
        let mode = SendMode::from_bits(s.load_uint(8)? as u8);
        let count = s.remaining_ref_count();
        if count == 0 {
            return Err(CellError::RefUnderflow.into());
        }
        let mut messages = Vec::with_capacity(count);
        for _ in 0..count {
            let cell = s.load_reference()?;
            OutboundMessage::parse(cell)?;
            messages.push(cell.clone());
        }
        Ok(Self { mode, messages })
    }
}

fn header(op: u32, query_id: u64) -> Result<CellBuilder, CellError> {
    let mut b = CellBuilder::new();
    b.store_uint(u64::from(op), 32)?.store_uint(query_id, 64)?;
    Ok(b)
}

/// Body of a verify-proof request.
pub fn verify_proof_body(query_id: u64, root: &NodeHash, proof: Cell) -> Result<Cell, CellError> {
    let mut b = header(op::VERIFY_PROOF, query_id)?;
    b.store_hash(root)?.store_reference(proof)?;
    b.build()
}

/// Body of a verify-update request.
pub fn verify_update_body(query_id: u64, old_root: &NodeHash, update: Cell) -> Result<Cell, CellError> {
    let mut b = header(op::VERIFY_UPDATE, query_id)?;
    b.store_hash(old_root)?.store_reference(update)?;
    b.build()
}

/// Body of a relay request carrying up to four messages.
pub fn relay_body(query_id: u64, mode: SendMode, messages: &[Cell]) -> Result<Cell, CellError> {
    if messages.len() > MAX_REFS {
        return Err(CellError::RefOverflow {
            refs: messages.len(),
        });
    }
    let mut b = header(op::RELAY, query_id)?;
    b.store_uint(u64::from(mode.bits()), 8)?;
    for m in messages {
        b.store_reference(m.clone())?;
    }
    b.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::text_comment;

    fn inbound(body: Cell) -> InboundMessage {
        InboundMessage::new(Address::new(0, [1; 32]), Coins::ZERO, body)
    }

    fn empty() -> Cell {
        CellBuilder::new().build().unwrap()
    }

    #[test]
    fn test_empty_comment_and_bounce_are_transfers() {
        assert_eq!(Envelope::parse(&inbound(empty())).unwrap(), Envelope::Transfer);
        assert_eq!(
            Envelope::parse(&inbound(text_comment("hi").unwrap())).unwrap(),
            Envelope::Transfer
        );
        let mut bounced = inbound(verify_proof_body(1, &NodeHash::ZERO, empty()).unwrap());
        bounced.bounced = true;
        assert_eq!(Envelope::parse(&bounced).unwrap(), Envelope::Transfer);
    }

    #[test]
    fn test_header_decoding() {
        let body = verify_update_body(77, &NodeHash::from_bytes([3; 32]), empty()).unwrap();
        assert_eq!(
            Envelope::parse(&inbound(body.clone())).unwrap(),
            Envelope::Request(RequestHeader {
                tag: RequestTag::VerifyUpdate,
                query_id: 77,
            })
        );
        let payload = VerifyPayload::parse(&body).unwrap();
        assert_eq!(payload.root, NodeHash::from_bytes([3; 32]));
        assert_eq!(payload.structure, empty());
    }

    #[test]
    fn test_unknown_op() {
        let mut b = CellBuilder::new();
        b.store_uint(0xdead, 32).unwrap().store_uint(0, 64).unwrap();
        assert_eq!(
            Envelope::parse(&inbound(b.build().unwrap())),
            Err(ContractError::UnknownRequest { op: 0xdead })
        );
    }

    #[test]
    fn test_short_body_is_malformed() {
        let mut b = CellBuilder::new();
        b.store_uint(1, 16).unwrap();
        assert!(matches!(
            Envelope::parse(&inbound(b.build().unwrap())),
            Err(ContractError::MalformedRequest(_))
        ));
    }

    #[test]
    fn test_verify_payload_without_reference_is_malformed() {
        let mut b = header(op::VERIFY_PROOF, 0).unwrap();
        b.store_hash(&NodeHash::ZERO).unwrap();
        assert!(VerifyPayload::parse(&b.build().unwrap()).is_err());
    }

    #[test]
    fn test_relay_payload() {
        let msg = OutboundMessage::new(Address::new(0, [5; 32]), Coins::ZERO, false, empty())
            .to_cell()
            .unwrap();
        let body = relay_body(4, SendMode::CARRY_ALL_REMAINING_INCOMING_VALUE, &[msg.clone()]).unwrap();
        let payload = RelayPayload::parse(&body).unwrap();
        assert_eq!(payload.mode, SendMode::CARRY_ALL_REMAINING_INCOMING_VALUE);
        assert_eq!(payload.messages, vec![msg]);

        let none = relay_body(4, SendMode::ORDINARY, &[]).unwrap();
        assert!(RelayPayload::parse(&none).is_err());

        let junk = relay_body(4, SendMode::ORDINARY, &[empty()]).unwrap();
        assert!(RelayPayload::parse(&junk).is_err());
    }

    #[test]
    fn test_tag_round_trip_through_op() {
        for tag in [RequestTag::VerifyProof, RequestTag::VerifyUpdate, RequestTag::Relay] {
            assert_eq!(RequestTag::try_from(tag.op()).unwrap(), tag);
        }
    }
}
