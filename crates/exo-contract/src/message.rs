//! # Outbound Messages
//!
//! Codec for relaxed internal messages (`MessageRelaxed`) and text
//! comments, plus the send-mode flags attached to each outbound action.
//!
//! ```text
//! int_msg_info$0 ihr_disabled:Bool bounce:Bool bounced:Bool
//!   src:MsgAddress dest:MsgAddressInt value:CurrencyCollection
//!   ihr_fee:Grams fwd_fee:Grams created_lt:uint64 created_at:uint32
//! message$_ info init:(Maybe (Either StateInit ^StateInit))
//!   body:(Either X ^X)
//! ```

use exo_cell::{Cell, CellBuilder, CellSlice};
use exo_core::{Address, CellError, Coins};
use serde::{Deserialize, Serialize};

/// Flags passed with an outbound message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SendMode(u8);

impl SendMode {
    /// Plain send: fees deducted from the value.
    pub const ORDINARY: Self = Self(0);
    /// Pay forwarding fees from the contract balance.
    pub const PAY_FEES_SEPARATELY: Self = Self(1);
    /// Ignore errors during the action phase.
    pub const IGNORE_ERRORS: Self = Self(2);
    /// Destroy the contract if its balance reaches zero.
    pub const DESTROY_IF_ZERO: Self = Self(32);
    /// Carry all value remaining from the inbound message.
    pub const CARRY_ALL_REMAINING_INCOMING_VALUE: Self = Self(64);
    /// Carry the whole contract balance.
    pub const CARRY_ALL_BALANCE: Self = Self(128);

    /// Mode from raw flags.
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Raw flags.
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Whether all flags of `other` are set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for SendMode {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::fmt::Display for SendMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `tick:Bool tock:Bool` of a special account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickTock {
    /// Invoked on tick transactions.
    pub tick: bool,
    /// Invoked on tock transactions.
    pub tock: bool,
}

/// Initial state attached to a message.
///
/// ```text
/// _ split_depth:(Maybe (## 5)) special:(Maybe TickTock)
///   code:(Maybe ^Cell) data:(Maybe ^Cell) library:(Maybe ^Cell) = StateInit;
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateInit {
    /// Split depth, for large accounts.
    pub split_depth: Option<u8>,
    /// Tick-tock flags.
    pub special: Option<TickTock>,
    /// Code cell.
    pub code: Option<Cell>,
    /// Data cell.
    pub data: Option<Cell>,
    /// Root of the library dictionary.
    pub library: Option<Cell>,
}

impl StateInit {
    /// Read a state init from the current position of `s`.
    pub fn load(s: &mut CellSlice<'_>) -> Result<Self, CellError> {
        let split_depth = if s.load_bit()? {
            Some(s.load_uint(5)? as u8)
        } else {
            None
        };
        let special = if s.load_bit()? {
            Some(TickTock {
                tick: s.load_bit()?,
                tock: s.load_bit()?,
            })
        } else {
            None
        };
        Ok(Self {
            split_depth,
            special,
            code: load_maybe_ref(s)?,
            data: load_maybe_ref(s)?,
            library: load_maybe_ref(s)?,
        })
    }

    /// Append the state init to `b`.
    pub fn store(&self, b: &mut CellBuilder) -> Result<(), CellError> {
        match self.split_depth {
            Some(depth) => {
                b.store_bit(true)?.store_uint(u64::from(depth), 5)?;
            }
            None => {
                b.store_bit(false)?;
            }
        }
        match self.special {
            Some(tt) => {
                b.store_bit(true)?.store_bit(tt.tick)?.store_bit(tt.tock)?;
            }
            None => {
                b.store_bit(false)?;
            }
        }
        for part in [&self.code, &self.data, &self.library] {
            store_maybe_ref(b, part.as_ref())?;
        }
        Ok(())
    }

    /// The state init as its own cell.
    pub fn to_cell(&self) -> Result<Cell, CellError> {
        let mut b = CellBuilder::new();
        self.store(&mut b)?;
        b.build()
    }
}

fn load_maybe_ref(s: &mut CellSlice<'_>) -> Result<Option<Cell>, CellError> {
    if s.load_bit()? {
        Ok(Some(s.load_reference()?.clone()))
    } else {
        Ok(None)
    }
}

fn store_maybe_ref(b: &mut CellBuilder, cell: Option<&Cell>) -> Result<(), CellError> {
    match cell {
        Some(cell) => {
            b.store_bit(true)?.store_reference(cell.clone())?;
        }
        None => {
            b.store_bit(false)?;
        }
    }
    Ok(())
}

/// A parsed relaxed internal message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Bounce flag.
    pub bounce: bool,
    /// Destination address.
    pub destination: Address,
    /// Attached value.
    pub value: Coins,
    /// Root of the extra-currency dictionary, if any.
    pub extra_currencies: Option<Cell>,
    /// State init, whether it was stored inline or by reference.
    pub init: Option<StateInit>,
    /// Message body, inline bodies materialised as their own cell.
    pub body: Cell,
}

impl OutboundMessage {
    /// A message with no state init and no extra currencies.
    pub fn new(destination: Address, value: Coins, bounce: bool, body: Cell) -> Self {
        Self {
            bounce,
            destination,
            value,
            extra_currencies: None,
            init: None,
            body,
        }
    }

    /// Parse a `MessageRelaxed` cell with internal message info.
    pub fn parse(cell: &Cell) -> Result<Self, CellError> {
        let mut s = cell.parser();
        if s.load_bit()? {
            return Err(CellError::Boc("expected internal message info".to_string()));
        }
        let _ihr_disabled = s.load_bit()?;
        let bounce = s.load_bit()?;
        let _bounced = s.load_bit()?;
        let _src = s.load_maybe_address()?;
        let destination = s.load_address()?;
        let value = s.load_coins()?;
        let extra_currencies = load_maybe_ref(&mut s)?;
        let _ihr_fee = s.load_coins()?;
        let _fwd_fee = s.load_coins()?;
        s.skip(64 + 32)?;

        let init = if s.load_bit()? {
            if s.load_bit()? {
                let init_cell = s.load_reference()?;
                let mut is = init_cell.parser();
                let init = StateInit::load(&mut is)?;
                is.ensure_empty()?;
                Some(init)
            } else {
                Some(StateInit::load(&mut s)?)
            }
        } else {
            None
        };
        let body = if s.load_bit()? {
            let body = s.load_reference()?.clone();
            s.ensure_empty()?;
            body
        } else {
            rest_as_cell(&s)?
        };

        Ok(Self {
            bounce,
            destination,
            value,
            extra_currencies,
            init,
            body,
        })
    }

    /// Serialise as a `MessageRelaxed` cell with zero fees and timestamps.
    /// The state init and then the body are stored inline when they fit,
    /// by reference otherwise.
    pub fn to_cell(&self) -> Result<Cell, CellError> {
        let mut b = CellBuilder::new();
        b.store_bit(false)?
            .store_bit(true)?
            .store_bit(self.bounce)?
            .store_bit(false)?
            .store_address_none()?
            .store_address(&self.destination)?
            .store_coins(self.value)?;
        store_maybe_ref(&mut b, self.extra_currencies.as_ref())?;
        b.store_coins(Coins::ZERO)?
            .store_coins(Coins::ZERO)?
            .store_uint(0, 64)?
            .store_uint(0, 32)?;
        match &self.init {
            Some(init) => {
                let init_cell = init.to_cell()?;
                // Keep one bit and one reference free for the body.
                let inline = b.remaining_bits() > 2 + init_cell.bit_len()
                    && b.ref_count() + init_cell.refs().len() < exo_cell::MAX_REFS;
                if inline {
                    b.store_bit(true)?.store_bit(false)?.store_slice(&init_cell.parser())?;
                } else {
                    b.store_bit(true)?.store_bit(true)?.store_reference(init_cell)?;
                }
            }
            None => {
                b.store_bit(false)?;
            }
        }
        let inline = b.remaining_bits() > self.body.bit_len()
            && b.ref_count() + self.body.refs().len() <= exo_cell::MAX_REFS
            && !self.body.is_exotic();
        if inline {
            b.store_bit(false)?;
            b.store_slice(&self.body.parser())?;
        } else {
            b.store_bit(true)?.store_reference(self.body.clone())?;
        }
        b.build()
    }
}

fn rest_as_cell(s: &CellSlice<'_>) -> Result<Cell, CellError> {
    let mut b = CellBuilder::new();
    b.store_slice(s)?;
    b.build()
}

/// A text comment body: `0:uint32` then UTF-8 bytes, continued in a
/// chain of references when longer than one cell.
pub fn text_comment(text: &str) -> Result<Cell, CellError> {
    let bytes = text.as_bytes();
    let head = bytes.len().min(123);
    let tail = build_snake(&bytes[head..])?;
    let mut b = CellBuilder::new();
    b.store_uint(0, 32)?.store_bytes(&bytes[..head])?;
    if let Some(tail) = tail {
        b.store_reference(tail)?;
    }
    b.build()
}

fn build_snake(bytes: &[u8]) -> Result<Option<Cell>, CellError> {
    if bytes.is_empty() {
        return Ok(None);
    }
    let head = bytes.len().min(127);
    let tail = build_snake(&bytes[head..])?;
    let mut b = CellBuilder::new();
    b.store_bytes(&bytes[..head])?;
    if let Some(tail) = tail {
        b.store_reference(tail)?;
    }
    b.build().map(Some)
}

/// Read a text comment body, or `None` when the body is not one.
pub fn parse_text_comment(body: &Cell) -> Option<String> {
    let mut s = body.parser();
    if s.load_uint(32).ok()? != 0 {
        return None;
    }
    let mut bytes = Vec::new();
    loop {
        if s.remaining_bits() % 8 != 0 {
            return None;
        }
        bytes.extend(s.load_bytes(s.remaining_bits() / 8).ok()?);
        match s.remaining_ref_count() {
            0 => break,
            1 => s = s.load_reference().ok()?.parser(),
            _ => return None,
        }
    }
    String::from_utf8(bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(b: u8) -> Address {
        Address::new(0, [b; 32])
    }

    #[test]
    fn test_send_mode_flags() {
        let mode = SendMode::CARRY_ALL_REMAINING_INCOMING_VALUE | SendMode::IGNORE_ERRORS;
        assert_eq!(mode.bits(), 66);
        assert!(mode.contains(SendMode::IGNORE_ERRORS));
        assert!(!mode.contains(SendMode::PAY_FEES_SEPARATELY));
    }

    #[test]
    fn test_message_fields_survive_encoding() {
        let msg = OutboundMessage::new(
            addr(7),
            Coins::from_nano(1_500_000_000).unwrap(),
            true,
            text_comment("hello").unwrap(),
        );
        let parsed = OutboundMessage::parse(&msg.to_cell().unwrap()).unwrap();
        assert_eq!(parsed, msg);
        assert_eq!(parse_text_comment(&parsed.body).as_deref(), Some("hello"));
    }

    #[test]
    fn test_large_body_goes_by_reference() {
        let long = "x".repeat(300);
        let msg = OutboundMessage::new(addr(1), Coins::ZERO, false, text_comment(&long).unwrap());
        let cell = msg.to_cell().unwrap();
        assert_eq!(cell.refs().len(), 1);
        let parsed = OutboundMessage::parse(&cell).unwrap();
        assert_eq!(parse_text_comment(&parsed.body).as_deref(), Some(long.as_str()));
    }

    fn code() -> Cell {
        let mut b = CellBuilder::new();
        b.store_uint(0xff00_f4a4, 32).unwrap();
        b.build().unwrap()
    }

    #[test]
    fn test_inline_state_init_parsed() {
        let mut msg = OutboundMessage::new(addr(3), Coins::ZERO, false, CellBuilder::new().build().unwrap());
        msg.init = Some(StateInit {
            code: Some(code()),
            ..StateInit::default()
        });
        let cell = msg.to_cell().unwrap();
        // code ref only: the init sits in the message cell itself
        assert_eq!(cell.refs().len(), 1);
        assert_eq!(cell.refs()[0], code());
        assert_eq!(OutboundMessage::parse(&cell).unwrap(), msg);
    }

    #[test]
    fn test_state_init_by_reference_parsed() {
        let init = StateInit {
            split_depth: Some(4),
            special: Some(TickTock { tick: true, tock: false }),
            code: Some(code()),
            data: Some(CellBuilder::new().build().unwrap()),
            library: None,
        };
        let mut b = CellBuilder::new();
        b.store_uint(0b0110, 4)
            .unwrap()
            .store_address_none()
            .unwrap()
            .store_address(&addr(4))
            .unwrap()
            .store_coins(Coins::ZERO)
            .unwrap()
            .store_bit(false)
            .unwrap()
            .store_coins(Coins::ZERO)
            .unwrap()
            .store_coins(Coins::ZERO)
            .unwrap()
            .store_uint(0, 64)
            .unwrap()
            .store_uint(0, 32)
            .unwrap()
            .store_bit(true)
            .unwrap()
            .store_bit(true)
            .unwrap()
            .store_reference(init.to_cell().unwrap())
            .unwrap()
            .store_bit(false)
            .unwrap();
        let parsed = OutboundMessage::parse(&b.build().unwrap()).unwrap();
        assert_eq!(parsed.init, Some(init));
        assert!(parsed.bounce);
    }

    #[test]
    fn test_extra_currencies_parsed() {
        let mut extra = CellBuilder::new();
        extra.store_uint(0xabcd, 16).unwrap();
        let mut msg = OutboundMessage::new(addr(5), Coins::from_nano(10).unwrap(), true, text_comment("x").unwrap());
        msg.extra_currencies = Some(extra.build().unwrap());
        let parsed = OutboundMessage::parse(&msg.to_cell().unwrap()).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn test_external_message_rejected() {
        let mut b = CellBuilder::new();
        b.store_uint(0b10, 2).unwrap();
        assert!(OutboundMessage::parse(&b.build().unwrap()).is_err());
    }

    #[test]
    fn test_truncated_message_rejected() {
        let msg = OutboundMessage::new(addr(2), Coins::ZERO, false, CellBuilder::new().build().unwrap());
        let cell = msg.to_cell().unwrap();
        let mut b = CellBuilder::new();
        b.store_bits(&cell.data().slice(0, 100)).unwrap();
        assert!(matches!(
            OutboundMessage::parse(&b.build().unwrap()),
            Err(CellError::Underflow { .. })
        ));
    }

    #[test]
    fn test_text_comment_layout() {
        let cell = text_comment("OK").unwrap();
        assert_eq!(cell.bit_len(), 32 + 16);
        assert_eq!(&cell.data().as_bytes()[4..], b"OK");
        assert_eq!(parse_text_comment(&cell).as_deref(), Some("OK"));
        assert_eq!(parse_text_comment(&CellBuilder::new().build().unwrap()), None);
    }
}
