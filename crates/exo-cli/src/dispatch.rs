//! # Contract Dispatch
//!
//! `exo dispatch` deploys the contract from a YAML config (or resumes it
//! from a storage cell), delivers one inbound message and prints the
//! resulting signal and outbound actions.
//!
//! Exit status: `0` for an OK reply, a relay or a silent accept; `2` for an
//! ERROR reply; `3` when the transaction aborted; `1` on bad input.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use exo_cell::serialize;
use exo_contract::{
    parse_text_comment, Contract, ContractConfig, DispatchPhase, InboundMessage, OutAction,
    OutboundMessage, Outcome, SendMode, Signal,
};
use exo_core::{Address, Coins, NodeHash};
use serde::Serialize;

use crate::input::{encode_hex, read_cell};
use crate::Output;

/// Arguments of `exo dispatch`.
#[derive(Args, Debug)]
pub struct DispatchArgs {
    /// Contract configuration (YAML).
    #[arg(long)]
    pub config: PathBuf,

    /// Sender address (`workchain:hex`).
    #[arg(long)]
    pub sender: Address,

    /// Message body bag of cells (binary or hex).
    #[arg(long)]
    pub body: PathBuf,

    /// Attached value in nano-units.
    #[arg(long, default_value_t = 0)]
    pub value: u128,

    /// Deliver the message as a bounce.
    #[arg(long)]
    pub bounced: bool,

    /// Resume from this storage cell instead of deploying from the config.
    #[arg(long)]
    pub storage: Option<PathBuf>,
}

/// One outbound message, decoded for display.
#[derive(Debug, Serialize)]
pub struct ActionReport {
    /// Send mode.
    pub mode: SendMode,
    /// Recipient.
    pub destination: Address,
    /// Attached value.
    pub value: Coins,
    /// Bounce flag.
    pub bounce: bool,
    /// Body text, for comment bodies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// The serialized message.
    pub boc: String,
}

impl ActionReport {
    fn from_action(action: &OutAction) -> Result<Self> {
        let msg = OutboundMessage::parse(&action.message).context("contract produced an invalid message")?;
        Ok(Self {
            mode: action.mode,
            destination: msg.destination,
            value: msg.value,
            bounce: msg.bounce,
            comment: parse_text_comment(&msg.body),
            boc: encode_hex(&serialize(&action.message, true)?),
        })
    }
}

/// Result of one dispatched message.
#[derive(Debug, Serialize)]
pub struct DispatchReport {
    /// Final signal.
    #[serde(flatten)]
    pub signal: Signal,
    /// Query id of the request, when decoded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_id: Option<u64>,
    /// New dictionary root of a verified update.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_root: Option<NodeHash>,
    /// Phases the transaction passed through.
    pub phases: Vec<DispatchPhase>,
    /// Outbound messages in send order.
    pub actions: Vec<ActionReport>,
}

impl DispatchReport {
    fn from_outcome(outcome: &Outcome) -> Result<Self> {
        Ok(Self {
            signal: outcome.signal,
            query_id: outcome.query_id,
            new_root: outcome.new_root,
            phases: outcome.phases.clone(),
            actions: outcome
                .actions
                .iter()
                .map(ActionReport::from_action)
                .collect::<Result<_>>()?,
        })
    }

    fn exit_code(&self) -> u8 {
        match self.signal {
            Signal::Ok | Signal::Accepted | Signal::Relayed { .. } => 0,
            Signal::Error => 2,
            Signal::Aborted { .. } => 3,
        }
    }
}

impl std::fmt::Display for DispatchReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.signal {
            Signal::Ok => writeln!(f, "OK")?,
            Signal::Error => writeln!(f, "ERROR")?,
            Signal::Relayed { count } => writeln!(f, "RELAYED {count}")?,
            Signal::Accepted => writeln!(f, "ACCEPTED")?,
            Signal::Aborted { exit_code } => writeln!(f, "ABORTED exit_code={exit_code:#x}")?,
        }
        if let Some(q) = self.query_id {
            writeln!(f, "  query id: {q}")?;
        }
        if let Some(root) = &self.new_root {
            writeln!(f, "  new root: {root}")?;
        }
        let phases: Vec<String> = self.phases.iter().map(ToString::to_string).collect();
        writeln!(f, "  phases:   {}", phases.join(" -> "))?;
        for (i, a) in self.actions.iter().enumerate() {
            write!(f, "  action {i}: mode {} to {} value {}", a.mode, a.destination, a.value)?;
            match &a.comment {
                Some(text) => writeln!(f, " \"{text}\"")?,
                None => writeln!(f)?,
            }
        }
        Ok(())
    }
}

/// Execute `exo dispatch`.
pub fn run_dispatch(args: &DispatchArgs, output: Output) -> Result<u8> {
    let report = dispatch(args)?;
    output.emit(&report)?;
    Ok(report.exit_code())
}

fn dispatch(args: &DispatchArgs) -> Result<DispatchReport> {
    let config = ContractConfig::load(&args.config)?;
    let limits = config.limits;
    let contract = match &args.storage {
        Some(path) => Contract::from_storage(config, &read_cell(path, &limits)?)?,
        None => Contract::deploy(config)?,
    };
    let body = read_cell(&args.body, &limits)?;
    let value = Coins::from_nano(args.value).context("value exceeds 120 bits")?;
    let mut msg = InboundMessage::new(args.sender, value, body);
    msg.bounced = args.bounced;

    tracing::debug!(sender = %args.sender, bounced = args.bounced, "dispatching message");
    DispatchReport::from_outcome(&contract.handle(&msg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use exo_cell::{Cell, CellBuilder};
    use exo_contract::{relay_body, verify_proof_body};
    use exo_merkle::testkit::{address_key, seeded_address, Dictionary};
    use tempfile::TempDir;

    fn owner() -> Address {
        seeded_address("owner")
    }

    fn empty() -> Cell {
        CellBuilder::new().build().unwrap()
    }

    fn setup(body: &Cell) -> (TempDir, DispatchArgs) {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("contract.yaml");
        std::fs::write(&config, format!("owner: \"{}\"\n", owner())).unwrap();
        let body_path = dir.path().join("body.hex");
        std::fs::write(&body_path, encode_hex(&serialize(body, true).unwrap())).unwrap();
        let args = DispatchArgs {
            config,
            sender: seeded_address("caller"),
            body: body_path,
            value: 0,
            bounced: false,
            storage: None,
        };
        (dir, args)
    }

    #[test]
    fn test_dispatch_proof_replies_ok() {
        let mut d = Dictionary::new(267);
        for i in 0..3 {
            d.set_bool(address_key(&seeded_address(&i.to_string())), true);
        }
        let key = address_key(&seeded_address("1"));
        let body = verify_proof_body(42, &d.root_hash().unwrap(), d.merkle_proof(&[key]).unwrap()).unwrap();
        let (_dir, args) = setup(&body);

        let report = dispatch(&args).unwrap();
        assert_eq!(report.signal, Signal::Ok);
        assert_eq!(report.exit_code(), 0);
        assert_eq!(report.query_id, Some(42));
        assert_eq!(report.actions.len(), 1);
        assert_eq!(report.actions[0].comment.as_deref(), Some("OK"));
        assert_eq!(report.actions[0].destination, seeded_address("caller"));
        assert_eq!(report.actions[0].mode, SendMode::CARRY_ALL_REMAINING_INCOMING_VALUE);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["signal"], "ok");
        assert_eq!(json["query_id"], 42);
    }

    #[test]
    fn test_dispatch_stranger_relay_aborts() {
        let inner = OutboundMessage::new(
            seeded_address("target"),
            Coins::ZERO,
            false,
            exo_contract::text_comment("hi").unwrap(),
        );
        let body = relay_body(7, SendMode::ORDINARY, &[inner.to_cell().unwrap()]).unwrap();
        let (_dir, args) = setup(&body);

        let report = dispatch(&args).unwrap();
        assert_eq!(report.signal, Signal::Aborted { exit_code: 0x2001 });
        assert_eq!(report.exit_code(), 3);
        assert!(report.actions.is_empty());
        assert!(report.to_string().contains("ABORTED exit_code=0x2001"));
    }

    #[test]
    fn test_dispatch_bounce_is_accepted() {
        let body = verify_proof_body(1, &NodeHash::from_bytes([1; 32]), empty()).unwrap();
        let (_dir, mut args) = setup(&body);
        args.bounced = true;
        let report = dispatch(&args).unwrap();
        assert_eq!(report.signal, Signal::Accepted);
        assert_eq!(report.exit_code(), 0);
    }

    #[test]
    fn test_dispatch_bad_config_is_error() {
        let (dir, mut args) = setup(&empty());
        args.config = dir.path().join("missing.yaml");
        assert!(dispatch(&args).is_err());
    }
}
