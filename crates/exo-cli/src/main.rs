//! # exo CLI entry point
//!
//! Parses command-line arguments and dispatches to subcommand handlers.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use exo_cli::dispatch::{run_dispatch, DispatchArgs};
use exo_cli::inspect::{run_inspect, InspectArgs};
use exo_cli::verify::{run_verify_proof, run_verify_update, VerifyProofArgs, VerifyUpdateArgs};
use exo_cli::Output;

/// Merkle proof and update verifier for address-keyed dictionaries.
#[derive(Parser, Debug)]
#[command(name = "exo", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Print reports as JSON and log as JSON lines.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Verify a Merkle proof against an expected root.
    VerifyProof(VerifyProofArgs),

    /// Verify a Merkle update against the prior root and print the new root.
    VerifyUpdate(VerifyUpdateArgs),

    /// Summarize the cells of a bag of cells.
    Inspect(InspectArgs),

    /// Deliver one message to the contract and print its actions.
    Dispatch(DispatchArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if cli.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    let output = if cli.json { Output::Json } else { Output::Text };
    tracing::debug!(command = ?cli.command, "exo starting");

    let result = match &cli.command {
        Commands::VerifyProof(args) => run_verify_proof(args, output),
        Commands::VerifyUpdate(args) => run_verify_update(args, output),
        Commands::Inspect(args) => run_inspect(args, output),
        Commands::Dispatch(args) => run_dispatch(args, output),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const ROOT: &str = "96a296d224f285c67bee93c30f8a309157f0daa35dc5b87e410b78630a09cfc7";

    #[test]
    fn cli_parse_verify_proof_defaults() {
        let cli = Cli::try_parse_from(["exo", "verify-proof", "--proof", "p.boc", "--root", ROOT]).unwrap();
        let Commands::VerifyProof(args) = cli.command else {
            panic!("expected verify-proof");
        };
        assert_eq!(args.proof, PathBuf::from("p.boc"));
        assert_eq!(args.decode.root.to_hex(), ROOT);
        assert_eq!(args.decode.key_bits, 267);
        assert_eq!(args.decode.max_depth, 1023);
        assert!(!cli.json);
    }

    #[test]
    fn cli_parse_verify_update_overrides() {
        let cli = Cli::try_parse_from([
            "exo",
            "--json",
            "verify-update",
            "--update",
            "u.hex",
            "--root",
            ROOT,
            "--key-bits",
            "16",
            "--max-cells",
            "64",
        ])
        .unwrap();
        assert!(cli.json);
        let Commands::VerifyUpdate(args) = cli.command else {
            panic!("expected verify-update");
        };
        assert_eq!(args.decode.key_bits, 16);
        assert_eq!(args.decode.max_cells, 64);
    }

    #[test]
    fn cli_parse_rejects_bad_root() {
        assert!(Cli::try_parse_from(["exo", "verify-proof", "--proof", "p", "--root", "xyz"]).is_err());
    }

    #[test]
    fn cli_parse_dispatch() {
        let sender = format!("0:{}", "ab".repeat(32));
        let cli = Cli::try_parse_from([
            "exo",
            "-vv",
            "dispatch",
            "--config",
            "contract.yaml",
            "--sender",
            &sender,
            "--body",
            "body.boc",
            "--bounced",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        let Commands::Dispatch(args) = cli.command else {
            panic!("expected dispatch");
        };
        assert_eq!(args.sender.to_string(), sender);
        assert!(args.bounced);
        assert_eq!(args.value, 0);
        assert!(args.storage.is_none());
    }

    #[test]
    fn cli_parse_inspect() {
        let cli = Cli::try_parse_from(["exo", "inspect", "x.boc"]).unwrap();
        assert!(matches!(cli.command, Commands::Inspect(_)));
    }
}
