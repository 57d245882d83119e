//! cli::args
//!
//! Command-line argument definitions using clap derive.
//!
//! # Global Flags
//!
//! - `--pod <path>`: Pod directory holding `.redstring/config.toml`
//! - `--debug`: Enable debug logging
//! - `--json`: Machine-readable output

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::identity::VerificationMethod;

/// redpod - Git-backed semantic pods with federation and multi-provider sync
#[derive(Parser, Debug)]
#[command(name = "redpod")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Pod directory (defaults to the current directory)
    #[arg(long, global = true, value_name = "PATH")]
    pub pod: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Parser::parse()
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the URIs derived from a domain
    Uris {
        /// Domain or URL, e.g. alice.com
        domain: String,
    },

    /// Build a cross-domain reference to a concept
    #[command(
        name = "ref",
        after_help = "\
EXAMPLES:
    redpod ref alice.com bob.org 'Climate Policy'
        https://alice.com/redstring/vocab/references:bob.org:climatepolicy
        -> https://bob.org/redstring/vocab/climatepolicy"
    )]
    Ref {
        /// Domain that holds the reference
        source: String,
        /// Domain that owns the concept
        target: String,
        /// Concept name or slug
        concept: String,
    },

    /// Print the JSON-LD context for a domain
    Context {
        domain: String,
    },

    /// Check that a domain carries the verification record
    #[command(long_about = "Check that a domain carries the verification record.\n\n\
        dns-txt looks for a TXT record `redstring-verification=verified` on the \
        domain. well-known-file fetches \
        https://{domain}/.well-known/redstring-verification and looks for the \
        same line.")]
    Verify {
        domain: String,

        /// dns-txt or well-known-file
        #[arg(long, default_value = "dns-txt", value_parser = parse_method)]
        method: VerificationMethod,
    },

    /// List the federation peers of a domain
    Peers {
        domain: String,

        /// Merge in the directories of these domains too
        #[arg(long = "with", value_name = "DOMAIN")]
        with: Vec<String>,
    },

    /// Export the pod as N-Quads
    Export {
        /// Provider id (defaults to the primary)
        #[arg(long)]
        provider: Option<String>,

        /// Output file (defaults to stdout)
        #[arg(long, short, value_name = "FILE")]
        out: Option<PathBuf>,
    },

    /// Move the pod to another provider and make it primary
    Migrate {
        /// Provider id of the destination
        #[arg(long)]
        to: String,
    },

    /// Show providers, heads and sync history
    Status,
}

fn parse_method(s: &str) -> Result<VerificationMethod, String> {
    VerificationMethod::parse(s)
        .ok_or_else(|| format!("unknown method '{}' (expected dns-txt or well-known-file)", s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["redpod", "status", "--json", "--pod", "/tmp/p"]).unwrap();
        assert!(cli.json);
        assert_eq!(cli.pod, Some(PathBuf::from("/tmp/p")));
        assert!(matches!(cli.command, Command::Status));
    }

    #[test]
    fn verify_method_aliases() {
        let cli = Cli::try_parse_from(["redpod", "verify", "alice.com", "--method", "well-known"])
            .unwrap();
        let Command::Verify { method, .. } = cli.command else {
            panic!("expected verify");
        };
        assert_eq!(method, VerificationMethod::WellKnownFile);
    }

    #[test]
    fn unknown_method_is_rejected() {
        assert!(Cli::try_parse_from(["redpod", "verify", "alice.com", "--method", "smtp"]).is_err());
    }

    #[test]
    fn peers_collects_repeated_with() {
        let cli = Cli::try_parse_from([
            "redpod", "peers", "alice.com", "--with", "bob.org", "--with", "carol.net",
        ])
        .unwrap();
        let Command::Peers { with, .. } = cli.command else {
            panic!("expected peers");
        };
        assert_eq!(with, vec!["bob.org", "carol.net"]);
    }
}
