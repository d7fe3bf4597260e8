//! CLI module for Scholar Agent
//!
//! Provides command-line interface parsing for the `scholar` binary.
//! Uses clap for argument parsing and owo-colors for colored terminal output.

pub mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Scholar Agent - literature discovery and cited synthesis
///
/// Searches arXiv and Crossref, merges and ranks the results, and writes a
/// narrative report whose citations are checked against the bibliography.
#[derive(Parser, Debug)]
#[command(
    name = "scholar",
    author = "Dirmacs <build@dirmacs.com>",
    version,
    about = "Scholar Agent - literature discovery with citation-checked synthesis",
    long_about = "Searches arXiv and Crossref for a research question, deduplicates and ranks\n\
                  the results, and asks a language model for a narrative report in which every\n\
                  citation refers to an entry of the bibliography.",
    after_help = "EXAMPLES:\n    \
                  scholar research \"graph neural networks for drug discovery\"\n    \
                  scholar research \"protein folding\" --top-k 5 --out report.md\n    \
                  scholar serve --port 8080          # Start the HTTP API\n    \
                  scholar config --validate          # Check scholar.toml"
)]
pub struct Cli {
    /// Path to the configuration file (defaults to ./scholar.toml if present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the literature pipeline for a research question
    Research {
        /// The research question
        query: String,

        /// Number of entries kept in the bibliography
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Maximum number of search queries, the original included
        #[arg(short, long)]
        fanout: Option<usize>,

        /// LLM provider to use (openai, together, ollama)
        #[arg(short, long)]
        provider: Option<String>,

        /// Stop retrieval after this many seconds and continue with what arrived
        #[arg(long)]
        deadline: Option<u64>,

        /// Write the Markdown report to this file
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Print the report as JSON instead of formatted text
        #[arg(long)]
        json: bool,
    },

    /// Start the HTTP API server
    Serve {
        /// Host address (overrides the configuration)
        #[arg(long)]
        host: Option<String>,

        /// Port (overrides the configuration)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Show the effective configuration
    Config {
        /// Validate the configuration and report warnings
        #[arg(long)]
        validate: bool,
    },

    /// List the enabled search sources
    Sources,
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_research_flags() {
        let cli = Cli::try_parse_from([
            "scholar", "research", "protein folding", "-k", "5", "--fanout", "2", "--deadline",
            "20", "--json",
        ])
        .unwrap();
        match cli.command {
            Commands::Research {
                query,
                top_k,
                fanout,
                deadline,
                json,
                out,
                ..
            } => {
                assert_eq!(query, "protein folding");
                assert_eq!(top_k, Some(5));
                assert_eq!(fanout, Some(2));
                assert_eq!(deadline, Some(20));
                assert!(json);
                assert!(out.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "scholar", "sources", "--config", "custom.toml", "--no-color", "--log-json",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("custom.toml")));
        assert!(cli.no_color);
        assert!(cli.log_json);
        assert!(matches!(cli.command, Commands::Sources));
    }

    #[test]
    fn test_research_requires_query() {
        assert!(Cli::try_parse_from(["scholar", "research"]).is_err());
    }
}
