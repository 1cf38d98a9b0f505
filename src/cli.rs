// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands, their arguments and the global output flags.

use clap::{Parser, Subcommand};
use convoy::output::OutputMode;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "convoy")]
#[command(about = "Promote builds through dev, staging and prod with health checks and rollback")]
#[command(version)]
pub struct Cli {
    /// Path to convoy.yml (default: discovered from the current directory)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print final results
    #[arg(short, long, global = true, conflicts_with = "json")]
    pub quiet: bool,

    /// Print JSON lines
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn output_mode(&self) -> OutputMode {
        if self.json {
            OutputMode::Json
        } else if self.quiet {
            OutputMode::Quiet
        } else {
            OutputMode::Normal
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new convoy.yml configuration file
    Init {
        /// Service name
        #[arg(long)]
        service: Option<String>,

        /// Image repository
        #[arg(long)]
        image: Option<String>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Check the configuration without deploying
    Validate,

    /// Deploy a finished build according to the trigger table
    Trigger {
        /// Commit the build was made from
        #[arg(long)]
        commit: String,

        /// Branch or tag that was pushed
        #[arg(long = "ref")]
        branch_or_tag: String,

        /// Build request identifier from the CI system
        #[arg(long)]
        build_request: Option<String>,

        /// Pre-approve gated environments as this person
        #[arg(long)]
        approve_as: Option<String>,

        /// Break another orchestrator's lock on the state directory
        #[arg(long)]
        force: bool,
    },

    /// Deploy an image to one environment
    Deploy {
        /// Target environment
        #[arg(short, long)]
        env: String,

        /// Commit the build was made from
        #[arg(long)]
        commit: String,

        /// Image tag (default: the commit SHA)
        #[arg(long)]
        tag: Option<String>,

        /// Pin the image to this digest instead of resolving the tag
        #[arg(long)]
        digest: Option<String>,

        /// Cancel an in-flight deployment to the environment
        #[arg(long)]
        supersede: bool,

        /// Pre-approve the deployment as this person
        #[arg(long)]
        approve_as: Option<String>,

        /// Break another orchestrator's lock on the state directory
        #[arg(long)]
        force: bool,
    },

    /// Promote the healthy artifact of an environment to the next one
    Promote {
        /// Source environment
        #[arg(long)]
        from: String,

        /// Pre-approve the deployment as this person
        #[arg(long)]
        approve_as: Option<String>,

        /// Break another orchestrator's lock on the state directory
        #[arg(long)]
        force: bool,
    },

    /// Approve the next gated deployment to an environment
    Approve {
        /// Environment to approve
        #[arg(short, long)]
        env: String,

        /// Name of the approver
        #[arg(long = "as")]
        approver: String,

        /// Only approve this digest
        #[arg(long)]
        digest: Option<String>,
    },

    /// Show deployment history for an environment
    History {
        /// Environment to show
        #[arg(short, long)]
        env: String,

        /// Show only the most recent N deployments
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Show the current state of every environment
    Status,
}
