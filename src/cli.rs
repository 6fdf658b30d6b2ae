//! Command-line interface definitions for the `imago` binary.
//!
//! This module centralises the clap parser structures so both the main
//! binary and the build script can reuse them when generating the manual
//! page.

use clap::Parser;

/// Top-level CLI for the `imago` binary.
#[derive(Debug, Parser)]
#[command(
    name = "imago",
    about = "Bake machine images on disposable cloud instances",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Provision the build server, wait until it is ready, then tear it down.
    #[command(
        name = "provision",
        about = "Provision the build server, wait for readiness, and tear it down"
    )]
    Provision(ProvisionCommand),
}

/// Arguments for the `imago provision` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct ProvisionCommand {
    /// Override the instance flavor for this run.
    ///
    /// The provider validates availability during provisioning and rejects
    /// unknown flavors with a provider-specific error.
    #[arg(long, value_name = "FLAVOR")]
    pub(crate) flavor: Option<String>,
    /// Override the source image for this run.
    #[arg(long, value_name = "IMAGE")]
    pub(crate) image: Option<String>,
    /// Override the preferred availability zone for this run.
    ///
    /// The zone is promoted to the front of the candidate list; remaining
    /// candidates are still attempted in order when it is full.
    #[arg(long, value_name = "ZONE")]
    pub(crate) zone: Option<String>,
}
