//! Binary entry point for the Imago CLI.

use std::io::{self, Write};
use std::process;

use clap::Parser;
use thiserror::Error;

use imago::{
    BuildContext, BuilderConfig, CancelFlag, NovaCompute, ProvisionStep, Step, StepAction,
    WriteUi, run_pipeline,
};

mod cli;
use cli::{Cli, ProvisionCommand};

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("compute client error: {0}")]
    Compute(String),
    #[error("provisioning failed: {0}")]
    Provision(String),
}

#[tokio::main]
async fn main() {
    let parsed = Cli::parse();
    let exit_code = match dispatch(parsed).await {
        Ok(code) => code,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

async fn dispatch(parsed: Cli) -> Result<i32, CliError> {
    match parsed {
        Cli::Provision(command) => provision_command(command).await,
    }
}

async fn provision_command(args: ProvisionCommand) -> Result<i32, CliError> {
    let mut config =
        BuilderConfig::load_without_cli_args().map_err(|err| CliError::Config(err.to_string()))?;
    if let Some(flavor) = args.flavor {
        config.flavor = flavor;
    }
    if let Some(image) = args.image {
        config.source_image = image;
    }
    if let Some(zone) = args.zone {
        config.availability_zone = zone;
    }
    config
        .validate()
        .map_err(|err| CliError::Config(err.to_string()))?;

    let compute = NovaCompute::new(&config).map_err(|err| CliError::Compute(err.to_string()))?;

    let cancel = CancelFlag::new();
    let mut ctx = BuildContext {
        flavor_id: config.flavor.clone(),
        image_id: config.source_image.clone(),
        volume_id: config.volume_id.clone(),
        availability_zones: config.availability_zones.clone(),
        cancel: cancel.clone(),
        ..BuildContext::default()
    };

    let abort = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            abort.cancel();
        }
    });

    let mut steps: Vec<Box<dyn Step + Send>> =
        vec![Box::new(ProvisionStep::new(compute, &config))];
    let mut ui = WriteUi::new(io::stdout(), io::stderr());
    let outcome = run_pipeline(&mut steps, &mut ctx, &mut ui).await;

    if outcome == StepAction::Halt {
        let message = ctx
            .error
            .map(|err| err.to_string())
            .unwrap_or_else(|| String::from("pipeline halted"));
        return Err(CliError::Provision(message));
    }
    Ok(0)
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}
