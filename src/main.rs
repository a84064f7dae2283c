mod cli;
mod shader;
#[cfg(test)]
mod testing;
mod watch;

use std::process::ExitCode;

use clap::Parser;
use cli::{Cli, Config, Setup};
use codespan_reporting::term::termcolor::{ColorChoice, StandardStream};
use shader::validate::{self, Glslang};

#[macro_use]
extern crate tracing;

fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let setup = Cli::parse().resolve()?;

    if let Setup::Ready(config) = &setup {
        if config.watch {
            watch::watch(&config.shaders_root, || check_shaders(config).map(drop))?;
            return Ok(ExitCode::SUCCESS);
        }
    }

    let status = run(setup, check_shaders)?;
    Ok(ExitCode::from(status.exit_code()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    /// No validator is configured, nothing was checked.
    Skipped,
    Passed,
    Failed { strict: bool },
}

impl Status {
    /// Failures only change the exit status with `--strict`.
    fn exit_code(self) -> u8 {
        match self {
            Status::Failed { strict: true } => 1,
            Status::Skipped | Status::Passed | Status::Failed { strict: false } => 0,
        }
    }
}

fn run(
    setup: Setup,
    check: impl FnOnce(&Config) -> anyhow::Result<bool>,
) -> anyhow::Result<Status> {
    let config = match setup {
        Setup::Ready(config) => config,
        Setup::Unconfigured(reason) => {
            warn!("{reason}");
            return Ok(Status::Skipped);
        }
    };

    if check(&config)? {
        Ok(Status::Passed)
    } else {
        Ok(Status::Failed {
            strict: config.strict,
        })
    }
}

/// Validates the whole shader tree once. Returns `true` if every program passed.
fn check_shaders(config: &Config) -> anyhow::Result<bool> {
    info!(
        validator = %config.validator.display(),
        shaders = %config.shaders_root.display(),
        mode = ?config.mode,
        "validating shaders"
    );

    let directories = shader::discover(&config.shaders_root, &config.stages)?;

    let validator = Glslang::new(&config.validator);
    let options = validate::Options {
        include_dir: config.shaders_root.clone(),
        mode: config.mode,
    };

    let mut report = StandardStream::stderr(ColorChoice::Auto);
    let summary = validate::validate_all(&directories, &validator, &options, &mut report);

    let programs = summary.results().count();
    let failed = summary.failures().count();
    if summary.success() {
        info!(programs, "all shaders validated successfully");
    } else {
        error!(programs, failed, "some shaders have validation errors");
    }

    Ok(summary.success())
}
