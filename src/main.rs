//! tfharness - command-line entry point
//!
//! Runs the same init/apply/destroy sequence the integration tests use, so a
//! template can be exercised by hand before it goes into the suite.

use std::process::ExitCode;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use tfharness::cli::{Cli, Commands};
use tfharness::preflight::{format_preflight_errors, verify_environment};
use tfharness::{DestroyGuard, ProcessGuard, TerraformOptions, process_guard, terraform};

/// Initialize logging; RUST_LOG overrides the default `info` level
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    init_tracing();

    // Without handlers, Ctrl+C would leave terraform holding the state lock
    if let Err(e) = process_guard::init_signal_handlers() {
        warn!("Failed to initialize signal handlers: {}", e);
    }

    let cli = Cli::parse_args();
    debug!(?cli, "arguments parsed");

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    // Stops any terraform still running when this returns, on error or panic
    let _children = ProcessGuard::new();
    let options = cli.target.resolve()?;

    match cli.command {
        Commands::Check => {
            let result = verify_environment(&options);
            if !result.is_ok() {
                anyhow::bail!("{}", format_preflight_errors(&result));
            }
            println!("✓ terraform and {:?} are ready", options.terraform_dir);
        }
        Commands::Plan => {
            options.validate()?;
            print!("{}", terraform::init_and_plan(&options)?);
        }
        Commands::Apply => {
            options.validate()?;
            print!("{}", terraform::init_and_apply(&options)?);
        }
        Commands::Destroy => {
            options.validate()?;
            print!("{}", terraform::destroy(&options)?);
        }
        Commands::Cycle => run_cycle(&options)?,
        Commands::Output { name } => {
            options.validate()?;
            let json = match name {
                Some(key) => terraform::output(&options, &key)?,
                None => {
                    let all = terraform::output_all(&options)?;
                    let values = all.into_iter().map(|(k, v)| (k, v.value)).collect();
                    serde_json::Value::Object(values)
                }
            };
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
    }
    Ok(())
}

/// init + apply, then destroy whether or not the apply succeeded
fn run_cycle(options: &TerraformOptions) -> anyhow::Result<()> {
    options.validate()?;
    let guard = DestroyGuard::new(options);

    let applied = terraform::init_and_apply(options);
    let destroyed = guard.destroy_now();

    match (applied, destroyed) {
        (Ok(_), Ok(_)) => {
            info!("cycle completed");
            println!("✓ apply and destroy succeeded for {:?}", options.terraform_dir);
            Ok(())
        }
        (Err(apply_err), Ok(_)) => Err(apply_err.into()),
        (Ok(_), Err(destroy_err)) => Err(destroy_err.into()),
        (Err(apply_err), Err(destroy_err)) => {
            error!("destroy after failed apply also failed: {}", destroy_err);
            Err(apply_err.into())
        }
    }
}
