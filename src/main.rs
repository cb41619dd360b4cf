use clap::{value_parser, Arg, Command};
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use bucketsync::bucket;
use bucketsync::logging::*;
use bucketsync::signal::setup_signal_handlers;
use bucketsync::validation::Validator;
use bucketsync::{Config, LocalSessionProvider, RunOutcome, SyncEngine};

fn cli() -> Command {
	Command::new("bucketsync")
		.version(env!("CARGO_PKG_VERSION"))
		.author("Szilard Hajba <szilu@symbion.hu>")
		.about("One-way mirror of date-bucketed directory trees")
		.subcommand_required(true)
		.arg(
			Arg::new("config")
				.short('c')
				.long("config")
				.value_name("FILE")
				.global(true)
				.default_value("config.json")
				.help("Config file (.json, .json5 or .toml)"),
		)
		.subcommand(Command::new("run").about("Run one sync"))
		.subcommand(
			Command::new("buckets").about("Print the bucket names that would be scanned").arg(
				Arg::new("days")
					.short('d')
					.long("days")
					.value_name("DAYS")
					.value_parser(value_parser!(usize))
					.help("Number of days (defaults to days_to_sync)"),
			),
		)
		.subcommand(Command::new("check").about("Validate and print the effective configuration"))
}

async fn run(config: Config) -> Result<ExitCode, Box<dyn Error>> {
	let cancel = CancellationToken::new();
	setup_signal_handlers(cancel.clone());

	let engine = SyncEngine::new(Arc::new(LocalSessionProvider::new()), config);
	let report = engine.run(cancel).await;
	Ok(match report.outcome {
		RunOutcome::Completed => ExitCode::SUCCESS,
		RunOutcome::Cancelled => ExitCode::from(130),
		RunOutcome::Failed(_) => ExitCode::from(1),
	})
}

async fn real_main() -> Result<ExitCode, Box<dyn Error>> {
	let matches = cli().get_matches();
	// Installed before loading so config discovery is logged too
	let log = init_tracing("info");
	let config_path = PathBuf::from(
		matches.get_one::<String>("config").ok_or("config file argument required")?,
	);

	match matches.subcommand() {
		Some(("run", _)) => {
			let config = Config::load_validated(&config_path)?;
			if let Some(log) = &log {
				log.set_level(&config.log_level);
			}
			run(config).await
		}
		Some(("buckets", sub_matches)) => {
			let config = Config::load(&config_path)?;
			let days = sub_matches.get_one::<usize>("days").copied().unwrap_or(config.sync.days_to_sync);
			for name in bucket::date_buckets(days) {
				println!("{}", name);
			}
			Ok(ExitCode::SUCCESS)
		}
		Some(("check", _)) => {
			let config = Config::load(&config_path)?;
			println!("{}", serde_json::to_string_pretty(&config.masked())?);
			match config.validate() {
				Ok(()) => {
					println!("Configuration OK");
					Ok(ExitCode::SUCCESS)
				}
				Err(e) => {
					eprintln!("Configuration invalid: {}", e);
					Ok(ExitCode::from(1))
				}
			}
		}
		_ => Err("unknown subcommand".into()),
	}
}

#[tokio::main]
async fn main() -> ExitCode {
	match real_main().await {
		Ok(code) => code,
		Err(e) => {
			eprintln!("Error: {}", e);
			ExitCode::from(1)
		}
	}
}

// vim: ts=4
