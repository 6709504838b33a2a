use std::process::ExitCode;

use clap::Parser;
use playcore::{Cli, CliError};

#[tokio::main]
async fn main() -> ExitCode {
  playcore::init_logging();

  match playcore::run(Cli::parse()).await {
    Ok(()) => ExitCode::SUCCESS,
    Err(e) => {
      log::error!("{}", e);
      match e {
        CliError::Mpv(e) if e.is_transient() => ExitCode::from(3),
        _ => ExitCode::FAILURE,
      }
    }
  }
}
