// src/main.rs

use std::process::ExitCode;

use stardag::{cli, logging, run};

/// Exit code when the run could not start (bad config, missing warehouse).
const EXIT_NOT_STARTED: u8 = 3;

#[tokio::main]
async fn main() -> ExitCode {
    match run_main().await {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("stardag error: {err:?}");
            ExitCode::from(EXIT_NOT_STARTED)
        }
    }
}

async fn run_main() -> anyhow::Result<u8> {
    let args = cli::parse();
    logging::init_logging(args.log_level)?;

    let Some(report) = run(args).await? else {
        return Ok(0);
    };
    print!("{report}");
    Ok(report.exit_code())
}
