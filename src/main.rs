use std::{fs::File, io, process::ExitCode};

use anyhow::{Result, anyhow};
use clap::{Parser, error::ErrorKind};
use daemonize::Daemonize;
use log::{LevelFilter, error};
use syslog::{BasicLogger, Facility, Formatter3164};

use nvfand::{
    application::Application,
    cli::{Cli, Command},
    settings::Settings,
};

const DAEMON_LOG: &str = "/var/tmp/nvfand.log";

fn init_log() -> Result<()> {
    syslog::unix(Formatter3164 {
        facility: Facility::LOG_DAEMON,
        hostname: None,
        process: "nvfand".into(),
        pid: 0,
    })
    .map_err(|e| anyhow!("{e}"))
    .and_then(|logger| {
        log::set_boxed_logger(Box::new(BasicLogger::new(logger)))
            .map(|_| log::set_max_level(LevelFilter::Info))
            .map_err(|e| anyhow!("{e}"))
    })
}

fn into_daemon() -> Result<()> {
    File::create(DAEMON_LOG)
        .and_then(|out| Ok((out.try_clone()?, out)))
        .map_err(|e| anyhow!("{e}"))
        .and_then(|(stderr, stdout)| {
            Daemonize::new()
                .stdout(stdout)
                .stderr(stderr)
                .start()
                .map_err(|e| anyhow!("{e}"))
        })
}

fn run(cli: Cli) -> Result<()> {
    let settings = Settings::load(cli.settings)?;

    if let Command::Daemon { daemonize: true } = cli.command {
        into_daemon()?;
    }

    let app = Application::builder().with_settings(settings).build()?;

    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?
        .block_on(async {
            let stdin = io::stdin();
            app.run(cli.command, stdin.lock(), &mut io::stdout()).await
        })
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
        }
    };

    if cli.command.logs_to_syslog() {
        if let Err(e) = init_log() {
            eprintln!("Logging to syslog unavailable: {e}");
        }
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
