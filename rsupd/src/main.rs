use std::fs::File;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use daemonize::Daemonize;
use libsupervisor::Config;
use rsupd::supervisor;

#[derive(Parser)]
#[command(name = "rsupd")]
#[command(about = "A process supervision daemon", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Run the supervisor in the foreground")]
    Run {
        #[arg(short, long, value_name = "CONF")]
        config: PathBuf,
    },
    #[command(about = "Run the supervisor as a background daemon")]
    Daemon {
        #[arg(short, long, value_name = "CONF")]
        config: PathBuf,
    },
}

fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => {
            let cfg = Config::load(&config)
                .with_context(|| format!("loading {}", config.display()))?;
            supervisor::main(cfg)
        }
        Commands::Daemon { config } => {
            let cfg = Config::load(&config)
                .with_context(|| format!("loading {}", config.display()))?;
            if cfg.global.nodaemon {
                return supervisor::main(cfg);
            }
            let logfile = cfg
                .global
                .logfile
                .clone()
                .unwrap_or_else(|| PathBuf::from("/tmp/rsupd.log"));
            let out = File::create(&logfile)
                .with_context(|| format!("creating {}", logfile.display()))?;
            let err = File::create(logfile.with_extension("err"))?;
            let mut daemonize = Daemonize::new().stdout(out).stderr(err);
            if let Some(pidfile) = &cfg.global.pidfile {
                daemonize = daemonize.pid_file(pidfile);
            }
            daemonize.start().context("daemonize failed")?;
            supervisor::main(cfg)
        }
    }
}
