mod client;

use std::io::Write;
use std::path::PathBuf;

use chrono::Utc;
use clap::{Parser, Subcommand};
use common::{ControlRequest, ControlResponse, ProcessSnapshot};
use tabwriter::TabWriter;

#[derive(Parser)]
#[command(name = "rsupctl")]
#[command(about = "Control client for the rsupd process supervisor", long_about = None)]
struct Cli {
    /// Path to the rsupd control socket
    #[arg(short, long, default_value = "/tmp/rsupd.sock")]
    socket: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Show the state of one child, or of all of them")]
    Status {
        #[arg(value_name = "NAME")]
        name: Option<String>,
    },
    #[command(about = "Start a child by name")]
    Start {
        #[arg(value_name = "NAME")]
        name: String,
    },
    #[command(about = "Stop a child by name")]
    Stop {
        #[arg(value_name = "NAME")]
        name: String,
    },
    #[command(about = "Stop and start a child by name")]
    Restart {
        #[arg(value_name = "NAME")]
        name: String,
    },
    #[command(about = "Stop every child and exit the daemon")]
    Shutdown,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let request = match cli.command {
        Commands::Status { name } => ControlRequest::Status { name },
        Commands::Start { name } => ControlRequest::Start { name },
        Commands::Stop { name } => ControlRequest::Stop { name },
        Commands::Restart { name } => ControlRequest::Restart { name },
        Commands::Shutdown => ControlRequest::Shutdown,
    };

    match client::request(&cli.socket, &request).await? {
        ControlResponse::Status(snapshots) => print!("{}", render_status(&snapshots)),
        ControlResponse::Ok { detail } => println!("{detail}"),
        ControlResponse::Err { reason } => {
            eprintln!("error: {reason}");
            std::process::exit(1);
        }
    }
    Ok(())
}

fn render_status(snapshots: &[ProcessSnapshot]) -> String {
    let now = Utc::now();
    let mut tw = TabWriter::new(Vec::new());
    writeln!(tw, "NAME\tGROUP\tSTATE\tPID\tUPTIME\tRESTARTS\tEXIT").unwrap();
    for snap in snapshots {
        let pid = snap.pid.map(|p| p.to_string()).unwrap_or_else(|| "-".into());
        let uptime = snap
            .uptime_secs(now)
            .map(format_uptime)
            .unwrap_or_else(|| "-".into());
        let exit = snap
            .exit_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "-".into());
        writeln!(
            tw,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}",
            snap.name, snap.group, snap.state, pid, uptime, snap.restarts, exit
        )
        .unwrap();
    }
    tw.flush().unwrap();
    String::from_utf8(tw.into_inner().unwrap()).unwrap()
}

fn format_uptime(secs: i64) -> String {
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    format!("{hours}:{minutes:02}:{seconds:02}")
}
