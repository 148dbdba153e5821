//! Daemon boot sequence and lifetime: apply global options, build the
//! registry, autostart groups in priority order, serve the control
//! endpoint, and stop everything in reverse on shutdown.

use std::sync::Arc;

use anyhow::{Context, Result};
use libsupervisor::{Config, Registry};
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::server;

// hand-expanded `#[tokio::main]`: the macro rejects a fn named `main`
// that takes arguments
pub fn main(config: Config) -> Result<()> {
    tokio::runtime::Runtime::new()
        .context("building the tokio runtime")?
        .block_on(async_main(config))
}

async fn async_main(config: Config) -> Result<()> {
    apply_global(&config)?;

    let registry = Arc::new(Registry::from_config(&config));
    registry.start_all(true).await;

    let shutdown = CancellationToken::new();
    let socket_path = config.socket.file.clone();
    let server = tokio::spawn(server::serve(
        socket_path.clone(),
        registry.clone(),
        shutdown.clone(),
    ));

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    tokio::select! {
        _ = sigterm.recv() => info!("SIGTERM received, shutting down"),
        _ = sigint.recv() => info!("SIGINT received, shutting down"),
        _ = shutdown.cancelled() => info!("shutdown requested over the control socket"),
    }
    shutdown.cancel();

    registry.stop_all().await;
    let _ = server.await;
    let _ = std::fs::remove_file(&socket_path);
    if let Some(pidfile) = &config.global.pidfile {
        let _ = std::fs::remove_file(pidfile);
    }
    info!("supervisor exited");
    Ok(())
}

fn apply_global(config: &Config) -> Result<()> {
    if let Some(mask) = config.global.umask {
        nix::sys::stat::umask(nix::sys::stat::Mode::from_bits_truncate(
            mask as nix::libc::mode_t,
        ));
    }
    if let Some(minfds) = config.global.minfds {
        raise_fd_limit(minfds);
    }
    if let Some(pidfile) = &config.global.pidfile {
        std::fs::write(pidfile, format!("{}\n", std::process::id()))
            .with_context(|| format!("writing pidfile {}", pidfile.display()))?;
    }
    Ok(())
}

fn raise_fd_limit(min: u64) {
    use nix::sys::resource::{Resource, getrlimit, setrlimit};
    match getrlimit(Resource::RLIMIT_NOFILE) {
        Ok((soft, hard)) if soft < min => {
            let target = min.min(hard);
            if let Err(e) = setrlimit(Resource::RLIMIT_NOFILE, target, hard) {
                warn!(error = %e, minfds = min, "could not raise the fd limit");
            }
        }
        Ok(_) => {}
        Err(e) => warn!(error = %e, "could not read the fd limit"),
    }
}
