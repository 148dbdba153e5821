//! Control endpoint: a unix socket speaking bincode-framed request /
//! response pairs, one exchange per connection. Each accepted connection
//! runs in its own task; per-child serialization happens inside the
//! controllers, so requests for distinct children proceed concurrently.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use common::{ControlRequest, ControlResponse};
use libsupervisor::Registry;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub async fn serve(
    path: PathBuf,
    registry: Arc<Registry>,
    shutdown: CancellationToken,
) -> Result<()> {
    if path.exists() {
        // stale socket from a previous run
        let _ = std::fs::remove_file(&path);
    }
    let listener = UnixListener::bind(&path)?;
    info!(socket = %path.display(), "control endpoint listening");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    let registry = registry.clone();
                    let shutdown = shutdown.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, registry, shutdown).await {
                            warn!(error = %e, "control session failed");
                        }
                    });
                }
                Err(e) => error!(error = %e, "accept failed"),
            },
        }
    }
    Ok(())
}

async fn handle_connection(
    mut stream: UnixStream,
    registry: Arc<Registry>,
    shutdown: CancellationToken,
) -> Result<()> {
    // the client closes its write half to mark the end of the request
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await?;

    let response = match bincode::deserialize::<ControlRequest>(&buf) {
        Ok(request) => {
            debug!(?request, "control request");
            dispatch(request, &registry, &shutdown).await
        }
        Err(e) => ControlResponse::Err {
            reason: format!("malformed request: {e}"),
        },
    };

    let data = bincode::serialize(&response)?;
    stream.write_all(&data).await?;
    stream.shutdown().await?;
    Ok(())
}

pub async fn dispatch(
    request: ControlRequest,
    registry: &Arc<Registry>,
    shutdown: &CancellationToken,
) -> ControlResponse {
    match request {
        ControlRequest::Status { name } => match registry.snapshot(name.as_deref()).await {
            Ok(snapshots) => ControlResponse::Status(snapshots),
            Err(e) => ControlResponse::Err {
                reason: e.to_string(),
            },
        },
        ControlRequest::Start { name } => run_op(registry, &name, Op::Start).await,
        ControlRequest::Stop { name } => run_op(registry, &name, Op::Stop).await,
        ControlRequest::Restart { name } => run_op(registry, &name, Op::Restart).await,
        ControlRequest::Shutdown => {
            info!("shutdown requested by a control client");
            shutdown.cancel();
            ControlResponse::Ok {
                detail: "shutting down".into(),
            }
        }
    }
}

enum Op {
    Start,
    Stop,
    Restart,
}

async fn run_op(registry: &Arc<Registry>, name: &str, op: Op) -> ControlResponse {
    let controller = match registry.child(name) {
        Ok(controller) => controller,
        Err(e) => {
            return ControlResponse::Err {
                reason: e.to_string(),
            };
        }
    };
    let (verb, result) = match op {
        Op::Start => ("started", controller.start().await),
        Op::Stop => ("stopped", controller.stop().await),
        Op::Restart => ("restarted", controller.restart().await),
    };
    match result {
        Ok(()) => ControlResponse::Ok {
            detail: format!("{name}: {verb}"),
        },
        Err(e) => ControlResponse::Err {
            reason: format!("{e:#}"),
        },
    }
}
