use std::path::Path;

use anyhow::{Context, Result};
use common::{ControlRequest, ControlResponse};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

/// One request/response exchange. Closing our write half tells the daemon
/// the request is complete.
pub async fn request(socket: &Path, request: &ControlRequest) -> Result<ControlResponse> {
    let mut stream = UnixStream::connect(socket).await.with_context(|| {
        format!(
            "connecting to {} (is rsupd running?)",
            socket.display()
        )
    })?;
    let data = bincode::serialize(request)?;
    stream.write_all(&data).await?;
    stream.shutdown().await?;

    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await?;
    bincode::deserialize(&buf).context("malformed response from rsupd")
}
