//! Child output routing.
//!
//! Each routed stream is a pair of tasks: a reader that drains the child's
//! pipe into a bounded channel, and a writer that copies chunks into the
//! configured sink. With the default `Drop` overflow policy the reader
//! always keeps draining, so a slow sink can never stall the child.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::{OverflowPolicy, SinkSpec};

const READ_BUF: usize = 8192;
const CHANNEL_DEPTH: usize = 64;

/// One writer plus any number of attached readers (stderr merging attaches
/// a second reader to the stdout router).
pub struct StreamRouter {
    child: String,
    label: String,
    tx: mpsc::Sender<Vec<u8>>,
    overflow: OverflowPolicy,
    dropped: Arc<AtomicU64>,
    writer: JoinHandle<()>,
    readers: Vec<JoinHandle<()>>,
}

impl StreamRouter {
    pub fn new(child: &str, label: &str, sink: &SinkSpec, overflow: OverflowPolicy) -> StreamRouter {
        let (tx, rx) = mpsc::channel(CHANNEL_DEPTH);
        let writer = tokio::spawn(write_loop(
            child.to_string(),
            label.to_string(),
            sink.clone(),
            rx,
        ));
        StreamRouter {
            child: child.to_string(),
            label: label.to_string(),
            tx,
            overflow,
            dropped: Arc::new(AtomicU64::new(0)),
            writer,
            readers: Vec::new(),
        }
    }

    pub fn attach<R>(&mut self, reader: R)
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let tx = self.tx.clone();
        let overflow = self.overflow;
        let dropped = self.dropped.clone();
        self.readers.push(tokio::spawn(read_loop(
            reader, tx, overflow, dropped,
        )));
    }

    /// Wait for the attached readers to hit EOF and the writer to flush.
    /// Chunks the drop policy discarded are reported here, once per stream.
    pub async fn join(self) {
        for reader in self.readers {
            let _ = reader.await;
        }
        drop(self.tx);
        let _ = self.writer.await;
        let dropped = self.dropped.load(Ordering::Relaxed);
        if dropped > 0 {
            warn!(
                child = %self.child,
                label = %self.label,
                dropped,
                "output chunks discarded because the sink lagged"
            );
        }
    }
}

async fn read_loop<R>(
    mut reader: R,
    tx: mpsc::Sender<Vec<u8>>,
    overflow: OverflowPolicy,
    dropped: Arc<AtomicU64>,
) where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; READ_BUF];
    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(_) => break,
        };
        let chunk = buf[..n].to_vec();
        match overflow {
            OverflowPolicy::Drop => {
                if tx.try_send(chunk).is_err() {
                    dropped.fetch_add(1, Ordering::Relaxed);
                }
            }
            OverflowPolicy::Block => {
                if tx.send(chunk).await.is_err() {
                    break;
                }
            }
        }
    }
}

async fn write_loop(child: String, label: String, sink: SinkSpec, mut rx: mpsc::Receiver<Vec<u8>>) {
    let mut writer = match SinkWriter::open(&sink).await {
        Ok(w) => w,
        Err(e) => {
            warn!(child, label, error = %e, "log sink unavailable, discarding output");
            SinkWriter::Drain
        }
    };
    while let Some(chunk) = rx.recv().await {
        if let Err(e) = writer.write(&chunk).await {
            // sink errors degrade to discard, never back to the child
            warn!(child, label, error = %e, "log sink write failed, discarding output");
            writer = SinkWriter::Drain;
        }
    }
    writer.flush().await;
}

enum SinkWriter {
    Drain,
    Stdout(tokio::io::Stdout),
    File(FileSink),
}

impl SinkWriter {
    async fn open(sink: &SinkSpec) -> std::io::Result<SinkWriter> {
        match sink {
            SinkSpec::Discard => Ok(SinkWriter::Drain),
            SinkSpec::Inherit => Ok(SinkWriter::Stdout(tokio::io::stdout())),
            SinkSpec::File {
                path,
                max_bytes,
                backups,
            } => Ok(SinkWriter::File(
                FileSink::open(path.clone(), *max_bytes, *backups).await?,
            )),
        }
    }

    async fn write(&mut self, chunk: &[u8]) -> std::io::Result<()> {
        match self {
            SinkWriter::Drain => Ok(()),
            SinkWriter::Stdout(out) => {
                out.write_all(chunk).await?;
                out.flush().await
            }
            SinkWriter::File(file) => file.write(chunk).await,
        }
    }

    async fn flush(&mut self) {
        if let SinkWriter::File(file) = self {
            let _ = file.file.flush().await;
        }
    }
}

struct FileSink {
    file: File,
    path: PathBuf,
    written: u64,
    max_bytes: u64,
    backups: u32,
}

impl FileSink {
    async fn open(path: PathBuf, max_bytes: u64, backups: u32) -> std::io::Result<FileSink> {
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&path)
            .await?;
        let written = file.metadata().await.map(|m| m.len()).unwrap_or(0);
        Ok(FileSink {
            file,
            path,
            written,
            max_bytes,
            backups,
        })
    }

    async fn write(&mut self, chunk: &[u8]) -> std::io::Result<()> {
        self.file.write_all(chunk).await?;
        self.file.flush().await?;
        self.written += chunk.len() as u64;
        if self.max_bytes > 0 && self.written >= self.max_bytes {
            self.rotate().await?;
        }
        Ok(())
    }

    async fn rotate(&mut self) -> std::io::Result<()> {
        debug!(path = %self.path.display(), "rotating log file");
        if self.backups == 0 {
            // no backups kept: truncate in place
            self.file = OpenOptions::new()
                .write(true)
                .truncate(true)
                .open(&self.path)
                .await?;
        } else {
            for i in (1..self.backups).rev() {
                let _ = std::fs::rename(backup_name(&self.path, i), backup_name(&self.path, i + 1));
            }
            std::fs::rename(&self.path, backup_name(&self.path, 1))?;
            self.file = OpenOptions::new()
                .append(true)
                .create(true)
                .open(&self.path)
                .await?;
        }
        self.written = 0;
        Ok(())
    }
}

fn backup_name(path: &Path, index: u32) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(format!(".{index}"));
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn file_sink_rotates_at_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.log");
        let sink = SinkSpec::File {
            path: path.clone(),
            max_bytes: 32,
            backups: 2,
        };

        let (mut wr, rd) = tokio::io::duplex(256);
        let mut router = StreamRouter::new("t", "stdout", &sink, OverflowPolicy::Block);
        router.attach(rd);
        wr.write_all(&[b'a'; 40]).await.unwrap();
        wr.write_all(&[b'b'; 40]).await.unwrap();
        wr.shutdown().await.unwrap();
        drop(wr);
        router.join().await;

        assert!(backup_name(&path, 1).exists());
        // after two over-threshold writes the live file starts fresh
        let live = std::fs::metadata(&path).unwrap().len();
        assert_eq!(live, 0);
    }

    #[tokio::test]
    async fn drop_policy_counts_instead_of_stalling() {
        // fill a tiny channel and never drain it, so every send would block
        let (tx, _rx) = mpsc::channel(1);
        tx.send(vec![0]).await.unwrap();
        let dropped = Arc::new(AtomicU64::new(0));

        let (mut wr, rd) = tokio::io::duplex(64);
        let reader = tokio::spawn(read_loop(rd, tx, OverflowPolicy::Drop, dropped.clone()));
        wr.write_all(b"chunk one").await.unwrap();
        wr.write_all(b"chunk two").await.unwrap();
        wr.shutdown().await.unwrap();
        drop(wr);

        // the reader must reach EOF on its own despite the stuck sink
        reader.await.unwrap();
        assert!(dropped.load(Ordering::Relaxed) >= 1);
    }

    #[tokio::test]
    async fn discard_sink_consumes_everything() {
        let (mut wr, rd) = tokio::io::duplex(64);
        let mut router = StreamRouter::new("t", "stdout", &SinkSpec::Discard, OverflowPolicy::Drop);
        router.attach(rd);
        wr.write_all(b"noise").await.unwrap();
        wr.shutdown().await.unwrap();
        drop(wr);
        router.join().await;
    }
}
