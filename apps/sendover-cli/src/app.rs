//! Loopback transfer: two in-process peers, one file (or bundle) between them.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, bail};
use tokio::sync::watch;

use sendover_protocol::{ConnectionState, TransferStatus};
use sendover_session::{MemoryNetwork, Session, SessionHandle, SessionSnapshot};
use sendover_transfer::{Artifact, DiskFile, FileSource, SpeedCalculator, validate_file_name};

use crate::bundle::ZipBundler;
use crate::config::Config;

/// Upper bound for registration and connection setup.
const SETUP_TIMEOUT: Duration = Duration::from_secs(30);

/// Sends `files` from one local peer to another and writes the received
/// file into `out_dir`. Returns the written path.
pub async fn send(
    config: &Config,
    files: &[PathBuf],
    out_dir: &Path,
    link_delay: Duration,
) -> anyhow::Result<PathBuf> {
    if files.is_empty() {
        bail!("no files to send");
    }
    let sources = files
        .iter()
        .map(|path| {
            DiskFile::open(path)
                .map(|f| Box::new(f) as Box<dyn FileSource>)
                .with_context(|| format!("cannot open {}", path.display()))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let network = MemoryNetwork::with_delay(link_delay);
    let sender = start_peer(&network, config, true);
    let receiver = start_peer(&network, config, false);

    let result = transfer(&sender, &receiver, sources, out_dir).await;
    sender.shutdown();
    receiver.shutdown();
    result
}

fn start_peer(network: &MemoryNetwork, config: &Config, bundles: bool) -> SessionHandle {
    let (transport, events) = network.transport();
    let (session, handle) = Session::new(transport, events, config.session_config());
    if bundles {
        session.with_bundler(ZipBundler).spawn();
    } else {
        session.spawn();
    }
    handle
}

async fn transfer(
    sender: &SessionHandle,
    receiver: &SessionHandle,
    sources: Vec<Box<dyn FileSource>>,
    out_dir: &Path,
) -> anyhow::Result<PathBuf> {
    let receiver_code = setup(receiver.wait_for(|s| s.registered), "receiver registration")
        .await?
        .identity
        .map(|i| i.code)
        .context("receiver has no identity")?;
    setup(sender.wait_for(|s| s.registered), "sender registration").await?;
    tracing::info!(code = %receiver_code, "receiver ready");

    sender.connect(receiver_code).await?;
    let connected = setup(
        sender.wait_for(|s| {
            s.connection_state == ConnectionState::Connected
                || s.connection_state == ConnectionState::Error
        }),
        "connection",
    )
    .await?;
    if connected.connection_state != ConnectionState::Connected {
        bail!("connection failed: {}", last_notice(&connected));
    }
    tracing::info!(remote = ?connected.remote, "peers connected");

    sender.offer(sources).await?;
    let offered = setup(
        receiver.wait_for(|s| s.transfer.status == TransferStatus::Incoming),
        "offer",
    )
    .await?;
    tracing::info!(
        name = %offered.transfer.file_name,
        size = offered.transfer.total_size,
        "accepting offer"
    );
    receiver.accept().await?;

    let done = watch_progress(receiver.subscribe()).await?;
    if done.transfer.status != TransferStatus::Completed {
        bail!(
            "transfer failed: {}",
            done.transfer.error_message.as_deref().unwrap_or("unknown error")
        );
    }

    let artifact = receiver
        .materialize_download()
        .await?
        .context("completed transfer produced no file")?;
    let path = write_artifact(&artifact, out_dir)?;

    let sent = sender.snapshot();
    tracing::info!(
        path = %path.display(),
        bytes = artifact.len(),
        latency_ms = sent.latency.map(|d| d.as_millis() as u64),
        "file received"
    );
    Ok(path)
}

async fn setup<F>(future: F, what: &str) -> anyhow::Result<SessionSnapshot>
where
    F: Future<Output = Result<SessionSnapshot, sendover_session::SessionError>>,
{
    tokio::time::timeout(SETUP_TIMEOUT, future)
        .await
        .with_context(|| format!("timed out waiting for {what}"))?
        .map_err(Into::into)
}

/// Logs receiver progress in 10% steps until the transfer ends.
async fn watch_progress(
    mut rx: watch::Receiver<SessionSnapshot>,
) -> anyhow::Result<SessionSnapshot> {
    let mut logged = 0u32;
    let mut rate = SpeedCalculator::default();
    let mut seen = 0u64;
    loop {
        let snapshot = rx.borrow_and_update().clone();
        let transfer = &snapshot.transfer;
        if transfer.status.is_terminal() {
            return Ok(snapshot);
        }
        rate.add_sample(transfer.transferred_size.saturating_sub(seen), Instant::now());
        seen = transfer.transferred_size;

        let step = (transfer.percentage / 10.0) as u32;
        if step > logged {
            logged = step;
            let eta = rate.eta(transfer.total_size.saturating_sub(transfer.transferred_size));
            tracing::info!(
                percent = step * 10,
                speed = transfer.speed.as_deref().unwrap_or("-"),
                eta_secs = eta.map(|d| d.as_secs()),
                "receiving"
            );
        }
        rx.changed().await.context("receiver stopped")?;
    }
}

fn write_artifact(artifact: &Artifact, out_dir: &Path) -> anyhow::Result<PathBuf> {
    validate_file_name(&artifact.file_name)?;
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("cannot create {}", out_dir.display()))?;
    let path = out_dir.join(&artifact.file_name);
    std::fs::write(&path, &artifact.bytes)
        .with_context(|| format!("cannot write {}", path.display()))?;
    Ok(path)
}

fn last_notice(snapshot: &SessionSnapshot) -> &str {
    snapshot
        .notices
        .last()
        .map(|n| n.message.as_str())
        .unwrap_or("no details")
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use super::*;

    fn write(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, data).unwrap();
        path
    }

    #[tokio::test]
    async fn single_file_arrives_intact() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let data: Vec<u8> = (0..150_000u32).map(|i| (i % 251) as u8).collect();
        let file = write(src.path(), "photo.raw", &data);

        let written = send(&Config::default(), &[file], out.path(), Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(written, out.path().join("photo.raw"));
        assert_eq!(std::fs::read(&written).unwrap(), data);
    }

    #[tokio::test]
    async fn several_files_arrive_as_zip() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let a = write(src.path(), "a.txt", b"first");
        let b = write(src.path(), "b.txt", b"second");

        let written = send(&Config::default(), &[a, b], out.path(), Duration::from_millis(5))
            .await
            .unwrap();
        let name = written.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("SendOver_Bundle_"));
        assert!(name.ends_with(".zip"));

        let bytes = std::fs::read(&written).unwrap();
        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).unwrap();
        let mut text = String::new();
        archive
            .by_name("a.txt")
            .unwrap()
            .read_to_string(&mut text)
            .unwrap();
        assert_eq!(text, "first");
    }

    #[tokio::test]
    async fn missing_file_is_reported() {
        let out = tempfile::tempdir().unwrap();
        let missing = out.path().join("nope.bin");
        let err = send(&Config::default(), &[missing], out.path(), Duration::ZERO)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("cannot open"));
    }

    #[test]
    fn unsafe_names_are_not_written() {
        let out = tempfile::tempdir().unwrap();
        let artifact = Artifact {
            file_name: "../escape.txt".into(),
            mime_type: String::new(),
            bytes: Vec::new().into(),
        };
        assert!(write_artifact(&artifact, out.path()).is_err());
        assert!(!out.path().join("../escape.txt").exists());
    }
}
