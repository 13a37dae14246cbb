//! Replay recorded OneBot frames through a session backed by the local store.
//!
//! Usage: `onechat-replay <frames.jsonl> <private|group>:<id>`
//!
//! Each line of the input file is one raw frame. The conversation's cluster
//! view after replay is printed to stdout as JSON.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use onechat_client::{spawn_session, ClientConfig, LocalBackend};
use onechat_shared::protocol::PushEvent;
use onechat_shared::types::{Scope, UserId};
use onechat_store::Database;
use tokio::sync::mpsc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    onechat_client::init_tracing();

    let mut args = std::env::args().skip(1);
    let (Some(path), Some(scope)) = (args.next(), args.next()) else {
        bail!("usage: onechat-replay <frames.jsonl> <private|group>:<id>");
    };
    let path = PathBuf::from(path);
    let scope = Scope::parse(&scope).with_context(|| format!("invalid scope `{scope}`"))?;

    let input = std::fs::read_to_string(&path)
        .with_context(|| format!("reading {}", path.display()))?;
    let frames: Vec<String> = input
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect();

    let config = ClientConfig::from_env();
    let self_id = match config.self_id {
        Some(id) => id,
        None => discover_self_id(&frames)
            .context("no ONECHAT_SELF_ID set and no frame carries a self_id")?,
    };

    let db = Database::open_for_account(&config.data_dir, self_id.0)?;
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<String>(64);
    let backend = Arc::new(LocalBackend::new(db, outbound_tx));

    // Nothing is connected; log whatever the session would have sent.
    tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            warn!(frame = %frame, "Outbound frame discarded during replay");
        }
    });

    let (frames_tx, frames_rx) = mpsc::channel::<String>(256);
    let (handle, join) = spawn_session(backend, config.timeline, Some(self_id), frames_rx);

    handle.open(scope).await?;

    let count = frames.len();
    for frame in frames {
        frames_tx.send(frame).await?;
    }
    info!(count, scope = %scope, "Frames replayed");

    let clusters = handle.snapshot().await?;
    println!("{}", serde_json::to_string_pretty(&clusters)?);

    handle.shutdown().await;
    join.await?;
    Ok(())
}

fn discover_self_id(frames: &[String]) -> Option<UserId> {
    frames
        .iter()
        .filter_map(|f| PushEvent::decode(f).ok())
        .find_map(|event| event.self_id())
        .map(UserId)
}
