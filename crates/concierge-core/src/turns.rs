//! Completed turns handed off the response path
//!
//! The assistant offers each answered turn to a [`TurnSink`] without
//! waiting. A background consumer such as [`spawn_turn_journal`] picks them
//! up; if it falls behind or goes away, turns are dropped.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// One answered query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedTurn {
    pub query: String,
    pub answer: String,
    /// Routed specialist, absent when routing failed
    pub specialist: Option<String>,
    pub at: DateTime<Local>,
}

impl CompletedTurn {
    pub fn new(query: impl Into<String>, answer: impl Into<String>, specialist: Option<String>) -> Self {
        Self {
            query: query.into(),
            answer: answer.into(),
            specialist,
            at: Local::now(),
        }
    }
}

/// Non-blocking producer side of the turn queue
#[derive(Debug, Clone)]
pub struct TurnSink {
    tx: mpsc::Sender<CompletedTurn>,
}

impl TurnSink {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<CompletedTurn>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Queue `turn` if there is room. Returns whether it was accepted.
    pub fn offer(&self, turn: CompletedTurn) -> bool {
        match self.tx.try_send(turn) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!("Turn queue full, dropping turn");
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Turn queue closed, dropping turn");
                false
            }
        }
    }
}

/// Append every received turn to `path` as one JSON line.
///
/// Stops when `cancel` fires or every sender is gone. Write failures are
/// logged and the turn is skipped.
pub fn spawn_turn_journal(
    path: PathBuf,
    mut rx: mpsc::Receiver<CompletedTurn>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Turn journal writing to {}", path.display());
        let mut written = 0usize;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Turn journal cancelled");
                    break;
                }
                turn = rx.recv() => {
                    let Some(turn) = turn else { break };
                    match append_line(&path, &turn).await {
                        Ok(()) => written += 1,
                        Err(e) => warn!("Failed to journal turn: {:#}", e),
                    }
                }
            }
        }
        info!("Turn journal stopped after {} turn(s)", written);
    })
}

async fn append_line(path: &Path, turn: &CompletedTurn) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut line = serde_json::to_string(turn)?;
    line.push('\n');

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .with_context(|| format!("Failed to open {}", path.display()))?;
    file.write_all(line.as_bytes()).await?;
    file.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_offer_never_blocks() {
        let (sink, mut rx) = TurnSink::channel(1);
        assert!(sink.offer(CompletedTurn::new("a", "b", None)));
        assert!(!sink.offer(CompletedTurn::new("c", "d", None)));

        assert_eq!(rx.try_recv().unwrap().query, "a");
        drop(rx);
        assert!(!sink.offer(CompletedTurn::new("e", "f", None)));
    }

    #[tokio::test]
    async fn test_journal_appends_json_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("journal/turns.jsonl");
        let (sink, rx) = TurnSink::channel(8);
        let handle = spawn_turn_journal(path.clone(), rx, CancellationToken::new());

        sink.offer(CompletedTurn::new("q1", "a1", Some("Search Agent".to_string())));
        sink.offer(CompletedTurn::new("q2", "a2", None));
        drop(sink);
        handle.await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let turns: Vec<CompletedTurn> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].specialist.as_deref(), Some("Search Agent"));
        assert_eq!(turns[1].answer, "a2");
    }

    #[tokio::test]
    async fn test_journal_stops_on_cancel() {
        let dir = TempDir::new().unwrap();
        let (_sink, rx) = TurnSink::channel(8);
        let cancel = CancellationToken::new();
        let handle = spawn_turn_journal(dir.path().join("t.jsonl"), rx, cancel.clone());

        cancel.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
