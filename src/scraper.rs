//! Scraper subprocess invocation.
//!
//! A scraper is an opaque child process: it receives the previous snapshot
//! (or `null`) as JSON on stdin and emits the new tree as JSON on stdout,
//! exiting 0 on success. Everything else — non-zero exit, timeout, bad
//! UTF-8, bad JSON, a leaked delete sentinel — is a [`ScrapeError`] and
//! leaves the previous snapshot in place.

use std::process::Stdio;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::diff::{self, Tree};

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("scraper command is empty")]
    EmptyCommand,
    #[error("unexpected error while running scraper: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("failed to talk to scraper: {0}")]
    Io(#[from] std::io::Error),
    #[error("scraper failed ({0})")]
    Failed(std::process::ExitStatus),
    #[error("scraper timed out after {0} seconds")]
    TimedOut(u64),
    #[error("scraper emitted malformed output: {0}")]
    MalformedOutput(#[from] std::string::FromUtf8Error),
    #[error("scraper did not return valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("scraper output contains \"$delete\"")]
    SentinelLeak,
}

/// Run one scrape to completion. Cancelling the returned future (or hitting
/// the timeout) kills the child process.
pub async fn run_scraper(
    command: &[String],
    previous: Option<&Tree>,
    timeout: Duration,
) -> Result<Tree, ScrapeError> {
    let (program, args) = command.split_first().ok_or(ScrapeError::EmptyCommand)?;
    debug!(%program, "running scraper");

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(ScrapeError::Spawn)?;

    let input = match previous {
        Some(tree) => serde_json::to_vec(tree)?,
        None => b"null".to_vec(),
    };

    let output = tokio::time::timeout(timeout, async move {
        let mut stdin = child.stdin.take().expect("scraper stdin is piped");
        if let Err(err) = stdin.write_all(&input).await {
            // A scraper that ignores its stdin closes the pipe early.
            if err.kind() != std::io::ErrorKind::BrokenPipe {
                return Err(err);
            }
        }
        // EOF so the scraper can start emitting.
        drop(stdin);
        child.wait_with_output().await
    })
    .await
    .map_err(|_| ScrapeError::TimedOut(timeout.as_secs()))??;

    if !output.status.success() {
        return Err(ScrapeError::Failed(output.status));
    }
    let stdout = String::from_utf8(output.stdout)?;
    let value: Value = serde_json::from_str(&stdout)?;
    if diff::contains_sentinel(&value) {
        return Err(ScrapeError::SentinelLeak);
    }
    Ok(Tree::from_value(value))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_owned(), "-c".to_owned(), script.to_owned()]
    }

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn collects_scraper_output() {
        let tree = run_scraper(&sh(r#"cat > /dev/null; echo '{"A": 1}'"#), None, TIMEOUT)
            .await
            .unwrap();
        assert_eq!(tree.to_value(), json!({"A": 1}));
    }

    #[tokio::test]
    async fn passes_previous_snapshot_on_stdin() {
        let previous = Tree::from_value(json!({"A": 1, "B": {"C": 2}}));
        // `cat` echoes the previous snapshot back unchanged.
        let tree = run_scraper(&sh("cat"), Some(&previous), TIMEOUT)
            .await
            .unwrap();
        assert_eq!(tree, previous);
    }

    #[tokio::test]
    async fn passes_null_on_first_run() {
        let tree = run_scraper(
            &sh(r#"input=$(cat); test "$input" = null && echo '{}' || echo '"wrong"'"#),
            None,
            TIMEOUT,
        )
        .await
        .unwrap();
        assert_eq!(tree.to_value(), json!({}));
    }

    #[tokio::test]
    async fn reports_nonzero_exit() {
        let err = run_scraper(&sh("cat > /dev/null; exit 3"), None, TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, ScrapeError::Failed(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn reports_invalid_json() {
        let err = run_scraper(&sh("cat > /dev/null; echo not-json"), None, TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, ScrapeError::InvalidJson(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn reports_sentinel_leak() {
        let err = run_scraper(
            &sh(r#"cat > /dev/null; echo '{"A": "$delete"}'"#),
            None,
            TIMEOUT,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ScrapeError::SentinelLeak), "got {err:?}");
    }

    #[tokio::test]
    async fn reports_spawn_failure() {
        let command = vec!["/nonexistent/scraper".to_owned()];
        let err = run_scraper(&command, None, TIMEOUT).await.unwrap_err();
        assert!(matches!(err, ScrapeError::Spawn(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn kills_scraper_on_timeout() {
        let start = std::time::Instant::now();
        let err = run_scraper(&sh("sleep 5"), None, Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, ScrapeError::TimedOut(_)), "got {err:?}");
        assert!(
            start.elapsed() < Duration::from_secs(2),
            "timeout must not wait for the child"
        );
    }
}
