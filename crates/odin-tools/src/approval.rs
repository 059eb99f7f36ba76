// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tracing::debug;

/// Asks the user to approve an action that the safeguard cannot authorize
/// on its own.  The prompting mechanism belongs to the UI; the policy check
/// stays in-core.
#[async_trait]
pub trait ApprovalGate: Send + Sync {
    /// Returns true when the user approves `action`.
    async fn request(&self, action: &str) -> bool;
}

/// Interactive gate prompting on stdout and reading one line from stdin.
/// A single internal mutex serializes prompts so concurrent tool calls can
/// never interleave their questions.
pub struct StdinApproval {
    stdin_mx: Mutex<()>,
}

impl StdinApproval {
    pub fn new() -> Self {
        Self {
            stdin_mx: Mutex::new(()),
        }
    }
}

impl Default for StdinApproval {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ApprovalGate for StdinApproval {
    async fn request(&self, action: &str) -> bool {
        let _guard = self.stdin_mx.lock().await;
        let mut stdout = tokio::io::stdout();
        let prompt = format!("odin needs approval to {action} — allow? [y/N] ");
        if stdout.write_all(prompt.as_bytes()).await.is_err() {
            return false;
        }
        let _ = stdout.flush().await;

        let mut line = String::new();
        let mut reader = BufReader::new(tokio::io::stdin());
        if reader.read_line(&mut line).await.is_err() {
            return false;
        }
        let approved = matches!(line.trim(), "y" | "Y" | "yes");
        debug!(action = %action, approved, "approval prompt answered");
        approved
    }
}

/// Gate that approves everything.  For tests and explicitly trusted runs.
pub struct AutoApprove;

#[async_trait]
impl ApprovalGate for AutoApprove {
    async fn request(&self, _action: &str) -> bool {
        true
    }
}

/// Gate that denies everything.  The headless default.
pub struct DenyAll;

#[async_trait]
impl ApprovalGate for DenyAll {
    async fn request(&self, action: &str) -> bool {
        debug!(action = %action, "approval denied (non-interactive)");
        false
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn auto_approve_always_true() {
        assert!(AutoApprove.request("anything").await);
    }

    #[tokio::test]
    async fn deny_all_always_false() {
        assert!(!DenyAll.request("anything").await);
    }
}
