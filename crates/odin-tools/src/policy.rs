// SPDX-License-Identifier: MIT
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use regex::Regex;

use odin_config::Config;

use crate::approval::ApprovalGate;
use crate::tool::ToolError;

/// Decision for a shell command matched against the configured patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandDecision {
    /// Matches an allowed pattern; runs without asking
    Allow,
    /// No pattern matched; requires user approval
    Ask,
    /// Matches a forbidden pattern; never runs
    Deny,
}

/// Policy engine mapping a command string to a decision.  Forbidden wins
/// over allowed on overlap.
#[derive(Debug)]
pub struct CommandPolicy {
    allowed: Vec<Regex>,
    forbidden: Vec<Regex>,
}

impl CommandPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.allowed_commands, &config.forbidden_commands)
    }

    pub fn new(allowed: &[String], forbidden: &[String]) -> Self {
        let compile = |patterns: &[String]| -> Vec<Regex> {
            patterns.iter().filter_map(|p| glob_to_regex(p)).collect()
        };
        Self {
            allowed: compile(allowed),
            forbidden: compile(forbidden),
        }
    }

    pub fn decide(&self, command: &str) -> CommandDecision {
        for re in &self.forbidden {
            if re.is_match(command) {
                return CommandDecision::Deny;
            }
        }
        for re in &self.allowed {
            if re.is_match(command) {
                return CommandDecision::Allow;
            }
        }
        CommandDecision::Ask
    }
}

/// Convert a simple shell glob pattern to a [`Regex`].
/// Only `*` (match anything) and `?` (match one char) are supported.
pub(crate) fn glob_to_regex(pattern: &str) -> Option<Regex> {
    let mut re = String::from("^");
    for ch in pattern.chars() {
        match ch {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            c => {
                for esc in regex::escape(&c.to_string()).chars() {
                    re.push(esc);
                }
            }
        }
    }
    re.push('$');
    Regex::new(&re).ok()
}

/// Resolve `path` against `root` and normalize `.`/`..` components without
/// touching the filesystem, so not-yet-existing files still resolve.
pub fn resolve_workspace_path(root: &Path, path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    };
    let mut out = PathBuf::new();
    for comp in joined.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// The safeguard mediating all filesystem and command mutations (C7).
/// Paths inside the workspace root pass; anything outside goes through the
/// approval gate.  Commands are matched against the allow/deny patterns.
pub struct Safeguard {
    root: PathBuf,
    policy: CommandPolicy,
    gate: Arc<dyn ApprovalGate>,
}

impl Safeguard {
    pub fn new(root: PathBuf, policy: CommandPolicy, gate: Arc<dyn ApprovalGate>) -> Self {
        Self { root, policy, gate }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_within_root(&self, path: &Path) -> bool {
        resolve_workspace_path(&self.root, path).starts_with(&self.root)
    }

    /// Authorize a filesystem target.  Returns the resolved absolute path.
    pub async fn authorize_path(&self, path: &Path) -> Result<PathBuf, ToolError> {
        let resolved = resolve_workspace_path(&self.root, path);
        if resolved.starts_with(&self.root) {
            return Ok(resolved);
        }
        let approved = self
            .gate
            .request(&format!(
                "access path outside workspace root: {}",
                resolved.display()
            ))
            .await;
        if approved {
            Ok(resolved)
        } else {
            Err(ToolError::PermissionDenied(format!(
                "{} is outside the workspace root and was not approved",
                resolved.display()
            )))
        }
    }

    /// Authorize a shell command for the given working directory.
    pub async fn authorize_command(
        &self,
        command: &str,
        workdir: &Path,
    ) -> Result<(), ToolError> {
        match self.policy.decide(command) {
            CommandDecision::Deny => {
                return Err(ToolError::PermissionDenied(format!(
                    "command matches a forbidden pattern: {command}"
                )))
            }
            CommandDecision::Allow if self.is_within_root(workdir) => return Ok(()),
            CommandDecision::Allow | CommandDecision::Ask => {}
        }
        let approved = self
            .gate
            .request(&format!(
                "run command `{command}` in {}",
                workdir.display()
            ))
            .await;
        if approved {
            Ok(())
        } else {
            Err(ToolError::PermissionDenied(format!(
                "command was not approved: {command}"
            )))
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
