// SPDX-License-Identifier: MIT
use serde::{Deserialize, Serialize};

/// Top-level configuration, loaded from `odinconfig.json`.
///
/// `allowed_commands` and `forbidden_commands` sit at the top level; a
/// command matching both is denied (deny wins).  Unknown keys in the JSON
/// document are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Shell command glob patterns that run without prompting.
    #[serde(default)]
    pub allowed_commands: Vec<String>,
    /// Shell command glob patterns that are always refused.
    #[serde(default)]
    pub forbidden_commands: Vec<String>,
    #[serde(default)]
    pub agent: AgentSettings,
    #[serde(default)]
    pub tools: ToolsSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub planner: PlannerSettings,
}

fn default_agent_mode() -> AgentMode {
    AgentMode::Ask
}
fn default_max_iterations() -> u32 {
    100
}
fn default_transport_retries() -> u32 {
    3
}
fn default_retry_base_delay_ms() -> u64 {
    250
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Mode used when an incoming message does not specify one.
    #[serde(default = "default_agent_mode")]
    pub default_mode: AgentMode,
    /// Ceiling on planner↔tool iterations per message.  Exceeding it is a
    /// fatal loop error.  0 disables the cap.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Attempts per planner call before a transport failure escalates.
    #[serde(default = "default_transport_retries")]
    pub transport_retries: u32,
    /// Base delay for exponential backoff between planner retries.
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            default_mode: AgentMode::Ask,
            max_iterations: default_max_iterations(),
            transport_retries: default_transport_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
        }
    }
}

fn default_tool_timeout_secs() -> u64 {
    30
}
fn default_max_parallel_tools() -> usize {
    4
}
fn default_fetch_max_chars() -> usize {
    50_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsSettings {
    /// Timeout for a single tool call in seconds.
    #[serde(default = "default_tool_timeout_secs")]
    pub timeout_secs: u64,
    /// Upper bound on concurrently executing tool calls within one
    /// planner iteration.
    #[serde(default = "default_max_parallel_tools")]
    pub max_parallel_tools: usize,
    /// Maximum characters returned by web_fetch before truncation.
    #[serde(default = "default_fetch_max_chars")]
    pub fetch_max_chars: usize,
}

impl Default for ToolsSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_tool_timeout_secs(),
            max_parallel_tools: default_max_parallel_tools(),
            fetch_max_chars: default_fetch_max_chars(),
        }
    }
}

fn default_max_cache_size() -> u64 {
    100 * 1024 * 1024
}
fn default_max_file_size() -> u64 {
    10 * 1024 * 1024
}
fn default_max_entries() -> usize {
    500
}
fn default_max_segments() -> usize {
    50
}
fn default_true() -> bool {
    true
}

/// Strategy used to pick an eviction victim when the cache is full.
///
/// `Hybrid` (default) restricts candidates to entries not modified in this
/// session, falling back to modified entries only when no other candidate
/// exists, then picks the least-recently accessed.  This biases eviction
/// away from in-session work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    Lru,
    Lfu,
    #[default]
    Hybrid,
}

impl std::fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvictionPolicy::Lru => write!(f, "lru"),
            EvictionPolicy::Lfu => write!(f, "lfu"),
            EvictionPolicy::Hybrid => write!(f, "hybrid"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Total content bytes the cache may hold.
    #[serde(default = "default_max_cache_size")]
    pub max_cache_size: u64,
    /// Files larger than this are read but never cached; their entry only
    /// records metadata with a truncated flag.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    /// Segments per partial entry; the oldest segment is dropped beyond this.
    #[serde(default = "default_max_segments")]
    pub max_segments: usize,
    /// Entry lifetime in seconds; 0 disables expiry.
    #[serde(default)]
    pub ttl_secs: u64,
    #[serde(default)]
    pub eviction_policy: EvictionPolicy,
    /// Re-stat files on every lookup and drop entries whose mtime drifted.
    #[serde(default = "default_true")]
    pub enable_auto_refresh: bool,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_cache_size: default_max_cache_size(),
            max_file_size: default_max_file_size(),
            max_entries: default_max_entries(),
            max_segments: default_max_segments(),
            ttl_secs: 0,
            eviction_policy: EvictionPolicy::Hybrid,
            enable_auto_refresh: true,
        }
    }
}

fn default_planner_base_url() -> String {
    "http://localhost:8731".into()
}
fn default_planner_model() -> String {
    "odin-planner".into()
}
fn default_validator_model() -> String {
    "cache-sufficiency-validator".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerSettings {
    /// Base URL of the planner service.
    #[serde(default = "default_planner_base_url")]
    pub base_url: String,
    /// Environment variable holding the API key; prefer this over embedding
    /// secrets in version-controlled config files.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_planner_model")]
    pub planner_model: String,
    /// Model used for the cheap cache-sufficiency check.
    #[serde(default = "default_validator_model")]
    pub validator_model: String,
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            base_url: default_planner_base_url(),
            api_key_env: None,
            planner_model: default_planner_model(),
            validator_model: default_validator_model(),
        }
    }
}

/// Authorization context for a single message.  The mode binds the set of
/// tools the planner may call: `ask` and `plan` are read-only investigative
/// modes; `edit` is the sole mode authorized to mutate the workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AgentMode {
    /// Answer questions about the workspace; no writes
    Ask,
    /// Produce a structured plan; no writes
    Plan,
    /// Full agent with read/write tools
    Edit,
}

impl std::fmt::Display for AgentMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentMode::Ask => write!(f, "ask"),
            AgentMode::Plan => write!(f, "plan"),
            AgentMode::Edit => write!(f, "edit"),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── Defaults ─────────────────────────────────────────────────────────────

    #[test]
    fn config_default_has_no_command_patterns() {
        let c = Config::default();
        assert!(c.allowed_commands.is_empty());
        assert!(c.forbidden_commands.is_empty());
    }

    #[test]
    fn config_default_mode_is_ask() {
        let c = Config::default();
        assert_eq!(c.agent.default_mode, AgentMode::Ask);
    }

    #[test]
    fn config_default_iteration_cap_positive() {
        let c = Config::default();
        assert!(c.agent.max_iterations > 0);
    }

    #[test]
    fn cache_defaults_match_documented_bounds() {
        let c = CacheSettings::default();
        assert_eq!(c.max_cache_size, 100 * 1024 * 1024);
        assert_eq!(c.max_file_size, 10 * 1024 * 1024);
        assert_eq!(c.max_entries, 500);
        assert_eq!(c.max_segments, 50);
        assert_eq!(c.ttl_secs, 0, "ttl disabled by default");
        assert_eq!(c.eviction_policy, EvictionPolicy::Hybrid);
        assert!(c.enable_auto_refresh);
    }

    // ── JSON round-trip ───────────────────────────────────────────────────────

    #[test]
    fn config_deserialises_minimal_document() {
        let json = r#"{"allowed_commands": ["cargo *"], "forbidden_commands": ["rm -rf /*"]}"#;
        let c: Config = serde_json::from_str(json).unwrap();
        assert_eq!(c.allowed_commands, vec!["cargo *"]);
        assert_eq!(c.forbidden_commands, vec!["rm -rf /*"]);
        // Omitted sections fall back to serde defaults.
        assert_eq!(c.agent.max_iterations, 100);
    }

    #[test]
    fn config_ignores_unknown_keys() {
        let json = r#"{"allowed_commands": [], "some_future_key": {"x": 1}}"#;
        let c: Config = serde_json::from_str(json).unwrap();
        assert!(c.allowed_commands.is_empty());
    }

    #[test]
    fn config_round_trips_through_json() {
        let mut c = Config::default();
        c.allowed_commands.push("git status".into());
        c.cache.eviction_policy = EvictionPolicy::Lfu;
        let s = serde_json::to_string(&c).unwrap();
        let back: Config = serde_json::from_str(&s).unwrap();
        assert_eq!(back.allowed_commands, vec!["git status"]);
        assert_eq!(back.cache.eviction_policy, EvictionPolicy::Lfu);
    }

    #[test]
    fn eviction_policy_serde_is_lowercase() {
        let s = serde_json::to_string(&EvictionPolicy::Hybrid).unwrap();
        assert_eq!(s, "\"hybrid\"");
    }

    // ── AgentMode ─────────────────────────────────────────────────────────────

    #[test]
    fn agent_mode_display() {
        assert_eq!(AgentMode::Ask.to_string(), "ask");
        assert_eq!(AgentMode::Plan.to_string(), "plan");
        assert_eq!(AgentMode::Edit.to_string(), "edit");
    }

    #[test]
    fn agent_mode_json_round_trip() {
        #[derive(serde::Serialize, serde::Deserialize)]
        struct Wrap {
            mode: AgentMode,
        }
        let s = serde_json::to_string(&Wrap { mode: AgentMode::Edit }).unwrap();
        assert!(s.contains("\"edit\""));
        let back: Wrap = serde_json::from_str(&s).unwrap();
        assert_eq!(back.mode, AgentMode::Edit);
    }
}
