// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{debug, warn};

use odin_config::{AgentMode, ToolsSettings};
use odin_planner::ToolDescriptor;

use crate::tool::{Tool, ToolCall, ToolError, ToolOutput};

/// Result of dispatching one batch of tool calls.
#[derive(Debug)]
pub struct BatchOutcome {
    /// Outputs in the order the calls were issued.
    pub outputs: Vec<ToolOutput>,
    /// Call indices in the order they finished.  May differ from issue
    /// order; tool history is appended in this order.
    pub completion_order: Vec<usize>,
}

/// Central registry holding all available tools, responsible for running
/// the pre-hook/execute/post-hook triple and for concurrent batch dispatch.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    timeout_secs: u64,
    max_parallel: usize,
}

impl ToolRegistry {
    pub fn new(settings: &ToolsSettings) -> Self {
        Self {
            tools: HashMap::new(),
            timeout_secs: settings.timeout_secs,
            max_parallel: settings.max_parallel_tools.max(1),
        }
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Produce descriptors only for tools available in the given mode.
    pub fn schemas_for_mode(&self, mode: AgentMode) -> Vec<ToolDescriptor> {
        let mut schemas: Vec<ToolDescriptor> = self
            .tools
            .values()
            .filter(|t| t.modes().contains(&mode))
            .map(|t| ToolDescriptor {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.parameters_schema(),
            })
            .collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    pub fn names_for_mode(&self, mode: AgentMode) -> Vec<String> {
        let mut names: Vec<String> = self
            .tools
            .values()
            .filter(|t| t.modes().contains(&mode))
            .map(|t| t.name().to_string())
            .collect();
        names.sort();
        names
    }

    /// Run one call through its triple, bounded by the per-tool timeout.
    /// Failures from any stage abort the later stages and surface as a
    /// structured error output.
    pub async fn execute(&self, mode: AgentMode, call: &ToolCall) -> ToolOutput {
        let tool = match self.tools.get(&call.name) {
            Some(t) => Arc::clone(t),
            None => {
                return ToolOutput::err(
                    &call.id,
                    &call.name,
                    &ToolError::Validation(format!("unknown tool: {}", call.name)),
                )
            }
        };
        if !tool.modes().contains(&mode) {
            return ToolOutput::err(
                &call.id,
                &call.name,
                &ToolError::PermissionDenied(format!(
                    "tool '{}' is not available in {mode} mode",
                    call.name
                )),
            );
        }

        debug!(tool = %call.name, call_id = %call.id, "dispatching tool");
        let triple = async {
            let prepared = tool.pre_hook(call).await?;
            let raw = tool.execute(call, prepared).await?;
            tool.post_hook(call, raw).await
        };
        match tokio::time::timeout(Duration::from_secs(self.timeout_secs), triple).await {
            Ok(Ok(response)) => ToolOutput::ok(&call.id, &call.name, response),
            Ok(Err(e)) => {
                warn!(tool = %call.name, error = %e, "tool failed");
                ToolOutput::err(&call.id, &call.name, &e)
            }
            Err(_) => ToolOutput::err(
                &call.id,
                &call.name,
                &ToolError::Timeout {
                    secs: self.timeout_secs,
                },
            ),
        }
    }

    /// Execute a batch of calls concurrently, bounded by the worker pool.
    ///
    /// Calls are grouped into lanes by target-path connectivity: a lane
    /// containing a mutating call runs its members sequentially in issue
    /// order; everything else runs in parallel.  Outputs come back in issue
    /// order alongside the observed completion order.
    pub async fn execute_batch(
        self: Arc<Self>,
        mode: AgentMode,
        calls: Vec<ToolCall>,
    ) -> BatchOutcome {
        let total = calls.len();
        let lanes = self.build_lanes(&calls);
        let semaphore = Arc::new(Semaphore::new(self.max_parallel));
        let completion: Arc<Mutex<Vec<usize>>> = Arc::new(Mutex::new(Vec::with_capacity(total)));
        let calls = Arc::new(calls);

        let mut tasks = Vec::with_capacity(lanes.len());
        for lane in lanes {
            let registry = Arc::clone(&self);
            let calls = Arc::clone(&calls);
            let semaphore = Arc::clone(&semaphore);
            let completion = Arc::clone(&completion);
            tasks.push(tokio::spawn(async move {
                let mut results = Vec::with_capacity(lane.len());
                for idx in lane {
                    let permit = semaphore.acquire().await.expect("semaphore closed");
                    let output = registry.execute(mode, &calls[idx]).await;
                    drop(permit);
                    completion.lock().expect("completion lock poisoned").push(idx);
                    results.push((idx, output));
                }
                results
            }));
        }

        let mut slots: Vec<Option<ToolOutput>> = (0..total).map(|_| None).collect();
        for task in tasks {
            match task.await {
                Ok(results) => {
                    for (idx, output) in results {
                        slots[idx] = Some(output);
                    }
                }
                Err(e) => warn!(error = %e, "tool lane panicked"),
            }
        }

        let outputs = slots
            .into_iter()
            .enumerate()
            .map(|(idx, slot)| {
                slot.unwrap_or_else(|| {
                    ToolOutput::err(
                        &calls[idx].id,
                        &calls[idx].name,
                        &ToolError::Invariant("tool task panicked".into()),
                    )
                })
            })
            .collect();

        let completion_order = completion.lock().expect("completion lock poisoned").clone();
        BatchOutcome {
            outputs,
            completion_order,
        }
    }

    /// Group call indices into execution lanes.  Calls sharing a target
    /// path land in the same lane when any of them mutates; lanes preserve
    /// issue order.  Pathless and collision-free calls get their own lane.
    fn build_lanes(&self, calls: &[ToolCall]) -> Vec<Vec<usize>> {
        struct Group {
            paths: Vec<PathBuf>,
            indices: Vec<usize>,
            mutating: bool,
        }

        let mut groups: Vec<Group> = Vec::new();
        let mut singles: Vec<Vec<usize>> = Vec::new();

        for (i, call) in calls.iter().enumerate() {
            let (paths, mutating) = match self.tools.get(&call.name) {
                Some(tool) => (tool.target_paths(&call.args), tool.is_mutating(&call.args)),
                None => (Vec::new(), false),
            };
            if paths.is_empty() {
                singles.push(vec![i]);
                continue;
            }

            let hits: Vec<usize> = groups
                .iter()
                .enumerate()
                .filter(|(_, g)| g.paths.iter().any(|p| paths.contains(p)))
                .map(|(gi, _)| gi)
                .collect();

            match hits.split_first() {
                None => groups.push(Group {
                    paths,
                    indices: vec![i],
                    mutating,
                }),
                Some((&first, rest)) => {
                    // Merge every intersecting group into the first so the
                    // combined lane keeps issue order.
                    for &gi in rest.iter().rev() {
                        let g = groups.remove(gi);
                        groups[first].paths.extend(g.paths);
                        groups[first].indices.extend(g.indices);
                        groups[first].mutating |= g.mutating;
                    }
                    groups[first].paths.extend(paths);
                    groups[first].indices.push(i);
                    groups[first].mutating |= mutating;
                    groups[first].indices.sort_unstable();
                }
            }
        }

        let mut lanes = Vec::new();
        for g in groups {
            if g.mutating {
                // Serialize the whole collision group in issue order.
                lanes.push(g.indices);
            } else {
                // Reads on the same path may still run in parallel.
                for idx in g.indices {
                    lanes.push(vec![idx]);
                }
            }
        }
        lanes.extend(singles);
        lanes
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
