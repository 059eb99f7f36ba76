// SPDX-License-Identifier: MIT
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use odin_config::AgentMode;

use crate::agent::CoreDeps;
use crate::driver::PlannerDriver;
use crate::events::StateEvent;
use crate::state::{Admission, SharedState};
use crate::toolset::build_toolset;

/// Message ingress and serialization (admission control + FIFO drain).
///
/// At most one activation runs at any time.  An idle submission starts a
/// background activation chain; a busy submission joins the queue and is
/// picked up by the running chain when the current message completes.
#[derive(Clone)]
pub struct Executor {
    state: Arc<SharedState>,
    deps: CoreDeps,
    cancel: Arc<AtomicBool>,
}

impl Executor {
    pub fn new(state: Arc<SharedState>, deps: CoreDeps) -> Self {
        Self {
            state,
            deps,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Mark the running (and any future) activation for graceful exit:
    /// the loop stops after the current tool batch completes.
    pub fn kill(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    /// Admission control: start processing when idle, enqueue when busy.
    pub fn handle_incoming(&self, body: String, mode: AgentMode) -> Admission {
        match self.state.admit(body, mode) {
            Admission::Started(message) => {
                let state = Arc::clone(&self.state);
                let deps = self.deps.clone();
                let cancel = Arc::clone(&self.cancel);
                let mode = message.mode;
                let body = message.body.clone();
                tokio::spawn(async move {
                    Self::run_activation_chain(state, deps, cancel, body, mode).await;
                });
                Admission::Started(message)
            }
            queued => queued,
        }
    }

    /// Process the given message, then keep draining the queue until it is
    /// empty.  The handoff in `finish_and_pop` is atomic with admission,
    /// so exactly one chain is ever live.
    async fn run_activation_chain(
        state: Arc<SharedState>,
        deps: CoreDeps,
        cancel: Arc<AtomicBool>,
        body: String,
        mode: AgentMode,
    ) {
        let mut current = Some((body, mode));
        while let Some((body, mode)) = current {
            Self::process_message(&state, &deps, &cancel, body, mode).await;
            current = state.finish_and_pop().map(|next| (next.body, next.mode));
        }
        debug!("activation chain drained");
    }

    /// One full plan-act activation for one message.
    async fn process_message(
        state: &Arc<SharedState>,
        deps: &CoreDeps,
        cancel: &Arc<AtomicBool>,
        body: String,
        mode: AgentMode,
    ) {
        let index = state.push_message(body);
        state
            .publisher()
            .publish(StateEvent::MessageStarted { index, mode });

        let toolset = build_toolset(deps, state, true);
        let mut driver = PlannerDriver::new(
            deps.clone(),
            Arc::clone(state),
            toolset.registry,
            toolset.todos,
            toolset.tool_events,
        );

        let summary = match driver.run(index, mode, Some(Arc::clone(cancel))).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!(index, error = %e, "activation failed");
                format!("execution failed: {e}")
            }
        };
        state.complete_message(index, summary);
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use odin_config::Config;
    use odin_planner::{
        CompletingPlanner, PassthroughExtractor, PlannerInput, PlannerOutput, PlannerProvider,
        StaticValidator,
    };
    use odin_tools::DenyAll;

    use super::*;

    fn deps_with(planner: Arc<dyn PlannerProvider>, root: &std::path::Path) -> CoreDeps {
        CoreDeps {
            config: Arc::new(Config::default()),
            workspace_root: root.to_path_buf(),
            planner,
            validator: Arc::new(StaticValidator::sufficient()),
            extractor: Arc::new(PassthroughExtractor),
            gate: Arc::new(DenyAll),
        }
    }

    /// Planner that records whether two calls ever overlap in time.
    struct OverlapProbe {
        active: Arc<Mutex<u32>>,
        pub max_active: Arc<Mutex<u32>>,
    }

    impl OverlapProbe {
        fn new() -> Self {
            Self {
                active: Arc::new(Mutex::new(0)),
                max_active: Arc::new(Mutex::new(0)),
            }
        }
    }

    #[async_trait]
    impl PlannerProvider for OverlapProbe {
        fn name(&self) -> &str {
            "overlap-probe"
        }

        async fn plan(&self, input: &PlannerInput) -> anyhow::Result<PlannerOutput> {
            {
                let mut active = self.active.lock().unwrap();
                *active += 1;
                let mut max = self.max_active.lock().unwrap();
                *max = (*max).max(*active);
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            {
                *self.active.lock().unwrap() -= 1;
            }
            Ok(PlannerOutput::completed(format!(
                "answered: {}",
                input.latest_message
            )))
        }
    }

    async fn collect_answers(
        rx: &mut tokio::sync::broadcast::Receiver<StateEvent>,
        count: usize,
    ) -> Vec<String> {
        let mut answers = Vec::new();
        while answers.len() < count {
            match tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv()).await {
                Ok(Ok(StateEvent::AnswerReady { summary, .. })) => answers.push(summary),
                Ok(Ok(_)) => {}
                _ => break,
            }
        }
        answers
    }

    #[tokio::test]
    async fn single_message_processed_and_released() {
        let dir = tempfile::tempdir().unwrap();
        let deps = deps_with(Arc::new(CompletingPlanner), dir.path());
        let state = SharedState::new(Arc::clone(&deps.config), None);
        let executor = Executor::new(Arc::clone(&state), deps);
        let mut rx = state.publisher().subscribe();

        assert!(matches!(
            executor.handle_incoming("hi".into(), AgentMode::Ask),
            Admission::Started(_)
        ));
        let answers = collect_answers(&mut rx, 1).await;
        assert_eq!(answers.len(), 1);
        assert!(answers[0].contains("hi"));
        assert!(!state.is_executing());
        assert_eq!(state.queue_len(), 0);
    }

    #[tokio::test]
    async fn rapid_submissions_run_fifo_without_overlap() {
        let dir = tempfile::tempdir().unwrap();
        let probe = Arc::new(OverlapProbe::new());
        let max_active = Arc::clone(&probe.max_active);
        let deps = deps_with(probe, dir.path());
        let state = SharedState::new(Arc::clone(&deps.config), None);
        let executor = Executor::new(Arc::clone(&state), deps);
        let mut rx = state.publisher().subscribe();

        executor.handle_incoming("first".into(), AgentMode::Ask);
        executor.handle_incoming("second".into(), AgentMode::Plan);
        executor.handle_incoming("third".into(), AgentMode::Ask);

        let answers = collect_answers(&mut rx, 3).await;
        assert_eq!(answers.len(), 3);
        assert!(answers[0].contains("first"));
        assert!(answers[1].contains("second"));
        assert!(answers[2].contains("third"));

        assert_eq!(*max_active.lock().unwrap(), 1, "activations must not overlap");
        assert!(!state.is_executing());
    }

    #[tokio::test]
    async fn busy_submission_lands_in_queue_once() {
        let dir = tempfile::tempdir().unwrap();
        let probe = Arc::new(OverlapProbe::new());
        let deps = deps_with(probe, dir.path());
        let state = SharedState::new(Arc::clone(&deps.config), None);
        let executor = Executor::new(Arc::clone(&state), deps);
        let mut rx = state.publisher().subscribe();

        executor.handle_incoming("m1".into(), AgentMode::Ask);
        let second = executor.handle_incoming("m2".into(), AgentMode::Ask);
        assert!(matches!(second, Admission::Queued { position: 1 }));
        assert_eq!(state.queue_len(), 1);

        let answers = collect_answers(&mut rx, 2).await;
        assert_eq!(answers.len(), 2);
        assert_eq!(state.queue_len(), 0);
    }

    #[tokio::test]
    async fn mode_is_per_message_not_sticky() {
        let dir = tempfile::tempdir().unwrap();
        let deps = deps_with(Arc::new(CompletingPlanner), dir.path());
        let state = SharedState::new(Arc::clone(&deps.config), None);
        let executor = Executor::new(Arc::clone(&state), deps);
        let mut rx = state.publisher().subscribe();

        executor.handle_incoming("e".into(), AgentMode::Edit);
        let mut started_modes = Vec::new();
        while started_modes.len() < 1 {
            match tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv()).await {
                Ok(Ok(StateEvent::MessageStarted { mode, .. })) => started_modes.push(mode),
                Ok(Ok(_)) => {}
                _ => break,
            }
        }
        assert_eq!(started_modes, vec![AgentMode::Edit]);
    }
}
