/*!
Scripted snapshot source for tests without a fleet backend

Replays queued steps in order, one per `acquire`. Once the script runs out
the last step repeats, so a poller keeps seeing a stable answer.
*/

use async_trait::async_trait;
use parking_lot::Mutex;
use robofleet_core::{decode_snapshot, FleetError, FleetSnapshot, SnapshotSource};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// Raw body, decoded exactly like an HTTP response would be.
    Payload(Vec<u8>),
    /// Network-level failure.
    Unavailable(String),
}

#[derive(Clone)]
pub struct ScriptedSource {
    steps: Arc<Mutex<VecDeque<ScriptStep>>>,
    last: Arc<Mutex<Option<ScriptStep>>>,
    calls: Arc<AtomicUsize>,
    delay: Duration,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self {
            steps: Arc::new(Mutex::new(VecDeque::new())),
            last: Arc::new(Mutex::new(None)),
            calls: Arc::new(AtomicUsize::new(0)),
            delay: Duration::ZERO,
        }
    }

    /// Every acquisition sleeps this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn push(&self, step: ScriptStep) -> &Self {
        self.steps.lock().push_back(step);
        self
    }

    pub fn push_payload(&self, payload: impl Into<Vec<u8>>) -> &Self {
        self.push(ScriptStep::Payload(payload.into()))
    }

    pub fn push_unavailable(&self, reason: &str) -> &Self {
        self.push(ScriptStep::Unavailable(reason.to_string()))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn pending(&self) -> usize {
        self.steps.lock().len()
    }

    fn next_step(&self) -> Option<ScriptStep> {
        let next = self.steps.lock().pop_front();
        let mut last = self.last.lock();
        if let Some(step) = next {
            *last = Some(step);
        }
        last.clone()
    }
}

impl Default for ScriptedSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SnapshotSource for ScriptedSource {
    async fn acquire(&self) -> Result<FleetSnapshot, FleetError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self.next_step();
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        log::debug!("[scripted] acquire #{} -> {:?}", self.calls(), step.as_ref().map(step_kind));

        match step {
            Some(ScriptStep::Payload(body)) => decode_snapshot(&body),
            Some(ScriptStep::Unavailable(reason)) => Err(FleetError::unavailable(reason)),
            None => Err(FleetError::unavailable("script is empty")),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

fn step_kind(step: &ScriptStep) -> &'static str {
    match step {
        ScriptStep::Payload(_) => "payload",
        ScriptStep::Unavailable(_) => "unavailable",
    }
}
