//! Test fixtures for end-to-end protocol flows.
//!
//! [`SimBackend`] is a scripted stand-in for a quantum backend: it keeps a
//! per-application qubit table, hands out sequential ids the way a real
//! backend does, pops measurement outcomes from a script, and logs every
//! call so tests can assert exactly which operations ran.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dispatch::{
    DispatchError, DispatchResult, QubitBackend, RemoteEndpoint, RotationAxis, SingleQubitGate,
    TwoQubitGate,
};

#[derive(Default)]
struct State {
    /// Next fresh qubit id per application; ids start at 1.
    next_id: HashMap<u16, u16>,
    /// Liveness per (app, qubit).
    active: HashMap<(u16, u16), bool>,
    /// Scripted measurement outcomes, oldest first; defaults to 0.
    outcomes: VecDeque<u8>,
    log: Vec<String>,
}

impl State {
    fn fresh_qubit(&mut self, app_id: u16) -> u16 {
        let next = self.next_id.entry(app_id).or_insert(1);
        let id = *next;
        *next += 1;
        self.active.insert((app_id, id), true);
        id
    }

    fn require_active(&self, app_id: u16, qubit_id: u16) -> DispatchResult<()> {
        match self.active.get(&(app_id, qubit_id)) {
            Some(true) => Ok(()),
            _ => Err(DispatchError::UnknownQubit { qubit_id }),
        }
    }
}

/// Scripted qubit backend shared between a dispatcher and the test body.
#[derive(Clone, Default)]
pub struct SimBackend {
    state: Arc<Mutex<State>>,
}

impl SimBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue measurement outcomes, consumed oldest first.
    pub fn script_outcomes(&self, outcomes: &[u8]) {
        self.state.lock().unwrap().outcomes.extend(outcomes);
    }

    pub fn log(&self) -> Vec<String> {
        self.state.lock().unwrap().log.clone()
    }

    fn record(&self, entry: String) {
        self.state.lock().unwrap().log.push(entry);
    }
}

#[async_trait]
impl QubitBackend for SimBackend {
    async fn identity(&self, app_id: u16, qubit_id: u16) -> DispatchResult<()> {
        self.state.lock().unwrap().require_active(app_id, qubit_id)?;
        self.record(format!("I({})", qubit_id));
        Ok(())
    }

    async fn apply_gate(
        &self,
        app_id: u16,
        qubit_id: u16,
        gate: SingleQubitGate,
    ) -> DispatchResult<()> {
        self.state.lock().unwrap().require_active(app_id, qubit_id)?;
        self.record(format!("{:?}({})", gate, qubit_id));
        Ok(())
    }

    async fn apply_rotation(
        &self,
        app_id: u16,
        qubit_id: u16,
        axis: RotationAxis,
        step: u8,
    ) -> DispatchResult<()> {
        self.state.lock().unwrap().require_active(app_id, qubit_id)?;
        self.record(format!("Rot{:?}({}, {})", axis, qubit_id, step));
        Ok(())
    }

    async fn apply_two_qubit(
        &self,
        app_id: u16,
        gate: TwoQubitGate,
        control: u16,
        target: u16,
    ) -> DispatchResult<()> {
        let state = self.state.lock().unwrap();
        state.require_active(app_id, control)?;
        state.require_active(app_id, target)?;
        drop(state);
        self.record(format!("{:?}({}, {})", gate, control, target));
        Ok(())
    }

    async fn measure(&self, app_id: u16, qubit_id: u16, inplace: bool) -> DispatchResult<u8> {
        let mut state = self.state.lock().unwrap();
        state.require_active(app_id, qubit_id)?;
        if !inplace {
            state.active.insert((app_id, qubit_id), false);
        }
        let outcome = state.outcomes.pop_front().unwrap_or(0);
        state.log.push(format!("measure({}) -> {}", qubit_id, outcome));
        Ok(outcome)
    }

    async fn reset(&self, app_id: u16, qubit_id: u16) -> DispatchResult<()> {
        self.state.lock().unwrap().require_active(app_id, qubit_id)?;
        self.record(format!("reset({})", qubit_id));
        Ok(())
    }

    async fn new_qubit(&self, app_id: u16) -> DispatchResult<u16> {
        let id = self.state.lock().unwrap().fresh_qubit(app_id);
        self.record(format!("new -> {}", id));
        Ok(id)
    }

    async fn allocate(&self, app_id: u16, count: u16) -> DispatchResult<Vec<u16>> {
        let mut state = self.state.lock().unwrap();
        let ids: Vec<u16> = (0..count).map(|_| state.fresh_qubit(app_id)).collect();
        state.log.push(format!("allocate({})", count));
        Ok(ids)
    }

    async fn release(&self, app_id: u16, qubit_id: u16) -> DispatchResult<()> {
        let mut state = self.state.lock().unwrap();
        state.require_active(app_id, qubit_id)?;
        state.active.insert((app_id, qubit_id), false);
        state.log.push(format!("release({})", qubit_id));
        Ok(())
    }

    async fn send_qubit(
        &self,
        app_id: u16,
        qubit_id: u16,
        remote: RemoteEndpoint,
    ) -> DispatchResult<()> {
        let mut state = self.state.lock().unwrap();
        state.require_active(app_id, qubit_id)?;
        state.active.insert((app_id, qubit_id), false);
        state
            .log
            .push(format!("send({}) -> node {}", qubit_id, remote.node));
        Ok(())
    }

    async fn recv_qubit(&self, app_id: u16) -> DispatchResult<u16> {
        let id = self.state.lock().unwrap().fresh_qubit(app_id);
        self.record(format!("recv -> {}", id));
        Ok(id)
    }

    async fn create_epr(&self, app_id: u16, remote: RemoteEndpoint) -> DispatchResult<u16> {
        let id = self.state.lock().unwrap().fresh_qubit(app_id);
        self.record(format!("epr(node {}) -> {}", remote.node, id));
        Ok(id)
    }

    async fn recv_epr(&self, app_id: u16) -> DispatchResult<u16> {
        let id = self.state.lock().unwrap().fresh_qubit(app_id);
        self.record(format!("epr_recv -> {}", id));
        Ok(id)
    }

    async fn qubit_time(&self, app_id: u16, qubit_id: u16) -> DispatchResult<u64> {
        self.state.lock().unwrap().require_active(app_id, qubit_id)?;
        Ok(1_700_000_000)
    }
}

/// Install a subscriber for test diagnostics; repeated calls are fine.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
