//! Agent finite-state machine.
//!
//! Every agent carries a base state driven by its task, plus a stack of
//! temporary ceremony overrides (kickoff, review) that win while active.
//! The effective state shown to clients is the top override's state, or
//! the base state when the stack is empty.
//!
//! Illegal base transitions never leave an agent in an undefined state:
//! the violation is counted and the agent is parked in
//! [`AgentState::BlockedWaiting`], which every state may reach.

use serde::Serialize;

use officeclaw_types::{AgentId, AgentState, OverrideKind};

/// Whether `from -> to` is a legal base-state transition.
///
/// Self transitions are always legal. An idle agent must walk to a POI
/// before it can work.
pub const fn can_transition(from: AgentState, to: AgentState) -> bool {
    !matches!(
        (from, to),
        (AgentState::IdleAtHome, AgentState::WorkingAtPoi)
    )
}

/// A temporary state override pushed by a ceremony.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentOverride {
    /// Ceremony that pushed the override.
    pub kind: OverrideKind,
    /// State shown while the override is active.
    pub state: AgentState,
    /// Ticks left before the override expires.
    pub remaining_ticks: u32,
}

/// FSM bookkeeping kept beside each agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentRuntime {
    base_state: AgentState,
    override_stack: Vec<AgentOverride>,
    transition_count: u64,
    invariant_violations: u64,
    last_transition: String,
}

impl AgentRuntime {
    /// Runtime for an agent loaded from the seed world.
    pub fn seeded(state: AgentState) -> Self {
        Self::with_reason(state, "seed")
    }

    /// Runtime for an agent created on demand.
    pub fn spawned() -> Self {
        Self::with_reason(AgentState::IdleAtHome, "spawn")
    }

    fn with_reason(state: AgentState, reason: &str) -> Self {
        Self {
            base_state: state,
            override_stack: Vec::new(),
            transition_count: 0,
            invariant_violations: 0,
            last_transition: reason.to_owned(),
        }
    }

    /// The task-driven base state.
    pub const fn base_state(&self) -> AgentState {
        self.base_state
    }

    /// Top override state, else the base state.
    pub fn effective_state(&self) -> AgentState {
        self.override_stack
            .last()
            .map_or(self.base_state, |entry| entry.state)
    }

    /// Active overrides, oldest first.
    pub fn overrides(&self) -> &[AgentOverride] {
        &self.override_stack
    }

    /// Number of base-state changes.
    pub const fn transition_count(&self) -> u64 {
        self.transition_count
    }

    /// Number of rejected transitions.
    pub const fn invariant_violations(&self) -> u64 {
        self.invariant_violations
    }

    /// Reason recorded by the last transition or override.
    pub fn last_transition(&self) -> &str {
        &self.last_transition
    }

    /// Move the base state to `next`.
    ///
    /// Returns `false` when the transition is illegal; the agent is then
    /// coerced into [`AgentState::BlockedWaiting`] and the violation is
    /// counted.
    pub fn transition(&mut self, next: AgentState, reason: &str) -> bool {
        if !can_transition(self.base_state, next) {
            self.invariant_violations = self.invariant_violations.saturating_add(1);
            self.last_transition = format!(
                "invalid:{}->{}",
                self.base_state.as_str(),
                next.as_str()
            );
            if self.base_state != AgentState::BlockedWaiting {
                self.transition_count = self.transition_count.saturating_add(1);
            }
            self.base_state = AgentState::BlockedWaiting;
            return false;
        }
        if self.base_state != next {
            self.transition_count = self.transition_count.saturating_add(1);
        }
        self.base_state = next;
        reason.clone_into(&mut self.last_transition);
        true
    }

    /// Push an override, replacing any existing one of the same kind.
    pub fn push_override(&mut self, kind: OverrideKind, state: AgentState, ticks: u32, reason: &str) {
        self.override_stack.retain(|entry| entry.kind != kind);
        self.override_stack.push(AgentOverride {
            kind,
            state,
            remaining_ticks: ticks.max(1),
        });
        self.last_transition = format!("override:{}:{reason}", kind.as_str());
    }

    /// Count every override down by one tick and drop the expired ones.
    pub fn decay_overrides(&mut self) {
        for entry in &mut self.override_stack {
            entry.remaining_ticks = entry.remaining_ticks.saturating_sub(1);
        }
        self.override_stack.retain(|entry| entry.remaining_ticks > 0);
    }

    /// Client-facing view of this runtime.
    pub fn view(&self, agent_id: &AgentId) -> AgentFsmView {
        AgentFsmView {
            agent_id: agent_id.clone(),
            base_state: self.base_state,
            effective_state: self.effective_state(),
            override_stack: self.override_stack.clone(),
            transition_count: self.transition_count,
            invariant_violations: self.invariant_violations,
            last_transition: self.last_transition.clone(),
        }
    }
}

/// Serialized FSM state of one agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentFsmView {
    /// The agent.
    pub agent_id: AgentId,
    /// Task-driven base state.
    pub base_state: AgentState,
    /// State shown to clients.
    pub effective_state: AgentState,
    /// Active overrides, oldest first.
    pub override_stack: Vec<AgentOverride>,
    /// Number of base-state changes.
    pub transition_count: u64,
    /// Number of rejected transitions.
    pub invariant_violations: u64,
    /// Last recorded reason.
    pub last_transition: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_agents_cannot_start_working_directly() {
        assert!(!can_transition(
            AgentState::IdleAtHome,
            AgentState::WorkingAtPoi
        ));
        assert!(can_transition(
            AgentState::IdleAtHome,
            AgentState::WalkingToPoi
        ));
        assert!(can_transition(
            AgentState::WorkingAtPoi,
            AgentState::WorkingAtPoi
        ));
        assert!(can_transition(
            AgentState::SeekingUserDecision,
            AgentState::WorkingAtPoi
        ));
    }

    #[test]
    fn illegal_transition_parks_agent_in_blocked() {
        let mut runtime = AgentRuntime::spawned();
        assert!(!runtime.transition(AgentState::WorkingAtPoi, "tick_progress"));
        assert_eq!(runtime.base_state(), AgentState::BlockedWaiting);
        assert_eq!(runtime.invariant_violations(), 1);
        assert_eq!(runtime.transition_count(), 1);
        assert_eq!(
            runtime.last_transition(),
            "invalid:IdleAtHome->WorkingAtPOI"
        );
    }

    #[test]
    fn self_transition_does_not_count() {
        let mut runtime = AgentRuntime::seeded(AgentState::WorkingAtPoi);
        assert!(runtime.transition(AgentState::WorkingAtPoi, "tick_progress"));
        assert_eq!(runtime.transition_count(), 0);
        assert_eq!(runtime.last_transition(), "tick_progress");
    }

    #[test]
    fn overrides_dedupe_by_kind_and_decay() {
        let mut runtime = AgentRuntime::seeded(AgentState::WorkingAtPoi);
        runtime.push_override(OverrideKind::Kickoff, AgentState::InMeeting, 2, "proj_abc");
        runtime.push_override(OverrideKind::Kickoff, AgentState::InMeeting, 2, "proj_abc");
        assert_eq!(runtime.overrides().len(), 1);
        assert_eq!(runtime.effective_state(), AgentState::InMeeting);
        assert_eq!(runtime.last_transition(), "override:kickoff:proj_abc");

        runtime.decay_overrides();
        assert_eq!(runtime.effective_state(), AgentState::InMeeting);
        runtime.decay_overrides();
        assert!(runtime.overrides().is_empty());
        assert_eq!(runtime.effective_state(), AgentState::WorkingAtPoi);
    }

    #[test]
    fn zero_tick_override_lasts_one_tick() {
        let mut runtime = AgentRuntime::spawned();
        runtime.push_override(OverrideKind::Review, AgentState::InMeeting, 0, "p");
        assert_eq!(runtime.overrides().first().map(|o| o.remaining_ticks), Some(1));
    }
}
