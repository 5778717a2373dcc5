use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use shared::{
    domain::{Identity, Mode, ModeVote},
    protocol::EngineEvent,
};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{actuator::ActuatorGateway, scheduler::CommandScheduler, tally::VoteTally};

/// Per-mode tally of the roster's standing selections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModeCounts {
    pub anarchy: usize,
    pub democracy: usize,
    pub communism: usize,
    pub no_vote: usize,
}

impl ModeCounts {
    pub fn count(&self, mode: Mode) -> usize {
        match mode {
            Mode::Anarchy => self.anarchy,
            Mode::Democracy => self.democracy,
            Mode::Communism => self.communism,
        }
    }

    /// Most voted mode. Ties go to Communism, then Democracy; Anarchy leads
    /// when nobody has voted.
    pub fn leader(&self) -> Mode {
        let mut leader = Mode::Anarchy;
        let mut best = 0;
        for mode in [Mode::Communism, Mode::Democracy, Mode::Anarchy] {
            if self.count(mode) > best {
                leader = mode;
                best = self.count(mode);
            }
        }
        leader
    }

    fn add(&mut self, vote: ModeVote) {
        match vote {
            ModeVote::NoVote => self.no_vote += 1,
            ModeVote::Cast(Mode::Anarchy) => self.anarchy += 1,
            ModeVote::Cast(Mode::Democracy) => self.democracy += 1,
            ModeVote::Cast(Mode::Communism) => self.communism += 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GovernanceState {
    Stable(Mode),
    /// `candidate` won the last recheck and needs one more win to commit.
    Pending { current: Mode, candidate: Mode },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Pending { current: Mode, candidate: Mode },
    Commit { from: Mode, to: Mode },
    Cleared { current: Mode, candidate: Mode },
}

impl GovernanceState {
    pub fn current(&self) -> Mode {
        match *self {
            Self::Stable(mode) => mode,
            Self::Pending { current, .. } => current,
        }
    }

    pub fn candidate(&self) -> Option<Mode> {
        match *self {
            Self::Stable(_) => None,
            Self::Pending { candidate, .. } => Some(candidate),
        }
    }

    /// One recheck. A leader that only ties the current mode counts as a
    /// vote for the current mode.
    pub fn step(self, counts: &ModeCounts) -> (Self, Option<Transition>) {
        let current = self.current();
        let leader = counts.leader();
        let winner = if counts.count(leader) != counts.count(current) {
            leader
        } else {
            current
        };

        match self {
            Self::Pending { candidate, .. } if candidate == winner => (
                Self::Stable(winner),
                Some(Transition::Commit {
                    from: current,
                    to: winner,
                }),
            ),
            Self::Pending { candidate, .. } if winner == current => (
                Self::Stable(current),
                Some(Transition::Cleared { current, candidate }),
            ),
            Self::Stable(_) if winner == current => (self, None),
            _ => (
                Self::Pending {
                    current,
                    candidate: winner,
                },
                Some(Transition::Pending {
                    current,
                    candidate: winner,
                }),
            ),
        }
    }
}

/// Standing mode selections of everyone in the channel. The bot and the
/// channel owner never appear.
pub struct VoterRoster {
    excluded: HashSet<Identity>,
    voters: Mutex<HashMap<Identity, ModeVote>>,
}

impl VoterRoster {
    pub fn new(excluded: impl IntoIterator<Item = Identity>) -> Self {
        Self {
            excluded: excluded.into_iter().collect(),
            voters: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_excluded(&self, user: &Identity) -> bool {
        self.excluded.contains(user)
    }

    /// Seeds `user` with no selection. A rejoin keeps the earlier selection.
    pub async fn join(&self, user: &Identity) -> bool {
        if self.is_excluded(user) {
            return false;
        }
        self.voters
            .lock()
            .await
            .entry(user.clone())
            .or_insert(ModeVote::NoVote);
        true
    }

    pub async fn part(&self, user: &Identity) {
        self.voters.lock().await.remove(user);
    }

    /// Overwrites the selection of `user`, adding them if they never joined.
    pub async fn record(&self, user: &Identity, mode: Mode) -> bool {
        if self.is_excluded(user) {
            return false;
        }
        self.voters
            .lock()
            .await
            .insert(user.clone(), ModeVote::Cast(mode));
        true
    }

    pub async fn counts(&self) -> ModeCounts {
        let voters = self.voters.lock().await;
        let mut counts = ModeCounts::default();
        for vote in voters.values() {
            counts.add(*vote);
        }
        counts
    }

    pub async fn len(&self) -> usize {
        self.voters.lock().await.len()
    }
}

struct Governance {
    state: GovernanceState,
    recheck: Option<JoinHandle<()>>,
}

pub struct ModeController {
    roster: VoterRoster,
    governance: Mutex<Governance>,
    tally: Arc<VoteTally>,
    scheduler: Arc<CommandScheduler>,
    gateway: Arc<ActuatorGateway>,
    recheck_period: Duration,
    events: broadcast::Sender<EngineEvent>,
}

impl ModeController {
    pub fn new(
        initial: Mode,
        roster: VoterRoster,
        tally: Arc<VoteTally>,
        scheduler: Arc<CommandScheduler>,
        gateway: Arc<ActuatorGateway>,
        recheck_period: Duration,
        events: broadcast::Sender<EngineEvent>,
    ) -> Arc<Self> {
        Arc::new(Self {
            roster,
            governance: Mutex::new(Governance {
                state: GovernanceState::Stable(initial),
                recheck: None,
            }),
            tally,
            scheduler,
            gateway,
            recheck_period,
            events,
        })
    }

    pub fn roster(&self) -> &VoterRoster {
        &self.roster
    }

    pub async fn mode(&self) -> Mode {
        self.governance.lock().await.state.current()
    }

    pub async fn state(&self) -> GovernanceState {
        self.governance.lock().await.state
    }

    pub async fn join(&self, user: &Identity) {
        if self.roster.join(user).await {
            debug!(%user, "mode: voter joined");
        }
    }

    pub async fn part(&self, user: &Identity) {
        self.roster.part(user).await;
        debug!(%user, "mode: voter left");
    }

    /// Records the selection and arms the recheck timer if it is idle.
    /// Returns `false` when the voter may not take part in mode votes.
    pub async fn cast_mode_vote(self: &Arc<Self>, voter: &Identity, mode: Mode) -> bool {
        if !self.roster.record(voter, mode).await {
            debug!(%voter, %mode, "mode: ignoring vote from excluded identity");
            return false;
        }
        let mut governance = self.governance.lock().await;
        if governance.recheck.is_none() {
            debug!(period = ?self.recheck_period, "mode: arming recheck");
            governance.recheck = Some(tokio::spawn(Arc::clone(self).recheck_loop()));
        }
        true
    }

    /// Applies `mode`'s round shape, scheduler lane and a clean button state.
    pub async fn enter(&self, mode: Mode) {
        self.tally.reshape(mode).await;
        self.scheduler
            .set_sequential_mode(mode == Mode::Communism)
            .await;
        if let Err(err) = self.gateway.reset().await {
            warn!(error = %err, %mode, "mode: failed to release buttons on mode entry");
        }
    }

    /// Runs one recheck immediately.
    pub async fn recheck(&self) -> Option<Transition> {
        let mut governance = self.governance.lock().await;
        self.step_locked(&mut governance).await
    }

    pub async fn shutdown(&self) {
        if let Some(recheck) = self.governance.lock().await.recheck.take() {
            recheck.abort();
        }
    }

    async fn recheck_loop(self: Arc<Self>) {
        loop {
            tokio::time::sleep(self.recheck_period).await;
            let mut governance = self.governance.lock().await;
            self.step_locked(&mut governance).await;
            if governance.state.candidate().is_none() {
                governance.recheck = None;
                debug!("mode: recheck idle");
                return;
            }
        }
    }

    async fn step_locked(&self, governance: &mut Governance) -> Option<Transition> {
        let counts = self.roster.counts().await;
        let (next, transition) = governance.state.step(&counts);
        governance.state = next;

        match transition {
            Some(Transition::Pending { current, candidate }) => {
                info!(%current, %candidate, ?counts, "mode: candidate pending");
                let _ = self
                    .events
                    .send(EngineEvent::ModePending { current, candidate });
            }
            Some(Transition::Commit { from, to }) => {
                info!(%from, %to, ?counts, "mode: switching");
                self.enter(to).await;
                let _ = self.events.send(EngineEvent::ModeChanged { from, to });
            }
            Some(Transition::Cleared { current, candidate }) => {
                info!(%current, %candidate, "mode: pending candidate withdrawn");
            }
            None => {}
        }
        transition
    }
}

#[cfg(test)]
#[path = "tests/mode_tests.rs"]
mod tests;
