use std::{collections::HashSet, sync::Arc, time::Duration};

use rand::{seq::SliceRandom, Rng};
use shared::{
    domain::{Identity, Mode, RoundKind},
    protocol::{EngineEvent, RoundOutcome},
};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{registry::CommandRegistry, scheduler::CommandScheduler};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundTimings {
    /// Phase 1: the round accepts ballots.
    pub open: Duration,
    /// Phase 2: still accepting, closing warning already announced.
    pub closing: Duration,
}

/// Result of a ballot. Rejections are expected traffic, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BallotOutcome {
    Counted,
    AlreadyVoted,
    Rejected,
    /// The governing mode collects no ballots of this shape.
    NoRound,
}

/// Counters are indexed by registry position.
#[derive(Debug, Clone)]
enum Ballots {
    Closed,
    Single(Vec<u32>),
    Plan(Vec<Vec<u32>>),
}

impl Ballots {
    fn for_mode(mode: Mode, commands: usize, plan_size: usize) -> Self {
        match mode.round_kind() {
            None => Self::Closed,
            Some(RoundKind::Single) => Self::Single(vec![0; commands]),
            Some(RoundKind::Plan) => Self::Plan(vec![vec![0; commands]; plan_size]),
        }
    }

    fn kind(&self) -> Option<RoundKind> {
        match self {
            Self::Closed => None,
            Self::Single(_) => Some(RoundKind::Single),
            Self::Plan(_) => Some(RoundKind::Plan),
        }
    }

    fn zero(&mut self) {
        match self {
            Self::Closed => {}
            Self::Single(counts) => counts.fill(0),
            Self::Plan(slots) => slots.iter_mut().for_each(|counts| counts.fill(0)),
        }
    }
}

struct RoundState {
    ballots: Ballots,
    voters: HashSet<Identity>,
    open: bool,
    /// Identifies the round a timer belongs to; bumped on every reset.
    epoch: u64,
    timer: Option<JoinHandle<()>>,
}

impl RoundState {
    fn reset(&mut self) {
        self.ballots.zero();
        self.voters.clear();
        self.open = false;
        self.epoch += 1;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TallySnapshot {
    pub kind: Option<RoundKind>,
    pub open: bool,
    pub voters: usize,
    pub single: Vec<(String, u32)>,
    pub slots: Vec<Vec<(String, u32)>>,
}

pub struct VoteTally {
    registry: Arc<CommandRegistry>,
    scheduler: Arc<CommandScheduler>,
    plan_size: usize,
    timings: RoundTimings,
    state: Mutex<RoundState>,
    events: broadcast::Sender<EngineEvent>,
}

impl VoteTally {
    pub fn new(
        registry: Arc<CommandRegistry>,
        scheduler: Arc<CommandScheduler>,
        plan_size: usize,
        timings: RoundTimings,
        events: broadcast::Sender<EngineEvent>,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            scheduler,
            plan_size,
            timings,
            state: Mutex::new(RoundState {
                ballots: Ballots::Closed,
                voters: HashSet::new(),
                open: false,
                epoch: 0,
                timer: None,
            }),
            events,
        })
    }

    /// Replaces the round with an empty one shaped for `mode`. A round that was
    /// still collecting is discarded without executing.
    pub async fn reshape(&self, mode: Mode) {
        let mut state = self.state.lock().await;
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        if state.open {
            if let Some(kind) = state.ballots.kind() {
                info!(?kind, %mode, "tally: discarding round after mode change");
                let _ = self.events.send(EngineEvent::RoundDiscarded { kind });
            }
        }
        state.reset();
        state.ballots = Ballots::for_mode(mode, self.registry.len(), self.plan_size);
    }

    /// Stops the round timer and forgets any collected ballots.
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        state.reset();
    }

    pub async fn cast_vote(self: &Arc<Self>, voter: &Identity, token: &str) -> BallotOutcome {
        let mut state = self.state.lock().await;
        let RoundState {
            ballots, voters, ..
        } = &mut *state;
        let Ballots::Single(counts) = ballots else {
            return BallotOutcome::NoRound;
        };
        if voters.contains(voter) {
            return BallotOutcome::AlreadyVoted;
        }
        let Some(position) = self.registry.position(token) else {
            return BallotOutcome::Rejected;
        };

        counts[position] += 1;
        voters.insert(voter.clone());
        debug!(%voter, %token, "tally: counted vote");
        self.open_round_if_idle(&mut state, RoundKind::Single);
        BallotOutcome::Counted
    }

    /// Counts one ballot per plan slot. The whole ballot is dropped if its
    /// length is wrong or any token is unknown.
    pub async fn cast_plan_vote(
        self: &Arc<Self>,
        voter: &Identity,
        tokens: &[&str],
    ) -> BallotOutcome {
        let mut state = self.state.lock().await;
        let RoundState {
            ballots, voters, ..
        } = &mut *state;
        let Ballots::Plan(slots) = ballots else {
            return BallotOutcome::NoRound;
        };
        if voters.contains(voter) {
            return BallotOutcome::AlreadyVoted;
        }
        if tokens.len() != self.plan_size {
            return BallotOutcome::Rejected;
        }
        let Some(positions) = tokens
            .iter()
            .map(|token| self.registry.position(token))
            .collect::<Option<Vec<_>>>()
        else {
            return BallotOutcome::Rejected;
        };

        for (slot, position) in slots.iter_mut().zip(positions) {
            slot[position] += 1;
        }
        voters.insert(voter.clone());
        debug!(%voter, plan = ?tokens, "tally: counted plan vote");
        self.open_round_if_idle(&mut state, RoundKind::Plan);
        BallotOutcome::Counted
    }

    pub async fn snapshot(&self) -> TallySnapshot {
        let state = self.state.lock().await;
        let label = |counts: &[u32]| -> Vec<(String, u32)> {
            self.registry
                .tokens()
                .zip(counts.iter().copied())
                .map(|(token, count)| (token.to_string(), count))
                .collect()
        };
        let (single, slots) = match &state.ballots {
            Ballots::Closed => (Vec::new(), Vec::new()),
            Ballots::Single(counts) => (label(counts.as_slice()), Vec::new()),
            Ballots::Plan(slots) => (
                Vec::new(),
                slots.iter().map(|slot| label(slot.as_slice())).collect(),
            ),
        };
        TallySnapshot {
            kind: state.ballots.kind(),
            open: state.open,
            voters: state.voters.len(),
            single,
            slots,
        }
    }

    fn open_round_if_idle(self: &Arc<Self>, state: &mut RoundState, kind: RoundKind) {
        if state.open {
            return;
        }
        state.open = true;
        let epoch = state.epoch;
        state.timer = Some(tokio::spawn(Arc::clone(self).run_round(epoch, kind)));
        info!(?kind, "tally: round opened");
        let _ = self.events.send(EngineEvent::RoundOpened {
            kind,
            window_secs: (self.timings.open + self.timings.closing).as_secs(),
        });
    }

    async fn run_round(self: Arc<Self>, epoch: u64, kind: RoundKind) {
        tokio::time::sleep(self.timings.open).await;
        if self.state.lock().await.epoch != epoch {
            return;
        }
        let _ = self.events.send(EngineEvent::RoundClosing {
            kind,
            remaining_secs: self.timings.closing.as_secs(),
        });
        tokio::time::sleep(self.timings.closing).await;
        self.resolve(epoch).await;
    }

    /// Executes the winner and starts a fresh round. Holding the round lock
    /// while handing off keeps a concurrent mode change from slipping between
    /// resolution and enqueue.
    async fn resolve(&self, epoch: u64) {
        let mut state = self.state.lock().await;
        if state.epoch != epoch {
            debug!(epoch, "tally: skipping stale round");
            return;
        }
        state.timer = None;

        let outcome = match &state.ballots {
            Ballots::Closed => None,
            Ballots::Single(counts) => Some(
                pick_first_max(counts)
                    .and_then(|position| self.registry.token_at(position))
                    .map(|token| RoundOutcome::Command {
                        token: token.to_string(),
                    })
                    .unwrap_or(RoundOutcome::NoVotes),
            ),
            Ballots::Plan(slots) => Some(
                self.resolve_plan(slots)
                    .map(|tokens| RoundOutcome::Plan { tokens })
                    .unwrap_or(RoundOutcome::NoVotes),
            ),
        };
        state.reset();

        let Some(outcome) = outcome else {
            return;
        };
        let handoff = match &outcome {
            RoundOutcome::Command { token } => self.scheduler.enqueue_command(token).await,
            RoundOutcome::Plan { tokens } => self.scheduler.enqueue_sequence(tokens.clone()).await,
            RoundOutcome::NoVotes => Ok(()),
        };
        if let Err(err) = handoff {
            warn!(error = %err, "tally: failed to hand off round result");
        }
        info!(outcome = ?outcome, "tally: round resolved");
        let _ = self.events.send(EngineEvent::RoundResolved { outcome });
    }

    fn resolve_plan(&self, slots: &[Vec<u32>]) -> Option<Vec<String>> {
        let mut rng = rand::thread_rng();
        slots
            .iter()
            .map(|counts| {
                pick_randomized_max(counts, &mut rng)
                    .and_then(|position| self.registry.token_at(position))
                    .map(str::to_string)
            })
            .collect()
    }
}

/// Index of the highest count, earliest index on ties; `None` when nothing
/// received a vote.
pub fn pick_first_max(counts: &[u32]) -> Option<usize> {
    let mut best: Option<(usize, u32)> = None;
    for (position, &count) in counts.iter().enumerate() {
        if count > best.map_or(0, |(_, top)| top) {
            best = Some((position, count));
        }
    }
    best.map(|(position, _)| position)
}

/// Index of the highest count, chosen uniformly among ties; `None` when
/// nothing received a vote.
pub fn pick_randomized_max<R: Rng + ?Sized>(counts: &[u32], rng: &mut R) -> Option<usize> {
    let top = counts.iter().copied().max().filter(|&top| top > 0)?;
    let leaders: Vec<usize> = counts
        .iter()
        .enumerate()
        .filter(|(_, count)| **count == top)
        .map(|(position, _)| position)
        .collect();
    leaders.choose(rng).copied()
}

#[cfg(test)]
#[path = "tests/tally_tests.rs"]
mod tests;
