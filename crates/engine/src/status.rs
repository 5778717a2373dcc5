use std::fmt::Write as _;

use shared::{
    domain::{Mode, RoundKind},
    protocol::{EngineEvent, RoundOutcome},
};

use crate::{mode::ModeCounts, scheduler::LaneDepths, tally::TallySnapshot};

/// Point-in-time copy of everything the status panel shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub mode: Mode,
    pub pending: Option<Mode>,
    pub counts: ModeCounts,
    pub voters: usize,
    pub tally: TallySnapshot,
    pub lanes: LaneDepths,
}

impl StatusSnapshot {
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = write!(out, "mode: {}", self.mode);
        if let Some(candidate) = self.pending {
            let _ = write!(out, " (pending: {candidate})");
        }
        out.push('\n');
        let _ = writeln!(
            out,
            "votes: anarchy {} / democracy {} / communism {} / undecided {} ({} in channel)",
            self.counts.anarchy,
            self.counts.democracy,
            self.counts.communism,
            self.counts.no_vote,
            self.voters,
        );

        if let Some(kind) = self.tally.kind {
            let state = if self.tally.open { "open" } else { "waiting" };
            let _ = writeln!(
                out,
                "round: {} {state}, {} ballots",
                kind_label(kind),
                self.tally.voters
            );
            if !self.tally.single.is_empty() {
                let _ = writeln!(out, "  {}", render_counts(&self.tally.single));
            }
            for (slot, counts) in self.tally.slots.iter().enumerate() {
                let _ = writeln!(out, "  #{}: {}", slot + 1, render_counts(counts));
            }
        }

        let _ = write!(
            out,
            "queued: {} commands, {} plans",
            self.lanes.immediate, self.lanes.plans
        );
        out
    }
}

fn render_counts(counts: &[(String, u32)]) -> String {
    counts
        .iter()
        .map(|(token, count)| format!("{token}={count}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn kind_label(kind: RoundKind) -> &'static str {
    match kind {
        RoundKind::Single => "command vote",
        RoundKind::Plan => "plan vote",
    }
}

/// One human-readable line per engine event, shared by chat and the event log.
pub fn describe_event(event: &EngineEvent) -> String {
    match event {
        EngineEvent::ModePending { current, candidate } => {
            format!("{candidate} is winning the mode vote; still {current} until the next check")
        }
        EngineEvent::ModeChanged { from, to } => format!("mode changed from {from} to {to}"),
        EngineEvent::RoundOpened { kind, window_secs } => {
            format!("{} open for {window_secs}s", kind_label(*kind))
        }
        EngineEvent::RoundClosing {
            kind,
            remaining_secs,
        } => format!("{} closes in {remaining_secs}s", kind_label(*kind)),
        EngineEvent::RoundResolved { outcome } => match outcome {
            RoundOutcome::Command { token } => format!("vote result: {token}"),
            RoundOutcome::Plan { tokens } => format!("vote result: {}", tokens.join(",")),
            RoundOutcome::NoVotes => "vote result: nothing".to_string(),
        },
        EngineEvent::RoundDiscarded { kind } => {
            format!("{} cancelled by mode change", kind_label(*kind))
        }
        EngineEvent::CommandPressed { token } => format!("pressed {token}"),
        EngineEvent::PlanStarted { tokens } => format!("running plan {}", tokens.join(",")),
        EngineEvent::ActuatorFault { message } => format!("controller fault: {message}"),
    }
}

#[cfg(test)]
#[path = "tests/status_tests.rs"]
mod tests;
