//! Start/pause/resume/stop timer.
//!
//! Every transition is a pure function of the current session and the
//! observation time. Side effects (persisting a duration) are returned as
//! [`TimerCommand`]s for the caller to execute.

use crate::domain::models::{TimerTarget, MAX_TRACKED_SECONDS};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TimerStatus {
    #[default]
    Idle,
    Running,
    Paused,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerCommand {
    PersistDuration {
        target: TimerTarget,
        total_seconds: i64,
    },
    /// Stop was called on a session with nothing attached.
    DiscardUnattached { total_seconds: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub session: TimerSession,
    pub commands: Vec<TimerCommand>,
    pub changed: bool,
}

impl Transition {
    fn unchanged(session: &TimerSession) -> Self {
        Self {
            session: session.clone(),
            commands: Vec::new(),
            changed: false,
        }
    }

    fn to(session: TimerSession, commands: Vec<TimerCommand>) -> Self {
        Self {
            session,
            commands,
            changed: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TimerSession {
    status: TimerStatus,
    accumulated_ms: i64,
    started_at: Option<DateTime<Utc>>,
    target: Option<TimerTarget>,
}

impl TimerSession {
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn status(&self) -> TimerStatus {
        self.status
    }

    pub fn target(&self) -> Option<&TimerTarget> {
        self.target.as_ref()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn is_running(&self) -> bool {
        self.status == TimerStatus::Running
    }

    pub fn is_paused(&self) -> bool {
        self.status == TimerStatus::Paused
    }

    pub fn start(&self, target: Option<TimerTarget>, now: DateTime<Utc>) -> Transition {
        self.start_from(target, 0, now)
    }

    /// Like [`start`](Self::start) but seeded with an already tracked amount,
    /// clamped to `0..=MAX_TRACKED_SECONDS`.
    pub fn start_from(
        &self,
        target: Option<TimerTarget>,
        initial_seconds: i64,
        now: DateTime<Utc>,
    ) -> Transition {
        if self.status != TimerStatus::Idle {
            return Transition::unchanged(self);
        }
        Transition::to(
            Self {
                status: TimerStatus::Running,
                accumulated_ms: initial_seconds.clamp(0, MAX_TRACKED_SECONDS) * 1000,
                started_at: Some(now),
                target,
            },
            Vec::new(),
        )
    }

    pub fn pause(&self, now: DateTime<Utc>) -> Transition {
        if self.status != TimerStatus::Running {
            return Transition::unchanged(self);
        }
        Transition::to(
            Self {
                status: TimerStatus::Paused,
                accumulated_ms: self.elapsed_ms(now),
                started_at: None,
                target: self.target.clone(),
            },
            Vec::new(),
        )
    }

    pub fn resume(&self, now: DateTime<Utc>) -> Transition {
        if self.status != TimerStatus::Paused {
            return Transition::unchanged(self);
        }
        Transition::to(
            Self {
                status: TimerStatus::Running,
                accumulated_ms: self.accumulated_ms,
                started_at: Some(now),
                target: self.target.clone(),
            },
            Vec::new(),
        )
    }

    pub fn stop(&self, now: DateTime<Utc>) -> Transition {
        if self.status == TimerStatus::Idle {
            return Transition::unchanged(self);
        }
        let total_seconds = self.elapsed_seconds(now);
        let command = match self.target.clone() {
            Some(target) => TimerCommand::PersistDuration {
                target,
                total_seconds,
            },
            None => TimerCommand::DiscardUnattached { total_seconds },
        };
        Transition::to(Self::idle(), vec![command])
    }

    pub fn elapsed_ms(&self, now: DateTime<Utc>) -> i64 {
        self.accumulated_ms.saturating_add(self.live_segment_ms(now))
    }

    /// `accumulated + (running ? now - started_at : 0)`, in whole seconds.
    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> i64 {
        self.elapsed_ms(now).div_euclid(1000)
    }

    fn live_segment_ms(&self, now: DateTime<Utc>) -> i64 {
        match (self.status, self.started_at) {
            (TimerStatus::Running, Some(started_at)) => {
                (now - started_at).num_milliseconds().max(0)
            }
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-02-16T09:00:00Z")
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn at(seconds: i64) -> DateTime<Utc> {
        t0() + Duration::seconds(seconds)
    }

    fn task(id: &str) -> Option<TimerTarget> {
        Some(TimerTarget::Task {
            task_id: id.to_string(),
        })
    }

    #[test]
    fn pause_resume_stop_sums_running_intervals() {
        let session = TimerSession::idle().start(task("tsk-1"), at(0)).session;
        let paused = session.pause(at(5)).session;
        assert_eq!(paused.elapsed_seconds(at(5)), 5);
        assert_eq!(paused.elapsed_seconds(at(7)), 5);

        let resumed = paused.resume(at(8)).session;
        assert_eq!(resumed.elapsed_seconds(at(10)), 7);

        let stopped = resumed.stop(at(11));
        assert_eq!(stopped.session.status(), TimerStatus::Idle);
        assert_eq!(
            stopped.commands,
            vec![TimerCommand::PersistDuration {
                target: TimerTarget::Task {
                    task_id: "tsk-1".to_string()
                },
                total_seconds: 8,
            }]
        );
    }

    #[test]
    fn double_pause_keeps_accumulated() {
        let running = TimerSession::idle().start(task("tsk-1"), at(0)).session;
        let first = running.pause(at(4)).session;
        let second = first.pause(at(9));
        assert!(!second.changed);
        assert_eq!(second.session, first);
        assert_eq!(second.session.elapsed_seconds(at(20)), 4);
    }

    #[test]
    fn start_on_running_timer_is_noop() {
        let running = TimerSession::idle().start(task("tsk-1"), at(0)).session;
        let again = running.start(task("tsk-2"), at(3));
        assert!(!again.changed);
        assert_eq!(again.session.elapsed_seconds(at(6)), 6);
        assert_eq!(again.session.target(), task("tsk-1").as_ref());
    }

    #[test]
    fn start_on_paused_timer_is_noop() {
        let paused = TimerSession::idle()
            .start(task("tsk-1"), at(0))
            .session
            .pause(at(2))
            .session;
        let again = paused.start(task("tsk-2"), at(3));
        assert!(!again.changed);
        assert!(again.session.is_paused());
    }

    #[test]
    fn pause_and_resume_outside_their_states_are_noops() {
        let idle = TimerSession::idle();
        assert!(!idle.pause(at(1)).changed);
        assert!(!idle.resume(at(1)).changed);

        let running = idle.start(task("tsk-1"), at(0)).session;
        assert!(!running.resume(at(1)).changed);
    }

    #[test]
    fn stop_on_idle_emits_nothing() {
        let outcome = TimerSession::idle().stop(at(10));
        assert!(!outcome.changed);
        assert!(outcome.commands.is_empty());
    }

    #[test]
    fn stop_while_paused_flushes_accumulated_only() {
        let paused = TimerSession::idle()
            .start(task("tsk-1"), at(0))
            .session
            .pause(at(30))
            .session;
        let outcome = paused.stop(at(500));
        assert_eq!(
            outcome.commands,
            vec![TimerCommand::PersistDuration {
                target: TimerTarget::Task {
                    task_id: "tsk-1".to_string()
                },
                total_seconds: 30,
            }]
        );
    }

    #[test]
    fn stop_without_target_discards() {
        let running = TimerSession::idle().start(None, at(0)).session;
        let outcome = running.stop(at(12));
        assert_eq!(
            outcome.commands,
            vec![TimerCommand::DiscardUnattached { total_seconds: 12 }]
        );
        assert_eq!(outcome.session, TimerSession::idle());
    }

    #[test]
    fn start_from_seeds_accumulated() {
        let running = TimerSession::idle()
            .start_from(task("tsk-1"), 120, at(0))
            .session;
        assert_eq!(running.elapsed_seconds(at(0)), 120);
        assert_eq!(running.elapsed_seconds(at(15)), 135);

        let negative = TimerSession::idle().start_from(task("tsk-1"), -50, at(0)).session;
        assert_eq!(negative.elapsed_seconds(at(0)), 0);
    }

    #[test]
    fn oversized_seed_is_clamped_and_never_overflows() {
        let running = TimerSession::idle()
            .start_from(task("tsk-1"), i64::MAX / 100, at(0))
            .session;
        assert_eq!(running.elapsed_seconds(at(0)), MAX_TRACKED_SECONDS);
        assert_eq!(running.elapsed_seconds(at(1)), MAX_TRACKED_SECONDS + 1);

        let far_future = DateTime::<Utc>::MAX_UTC;
        let paused = running.pause(far_future).session;
        assert!(paused.elapsed_ms(far_future) > 0);
        let stopped = paused.stop(far_future);
        assert_eq!(stopped.session.status(), TimerStatus::Idle);
    }

    #[test]
    fn sub_second_segments_are_not_lost_across_pauses() {
        let mut session = TimerSession::idle().start(task("tsk-1"), t0()).session;
        let mut now = t0();
        for _ in 0..4 {
            now += Duration::milliseconds(500);
            session = session.pause(now).session;
            now += Duration::seconds(1);
            session = session.resume(now).session;
        }
        assert_eq!(session.elapsed_seconds(now), 2);
    }

    #[test]
    fn clock_moving_backwards_does_not_go_negative() {
        let running = TimerSession::idle().start(task("tsk-1"), at(10)).session;
        assert_eq!(running.elapsed_seconds(at(5)), 0);
    }

    #[derive(Debug, Clone, Copy)]
    enum Op {
        Start,
        Pause,
        Resume,
        Stop,
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            Just(Op::Start),
            Just(Op::Pause),
            Just(Op::Resume),
            Just(Op::Stop),
        ]
    }

    // Elapsed must equal the sum of running intervals at every observation.
    proptest! {
        #[test]
        fn elapsed_matches_sum_of_running_intervals(
            steps in prop::collection::vec((op_strategy(), 0i64..10_000i64), 1..40)
        ) {
            let mut session = TimerSession::idle();
            let mut now = t0();
            let mut expected_ms: i64 = 0;
            let mut running_since: Option<DateTime<Utc>> = None;

            for (op, delta_ms) in steps {
                now += Duration::milliseconds(delta_ms);
                let live = running_since.map(|since| (now - since).num_milliseconds()).unwrap_or(0);
                prop_assert_eq!(session.elapsed_ms(now), expected_ms + live);

                let transition = match op {
                    Op::Start => session.start(task("tsk-1"), now),
                    Op::Pause => session.pause(now),
                    Op::Resume => session.resume(now),
                    Op::Stop => session.stop(now),
                };

                match (op, session.status()) {
                    (Op::Start, TimerStatus::Idle) => {
                        expected_ms = 0;
                        running_since = Some(now);
                    }
                    (Op::Pause, TimerStatus::Running) => {
                        expected_ms += live;
                        running_since = None;
                    }
                    (Op::Resume, TimerStatus::Paused) => {
                        running_since = Some(now);
                    }
                    (Op::Stop, TimerStatus::Running | TimerStatus::Paused) => {
                        let total = (expected_ms + live).div_euclid(1000);
                        let persisted = transition.commands.iter().any(|command| matches!(
                            command,
                            TimerCommand::PersistDuration { total_seconds, .. } if *total_seconds == total
                        ));
                        prop_assert!(persisted);
                        expected_ms = 0;
                        running_since = None;
                    }
                    _ => {
                        prop_assert!(!transition.changed);
                    }
                }
                session = transition.session;
            }
        }
    }
}
