//! Per-frame coin simulation that free-spins until the result is known, then springs onto it.

use std::{
    f64::consts::{PI, TAU},
    time::Duration,
};

use serde::Serialize;

use crate::state::{coin::CoinSide, round::RoundId};

/// Tunables for the settle simulation.
#[derive(Debug, Clone, PartialEq)]
pub struct AnimatorParams {
    /// Shortest total spin before the coin may start settling.
    pub min_spin: Duration,
    /// Multiplicative velocity decay per 60 Hz frame while free-spinning.
    pub free_spin_decay: f64,
    /// Free-spin velocity never drops below this (rad/s).
    pub min_velocity: f64,
    /// Spring stiffness pulling the phase onto its target.
    pub stiffness: f64,
    /// Angular error under which the coin may lock (rad).
    pub lock_error: f64,
    /// Residual velocity under which the coin may lock (rad/s).
    pub lock_velocity: f64,
    /// Longest integration step applied in a single frame.
    pub max_step: Duration,
}

impl Default for AnimatorParams {
    fn default() -> Self {
        Self {
            min_spin: Duration::from_millis(900),
            free_spin_decay: 0.985,
            min_velocity: 6.0,
            stiffness: 42.0,
            lock_error: 0.02,
            lock_velocity: 0.25,
            max_step: Duration::from_millis(100),
        }
    }
}

/// Initial conditions of a round's free spin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpinStart {
    /// Starting rotation angle.
    pub phase: f64,
    /// Starting angular velocity (rad/s).
    pub velocity: f64,
}

impl SpinStart {
    /// Random start: any phase, velocity between 18 and 24 rad/s.
    pub fn random<R: rand::Rng + ?Sized>(rng: &mut R) -> Self {
        Self {
            phase: rng.random_range(0.0..TAU),
            velocity: rng.random_range(18.0..24.0),
        }
    }
}

impl Default for SpinStart {
    fn default() -> Self {
        Self {
            phase: 0.0,
            velocity: 20.0,
        }
    }
}

/// Simulation stage for the current round.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AnimatorStage {
    /// Spinning freely, no target known yet.
    FreeSpin,
    /// Target known, still inside the minimum spin duration.
    ///
    /// The lock-in angle is not chosen yet; it is taken as the nearest angle showing `side`
    /// when the spring stage starts, so the extra spin here never adds full turns to the settle.
    AwaitMinDuration {
        /// Side to land on.
        side: CoinSide,
    },
    /// Spring pulls the phase onto `target`.
    SpringSettle {
        /// Side to land on.
        side: CoinSide,
        /// Absolute angle the phase converges to.
        target: f64,
    },
    /// Terminal: the phase sits exactly on the target.
    Locked {
        /// Side the coin shows.
        side: CoinSide,
    },
}

/// What the simulation needs to know about the round each frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInput {
    /// Round currently owned by the state machine.
    pub round_id: RoundId,
    /// Whether that round is in progress.
    pub spinning: bool,
    /// Side the result source returned, once known.
    pub target: Option<CoinSide>,
}

/// Discrete events raised by the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimatorEvent {
    /// The coin started its final settle.
    Landing {
        /// Round that is landing.
        round_id: RoundId,
    },
    /// The coin locked onto its final side.
    Settled {
        /// Side showing.
        side: CoinSide,
        /// Round that settled.
        round_id: RoundId,
    },
}

/// Renderable state of the coin after a frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CoinPose {
    /// Round the pose belongs to.
    pub round_id: RoundId,
    /// Rotation angle.
    pub phase: f64,
    /// Face visible at this angle.
    pub side: CoinSide,
    /// Horizontal squash from the rotation.
    pub squash: f64,
    /// Uniform scale from the toss pulse.
    pub scale: f64,
    /// Vertical lift as a fraction of the coin radius (negative is up).
    pub lift: f64,
    /// Shadow opacity.
    pub shadow_alpha: f64,
    /// Shadow scale.
    pub shadow_scale: f64,
}

const TOSS_SECONDS: f64 = 1.1;
const PULSE_AMPLITUDE: f64 = 0.38;
const SHADOW_BASE_ALPHA: f64 = 0.55;
const SMOOTHING_RATE: f64 = 14.0;
const FRAME_RATE: f64 = 60.0;

/// Cosmetic toss motion; never influences side or timing.
#[derive(Debug, Clone, Copy)]
struct Flourish {
    scale: f64,
    shadow_alpha: f64,
    shadow_scale: f64,
    lift: f64,
}

impl Default for Flourish {
    fn default() -> Self {
        Self {
            scale: 1.0,
            shadow_alpha: SHADOW_BASE_ALPHA,
            shadow_scale: 1.0,
            lift: 0.0,
        }
    }
}

impl Flourish {
    fn advance(&mut self, dt: f64, elapsed: f64, spinning: bool) {
        let smooth = 1.0 - (-dt * SMOOTHING_RATE).exp();
        let pulse = if spinning {
            (PI * (elapsed / TOSS_SECONDS).min(1.0)).sin()
        } else {
            0.0
        };

        self.scale += (1.0 + pulse * PULSE_AMPLITUDE - self.scale) * smooth;
        self.shadow_alpha += (lerp(SHADOW_BASE_ALPHA, 0.25, pulse) - self.shadow_alpha) * smooth;
        self.shadow_scale += (lerp(0.92, 1.28, pulse) - self.shadow_scale) * smooth;
        self.lift = -pulse * 0.55;
    }
}

/// Settle simulation for one coin.
#[derive(Debug, Clone)]
pub struct SettleAnimator {
    params: AnimatorParams,
    round_id: RoundId,
    stage: AnimatorStage,
    phase: f64,
    velocity: f64,
    elapsed: f64,
    landed: bool,
    settled: bool,
    flourish: Flourish,
}

impl SettleAnimator {
    /// Create an animator resting on heads before the first round.
    pub fn new(params: AnimatorParams) -> Self {
        Self {
            params,
            round_id: 0,
            stage: AnimatorStage::Locked {
                side: CoinSide::Heads,
            },
            phase: 0.0,
            velocity: 0.0,
            elapsed: 0.0,
            landed: false,
            settled: false,
            flourish: Flourish::default(),
        }
    }

    /// Restart the simulation for `round_id`, discarding any in-flight settle.
    pub fn reset(&mut self, round_id: RoundId, start: SpinStart) {
        self.round_id = round_id;
        self.stage = AnimatorStage::FreeSpin;
        self.phase = start.phase;
        self.velocity = start.velocity;
        self.elapsed = 0.0;
        self.landed = false;
        self.settled = false;
        self.flourish = Flourish {
            shadow_alpha: SHADOW_BASE_ALPHA,
            ..Flourish::default()
        };
    }

    /// Round the simulation currently tracks.
    pub fn round_id(&self) -> RoundId {
        self.round_id
    }

    /// Current stage.
    pub fn stage(&self) -> AnimatorStage {
        self.stage
    }

    /// Current rotation angle.
    pub fn phase(&self) -> f64 {
        self.phase
    }

    /// Current angular velocity.
    pub fn velocity(&self) -> f64 {
        self.velocity
    }

    /// Seconds since the round started spinning.
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    /// Advance the simulation by `dt`, returning the events raised during this frame.
    pub fn tick(&mut self, dt: Duration, frame: FrameInput) -> Vec<AnimatorEvent> {
        if frame.round_id != self.round_id {
            self.reset(frame.round_id, SpinStart::default());
        }

        let dt_secs = dt.as_secs_f64();
        self.elapsed += dt_secs;
        self.flourish.advance(dt_secs, self.elapsed, frame.spinning);

        let mut events = Vec::new();
        if !frame.spinning {
            return events;
        }

        let step = dt.min(self.params.max_step).as_secs_f64();

        if let (AnimatorStage::FreeSpin, Some(side)) = (self.stage, frame.target) {
            self.stage = AnimatorStage::AwaitMinDuration { side };
        }

        match self.stage {
            AnimatorStage::FreeSpin => {
                self.phase += self.velocity * step;
                self.velocity *= self.params.free_spin_decay.powf(step * FRAME_RATE);
                self.velocity = self.velocity.max(self.params.min_velocity);
            }
            AnimatorStage::AwaitMinDuration { side } => {
                if self.elapsed < self.params.min_spin.as_secs_f64() {
                    self.phase += self.velocity * step;
                } else {
                    let target = nearest_phase(self.phase, side.base_angle());
                    self.stage = AnimatorStage::SpringSettle { side, target };
                    self.mark_landing(&mut events);
                    self.spring_step(step, &mut events);
                }
            }
            AnimatorStage::SpringSettle { .. } => self.spring_step(step, &mut events),
            AnimatorStage::Locked { .. } => {}
        }

        events
    }

    /// Renderable pose after the latest frame.
    pub fn pose(&self) -> CoinPose {
        CoinPose {
            round_id: self.round_id,
            phase: self.phase,
            side: CoinSide::from_phase(self.phase),
            squash: self.phase.cos().abs().max(0.06),
            scale: self.flourish.scale,
            lift: self.flourish.lift,
            shadow_alpha: self.flourish.shadow_alpha,
            shadow_scale: self.flourish.shadow_scale,
        }
    }

    fn spring_step(&mut self, step: f64, events: &mut Vec<AnimatorEvent>) {
        let AnimatorStage::SpringSettle { side, target } = self.stage else {
            return;
        };

        let error = target - self.phase;
        let damping = 2.0 * self.params.stiffness.sqrt();
        self.velocity += error * self.params.stiffness * step;
        self.velocity *= (-damping * step).exp();
        self.phase += self.velocity * step;

        let error = target - self.phase;
        if error.abs() < self.params.lock_error && self.velocity.abs() < self.params.lock_velocity
        {
            self.phase = target;
            self.velocity = 0.0;
            self.stage = AnimatorStage::Locked { side };
            self.mark_landing(events);
            if !self.settled {
                self.settled = true;
                events.push(AnimatorEvent::Settled {
                    side: CoinSide::from_phase(self.phase),
                    round_id: self.round_id,
                });
            }
        }
    }

    fn mark_landing(&mut self, events: &mut Vec<AnimatorEvent>) {
        if !self.landed {
            self.landed = true;
            events.push(AnimatorEvent::Landing {
                round_id: self.round_id,
            });
        }
    }
}

/// Angle congruent to `base` (mod 2π) closest to `current`.
pub fn nearest_phase(current: f64, base: f64) -> f64 {
    let turns = ((current - base) / TAU).round();
    base + turns * TAU
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME: Duration = Duration::from_micros(16_667);

    fn spinning(round_id: RoundId, target: Option<CoinSide>) -> FrameInput {
        FrameInput {
            round_id,
            spinning: true,
            target,
        }
    }

    /// Run frames until the animator settles, returning elapsed seconds and all events.
    fn run_until_settled(
        animator: &mut SettleAnimator,
        frame: FrameInput,
        max_frames: usize,
    ) -> (f64, Vec<AnimatorEvent>) {
        let mut events = Vec::new();
        for _ in 0..max_frames {
            events.extend(animator.tick(FRAME, frame));
            if events
                .iter()
                .any(|e| matches!(e, AnimatorEvent::Settled { .. }))
            {
                return (animator.elapsed(), events);
            }
        }
        panic!("animator did not settle within {max_frames} frames");
    }

    #[test]
    fn nearest_phase_picks_the_closest_congruent_angle() {
        assert!((nearest_phase(0.1, 0.0) - 0.0).abs() < 1e-12);
        assert!((nearest_phase(6.0, 0.0) - TAU).abs() < 1e-12);
        assert!((nearest_phase(4.0, PI) - PI).abs() < 1e-12);
        assert!((nearest_phase(10.0, PI) - (PI + TAU)).abs() < 1e-12);
        assert!((nearest_phase(-2.0, PI) - (-PI)).abs() < 1e-12);

        for current in [-20.0, -3.3, 0.0, 1.7, 12.5, 99.0] {
            for base in [0.0, PI] {
                let target = nearest_phase(current, base);
                assert!((target - current).abs() <= PI + 1e-9);
            }
        }
    }

    #[test]
    fn free_spin_continues_without_a_target() {
        let mut animator = SettleAnimator::new(AnimatorParams::default());
        animator.reset(1, SpinStart::default());

        for _ in 0..600 {
            let events = animator.tick(FRAME, spinning(1, None));
            assert!(events.is_empty());
        }

        assert_eq!(animator.stage(), AnimatorStage::FreeSpin);
        assert!(animator.velocity() >= AnimatorParams::default().min_velocity);
    }

    #[test]
    fn settles_on_the_target_side() {
        for side in [CoinSide::Heads, CoinSide::Tails] {
            for start_phase in [0.0, 1.0, 2.5, 4.0] {
                let mut animator = SettleAnimator::new(AnimatorParams::default());
                animator.reset(
                    3,
                    SpinStart {
                        phase: start_phase,
                        velocity: 21.0,
                    },
                );

                let (_, events) = run_until_settled(&mut animator, spinning(3, Some(side)), 1_200);
                assert!(
                    events.contains(&AnimatorEvent::Settled { side, round_id: 3 }),
                    "side {side} from phase {start_phase}: {events:?}"
                );
                assert_eq!(animator.stage(), AnimatorStage::Locked { side });
                assert_eq!(animator.velocity(), 0.0);
                assert_eq!(animator.pose().side, side);
            }
        }
    }

    #[test]
    fn early_target_waits_for_minimum_spin() {
        let params = AnimatorParams::default();
        let min_spin = params.min_spin.as_secs_f64();
        let mut animator = SettleAnimator::new(params);
        animator.reset(1, SpinStart::default());

        let (elapsed, _) = run_until_settled(&mut animator, spinning(1, Some(CoinSide::Tails)), 1_200);
        assert!(elapsed >= min_spin, "settled after {elapsed}s");
    }

    #[test]
    fn landing_precedes_settle_exactly_once() {
        let mut animator = SettleAnimator::new(AnimatorParams::default());
        animator.reset(5, SpinStart::default());

        let (_, mut events) =
            run_until_settled(&mut animator, spinning(5, Some(CoinSide::Heads)), 1_200);
        for _ in 0..120 {
            events.extend(animator.tick(FRAME, spinning(5, Some(CoinSide::Heads))));
        }

        let landings: Vec<usize> = events
            .iter()
            .enumerate()
            .filter(|(_, e)| matches!(e, AnimatorEvent::Landing { .. }))
            .map(|(i, _)| i)
            .collect();
        let settles: Vec<usize> = events
            .iter()
            .enumerate()
            .filter(|(_, e)| matches!(e, AnimatorEvent::Settled { .. }))
            .map(|(i, _)| i)
            .collect();

        assert_eq!(landings.len(), 1);
        assert_eq!(settles.len(), 1);
        assert!(landings[0] < settles[0]);
    }

    #[test]
    fn idle_frames_do_not_spin() {
        let mut animator = SettleAnimator::new(AnimatorParams::default());
        animator.reset(2, SpinStart::default());
        let phase = animator.phase();

        let events = animator.tick(
            FRAME,
            FrameInput {
                round_id: 2,
                spinning: false,
                target: Some(CoinSide::Heads),
            },
        );

        assert!(events.is_empty());
        assert_eq!(animator.phase(), phase);
        assert_eq!(animator.stage(), AnimatorStage::FreeSpin);
    }

    #[test]
    fn new_round_discards_settle_progress() {
        let mut animator = SettleAnimator::new(AnimatorParams::default());
        animator.reset(1, SpinStart::default());
        run_until_settled(&mut animator, spinning(1, Some(CoinSide::Heads)), 1_200);

        let events = animator.tick(FRAME, spinning(2, None));
        assert!(events.is_empty());
        assert_eq!(animator.round_id(), 2);
        assert_eq!(animator.stage(), AnimatorStage::FreeSpin);
        assert!((animator.elapsed() - FRAME.as_secs_f64()).abs() < 1e-9);

        let (_, events) = run_until_settled(&mut animator, spinning(2, Some(CoinSide::Tails)), 1_200);
        assert!(events.contains(&AnimatorEvent::Settled {
            side: CoinSide::Tails,
            round_id: 2
        }));
    }

    #[test]
    fn long_frame_hitches_still_settle() {
        let mut animator = SettleAnimator::new(AnimatorParams::default());
        animator.reset(1, SpinStart::default());

        let mut settled = false;
        for _ in 0..400 {
            let events = animator.tick(
                Duration::from_millis(250),
                spinning(1, Some(CoinSide::Tails)),
            );
            if events.contains(&AnimatorEvent::Settled {
                side: CoinSide::Tails,
                round_id: 1,
            }) {
                settled = true;
                break;
            }
        }
        assert!(settled);
    }

    #[test]
    fn toss_pulse_lifts_the_coin_then_returns() {
        let mut animator = SettleAnimator::new(AnimatorParams::default());
        animator.reset(1, SpinStart::default());

        for _ in 0..30 {
            animator.tick(FRAME, spinning(1, None));
        }
        let mid = animator.pose();
        assert!(mid.lift < 0.0);
        assert!(mid.scale > 1.0);
        assert!(mid.shadow_alpha < SHADOW_BASE_ALPHA);

        for _ in 0..120 {
            animator.tick(
                FRAME,
                FrameInput {
                    round_id: 1,
                    spinning: false,
                    target: None,
                },
            );
        }
        let rest = animator.pose();
        assert_eq!(rest.lift, 0.0);
        assert!((rest.scale - 1.0).abs() < 1e-3);
    }
}
