//! # Manoeuvre Planner
//!
//! Plans Angle-Line-Angle (ALA) manoeuvres: a turn on a circle to face the target, a straight
//! line, and a second turn onto the target heading. The four combinations of left and right turns
//! are tried and the shortest is kept.
//!
//! The turn radius is the one at which the cruise velocity can be held with the acceleration
//! limit, `r = v^2 / a`. When the robot has to speed up at the start or slow down at the end, a
//! short straight settle segment is added before or after the turns so that the turns are driven at
//! the cruise velocity.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod params;
mod pose;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::eqpt::ctrl::{EventId, MotionLine};
use log::trace;
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use util::maths::wrap_2pi;

use crate::hot_swap::ScriptBuffer;

// ------------------------------------------------------------------------------------------------
// EXPORTS
// ------------------------------------------------------------------------------------------------

pub use params::MnvrPlannerParams;
pub use pose::Pose;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Tolerance used when wrapping turn angles, an angle this close to a full turn is no turn.
const ANGLE_TOL_RAD: f64 = 1e-9;

/// Turns smaller than this are not sent to the controller.
const MIN_TURN_DEG: f64 = 0.05;

/// Straight segments shorter than this are not sent to the controller.
const MIN_STRAIGHT_M: f64 = 0.001;

/// Turn circles closer than this are the same circle.
const SAME_CIRCLE_TOL_M: f64 = 1e-9;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Angle-Line-Angle manoeuvre planner.
#[derive(Debug, Clone, Default)]
pub struct MnvrPlanner {
    pub params: MnvrPlannerParams,
}

/// Dynamic limits of a manoeuvre.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MnvrLimits {
    /// Cruise velocity
    ///
    /// Units: meters/second
    pub vel_ms: f64,

    /// Maximum acceleration
    ///
    /// Units: meters/second^2
    pub acc_mss: f64,

    /// Velocity at the start of the manoeuvre
    ///
    /// Units: meters/second
    pub init_vel_ms: f64,

    /// Velocity at the end of the manoeuvre
    ///
    /// Units: meters/second
    pub final_vel_ms: f64,
}

/// A planned Angle-Line-Angle manoeuvre.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ManeuverPlan {
    /// Straight distance driven before the first turn to reach the cruise velocity.
    pub init_settle_m: f64,

    /// Radius of both turns.
    pub turn_radius_m: f64,

    /// First turn angle, positive to the left.
    pub first_turn_rad: f64,

    /// Straight distance between the turns.
    pub straight_m: f64,

    /// Second turn angle, positive to the left.
    pub second_turn_rad: f64,

    /// Straight distance driven after the second turn to reach the final velocity.
    pub final_settle_m: f64,

    /// The limits the plan was made for.
    pub limits: MnvrLimits,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PlanError {
    #[error("The cruise velocity must be positive, found {0} m/s")]
    InvalidVelocity(f64),

    #[error("The acceleration must be positive, found {0} m/s^2")]
    InvalidAcceleration(f64),

    #[error("The manoeuvre inputs contain non-finite values")]
    NonFiniteInput,

    #[error("No Angle-Line-Angle manoeuvre exists between the two poses")]
    NoSolution,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl MnvrPlanner {
    pub fn new(params: MnvrPlannerParams) -> Self {
        Self { params }
    }

    /// Plan a manoeuvre from `start` to `target`.
    ///
    /// If the bare manoeuvre (without settle segments) is shorter than `min_move_dist_m` it is
    /// returned as is, [`MnvrPlanner::is_worth_executing`] then rejects it.
    pub fn plan(
        &self,
        start: &Pose,
        target: &Pose,
        limits: &MnvrLimits,
    ) -> Result<ManeuverPlan, PlanError> {
        if !(limits.vel_ms.is_finite()
            && limits.acc_mss.is_finite()
            && limits.init_vel_ms.is_finite()
            && limits.final_vel_ms.is_finite()
            && start.is_finite()
            && target.is_finite())
        {
            return Err(PlanError::NonFiniteInput);
        }
        if limits.vel_ms <= 0.0 {
            return Err(PlanError::InvalidVelocity(limits.vel_ms));
        }
        if limits.acc_mss <= 0.0 {
            return Err(PlanError::InvalidAcceleration(limits.acc_mss));
        }

        let radius_m = (limits.vel_ms.powi(2) / limits.acc_mss).max(self.params.min_turn_radius_m);

        let bare = shortest_csc(start, target, radius_m).ok_or(PlanError::NoSolution)?;
        let bare_plan = ManeuverPlan::from_csc(&bare, radius_m, 0.0, 0.0, limits);

        if bare_plan.movement_distance() < self.params.min_move_dist_m {
            trace!("Manoeuvre of {:.3} m is below threshold", bare_plan.movement_distance());
            return Ok(bare_plan);
        }

        // Settle segments
        let init_settle_m = self.settle_dist(limits.vel_ms, limits.init_vel_ms, limits.acc_mss);
        let final_settle_m = self.settle_dist(limits.vel_ms, limits.final_vel_ms, limits.acc_mss);

        if init_settle_m == 0.0 && final_settle_m == 0.0 {
            return Ok(bare_plan);
        }

        let turn_start = start.advanced(init_settle_m);
        let turn_end = target.advanced(-final_settle_m);

        let csc = shortest_csc(&turn_start, &turn_end, radius_m).ok_or(PlanError::NoSolution)?;

        Ok(ManeuverPlan::from_csc(
            &csc,
            radius_m,
            init_settle_m,
            final_settle_m,
            limits,
        ))
    }

    /// Returns true if the plan is long enough to be worth driving.
    pub fn is_worth_executing(&self, plan: &ManeuverPlan) -> bool {
        plan.movement_distance() >= self.params.min_move_dist_m
    }

    /// Distance needed to change from `from_ms` to `to_ms`, or zero if it is below the settle
    /// threshold.
    fn settle_dist(&self, to_ms: f64, from_ms: f64, acc_mss: f64) -> f64 {
        let dist_m = (to_ms.powi(2) - from_ms.powi(2)).abs() / (2.0 * acc_mss);

        if dist_m > self.params.settle_threshold_m {
            dist_m
        } else {
            0.0
        }
    }
}

impl ManeuverPlan {
    fn from_csc(
        csc: &Csc,
        turn_radius_m: f64,
        init_settle_m: f64,
        final_settle_m: f64,
        limits: &MnvrLimits,
    ) -> Self {
        Self {
            init_settle_m,
            turn_radius_m,
            first_turn_rad: csc.first_turn_rad,
            straight_m: csc.straight_m,
            second_turn_rad: csc.second_turn_rad,
            final_settle_m,
            limits: *limits,
        }
    }

    /// Total distance travelled by the robot.
    pub fn movement_distance(&self) -> f64 {
        self.init_settle_m
            + self.turn_radius_m * (self.first_turn_rad.abs() + self.second_turn_rad.abs())
            + self.straight_m
            + self.final_settle_m
    }

    /// The pose reached by driving this plan from `start`.
    pub fn end_pose(&self, start: &Pose) -> Pose {
        start
            .advanced(self.init_settle_m)
            .turned(self.turn_radius_m, self.first_turn_rad)
            .advanced(self.straight_m)
            .turned(self.turn_radius_m, self.second_turn_rad)
            .advanced(self.final_settle_m)
    }

    /// Render the plan as a controller script, ending with a line which raises `event`.
    ///
    /// Turns and straights too small for the controller to act on are left out.
    pub fn to_script(&self, event: EventId) -> ScriptBuffer {
        let vel = self.limits.vel_ms;
        let acc = self.limits.acc_mss;

        let mut script = ScriptBuffer::new();

        if self.init_settle_m > 0.0 {
            script.push(MotionLine::new().vel(vel).acc(acc).until_dist(self.init_settle_m));
        }

        let first_turn_deg = self.first_turn_rad.to_degrees();
        if first_turn_deg.abs() >= MIN_TURN_DEG {
            script.push(
                MotionLine::new()
                    .vel(vel)
                    .turn_radius(self.turn_radius_m)
                    .until_turn(first_turn_deg),
            );
        }

        if self.straight_m >= MIN_STRAIGHT_M {
            script.push(MotionLine::new().vel(vel).until_dist(self.straight_m));
        }

        let second_turn_deg = self.second_turn_rad.to_degrees();
        if second_turn_deg.abs() >= MIN_TURN_DEG {
            script.push(
                MotionLine::new()
                    .vel(vel)
                    .turn_radius(self.turn_radius_m)
                    .until_turn(second_turn_deg),
            );
        }

        // Ends on time, a robot which stops just short of the distance would never end the line
        if self.final_settle_m > 0.0 {
            let settle_time_s = (vel - self.limits.final_vel_ms).abs() / acc;
            script.push(
                MotionLine::new()
                    .vel(self.limits.final_vel_ms)
                    .acc(acc)
                    .until_time(settle_time_s),
            );
        }

        script.terminate_with_event(event);
        script
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE
// ------------------------------------------------------------------------------------------------

/// Turn-straight-turn path between two poses.
#[derive(Debug, Clone, Copy)]
struct Csc {
    first_turn_rad: f64,
    straight_m: f64,
    second_turn_rad: f64,
    length_m: f64,
}

/// Find the shortest of the four turn-straight-turn paths from `start` to `target`.
fn shortest_csc(start: &Pose, target: &Pose, radius_m: f64) -> Option<Csc> {
    const SIDES: [f64; 2] = [1.0, -1.0];

    let mut best: Option<Csc> = None;

    for &s1 in SIDES.iter() {
        for &s2 in SIDES.iter() {
            if let Some(c) = csc(start, target, radius_m, s1, s2) {
                if best.map_or(true, |b| c.length_m < b.length_m) {
                    best = Some(c);
                }
            }
        }
    }

    best
}

/// Turn-straight-turn path turning to side `s1` then `s2` (`1.0` is left, `-1.0` right).
fn csc(start: &Pose, target: &Pose, radius_m: f64, s1: f64, s2: f64) -> Option<Csc> {
    // Turn circle centres
    let c1 = start.position_m + start.left_dir() * s1 * radius_m;
    let c2 = target.position_m + target.left_dir() * s2 * radius_m;

    let v: Vector2<f64> = c2 - c1;
    let dist_m = v.norm();
    let k = s2 - s1;

    // Heading of the straight segment and its length
    let (line_heading_rad, straight_m) = if k == 0.0 {
        if dist_m < SAME_CIRCLE_TOL_M {
            // Both turns are on the same circle
            (start.heading_rad, 0.0)
        } else {
            (v.y.atan2(v.x), dist_m)
        }
    } else {
        // Inner tangent, the circles must not overlap
        if dist_m < 2.0 * radius_m {
            return None;
        }
        let straight_m = (dist_m.powi(2) - 4.0 * radius_m.powi(2)).max(0.0).sqrt();
        (
            v.y.atan2(v.x) - (k * radius_m).atan2(straight_m),
            straight_m,
        )
    };

    let first_turn_rad = s1 * wrap_2pi(s1 * (line_heading_rad - start.heading_rad), ANGLE_TOL_RAD);
    let second_turn_rad =
        s2 * wrap_2pi(s2 * (target.heading_rad - line_heading_rad), ANGLE_TOL_RAD);

    Some(Csc {
        first_turn_rad,
        straight_m,
        second_turn_rad,
        length_m: radius_m * (first_turn_rad.abs() + second_turn_rad.abs()) + straight_m,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, PI};

    fn planner() -> MnvrPlanner {
        MnvrPlanner::new(MnvrPlannerParams {
            min_turn_radius_m: 0.05,
            settle_threshold_m: 0.01,
            min_move_dist_m: 0.03,
        })
    }

    fn cruise(vel_ms: f64, acc_mss: f64) -> MnvrLimits {
        MnvrLimits {
            vel_ms,
            acc_mss,
            init_vel_ms: vel_ms,
            final_vel_ms: vel_ms,
        }
    }

    fn assert_pose_near(a: &Pose, b: &Pose, tol: f64) {
        assert!(
            (a.position_m - b.position_m).norm() < tol,
            "Positions differ: {:?} vs {:?}",
            a,
            b
        );
        assert!(
            util::maths::get_ang_dist_2pi(
                util::maths::rem_euclid(a.heading_rad, 2.0 * PI),
                util::maths::rem_euclid(b.heading_rad, 2.0 * PI)
            )
            .abs()
                < tol,
            "Headings differ: {:?} vs {:?}",
            a,
            b
        );
    }

    #[test]
    fn test_zero_displacement() {
        let p = planner();
        let pose = Pose::new(0.4, -0.2, 1.0);

        let plan = p.plan(&pose, &pose, &cruise(0.3, 1.0)).unwrap();

        assert!(plan.movement_distance() < 1e-9);
        assert!(!p.is_worth_executing(&plan));
    }

    #[test]
    fn test_small_move_below_threshold() {
        let p = planner();

        let plan = p
            .plan(&Pose::default(), &Pose::new(0.02, 0.0, 0.0), &MnvrLimits {
                vel_ms: 0.3,
                acc_mss: 1.0,
                init_vel_ms: 0.0,
                final_vel_ms: 0.0,
            })
            .unwrap();

        // No settle segments are added to a manoeuvre which will not be driven
        assert_eq!(plan.init_settle_m, 0.0);
        assert_eq!(plan.final_settle_m, 0.0);
        assert!(!p.is_worth_executing(&plan));
    }

    #[test]
    fn test_straight_ahead() {
        let p = planner();

        let plan = p.plan(&Pose::default(), &Pose::new(1.0, 0.0, 0.0), &cruise(0.3, 1.0)).unwrap();

        assert!(plan.first_turn_rad.abs() < 1e-9);
        assert!(plan.second_turn_rad.abs() < 1e-9);
        assert!((plan.straight_m - 1.0).abs() < 1e-9);

        let script = plan.to_script(1);
        let lines: Vec<String> = script.lines().iter().map(|l| l.to_string()).collect();
        assert_eq!(lines, vec!["vel=0.3:dist=1", "vel=0,event=1:dist=1"]);
    }

    #[test]
    fn test_quarter_turn() {
        let p = planner();
        let limits = cruise(0.3, 1.0);
        let r = 0.3f64.powi(2) / 1.0;

        let plan = p.plan(&Pose::default(), &Pose::new(r, r, FRAC_PI_2), &limits).unwrap();

        assert!((plan.turn_radius_m - r).abs() < 1e-12);
        assert!((plan.first_turn_rad + plan.second_turn_rad - FRAC_PI_2).abs() < 1e-9);
        assert!(plan.straight_m < 1e-9);
        assert!((plan.movement_distance() - r * FRAC_PI_2).abs() < 1e-9);
    }

    #[test]
    fn test_radius_floor() {
        let p = planner();

        let plan = p
            .plan(&Pose::default(), &Pose::new(0.0, 1.0, PI), &cruise(0.1, 1.0))
            .unwrap();

        assert_eq!(plan.turn_radius_m, 0.05);
    }

    #[test]
    fn test_end_pose_reaches_target() {
        let p = planner();
        let start = Pose::new(0.1, -0.2, 0.3);

        let targets = [
            Pose::new(1.2, -0.4, 2.0),
            Pose::new(-0.8, 0.5, -1.0),
            Pose::new(0.0, 1.5, PI),
            Pose::new(0.6, 0.1, -2.5),
            Pose::new(0.3, -1.0, 0.0),
        ];

        for target in targets.iter() {
            let plan = p
                .plan(&start, target, &MnvrLimits {
                    vel_ms: 0.3,
                    acc_mss: 1.0,
                    init_vel_ms: 0.0,
                    final_vel_ms: 0.0,
                })
                .unwrap();

            assert!(plan.init_settle_m > 0.0);
            assert!(plan.final_settle_m > 0.0);
            assert_pose_near(&plan.end_pose(&start), target, 1e-6);
        }
    }

    #[test]
    fn test_settle_lines() {
        let p = planner();

        let plan = p
            .plan(&Pose::default(), &Pose::new(1.0, 0.5, 0.0), &MnvrLimits {
                vel_ms: 0.4,
                acc_mss: 2.0,
                init_vel_ms: 0.0,
                final_vel_ms: 0.0,
            })
            .unwrap();

        // (0.4^2 - 0) / (2 * 2)
        assert!((plan.init_settle_m - 0.04).abs() < 1e-12);
        assert!((plan.final_settle_m - 0.04).abs() < 1e-12);

        let script = plan.to_script(2);
        let lines: Vec<String> = script.lines().iter().map(|l| l.to_string()).collect();

        assert_eq!(lines.first().unwrap(), "vel=0.4,acc=2.0:dist=0.04");
        assert!(lines[1].starts_with("vel=0.4,tr=0.080:turn="));
        // Slowing from 0.4 to 0 m/s at 2 m/s^2 takes 0.2 s
        assert_eq!(lines[lines.len() - 2], "vel=0,acc=2.0:time=0.2");
        assert_eq!(lines.last().unwrap(), "vel=0,event=2:dist=1");
        assert_eq!(script.completion_event(), Some(2));

        // Marker approach limits
        let plan = p
            .plan(&Pose::default(), &Pose::new(0.8, 0.3, 0.4), &MnvrLimits {
                vel_ms: 0.3,
                acc_mss: 1.0,
                init_vel_ms: 0.0,
                final_vel_ms: 0.0,
            })
            .unwrap();
        let script = plan.to_script(2);
        let lines: Vec<String> = script.lines().iter().map(|l| l.to_string()).collect();

        assert!((plan.final_settle_m - 0.045).abs() < 1e-12);
        assert_eq!(lines[lines.len() - 2], "vel=0,acc=1.0:time=0.3");
    }

    #[test]
    fn test_infeasible_inputs() {
        let p = planner();
        let start = Pose::default();
        let target = Pose::new(1.0, 0.0, 0.0);

        assert_eq!(
            p.plan(&start, &target, &cruise(0.0, 1.0)),
            Err(PlanError::InvalidVelocity(0.0))
        );
        assert_eq!(
            p.plan(&start, &target, &cruise(0.3, -1.0)),
            Err(PlanError::InvalidAcceleration(-1.0))
        );
        assert_eq!(
            p.plan(&start, &Pose::new(std::f64::NAN, 0.0, 0.0), &cruise(0.3, 1.0)),
            Err(PlanError::NonFiniteInput)
        );
    }
}
