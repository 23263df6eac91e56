//! # Trajectory
//!
//! This module defines the discretized trajectory exchanged with the smoother, both as the
//! reference it consumes and the optimized trajectory it produces.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::{Deserialize, Serialize};

// Internal
use util::maths::{lerp, norm, normalise_angle};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Two points closer in time than this are treated as coincident when interpolating.
const TIME_EPSILON_S: f64 = 1e-10;

/// Most points a resampled trajectory may hold.
pub const MAX_RESAMPLED_POINTS: usize = 1_000_000;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The geometric part of a trajectory point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathPoint {
    /// Position along the X axis.
    ///
    /// Units: meters
    pub x: f64,

    /// Position along the Y axis.
    ///
    /// Units: meters
    pub y: f64,

    /// Heading, angle to the +ve X axis.
    ///
    /// Units: radians
    pub theta: f64,

    /// Curvature.
    ///
    /// Units: 1/meters
    pub kappa: f64,

    /// Rate of change of curvature with time.
    ///
    /// Units: 1/(meters seconds)
    pub dkappa: f64,

    /// Accumulated arc length from the start of the trajectory.
    ///
    /// Units: meters
    pub s: f64,
}

/// A single point of a trajectory, the path point plus its kinematics in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrajectoryPoint {
    pub path_point: PathPoint,

    /// Speed.
    ///
    /// Units: meters/second
    pub v: f64,

    /// Acceleration.
    ///
    /// Units: meters/second^2
    pub a: f64,

    /// Jerk.
    ///
    /// Units: meters/second^3
    pub da: f64,

    /// Time since the start of the trajectory.
    ///
    /// Units: seconds
    pub relative_time: f64,
}

/// An ordered sequence of trajectory points.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscretizedTrajectory {
    pub points: Vec<TrajectoryPoint>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum TrajectoryError {
    #[error("The trajectory contains no points")]
    EmptyTrajectory,

    #[error("Expected a positive, finite time step, found {0}")]
    InvalidTimeStep(f64),

    #[error("A time step of {0} s would resample the trajectory into too many points")]
    TooManyPoints(f64),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl TrajectoryPoint {
    /// Linearly interpolate between two points at the given relative time.
    ///
    /// Heading is interpolated along the shortest arc between the two headings. If the points
    /// share the same time `p0` is returned.
    pub fn interpolate(p0: &Self, p1: &Self, relative_time: f64) -> Self {
        let dt = p1.relative_time - p0.relative_time;
        if dt.abs() < TIME_EPSILON_S {
            return *p0;
        }

        let r = (relative_time - p0.relative_time) / dt;
        let (a, b) = (&p0.path_point, &p1.path_point);

        TrajectoryPoint {
            path_point: PathPoint {
                x: lerp(a.x, b.x, r),
                y: lerp(a.y, b.y, r),
                theta: normalise_angle(a.theta + normalise_angle(b.theta - a.theta) * r),
                kappa: lerp(a.kappa, b.kappa, r),
                dkappa: lerp(a.dkappa, b.dkappa, r),
                s: lerp(a.s, b.s, r),
            },
            v: lerp(p0.v, p1.v, r),
            a: lerp(p0.a, p1.a, r),
            da: lerp(p0.da, p1.da, r),
            relative_time,
        }
    }
}

impl DiscretizedTrajectory {
    /// Create a new empty trajectory
    pub fn new() -> Self {
        Self { points: Vec::new() }
    }

    /// Get the number of points in the trajectory
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Append a point to the end of the trajectory
    pub fn push(&mut self, point: TrajectoryPoint) {
        self.points.push(point);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TrajectoryPoint> {
        self.points.iter()
    }

    pub fn front(&self) -> Option<&TrajectoryPoint> {
        self.points.first()
    }

    pub fn back(&self) -> Option<&TrajectoryPoint> {
        self.points.last()
    }

    /// Return the planar length of the trajectory in meters, the sum of the distances between
    /// consecutive points.
    pub fn length(&self) -> f64 {
        self.points
            .windows(2)
            .map(|p| {
                norm(
                    &[p[0].path_point.x, p[0].path_point.y],
                    &[p[1].path_point.x, p[1].path_point.y],
                )
                .unwrap_or(0.0)
            })
            .sum()
    }

    /// Evaluate the trajectory at the given relative time.
    ///
    /// Times before the start of the trajectory give the first point, times after the end the
    /// last point. Otherwise the two points bracketing the time are linearly interpolated. Returns
    /// `None` if the trajectory is empty.
    pub fn evaluate(&self, relative_time: f64) -> Option<TrajectoryPoint> {
        let first = self.points.first()?;

        // Index of the first point at or after the requested time
        let idx = self
            .points
            .partition_point(|p| p.relative_time < relative_time);

        if idx == 0 {
            return Some(*first);
        }
        if idx == self.points.len() {
            return self.points.last().copied();
        }

        Some(TrajectoryPoint::interpolate(
            &self.points[idx - 1],
            &self.points[idx],
            relative_time,
        ))
    }

    /// Resample the trajectory onto a fixed time grid.
    ///
    /// The output holds one point at every multiple of `delta_t_s` which lies within the time
    /// span of this trajectory. Time steps which would give more than [`MAX_RESAMPLED_POINTS`]
    /// points are rejected.
    pub fn resample_by_time(&self, delta_t_s: f64) -> Result<Self, TrajectoryError> {
        if !(delta_t_s.is_finite() && delta_t_s > 0.0) {
            return Err(TrajectoryError::InvalidTimeStep(delta_t_s));
        }

        let (front, back) = match (self.points.first(), self.points.last()) {
            (Some(f), Some(b)) => (f, b),
            _ => return Err(TrajectoryError::EmptyTrajectory),
        };

        let low = (front.relative_time / delta_t_s).ceil();
        let high = (back.relative_time / delta_t_s).floor();

        // Checked in floating point so the casts below cannot saturate
        let count = high - low + 1.0;
        if !(count.is_finite() && low.abs() < i64::MAX as f64 && high.abs() < i64::MAX as f64)
            || count > MAX_RESAMPLED_POINTS as f64
        {
            return Err(TrajectoryError::TooManyPoints(delta_t_s));
        }

        Ok((low as i64..=high as i64)
            .filter_map(|i| self.evaluate(i as f64 * delta_t_s))
            .collect::<Vec<_>>()
            .into())
    }
}

impl From<Vec<TrajectoryPoint>> for DiscretizedTrajectory {
    fn from(points: Vec<TrajectoryPoint>) -> Self {
        Self { points }
    }
}
