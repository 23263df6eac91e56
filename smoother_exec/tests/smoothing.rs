//! End to end smoothing tests

use approx::assert_abs_diff_eq;
use std::io::Write;

use smoother_lib::{
    smoother::{
        model::{self, Input, State},
        Algorithm, CostParams, Params, ProblemError, SmootherStatus, TrajSmoother,
    },
    trajectory::{DiscretizedTrajectory, PathPoint, TrajectoryPoint},
};

// ---------------------------------------------------------------------------
// HELPERS
// ---------------------------------------------------------------------------

fn point(t: f64, x: f64, v: f64) -> TrajectoryPoint {
    TrajectoryPoint {
        path_point: PathPoint {
            x,
            s: x,
            ..PathPoint::default()
        },
        v,
        relative_time: t,
        ..TrajectoryPoint::default()
    }
}

fn to_point(t: f64, state: &State, input: &Input) -> TrajectoryPoint {
    TrajectoryPoint {
        path_point: PathPoint {
            x: state[0],
            y: state[1],
            theta: state[2],
            kappa: state[5],
            dkappa: input[1],
            s: 0.0,
        },
        v: state[3],
        a: state[4],
        da: input[0],
        relative_time: t,
    }
}

/// A reference produced by running the model itself, so it can be tracked exactly.
fn simulated_reference(num_points: usize, h: f64) -> DiscretizedTrajectory {
    let mut state = State::new(0.0, 0.0, 0.2, 3.0, 0.0, 0.0);
    let mut points = Vec::new();

    for i in 0..num_points {
        let input = Input::new(0.8 * (i as f64 * 0.9).sin(), 0.1 * (i as f64 * 0.5).cos());
        points.push(to_point(i as f64 * h, &state, &input));
        state = model::step(&state, &input, h);
    }

    DiscretizedTrajectory::from(points)
}

fn tracking_params() -> Params {
    Params {
        subsampling: 0,
        cost: CostParams {
            cost_acceleration: 0.0,
            cost_curvature: 0.0,
            cost_acceleration_change: 0.0,
            cost_curvature_change: 0.0,
            ..CostParams::default()
        },
        ..Params::default()
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[test]
fn test_round_trip_from_exact_guess() {
    let reference = simulated_reference(8, 0.5);
    let mut smoother = TrajSmoother::new(tracking_params());

    smoother
        .initialise_problem(0, &reference, &reference.points[0])
        .unwrap();
    let status = smoother.optimize();

    assert!(status.is_success(), "status: {:?}", status);
    assert!(smoother.report().final_cost < 1e-12);

    let optimized = smoother.get_optimized_trajectory().unwrap();
    assert_eq!(optimized.len(), reference.len());

    for (opt, reference) in optimized.iter().zip(reference.iter()) {
        assert_abs_diff_eq!(opt.path_point.x, reference.path_point.x, epsilon = 1e-9);
        assert_abs_diff_eq!(opt.path_point.y, reference.path_point.y, epsilon = 1e-9);
        assert_abs_diff_eq!(opt.path_point.theta, reference.path_point.theta, epsilon = 1e-9);
        assert_abs_diff_eq!(opt.v, reference.v, epsilon = 1e-9);
        assert_abs_diff_eq!(opt.relative_time, reference.relative_time, epsilon = 1e-12);
    }
}

#[test]
fn test_round_trip_recovers_reference() {
    // Drop the recorded inputs so the solver starts from zero jerk and curvature rate
    let mut reference = simulated_reference(12, 0.5);
    for p in reference.points.iter_mut() {
        p.da = 0.0;
        p.path_point.dkappa = 0.0;
    }

    let mut params = tracking_params();
    params.solver.algorithm = Algorithm::Lbfgs;
    params.solver.x_tol_rel = 1e-12;
    params.solver.x_tol_abs = 0.0;
    params.solver.stop_val = Some(1e-12);
    params.solver.max_num_evals = 5000;

    let mut smoother = TrajSmoother::new(params);
    smoother
        .initialise_problem(0, &reference, &reference.points[0])
        .unwrap();
    assert!(smoother.problem().inputs().iter().all(|u| *u == 0.0));

    let status = smoother.optimize();
    assert!(status.is_success(), "status: {:?}", status);

    let report = smoother.report();
    assert!(report.final_cost < 1e-8, "final cost {:e}", report.final_cost);
    assert!(report.num_evals <= 5000);

    let optimized = smoother.get_optimized_trajectory().unwrap();
    assert_eq!(optimized.len(), reference.len());

    for (opt, reference) in optimized.iter().zip(reference.iter()) {
        assert_abs_diff_eq!(opt.path_point.x, reference.path_point.x, epsilon = 1e-4);
        assert_abs_diff_eq!(opt.path_point.y, reference.path_point.y, epsilon = 1e-4);
        assert_abs_diff_eq!(opt.path_point.theta, reference.path_point.theta, epsilon = 1e-4);
        assert_abs_diff_eq!(opt.v, reference.v, epsilon = 1e-4);
    }
}

#[test]
fn test_single_point_not_ready() {
    let reference = DiscretizedTrajectory::from(vec![point(0.0, 0.0, 1.0)]);
    let mut smoother = TrajSmoother::new(Params::default());

    assert!(smoother
        .initialise_problem(2, &reference, &reference.points[0])
        .is_ok());
    assert!(!smoother.is_ready());
    assert_eq!(smoother.optimize(), SmootherStatus::NotInitialised);
    assert!(smoother.get_optimized_trajectory().is_err());
}

#[test]
fn test_two_points_no_subsampling() {
    let reference = DiscretizedTrajectory::from(vec![point(0.0, 0.0, 10.0), point(1.0, 10.0, 10.0)]);
    let mut smoother = TrajSmoother::new(Params::default());

    smoother
        .initialise_problem(0, &reference, &reference.points[0])
        .unwrap();
    assert!(smoother.optimize().is_success());

    let optimized = smoother.get_optimized_trajectory().unwrap();
    assert_eq!(optimized.len(), 2);

    let first = optimized.points[0];
    assert_eq!(first.path_point.x, 0.0);
    assert_eq!(first.path_point.y, 0.0);
    assert_eq!(first.path_point.theta, 0.0);
    assert_eq!(first.v, 10.0);
    assert_eq!(first.relative_time, 0.0);

    assert_abs_diff_eq!(optimized.length(), 10.0, epsilon = 1e-9);
    assert_abs_diff_eq!(optimized.points[1].path_point.s, 10.0, epsilon = 1e-9);
    assert_abs_diff_eq!(optimized.points[1].relative_time, 1.0, epsilon = 1e-12);
}

#[test]
fn test_two_points_with_subsampling() {
    let reference = DiscretizedTrajectory::from(vec![point(0.0, 0.0, 0.0), point(1.0, 10.0, 5.0)]);

    for algorithm in [Algorithm::Lbfgs, Algorithm::Slsqp, Algorithm::Mma] {
        let mut params = Params::default();
        params.solver.algorithm = algorithm;
        let mut smoother = TrajSmoother::new(params);

        smoother
            .initialise_problem(1, &reference, &reference.points[0])
            .unwrap();
        assert!(smoother.optimize().is_success());

        let optimized = smoother.get_optimized_trajectory().unwrap();
        assert_eq!(optimized.len(), 3);

        let middle = optimized.points[1];
        assert_abs_diff_eq!(middle.relative_time, 0.5, epsilon = 1e-12);
        assert!(middle.v >= -1e-9 && middle.v <= 5.0, "middle speed {}", middle.v);

        // Inputs stay within the default bounds
        for p in optimized.iter() {
            assert!(p.da.abs() <= 4.0 + 1e-12);
            assert!(p.path_point.dkappa.abs() <= 0.5 + 1e-12);
        }
    }
}

#[test]
fn test_zero_duration_rejected() {
    let reference = DiscretizedTrajectory::from(vec![point(0.0, 0.0, 1.0), point(0.0, 1.0, 1.0)]);
    let mut smoother = TrajSmoother::new(Params::default());

    assert!(matches!(
        smoother.initialise_problem(0, &reference, &reference.points[0]),
        Err(ProblemError::InvalidStepSize(_))
    ));
    assert!(!smoother.is_ready());
    assert_eq!(smoother.optimize(), SmootherStatus::NotInitialised);
}

#[test]
fn test_resample_optimized() {
    let reference = simulated_reference(5, 0.75);
    let mut smoother = TrajSmoother::new(tracking_params());

    smoother
        .initialise_problem(2, &reference, &reference.points[0])
        .unwrap();
    assert!(smoother.optimize().is_success());

    let optimized = smoother.get_optimized_trajectory().unwrap();
    assert_eq!(optimized.len(), 5 + 4 * 2);
    assert_eq!(optimized.back().unwrap().relative_time, 3.0);

    // 0.0 to 3.0 s inclusive
    let resampled = optimized.resample_by_time(0.5).unwrap();
    assert_eq!(resampled.len(), 7);
    assert_eq!(resampled.points[2].relative_time, 1.0);
    assert_abs_diff_eq!(
        resampled.points[2].path_point.x,
        optimized.points[4].path_point.x,
        epsilon = 1e-9
    );
    assert_abs_diff_eq!(resampled.points[2].v, optimized.points[4].v, epsilon = 1e-9);
}

#[test]
fn test_init_from_param_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
        subsampling = 3

        [cost]
        cost_offset_x = 2.0
        upper_bound_jerk = 1.5

        [solver]
        algorithm = "ccsaq"
        max_num_evals = 50
        "#
    )
    .unwrap();

    let smoother = TrajSmoother::init(file.path()).unwrap();
    assert_eq!(smoother.params().subsampling, 3);
    assert_eq!(smoother.params().cost.cost_offset_x, 2.0);
    assert_eq!(smoother.params().cost.upper_bound_jerk, 1.5);
    assert_eq!(smoother.params().cost.lower_bound_jerk, -4.0);
    assert_eq!(smoother.params().solver.algorithm, Algorithm::Ccsaq);

    assert!(TrajSmoother::init("does/not/exist.toml").is_err());
}

#[test]
fn test_shipped_params_and_demo() {
    let root = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("..");

    let mut smoother = TrajSmoother::init(root.join("params/smoother.toml")).unwrap();

    let reference: DiscretizedTrajectory = serde_json::from_reader(
        std::fs::File::open(root.join("demos/reference_trajectory.json")).unwrap(),
    )
    .unwrap();
    assert!(reference.len() > 2);

    let subsampling = smoother.params().subsampling;
    smoother
        .initialise_problem(subsampling, &reference, &reference.points[0])
        .unwrap();
    assert!(smoother.optimize().is_success());

    let optimized = smoother.get_optimized_trajectory().unwrap();
    assert_eq!(
        optimized.len(),
        reference.len() + (reference.len() - 1) * subsampling
    );

    // Output survives a JSON round trip
    let json = serde_json::to_string(&optimized).unwrap();
    let parsed: DiscretizedTrajectory = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.len(), optimized.len());
    for (p, o) in parsed.iter().zip(optimized.iter()) {
        assert_abs_diff_eq!(p.path_point.x, o.path_point.x, epsilon = 1e-9);
        assert_abs_diff_eq!(p.path_point.s, o.path_point.s, epsilon = 1e-9);
        assert_abs_diff_eq!(p.relative_time, o.relative_time, epsilon = 1e-9);
    }
}
