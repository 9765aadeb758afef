//! End-to-end tests of the bundle adjuster on synthetic scenes.
//!
//! Every scene is generated from a seeded `StdRng`: six cameras on a short baseline
//! looking down +z at forty points between 4 and 7 m. Cameras 0 and 1 are fixed,
//! which pins rotation, translation and scale. Free cameras and all points start
//! from perturbed values.
//!
//! # Test Coverage
//!
//! - Noiseless recovery (pinhole and FOV), for every robust kernel
//! - Gauge: fixed cameras never move
//! - Outlier rejection and sticky classification
//! - Determinism, cancellation, iteration limit
//! - Damping adaptation through rejected and accepted trials
//! - Construction errors: invalid references, duplicates, missing gauge, frozen topology

use bundle_adjust::core::CoreError;
use bundle_adjust::manifold::{LieGroup, SE3Tangent};
use bundle_adjust::optimizer::OptimizationStatus;
use bundle_adjust::{
    Bundle, BundleConfig, BundleError, CancellationToken, FovModel, PinholeModel,
    ProjectionModel, RobustKernel, SE3,
};
use nalgebra::{Matrix2, UnitQuaternion, Vector2, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

type TestResult = Result<(), Box<dyn std::error::Error>>;

const NUM_CAMERAS: usize = 6;
const NUM_FIXED: usize = 2;
const NUM_POINTS: usize = 40;

/// Ground truth of a generated scene.
struct Scene {
    poses: Vec<SE3>,
    points: Vec<Vector3<f64>>,
}

/// Options of the generator.
#[derive(Clone, Copy)]
struct SceneOptions {
    seed: u64,
    /// Uniform pixel noise half-width
    pixel_noise: f64,
    /// Pixel offset added to one measurement: (camera, point, offset)
    gross_error: Option<(usize, usize, f64)>,
}

impl Default for SceneOptions {
    fn default() -> Self {
        SceneOptions {
            seed: 42,
            pixel_noise: 0.0,
            gross_error: None,
        }
    }
}

fn pinhole() -> PinholeModel {
    PinholeModel::new(500.0, 500.0, 320.0, 240.0)
}

fn pixel(model: &dyn ProjectionModel, pose: &SE3, point: &Vector3<f64>) -> Vector2<f64> {
    let xc = pose.act(point);
    model.project(&Vector2::new(xc.x / xc.z, xc.y / xc.z))
}

fn ground_truth(rng: &mut StdRng) -> Scene {
    let poses = (0..NUM_CAMERAS)
        .map(|i| {
            let k = i as f64;
            let center = Vector3::new(0.3 * k - 0.75, 0.05 * (i % 2) as f64, 0.02 * k);
            let rotation = UnitQuaternion::from_euler_angles(0.01 * k, -0.02 * k + 0.03, 0.005 * k);
            // camera-from-world: Xc = R (X - c)
            SE3::new(-(rotation * center), rotation)
        })
        .collect();
    let points = (0..NUM_POINTS)
        .map(|_| {
            Vector3::new(
                rng.random_range(-1.5..1.5),
                rng.random_range(-1.0..1.0),
                rng.random_range(4.0..7.0),
            )
        })
        .collect();
    Scene { poses, points }
}

/// Build a bundle over a perturbed copy of a generated scene.
fn build(
    model: impl ProjectionModel + Clone + 'static,
    config: BundleConfig,
    options: SceneOptions,
) -> Result<(Bundle, Scene), Box<dyn std::error::Error>> {
    let mut rng = StdRng::seed_from_u64(options.seed);
    let scene = ground_truth(&mut rng);
    let mut bundle = Bundle::with_config(model.clone(), config);

    for (i, pose) in scene.poses.iter().enumerate() {
        let fixed = i < NUM_FIXED;
        let start = if fixed {
            pose.clone()
        } else {
            pose.left_plus(&SE3Tangent::sample(&mut rng, 0.05, 0.02))
        };
        bundle.add_camera(start, fixed)?;
    }
    for point in &scene.points {
        let offset = Vector3::new(
            rng.random_range(-0.05..0.05),
            rng.random_range(-0.05..0.05),
            rng.random_range(-0.05..0.05),
        );
        bundle.add_point(point + offset)?;
    }
    for (c, pose) in scene.poses.iter().enumerate() {
        for (p, point) in scene.points.iter().enumerate() {
            let mut observed = pixel(&model, pose, point);
            if options.pixel_noise > 0.0 {
                let noise = options.pixel_noise;
                observed += Vector2::new(
                    rng.random_range(-noise..noise),
                    rng.random_range(-noise..noise),
                );
            }
            if let Some((gc, gp, offset)) = options.gross_error
                && gc == c
                && gp == p
            {
                observed.x += offset;
            }
            bundle.add_measurement(c, p, observed, 1.0)?;
        }
    }
    Ok((bundle, scene))
}

fn assert_recovered(bundle: &Bundle, scene: &Scene, tolerance: f64) -> TestResult {
    for (i, pose) in scene.poses.iter().enumerate() {
        let estimate = bundle.get_camera(i)?;
        assert!(
            estimate.is_approx(pose, tolerance),
            "camera {i}: {estimate} vs {pose}"
        );
    }
    for (i, point) in scene.points.iter().enumerate() {
        let estimate = bundle.get_point(i)?;
        assert!(
            (estimate - point).norm() < tolerance,
            "point {i}: {estimate:?} vs {point:?}"
        );
    }
    Ok(())
}

#[test]
fn test_noiseless_scene_is_recovered() -> TestResult {
    let (mut bundle, scene) = build(pinhole(), BundleConfig::new(), SceneOptions::default())?;
    let accepted = bundle.compute(&CancellationToken::new())?;

    assert!(accepted > 0);
    assert!(bundle.converged());
    assert!(!bundle.hit_max_iterations());
    assert_recovered(&bundle, &scene, 1e-6)?;
    assert!(bundle.get_outlier_measurements().is_empty());
    assert!(bundle.get_outliers().is_empty());
    Ok(())
}

#[test]
fn test_every_kernel_recovers_noiseless_scene() -> TestResult {
    for kernel in [
        RobustKernel::Tukey,
        RobustKernel::Cauchy,
        RobustKernel::Huber,
        RobustKernel::LeastSquares,
    ] {
        let config = BundleConfig::new().with_robust_kernel(kernel);
        let (mut bundle, scene) = build(pinhole(), config, SceneOptions::default())?;
        bundle.compute(&CancellationToken::new())?;
        assert!(bundle.converged(), "{kernel} did not converge");
        assert_recovered(&bundle, &scene, 1e-5)?;
    }
    Ok(())
}

#[test]
fn test_fov_scene_is_recovered() -> TestResult {
    let model = FovModel::new(400.0, 400.0, 320.0, 240.0, 0.9);
    let options = SceneOptions {
        seed: 7,
        ..SceneOptions::default()
    };
    let (mut bundle, scene) = build(model, BundleConfig::new(), options)?;
    bundle.compute(&CancellationToken::new())?;
    assert!(bundle.converged());
    assert_recovered(&bundle, &scene, 1e-6)?;
    Ok(())
}

#[test]
fn test_fixed_cameras_never_move() -> TestResult {
    let options = SceneOptions {
        pixel_noise: 0.5,
        ..SceneOptions::default()
    };
    let (mut bundle, scene) = build(pinhole(), BundleConfig::new(), options)?;
    bundle.compute(&CancellationToken::new())?;
    for i in 0..NUM_FIXED {
        assert_eq!(bundle.get_camera(i)?, scene.poses[i]);
    }
    Ok(())
}

#[test]
fn test_accepted_steps_lower_the_cost() -> TestResult {
    let options = SceneOptions {
        pixel_noise: 0.5,
        ..SceneOptions::default()
    };
    let (mut bundle, _) = build(pinhole(), BundleConfig::new(), options)?;
    bundle.compute(&CancellationToken::new())?;
    let summary = bundle.summary().ok_or("missing summary")?;

    assert!(summary.accepted_steps > 0);
    for stats in &summary.iteration_history {
        if stats.accepted {
            assert!(stats.trial_cost < stats.cost);
        }
    }
    Ok(())
}

#[test]
fn test_gross_error_is_rejected() -> TestResult {
    let options = SceneOptions {
        pixel_noise: 0.5,
        gross_error: Some((3, 5, 100.0)),
        ..SceneOptions::default()
    };
    let (mut bundle, scene) = build(pinhole(), BundleConfig::new(), options)?;
    bundle.compute(&CancellationToken::new())?;

    assert_eq!(bundle.get_outlier_measurements(), vec![(3, 5)]);
    // One bad measurement out of six does not make the point an outlier
    assert!(bundle.get_outliers().is_empty());
    for i in NUM_FIXED..NUM_CAMERAS {
        let error = (bundle.get_camera(i)?.translation() - scene.poses[i].translation()).norm();
        assert!(error < 0.02, "camera {i} off by {error}");
    }
    Ok(())
}

#[test]
fn test_outlier_flags_are_sticky() -> TestResult {
    let options = SceneOptions {
        pixel_noise: 0.5,
        gross_error: Some((4, 11, -80.0)),
        ..SceneOptions::default()
    };
    let (mut bundle, _) = build(pinhole(), BundleConfig::new(), options)?;
    let token = CancellationToken::new();
    bundle.compute(&token)?;
    assert_eq!(bundle.get_outlier_measurements(), vec![(4, 11)]);

    bundle.compute(&token)?;
    assert_eq!(bundle.get_outlier_measurements(), vec![(4, 11)]);
    let report = bundle.outlier_report().ok_or("missing report")?;
    assert_eq!(report.new_bad_measurements, 0);
    Ok(())
}

#[test]
fn test_identical_inputs_give_identical_results() -> TestResult {
    let options = SceneOptions {
        seed: 3,
        pixel_noise: 0.5,
        gross_error: Some((2, 8, 60.0)),
    };
    let (mut first, _) = build(pinhole(), BundleConfig::new(), options)?;
    let (mut second, _) = build(pinhole(), BundleConfig::new(), options)?;
    let token = CancellationToken::new();
    assert_eq!(first.compute(&token)?, second.compute(&token)?);

    for i in 0..NUM_CAMERAS {
        assert_eq!(first.get_camera(i)?, second.get_camera(i)?);
    }
    for i in 0..NUM_POINTS {
        assert_eq!(first.get_point(i)?, second.get_point(i)?);
    }
    assert_eq!(first.get_outlier_measurements(), second.get_outlier_measurements());
    Ok(())
}

#[test]
fn test_cancelled_before_start_leaves_state_untouched() -> TestResult {
    let (mut bundle, _) = build(pinhole(), BundleConfig::new(), SceneOptions::default())?;
    let before: Vec<SE3> = (0..NUM_CAMERAS)
        .map(|i| bundle.get_camera(i))
        .collect::<Result<_, _>>()?;

    let token = CancellationToken::new();
    token.cancel();
    assert_eq!(bundle.compute(&token)?, 0);
    assert!(!bundle.converged());
    let summary = bundle.summary().ok_or("missing summary")?;
    assert_eq!(summary.status, OptimizationStatus::UserTerminated);
    for (i, pose) in before.iter().enumerate() {
        assert_eq!(&bundle.get_camera(i)?, pose);
    }

    // The token can be reset and the solve resumed
    token.reset();
    assert!(bundle.compute(&token)? > 0);
    assert!(bundle.converged());
    Ok(())
}

#[test]
fn test_iteration_limit_is_reported() -> TestResult {
    let config = BundleConfig::new().with_max_iterations(1);
    let (mut bundle, _) = build(pinhole(), config, SceneOptions::default())?;
    bundle.compute(&CancellationToken::new())?;
    assert!(bundle.hit_max_iterations());
    assert!(!bundle.converged());
    Ok(())
}

/// Pinhole camera reporting a tenth of its true Jacobian. Lightly damped steps
/// overshoot by an order of magnitude and are rejected until λ grows.
#[derive(Clone)]
struct ShallowJacobian(PinholeModel);

impl ProjectionModel for ShallowJacobian {
    fn project(&self, image_plane: &Vector2<f64>) -> Vector2<f64> {
        self.0.project(image_plane)
    }

    fn derivatives(&self, image_plane: &Vector2<f64>) -> Matrix2<f64> {
        0.1 * self.0.derivatives(image_plane)
    }
}

#[test]
fn test_damping_follows_acceptance() -> TestResult {
    let config = BundleConfig::new()
        .with_robust_kernel(RobustKernel::LeastSquares)
        .with_max_iterations(6);
    let (mut bundle, _) = build(ShallowJacobian(pinhole()), config, SceneOptions::default())?;
    bundle.compute(&CancellationToken::new())?;
    let summary = bundle.summary().ok_or("missing summary")?;
    let history = &summary.iteration_history;

    assert!(!history[0].accepted);
    assert!(summary.rejected_steps > 0);
    assert!(summary.accepted_steps > 0);
    let mut saw_reject_then_accept = false;
    for pair in history.windows(2) {
        let (previous, next) = (&pair[0], &pair[1]);
        if previous.accepted {
            let expected = (previous.damping * 0.3).max(1e-12);
            assert!((next.damping - expected).abs() <= 1e-12 * expected);
        } else {
            assert!(next.damping >= 2.0 * previous.damping);
            saw_reject_then_accept |= next.accepted;
        }
    }
    assert!(saw_reject_then_accept);
    Ok(())
}

#[test]
fn test_rejected_steps_leave_state_untouched() -> TestResult {
    let config = BundleConfig::new()
        .with_robust_kernel(RobustKernel::LeastSquares)
        .with_max_iterations(1)
        .with_max_step_retries(3);
    let (mut bundle, _) = build(ShallowJacobian(pinhole()), config, SceneOptions::default())?;
    let cameras = (0..NUM_CAMERAS)
        .map(|c| bundle.get_camera(c))
        .collect::<Result<Vec<_>, _>>()?;
    let points = (0..NUM_POINTS)
        .map(|p| bundle.get_point(p))
        .collect::<Result<Vec<_>, _>>()?;

    let accepted = bundle.compute(&CancellationToken::new())?;
    let summary = bundle.summary().ok_or("missing summary")?;
    assert_eq!(accepted, 0);
    assert_eq!(summary.rejected_steps, 3);
    assert!(bundle.hit_max_iterations());
    for (c, pose) in cameras.iter().enumerate() {
        assert_eq!(&bundle.get_camera(c)?, pose);
    }
    for (p, point) in points.iter().enumerate() {
        assert_eq!(&bundle.get_point(p)?, point);
    }
    Ok(())
}

#[test]
fn test_invalid_references_are_rejected() -> TestResult {
    let mut bundle = Bundle::new(pinhole());
    let camera = bundle.add_camera(SE3::identity(), true)?;
    let point = bundle.add_point(Vector3::new(0.0, 0.0, 5.0))?;

    let result = bundle.add_measurement(camera + 1, point, Vector2::new(320.0, 240.0), 1.0);
    assert!(matches!(
        result,
        Err(BundleError::Core(CoreError::InvalidCameraIndex { index: 1, count: 1 }))
    ));
    let result = bundle.add_measurement(camera, point + 4, Vector2::new(320.0, 240.0), 1.0);
    assert!(matches!(
        result,
        Err(BundleError::Core(CoreError::InvalidPointIndex { index: 4, count: 1 }))
    ));

    bundle.add_measurement(camera, point, Vector2::new(320.0, 240.0), 1.0)?;
    let result = bundle.add_measurement(camera, point, Vector2::new(321.0, 240.0), 1.0);
    assert!(matches!(
        result,
        Err(BundleError::Core(CoreError::DuplicateMeasurement { camera: 0, point: 0 }))
    ));
    assert_eq!(bundle.problem().num_measurements(), 1);
    Ok(())
}

#[test]
fn test_missing_gauge_is_rejected() -> TestResult {
    let mut bundle = Bundle::new(pinhole());
    for i in 0..3 {
        bundle.add_camera(
            SE3::new(Vector3::new(-0.2 * i as f64, 0.0, 0.0), UnitQuaternion::identity()),
            false,
        )?;
    }
    let result = bundle.compute(&CancellationToken::new());
    assert!(matches!(
        result,
        Err(BundleError::Core(CoreError::InvalidConstraint(_)))
    ));
    Ok(())
}

#[test]
fn test_topology_is_frozen_by_compute() -> TestResult {
    let (mut bundle, _) = build(pinhole(), BundleConfig::new(), SceneOptions::default())?;
    bundle.compute(&CancellationToken::new())?;

    assert!(matches!(
        bundle.add_camera(SE3::identity(), true),
        Err(BundleError::Core(CoreError::TopologyFrozen(_)))
    ));
    assert!(matches!(
        bundle.add_measurement(0, 0, Vector2::new(1.0, 1.0), 1.0),
        Err(BundleError::Core(CoreError::TopologyFrozen(_)))
    ));
    Ok(())
}
