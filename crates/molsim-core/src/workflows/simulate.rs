use crate::core::models::state::{DataMask, StateSnapshot};
use crate::core::models::system::ParticleSystem;
use crate::engine::config::{RunConfig, SimulationConfig};
use crate::engine::context::SimulationContext;
use crate::engine::error::EngineError;
use crate::engine::integrator;
use crate::engine::platform::create_platform;
use crate::engine::progress::{Progress, ProgressReporter};
use nalgebra::Point3;
use std::sync::Arc;
use tracing::{info, instrument};

/// Snapshots recorded during a run, in time order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Trajectory {
    frames: Vec<StateSnapshot>,
}

impl Trajectory {
    pub fn frames(&self) -> &[StateSnapshot] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn last(&self) -> Option<&StateSnapshot> {
        self.frames.last()
    }

    pub fn into_frames(self) -> Vec<StateSnapshot> {
        self.frames
    }
}

/// Runs `context` for `config.steps` steps and records snapshots.
///
/// Emits an optional thermalization `Message`, `RunStart`, then `StepsCompleted` and
/// `FrameRecorded` per block, and finally `RunFinish`.
///
/// A frame is recorded before the first step, after every `config.report_interval` steps
/// and after the last step, each carrying the fields in `config.record`. When
/// `config.initial_temperature` is set, velocities are thermalized with `config.seed`
/// before the first frame.
#[instrument(skip_all, name = "simulate_workflow", fields(steps = config.steps))]
pub fn run(
    context: &mut SimulationContext,
    config: &RunConfig,
    reporter: &ProgressReporter,
) -> Result<Trajectory, EngineError> {
    config.validate()?;
    if let Some(temperature) = config.initial_temperature {
        context.set_velocities_to_temperature(temperature, config.seed)?;
        reporter.report(Progress::Message(format!(
            "Velocities initialized at {temperature} K (seed {}).",
            config.seed
        )));
    }

    info!(
        steps = config.steps,
        interval = config.report_interval,
        particles = context.num_particles(),
        "Starting simulation run."
    );
    reporter.report(Progress::RunStart {
        total_steps: config.steps,
    });

    let mut trajectory = Trajectory::default();
    record_frame(context, config.record, &mut trajectory, reporter)?;

    let mut completed = 0;
    while completed < config.steps {
        let block = config.report_interval.min(config.steps - completed);
        context.step(block)?;
        completed += block;
        reporter.report(Progress::StepsCompleted {
            steps: completed,
            time: context.time(),
        });
        record_frame(context, config.record, &mut trajectory, reporter)?;
    }

    info!(
        frames = trajectory.len(),
        time = context.time(),
        "Simulation run complete."
    );
    reporter.report(Progress::RunFinish);
    Ok(trajectory)
}

/// Builds a context from `config`, places the particles at `positions` and runs it.
///
/// Returns the context along with the trajectory so the run can be continued.
#[instrument(skip_all, name = "simulate_from_config")]
pub fn run_from_config(
    system: Arc<ParticleSystem>,
    positions: &[Point3<f64>],
    config: &SimulationConfig,
    reporter: &ProgressReporter,
) -> Result<(SimulationContext, Trajectory), EngineError> {
    let backend = create_platform(config.platform)?;
    let integrator = integrator::create(&config.integrator)?;
    let mut context = SimulationContext::with_platform(system, integrator, backend)?;
    context.set_positions(positions)?;
    let trajectory = run(&mut context, &config.run, reporter)?;
    Ok((context, trajectory))
}

fn record_frame(
    context: &mut SimulationContext,
    mask: DataMask,
    trajectory: &mut Trajectory,
    reporter: &ProgressReporter,
) -> Result<(), EngineError> {
    trajectory.frames.push(context.state(mask)?);
    reporter.report(Progress::FrameRecorded {
        index: trajectory.frames.len() - 1,
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::forcefield::bonded::HarmonicBondForce;
    use crate::engine::config::{IntegrationScheme, IntegratorConfigBuilder};
    use crate::engine::integrator::VerletIntegrator;
    use crate::engine::platform::PlatformKind;
    use std::sync::Mutex;

    fn diatomic() -> (Arc<ParticleSystem>, Vec<Point3<f64>>) {
        let mut system = ParticleSystem::new();
        system.add_particle(2.0).unwrap();
        system.add_particle(2.0).unwrap();
        let mut bonds = HarmonicBondForce::new();
        bonds.add_bond(0, 1, 1.5, 1.0);
        system.add_force(bonds);
        (
            Arc::new(system),
            vec![Point3::new(-1.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0)],
        )
    }

    #[test]
    fn run_records_initial_interval_and_final_frames() {
        let (system, positions) = diatomic();
        let integrator = Box::new(VerletIntegrator::new(0.01).unwrap());
        let mut context = SimulationContext::new(system, integrator).unwrap();
        context.set_positions(&positions).unwrap();

        let trajectory =
            run(&mut context, &RunConfig::new(25, 10), &ProgressReporter::new()).unwrap();

        let steps: Vec<u64> = trajectory
            .frames()
            .iter()
            .map(|f| f.step_count())
            .collect();
        assert_eq!(steps, vec![0, 10, 20, 25]);
        let last = trajectory.last().unwrap();
        assert!(last.positions().is_some());
        assert!(last.potential_energy().is_some());
        assert!(last.velocities().is_none());
        assert!((last.time() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn run_reports_progress_events() {
        let (system, positions) = diatomic();
        let integrator = Box::new(VerletIntegrator::new(0.01).unwrap());
        let mut context = SimulationContext::new(system, integrator).unwrap();
        context.set_positions(&positions).unwrap();

        let events = Mutex::new(Vec::new());
        let reporter = ProgressReporter::with_callback(Box::new(|event: Progress| {
            events.lock().unwrap().push(event);
        }));
        run(&mut context, &RunConfig::new(4, 2), &reporter).unwrap();
        drop(reporter);

        let events = events.into_inner().unwrap();
        assert_eq!(events.first(), Some(&Progress::RunStart { total_steps: 4 }));
        assert_eq!(events.last(), Some(&Progress::RunFinish));
        let frames = events
            .iter()
            .filter(|e| matches!(e, Progress::FrameRecorded { .. }))
            .count();
        assert_eq!(frames, 3);
    }

    #[test]
    fn run_rejects_a_zero_interval() {
        let (system, _) = diatomic();
        let integrator = Box::new(VerletIntegrator::new(0.01).unwrap());
        let mut context = SimulationContext::new(system, integrator).unwrap();
        let result = run(&mut context, &RunConfig::new(10, 0), &ProgressReporter::new());
        assert!(matches!(result, Err(EngineError::Config { .. })));
    }

    #[test]
    fn run_from_config_builds_and_thermalizes() {
        let (system, positions) = diatomic();
        let integrator = IntegratorConfigBuilder::new()
            .scheme(IntegrationScheme::VelocityVerlet)
            .step_size(0.002)
            .build()
            .unwrap();
        let mut run_config = RunConfig::new(50, 25);
        run_config.record = DataMask::ALL;
        run_config.initial_temperature = Some(100.0);
        run_config.seed = 4;
        let config = SimulationConfig {
            platform: PlatformKind::Cpu,
            integrator,
            run: run_config,
        };

        let (context, trajectory) =
            run_from_config(system, &positions, &config, &ProgressReporter::new()).unwrap();
        assert_eq!(trajectory.len(), 3);
        assert_eq!(context.platform().kind(), PlatformKind::Cpu);
        assert_eq!(context.integrator().name(), "VelocityVerlet");
        let first = &trajectory.frames()[0];
        assert!(first.kinetic_energy().unwrap() > 0.0);
        assert_eq!(context.step_count(), 50);
    }

    #[test]
    fn run_from_config_reports_unavailable_platforms() {
        let (system, positions) = diatomic();
        let config = SimulationConfig {
            platform: PlatformKind::Gpu,
            integrator: IntegratorConfigBuilder::new().step_size(0.001).build().unwrap(),
            run: RunConfig::new(1, 1),
        };
        let result = run_from_config(system, &positions, &config, &ProgressReporter::new());
        assert!(matches!(
            result,
            Err(EngineError::PlatformUnavailable(PlatformKind::Gpu))
        ));
    }
}
