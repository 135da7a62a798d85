use super::constraints::{ConstraintSettings, SweepOrder};
use super::platform::PlatformKind;
use crate::core::forcefield::contributor::ForceGroupMask;
use crate::core::models::state::DataMask;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Invalid value for '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("TOML parsing error for '{path}': {source}")]
    Toml {
        path: String,
        source: toml::de::Error,
    },
    #[error("Invalid configuration in '{path}': {source}")]
    Invalid { path: String, source: ConfigError },
}

/// The time-stepping scheme an integrator uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IntegrationScheme {
    /// Leapfrog Verlet: one force evaluation per step, half-step velocities.
    #[default]
    Leapfrog,
    /// Velocity Verlet with RATTLE: on-step velocities, cached forces.
    VelocityVerlet,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntegratorConfig {
    pub scheme: IntegrationScheme,
    /// Step size in ps.
    pub step_size: f64,
    pub constraints: ConstraintSettings,
    /// Force groups the integrator evaluates.
    pub force_groups: ForceGroupMask,
}

#[derive(Debug, Default)]
pub struct IntegratorConfigBuilder {
    scheme: Option<IntegrationScheme>,
    step_size: Option<f64>,
    constraint_tolerance: Option<f64>,
    max_constraint_iterations: Option<usize>,
    sweep: Option<SweepOrder>,
    force_groups: Option<ForceGroupMask>,
}

impl IntegratorConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scheme(mut self, scheme: IntegrationScheme) -> Self {
        self.scheme = Some(scheme);
        self
    }
    pub fn step_size(mut self, step_size: f64) -> Self {
        self.step_size = Some(step_size);
        self
    }
    pub fn constraint_tolerance(mut self, tolerance: f64) -> Self {
        self.constraint_tolerance = Some(tolerance);
        self
    }
    pub fn max_constraint_iterations(mut self, iterations: usize) -> Self {
        self.max_constraint_iterations = Some(iterations);
        self
    }
    pub fn sweep(mut self, sweep: SweepOrder) -> Self {
        self.sweep = Some(sweep);
        self
    }
    pub fn force_groups(mut self, groups: ForceGroupMask) -> Self {
        self.force_groups = Some(groups);
        self
    }

    /// Builds the configuration. Only the step size is required.
    pub fn build(self) -> Result<IntegratorConfig, ConfigError> {
        let defaults = ConstraintSettings::default();
        let step_size = self
            .step_size
            .ok_or(ConfigError::MissingParameter("step_size"))?;
        validate_step_size(step_size)?;
        let tolerance = self.constraint_tolerance.unwrap_or(defaults.tolerance);
        validate_tolerance(tolerance)?;
        let max_iterations = self
            .max_constraint_iterations
            .unwrap_or(defaults.max_iterations);
        if max_iterations == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "max_constraint_iterations",
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(IntegratorConfig {
            scheme: self.scheme.unwrap_or_default(),
            step_size,
            constraints: ConstraintSettings {
                tolerance,
                max_iterations,
                sweep: self.sweep.unwrap_or_default(),
            },
            force_groups: self.force_groups.unwrap_or_default(),
        })
    }
}

pub(crate) fn validate_step_size(step_size: f64) -> Result<(), ConfigError> {
    if step_size.is_finite() && step_size > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidParameter {
            name: "step_size",
            reason: format!("must be positive, got {step_size}"),
        })
    }
}

pub(crate) fn validate_tolerance(tolerance: f64) -> Result<(), ConfigError> {
    if tolerance.is_finite() && tolerance > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidParameter {
            name: "constraint_tolerance",
            reason: format!("must be positive, got {tolerance}"),
        })
    }
}

/// A state field that a run records in each frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecordedField {
    Positions,
    Velocities,
    Forces,
    Energy,
}

impl RecordedField {
    pub fn mask(self) -> DataMask {
        match self {
            RecordedField::Positions => DataMask::POSITIONS,
            RecordedField::Velocities => DataMask::VELOCITIES,
            RecordedField::Forces => DataMask::FORCES,
            RecordedField::Energy => DataMask::ENERGY,
        }
    }
}

/// Parameters of a production run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    /// Total number of steps.
    pub steps: u64,
    /// A frame is recorded every `report_interval` steps, plus the initial frame.
    pub report_interval: u64,
    pub record: DataMask,
    /// If set, velocities are drawn at this temperature (K) before the run starts.
    pub initial_temperature: Option<f64>,
    pub seed: u64,
}

impl RunConfig {
    /// A run of `steps` steps that records positions and energies every
    /// `report_interval` steps.
    pub fn new(steps: u64, report_interval: u64) -> Self {
        Self {
            steps,
            report_interval,
            record: DataMask::POSITIONS | DataMask::ENERGY,
            initial_temperature: None,
            seed: 0,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.report_interval == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "report_interval",
                reason: "must be at least 1".to_string(),
            });
        }
        if let Some(t) = self.initial_temperature {
            if !(t.is_finite() && t >= 0.0) {
                return Err(ConfigError::InvalidParameter {
                    name: "initial_temperature",
                    reason: format!("must be non-negative, got {t}"),
                });
            }
        }
        Ok(())
    }
}

/// Everything needed to run a system: the platform, the integrator and the run.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    pub platform: PlatformKind,
    pub integrator: IntegratorConfig,
    pub run: RunConfig,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SimulationFile {
    #[serde(default)]
    platform: PlatformKind,
    integrator: IntegratorSection,
    run: RunSection,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct IntegratorSection {
    scheme: Option<IntegrationScheme>,
    step_size: Option<f64>,
    constraint_tolerance: Option<f64>,
    max_constraint_iterations: Option<usize>,
    sweep: Option<SweepOrder>,
    force_groups: Option<Vec<u8>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RunSection {
    steps: u64,
    report_interval: Option<u64>,
    record: Option<Vec<RecordedField>>,
    initial_temperature: Option<f64>,
    #[serde(default)]
    seed: u64,
}

impl SimulationFile {
    fn into_config(self) -> Result<SimulationConfig, ConfigError> {
        let section = self.integrator;
        let mut builder = IntegratorConfigBuilder::new();
        if let Some(scheme) = section.scheme {
            builder = builder.scheme(scheme);
        }
        if let Some(step_size) = section.step_size {
            builder = builder.step_size(step_size);
        }
        if let Some(tolerance) = section.constraint_tolerance {
            builder = builder.constraint_tolerance(tolerance);
        }
        if let Some(iterations) = section.max_constraint_iterations {
            builder = builder.max_constraint_iterations(iterations);
        }
        if let Some(sweep) = section.sweep {
            builder = builder.sweep(sweep);
        }
        if let Some(groups) = section.force_groups {
            let mask = ForceGroupMask::from_groups(&groups).ok_or_else(|| {
                ConfigError::InvalidParameter {
                    name: "force_groups",
                    reason: format!("group indices must be in 0..32, got {groups:?}"),
                }
            })?;
            builder = builder.force_groups(mask);
        }
        let integrator = builder.build()?;

        let run_section = self.run;
        let mut run = RunConfig::new(run_section.steps, run_section.report_interval.unwrap_or(1));
        if let Some(fields) = run_section.record {
            run.record = fields
                .into_iter()
                .fold(DataMask::NONE, |mask, field| mask | field.mask());
        }
        run.initial_temperature = run_section.initial_temperature;
        run.seed = run_section.seed;
        run.validate()?;

        Ok(SimulationConfig {
            platform: self.platform,
            integrator,
            run,
        })
    }
}

impl SimulationConfig {
    /// Loads a simulation configuration from a TOML file.
    ///
    /// ```toml
    /// platform = "cpu"
    ///
    /// [integrator]
    /// scheme = "velocity-verlet"
    /// step_size = 0.002
    /// constraint_tolerance = 1e-6
    ///
    /// [run]
    /// steps = 5000
    /// report_interval = 100
    /// record = ["positions", "energy"]
    /// initial_temperature = 300.0
    /// seed = 42
    /// ```
    pub fn load(path: &Path) -> Result<Self, ConfigLoadError> {
        let path_str = path.to_string_lossy().to_string();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigLoadError::Io {
            path: path_str.clone(),
            source: e,
        })?;
        let file: SimulationFile = toml::from_str(&content).map_err(|e| ConfigLoadError::Toml {
            path: path_str.clone(),
            source: e,
        })?;
        file.into_config().map_err(|e| ConfigLoadError::Invalid {
            path: path_str,
            source: e,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::forcefield::contributor::ForceGroup;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn builder_fills_defaults_around_the_step_size() {
        let config = IntegratorConfigBuilder::new()
            .step_size(0.01)
            .build()
            .unwrap();
        assert_eq!(config.scheme, IntegrationScheme::Leapfrog);
        assert_eq!(config.constraints, ConstraintSettings::default());
        assert_eq!(config.force_groups, ForceGroupMask::ALL);
    }

    #[test]
    fn builder_requires_a_step_size() {
        let result = IntegratorConfigBuilder::new().build();
        assert_eq!(result, Err(ConfigError::MissingParameter("step_size")));
    }

    #[test]
    fn builder_rejects_non_positive_values() {
        assert!(
            IntegratorConfigBuilder::new()
                .step_size(0.0)
                .build()
                .is_err()
        );
        assert!(
            IntegratorConfigBuilder::new()
                .step_size(0.001)
                .constraint_tolerance(-1e-5)
                .build()
                .is_err()
        );
        assert!(
            IntegratorConfigBuilder::new()
                .step_size(0.001)
                .max_constraint_iterations(0)
                .build()
                .is_err()
        );
    }

    #[test]
    fn run_config_requires_a_positive_interval() {
        let mut run = RunConfig::new(10, 0);
        assert!(run.validate().is_err());
        run.report_interval = 5;
        assert!(run.validate().is_ok());
        run.initial_temperature = Some(-3.0);
        assert!(run.validate().is_err());
    }

    #[test]
    fn load_reads_a_complete_file() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("sim.toml");
        let mut file = File::create(&file_path).unwrap();
        writeln!(
            file,
            r#"
            platform = "cpu"

            [integrator]
            scheme = "velocity-verlet"
            step_size = 0.002
            constraint_tolerance = 1e-6
            sweep = "simultaneous"
            force_groups = [0, 2]

            [run]
            steps = 500
            report_interval = 50
            record = ["positions", "velocities"]
            initial_temperature = 300.0
            seed = 42
            "#
        )
        .unwrap();

        let config = SimulationConfig::load(&file_path).unwrap();
        assert_eq!(config.platform, PlatformKind::Cpu);
        assert_eq!(config.integrator.scheme, IntegrationScheme::VelocityVerlet);
        assert_eq!(config.integrator.step_size, 0.002);
        assert_eq!(config.integrator.constraints.tolerance, 1e-6);
        assert_eq!(config.integrator.constraints.sweep, SweepOrder::Simultaneous);
        assert!(
            config
                .integrator
                .force_groups
                .contains(ForceGroup::new(2).unwrap())
        );
        assert!(
            !config
                .integrator
                .force_groups
                .contains(ForceGroup::new(1).unwrap())
        );
        assert_eq!(config.run.steps, 500);
        assert_eq!(config.run.record, DataMask::POSITIONS | DataMask::VELOCITIES);
        assert_eq!(config.run.initial_temperature, Some(300.0));
        assert_eq!(config.run.seed, 42);
    }

    #[test]
    fn load_applies_defaults_for_optional_fields() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("minimal.toml");
        std::fs::write(
            &file_path,
            "[integrator]\nstep_size = 0.001\n\n[run]\nsteps = 10\n",
        )
        .unwrap();

        let config = SimulationConfig::load(&file_path).unwrap();
        assert_eq!(config.platform, PlatformKind::Reference);
        assert_eq!(config.run.report_interval, 1);
        assert_eq!(config.run.record, DataMask::POSITIONS | DataMask::ENERGY);
    }

    #[test]
    fn load_fails_for_missing_file() {
        let result = SimulationConfig::load(Path::new("/nonexistent/sim.toml"));
        assert!(matches!(result, Err(ConfigLoadError::Io { .. })));
    }

    #[test]
    fn load_fails_for_malformed_toml() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("bad.toml");
        std::fs::write(&file_path, "[integrator\nstep_size = ").unwrap();
        let result = SimulationConfig::load(&file_path);
        assert!(matches!(result, Err(ConfigLoadError::Toml { .. })));
    }

    #[test]
    fn load_reports_semantic_errors() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("groups.toml");
        std::fs::write(
            &file_path,
            "[integrator]\nstep_size = 0.001\nforce_groups = [40]\n\n[run]\nsteps = 10\n",
        )
        .unwrap();
        let result = SimulationConfig::load(&file_path);
        assert!(matches!(
            result,
            Err(ConfigLoadError::Invalid {
                source: ConfigError::InvalidParameter {
                    name: "force_groups",
                    ..
                },
                ..
            })
        ));
    }
}
