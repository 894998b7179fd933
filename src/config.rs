use nalgebra::{Quaternion, UnitQuaternion};
use serde::{Deserialize, Serialize};

use crate::allocation::AllocationStrategy;
use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// Serde default functions
// ---------------------------------------------------------------------------

fn default_baselink() -> String {
    "fc".into()
}
fn default_thrust_link() -> String {
    "thrust".into()
}
const fn default_m_f_rate() -> f64 {
    0.016
}
const fn default_gravity() -> f64 {
    9.80665
}
const fn default_thrust_max() -> f64 {
    10.0
}
const fn default_feasibility_epsilon() -> f64 {
    10.0
}
const fn default_orientation() -> [f64; 4] {
    [0.0, 0.0, 0.0, 1.0]
}
const fn default_condition_limit() -> f64 {
    1e8
}
const fn default_perturbation() -> f64 {
    1e-5
}
const fn default_tolerance() -> f64 {
    1e-3
}

/// Allowed deviation of a quaternion's squared norm from one.
pub const UNIT_NORM_TOLERANCE: f64 = 1e-6;

/// False for NaN components too.
pub(crate) fn is_unit(q: &Quaternion<f64>) -> bool {
    (1.0 - q.norm_squared()).abs() <= UNIT_NORM_TOLERANCE
}

// ---------------------------------------------------------------------------
// ModelConfig
// ---------------------------------------------------------------------------

/// Static configuration of a [`RobotModel`](crate::RobotModel).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Segment whose attitude defines the CoG frame orientation.
    #[serde(default = "default_baselink")]
    pub baselink: String,

    /// Rotor segment prefix; rotor `i` (1-based) is the segment `{thrust_link}{i}`.
    #[serde(default = "default_thrust_link")]
    pub thrust_link: String,

    /// Expected rotor count. `None` counts the rotor segments in the tree.
    #[serde(default)]
    pub rotor_num: Option<usize>,

    /// Spin direction override (+1 / -1 per rotor). `None` reads the sign of
    /// each rotor joint axis.
    #[serde(default)]
    pub rotor_directions: Option<Vec<f64>>,

    #[serde(default)]
    pub strategy: AllocationStrategy,

    /// Rotor torque-to-thrust ratio.
    #[serde(default = "default_m_f_rate")]
    pub m_f_rate: f64,

    /// Gravity magnitude in m/s^2, acting along world -Z.
    #[serde(default = "default_gravity")]
    pub gravity: f64,

    #[serde(default)]
    pub thrust_min: f64,

    #[serde(default = "default_thrust_max")]
    pub thrust_max: f64,

    /// Smallest exact force margin a stable state may have, in N.
    #[serde(default, alias = "fc_f_min_thre")]
    pub force_margin_threshold: f64,

    /// Smallest exact torque margin a stable state may have, in Nm.
    #[serde(default, alias = "fc_t_min_thre")]
    pub torque_margin_threshold: f64,

    /// Sharpness of the smooth feasibility surrogate.
    #[serde(default = "default_feasibility_epsilon")]
    pub feasibility_epsilon: f64,

    /// Nominal desired CoG orientation as `[x, y, z, w]`.
    #[serde(default = "default_orientation")]
    pub cog_desire_orientation: [f64; 4],

    /// Largest accepted condition number of the static thrust solve.
    #[serde(default = "default_condition_limit")]
    pub condition_limit: f64,

    #[serde(default)]
    pub jacobian: JacobianConfig,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            baselink: default_baselink(),
            thrust_link: default_thrust_link(),
            rotor_num: None,
            rotor_directions: None,
            strategy: AllocationStrategy::default(),
            m_f_rate: default_m_f_rate(),
            gravity: default_gravity(),
            thrust_min: 0.0,
            thrust_max: default_thrust_max(),
            force_margin_threshold: 0.0,
            torque_margin_threshold: 0.0,
            feasibility_epsilon: default_feasibility_epsilon(),
            cog_desire_orientation: default_orientation(),
            condition_limit: default_condition_limit(),
            jacobian: JacobianConfig::default(),
        }
    }
}

impl ModelConfig {
    /// Validate configuration. Returns Err on invalid values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let scalars = [
            ("thrust_min", self.thrust_min),
            ("thrust_max", self.thrust_max),
            ("gravity", self.gravity),
            ("m_f_rate", self.m_f_rate),
            ("force_margin_threshold", self.force_margin_threshold),
            ("torque_margin_threshold", self.torque_margin_threshold),
            ("feasibility_epsilon", self.feasibility_epsilon),
            ("condition_limit", self.condition_limit),
        ];
        if let Some((field, _)) = scalars.iter().find(|(_, value)| !value.is_finite()) {
            return Err(ConfigError::invalid(field, "must be finite"));
        }
        if self.thrust_min < 0.0 {
            return Err(ConfigError::invalid("thrust_min", "must be >= 0"));
        }
        if self.thrust_max <= self.thrust_min {
            return Err(ConfigError::invalid(
                "thrust_max",
                format!("must be > thrust_min ({})", self.thrust_min),
            ));
        }
        if self.gravity <= 0.0 {
            return Err(ConfigError::invalid("gravity", "must be > 0"));
        }
        if self.m_f_rate < 0.0 {
            return Err(ConfigError::invalid("m_f_rate", "must be >= 0"));
        }
        if self.feasibility_epsilon <= 0.0 {
            return Err(ConfigError::invalid("feasibility_epsilon", "must be > 0"));
        }
        if self.condition_limit <= 1.0 {
            return Err(ConfigError::invalid("condition_limit", "must be > 1"));
        }
        if let Some(directions) = &self.rotor_directions {
            if directions.iter().any(|d| *d != 1.0 && *d != -1.0) {
                return Err(ConfigError::invalid(
                    "rotor_directions",
                    "entries must be +1 or -1",
                ));
            }
            if let Some(n) = self.rotor_num {
                if directions.len() != n {
                    return Err(ConfigError::invalid(
                        "rotor_directions",
                        format!("expected {n} entries, got {}", directions.len()),
                    ));
                }
            }
        }
        self.desire_orientation()?;
        self.jacobian.validate()
    }

    /// The nominal desired CoG orientation.
    pub fn desire_orientation(&self) -> Result<UnitQuaternion<f64>, ConfigError> {
        let [x, y, z, w] = self.cog_desire_orientation;
        let q = Quaternion::new(w, x, y, z);
        if !is_unit(&q) {
            return Err(ConfigError::invalid(
                "cog_desire_orientation",
                "must be a unit quaternion",
            ));
        }
        Ok(UnitQuaternion::new_normalize(q))
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from TOML file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}

// ---------------------------------------------------------------------------
// JacobianConfig
// ---------------------------------------------------------------------------

/// Settings of the finite-difference validation path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JacobianConfig {
    /// Perturbation step in rad.
    #[serde(default = "default_perturbation")]
    pub perturbation: f64,

    /// Max absolute analytic/numerical difference accepted as agreement.
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
}

impl Default for JacobianConfig {
    fn default() -> Self {
        Self {
            perturbation: default_perturbation(),
            tolerance: default_tolerance(),
        }
    }
}

impl JacobianConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.perturbation.is_finite() && self.perturbation > 0.0) {
            return Err(ConfigError::invalid("jacobian.perturbation", "must be > 0"));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(ConfigError::invalid("jacobian.tolerance", "must be > 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = ModelConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.baselink, "fc");
        assert_eq!(config.strategy, AllocationStrategy::UnderActuated);
    }

    #[test]
    fn toml_fills_missing_fields_with_defaults() {
        let config = ModelConfig::from_toml_str(
            r#"
            baselink = "link2"
            strategy = "fully_actuated"
            thrust_max = 8.0

            [jacobian]
            tolerance = 5e-4
            "#,
        )
        .unwrap();
        assert_eq!(config.baselink, "link2");
        assert_eq!(config.thrust_link, "thrust");
        assert_eq!(config.strategy, AllocationStrategy::FullyActuated);
        assert_eq!(config.thrust_max, 8.0);
        assert_eq!(config.jacobian.tolerance, 5e-4);
        assert_eq!(config.jacobian.perturbation, 1e-5);
    }

    #[test]
    fn inverted_thrust_bounds_are_rejected() {
        let config = ModelConfig {
            thrust_min: 5.0,
            thrust_max: 2.0,
            ..ModelConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field, .. }) if field == "thrust_max"
        ));
    }

    #[test]
    fn non_unit_desire_orientation_is_rejected() {
        let config = ModelConfig {
            cog_desire_orientation: [0.0, 0.0, 0.5, 1.0],
            ..ModelConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn nan_desire_orientation_is_rejected() {
        let config = ModelConfig {
            cog_desire_orientation: [0.0, 0.0, 0.0, f64::NAN],
            ..ModelConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rotor_direction_overrides_must_be_signs() {
        let config = ModelConfig {
            rotor_directions: Some(vec![1.0, 0.5]),
            ..ModelConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ModelConfig {
            rotor_num: Some(3),
            rotor_directions: Some(vec![1.0, -1.0]),
            ..ModelConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn margin_thresholds_accept_the_short_names() {
        let config = ModelConfig::from_toml_str(
            r#"
            fc_f_min_thre = 1.5
            torque_margin_threshold = 0.2
            "#,
        )
        .unwrap();
        assert_eq!(config.force_margin_threshold, 1.5);
        assert_eq!(config.torque_margin_threshold, 0.2);
        assert_eq!(ModelConfig::default().force_margin_threshold, 0.0);
    }

    #[test]
    fn non_finite_values_are_rejected() {
        let err = ModelConfig::from_toml_str("gravity = nan").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "gravity"));

        let config = ModelConfig {
            thrust_max: f64::INFINITY,
            ..ModelConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field, .. }) if field == "thrust_max"
        ));

        let config = ModelConfig {
            jacobian: JacobianConfig {
                perturbation: f64::NAN,
                ..JacobianConfig::default()
            },
            ..ModelConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn bad_toml_surfaces_parse_error() {
        let err = ModelConfig::from_toml_str("gravity = \"down\"").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }
}
