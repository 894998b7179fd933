use thiserror::Error;

/// Structural and numerical failures of a model build or update cycle.
///
/// Any of these aborts the cycle; the previously published snapshot stays
/// in effect.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("unknown segment: {0}")]
    UnknownSegment(String),

    #[error("rotor segment {name} not found in the segment tree")]
    RotorNotFound { name: String },

    #[error("invalid segment tree: {0}")]
    InvalidTree(String),

    #[error("joint {joint} has unsupported type {kind}")]
    UnsupportedJoint { joint: String, kind: String },

    #[error(
        "allocation is under-constrained: rank {rank} < {required} (condition number {condition_number:.3e})"
    )]
    UnderconstrainedAllocation {
        rank: usize,
        required: usize,
        condition_number: f64,
    },

    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("joint {joint} value {value} is not finite")]
    NonFiniteCoordinate { joint: String, value: f64 },

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("robot description error: {0}")]
    Urdf(#[from] urdf_rs::UrdfError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Rejection reasons for extra-module add/remove requests.
///
/// These are local: a rejected request leaves the registry untouched.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExtraModuleError {
    #[error("extra module {0} already exists")]
    DuplicateName(String),

    #[error("parent segment {0} is not an inertia base link")]
    UnknownParent(String),

    #[error("extra module mass {0} must be positive and finite")]
    InvalidMass(f64),

    #[error("extra module {0} has a non-finite offset or inertia")]
    NonFinitePlacement(String),

    #[error("extra module orientation is not a unit quaternion (|q|^2 = {0})")]
    InvalidOrientation(f64),

    #[error("extra module {0} does not exist")]
    NotFound(String),
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.to_string(),
            message: message.into(),
        }
    }
}
