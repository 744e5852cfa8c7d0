pub mod doctor;
pub mod engine;
pub mod geometry;
pub mod rules;

pub use engine::{Containment, GeofenceEngine, Violation, ViolationKind, DEFAULT_SUSTAIN_MS};
pub use rules::{LineAxis, Point, Rule, RuleKind, RuleSet, RuleSource};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GeofenceError {
    #[error("rule file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("rule source is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}
