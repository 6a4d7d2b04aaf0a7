use std::fmt;

use crate::model::HttpMethod;

/// Everything that can go wrong while declaring or rendering a topology.
///
/// Declaration-time failures are reported immediately and leave the graph
/// untouched; `Validation` is the one aggregate, collected by `render` so a
/// caller can fix every dangling reference in a single pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopologyError {
    DuplicateId {
        id: String,
    },
    InvalidConfig {
        id: String,
        message: String,
    },
    UnknownReference {
        id: String,
        context: String,
    },
    IncompatibleTarget {
        message: String,
    },
    DuplicateRoute {
        method: HttpMethod,
        path: String,
    },
    CyclicDependency {
        members: Vec<String>,
    },
    Validation {
        violations: Vec<String>,
    },
    ImmutableAfterRender,
}

impl TopologyError {
    /// Violation messages carried by the aggregate `Validation` variant.
    pub fn violations(&self) -> &[String] {
        match self {
            Self::Validation { violations } => violations,
            _ => &[],
        }
    }
}

impl fmt::Display for TopologyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateId { id } => {
                write!(f, "id '{id}' is already declared in this topology")
            }
            Self::InvalidConfig { id, message } => {
                write!(f, "invalid configuration for '{id}': {message}")
            }
            Self::UnknownReference { id, context } => {
                write!(f, "unknown {context} '{id}'")
            }
            Self::IncompatibleTarget { message } => f.write_str(message),
            Self::DuplicateRoute { method, path } => {
                write!(f, "route {method} {path} is already declared")
            }
            Self::CyclicDependency { members } => {
                write!(
                    f,
                    "dependency cycle between resources: {}",
                    members.join(", ")
                )
            }
            Self::Validation { violations } => {
                write!(
                    f,
                    "topology validation failed with {} violation(s): {}",
                    violations.len(),
                    violations.join("; ")
                )
            }
            Self::ImmutableAfterRender => {
                f.write_str("topology is immutable after a successful render")
            }
        }
    }
}

impl std::error::Error for TopologyError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_display_counts_every_violation() {
        let error = TopologyError::Validation {
            violations: vec![
                "grant 'a' -> 'b': references unknown resource 'b'".to_string(),
                "output 'x': references unknown resource 'y'".to_string(),
            ],
        };

        let rendered = error.to_string();
        assert!(rendered.starts_with("topology validation failed with 2 violation(s)"));
        assert!(rendered.contains("unknown resource 'y'"));
    }

    #[test]
    fn cycle_display_lists_members() {
        let error = TopologyError::CyclicDependency {
            members: vec!["a".to_string(), "b".to_string()],
        };
        assert_eq!(
            error.to_string(),
            "dependency cycle between resources: a, b"
        );
    }
}
