//! Generation-time errors
//!
//! Everything in here aborts a generation run. Errors raised by the generated
//! adapters while they execute live in [`crate::runtime::BindingError`].

use std::fmt;
use thiserror::Error;

/// Where in the description an error was found
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Location {
    /// Owning interface
    pub interface: String,
    /// Member name, if the error is member-scoped
    pub member: Option<String>,
}

impl Location {
    /// Location naming an interface only
    pub fn interface(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            member: None,
        }
    }

    /// Location naming a member of an interface
    pub fn member(interface: impl Into<String>, member: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            member: Some(member.into()),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.member {
            Some(member) => write!(f, "{}.{}", self.interface, member),
            None => write!(f, "{}", self.interface),
        }
    }
}

/// Malformed or contradictory interface description
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructuralError {
    /// Extension flag name is not part of the closed flag set
    #[error("{location}: unknown extension flag `{flag}`")]
    UnknownFlag { location: Location, flag: String },

    /// Flag carries a value it does not accept, or lacks a required one
    #[error("{location}: invalid value {value:?} for extension flag `{flag}`")]
    InvalidFlagValue {
        location: Location,
        flag: String,
        value: Option<String>,
    },

    /// Flag is recognized but not meaningful where it was placed
    #[error("{location}: extension flag `{flag}` is not allowed on {target}")]
    FlagNotAllowed {
        location: Location,
        flag: String,
        target: &'static str,
    },

    /// Two flags that cannot be combined
    #[error("{location}: extension flags `{first}` and `{second}` cannot be combined")]
    ConflictingFlags {
        location: Location,
        first: &'static str,
        second: &'static str,
    },

    /// Interface declared twice
    #[error("duplicate interface: {0}")]
    DuplicateInterface(String),

    /// Interface name is empty
    #[error("interface name cannot be empty")]
    EmptyInterfaceName,

    /// Two attributes with the same name on one interface
    #[error("{location}: duplicate attribute")]
    DuplicateAttribute { location: Location },

    /// Type name the registry does not know
    #[error("{location}: unknown type `{type_name}`")]
    UnknownType { location: Location, type_name: String },

    /// Native type string that does not parse as a Rust type
    #[error("type `{type_name}` has invalid native type `{native}`: {reason}")]
    InvalidNativeType {
        type_name: String,
        native: String,
        reason: String,
    },

    /// Identifier that cannot be emitted as a Rust identifier
    #[error("{location}: `{name}` is not a valid identifier")]
    InvalidIdentifier { location: Location, name: String },

    /// Overloads disagree on the formal parameter name at a position
    #[error(
        "{location}: overloads disagree on parameter {position} name (`{expected}` vs `{found}`)"
    )]
    ParameterNameMismatch {
        location: Location,
        position: usize,
        expected: String,
        found: String,
    },

    /// Overloads mix static and instance signatures
    #[error("{location}: overloads mix static and instance signatures")]
    MixedStaticOverloads { location: Location },

    /// Some overloads are supplied externally and some are generated
    #[error("{location}: overloads mix custom and generated signatures")]
    MixedCustomOverloads { location: Location },

    /// Reflected attribute whose type has no reflect accessor
    #[error("{location}: type `{type_name}` cannot be reflected")]
    NotReflectable { location: Location, type_name: String },

    /// Two callbacks of one interface would share a Rust function name
    #[error("{location}: `{first}` and `{second}` both map to Rust function `{function}`")]
    FunctionNameClash {
        location: Location,
        function: String,
        first: String,
        second: String,
    },

    /// Two callbacks of one interface claim the same resolver key
    #[error("{interface}: binding `{binding}` with arity {arity} is already registered")]
    DuplicateBinding {
        interface: String,
        binding: String,
        arity: String,
    },
}

/// Errors that can occur while loading a description
#[derive(Debug, Error)]
pub enum LoadError {
    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// Description is structurally invalid
    #[error(transparent)]
    Structural(#[from] StructuralError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_display() {
        assert_eq!(Location::interface("Canvas").to_string(), "Canvas");
        assert_eq!(Location::member("Canvas", "draw").to_string(), "Canvas.draw");
    }

    #[test]
    fn test_error_names_offending_member() {
        let err = StructuralError::MixedStaticOverloads {
            location: Location::member("Canvas", "draw"),
        };
        assert!(err.to_string().starts_with("Canvas.draw:"));
    }
}
