//! Error types for schema assembly.
//!
//! Every construction step returns the first failure to its caller; no partial
//! schema is ever handed out. Messages name the offending declaration so they
//! can be shown to the schema author as-is.

use thiserror::Error;

use crate::dependency::DependencyMap;

/// Errors that can occur while assembling an executable schema.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// The combined type definitions do not parse.
    #[error("Malformed type definitions at {line}:{column}: {message}")]
    MalformedDefinition {
        message: String,
        line: usize,
        column: usize,
    },

    /// A referenced name is neither declared nor built in.
    #[error("Unknown {kind} `{name}` referenced by `{referenced_by}`")]
    UnresolvedReference {
        kind: &'static str,
        name: String,
        referenced_by: String,
    },

    /// A declaration needs a caller-supplied behavior that is not bound.
    #[error("{kind} `{name}` requires a {binding} binding")]
    MissingResolver {
        kind: &'static str,
        name: String,
        binding: &'static str,
    },

    /// The same name is declared twice in incompatible ways.
    #[error("`{name}` is declared as {existing} and redeclared as {found}")]
    ConflictingDefinition {
        name: String,
        existing: String,
        found: String,
    },

    /// A directive is used but has no registered implementation.
    #[error("Unknown directive `@{name}` on {location} `{host}`")]
    UnknownDirective {
        name: String,
        location: &'static str,
        host: String,
    },

    /// A directive needed a type that is not constructed yet, in a context
    /// where deferred references are not allowed.
    #[error("Directive `@{directive}` requires `{type_name}` before it is constructed")]
    PrematureDirective { directive: String, type_name: String },

    /// A root operation type is missing or is not an object type.
    ///
    /// Carries the dependency map of the document, like
    /// [`SchemaError::SchemaConstruction`].
    #[error("Invalid {operation} root type `{name}`: {reason}")]
    InvalidRootType {
        operation: &'static str,
        name: String,
        reason: String,
        dependencies: DependencyMap,
    },

    /// A declared name was used where a different kind is required.
    #[error("`{name}` is {found}, expected {expected} (referenced by `{referenced_by}`)")]
    InvalidReference {
        name: String,
        expected: &'static str,
        found: &'static str,
        referenced_by: String,
    },

    /// A type was requested through a kind accessor while it is still being built.
    #[error("`{name}` was requested while it is still under construction")]
    UnderConstruction { name: String },

    /// A directive is used at a location its definition does not allow.
    #[error("Directive `@{name}` is not allowed on {location} `{host}`")]
    MisplacedDirective {
        name: String,
        location: &'static str,
        host: String,
    },

    /// A resolver binding is malformed or does not match the definitions.
    #[error("Invalid binding `{key}`: {reason}")]
    InvalidBinding { key: String, reason: String },

    /// A directive implementation rejected its target.
    #[error("Directive `@{directive}` failed: {message}")]
    Directive { directive: String, message: String },

    /// The execution engine rejected the assembled types.
    ///
    /// Carries the dependency map of the document so the caller can render
    /// it next to the message.
    #[error("Failed to build schema: {message}")]
    SchemaConstruction {
        message: String,
        dependencies: DependencyMap,
    },

    /// The builder configuration is invalid.
    #[error("Invalid schema builder configuration: {0}")]
    InvalidConfig(String),
}

impl SchemaError {
    /// Creates an `UnresolvedReference` error.
    pub fn unresolved(
        kind: &'static str,
        name: impl Into<String>,
        referenced_by: impl Into<String>,
    ) -> Self {
        Self::UnresolvedReference {
            kind,
            name: name.into(),
            referenced_by: referenced_by.into(),
        }
    }

    /// Creates a `MissingResolver` error.
    pub fn missing_resolver(
        kind: &'static str,
        name: impl Into<String>,
        binding: &'static str,
    ) -> Self {
        Self::MissingResolver {
            kind,
            name: name.into(),
            binding,
        }
    }

    /// Creates a `ConflictingDefinition` error.
    pub fn conflicting(
        name: impl Into<String>,
        existing: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        Self::ConflictingDefinition {
            name: name.into(),
            existing: existing.into(),
            found: found.into(),
        }
    }

    /// Creates an `InvalidRootType` error.
    pub fn invalid_root(
        operation: &'static str,
        name: impl Into<String>,
        reason: impl Into<String>,
        dependencies: &DependencyMap,
    ) -> Self {
        Self::InvalidRootType {
            operation,
            name: name.into(),
            reason: reason.into(),
            dependencies: dependencies.clone(),
        }
    }

    /// Creates an `InvalidBinding` error.
    pub fn invalid_binding(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidBinding {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Creates a `Directive` error. Intended for directive implementations
    /// that reject the node they are applied to.
    pub fn directive_failed(directive: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Directive {
            directive: directive.into(),
            message: message.into(),
        }
    }

    /// Returns the stable error code for this error.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::MalformedDefinition { .. } => "MALFORMED_DEFINITION",
            Self::UnresolvedReference { .. } => "UNRESOLVED_REFERENCE",
            Self::MissingResolver { .. } => "MISSING_RESOLVER",
            Self::ConflictingDefinition { .. } => "CONFLICTING_DEFINITION",
            Self::UnknownDirective { .. } => "UNKNOWN_DIRECTIVE",
            Self::PrematureDirective { .. } => "PREMATURE_DIRECTIVE",
            Self::InvalidRootType { .. } => "INVALID_ROOT_TYPE",
            Self::InvalidReference { .. } => "INVALID_REFERENCE",
            Self::UnderConstruction { .. } => "UNDER_CONSTRUCTION",
            Self::MisplacedDirective { .. } => "MISPLACED_DIRECTIVE",
            Self::InvalidBinding { .. } => "INVALID_BINDING",
            Self::Directive { .. } => "DIRECTIVE_FAILED",
            Self::SchemaConstruction { .. } => "SCHEMA_CONSTRUCTION_FAILED",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
        }
    }

    /// Check if this error is caused by the type definitions themselves
    /// rather than by the bindings or configuration supplied with them.
    pub fn is_definition_error(&self) -> bool {
        matches!(
            self,
            Self::MalformedDefinition { .. }
                | Self::UnresolvedReference { .. }
                | Self::ConflictingDefinition { .. }
                | Self::InvalidRootType { .. }
                | Self::InvalidReference { .. }
                | Self::MisplacedDirective { .. }
        )
    }

    /// Check if this error is caused by missing or malformed bindings.
    pub fn is_binding_error(&self) -> bool {
        matches!(
            self,
            Self::MissingResolver { .. } | Self::UnknownDirective { .. } | Self::InvalidBinding { .. }
        )
    }

    /// Returns the dependency map attached to a schema construction or root
    /// type failure.
    pub fn dependencies(&self) -> Option<&DependencyMap> {
        match self {
            Self::SchemaConstruction { dependencies, .. }
            | Self::InvalidRootType { dependencies, .. } => Some(dependencies),
            _ => None,
        }
    }

    /// Renders the attached dependency map as pretty-printed JSON with a
    /// stable key order.
    pub fn dependency_report(&self) -> Option<String> {
        self.dependencies().map(DependencyMap::to_pretty_json)
    }
}
