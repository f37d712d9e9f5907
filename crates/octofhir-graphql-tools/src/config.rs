//! Schema builder configuration.
//!
//! Configuration can be embedded in a larger TOML document, for example under
//! a `[graphql.schema]` section.
//!
//! # Example Configuration
//!
//! ```toml
//! introspection = true
//! max_depth = 15
//!
//! [root_names]
//! query = "Query"
//! mutation = "Mutation"
//! subscription = "Subscription"
//! ```

use serde::{Deserialize, Serialize};

use crate::error::SchemaError;

/// Conventional name of the query root type.
pub const DEFAULT_ROOT_QUERY_NAME: &str = "Query";

/// Conventional name of the mutation root type.
pub const DEFAULT_ROOT_MUTATION_NAME: &str = "Mutation";

/// Conventional name of the subscription root type.
pub const DEFAULT_ROOT_SUBSCRIPTION_NAME: &str = "Subscription";

/// Type names used to find root operation types when the definitions carry
/// no explicit `schema { ... }` block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootTypeNames {
    /// Query root. Required.
    #[serde(default = "default_query")]
    pub query: String,

    /// Mutation root. Optional: absence is not an error.
    #[serde(default = "default_mutation")]
    pub mutation: String,

    /// Subscription root. Optional: absence is not an error.
    #[serde(default = "default_subscription")]
    pub subscription: String,
}

fn default_query() -> String {
    DEFAULT_ROOT_QUERY_NAME.to_string()
}

fn default_mutation() -> String {
    DEFAULT_ROOT_MUTATION_NAME.to_string()
}

fn default_subscription() -> String {
    DEFAULT_ROOT_SUBSCRIPTION_NAME.to_string()
}

impl Default for RootTypeNames {
    fn default() -> Self {
        Self {
            query: default_query(),
            mutation: default_mutation(),
            subscription: default_subscription(),
        }
    }
}

/// Configuration for the schema builder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaBuilderConfig {
    /// Root type names used when no schema definition is present.
    #[serde(default)]
    pub root_names: RootTypeNames,

    /// Maximum query depth enforced by the execution engine.
    /// Default: unlimited
    #[serde(default)]
    pub max_depth: Option<usize>,

    /// Maximum query complexity enforced by the execution engine.
    /// Default: unlimited
    #[serde(default)]
    pub max_complexity: Option<usize>,

    /// Enable introspection queries against the assembled schema.
    /// Default: true
    #[serde(default = "default_introspection")]
    pub introspection: bool,
}

fn default_introspection() -> bool {
    true
}

impl Default for SchemaBuilderConfig {
    fn default() -> Self {
        Self {
            root_names: RootTypeNames::default(),
            max_depth: None,
            max_complexity: None,
            introspection: default_introspection(),
        }
    }
}

impl SchemaBuilderConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `SchemaError::InvalidConfig` if a root name is not a valid
    /// GraphQL name, two roots share a name, or a limit is zero.
    pub fn validate(&self) -> Result<(), SchemaError> {
        let roots = [
            ("query", &self.root_names.query),
            ("mutation", &self.root_names.mutation),
            ("subscription", &self.root_names.subscription),
        ];
        for (operation, name) in roots {
            if !crate::is_valid_name(name) {
                return Err(SchemaError::InvalidConfig(format!(
                    "root_names.{operation} `{name}` is not a valid GraphQL name"
                )));
            }
        }
        if self.root_names.query == self.root_names.mutation
            || self.root_names.query == self.root_names.subscription
            || self.root_names.mutation == self.root_names.subscription
        {
            return Err(SchemaError::InvalidConfig(
                "root_names must be distinct".into(),
            ));
        }
        if self.max_depth == Some(0) {
            return Err(SchemaError::InvalidConfig("max_depth must be > 0".into()));
        }
        if self.max_complexity == Some(0) {
            return Err(SchemaError::InvalidConfig(
                "max_complexity must be > 0".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SchemaBuilderConfig::default();
        assert_eq!(config.root_names.query, "Query");
        assert_eq!(config.root_names.mutation, "Mutation");
        assert_eq!(config.root_names.subscription, "Subscription");
        assert_eq!(config.max_depth, None);
        assert_eq!(config.max_complexity, None);
        assert!(config.introspection);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_root_name() {
        let mut config = SchemaBuilderConfig::default();
        config.root_names.query = "Root-Query".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_root_names() {
        let mut config = SchemaBuilderConfig::default();
        config.root_names.mutation = "Query".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_limits() {
        let config = SchemaBuilderConfig {
            max_depth: Some(0),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = SchemaBuilderConfig {
            max_complexity: Some(0),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_from_toml() {
        let toml = r#"
            max_depth = 20
            introspection = false

            [root_names]
            query = "RootQuery"
        "#;

        let config: SchemaBuilderConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.max_depth, Some(20));
        assert_eq!(config.max_complexity, None);
        assert!(!config.introspection);
        assert_eq!(config.root_names.query, "RootQuery");
        assert_eq!(config.root_names.mutation, "Mutation");
        assert!(config.validate().is_ok());
    }
}
