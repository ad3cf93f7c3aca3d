use std::{fmt::Display, ops::Deref, path::PathBuf};

/// A configuration value that remembers which source supplied it
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum ParsedProperty<T> {
    /// Value from command line arguments (parsed_value, original_string)
    Cli(T, String),
    /// Value from an environment variable (parsed_value, env_var_value)
    Env(T, String),
    /// Value from the configuration file (parsed_value, file_path, toml_value_string)
    File(T, PathBuf, String),
    /// Built-in default
    Default(T),
}

impl<T> ParsedProperty<T> {
    pub fn value(&self) -> &T {
        match self {
            ParsedProperty::Cli(value, _)
            | ParsedProperty::Env(value, _)
            | ParsedProperty::File(value, _, _)
            | ParsedProperty::Default(value) => value,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            ParsedProperty::Cli(value, _)
            | ParsedProperty::Env(value, _)
            | ParsedProperty::File(value, _, _)
            | ParsedProperty::Default(value) => value,
        }
    }

    pub fn source_name(&self) -> &'static str {
        match self {
            ParsedProperty::Cli(_, _) => "cli",
            ParsedProperty::Env(_, _) => "env",
            ParsedProperty::File(_, _, _) => "file",
            ParsedProperty::Default(_) => "default",
        }
    }

    /// The text the value was parsed from, if it was parsed at all
    pub fn original(&self) -> Option<&str> {
        match self {
            ParsedProperty::Cli(_, original)
            | ParsedProperty::Env(_, original)
            | ParsedProperty::File(_, _, original) => Some(original),
            ParsedProperty::Default(_) => None,
        }
    }

    /// Human-readable origin, e.g. `file /home/me/.config/witkit/config.toml`
    pub fn describe_source(&self) -> String {
        match self {
            ParsedProperty::File(_, path, _) => format!("file {}", path.display()),
            other => other.source_name().to_string(),
        }
    }
}

impl<T> Deref for ParsedProperty<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.value()
    }
}

impl<T: Display> Display for ParsedProperty<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.value().fmt(f)
    }
}

impl<T> From<T> for ParsedProperty<T> {
    fn from(value: T) -> Self {
        ParsedProperty::Default(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// # ParsedProperty Source Tracking
    ///
    /// Tests value access and provenance for each source.
    ///
    /// ## Test Scenario
    /// - Creates ParsedProperty instances from every source
    ///
    /// ## Expected Outcome
    /// - Values are reachable by value() and Deref
    /// - Source names and originals are preserved
    #[test]
    fn test_parsed_property_source_tracking() {
        let cli_prop = ParsedProperty::Cli("fabrikam".to_string(), "--organization fabrikam".to_string());
        let env_prop = ParsedProperty::Env("fabrikam".to_string(), "fabrikam".to_string());
        let file_prop = ParsedProperty::File(
            "fabrikam".to_string(),
            PathBuf::from("/home/me/.config/witkit/config.toml"),
            "fabrikam".to_string(),
        );
        let default_prop = ParsedProperty::from("fabrikam".to_string());

        for prop in [&cli_prop, &env_prop, &file_prop, &default_prop] {
            assert_eq!(prop.value(), "fabrikam");
            assert_eq!(&**prop, "fabrikam");
        }

        assert_eq!(cli_prop.source_name(), "cli");
        assert_eq!(env_prop.source_name(), "env");
        assert_eq!(default_prop.source_name(), "default");
        assert_eq!(cli_prop.original(), Some("--organization fabrikam"));
        assert_eq!(default_prop.original(), None);
        assert_eq!(
            file_prop.describe_source(),
            "file /home/me/.config/witkit/config.toml"
        );
        assert_eq!(env_prop.describe_source(), "env");
    }

    /// # ParsedProperty with Different Types
    ///
    /// Tests ParsedProperty over numbers and booleans.
    ///
    /// ## Test Scenario
    /// - Wrap a usize and a bool
    ///
    /// ## Expected Outcome
    /// - Deref and into_value give the wrapped values
    #[test]
    fn test_parsed_property_different_types() {
        let batch = ParsedProperty::Env(50usize, "50".to_string());
        let flag = ParsedProperty::Cli(true, "--validate-only".to_string());

        assert_eq!(*batch + 10, 60);
        assert!(*flag);
        assert_eq!(batch.to_string(), "50");
        assert_eq!(flag.into_value(), true);
    }
}
