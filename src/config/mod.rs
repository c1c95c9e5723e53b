//! Configuration module for pktgraph
//!
//! A router description lists elements (name, class, arguments) and the
//! connections between their ports, plus run-loop settings. Descriptions
//! are stored as TOML or JSON; the format is chosen by file extension.
//!
//! # Example
//!
//! ```toml
//! [settings]
//! tasks_per_iteration = 32
//!
//! [[elements]]
//! name = "src"
//! class = "InfiniteSource"
//! args = ["hello", 100]
//!
//! [[elements]]
//! name = "sink"
//! class = "Discard"
//!
//! [[connections]]
//! from = "src"
//! to = "sink"
//! ```

pub mod settings;

pub use settings::*;

use crate::error::{PktGraphError, Result};
use crate::router::args::{ArgValue, Args};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Extension for TOML router descriptions
pub const TOML_EXTENSION: &str = "toml";

/// Extension for JSON router descriptions
pub const JSON_EXTENSION: &str = "json";

/// One element in a router description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementDecl {
    /// Unique element name
    pub name: String,

    /// Registered class name
    pub class: String,

    /// Positional configuration arguments
    #[serde(default)]
    pub args: Vec<ArgValue>,
}

impl ElementDecl {
    pub fn new(name: impl Into<String>, class: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            class: class.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<ArgValue>) -> Self {
        self.args = args;
        self
    }

    pub fn args(&self) -> Args {
        Args::new(self.args.clone())
    }
}

/// One connection in a router description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionDecl {
    pub from: String,
    #[serde(default)]
    pub from_port: usize,
    pub to: String,
    #[serde(default)]
    pub to_port: usize,
}

impl ConnectionDecl {
    /// Connect output 0 of `from` to input 0 of `to`.
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::ports(from, 0, to, 0)
    }

    pub fn ports(
        from: impl Into<String>,
        from_port: usize,
        to: impl Into<String>,
        to_port: usize,
    ) -> Self {
        Self {
            from: from.into(),
            from_port,
            to: to.into(),
            to_port,
        }
    }
}

/// A complete router description
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Run-loop settings
    #[serde(default)]
    pub settings: RouterSettings,

    /// Elements, in initialization order
    #[serde(default)]
    pub elements: Vec<ElementDecl>,

    /// Connections between element ports
    #[serde(default)]
    pub connections: Vec<ConnectionDecl>,
}

impl RouterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an element (builder style)
    pub fn element(mut self, decl: ElementDecl) -> Self {
        self.elements.push(decl);
        self
    }

    /// Add a connection (builder style)
    pub fn connect(mut self, decl: ConnectionDecl) -> Self {
        self.connections.push(decl);
        self
    }

    pub fn find_element(&self, name: &str) -> Option<&ElementDecl> {
        self.elements.iter().find(|e| e.name == name)
    }

    /// Parse a TOML description
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| PktGraphError::Config(format!("Failed to parse TOML: {}", e)))
    }

    /// Parse a JSON description
    pub fn from_json_str(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| PktGraphError::Config(format!("Failed to parse JSON: {}", e)))
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| PktGraphError::Serialization(format!("Failed to serialize TOML: {}", e)))
    }

    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| PktGraphError::Serialization(format!("Failed to serialize JSON: {}", e)))
    }

    /// Load a description from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            PktGraphError::Config(format!("Failed to read router config {:?}: {}", path, e))
        })?;

        let config = match Self::format_of(path)? {
            Format::Toml => Self::from_toml_str(&content),
            Format::Json => Self::from_json_str(&content),
        }
        .map_err(|e| e.with_context(format!("{}", path.display())))?;

        tracing::debug!(
            "Loaded router config {:?}: {} elements, {} connections",
            path,
            config.elements.len(),
            config.connections.len()
        );
        Ok(config)
    }

    /// Save a description to disk
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = match Self::format_of(path)? {
            Format::Toml => self.to_toml_string()?,
            Format::Json => self.to_json_string()?,
        };

        std::fs::write(path, content).map_err(|e| {
            PktGraphError::Config(format!("Failed to write router config {:?}: {}", path, e))
        })
    }

    /// Check names and references without building anything
    pub fn validate(&self) -> Result<()> {
        self.settings
            .validate()
            .map_err(|e| PktGraphError::Config(format!("Invalid settings: {}", e)))?;

        let mut names = HashSet::new();
        for decl in &self.elements {
            if decl.name.is_empty() || decl.name.contains('.') {
                return Err(PktGraphError::Config(format!(
                    "Invalid element name {:?}",
                    decl.name
                )));
            }
            if !names.insert(decl.name.as_str()) {
                return Err(PktGraphError::Config(format!(
                    "Duplicate element name {:?}",
                    decl.name
                )));
            }
        }

        for conn in &self.connections {
            for name in [&conn.from, &conn.to] {
                if !names.contains(name.as_str()) {
                    return Err(PktGraphError::Config(format!(
                        "Connection refers to unknown element {:?}",
                        name
                    )));
                }
            }
        }
        Ok(())
    }

    fn format_of(path: &Path) -> Result<Format> {
        match path.extension().and_then(|e| e.to_str()) {
            Some(TOML_EXTENSION) => Ok(Format::Toml),
            Some(JSON_EXTENSION) => Ok(Format::Json),
            _ => Err(PktGraphError::Config(format!(
                "Unsupported router config format {:?} (expected .{} or .{})",
                path, TOML_EXTENSION, JSON_EXTENSION
            ))),
        }
    }
}

enum Format {
    Toml,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[settings]
tasks_per_iteration = 16

[[elements]]
name = "src"
class = "InfiniteSource"
args = ["payload", 10, 2]

[[elements]]
name = "q"
class = "Queue"
args = [100]

[[elements]]
name = "sink"
class = "PullSink"

[[connections]]
from = "src"
to = "q"

[[connections]]
from = "q"
to = "sink"
to_port = 0
"#;

    fn sample() -> RouterConfig {
        RouterConfig::new()
            .element(ElementDecl::new("src", "InfiniteSource").with_args(vec![
                ArgValue::from("abc"),
                ArgValue::from(5_i64),
            ]))
            .element(ElementDecl::new("c", "Counter"))
            .element(ElementDecl::new("sink", "Discard"))
            .connect(ConnectionDecl::new("src", "c"))
            .connect(ConnectionDecl::new("c", "sink"))
    }

    #[test]
    fn test_parse_toml() {
        let config = RouterConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.settings.tasks_per_iteration, 16);
        assert_eq!(config.settings.default_tickets, 1024);
        assert_eq!(config.elements.len(), 3);
        assert_eq!(
            config.find_element("src").unwrap().args,
            vec![
                ArgValue::Str("payload".into()),
                ArgValue::Int(10),
                ArgValue::Int(2)
            ]
        );
        assert!(config.find_element("sink").unwrap().args.is_empty());
        assert_eq!(config.connections[0], ConnectionDecl::new("src", "q"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_load_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("router.toml");
        let config = sample();
        config.save(&path).unwrap();
        assert_eq!(RouterConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_save_and_load_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("router.json");
        let config = sample();
        config.save(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"InfiniteSource\""));
        assert_eq!(RouterConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("router.yaml");
        assert!(matches!(
            sample().save(&path),
            Err(PktGraphError::Config(_))
        ));
    }

    #[test]
    fn test_load_reports_parse_errors_with_path() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        std::io::Write::write_all(&mut file, b"[[elements]]\nname = 3\n").unwrap();
        let err = RouterConfig::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse TOML"));
    }

    #[test]
    fn test_validate_duplicate_and_unknown_names() {
        let dup = sample().element(ElementDecl::new("c", "Null"));
        assert!(dup.validate().unwrap_err().to_string().contains("Duplicate"));

        let dangling = sample().connect(ConnectionDecl::new("c", "nowhere"));
        assert!(dangling
            .validate()
            .unwrap_err()
            .to_string()
            .contains("unknown element"));

        let dotted = RouterConfig::new().element(ElementDecl::new("a.b", "Null"));
        assert!(dotted.validate().is_err());
    }
}
