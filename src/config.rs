//! Workbench configuration management

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main workbench configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkbenchConfig {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Analysis agent configuration
    #[serde(default)]
    pub agent: AgentConfig,

    /// Ticket creation configuration
    #[serde(default)]
    pub tickets: TicketsConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Allowed CORS origins (empty = allow any, for local development)
    pub cors_origins: Vec<String>,

    /// Directory of the bundled frontend, served as a fallback behind the API
    pub static_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            cors_origins: Vec::new(),
            static_dir: Some(PathBuf::from("ui")),
        }
    }
}

/// Analysis agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Agent executable name or path, resolved via PATH when not absolute
    pub binary: String,

    /// Workspace-relative path of the analysis command template file.
    /// Its content is embedded into the initial prompt; absence is tolerated.
    pub command_template: PathBuf,

    /// Grace period in seconds between the polite termination signal and
    /// the forced kill when cancelling a session
    pub grace_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            binary: "cursor-agent".to_string(),
            command_template: PathBuf::from(".cursor/commands/analyze-feature-spec.md"),
            grace_secs: 5,
        }
    }
}

/// Ticket creation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketsConfig {
    /// Tracker CLI executable name or path
    pub binary: String,

    /// Base URL for browse links to created issues
    pub browse_base_url: String,
}

impl Default for TicketsConfig {
    fn default() -> Self {
        Self {
            binary: "acli".to_string(),
            browse_base_url: "https://your-site.atlassian.net/browse".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = WorkbenchConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.agent.binary, "cursor-agent");
        assert_eq!(config.agent.grace_secs, 5);
        assert_eq!(config.tickets.binary, "acli");
    }

    #[test]
    fn test_toml_round_trip() {
        let config = WorkbenchConfig::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        let parsed: WorkbenchConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.server.port, config.server.port);
        assert_eq!(parsed.agent.command_template, config.agent.command_template);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let parsed: WorkbenchConfig = toml::from_str(
            r#"
            [server]
            host = "0.0.0.0"
            port = 9000
            cors_origins = []
            "#,
        )
        .unwrap();
        assert_eq!(parsed.server.host, "0.0.0.0");
        assert_eq!(parsed.server.port, 9000);
        assert_eq!(parsed.agent.binary, "cursor-agent");
    }
}
