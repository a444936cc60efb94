//! audren-renderer configuration file
//!
//! ```toml
//! [logging]
//! level = "debug"
//!
//! [renderer]
//! sample_rate = 48000
//! voice_count = 64
//!
//! [session]
//! sessions = 2
//! voices = 32
//! ```

use std::path::Path;

use serde::Deserialize;

use audren_common::config::{load_or_default, resolve_config_path, LoggingConfig, CONFIG_ENV_VAR};

use crate::error::Result;
use crate::types::RendererConfiguration;

/// Daemon-side session settings
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionSettings {
    /// Sessions opened against the shared mixer
    pub sessions: u32,
    /// Synthetic voices started per session
    pub voices: u32,
    pub rendering_time_limit_percent: u32,
    pub voice_drop_parameter: f32,
    /// Upsampler slots shared by all sessions
    pub upsampler_count: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            sessions: 1,
            voices: 8,
            rendering_time_limit_percent: 100,
            voice_drop_parameter: 1.0,
            upsampler_count: 4,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct TomlConfig {
    pub logging: LoggingConfig,
    pub renderer: RendererConfiguration,
    pub session: SessionSettings,
}

impl TomlConfig {
    /// Load from `cli_path`, `AUDREN_CONFIG` or the platform config dir
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        let path = resolve_config_path(cli_path, CONFIG_ENV_VAR);
        Ok(load_or_default(path.as_deref())?)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(audren_common::config::parse_toml(content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ExecutionMode, RenderingDevice};
    use std::io::Write;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = TomlConfig::parse(
            r#"
            [renderer]
            voice_count = 96
            rendering_device = "cpu"

            [session]
            voices = 40
            "#,
        )
        .unwrap();

        assert_eq!(config.renderer.voice_count, 96);
        assert_eq!(config.renderer.rendering_device, RenderingDevice::Cpu);
        assert_eq!(config.renderer.execution_mode, ExecutionMode::Auto);
        assert_eq!(config.renderer.sample_count, 240);
        assert_eq!(config.session.voices, 40);
        assert_eq!(config.session.sessions, 1);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_from_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[session]\nsessions = 3").unwrap();
        let config = TomlConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.session.sessions, 3);
    }

    #[test]
    fn test_unknown_device_is_an_error() {
        let err = TomlConfig::parse("[renderer]\nrendering_device = \"gpu\"").unwrap_err();
        assert!(err.to_string().contains("rendering_device") || err.to_string().contains("gpu"));
    }
}
