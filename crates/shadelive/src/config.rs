use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use renderer::{DriverMode, ShellCompiler};
use serde::de::{self, Deserializer};
use serde::Deserialize;
use shaderschema::{CommandPreprocessor, ShaderSourceAnalyzer};
use uniforms::DebounceSettings;

use crate::cli::{Cli, CommandLine};

/// Preprocessor name that disables preprocessing.
pub const NO_PREPROCESSOR: &str = "none";

/// Contents of `shadelive.toml`. Every field is optional; command-line flags
/// override whatever the file sets.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ShadeliveConfig {
    pub shader: Option<PathBuf>,
    pub window: WindowSection,
    pub compiler: CommandSection,
    pub preprocessor: CommandSection,
    pub osc: OscSection,
    pub uniforms: UniformsSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WindowSection {
    pub title: Option<String>,
    pub width: u32,
    pub height: u32,
    pub free_run: bool,
}

impl Default for WindowSection {
    fn default() -> Self {
        Self {
            title: None,
            width: 960,
            height: 540,
            free_run: false,
        }
    }
}

/// An external tool. `args = None` keeps the tool's default arguments.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CommandSection {
    pub program: Option<String>,
    pub args: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OscSection {
    /// UDP address to listen on; no listener when unset.
    pub bind: Option<String>,
    pub prefix: String,
}

impl Default for OscSection {
    fn default() -> Self {
        Self {
            bind: None,
            prefix: "uniform".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UniformsSection {
    pub file: Option<PathBuf>,
    #[serde(deserialize_with = "deserialize_duration")]
    pub persist_delay: Duration,
    #[serde(deserialize_with = "deserialize_duration")]
    pub undo_window: Duration,
    #[serde(deserialize_with = "deserialize_duration")]
    pub refresh_delay: Duration,
    pub undo_limit: usize,
}

impl Default for UniformsSection {
    fn default() -> Self {
        let debounce = DebounceSettings::default();
        Self {
            file: None,
            persist_delay: debounce.persist,
            undo_window: debounce.undo,
            refresh_delay: debounce.refresh,
            undo_limit: 256,
        }
    }
}

impl ShadeliveConfig {
    /// Reads `path`. A missing file yields the defaults unless `required`.
    pub fn load(path: &Path, required: bool) -> Result<Self> {
        if !required && !path.exists() {
            tracing::debug!(path = %path.display(), "no config file; using defaults");
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file at {}", path.display()))?;
        let mut config: Self = toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file at {}", path.display()))?;
        if let Some(base) = path.parent() {
            config.resolve_relative(base);
        }
        Ok(config)
    }

    /// Paths written in the file are relative to the file's directory.
    fn resolve_relative(&mut self, base: &Path) {
        for path in [&mut self.shader, &mut self.uniforms.file]
            .into_iter()
            .flatten()
        {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }

    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(shader) = &cli.shader {
            self.shader = Some(shader.clone());
        }
        if let Some(size) = cli.size {
            self.window.width = size.width;
            self.window.height = size.height;
        }
        if cli.free_run {
            self.window.free_run = true;
        }
        if let Some(bind) = &cli.osc_bind {
            self.osc.bind = Some(bind.clone());
        }
        if let Some(prefix) = &cli.osc_prefix {
            self.osc.prefix = prefix.clone();
        }
        if let Some(file) = &cli.uniforms_file {
            self.uniforms.file = Some(file.clone());
        }
        if let Some(command) = &cli.compiler {
            self.compiler.override_with(command);
        }
        if let Some(command) = &cli.preprocessor {
            self.preprocessor.override_with(command);
        }
    }

    pub fn driver_mode(&self) -> DriverMode {
        if self.window.free_run {
            DriverMode::FreeRunning
        } else {
            DriverMode::Vsync
        }
    }

    pub fn debounce_settings(&self) -> DebounceSettings {
        DebounceSettings {
            persist: self.uniforms.persist_delay,
            undo: self.uniforms.undo_window,
            refresh: self.uniforms.refresh_delay,
        }
    }

    pub fn compiler(&self) -> ShellCompiler {
        ShellCompiler::new(
            self.compiler
                .program
                .clone()
                .unwrap_or_else(|| ShellCompiler::DEFAULT_PROGRAM.to_string()),
            self.compiler
                .args
                .clone()
                .unwrap_or_else(ShellCompiler::default_args),
        )
    }

    pub fn analyzer(&self) -> ShaderSourceAnalyzer {
        match self.preprocessor.program.as_deref() {
            Some(NO_PREPROCESSOR) => ShaderSourceAnalyzer::passthrough(),
            program => ShaderSourceAnalyzer::new(Box::new(CommandPreprocessor::new(
                program.unwrap_or(CommandPreprocessor::DEFAULT_PROGRAM),
                self.preprocessor
                    .args
                    .clone()
                    .unwrap_or_else(CommandPreprocessor::default_args),
            ))),
        }
    }
}

impl CommandSection {
    fn override_with(&mut self, command: &CommandLine) {
        self.program = Some(command.program.clone());
        self.args = if command.args.is_empty() {
            None
        } else {
            Some(command.args.clone())
        };
    }
}

/// Accepts `"750ms"`-style strings or a number of seconds.
fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Duration::from_secs(v))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_secs(v as u64))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if !v.is_finite() || v.is_sign_negative() {
                return Err(E::custom("duration must be a finite, non-negative number"));
            }
            Duration::try_from_secs_f64(v)
                .map_err(|err| E::custom(format!("invalid duration {v}: {err}")))
        }
    }

    deserializer.deserialize_any(Visitor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("shadelive.toml");
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn missing_optional_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config = ShadeliveConfig::load(&dir.path().join("absent.toml"), false).unwrap();
        assert!(config.shader.is_none());
        assert_eq!(config.osc.prefix, "uniform");
        assert_eq!(config.debounce_settings(), DebounceSettings::default());
        assert_eq!(config.driver_mode(), DriverMode::Vsync);
    }

    #[test]
    fn missing_required_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = ShadeliveConfig::load(&dir.path().join("absent.toml"), true).unwrap_err();
        assert!(err.to_string().contains("failed to read config file"));
    }

    #[test]
    fn parses_sections_and_durations() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"
shader = "shaders/plasma.slang"

[window]
width = 320
height = 200
free_run = true

[osc]
bind = "127.0.0.1:9000"
prefix = "knobs"

[uniforms]
persist_delay = "1s 500ms"
undo_window = 0.1
refresh_delay = "10ms"
"#,
        );

        let config = ShadeliveConfig::load(&path, true).unwrap();
        assert_eq!(config.shader, Some(dir.path().join("shaders/plasma.slang")));
        assert_eq!(config.window.width, 320);
        assert_eq!(config.driver_mode(), DriverMode::FreeRunning);
        assert_eq!(config.osc.bind.as_deref(), Some("127.0.0.1:9000"));
        assert_eq!(config.osc.prefix, "knobs");
        let debounce = config.debounce_settings();
        assert_eq!(debounce.persist, Duration::from_millis(1500));
        assert_eq!(debounce.undo, Duration::from_millis(100));
        assert_eq!(debounce.refresh, Duration::from_millis(10));
    }

    #[test]
    fn rejects_unknown_keys_and_bad_durations() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "[window]\nwdith = 3\n");
        let err = ShadeliveConfig::load(&path, true).unwrap_err();
        assert!(format!("{err:#}").contains("wdith"));

        let path = write_config(&dir, "[uniforms]\npersist_delay = \"soon\"\n");
        let err = ShadeliveConfig::load(&path, true).unwrap_err();
        assert!(format!("{err:#}").contains("invalid duration 'soon'"));
    }

    #[test]
    fn non_finite_and_oversized_seconds_are_rejected() {
        let dir = TempDir::new().unwrap();
        for value in ["inf", "nan", "1e300"] {
            let path = write_config(&dir, &format!("[uniforms]\npersist_delay = {value}\n"));
            let err = ShadeliveConfig::load(&path, true).unwrap_err();
            assert!(format!("{err:#}").contains("duration"), "{value}: {err:#}");
        }
    }

    #[test]
    fn cli_flags_override_the_file() {
        let mut config = ShadeliveConfig::default();
        config.compiler.args = Some(vec!["stale".into()]);
        let cli = Cli::try_parse_from([
            "shadelive",
            "demo.slang",
            "--size",
            "64x32",
            "--osc-prefix",
            "p",
            "--compiler",
            "glslc {input} -o {output}",
            "--preprocessor",
            "mcpp",
        ])
        .unwrap();

        config.apply_cli(&cli);

        assert_eq!(config.shader, Some(PathBuf::from("demo.slang")));
        assert_eq!((config.window.width, config.window.height), (64, 32));
        assert_eq!(config.osc.prefix, "p");
        assert_eq!(config.compiler().program(), "glslc");
        assert_eq!(
            config.compiler.args.as_deref(),
            Some(&["{input}".to_string(), "-o".into(), "{output}".into()][..])
        );
        assert_eq!(config.preprocessor.program.as_deref(), Some("mcpp"));
        assert!(config.preprocessor.args.is_none());
    }

    #[test]
    fn bare_program_keeps_default_arguments() {
        let mut config = ShadeliveConfig::default();
        assert_eq!(config.compiler().program(), ShellCompiler::DEFAULT_PROGRAM);
        config.compiler.override_with(&CommandLine {
            program: "/opt/slang/bin/slangc".into(),
            args: Vec::new(),
        });
        assert_eq!(config.compiler().program(), "/opt/slang/bin/slangc");
        assert!(config.compiler.args.is_none());
    }
}
