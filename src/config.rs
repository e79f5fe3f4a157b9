use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::distraction::{DistractionKind, KindPolicy, default_policies};
use crate::generator::provider::{ProviderKind, ProviderSettings};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_theme")]
    pub theme: String,
    #[serde(default)]
    pub dataset_path: Option<String>,
    #[serde(default = "default_workspace_dir")]
    pub workspace_dir: String,
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub distractions: DistractionConfig,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub generator: GeneratorConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlaybackConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
    #[serde(default = "default_max_interval_ms")]
    pub max_interval_ms: u64,
    #[serde(default = "default_speed_step_ms")]
    pub speed_step_ms: u64,
    #[serde(default)]
    pub autoplay: bool,
    #[serde(default = "default_true")]
    pub diff_switch_at_line_boundary: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatExchange {
    pub question: String,
    pub answer: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DistractionConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_threshold_min")]
    pub threshold_min: u32,
    #[serde(default = "default_threshold_max")]
    pub threshold_max: u32,
    #[serde(default = "default_char_delay_ms")]
    pub char_delay_ms: u64,
    #[serde(default = "default_hold_ms")]
    pub hold_ms: u64,
    /// Per-kind policy. List order is the forced-override precedence.
    #[serde(default = "default_policies")]
    pub kinds: Vec<KindPolicy>,
    #[serde(default = "default_asides")]
    pub asides: Vec<String>,
    #[serde(default = "default_chat")]
    pub chat: Vec<ChatExchange>,
    #[serde(default = "default_terminal_commands")]
    pub terminal_commands: Vec<String>,
    #[serde(default = "default_terminal_timeout_secs")]
    pub terminal_timeout_secs: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default = "default_run_timeout_secs")]
    pub timeout_secs: u64,
    /// File extension to command template; `{entry}` is replaced with the
    /// entry file name.
    #[serde(default = "default_run_commands")]
    pub commands: BTreeMap<String, String>,
    #[serde(default = "default_true")]
    pub summary: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GeneratorConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub fallback_provider: Option<String>,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_auth_attempts")]
    pub auth_attempts: u32,
    #[serde(default = "default_generator_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_theme() -> String {
    "terminal-default".to_string()
}
fn default_workspace_dir() -> String {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("stagehand")
        .join("workspace")
        .to_string_lossy()
        .to_string()
}
fn default_true() -> bool {
    true
}
fn default_interval_ms() -> u64 {
    120
}
fn default_min_interval_ms() -> u64 {
    20
}
fn default_max_interval_ms() -> u64 {
    2000
}
fn default_speed_step_ms() -> u64 {
    20
}
fn default_threshold_min() -> u32 {
    40
}
fn default_threshold_max() -> u32 {
    120
}
fn default_char_delay_ms() -> u64 {
    45
}
fn default_hold_ms() -> u64 {
    900
}
fn default_asides() -> Vec<String> {
    [
        "# hmm, is this the right approach?",
        "# TODO: handle the empty case",
        "# wait, what does this return again",
        "# note to self: clean this up later",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
fn default_chat() -> Vec<ChatExchange> {
    vec![
        ChatExchange {
            question: "is there a cleaner way to loop over pairs here?".to_string(),
            answer: "You could zip the list with itself shifted by one, e.g. zip(xs, xs[1:]).".to_string(),
        },
        ChatExchange {
            question: "what's the complexity of sorting first?".to_string(),
            answer: "Sorting is O(n log n); a single pass afterwards keeps the total at O(n log n).".to_string(),
        },
    ]
}
fn default_terminal_commands() -> Vec<String> {
    ["ls", "pwd", "git status --short", "python3 --version"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_terminal_timeout_secs() -> u64 {
    5
}
fn default_run_timeout_secs() -> u64 {
    30
}
fn default_run_commands() -> BTreeMap<String, String> {
    [
        ("py", "python3 {entry}"),
        ("js", "node {entry}"),
        ("sh", "sh {entry}"),
    ]
    .iter()
    .map(|(ext, cmd)| (ext.to_string(), cmd.to_string()))
    .collect()
}
fn default_provider() -> String {
    ProviderKind::OpenAi.as_str().to_string()
}
fn default_max_attempts() -> u32 {
    3
}
fn default_auth_attempts() -> u32 {
    3
}
fn default_generator_timeout_secs() -> u64 {
    60
}
fn default_language() -> String {
    "python".to_string()
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            min_interval_ms: default_min_interval_ms(),
            max_interval_ms: default_max_interval_ms(),
            speed_step_ms: default_speed_step_ms(),
            autoplay: false,
            diff_switch_at_line_boundary: true,
        }
    }
}

impl Default for DistractionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold_min: default_threshold_min(),
            threshold_max: default_threshold_max(),
            char_delay_ms: default_char_delay_ms(),
            hold_ms: default_hold_ms(),
            kinds: default_policies(),
            asides: default_asides(),
            chat: default_chat(),
            terminal_commands: default_terminal_commands(),
            terminal_timeout_secs: default_terminal_timeout_secs(),
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_run_timeout_secs(),
            commands: default_run_commands(),
            summary: true,
        }
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            base_url: None,
            api_key_env: None,
            api_key: None,
            fallback_provider: None,
            max_attempts: default_max_attempts(),
            auth_attempts: default_auth_attempts(),
            timeout_secs: default_generator_timeout_secs(),
            language: default_language(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            theme: default_theme(),
            dataset_path: None,
            workspace_dir: default_workspace_dir(),
            playback: PlaybackConfig::default(),
            distractions: DistractionConfig::default(),
            run: RunConfig::default(),
            generator: GeneratorConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Read `path`, falling back to defaults when it does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("read config {}", path.display()))?;
            toml::from_str(&content).with_context(|| format!("parse config {}", path.display()))?
        } else {
            Config::default()
        };
        config.normalize();
        Ok(config)
    }

    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("stagehand")
    }

    fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Clamp ranges and reset values that cannot work. Call after
    /// deserialization.
    pub fn normalize(&mut self) {
        let p = &mut self.playback;
        p.min_interval_ms = p.min_interval_ms.max(1);
        p.max_interval_ms = p.max_interval_ms.max(p.min_interval_ms);
        p.interval_ms = p.interval_ms.clamp(p.min_interval_ms, p.max_interval_ms);
        p.speed_step_ms = p.speed_step_ms.max(1);

        let d = &mut self.distractions;
        d.threshold_min = d.threshold_min.max(1);
        d.threshold_max = d.threshold_max.max(d.threshold_min);
        let mut seen: Vec<DistractionKind> = Vec::new();
        d.kinds.retain(|policy| {
            if seen.contains(&policy.kind) {
                warn!(kind = policy.kind.as_str(), "duplicate distraction policy ignored");
                false
            } else {
                seen.push(policy.kind);
                true
            }
        });
        d.asides.retain(|a| !a.trim().is_empty());
        d.terminal_commands.retain(|c| !c.trim().is_empty());
        d.terminal_timeout_secs = d.terminal_timeout_secs.max(1);

        self.run.timeout_secs = self.run.timeout_secs.max(1);

        let g = &mut self.generator;
        if ProviderKind::parse(&g.provider).is_none() {
            warn!(provider = %g.provider, "unknown provider, using default");
            g.provider = default_provider();
        }
        if let Some(fallback) = &g.fallback_provider
            && ProviderKind::parse(fallback).is_none()
        {
            warn!(provider = %fallback, "unknown fallback provider ignored");
            g.fallback_provider = None;
        }
        g.max_attempts = g.max_attempts.max(1);
        g.auth_attempts = g.auth_attempts.max(1);
        g.timeout_secs = g.timeout_secs.max(1);
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.playback.interval_ms)
    }

    pub fn dataset_path(&self) -> Option<PathBuf> {
        self.dataset_path.as_ref().map(PathBuf::from)
    }

    pub fn workspace_path(&self) -> PathBuf {
        PathBuf::from(&self.workspace_dir)
    }

    /// Provider settings for the configured provider. An explicit key wins,
    /// then `api_key_env`, then the provider's standard variable.
    pub fn provider_settings(&self) -> ProviderSettings {
        let g = &self.generator;
        let kind = ProviderKind::parse(&g.provider).unwrap_or(ProviderKind::OpenAi);
        let mut settings = ProviderSettings::defaults_for(kind, Duration::from_secs(g.timeout_secs));
        if let Some(model) = g.model.as_ref().filter(|m| !m.trim().is_empty()) {
            settings.model = model.clone();
        }
        if let Some(url) = g.base_url.as_ref().filter(|u| !u.trim().is_empty()) {
            settings.base_url = url.clone();
        }
        if let Some(env) = g.api_key_env.as_ref()
            && let Ok(key) = std::env::var(env)
            && !key.is_empty()
        {
            settings.api_key = Some(key);
        }
        if let Some(key) = g.api_key.as_ref().filter(|k| !k.trim().is_empty()) {
            settings.api_key = Some(key.clone());
        }
        settings
    }

    pub fn fallback_settings(&self) -> Option<ProviderSettings> {
        let kind = ProviderKind::parse(self.generator.fallback_provider.as_deref()?)?;
        Some(ProviderSettings::defaults_for(
            kind,
            Duration::from_secs(self.generator.timeout_secs),
        ))
    }

    /// Command that runs `entry`, chosen by its extension. The file name is
    /// shell-quoted when it needs to be.
    pub fn run_command_for(&self, entry: &str) -> Option<String> {
        let ext = Path::new(entry).extension()?.to_str()?;
        let template = self.run.commands.get(ext)?;
        Some(template.replace("{entry}", &shell_quote(entry)))
    }
}

/// POSIX single-quoting, skipped for names made only of safe chars.
fn shell_quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '/' | '+'));
    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', "'\\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_serde_defaults_from_empty() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.theme, "terminal-default");
        assert_eq!(config.playback.interval_ms, 120);
        assert!(config.playback.diff_switch_at_line_boundary);
        assert!(config.distractions.enabled);
        assert_eq!(config.distractions.kinds.len(), 4);
        assert_eq!(config.generator.max_attempts, 3);
        assert!(config.workspace_dir.contains("stagehand"));
    }

    #[test]
    fn test_config_partial_sections() {
        let toml_str = r#"
theme = "catppuccin-mocha"

[playback]
interval_ms = 60
autoplay = true

[[distractions.kinds]]
kind = "chat"
weight = 4
min_spacing = 10
force_after = 50

[run.commands]
rb = "ruby {entry}"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.theme, "catppuccin-mocha");
        assert_eq!(config.playback.interval_ms, 60);
        assert!(config.playback.autoplay);
        assert_eq!(config.playback.max_interval_ms, 2000);
        assert_eq!(config.distractions.kinds.len(), 1);
        assert_eq!(config.distractions.kinds[0].kind, DistractionKind::Chat);
        assert!(config.distractions.kinds[0].enabled);
        assert_eq!(config.distractions.kinds[0].force_after, Some(50));
        assert_eq!(config.distractions.threshold_min, 40);
        // A user table replaces the default one.
        assert_eq!(config.run.commands.get("rb").map(String::as_str), Some("ruby {entry}"));
        assert!(!config.run.commands.contains_key("py"));
    }

    #[test]
    fn test_config_serde_roundtrip() {
        let config = Config::default();
        let serialized = toml::to_string_pretty(&config).unwrap();
        let deserialized: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(config.playback.interval_ms, deserialized.playback.interval_ms);
        assert_eq!(config.distractions.kinds, deserialized.distractions.kinds);
        assert_eq!(config.distractions.chat, deserialized.distractions.chat);
        assert_eq!(config.run.commands, deserialized.run.commands);
    }

    #[test]
    fn test_normalize_clamps_ranges() {
        let mut config = Config::default();
        config.playback.min_interval_ms = 0;
        config.playback.max_interval_ms = 50;
        config.playback.interval_ms = 500;
        config.distractions.threshold_min = 90;
        config.distractions.threshold_max = 10;
        config.generator.max_attempts = 0;
        config.normalize();
        assert_eq!(config.playback.min_interval_ms, 1);
        assert_eq!(config.playback.interval_ms, 50);
        assert_eq!(config.distractions.threshold_max, 90);
        assert_eq!(config.generator.max_attempts, 1);
    }

    #[test]
    fn test_normalize_resets_unknown_providers() {
        let mut config = Config::default();
        config.generator.provider = "gemini".to_string();
        config.generator.fallback_provider = Some("nope".to_string());
        config.normalize();
        assert_eq!(config.generator.provider, "openai");
        assert_eq!(config.generator.fallback_provider, None);
    }

    #[test]
    fn test_normalize_drops_duplicate_policies() {
        let mut config = Config::default();
        config
            .distractions
            .kinds
            .push(KindPolicy::new(DistractionKind::Aside, 99, 0, None));
        config.normalize();
        assert_eq!(config.distractions.kinds.len(), 4);
        assert!(config.distractions.kinds.iter().all(|k| k.weight != 99));
    }

    #[test]
    fn test_provider_settings_overrides() {
        let mut config = Config::default();
        config.generator.provider = "anthropic".to_string();
        config.generator.model = Some("my-model".to_string());
        config.generator.base_url = Some("http://localhost:9999".to_string());
        config.generator.api_key = Some("sk-explicit".to_string());
        let settings = config.provider_settings();
        assert_eq!(settings.kind, ProviderKind::Anthropic);
        assert_eq!(settings.model, "my-model");
        assert_eq!(settings.base_url, "http://localhost:9999");
        assert_eq!(settings.api_key.as_deref(), Some("sk-explicit"));
    }

    #[test]
    fn test_run_command_for_extension() {
        let config = Config::default();
        assert_eq!(config.run_command_for("main.py").as_deref(), Some("python3 main.py"));
        assert_eq!(config.run_command_for("Makefile"), None);
        assert_eq!(config.run_command_for("x.rs"), None);
    }

    #[test]
    fn test_run_command_quotes_entry() {
        let config = Config::default();
        assert_eq!(
            config.run_command_for("my app.py").as_deref(),
            Some("python3 'my app.py'")
        );
        assert_eq!(
            config.run_command_for("it's.py").as_deref(),
            Some(r"python3 'it'\''s.py'")
        );
        assert_eq!(
            config.run_command_for("pkg/main.py").as_deref(),
            Some("python3 pkg/main.py")
        );
    }

    #[test]
    fn test_load_from_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.playback.interval_ms, 120);
    }

    #[test]
    fn test_load_from_rejects_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "playback = 3\n[[[").unwrap();
        assert!(Config::load_from(&path).is_err());
    }
}
