use anyhow::{Context, Result};
use ovl_core::{AgentMode, DEFAULT_MAX_FRAME_BYTES};
use ovl_session::LayoutMetrics;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// On-disk shape of `config.toml`. Every key is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    agent_mode: Option<String>,
    socket_path: Option<PathBuf>,
    debug: Option<bool>,
    log_dir: Option<PathBuf>,
    log_level: Option<String>,
    max_frame_bytes: Option<usize>,
    layout: LayoutMetrics,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusConfig {
    pub mode: AgentMode,
    pub socket_path: PathBuf,
    pub layout: LayoutMetrics,
    pub log_dir: Option<PathBuf>,
    pub log_level: String,
    pub debug: bool,
    pub max_frame_bytes: usize,
}

/// Values taken from the command line; they win over file and environment.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub config_path: Option<PathBuf>,
    pub mode: Option<AgentMode>,
    pub socket_path: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
    pub debug: bool,
}

pub fn load(cli: &CliOverrides) -> Result<StatusConfig> {
    load_with(cli, |key| std::env::var(key).ok())
}

pub fn load_with(
    cli: &CliOverrides,
    env: impl Fn(&str) -> Option<String>,
) -> Result<StatusConfig> {
    let env = |key: &str| env(key).filter(|value| !value.trim().is_empty());

    let path = cli
        .config_path
        .clone()
        .or_else(|| env("OVL_CONFIG_PATH").map(PathBuf::from))
        .unwrap_or_else(|| default_config_path(&env));
    let file = read_file_config(&path)?;

    let mut mode = match &file.agent_mode {
        Some(raw) => {
            parse_mode(raw).with_context(|| format!("agent_mode in {}", path.display()))?
        }
        None => AgentMode::default(),
    };
    if let Some(raw) = env("OVL_AGENT_MODE") {
        mode = parse_mode(&raw).context("OVL_AGENT_MODE")?;
    }
    if let Some(cli_mode) = cli.mode {
        mode = cli_mode;
    }

    let socket_path = cli
        .socket_path
        .clone()
        .or_else(|| env("OVL_SOCKET_PATH").map(PathBuf::from))
        .or(file.socket_path)
        .unwrap_or_else(|| default_socket_path(&env));

    let log_dir = cli
        .log_dir
        .clone()
        .or_else(|| env("OVL_LOG_DIR").map(PathBuf::from))
        .or(file.log_dir);

    let debug = cli.debug
        || env("OVL_DEBUG")
            .map(|raw| parse_flag(&raw))
            .or(file.debug)
            .unwrap_or(false);

    let log_level = env("OVL_LOG_LEVEL")
        .or(file.log_level)
        .unwrap_or_else(|| (if debug { "debug" } else { "info" }).to_string());

    Ok(StatusConfig {
        mode,
        socket_path,
        layout: file.layout,
        log_dir,
        log_level,
        debug,
        max_frame_bytes: file.max_frame_bytes.unwrap_or(DEFAULT_MAX_FRAME_BYTES),
    })
}

fn read_file_config(path: &Path) -> Result<FileConfig> {
    if !path.exists() {
        return Ok(FileConfig::default());
    }
    let contents =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    toml::from_str(&contents).with_context(|| format!("parsing {}", path.display()))
}

fn parse_mode(raw: &str) -> Result<AgentMode> {
    raw.parse::<AgentMode>().map_err(anyhow::Error::msg)
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn default_config_path(env: &impl Fn(&str) -> Option<String>) -> PathBuf {
    let config_dir = env("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| home_dir(env).join(".config"));
    config_dir.join("ovl").join("config.toml")
}

fn default_socket_path(env: &impl Fn(&str) -> Option<String>) -> PathBuf {
    let runtime_dir = if let Some(value) = env("XDG_RUNTIME_DIR") {
        PathBuf::from(value)
    } else if let Some(uid) = env("UID") {
        PathBuf::from(format!("/run/user/{uid}"))
    } else {
        PathBuf::from("/tmp")
    };
    runtime_dir.join("ovl").join("agent.sock")
}

fn home_dir(env: &impl Fn(&str) -> Option<String>) -> PathBuf {
    env("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    fn write_config(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("config.toml");
        fs::write(&path, body).expect("write config");
        path
    }

    #[test]
    fn defaults_without_file_or_env() {
        let dir = TempDir::new().expect("tempdir");
        let home = dir.path().to_string_lossy().to_string();
        let config = load_with(&CliOverrides::default(), env_from(&[("HOME", home.as_str())]))
            .expect("load");
        assert_eq!(config.mode, AgentMode::Legacy);
        assert_eq!(config.socket_path, PathBuf::from("/tmp/ovl/agent.sock"));
        assert_eq!(config.layout, LayoutMetrics::default());
        assert_eq!(config.log_level, "info");
        assert_eq!(config.max_frame_bytes, DEFAULT_MAX_FRAME_BYTES);
        assert!(!config.debug);
    }

    #[test]
    fn file_then_env_then_cli() {
        let dir = TempDir::new().expect("tempdir");
        let path = write_config(
            &dir,
            r#"
agent_mode = "goals"
socket_path = "/var/run/agent.sock"
log_level = "warn"

[layout]
width = 720
row = 36
"#,
        );
        let path_str = path.to_string_lossy().to_string();

        let config = load_with(
            &CliOverrides::default(),
            env_from(&[("OVL_CONFIG_PATH", path_str.as_str())]),
        )
        .expect("file only");
        assert_eq!(config.mode, AgentMode::Goals);
        assert_eq!(config.socket_path, PathBuf::from("/var/run/agent.sock"));
        assert_eq!(config.layout.width, 720);
        assert_eq!(config.layout.row, 36);
        assert_eq!(config.layout.base, LayoutMetrics::default().base);
        assert_eq!(config.log_level, "warn");

        let env = env_from(&[
            ("OVL_CONFIG_PATH", path_str.as_str()),
            ("OVL_AGENT_MODE", "v2"),
            ("OVL_SOCKET_PATH", "/tmp/env.sock"),
        ]);
        let config = load_with(&CliOverrides::default(), &env).expect("file and env");
        assert_eq!(config.mode, AgentMode::Tools);
        assert_eq!(config.socket_path, PathBuf::from("/tmp/env.sock"));

        let cli = CliOverrides {
            mode: Some(AgentMode::Legacy),
            socket_path: Some(PathBuf::from("/tmp/cli.sock")),
            ..CliOverrides::default()
        };
        let config = load_with(&cli, &env).expect("all layers");
        assert_eq!(config.mode, AgentMode::Legacy);
        assert_eq!(config.socket_path, PathBuf::from("/tmp/cli.sock"));
    }

    #[test]
    fn debug_flag_lowers_default_log_level() {
        let config = load_with(
            &CliOverrides::default(),
            env_from(&[("HOME", "/nonexistent"), ("OVL_DEBUG", "true")]),
        )
        .expect("load");
        assert!(config.debug);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn invalid_mode_and_unknown_keys_are_errors() {
        let dir = TempDir::new().expect("tempdir");
        let path = write_config(&dir, "agent_mode = \"pipeline\"\n");
        let cli = CliOverrides {
            config_path: Some(path),
            ..CliOverrides::default()
        };
        assert!(load_with(&cli, env_from(&[])).is_err());

        let path = write_config(&dir, "agnet_mode = \"goals\"\n");
        let cli = CliOverrides {
            config_path: Some(path),
            ..CliOverrides::default()
        };
        assert!(load_with(&cli, env_from(&[])).is_err());

        assert!(load_with(
            &CliOverrides::default(),
            env_from(&[("HOME", "/nonexistent"), ("OVL_AGENT_MODE", "bogus")])
        )
        .is_err());
    }

    #[test]
    fn runtime_dir_drives_default_socket() {
        let config = load_with(
            &CliOverrides::default(),
            env_from(&[("HOME", "/nonexistent"), ("XDG_RUNTIME_DIR", "/run/user/501")]),
        )
        .expect("load");
        assert_eq!(config.socket_path, PathBuf::from("/run/user/501/ovl/agent.sock"));
    }
}
