use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable that overrides `gitter.token`
pub const TOKEN_ENV: &str = "ROOMWATCH_GITTER_TOKEN";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub gitter: GitterConfig,
    #[serde(default)]
    pub rooms: RoomsConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitterConfig {
    pub token: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_stream_url")]
    pub stream_url: String,
}

fn default_api_url() -> String {
    "https://api.gitter.im".to_string()
}

fn default_stream_url() -> String {
    "https://stream.gitter.im".to_string()
}

/// Rooms to monitor. An empty list means every room the account is in.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RoomsConfig {
    #[serde(default)]
    pub names: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_connect_timeout() -> u64 {
    10
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl Config {
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Replace the configured token, ignoring blank values
    pub fn override_token(&mut self, token: Option<&str>) {
        if let Some(token) = token.map(str::trim).filter(|t| !t.is_empty()) {
            self.gitter.token = token.to_string();
        }
    }
}

pub fn config_dir() -> Result<PathBuf> {
    let dir = directories::ProjectDirs::from("", "", "roomwatch")
        .context("Could not determine config directory")?
        .config_dir()
        .to_path_buf();
    Ok(dir)
}

pub fn default_config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Load the config file, letting `ROOMWATCH_GITTER_TOKEN` override its token
pub fn load(path: Option<&Path>) -> Result<Config> {
    let env_token = std::env::var(TOKEN_ENV).ok();
    load_with_token(path, env_token.as_deref())
}

/// Same as [`load`], with the token override passed in instead of read from
/// the environment
pub fn load_with_token(path: Option<&Path>, token: Option<&str>) -> Result<Config> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => default_config_path()?,
    };

    if !path.exists() {
        anyhow::bail!(
            "Config file not found at {}. Run `roomwatch --init` to create one.",
            path.display()
        );
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;

    let mut config = Config::from_toml(&content)
        .with_context(|| format!("Failed to parse config from {}", path.display()))?;
    config.override_token(token);

    if config.gitter.token.trim().is_empty() {
        anyhow::bail!(
            "No Gitter token configured in {} (or via {})",
            path.display(),
            TOKEN_ENV
        );
    }

    Ok(config)
}

/// Split a comma separated room list, dropping blanks
pub fn parse_room_list(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

pub async fn init_wizard() -> Result<()> {
    use std::io::{self, Write};

    println!("roomwatch Configuration Wizard");
    println!("==============================\n");

    let config_path = default_config_path()?;
    if config_path.exists() {
        print!("Config already exists at {}. Overwrite? [y/N] ", config_path.display());
        io::stdout().flush()?;
        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Aborted.");
            return Ok(());
        }
    }

    print!("Gitter token (https://developer.gitter.im/apps): ");
    io::stdout().flush()?;
    let mut token = String::new();
    io::stdin().read_line(&mut token)?;

    print!("Rooms to monitor, comma separated (press Enter for all): ");
    io::stdout().flush()?;
    let mut rooms = String::new();
    io::stdin().read_line(&mut rooms)?;

    let config = Config {
        gitter: GitterConfig {
            token: token.trim().to_string(),
            api_url: default_api_url(),
            stream_url: default_stream_url(),
        },
        rooms: RoomsConfig {
            names: parse_room_list(&rooms),
        },
        http: HttpConfig::default(),
    };

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Write config with restricted permissions
    let content = toml::to_string_pretty(&config)?;
    std::fs::write(&config_path, content)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&config_path, std::fs::Permissions::from_mode(0o600))?;
    }

    println!("\nConfig saved to {}", config_path.display());
    println!("Run `roomwatch` to start streaming.");

    Ok(())
}
