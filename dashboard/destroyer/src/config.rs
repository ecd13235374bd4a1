use serde::Deserialize;
use std::{
    env,
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

const DEFAULT_ENV: &str = "dev";

#[derive(Debug, Deserialize, Clone)]
pub struct DestroyerConfig {
    pub database: String,
    pub redis: String,
    pub discord: DiscordConfig,
    pub web: WebConfig,
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(skip)]
    pub environment: String,
    #[serde(skip)]
    pub is_prod: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebConfig {
    pub port: u16,
    pub session_secret: String,
    /// Where OAuth and logout redirects land when the request carries no usable origin.
    #[serde(default = "default_redirect")]
    pub default_redirect: String,
    #[serde(default)]
    pub secure_cookies: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MetricsConfig {
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DiscordConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub bot_token: Option<String>,
    /// Base URL of an HTTP proxy in front of the Discord API.
    pub proxy: Option<String>,
}

impl DiscordConfig {
    /// The bot token, treating an empty string the same as a missing one.
    pub fn bot_token(&self) -> Option<&str> {
        self.bot_token.as_deref().filter(|token| !token.is_empty())
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    pub freshness_secs: u64,
    pub retention_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            freshness_secs: 5 * 60,
            retention_secs: 10 * 60,
        }
    }
}

fn default_redirect() -> String {
    String::from("http://localhost:3000")
}

/// Loads the config for the dashboard. Panics if the reading the files fails or parsing fails.
pub fn load_config() -> DestroyerConfig {
    let (path, environment) = get_config_path_and_environment();

    let file = File::open(&path);
    assert!(file.is_ok(), "Cannot open JSON config at {:?}", path);
    let reader = BufReader::new(file.unwrap());
    let mut config: DestroyerConfig = simd_json::serde::from_reader(reader)
        .unwrap_or_else(|err| panic!("Malformed JSON config at {:?}: {}", path, err));

    config.is_prod = environment != DEFAULT_ENV;
    config.environment = environment;
    config
}

fn get_config_path_and_environment() -> (Box<Path>, String) {
    let mut buffer: PathBuf = ["/etc", "destroyer"].iter().collect();
    let execution_env: String = env::var("DESTROYER_ENV")
        .unwrap_or_else(|_| String::from(DEFAULT_ENV))
        .to_lowercase();
    buffer.push(&execution_env);
    (buffer.into_boxed_path(), execution_env)
}
