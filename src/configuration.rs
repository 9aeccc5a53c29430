use std::{fmt, str::FromStr};

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use secrecy::{ExposeSecret, SecretString};

use crate::domain::user_email::UserEmail;
use crate::email_client::EmailClient;

#[derive(Deserialize, Clone)]
pub struct Settings {
    pub app_settings: AppSettings,
    pub database: DBSettings,
    pub email_client: EmailClientSettings,
}

#[derive(Deserialize, Clone)]
pub struct AppSettings {
    pub host: [u8; 4], // IPv4 address
    pub port: u16,
    pub app_name: String,
}

#[derive(Deserialize, Clone)]
pub struct DBSettings {
    pub username: String,
    pub password: SecretString,
    pub host: String,
    pub port: u16,
    pub database_name: String,
}

#[derive(Deserialize, Clone)]
pub struct EmailClientSettings {
    pub api_base_url: String,
    pub sender_email: String,
    pub server_token: SecretString,
    pub timeout_milliseconds: u64,
}

impl EmailClientSettings {
    pub fn sender(&self) -> Result<UserEmail, String> {
        self.sender_email.parse()
    }

    pub fn client(&self) -> EmailClient {
        let sender = self.sender().expect("Invalid sender email address");
        EmailClient::new(
            self.api_base_url.clone(),
            sender,
            self.server_token.clone(),
            self.timeout_milliseconds,
        )
    }
}

enum RunningEnv {
    Local,
    Production,
}

impl RunningEnv {
    pub fn as_str(&self) -> &str {
        match self {
            RunningEnv::Local => "local",
            RunningEnv::Production => "production",
        }
    }
}

impl fmt::Display for RunningEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RunningEnv {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(RunningEnv::Local),
            "production" => Ok(RunningEnv::Production),
            _ => Err("Invalid environment specified"),
        }
    }
}

impl DBSettings {
    pub fn get_connection(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username,
            self.password.expose_secret(),
            self.host,
            self.port,
            self.database_name
        )
    }

    pub fn get_connection_without_database(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}",
            self.username,
            self.password.expose_secret(),
            self.host,
            self.port
        )
    }
}

pub fn get_config() -> Result<Settings, ConfigError> {
    let current_dir =
        std::env::current_dir().expect("Failed to get current directory");
    let config_path = current_dir.join("configurations");

    let running_env =
        std::env::var("RUNNING_ENV").unwrap_or_else(|_| "local".to_string());
    let running_env: RunningEnv =
        running_env.as_str().parse().unwrap_or_else(|err| {
            panic!("Failed to parse RUNNING_ENV: {err}");
        });

    let app_config_file = format!("{running_env}.yaml");
    let config = Config::builder()
        .add_source(File::with_name(
            config_path
                .join("base.yaml")
                .to_str()
                .expect("Invalid path"),
        ))
        .add_source(File::from(config_path.join(app_config_file)))
        .add_source(Environment::with_prefix("GATEHOUSE").separator("__"))
        .build()?;

    config.try_deserialize::<Settings>()
}
