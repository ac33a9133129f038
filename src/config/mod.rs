use anyhow::Result;
use dotenvy::dotenv;
use serde::Deserialize;

/// Runtime configuration, loaded once from the environment and passed
/// around explicitly. Third-party credentials stay optional: commands
/// that need them fail with a pointed message instead of at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_database_path")]
    pub database_path: String,
    pub telegram_bot_token: Option<String>,
    pub yandex_vision_api_key: Option<String>,
    pub yandex_folder_id: Option<String>,
    pub deepseek_api_key: Option<String>,
    /// External script spawned by the retrain handler.
    pub retrain_script: Option<String>,
}

fn default_database_path() -> String {
    "stella.sqlite".to_string()
}

impl Config {
    /// Loads variables from a `.env` file if present, then deserializes
    /// the environment into the struct.
    pub fn load() -> Result<Self> {
        dotenv().ok();
        let config = envy::from_env::<Config>()?;
        Ok(config)
    }

    pub fn telegram_bot_token(&self) -> Result<&str> {
        self.telegram_bot_token
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("TELEGRAM_BOT_TOKEN не задан"))
    }

    pub fn yandex_vision_api_key(&self) -> Result<&str> {
        self.yandex_vision_api_key
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("YANDEX_VISION_API_KEY не задан"))
    }

    pub fn deepseek_api_key(&self) -> Result<&str> {
        self.deepseek_api_key
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("DEEPSEEK_API_KEY не задан"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_credentials_produce_pointed_errors() {
        let config = Config {
            database_path: default_database_path(),
            telegram_bot_token: None,
            yandex_vision_api_key: None,
            yandex_folder_id: None,
            deepseek_api_key: None,
            retrain_script: None,
        };
        assert!(config.telegram_bot_token().is_err());
        assert!(config.yandex_vision_api_key().is_err());
        assert!(config.deepseek_api_key().is_err());
    }
}
