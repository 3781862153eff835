// Static LevelPlay credentials

use anyhow::Result;

use crate::config::Config;

/// Secret key and refresh token sent to the auth endpoint
#[derive(Clone)]
pub struct Credentials {
    pub secret_key: String,
    pub refresh_token: String,
}

impl Credentials {
    pub fn new(secret_key: impl Into<String>, refresh_token: impl Into<String>) -> Result<Self> {
        let secret_key = secret_key.into();
        let refresh_token = refresh_token.into();

        if secret_key.is_empty() {
            anyhow::bail!("LevelPlay secret key is empty");
        }
        if refresh_token.is_empty() {
            anyhow::bail!("LevelPlay refresh token is empty");
        }

        Ok(Self {
            secret_key,
            refresh_token,
        })
    }

    /// Take the credentials loaded from the environment into `Config`
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.secret_key.clone(), config.refresh_token.clone())
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("secret_key", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}
