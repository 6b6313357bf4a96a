use anyhow::Result;
use std::env;

/// Shared-secret settings for the identity tokens this service accepts.
/// Tokens are minted by the identity collaborator; the same secret lets the
/// dev/test mint in `utils::jwt` produce equivalent ones.
#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub token_expiry: u64,
}

impl JwtConfig {
    pub fn from_env() -> Result<Self> {
        let secret = env::var("JWT_SECRET")
            .map_err(|_| anyhow::anyhow!("JWT_SECRET environment variable must be set"))?;

        if secret.len() < 32 {
            return Err(anyhow::anyhow!("JWT_SECRET must be at least 32 characters"));
        }

        let token_expiry = env::var("JWT_EXPIRATION")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3600); // 1 hour

        Ok(Self {
            secret,
            token_expiry,
        })
    }
}
