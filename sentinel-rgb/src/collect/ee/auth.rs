use anyhow::{Context, Result};
use std::process::Command;

use super::ee_collect::EeError;

/// Environment variable holding a ready-made OAuth2 access token
pub const ACCESS_TOKEN_ENV: &str = "EE_ACCESS_TOKEN";

/// How the Earth Engine bearer token is obtained
#[derive(Debug, Clone, PartialEq)]
pub enum Credentials {
    /// Token supplied directly (flag, config file or `EE_ACCESS_TOKEN`)
    AccessToken(String),
    /// Ask the gcloud CLI for application-default credentials
    /// (`gcloud auth application-default login` must have been run once)
    GcloudCli,
}

impl Credentials {
    /// Explicit token first, then `EE_ACCESS_TOKEN`, then the gcloud CLI
    pub fn resolve(explicit: Option<String>) -> Self {
        Self::resolve_from(explicit, std::env::var(ACCESS_TOKEN_ENV).ok())
    }

    fn resolve_from(explicit: Option<String>, from_env: Option<String>) -> Self {
        explicit
            .into_iter()
            .chain(from_env)
            .map(|t| t.trim().to_string())
            .find(|t| !t.is_empty())
            .map(Credentials::AccessToken)
            .unwrap_or(Credentials::GcloudCli)
    }

    pub fn access_token(&self) -> Result<String> {
        match self {
            Credentials::AccessToken(token) => Ok(token.clone()),
            Credentials::GcloudCli => Self::token_from_gcloud(),
        }
    }

    fn token_from_gcloud() -> Result<String> {
        log::debug!("Requesting access token from gcloud CLI");

        let output = Command::new("gcloud")
            .args(["auth", "application-default", "print-access-token"])
            .output()
            .context("Failed to run gcloud; install the Google Cloud SDK or set EE_ACCESS_TOKEN")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EeError::Auth(format!(
                "gcloud exited with {}: {}",
                output.status,
                stderr.trim()
            ))
            .into());
        }

        let token = String::from_utf8(output.stdout)
            .context("gcloud returned a non UTF-8 token")?
            .trim()
            .to_string();

        if token.is_empty() {
            return Err(EeError::Auth("gcloud returned an empty access token".to_string()).into());
        }

        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_token_wins() {
        let creds =
            Credentials::resolve_from(Some("explicit".to_string()), Some("env".to_string()));
        assert_eq!(creds, Credentials::AccessToken("explicit".to_string()));
    }

    #[test]
    fn test_env_token_used_when_no_explicit() {
        let creds = Credentials::resolve_from(None, Some(" env-token\n".to_string()));
        assert_eq!(creds, Credentials::AccessToken("env-token".to_string()));
    }

    #[test]
    fn test_blank_tokens_fall_back_to_gcloud() {
        let creds = Credentials::resolve_from(Some("  ".to_string()), Some(String::new()));
        assert_eq!(creds, Credentials::GcloudCli);
        assert_eq!(Credentials::resolve_from(None, None), Credentials::GcloudCli);
    }

    #[test]
    fn test_access_token_passthrough() {
        let creds = Credentials::AccessToken("abc".to_string());
        assert_eq!(creds.access_token().unwrap(), "abc");
    }
}
