//! GitHub App Authentication
//!
//! Mints App JWTs from the App's private key, exchanges them for
//! installation access tokens, and derives git HTTPS credentials from those.
//!
//! Installation tokens live for about an hour. The provider caches one per
//! installation and re-mints it once less than [`REFRESH_MARGIN_SECS`]
//! remain, so a run that outlasts a token keeps working.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::config::Config;
use crate::error::{ConfigError, CultivatorError, Result};
use crate::github;

/// Re-mint an installation token when it has fewer seconds of validity left.
pub const REFRESH_MARGIN_SECS: i64 = 5 * 60;

/// Username GitHub expects when an installation token is used over HTTPS.
pub const GIT_USERNAME: &str = "x-access-token";

/// JWT claims for GitHub App authentication
#[derive(Debug, Serialize, Deserialize)]
pub struct GitHubAppClaims {
    /// Issued at time (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
    /// Issuer (GitHub App ID)
    pub iss: String,
}

/// Generate a JWT for GitHub App authentication
///
/// Backdated 60 seconds for clock skew and valid for 9 minutes, under
/// GitHub's 10 minute ceiling.
pub fn generate_jwt(app_id: u64, key: &EncodingKey) -> Result<String> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| CultivatorError::Auth(format!("System time error: {e}")))?
        .as_secs();

    let claims = GitHubAppClaims {
        iat: now.saturating_sub(60),
        exp: now + 9 * 60,
        iss: app_id.to_string(),
    };

    encode(&Header::new(Algorithm::RS256), &claims, key)
        .map_err(|e| CultivatorError::Auth(format!("Failed to encode JWT: {e}")))
}

/// Response from GitHub installation token endpoint
#[derive(Clone, Deserialize)]
pub struct InstallationToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl InstallationToken {
    /// Whether the token is expired or about to be at `now`.
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - now < Duration::seconds(REFRESH_MARGIN_SECS)
    }
}

impl std::fmt::Debug for InstallationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallationToken")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Basic-auth pair for git over HTTPS.
#[derive(Clone, PartialEq, Eq)]
pub struct GitCredential {
    pub username: String,
    password: String,
}

impl GitCredential {
    pub fn from_installation_token(token: impl Into<String>) -> Self {
        Self {
            username: GIT_USERNAME.to_string(),
            password: token.into(),
        }
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// Embed the credential into an http(s) remote URL.
    ///
    /// Local paths and other transports are returned unchanged.
    pub fn authenticate(&self, remote: &str) -> String {
        match reqwest::Url::parse(remote) {
            Ok(mut url) if matches!(url.scheme(), "http" | "https") => {
                if url.set_username(&self.username).is_err()
                    || url.set_password(Some(&self.password)).is_err()
                {
                    return remote.to_string();
                }
                url.to_string()
            }
            _ => remote.to_string(),
        }
    }
}

impl std::fmt::Debug for GitCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitCredential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Strip any userinfo from a remote URL before it reaches a log line.
pub fn redact_url(remote: &str) -> String {
    match reqwest::Url::parse(remote) {
        Ok(mut url) if !url.username().is_empty() || url.password().is_some() => {
            let _ = url.set_username("");
            let _ = url.set_password(None);
            url.to_string()
        }
        _ => remote.to_string(),
    }
}

/// Turns the App's key and ID into bearer tokens and git credentials.
pub struct CredentialProvider {
    app_id: u64,
    encoding_key: EncodingKey,
    api_url: String,
    http: reqwest::Client,
    tokens: Mutex<HashMap<u64, InstallationToken>>,
}

impl std::fmt::Debug for CredentialProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialProvider")
            .field("app_id", &self.app_id)
            .field("api_url", &self.api_url)
            .finish_non_exhaustive()
    }
}

impl CredentialProvider {
    /// Build a provider from the configured App ID and key file.
    pub fn from_config(config: &Config) -> Result<Self> {
        let key_data =
            std::fs::read(&config.private_key_file).map_err(|source| ConfigError::Read {
                path: config.private_key_file.clone(),
                source,
            })?;
        Self::new(config.integration_id, &key_data, &config.github_api_url)
    }

    /// Build a provider from an in-memory PEM key.
    pub fn new(app_id: u64, private_key_pem: &[u8], api_url: &str) -> Result<Self> {
        let encoding_key = EncodingKey::from_rsa_pem(private_key_pem)
            .map_err(|e| CultivatorError::Auth(format!("Invalid RSA private key: {e}")))?;

        let http = reqwest::Client::builder()
            .user_agent(github::USER_AGENT)
            .build()?;

        Ok(Self {
            app_id,
            encoding_key,
            api_url: api_url.trim_end_matches('/').to_string(),
            http,
            tokens: Mutex::new(HashMap::new()),
        })
    }

    pub fn app_id(&self) -> u64 {
        self.app_id
    }

    pub(crate) fn api_url(&self) -> &str {
        &self.api_url
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Fresh App-level JWT.
    pub fn app_token(&self) -> Result<String> {
        generate_jwt(self.app_id, &self.encoding_key)
    }

    /// Installation-scoped token, re-minted when close to expiry.
    pub async fn installation_token(&self, installation_id: u64) -> Result<String> {
        Ok(self.installation_access(installation_id).await?.token)
    }

    /// Installation token together with its expiry.
    pub async fn installation_access(&self, installation_id: u64) -> Result<InstallationToken> {
        let mut tokens = self.tokens.lock().await;
        if let Some(cached) = tokens.get(&installation_id) {
            if !cached.needs_refresh(Utc::now()) {
                return Ok(cached.clone());
            }
            debug!(
                installation_id,
                expires_at = %cached.expires_at,
                "Installation token close to expiry, re-minting"
            );
        }

        let minted = self
            .mint_installation_token(installation_id)
            .await
            .map_err(|e| CultivatorError::token_mint(installation_id, e))?;
        tokens.insert(installation_id, minted.clone());
        Ok(minted)
    }

    /// Git HTTPS credential for an installation.
    pub async fn git_credential(&self, installation_id: u64) -> Result<GitCredential> {
        let token = self.installation_token(installation_id).await?;
        Ok(GitCredential::from_installation_token(token))
    }

    /// Exchange the App JWT for an installation access token.
    #[instrument(skip(self), fields(app_id = self.app_id))]
    async fn mint_installation_token(&self, installation_id: u64) -> Result<InstallationToken> {
        let jwt = self.app_token()?;
        let url = format!(
            "{}/app/installations/{}/access_tokens",
            self.api_url, installation_id
        );

        let response = github::request(&self.http, Method::POST, &url, &jwt)
            .send()
            .await?;
        let token: InstallationToken = github::check_status(response).await?.json().await?;

        info!(
            installation_id,
            expires_at = %token.expires_at,
            "Minted installation token"
        );
        Ok(token)
    }
}
