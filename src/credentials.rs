//! Credential providers for the Firestore backend.
//!
//! A [`CredentialProvider`] hands out OAuth2 bearer tokens. Which provider
//! is used is decided once, at construction, from a [`CredentialSource`]:
//!
//! - [`CredentialSource::AmbientDefault`]: the gcloud application-default
//!   credentials file if one exists, otherwise the GCE / Cloud Run
//!   metadata server.
//! - [`CredentialSource::ServiceAccountFile`]: an explicit key file, either a
//!   `service_account` key (RS256-signed JWT exchanged at the token URI) or
//!   an `authorized_user` file (refresh-token grant).
//!
//! Tokens are cached and refreshed one minute before they expire.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{Result, StoreError};

/// OAuth2 scope for Firestore.
pub const DATASTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";
const REFRESH_MARGIN_SECS: i64 = 60;

/// Where credentials come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    AmbientDefault,
    ServiceAccountFile(PathBuf),
}

/// Supplies bearer tokens for outgoing requests.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Human-readable description for logs.
    fn describe(&self) -> String;

    /// A bearer token, or `None` if requests should be sent unauthenticated.
    async fn access_token(&self, client: &reqwest::Client) -> Result<Option<String>>;
}

/// Build the provider for `source`.
///
/// `emulator` short-circuits to [`NoCredentials`]; the Firestore emulator
/// accepts unauthenticated requests.
///
/// # Errors
///
/// [`StoreError::Configuration`] if an explicit key file is missing or
/// malformed.
pub fn provider_for(source: &CredentialSource, emulator: bool) -> Result<Arc<dyn CredentialProvider>> {
    if emulator {
        return Ok(Arc::new(NoCredentials));
    }
    match source {
        CredentialSource::AmbientDefault => Ok(Arc::new(AmbientDefault::new()?)),
        CredentialSource::ServiceAccountFile(path) => Ok(Arc::new(ServiceAccountFile::load(path)?)),
    }
}

/// Sends no credentials.
pub struct NoCredentials;

#[async_trait]
impl CredentialProvider for NoCredentials {
    fn describe(&self) -> String {
        "none (emulator)".to_string()
    }

    async fn access_token(&self, _client: &reqwest::Client) -> Result<Option<String>> {
        Ok(None)
    }
}

// ============ Token plumbing ============

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(REFRESH_MARGIN_SECS) < self.expires_at
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

impl TokenResponse {
    fn into_cached(self) -> CachedToken {
        CachedToken {
            token: self.access_token,
            expires_at: Utc::now() + Duration::seconds(self.expires_in),
        }
    }
}

async fn read_token_response(response: reqwest::Response, what: &str) -> Result<CachedToken> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(StoreError::Authentication(format!(
            "{} token request failed ({}): {}",
            what, status, body
        )));
    }
    let parsed: TokenResponse = response.json().await.map_err(|e| {
        StoreError::Authentication(format!("{} token response unreadable: {}", what, e))
    })?;
    Ok(parsed.into_cached())
}

async fn cached_or_fetch<F, Fut>(cache: &Mutex<Option<CachedToken>>, fetch: F) -> Result<String>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<CachedToken>>,
{
    let mut guard = cache.lock().await;
    if let Some(cached) = guard.as_ref() {
        if cached.is_fresh(Utc::now()) {
            return Ok(cached.token.clone());
        }
    }
    let fresh = fetch().await?;
    let token = fresh.token.clone();
    *guard = Some(fresh);
    Ok(token)
}

// ============ Key files ============

/// Parsed contents of a Google credentials JSON file.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum KeyFile {
    ServiceAccount {
        client_email: String,
        private_key: String,
        #[serde(default)]
        token_uri: Option<String>,
    },
    AuthorizedUser {
        client_id: String,
        client_secret: String,
        refresh_token: String,
        #[serde(default)]
        token_uri: Option<String>,
    },
}

fn read_key_file(path: &Path) -> Result<KeyFile> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        StoreError::Configuration(format!(
            "cannot read credentials file {}: {}",
            path.display(),
            e
        ))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        StoreError::Configuration(format!(
            "invalid credentials file {}: {}",
            path.display(),
            e
        ))
    })
}

#[derive(Debug, Serialize)]
struct JwtClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

enum Grant {
    Jwt {
        client_email: String,
        signing_key: jsonwebtoken::EncodingKey,
        token_uri: String,
    },
    Refresh {
        client_id: String,
        client_secret: String,
        refresh_token: String,
        token_uri: String,
    },
}

/// A token endpoint that cannot be reached is an outage, not a credential
/// problem.
fn token_endpoint_unreachable(err: reqwest::Error) -> StoreError {
    StoreError::StoreUnavailable(format!("token endpoint unreachable: {}", err))
}

impl Grant {
    fn from_key_file(key: KeyFile, path: &Path) -> Result<Self> {
        match key {
            KeyFile::ServiceAccount {
                client_email,
                private_key,
                token_uri,
            } => {
                let signing_key = jsonwebtoken::EncodingKey::from_rsa_pem(private_key.as_bytes())
                    .map_err(|e| {
                        StoreError::Configuration(format!(
                            "invalid private key in {}: {}",
                            path.display(),
                            e
                        ))
                    })?;
                Ok(Grant::Jwt {
                    client_email,
                    signing_key,
                    token_uri: token_uri.unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string()),
                })
            }
            KeyFile::AuthorizedUser {
                client_id,
                client_secret,
                refresh_token,
                token_uri,
            } => Ok(Grant::Refresh {
                client_id,
                client_secret,
                refresh_token,
                token_uri: token_uri.unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string()),
            }),
        }
    }

    async fn fetch(&self, client: &reqwest::Client) -> Result<CachedToken> {
        match self {
            Grant::Jwt {
                client_email,
                signing_key,
                token_uri,
            } => {
                let iat = Utc::now().timestamp();
                let claims = JwtClaims {
                    iss: client_email,
                    scope: DATASTORE_SCOPE,
                    aud: token_uri,
                    iat,
                    exp: iat + 3600,
                };
                let header = jsonwebtoken::Header::new(jsonwebtoken::Algorithm::RS256);
                let assertion = jsonwebtoken::encode(&header, &claims, signing_key)
                    .map_err(|e| StoreError::Authentication(format!("cannot sign JWT: {}", e)))?;
                let response = client
                    .post(token_uri)
                    .form(&[
                        ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                        ("assertion", assertion.as_str()),
                    ])
                    .send()
                    .await
                    .map_err(token_endpoint_unreachable)?;
                read_token_response(response, "service account").await
            }
            Grant::Refresh {
                client_id,
                client_secret,
                refresh_token,
                token_uri,
            } => {
                let response = client
                    .post(token_uri)
                    .form(&[
                        ("grant_type", "refresh_token"),
                        ("client_id", client_id.as_str()),
                        ("client_secret", client_secret.as_str()),
                        ("refresh_token", refresh_token.as_str()),
                    ])
                    .send()
                    .await
                    .map_err(token_endpoint_unreachable)?;
                read_token_response(response, "authorized user").await
            }
        }
    }
}

// ============ Explicit key file ============

/// Credentials from an explicit key file.
pub struct ServiceAccountFile {
    path: PathBuf,
    grant: Grant,
    cache: Mutex<Option<CachedToken>>,
}

impl ServiceAccountFile {
    /// Read and validate the key file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let key = read_key_file(path)?;
        let grant = Grant::from_key_file(key, path)?;
        Ok(Self {
            path: path.to_path_buf(),
            grant,
            cache: Mutex::new(None),
        })
    }
}

#[async_trait]
impl CredentialProvider for ServiceAccountFile {
    fn describe(&self) -> String {
        format!("key file {}", self.path.display())
    }

    async fn access_token(&self, client: &reqwest::Client) -> Result<Option<String>> {
        let token = cached_or_fetch(&self.cache, || async {
            debug!(path = %self.path.display(), "fetching access token from key file");
            self.grant.fetch(client).await
        })
        .await?;
        Ok(Some(token))
    }
}

// ============ Ambient ============

/// Application-default credentials.
pub struct AmbientDefault {
    well_known: Option<(PathBuf, Grant)>,
    cache: Mutex<Option<CachedToken>>,
}

impl AmbientDefault {
    /// Use the gcloud application-default credentials file if present.
    ///
    /// # Errors
    ///
    /// [`StoreError::Configuration`] if that file exists but cannot be
    /// used. Without the file, tokens come from the metadata server.
    pub fn new() -> Result<Self> {
        Self::from_adc_file(well_known_adc_path())
    }

    fn from_adc_file(path: Option<PathBuf>) -> Result<Self> {
        let well_known = match path {
            Some(path) => {
                let key = read_key_file(&path)?;
                let grant = Grant::from_key_file(key, &path)?;
                Some((path, grant))
            }
            None => None,
        };
        Ok(Self {
            well_known,
            cache: Mutex::new(None),
        })
    }
}

fn well_known_adc_path() -> Option<PathBuf> {
    let home = std::env::var_os("HOME")?;
    let path = PathBuf::from(home).join(".config/gcloud/application_default_credentials.json");
    path.is_file().then_some(path)
}

async fn fetch_metadata_token(client: &reqwest::Client) -> Result<CachedToken> {
    let response = client
        .get(METADATA_TOKEN_URL)
        .header("Metadata-Flavor", "Google")
        .send()
        .await
        .map_err(|e| {
            StoreError::Authentication(format!(
                "no ambient credentials: metadata server unreachable ({}); \
                 set a credentials file or run on Google Cloud",
                e
            ))
        })?;
    read_token_response(response, "metadata server").await
}

#[async_trait]
impl CredentialProvider for AmbientDefault {
    fn describe(&self) -> String {
        match &self.well_known {
            Some((path, _)) => format!("application default ({})", path.display()),
            None => "application default (metadata server)".to_string(),
        }
    }

    async fn access_token(&self, client: &reqwest::Client) -> Result<Option<String>> {
        let token = cached_or_fetch(&self.cache, || async {
            match &self.well_known {
                Some((_, grant)) => grant.fetch(client).await,
                None => fetch_metadata_token(client).await,
            }
        })
        .await?;
        Ok(Some(token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_missing_key_file_is_configuration_error() {
        let err = ServiceAccountFile::load(Path::new("/nonexistent/sa.json"))
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_malformed_key_file_is_configuration_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("sa.json");
        fs::write(&path, r#"{"type": "service_account", "client_email": "x@y"}"#).unwrap();
        let err = ServiceAccountFile::load(&path).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Configuration);

        fs::write(
            &path,
            r#"{"type": "service_account", "client_email": "x@y", "private_key": "not a pem"}"#,
        )
        .unwrap();
        let err = ServiceAccountFile::load(&path).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.to_string().contains("private key"));
    }

    #[test]
    fn test_authorized_user_file_loads() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("adc.json");
        fs::write(
            &path,
            r#"{"type": "authorized_user", "client_id": "id", "client_secret": "s", "refresh_token": "r"}"#,
        )
        .unwrap();
        let provider = ServiceAccountFile::load(&path).unwrap();
        assert!(provider.describe().contains("adc.json"));
    }

    #[test]
    fn test_malformed_adc_file_is_configuration_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("application_default_credentials.json");
        fs::write(&path, "{ not json").unwrap();

        let err = AmbientDefault::from_adc_file(Some(path)).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.to_string().contains("application_default_credentials.json"));
    }

    #[test]
    fn test_missing_adc_file_uses_metadata_server() {
        let provider = AmbientDefault::from_adc_file(None).unwrap();
        assert_eq!(provider.describe(), "application default (metadata server)");
    }

    #[tokio::test]
    async fn test_unreachable_token_endpoint_is_retryable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("adc.json");
        fs::write(
            &path,
            format!(
                r#"{{"type": "authorized_user", "client_id": "id", "client_secret": "s", "refresh_token": "r", "token_uri": "http://{}/token"}}"#,
                addr
            ),
        )
        .unwrap();

        let provider = ServiceAccountFile::load(&path).unwrap();
        let err = provider
            .access_token(&reqwest::Client::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StoreUnavailable);
        assert!(err.kind().is_retryable());
    }

    #[tokio::test]
    async fn test_emulator_sends_no_token() {
        let provider = provider_for(&CredentialSource::AmbientDefault, true).unwrap();
        let client = reqwest::Client::new();
        assert_eq!(provider.access_token(&client).await.unwrap(), None);
    }

    #[test]
    fn test_token_freshness_margin() {
        let now = Utc::now();
        let token = CachedToken {
            token: "t".into(),
            expires_at: now + Duration::seconds(30),
        };
        assert!(!token.is_fresh(now));
        let token = CachedToken {
            token: "t".into(),
            expires_at: now + Duration::seconds(600),
        };
        assert!(token.is_fresh(now));
    }
}
