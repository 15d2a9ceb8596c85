//! Service-account authentication (OAuth2 JWT bearer grant, RFC 7523).
//!
//! A signed assertion is exchanged at the key's `token_uri` for a short-lived
//! access token, which is cached until shortly before it expires.

use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::{Error, Result};

const SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets.readonly";
const GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME: Duration = Duration::hours(1);
/// Tokens this close to expiry are treated as expired.
const EXPIRY_MARGIN: Duration = Duration::seconds(60);

fn default_token_uri() -> String { "https://oauth2.googleapis.com/token".to_owned() }

/// The fields of a Google service-account JSON key that we use.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
  pub client_email:   String,
  /// PEM-encoded RSA private key.
  pub private_key:    String,
  pub private_key_id: Option<String>,
  #[serde(default = "default_token_uri")]
  pub token_uri:      String,
}

impl ServiceAccountKey {
  pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)?;
    let key: Self = serde_json::from_str(&raw)?;
    if key.client_email.is_empty() || key.private_key.is_empty() {
      return Err(Error::Credentials(format!(
        "{} is missing client_email or private_key",
        path.display()
      )));
    }
    Ok(key)
  }
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
  iss:   &'a str,
  scope: &'a str,
  aud:   &'a str,
  iat:   i64,
  exp:   i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
  access_token: String,
  expires_in:   i64,
}

#[derive(Debug, Clone)]
struct AccessToken {
  value:      String,
  expires_at: DateTime<Utc>,
}

/// Issues and caches access tokens for one service account.
pub struct ServiceAccount {
  key:     ServiceAccountKey,
  signer:  EncodingKey,
  http:    reqwest::Client,
  current: Mutex<Option<AccessToken>>,
}

impl std::fmt::Debug for ServiceAccount {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ServiceAccount")
      .field("client_email", &self.key.client_email)
      .finish_non_exhaustive()
  }
}

impl ServiceAccount {
  pub fn new(key: ServiceAccountKey, http: reqwest::Client) -> Result<Self> {
    let signer = EncodingKey::from_rsa_pem(key.private_key.as_bytes())?;
    Ok(Self {
      key,
      signer,
      http,
      current: Mutex::new(None),
    })
  }

  pub fn client_email(&self) -> &str { &self.key.client_email }

  /// A valid bearer token, reusing the cached one while it lasts.
  ///
  /// Concurrent callers serialize on the cache so at most one exchange runs
  /// at a time.
  pub async fn access_token(&self) -> Result<String> {
    let mut current = self.current.lock().await;
    if let Some(token) = current.as_ref()
      && token.expires_at - EXPIRY_MARGIN > Utc::now()
    {
      return Ok(token.value.clone());
    }

    let token = self.exchange().await?;
    let value = token.value.clone();
    *current = Some(token);
    Ok(value)
  }

  fn assertion(&self, now: DateTime<Utc>) -> Result<String> {
    let claims = Claims {
      iss:   &self.key.client_email,
      scope: SCOPE,
      aud:   &self.key.token_uri,
      iat:   now.timestamp(),
      exp:   (now + ASSERTION_LIFETIME).timestamp(),
    };
    let mut header = Header::new(Algorithm::RS256);
    header.kid = self.key.private_key_id.clone();
    Ok(jsonwebtoken::encode(&header, &claims, &self.signer)?)
  }

  async fn exchange(&self) -> Result<AccessToken> {
    let now = Utc::now();
    let assertion = self.assertion(now)?;
    debug!(token_uri = %self.key.token_uri, "requesting access token");

    let resp = self
      .http
      .post(&self.key.token_uri)
      .form(&[("grant_type", GRANT_TYPE), ("assertion", assertion.as_str())])
      .send()
      .await?;

    let status = resp.status();
    let body = resp.text().await?;
    // 400 is how the token endpoint rejects a bad grant or assertion.
    if matches!(
      status,
      StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
    ) {
      return Err(Error::Unauthorized {
        status: status.as_u16(),
        body,
      });
    }
    if !status.is_success() {
      return Err(Error::Status {
        status: status.as_u16(),
        body,
      });
    }

    let parsed: TokenResponse = serde_json::from_str(&body)?;
    info!(
      client_email = %self.key.client_email,
      expires_in = parsed.expires_in,
      "obtained access token"
    );
    Ok(AccessToken {
      value:      parsed.access_token,
      expires_at: now + Duration::seconds(parsed.expires_in),
    })
  }
}
