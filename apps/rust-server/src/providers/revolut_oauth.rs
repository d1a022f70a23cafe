// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Revolut Business API access through OAuth2 client assertions.
//!
//! A short-lived RS256 JWT signed with the locally stored private key is
//! exchanged, together with the long-lived refresh token, for an access
//! token. Access tokens are cached in a [`TokenCache`] until shortly before
//! they expire.

use std::{fs, future::Future};

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::{env_optional, env_or_default, env_present, env_required, http_client, read_json, ProviderError};
use crate::config::{
    REVOLUT_BUSINESS_API_BASE_URL_ENV, REVOLUT_CLIENT_ID_ENV, REVOLUT_ISSUER_DOMAIN_ENV,
    REVOLUT_PRIVATE_KEY_PATH_ENV, REVOLUT_PRIVATE_KEY_PEM_ENV, REVOLUT_REFRESH_TOKEN_ENV,
};

const PROVIDER: &str = "revolut";
const DEFAULT_BUSINESS_API_BASE_URL: &str = "https://sandbox-b2b.revolut.com";
const ASSERTION_AUDIENCE: &str = "https://revolut.com";
const ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";
const ASSERTION_TTL_SECS: i64 = 600;
/// Tokens this close to expiry are treated as expired.
const EXPIRY_MARGIN_SECS: i64 = 30;
/// Used when the token response omits `expires_in`.
const DEFAULT_TOKEN_TTL_SECS: i64 = 2400;
/// Upper bound on the lifetime we trust from a token response.
const MAX_TOKEN_TTL_SECS: i64 = 86_400;

/// An access token and the instant it stops being valid.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - Duration::seconds(EXPIRY_MARGIN_SECS) > now
    }
}

/// Source of new access tokens.
pub trait TokenFetcher: Send + Sync {
    fn fetch_token(&self) -> impl Future<Output = Result<AccessToken, ProviderError>> + Send;
}

/// Process-wide access token cache keyed by expiry.
///
/// Concurrent misses may each fetch a token; the last one stored wins.
pub struct TokenCache<F> {
    fetcher: F,
    slot: RwLock<Option<AccessToken>>,
}

impl<F: TokenFetcher> TokenCache<F> {
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher,
            slot: RwLock::new(None),
        }
    }

    /// Cached token if still fresh, otherwise exactly one fetch.
    pub async fn get_token(&self) -> Result<String, ProviderError> {
        if let Some(token) = self.slot.read().await.as_ref() {
            if token.is_fresh_at(Utc::now()) {
                return Ok(token.value.clone());
            }
        }

        debug!("access token missing or expired, fetching a new one");
        let token = self.fetcher.fetch_token().await?;
        let value = token.value.clone();
        *self.slot.write().await = Some(token);
        Ok(value)
    }

    /// Drop the cached token; the next `get_token` fetches.
    pub async fn invalidate(&self) {
        *self.slot.write().await = None;
    }
}

#[derive(Clone)]
pub struct RevolutOAuthConfig {
    pub business_api_base_url: String,
    pub client_id: String,
    pub refresh_token: String,
    pub private_key_pem: String,
    /// Redirect domain registered with the certificate; the assertion `iss`.
    pub issuer_domain: String,
}

impl RevolutOAuthConfig {
    pub fn is_configured() -> bool {
        env_present(REVOLUT_CLIENT_ID_ENV)
            && env_present(REVOLUT_REFRESH_TOKEN_ENV)
            && env_present(REVOLUT_ISSUER_DOMAIN_ENV)
            && (env_present(REVOLUT_PRIVATE_KEY_PEM_ENV) || env_present(REVOLUT_PRIVATE_KEY_PATH_ENV))
    }

    pub fn from_env() -> Result<Self, ProviderError> {
        Ok(Self {
            business_api_base_url: env_or_default(
                REVOLUT_BUSINESS_API_BASE_URL_ENV,
                DEFAULT_BUSINESS_API_BASE_URL,
            ),
            client_id: env_required(PROVIDER, REVOLUT_CLIENT_ID_ENV)?,
            refresh_token: env_required(PROVIDER, REVOLUT_REFRESH_TOKEN_ENV)?,
            private_key_pem: load_private_key_pem()?,
            issuer_domain: env_required(PROVIDER, REVOLUT_ISSUER_DOMAIN_ENV)?,
        })
    }
}

fn load_private_key_pem() -> Result<String, ProviderError> {
    if let Some(pem) = env_optional(REVOLUT_PRIVATE_KEY_PEM_ENV) {
        return Ok(pem.replace("\\n", "\n"));
    }

    let path = env_required(PROVIDER, REVOLUT_PRIVATE_KEY_PATH_ENV)?;
    fs::read_to_string(&path).map_err(|e| ProviderError::MissingConfig {
        provider: PROVIDER,
        name: format!("{REVOLUT_PRIVATE_KEY_PATH_ENV} ({path}): {e}"),
    })
}

#[derive(Debug, Serialize, Deserialize)]
struct ClientAssertionClaims {
    iss: String,
    sub: String,
    aud: String,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Fetches access tokens from the Revolut token endpoint.
pub struct AssertionTokenFetcher {
    http: Client,
    token_url: String,
    client_id: String,
    refresh_token: String,
    issuer_domain: String,
    signing_key: EncodingKey,
}

impl AssertionTokenFetcher {
    pub fn new(http: Client, config: &RevolutOAuthConfig) -> Result<Self, ProviderError> {
        let signing_key =
            EncodingKey::from_rsa_pem(config.private_key_pem.as_bytes()).map_err(|e| {
                ProviderError::MissingConfig {
                    provider: PROVIDER,
                    name: format!("valid RSA private key: {e}"),
                }
            })?;

        Ok(Self {
            http,
            token_url: format!(
                "{}/api/1.0/auth/token",
                config.business_api_base_url.trim_end_matches('/')
            ),
            client_id: config.client_id.clone(),
            refresh_token: config.refresh_token.clone(),
            issuer_domain: config.issuer_domain.clone(),
            signing_key,
        })
    }

    /// Signed client assertion valid for ten minutes from `now`.
    pub fn client_assertion(&self, now: DateTime<Utc>) -> Result<String, ProviderError> {
        let claims = ClientAssertionClaims {
            iss: self.issuer_domain.clone(),
            sub: self.client_id.clone(),
            aud: ASSERTION_AUDIENCE.to_string(),
            exp: now.timestamp() + ASSERTION_TTL_SECS,
        };
        encode(&Header::new(Algorithm::RS256), &claims, &self.signing_key).map_err(|e| {
            ProviderError::Auth {
                provider: PROVIDER,
                message: format!("failed to sign client assertion: {e}"),
            }
        })
    }
}

impl TokenFetcher for AssertionTokenFetcher {
    async fn fetch_token(&self) -> Result<AccessToken, ProviderError> {
        let now = Utc::now();
        let assertion = self.client_assertion(now)?;
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", self.refresh_token.as_str()),
            ("client_id", self.client_id.as_str()),
            ("client_assertion_type", ASSERTION_TYPE),
            ("client_assertion", assertion.as_str()),
        ];

        let response = self
            .http
            .post(&self.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| ProviderError::Auth {
                provider: PROVIDER,
                message: format!("token request failed: {e}"),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Auth {
                provider: PROVIDER,
                message: format!("token request returned {status}: {body}"),
            });
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            ProviderError::invalid(PROVIDER, format!("invalid token response: {e}"))
        })?;
        if token.access_token.trim().is_empty() {
            return Err(ProviderError::invalid(
                PROVIDER,
                "token response did not include access_token",
            ));
        }

        info!("revolut access token refreshed");
        Ok(AccessToken {
            value: token.access_token,
            expires_at: token_expiry(now, token.expires_in),
        })
    }
}

fn token_expiry(now: DateTime<Utc>, expires_in: Option<i64>) -> DateTime<Utc> {
    let ttl = expires_in
        .unwrap_or(DEFAULT_TOKEN_TTL_SECS)
        .clamp(0, MAX_TOKEN_TTL_SECS);
    now + Duration::seconds(ttl)
}

/// Business API client; owns the token cache.
pub struct RevolutOAuthClient {
    http: Client,
    business_api_base_url: String,
    tokens: TokenCache<AssertionTokenFetcher>,
}

impl RevolutOAuthClient {
    pub fn new(config: RevolutOAuthConfig) -> Result<Self, ProviderError> {
        let http = http_client(PROVIDER)?;
        let fetcher = AssertionTokenFetcher::new(http.clone(), &config)?;
        Ok(Self {
            http,
            business_api_base_url: config.business_api_base_url,
            tokens: TokenCache::new(fetcher),
        })
    }

    pub fn tokens(&self) -> &TokenCache<AssertionTokenFetcher> {
        &self.tokens
    }

    /// Latest account transactions. A 401 drops the cached token and the
    /// call is retried once with a fresh one.
    pub async fn list_transactions(&self, count: u32) -> Result<Value, ProviderError> {
        let path = "/api/1.0/transactions";
        let url = format!(
            "{}{}",
            self.business_api_base_url.trim_end_matches('/'),
            path
        );

        for attempt in 0..2 {
            let token = self.tokens.get_token().await?;
            let response = self
                .http
                .get(&url)
                .bearer_auth(&token)
                .query(&[("count", count)])
                .send()
                .await
                .map_err(|e| ProviderError::request(PROVIDER, format!("GET {path} failed: {e}")))?;

            if response.status() == StatusCode::UNAUTHORIZED && attempt == 0 {
                warn!("revolut rejected cached access token, refreshing");
                self.tokens.invalidate().await;
                continue;
            }

            return read_json(PROVIDER, &format!("GET {path}"), response).await;
        }

        Err(ProviderError::Auth {
            provider: PROVIDER,
            message: "access token rejected after refresh".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{decode, DecodingKey, Validation};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TEST_PRIVATE_KEY: &str = include_str!("testdata/revolut_test_key.pem");

    #[test]
    fn token_lifetime_is_bounded() {
        let now = Utc::now();
        assert_eq!(token_expiry(now, None), now + Duration::seconds(DEFAULT_TOKEN_TTL_SECS));
        assert_eq!(token_expiry(now, Some(2399)), now + Duration::seconds(2399));
        assert_eq!(
            token_expiry(now, Some(i64::MAX)),
            now + Duration::seconds(MAX_TOKEN_TTL_SECS)
        );
        assert_eq!(token_expiry(now, Some(i64::MIN)), now);
    }
    const TEST_PUBLIC_KEY: &str = include_str!("testdata/revolut_test_key.pub.pem");

    struct CountingFetcher {
        calls: Arc<AtomicUsize>,
        ttl_secs: i64,
    }

    impl TokenFetcher for CountingFetcher {
        async fn fetch_token(&self) -> Result<AccessToken, ProviderError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(AccessToken {
                value: format!("token-{n}"),
                expires_at: Utc::now() + Duration::seconds(self.ttl_secs),
            })
        }
    }

    fn counting_cache(ttl_secs: i64) -> (TokenCache<CountingFetcher>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = TokenCache::new(CountingFetcher {
            calls: calls.clone(),
            ttl_secs,
        });
        (cache, calls)
    }

    fn oauth_config(base_url: &str) -> RevolutOAuthConfig {
        RevolutOAuthConfig {
            business_api_base_url: base_url.to_string(),
            client_id: "client-abc".into(),
            refresh_token: "refresh-xyz".into(),
            private_key_pem: TEST_PRIVATE_KEY.into(),
            issuer_domain: "renovation.example.com".into(),
        }
    }

    #[tokio::test]
    async fn fresh_token_is_reused_without_fetching() {
        let (cache, calls) = counting_cache(3600);
        assert_eq!(cache.get_token().await.unwrap(), "token-1");
        assert_eq!(cache.get_token().await.unwrap(), "token-1");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_token_triggers_one_fetch_per_miss() {
        let (cache, calls) = counting_cache(0);
        assert_eq!(cache.get_token().await.unwrap(), "token-1");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.get_token().await.unwrap(), "token-2");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn invalidate_forces_refetch() {
        let (cache, calls) = counting_cache(3600);
        cache.get_token().await.unwrap();
        cache.invalidate().await;
        assert_eq!(cache.get_token().await.unwrap(), "token-2");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn client_assertion_carries_expected_claims() {
        let fetcher =
            AssertionTokenFetcher::new(Client::new(), &oauth_config("http://localhost")).unwrap();
        let now = Utc::now();
        let assertion = fetcher.client_assertion(now).unwrap();

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[ASSERTION_AUDIENCE]);
        validation.set_issuer(&["renovation.example.com"]);
        let decoded = decode::<ClientAssertionClaims>(
            &assertion,
            &DecodingKey::from_rsa_pem(TEST_PUBLIC_KEY.as_bytes()).unwrap(),
            &validation,
        )
        .unwrap();

        assert_eq!(decoded.claims.sub, "client-abc");
        assert_eq!(decoded.claims.exp, now.timestamp() + 600);
    }

    #[test]
    fn invalid_private_key_is_rejected() {
        let mut config = oauth_config("http://localhost");
        config.private_key_pem = "not a key".into();
        assert!(matches!(
            AssertionTokenFetcher::new(Client::new(), &config),
            Err(ProviderError::MissingConfig { .. })
        ));
    }

    #[tokio::test]
    async fn token_exchange_posts_refresh_grant_with_assertion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/1.0/auth/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=refresh-xyz"))
            .and(body_string_contains(
                "client_assertion_type=urn%3Aietf%3Aparams%3Aoauth%3Aclient-assertion-type%3Ajwt-bearer",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "oa_sand_123",
                "token_type": "bearer",
                "expires_in": 2399
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = RevolutOAuthClient::new(oauth_config(&server.uri())).unwrap();
        assert_eq!(client.tokens().get_token().await.unwrap(), "oa_sand_123");
        assert_eq!(client.tokens().get_token().await.unwrap(), "oa_sand_123");
    }

    #[tokio::test]
    async fn unauthorized_listing_refreshes_token_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/1.0/auth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "oa_sand_123",
                "expires_in": 2399
            })))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/1.0/transactions"))
            .respond_with(ResponseTemplate::new(401))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/1.0/transactions"))
            .and(header("Authorization", "Bearer oa_sand_123"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!([{ "id": "tx_1" }])),
            )
            .mount(&server)
            .await;

        let client = RevolutOAuthClient::new(oauth_config(&server.uri())).unwrap();
        let transactions = client.list_transactions(10).await.unwrap();
        assert_eq!(transactions[0]["id"], "tx_1");
    }
}
