// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Environment variable names, defaults, and the `AppConfig` parsed from
//! them at startup. A `.env` file is loaded first when present.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DATA_DIR` | Root directory for JSON documents | `./data` |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `TLS_CERT_PATH` / `TLS_KEY_PATH` | PEM files; HTTPS when both are set | unset (HTTP) |
//! | `AUTH_JWT_SECRET` | HS256 secret for bearer tokens | unset (unsigned tokens with the `dev` feature, rejected otherwise) |
//! | `AUTH_ISSUER` | Expected `iss` claim | Optional |
//! | `POLL_INTERVAL_SECS` | Background payment poller period | `30` |
//! | `PUBLIC_BASE_URL` | Front-end URL used for provider redirects | `http://localhost:3000` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |
//!
//! Provider credentials (`STRIPE_*`, `QONTO_*`, `REVOLUT_*`) are read by
//! each adapter's `from_env()`; an adapter whose credentials are missing is
//! simply not registered.

use std::{net::SocketAddr, path::PathBuf, time::Duration};

pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const TLS_CERT_PATH_ENV: &str = "TLS_CERT_PATH";
pub const TLS_KEY_PATH_ENV: &str = "TLS_KEY_PATH";
pub const AUTH_JWT_SECRET_ENV: &str = "AUTH_JWT_SECRET";
pub const AUTH_ISSUER_ENV: &str = "AUTH_ISSUER";
pub const POLL_INTERVAL_SECS_ENV: &str = "POLL_INTERVAL_SECS";
pub const PUBLIC_BASE_URL_ENV: &str = "PUBLIC_BASE_URL";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

// Stripe
pub const STRIPE_SECRET_KEY_ENV: &str = "STRIPE_SECRET_KEY";
pub const STRIPE_WEBHOOK_SECRET_ENV: &str = "STRIPE_WEBHOOK_SECRET";
pub const STRIPE_API_BASE_URL_ENV: &str = "STRIPE_API_BASE_URL";

// Qonto
pub const QONTO_LOGIN_ENV: &str = "QONTO_LOGIN";
pub const QONTO_SECRET_KEY_ENV: &str = "QONTO_SECRET_KEY";
pub const QONTO_API_BASE_URL_ENV: &str = "QONTO_API_BASE_URL";

// Revolut merchant orders
pub const REVOLUT_API_KEY_ENV: &str = "REVOLUT_API_KEY";
pub const REVOLUT_API_BASE_URL_ENV: &str = "REVOLUT_API_BASE_URL";
pub const REVOLUT_API_VERSION_ENV: &str = "REVOLUT_API_VERSION";

// Revolut business API (OAuth client assertion)
pub const REVOLUT_CLIENT_ID_ENV: &str = "REVOLUT_CLIENT_ID";
pub const REVOLUT_REFRESH_TOKEN_ENV: &str = "REVOLUT_REFRESH_TOKEN";
pub const REVOLUT_PRIVATE_KEY_PATH_ENV: &str = "REVOLUT_PRIVATE_KEY_PATH";
pub const REVOLUT_PRIVATE_KEY_PEM_ENV: &str = "REVOLUT_PRIVATE_KEY_PEM";
pub const REVOLUT_ISSUER_DOMAIN_ENV: &str = "REVOLUT_ISSUER_DOMAIN";
pub const REVOLUT_BUSINESS_API_BASE_URL_ENV: &str = "REVOLUT_BUSINESS_API_BASE_URL";

pub const DEFAULT_DATA_DIR: &str = "./data";
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_PUBLIC_BASE_URL: &str = "http://localhost:3000";

/// Configuration error raised at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },

    #[error("{0} and {1} must be set together")]
    Incomplete(&'static str, &'static str),
}

/// Server-level configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub bind_addr: SocketAddr,
    pub tls: Option<TlsPaths>,
    pub jwt_secret: Option<String>,
    pub jwt_issuer: Option<String>,
    pub poll_interval: Duration,
    pub public_base_url: String,
}

#[derive(Debug, Clone)]
pub struct TlsPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let host = get(HOST_ENV).unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = match get(PORT_ENV) {
            Some(raw) => raw.parse::<u16>().map_err(|_| ConfigError::InvalidValue {
                name: PORT_ENV,
                value: raw,
            })?,
            None => DEFAULT_PORT,
        };
        let bind_raw = format!("{host}:{port}");
        let bind_addr = bind_raw
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidValue {
                name: HOST_ENV,
                value: bind_raw.clone(),
            })?;

        let tls = match (get(TLS_CERT_PATH_ENV), get(TLS_KEY_PATH_ENV)) {
            (Some(cert), Some(key)) => Some(TlsPaths {
                cert: cert.into(),
                key: key.into(),
            }),
            (None, None) => None,
            _ => return Err(ConfigError::Incomplete(TLS_CERT_PATH_ENV, TLS_KEY_PATH_ENV)),
        };

        let poll_secs = match get(POLL_INTERVAL_SECS_ENV) {
            Some(raw) => match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => secs,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        name: POLL_INTERVAL_SECS_ENV,
                        value: raw,
                    })
                }
            },
            None => DEFAULT_POLL_INTERVAL_SECS,
        };

        let public_base_url =
            get(PUBLIC_BASE_URL_ENV).unwrap_or_else(|| DEFAULT_PUBLIC_BASE_URL.to_string());
        match url::Url::parse(&public_base_url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
            _ => {
                return Err(ConfigError::InvalidValue {
                    name: PUBLIC_BASE_URL_ENV,
                    value: public_base_url,
                })
            }
        }

        Ok(Self {
            data_dir: get(DATA_DIR_ENV)
                .unwrap_or_else(|| DEFAULT_DATA_DIR.to_string())
                .into(),
            bind_addr,
            tls,
            jwt_secret: get(AUTH_JWT_SECRET_ENV),
            jwt_issuer: get(AUTH_ISSUER_ENV),
            poll_interval: Duration::from_secs(poll_secs),
            public_base_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.bind_addr.port(), DEFAULT_PORT);
        assert_eq!(config.poll_interval, Duration::from_secs(30));
        assert!(config.tls.is_none());
        assert!(config.jwt_secret.is_none());
        assert_eq!(config.data_dir, PathBuf::from("./data"));
    }

    #[test]
    fn blank_values_count_as_unset() {
        let config = config_from(&[(AUTH_JWT_SECRET_ENV, "   "), (PORT_ENV, "")]).unwrap();
        assert!(config.jwt_secret.is_none());
        assert_eq!(config.bind_addr.port(), DEFAULT_PORT);
    }

    #[test]
    fn invalid_port_is_rejected() {
        let err = config_from(&[(PORT_ENV, "eighty")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { name: PORT_ENV, .. }));
    }

    #[test]
    fn tls_requires_both_paths() {
        assert!(matches!(
            config_from(&[(TLS_CERT_PATH_ENV, "/tmp/cert.pem")]),
            Err(ConfigError::Incomplete(_, _))
        ));
        let config = config_from(&[
            (TLS_CERT_PATH_ENV, "/tmp/cert.pem"),
            (TLS_KEY_PATH_ENV, "/tmp/key.pem"),
        ])
        .unwrap();
        assert!(config.tls.is_some());
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        assert!(config_from(&[(POLL_INTERVAL_SECS_ENV, "0")]).is_err());
    }

    #[test]
    fn public_base_url_must_be_http() {
        let config = config_from(&[(PUBLIC_BASE_URL_ENV, "https://app.example.fr")]).unwrap();
        assert_eq!(config.public_base_url, "https://app.example.fr");
        let err = config_from(&[(PUBLIC_BASE_URL_ENV, "not a url")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { name: PUBLIC_BASE_URL_ENV, .. }));
        assert!(config_from(&[(PUBLIC_BASE_URL_ENV, "ftp://files.example.fr")]).is_err());
    }
}
