//! JWT bearer token validation

use crate::auth::jwks::JwksKeys;
use crate::auth::models::Claims;
use crate::core::config::AuthConfig;
use crate::core::error::{ApiError, Result};
use async_trait::async_trait;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Header, Validation};
use std::sync::Arc;

/// Source of the keys a token signature is checked against
#[async_trait]
pub trait SigningKeys: Send + Sync {
    /// Resolve the verification key for a token header.
    ///
    /// Implementations must refuse algorithms outside their key family so a
    /// token cannot pick a weaker scheme than the issuer uses.
    async fn decoding_key(&self, header: &Header) -> Result<DecodingKey>;
}

/// HMAC shared secret, for issuers that sign with a symmetric key
pub struct SharedSecret {
    key: DecodingKey,
}

impl SharedSecret {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

#[async_trait]
impl SigningKeys for SharedSecret {
    async fn decoding_key(&self, header: &Header) -> Result<DecodingKey> {
        match header.alg {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => Ok(self.key.clone()),
            other => Err(ApiError::AuthenticationError(format!(
                "Unsupported token algorithm: {:?}",
                other
            ))),
        }
    }
}

/// Validates bearer tokens against the configured issuer
#[derive(Clone)]
pub struct TokenValidator {
    keys: Arc<dyn SigningKeys>,
    issuer: Option<String>,
    audiences: Option<Vec<String>>,
    validate_lifetime: bool,
    leeway: u64,
}

impl TokenValidator {
    /// Build a validator from configuration.
    ///
    /// A configured `signing_secret` takes precedence; otherwise keys are
    /// discovered from the authority.
    pub fn from_config(config: &AuthConfig) -> Result<Self> {
        let keys: Arc<dyn SigningKeys> = match &config.signing_secret {
            Some(secret) => Arc::new(SharedSecret::new(secret)),
            None => Arc::new(JwksKeys::from_config(config)?),
        };
        Ok(Self::new(keys, config))
    }

    pub fn new(keys: Arc<dyn SigningKeys>, config: &AuthConfig) -> Self {
        let issuer = (config.validate_issuer && !config.authority.is_empty())
            .then(|| config.authority.trim_end_matches('/').to_string());
        let audiences = config
            .validate_audience
            .then(|| config.accepted_audiences());

        Self {
            keys,
            issuer,
            audiences,
            validate_lifetime: config.validate_lifetime,
            leeway: config.leeway_secs,
        }
    }

    /// Validate a token and extract its claims
    pub async fn validate(&self, token: &str) -> Result<Claims> {
        let header = decode_header(token)
            .map_err(|e| ApiError::AuthenticationError(format!("Malformed token: {}", e)))?;

        let key = self.keys.decoding_key(&header).await?;
        let validation = self.validation_for(header.alg);

        let token_data = decode::<Claims>(token, &key, &validation)
            .map_err(|e| ApiError::AuthenticationError(format!("Invalid token: {}", e)))?;

        Ok(token_data.claims)
    }

    fn validation_for(&self, alg: Algorithm) -> Validation {
        let mut validation = Validation::new(alg);
        validation.leeway = self.leeway;
        validation.validate_exp = self.validate_lifetime;
        validation.validate_nbf = self.validate_lifetime;
        validation.required_spec_claims.clear();
        if self.validate_lifetime {
            validation.required_spec_claims.insert("exp".to_string());
        }

        match &self.issuer {
            Some(issuer) => validation.set_issuer(&[issuer]),
            None => validation.iss = None,
        }

        match &self.audiences {
            Some(audiences) => validation.set_audience(audiences),
            None => validation.validate_aud = false,
        }

        validation
    }
}
