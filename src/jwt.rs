//! JWT issuance and verification (HS256).

use chrono::Utc;
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};

use crate::config::JwtConfig;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token has expired")]
    Expired,

    #[error("token is not valid yet")]
    NotValidYet,

    #[error("token is malformed")]
    Malformed,

    #[error("token is invalid")]
    Invalid,

    #[error("wrong token type, expected {0}")]
    WrongType(&'static str),

    #[error("failed to sign token: {0}")]
    Signing(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl TokenType {
    fn as_str(self) -> &'static str {
        match self {
            TokenType::Access => "access",
            TokenType::Refresh => "refresh",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub roles: Vec<String>,
    pub token_type: TokenType,
    pub iss: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
}

/// Issued access/refresh pair.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: String,
    access_ttl: i64,
    refresh_ttl: i64,
}

impl JwtManager {
    pub fn new(config: &JwtConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[config.issuer.as_str()]);
        validation.validate_nbf = true;
        validation.set_required_spec_claims(&["exp", "nbf", "iss"]);

        Self {
            encoding_key: EncodingKey::from_secret(config.secret_key.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret_key.as_bytes()),
            validation,
            issuer: config.issuer.clone(),
            access_ttl: config.access_token_duration as i64,
            refresh_ttl: config.refresh_token_duration as i64,
        }
    }

    /// Access token lifetime in seconds.
    pub fn access_ttl(&self) -> i64 {
        self.access_ttl
    }

    pub fn generate_token_pair(
        &self,
        user_id: i64,
        username: &str,
        roles: &[String],
    ) -> Result<TokenPair, TokenError> {
        Ok(TokenPair {
            access_token: self.sign(user_id, username, roles, TokenType::Access)?,
            refresh_token: self.sign(user_id, "", &[], TokenType::Refresh)?,
        })
    }

    fn sign(
        &self,
        user_id: i64,
        username: &str,
        roles: &[String],
        token_type: TokenType,
    ) -> Result<String, TokenError> {
        let now = Utc::now().timestamp();
        let ttl = match token_type {
            TokenType::Access => self.access_ttl,
            TokenType::Refresh => self.refresh_ttl,
        };

        let claims = Claims {
            user_id: user_id.to_string(),
            username: username.to_string(),
            roles: roles.to_vec(),
            token_type,
            iss: self.issuer.clone(),
            iat: now,
            nbf: now,
            exp: now + ttl,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Verify signature, issuer and time claims.
    pub fn parse_token(&self, token: &str) -> Result<Claims, TokenError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::ImmatureSignature => TokenError::NotValidYet,
                ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Json(_) => {
                    TokenError::Malformed
                }
                _ => TokenError::Invalid,
            })
    }

    /// Parse a token and require it to be of `expected` type.
    pub fn parse_typed(&self, token: &str, expected: TokenType) -> Result<Claims, TokenError> {
        let claims = self.parse_token(token)?;
        if claims.token_type != expected {
            return Err(TokenError::WrongType(expected.as_str()));
        }
        Ok(claims)
    }
}

impl Claims {
    /// Numeric user id carried in `user_id`.
    pub fn user_id(&self) -> Result<i64, TokenError> {
        self.user_id.parse().map_err(|_| TokenError::Invalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(secret: &str) -> JwtConfig {
        JwtConfig {
            secret_key: secret.to_string(),
            issuer: "content-hub".to_string(),
            access_token_duration: 7200,
            refresh_token_duration: 604_800,
        }
    }

    fn roles() -> Vec<String> {
        vec!["user".to_string()]
    }

    #[test]
    fn access_token_round_trips_claims() {
        let manager = JwtManager::new(&config("secret"));
        let pair = manager.generate_token_pair(42, "alice", &roles()).unwrap();

        let claims = manager.parse_typed(&pair.access_token, TokenType::Access).unwrap();
        assert_eq!(claims.user_id().unwrap(), 42);
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.roles, roles());
        assert_eq!(claims.exp - claims.iat, 7200);
    }

    #[test]
    fn refresh_token_is_not_an_access_token() {
        let manager = JwtManager::new(&config("secret"));
        let pair = manager.generate_token_pair(1, "bob", &roles()).unwrap();

        assert_eq!(
            manager
                .parse_typed(&pair.refresh_token, TokenType::Access)
                .unwrap_err(),
            TokenError::WrongType("access")
        );
        assert!(manager.parse_typed(&pair.refresh_token, TokenType::Refresh).is_ok());
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let issuer = JwtManager::new(&config("secret-a"));
        let verifier = JwtManager::new(&config("secret-b"));
        let pair = issuer.generate_token_pair(1, "bob", &roles()).unwrap();

        assert_eq!(
            verifier.parse_token(&pair.access_token).unwrap_err(),
            TokenError::Invalid
        );
    }

    #[test]
    fn token_from_other_issuer_is_rejected() {
        let mut other = config("secret");
        other.issuer = "someone-else".to_string();
        let pair = JwtManager::new(&other)
            .generate_token_pair(1, "bob", &roles())
            .unwrap();

        assert!(JwtManager::new(&config("secret"))
            .parse_token(&pair.access_token)
            .is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let manager = JwtManager::new(&config("secret"));
        let now = Utc::now().timestamp();
        let claims = Claims {
            user_id: "1".to_string(),
            username: "bob".to_string(),
            roles: roles(),
            token_type: TokenType::Access,
            iss: "content-hub".to_string(),
            iat: now - 7200,
            nbf: now - 7200,
            exp: now - 3600,
        };
        let token = encode(&Header::default(), &claims, &manager.encoding_key).unwrap();

        assert_eq!(manager.parse_token(&token).unwrap_err(), TokenError::Expired);
    }

    #[test]
    fn garbage_is_malformed() {
        let manager = JwtManager::new(&config("secret"));
        assert_eq!(
            manager.parse_token("not-a-token").unwrap_err(),
            TokenError::Malformed
        );
    }
}
