pub mod password;

use chrono::Duration;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::clock::Clock;

/// Audience of operator tokens, accepted only by this service
pub const OPERATOR_AUDIENCE: &str = "control-plane";
/// Audience of impersonation tokens, consumed by the tenant-facing application
pub const TENANT_AUDIENCE: &str = "tenant-app";
pub const ISSUER: &str = "control-plane-api";

/// Token payloads. The `kind` tag keeps the two credentials distinguishable
/// even to a consumer that ignores the audience.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Claims {
    Operator(OperatorClaims),
    Impersonation(ImpersonationClaims),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorClaims {
    pub sub: Uuid,
    pub email: String,
    pub aud: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActingOperator {
    pub id: Uuid,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpersonationClaims {
    /// The impersonated tenant user
    pub sub: Uuid,
    pub tenant_id: Uuid,
    pub email: String,
    pub acting_operator: ActingOperator,
    /// Impersonation session id shared by its start/end records
    pub sid: Uuid,
    pub aud: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    fn exp(&self) -> i64 {
        match self {
            Claims::Operator(c) => c.exp,
            Claims::Impersonation(c) => c.exp,
        }
    }

    fn audience_matches_kind(&self) -> bool {
        match self {
            Claims::Operator(c) => c.aud == OPERATOR_AUDIENCE,
            Claims::Impersonation(c) => c.aud == TENANT_AUDIENCE,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Token has expired")]
    Expired,
    #[error("Token is not valid for this endpoint")]
    WrongKind,
    #[error("Invalid token: {0}")]
    Invalid(#[from] jsonwebtoken::errors::Error),
    #[error("Token audience does not match its kind")]
    AudienceMismatch,
}

/// Issued token with its absolute expiry
#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

/// Signs and verifies both token kinds with one HS256 secret. Expiry is
/// checked against the injected clock, not the system time.
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    clock: Arc<dyn Clock>,
    operator_ttl: Duration,
    impersonation_ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &[u8], clock: Arc<dyn Clock>, operator_ttl: Duration, impersonation_ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            clock,
            operator_ttl,
            impersonation_ttl,
        }
    }

    pub fn issue_operator(&self, operator_id: Uuid, email: &str) -> Result<IssuedToken, TokenError> {
        let now = self.clock.now();
        let expires_at = now + self.operator_ttl;
        let claims = Claims::Operator(OperatorClaims {
            sub: operator_id,
            email: email.to_string(),
            aud: OPERATOR_AUDIENCE.to_string(),
            iss: ISSUER.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        });
        Ok(IssuedToken {
            token: self.sign(&claims)?,
            expires_at,
        })
    }

    pub fn issue_impersonation(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        tenant_id: Uuid,
        email: &str,
        operator: ActingOperator,
    ) -> Result<IssuedToken, TokenError> {
        let now = self.clock.now();
        let expires_at = now + self.impersonation_ttl;
        let claims = Claims::Impersonation(ImpersonationClaims {
            sub: user_id,
            tenant_id,
            email: email.to_string(),
            acting_operator: operator,
            sid: session_id,
            aud: TENANT_AUDIENCE.to_string(),
            iss: ISSUER.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        });
        Ok(IssuedToken {
            token: self.sign(&claims)?,
            expires_at,
        })
    }

    pub fn impersonation_ttl(&self) -> Duration {
        self.impersonation_ttl
    }

    /// Accepts only operator tokens
    pub fn verify_operator(&self, token: &str) -> Result<OperatorClaims, TokenError> {
        match self.verify(token)? {
            Claims::Operator(claims) => Ok(claims),
            Claims::Impersonation(_) => Err(TokenError::WrongKind),
        }
    }

    /// Accepts only impersonation tokens
    pub fn verify_impersonation(&self, token: &str) -> Result<ImpersonationClaims, TokenError> {
        match self.verify(token)? {
            Claims::Impersonation(claims) => Ok(claims),
            Claims::Operator(_) => Err(TokenError::WrongKind),
        }
    }

    fn sign(&self, claims: &Claims) -> Result<String, TokenError> {
        Ok(encode(&Header::new(Algorithm::HS256), claims, &self.encoding)?)
    }

    fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[OPERATOR_AUDIENCE, TENANT_AUDIENCE]);
        validation.set_issuer(&[ISSUER]);
        // exp is compared with the injected clock below
        validation.validate_exp = false;

        let claims = decode::<Claims>(token, &self.decoding, &validation)?.claims;
        if !claims.audience_matches_kind() {
            return Err(TokenError::AudienceMismatch);
        }
        if claims.exp() <= self.clock.now().timestamp() {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }
}
