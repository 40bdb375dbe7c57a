use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, TokenData, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::CryptoError;

/// Issues and checks bearer session tokens bound to a user id.
pub trait TokenService: Send + Sync {
    fn issue(&self, subject: &Uuid, ttl: Duration) -> Result<String, CryptoError>;

    /// Returns the subject of a valid token. Expiry is reported separately
    /// from every other failure.
    fn verify(&self, token: &str) -> Result<Uuid, CryptoError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionClaims {
    sub: String,
    iat: i64,
    exp: i64,
}

/// HS256 JSON Web Tokens signed with a shared secret.
pub struct JwtTokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtTokenService {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
        }
    }
}

impl TokenService for JwtTokenService {
    fn issue(&self, subject: &Uuid, ttl: Duration) -> Result<String, CryptoError> {
        let now = Utc::now();
        let claims = SessionClaims {
            sub: subject.to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };
        Ok(jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.encoding_key,
        )?)
    }

    fn verify(&self, token: &str) -> Result<Uuid, CryptoError> {
        let TokenData { header: _, claims } = jsonwebtoken::decode::<SessionClaims>(
            token,
            &self.decoding_key,
            &{
                let mut validation = Validation::new(Algorithm::HS256);
                validation.validate_exp = false;
                validation.required_spec_claims.clear();
                validation
            },
        )
        .map_err(|_| CryptoError::InvalidToken)?;

        if claims.exp <= Utc::now().timestamp() {
            return Err(CryptoError::TokenExpired);
        }
        Uuid::parse_str(&claims.sub).map_err(|_| CryptoError::InvalidToken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_verifies_to_subject() {
        let service = JwtTokenService::new(b"test-secret");
        let user_id = Uuid::new_v4();
        let token = service.issue(&user_id, Duration::days(7)).unwrap();
        assert_eq!(service.verify(&token).unwrap(), user_id);
    }

    #[test]
    fn expired_token_is_distinguished() {
        let service = JwtTokenService::new(b"test-secret");
        let token = service.issue(&Uuid::new_v4(), Duration::minutes(-1)).unwrap();
        assert!(matches!(service.verify(&token), Err(CryptoError::TokenExpired)));
    }

    #[test]
    fn token_from_other_secret_is_rejected() {
        let issuer = JwtTokenService::new(b"secret-a");
        let verifier = JwtTokenService::new(b"secret-b");
        let token = issuer.issue(&Uuid::new_v4(), Duration::days(1)).unwrap();
        assert!(matches!(verifier.verify(&token), Err(CryptoError::InvalidToken)));
    }

    #[test]
    fn garbage_is_rejected() {
        let service = JwtTokenService::new(b"test-secret");
        assert!(matches!(service.verify("not.a.jwt"), Err(CryptoError::InvalidToken)));
        assert!(matches!(service.verify(""), Err(CryptoError::InvalidToken)));
    }
}
