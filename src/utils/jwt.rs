use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // Username
    pub exp: usize,  // Expiration timestamp
}

/// HS256 signing material shared through `web::Data`.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl JwtKeys {
    pub fn new(secret: &str, ttl_days: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::days(ttl_days),
        }
    }

    /// Returns the token and its lifetime in seconds.
    pub fn generate_token(
        &self,
        username: &str,
    ) -> Result<(String, i64), jsonwebtoken::errors::Error> {
        let expiration = (Utc::now() + self.ttl).timestamp() as usize;

        let claims = Claims {
            sub: username.to_string(),
            exp: expiration,
        };

        let token = encode(&Header::default(), &claims, &self.encoding)?;
        Ok((token, self.ttl.num_seconds()))
    }

    pub fn validate_token(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
            .map(|data| data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trip() {
        let keys = JwtKeys::new("test-secret", 7);
        let (token, expires_in) = keys.generate_token("alice").unwrap();
        assert_eq!(expires_in, 7 * 24 * 3600);
        assert_eq!(keys.validate_token(&token).unwrap().sub, "alice");
    }

    #[test]
    fn foreign_signature_is_rejected() {
        let (token, _) = JwtKeys::new("one", 7).generate_token("alice").unwrap();
        assert!(JwtKeys::new("two", 7).validate_token(&token).is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let keys = JwtKeys::new("test-secret", -1);
        let (token, _) = keys.generate_token("alice").unwrap();
        assert!(keys.validate_token(&token).is_err());
    }
}
