use std::time::Duration;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::debug;

use parley_types::api::Claims;

use crate::error::ApiError;

pub(crate) const INVALID_TOKEN: &str = "Could not validate credentials";

/// Issues and checks stateless HS256 session tokens carrying a username.
///
/// Expiry is the only way a token stops working; there is no revocation list.
#[derive(Clone)]
pub struct SessionIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl SessionIssuer {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    pub fn issue(&self, username: &str) -> anyhow::Result<String> {
        self.issue_with_ttl(username, self.ttl)
    }

    pub fn issue_with_ttl(&self, username: &str, ttl: Duration) -> anyhow::Result<String> {
        let ttl_secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        let exp = chrono::Utc::now().timestamp().saturating_add(ttl_secs);

        let claims = Claims {
            sub: username.to_string(),
            exp: usize::try_from(exp).unwrap_or(0),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?;
        Ok(token)
    }

    /// Returns the username the token was issued for. A token whose expiry
    /// is now or earlier is rejected; there is no clock leeway.
    pub fn resolve(&self, token: &str) -> Result<String, ApiError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            debug!("Rejected session token: {}", e);
            ApiError::Unauthenticated(INVALID_TOKEN)
        })?;

        let now = chrono::Utc::now().timestamp();
        if (data.claims.exp as i64) <= now {
            debug!("Rejected session token: expired at {}", data.claims.exp);
            return Err(ApiError::Unauthenticated(INVALID_TOKEN));
        }

        Ok(data.claims.sub)
    }
}
