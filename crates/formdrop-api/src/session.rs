use axum_extra::extract::cookie::{Cookie, SameSite};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};

use formdrop_types::api::Claims;
use formdrop_types::models::Identity;

pub const SESSION_COOKIE: &str = "formdrop.session-token";
pub const SESSION_TTL_DAYS: i64 = 30;
/// A valid token older than this is re-issued on the next request.
pub const REFRESH_AFTER_HOURS: i64 = 24;

/// Signing keys plus cookie policy for session tokens.
pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    secure_cookies: bool,
}

impl SessionKeys {
    pub fn new(secret: &str, secure_cookies: bool) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            secure_cookies,
        }
    }

    pub fn mint(&self, identity: &Identity) -> anyhow::Result<String> {
        self.mint_at(identity, Utc::now())
    }

    pub fn mint_at(&self, identity: &Identity, issued_at: DateTime<Utc>) -> anyhow::Result<String> {
        let claims = Claims {
            sub: identity.id,
            name: identity.name.clone(),
            email: identity.email.clone(),
            iat: issued_at.timestamp() as usize,
            exp: (issued_at + Duration::days(SESSION_TTL_DAYS)).timestamp() as usize,
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?;
        Ok(token)
    }

    /// Signature and expiry check. Any failure is `None`.
    pub fn claims(&self, token: &str) -> Option<Claims> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .ok()
    }

    pub fn identity(&self, token: &str) -> Option<Identity> {
        self.claims(token).map(|claims| claims.identity())
    }

    pub fn needs_refresh(claims: &Claims, now: DateTime<Utc>) -> bool {
        let issued = claims.iat as i64;
        now.timestamp() - issued >= Duration::hours(REFRESH_AFTER_HOURS).num_seconds()
    }

    pub fn cookie(&self, token: String) -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE, token))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.secure_cookies)
            .max_age(time::Duration::days(SESSION_TTL_DAYS))
            .build()
    }

    pub fn removal_cookie(&self) -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE, ""))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.secure_cookies)
            .max_age(time::Duration::ZERO)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn identity() -> Identity {
        Identity {
            id: Uuid::new_v4(),
            name: "Ada".into(),
            email: "ada@x.com".into(),
        }
    }

    #[test]
    fn fresh_token_roundtrips_identity() {
        let keys = SessionKeys::new("test-secret", false);
        let who = identity();
        let token = keys.mint(&who).unwrap();
        assert_eq!(keys.identity(&token), Some(who));
    }

    #[test]
    fn token_older_than_thirty_days_is_rejected() {
        let keys = SessionKeys::new("test-secret", false);
        let issued = Utc::now() - Duration::days(SESSION_TTL_DAYS) - Duration::minutes(1);
        let token = keys.mint_at(&identity(), issued).unwrap();
        assert!(keys.identity(&token).is_none());
    }

    #[test]
    fn token_just_inside_thirty_days_is_accepted() {
        let keys = SessionKeys::new("test-secret", false);
        let issued = Utc::now() - Duration::days(SESSION_TTL_DAYS) + Duration::minutes(5);
        let token = keys.mint_at(&identity(), issued).unwrap();
        assert!(keys.identity(&token).is_some());
    }

    #[test]
    fn foreign_signature_is_rejected() {
        let ours = SessionKeys::new("test-secret", false);
        let theirs = SessionKeys::new("other-secret", false);
        let token = theirs.mint(&identity()).unwrap();
        assert!(ours.identity(&token).is_none());
        assert!(ours.identity("not-a-jwt").is_none());
    }

    #[test]
    fn refresh_kicks_in_after_a_day() {
        let keys = SessionKeys::new("test-secret", false);
        let now = Utc::now();
        let young = keys.claims(&keys.mint_at(&identity(), now).unwrap()).unwrap();
        let old = keys
            .claims(&keys.mint_at(&identity(), now - Duration::hours(25)).unwrap())
            .unwrap();
        assert!(!SessionKeys::needs_refresh(&young, now));
        assert!(SessionKeys::needs_refresh(&old, now));
    }

    #[test]
    fn cookie_security_follows_environment() {
        let prod = SessionKeys::new("s", true).cookie("t".into());
        let dev = SessionKeys::new("s", false).cookie("t".into());
        assert_eq!(prod.secure(), Some(true));
        assert_eq!(dev.secure(), Some(false));
        assert_eq!(prod.http_only(), Some(true));
        assert_eq!(prod.name(), SESSION_COOKIE);
    }
}
