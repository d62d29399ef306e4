use std::time::Duration;

use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use super::claims::{Claims, TokenKind};
use crate::{config::JwtConfig, state::AppState};

/// Signing/verification material for one token kind.
#[derive(Clone)]
pub struct KindKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub ttl: Duration,
}

/// Access and refresh tokens use distinct secrets and lifetimes.
#[derive(Clone)]
pub struct JwtKeys {
    pub access: KindKeys,
    pub refresh: KindKeys,
    pub issuer: String,
    pub audience: String,
}

impl From<&JwtConfig> for JwtKeys {
    fn from(cfg: &JwtConfig) -> Self {
        let kind_keys = |secret: &str, minutes: i64| KindKeys {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::from_secs((minutes.max(0) as u64) * 60),
        };
        Self {
            access: kind_keys(&cfg.access_secret, cfg.access_ttl_minutes),
            refresh: kind_keys(&cfg.refresh_secret, cfg.refresh_ttl_minutes),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
        }
    }
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        JwtKeys::from(&state.config.jwt)
    }
}

impl JwtKeys {
    fn keys(&self, kind: TokenKind) -> &KindKeys {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    fn sign_with_kind(&self, user_id: Uuid, kind: TokenKind) -> anyhow::Result<String> {
        let keys = self.keys(kind);
        let now = OffsetDateTime::now_utc();
        let exp = now + TimeDuration::seconds(keys.ttl.as_secs() as i64);
        let claims = Claims {
            sub: user_id,
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            kind,
            jti: Uuid::new_v4(),
        };
        let token = encode(&Header::default(), &claims, &keys.encoding)?;
        debug!(user_id = %user_id, kind = ?kind, "jwt signed");
        Ok(token)
    }

    pub fn sign_access(&self, user_id: Uuid) -> anyhow::Result<String> {
        self.sign_with_kind(user_id, TokenKind::Access)
    }

    pub fn sign_refresh(&self, user_id: Uuid) -> anyhow::Result<String> {
        self.sign_with_kind(user_id, TokenKind::Refresh)
    }

    fn verify_kind(&self, token: &str, kind: TokenKind) -> anyhow::Result<Claims> {
        let mut validation = Validation::default();
        validation.leeway = 0;
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<Claims>(token, &self.keys(kind).decoding, &validation)?;
        if data.claims.kind != kind {
            anyhow::bail!("not a {} token", kind_name(kind));
        }
        debug!(user_id = %data.claims.sub, kind = ?kind, "jwt verified");
        Ok(data.claims)
    }

    pub fn verify_access(&self, token: &str) -> anyhow::Result<Claims> {
        self.verify_kind(token, TokenKind::Access)
    }

    pub fn verify_refresh(&self, token: &str) -> anyhow::Result<Claims> {
        self.verify_kind(token, TokenKind::Refresh)
    }
}

fn kind_name(kind: TokenKind) -> &'static str {
    match kind {
        TokenKind::Access => "access",
        TokenKind::Refresh => "refresh",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_keys(access: &str, refresh: &str, issuer: &str, audience: &str) -> JwtKeys {
        JwtKeys::from(&JwtConfig {
            access_secret: access.into(),
            refresh_secret: refresh.into(),
            issuer: issuer.into(),
            audience: audience.into(),
            access_ttl_minutes: 5,
            refresh_ttl_minutes: 60,
        })
    }

    #[test]
    fn sign_and_verify_access_token() {
        let keys = make_keys("a-secret", "r-secret", "test-issuer", "test-aud");
        let user_id = Uuid::new_v4();
        let token = keys.sign_access(user_id).expect("sign access");
        let claims = keys.verify_access(&token).expect("verify token");
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.iss, "test-issuer");
        assert_eq!(claims.aud, "test-aud");
        assert_eq!(claims.kind, TokenKind::Access);
        assert_eq!(claims.exp - claims.iat, 5 * 60);
    }

    #[test]
    fn sign_and_verify_refresh_token() {
        let keys = make_keys("a-secret", "r-secret", "iss", "aud");
        let user_id = Uuid::new_v4();
        let token = keys.sign_refresh(user_id).expect("sign refresh");
        let claims = keys.verify_refresh(&token).expect("verify refresh");
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.kind, TokenKind::Refresh);
        assert_eq!(claims.exp - claims.iat, 60 * 60);
    }

    #[test]
    fn tokens_are_not_interchangeable() {
        let keys = make_keys("a-secret", "r-secret", "iss", "aud");
        let access = keys.sign_access(Uuid::new_v4()).unwrap();
        let refresh = keys.sign_refresh(Uuid::new_v4()).unwrap();
        assert!(keys.verify_refresh(&access).is_err());
        assert!(keys.verify_access(&refresh).is_err());
    }

    #[test]
    fn same_secret_still_checks_kind() {
        let keys = make_keys("shared", "shared", "iss", "aud");
        let access = keys.sign_access(Uuid::new_v4()).unwrap();
        let err = keys.verify_refresh(&access).unwrap_err();
        assert!(err.to_string().contains("not a refresh token"));
    }

    #[test]
    fn consecutive_tokens_differ() {
        let keys = make_keys("a", "r", "iss", "aud");
        let id = Uuid::new_v4();
        assert_ne!(keys.sign_refresh(id).unwrap(), keys.sign_refresh(id).unwrap());
    }

    #[test]
    fn verify_rejects_wrong_issuer_or_audience() {
        let good_keys = make_keys("same", "same-r", "good-iss", "good-aud");
        let bad_keys = make_keys("same", "same-r", "bad-iss", "bad-aud");
        let token = good_keys.sign_access(Uuid::new_v4()).expect("sign access");
        assert!(bad_keys.verify_access(&token).is_err());
    }

    #[test]
    fn verify_rejects_expired_and_tampered() {
        let keys = make_keys("a", "r", "iss", "aud");
        let now = OffsetDateTime::now_utc().unix_timestamp() as usize;
        let claims = Claims {
            sub: Uuid::new_v4(),
            iat: now - 7200,
            exp: now - 3600,
            iss: "iss".into(),
            aud: "aud".into(),
            kind: TokenKind::Refresh,
            jti: Uuid::new_v4(),
        };
        let expired = encode(&Header::default(), &claims, &keys.refresh.encoding).unwrap();
        assert!(keys.verify_refresh(&expired).is_err());

        let mut tampered = keys.sign_refresh(Uuid::new_v4()).unwrap();
        tampered.push('x');
        assert!(keys.verify_refresh(&tampered).is_err());
    }

    #[test]
    fn recently_expired_token_is_rejected() {
        let keys = make_keys("a", "r", "iss", "aud");
        let now = OffsetDateTime::now_utc().unix_timestamp() as usize;
        for kind in [TokenKind::Access, TokenKind::Refresh] {
            let claims = Claims {
                sub: Uuid::new_v4(),
                iat: now - 60,
                exp: now - 5,
                iss: "iss".into(),
                aud: "aud".into(),
                kind,
                jti: Uuid::new_v4(),
            };
            let token = encode(&Header::default(), &claims, &keys.keys(kind).encoding).unwrap();
            let res = match kind {
                TokenKind::Access => keys.verify_access(&token),
                TokenKind::Refresh => keys.verify_refresh(&token),
            };
            assert!(res.is_err(), "{kind:?} token expired 5s ago must not verify");
        }
    }
}
