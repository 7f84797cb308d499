use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::Extension;
use chrono::{DateTime, Duration, TimeZone, Utc};
use hmac::{Hmac, Mac};
use pbkdf2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use pbkdf2::Pbkdf2;
use rand_core::OsRng;
use serde::Serialize;
use sha2::Sha256;
use uuid::Uuid;

use crate::accounts::AccountService;
use crate::err::Error;
use crate::models::Account;
use crate::AppState;

type HmacSha256 = Hmac<Sha256>;

pub fn hash_password(password: &str) -> Result<String, Error> {
    Ok(Pbkdf2
        .hash_password(password.as_bytes(), &SaltString::generate(&mut OsRng))?
        .to_string())
}

pub fn verify_password(password: &str, password_hash: &str) -> bool {
    match PasswordHash::new(password_hash) {
        Ok(hash) => Pbkdf2.verify_password(password.as_bytes(), &hash).is_ok(),
        Err(_) => false,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AccessToken {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_at: DateTime<Utc>,
}

/// Issues and checks `<account>.<expiry>.<mac>` bearer tokens.
#[derive(Clone)]
pub struct TokenSigner {
    key: Arc<[u8]>,
    ttl: Duration,
}

impl TokenSigner {
    pub fn new(key: &[u8], ttl: Duration) -> Self {
        Self {
            key: Arc::from(key),
            ttl,
        }
    }

    fn mac(&self) -> Result<HmacSha256, Error> {
        HmacSha256::new_from_slice(&self.key).map_err(|err| Error::InternalError {
            kind: "TokenError",
            message: err.to_string(),
        })
    }

    fn sign(&self, claims: &str) -> Result<String, Error> {
        let mut mac = self.mac()?;
        mac.update(claims.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    pub fn issue(&self, account_id: Uuid) -> Result<AccessToken, Error> {
        self.issue_until(account_id, Utc::now() + self.ttl)
    }

    fn issue_until(&self, account_id: Uuid, expires_at: DateTime<Utc>) -> Result<AccessToken, Error> {
        let claims = format!("{}.{}", account_id, expires_at.timestamp());
        let signature = self.sign(&claims)?;
        Ok(AccessToken {
            access_token: format!("{}.{}", claims, signature),
            token_type: "bearer",
            expires_at,
        })
    }

    /// Returns the account id the token was issued for.
    pub fn verify(&self, token: &str) -> Result<Uuid, Error> {
        let invalid = || Error::unauthorized("Could not validate credentials");

        let (claims, signature) = token.rsplit_once('.').ok_or_else(invalid)?;
        let signature = hex::decode(signature).map_err(|_| invalid())?;
        let mut mac = self.mac()?;
        mac.update(claims.as_bytes());
        mac.verify_slice(&signature).map_err(|_| invalid())?;

        let (account, expiry) = claims.split_once('.').ok_or_else(invalid)?;
        let account_id = Uuid::parse_str(account).map_err(|_| invalid())?;
        let expiry = expiry.parse::<i64>().map_err(|_| invalid())?;
        let expires_at = Utc.timestamp_opt(expiry, 0).single().ok_or_else(invalid)?;
        if Utc::now() >= expires_at {
            return Err(Error::unauthorized("Token expired"));
        }
        Ok(account_id)
    }
}

/// Resolves a bearer token to the live account record.
pub async fn resolve_bearer(
    tokens: &TokenSigner,
    accounts: &AccountService,
    token: &str,
) -> Result<Account, Error> {
    let account_id = tokens.verify(token).map_err(|err| {
        log::warn!("Rejected bearer token: {}", err);
        err
    })?;
    match accounts.get(account_id).await {
        Ok(account) if !account.disabled => Ok(account),
        Ok(_) => Err(Error::unauthorized("Inactive user")),
        Err(Error::NotFound { .. }) => Err(Error::unauthorized("Could not find user")),
        Err(err) => Err(err),
    }
}

pub fn require_elevated(account: &Account) -> Result<(), Error> {
    if account.role.is_elevated() {
        Ok(())
    } else {
        Err(Error::forbidden())
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() {
        Some(token.trim())
    } else {
        None
    }
}

/// The authenticated caller of a request.
pub struct CurrentAccount(pub Account);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentAccount
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Extension(app) = Extension::<AppState>::from_request_parts(parts, state)
            .await
            .map_err(|_| Error::InternalError {
                kind: "StateError",
                message: "Application state is not installed".to_string(),
            })?;
        let token = bearer_token(parts).ok_or_else(|| Error::unauthorized("Not authenticated"))?;
        let account = resolve_bearer(&app.tokens, &app.accounts, token).await?;
        Ok(CurrentAccount(account))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    fn signer() -> TokenSigner {
        TokenSigner::new(b"test-secret", Duration::minutes(5))
    }

    #[test]
    fn issued_tokens_verify() {
        let id = Uuid::new_v4();
        let token = signer().issue(id).unwrap();
        assert_eq!(token.token_type, "bearer");
        assert_eq!(signer().verify(&token.access_token).unwrap(), id);
    }

    #[test]
    fn tampered_tokens_are_rejected() {
        let token = signer().issue(Uuid::new_v4()).unwrap().access_token;
        let (_, rest) = token.split_once('.').unwrap();
        let forged = format!("{}.{}", Uuid::new_v4(), rest);
        assert!(matches!(signer().verify(&forged), Err(Error::Unauthorized { .. })));

        let other = TokenSigner::new(b"another-secret", Duration::minutes(5));
        assert!(matches!(other.verify(&token), Err(Error::Unauthorized { .. })));
        assert!(matches!(signer().verify("garbage"), Err(Error::Unauthorized { .. })));
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let signer = signer();
        let token = signer
            .issue_until(Uuid::new_v4(), Utc::now() - Duration::seconds(1))
            .unwrap();
        assert!(matches!(
            signer.verify(&token.access_token),
            Err(Error::Unauthorized { .. })
        ));
    }

    #[test]
    fn passwords_round_trip_through_hash() {
        let hash = hash_password("hunter22").unwrap();
        assert!(!hash.contains("hunter22"));
        assert!(verify_password("hunter22", &hash));
        assert!(!verify_password("hunter23", &hash));
        assert!(!verify_password("hunter22", "not a phc string"));
    }

    #[test]
    fn only_institutions_are_elevated() {
        let mut account = Account::new(
            "student1".to_string(),
            "s@example.com".to_string(),
            String::new(),
            Role::Student,
        );
        assert!(matches!(require_elevated(&account), Err(Error::Forbidden { .. })));
        account.role = Role::Institution;
        assert!(require_elevated(&account).is_ok());
    }
}
