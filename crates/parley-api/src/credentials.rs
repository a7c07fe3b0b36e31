use std::sync::OnceLock;

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use rand_core::OsRng;
use tracing::{info, warn};

use parley_db::{Database, is_unique_violation};
use parley_types::models::User;

use crate::error::ApiError;
use crate::session::INVALID_TOKEN;

const BAD_CREDENTIALS: &str = "Incorrect username or password";

/// Hash a password with Argon2id and a fresh salt. Returns the PHC string.
pub fn hash_password(raw: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(raw.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Password hashing failed: {}", e))?;
    Ok(hash.to_string())
}

/// False for a wrong password and for an unparseable digest alike.
pub fn verify_password(raw: &str, digest: &str) -> bool {
    PasswordHash::new(digest)
        .map(|parsed| Argon2::default().verify_password(raw.as_bytes(), &parsed).is_ok())
        .unwrap_or(false)
}

/// Digest checked against when the username is unknown, so both failure
/// paths pay for one Argon2 verification.
fn decoy_digest() -> &'static str {
    static DECOY: OnceLock<String> = OnceLock::new();
    DECOY.get_or_init(|| hash_password("parley-decoy-password").unwrap_or_default())
}

/// User identity records and password checks.
pub struct CredentialStore<'a> {
    db: &'a Database,
}

impl<'a> CredentialStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Username uniqueness is checked before email. Only the digest is stored.
    pub fn register(
        &self,
        username: &str,
        email: &str,
        raw_password: &str,
    ) -> Result<User, ApiError> {
        if self.db.get_user_by_username(username)?.is_some() {
            return Err(ApiError::Conflict("Username already registered".into()));
        }
        if self.db.get_user_by_email(email)?.is_some() {
            return Err(ApiError::Conflict("Email already registered".into()));
        }

        let digest = hash_password(raw_password)?;

        // A concurrent registration can still win the race between the checks
        // above and this insert.
        let row = self
            .db
            .create_user(username, email, &digest)
            .map_err(|e| {
                if is_unique_violation(&e) {
                    ApiError::Conflict("Username or email already registered".into())
                } else {
                    ApiError::Internal(e)
                }
            })?;

        info!("Registered user {} (id {})", row.username, row.id);
        Ok(row.into_user()?)
    }

    /// Unknown user and wrong password fail identically.
    pub fn authenticate(&self, username: &str, raw_password: &str) -> Result<User, ApiError> {
        let Some(row) = self.db.get_user_by_username(username)? else {
            verify_password(raw_password, decoy_digest());
            warn!("Failed login attempt");
            return Err(ApiError::Unauthenticated(BAD_CREDENTIALS));
        };

        if !verify_password(raw_password, &row.password) {
            warn!("Failed login attempt");
            return Err(ApiError::Unauthenticated(BAD_CREDENTIALS));
        }

        Ok(row.into_user()?)
    }

    /// Map a token's username claim back to its account.
    pub fn resolve_user(&self, username: &str) -> Result<User, ApiError> {
        let row = self
            .db
            .get_user_by_username(username)?
            .ok_or(ApiError::Unauthenticated(INVALID_TOKEN))?;
        Ok(row.into_user()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_alice() -> Database {
        let db = Database::open_in_memory().unwrap();
        CredentialStore::new(&db)
            .register("alice", "alice@example.com", "correct horse")
            .unwrap();
        db
    }

    #[test]
    fn hash_is_not_the_password_and_verifies() {
        let digest = hash_password("s3cret").unwrap();
        assert_ne!(digest, "s3cret");
        assert!(digest.starts_with("$argon2"));
        assert!(verify_password("s3cret", &digest));
        assert!(!verify_password("wrong", &digest));
        assert!(!verify_password("s3cret", "not-a-phc-string"));
    }

    #[test]
    fn register_stores_digest_only() {
        let db = store_with_alice();
        let row = db.get_user_by_username("alice").unwrap().unwrap();
        assert_ne!(row.password, "correct horse");
        assert!(verify_password("correct horse", &row.password));
    }

    #[test]
    fn duplicate_username_conflicts() {
        let db = store_with_alice();
        let err = CredentialStore::new(&db)
            .register("alice", "new@example.com", "pw")
            .unwrap_err();
        assert!(matches!(err, ApiError::Conflict(ref m) if m.contains("Username")));
    }

    #[test]
    fn duplicate_email_conflicts() {
        let db = store_with_alice();
        let err = CredentialStore::new(&db)
            .register("alicia", "alice@example.com", "pw")
            .unwrap_err();
        assert!(matches!(err, ApiError::Conflict(ref m) if m.contains("Email")));
    }

    #[test]
    fn username_checked_before_email() {
        let db = store_with_alice();
        let err = CredentialStore::new(&db)
            .register("alice", "alice@example.com", "pw")
            .unwrap_err();
        assert!(matches!(err, ApiError::Conflict(ref m) if m.contains("Username")));
    }

    #[test]
    fn authenticate_success() {
        let db = store_with_alice();
        let user = CredentialStore::new(&db).authenticate("alice", "correct horse").unwrap();
        assert_eq!(user.username, "alice");
    }

    #[test]
    fn unknown_user_and_wrong_password_are_indistinguishable() {
        let db = store_with_alice();
        let store = CredentialStore::new(&db);

        let wrong_password = store.authenticate("alice", "battery staple").unwrap_err();
        let unknown_user = store.authenticate("mallory", "correct horse").unwrap_err();

        assert_eq!(wrong_password.to_string(), unknown_user.to_string());
        assert!(matches!(wrong_password, ApiError::Unauthenticated(_)));
        assert!(matches!(unknown_user, ApiError::Unauthenticated(_)));
    }

    #[test]
    fn resolve_user_for_vanished_account() {
        let db = store_with_alice();
        let store = CredentialStore::new(&db);
        assert_eq!(store.resolve_user("alice").unwrap().email, "alice@example.com");
        assert!(matches!(store.resolve_user("ghost"), Err(ApiError::Unauthenticated(_))));
    }
}
