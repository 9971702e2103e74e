//! Credential resolution: (identifier, password) to zero or one user.
//!
//! Email resolution runs in two tiers inside one function. The case-insensitive
//! lookup goes first; if it does not produce a verified user, the exact lookup
//! on the normalized email is tried. Any disagreement between the tiers is
//! logged, and neither tier is trusted over the other. Callers only see
//! [`Resolution`]. The [`NoMatchReason`] is kept for logs and tests and must
//! not reach a response body. An unknown identity still pays for one argon2
//! verification against a stand-in hash.

use tracing::{debug, warn};

use crate::auth::{
    password::{verify_dummy, verify_password},
    repo::UserStore,
    repo_types::User,
    validation::normalize_login_email,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoMatchReason {
    UnknownIdentity,
    WrongPassword,
    Inactive,
    /// The stored hash could not be parsed.
    HashInconsistent,
}

#[derive(Debug)]
pub enum Resolution {
    Matched(User),
    NoMatch(NoMatchReason),
}

impl Resolution {
    pub fn into_user(self) -> Option<User> {
        match self {
            Resolution::Matched(u) => Some(u),
            Resolution::NoMatch(_) => None,
        }
    }
}

enum Check {
    Verified(User),
    Rejected(User, NoMatchReason),
}

fn check_password(user: User, password: &str) -> Check {
    match verify_password(password, &user.password_hash) {
        Ok(true) if user.is_active => Check::Verified(user),
        Ok(true) => Check::Rejected(user, NoMatchReason::Inactive),
        Ok(false) => Check::Rejected(user, NoMatchReason::WrongPassword),
        Err(e) => {
            warn!(user_id = %user.id, error = %e, "stored password hash is unreadable");
            Check::Rejected(user, NoMatchReason::HashInconsistent)
        }
    }
}

/// Resolve an email/password pair.
///
/// Only store failures are errors; every credential problem is `Ok(NoMatch)`.
pub async fn resolve_email(
    store: &dyn UserStore,
    email: &str,
    password: &str,
) -> anyhow::Result<Resolution> {
    let email = normalize_login_email(email);

    // Tier 1: case-insensitive match.
    let primary = match store.find_by_email_ci(&email).await? {
        Some(user) => match check_password(user, password) {
            Check::Verified(user) => {
                debug!(user_id = %user.id, "credentials resolved by case-insensitive email");
                return Ok(Resolution::Matched(user));
            }
            Check::Rejected(user, reason) => Some((user, reason)),
        },
        None => None,
    };

    // Tier 2: exact match on the normalized email.
    let fallback = store.find_by_email_exact(&email).await?;

    let outcome = match (primary, fallback) {
        (None, None) => {
            verify_dummy(password);
            NoMatchReason::UnknownIdentity
        }
        (Some((_, reason)), None) => reason,
        (None, Some(user)) => {
            warn!(
                user_id = %user.id,
                "exact email lookup found a user the case-insensitive lookup missed"
            );
            match check_password(user, password) {
                Check::Verified(user) => return Ok(Resolution::Matched(user)),
                Check::Rejected(_, reason) => reason,
            }
        }
        (Some((seen, reason)), Some(user)) => {
            let same_record = seen.id == user.id && seen.password_hash == user.password_hash;
            if same_record && reason != NoMatchReason::HashInconsistent {
                // The password was already checked against this exact hash.
                reason
            } else {
                if !same_record {
                    warn!(
                        primary_id = %seen.id,
                        fallback_id = %user.id,
                        "email lookups returned different records"
                    );
                }
                match check_password(user, password) {
                    Check::Verified(user) => {
                        warn!(user_id = %user.id, "credentials resolved only by exact email fallback");
                        return Ok(Resolution::Matched(user));
                    }
                    Check::Rejected(_, reason) => reason,
                }
            }
        }
    };

    debug!(email = %email, reason = ?outcome, "credentials not resolved");
    Ok(Resolution::NoMatch(outcome))
}

/// Resolve a username-or-email identifier. Anything containing `@` is an email.
pub async fn resolve_identifier(
    store: &dyn UserStore,
    identifier: &str,
    password: &str,
) -> anyhow::Result<Resolution> {
    let identifier = identifier.trim();
    if identifier.contains('@') {
        return resolve_email(store, identifier, password).await;
    }

    let outcome = match store.find_by_username(identifier).await? {
        Some(user) => match check_password(user, password) {
            Check::Verified(user) => return Ok(Resolution::Matched(user)),
            Check::Rejected(_, reason) => reason,
        },
        None => {
            verify_dummy(password);
            NoMatchReason::UnknownIdentity
        }
    };
    debug!(username = %identifier, reason = ?outcome, "credentials not resolved");
    Ok(Resolution::NoMatch(outcome))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{
        memory::MemoryUserStore,
        password::hash_password,
        repo_types::{CreateUserError, NewUser},
    };
    use async_trait::async_trait;
    use uuid::Uuid;

    async fn seed(store: &MemoryUserStore, username: &str, email: &str, password: &str) -> User {
        store
            .create(NewUser {
                username: username.into(),
                email: email.into(),
                password_hash: hash_password(password).unwrap(),
                phone: String::new(),
                full_name: "Test User".into(),
            })
            .await
            .unwrap()
    }

    fn reason(r: Resolution) -> NoMatchReason {
        match r {
            Resolution::NoMatch(reason) => reason,
            Resolution::Matched(u) => panic!("unexpected match for {}", u.email),
        }
    }

    #[tokio::test]
    async fn resolves_email_case_insensitively() {
        let store = MemoryUserStore::new();
        let user = seed(&store, "a", "A@Example.com", "secret123").await;

        let got = resolve_email(&store, "  a@example.com ", "secret123")
            .await
            .unwrap()
            .into_user()
            .expect("matched");
        assert_eq!(got.id, user.id);
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_email_both_no_match() {
        let store = MemoryUserStore::new();
        seed(&store, "a", "a@example.com", "secret123").await;

        let wrong = resolve_email(&store, "a@example.com", "nope-nope").await.unwrap();
        assert_eq!(reason(wrong), NoMatchReason::WrongPassword);

        let unknown = resolve_email(&store, "ghost@example.com", "secret123").await.unwrap();
        assert_eq!(reason(unknown), NoMatchReason::UnknownIdentity);
    }

    #[tokio::test]
    async fn unknown_email_pays_for_a_hash_check() {
        use std::time::Instant;

        let store = MemoryUserStore::new();
        seed(&store, "a", "a@example.com", "secret123").await;

        let started = Instant::now();
        resolve_email(&store, "a@example.com", "nope-nope").await.unwrap();
        let wrong_password = started.elapsed();

        let started = Instant::now();
        let r = resolve_email(&store, "ghost@example.com", "nope-nope").await.unwrap();
        let unknown = started.elapsed();

        assert_eq!(reason(r), NoMatchReason::UnknownIdentity);
        assert!(
            unknown * 4 >= wrong_password,
            "unknown {unknown:?} vs wrong password {wrong_password:?}"
        );
    }

    #[tokio::test]
    async fn inactive_user_cannot_resolve() {
        let store = MemoryUserStore::new();
        let user = seed(&store, "a", "a@example.com", "secret123").await;
        assert!(store.set_active(user.id, false).await);

        let r = resolve_email(&store, "a@example.com", "secret123").await.unwrap();
        assert_eq!(reason(r), NoMatchReason::Inactive);
    }

    #[tokio::test]
    async fn resolves_by_username_or_email() {
        let store = MemoryUserStore::new();
        let user = seed(&store, "jdoe", "jdoe@example.com", "secret123").await;

        let by_name = resolve_identifier(&store, "jdoe", "secret123").await.unwrap();
        assert_eq!(by_name.into_user().unwrap().id, user.id);

        let by_email = resolve_identifier(&store, "JDOE@example.com", "secret123").await.unwrap();
        assert_eq!(by_email.into_user().unwrap().id, user.id);

        // Usernames are exact-match.
        let r = resolve_identifier(&store, "JDoe", "secret123").await.unwrap();
        assert_eq!(reason(r), NoMatchReason::UnknownIdentity);
    }

    /// A store whose case-insensitive lookup is broken, as with a mismatched collation.
    struct CiBlindStore(MemoryUserStore);

    #[async_trait]
    impl UserStore for CiBlindStore {
        async fn find_by_email_ci(&self, _email: &str) -> anyhow::Result<Option<User>> {
            Ok(None)
        }
        async fn find_by_email_exact(&self, email: &str) -> anyhow::Result<Option<User>> {
            self.0.find_by_email_exact(email).await
        }
        async fn find_by_username(&self, username: &str) -> anyhow::Result<Option<User>> {
            self.0.find_by_username(username).await
        }
        async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
            self.0.find_by_id(id).await
        }
        async fn create(&self, new_user: NewUser) -> Result<User, CreateUserError> {
            self.0.create(new_user).await
        }
    }

    #[tokio::test]
    async fn falls_back_to_exact_lookup_when_primary_misses() {
        let inner = MemoryUserStore::new();
        let user = seed(&inner, "a", "a@example.com", "secret123").await;
        let store = CiBlindStore(inner);

        let got = resolve_email(&store, "A@EXAMPLE.COM", "secret123").await.unwrap();
        assert_eq!(got.into_user().unwrap().id, user.id);

        let wrong = resolve_email(&store, "a@example.com", "bad-password").await.unwrap();
        assert_eq!(reason(wrong), NoMatchReason::WrongPassword);
    }

    #[tokio::test]
    async fn unreadable_hash_is_no_match() {
        let store = MemoryUserStore::new();
        store
            .create(NewUser {
                username: "legacy".into(),
                email: "legacy@example.com".into(),
                password_hash: "plaintext-from-old-system".into(),
                phone: String::new(),
                full_name: "Legacy".into(),
            })
            .await
            .unwrap();

        let r = resolve_email(&store, "legacy@example.com", "plaintext-from-old-system")
            .await
            .unwrap();
        assert_eq!(reason(r), NoMatchReason::HashInconsistent);
    }
}
