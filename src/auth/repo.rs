use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::repo_types::{CreateUserError, IdentityField, NewUser, User};

/// Persistent user lookup and creation.
///
/// Handlers receive this as an explicit handle through `AppState`, so the
/// resolver and the registration service never reach for a global user model.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Case-insensitive email match.
    async fn find_by_email_ci(&self, email: &str) -> anyhow::Result<Option<User>>;
    /// Byte-for-byte email match.
    async fn find_by_email_exact(&self, email: &str) -> anyhow::Result<Option<User>>;
    async fn find_by_username(&self, username: &str) -> anyhow::Result<Option<User>>;
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>>;
    /// Insert a new user. Username and case-folded email must both be unused.
    async fn create(&self, new_user: NewUser) -> Result<User, CreateUserError>;
}

const USER_COLUMNS: &str =
    "id, username, email, password_hash, phone, full_name, is_active, created_at";

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn fetch_one_where(
        &self,
        clause: &str,
        value: &str,
        what: &'static str,
    ) -> anyhow::Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {clause}");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(value)
            .fetch_optional(&self.db)
            .await
            .context(what)?;
        Ok(user)
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_email_ci(&self, email: &str) -> anyhow::Result<Option<User>> {
        self.fetch_one_where("lower(email) = lower($1)", email, "find user by email (ci)")
            .await
    }

    async fn find_by_email_exact(&self, email: &str) -> anyhow::Result<Option<User>> {
        self.fetch_one_where("email = $1", email, "find user by email (exact)")
            .await
    }

    async fn find_by_username(&self, username: &str) -> anyhow::Result<Option<User>> {
        self.fetch_one_where("username = $1", username, "find user by username")
            .await
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await
            .context("find user by id")?;
        Ok(user)
    }

    async fn create(&self, new_user: NewUser) -> Result<User, CreateUserError> {
        let sql = format!(
            r#"
            INSERT INTO users (id, username, email, password_hash, phone, full_name)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {USER_COLUMNS}
            "#
        );
        let res = sqlx::query_as::<_, User>(&sql)
            .bind(Uuid::new_v4())
            .bind(&new_user.username)
            .bind(&new_user.email)
            .bind(&new_user.password_hash)
            .bind(&new_user.phone)
            .bind(&new_user.full_name)
            .fetch_one(&self.db)
            .await;

        match res {
            Ok(user) => Ok(user),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                let field = match db_err.constraint() {
                    Some(c) if c.contains("email") => IdentityField::Email,
                    _ => IdentityField::Username,
                };
                Err(CreateUserError::Duplicate(field))
            }
            Err(e) => Err(CreateUserError::Other(
                anyhow::Error::new(e).context("insert user"),
            )),
        }
    }
}
