use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::auth::repo_types::{NewUser, User};

#[derive(Debug, Error)]
pub enum StoreError {
    /// Unique constraint on user_name or email hit.
    #[error("duplicate user")]
    Duplicate,
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

impl StoreError {
    fn from_sqlx(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if db.is_unique_violation() {
                return StoreError::Duplicate;
            }
        }
        StoreError::Db(err)
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Credential store. Single-field updates never touch other columns.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>>;

    /// Matches on user name OR email, whichever are given.
    async fn find_by_identifier(
        &self,
        user_name: Option<&str>,
        email: Option<&str>,
    ) -> StoreResult<Option<User>>;

    async fn create(&self, new: NewUser) -> StoreResult<User>;

    /// Overwrites (or clears, with `None`) the stored refresh token.
    async fn set_refresh_token(&self, id: Uuid, token: Option<&str>) -> StoreResult<()>;

    /// Replaces the stored refresh token only if it still equals `expected`.
    async fn rotate_refresh_token(&self, id: Uuid, expected: &str, next: &str)
        -> StoreResult<bool>;

    async fn update_password(&self, id: Uuid, password_hash: &str) -> StoreResult<()>;

    async fn update_profile(
        &self,
        id: Uuid,
        full_name: &str,
        email: &str,
    ) -> StoreResult<Option<User>>;
}

const USER_COLUMNS: &str = "id, user_name, email, full_name, password_hash, avatar_url, \
cover_image_url, refresh_token, created_at, updated_at";

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_identifier(
        &self,
        user_name: Option<&str>,
        email: Option<&str>,
    ) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            SELECT {USER_COLUMNS}
            FROM users
            WHERE ($1::text IS NOT NULL AND user_name = $1)
               OR ($2::text IS NOT NULL AND email = $2)
            LIMIT 1
            "#
        ))
        .bind(user_name)
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn create(&self, new: NewUser) -> StoreResult<User> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (id, user_name, email, full_name, password_hash, avatar_url, cover_image_url)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&new.user_name)
        .bind(&new.email)
        .bind(&new.full_name)
        .bind(&new.password_hash)
        .bind(&new.avatar_url)
        .bind(&new.cover_image_url)
        .fetch_one(&self.db)
        .await
        .map_err(StoreError::from_sqlx)
    }

    async fn set_refresh_token(&self, id: Uuid, token: Option<&str>) -> StoreResult<()> {
        sqlx::query("UPDATE users SET refresh_token = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(token)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn rotate_refresh_token(
        &self,
        id: Uuid,
        expected: &str,
        next: &str,
    ) -> StoreResult<bool> {
        let res = sqlx::query(
            r#"
            UPDATE users
               SET refresh_token = $3, updated_at = now()
             WHERE id = $1 AND refresh_token = $2
            "#,
        )
        .bind(id)
        .bind(expected)
        .bind(next)
        .execute(&self.db)
        .await?;
        Ok(res.rows_affected() == 1)
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> StoreResult<()> {
        sqlx::query("UPDATE users SET password_hash = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn update_profile(
        &self,
        id: Uuid,
        full_name: &str,
        email: &str,
    ) -> StoreResult<Option<User>> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
               SET full_name = $2, email = $3, updated_at = now()
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(full_name)
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .map_err(StoreError::from_sqlx)
    }
}
