use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;

use crate::db::DbResult;
use crate::users::repo_types::{DeletedUser, NewUser, SortOrder, User, UserImageSwap};

const USER_COLUMNS: &str =
    "id, email, password_hash, first_name, last_name, profile_image, created_at";

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn create(&self, new: &NewUser) -> DbResult<User>;

    async fn find_by_email(&self, email: &str) -> DbResult<Option<User>>;

    async fn find_by_id(&self, id: i64) -> DbResult<Option<User>>;

    async fn list_all(&self) -> DbResult<Vec<User>>;

    /// Users whose email domain starts with the `provider` label, e.g. `gmail`.
    async fn filter_by_provider(&self, provider: &str) -> DbResult<Vec<User>>;

    async fn sort_by_email(&self, order: SortOrder) -> DbResult<Vec<User>>;

    /// `None` when the user no longer exists.
    async fn replace_profile_image(&self, id: i64, file_name: &str) -> DbResult<Option<UserImageSwap>>;

    /// Removes the user together with their products and sessions.
    async fn delete(&self, id: i64) -> DbResult<Option<DeletedUser>>;
}

#[derive(Clone)]
pub struct PgUserRepo {
    db: PgPool,
}

impl PgUserRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserRepo for PgUserRepo {
    async fn create(&self, new: &NewUser) -> DbResult<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (email, password_hash, first_name, last_name)
            VALUES ($1, $2, $3, $4)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&new.email)
        .bind(&new.password_hash)
        .bind(&new.first_name)
        .bind(&new.last_name)
        .fetch_one(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> DbResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_id(&self, id: i64) -> DbResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn list_all(&self) -> DbResult<Vec<User>> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY id ASC"
        ))
        .fetch_all(&self.db)
        .await?;
        Ok(users)
    }

    async fn filter_by_provider(&self, provider: &str) -> DbResult<Vec<User>> {
        let users = sqlx::query_as::<_, User>(&format!(
            r#"
            SELECT {USER_COLUMNS}
              FROM users
             WHERE lower(split_part(split_part(email, '@', 2), '.', 1)) = lower($1)
             ORDER BY id ASC
            "#
        ))
        .bind(provider)
        .fetch_all(&self.db)
        .await?;
        Ok(users)
    }

    async fn sort_by_email(&self, order: SortOrder) -> DbResult<Vec<User>> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY email {}, id ASC",
            order.as_sql()
        ))
        .fetch_all(&self.db)
        .await?;
        Ok(users)
    }

    async fn replace_profile_image(&self, id: i64, file_name: &str) -> DbResult<Option<UserImageSwap>> {
        let row = sqlx::query_as::<_, UserImageSwap>(
            r#"
            WITH prev AS (
                SELECT id, profile_image FROM users WHERE id = $1 FOR UPDATE
            )
            UPDATE users u
               SET profile_image = $2
              FROM prev
             WHERE u.id = prev.id
            RETURNING u.id, u.email, u.password_hash, u.first_name, u.last_name,
                      u.profile_image, u.created_at, prev.profile_image AS previous_image
            "#,
        )
        .bind(id)
        .bind(file_name)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn delete(&self, id: i64) -> DbResult<Option<DeletedUser>> {
        let mut tx = self.db.begin().await.context("begin tx")?;

        let product_images: Vec<String> = sqlx::query_scalar::<_, Option<String>>(
            r#"
            DELETE FROM products
             WHERE user_id = $1
            RETURNING product_image
            "#,
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .flatten()
        .collect();

        let user = sqlx::query_as::<_, User>(&format!(
            "DELETE FROM users WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(user) = user else {
            tx.rollback().await.context("rollback tx")?;
            return Ok(None);
        };

        tx.commit().await.context("commit tx")?;
        Ok(Some(DeletedUser {
            user,
            product_images,
        }))
    }
}
