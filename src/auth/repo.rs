use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::repo_types::Session;
use crate::db::DbResult;

#[async_trait]
pub trait SessionRepo: Send + Sync {
    async fn create(&self, id: Uuid, user_id: i64, expires_at: OffsetDateTime) -> DbResult<Session>;

    /// Deletes a live session in one statement. `false` means it was unknown,
    /// expired, already used, or owned by another user.
    async fn consume(&self, id: Uuid, user_id: i64) -> DbResult<bool>;

    async fn revoke_all(&self, user_id: i64) -> DbResult<u64>;
}

#[derive(Clone)]
pub struct PgSessionRepo {
    db: PgPool,
}

impl PgSessionRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SessionRepo for PgSessionRepo {
    async fn create(&self, id: Uuid, user_id: i64, expires_at: OffsetDateTime) -> DbResult<Session> {
        let session = sqlx::query_as::<_, Session>(
            r#"
            INSERT INTO sessions (id, user_id, expires_at)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, expires_at
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(expires_at)
        .fetch_one(&self.db)
        .await?;
        Ok(session)
    }

    async fn consume(&self, id: Uuid, user_id: i64) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM sessions
            WHERE id = $1 AND user_id = $2 AND expires_at > now()
            "#,
        )
        .bind(id)
        .bind(user_id)
        .execute(&self.db)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn revoke_all(&self, user_id: i64) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::{
        repo::{PgUserRepo, UserRepo},
        repo_types::NewUser,
    };
    use time::Duration;

    async fn user_id(pool: &PgPool, email: &str) -> i64 {
        PgUserRepo::new(pool.clone())
            .create(&NewUser {
                email: email.into(),
                password_hash: "hash".into(),
                first_name: "Test".into(),
                last_name: "User".into(),
            })
            .await
            .unwrap()
            .id
    }

    fn in_an_hour() -> OffsetDateTime {
        OffsetDateTime::now_utc() + Duration::hours(1)
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn session_is_consumed_once(pool: PgPool) {
        let repo = PgSessionRepo::new(pool.clone());
        let owner = user_id(&pool, "ayu@gmail.com").await;
        let other = user_id(&pool, "budi@gmail.com").await;
        let jti = Uuid::new_v4();

        let session = repo.create(jti, owner, in_an_hour()).await.unwrap();
        assert_eq!(session.id, jti);
        assert_eq!(session.user_id, owner);

        assert!(!repo.consume(jti, other).await.unwrap());
        assert!(repo.consume(jti, owner).await.unwrap());
        assert!(!repo.consume(jti, owner).await.unwrap());
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn expired_session_cannot_be_consumed(pool: PgPool) {
        let repo = PgSessionRepo::new(pool.clone());
        let owner = user_id(&pool, "ayu@gmail.com").await;
        let jti = Uuid::new_v4();

        repo.create(jti, owner, OffsetDateTime::now_utc() - Duration::minutes(1))
            .await
            .unwrap();
        assert!(!repo.consume(jti, owner).await.unwrap());
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn revoke_all_removes_only_that_users_sessions(pool: PgPool) {
        let repo = PgSessionRepo::new(pool.clone());
        let owner = user_id(&pool, "ayu@gmail.com").await;
        let other = user_id(&pool, "budi@gmail.com").await;
        let kept = Uuid::new_v4();

        repo.create(Uuid::new_v4(), owner, in_an_hour()).await.unwrap();
        repo.create(Uuid::new_v4(), owner, in_an_hour()).await.unwrap();
        repo.create(kept, other, in_an_hour()).await.unwrap();

        assert_eq!(repo.revoke_all(owner).await.unwrap(), 2);
        assert_eq!(repo.revoke_all(owner).await.unwrap(), 0);
        assert!(repo.consume(kept, other).await.unwrap());
    }
}
