use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Persisted refresh-token session. Deleting the row revokes the token.
#[derive(Debug, Clone, FromRow)]
pub struct Session {
    pub id: Uuid,                   // refresh token jti
    pub user_id: i64,
    pub expires_at: OffsetDateTime,
}
