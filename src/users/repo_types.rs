use sqlx::FromRow;
use time::OffsetDateTime;

/// User record in the database.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub password_hash: String,          // argon2 PHC string
    pub first_name: String,
    pub last_name: String,
    pub profile_image: Option<String>,  // stored file name
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
}

/// Row returned by a profile image swap: the updated user plus the file it replaced.
#[derive(Debug, Clone, FromRow)]
pub struct UserImageSwap {
    #[sqlx(flatten)]
    pub user: User,
    pub previous_image: Option<String>,
}

/// A deleted user and the product images that went with them.
#[derive(Debug, Clone)]
pub struct DeletedUser {
    pub user: User,
    pub product_images: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "asc" => Some(SortOrder::Asc),
            "desc" => Some(SortOrder::Desc),
            _ => None,
        }
    }

    pub(crate) fn as_sql(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}
