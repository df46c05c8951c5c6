use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Product {
    pub id: i64,
    pub user_id: i64,                   // owner, never rewritten after insert
    pub name: String,
    pub qty: i32,
    pub description: String,
    pub product_image: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewProduct {
    pub user_id: i64,
    pub name: String,
    pub qty: i32,
    pub description: String,
}

/// Fields left as `None` keep their stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductPatch {
    pub name: Option<String>,
    pub qty: Option<i32>,
    pub description: Option<String>,
}

impl ProductPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.qty.is_none() && self.description.is_none()
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ProductImageSwap {
    #[sqlx(flatten)]
    pub product: Product,
    pub previous_image: Option<String>,
}

/// Outcome of an owner-scoped conditional write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation<T> {
    Applied(T),
    NotFound,
    NotOwner,
}

/// Which rows a list call returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    All,
    Window { limit: i64, offset: i64 },
}
