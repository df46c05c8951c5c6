use async_trait::async_trait;
use sqlx::PgPool;

use crate::db::DbResult;
use crate::products::repo_types::{
    Mutation, NewProduct, Page, Product, ProductImageSwap, ProductPatch,
};

const PRODUCT_COLUMNS: &str =
    "id, user_id, name, qty, description, product_image, created_at";

/// Every lookup is keyed by id and scoped to the owner. Writes are single
/// conditional statements; a write that matches no row is classified after
/// the fact and never retried.
#[async_trait]
pub trait ProductRepo: Send + Sync {
    async fn create(&self, new: &NewProduct) -> DbResult<Product>;

    /// Ordered by id ascending.
    async fn list(&self, owner_id: i64, page: Page) -> DbResult<Vec<Product>>;

    async fn find(&self, owner_id: i64, id: i64) -> DbResult<Option<Product>>;

    async fn update(&self, owner_id: i64, id: i64, patch: &ProductPatch) -> DbResult<Mutation<Product>>;

    async fn replace_image(
        &self,
        owner_id: i64,
        id: i64,
        file_name: &str,
    ) -> DbResult<Mutation<ProductImageSwap>>;

    async fn delete(&self, owner_id: i64, id: i64) -> DbResult<Mutation<Product>>;
}

#[derive(Clone)]
pub struct PgProductRepo {
    db: PgPool,
}

impl PgProductRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Distinguishes "no such product" from "someone else's product".
    async fn classify_miss<T>(&self, id: i64) -> DbResult<Mutation<T>> {
        let owner: Option<i64> = sqlx::query_scalar("SELECT user_id FROM products WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(match owner {
            Some(_) => Mutation::NotOwner,
            None => Mutation::NotFound,
        })
    }
}

#[async_trait]
impl ProductRepo for PgProductRepo {
    async fn create(&self, new: &NewProduct) -> DbResult<Product> {
        let product = sqlx::query_as::<_, Product>(&format!(
            r#"
            INSERT INTO products (user_id, name, qty, description)
            VALUES ($1, $2, $3, $4)
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(new.user_id)
        .bind(&new.name)
        .bind(new.qty)
        .bind(&new.description)
        .fetch_one(&self.db)
        .await?;
        Ok(product)
    }

    async fn list(&self, owner_id: i64, page: Page) -> DbResult<Vec<Product>> {
        let rows = match page {
            Page::All => {
                sqlx::query_as::<_, Product>(&format!(
                    "SELECT {PRODUCT_COLUMNS} FROM products WHERE user_id = $1 ORDER BY id ASC"
                ))
                .bind(owner_id)
                .fetch_all(&self.db)
                .await?
            }
            Page::Window { limit, offset } => {
                sqlx::query_as::<_, Product>(&format!(
                    r#"
                    SELECT {PRODUCT_COLUMNS}
                      FROM products
                     WHERE user_id = $1
                     ORDER BY id ASC
                     LIMIT $2 OFFSET $3
                    "#
                ))
                .bind(owner_id)
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.db)
                .await?
            }
        };
        Ok(rows)
    }

    async fn find(&self, owner_id: i64, id: i64) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1 AND user_id = $2"
        ))
        .bind(id)
        .bind(owner_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(product)
    }

    async fn update(&self, owner_id: i64, id: i64, patch: &ProductPatch) -> DbResult<Mutation<Product>> {
        let updated = sqlx::query_as::<_, Product>(&format!(
            r#"
            UPDATE products
               SET name        = COALESCE($3, name),
                   qty         = COALESCE($4, qty),
                   description = COALESCE($5, description)
             WHERE id = $1 AND user_id = $2
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(owner_id)
        .bind(patch.name.as_deref())
        .bind(patch.qty)
        .bind(patch.description.as_deref())
        .fetch_optional(&self.db)
        .await?;

        match updated {
            Some(product) => Ok(Mutation::Applied(product)),
            None => self.classify_miss(id).await,
        }
    }

    async fn replace_image(
        &self,
        owner_id: i64,
        id: i64,
        file_name: &str,
    ) -> DbResult<Mutation<ProductImageSwap>> {
        let swapped = sqlx::query_as::<_, ProductImageSwap>(
            r#"
            WITH prev AS (
                SELECT id, product_image
                  FROM products
                 WHERE id = $1 AND user_id = $2
                   FOR UPDATE
            )
            UPDATE products p
               SET product_image = $3
              FROM prev
             WHERE p.id = prev.id
            RETURNING p.id, p.user_id, p.name, p.qty, p.description, p.product_image,
                      p.created_at, prev.product_image AS previous_image
            "#,
        )
        .bind(id)
        .bind(owner_id)
        .bind(file_name)
        .fetch_optional(&self.db)
        .await?;

        match swapped {
            Some(swap) => Ok(Mutation::Applied(swap)),
            None => self.classify_miss(id).await,
        }
    }

    async fn delete(&self, owner_id: i64, id: i64) -> DbResult<Mutation<Product>> {
        let deleted = sqlx::query_as::<_, Product>(&format!(
            "DELETE FROM products WHERE id = $1 AND user_id = $2 RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(id)
        .bind(owner_id)
        .fetch_optional(&self.db)
        .await?;

        match deleted {
            Some(product) => Ok(Mutation::Applied(product)),
            None => self.classify_miss(id).await,
        }
    }
}
