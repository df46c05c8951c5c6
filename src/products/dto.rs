use serde::{Deserialize, Deserializer};

use crate::error::AppError;
use crate::products::repo_types::{Page, ProductPatch};

pub const OFFSET_NEEDS_LIMIT: &str =
    "Apabila ingin menggunakan offset, limit harus diisi lebih besar dari 0";

/// Query-string integer where `?limit=` means "not given".
fn blank_as_none<'de, D>(de: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(de)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => v.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct Pagination {
    #[serde(default, deserialize_with = "blank_as_none")]
    pub limit: Option<i64>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub offset: Option<i64>,
}

impl Pagination {
    /// limit 0/absent means "everything", which only makes sense without an offset.
    pub fn resolve(&self) -> Result<Page, AppError> {
        let limit = self.limit.unwrap_or(0);
        let offset = self.offset.unwrap_or(0);
        if limit < 0 || offset < 0 {
            return Err(AppError::Validation(
                "limit dan offset tidak boleh negatif".into(),
            ));
        }
        match (limit, offset) {
            (0, 0) => Ok(Page::All),
            (0, _) => Err(AppError::Validation(OFFSET_NEEDS_LIMIT.into())),
            (limit, offset) => Ok(Page::Window { limit, offset }),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct IdQuery {
    #[serde(default, deserialize_with = "blank_as_none")]
    pub id: Option<i64>,
}

impl IdQuery {
    pub fn require(&self) -> Result<i64, AppError> {
        self.id
            .ok_or_else(|| AppError::Validation("Parameter id tidak boleh kosong".into()))
    }
}

/// Quantity as sent by form-ish clients: either a JSON number or a numeric string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum QtyInput {
    Number(i64),
    Text(String),
}

impl QtyInput {
    /// `Ok(None)` for an empty string.
    fn parse(&self) -> Result<Option<i32>, AppError> {
        let raw = match self {
            QtyInput::Number(n) => *n,
            QtyInput::Text(s) if s.trim().is_empty() => return Ok(None),
            QtyInput::Text(s) => s
                .trim()
                .parse::<i64>()
                .map_err(|_| AppError::Validation("qty harus berupa angka".into()))?,
        };
        if raw < 0 {
            return Err(AppError::Validation("qty tidak boleh negatif".into()));
        }
        i32::try_from(raw)
            .map(Some)
            .map_err(|_| AppError::Validation("qty terlalu besar".into()))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateProductRequest {
    pub name: Option<String>,
    pub qty: Option<QtyInput>,
    pub description: Option<String>,
}

impl CreateProductRequest {
    /// Returns `(name, qty, description)`.
    pub fn validate(self) -> Result<(String, i32, String), AppError> {
        let missing = || AppError::Validation("Name, qty, dan description tidak boleh kosong".into());
        let name = non_empty(self.name).ok_or_else(missing)?;
        let description = non_empty(self.description).ok_or_else(missing)?;
        let qty = match self.qty {
            Some(q) => q.parse()?.ok_or_else(missing)?,
            None => return Err(missing()),
        };
        Ok((name, qty, description))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub qty: Option<QtyInput>,
    pub description: Option<String>,
}

impl UpdateProductRequest {
    pub fn into_patch(self) -> Result<ProductPatch, AppError> {
        let qty = match self.qty {
            Some(q) => q.parse()?,
            None => None,
        };
        Ok(ProductPatch {
            name: non_empty(self.name),
            qty,
            description: non_empty(self.description),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
