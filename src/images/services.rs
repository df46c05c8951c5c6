use std::path::Path;

use anyhow::Context;
use axum::extract::{multipart::MultipartRejection, Multipart};
use bytes::Bytes;
use rand::Rng;
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::{error::AppError, state::AppState};

pub const IMAGE_FIELD: &str = "image";
pub const ALLOWED_IMAGE_TYPES: [&str; 3] = ["image/jpeg", "image/jpg", "image/png"];

pub struct UploadItem {
    pub body: Bytes,
    pub content_type: String,
    pub file_name: Option<String>,
}

const MISSING_IMAGE: &str = "File image wajib diisi";

/// Pulls exactly one image out of the `image` field; other fields are ignored.
/// A request that is not multipart at all counts as a missing file.
pub async fn read_single_image(
    mp: Result<Multipart, MultipartRejection>,
) -> Result<UploadItem, AppError> {
    let mut mp = mp.map_err(|e| {
        debug!(error = %e, "not a multipart request");
        AppError::Validation(MISSING_IMAGE.into())
    })?;
    let mut found: Option<UploadItem> = None;
    while let Some(field) = mp.next_field().await? {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }
        if found.is_some() {
            return Err(AppError::Validation(
                "Hanya satu file image yang diperbolehkan".into(),
            ));
        }
        let content_type = field
            .content_type()
            .map(|s| s.to_ascii_lowercase())
            .unwrap_or_default();
        let file_name = field.file_name().map(str::to_string);
        let body = field.bytes().await?;
        found = Some(UploadItem {
            body,
            content_type,
            file_name,
        });
    }

    let item = match found {
        Some(item) if !item.body.is_empty() => item,
        _ => return Err(AppError::Validation(MISSING_IMAGE.into())),
    };

    if !ALLOWED_IMAGE_TYPES.contains(&item.content_type.as_str())
        || !looks_like(&item.content_type, &item.body)
    {
        debug!(content_type = %item.content_type, "image rejected");
        return Err(AppError::Validation("Format Image tidak sesuai".into()));
    }
    Ok(item)
}

/// Writes the upload under a fresh name and returns that name.
pub async fn store_image(st: &AppState, item: UploadItem) -> anyhow::Result<String> {
    let file_name = generate_file_name(item.file_name.as_deref(), &item.content_type);
    st.storage
        .put_object(&file_name, item.body, &item.content_type)
        .await
        .with_context(|| format!("put_object {}", file_name))?;
    Ok(file_name)
}

/// Best effort; a leftover file is logged, never surfaced to the caller.
pub async fn discard_image(st: &AppState, file_name: Option<&str>) {
    let Some(file_name) = file_name.filter(|f| !f.is_empty()) else {
        return;
    };
    if let Err(e) = st.storage.delete_object(file_name).await {
        warn!(error = %e, file_name, "failed to delete stored image");
    }
}

/// `<unix millis>-<random>.<ext>`, extension from the original name or the MIME type.
pub fn generate_file_name(original: Option<&str>, content_type: &str) -> String {
    let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    let suffix: u32 = rand::thread_rng().gen_range(0..1_000_000_000);
    let ext = original
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.len() <= 10 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(str::to_ascii_lowercase)
        .or_else(|| ext_from_mime(content_type).map(str::to_string));
    match ext {
        Some(ext) => format!("{millis}-{suffix}.{ext}"),
        None => format!("{millis}-{suffix}"),
    }
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        _ => None,
    }
}

/// Magic-byte check so the declared type can't be a lie.
fn looks_like(content_type: &str, body: &[u8]) -> bool {
    match content_type {
        "image/jpeg" | "image/jpg" => body.starts_with(&[0xFF, 0xD8, 0xFF]),
        "image/png" => body.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]),
        _ => false,
    }
}
