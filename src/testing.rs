//! In-memory repositories and request helpers for handler tests.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use bytes::Bytes;
use serde_json::Value;
use time::OffsetDateTime;
use tower::ServiceExt;
use uuid::Uuid;

use crate::{
    auth::{claims::Identity, repo::SessionRepo, repo_types::Session},
    db::{DbError, DbResult},
    products::{
        repo::ProductRepo,
        repo_types::{Mutation, NewProduct, Page, Product, ProductImageSwap, ProductPatch},
    },
    state::AppState,
    storage::StorageClient,
    users::{
        repo::UserRepo,
        repo_types::{DeletedUser, NewUser, SortOrder, User, UserImageSwap},
    },
};

pub const PNG_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D];
pub const JPEG_BYTES: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0, 0x10, b'J', b'F', b'I', b'F'];

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    products: Vec<Product>,
    sessions: Vec<Session>,
    next_user: i64,
    next_product: i64,
}

/// Mirrors the Postgres repositories closely enough for handler tests:
/// unique emails, cascading deletes, owner-scoped writes.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap()
    }

    pub fn product(&self, id: i64) -> Option<Product> {
        self.lock().products.iter().find(|p| p.id == id).cloned()
    }

    pub fn user(&self, id: i64) -> Option<User> {
        self.lock().users.iter().find(|u| u.id == id).cloned()
    }

    pub fn session_count(&self, user_id: i64) -> usize {
        self.lock().sessions.iter().filter(|s| s.user_id == user_id).count()
    }

    fn owned_position(tables: &Tables, owner_id: i64, id: i64) -> Option<usize> {
        tables
            .products
            .iter()
            .position(|p| p.id == id && p.user_id == owner_id)
    }

    fn classify<T>(tables: &Tables, id: i64) -> Mutation<T> {
        if tables.products.iter().any(|p| p.id == id) {
            Mutation::NotOwner
        } else {
            Mutation::NotFound
        }
    }
}

fn provider_of(email: &str) -> String {
    email
        .split_once('@')
        .map(|(_, domain)| domain.split('.').next().unwrap_or_default().to_lowercase())
        .unwrap_or_default()
}

#[async_trait]
impl UserRepo for MemoryStore {
    async fn create(&self, new: &NewUser) -> DbResult<User> {
        let mut t = self.lock();
        if t.users.iter().any(|u| u.email == new.email) {
            return Err(DbError::UniqueViolation {
                constraint: Some("users_email_key".into()),
            });
        }
        t.next_user += 1;
        let user = User {
            id: t.next_user,
            email: new.email.clone(),
            password_hash: new.password_hash.clone(),
            first_name: new.first_name.clone(),
            last_name: new.last_name.clone(),
            profile_image: None,
            created_at: OffsetDateTime::now_utc(),
        };
        t.users.push(user.clone());
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> DbResult<Option<User>> {
        Ok(self.lock().users.iter().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: i64) -> DbResult<Option<User>> {
        Ok(self.user(id))
    }

    async fn list_all(&self) -> DbResult<Vec<User>> {
        Ok(self.lock().users.clone())
    }

    async fn filter_by_provider(&self, provider: &str) -> DbResult<Vec<User>> {
        let provider = provider.to_lowercase();
        Ok(self
            .lock()
            .users
            .iter()
            .filter(|u| provider_of(&u.email) == provider)
            .cloned()
            .collect())
    }

    async fn sort_by_email(&self, order: SortOrder) -> DbResult<Vec<User>> {
        let mut users = self.lock().users.clone();
        users.sort_by(|a, b| {
            let by_email = match order {
                SortOrder::Asc => a.email.cmp(&b.email),
                SortOrder::Desc => b.email.cmp(&a.email),
            };
            by_email.then(a.id.cmp(&b.id))
        });
        Ok(users)
    }

    async fn replace_profile_image(&self, id: i64, file_name: &str) -> DbResult<Option<UserImageSwap>> {
        let mut t = self.lock();
        let Some(user) = t.users.iter_mut().find(|u| u.id == id) else {
            return Ok(None);
        };
        let previous_image = user.profile_image.replace(file_name.to_string());
        Ok(Some(UserImageSwap {
            user: user.clone(),
            previous_image,
        }))
    }

    async fn delete(&self, id: i64) -> DbResult<Option<DeletedUser>> {
        let mut t = self.lock();
        let Some(pos) = t.users.iter().position(|u| u.id == id) else {
            return Ok(None);
        };
        let user = t.users.remove(pos);
        let product_images = t
            .products
            .iter()
            .filter(|p| p.user_id == id)
            .filter_map(|p| p.product_image.clone())
            .collect();
        t.products.retain(|p| p.user_id != id);
        t.sessions.retain(|s| s.user_id != id);
        Ok(Some(DeletedUser {
            user,
            product_images,
        }))
    }
}

#[async_trait]
impl ProductRepo for MemoryStore {
    async fn create(&self, new: &NewProduct) -> DbResult<Product> {
        let mut t = self.lock();
        t.next_product += 1;
        let product = Product {
            id: t.next_product,
            user_id: new.user_id,
            name: new.name.clone(),
            qty: new.qty,
            description: new.description.clone(),
            product_image: None,
            created_at: OffsetDateTime::now_utc(),
        };
        t.products.push(product.clone());
        Ok(product)
    }

    async fn list(&self, owner_id: i64, page: Page) -> DbResult<Vec<Product>> {
        let t = self.lock();
        let owned = t.products.iter().filter(|p| p.user_id == owner_id).cloned();
        Ok(match page {
            Page::All => owned.collect(),
            Page::Window { limit, offset } => owned
                .skip(offset as usize)
                .take(limit as usize)
                .collect(),
        })
    }

    async fn find(&self, owner_id: i64, id: i64) -> DbResult<Option<Product>> {
        Ok(self.product(id).filter(|p| p.user_id == owner_id))
    }

    async fn update(&self, owner_id: i64, id: i64, patch: &ProductPatch) -> DbResult<Mutation<Product>> {
        let mut t = self.lock();
        let Some(pos) = Self::owned_position(&t, owner_id, id) else {
            return Ok(Self::classify(&t, id));
        };
        let p = &mut t.products[pos];
        if let Some(name) = &patch.name {
            p.name = name.clone();
        }
        if let Some(qty) = patch.qty {
            p.qty = qty;
        }
        if let Some(description) = &patch.description {
            p.description = description.clone();
        }
        Ok(Mutation::Applied(p.clone()))
    }

    async fn replace_image(
        &self,
        owner_id: i64,
        id: i64,
        file_name: &str,
    ) -> DbResult<Mutation<ProductImageSwap>> {
        let mut t = self.lock();
        let Some(pos) = Self::owned_position(&t, owner_id, id) else {
            return Ok(Self::classify(&t, id));
        };
        let p = &mut t.products[pos];
        let previous_image = p.product_image.replace(file_name.to_string());
        Ok(Mutation::Applied(ProductImageSwap {
            product: p.clone(),
            previous_image,
        }))
    }

    async fn delete(&self, owner_id: i64, id: i64) -> DbResult<Mutation<Product>> {
        let mut t = self.lock();
        match Self::owned_position(&t, owner_id, id) {
            Some(pos) => Ok(Mutation::Applied(t.products.remove(pos))),
            None => Ok(Self::classify(&t, id)),
        }
    }
}

#[async_trait]
impl SessionRepo for MemoryStore {
    async fn create(&self, id: Uuid, user_id: i64, expires_at: OffsetDateTime) -> DbResult<Session> {
        let session = Session {
            id,
            user_id,
            expires_at,
        };
        self.lock().sessions.push(session.clone());
        Ok(session)
    }

    async fn consume(&self, id: Uuid, user_id: i64) -> DbResult<bool> {
        let mut t = self.lock();
        let now = OffsetDateTime::now_utc();
        match t
            .sessions
            .iter()
            .position(|s| s.id == id && s.user_id == user_id && s.expires_at > now)
        {
            Some(pos) => {
                t.sessions.remove(pos);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn revoke_all(&self, user_id: i64) -> DbResult<u64> {
        let mut t = self.lock();
        let before = t.sessions.len();
        t.sessions.retain(|s| s.user_id != user_id);
        Ok((before - t.sessions.len()) as u64)
    }
}

/// Keeps uploads in a map and remembers what was deleted.
#[derive(Default)]
pub struct FakeStorage {
    objects: Mutex<HashMap<String, Bytes>>,
    deleted: Mutex<Vec<String>>,
}

impl FakeStorage {
    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl StorageClient for FakeStorage {
    async fn put_object(&self, key: &str, body: Bytes, _content_type: &str) -> anyhow::Result<()> {
        self.objects.lock().unwrap().insert(key.to_string(), body);
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
        self.objects.lock().unwrap().remove(key);
        self.deleted.lock().unwrap().push(key.to_string());
        Ok(())
    }
}

/// The full router wired to in-memory backends.
pub struct TestApp {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub storage: Arc<FakeStorage>,
    pub router: Router,
}

impl TestApp {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::default());
        let storage = Arc::new(FakeStorage::default());
        let state = AppState::fake(store.clone(), storage.clone());
        let router = crate::app::build_app(state.clone());
        Self {
            state,
            store,
            storage,
            router,
        }
    }

    /// Inserts a user directly; the stored hash will not verify any password.
    pub async fn seed_user(&self, email: &str) -> User {
        UserRepo::create(
            self.store.as_ref(),
            &NewUser {
                email: email.to_string(),
                password_hash: "not-a-real-hash".into(),
                first_name: "Test".into(),
                last_name: "User".into(),
            },
        )
        .await
        .unwrap()
    }

    pub async fn seed_product(&self, owner: &User, name: &str, qty: i32) -> Product {
        ProductRepo::create(
            self.store.as_ref(),
            &NewProduct {
                user_id: owner.id,
                name: name.to_string(),
                qty,
                description: format!("{name} description"),
            },
        )
        .await
        .unwrap()
    }

    pub fn token_for(&self, user: &User) -> String {
        let identity = Identity {
            user_id: user.id,
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            profile_image: user.profile_image.clone(),
        };
        self.state.keys.sign_access(&identity).unwrap().token
    }

    pub async fn send(&self, req: Request<Body>) -> (StatusCode, Value) {
        let res = self.router.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, body)
    }
}

pub fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn bare_request(method: &str, uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

/// A request whose body is sent verbatim under the given content type.
pub fn raw_request(
    method: &str,
    uri: &str,
    token: Option<&str>,
    content_type: &str,
    body: &str,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, content_type);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

const BOUNDARY: &str = "stockroom-test-boundary";

/// One multipart part: field name, file name, content type and bytes.
pub struct Part<'a> {
    pub field: &'a str,
    pub file_name: &'a str,
    pub content_type: &'a str,
    pub body: &'a [u8],
}

pub fn image_part<'a>(file_name: &'a str, content_type: &'a str, body: &'a [u8]) -> Part<'a> {
    Part {
        field: "image",
        file_name,
        content_type,
        body,
    }
}

pub fn multipart_request(method: &str, uri: &str, token: &str, parts: &[Part<'_>]) -> Request<Body> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                part.field, part.file_name
            )
            .as_bytes(),
        );
        body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", part.content_type).as_bytes());
        body.extend_from_slice(part.body);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}
