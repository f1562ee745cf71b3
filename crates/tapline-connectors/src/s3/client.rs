//! Paged object listing and object reads.
//!
//! [`ObjectClient`] mirrors the S3 `ListObjectsV2` / `GetObject` pair so the
//! adapter can drive continuation tokens explicitly. [`ObjectStoreClient`]
//! implements it over any `object_store` backend.

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use object_store::path::Path;
use object_store::ObjectStore;
use tapline_core::{Result, TaplineError};
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;
use tracing::debug;

use crate::error::store_error;

/// Body of one object. Dropping it releases the underlying connection.
pub type ObjectReader = Pin<Box<dyn AsyncRead + Send>>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListObjectsRequest {
    pub prefix: String,
    /// Group keys on `/` below the prefix into common prefixes.
    pub delimited: bool,
    pub continuation_token: Option<String>,
    pub max_keys: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListObjectsPage {
    pub keys: Vec<String>,
    /// Folder prefixes, each ending in `/`. Only set for delimited listings.
    pub common_prefixes: Vec<String>,
    pub is_truncated: bool,
    pub next_continuation_token: Option<String>,
}

impl ListObjectsPage {
    /// Keys plus common prefixes, as S3 counts them.
    pub fn key_count(&self) -> usize {
        self.keys.len() + self.common_prefixes.len()
    }
}

#[async_trait]
pub trait ObjectClient: Send + Sync {
    async fn list_objects(&self, request: &ListObjectsRequest) -> Result<ListObjectsPage>;

    async fn get_object(&self, key: &str) -> Result<ObjectReader>;
}

/// [`ObjectClient`] over an `object_store` backend.
///
/// Continuation tokens are the last key of the previous page; listings are
/// lexicographic on S3 and on the in-memory store. Delimited listings are
/// returned as a single page.
pub struct ObjectStoreClient {
    store: Arc<dyn ObjectStore>,
}

impl ObjectStoreClient {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ObjectClient for ObjectStoreClient {
    async fn list_objects(&self, request: &ListObjectsRequest) -> Result<ListObjectsPage> {
        let prefix = Path::from(request.prefix.as_str());
        let op = format!("list objects under '{}'", request.prefix);

        if request.delimited {
            let listing = self
                .store
                .list_with_delimiter(Some(&prefix))
                .await
                .map_err(|e| store_error(&op, e))?;
            return Ok(ListObjectsPage {
                keys: listing
                    .objects
                    .into_iter()
                    .map(|meta| meta.location.to_string())
                    .collect(),
                common_prefixes: listing
                    .common_prefixes
                    .into_iter()
                    .map(|p| format!("{}/", p))
                    .collect(),
                is_truncated: false,
                next_continuation_token: None,
            });
        }

        let mut listing = match &request.continuation_token {
            Some(token) => self
                .store
                .list_with_offset(Some(&prefix), &Path::from(token.as_str())),
            None => self.store.list(Some(&prefix)),
        };
        let limit = request.max_keys.unwrap_or(usize::MAX);

        let mut keys = Vec::new();
        let mut is_truncated = false;
        while let Some(meta) = listing.try_next().await.map_err(|e| store_error(&op, e))? {
            if keys.len() == limit {
                is_truncated = true;
                break;
            }
            keys.push(meta.location.to_string());
        }
        debug!("{}: {} keys, truncated={}", op, keys.len(), is_truncated);

        let next_continuation_token = if is_truncated { keys.last().cloned() } else { None };
        Ok(ListObjectsPage {
            keys,
            common_prefixes: Vec::new(),
            is_truncated,
            next_continuation_token,
        })
    }

    async fn get_object(&self, key: &str) -> Result<ObjectReader> {
        let path = Path::parse(key)
            .map_err(|e| TaplineError::bad_request(format!("invalid object key '{}': {}", key, e)))?;
        let result = self
            .store
            .get(&path)
            .await
            .map_err(|e| store_error(&format!("get object '{}'", key), e))?;
        let body = result.into_stream().map_err(std::io::Error::other);
        Ok(Box::pin(StreamReader::new(body.boxed())))
    }
}
