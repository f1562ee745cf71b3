//! Construction of per-request backend handles.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tapline_ai::{CompletionModel, LlmClient};
use tapline_connectors::{build_store, connect_sql, ObjectClient, ObjectStoreClient, SqlAdapter};
use tapline_core::{AwsS3Config, ConnectionConfig, OpenAiConfig, Result};

/// Opens the adapter for a connection's backend.
#[async_trait]
pub trait BackendFactory: Send + Sync {
    async fn sql_adapter(
        &self,
        config: &ConnectionConfig,
        timeout: Duration,
    ) -> Result<Box<dyn SqlAdapter>>;

    fn object_client(&self, config: &AwsS3Config) -> Result<Arc<dyn ObjectClient>>;

    fn completion_model(&self, config: &OpenAiConfig) -> Result<Arc<dyn CompletionModel>>;
}

/// Real drivers: sqlx pools, S3 through object_store, HTTP chat completions.
#[derive(Debug, Default, Clone, Copy)]
pub struct LiveBackends;

#[async_trait]
impl BackendFactory for LiveBackends {
    async fn sql_adapter(
        &self,
        config: &ConnectionConfig,
        timeout: Duration,
    ) -> Result<Box<dyn SqlAdapter>> {
        connect_sql(config, timeout).await
    }

    fn object_client(&self, config: &AwsS3Config) -> Result<Arc<dyn ObjectClient>> {
        let store = build_store(config)?;
        Ok(Arc::new(ObjectStoreClient::new(Arc::new(store))))
    }

    fn completion_model(&self, config: &OpenAiConfig) -> Result<Arc<dyn CompletionModel>> {
        Ok(Arc::new(LlmClient::new(config)))
    }
}
