//! Construction of the S3 object store for a connection.

use object_store::aws::{AmazonS3, AmazonS3Builder};
use tapline_core::{AwsS3Config, Result, TaplineError};

/// Build an S3 store for the connection's bucket.
///
/// Unset fields fall back to the standard `AWS_*` environment variables.
pub fn build_store(config: &AwsS3Config) -> Result<AmazonS3> {
    let mut builder = AmazonS3Builder::from_env().with_bucket_name(&config.bucket);

    if let Some(ref region) = config.region {
        builder = builder.with_region(region);
    }
    if let Some(ref key) = config.access_key_id {
        builder = builder.with_access_key_id(key);
    }
    if let Some(ref secret) = config.secret_access_key {
        builder = builder.with_secret_access_key(secret);
    }
    if let Some(ref token) = config.session_token {
        builder = builder.with_token(token);
    }
    if let Some(ref endpoint) = config.endpoint_url {
        builder = builder.with_endpoint(endpoint);
    }
    if config.allow_http {
        builder = builder.with_allow_http(true);
    }

    builder.build().map_err(|e| {
        TaplineError::Connection(format!(
            "failed to build S3 client for bucket '{}': {}",
            config.bucket, e
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_store_for_custom_endpoint() {
        let config = AwsS3Config {
            bucket: "job-artifacts".to_string(),
            region: Some("eu-west-1".to_string()),
            endpoint_url: Some("http://localhost:9000".to_string()),
            access_key_id: Some("minio".to_string()),
            secret_access_key: Some("minio123".to_string()),
            session_token: None,
            allow_http: true,
        };
        assert!(build_store(&config).is_ok());
    }
}
