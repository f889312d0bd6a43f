//! Google Cloud Storage backend.
//!
//! Object content goes through `object_store`'s GCS client (streamed reads,
//! buffered multipart writes, deletes). Bucket and object metadata come from
//! the GCS JSON API over `reqwest`, since that is where generation and CRC32C
//! live; authenticated calls reuse the bearer token of the `object_store`
//! client.
//!
//! `object_store` clients are bound to one bucket, so [`GcsStorage`] builds
//! them lazily and keeps one per bucket name for the session.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bucket_loader_core::contract::{
    Authentication, BucketDescriptor, ObjectDescriptor, ObjectStorage, ObjectStream, ObjectWriter,
    StorageConnector,
};
use bucket_loader_core::StorageError;
use futures::StreamExt;
use object_store::buffered::BufWriter;
use object_store::gcp::{GoogleCloudStorage, GoogleCloudStorageBuilder};
use object_store::path::Path as ObjectPath;
use object_store::{Attribute, Attributes, ClientOptions, ObjectStore};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, error, info};

const JSON_API: &str = "https://storage.googleapis.com/storage/v1";

/// Fields of a service-account key file that must be present.
#[derive(Deserialize)]
struct ServiceAccountKey {
    #[serde(rename = "type")]
    key_type: String,
    client_email: String,
    private_key: String,
    project_id: Option<String>,
}

enum Credentials {
    Anonymous,
    /// Raw JSON of the key file, handed to `object_store` as is.
    ServiceAccount(String),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BucketResource {
    name: String,
    location: Option<String>,
    storage_class: Option<String>,
}

/// Object resource as returned by the JSON API; 64-bit integers arrive as strings.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectResource {
    name: String,
    bucket: String,
    size: Option<String>,
    crc32c: Option<String>,
    generation: Option<String>,
    content_type: Option<String>,
}

impl ObjectResource {
    fn into_descriptor(self) -> Result<ObjectDescriptor, StorageError> {
        let size = match self.size.as_deref() {
            Some(size) => size.parse::<u64>().map_err(|e| {
                StorageError::provider(format!("invalid object size '{size}': {e}"))
            })?,
            None => 0,
        };
        let generation = match self.generation.as_deref() {
            Some(generation) => Some(generation.parse::<i64>().map_err(|e| {
                StorageError::provider(format!("invalid object generation '{generation}': {e}"))
            })?),
            None => None,
        };
        Ok(ObjectDescriptor {
            bucket: self.bucket,
            name: self.name,
            size,
            crc32c: self.crc32c.as_deref().and_then(decode_crc32c),
            generation,
            content_type: self.content_type,
        })
    }
}

/// GCS reports CRC32C as base64 of the big-endian checksum.
fn decode_crc32c(encoded: &str) -> Option<u32> {
    let bytes = STANDARD.decode(encoded).ok()?;
    let bytes: [u8; 4] = bytes.try_into().ok()?;
    Some(u32::from_be_bytes(bytes))
}

async fn load_service_account(path: &Path) -> Result<String, StorageError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| StorageError::Credentials {
            message: format!("cannot read key file {}: {e}", path.display()),
        })?;
    let key: ServiceAccountKey =
        serde_json::from_str(&raw).map_err(|e| StorageError::Credentials {
            message: format!("cannot parse key file {}: {e}", path.display()),
        })?;
    if key.key_type != "service_account" || key.private_key.is_empty() {
        return Err(StorageError::Credentials {
            message: format!("{} is not a service-account key", path.display()),
        });
    }
    info!(
        client_email = %key.client_email,
        project_id = ?key.project_id,
        "Loaded service-account key"
    );
    Ok(raw)
}

/// Opens sessions against Google Cloud Storage.
pub struct GcsConnector {
    api_base: String,
}

impl GcsConnector {
    pub fn new() -> Self {
        Self {
            api_base: JSON_API.to_string(),
        }
    }
}

impl Default for GcsConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageConnector for GcsConnector {
    async fn connect(
        &self,
        authentication: &Authentication,
        timeout: Duration,
    ) -> Result<Arc<dyn ObjectStorage>, StorageError> {
        let credentials = match authentication {
            Authentication::Anonymous => Credentials::Anonymous,
            Authentication::ServiceAccount(path) => {
                Credentials::ServiceAccount(load_service_account(path).await?)
            }
        };
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StorageError::provider(format!("cannot build HTTP client: {e}")))?;
        debug!(anonymous = authentication.is_anonymous(), ?timeout, "GCS session opened");
        Ok(Arc::new(GcsStorage {
            credentials,
            client_options: ClientOptions::new().with_timeout(timeout),
            http,
            api_base: self.api_base.clone(),
            stores: Mutex::new(HashMap::new()),
        }))
    }
}

/// One authenticated (or anonymous) session against GCS.
pub struct GcsStorage {
    credentials: Credentials,
    client_options: ClientOptions,
    http: reqwest::Client,
    api_base: String,
    stores: Mutex<HashMap<String, Arc<GoogleCloudStorage>>>,
}

impl GcsStorage {
    fn store(&self, bucket: &str) -> Result<Arc<GoogleCloudStorage>, StorageError> {
        let mut stores = self.stores.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(store) = stores.get(bucket) {
            return Ok(store.clone());
        }
        let builder = GoogleCloudStorageBuilder::new()
            .with_bucket_name(bucket)
            .with_client_options(self.client_options.clone());
        let builder = match &self.credentials {
            Credentials::Anonymous => builder.with_skip_signature(true),
            Credentials::ServiceAccount(key) => builder.with_service_account_key(key.clone()),
        };
        let store = Arc::new(builder.build().map_err(|e| {
            StorageError::provider(format!("cannot build client for bucket {bucket}: {e}"))
        })?);
        stores.insert(bucket.to_string(), store.clone());
        Ok(store)
    }

    fn url(&self, segments: &[&str]) -> Result<Url, StorageError> {
        let mut url = Url::parse(&self.api_base)
            .map_err(|e| StorageError::provider(format!("invalid API base {}: {e}", self.api_base)))?;
        url.path_segments_mut()
            .map_err(|_| StorageError::provider(format!("invalid API base {}", self.api_base)))?
            .extend(segments);
        Ok(url)
    }

    async fn bearer(&self, bucket: &str) -> Result<Option<String>, StorageError> {
        match self.credentials {
            Credentials::Anonymous => Ok(None),
            Credentials::ServiceAccount(_) => {
                let store = self.store(bucket)?;
                let credential = store
                    .credentials()
                    .get_credential()
                    .await
                    .map_err(|e| StorageError::Credentials {
                        message: e.to_string(),
                    })?;
                Ok(Some(credential.bearer.clone()))
            }
        }
    }

    /// GET a JSON API resource; `Ok(None)` when it does not exist.
    async fn get_json<T: DeserializeOwned>(
        &self,
        bucket: &str,
        url: Url,
    ) -> Result<Option<T>, StorageError> {
        let mut request = self.http.get(url.clone());
        if let Some(token) = self.bearer(bucket).await? {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| StorageError::provider(format!("request to {url} failed: {e}")))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<Failed to decode response body>"));
            error!(%url, %status, %body, "GCS metadata request failed");
            return Err(StorageError::provider(format!("{status}: {body}")));
        }
        response
            .json::<T>()
            .await
            .map(Some)
            .map_err(|e| StorageError::provider(format!("cannot decode response from {url}: {e}")))
    }
}

fn map_store_error(bucket: &str, object: &str, err: object_store::Error) -> StorageError {
    match err {
        object_store::Error::NotFound { .. } => StorageError::ObjectNotFound {
            bucket: bucket.to_string(),
            object: object.to_string(),
        },
        other => StorageError::provider(other.to_string()),
    }
}

#[async_trait]
impl ObjectStorage for GcsStorage {
    async fn bucket_metadata(&self, bucket: &str) -> Result<BucketDescriptor, StorageError> {
        let url = self.url(&["b", bucket])?;
        match self.get_json::<BucketResource>(bucket, url).await? {
            Some(resource) => Ok(BucketDescriptor {
                name: resource.name,
                location: resource.location,
                storage_class: resource.storage_class,
            }),
            None => Err(StorageError::BucketNotFound {
                bucket: bucket.to_string(),
            }),
        }
    }

    async fn object_metadata(
        &self,
        bucket: &str,
        object: &str,
    ) -> Result<ObjectDescriptor, StorageError> {
        let url = self.url(&["b", bucket, "o", object])?;
        match self.get_json::<ObjectResource>(bucket, url).await? {
            Some(resource) => resource.into_descriptor(),
            None => Err(StorageError::ObjectNotFound {
                bucket: bucket.to_string(),
                object: object.to_string(),
            }),
        }
    }

    async fn open_read(&self, bucket: &str, object: &str) -> Result<ObjectStream, StorageError> {
        let store = self.store(bucket)?;
        let result = store
            .get(&ObjectPath::from(object))
            .await
            .map_err(|e| map_store_error(bucket, object, e))?;
        Ok(result
            .into_stream()
            .map(|chunk| chunk.map_err(|e| StorageError::provider(e.to_string())))
            .boxed())
    }

    async fn open_write(
        &self,
        bucket: &str,
        object: &str,
        content_type: Option<String>,
    ) -> Result<ObjectWriter, StorageError> {
        let store: Arc<dyn ObjectStore> = self.store(bucket)?;
        let mut writer = BufWriter::new(store, ObjectPath::from(object));
        if let Some(content_type) = content_type {
            let mut attributes = Attributes::new();
            attributes.insert(Attribute::ContentType, content_type.into());
            writer = writer.with_attributes(attributes);
        }
        Ok(Box::new(writer))
    }

    async fn delete(&self, bucket: &str, object: &str) -> Result<(), StorageError> {
        let store = self.store(bucket)?;
        store
            .delete(&ObjectPath::from(object))
            .await
            .map_err(|e| map_store_error(bucket, object, e))
    }

    async fn close(&self) {
        let mut stores = self.stores.lock().unwrap_or_else(PoisonError::into_inner);
        debug!(clients = stores.len(), "Closing GCS session");
        stores.clear();
    }
}
