//! Cloudinary asset storage: signed uploads into the NFT folder and
//! deletion by `public_id`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha1::{Digest, Sha1};
use tracing::debug;

use crate::config::CloudinaryConfig;
use crate::errors::{ApiError, VendorError};

const CLOUDINARY_API_BASE: &str = "https://api.cloudinary.com/v1_1";

/// Every upload lands in this folder and replaces an existing asset with the same id.
pub const UPLOAD_FOLDER: &str = "tree_nfts";

const JSON_DATA_URI_PREFIX: &str = "data:application/json;base64,";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Raw,
    #[default]
    Image,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Image => "image",
        }
    }
}

/// An upload ready to be sent: `file` is a data URI or remote URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub file: String,
    pub resource_type: ResourceType,
    pub upload_preset: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedAsset {
    pub url: String,
    pub public_id: String,
}

/// Turn the caller's `data` into the `file` field Cloudinary expects.
///
/// Raw resources are JSON metadata: anything that is not already a string is
/// serialized first, then the text is base64-wrapped in a JSON data URI.
/// Images must already be a data URI or URL and pass through untouched.
pub fn encode_upload_file(data: &Value, resource_type: ResourceType) -> Result<String, ApiError> {
    match resource_type {
        ResourceType::Raw => {
            let text = match data {
                Value::String(s) => s.clone(),
                other => serde_json::to_string(other)
                    .map_err(|e| ApiError::Validation(format!("Invalid JSON data: {e}")))?,
            };
            Ok(format!("{JSON_DATA_URI_PREFIX}{}", STANDARD.encode(text)))
        }
        ResourceType::Image => match data {
            Value::String(s) if !s.is_empty() => Ok(s.clone()),
            _ => Err(ApiError::Validation(
                "Image data must be a data URI or URL string".into(),
            )),
        },
    }
}

/// Build the string Cloudinary signs: params sorted by key, `k=v` joined by `&`.
fn string_to_sign(params: &BTreeMap<&str, String>) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// SHA-1 request signature over the sorted params followed by the API secret.
pub fn sign(params: &BTreeMap<&str, String>, api_secret: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(string_to_sign(params).as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}

#[async_trait]
pub trait AssetStore: Send + Sync {
    async fn upload(&self, request: &UploadRequest) -> Result<UploadedAsset, VendorError>;

    /// Returns Cloudinary's `result` string (`"ok"`, `"not found"`, ...).
    async fn destroy(
        &self,
        public_id: &str,
        resource_type: ResourceType,
    ) -> Result<String, VendorError>;
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: Option<String>,
    url: Option<String>,
    public_id: String,
}

#[derive(Debug, Deserialize)]
struct DestroyResponse {
    result: String,
}

#[derive(Debug, Deserialize)]
struct CloudinaryErrorEnvelope {
    error: CloudinaryErrorBody,
}

#[derive(Debug, Deserialize)]
struct CloudinaryErrorBody {
    message: String,
}

struct Credentials<'a> {
    cloud_name: &'a str,
    api_key: &'a str,
    api_secret: &'a str,
}

pub struct CloudinaryClient {
    client: Client,
    config: CloudinaryConfig,
    base_url: String,
}

impl CloudinaryClient {
    pub fn new(client: Client, config: CloudinaryConfig) -> Self {
        Self {
            client,
            config,
            base_url: CLOUDINARY_API_BASE.to_string(),
        }
    }

    fn credentials(&self) -> Result<Credentials<'_>, VendorError> {
        match (
            self.config.cloud_name.as_deref(),
            self.config.api_key.as_deref(),
            self.config.api_secret.as_deref(),
        ) {
            (Some(cloud_name), Some(api_key), Some(api_secret)) => Ok(Credentials {
                cloud_name,
                api_key,
                api_secret,
            }),
            _ => Err(VendorError::new("Cloudinary is not configured")
                .with_kind("configuration_error")),
        }
    }

    /// Sign `params`, add the file/key fields and POST to `{resource_type}/{action}`.
    async fn signed_post(
        &self,
        action: &str,
        resource_type: ResourceType,
        mut params: BTreeMap<&'static str, String>,
        file: Option<&str>,
    ) -> Result<String, VendorError> {
        let creds = self.credentials()?;
        params.insert("timestamp", chrono::Utc::now().timestamp().to_string());
        let signature = sign(&params, creds.api_secret);

        let mut form: Vec<(&str, String)> = params.into_iter().collect();
        form.push(("api_key", creds.api_key.to_string()));
        form.push(("signature", signature));
        if let Some(file) = file {
            form.push(("file", file.to_string()));
        }

        let url = format!(
            "{}/{}/{}/{}",
            self.base_url,
            creds.cloud_name,
            resource_type.as_str(),
            action
        );
        let resp = self
            .client
            .post(url)
            .form(&form)
            .send()
            .await
            .map_err(VendorError::connection)?;

        let status = resp.status();
        let body = resp.text().await.map_err(VendorError::connection)?;
        if !status.is_success() {
            let message = serde_json::from_str::<CloudinaryErrorEnvelope>(&body)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| format!("Cloudinary returned HTTP {status}"));
            return Err(VendorError::new(message).with_code(status.as_u16().to_string()));
        }
        Ok(body)
    }
}

#[async_trait]
impl AssetStore for CloudinaryClient {
    async fn upload(&self, request: &UploadRequest) -> Result<UploadedAsset, VendorError> {
        let mut params = BTreeMap::new();
        params.insert("folder", UPLOAD_FOLDER.to_string());
        params.insert("overwrite", "true".to_string());
        if let Some(preset) = request
            .upload_preset
            .clone()
            .or_else(|| self.config.upload_preset.clone())
        {
            params.insert("upload_preset", preset);
        }

        let body = self
            .signed_post("upload", request.resource_type, params, Some(&request.file))
            .await?;
        let parsed: UploadResponse = serde_json::from_str(&body).map_err(|e| {
            VendorError::new(format!("Unexpected Cloudinary response: {e}"))
        })?;
        let url = parsed
            .secure_url
            .or(parsed.url)
            .ok_or_else(|| VendorError::new("Cloudinary response has no asset URL"))?;

        debug!("Uploaded {} asset {}", request.resource_type.as_str(), parsed.public_id);
        Ok(UploadedAsset {
            url,
            public_id: parsed.public_id,
        })
    }

    async fn destroy(
        &self,
        public_id: &str,
        resource_type: ResourceType,
    ) -> Result<String, VendorError> {
        let mut params = BTreeMap::new();
        params.insert("public_id", public_id.to_string());

        let body = self
            .signed_post("destroy", resource_type, params, None)
            .await?;
        let parsed: DestroyResponse = serde_json::from_str(&body).map_err(|e| {
            VendorError::new(format!("Unexpected Cloudinary response: {e}"))
        })?;
        Ok(parsed.result)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn decode_data_uri(uri: &str) -> Value {
        let encoded = uri
            .strip_prefix(JSON_DATA_URI_PREFIX)
            .expect("json data uri prefix");
        let bytes = STANDARD.decode(encoded).unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn raw_object_round_trips_through_data_uri() {
        let metadata = json!({
            "name": "Neem #12",
            "attributes": [{ "trait_type": "species", "value": "Azadirachta indica" }],
            "co2": 21.5
        });
        let file = encode_upload_file(&metadata, ResourceType::Raw).unwrap();
        assert!(file.starts_with("data:application/json;base64,"));
        assert_eq!(decode_data_uri(&file), metadata);
    }

    #[test]
    fn raw_string_is_not_double_encoded() {
        let text = r#"{"name":"Banyan"}"#;
        let file = encode_upload_file(&json!(text), ResourceType::Raw).unwrap();
        assert_eq!(decode_data_uri(&file), json!({ "name": "Banyan" }));
    }

    #[test]
    fn image_passes_through() {
        let uri = "data:image/png;base64,iVBORw0KGgo=";
        assert_eq!(
            encode_upload_file(&json!(uri), ResourceType::Image).unwrap(),
            uri
        );
    }

    #[test]
    fn image_must_be_a_string() {
        let err = encode_upload_file(&json!({ "not": "a uri" }), ResourceType::Image).unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[test]
    fn resource_type_parses_lowercase() {
        let rt: ResourceType = serde_json::from_value(json!("raw")).unwrap();
        assert_eq!(rt, ResourceType::Raw);
        assert!(serde_json::from_value::<ResourceType>(json!("video")).is_err());
        assert_eq!(ResourceType::default(), ResourceType::Image);
    }

    #[test]
    fn params_are_signed_in_key_order() {
        let mut params = BTreeMap::new();
        params.insert("timestamp", "1315060510".to_string());
        params.insert("folder", "tree_nfts".to_string());
        params.insert("overwrite", "true".to_string());
        assert_eq!(
            string_to_sign(&params),
            "folder=tree_nfts&overwrite=true&timestamp=1315060510"
        );

        let sig = sign(&params, "abcd");
        assert_eq!(sig.len(), 40);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(sig, sign(&params, "other-secret"));
    }

    #[tokio::test]
    async fn unconfigured_client_reports_vendor_error() {
        let store = CloudinaryClient::new(Client::new(), CloudinaryConfig::default());
        let err = store.destroy("tree_nfts/abc", ResourceType::Image).await.unwrap_err();
        assert_eq!(err.kind.as_deref(), Some("configuration_error"));
    }
}
