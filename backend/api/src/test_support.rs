//! In-memory vendor fakes shared by the unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::assets::{AssetStore, ResourceType, UploadRequest, UploadedAsset};
use crate::errors::VendorError;
use crate::inference::{GenerationError, GenerationParams, TextGenerator};
use crate::payments::{NewPaymentIntent, PaymentGateway, PaymentIntent};

enum Scripted {
    Text(String),
    Status(u16),
    Panic,
}

/// Answers per model name; unknown models fail with HTTP 404.
#[derive(Default)]
pub struct ScriptedGenerator {
    answers: HashMap<String, Scripted>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ok(mut self, model: &str, text: &str) -> Self {
        self.answers
            .insert(model.to_string(), Scripted::Text(text.to_string()));
        self
    }

    pub fn status(mut self, model: &str, status: u16) -> Self {
        self.answers
            .insert(model.to_string(), Scripted::Status(status));
        self
    }

    pub fn panics(mut self, model: &str) -> Self {
        self.answers.insert(model.to_string(), Scripted::Panic);
        self
    }

    pub fn calls(&self) -> Arc<Mutex<Vec<String>>> {
        self.calls.clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(
        &self,
        model: &str,
        _prompt: &str,
        _params: GenerationParams,
    ) -> Result<String, GenerationError> {
        self.calls.lock().unwrap().push(model.to_string());
        match self.answers.get(model) {
            Some(Scripted::Text(text)) => Ok(text.clone()),
            Some(Scripted::Status(status)) => Err(GenerationError::Status {
                status: *status,
                message: format!("scripted {status}"),
            }),
            Some(Scripted::Panic) => panic!("generator for {model} blew up"),
            None => Err(GenerationError::Status {
                status: 404,
                message: format!("unknown model {model}"),
            }),
        }
    }
}

/// Records every intent it is asked to create.
#[derive(Default)]
pub struct RecordingGateway {
    pub requests: Mutex<Vec<NewPaymentIntent>>,
    pub failure: Option<VendorError>,
}

#[async_trait]
impl PaymentGateway for RecordingGateway {
    async fn create_payment_intent(
        &self,
        params: &NewPaymentIntent,
    ) -> Result<PaymentIntent, VendorError> {
        self.requests.lock().unwrap().push(params.clone());
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        let n = self.requests.lock().unwrap().len();
        Ok(PaymentIntent {
            id: format!("pi_test_{n}"),
            amount: params.amount,
            currency: params.currency.to_string(),
            client_secret: Some(format!("pi_test_{n}_secret_abc")),
            status: Some("requires_payment_method".into()),
        })
    }
}

/// Stores uploads in memory; `destroy` answers like Cloudinary does.
#[derive(Default)]
pub struct MemoryAssetStore {
    pub uploads: Mutex<Vec<UploadRequest>>,
    pub assets: Mutex<Vec<String>>,
    pub upload_failure: Option<VendorError>,
}

impl MemoryAssetStore {
    pub fn with_asset(public_id: &str) -> Self {
        let store = Self::default();
        store.assets.lock().unwrap().push(public_id.to_string());
        store
    }
}

#[async_trait]
impl AssetStore for MemoryAssetStore {
    async fn upload(&self, request: &UploadRequest) -> Result<UploadedAsset, VendorError> {
        if let Some(err) = &self.upload_failure {
            return Err(err.clone());
        }
        let mut uploads = self.uploads.lock().unwrap();
        uploads.push(request.clone());
        let public_id = format!("tree_nfts/asset_{}", uploads.len());
        self.assets.lock().unwrap().push(public_id.clone());
        Ok(UploadedAsset {
            url: format!(
                "https://res.cloudinary.com/demo/{}/upload/{public_id}",
                request.resource_type.as_str()
            ),
            public_id,
        })
    }

    async fn destroy(
        &self,
        public_id: &str,
        _resource_type: ResourceType,
    ) -> Result<String, VendorError> {
        let mut assets = self.assets.lock().unwrap();
        match assets.iter().position(|id| id == public_id) {
            Some(idx) => {
                assets.remove(idx);
                Ok("ok".to_string())
            }
            None => Ok("not found".to_string()),
        }
    }
}
