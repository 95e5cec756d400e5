//! Invocation layer
//!
//! Turns a JSON event (`{"bucketname": .., "filename": ..}`) into a stage run
//! and always answers with a serializable [`InvocationResponse`]: either the
//! stage report or an [`ErrorResponse`]. Nothing here returns `Err`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info};

use crate::load::{BatchLoader, LoadReport};
use crate::sink::SinkConnector;
use crate::storage::{BlobLocation, BlobStore};
use crate::transform::{TransformReport, TransformStage};
use sales_etl_common::{EtlError, Result};

pub const MISSING_KEYS_MESSAGE: &str = "Missing bucketname or filename in request";

/// Source object named by an invocation event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationRequest {
    pub bucketname: String,
    pub filename: String,
}

impl InvocationRequest {
    pub fn new(bucketname: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            bucketname: bucketname.into(),
            filename: filename.into(),
        }
    }

    /// Read the request out of an arbitrary JSON event. Other keys are
    /// ignored; missing, empty or non-string values are rejected.
    pub fn from_event(event: &Value) -> Result<Self> {
        let field = |name: &str| {
            event
                .get(name)
                .and_then(Value::as_str)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };

        match (field("bucketname"), field("filename")) {
            (Some(bucketname), Some(filename)) => Ok(Self { bucketname, filename }),
            _ => Err(EtlError::InvalidRequest(MISSING_KEYS_MESSAGE.to_string())),
        }
    }

    pub fn location(&self) -> BlobLocation {
        BlobLocation::new(self.bucketname.clone(), self.filename.clone())
    }
}

/// Where a failed invocation stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Request,
    Transform,
    Load,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
    pub stage: Stage,
}

impl ErrorResponse {
    fn from_error(stage: Stage, err: &EtlError) -> Self {
        error!(?stage, kind = err.kind(), error = %err, "Invocation failed");
        Self {
            error: err.to_string(),
            stage,
        }
    }
}

/// Both reports of a transform-then-load run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineReport {
    pub transform: TransformReport,
    pub load: LoadReport,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum InvocationResponse {
    Transform(TransformReport),
    Load(LoadReport),
    Pipeline(PipelineReport),
    Error(ErrorResponse),
}

impl InvocationResponse {
    pub fn is_error(&self) -> bool {
        matches!(self, InvocationResponse::Error(_))
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|e| {
            serde_json::json!({ "error": e.to_string(), "stage": Stage::Request })
        })
    }
}

pub async fn handle_transform(store: &dyn BlobStore, event: &Value) -> InvocationResponse {
    let request = match InvocationRequest::from_event(event) {
        Ok(request) => request,
        Err(err) => return InvocationResponse::Error(ErrorResponse::from_error(Stage::Request, &err)),
    };

    info!(bucket = %request.bucketname, file = %request.filename, "Transform requested");

    match TransformStage::new(store).run(&request.location()).await {
        Ok(report) => InvocationResponse::Transform(report),
        Err(err) => InvocationResponse::Error(ErrorResponse::from_error(Stage::Transform, &err)),
    }
}

pub async fn handle_load(
    store: &dyn BlobStore,
    connector: &dyn SinkConnector,
    batch_size: usize,
    event: &Value,
) -> InvocationResponse {
    let request = match InvocationRequest::from_event(event) {
        Ok(request) => request,
        Err(err) => return InvocationResponse::Error(ErrorResponse::from_error(Stage::Request, &err)),
    };

    info!(bucket = %request.bucketname, file = %request.filename, "Load requested");

    match BatchLoader::new(store)
        .with_batch_size(batch_size)
        .run(&request.location(), connector)
        .await
    {
        Ok(report) => InvocationResponse::Load(report),
        Err(err) => InvocationResponse::Error(ErrorResponse::from_error(Stage::Load, &err)),
    }
}

/// Transform the named object, then load the cleaned file it produced.
pub async fn handle_pipeline(
    store: &dyn BlobStore,
    connector: &dyn SinkConnector,
    batch_size: usize,
    event: &Value,
) -> InvocationResponse {
    let request = match InvocationRequest::from_event(event) {
        Ok(request) => request,
        Err(err) => return InvocationResponse::Error(ErrorResponse::from_error(Stage::Request, &err)),
    };

    let source = request.location();

    let transform = match TransformStage::new(store).run(&source).await {
        Ok(report) => report,
        Err(err) => return InvocationResponse::Error(ErrorResponse::from_error(Stage::Transform, &err)),
    };

    let cleaned = source.with_key(transform.new_file.clone());
    match BatchLoader::new(store)
        .with_batch_size(batch_size)
        .run(&cleaned, connector)
        .await
    {
        Ok(load) => InvocationResponse::Pipeline(PipelineReport { transform, load }),
        Err(err) => InvocationResponse::Error(ErrorResponse::from_error(Stage::Load, &err)),
    }
}
