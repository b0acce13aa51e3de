use std::sync::Arc;

use actix_multipart::Multipart;
use actix_web::{web, HttpResponse, Result};
use uuid::Uuid;

use crate::classifier::{first_row, Classifier};
use crate::error::PredictError;
use crate::labels::LabelSource;
use crate::models::PredictionResponse;
use crate::preprocess;
use crate::upload;

const INDEX_HTML: &str = include_str!("../static/index.html");
const SCRIPT_JS: &str = include_str!("../static/script.js");

/// Process-wide state injected into every handler.
pub struct AppState {
    pub classifier: Arc<dyn Classifier>,
    pub labels: LabelSource,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(classifier: Arc<dyn Classifier>, labels: LabelSource, max_upload_bytes: usize) -> Self {
        AppState {
            classifier,
            labels,
            max_upload_bytes,
        }
    }

    /// Decode, preprocess, infer and format one upload.
    pub fn classify(&self, bytes: &[u8]) -> Result<PredictionResponse, PredictError> {
        let img = preprocess::decode(bytes)?;

        // Re-read on every request so edits to the class-names file apply live.
        let labels = self.labels.resolve(self.classifier.output_width());

        let scale = !self.classifier.rescales_input();
        let batch = preprocess::to_batch(&img, self.classifier.input_size(), scale)?;

        let output = self
            .classifier
            .predict(batch)
            .map_err(|e| PredictError::Inference(format!("{:#}", e)))?;
        let scores = first_row(&output)?;

        PredictionResponse::from_scores(&scores, &labels)
    }
}

pub async fn index() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(INDEX_HTML)
}

pub async fn script() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("application/javascript; charset=utf-8")
        .body(SCRIPT_JS)
}

pub async fn predict(
    state: web::Data<AppState>,
    payload: Multipart,
) -> Result<HttpResponse, PredictError> {
    let request_id = Uuid::new_v4();

    let upload = upload::read_upload(payload, state.max_upload_bytes)
        .await
        .map_err(|e| {
            log::warn!("[{}] rejected upload: {}", request_id, e);
            e
        })?;
    log::info!(
        "[{}] received {} ({} bytes)",
        request_id,
        upload.filename,
        upload.bytes.len()
    );

    let state = state.into_inner();
    let response = web::block(move || state.classify(&upload.bytes))
        .await
        .map_err(|e| PredictError::Inference(e.to_string()))?
        .map_err(|e| {
            log::warn!("[{}] {}: {}", request_id, e, e.detail().unwrap_or_default());
            e
        })?;

    log::info!(
        "[{}] predicted {} ({})",
        request_id,
        response.prediction,
        response.probability
    );
    Ok(HttpResponse::Ok().json(response))
}
