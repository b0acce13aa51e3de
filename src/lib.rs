pub mod classifier;
pub mod config;
pub mod error;
pub mod handlers;
pub mod labels;
pub mod models;
pub mod preprocess;
pub mod server;
pub mod upload;

pub use classifier::{Classifier, ModelManifest, TractClassifier};
pub use config::Config;
pub use error::PredictError;
pub use handlers::AppState;
pub use labels::LabelSource;
pub use models::{ErrorBody, PredictionResponse};
pub use server::configure;
