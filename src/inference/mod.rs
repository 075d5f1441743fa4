//! # Inference Module
//!
//! The model side of the pipeline: feature scaling, the classifier itself
//! (real or stub), raw-output decoding, and the `PredictionService` facade
//! that ties the whole pipeline together.

pub mod decoder;
pub mod model;
pub mod scaler;
pub mod service;

pub use decoder::PredictionResult;
pub use model::EmotionModel;
pub use scaler::Scaler;
pub use service::PredictionService;
