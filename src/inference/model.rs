//! # Emotion Classifier
//!
//! The model behind the prediction pipeline, as one interface with two
//! variants:
//!
//! - **Real**: an MLP loaded from a safetensors artifact via candle
//! - **Stub**: random normalized probabilities, used when the artifact is
//!   missing so the rest of the service stays exercisable
//!
//! Which variant is active is logged loudly at startup and reported by the
//! health endpoint; stub output must never be mistaken for a real prediction.

use anyhow::{Context, Result};
use candle_core::{Device, Tensor};
use candle_nn::{Linear, Module};
use rand::Rng;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

/// The classifier, real or stub.
pub enum EmotionModel {
    Real(MlpModel),
    Stub(StubModel),
}

impl EmotionModel {
    /// Load the safetensors artifact, or fall back to the stub.
    pub fn load_or_stub(path: &Path, num_classes: usize) -> Self {
        match MlpModel::load(path) {
            Ok(model) => {
                info!(
                    path = %path.display(),
                    input_dim = model.input_dim,
                    output_dim = model.output_dim,
                    layers = model.layers.len(),
                    "Loaded emotion model"
                );
                EmotionModel::Real(model)
            }
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "MODEL NOT LOADED - serving random stub predictions"
                );
                EmotionModel::Stub(StubModel::new(num_classes))
            }
        }
    }

    /// Score one input vector, returning the raw output rows (batch size 1).
    pub fn predict(&self, input: &[f32]) -> Result<Vec<Vec<f32>>> {
        match self {
            EmotionModel::Real(model) => model.predict(input),
            EmotionModel::Stub(model) => Ok(model.predict()),
        }
    }

    /// Declared input width, when the model has one. The stub has none.
    pub fn input_dim(&self) -> Option<usize> {
        match self {
            EmotionModel::Real(model) => Some(model.input_dim),
            EmotionModel::Stub(_) => None,
        }
    }

    pub fn is_stub(&self) -> bool {
        matches!(self, EmotionModel::Stub(_))
    }

    /// Variant name for the health endpoint.
    pub fn kind(&self) -> &'static str {
        match self {
            EmotionModel::Real(_) => "real",
            EmotionModel::Stub(_) => "stub",
        }
    }
}

/// Feed-forward classifier: ordered Linear layers with ReLU between them,
/// no activation after the last layer.
pub struct MlpModel {
    layers: Vec<Linear>,
    pub input_dim: usize,
    pub output_dim: usize,
    device: Device,
}

impl MlpModel {
    /// Load ordered `layers.N.weight` / `layers.N.bias` tensors from a
    /// safetensors file.
    pub fn load(path: &Path) -> Result<Self> {
        let device = Device::Cpu;
        let tensors = candle_core::safetensors::load(path, &device)
            .with_context(|| format!("Failed to load {}", path.display()))?;

        let mut indices: Vec<usize> = tensors
            .keys()
            .filter_map(|key| {
                key.strip_prefix("layers.")
                    .and_then(|rest| rest.strip_suffix(".weight"))
                    .and_then(|n| n.parse().ok())
            })
            .collect();
        indices.sort_unstable();

        if indices.is_empty() {
            anyhow::bail!("No layers.N.weight tensors found in artifact");
        }

        let mut layers = Vec::with_capacity(indices.len());
        for i in &indices {
            let weight = tensors
                .get(&format!("layers.{}.weight", i))
                .context("missing weight")?
                .clone();
            let bias = tensors.get(&format!("layers.{}.bias", i)).cloned();
            layers.push(Linear::new(weight, bias));
        }

        // Input width comes from the first weight matrix; output width from
        // the last. Weight shape is (out_features, in_features).
        let first_dims = layers
            .first()
            .unwrap()
            .weight()
            .dims2()
            .context("first layer weight is not 2-D")?;
        let last_dims = layers
            .last()
            .unwrap()
            .weight()
            .dims2()
            .context("last layer weight is not 2-D")?;

        Ok(Self {
            input_dim: first_dims.1,
            output_dim: last_dims.0,
            layers,
            device,
        })
    }

    fn predict(&self, input: &[f32]) -> Result<Vec<Vec<f32>>> {
        if input.len() != self.input_dim {
            anyhow::bail!(
                "Model expects {} inputs, got {}",
                self.input_dim,
                input.len()
            );
        }

        let mut x = Tensor::from_vec(input.to_vec(), (1, self.input_dim), &self.device)?;
        let last = self.layers.len() - 1;
        for (i, layer) in self.layers.iter().enumerate() {
            x = layer.forward(&x)?;
            if i < last {
                x = x.relu()?;
            }
        }

        Ok(x.to_vec2::<f32>()?)
    }
}

/// Produces uniformly random probabilities normalized to sum to one.
pub struct StubModel {
    num_classes: usize,
}

impl StubModel {
    pub fn new(num_classes: usize) -> Self {
        Self { num_classes }
    }

    fn predict(&self) -> Vec<Vec<f32>> {
        let mut rng = rand::thread_rng();
        let mut probs: Vec<f32> = (0..self.num_classes).map(|_| rng.gen::<f32>()).collect();
        let sum: f32 = probs.iter().sum();
        if sum > 0.0 {
            for p in &mut probs {
                *p /= sum;
            }
        }
        vec![probs]
    }
}

/// Distribution over labels, in label order. Used to shape stub and fallback
/// output consistently.
pub fn uniform_distribution(labels: &[String]) -> BTreeMap<String, f32> {
    let p = 1.0 / labels.len().max(1) as f32;
    labels.iter().map(|l| (l.clone(), p)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stub_output_is_normalized() {
        let stub = StubModel::new(6);
        let rows = stub.predict();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].len(), 6);
        let sum: f32 = rows[0].iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!(rows[0].iter().all(|&p| (0.0..=1.0).contains(&p)));
    }

    #[test]
    fn test_missing_artifact_falls_back_to_stub() {
        let model = EmotionModel::load_or_stub(Path::new("/nonexistent/model.safetensors"), 6);
        assert!(model.is_stub());
        assert_eq!(model.kind(), "stub");
        assert_eq!(model.input_dim(), None);

        let rows = model.predict(&[0.0; 58]).unwrap();
        assert_eq!(rows[0].len(), 6);
    }

    #[test]
    fn test_uniform_distribution() {
        let labels: Vec<String> = ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect();
        let dist = uniform_distribution(&labels);
        assert_eq!(dist.len(), 4);
        for p in dist.values() {
            assert!((p - 0.25).abs() < 1e-6);
        }
    }
}
