//! ONNX inference using tract
//!
//! Runs the exported price regression artifact. The artifact takes four
//! named `[1, 1]` inputs (brand, mileage, year, fuel type) and returns a
//! single price. Graphs built only from standard operators are optimized
//! into a tract plan; scikit-learn exports that use the `ai.onnx.ml`
//! domain run on the [`MlGraph`] interpreter.

use super::graph::{uses_ml_domain, MlGraph};
use super::{InferenceStats, Predictor};
use crate::models::CarFeatures;
use anyhow::{Context, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tract_onnx::pb::ModelProto;
use tract_onnx::prelude::*;
use tracing::{debug, warn};

/// Maximum inference latency before warning (5ms target)
const MAX_INFERENCE_MS: u128 = 5;

/// Number of inputs the artifact is fed
const INPUT_COUNT: usize = 4;

type TractModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

enum Backend {
    Plan(TractModel),
    Graph(MlGraph),
}

/// ONNX-based price predictor using tract for lightweight inference
pub struct OnnxPredictor {
    backend: Backend,
    inference_count: AtomicU64,
    slow_inference_count: AtomicU64,
}

impl OnnxPredictor {
    /// Create a new predictor from model bytes
    pub fn new(model_bytes: &[u8]) -> Result<Self> {
        let proto = tract_onnx::onnx()
            .proto_model_for_read(&mut std::io::Cursor::new(model_bytes))
            .context("Failed to parse ONNX model")?;

        let graph = proto.graph.as_ref().context("ONNX model has no graph")?;
        let backend = if uses_ml_domain(graph) {
            let graph = MlGraph::parse(graph).context("Failed to load ONNX-ML graph")?;
            anyhow::ensure!(
                graph.input_names().len() == INPUT_COUNT,
                "Model takes {} inputs, expected {}",
                graph.input_names().len(),
                INPUT_COUNT
            );
            debug!(inputs = ?graph.input_names(), "Loaded ONNX-ML graph");
            Backend::Graph(graph)
        } else {
            Backend::Plan(Self::load_plan(&proto)?)
        };

        Ok(Self {
            backend,
            inference_count: AtomicU64::new(0),
            slow_inference_count: AtomicU64::new(0),
        })
    }

    /// Build and optimize a tract plan from a decoded model
    fn load_plan(proto: &ModelProto) -> Result<TractModel> {
        let model = tract_onnx::onnx()
            .model_for_proto_model(proto)
            .context("Failed to build ONNX model")?
            .with_input_fact(0, String::fact([1, 1]).into())
            .context("Failed to set brand input shape")?
            .with_input_fact(1, f32::fact([1, 1]).into())
            .context("Failed to set mileage input shape")?
            .with_input_fact(2, f32::fact([1, 1]).into())
            .context("Failed to set year input shape")?
            .with_input_fact(3, String::fact([1, 1]).into())
            .context("Failed to set fuel_type input shape")?
            .into_optimized()
            .context("Failed to optimize model")?
            .into_runnable()
            .context("Failed to create runnable model")?;
        Ok(model)
    }

    /// Convert features to the four single-row input tensors
    fn features_to_inputs(features: &CarFeatures) -> Vec<Tensor> {
        vec![
            tract_ndarray::arr2(&[[features.brand.clone()]]).into(),
            tract_ndarray::arr2(&[[features.mileage as f32]]).into(),
            tract_ndarray::arr2(&[[features.year as f32]]).into(),
            tract_ndarray::arr2(&[[features.fuel_type.clone()]]).into(),
        ]
    }

    /// Run the backend and return its first output
    fn run(&self, features: &CarFeatures) -> Result<Tensor> {
        let inputs = Self::features_to_inputs(features);
        match &self.backend {
            Backend::Plan(plan) => {
                let inputs: TVec<TValue> = inputs.into_iter().map(TValue::from).collect();
                let outputs = plan.run(inputs)?;
                let output = outputs.first().context("No output from model")?;
                Ok(Tensor::clone(output))
            }
            Backend::Graph(graph) => graph
                .run(inputs)?
                .into_iter()
                .next()
                .context("No output from model"),
        }
    }

    /// Extract the single scalar price from the model output
    fn output_to_price(output: &Tensor) -> Result<f64> {
        let output = output
            .cast_to::<f64>()
            .context("Model output is not numeric")?;
        let view = output.to_array_view::<f64>()?;

        if view.len() != 1 {
            anyhow::bail!("Model output has {} values, expected 1", view.len());
        }

        view.iter()
            .next()
            .copied()
            .context("Model output is empty")
    }
}

impl Predictor for OnnxPredictor {
    fn predict(&self, features: &CarFeatures) -> Result<f64> {
        let start = Instant::now();

        let output = self.run(features)?;

        let elapsed = start.elapsed();
        self.inference_count.fetch_add(1, Ordering::Relaxed);

        if elapsed.as_millis() > MAX_INFERENCE_MS {
            self.slow_inference_count.fetch_add(1, Ordering::Relaxed);
            warn!(elapsed_ms = elapsed.as_millis(), "Inference exceeded {}ms target", MAX_INFERENCE_MS);
        } else {
            debug!(elapsed_us = elapsed.as_micros(), "Inference completed");
        }

        Self::output_to_price(&output)
    }

    fn stats(&self) -> InferenceStats {
        InferenceStats {
            total_inferences: self.inference_count.load(Ordering::Relaxed),
            slow_inferences: self.slow_inference_count.load(Ordering::Relaxed),
        }
    }
}
