//! ONNX backend for the mudra classifier, run with tract.

use std::path::Path;

use anyhow::{anyhow, Context};
use ndarray::Array4;
use tract_onnx::prelude::*;

use crate::classifier::{input_shape, Classifier};
use crate::config::InputLayout;

type OnnxPlan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// A classifier artifact loaded once and run read-only from every worker.
pub struct OnnxClassifier {
    plan: OnnxPlan,
}

impl OnnxClassifier {
    pub fn load(path: impl AsRef<Path>, layout: InputLayout) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let shape = input_shape(layout);

        let plan = tract_onnx::onnx()
            .model_for_path(path)
            .with_context(|| format!("failed to load ONNX model {}", path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(shape[0], shape[1], shape[2], shape[3]),
                ),
            )?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to make ONNX model runnable")?;

        Ok(OnnxClassifier { plan })
    }
}

impl Classifier for OnnxClassifier {
    fn forward(&self, batch: &Array4<f32>) -> anyhow::Result<Vec<f32>> {
        let data = batch
            .as_slice()
            .ok_or_else(|| anyhow!("input batch is not contiguous"))?;
        let input = Tensor::from_shape(batch.shape(), data)?;

        let outputs = self.plan.run(tvec!(input.into()))?;
        let scores = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no output"))?
            .to_array_view::<f32>()?
            .iter()
            .copied()
            .collect();

        Ok(scores)
    }
}

impl std::fmt::Debug for OnnxClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxClassifier").finish_non_exhaustive()
    }
}
