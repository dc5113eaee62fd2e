use std::{fmt::Write, path::Path};

use anyhow::{Context, Result};
use log::{debug, warn};
use tract_onnx::prelude::*;

type RunnableModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// A loaded, runnable ONNX graph.
///
/// Loading first tries the fully optimized graph and falls back to the decluttered one, which
/// is slower but accepts a few operator patterns the optimizer rejects.
pub(crate) struct OnnxModel {
    runnable: RunnableModel,
    name: &'static str,
}

impl std::fmt::Debug for OnnxModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxModel").field("name", &self.name).finish()
    }
}

impl OnnxModel {
    /// Load `path`. When `input_shape` is given it pins the first input to that `f32` shape,
    /// otherwise the shape declared in the file is used.
    pub(crate) fn load(
        path: &Path,
        name: &'static str,
        input_shape: Option<[usize; 4]>,
    ) -> Result<Self> {
        anyhow::ensure!(path.exists(), "model file not found: {}", path.display());

        let runnable = match load_runnable_model(path, name, input_shape, true) {
            Ok(model) => {
                debug!("{name} model {} optimized successfully", path.display());
                model
            }
            Err(opt_err) => {
                let optimize_msg = format!("{opt_err}");
                let mut chain_msg = String::new();
                for cause in opt_err.chain() {
                    let _ = writeln!(&mut chain_msg, "  - {cause}");
                }
                warn!(
                    "{name} model {} failed optimized load ({}); falling back to decluttered graph.\nError chain:\n{}",
                    path.display(),
                    optimize_msg,
                    chain_msg.trim_end()
                );
                load_runnable_model(path, name, input_shape, false).with_context(|| {
                    format!(
                        "fallback to decluttered {name} graph failed after optimize error: {optimize_msg}"
                    )
                })?
            }
        };

        Ok(Self { runnable, name })
    }

    /// Run the graph on one input tensor and return every output.
    pub(crate) fn run(&self, input: Tensor) -> Result<Vec<Tensor>> {
        let outputs = self
            .runnable
            .run(tvec![input.into()])
            .map_err(|e| anyhow::anyhow!("{} execution failed: {e}", self.name))?;
        let tensors: Vec<Tensor> = outputs
            .into_iter()
            .map(|value| value.into_tensor())
            .collect();
        anyhow::ensure!(!tensors.is_empty(), "{} model produced no outputs", self.name);
        Ok(tensors)
    }
}

fn load_runnable_model(
    path: &Path,
    name: &str,
    input_shape: Option<[usize; 4]>,
    optimized: bool,
) -> Result<RunnableModel> {
    let mut model = tract_onnx::onnx()
        .model_for_path(path)
        .with_context(|| format!("failed to parse ONNX graph from {}", path.display()))?;

    if let Some(shape) = input_shape {
        model = model
            .with_input_fact(0, f32::fact(shape).into())
            .map_err(|e| anyhow::anyhow!("unable to set {name} input shape {shape:?}: {e}"))?;
    }

    if optimized {
        model
            .into_optimized()
            .map_err(|e| anyhow::anyhow!("unable to optimize {name} graph: {e}"))?
            .into_runnable()
            .map_err(|e| anyhow::anyhow!("unable to make {name} graph runnable: {e}"))
    } else {
        model
            .into_typed()
            .map_err(|e| anyhow::anyhow!("unable to type-check {name} graph: {e}"))?
            .into_decluttered()
            .map_err(|e| anyhow::anyhow!("unable to declutter {name} graph: {e}"))?
            .into_runnable()
            .map_err(|e| anyhow::anyhow!("unable to make {name} graph runnable: {e}"))
    }
}
