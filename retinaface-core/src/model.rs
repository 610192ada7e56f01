use std::{fmt, path::Path};

use anyhow::{Context, Result};
use log::{debug, warn};
use tract_onnx::prelude::{
    DatumExt, Framework, Graph, InferenceModelExt, IntoTensor, SimplePlan, Tensor, TypedFact,
    TypedOp, tvec,
};

type RunnableModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Anything that turns an input tensor into the network's raw outputs.
///
/// The detector only depends on this seam, so tests and alternative runtimes can stand in
/// for the ONNX graph.
pub trait InferenceBackend: Send + Sync + fmt::Debug {
    fn infer(&self, input: Tensor) -> Result<Vec<Tensor>>;
}

/// RetinaFace ONNX graph prepared for a fixed input shape.
#[derive(Debug)]
pub struct RetinaFaceModel {
    runnable: RunnableModel,
    input_shape: [usize; 4],
}

impl RetinaFaceModel {
    /// Load the ONNX graph with its input pinned to `input_shape`.
    ///
    /// Falls back to the decluttered (unoptimized) plan when optimization fails.
    pub fn load<P: AsRef<Path>>(model_path: P, input_shape: [usize; 4]) -> Result<Self> {
        let path = model_path.as_ref();
        anyhow::ensure!(path.exists(), "model file not found: {}", path.display());

        let runnable = match load_runnable_model(path, input_shape, Lowering::Optimized) {
            Ok(model) => model,
            Err(opt_err) => {
                warn!(
                    "RetinaFace model {} could not be optimized, using decluttered graph: {opt_err:#}",
                    path.display()
                );
                load_runnable_model(path, input_shape, Lowering::Decluttered)
                    .with_context(|| format!("optimized load failed first: {opt_err}"))?
            }
        };
        debug!(
            "RetinaFace model {} ready for input {:?}",
            path.display(),
            input_shape
        );

        Ok(Self {
            runnable,
            input_shape,
        })
    }

    pub fn input_shape(&self) -> [usize; 4] {
        self.input_shape
    }
}

impl InferenceBackend for RetinaFaceModel {
    fn infer(&self, input: Tensor) -> Result<Vec<Tensor>> {
        anyhow::ensure!(
            input.shape() == self.input_shape,
            "input tensor shape {:?} does not match model input {:?}",
            input.shape(),
            self.input_shape
        );
        let outputs = self
            .runnable
            .run(tvec![input.into()])
            .context("RetinaFace execution failed")?;

        Ok(outputs
            .into_iter()
            .map(|value| value.into_tensor())
            .collect())
    }
}

/// How far the typed graph is lowered before it is made runnable.
#[derive(Debug, Clone, Copy)]
enum Lowering {
    Optimized,
    Decluttered,
}

fn load_runnable_model(
    path: &Path,
    input_shape: [usize; 4],
    lowering: Lowering,
) -> Result<RunnableModel> {
    let model = tract_onnx::onnx()
        .model_for_path(path)
        .with_context(|| format!("failed to parse ONNX graph from {}", path.display()))?
        .with_input_fact(0, f32::fact(input_shape).into())
        .with_context(|| format!("unable to pin RetinaFace input to {input_shape:?}"))?;

    let typed = match lowering {
        Lowering::Optimized => model.into_optimized(),
        Lowering::Decluttered => model.into_typed().and_then(|typed| typed.into_decluttered()),
    }
    .with_context(|| format!("{lowering:?} lowering of the RetinaFace graph failed"))?;

    typed
        .into_runnable()
        .context("unable to make RetinaFace graph runnable")
}
