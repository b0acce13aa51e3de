//! Model loading and inference.
//!
//! A `TractClassifier` is built once at startup from an ONNX file and shared
//! read-only across workers. Whether the model rescales pixels to [0, 1] on
//! its own is settled here, either by an explicit manifest declaration or by
//! inspecting the graph's layers.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context};
use ndarray::{Array4, ArrayD, Axis};
use serde::Deserialize;
use tract_onnx::prelude::*;

use crate::error::PredictError;
use crate::preprocess::DEFAULT_INPUT_SIZE;

/// An opaque predictor over `[1, H, W, 3]` batches.
pub trait Classifier: Send + Sync {
    /// Target `(width, height)` uploads are resized to.
    fn input_size(&self) -> (u32, u32);

    /// True when the model maps [0, 255] input to [0, 1] internally.
    fn rescales_input(&self) -> bool;

    /// Width of the final output dimension, if the model declares it.
    fn output_width(&self) -> Option<usize>;

    fn predict(&self, batch: Array4<f32>) -> anyhow::Result<ArrayD<f32>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    #[default]
    Nhwc,
    Nchw,
}

/// Optional JSON sidecar declaring how a model expects its input.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelManifest {
    pub input_size: (u32, u32),
    pub layout: Layout,
    pub rescales_input: Option<bool>,
}

impl Default for ModelManifest {
    fn default() -> Self {
        ModelManifest {
            input_size: DEFAULT_INPUT_SIZE,
            layout: Layout::default(),
            rescales_input: None,
        }
    }
}

impl ModelManifest {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read model manifest {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Invalid model manifest {}", path.display()))
    }

    /// Uses `explicit` when given, else `<model>.json` next to the model if it
    /// exists, else the defaults.
    pub fn resolve(explicit: Option<&Path>, model_path: &Path) -> anyhow::Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        let sidecar = model_path.with_extension("json");
        if sidecar.is_file() {
            log::info!("Using model manifest {}", sidecar.display());
            Self::load(&sidecar)
        } else {
            Ok(Self::default())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerDescriptor {
    pub name: String,
    pub op: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    Rescaling,
    Other,
}

impl LayerDescriptor {
    pub fn new(name: impl Into<String>, op: impl Into<String>) -> Self {
        LayerDescriptor {
            name: name.into(),
            op: op.into(),
        }
    }

    /// Exported Keras graphs keep the layer name inside the node path, e.g.
    /// `sequential/rescaling_1/mul`. tract flattens the `/` separators to `_`
    /// on import, so the name is tokenized on both.
    pub fn kind(&self) -> LayerKind {
        let name = self.name.to_ascii_lowercase();
        let is_rescaling = name
            .split(|c: char| matches!(c, '/' | ':' | '.' | '_'))
            .any(|token| token == "rescaling");
        if is_rescaling {
            LayerKind::Rescaling
        } else {
            LayerKind::Other
        }
    }
}

pub fn contains_rescaling(layers: &[LayerDescriptor]) -> bool {
    layers
        .iter()
        .any(|layer| layer.kind() == LayerKind::Rescaling)
}

pub struct TractClassifier {
    plan: TypedRunnableModel<TypedModel>,
    input_size: (u32, u32),
    layout: Layout,
    rescales_input: bool,
    output_width: Option<usize>,
}

impl TractClassifier {
    pub fn load(path: &Path, manifest: ModelManifest) -> anyhow::Result<Self> {
        if !path.is_file() {
            bail!("Model file not found at {}", path.display());
        }

        log::info!("Loading model from {}", path.display());
        let model = tract_onnx::onnx()
            .model_for_path(path)
            .with_context(|| format!("Failed to load model at {}", path.display()))?;

        let layers: Vec<LayerDescriptor> = model
            .nodes()
            .iter()
            .map(|node| LayerDescriptor::new(node.name.clone(), node.op.name()))
            .collect();
        for layer in &layers {
            log::debug!("layer {} ({})", layer.name, layer.op);
        }

        let rescales_input = match manifest.rescales_input {
            Some(declared) => declared,
            None => contains_rescaling(&layers),
        };
        if rescales_input {
            log::info!("Model rescales its input; uploads are passed through in [0, 255]");
        } else {
            log::info!("No rescaling layer in model; uploads are divided by 255.0");
        }

        let (width, height) = manifest.input_size;
        let (width, height) = (width as usize, height as usize);
        let shape = match manifest.layout {
            Layout::Nhwc => tvec!(1, height, width, 3),
            Layout::Nchw => tvec!(1, 3, height, width),
        };

        // Exports declare a symbolic batch on the output too; let tract infer
        // it from the concrete input instead of unifying it with 1.
        let model = model
            .with_input_fact(0, InferenceFact::dt_shape(f32::datum_type(), shape))?
            .with_output_fact(0, InferenceFact::default())?
            .into_optimized()
            .context("Failed to optimize model")?;

        let output_width = model
            .output_fact(0)
            .ok()
            .and_then(|fact| fact.shape.as_concrete().and_then(|dims| dims.last().copied()));
        match output_width {
            Some(n) => log::info!("Model outputs {} classes", n),
            None => log::warn!("Model output width is not fixed; numeric labels default to 1"),
        }

        let plan = model
            .into_runnable()
            .context("Failed to make model runnable")?;

        Ok(TractClassifier {
            plan,
            input_size: manifest.input_size,
            layout: manifest.layout,
            rescales_input,
            output_width,
        })
    }
}

impl Classifier for TractClassifier {
    fn input_size(&self) -> (u32, u32) {
        self.input_size
    }

    fn rescales_input(&self) -> bool {
        self.rescales_input
    }

    fn output_width(&self) -> Option<usize> {
        self.output_width
    }

    fn predict(&self, batch: Array4<f32>) -> anyhow::Result<ArrayD<f32>> {
        let batch = match self.layout {
            Layout::Nhwc => batch,
            Layout::Nchw => batch
                .permuted_axes([0, 3, 1, 2])
                .as_standard_layout()
                .into_owned(),
        };

        let result = self.plan.run(tvec!(batch.into_tensor().into()))?;
        let output = result.first().context("model produced no outputs")?;
        Ok(output.to_array_view::<f32>()?.to_owned())
    }
}

/// The single row of a `[1, N]` prediction.
pub fn first_row(output: &ArrayD<f32>) -> Result<Vec<f32>, PredictError> {
    if output.ndim() != 2 || output.shape()[0] == 0 {
        return Err(PredictError::OutputShape(format!(
            "expected a [batch, classes] output, got shape {:?}",
            output.shape()
        )));
    }
    Ok(output.index_axis(Axis(0), 0).iter().copied().collect())
}
