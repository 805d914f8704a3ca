//! Model backends for Candle-based inference

use agrovision_core::{Error, Result};
use candle_core::{DType, Device, Tensor};

#[cfg(feature = "onnx")]
use candle_onnx::onnx::ModelProto;
#[cfg(feature = "onnx")]
use std::collections::{HashMap, HashSet};
#[cfg(feature = "onnx")]
use std::path::Path;

/// A loaded classifier that can run one forward pass.
///
/// Implementations are shared read-only across requests, so `forward` must
/// be safe to call concurrently through `&self`.
pub trait ModelBackend: Send + Sync {
    /// Model name, usually the artifact file stem
    fn name(&self) -> &str;

    /// Width of the final layer, when the artifact declares it
    fn output_dim(&self) -> Option<usize>;

    /// Device input tensors should be placed on
    fn device(&self) -> &Device;

    /// Run the model on a batch. `Ok(None)` means the model produced no output.
    fn forward(&self, input: &Tensor) -> Result<Option<Tensor>>;
}

/// Device type for inference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceType {
    /// CPU inference (always available)
    Cpu,
    /// CUDA GPU inference (if available)
    Cuda(usize),
    /// Metal (Apple Silicon)
    Metal(usize),
}

/// Create Candle device from device type
pub fn create_device(device_type: DeviceType) -> Result<Device> {
    match device_type {
        DeviceType::Cpu => Ok(Device::Cpu),
        DeviceType::Cuda(idx) => Device::new_cuda(idx)
            .map_err(|e| Error::model_load(format!("Failed to create CUDA device: {}", e))),
        DeviceType::Metal(idx) => Device::new_metal(idx)
            .map_err(|e| Error::model_load(format!("Failed to create Metal device: {}", e))),
    }
}

/// Determine the output width by running the model once on a zero batch.
///
/// Used for artifacts whose graph leaves the class dimension symbolic.
pub fn probe_output_dim(backend: &dyn ModelBackend, input_shape: &[usize]) -> Result<usize> {
    let zeros = Tensor::zeros(input_shape, DType::F32, backend.device())
        .map_err(|e| Error::model_load(format!("Failed to build probe input: {}", e)))?;

    let output = backend
        .forward(&zeros)?
        .ok_or_else(|| Error::model_load("Probe forward pass produced no output"))?;

    match output.dims().last() {
        Some(&dim) if dim > 0 => Ok(dim),
        _ => Err(Error::model_load(format!(
            "Probe output has unusable shape {:?}",
            output.dims()
        ))),
    }
}

/// ONNX graph evaluated with `candle-onnx`.
///
/// `simple_eval` only reads the immutable `ModelProto`, so one instance can
/// serve concurrent requests without a lock.
#[cfg(feature = "onnx")]
pub struct OnnxBackend {
    name: String,
    model: ModelProto,
    input_name: String,
    output_name: String,
    output_dim: Option<usize>,
    device: Device,
}

#[cfg(feature = "onnx")]
impl OnnxBackend {
    /// Load an ONNX model file
    pub fn load(path: &Path, device: DeviceType) -> Result<Self> {
        let model = candle_onnx::read_file(path).map_err(|e| {
            Error::model_load(format!("Failed to read ONNX model {}: {}", path.display(), e))
        })?;

        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown")
            .to_string();

        Self::from_proto(name, model, device)
    }

    /// Build a backend from an already decoded model
    pub fn from_proto(name: impl Into<String>, model: ModelProto, device: DeviceType) -> Result<Self> {
        let device = create_device(device)?;

        let graph = model
            .graph
            .as_ref()
            .ok_or_else(|| Error::model_load("ONNX model has no graph"))?;

        // Weights may also be listed as graph inputs; the image input is the one without an initializer.
        let initializers: HashSet<&str> = graph.initializer.iter().map(|t| t.name.as_str()).collect();
        let input_name = graph
            .input
            .iter()
            .map(|i| i.name.as_str())
            .find(|name| !initializers.contains(name))
            .ok_or_else(|| Error::model_load("ONNX graph declares no data input"))?
            .to_string();

        let output = graph
            .output
            .first()
            .ok_or_else(|| Error::model_load("ONNX graph declares no output"))?;
        let output_name = output.name.clone();
        let output_dim = declared_last_dim(output);

        Ok(Self {
            name: name.into(),
            model,
            input_name,
            output_name,
            output_dim,
            device,
        })
    }

    /// Override the output width (after probing a symbolic graph)
    pub fn with_output_dim(mut self, dim: usize) -> Self {
        self.output_dim = Some(dim);
        self
    }

    /// Name of the graph input fed with the image batch
    pub fn input_name(&self) -> &str {
        &self.input_name
    }
}

#[cfg(feature = "onnx")]
impl ModelBackend for OnnxBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn output_dim(&self) -> Option<usize> {
        self.output_dim
    }

    fn device(&self) -> &Device {
        &self.device
    }

    fn forward(&self, input: &Tensor) -> Result<Option<Tensor>> {
        let input = input
            .to_device(&self.device)
            .map_err(|e| Error::inference(format!("Failed to move input to device: {}", e)))?;

        let mut inputs = HashMap::new();
        inputs.insert(self.input_name.clone(), input);

        let mut outputs = candle_onnx::simple_eval(&self.model, inputs)
            .map_err(|e| Error::inference(format!("Model forward pass failed: {}", e)))?;

        Ok(outputs.remove(&self.output_name))
    }
}

/// Last dimension of a graph value, if it is a concrete positive size
#[cfg(feature = "onnx")]
fn declared_last_dim(info: &candle_onnx::onnx::ValueInfoProto) -> Option<usize> {
    use candle_onnx::onnx::tensor_shape_proto::dimension;
    use candle_onnx::onnx::type_proto;

    let tensor = match info.r#type.as_ref()?.value.as_ref()? {
        type_proto::Value::TensorType(tensor) => tensor,
        _ => return None,
    };

    match tensor.shape.as_ref()?.dim.last()?.value.as_ref()? {
        dimension::Value::DimValue(v) if *v > 0 => Some(*v as usize),
        _ => None,
    }
}
