#![allow(dead_code)]

use anyhow::Context;
use half::f16;
use oplower::graph::{AttributeValue, GraphAccessor, ModelGraph, NodeIndex, NodeSpec, TensorInfo};
use oplower::model::{BuilderContext, LoweredModel, ModelBuilder, SinkKind};
use oplower::op_builder::OpBuilderRegistry;
use oplower::tensor::{DType, Shape, TensorData};

pub const INPUT: &str = "x";
pub const OUTPUT: &str = "y";
pub const CLIP_MIN: &str = "clip_min";
pub const CLIP_MAX: &str = "clip_max";

fn io_graph(dtype: DType, dims: &[usize]) -> ModelGraph {
    let mut graph = ModelGraph::new();
    graph.add_input(INPUT, dtype, Some(Shape::from_static(dims)));
    graph.set_tensor_info(TensorInfo::new(OUTPUT, dtype, Some(Shape::from_static(dims))));
    graph.mark_output(OUTPUT);
    graph
}

fn bound_data(value: f32, dtype: DType) -> TensorData {
    match dtype {
        DType::F16 => TensorData::F16(vec![f16::from_f32(value)]),
        _ => TensorData::F32(vec![value]),
    }
}

/// `Clip` at opset 13 with bounds supplied as constant scalar initializers.
pub fn clip_graph(min: Option<f32>, max: Option<f32>) -> ModelGraph {
    clip_graph_typed(DType::F32, min, max)
}

pub fn clip_graph_typed(dtype: DType, min: Option<f32>, max: Option<f32>) -> ModelGraph {
    let mut graph = io_graph(dtype, &[2, 3]);
    let mut inputs = vec![INPUT.to_string(), String::new(), String::new()];
    if let Some(min) = min {
        graph.add_initializer(CLIP_MIN, bound_data(min, dtype), &[]);
        inputs[1] = CLIP_MIN.to_string();
    }
    if let Some(max) = max {
        graph.add_initializer(CLIP_MAX, bound_data(max, dtype), &[]);
        inputs[2] = CLIP_MAX.to_string();
    }
    graph.add_node(NodeSpec::new("clip", "Clip", 13).inputs(inputs).outputs([OUTPUT]));
    graph
}

/// `Clip` at opset 6 with bounds carried as attributes.
pub fn clip_graph_v6(min: Option<f32>, max: Option<f32>) -> ModelGraph {
    let mut graph = io_graph(DType::F32, &[2, 3]);
    let mut spec = NodeSpec::new("clip", "Clip", 6).inputs([INPUT]).outputs([OUTPUT]);
    if let Some(min) = min {
        spec = spec.attr("min", AttributeValue::Float(min));
    }
    if let Some(max) = max {
        spec = spec.attr("max", AttributeValue::Float(max));
    }
    graph.add_node(spec);
    graph
}

pub fn unary_graph(op_type: &str, since_version: i64, dtype: DType) -> ModelGraph {
    let mut graph = io_graph(dtype, &[4]);
    graph.add_node(
        NodeSpec::new(op_type.to_ascii_lowercase(), op_type, since_version)
            .inputs([INPUT])
            .outputs([OUTPUT]),
    );
    graph
}

pub struct Requant {
    pub graph: ModelGraph,
    pub dq: NodeIndex,
    pub q: NodeIndex,
}

/// `xq:ui8 -> DequantizeLinear -> xf:f32 -> QuantizeLinear -> yq:<q_dtype>`.
pub fn requant_graph(q_dtype: DType) -> Requant {
    let mut graph = ModelGraph::new();
    graph.add_input("xq", DType::Ui8, Some(Shape::from_static(&[4])));
    graph.add_initializer("dq_scale", TensorData::F32(vec![0.5]), &[]);
    graph.add_initializer("dq_zp", TensorData::Ui8(vec![128]), &[]);
    graph.add_initializer("q_scale", TensorData::F32(vec![0.25]), &[]);
    let q_zp = match q_dtype {
        DType::Ui8 => TensorData::Ui8(vec![128]),
        _ => TensorData::Si8(vec![0]),
    };
    graph.add_initializer("q_zp", q_zp, &[]);
    graph.set_tensor_info(TensorInfo::new("xf", DType::F32, Some(Shape::from_static(&[4]))));
    graph.set_tensor_info(TensorInfo::new("yq", q_dtype, Some(Shape::from_static(&[4]))));
    graph.mark_output("yq");

    let dq = graph.add_node(
        NodeSpec::new("dq", "DequantizeLinear", 13)
            .inputs(["xq", "dq_scale", "dq_zp"])
            .outputs(["xf"]),
    );
    let q = graph.add_node(
        NodeSpec::new("q", "QuantizeLinear", 13)
            .inputs(["xf", "q_scale", "q_zp"])
            .outputs(["yq"]),
    );
    Requant { graph, dq, q }
}

/// Lowers one node through the default registry, mirroring a driver's
/// skip-then-lower sequence.
pub fn lower_node(
    graph: &ModelGraph,
    index: NodeIndex,
    sink: SinkKind,
) -> anyhow::Result<LoweredModel> {
    let registry = OpBuilderRegistry::with_default_builders();
    let node = graph.node(index).context("node index out of range")?;
    let builder = registry
        .lookup(&node.op_type)
        .with_context(|| format!("no builder for {}", node.op_type))?;
    let mut ctx = ModelBuilder::new(graph, sink);
    builder.initializers_to_skip(&mut ctx, node);
    builder.lower(&mut ctx, node)?;
    anyhow::ensure!(ctx.sink() == sink);
    Ok(ctx.finish())
}

/// Number of emitted primitives that write `tensor`.
pub fn writers_of(model: &LoweredModel, tensor: &str) -> usize {
    let layer_writers = model
        .layers
        .iter()
        .filter(|layer| layer.outputs.iter().any(|name| name == tensor))
        .count();
    let op_writers = model
        .operations
        .iter()
        .filter(|op| op.outputs.iter().any(|out| out.name == tensor))
        .count();
    layer_writers + op_writers
}
