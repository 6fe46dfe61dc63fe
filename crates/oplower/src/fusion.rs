//! Dequantize → quantize collapsing.
//!
//! A `DequantizeLinear` whose only consumer is a `QuantizeLinear` targeting a
//! different quantized type is a requantization. The pair is emitted as one
//! `convert` primitive and the caller skips the quantize unit.

use crate::error::{LoweringError, LoweringResult};
use crate::graph::{
    GraphAccessor, Node, NodeUnit, NodeUnitKind, DEQUANTIZE_LINEAR, QUANTIZE_LINEAR,
};
use crate::model::{
    BuilderContext, ConvertParams, Layer, LayerParams, NamedValueType, Operation,
};
use crate::op_builder::quantization_params;
use crate::tensor::Scalar;

pub const CONVERT_OP_TYPE: &str = "convert";

/// Outcome of a successful detector run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvertFusion<'g> {
    /// The pair was emitted as a convert; the caller must not lower this
    /// quantize unit again.
    Merged(&'g NodeUnit),
    NotApplicable,
}

/// A matched DQ → Q pair ready to be emitted.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertPlan<'g> {
    pub dq_node: &'g Node,
    pub q_node: &'g Node,
    pub q_unit: &'g NodeUnit,
    pub params: ConvertParams,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FusionDetector;

impl FusionDetector {
    pub fn new() -> Self {
        Self
    }

    /// Matches the pattern without emitting anything.
    ///
    /// `Ok(None)` is the ordinary "does not apply" answer; `Err` means the
    /// graph's indices disagree with its nodes.
    pub fn plan<'g>(
        &self,
        graph: &'g dyn GraphAccessor,
        anchor: &NodeUnit,
    ) -> LoweringResult<Option<ConvertPlan<'g>>> {
        let dq_node = graph.node(anchor.target).ok_or_else(|| {
            LoweringError::graph_invariant(format!(
                "node unit targets missing node {}",
                anchor.target
            ))
        })?;
        if anchor.kind != NodeUnitKind::SingleNode || dq_node.op_type != DEQUANTIZE_LINEAR {
            return Ok(None);
        }
        let (Some(dq_input), Some(dq_output)) = (dq_node.input(0), dq_node.output(0)) else {
            return Ok(None);
        };
        if graph.is_graph_output(dq_output) {
            return Ok(None);
        }

        let consumers = graph.consumers(dq_output);
        let [consumer] = consumers.as_slice() else {
            return Ok(None);
        };
        let q_node = graph.node(*consumer).ok_or_else(|| {
            LoweringError::graph_invariant(format!(
                "consumer index for '{dq_output}' references missing node {consumer}"
            ))
        })?;
        if q_node.op_type != QUANTIZE_LINEAR {
            return Ok(None);
        }
        let q_unit = graph.node_unit(*consumer).ok_or_else(|| {
            LoweringError::graph_invariant(format!("node '{}' has no node unit", q_node.name))
        })?;
        if q_unit.kind != NodeUnitKind::SingleNode {
            return Ok(None);
        }
        let Some(q_output) = q_node.output(0) else {
            return Ok(None);
        };

        let input_dtype = graph
            .tensor(dq_input)
            .ok_or_else(|| LoweringError::MissingTensor(dq_input.to_string()))?
            .dtype;
        let output_dtype = graph
            .tensor(q_output)
            .ok_or_else(|| LoweringError::MissingTensor(q_output.to_string()))?
            .dtype;
        if input_dtype == output_dtype {
            return Ok(None);
        }

        let (Some(input), Some(output)) = (
            quantization_params(graph, dq_node),
            quantization_params(graph, q_node),
        ) else {
            return Ok(None);
        };

        Ok(Some(ConvertPlan {
            dq_node,
            q_node,
            q_unit,
            params: ConvertParams { input, output },
        }))
    }

    /// Matches and, on success, appends one convert primitive to the active sink.
    pub fn try_merge<'g>(
        &self,
        graph: &'g dyn GraphAccessor,
        ctx: &mut dyn BuilderContext,
        anchor: &NodeUnit,
    ) -> LoweringResult<ConvertFusion<'g>> {
        let Some(plan) = self.plan(graph, anchor)? else {
            return Ok(ConvertFusion::NotApplicable);
        };
        tracing::debug!(
            dq = %plan.dq_node.name,
            q = %plan.q_node.name,
            from = %plan.params.input.dtype,
            to = %plan.params.output.dtype,
            "merging dequantize/quantize pair into convert"
        );
        emit_convert(graph, ctx, &plan)?;
        Ok(ConvertFusion::Merged(plan.q_unit))
    }
}

fn emit_convert(
    graph: &dyn GraphAccessor,
    ctx: &mut dyn BuilderContext,
    plan: &ConvertPlan<'_>,
) -> LoweringResult<()> {
    let missing = |node: &Node| {
        LoweringError::invalid_node(&node.name, &node.op_type, "matched node lost its data edge")
    };
    let input = plan.dq_node.input(0).ok_or_else(|| missing(plan.dq_node))?;
    let output = plan.q_node.output(0).ok_or_else(|| missing(plan.q_node))?;
    let (dq, q) = (plan.dq_node.label(), plan.q_node.label());
    let name = ctx.unique_name(&format!("{dq}_{q}_{CONVERT_OP_TYPE}"));
    let ConvertParams {
        input: in_q,
        output: out_q,
    } = plan.params;

    if ctx.is_program() {
        let output = graph
            .tensor(output)
            .ok_or_else(|| LoweringError::MissingTensor(output.to_string()))?;
        let mut op = Operation::new(name, CONVERT_OP_TYPE);
        op.add_input("x", input);
        ctx.add_constant_input(&mut op, "input_scale", Scalar::F32(in_q.scale));
        ctx.add_constant_input(
            &mut op,
            "input_zero_point",
            Scalar::Int {
                value: in_q.zero_point,
                dtype: in_q.dtype,
            },
        );
        ctx.add_constant_input(&mut op, "output_scale", Scalar::F32(out_q.scale));
        ctx.add_constant_input(
            &mut op,
            "output_zero_point",
            Scalar::Int {
                value: out_q.zero_point,
                dtype: out_q.dtype,
            },
        );
        op.add_output(NamedValueType::from(output));
        ctx.add_operation(op);
    } else {
        for node in [plan.dq_node, plan.q_node] {
            for idx in [1, 2] {
                if let Some(name) = node.input(idx) {
                    ctx.add_initializer_to_skip(name);
                }
            }
        }
        let layer = Layer::new(name, LayerParams::Convert(plan.params))
            .with_input(input)
            .with_output(output);
        ctx.add_layer(layer);
    }
    Ok(())
}
