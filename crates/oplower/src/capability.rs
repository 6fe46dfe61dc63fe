use std::collections::BTreeSet;

use crate::error::LoweringResult;
use crate::fusion::FusionDetector;
use crate::graph::{GraphAccessor, NodeIndex, DEQUANTIZE_LINEAR};
use crate::op_builder::{OpBuilderInputParams, OpBuilderRegistry};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupportDiagnostic {
    pub node: NodeIndex,
    pub op_type: String,
    pub reason: String,
}

impl SupportDiagnostic {
    pub fn new(node: NodeIndex, op_type: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            node,
            op_type: op_type.into(),
            reason: reason.into(),
        }
    }
}

/// Per-node verdict for a graph against one registry.
#[derive(Debug, Clone, Default)]
pub struct SupportReport {
    pub supported: BTreeSet<NodeIndex>,
    /// Dequantize/quantize pairs that lower as a single convert.
    pub fused_pairs: Vec<(NodeIndex, NodeIndex)>,
    pub diagnostics: Vec<SupportDiagnostic>,
}

impl SupportReport {
    pub fn is_fully_supported(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn is_supported(&self, node: NodeIndex) -> bool {
        self.supported.contains(&node)
    }
}

/// Decides, without emitting anything, which nodes the backend can take.
pub fn check_graph_support(
    registry: &OpBuilderRegistry,
    graph: &dyn GraphAccessor,
    params: &OpBuilderInputParams<'_>,
) -> LoweringResult<SupportReport> {
    let detector = FusionDetector::new();
    let mut report = SupportReport::default();
    let mut fused_quantize = BTreeSet::new();

    for index in graph.node_indices() {
        if fused_quantize.contains(&index) {
            continue;
        }
        let Some(node) = graph.node(index) else {
            continue;
        };

        if node.op_type == DEQUANTIZE_LINEAR {
            if let Some(unit) = graph.node_unit(index) {
                if let Some(plan) = detector.plan(graph, unit)? {
                    report.supported.insert(index);
                    report.supported.insert(plan.q_unit.target);
                    report.fused_pairs.push((index, plan.q_unit.target));
                    fused_quantize.insert(plan.q_unit.target);
                    continue;
                }
            }
        }

        match registry.lookup(&node.op_type) {
            None => report.diagnostics.push(SupportDiagnostic::new(
                index,
                &node.op_type,
                format!("no builder registered for {}", node.op_type),
            )),
            Some(builder) if !builder.is_supported(node, params) => {
                report.diagnostics.push(SupportDiagnostic::new(
                    index,
                    &node.op_type,
                    format!("{} node '{}' rejected by its builder", node.op_type, node.name),
                ))
            }
            Some(_) => {
                report.supported.insert(index);
            }
        }
    }

    tracing::debug!(
        supported = report.supported.len(),
        fused = report.fused_pairs.len(),
        rejected = report.diagnostics.len(),
        "graph support check finished"
    );
    Ok(report)
}
