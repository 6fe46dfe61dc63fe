mod graph_fixtures;

use graph_fixtures::{clip_graph, requant_graph, Requant};
use oplower::capability::check_graph_support;
use oplower::graph::{NodeSpec, TensorInfo};
use oplower::model::SinkKind;
use oplower::op_builder::OpBuilderRegistry;
use oplower::options::LoweringOptions;
use oplower::tensor::DType;

#[test]
fn fused_pair_and_unknown_operator_are_reported() -> anyhow::Result<()> {
    let Requant { mut graph, dq, q } = requant_graph(DType::Si8);
    graph.set_tensor_info(TensorInfo::new("sm", DType::Si8, None));
    let softmax =
        graph.add_node(NodeSpec::new("softmax", "Softmax", 13).inputs(["yq"]).outputs(["sm"]));

    let registry = OpBuilderRegistry::with_default_builders();
    let options = LoweringOptions::default();
    let report = check_graph_support(&registry, &graph, &options.input_params(&graph))?;

    assert_eq!(report.fused_pairs, vec![(dq, q)]);
    assert!(report.is_supported(dq));
    assert!(report.is_supported(q));
    assert!(!report.is_supported(softmax));
    assert!(!report.is_fully_supported());
    assert_eq!(report.diagnostics.len(), 1);
    assert_eq!(report.diagnostics[0].node, softmax);
    assert!(report.diagnostics[0].reason.contains("no builder registered"));
    Ok(())
}

#[test]
fn fused_pair_is_supported_under_program_sink() -> anyhow::Result<()> {
    // Standalone QDQ builders refuse the program sink; the merged convert does not.
    let Requant { graph, .. } = requant_graph(DType::Si8);
    let registry = OpBuilderRegistry::with_default_builders();
    let options = LoweringOptions::default().with_sink(SinkKind::Program);

    let report = check_graph_support(&registry, &graph, &options.input_params(&graph))?;
    assert!(report.is_fully_supported());
    assert_eq!(report.fused_pairs.len(), 1);
    Ok(())
}

#[test]
fn unfused_quantize_is_rejected_under_program_sink() -> anyhow::Result<()> {
    let Requant { graph, dq, q } = requant_graph(DType::Ui8);
    let registry = OpBuilderRegistry::with_default_builders();
    let options = LoweringOptions::default().with_sink(SinkKind::Program);

    let report = check_graph_support(&registry, &graph, &options.input_params(&graph))?;
    assert!(report.fused_pairs.is_empty());
    let rejected: Vec<_> = report.diagnostics.iter().map(|d| d.node).collect();
    assert_eq!(rejected, vec![dq, q]);
    Ok(())
}

#[test]
fn clip_graph_is_fully_supported() -> anyhow::Result<()> {
    let graph = clip_graph(Some(0.0), Some(6.0));
    let registry = OpBuilderRegistry::with_default_builders();
    let params = LoweringOptions::default().input_params(&graph);

    let report = check_graph_support(&registry, &graph, &params)?;
    assert!(report.is_fully_supported());
    assert!(report.is_supported(0));
    Ok(())
}
