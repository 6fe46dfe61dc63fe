mod graph_fixtures;

use graph_fixtures::{
    clip_graph, clip_graph_typed, clip_graph_v6, lower_node, writers_of, INPUT, OUTPUT,
};
use half::f16;
use oplower::model::SinkKind;
use oplower::tensor::{DType, Scalar, Shape};

fn single_op_type(min: Option<f32>, max: Option<f32>) -> anyhow::Result<String> {
    let graph = clip_graph(min, max);
    let model = lower_node(&graph, 0, SinkKind::Program)?;
    anyhow::ensure!(model.operations.len() == 1, "expected one operation");
    anyhow::ensure!(model.layers.is_empty(), "program sink must not emit layers");
    Ok(model.operations[0].op_type.clone())
}

#[test]
fn narrowest_operation_is_selected() -> anyhow::Result<()> {
    assert_eq!(single_op_type(None, None)?, "identity");
    assert_eq!(single_op_type(Some(0.0), Some(6.0))?, "relu6");
    assert_eq!(single_op_type(Some(0.0), None)?, "relu");
    assert_eq!(single_op_type(Some(-1.0), Some(1.0))?, "clip");
    assert_eq!(single_op_type(None, Some(6.0))?, "clip");
    assert_eq!(single_op_type(Some(0.5), None)?, "clip");
    Ok(())
}

#[test]
fn identity_operation_carries_output_descriptor() -> anyhow::Result<()> {
    let graph = clip_graph(None, None);
    let model = lower_node(&graph, 0, SinkKind::Program)?;
    let op = &model.operations[0];

    assert_eq!(op.name, "clip_identity");
    assert_eq!(op.value_input("x"), Some(INPUT));
    assert_eq!(op.inputs.len(), 1);
    assert_eq!(op.outputs.len(), 1);
    assert_eq!(op.outputs[0].name, OUTPUT);
    assert_eq!(op.outputs[0].dtype, DType::F32);
    assert_eq!(op.outputs[0].shape, Some(Shape::from_static(&[2, 3])));
    assert_eq!(writers_of(&model, OUTPUT), 1);
    Ok(())
}

#[test]
fn clip_operation_inlines_bounds() -> anyhow::Result<()> {
    let graph = clip_graph(Some(-1.0), Some(1.0));
    let model = lower_node(&graph, 0, SinkKind::Program)?;
    let op = &model.operations[0];

    assert_eq!(op.name, "clip_clip");
    assert_eq!(op.constant("alpha"), Some(Scalar::F32(-1.0)));
    assert_eq!(op.constant("beta"), Some(Scalar::F32(1.0)));
    // Constant operands are owned by the operation; nothing is skipped.
    assert!(model.skipped_initializers.is_empty());
    Ok(())
}

#[test]
fn missing_max_uses_float_extreme() -> anyhow::Result<()> {
    let graph = clip_graph_v6(Some(-3.0), None);
    let model = lower_node(&graph, 0, SinkKind::Program)?;
    let op = &model.operations[0];

    assert_eq!(op.op_type, "clip");
    assert_eq!(op.constant("alpha"), Some(Scalar::F32(-3.0)));
    assert_eq!(op.constant("beta"), Some(Scalar::F32(f32::MAX)));
    Ok(())
}

#[test]
fn relu_family_has_no_constant_operands() -> anyhow::Result<()> {
    for (min, max) in [(Some(0.0), Some(6.0)), (Some(0.0), None)] {
        let graph = clip_graph(min, max);
        let model = lower_node(&graph, 0, SinkKind::Program)?;
        let op = &model.operations[0];
        assert!(op.constant("alpha").is_none());
        assert!(op.constant("beta").is_none());
        assert_eq!(op.value_input("x"), Some(INPUT));
    }
    Ok(())
}

#[test]
fn half_precision_constants_match_input_type() -> anyhow::Result<()> {
    let graph = clip_graph_typed(DType::F16, Some(-2.0), Some(2.0));
    let model = lower_node(&graph, 0, SinkKind::Program)?;
    let op = &model.operations[0];

    assert_eq!(op.op_type, "clip");
    assert_eq!(op.constant("alpha"), Some(Scalar::F16(f16::from_f32(-2.0))));
    assert_eq!(op.constant("beta"), Some(Scalar::F16(f16::from_f32(2.0))));
    assert_eq!(op.outputs[0].dtype, DType::F16);
    Ok(())
}

#[test]
fn one_sided_half_precision_bound_narrows_to_infinity() -> anyhow::Result<()> {
    let graph = clip_graph_typed(DType::F16, Some(1.0), None);
    let model = lower_node(&graph, 0, SinkKind::Program)?;
    let op = &model.operations[0];
    assert_eq!(op.op_type, "clip");
    assert_eq!(op.constant("alpha"), Some(Scalar::F16(f16::from_f32(1.0))));
    assert_eq!(op.constant("beta"), Some(Scalar::F16(f16::INFINITY)));

    let graph = clip_graph_typed(DType::F16, None, Some(6.5));
    let model = lower_node(&graph, 0, SinkKind::Program)?;
    let op = &model.operations[0];
    assert_eq!(op.constant("alpha"), Some(Scalar::F16(f16::NEG_INFINITY)));
    assert_eq!(op.constant("beta"), Some(Scalar::F16(f16::from_f32(6.5))));
    Ok(())
}
