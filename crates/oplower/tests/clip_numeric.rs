mod graph_fixtures;

use std::collections::HashMap;

use graph_fixtures::{clip_graph, lower_node, INPUT, OUTPUT};
use oplower::model::SinkKind;
use oplower::reference::{evaluate_layers, evaluate_operations};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn expected(x: f32, min: Option<f32>, max: Option<f32>) -> f32 {
    let mut y = x;
    if let Some(min) = min {
        y = y.max(min);
    }
    if let Some(max) = max {
        y = y.min(max);
    }
    y
}

fn check_both_sinks(values: &[f32], min: Option<f32>, max: Option<f32>) -> anyhow::Result<()> {
    let graph = clip_graph(min, max);
    let inputs = HashMap::from([(INPUT.to_string(), values.to_vec())]);

    let layers = lower_node(&graph, 0, SinkKind::Layers)?;
    let flat = evaluate_layers(&layers.layers, inputs.clone())?;
    let program = lower_node(&graph, 0, SinkKind::Program)?;
    let ops = evaluate_operations(&program.operations, inputs)?;

    for (sink, out) in [("layers", &flat), ("program", &ops)] {
        let y = out
            .get(OUTPUT)
            .ok_or_else(|| anyhow::anyhow!("{sink} sink did not produce {OUTPUT}"))?;
        assert_eq!(y.len(), values.len());
        for (&x, &got) in values.iter().zip(y) {
            let want = expected(x, min, max);
            assert!(
                (got - want).abs() <= 1e-6,
                "{sink}: clip({x}, {min:?}, {max:?}) = {got}, expected {want}"
            );
        }
    }
    Ok(())
}

#[test]
fn fixed_bounds_match_clamp() -> anyhow::Result<()> {
    let mut rng = StdRng::seed_from_u64(42);
    let values: Vec<f32> = (0..64).map(|_| rng.gen_range(-10.0f32..10.0)).collect();

    check_both_sinks(&values, None, None)?;
    check_both_sinks(&values, Some(0.0), None)?;
    check_both_sinks(&values, Some(-2.5), None)?;
    check_both_sinks(&values, None, Some(6.0))?;
    check_both_sinks(&values, Some(0.0), Some(6.0))?;
    check_both_sinks(&values, Some(-1.0), Some(1.0))?;
    Ok(())
}

#[test]
fn random_bounds_match_clamp() -> anyhow::Result<()> {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..16 {
        let values: Vec<f32> = (0..32).map(|_| rng.gen_range(-100.0f32..100.0)).collect();
        let min = rng.gen_range(-50.0f32..0.0);
        let max = rng.gen_range(0.0f32..50.0);
        check_both_sinks(&values, Some(min), Some(max))?;
    }
    Ok(())
}

#[test]
fn boundary_values_are_preserved() -> anyhow::Result<()> {
    let values = [-6.0, -0.0, 0.0, 6.0, 6.000001, f32::MAX, f32::MIN];
    check_both_sinks(&values, Some(0.0), Some(6.0))?;
    check_both_sinks(&values, None, None)
}
