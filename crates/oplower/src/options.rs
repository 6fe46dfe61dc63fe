use std::env;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::graph::GraphAccessor;
use crate::model::SinkKind;
use crate::op_builder::OpBuilderInputParams;

static OPLOWER_SINK: OnceLock<SinkKind> = OnceLock::new();
static OPLOWER_STATIC_SHAPES: OnceLock<bool> = OnceLock::new();

fn parse_bool(value: &str) -> bool {
    let normalized = value.trim().to_ascii_lowercase();
    matches!(normalized.as_str(), "1" | "true" | "yes" | "on")
}

fn parse_sink(value: &str) -> SinkKind {
    match value.trim().to_ascii_lowercase().as_str() {
        "program" | "mlprogram" => SinkKind::Program,
        _ => SinkKind::Layers,
    }
}

fn env_sink() -> SinkKind {
    *OPLOWER_SINK.get_or_init(|| match env::var("OPLOWER_SINK") {
        Ok(value) if !value.trim().is_empty() => parse_sink(&value),
        _ => SinkKind::Layers,
    })
}

fn env_static_shapes() -> bool {
    *OPLOWER_STATIC_SHAPES.get_or_init(|| match env::var("OPLOWER_STATIC_SHAPES") {
        Ok(value) if !value.trim().is_empty() => parse_bool(&value),
        _ => false,
    })
}

/// Per-pass lowering configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoweringOptions {
    pub sink: SinkKind,
    pub allow_dynamic_shapes: bool,
}

impl Default for LoweringOptions {
    fn default() -> Self {
        Self {
            sink: SinkKind::Layers,
            allow_dynamic_shapes: true,
        }
    }
}

impl LoweringOptions {
    /// Reads `OPLOWER_SINK` and `OPLOWER_STATIC_SHAPES` (cached per process).
    pub fn from_env() -> Self {
        Self {
            sink: env_sink(),
            allow_dynamic_shapes: !env_static_shapes(),
        }
    }

    pub fn with_sink(mut self, sink: SinkKind) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_dynamic_shapes(mut self, allowed: bool) -> Self {
        self.allow_dynamic_shapes = allowed;
        self
    }

    pub fn input_params<'a>(&self, graph: &'a dyn GraphAccessor) -> OpBuilderInputParams<'a> {
        OpBuilderInputParams::new(graph, self.sink == SinkKind::Program)
            .with_dynamic_shapes(self.allow_dynamic_shapes)
    }

    pub fn digest(&self) -> u64 {
        let bytes = bincode::serialize(self).unwrap_or_default();
        fnv_hash(&bytes)
    }
}

fn fnv_hash(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;

    let mut hash = OFFSET;
    for byte in bytes {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sink_names_parse_case_insensitively() {
        assert_eq!(parse_sink("Program"), SinkKind::Program);
        assert_eq!(parse_sink(" mlprogram "), SinkKind::Program);
        assert_eq!(parse_sink("layers"), SinkKind::Layers);
        assert_eq!(parse_sink("bogus"), SinkKind::Layers);
    }

    #[test]
    fn digest_tracks_option_changes() {
        let base = LoweringOptions::default();
        let program = base.clone().with_sink(SinkKind::Program);
        assert_eq!(base.digest(), LoweringOptions::default().digest());
        assert_ne!(base.digest(), program.digest());
        assert!(parse_bool("yes"));
        assert!(!parse_bool("0"));
    }

    #[test]
    fn from_env_follows_environment_and_defaults_when_unset() {
        let sink = env::var("OPLOWER_SINK").ok();
        let static_shapes = env::var("OPLOWER_STATIC_SHAPES").ok();
        let expected = LoweringOptions {
            sink: sink.as_deref().map_or(SinkKind::Layers, parse_sink),
            allow_dynamic_shapes: !static_shapes.as_deref().is_some_and(parse_bool),
        };

        let options = LoweringOptions::from_env();
        assert_eq!(options, expected);
        assert_eq!(LoweringOptions::from_env(), options);
        if sink.is_none() && static_shapes.is_none() {
            assert_eq!(options, LoweringOptions::default());
            assert_eq!(env_sink(), SinkKind::Layers);
            assert!(!env_static_shapes());
        }
    }
}
