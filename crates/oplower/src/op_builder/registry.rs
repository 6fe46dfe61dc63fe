use std::collections::HashMap;

use super::{BuilderFamily, OpBuilder};

/// Stable index of a builder inside the registry arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BuilderHandle(usize);

impl BuilderHandle {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Default registrations contributed by builder modules.
#[linkme::distributed_slice]
pub static OP_BUILDER_REGISTRARS: [fn(&mut OpBuilderRegistry)] = [..];

/// Maps operator types to builders for one lowering pass.
///
/// The registry owns every builder in an append-only arena; both lookup maps
/// hold handles into it. Operator types whose builders report the same family
/// share a single instance.
#[derive(Default)]
pub struct OpBuilderRegistry {
    builders: Vec<Box<dyn OpBuilder>>,
    by_op_type: HashMap<String, BuilderHandle>,
    by_family: HashMap<BuilderFamily, BuilderHandle>,
}

impl OpBuilderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry populated from every entry in `OP_BUILDER_REGISTRARS`.
    pub fn with_default_builders() -> Self {
        let mut registry = Self::new();
        for register in OP_BUILDER_REGISTRARS.iter() {
            register(&mut registry);
        }
        registry
    }

    /// Registers `op_type`. Re-registering an operator type is a no-op, and a
    /// builder whose family is already installed is dropped in favour of the
    /// existing instance.
    pub fn register(
        &mut self,
        op_type: impl Into<String>,
        builder: Box<dyn OpBuilder>,
    ) -> BuilderHandle {
        let op_type = op_type.into();
        if let Some(&existing) = self.by_op_type.get(&op_type) {
            return existing;
        }

        let family = builder.family();
        let handle = match self.by_family.get(family) {
            Some(&shared) => shared,
            None => {
                let handle = BuilderHandle(self.builders.len());
                self.builders.push(builder);
                self.by_family.insert(family, handle);
                handle
            }
        };
        self.by_op_type.insert(op_type, handle);
        handle
    }

    /// `None` means the operator has no translation on this backend.
    pub fn lookup(&self, op_type: &str) -> Option<&dyn OpBuilder> {
        let handle = self.handle_of(op_type)?;
        self.builder(handle)
    }

    pub fn handle_of(&self, op_type: &str) -> Option<BuilderHandle> {
        self.by_op_type.get(op_type).copied()
    }

    pub fn family_handle(&self, family: &str) -> Option<BuilderHandle> {
        self.by_family.get(family).copied()
    }

    pub fn builder(&self, handle: BuilderHandle) -> Option<&dyn OpBuilder> {
        self.builders.get(handle.0).map(|builder| builder.as_ref())
    }

    pub fn contains(&self, op_type: &str) -> bool {
        self.by_op_type.contains_key(op_type)
    }

    /// Registered operator types, sorted.
    pub fn op_types(&self) -> Vec<String> {
        let mut op_types: Vec<String> = self.by_op_type.keys().cloned().collect();
        op_types.sort();
        op_types
    }

    /// Number of distinct builder instances.
    pub fn builder_count(&self) -> usize {
        self.builders.len()
    }
}
