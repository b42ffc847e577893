use bytes::Bytes;

use super::EntityId;

/// Operation carried by a directed edge mutation.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum EdgeOp {
    /// Adds or overwrites the value.
    Set,
    /// Removes the value.
    Del,
}

/// A single directed-edge mutation touching one entity and one attribute.
///
/// The value is either a scalar payload (`value`) or a reference to another
/// entity (`value_id`); the executor treats both as opaque bytes for routing
/// and accounting purposes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DirectedEdge {
    /// Entity the mutation targets.
    pub entity: EntityId,
    /// Attribute (predicate) name.
    pub attr: String,
    /// Scalar value payload.
    pub value: Bytes,
    /// Target entity for reference edges, zero for scalar edges.
    pub value_id: u64,
    /// Set or delete.
    pub op: EdgeOp,
}

impl DirectedEdge {
    /// Creates a scalar `Set` mutation.
    pub fn set(
        entity: impl Into<EntityId>,
        attr: impl Into<String>,
        value: impl Into<Bytes>,
    ) -> Self {
        Self {
            entity: entity.into(),
            attr: attr.into(),
            value: value.into(),
            value_id: 0,
            op: EdgeOp::Set,
        }
    }

    /// Creates a reference edge pointing from `entity` to `target`.
    pub fn link(entity: impl Into<EntityId>, attr: impl Into<String>, target: EntityId) -> Self {
        Self {
            entity: entity.into(),
            attr: attr.into(),
            value: Bytes::new(),
            value_id: target.0,
            op: EdgeOp::Set,
        }
    }

    /// Creates a `Del` mutation for the attribute.
    pub fn delete(entity: impl Into<EntityId>, attr: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            attr: attr.into(),
            value: Bytes::new(),
            value_id: 0,
            op: EdgeOp::Del,
        }
    }

    /// Approximate in-memory footprint used for backpressure accounting.
    pub fn size(&self) -> usize {
        self.attr.len() + 8 + 8 + self.value.len() + 1
    }
}
