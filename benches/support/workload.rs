#![allow(dead_code)]

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sombra_executor::DirectedEdge;

/// Deterministic generator of random edge batches.
pub struct EdgeWorkload {
    rng: ChaCha8Rng,
    entities: u64,
    attrs: Vec<String>,
    value_bytes: usize,
}

impl EdgeWorkload {
    pub fn new(seed: u64, entities: u64, attrs: usize, value_bytes: usize) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            entities: entities.max(1),
            attrs: (0..attrs.max(1)).map(|i| format!("attr{i}")).collect(),
            value_bytes,
        }
    }

    pub fn edge(&mut self) -> DirectedEdge {
        let entity = self.rng.gen_range(0..self.entities);
        let attr = self.attrs[self.rng.gen_range(0..self.attrs.len())].clone();
        let mut value = vec![0u8; self.value_bytes];
        self.rng.fill(value.as_mut_slice());
        DirectedEdge::set(entity, attr, value)
    }

    pub fn batch(&mut self, len: usize) -> Vec<DirectedEdge> {
        (0..len).map(|_| self.edge()).collect()
    }

    pub fn keys(&mut self, len: usize) -> Vec<(u64, String)> {
        (0..len)
            .map(|_| {
                let edge = self.edge();
                (edge.entity.0, edge.attr)
            })
            .collect()
    }
}
