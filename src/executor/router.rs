use smallvec::SmallVec;
use xxhash_rust::xxh64::Xxh64;

use crate::types::{DirectedEdge, EntityId};

const ROUTE_SEED: u64 = 0x5EED_1A7E;

/// Maps an (entity, attribute) pair to a lane in `0..lane_count`.
///
/// Hashes the attribute bytes followed by the big-endian entity id, so the
/// result depends only on those two fields.
///
/// # Panics
///
/// Panics if `lane_count` is zero.
pub fn lane_of(entity: EntityId, attr: &str, lane_count: usize) -> usize {
    assert!(lane_count > 0, "lane_count must be positive");
    let mut hasher = Xxh64::new(ROUTE_SEED);
    hasher.update(attr.as_bytes());
    hasher.update(&entity.0.to_be_bytes());
    (hasher.digest() % lane_count as u64) as usize
}

/// Edges routed to one lane, in submission order.
#[derive(Debug)]
pub(crate) struct LaneGroup {
    pub lane: usize,
    pub edges: Vec<DirectedEdge>,
    pub bytes: i64,
}

/// Splits `edges` by lane without reordering edges that share a lane.
///
/// Groups come out ordered by the first appearance of their lane.
pub(crate) fn group_by_lane(edges: Vec<DirectedEdge>, lane_count: usize) -> Vec<LaneGroup> {
    let mut slot_of: SmallVec<[u32; 64]> = SmallVec::from_elem(u32::MAX, lane_count);
    let mut groups: Vec<LaneGroup> = Vec::new();
    for edge in edges {
        let lane = lane_of(edge.entity, &edge.attr, lane_count);
        let slot = match slot_of[lane] {
            u32::MAX => {
                slot_of[lane] = groups.len() as u32;
                groups.push(LaneGroup {
                    lane,
                    edges: Vec::new(),
                    bytes: 0,
                });
                groups.len() - 1
            }
            slot => slot as usize,
        };
        let group = &mut groups[slot];
        group.bytes += edge.size() as i64;
        group.edges.push(edge);
    }
    groups
}
