//! Cyclic target search.
//!
//! Every search walks the endpoints of one immutable [`GraphSnapshot`] by
//! index, so a topology change arriving mid-search cannot skip or repeat a
//! candidate. Only endpoints with at least one sink channel are candidates.
//!
//! Availability is supplied by the caller as a predicate, which keeps this
//! module independent of how mappings are stored.

use super::types::Target;
use crate::graph::{EndpointId, GraphSnapshot};

/// Search direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// Next endpoint index after `index` that can take audio.
fn next_target_index(snapshot: &GraphSnapshot, index: usize) -> Option<usize> {
    (index + 1..snapshot.endpoints.len()).find(|&i| snapshot.endpoints[i].has_sinks())
}

fn previous_target_index(snapshot: &GraphSnapshot, index: usize) -> Option<usize> {
    (0..index).rev().find(|&i| snapshot.endpoints[i].has_sinks())
}

fn first_target_index(snapshot: &GraphSnapshot) -> Option<usize> {
    snapshot.endpoints.iter().position(|e| e.has_sinks())
}

fn last_target_index(snapshot: &GraphSnapshot) -> Option<usize> {
    snapshot.endpoints.iter().rposition(|e| e.has_sinks())
}

/// Concrete endpoints that can take audio, in stable order.
pub fn target_endpoints(snapshot: &GraphSnapshot) -> impl Iterator<Item = EndpointId> + '_ {
    snapshot
        .endpoints
        .iter()
        .filter(|e| e.has_sinks())
        .map(|e| e.id)
}

/// Walk candidate endpoints starting at (and including) `start`.
fn scan<F>(
    snapshot: &GraphSnapshot,
    start: Option<usize>,
    direction: Direction,
    available: &F,
) -> Option<Target>
where
    F: Fn(Target) -> bool,
{
    let mut index = start;
    while let Some(i) = index {
        let target = Target::Endpoint(snapshot.endpoints[i].id);
        if available(target) {
            return Some(target);
        }
        index = match direction {
            Direction::Forward => next_target_index(snapshot, i),
            Direction::Backward => previous_target_index(snapshot, i),
        };
    }
    None
}

/// Find the available target following `after` in `direction`.
///
/// From the floating default the walk starts at the first (or last)
/// endpoint. From a concrete endpoint it continues past it, then falls
/// back to the default when a default sink exists and is free, then wraps
/// to the first (or last) endpoint. `None` when every candidate is taken.
pub fn find_available<F>(
    snapshot: &GraphSnapshot,
    after: Target,
    direction: Direction,
    available: F,
) -> Option<Target>
where
    F: Fn(Target) -> bool,
{
    let edge = match direction {
        Direction::Forward => first_target_index(snapshot),
        Direction::Backward => last_target_index(snapshot),
    };

    let Target::Endpoint(id) = after else {
        return scan(snapshot, edge, direction, &available);
    };

    if let Some(index) = snapshot.index_of(id) {
        let onward = match direction {
            Direction::Forward => next_target_index(snapshot, index),
            Direction::Backward => previous_target_index(snapshot, index),
        };
        if let Some(found) = scan(snapshot, onward, direction, &available) {
            return Some(found);
        }
    }

    if snapshot.has_default_sink() && available(Target::Default) {
        return Some(Target::Default);
    }

    scan(snapshot, edge, direction, &available)
}

/// First target: the default when free, otherwise the first free endpoint.
pub fn find_first_available<F>(snapshot: &GraphSnapshot, available: F) -> Option<Target>
where
    F: Fn(Target) -> bool,
{
    if available(Target::Default) {
        return Some(Target::Default);
    }
    find_available(snapshot, Target::Default, Direction::Forward, available)
}

/// Step cyclically through `0..count` from `current`, returning the first
/// index accepted by `available`. Stops when the walk comes back around.
pub fn cycle_channel<F>(current: u32, count: u32, direction: Direction, available: F) -> Option<u32>
where
    F: Fn(u32) -> bool,
{
    if count <= 1 {
        return None;
    }
    let mut index = current % count;
    for _ in 1..count {
        index = match direction {
            Direction::Forward => (index + 1) % count,
            Direction::Backward => index.checked_sub(1).unwrap_or(count - 1),
        };
        if available(index) {
            return Some(index);
        }
    }
    None
}
