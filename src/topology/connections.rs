//! Neighbour and path computation.
//!
//! Nodes are neighbours when they lie within radio range of each other.
//! Hop distances and shortest paths are breadth-first searches over that
//! neighbour relation.

use std::collections::VecDeque;

use crate::topology::types::{Coordinate, NodeId};

/// Build the neighbour lists for every node
///
/// Two distinct nodes are neighbours if their euclidean distance is at most
/// `radio_range` (a small epsilon absorbs floating point error on grids).
pub fn generate_neighbours(locations: &[Coordinate], radio_range: f64) -> Vec<Vec<NodeId>> {
    let limit = radio_range + 1e-9;

    locations
        .iter()
        .enumerate()
        .map(|(i, here)| {
            locations
                .iter()
                .enumerate()
                .filter(|(j, there)| *j != i && here.distance(there) <= limit)
                .map(|(j, _)| j as NodeId)
                .collect()
        })
        .collect()
}

/// Shortest path from `from` to `to` inclusive of both ends
pub fn shortest_path(neighbours: &[Vec<NodeId>], from: NodeId, to: NodeId) -> Option<Vec<NodeId>> {
    let size = neighbours.len();
    if from as usize >= size || to as usize >= size {
        return None;
    }

    let mut previous: Vec<Option<NodeId>> = vec![None; size];
    let mut visited = vec![false; size];
    let mut queue = VecDeque::new();

    visited[from as usize] = true;
    queue.push_back(from);

    while let Some(node) = queue.pop_front() {
        if node == to {
            let mut path = vec![to];
            let mut current = to;
            while let Some(prev) = previous[current as usize] {
                path.push(prev);
                current = prev;
            }
            path.reverse();
            return Some(path);
        }

        for &next in &neighbours[node as usize] {
            if !visited[next as usize] {
                visited[next as usize] = true;
                previous[next as usize] = Some(node);
                queue.push_back(next);
            }
        }
    }

    None
}

/// Number of hops between two nodes, `None` when disconnected
pub fn hop_distance(neighbours: &[Vec<NodeId>], from: NodeId, to: NodeId) -> Option<u32> {
    shortest_path(neighbours, from, to).map(|path| (path.len() - 1) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::types::Layout;

    #[test]
    fn test_grid_neighbours_are_four_connected() {
        let locations = Layout::Grid { network_size: 3, distance: 1.0 }.locations();
        let neighbours = generate_neighbours(&locations, 1.0);

        assert_eq!(neighbours[4], vec![1, 3, 5, 7]);
        assert_eq!(neighbours[0], vec![1, 3]);
    }

    #[test]
    fn test_hop_distance_across_grid() {
        let locations = Layout::Grid { network_size: 3, distance: 1.0 }.locations();
        let neighbours = generate_neighbours(&locations, 1.0);

        assert_eq!(hop_distance(&neighbours, 0, 8), Some(4));
        assert_eq!(hop_distance(&neighbours, 4, 4), Some(0));
        assert_eq!(shortest_path(&neighbours, 0, 2), Some(vec![0, 1, 2]));
    }

    #[test]
    fn test_disconnected_nodes_have_no_path() {
        let locations = Layout::Line { network_size: 3, distance: 10.0 }.locations();
        let neighbours = generate_neighbours(&locations, 5.0);

        assert_eq!(hop_distance(&neighbours, 0, 2), None);
        assert_eq!(shortest_path(&neighbours, 0, 9), None);
    }
}
