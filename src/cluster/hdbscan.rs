//! HDBSCAN: core distances, mutual reachability MST, single linkage,
//! condensed tree and cluster selection.

use super::{ClusterSelection, ClustererConfig};
use crate::types::ClusterLabel;
use crate::vector::{DistanceMetric, Matrix};
use rayon::prelude::*;
use std::collections::VecDeque;
use tracing::debug;

/// Smallest merge distance; keeps lambda finite for duplicate points.
const MIN_DISTANCE: f64 = 1e-12;

#[derive(Debug, Clone, Copy)]
struct MstEdge {
    a: usize,
    b: usize,
    distance: f32,
}

/// Internal node of the single-linkage dendrogram.
///
/// Node ids below `n` are points, node `n + i` is `merges[i]`.
#[derive(Debug, Clone, Copy)]
struct Merge {
    left: usize,
    right: usize,
    distance: f32,
    size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Child {
    Point(usize),
    Cluster(usize),
}

/// Edge of the condensed tree. Cluster 0 is the root.
#[derive(Debug, Clone, Copy)]
struct CondensedEdge {
    parent: usize,
    child: Child,
    lambda: f64,
    size: usize,
}

pub(super) fn run(points: &Matrix, config: &ClustererConfig) -> Vec<ClusterLabel> {
    let n = points.rows();
    if n < 2 {
        return vec![ClusterLabel::NOISE; n];
    }

    let core = core_distances(points, config.min_samples, config.metric);
    let mst = minimum_spanning_tree(points, &core, config.metric);
    let merges = single_linkage(&mst, n);
    let (tree, clusters) = condense(&merges, n, config.min_cluster_size);
    debug!(
        mst_edges = mst.len(),
        condensed_clusters = clusters,
        "built condensed tree"
    );

    let selected = match config.selection {
        ClusterSelection::Eom => select_eom(&tree, clusters, config.allow_single_cluster),
        ClusterSelection::Leaf => select_leaves(&tree, clusters, config.allow_single_cluster),
    };
    label_points(&tree, clusters, &selected, n)
}

/// Distance to the `min_samples`-th nearest point, the point itself counted.
fn core_distances(points: &Matrix, min_samples: usize, metric: DistanceMetric) -> Vec<f32> {
    if min_samples <= 1 {
        return vec![0.0; points.rows()];
    }
    (0..points.rows())
        .into_par_iter()
        .map(|i| {
            let mut distances: Vec<f32> = (0..points.rows())
                .filter(|&j| j != i)
                .map(|j| metric.distance(points.row(i), points.row(j)))
                .collect();
            let k = (min_samples - 2).min(distances.len() - 1);
            let (_, kth, _) = distances.select_nth_unstable_by(k, |a, b| a.total_cmp(b));
            *kth
        })
        .collect()
}

/// Prim's algorithm on the implicit mutual-reachability graph.
///
/// Ties go to the lowest node index; the result is sorted by distance with a
/// stable sort, so equal-weight edges keep discovery order.
fn minimum_spanning_tree(points: &Matrix, core: &[f32], metric: DistanceMetric) -> Vec<MstEdge> {
    let n = points.rows();
    let mut in_tree = vec![false; n];
    let mut best = vec![f32::INFINITY; n];
    let mut source = vec![0usize; n];
    let mut edges = Vec::with_capacity(n - 1);

    let mut current = 0;
    in_tree[0] = true;
    for _ in 1..n {
        let from = points.row(current);
        let updates: Vec<(usize, f32)> = (0..n)
            .into_par_iter()
            .filter(|&j| !in_tree[j])
            .map(|j| {
                let reach = metric
                    .distance(from, points.row(j))
                    .max(core[current])
                    .max(core[j]);
                (j, reach)
            })
            .collect();
        for (j, reach) in updates {
            if reach < best[j] {
                best[j] = reach;
                source[j] = current;
            }
        }

        let mut next = usize::MAX;
        let mut next_distance = f32::INFINITY;
        for j in 0..n {
            if !in_tree[j] && (next == usize::MAX || best[j] < next_distance) {
                next = j;
                next_distance = best[j];
            }
        }
        in_tree[next] = true;
        edges.push(MstEdge {
            a: source[next],
            b: next,
            distance: next_distance,
        });
        current = next;
    }

    edges.sort_by(|x, y| x.distance.total_cmp(&y.distance));
    edges
}

fn find(parent: &mut [usize], mut node: usize) -> usize {
    while parent[node] != node {
        parent[node] = parent[parent[node]];
        node = parent[node];
    }
    node
}

/// Single-linkage dendrogram from MST edges in ascending order.
fn single_linkage(mst: &[MstEdge], n: usize) -> Vec<Merge> {
    let mut parent: Vec<usize> = (0..2 * n - 1).collect();
    let mut size = vec![1usize; 2 * n - 1];
    let mut merges = Vec::with_capacity(n - 1);

    for (i, edge) in mst.iter().enumerate() {
        let left = find(&mut parent, edge.a);
        let right = find(&mut parent, edge.b);
        let node = n + i;
        size[node] = size[left] + size[right];
        parent[left] = node;
        parent[right] = node;
        merges.push(Merge {
            left,
            right,
            distance: edge.distance,
            size: size[node],
        });
    }
    merges
}

fn node_size(merges: &[Merge], n: usize, node: usize) -> usize {
    if node < n { 1 } else { merges[node - n].size }
}

/// Points below `node` in the dendrogram, in breadth-first order.
fn leaves(merges: &[Merge], n: usize, node: usize) -> Vec<usize> {
    let mut out = Vec::new();
    let mut queue = VecDeque::from([node]);
    while let Some(current) = queue.pop_front() {
        if current < n {
            out.push(current);
        } else {
            let merge = merges[current - n];
            queue.push_back(merge.left);
            queue.push_back(merge.right);
        }
    }
    out
}

/// Condense the dendrogram: splits where both sides have at least
/// `min_cluster_size` points create two child clusters; smaller sides fall
/// out of their parent as points.
///
/// Returns the tree edges and the number of condensed clusters. Children
/// always get larger ids than their parents.
fn condense(merges: &[Merge], n: usize, min_cluster_size: usize) -> (Vec<CondensedEdge>, usize) {
    let root = 2 * n - 2;
    let mut label = vec![usize::MAX; 2 * n - 1];
    label[root] = 0;
    let mut next_cluster = 1;
    let mut tree = Vec::new();

    let mut queue = VecDeque::from([root]);
    while let Some(node) = queue.pop_front() {
        if node < n {
            continue;
        }
        let merge = merges[node - n];
        let lambda = 1.0 / (merge.distance as f64).max(MIN_DISTANCE);
        let parent = label[node];
        let left_size = node_size(merges, n, merge.left);
        let right_size = node_size(merges, n, merge.right);

        let fall_out = |side: usize, tree: &mut Vec<CondensedEdge>| {
            for point in leaves(merges, n, side) {
                tree.push(CondensedEdge {
                    parent,
                    child: Child::Point(point),
                    lambda,
                    size: 1,
                });
            }
        };

        match (left_size >= min_cluster_size, right_size >= min_cluster_size) {
            (true, true) => {
                for (side, size) in [(merge.left, left_size), (merge.right, right_size)] {
                    label[side] = next_cluster;
                    tree.push(CondensedEdge {
                        parent,
                        child: Child::Cluster(next_cluster),
                        lambda,
                        size,
                    });
                    next_cluster += 1;
                    queue.push_back(side);
                }
            }
            (false, false) => {
                fall_out(merge.left, &mut tree);
                fall_out(merge.right, &mut tree);
            }
            (true, false) => {
                label[merge.left] = parent;
                fall_out(merge.right, &mut tree);
                queue.push_back(merge.left);
            }
            (false, true) => {
                label[merge.right] = parent;
                fall_out(merge.left, &mut tree);
                queue.push_back(merge.right);
            }
        }
    }
    (tree, next_cluster)
}

/// Parent cluster of each cluster (`None` for the root).
fn cluster_parents(tree: &[CondensedEdge], clusters: usize) -> Vec<Option<usize>> {
    let mut parents = vec![None; clusters];
    for edge in tree {
        if let Child::Cluster(child) = edge.child {
            parents[child] = Some(edge.parent);
        }
    }
    parents
}

fn cluster_children(tree: &[CondensedEdge], clusters: usize) -> Vec<Vec<usize>> {
    let mut children = vec![Vec::new(); clusters];
    for edge in tree {
        if let Child::Cluster(child) = edge.child {
            children[edge.parent].push(child);
        }
    }
    children
}

/// Stability of each cluster: sum of (lambda - lambda_birth) * size.
fn stabilities(tree: &[CondensedEdge], clusters: usize) -> Vec<f64> {
    let mut birth = vec![0.0f64; clusters];
    for edge in tree {
        if let Child::Cluster(child) = edge.child {
            birth[child] = edge.lambda;
        }
    }
    let mut stability = vec![0.0f64; clusters];
    for edge in tree {
        stability[edge.parent] += (edge.lambda - birth[edge.parent]) * edge.size as f64;
    }
    stability
}

/// Excess-of-mass selection, visiting clusters from the deepest id upwards.
fn select_eom(tree: &[CondensedEdge], clusters: usize, allow_single_cluster: bool) -> Vec<bool> {
    let mut stability = stabilities(tree, clusters);
    let children = cluster_children(tree, clusters);
    let lowest = if allow_single_cluster { 0 } else { 1 };
    let mut selected = vec![false; clusters];

    for cluster in (lowest..clusters).rev() {
        let subtree: f64 = children[cluster].iter().map(|&c| stability[c]).sum();
        if subtree > stability[cluster] {
            stability[cluster] = subtree;
        } else {
            selected[cluster] = true;
            let mut stack = children[cluster].clone();
            while let Some(descendant) = stack.pop() {
                selected[descendant] = false;
                stack.extend(children[descendant].iter().copied());
            }
        }
    }
    selected
}

fn select_leaves(tree: &[CondensedEdge], clusters: usize, allow_single_cluster: bool) -> Vec<bool> {
    let children = cluster_children(tree, clusters);
    let mut selected: Vec<bool> = children.iter().map(Vec::is_empty).collect();
    if clusters == 1 && !allow_single_cluster {
        selected[0] = false;
    }
    selected
}

/// Label each point with its nearest selected ancestor cluster, densely
/// renumbered in condensed-tree order.
fn label_points(
    tree: &[CondensedEdge],
    clusters: usize,
    selected: &[bool],
    n: usize,
) -> Vec<ClusterLabel> {
    let parents = cluster_parents(tree, clusters);
    let mut dense = vec![None; clusters];
    let mut next = 0;
    for (cluster, &is_selected) in selected.iter().enumerate() {
        if is_selected {
            dense[cluster] = Some(next);
            next += 1;
        }
    }

    let mut labels = vec![ClusterLabel::NOISE; n];
    for edge in tree {
        let Child::Point(point) = edge.child else {
            continue;
        };
        let mut cluster = Some(edge.parent);
        while let Some(current) = cluster {
            if let Some(id) = dense[current] {
                labels[point] = ClusterLabel::cluster(id);
                break;
            }
            cluster = parents[current];
        }
    }
    labels
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(values: &[f32]) -> Matrix {
        Matrix::from_rows(values.iter().map(|v| vec![*v]).collect()).unwrap()
    }

    #[test]
    fn test_core_distance_counts_self() {
        let points = line(&[0.0, 1.0, 3.0, 6.0]);
        let core = core_distances(&points, 2, DistanceMetric::Euclidean);
        assert_eq!(core, vec![1.0, 1.0, 2.0, 3.0]);
        let core = core_distances(&points, 1, DistanceMetric::Euclidean);
        assert_eq!(core, vec![0.0; 4]);
    }

    #[test]
    fn test_mst_spans_all_points_in_ascending_order() {
        let points = line(&[0.0, 1.0, 3.0, 6.0, 10.0]);
        let core = vec![0.0; 5];
        let mst = minimum_spanning_tree(&points, &core, DistanceMetric::Euclidean);
        let weights: Vec<f32> = mst.iter().map(|e| e.distance).collect();
        assert_eq!(weights, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_condensed_tree_drops_small_branches() {
        // two groups of three, plus a far outlier
        let points = line(&[0.0, 0.1, 0.2, 5.0, 5.1, 5.2, 50.0]);
        let core = vec![0.0; 7];
        let mst = minimum_spanning_tree(&points, &core, DistanceMetric::Euclidean);
        let merges = single_linkage(&mst, 7);
        assert_eq!(merges.last().unwrap().size, 7);

        let (tree, clusters) = condense(&merges, 7, 3);
        assert_eq!(clusters, 3);
        let outlier = tree
            .iter()
            .find(|e| e.child == Child::Point(6))
            .unwrap();
        assert_eq!(outlier.parent, 0);

        let selected = select_eom(&tree, clusters, false);
        assert_eq!(selected, vec![false, true, true]);
        let labels = label_points(&tree, clusters, &selected, 7);
        assert_eq!(labels[6], ClusterLabel::NOISE);
        assert_eq!(labels[0], labels[2]);
        assert_ne!(labels[0], labels[3]);
    }

    #[test]
    fn test_single_cluster_needs_opt_in() {
        let points = line(&[0.0, 0.1, 0.2, 0.3, 0.4]);
        let core = vec![0.0; 5];
        let mst = minimum_spanning_tree(&points, &core, DistanceMetric::Euclidean);
        let merges = single_linkage(&mst, 5);
        let (tree, clusters) = condense(&merges, 5, 3);
        assert_eq!(clusters, 1);

        assert_eq!(select_eom(&tree, clusters, false), vec![false]);
        let selected = select_eom(&tree, clusters, true);
        let labels = label_points(&tree, clusters, &selected, 5);
        assert!(labels.iter().all(|l| *l == ClusterLabel::cluster(0)));
    }
}
