// random connected-graph synthesis with centrality-biased role assignment

use rand::seq::SliceRandom;
use rand::Rng;

use crate::fd_interface::{NodeId, Role};
use crate::fd_network::NetworkSpec;

/// Generate a simple, connected, undirected network with no isolates and
/// assign the minority role to its most central nodes.
///
/// Construction:
/// 1. random spanning tree (each node attaches to a uniformly random earlier
///    node in a shuffled order) - connectivity with exactly n-1 edges
/// 2. every remaining unordered pair gains an edge with `edge_probability`
/// 3. the `max(1, round(minority_fraction * n))` highest-degree nodes become
///    the minority, ties broken by node index
///
/// Seeding minorities into well-connected positions is a deliberate
/// experimental manipulation, not an optimization.
pub fn generate<R: Rng>(
    n: usize,
    edge_probability: f64,
    minority_fraction: f64,
    rng: &mut R,
) -> NetworkSpec {
    let adjacency = generate_adjacency(n, edge_probability, rng);
    let roles = assign_roles_by_centrality(&adjacency, minority_fraction);
    NetworkSpec::from_parts_unchecked(adjacency, roles)
}

/// Random spanning tree plus independent extra edges. n <= 1 yields a
/// degenerate (edgeless) matrix.
fn generate_adjacency<R: Rng>(n: usize, edge_probability: f64, rng: &mut R) -> Vec<Vec<bool>> {
    let mut adjacency = vec![vec![false; n]; n];

    let mut nodes: Vec<NodeId> = (0..n).collect();
    nodes.shuffle(rng);

    // spanning tree to ensure connectivity
    for i in 1..n {
        let a = nodes[i];
        let b = nodes[rng.gen_range(0..i)];
        adjacency[a][b] = true;
        adjacency[b][a] = true;
    }

    // add extra random edges
    for i in 0..n {
        for j in (i + 1)..n {
            if !adjacency[i][j] && rng.gen_bool(edge_probability) {
                adjacency[i][j] = true;
                adjacency[j][i] = true;
            }
        }
    }

    adjacency
}

/// Assign the minority role to the top-`max(1, round(fraction * n))` nodes by
/// degree, ties broken by lower node index. Deterministic given the matrix.
pub fn assign_roles_by_centrality(adjacency: &[Vec<bool>], minority_fraction: f64) -> Vec<Role> {
    let n = adjacency.len();
    if n == 0 {
        return Vec::new();
    }

    let degrees: Vec<usize> = adjacency
        .iter()
        .map(|row| row.iter().filter(|&&e| e).count())
        .collect();

    let num_minority = ((minority_fraction * n as f64).round() as usize).max(1).min(n);

    // sort nodes by degree descending, index ascending
    let mut by_centrality: Vec<NodeId> = (0..n).collect();
    by_centrality.sort_by(|&a, &b| degrees[b].cmp(&degrees[a]).then(a.cmp(&b)));

    let mut roles = vec![Role::Majority; n];
    for &node in by_centrality.iter().take(num_minority) {
        roles[node] = Role::Minority;
    }

    roles
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn degrees(spec: &NetworkSpec) -> Vec<usize> {
        (0..spec.len()).map(|v| spec.degree(v)).collect()
    }

    #[test]
    fn generated_networks_are_connected_and_simple() {
        let mut rng = StdRng::seed_from_u64(7);
        for n in [2, 5, 10, 25] {
            for _ in 0..20 {
                let spec = generate(n, 0.3, 0.3, &mut rng);
                assert_eq!(spec.len(), n);
                // NetworkSpec::new re-runs the full invariant checks
                let rebuilt = NetworkSpec::new(
                    (0..n)
                        .map(|i| (0..n).map(|j| spec.are_neighbors(i, j)).collect())
                        .collect(),
                    spec.roles().to_vec(),
                );
                assert!(rebuilt.is_ok(), "invalid network for n={}: {:?}", n, rebuilt);
                // no isolates
                assert!(degrees(&spec).iter().all(|&d| d >= 1));
            }
        }
    }

    #[test]
    fn minority_count_matches_rounded_fraction() {
        let mut rng = StdRng::seed_from_u64(11);
        let spec = generate(10, 0.3, 0.3, &mut rng);
        assert_eq!(spec.minority_count(), 3);

        // f64::round rounds halves away from zero: 2.5 -> 3
        let spec = generate(10, 0.3, 0.25, &mut rng);
        assert_eq!(spec.minority_count(), 3);

        // fraction rounding to zero is clamped to one
        let spec = generate(10, 0.3, 0.01, &mut rng);
        assert_eq!(spec.minority_count(), 1);
    }

    #[test]
    fn minorities_occupy_the_most_central_nodes() {
        let mut rng = StdRng::seed_from_u64(23);
        for _ in 0..50 {
            let spec = generate(12, 0.25, 0.3, &mut rng);
            let degs = degrees(&spec);

            let mut ranked: Vec<usize> = (0..12).collect();
            ranked.sort_by(|&a, &b| degs[b].cmp(&degs[a]).then(a.cmp(&b)));
            let expected: std::collections::HashSet<usize> =
                ranked[..spec.minority_count()].iter().copied().collect();

            let actual: std::collections::HashSet<usize> = (0..12)
                .filter(|&v| spec.role(v) == Role::Minority)
                .collect();
            assert_eq!(actual, expected);
        }
    }

    #[test]
    fn ring_ties_break_toward_lowest_index() {
        // 4-node ring: every degree is 2, so the single minority slot goes
        // to node 0 by the index tie-break
        let mut adj = vec![vec![false; 4]; 4];
        for i in 0..4 {
            let j = (i + 1) % 4;
            adj[i][j] = true;
            adj[j][i] = true;
        }
        let roles = assign_roles_by_centrality(&adj, 0.25);
        assert_eq!(
            roles,
            vec![Role::Minority, Role::Majority, Role::Majority, Role::Majority]
        );
    }

    #[test]
    fn degenerate_sizes_do_not_crash() {
        let mut rng = StdRng::seed_from_u64(3);
        let empty = generate(0, 0.3, 0.3, &mut rng);
        assert_eq!(empty.len(), 0);

        let single = generate(1, 0.3, 0.3, &mut rng);
        assert_eq!(single.len(), 1);
        // the clamp makes the lone node a minority
        assert_eq!(single.role(0), Role::Minority);
    }
}
