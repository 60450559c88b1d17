// immutable social-network description shared by the whole group

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use log::info;
use serde::Deserialize;

use crate::fd_interface::{NodeId, Role};

/// Structural problems that make an adjacency/role pair unusable
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    /// Adjacency matrix is not square
    NotSquare { rows: usize, row: usize, len: usize },

    /// adjacency[a][b] != adjacency[b][a]
    Asymmetric { a: NodeId, b: NodeId },

    /// Non-zero diagonal entry
    SelfLoop { node: NodeId },

    /// Graph has more than one component
    Disconnected,

    /// role_vector length does not match the adjacency size
    RoleLengthMismatch { nodes: usize, roles: usize },
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkError::NotSquare { rows, row, len } => {
                write!(f, "adjacency is not square: {} rows but row {} has {} entries", rows, row, len)
            }
            NetworkError::Asymmetric { a, b } => {
                write!(f, "adjacency is not symmetric at ({}, {})", a, b)
            }
            NetworkError::SelfLoop { node } => write!(f, "self-loop at node {}", node),
            NetworkError::Disconnected => write!(f, "graph is not connected"),
            NetworkError::RoleLengthMismatch { nodes, roles } => {
                write!(f, "{} nodes but {} roles", nodes, roles)
            }
        }
    }
}

impl std::error::Error for NetworkError {}

/// Why a named network condition could not be turned into a [`NetworkSpec`].
///
/// All of these are fatal configuration errors: the run must halt visibly
/// rather than fall back to an empty or default network.
#[derive(Debug)]
pub enum NetworkLoadError {
    /// Condition file missing or unreadable
    Io { path: PathBuf, source: std::io::Error },

    /// Condition file is not valid JSON of the expected shape
    Malformed { path: PathBuf, source: serde_json::Error },

    /// File parsed but describes an invalid network
    Invalid { path: PathBuf, source: NetworkError },
}

impl fmt::Display for NetworkLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkLoadError::Io { path, source } => {
                write!(f, "cannot read network file {}: {}", path.display(), source)
            }
            NetworkLoadError::Malformed { path, source } => {
                write!(f, "malformed network file {}: {}", path.display(), source)
            }
            NetworkLoadError::Invalid { path, source } => {
                write!(f, "invalid network in {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for NetworkLoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            NetworkLoadError::Io { source, .. } => Some(source),
            NetworkLoadError::Malformed { source, .. } => Some(source),
            NetworkLoadError::Invalid { source, .. } => Some(source),
        }
    }
}

/// On-disk format of a predefined network condition:
/// `{"adj_matrix": [[0,1,...], ...], "role_vector": [0,1,...]}` where a role
/// entry of 1 means minority.
#[derive(Deserialize)]
struct NetworkFile {
    adj_matrix: Vec<Vec<u8>>,
    role_vector: Vec<u8>,
}

/// Immutable adjacency + role-vector description of the social network.
///
/// Created once per experimental run (loaded or generated), then shared
/// read-only by every participant for the duration of the run. Slot `i` of
/// the role vector is the role required of whoever is placed on node `i`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkSpec {
    adjacency: Vec<Vec<bool>>,
    roles: Vec<Role>,
}

impl NetworkSpec {
    /// Validate and build a spec from an adjacency matrix and role vector.
    ///
    /// The matrix must be square, symmetric, zero on the diagonal and
    /// connected; the role vector must have one entry per node. Degenerate
    /// sizes (0 or 1 nodes) are accepted so that misconfigured sessions fail
    /// later with a clear group-size complaint instead of a panic here.
    pub fn new(adjacency: Vec<Vec<bool>>, roles: Vec<Role>) -> Result<Self, NetworkError> {
        let n = adjacency.len();

        for (i, row) in adjacency.iter().enumerate() {
            if row.len() != n {
                return Err(NetworkError::NotSquare { rows: n, row: i, len: row.len() });
            }
        }
        for i in 0..n {
            if adjacency[i][i] {
                return Err(NetworkError::SelfLoop { node: i });
            }
            for j in (i + 1)..n {
                if adjacency[i][j] != adjacency[j][i] {
                    return Err(NetworkError::Asymmetric { a: i, b: j });
                }
            }
        }
        if roles.len() != n {
            return Err(NetworkError::RoleLengthMismatch { nodes: n, roles: roles.len() });
        }
        if !connected(&adjacency) {
            return Err(NetworkError::Disconnected);
        }

        Ok(Self { adjacency, roles })
    }

    /// Build without validation. For generated networks whose construction
    /// guarantees the invariants.
    pub(crate) fn from_parts_unchecked(adjacency: Vec<Vec<bool>>, roles: Vec<Role>) -> Self {
        debug_assert!(connected(&adjacency));
        debug_assert_eq!(adjacency.len(), roles.len());
        Self { adjacency, roles }
    }

    /// Load a named network condition from `<dir>/network_<condition>.json`
    pub fn load_condition(dir: &Path, condition: &str) -> Result<Self, NetworkLoadError> {
        let path = dir.join(format!("network_{}.json", condition));

        let raw = fs::read_to_string(&path)
            .map_err(|source| NetworkLoadError::Io { path: path.clone(), source })?;

        let file: NetworkFile = serde_json::from_str(&raw)
            .map_err(|source| NetworkLoadError::Malformed { path: path.clone(), source })?;

        let adjacency = file
            .adj_matrix
            .iter()
            .map(|row| row.iter().map(|&c| c != 0).collect())
            .collect();
        let roles = file
            .role_vector
            .iter()
            .map(|&r| if r == 1 { Role::Minority } else { Role::Majority })
            .collect();

        let spec = Self::new(adjacency, roles)
            .map_err(|source| NetworkLoadError::Invalid { path: path.clone(), source })?;

        info!("loaded network condition '{}' from {} ({} nodes)", condition, path.display(), spec.len());
        Ok(spec)
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    pub fn role(&self, node: NodeId) -> Role {
        self.roles[node]
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    pub fn are_neighbors(&self, a: NodeId, b: NodeId) -> bool {
        self.adjacency[a][b]
    }

    pub fn neighbors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.adjacency[node]
            .iter()
            .enumerate()
            .filter_map(|(i, &edge)| edge.then_some(i))
    }

    pub fn degree(&self, node: NodeId) -> usize {
        self.adjacency[node].iter().filter(|&&e| e).count()
    }

    pub fn minority_count(&self) -> usize {
        self.roles.iter().filter(|r| **r == Role::Minority).count()
    }

    pub fn majority_count(&self) -> usize {
        self.len() - self.minority_count()
    }
}

/// Single-component check via breadth-first search. Trivially true for the
/// degenerate sizes 0 and 1.
fn connected(adjacency: &[Vec<bool>]) -> bool {
    let n = adjacency.len();
    if n <= 1 {
        return true;
    }

    let mut seen = vec![false; n];
    let mut queue = std::collections::VecDeque::new();
    seen[0] = true;
    queue.push_back(0);

    while let Some(v) = queue.pop_front() {
        for (u, &edge) in adjacency[v].iter().enumerate() {
            if edge && !seen[u] {
                seen[u] = true;
                queue.push_back(u);
            }
        }
    }

    seen.iter().all(|&s| s)
}
