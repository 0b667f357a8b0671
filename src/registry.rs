use crate::generalize;
use crate::lcs;
use crate::template::Template;
use crate::trie::TrieIndex;
use thiserror::Error;

/// Position of a cluster in the registry. Clusters are never removed, so ids are stable.
pub type ClusterId = usize;

/// 1-based line identifier, continuous across resumed batches.
pub type LineId = u64;

#[derive(Debug, Error, PartialEq)]
pub enum RegistryError {
    #[error("line id {line_id} collides with already assigned ids (max assigned: {max_assigned})")]
    LineIdCollision { line_id: LineId, max_assigned: LineId },
    #[error("tau must be in (0, 1], got {0}")]
    InvalidTau(f64),
    #[error("registry inconsistency: {0}")]
    Inconsistent(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cluster {
    pub template: Template,
    pub line_ids: Vec<LineId>,
}

impl Cluster {
    pub fn new(template: Template, line_id: LineId) -> Self {
        Self { template, line_ids: vec![line_id] }
    }

    pub fn size(&self) -> usize {
        self.line_ids.len()
    }

    pub fn event_id(&self, len: usize) -> String {
        self.template.event_id(len)
    }
}

/// What happened to a line inside [`ClusterRegistry::process`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assignment {
    Created(ClusterId),
    Matched { id: ClusterId, generalized: bool },
}

impl Assignment {
    pub fn cluster_id(&self) -> ClusterId {
        match self {
            Assignment::Created(id) | Assignment::Matched { id, .. } => *id,
        }
    }
}

/// Owns every cluster plus the trie that indexes them.
#[derive(Debug, Clone)]
pub struct ClusterRegistry {
    clusters: Vec<Cluster>,
    trie: TrieIndex,
    tau: f64,
    max_line_id: LineId,
}

impl ClusterRegistry {
    pub fn new(tau: f64, anchor_depth: usize) -> Result<Self, RegistryError> {
        validate_tau(tau)?;
        Ok(Self {
            clusters: Vec::new(),
            trie: TrieIndex::new(anchor_depth),
            tau,
            max_line_id: 0,
        })
    }

    /// Reassembles a registry from restored parts. The max line id is recomputed
    /// from membership rather than trusted.
    pub fn from_parts(clusters: Vec<Cluster>, trie: TrieIndex, tau: f64) -> Result<Self, RegistryError> {
        validate_tau(tau)?;
        let max_line_id = clusters
            .iter()
            .flat_map(|c| c.line_ids.iter().copied())
            .max()
            .unwrap_or(0);
        let registry = Self { clusters, trie, tau, max_line_id };
        registry.verify()?;
        Ok(registry)
    }

    pub fn tau(&self) -> f64 {
        self.tau
    }

    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    pub fn cluster(&self, id: ClusterId) -> Option<&Cluster> {
        self.clusters.get(id)
    }

    pub fn trie(&self) -> &TrieIndex {
        &self.trie
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    pub fn max_line_id(&self) -> LineId {
        self.max_line_id
    }

    /// Candidate-then-LCS search without mutating anything.
    pub fn find_match(&self, seq: &[String]) -> Option<ClusterId> {
        let candidates = self.trie.lookup(seq);
        lcs::lcs_match(
            candidates.iter().map(|&id| (id, &self.clusters[id].template)),
            seq,
            self.tau,
        )
    }

    /// Assigns `line_id` to a cluster, generalizing or creating as needed.
    ///
    /// Line ids must arrive strictly increasing; anything else means the caller
    /// reused a resume offset and is rejected before state changes.
    pub fn process(&mut self, line_id: LineId, seq: &[String]) -> Result<Assignment, RegistryError> {
        if line_id <= self.max_line_id {
            return Err(RegistryError::LineIdCollision {
                line_id,
                max_assigned: self.max_line_id,
            });
        }
        self.max_line_id = line_id;

        let Some(id) = self.find_match(seq) else {
            let id = self.clusters.len();
            let cluster = Cluster::new(Template::from_sequence(seq), line_id);
            self.trie.insert(id, &cluster.template);
            self.clusters.push(cluster);
            return Ok(Assignment::Created(id));
        };

        let current = &self.clusters[id].template;
        let common = lcs::lcs(seq, current.tokens());
        let updated = generalize::generalize(&common, seq, current);
        let generalized = updated.is_some();
        if let Some(template) = updated {
            let old = std::mem::replace(&mut self.clusters[id].template, template);
            self.trie.relocate(id, &old, &self.clusters[id].template);
        }
        self.clusters[id].line_ids.push(line_id);
        Ok(Assignment::Matched { id, generalized })
    }

    /// Checks that the trie is exactly the index derived from current templates
    /// and that line ids are unique across clusters.
    pub fn verify(&self) -> Result<(), RegistryError> {
        let derived = TrieIndex::from_templates(
            self.trie.anchor_depth(),
            self.clusters.iter().enumerate().map(|(id, c)| (id, &c.template)),
        );
        if derived != self.trie {
            return Err(RegistryError::Inconsistent(
                "trie does not match cluster templates".into(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for (id, cluster) in self.clusters.iter().enumerate() {
            if cluster.line_ids.is_empty() {
                return Err(RegistryError::Inconsistent(format!("cluster {id} has no members")));
            }
            for line_id in &cluster.line_ids {
                if !seen.insert(*line_id) {
                    return Err(RegistryError::Inconsistent(format!(
                        "line id {line_id} assigned to more than one cluster"
                    )));
                }
            }
        }
        Ok(())
    }
}

fn validate_tau(tau: f64) -> Result<(), RegistryError> {
    if tau > 0.0 && tau <= 1.0 {
        Ok(())
    } else {
        Err(RegistryError::InvalidTau(tau))
    }
}
