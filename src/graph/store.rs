//! ProvenanceGraph: the append-only store of PROV nodes and relations

use super::edge::{Generation, Relation, RelationKind};
use super::error::{ProvError, ProvResult, TimingViolation};
use super::namespace::Namespaces;
use super::node::{ActivityRef, AgentRef, Attributes, EntityRef, NodeId, NodeKind, ProvNode};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

/// Start and end of an activity, as recorded so far
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActivityTimes {
    pub started: Option<DateTime<Utc>>,
    pub ended: Option<DateTime<Utc>>,
}

/// Position in a graph's history, as node and relation counts
///
/// Because graphs only grow, everything added after a mark can be read back
/// with [`ProvenanceGraph::nodes_since`] and [`ProvenanceGraph::relations_since`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GraphMark {
    pub nodes: usize,
    pub relations: usize,
}

/// An append-only provenance graph
///
/// Nodes and relations accumulate monotonically; nothing is ever removed.
/// Every relation references nodes that were already present when it was
/// added. Mutation requires `&mut self`, so sharing a graph between
/// concurrent operations goes through [`crate::ProvenanceEngine`], which
/// serializes whole recording sequences.
///
/// Two graphs are equal when they hold the same bindings, nodes and
/// relations, whatever order the relations were recorded in.
#[derive(Debug, Clone, Default)]
pub struct ProvenanceGraph {
    namespaces: Namespaces,
    nodes: BTreeMap<NodeId, ProvNode>,
    relations: Vec<Relation>,
    // Node ids in the order they were added
    arrival: Vec<NodeId>,
    // Indexes over `relations`
    recorded: HashSet<Relation>,
    times: HashMap<NodeId, ActivityTimes>,
}

impl PartialEq for ProvenanceGraph {
    fn eq(&self, other: &Self) -> bool {
        self.namespaces == other.namespaces && self.nodes == other.nodes && self.recorded == other.recorded
    }
}

impl ProvenanceGraph {
    /// Create an empty graph with default namespace bindings
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty graph with the given namespace table
    pub fn with_namespaces(namespaces: Namespaces) -> Self {
        Self {
            namespaces,
            ..Self::default()
        }
    }

    /// Rebuild a graph from persisted parts.
    ///
    /// Relations are replayed through the same checks as live recording, so
    /// a corrupted source fails here instead of producing a dangling edge.
    pub fn restore(
        namespaces: Namespaces,
        nodes: impl IntoIterator<Item = ProvNode>,
        relations: impl IntoIterator<Item = Relation>,
    ) -> ProvResult<Self> {
        let mut graph = Self::with_namespaces(namespaces);
        for node in nodes {
            if let Some(existing) = graph.nodes.get(&node.id) {
                if existing.kind != node.kind {
                    return Err(ProvError::KindMismatch {
                        id: node.id,
                        expected: existing.kind,
                        found: node.kind,
                    });
                }
                continue;
            }
            graph.push_node(node);
        }
        for relation in relations {
            graph.apply(relation)?;
        }
        Ok(graph)
    }

    // === Namespaces ===

    pub fn namespaces(&self) -> &Namespaces {
        &self.namespaces
    }

    /// Rebind a short-name prefix; affects identifiers resolved from now on
    pub fn set_namespace_prefix(&mut self, prefix: &str, base: &str) {
        self.namespaces.bind(prefix, base);
    }

    /// Resolve a short identifier against the current bindings
    pub fn resolve(&self, id: &str) -> NodeId {
        NodeId::from_string(self.namespaces.resolve(id))
    }

    // === Node creation ===

    /// Add an entity.
    ///
    /// Re-adding a known IRI returns the existing entity unless
    /// `new_version` is set, in which case a new version node is minted and
    /// recorded as derived from the previous latest version.
    pub fn add_entity(
        &mut self,
        iri: &str,
        label: &str,
        location: Option<&str>,
        extra: Option<&Attributes>,
        new_version: bool,
    ) -> ProvResult<EntityRef> {
        let mut node = ProvNode::new(self.resolve(iri), NodeKind::Entity).with_label(label);
        if let Some(location) = location {
            node = node.with_location(location);
        }
        if let Some(extra) = extra {
            node = node.with_extra(extra);
        }

        let (id, previous) = self.insert_node(node, new_version)?;
        if let Some(previous) = previous {
            self.apply(Relation::WasDerivedFrom {
                derived: id.clone(),
                source: previous,
            })?;
        }
        Ok(EntityRef::new(id))
    }

    /// Add an activity, or reference an existing one when `existing` is set
    pub fn add_activity(
        &mut self,
        iri: &str,
        label: &str,
        new_version: bool,
        existing: bool,
    ) -> ProvResult<ActivityRef> {
        let id = self.resolve(iri);
        if existing {
            self.require(&id, NodeKind::Activity)?;
            return Ok(ActivityRef::new(id));
        }
        let node = ProvNode::new(id, NodeKind::Activity).with_label(label);
        let (id, _) = self.insert_node(node, new_version)?;
        Ok(ActivityRef::new(id))
    }

    /// Add a software agent.
    ///
    /// Agents are memoized by IRI: re-adding one yields the node already in
    /// the graph whatever `new_version` says, since agents are not versioned.
    pub fn add_software_agent(
        &mut self,
        iri: &str,
        extra: Option<&Attributes>,
        new_version: bool,
        existing: bool,
    ) -> ProvResult<AgentRef> {
        let id = self.resolve(iri);
        if self.nodes.contains_key(&id) || existing {
            self.require(&id, NodeKind::Agent)?;
            return Ok(AgentRef::new(id));
        }
        let mut node = ProvNode::new(id, NodeKind::Agent);
        if let Some(extra) = extra {
            node = node.with_extra(extra);
        }
        let (id, _) = self.insert_node(node, new_version)?;
        Ok(AgentRef::new(id))
    }

    // === Relations ===

    pub fn started_at_time(&mut self, activity: &ActivityRef, at: DateTime<Utc>) -> ProvResult<()> {
        self.apply(Relation::StartedAtTime {
            activity: activity.id().clone(),
            at,
        })
    }

    pub fn ended_at_time(&mut self, activity: &ActivityRef, at: DateTime<Utc>) -> ProvResult<()> {
        self.apply(Relation::EndedAtTime {
            activity: activity.id().clone(),
            at,
        })
    }

    pub fn was_associated_with(&mut self, activity: &ActivityRef, agent: &AgentRef) -> ProvResult<()> {
        self.apply(Relation::WasAssociatedWith {
            activity: activity.id().clone(),
            agent: agent.id().clone(),
        })
    }

    pub fn used(&mut self, activity: &ActivityRef, entity: &EntityRef) -> ProvResult<()> {
        self.apply(Relation::Used {
            activity: activity.id().clone(),
            entity: entity.id().clone(),
        })
    }

    /// Record that an activity produced an entity.
    ///
    /// Accepts `(&activity, &entity)` or `(&entity, &activity)`.
    pub fn generated(&mut self, operands: impl Into<Generation>) -> ProvResult<()> {
        let Generation { producer, product } = operands.into();
        self.apply(Relation::Generated {
            producer: producer.id().clone(),
            product: product.id().clone(),
        })
    }

    pub fn was_derived_from(&mut self, derived: &EntityRef, source: &EntityRef) -> ProvResult<()> {
        self.apply(Relation::WasDerivedFrom {
            derived: derived.id().clone(),
            source: source.id().clone(),
        })
    }

    // === Queries ===

    /// Look up a node by short or full identifier
    pub fn node(&self, id: &str) -> Option<&ProvNode> {
        self.nodes.get(&self.resolve(id))
    }

    pub fn get(&self, id: &NodeId) -> Option<&ProvNode> {
        self.nodes.get(id)
    }

    pub fn entity(&self, id: &str) -> Option<EntityRef> {
        self.typed(id, NodeKind::Entity).map(EntityRef::new)
    }

    pub fn activity(&self, id: &str) -> Option<ActivityRef> {
        self.typed(id, NodeKind::Activity).map(ActivityRef::new)
    }

    pub fn agent(&self, id: &str) -> Option<AgentRef> {
        self.typed(id, NodeKind::Agent).map(AgentRef::new)
    }

    /// All nodes in IRI order
    pub fn nodes(&self) -> impl Iterator<Item = &ProvNode> {
        self.nodes.values()
    }

    /// All relations in recording order
    pub fn relations(&self) -> &[Relation] {
        &self.relations
    }

    /// Relations referencing a node in any role
    pub fn relations_of<'a>(&'a self, id: &'a NodeId) -> impl Iterator<Item = &'a Relation> + 'a {
        self.relations.iter().filter(move |r| r.touches(id))
    }

    pub fn relations_of_kind(&self, kind: RelationKind) -> impl Iterator<Item = &Relation> {
        self.relations.iter().filter(move |r| r.kind() == kind)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn count(&self, kind: NodeKind) -> usize {
        self.nodes.values().filter(|n| n.kind == kind).count()
    }

    pub fn relation_count(&self) -> usize {
        self.relations.len()
    }

    /// Current end of the graph's history
    pub fn mark(&self) -> GraphMark {
        GraphMark {
            nodes: self.arrival.len(),
            relations: self.relations.len(),
        }
    }

    /// Nodes added after `mark`, in the order they were added
    pub fn nodes_since(&self, mark: GraphMark) -> impl Iterator<Item = &ProvNode> {
        let start = mark.nodes.min(self.arrival.len());
        self.arrival[start..].iter().filter_map(|id| self.nodes.get(id))
    }

    /// Relations added after `mark`, in recording order
    pub fn relations_since(&self, mark: GraphMark) -> &[Relation] {
        &self.relations[mark.relations.min(self.relations.len())..]
    }

    /// Recorded start and end of an activity
    pub fn activity_times(&self, activity: &NodeId) -> ActivityTimes {
        self.times.get(activity).copied().unwrap_or_default()
    }

    /// Activities recorded as producing an entity
    pub fn generated_by(&self, entity: &EntityRef) -> Vec<ActivityRef> {
        self.relations
            .iter()
            .filter_map(|r| match r {
                Relation::Generated { producer, product } if product == entity.id() => {
                    Some(ActivityRef::new(producer.clone()))
                }
                _ => None,
            })
            .collect()
    }

    /// Every entity the given one was derived from, nearest first
    pub fn derivation_chain(&self, entity: &EntityRef) -> Vec<NodeId> {
        let mut chain = Vec::new();
        let mut visited: HashSet<&NodeId> = HashSet::new();
        let mut queue: VecDeque<&NodeId> = VecDeque::new();
        visited.insert(entity.id());
        queue.push_back(entity.id());

        while let Some(current) = queue.pop_front() {
            for relation in &self.relations {
                if let Relation::WasDerivedFrom { derived, source } = relation {
                    if derived == current && visited.insert(source) {
                        chain.push(source.clone());
                        queue.push_back(source);
                    }
                }
            }
        }
        chain
    }

    // === Internals ===

    /// Validate and append a relation; identical relations are stored once
    fn apply(&mut self, relation: Relation) -> ProvResult<()> {
        match &relation {
            Relation::StartedAtTime { activity, at } => {
                self.require(activity, NodeKind::Activity)?;
                if let Some(started) = self.activity_times(activity).started {
                    if started == *at {
                        return Ok(());
                    }
                    return Err(ordering(activity, TimingViolation::AlreadyStarted(started)));
                }
            }
            Relation::EndedAtTime { activity, at } => {
                self.require(activity, NodeKind::Activity)?;
                let times = self.activity_times(activity);
                if let Some(ended) = times.ended {
                    return Err(ordering(activity, TimingViolation::AlreadyEnded(ended)));
                }
                match times.started {
                    None => return Err(ordering(activity, TimingViolation::NotStarted)),
                    Some(started) if *at < started => {
                        return Err(ordering(
                            activity,
                            TimingViolation::EndBeforeStart { started, ended: *at },
                        ));
                    }
                    Some(_) => {}
                }
            }
            Relation::WasAssociatedWith { activity, agent } => {
                self.require(activity, NodeKind::Activity)?;
                self.require(agent, NodeKind::Agent)?;
            }
            Relation::Used { activity, entity } => {
                self.require(activity, NodeKind::Activity)?;
                self.require(entity, NodeKind::Entity)?;
            }
            Relation::Generated { producer, product } => {
                self.require(producer, NodeKind::Activity)?;
                self.require(product, NodeKind::Entity)?;
            }
            Relation::WasDerivedFrom { derived, source } => {
                if derived == source {
                    return Err(ProvError::SelfDerivation(derived.clone()));
                }
                self.require(derived, NodeKind::Entity)?;
                self.require(source, NodeKind::Entity)?;
            }
        }

        if !self.recorded.insert(relation.clone()) {
            return Ok(());
        }
        match &relation {
            Relation::StartedAtTime { activity, at } => {
                self.times.entry(activity.clone()).or_default().started = Some(*at);
            }
            Relation::EndedAtTime { activity, at } => {
                self.times.entry(activity.clone()).or_default().ended = Some(*at);
            }
            _ => {}
        }
        self.relations.push(relation);
        Ok(())
    }

    /// Insert a node, returning its id and, for a new version, the version it supersedes
    fn insert_node(&mut self, mut node: ProvNode, new_version: bool) -> ProvResult<(NodeId, Option<NodeId>)> {
        let Some(existing) = self.nodes.get(&node.id) else {
            let id = node.id.clone();
            self.push_node(node);
            return Ok((id, None));
        };
        if existing.kind != node.kind {
            return Err(ProvError::KindMismatch {
                id: node.id,
                expected: node.kind,
                found: existing.kind,
            });
        }
        if !new_version {
            return Ok((node.id, None));
        }

        let previous = self.latest_version(&node.id);
        let version = self.nodes.get(&previous).map(|n| n.version).unwrap_or(1) + 1;
        let id = versioned_id(&node.id, version);
        node.id = id.clone();
        node.version = version;
        self.push_node(node);
        Ok((id, Some(previous)))
    }

    fn push_node(&mut self, node: ProvNode) {
        self.arrival.push(node.id.clone());
        self.nodes.insert(node.id.clone(), node);
    }

    fn latest_version(&self, base: &NodeId) -> NodeId {
        let mut latest = base.clone();
        let mut version = 2;
        loop {
            let candidate = versioned_id(base, version);
            if !self.nodes.contains_key(&candidate) {
                return latest;
            }
            latest = candidate;
            version += 1;
        }
    }

    fn require(&self, id: &NodeId, kind: NodeKind) -> ProvResult<&ProvNode> {
        let node = self
            .nodes
            .get(id)
            .ok_or_else(|| ProvError::InvalidReference(id.clone()))?;
        if node.kind != kind {
            return Err(ProvError::KindMismatch {
                id: id.clone(),
                expected: kind,
                found: node.kind,
            });
        }
        Ok(node)
    }

    fn typed(&self, id: &str, kind: NodeKind) -> Option<NodeId> {
        self.node(id).filter(|n| n.kind == kind).map(|n| n.id.clone())
    }
}

/// IRI of a later version of a node
fn versioned_id(base: &NodeId, version: u32) -> NodeId {
    NodeId::from_string(format!("{}?version={}", base, version))
}

fn ordering(activity: &NodeId, violation: TimingViolation) -> ProvError {
    ProvError::OrderingViolation {
        activity: activity.clone(),
        violation,
    }
}
