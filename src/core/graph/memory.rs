//! In-memory arena graph
//!
//! Nodes live in a slot vector addressed by dense [`NodeId`] handles, with a
//! name -> handle table in front. Adjacency is kept as ordered handle sets so
//! traversal order is deterministic. Removed slots are recycled.

use super::{Graph, GraphMut, Node, NodeType, Properties, PC_PROPERTY, REP_PROPERTY};
use crate::core::operations::OperationSet;
use crate::error::{NgacError, Result};
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct NodeId(u32);

impl NodeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone)]
struct Vertex {
    node: Node,
    parents: BTreeSet<NodeId>,
    children: BTreeSet<NodeId>,
    /// Associations where this vertex is the source
    outgoing: BTreeMap<NodeId, OperationSet>,
    /// Sources of associations targeting this vertex
    incoming: BTreeSet<NodeId>,
}

impl Vertex {
    fn new(node: Node) -> Self {
        Vertex {
            node,
            parents: BTreeSet::new(),
            children: BTreeSet::new(),
            outgoing: BTreeMap::new(),
            incoming: BTreeSet::new(),
        }
    }
}

/// In-memory authorization graph
#[derive(Debug, Clone, Default)]
pub struct MemGraph {
    slots: Vec<Option<Vertex>>,
    free: Vec<NodeId>,
    index: AHashMap<String, NodeId>,
}

impl MemGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes in the graph
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    fn id(&self, name: &str) -> Result<NodeId> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| NgacError::NodeNotFound(name.to_string()))
    }

    fn vertex(&self, id: NodeId) -> Option<&Vertex> {
        self.slots.get(id.index()).and_then(Option::as_ref)
    }

    fn vertex_mut(&mut self, id: NodeId) -> Option<&mut Vertex> {
        self.slots.get_mut(id.index()).and_then(Option::as_mut)
    }

    fn lookup(&self, name: &str) -> Result<(NodeId, &Vertex)> {
        let id = self.id(name)?;
        self.vertex(id)
            .map(|v| (id, v))
            .ok_or_else(|| NgacError::NodeNotFound(name.to_string()))
    }

    fn names<'a, I>(&self, ids: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a NodeId>,
    {
        ids.into_iter()
            .filter_map(|id| self.vertex(*id))
            .map(|v| v.node.name.clone())
            .collect()
    }

    fn live_vertices(&self) -> impl Iterator<Item = &Vertex> {
        self.slots.iter().filter_map(Option::as_ref)
    }

    /// Place a node in a free slot without any validation
    fn insert_vertex(&mut self, node: Node) -> NodeId {
        let name = node.name.clone();
        let vertex = Vertex::new(node);
        let id = match self.free.pop() {
            Some(id) => {
                self.slots[id.index()] = Some(vertex);
                id
            }
            None => {
                let id = NodeId(self.slots.len() as u32);
                self.slots.push(Some(vertex));
                id
            }
        };
        self.index.insert(name, id);
        id
    }

    fn link(&mut self, child: NodeId, parent: NodeId) {
        if let Some(v) = self.vertex_mut(child) {
            v.parents.insert(parent);
        }
        if let Some(v) = self.vertex_mut(parent) {
            v.children.insert(child);
        }
    }

    /// True if `needle` is `start` or one of its ancestors
    fn reaches_upward(&self, start: NodeId, needle: NodeId) -> bool {
        let mut visited = BTreeSet::new();
        let mut queue = VecDeque::from([start]);
        while let Some(id) = queue.pop_front() {
            if id == needle {
                return true;
            }
            if !visited.insert(id) {
                continue;
            }
            if let Some(v) = self.vertex(id) {
                queue.extend(v.parents.iter().copied());
            }
        }
        false
    }

    /// Export nodes and edges as a serializable snapshot
    pub fn snapshot(&self) -> GraphSnapshot {
        let mut snapshot = GraphSnapshot::default();
        for vertex in self.live_vertices() {
            snapshot.nodes.push(vertex.node.clone());
            for parent in self.names(&vertex.parents) {
                snapshot.assignments.push(Assignment {
                    child: vertex.node.name.clone(),
                    parent,
                });
            }
            for (target, operations) in &vertex.outgoing {
                if let Some(t) = self.vertex(*target) {
                    snapshot.associations.push(Association {
                        ua: vertex.node.name.clone(),
                        target: t.node.name.clone(),
                        operations: operations.clone(),
                    });
                }
            }
        }
        snapshot
    }

    /// Rebuild a graph from a snapshot, validating every edge
    ///
    /// Policy classes are restored as-is: their representatives are expected to be
    /// part of the snapshot rather than recreated.
    pub fn from_snapshot(snapshot: GraphSnapshot) -> Result<Self> {
        let mut graph = MemGraph::new();
        for node in snapshot.nodes {
            if node.name.is_empty() {
                return Err(NgacError::EmptyName);
            }
            if graph.exists(&node.name) {
                return Err(NgacError::DuplicateName(node.name));
            }
            graph.insert_vertex(node);
        }
        for Assignment { child, parent } in &snapshot.assignments {
            graph.assign(child, parent)?;
        }
        for Association {
            ua,
            target,
            operations,
        } in snapshot.associations
        {
            graph.associate(&ua, &target, operations)?;
        }
        debug!("Restored graph with {} nodes", graph.len());
        Ok(graph)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.snapshot())?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Self::from_snapshot(serde_json::from_str(json)?)
    }
}

impl Graph for MemGraph {
    fn exists(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    fn node(&self, name: &str) -> Result<&Node> {
        self.lookup(name).map(|(_, v)| &v.node)
    }

    fn nodes(&self) -> Vec<&Node> {
        self.live_vertices().map(|v| &v.node).collect()
    }

    fn policy_classes(&self) -> Vec<String> {
        self.live_vertices()
            .filter(|v| v.node.node_type == NodeType::PolicyClass)
            .map(|v| v.node.name.clone())
            .collect()
    }

    fn parents(&self, name: &str) -> Result<Vec<String>> {
        let (_, v) = self.lookup(name)?;
        Ok(self.names(&v.parents))
    }

    fn children(&self, name: &str) -> Result<Vec<String>> {
        let (_, v) = self.lookup(name)?;
        Ok(self.names(&v.children))
    }

    fn source_associations(&self, name: &str) -> Result<BTreeMap<String, OperationSet>> {
        let (_, v) = self.lookup(name)?;
        Ok(v.outgoing
            .iter()
            .filter_map(|(target, ops)| {
                self.vertex(*target)
                    .map(|t| (t.node.name.clone(), ops.clone()))
            })
            .collect())
    }

    fn target_associations(&self, name: &str) -> Result<BTreeMap<String, OperationSet>> {
        let (id, v) = self.lookup(name)?;
        Ok(v.incoming
            .iter()
            .filter_map(|source| self.vertex(*source))
            .filter_map(|s| {
                s.outgoing
                    .get(&id)
                    .map(|ops| (s.node.name.clone(), ops.clone()))
            })
            .collect())
    }

    fn search(&self, node_type: Option<NodeType>, properties: &Properties) -> Vec<&Node> {
        self.live_vertices()
            .map(|v| &v.node)
            .filter(|n| node_type.map_or(true, |t| n.node_type == t))
            .filter(|n| n.matches_properties(properties))
            .collect()
    }

    fn is_assigned(&self, child: &str, parent: &str) -> Result<bool> {
        let (_, c) = self.lookup(child)?;
        let parent = self.id(parent)?;
        Ok(c.parents.contains(&parent))
    }
}

impl GraphMut for MemGraph {
    fn create_policy_class(&mut self, name: &str, mut properties: Properties) -> Result<Node> {
        if name.is_empty() {
            return Err(NgacError::EmptyName);
        }
        let rep = format!("{}_rep", name);
        for taken in [name, rep.as_str()] {
            if self.exists(taken) {
                return Err(NgacError::DuplicateName(taken.to_string()));
            }
        }

        properties.insert(REP_PROPERTY.to_string(), rep.clone());
        let pc = Node::new(name, NodeType::PolicyClass, properties);
        let pc_id = self.insert_vertex(pc.clone());

        let mut rep_properties = Properties::new();
        rep_properties.insert(PC_PROPERTY.to_string(), name.to_string());
        let rep_id = self.insert_vertex(Node::new(
            rep.as_str(),
            NodeType::ObjectAttribute,
            rep_properties,
        ));
        self.link(rep_id, pc_id);

        debug!("Created policy class {} (rep {})", name, rep);
        Ok(pc)
    }

    fn create_node(
        &mut self,
        name: &str,
        node_type: NodeType,
        properties: Properties,
        parent: &str,
        additional_parents: &[&str],
    ) -> Result<Node> {
        if name.is_empty() {
            return Err(NgacError::EmptyName);
        }
        if node_type == NodeType::PolicyClass {
            return Err(NgacError::InvalidType {
                name: name.to_string(),
                node_type,
            });
        }
        if self.exists(name) {
            return Err(NgacError::DuplicateName(name.to_string()));
        }

        // Validate every parent before touching the graph
        let mut parent_ids = Vec::with_capacity(1 + additional_parents.len());
        for parent_name in std::iter::once(parent).chain(additional_parents.iter().copied()) {
            let (id, p) = self.lookup(parent_name)?;
            if !node_type.can_assign_to(p.node.node_type) {
                return Err(NgacError::InvalidAssignment {
                    child: name.to_string(),
                    parent: parent_name.to_string(),
                });
            }
            if parent_ids.contains(&id) {
                return Err(NgacError::DuplicateEdge {
                    child: name.to_string(),
                    parent: parent_name.to_string(),
                });
            }
            parent_ids.push(id);
        }

        let node = Node::new(name, node_type, properties);
        let id = self.insert_vertex(node.clone());
        for parent_id in parent_ids {
            self.link(id, parent_id);
        }

        debug!("Created {} node {}", node_type, name);
        Ok(node)
    }

    fn update_node(&mut self, name: &str, mut properties: Properties) -> Result<()> {
        let id = self.id(name)?;
        let vertex = self
            .vertex_mut(id)
            .ok_or_else(|| NgacError::NodeNotFound(name.to_string()))?;
        if vertex.node.node_type == NodeType::PolicyClass {
            if let Some(rep) = vertex.node.properties.get(REP_PROPERTY) {
                properties.insert(REP_PROPERTY.to_string(), rep.clone());
            }
        }
        vertex.node.properties = properties;
        debug!("Updated properties of {}", name);
        Ok(())
    }

    fn remove_node(&mut self, name: &str) -> Result<()> {
        let id = self.id(name)?;
        let vertex = match self.slots.get_mut(id.index()).and_then(Option::take) {
            Some(v) => v,
            None => return Err(NgacError::NodeNotFound(name.to_string())),
        };
        if !vertex.children.is_empty() {
            warn!(
                "Removing {} while {} node(s) are still assigned to it",
                name,
                vertex.children.len()
            );
        }

        for parent in &vertex.parents {
            if let Some(p) = self.vertex_mut(*parent) {
                p.children.remove(&id);
            }
        }
        for child in &vertex.children {
            if let Some(c) = self.vertex_mut(*child) {
                c.parents.remove(&id);
            }
        }
        for target in vertex.outgoing.keys() {
            if let Some(t) = self.vertex_mut(*target) {
                t.incoming.remove(&id);
            }
        }
        for source in &vertex.incoming {
            if let Some(s) = self.vertex_mut(*source) {
                s.outgoing.remove(&id);
            }
        }

        self.index.remove(name);
        self.free.push(id);
        debug!("Removed node {}", name);
        Ok(())
    }

    fn assign(&mut self, child: &str, parent: &str) -> Result<()> {
        let (child_id, c) = self.lookup(child)?;
        let (parent_id, p) = self.lookup(parent)?;
        if c.parents.contains(&parent_id) {
            return Err(NgacError::DuplicateEdge {
                child: child.to_string(),
                parent: parent.to_string(),
            });
        }
        // child -> parent closes a cycle if child is already above parent
        if !c.node.node_type.can_assign_to(p.node.node_type)
            || self.reaches_upward(parent_id, child_id)
        {
            return Err(NgacError::InvalidAssignment {
                child: child.to_string(),
                parent: parent.to_string(),
            });
        }
        self.link(child_id, parent_id);
        debug!("Assigned {} -> {}", child, parent);
        Ok(())
    }

    fn deassign(&mut self, child: &str, parent: &str) -> Result<()> {
        let child_id = self.id(child)?;
        let parent_id = self.id(parent)?;
        if let Some(c) = self.vertex_mut(child_id) {
            c.parents.remove(&parent_id);
        }
        if let Some(p) = self.vertex_mut(parent_id) {
            p.children.remove(&child_id);
        }
        debug!("Deassigned {} -> {}", child, parent);
        Ok(())
    }

    fn associate(&mut self, ua: &str, target: &str, operations: OperationSet) -> Result<()> {
        let (ua_id, source) = self.lookup(ua)?;
        let source_type = source.node.node_type;
        let (target_id, t) = self.lookup(target)?;
        if !source_type.can_associate_with(t.node.node_type) {
            return Err(NgacError::InvalidAssociation {
                ua: ua.to_string(),
                target: target.to_string(),
            });
        }

        debug!("Associated {} -> {} with {}", ua, target, operations);
        if let Some(s) = self.vertex_mut(ua_id) {
            s.outgoing.insert(target_id, operations);
        }
        if let Some(t) = self.vertex_mut(target_id) {
            t.incoming.insert(ua_id);
        }
        Ok(())
    }

    fn dissociate(&mut self, ua: &str, target: &str) -> Result<()> {
        let ua_id = self.id(ua)?;
        let target_id = self.id(target)?;
        if let Some(s) = self.vertex_mut(ua_id) {
            s.outgoing.remove(&target_id);
        }
        if let Some(t) = self.vertex_mut(target_id) {
            t.incoming.remove(&ua_id);
        }
        debug!("Dissociated {} -> {}", ua, target);
        Ok(())
    }
}

/// Serialized form of an assignment edge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub child: String,
    pub parent: String,
}

/// Serialized form of an association edge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Association {
    pub ua: String,
    pub target: String,
    pub operations: OperationSet,
}

/// Serializable graph contents
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub assignments: Vec<Assignment>,
    #[serde(default)]
    pub associations: Vec<Association>,
}
