//! Whole-tree consistency walk.
//!
//! [`TreeCensus::take`] visits every node reachable from the root and
//! checks the relations `form_tree` is supposed to have established, plus
//! 2:1 balance: across every `Coarser` link the containing node is exactly
//! one level up. Any violation is reported as
//! [`ProtocolError::InconsistentTopology`].

use std::sync::Arc;

use arbor_core::{
    Direction, Face, Link, LocalityId, NodeHandle, NodeLocation, Octant, ProtocolError,
};
use arbor_runtime::Cluster;
use indexmap::{IndexMap, IndexSet};

use crate::error::EngineError;
use crate::node::Node;

/// Shape of the tree as found by a census.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TreeCensus {
    /// Nodes reachable from the root.
    pub nodes: usize,
    /// Reachable nodes without children.
    pub leaves: usize,
    /// Deepest level present.
    pub max_depth: u8,
    /// Reachable nodes per locality, in first-seen order.
    pub per_locality: IndexMap<LocalityId, usize>,
}

fn broken(node: NodeHandle, what: impl std::fmt::Display) -> EngineError {
    ProtocolError::InconsistentTopology {
        reason: format!("{node}: {what}"),
    }
    .into()
}

impl TreeCensus {
    /// Walk the tree under `root` and verify every relation.
    pub fn take(cluster: &Cluster<Node>, root: NodeHandle) -> Result<Self, EngineError> {
        let mut census = TreeCensus::default();
        let mut stack = vec![cluster.resolve(&root)?];
        let mut seen = Vec::new();
        if stack[0].parent().is_some() {
            return Err(broken(root, "root has a parent"));
        }

        while let Some(node) = stack.pop() {
            census.nodes += 1;
            census.max_depth = census.max_depth.max(node.location().level());
            *census.per_locality.entry(node.handle().locality).or_default() += 1;

            match node.children() {
                Some(kids) => {
                    for octant in Octant::ALL {
                        let kid = kids[octant.index()];
                        if kid.location != node.location().get_child(octant)? {
                            return Err(broken(kid, format!("misplaced in octant {octant}")));
                        }
                        let child = cluster.resolve(&kid)?;
                        if child.parent() != Some(node.handle()) {
                            return Err(broken(kid, "parent link does not match"));
                        }
                        stack.push(child);
                    }
                }
                None => census.leaves += 1,
            }

            check_neighbors(cluster, &node)?;
            check_nieces(cluster, &node)?;
            seen.push(node);
        }

        let present: IndexSet<NodeLocation> = seen.iter().map(|n| n.location()).collect();
        for node in &seen {
            check_balance(&present, node)?;
        }

        if census.nodes != cluster.node_count() {
            return Err(ProtocolError::InconsistentTopology {
                reason: format!(
                    "{} nodes reachable but {} registered",
                    census.nodes,
                    cluster.node_count()
                ),
            }
            .into());
        }
        Ok(census)
    }
}

fn check_neighbors(cluster: &Cluster<Node>, node: &Arc<Node>) -> Result<(), EngineError> {
    let here = node.handle();
    for dir in Direction::ALL {
        let expected = node.location().neighbor(dir);
        match (node.neighbor(dir), expected) {
            (Link::DomainEdge, None) | (Link::Coarser, Some(_)) => {}
            (Link::Present(h), Some(loc)) if h.location == loc => {
                if cluster.resolve(&h)?.neighbor(dir.opposite()) != Link::Present(here) {
                    return Err(broken(here, format!("neighbor {dir} is not symmetric")));
                }
            }
            (link, _) => return Err(broken(here, format!("bad link {link:?} toward {dir}"))),
        }
    }
    Ok(())
}

fn check_balance(present: &IndexSet<NodeLocation>, node: &Arc<Node>) -> Result<(), EngineError> {
    for dir in Direction::ALL {
        if node.neighbor(dir) != Link::Coarser {
            continue;
        }
        let coarse = node
            .location()
            .neighbor(dir)
            .and_then(|loc| loc.get_parent());
        if !coarse.is_some_and(|loc| present.contains(&loc)) {
            return Err(broken(node.handle(), format!("level jump above 1 toward {dir}")));
        }
    }
    Ok(())
}

fn check_nieces(cluster: &Cluster<Node>, node: &Arc<Node>) -> Result<(), EngineError> {
    let here = node.handle();
    for face in Face::ALL {
        let nieces = node.nieces(face);
        if !(nieces.is_empty() || nieces.len() == 4) {
            return Err(broken(here, format!("{} nieces on face {face}", nieces.len())));
        }
        for niece in nieces {
            if cluster.resolve(&niece)?.aunt(face.opposite()) != Some(here) {
                return Err(broken(niece, "aunt link does not match"));
            }
        }
    }
    Ok(())
}
