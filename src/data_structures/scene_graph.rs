//! Scene graph and hierarchical scene organization.
//!
//! Nodes live in a flat arena and refer to each other by index. A node has a
//! local transform relative to its parent; world matrices are propagated from
//! the roots down whenever [`SceneGraph::update_world_transforms`] runs, which
//! the viewer does once per frame after applying the animation pose.

use cgmath::{Matrix4, SquareMatrix};
use log::warn;

use crate::{animation::Pose, data_structures::instance::Instance};

/// Index of a node in its [`SceneGraph`].
pub type NodeId = usize;

#[derive(Clone, Debug)]
pub struct SceneNode {
    pub name: String,
    /// Rest transform relative to the parent.
    pub local: Instance,
    /// Transform used for the current frame (rest transform with the animation pose applied).
    pub animated: Instance,
    world: Matrix4<f32>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    /// Index of the drawable attached to this node, if any.
    pub mesh: Option<usize>,
    /// Index of the skin deforming this node's mesh, if any.
    pub skin: Option<usize>,
}

impl SceneNode {
    pub fn new(name: impl Into<String>, local: Instance) -> Self {
        Self {
            name: name.into(),
            local,
            animated: local,
            world: Matrix4::identity(),
            parent: None,
            children: Vec::new(),
            mesh: None,
            skin: None,
        }
    }

    pub fn with_mesh(mut self, mesh: usize) -> Self {
        self.mesh = Some(mesh);
        self
    }

    pub fn world(&self) -> Matrix4<f32> {
        self.world
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

#[derive(Clone, Debug, Default)]
pub struct SceneGraph {
    nodes: Vec<SceneNode>,
    roots: Vec<NodeId>,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `node` below `parent` (or as a root) and returns its id.
    pub fn add_node(&mut self, mut node: SceneNode, parent: Option<NodeId>) -> NodeId {
        let id = self.nodes.len();
        node.parent = None;
        node.children.clear();
        match parent {
            Some(p) if p < self.nodes.len() => {
                node.parent = Some(p);
                self.nodes[p].children.push(id);
            }
            Some(p) => {
                warn!("Parent node {p} does not exist, adding node {} as a root.", node.name);
                self.roots.push(id);
            }
            None => self.roots.push(id),
        }
        self.nodes.push(node);
        id
    }

    /// Moves `child` (and its subtree) below `parent`. Fails when either id is
    /// unknown or when `parent` lies inside the subtree of `child`.
    pub fn attach(&mut self, child: NodeId, parent: NodeId) -> anyhow::Result<()> {
        anyhow::ensure!(
            child < self.nodes.len() && parent < self.nodes.len(),
            "cannot attach node {child} to node {parent}: unknown node"
        );
        let mut cursor = Some(parent);
        while let Some(id) = cursor {
            anyhow::ensure!(id != child, "attaching node {child} to node {parent} would form a cycle");
            cursor = self.nodes[id].parent;
        }
        match self.nodes[child].parent.take() {
            Some(old) => self.nodes[old].children.retain(|&c| c != child),
            None => self.roots.retain(|&r| r != child),
        }
        self.nodes[child].parent = Some(parent);
        self.nodes[parent].children.push(child);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> Option<&SceneNode> {
        self.nodes.get(id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut SceneNode> {
        self.nodes.get_mut(id)
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Visits `start` and all of its descendants depth first, parents before children.
    pub fn traverse(&self, start: NodeId, visit: &mut dyn FnMut(NodeId, &SceneNode)) {
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            let Some(node) = self.nodes.get(id) else {
                continue;
            };
            visit(id, node);
            stack.extend(node.children.iter().rev());
        }
    }

    /// Resets every node in the subtree of `start` to its rest transform and
    /// overlays `pose`. Pose entries are keyed by `offset + pose index`, which
    /// is how imported models are placed into the arena.
    pub fn apply_pose(&mut self, start: NodeId, offset: NodeId, pose: &Pose) {
        let mut ids = Vec::new();
        self.traverse(start, &mut |id, _| ids.push(id));
        for id in ids {
            let node = &mut self.nodes[id];
            node.animated = match id.checked_sub(offset).and_then(|i| pose.get(&i)) {
                Some(p) => node.local.posed(p),
                None => node.local,
            };
        }
    }

    /// Skinning palette for a mesh attached to `mesh_node`:
    /// `inverse(mesh world) * joint world * inverse bind matrix` for every joint.
    /// Call after [`Self::update_world_transforms`].
    pub fn joint_matrices(
        &self,
        mesh_node: NodeId,
        joints: &[NodeId],
        inverse_bind_matrices: &[Matrix4<f32>],
    ) -> Vec<Matrix4<f32>> {
        let mesh_inverse = self
            .nodes
            .get(mesh_node)
            .and_then(|n| n.world.invert())
            .unwrap_or_else(Matrix4::identity);
        joints
            .iter()
            .enumerate()
            .map(|(i, &joint)| {
                let world = self.nodes.get(joint).map_or_else(Matrix4::identity, |n| n.world);
                let inverse_bind = inverse_bind_matrices
                    .get(i)
                    .copied()
                    .unwrap_or_else(Matrix4::identity);
                mesh_inverse * world * inverse_bind
            })
            .collect()
    }

    /// Recomputes world matrices of every node: `parent.world * animated.to_matrix()`.
    pub fn update_world_transforms(&mut self) {
        let mut stack: Vec<(NodeId, Matrix4<f32>)> = self
            .roots
            .iter()
            .rev()
            .map(|&root| (root, Matrix4::identity()))
            .collect();
        while let Some((id, parent_world)) = stack.pop() {
            let node = &mut self.nodes[id];
            node.world = parent_world * node.animated.to_matrix();
            let world = node.world;
            stack.extend(node.children.iter().rev().map(|&child| (child, world)));
        }
    }
}
