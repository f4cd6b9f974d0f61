//! Node arena
//!
//! Nodes live in one `Vec` and refer to each other by [`NodeId`]. A node's
//! global transform is fixed when it is inserted, so parents must be inserted
//! before their children (depth-first load order guarantees this).

use crate::foundation::math::Mat4;

/// Index of a node in its [`NodeGraph`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

/// One node of the loaded hierarchy
#[derive(Debug, Clone, PartialEq)]
pub struct SceneNode {
    /// Parent, `None` for scene roots
    pub parent: Option<NodeId>,
    /// Children in asset order
    pub children: Vec<NodeId>,
    /// Index of the mesh instance this node draws
    pub mesh_instance: Option<usize>,
    /// Transform relative to the parent
    pub local_transform: Mat4,
    /// Transform relative to the scene root: `parent.global * local`
    pub global_transform: Mat4,
    /// Node index in the source asset
    pub source_index: usize,
}

/// Arena of scene nodes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeGraph {
    nodes: Vec<SceneNode>,
    roots: Vec<NodeId>,
}

impl NodeGraph {
    /// Empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node under `parent` (or as a root) and compute its global
    /// transform. An unknown parent id is treated as a root.
    pub fn insert(&mut self, parent: Option<NodeId>, local_transform: Mat4, source_index: usize) -> NodeId {
        let id = NodeId(self.nodes.len());
        let parent = parent.filter(|p| p.0 < self.nodes.len());

        let global_transform = match parent {
            Some(p) => self.nodes[p.0].global_transform * local_transform,
            None => local_transform,
        };

        self.nodes.push(SceneNode {
            parent,
            children: Vec::new(),
            mesh_instance: None,
            local_transform,
            global_transform,
            source_index,
        });

        match parent {
            Some(p) => self.nodes[p.0].children.push(id),
            None => self.roots.push(id),
        }
        id
    }

    /// Attach a mesh instance to a node
    pub fn set_mesh_instance(&mut self, id: NodeId, mesh_instance: usize) {
        if let Some(node) = self.nodes.get_mut(id.0) {
            node.mesh_instance = Some(mesh_instance);
        }
    }

    /// Node by id
    pub fn get(&self, id: NodeId) -> Option<&SceneNode> {
        self.nodes.get(id.0)
    }

    /// Root nodes of the loaded scene
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph holds no nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in insertion (depth-first) order
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &SceneNode)> {
        self.nodes.iter().enumerate().map(|(i, node)| (NodeId(i), node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{Point3, Vec3};
    use approx::assert_relative_eq;

    #[test]
    fn test_child_global_is_parent_then_local() {
        let mut graph = NodeGraph::new();
        let root = graph.insert(None, Mat4::identity(), 0);
        let child = graph.insert(Some(root), Mat4::new_translation(&Vec3::new(1.0, 0.0, 0.0)), 1);

        let origin = graph.get(child).unwrap().global_transform.transform_point(&Point3::origin());
        assert_relative_eq!(origin.x, 1.0);
        assert_relative_eq!(origin.y, 0.0);
        assert_eq!(graph.get(root).unwrap().children, vec![child]);
        assert_eq!(graph.roots(), &[root]);
    }

    #[test]
    fn test_parent_transform_applies_after_child() {
        let mut graph = NodeGraph::new();
        let parent = graph.insert(None, Mat4::new_scaling(2.0), 0);
        let child = graph.insert(Some(parent), Mat4::new_translation(&Vec3::new(1.0, 0.0, 0.0)), 1);

        // Translate by 1, then scale by 2
        let point = graph.get(child).unwrap().global_transform.transform_point(&Point3::origin());
        assert_relative_eq!(point.x, 2.0);
    }
}
