///! BSP tree declaration module

use crate::{
    brush::BspBrush,
    contents::Contents,
    geom::BoundBox,
    math::Vec3d,
    plane::{PlaneNum, PlaneRegistry},
    portal::Portal,
    MapBrushId,
    NodeId,
    PortalId,
};

/// Brush fragment partitioning
pub mod builder;

/// World block partitioning
pub mod blocks;

/// Decision node part
#[derive(Copy, Clone, Debug)]
pub struct Split {
    /// Splitter plane, always positive-facing one of the pair
    pub plane: PlaneNum,

    /// Front and back children
    pub children: [NodeId; 2],

    /// Node was split by a detail or non-visible plane, it doesn't separate clusters
    pub detail_separator: bool,

    /// Map brush side the plane was chosen from, block separators have no one
    pub side: Option<(MapBrushId, usize)>,
}

/// BSP tree node (or leaf)
#[derive(Clone, Debug, Default)]
pub struct Node {
    /// Parent node, `None` for head and outside ones
    pub parent: Option<NodeId>,

    /// Split, `None` for leafs
    pub split: Option<Split>,

    /// Leaf contents
    pub contents: Contents,

    /// Brush fragments that ended in the leaf
    pub brushes: Vec<BspBrush>,

    /// Portals bounding the node
    pub portals: Vec<PortalId>,

    /// Bounds of node portals
    pub bounds: BoundBox,

    /// Flood distance from some entity, 0 if unreached
    pub occupied: u32,

    /// Entity that is located in the leaf
    pub occupant: Option<usize>,

    /// Visibility cluster
    pub cluster: Option<u32>,

    /// Area
    pub area: Option<u32>,
}

impl Node {
    /// Build leaf with some contents
    pub fn leaf(parent: Option<NodeId>, contents: Contents) -> Self {
        Self { parent, contents, ..Default::default() }
    }

    /// Check if node is leaf
    pub fn is_leaf(&self) -> bool {
        self.split.is_none()
    }

    /// Node children, if node is decision one
    pub fn children(&self) -> Option<[NodeId; 2]> {
        self.split.map(|split| split.children)
    }

    /// Check if leaf is completely solid
    pub fn is_solid(&self) -> bool {
        self.contents == Contents::SOLID
    }
}

/// Shift node ids of some subtree to place it after `offset` nodes
fn shift_node(node: &mut Node, offset: usize) {
    let shift = |id: NodeId| NodeId::from_index(id.into_index() + offset);

    node.parent = node.parent.map(shift);
    if let Some(split) = &mut node.split {
        split.children = split.children.map(shift);
    }
}

/// BSP tree with portals between its leafs
#[derive(Clone, Debug)]
pub struct Tree {
    /// Tree nodes, the outside node included
    pub nodes: Vec<Node>,

    /// Portals, `None` for removed ones
    pub portals: Vec<Option<Portal>>,

    /// Root node
    pub head: NodeId,

    /// Node that represents the void around the tree
    pub outside: NodeId,

    /// Bounds of the space tree covers
    pub bounds: BoundBox,
}

impl Tree {
    /// Build tree that holds the outside node only, the head must be set by caller
    pub fn new(bounds: BoundBox) -> Self {
        Self {
            nodes: vec![Node::leaf(None, Contents::empty())],
            portals: Vec::new(),
            head: NodeId::from_index(0),
            outside: NodeId::from_index(0),
            bounds,
        }
    }

    /// Build tree from standalone node set, first node is the head
    pub fn from_nodes(nodes: Vec<Node>, bounds: BoundBox) -> Self {
        let mut tree = Self::new(bounds);
        tree.head = tree.graft(nodes);
        tree
    }

    /// Add node to tree
    pub fn push_node(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId::from_index(self.nodes.len() - 1)
    }

    /// Append standalone node set (with ids local to the set), returns id of its first node
    pub fn graft(&mut self, nodes: Vec<Node>) -> NodeId {
        let offset = self.nodes.len();

        self.nodes.extend(nodes.into_iter().map(|mut node| {
            shift_node(&mut node, offset);
            node
        }));

        NodeId::from_index(offset)
    }

    /// Get node by id
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.into_index()]
    }

    /// Get mutable node by id
    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.into_index()]
    }

    /// Get portal by id, `None` if the portal was removed
    pub fn get_portal(&self, id: PortalId) -> Option<&Portal> {
        self.portals.get(id.into_index())?.as_ref()
    }

    /// Get portal by id. Removed portals are unlinked from both their nodes,
    /// so ids taken from `Node::portals` are always live. Panics on a removed one.
    pub fn portal(&self, id: PortalId) -> &Portal {
        self.get_portal(id)
            .unwrap_or_else(|| panic!("portal {} was removed", id.into_index()))
    }

    /// Get mutable portal by id, panics on removed portal as `portal` does
    pub fn portal_mut(&mut self, id: PortalId) -> &mut Portal {
        self.portals[id.into_index()]
            .as_mut()
            .unwrap_or_else(|| panic!("portal {} was removed", id.into_index()))
    }

    /// Iterate all live portals
    pub fn iter_portals(&self) -> impl Iterator<Item = (PortalId, &Portal)> {
        self.portals
            .iter()
            .enumerate()
            .filter_map(|(index, portal)| portal.as_ref().map(|portal| (PortalId::from_index(index), portal)))
    }

    /// Find leaf point is located in
    pub fn leaf_for_point(&self, planes: &PlaneRegistry, point: Vec3d) -> NodeId {
        let mut id = self.head;

        while let Some(split) = self.node(id).split {
            let d = planes.plane(split.plane).distance_to(point);
            id = if d >= 0.0 { split.children[0] } else { split.children[1] };
        }

        id
    }

    /// Collect leafs of the subtree, front ones first
    pub fn subtree_leafs(&self, root: NodeId) -> Vec<NodeId> {
        let mut leafs = Vec::new();
        let mut stack = vec![root];

        while let Some(id) = stack.pop() {
            match self.node(id).children() {
                Some([front, back]) => {
                    stack.push(back);
                    stack.push(front);
                }
                None => leafs.push(id),
            }
        }

        leafs
    }

    /// Collect all tree leafs, outside node excluded
    pub fn leafs(&self) -> Vec<NodeId> {
        self.subtree_leafs(self.head)
    }

    /// Count of decision nodes and leafs
    pub fn node_stats(&self) -> (usize, usize) {
        let leafs = self.leafs().len();
        (leafs.saturating_sub(1), leafs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vec3d;

    /// Head split by x = 0, front child split by y = 0
    fn small_tree(planes: &mut PlaneRegistry) -> Tree {
        let x = planes.find_plane(vec3d!(1.0, 0.0, 0.0), 0.0).unwrap();
        let y = planes.find_plane(vec3d!(0.0, 1.0, 0.0), 0.0).unwrap();

        let local = NodeId::from_index;
        let nodes = vec![
            Node { split: Some(Split { plane: x, children: [local(1), local(2)], detail_separator: false, side: None }), ..Default::default() },
            Node { parent: Some(local(0)), split: Some(Split { plane: y, children: [local(3), local(4)], detail_separator: false, side: None }), ..Default::default() },
            Node::leaf(Some(local(0)), Contents::SOLID),
            Node::leaf(Some(local(1)), Contents::empty()),
            Node::leaf(Some(local(1)), Contents::WATER),
        ];

        Tree::from_nodes(nodes, BoundBox::from_minmax(vec3d!(-64.0, -64.0, -64.0), vec3d!(64.0, 64.0, 64.0)))
    }

    #[test]
    fn grafted_ids_are_shifted() {
        let mut planes = PlaneRegistry::new(64);
        let tree = small_tree(&mut planes);

        assert_eq!(tree.head, NodeId::from_index(1));
        assert_eq!(tree.node(tree.head).children(), Some([NodeId::from_index(2), NodeId::from_index(3)]));
        assert_eq!(tree.node(NodeId::from_index(4)).parent, Some(NodeId::from_index(2)));
        assert!(tree.node(tree.outside).is_leaf());
    }

    #[test]
    fn removed_portals_are_skipped() {
        let mut planes = PlaneRegistry::new(64);
        let mut tree = small_tree(&mut planes);
        tree.portals.push(None);

        assert!(tree.get_portal(PortalId::from_index(0)).is_none());
        assert!(tree.get_portal(PortalId::from_index(1)).is_none());
        assert_eq!(tree.iter_portals().count(), 0);
    }

    #[test]
    fn point_location() {
        let mut planes = PlaneRegistry::new(64);
        let tree = small_tree(&mut planes);

        let water = tree.leaf_for_point(&planes, vec3d!(8.0, -8.0, 0.0));
        assert_eq!(tree.node(water).contents, Contents::WATER);

        // points on the plane go to the front
        let on_plane = tree.leaf_for_point(&planes, vec3d!(0.0, 0.0, 0.0));
        assert_eq!(tree.node(on_plane).contents, Contents::empty());

        assert!(tree.node(tree.leaf_for_point(&planes, vec3d!(-8.0, 8.0, 0.0))).is_solid());
        assert_eq!(tree.leafs(), vec![NodeId::from_index(4), NodeId::from_index(5), NodeId::from_index(3)]);
    }
}

// mod.rs
