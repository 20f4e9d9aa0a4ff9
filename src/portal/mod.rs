///! Tree portal building module

use crate::{
    bsp::Tree,
    contents::Contents,
    error::{CompileError, Result},
    geom::{BoundBox, Plane},
    math::Vec3d,
    plane::PlaneRegistry,
    session::CompileSession,
    winding::Winding,
    MapBrushId,
    NodeId,
    PortalId,
};

/// Flooding, filling and visible side marking
pub mod flood;

/// Padding around the tree bounds, so there are never null volume leafs
pub const SIDESPACE: f64 = 8.0;

/// Portal clipping epsilon
pub const ON_EPSILON: f64 = 0.1;

/// Base node winding clipping epsilon
pub const BASE_WINDING_EPSILON: f64 = 0.001;

/// Node portal splitting epsilon
pub const SPLIT_WINDING_EPSILON: f64 = 0.001;

/// Nodes with coordinates outside of this range are reported as unbounded
const UNBOUNDED_COORDINATE: f64 = 8000.0;

/// Map brush side a portal is textured by
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PortalSide {
    /// Map brush
    pub brush: MapBrushId,

    /// Side index
    pub side: usize,
}

/// Convex connection between two nodes
#[derive(Clone, Debug)]
pub struct Portal {
    /// Portal plane, front side faces `nodes[0]`
    pub plane: Plane,

    /// Node the portal was created on, `None` for tree bounds
    pub on_node: Option<NodeId>,

    /// Front and back nodes
    pub nodes: [NodeId; 2],

    /// Portal polygon
    pub winding: Winding,

    /// Side search was already done
    pub side_found: bool,

    /// Brush side the portal is covered by
    pub side: Option<PortalSide>,
}

impl Portal {
    fn new(plane: Plane, on_node: Option<NodeId>, winding: Winding) -> Self {
        let unlinked = NodeId::from_index(0);

        Self {
            plane,
            on_node,
            nodes: [unlinked, unlinked],
            winding,
            side_found: false,
            side: None,
        }
    }

    /// Get index of node side, `None` if portal doesn't bound the node
    pub fn node_side(&self, node: NodeId) -> Option<usize> {
        if self.nodes[0] == node {
            Some(0)
        } else if self.nodes[1] == node {
            Some(1)
        } else {
            None
        }
    }

    /// Plane the portal is seen from the node with
    pub fn plane_for_side(&self, side: usize) -> Plane {
        if side == 0 { self.plane } else { self.plane.negate_direction() }
    }
}

impl Tree {
    /// Add portal to portal set, the portal isn't linked to any nodes
    fn add_portal(&mut self, portal: Portal) -> PortalId {
        self.portals.push(Some(portal));
        PortalId::from_index(self.portals.len() - 1)
    }

    /// Link portal to its front and back nodes
    fn link_portal(&mut self, id: PortalId, front: NodeId, back: NodeId) {
        self.portal_mut(id).nodes = [front, back];
        self.node_mut(front).portals.push(id);
        self.node_mut(back).portals.push(id);
    }

    /// Unlink portal from the node
    fn unlink_portal(&mut self, id: PortalId, node: NodeId) {
        self.node_mut(node).portals.retain(|portal| *portal != id);
    }

    /// Remove all portals
    pub fn clear_portals(&mut self) {
        self.portals.clear();
        for node in &mut self.nodes {
            node.portals.clear();
        }
    }

    /// Node on the other side of portal
    pub fn portal_neighbour(&self, id: PortalId, node: NodeId) -> NodeId {
        let portal = self.portal(id);
        if portal.nodes[0] == node { portal.nodes[1] } else { portal.nodes[0] }
    }
}

/// Create portals between the head node and the outside node, they face into the tree
pub fn make_headnode_portals(session: &CompileSession, tree: &mut Tree) -> Result<()> {
    let bounds = tree.bounds.extend(SIDESPACE);
    let (min, max) = (bounds.min(), bounds.max());

    let node = tree.head;
    let outside = tree.outside;
    tree.node_mut(outside).portals.clear();
    tree.node_mut(outside).contents = Contents::empty();

    let mut planes = [Plane::new(Vec3d::zero(), 0.0); 6];
    for axis in 0..3 {
        planes[axis] = Plane::new(Vec3d::axis(axis, 1.0), min[axis]);
        planes[3 + axis] = Plane::new(Vec3d::axis(axis, -1.0), -max[axis]);
    }

    session.count_portals(6)?;

    for (i, plane) in planes.iter().enumerate() {
        let mut winding = Some(Winding::for_plane(plane));

        for (j, clipper) in planes.iter().enumerate() {
            if j == i {
                continue;
            }
            winding = match winding {
                Some(winding) => winding.chop(clipper, ON_EPSILON)?,
                None => None,
            };
        }

        let Some(winding) = winding else {
            continue;
        };

        let id = tree.add_portal(Portal::new(*plane, None, winding));
        tree.link_portal(id, node, outside);
    }

    Ok(())
} // make_headnode_portals

/// Node plane winding, clipped by all node parents
fn base_winding_for_node(planes: &PlaneRegistry, tree: &Tree, node: NodeId) -> Result<Option<Winding>> {
    let Some(split) = tree.node(node).split else {
        return Ok(None);
    };

    let mut winding = Winding::for_plane(&planes.plane(split.plane));
    let mut child = node;

    while let Some(parent) = tree.node(child).parent {
        let Some(parent_split) = tree.node(parent).split else {
            break;
        };

        let plane = planes.plane(parent_split.plane);
        let plane = if parent_split.children[0] == child { plane } else { plane.negate_direction() };

        match winding.chop(&plane, BASE_WINDING_EPSILON)? {
            Some(chopped) => winding = chopped,
            None => return Ok(None),
        }

        child = parent;
    }

    Ok(Some(winding))
}

/// Create portal on the node plane, clipped by all the node portals
fn make_node_portal(session: &CompileSession, tree: &mut Tree, node: NodeId) -> Result<()> {
    let Some(split) = tree.node(node).split else {
        return Ok(());
    };
    let Some(mut winding) = base_winding_for_node(&session.planes, tree, node)? else {
        return Ok(());
    };

    for &id in &tree.node(node).portals {
        let portal = tree.portal(id);
        let side = portal.node_side(node).ok_or(CompileError::MislinkedPortal(node.into_index()))?;

        match winding.chop(&portal.plane_for_side(side), ON_EPSILON)? {
            Some(chopped) => winding = chopped,
            None => return Ok(()),
        }
    }

    if winding.is_tiny() {
        log::trace!("tiny portal on node {}", node.into_index());
        return Ok(());
    }

    session.count_portals(1)?;
    let id = tree.add_portal(Portal::new(session.planes.plane(split.plane), Some(node), winding));
    tree.link_portal(id, split.children[0], split.children[1]);

    Ok(())
}

/// Move or split portals bounding the node so that its children have the portals instead
fn split_node_portals(session: &CompileSession, tree: &mut Tree, node: NodeId) -> Result<()> {
    let Some(split) = tree.node(node).split else {
        return Ok(());
    };
    let plane = session.planes.plane(split.plane);
    let [front, back] = split.children;

    for id in std::mem::take(&mut tree.node_mut(node).portals) {
        let portal = tree.portal(id);
        let side = portal.node_side(node).ok_or(CompileError::MislinkedPortal(node.into_index()))?;
        let other = portal.nodes[1 - side];

        tree.unlink_portal(id, other);

        let pieces = tree.portal(id).winding.split(&plane, SPLIT_WINDING_EPSILON)?;
        let front_winding = pieces.front.filter(|winding| !winding.is_tiny());
        let back_winding = pieces.back.filter(|winding| !winding.is_tiny());

        // keeps side of the portal node was on
        let link = |tree: &mut Tree, id: PortalId, child: NodeId| {
            if side == 0 {
                tree.link_portal(id, child, other);
            } else {
                tree.link_portal(id, other, child);
            }
        };

        match (front_winding, back_winding) {
            (None, None) => {
                tree.portals[id.into_index()] = None;
            }
            (None, Some(_)) => link(tree, id, back),
            (Some(_), None) => link(tree, id, front),
            (Some(front_winding), Some(back_winding)) => {
                session.count_portals(1)?;

                let mut back_portal = tree.portal(id).clone();
                back_portal.winding = back_winding;
                tree.portal_mut(id).winding = front_winding;

                let back_id = tree.add_portal(back_portal);
                link(tree, id, front);
                link(tree, back_id, back);
            }
        }
    }

    Ok(())
} // split_node_portals

/// Calculate node bounds from its portals
fn calc_node_bounds(tree: &mut Tree, node: NodeId) {
    let bounds = BoundBox::for_points(
        tree.node(node)
            .portals
            .iter()
            .flat_map(|id| tree.portal(*id).winding.points.iter().copied()),
    );

    let (min, max) = (bounds.min(), bounds.max());
    if min.x >= max.x {
        log::debug!("node {} without a volume", node.into_index());
    }
    if (0..3).any(|axis| min[axis] < -UNBOUNDED_COORDINATE || max[axis] > UNBOUNDED_COORDINATE) {
        log::debug!("node {} with unbounded volume", node.into_index());
    }

    tree.node_mut(node).bounds = bounds;
}

/// Push portals from the head node down the tree, `detail` tells if detail separators are descended into
fn push_portals(session: &CompileSession, tree: &mut Tree, detail: bool) -> Result<()> {
    tree.clear_portals();
    make_headnode_portals(session, tree)?;

    let mut stack = vec![tree.head];
    while let Some(node) = stack.pop() {
        calc_node_bounds(tree, node);

        let Some(split) = tree.node(node).split else {
            continue;
        };
        if split.detail_separator && !detail {
            continue;
        }

        make_node_portal(session, tree, node)?;
        split_node_portals(session, tree, node)?;

        stack.push(split.children[1]);
        stack.push(split.children[0]);
    }

    Ok(())
}

/// Build portals between all tree leafs
pub fn make_tree_portals(session: &CompileSession, tree: &mut Tree) -> Result<()> {
    log::trace!("--- make_tree_portals ---");

    push_portals(session, tree, true)?;

    log::trace!("{:5} portals", tree.iter_portals().count());
    Ok(())
}

/// Build portals between clusters, nodes split by detail separators are not descended into
pub fn make_vis_portals(session: &CompileSession, tree: &mut Tree) -> Result<()> {
    log::trace!("--- make_vis_portals ---");

    push_portals(session, tree, false)?;

    log::trace!("{:5} cluster portals", tree.iter_portals().count());
    Ok(())
}

/// Contents of the node subtree as a cluster. A cluster may include some solid detail and still be seen into.
pub fn cluster_contents(tree: &Tree, node: NodeId) -> Contents {
    let Some([front, back]) = tree.node(node).children() else {
        return tree.node(node).contents;
    };

    let (c1, c2) = (cluster_contents(tree, front), cluster_contents(tree, back));
    let mut contents = c1 | c2;

    if !c1.contains(Contents::SOLID) || !c2.contains(Contents::SOLID) {
        contents.remove(Contents::SOLID);
    }

    contents
}

/// Check if visibility can flow through the portal. Portal nodes may be clusters.
pub fn portal_vis_flood(tree: &Tree, portal: &Portal) -> bool {
    if portal.on_node.is_none() {
        return false;
    }

    let mut c1 = cluster_contents(tree, portal.nodes[0]);
    let mut c2 = cluster_contents(tree, portal.nodes[1]);

    if (c1 ^ c2).visible().is_empty() {
        return true;
    }

    if c1.intersects(Contents::TRANSLUCENT | Contents::DETAIL) {
        c1 = Contents::empty();
    }
    if c2.intersects(Contents::TRANSLUCENT | Contents::DETAIL) {
        c2 = Contents::empty();
    }

    // can't see through solid
    if (c1 | c2).contains(Contents::SOLID) {
        return false;
    }

    // identical on both sides
    if (c1 ^ c2).is_empty() {
        return true;
    }

    (c1 ^ c2).visible().is_empty()
}

/// Check if entities can flood through the portal
pub fn portal_entity_flood(tree: &Tree, portal: &Portal) -> Result<bool> {
    let [n0, n1] = portal.nodes.map(|node| tree.node(node));

    if !n0.is_leaf() || !n1.is_leaf() {
        return Err(CompileError::FloodThroughNode);
    }

    // never cross to a solid
    Ok(!n0.contents.contains(Contents::SOLID) && !n1.contents.contains(Contents::SOLID))
}


// mod.rs
