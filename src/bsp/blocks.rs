///! World block partitioning module

use std::{collections::HashMap, ops::Range};
use rayon::prelude::*;
use crate::{
    brush::{ClipBox, MAX_WORLD_WIDTH},
    bsp::{builder::brush_bsp, Node, Split, Tree},
    config::BspConfig,
    contents::Contents,
    csg::{chop_brushes, make_bsp_brush_list},
    error::Result,
    geom::BoundBox,
    math::Vec3d,
    plane::PlaneRegistry,
    session::CompileSession,
    NodeId,
};

/// Inclusive range of world blocks
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BlockRange {
    /// Minimal block indices (x, y)
    pub min: (i32, i32),

    /// Maximal block indices (x, y)
    pub max: (i32, i32),
}

impl BlockRange {
    /// Block range covering the map, clamped to configured limits
    pub fn for_map(config: &BspConfig, map_bounds: &BoundBox) -> Self {
        let size = config.block_size;
        let (limit_min, limit_max) = config.block_limits;
        let (min, max) = (map_bounds.min(), map_bounds.max());

        let fit = |low: i32, high: i32, axis: usize| {
            let mut low = low;
            let mut high = high;

            if high as f64 * size > max[axis] {
                high = (max[axis] / size).floor() as i32;
            }
            if (low + 1) as f64 * size < min[axis] {
                low = (min[axis] / size).floor() as i32;
            }

            (low.max(limit_min), high.min(limit_max))
        };

        let (xl, xh) = fit(-8, 7, 0);
        let (yl, yh) = fit(-8, 7, 1);

        Self { min: (xl, yl), max: (xh, yh) }
    }

    /// Iterate all blocks, x goes first
    pub fn blocks(&self) -> impl Iterator<Item = (i32, i32)> {
        let (xl, yl) = self.min;
        let (xh, yh) = self.max;

        (yl..=yh).flat_map(move |y| (xl..=xh).map(move |x| (x, y)))
    }
}

/// Bounds of a single block, vertically it covers the whole world
pub fn block_bounds(config: &BspConfig, x: i32, y: i32) -> BoundBox {
    let size = config.block_size;

    BoundBox::from_minmax(
        Vec3d::new(x as f64 * size, y as f64 * size, -MAX_WORLD_WIDTH),
        Vec3d::new((x + 1) as f64 * size, (y + 1) as f64 * size, MAX_WORLD_WIDTH),
    )
}

/// Build subtree of a single block
fn process_block(session: &CompileSession, brushes: Range<usize>, block: (i32, i32), clip: &ClipBox) -> Result<Vec<Node>> {
    log::trace!("############### block {:2},{:2} ###############", block.0, block.1);

    let list = make_bsp_brush_list(session, brushes, clip)?;
    if list.is_empty() {
        session.count_nodes(1)?;
        return Ok(vec![Node::leaf(None, Contents::SOLID)]);
    }

    let list = if session.config.no_csg { list } else { chop_brushes(session, list)? };
    let (nodes, _) = brush_bsp(session, list, clip)?;

    Ok(nodes)
}

/// Build tree of blocks, the range is oversized by one block to give all block borders a node
fn block_tree(
    tree: &mut Tree,
    planes: &mut PlaneRegistry,
    config: &BspConfig,
    blocks: &mut HashMap<(i32, i32), Vec<Node>>,
    (xl, yl, xh, yh): (i32, i32, i32, i32),
    parent: Option<NodeId>,
) -> Result<NodeId> {
    if xl == xh && yl == yh {
        let Some(nodes) = blocks.remove(&(xl, yl)) else {
            return Ok(tree.push_node(Node::leaf(parent, Contents::empty())));
        };

        let root = tree.graft(nodes);
        tree.node_mut(root).parent = parent;
        return Ok(root);
    }

    let id = tree.push_node(Node::leaf(parent, Contents::empty()));

    // separate along the largest axis
    let (axis, mid, ranges) = if xh - xl > yh - yl {
        let mid = xl + (xh - xl) / 2 + 1;
        (0, mid, [(mid, yl, xh, yh), (xl, yl, mid - 1, yh)])
    } else {
        let mid = yl + (yh - yl) / 2 + 1;
        (1, mid, [(xl, mid, xh, yh), (xl, yl, xh, mid - 1)])
    };

    let plane = planes.find_plane(Vec3d::axis(axis, 1.0), mid as f64 * config.block_size)?;
    let front = block_tree(tree, planes, config, blocks, ranges[0], Some(id))?;
    let back = block_tree(tree, planes, config, blocks, ranges[1], Some(id))?;

    tree.node_mut(id).split = Some(Split { plane, children: [front, back], detail_separator: false, side: None });

    Ok(id)
} // block_tree

/// Build world BSP block by block
pub fn build_world_tree(session: &mut CompileSession, brushes: Range<usize>) -> Result<Tree> {
    let range = BlockRange::for_map(&session.config, &session.map_bounds);

    // block planes are registered before the workers start, the plane table is read-only for them
    let clips = range
        .blocks()
        .map(|block| {
            let bounds = block_bounds(&session.config, block.0, block.1);
            ClipBox::new(&mut session.planes, bounds).map(|clip| (block, clip))
        })
        .collect::<Result<Vec<_>>>()?;

    let session_ref = &*session;
    let process = |(block, clip): &((i32, i32), ClipBox)| {
        process_block(session_ref, brushes.clone(), *block, clip).map(|nodes| (*block, nodes))
    };

    let processed = if session.config.parallel {
        clips.par_iter().map(process).collect::<Result<Vec<_>>>()?
    } else {
        clips.iter().map(process).collect::<Result<Vec<_>>>()?
    };

    let mut blocks = processed.into_iter().collect::<HashMap<_, _>>();
    let size = session.config.block_size;
    let (min, max) = (session.map_bounds.min(), session.map_bounds.max());

    let bounds = BoundBox::from_minmax(
        Vec3d::new(range.min.0 as f64 * size, range.min.1 as f64 * size, min.z - 8.0),
        Vec3d::new((range.max.0 + 1) as f64 * size, (range.max.1 + 1) as f64 * size, max.z + 8.0),
    );

    let mut tree = Tree::new(bounds);
    let extended = (range.min.0 - 1, range.min.1 - 1, range.max.0 + 1, range.max.1 + 1);
    tree.head = block_tree(&mut tree, &mut session.planes, &session.config, &mut blocks, extended, None)?;

    let (nodes, leafs) = tree.node_stats();
    log::debug!("{:5} nodes, {:5} leafs in world tree", nodes, leafs);

    Ok(tree)
} // build_world_tree

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vec3d;

    #[test]
    fn block_range_fits_map() {
        let config = BspConfig::default();

        let small = BoundBox::from_minmax(vec3d!(-64.0, 0.0, 0.0), vec3d!(128.0, 2000.0, 64.0));
        assert_eq!(BlockRange::for_map(&config, &small), BlockRange { min: (-1, 0), max: (0, 1) });

        let huge = BoundBox::from_minmax(vec3d!(-9000.0, -9000.0, 0.0), vec3d!(9000.0, 9000.0, 64.0));
        assert_eq!(BlockRange::for_map(&config, &huge), BlockRange { min: (-4, -4), max: (3, 3) });

        let blocks = BlockRange { min: (-1, 0), max: (0, 1) }.blocks().collect::<Vec<_>>();
        assert_eq!(blocks, vec![(-1, 0), (0, 0), (-1, 1), (0, 1)]);
    }

    #[test]
    fn block_tree_covers_range() {
        let config = BspConfig::default();
        let mut planes = PlaneRegistry::new(256);
        let mut tree = Tree::new(BoundBox::zero());

        let mut blocks = HashMap::new();
        blocks.insert((0, 0), vec![Node::leaf(None, Contents::SOLID)]);

        tree.head = block_tree(&mut tree, &mut planes, &config, &mut blocks, (-1, -1, 1, 1), None).unwrap();

        // the only processed block is solid, the border is empty
        let solid = tree.leaf_for_point(&planes, vec3d!(512.0, 512.0, 0.0));
        assert!(tree.node(solid).is_solid());
        assert_eq!(tree.node(solid).parent.map(|parent| tree.node(parent).is_leaf()), Some(false));

        for point in [vec3d!(-512.0, 512.0, 0.0), vec3d!(1536.0, 512.0, 0.0), vec3d!(512.0, -512.0, 0.0)] {
            assert_eq!(tree.node(tree.leaf_for_point(&planes, point)).contents, Contents::empty());
        }
        assert_eq!(tree.leafs().len(), 9);
    }
}

// blocks.rs
