///! Brush fragment BSP builder module

use crate::{
    brush::{BspBrush, ClipBox},
    bsp::{Node, Split},
    contents::{Contents, PlaneSide, SurfaceFlags},
    error::{CompileError, Result},
    geom::BoundBox,
    plane::{PlaneNum, PlaneRegistry},
    session::CompileSession,
    MapBrushId,
    NodeId,
};

/// Chosen splitter
#[derive(Copy, Clone, Debug)]
struct Splitter {
    /// Positive-facing splitter plane
    plane: PlaneNum,

    /// Splitter was found by detail or non-visible side pass
    detail_separator: bool,

    /// Map brush and index of the side the plane was taken from
    side: Option<(MapBrushId, usize)>,
}

/// Splitter candidate heuristic value
fn splitter_value(facing: i64, splits: i64, front: i64, back: i64, axial: bool, epsilon_brushes: i64) -> i64 {
    let mut value = 5 * facing - 5 * splits - (front - back).abs();

    if axial {
        value += 5;
    }

    value - epsilon_brushes * 1000
}

/// Tree builder state
struct Builder<'a> {
    /// Session builder works in
    session: &'a CompileSession,

    /// Built nodes, ids are local to this vector
    nodes: Vec<Node>,

    /// Count of nodes split by non-visible sides
    nonvis: usize,
}

impl<'a> Builder<'a> {
    fn planes(&self) -> &'a PlaneRegistry {
        &self.session.planes
    }

    /// Check if plane already splits some of the node parents
    fn is_parent_plane(&self, id: NodeId, plane: PlaneNum) -> bool {
        let mut parent = self.nodes[id.into_index()].parent;

        while let Some(parent_id) = parent {
            let node = &self.nodes[parent_id.into_index()];
            if node.split.is_some_and(|split| split.plane == plane) {
                return true;
            }
            parent = node.parent;
        }

        false
    }

    /// Check if the node volume has some part on both sides of plane
    fn check_plane_against_volume(&self, plane: PlaneNum, volume: Option<&BspBrush>) -> Result<bool> {
        let Some(volume) = volume else {
            return Ok(false);
        };

        let (front, back) = volume.split(self.planes(), plane)?;
        Ok(front.is_some() && back.is_some())
    }

    /// Choose one of brush sides to partition the brushes with, `None` if there's no valid one
    fn select_split_side(&mut self, id: NodeId, brushes: &mut [BspBrush], volume: Option<&BspBrush>) -> Result<Option<Splitter>> {
        let planes = self.planes();
        let mut best: Option<Splitter> = None;
        let mut best_value = -99999i64;

        // visible structural, visible detail, nonvisible structural, nonvisible detail
        for pass in 0..4 {
            for brush_index in 0..brushes.len() {
                if (pass & 1 != 0) != brushes[brush_index].contents.contains(Contents::DETAIL) {
                    continue;
                }

                for side_index in 0..brushes[brush_index].sides.len() {
                    let side = &brushes[brush_index].sides[side_index];

                    if side.bevel
                        || side.winding.is_none()
                        || side.on_node
                        || side.tested
                        || side.surface.contains(SurfaceFlags::SKIP)
                        || side.visible != (pass < 2)
                    {
                        continue;
                    }

                    let plane = side.plane.positive();
                    let is_hint = side.surface.contains(SurfaceFlags::HINT);
                    let split_side = brushes[brush_index].original.map(|original| (original, side_index));

                    if self.is_parent_plane(id, plane) {
                        return Err(CompileError::TriedParent(plane.0));
                    }

                    // would produce a tiny volume
                    if !self.check_plane_against_volume(plane, volume)? {
                        continue;
                    }

                    let (mut front, mut back, mut facing, mut splits, mut epsilon_brushes) = (0, 0, 0, 0, 0);
                    let mut hint_split = false;

                    for (test_index, test) in brushes.iter_mut().enumerate() {
                        let result = test.test_to_plane(planes, plane);

                        splits += result.splits as i64;
                        hint_split |= result.hint_split;
                        epsilon_brushes += result.epsilon_brush as i64;

                        if result.splits != 0 && result.side.contains(PlaneSide::FACING) {
                            return Err(CompileError::FacingWithSplits(test_index, plane.0));
                        }

                        test.test_side = result.side;

                        // brush shares the plane, so its sides needn't be tested again
                        if result.side.contains(PlaneSide::FACING) {
                            facing += 1;
                            for test_side in &mut test.sides {
                                if test_side.plane.positive() == plane {
                                    test_side.tested = true;
                                }
                            }
                        }
                        if result.side.contains(PlaneSide::FRONT) {
                            front += 1;
                        }
                        if result.side.contains(PlaneSide::BACK) {
                            back += 1;
                        }
                    }

                    let mut value = splitter_value(
                        facing,
                        splits,
                        front,
                        back,
                        planes.get(plane).ty.is_axial(),
                        epsilon_brushes,
                    );

                    // hints are split by hints only
                    if hint_split && !is_hint {
                        value = -9999999;
                    }

                    if value > best_value {
                        best_value = value;
                        best = Some(Splitter { plane, detail_separator: false, side: split_side });

                        for test in brushes.iter_mut() {
                            test.side = test.test_side;
                        }
                    }
                }
            }

            if let Some(best) = &mut best {
                if pass > 1 {
                    self.nonvis += 1;
                }
                if pass > 0 {
                    best.detail_separator = true;
                }
                break;
            }
        }

        for brush in brushes.iter_mut() {
            for side in &mut brush.sides {
                side.tested = false;
            }
        }

        Ok(best)
    } // select_split_side

    /// Partition brush list by node plane
    fn split_brush_list(&self, brushes: Vec<BspBrush>, plane: PlaneNum) -> Result<[Vec<BspBrush>; 2]> {
        let mut result = [Vec::new(), Vec::new()];

        for mut brush in brushes {
            if brush.side == PlaneSide::BOTH {
                let (front, back) = brush.split(self.planes(), plane)?;
                self.session.count_brushes(front.is_some() as usize + back.is_some() as usize)?;

                result[0].extend(front);
                result[1].extend(back);
                continue;
            }

            // the plane is part of the brush, it must never be a splitter again
            if brush.side.contains(PlaneSide::FACING) {
                for side in &mut brush.sides {
                    if side.plane.positive() == plane {
                        side.on_node = true;
                    }
                }
            }

            if brush.side.contains(PlaneSide::FRONT) {
                result[0].push(brush);
            } else if brush.side.contains(PlaneSide::BACK) {
                result[1].push(brush);
            }
        }

        Ok(result)
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.into_index()]
    }

    /// Turn node into leaf holding the brushes
    fn leaf_node(&mut self, id: NodeId, brushes: Vec<BspBrush>) {
        let mut contents = Contents::empty();

        for brush in &brushes {
            // solid brush with all its sides on nodes eats everything
            if brush.contents.contains(Contents::SOLID) && brush.sides.iter().all(|side| side.on_node) {
                contents = Contents::SOLID;
                break;
            }
            contents |= brush.contents;
        }

        let node = self.node_mut(id);
        node.split = None;
        node.contents = contents;
        node.brushes = brushes;
    }

    /// Partition brushes starting from the root node, the front subtree is built first
    fn build_tree(&mut self, brushes: Vec<BspBrush>, volume: BspBrush) -> Result<()> {
        let mut stack = vec![(NodeId::from_index(0), brushes, Some(volume))];

        while let Some((id, mut brushes, volume)) = stack.pop() {
            self.session.count_nodes(1)?;

            let Some(splitter) = self.select_split_side(id, &mut brushes, volume.as_ref())? else {
                self.leaf_node(id, brushes);
                continue;
            };

            let [front_brushes, back_brushes] = self.split_brush_list(brushes, splitter.plane)?;

            let (front_volume, back_volume) = match &volume {
                Some(volume) => volume.split(self.planes(), splitter.plane)?,
                None => (None, None),
            };

            let children = [0, 1].map(|_| {
                self.nodes.push(Node::leaf(Some(id), Contents::empty()));
                NodeId::from_index(self.nodes.len() - 1)
            });

            self.node_mut(id).split = Some(Split {
                plane: splitter.plane,
                children,
                detail_separator: splitter.detail_separator,
                side: splitter.side,
            });

            stack.push((children[1], back_brushes, back_volume));
            stack.push((children[0], front_brushes, front_volume));
        }

        Ok(())
    } // build_tree
}

/// Build BSP of brush fragments located in the clip box. Node ids of the result are local to the node vector.
pub fn brush_bsp(session: &CompileSession, brushes: Vec<BspBrush>, clip: &ClipBox) -> Result<(Vec<Node>, BoundBox)> {
    log::trace!("--- brush_bsp ---");

    let (mut visible_faces, mut nonvisible_faces) = (0usize, 0usize);
    let mut bounds = BoundBox::zero();

    for brush in &brushes {
        if brush.volume(&session.planes) < session.config.micro_volume {
            if let Some(original) = brush.original {
                let map_brush = session.map_brush(original);
                log::warn!("entity {}, brush {}: microbrush", map_brush.entity, map_brush.brush_num);
            }
        }

        for side in &brush.sides {
            if side.bevel || side.winding.is_none() || side.on_node {
                continue;
            }
            if side.visible {
                visible_faces += 1;
            } else {
                nonvisible_faces += 1;
            }
        }

        bounds = bounds.total(&brush.bounds);
    }

    log::trace!("{:5} brushes", brushes.len());
    log::trace!("{:5} visible faces", visible_faces);
    log::trace!("{:5} nonvisible faces", nonvisible_faces);

    let mut builder = Builder {
        session,
        nodes: vec![Node::default()],
        nonvis: 0,
    };

    let volume = BspBrush::from_clip_box(&session.planes, clip)?;
    builder.build_tree(brushes, volume)?;

    let leafs = builder.nodes.iter().filter(|node| node.is_leaf()).count();
    log::trace!("{:5} visible nodes", builder.nodes.len() / 2 - builder.nonvis);
    log::trace!("{:5} nonvis nodes", builder.nonvis);
    log::trace!("{:5} leafs", leafs);

    Ok((builder.nodes, bounds))
} // brush_bsp


// builder.rs
