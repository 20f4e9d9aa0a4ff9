///! Portal-to-portal visibility flow module

use std::sync::{
    atomic::{AtomicU8, Ordering},
    OnceLock,
};
use itertools::Itertools;
use rayon::prelude::*;
use crate::{
    geom::Plane,
    vis::{Bits, VisMap, VisPortal},
    winding::Winding,
};

/// Visibility clipping epsilon
pub const ON_EPSILON: f64 = 0.1;

/// Maximal count of points chain windings may have
pub const MAX_POINTS_ON_FIXED_WINDING: usize = 16;

/// Portal processing status
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PortalStatus {
    /// Not started yet
    None = 0,

    /// Some worker processes the portal
    Working = 1,

    /// Portal visibility is known
    Done = 2,
}

/// Point side relative to plane
#[derive(Copy, Clone, PartialEq, Eq)]
enum Side {
    Front,
    Back,
    On,
}

fn point_side(distance: f64) -> Side {
    if distance > ON_EPSILON {
        Side::Front
    } else if distance < -ON_EPSILON {
        Side::Back
    } else {
        Side::On
    }
}

/// Keep part of the winding in front of the plane. Windings that would get too many points are kept unclipped.
pub fn chop_winding(winding: &Winding, plane: &Plane) -> Option<Winding> {
    let dists = winding.points.iter().map(|point| plane.distance_to(*point)).collect_vec();
    let sides = dists.iter().map(|d| point_side(*d)).collect_vec();

    if !sides.contains(&Side::Back) {
        return Some(winding.clone());
    }
    if !sides.contains(&Side::Front) {
        return None;
    }

    let count = winding.points.len();
    let mut points = Vec::with_capacity(MAX_POINTS_ON_FIXED_WINDING);

    for i in 0..count {
        let p1 = winding.points[i];

        if points.len() == MAX_POINTS_ON_FIXED_WINDING {
            return Some(winding.clone());
        }

        if sides[i] == Side::On {
            points.push(p1);
            continue;
        }
        if sides[i] == Side::Front {
            points.push(p1);
        }

        let next = (i + 1) % count;
        if sides[next] == Side::On || sides[next] == sides[i] {
            continue;
        }

        if points.len() == MAX_POINTS_ON_FIXED_WINDING {
            return Some(winding.clone());
        }

        // split point, axial coordinates are exact
        let p2 = winding.points[next];
        let t = dists[i] / (dists[i] - dists[next]);
        let mut mid = p1 + (p2 - p1) * t;

        for axis in 0..3 {
            if plane.normal[axis] == 1.0 {
                mid[axis] = plane.distance;
            } else if plane.normal[axis] == -1.0 {
                mid[axis] = -plane.distance;
            }
        }

        points.push(mid);
    }

    Some(Winding::new(points))
} // chop_winding

/// Clip `target` by planes separating `source` and `pass`.
///
/// Candidate planes go through an edge of `source` and a vertex of `pass` and have the whole
/// `pass` on one side and `source` on the other. Normal clip keeps the `target` on the `pass`
/// side (the order is source, pass, target); `flip_clip` keeps it on the `source` side.
pub fn clip_to_separators(source: &Winding, pass: &Winding, target: Winding, flip_clip: bool) -> Option<Winding> {
    let mut target = target;
    let source_count = source.points.len();

    for (i, l) in (0..source_count).circular_tuple_windows() {
        let v1 = source.points[l] - source.points[i];

        for (j, pass_point) in pass.points.iter().enumerate() {
            let v2 = *pass_point - source.points[i];
            let normal = v1 % v2;

            let length = normal ^ normal;
            if length < ON_EPSILON {
                continue;
            }
            let normal = normal / length.sqrt();
            let mut plane = Plane { normal, distance: *pass_point ^ normal };

            // find out which side of the plane has the source
            let source_side = source
                .points
                .iter()
                .enumerate()
                .filter(|(k, _)| *k != i && *k != l)
                .map(|(_, point)| point_side(plane.distance_to(*point)))
                .find(|side| *side != Side::On);

            match source_side {
                None => continue,
                Some(Side::Front) => plane = plane.negate_direction(),
                Some(_) => {}
            }

            // all of the pass points must be on the front side
            let mut front = 0;
            let mut separates = true;
            for (k, point) in pass.points.iter().enumerate() {
                if k == j {
                    continue;
                }
                match point_side(plane.distance_to(*point)) {
                    Side::Back => {
                        separates = false;
                        break;
                    }
                    Side::Front => front += 1,
                    Side::On => {}
                }
            }

            if !separates || front == 0 {
                continue;
            }

            if flip_clip {
                plane = plane.negate_direction();
            }

            target = chop_winding(&target, &plane)?;
        }
    }

    Some(target)
} // clip_to_separators

/// Check if some winding point is in front of the plane
fn has_point_in_front(winding: &Winding, plane: &Plane) -> bool {
    winding.points.iter().any(|point| plane.distance_to(*point) > ON_EPSILON)
}

/// Check if some winding point is behind the plane
fn has_point_behind(winding: &Winding, plane: &Plane) -> bool {
    winding.points.iter().any(|point| plane.distance_to(*point) < -ON_EPSILON)
}

/// Rough visibility of a single portal
fn portal_flood(map: &VisMap, index: usize) -> Bits {
    let portal = &map.portals[index];
    let mut front = Bits::new(map.portals.len());

    for (other_index, other) in map.portals.iter().enumerate() {
        if other_index == index {
            continue;
        }

        if has_point_in_front(&other.winding, &portal.plane) && has_point_behind(&portal.winding, &other.plane) {
            front.set(other_index);
        }
    }

    let mut flood = Bits::new(map.portals.len());
    let mut stack = vec![portal.leaf];

    while let Some(leaf) = stack.pop() {
        for &next in &map.leafs[leaf].portals {
            if !front.get(next) || flood.get(next) {
                continue;
            }

            flood.set(next);
            stack.push(map.portals[next].leaf);
        }
    }

    flood
}

/// Calculate rough visibility of every portal
pub fn base_vis(map: &VisMap) -> Vec<Bits> {
    log::trace!("--- base_vis ---");

    (0..map.portals.len())
        .into_par_iter()
        .map(|index| portal_flood(map, index))
        .collect()
}

/// Portal processing order, the least complex ones first
pub fn sort_portals(flood: &[Bits], no_sort: bool) -> Vec<usize> {
    let mut order = (0..flood.len()).collect_vec();

    if !no_sort {
        order.sort_by_key(|index| flood[*index].count());
    }

    order
}

/// Single step of portal chain
struct ChainFrame {
    /// Cluster the step is in
    leaf: usize,

    /// Next portal of the cluster to check
    next_portal: usize,

    /// Portals that still might be seen
    might_see: Bits,

    /// Part of the base portal that sees the cluster
    source: Winding,

    /// Part of the previous portal seen through, `None` for the base cluster
    pass: Option<Winding>,
}

/// Portal visibility state shared by flow workers
struct FlowState<'a> {
    map: &'a VisMap,
    flood: &'a [Bits],
    status: Vec<AtomicU8>,
    results: Vec<OnceLock<Bits>>,
}

impl<'a> FlowState<'a> {
    /// Best known visibility of portal
    fn portal_vis(&self, index: usize) -> &Bits {
        match self.results[index].get() {
            Some(vis) => vis,
            None => &self.flood[index],
        }
    }

    /// Calculate exact visibility of the portal by walking all portal chains starting from it
    fn portal_flow(&self, base_index: usize) -> Bits {
        let map = self.map;
        let base: &VisPortal = &map.portals[base_index];

        let mut vis = Bits::new(map.portals.len());
        let mut chains = 0usize;

        let mut stack = vec![ChainFrame {
            leaf: base.leaf,
            next_portal: 0,
            might_see: self.flood[base_index].clone(),
            source: base.winding.clone(),
            pass: None,
        }];
        chains += 1;

        while let Some(frame) = stack.last_mut() {
            let Some(&index) = map.leafs[frame.leaf].portals.get(frame.next_portal) else {
                stack.pop();
                continue;
            };
            frame.next_portal += 1;

            let Some(frame) = stack.last() else {
                break;
            };

            if !frame.might_see.get(index) {
                continue;
            }

            // skip portals that can't show anything new
            let test = self.portal_vis(index);
            let mut might_see = frame.might_see.clone();
            let mut more = false;
            for ((dst, src), seen) in might_see.0.iter_mut().zip(&test.0).zip(&vis.0) {
                *dst &= *src;
                more |= *dst & !*seen != 0;
            }

            if !more && vis.get(index) {
                continue;
            }

            let portal = &map.portals[index];

            let d = base.plane.distance_to(portal.origin);
            let pass = if d < -portal.radius {
                continue;
            } else if d > portal.radius {
                portal.winding.clone()
            } else {
                match chop_winding(&portal.winding, &base.plane) {
                    Some(pass) => pass,
                    None => continue,
                }
            };

            let d = portal.plane.distance_to(base.origin);
            let source = if d > base.radius {
                continue;
            } else if d < -base.radius {
                frame.source.clone()
            } else {
                match chop_winding(&frame.source, &portal.plane.negate_direction()) {
                    Some(source) => source,
                    None => continue,
                }
            };

            let pass = match &frame.pass {
                // the second cluster can be blocked only if coplanar
                None => pass,
                Some(prev_pass) => {
                    let Some(pass) = clip_to_separators(&source, prev_pass, pass, false) else {
                        continue;
                    };
                    match clip_to_separators(prev_pass, &source, pass, true) {
                        Some(pass) => pass,
                        None => continue,
                    }
                }
            };

            vis.set(index);

            chains += 1;
            stack.push(ChainFrame {
                leaf: portal.leaf,
                next_portal: 0,
                might_see,
                source,
                pass: Some(pass),
            });
        }

        log::debug!(
            "portal:{:4} mightsee:{:4} cansee:{:4} ({} chains)",
            base_index,
            self.flood[base_index].count(),
            vis.count(),
            chains,
        );

        vis
    } // portal_flow
}

/// Calculate exact visibility of all portals. Workers take portals in `order`; results of
/// finished portals narrow the search of later ones. Portals that weren't processed are `None`.
pub fn final_vis(map: &VisMap, flood: &[Bits], order: &[usize], threads: usize) -> Vec<Option<Bits>> {
    log::trace!("--- final_vis ---");

    let state = FlowState {
        map,
        flood,
        status: (0..map.portals.len()).map(|_| AtomicU8::new(PortalStatus::None as u8)).collect(),
        results: (0..map.portals.len()).map(|_| OnceLock::new()).collect(),
    };

    let next_work = parking_lot::Mutex::new(0usize);
    let threads = if threads == 0 { rayon::current_num_threads() } else { threads };

    let worker = || loop {
        let work = {
            let mut next = next_work.lock();
            let work = *next;
            *next += 1;
            work
        };

        let Some(&index) = order.get(work) else {
            break;
        };

        state.status[index].store(PortalStatus::Working as u8, Ordering::Release);
        let vis = state.portal_flow(index);
        _ = state.results[index].set(vis);
        state.status[index].store(PortalStatus::Done as u8, Ordering::Release);
    };

    rayon::scope(|scope| {
        for _ in 0..threads {
            scope.spawn(|_| worker());
        }
    });

    state
        .results
        .into_iter()
        .zip(state.status)
        .map(|(result, status)| {
            if status.into_inner() == PortalStatus::Done as u8 { result.into_inner() } else { None }
        })
        .collect()
} // final_vis

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{prtfile::{FilePortal, PortalFile}, vec3d};

    fn square(x: f64, y: (f64, f64)) -> Winding {
        Winding::new(vec![
            vec3d!(x, y.0, 0.0),
            vec3d!(x, y.0, 64.0),
            vec3d!(x, y.1, 64.0),
            vec3d!(x, y.1, 0.0),
        ])
    }

    #[test]
    fn chop_keeps_front() {
        let w = square(0.0, (0.0, 64.0));
        let plane = Plane { normal: vec3d!(0.0, 1.0, 0.0), distance: 16.0 };

        let chopped = chop_winding(&w, &plane).unwrap();
        assert_eq!(chopped.points.len(), 4);
        assert!(chopped.points.iter().all(|point| point.y >= 16.0));
        assert!(chopped.points.iter().any(|point| point.y == 16.0));

        let back = chop_winding(&w, &plane.negate_direction()).unwrap();
        assert!(back.points.iter().all(|point| point.y <= 16.0));
        assert!((back.area() + chopped.area() - w.area()).abs() < 1e-6);
        assert_eq!(chop_winding(&w, &Plane { normal: vec3d!(0.0, 1.0, 0.0), distance: -8.0 }), Some(w.clone()));
        assert_eq!(chop_winding(&w, &Plane { normal: vec3d!(0.0, 1.0, 0.0), distance: 100.0 }), None);
    }

    #[test]
    fn separators_hide_offset_target() {
        // source and pass are aligned openings, the target is far to the side
        let source = square(0.0, (0.0, 64.0));
        let pass = square(64.0, (0.0, 64.0));

        let aligned = square(128.0, (0.0, 64.0));
        assert!(clip_to_separators(&source, &pass, aligned, false).is_some());

        let offset = square(128.0, (512.0, 576.0));
        assert!(clip_to_separators(&source, &pass, offset, false).is_none());
    }

    /// Corridor of `count` clusters along x, portal `i` separates clusters `i` and `i + 1`
    fn corridor(count: u32) -> VisMap {
        let portals = (0..count - 1)
            .map(|index| FilePortal { clusters: [index, index + 1], winding: square(64.0 * (index + 1) as f64, (0.0, 64.0)).reversed() })
            .collect();

        VisMap::new(&PortalFile { cluster_count: count as usize, portals }).unwrap()
    }

    #[test]
    fn straight_corridor_is_visible() {
        let map = corridor(4);
        let flood = base_vis(&map);

        // forward portal of the first cluster floods through the whole corridor
        assert_eq!(flood[0].ones().collect_vec(), vec![2, 4]);
        assert!(flood[1].ones().next().is_none());

        let order = sort_portals(&flood, false);
        assert!(order.windows(2).all(|pair| flood[pair[0]].count() <= flood[pair[1]].count()));

        let vis = final_vis(&map, &flood, &order, 2);
        assert!(vis.iter().all(Option::is_some));
        assert_eq!(vis[0].as_ref().map(|vis| vis.ones().collect_vec()), Some(vec![2, 4]));
    }
}

// flow.rs
