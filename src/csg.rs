///! Brush fragment subtraction and clipping module

use std::{collections::VecDeque, ops::Range};
use crate::{
    brush::{BspBrush, ClipBox},
    config::ChopPolicy,
    contents::Contents,
    error::Result,
    plane::PlaneRegistry,
    session::CompileSession,
    MapBrushId,
};

/// Result of brush subtraction
#[derive(Debug)]
pub enum Subtraction {
    /// Brushes don't intersect
    Untouched,

    /// Parts of the minuend outside of the subtrahend, empty if it's swallowed completely
    Fragments(Vec<BspBrush>),
}

/// Subtract `b` from `a`, both brushes are left untouched
pub fn subtract(planes: &PlaneRegistry, a: &BspBrush, b: &BspBrush) -> Result<Subtraction> {
    let mut inside = a.clone();
    let mut outside = Vec::new();

    for side in &b.sides {
        let (front, back) = inside.split(planes, side.plane)?;
        outside.extend(front);

        match back {
            Some(back) => inside = back,
            None => return Ok(Subtraction::Untouched),
        }
    }

    Ok(Subtraction::Fragments(outside))
}

/// Check if brushes definitely don't intersect
pub fn disjoint(a: &BspBrush, b: &BspBrush) -> bool {
    if a.bounds.is_disjoint(&b.bounds) {
        return true;
    }

    // opposing planes
    a.sides
        .iter()
        .any(|a_side| b.sides.iter().any(|b_side| a_side.plane == b_side.plane.opposite()))
}

/// Check if `b1` is allowed to bite `b2`
pub fn brush_ge(b1: &BspBrush, b2: &BspBrush) -> bool {
    // detail brushes never bite structural ones
    if b1.contents.contains(Contents::DETAIL) && !b2.contents.contains(Contents::DETAIL) {
        return false;
    }

    b1.contents.contains(Contents::SOLID)
}

/// Chopping step outcome
enum ChopStep {
    /// Remove the first brush
    CullFirst,

    /// Remove some other brush
    Cull(usize),

    /// Replace first brush with its fragments
    ReplaceFirst(Vec<BspBrush>),

    /// Replace some other brush with its fragments
    Replace(usize, Vec<BspBrush>),
}

/// Try to make first brush of the list stop intersecting some other one
fn chop_step(planes: &PlaneRegistry, list: &VecDeque<BspBrush>, policy: ChopPolicy) -> Result<Option<ChopStep>> {
    let b1 = &list[0];

    for (j, b2) in list.iter().enumerate().skip(1) {
        if disjoint(b1, b2) {
            continue;
        }

        let mut sub1 = None;
        let mut sub2 = None;

        if brush_ge(b2, b1) {
            match subtract(planes, b1, b2)? {
                Subtraction::Untouched => continue,
                Subtraction::Fragments(fragments) if fragments.is_empty() => return Ok(Some(ChopStep::CullFirst)),
                Subtraction::Fragments(fragments) => sub1 = Some(fragments),
            }
        }

        if brush_ge(b1, b2) {
            match subtract(planes, b2, b1)? {
                Subtraction::Untouched => continue,
                Subtraction::Fragments(fragments) if fragments.is_empty() => return Ok(Some(ChopStep::Cull(j))),
                Subtraction::Fragments(fragments) => sub2 = Some(fragments),
            }
        }

        let c1 = sub1.as_ref().map(Vec::len).unwrap_or(usize::MAX);
        let c2 = sub2.as_ref().map(Vec::len).unwrap_or(usize::MAX);

        let step = match (sub1, sub2) {
            (None, None) => continue,
            _ if policy == ChopPolicy::FewestFragments && c1 > 1 && c2 > 1 => continue,
            (Some(sub1), _) if c1 < c2 => ChopStep::ReplaceFirst(sub1),
            (_, Some(sub2)) => ChopStep::Replace(j, sub2),
            (Some(sub1), None) => ChopStep::ReplaceFirst(sub1),
        };

        return Ok(Some(step));
    }

    Ok(None)
} // chop_step

/// Carve intersecting brushes into non-intersecting fragments
pub fn chop_brushes(session: &CompileSession, brushes: Vec<BspBrush>) -> Result<Vec<BspBrush>> {
    log::trace!("---- chop_brushes ----");
    log::trace!("original brushes: {}", brushes.len());

    let planes = &session.planes;
    let mut list = VecDeque::from(brushes);
    let mut keep = Vec::new();

    while !list.is_empty() {
        let Some(step) = chop_step(planes, &list, session.config.chop_policy)? else {
            // first brush doesn't intersect anything anymore
            keep.extend(list.pop_front());
            continue;
        };

        match step {
            ChopStep::CullFirst => {
                list.pop_front();
            }
            ChopStep::Cull(j) => {
                list.remove(j);
            }
            ChopStep::ReplaceFirst(fragments) => {
                session.count_brushes(fragments.len())?;
                list.extend(fragments);
                list.pop_front();
            }
            ChopStep::Replace(j, fragments) => {
                session.count_brushes(fragments.len())?;
                list.extend(fragments);
                list.remove(j);
            }
        }

        // restart from the reversed remainder
        list.make_contiguous().reverse();
    }

    keep.reverse();
    log::trace!("output brushes: {}", keep.len());

    Ok(keep)
} // chop_brushes

/// Cut off parts of the brush outside of the clip box on horizontal axes
pub fn clip_brush_to_box(planes: &PlaneRegistry, brush: BspBrush, clip: &ClipBox) -> Result<Option<BspBrush>> {
    let mut brush = brush;

    for axis in 0..2 {
        if brush.bounds.max()[axis] > clip.bounds.max()[axis] {
            let (_, back) = brush.split(planes, clip.max_plane(axis))?;
            let Some(back) = back else {
                return Ok(None);
            };
            brush = back;
        }

        if brush.bounds.min()[axis] < clip.bounds.min()[axis] {
            let (front, _) = brush.split(planes, clip.min_plane(axis))?;
            let Some(front) = front else {
                return Ok(None);
            };
            brush = front;
        }
    }

    // sides on the box are never splitters
    for side in &mut brush.sides {
        if clip.planes.iter().any(|plane| plane.positive() == side.plane.positive()) {
            side.on_node = true;
            side.visible = false;
        }
    }

    Ok(Some(brush))
}

/// Build fragments of map brushes touching the clip box
pub fn make_bsp_brush_list(session: &CompileSession, brushes: Range<usize>, clip: &ClipBox) -> Result<Vec<BspBrush>> {
    let mut list = Vec::new();

    for index in brushes {
        let map_brush = &session.map_brushes[index];

        if map_brush.sides.is_empty() || map_brush.bounds.is_disjoint(&clip.bounds) {
            continue;
        }

        let brush = BspBrush::from_map_brush(MapBrushId::from_index(index), map_brush);
        if let Some(brush) = clip_brush_to_box(&session.planes, brush, clip)? {
            list.push(brush);
        }
    }

    session.count_brushes(list.len())?;
    Ok(list)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::BspConfig,
        contents::SurfaceFlags,
        geom::BoundBox,
        map::{BrushDesc, Entity, Map},
        math::Vec3d,
        vec3d,
    };

    fn session_with(boxes: &[(Vec3d, Vec3d, Contents)], config: BspConfig) -> CompileSession {
        let world = boxes.iter().fold(Entity::new("worldspawn"), |entity, (min, max, contents)| {
            entity.with_brush(BrushDesc::from_bounds(
                BoundBox::from_minmax(*min, *max),
                *contents,
                SurfaceFlags::empty(),
            ))
        });

        CompileSession::new(&Map { entities: vec![world] }, config).unwrap()
    }

    fn fragments(session: &CompileSession) -> Vec<BspBrush> {
        session
            .map_brushes
            .iter()
            .enumerate()
            .map(|(index, brush)| BspBrush::from_map_brush(MapBrushId::from_index(index), brush))
            .collect()
    }

    fn total_volume(session: &CompileSession, brushes: &[BspBrush]) -> f64 {
        brushes.iter().map(|brush| brush.volume(&session.planes)).sum()
    }

    #[test]
    fn subtraction_keeps_outside_volume() {
        let session = session_with(
            &[
                (vec3d!(0.0, 0.0, 0.0), vec3d!(64.0, 64.0, 64.0), Contents::SOLID),
                (vec3d!(32.0, 32.0, -16.0), vec3d!(96.0, 96.0, 80.0), Contents::SOLID),
            ],
            BspConfig::default(),
        );
        let list = fragments(&session);

        let Subtraction::Fragments(outside) = subtract(&session.planes, &list[0], &list[1]).unwrap() else {
            panic!("brushes intersect");
        };

        assert!(!outside.is_empty());
        assert!((total_volume(&session, &outside) - (64.0 * 64.0 * 64.0 - 32.0 * 32.0 * 64.0)).abs() < 1e-3);

        // fragments and the intersection put the minuend back together
        let Subtraction::Fragments(b_outside) = subtract(&session.planes, &list[1], &list[0]).unwrap() else {
            panic!("brushes intersect");
        };
        let [a_volume, b_volume] = [&list[0], &list[1]].map(|brush| brush.volume(&session.planes));
        let intersection = b_volume - total_volume(&session, &b_outside);

        assert!((intersection - 32.0 * 32.0 * 64.0).abs() < 1e-3);
        assert!((total_volume(&session, &outside) + intersection - a_volume).abs() < 1e-3);

        for fragment in &outside {
            assert!(disjoint(fragment, &list[1]));
            assert!(matches!(subtract(&session.planes, fragment, &list[1]).unwrap(), Subtraction::Untouched));
            assert!(fragment.bounds.min().equal_epsilon(fragment.bounds.min().max(list[0].bounds.min()), 1e-6));
            assert!(fragment.bounds.max().equal_epsilon(fragment.bounds.max().min(list[0].bounds.max()), 1e-6));
        }
    }

    #[test]
    fn separate_brushes_are_untouched() {
        let session = session_with(
            &[
                (vec3d!(0.0, 0.0, 0.0), vec3d!(16.0, 16.0, 16.0), Contents::SOLID),
                (vec3d!(16.0, 0.0, 0.0), vec3d!(32.0, 16.0, 16.0), Contents::SOLID),
            ],
            BspConfig::default(),
        );
        let list = fragments(&session);

        assert!(disjoint(&list[0], &list[1]));
        assert!(matches!(subtract(&session.planes, &list[0], &list[1]).unwrap(), Subtraction::Untouched));

        let chopped = chop_brushes(&session, list).unwrap();
        assert_eq!(chopped.len(), 2);
    }

    #[test]
    fn chopping_removes_overlap() {
        let session = session_with(
            &[
                (vec3d!(0.0, 0.0, 0.0), vec3d!(64.0, 64.0, 64.0), Contents::SOLID),
                (vec3d!(16.0, 16.0, 16.0), vec3d!(32.0, 32.0, 32.0), Contents::SOLID),
                (vec3d!(32.0, 0.0, 0.0), vec3d!(96.0, 64.0, 64.0), Contents::SOLID),
            ],
            BspConfig::default(),
        );

        let chopped = chop_brushes(&session, fragments(&session)).unwrap();
        assert!((total_volume(&session, &chopped) - 96.0 * 64.0 * 64.0).abs() < 1e-3);

        for (i, a) in chopped.iter().enumerate() {
            for b in &chopped[i + 1..] {
                assert!(disjoint(a, b) || matches!(subtract(&session.planes, a, b).unwrap(), Subtraction::Untouched));
            }
        }
    }

    #[test]
    fn detail_never_bites_structure() {
        let session = session_with(
            &[
                (vec3d!(0.0, 0.0, 0.0), vec3d!(64.0, 64.0, 64.0), Contents::SOLID | Contents::DETAIL),
                (vec3d!(32.0, 0.0, 0.0), vec3d!(96.0, 64.0, 64.0), Contents::SOLID),
                (vec3d!(0.0, 0.0, 0.0), vec3d!(8.0, 8.0, 8.0), Contents::WATER),
            ],
            BspConfig::default(),
        );
        let list = fragments(&session);

        assert!(!brush_ge(&list[0], &list[1]));
        assert!(brush_ge(&list[1], &list[0]));
        assert!(!brush_ge(&list[2], &list[0]));

        let chopped = chop_brushes(&session, list).unwrap();
        let structural = chopped
            .iter()
            .filter(|brush| !brush.contents.contains(Contents::DETAIL) && brush.contents.contains(Contents::SOLID))
            .map(|brush| brush.volume(&session.planes))
            .sum::<f64>();

        assert!((structural - 64.0 * 64.0 * 64.0).abs() < 1e-3);
    }

    #[test]
    fn clip_to_box_marks_box_sides() {
        let session = session_with(
            &[(vec3d!(-64.0, 0.0, 0.0), vec3d!(64.0, 64.0, 64.0), Contents::SOLID)],
            BspConfig::default(),
        );
        let mut planes = PlaneRegistry::new(1024);
        for (num, plane) in session.planes.iter() {
            assert_eq!(planes.find_plane(plane.plane.normal, plane.plane.distance).unwrap(), num);
        }

        let clip = ClipBox::new(
            &mut planes,
            BoundBox::from_minmax(vec3d!(0.0, -1024.0, -4096.0), vec3d!(1024.0, 1024.0, 4096.0)),
        )
        .unwrap();
        let brush = BspBrush::from_map_brush(MapBrushId::from_index(0), &session.map_brushes[0]);

        let clipped = clip_brush_to_box(&planes, brush, &clip).unwrap().unwrap();

        assert_eq!(clipped.bounds.min().x, 0.0);
        assert!((clipped.volume(&planes) - 64.0 * 64.0 * 64.0).abs() < 1e-3);
        assert!(clipped
            .sides
            .iter()
            .filter(|side| planes.plane(side.plane).distance == 0.0 && planes.plane(side.plane).normal.x != 0.0)
            .all(|side| side.on_node && !side.visible));
    }
}

// csg.rs
