///! Map brushes and BSP brush fragments

use crate::{
    contents::{Contents, PlaneSide, SurfaceFlags},
    error::Result,
    geom::{BoundBox, Plane},
    math::Vec3d,
    plane::{MapPlane, PlaneNum, PlaneRegistry},
    winding::Winding,
    MapBrushId,
};

/// Half-size of the world, brush fragments outside of it are bogus
pub const MAX_WORLD_WIDTH: f64 = 4096.0;

/// Bounding box to plane test epsilon
pub const SIDE_EPSILON: f64 = 0.001;

/// Points closer to plane than this are considered lying on it during brush splitting
pub const PLANESIDE_EPSILON: f64 = 0.1;

/// Brush fragments below this volume are removed after splitting
pub const MIN_SPLIT_VOLUME: f64 = 1.0;

/// Single brush side (half-space)
#[derive(Clone, Debug)]
pub struct Side {
    /// Side plane, normal points out of the brush
    pub plane: PlaneNum,

    /// Part of the side plane bounded by the other sides
    pub winding: Option<Winding>,

    /// Contents of the side
    pub contents: Contents,

    /// Surface flags
    pub surface: SurfaceFlags,

    /// Side is visible and is preferred as splitter
    pub visible: bool,

    /// Side plane was already tested as splitter for the current node
    pub tested: bool,

    /// Side is a bevel that exists for expansion only
    pub bevel: bool,

    /// Side lies on some tree node plane and can never be a splitter
    pub on_node: bool,
}

impl Side {
    /// Build new plain side
    pub fn new(plane: PlaneNum, contents: Contents, surface: SurfaceFlags) -> Self {
        Self {
            plane,
            winding: None,
            contents,
            surface,
            visible: false,
            tested: false,
            bevel: false,
            on_node: false,
        }
    }

    /// Copy side with another winding
    fn with_winding(&self, winding: Winding) -> Self {
        Self {
            plane: self.plane,
            winding: Some(winding),
            contents: self.contents,
            surface: self.surface,
            visible: self.visible,
            tested: false,
            bevel: self.bevel,
            on_node: self.on_node,
        }
    }
}

/// Authoring brush
#[derive(Clone, Debug)]
pub struct MapBrush {
    /// Index of the entity brush was declared in
    pub entity: usize,

    /// Index of the brush in the entity
    pub brush_num: usize,

    /// Brush contents
    pub contents: Contents,

    /// Brush sides, the first six are axial ones after bevelling
    pub sides: Vec<Side>,

    /// Bounds of side windings
    pub bounds: BoundBox,
}

/// Chop whole-plane winding by flipped planes of `clippers`
pub fn chop_by_sides(
    planes: &PlaneRegistry,
    base: PlaneNum,
    clippers: impl IntoIterator<Item = PlaneNum>,
) -> Result<Option<Winding>> {
    let mut winding = Winding::for_plane(&planes.plane(base));

    for clipper in clippers {
        match winding.chop(&planes.plane(clipper.opposite()), 0.0)? {
            Some(chopped) => winding = chopped,
            None => return Ok(None),
        }
    }

    Ok(Some(winding))
}

/// Box the BSP of some block or model is built in
#[derive(Copy, Clone, Debug)]
pub struct ClipBox {
    /// Box bounds
    pub bounds: BoundBox,

    /// Box planes: `+axis` at max for `i`, `-axis` at min for `3 + i`
    pub planes: [PlaneNum; 6],
}

impl ClipBox {
    /// Register box planes
    pub fn new(planes: &mut PlaneRegistry, bounds: BoundBox) -> Result<Self> {
        let (min, max) = (bounds.min(), bounds.max());
        let mut nums = [PlaneNum(0); 6];

        for axis in 0..3 {
            nums[axis] = planes.find_plane(Vec3d::axis(axis, 1.0), max[axis])?;
            nums[3 + axis] = planes.find_plane(Vec3d::axis(axis, -1.0), -min[axis])?;
        }

        Ok(Self { bounds, planes: nums })
    }

    /// Positive-facing plane on the maximal box side
    pub fn max_plane(&self, axis: usize) -> PlaneNum {
        self.planes[axis]
    }

    /// Positive-facing plane on the minimal box side
    pub fn min_plane(&self, axis: usize) -> PlaneNum {
        self.planes[3 + axis].opposite()
    }
}

/// Result of brush against plane test
#[derive(Copy, Clone, Debug, Default)]
pub struct PlaneTest {
    /// Sides of plane brush is located on
    pub side: PlaneSide,

    /// Count of visible windings split
    pub splits: u32,

    /// Some hint winding is split
    pub hint_split: bool,

    /// Brush barely crosses the plane
    pub epsilon_brush: bool,
}

/// Relation of box and plane
pub fn box_on_plane_side(bounds: &BoundBox, map_plane: &MapPlane) -> PlaneSide {
    let plane = &map_plane.plane;
    let (min, max) = (bounds.min(), bounds.max());

    if let Some(axis) = map_plane.ty.axis().filter(|axis| plane.normal[*axis] > 0.0) {
        let mut side = PlaneSide::empty();
        if max[axis] > plane.distance + SIDE_EPSILON {
            side |= PlaneSide::FRONT;
        }
        if min[axis] < plane.distance - SIDE_EPSILON {
            side |= PlaneSide::BACK;
        }
        return side;
    }

    // leading and trailing box corners
    let mut corners = [Vec3d::zero(); 2];
    for axis in 0..3 {
        if plane.normal[axis] < 0.0 {
            corners[0][axis] = min[axis];
            corners[1][axis] = max[axis];
        } else {
            corners[0][axis] = max[axis];
            corners[1][axis] = min[axis];
        }
    }

    let mut side = PlaneSide::empty();
    if plane.distance_to(corners[0]) >= SIDE_EPSILON {
        side = PlaneSide::FRONT;
    }
    if plane.distance_to(corners[1]) < SIDE_EPSILON {
        side |= PlaneSide::BACK;
    }
    side
} // box_on_plane_side

/// Brush fragment, produced by CSG and tree building
#[derive(Clone, Debug)]
pub struct BspBrush {
    /// Map brush the fragment was cut from, `None` for node volumes
    pub original: Option<MapBrushId>,

    /// Contents of the original brush
    pub contents: Contents,

    /// Fragment sides
    pub sides: Vec<Side>,

    /// Fragment bounds
    pub bounds: BoundBox,

    /// Side of the current node plane
    pub side: PlaneSide,

    /// Side of the plane currently tested as splitter
    pub test_side: PlaneSide,
}

impl BspBrush {
    fn from_sides(original: Option<MapBrushId>, contents: Contents, sides: Vec<Side>) -> Self {
        Self {
            original,
            contents,
            sides,
            bounds: BoundBox::zero(),
            side: PlaneSide::empty(),
            test_side: PlaneSide::empty(),
        }
    }

    /// Copy map brush into a fragment
    pub fn from_map_brush(id: MapBrushId, brush: &MapBrush) -> Self {
        let mut sides = brush.sides.clone();

        // hints are always visible
        for side in &mut sides {
            if side.surface.contains(SurfaceFlags::HINT) {
                side.visible = true;
            }
        }

        Self {
            bounds: brush.bounds,
            ..Self::from_sides(Some(id), brush.contents, sides)
        }
    }

    /// Build axial brush covering the clip box
    pub fn from_clip_box(planes: &PlaneRegistry, clip: &ClipBox) -> Result<Self> {
        let sides = clip
            .planes
            .iter()
            .map(|plane| Side::new(*plane, Contents::empty(), SurfaceFlags::empty()))
            .collect();

        let mut brush = Self::from_sides(None, Contents::empty(), sides);
        brush.create_windings(planes)?;

        Ok(brush)
    }

    /// Rebuild side windings, bevels don't clip
    pub fn create_windings(&mut self, planes: &PlaneRegistry) -> Result<()> {
        for i in 0..self.sides.len() {
            let clippers = self
                .sides
                .iter()
                .enumerate()
                .filter(|(j, side)| *j != i && !side.bevel)
                .map(|(_, side)| side.plane);

            self.sides[i].winding = chop_by_sides(planes, self.sides[i].plane, clippers)?;
        }

        self.bound();
        Ok(())
    }

    /// Recalculate bounds from side windings
    pub fn bound(&mut self) {
        self.bounds = BoundBox::for_points(
            self.sides
                .iter()
                .filter_map(|side| side.winding.as_ref())
                .flat_map(|winding| winding.points.iter().copied()),
        );
    }

    /// Iterate side windings with their planes
    fn windings(&self) -> impl Iterator<Item = (PlaneNum, &Winding)> {
        self.sides
            .iter()
            .filter_map(|side| side.winding.as_ref().map(|winding| (side.plane, winding)))
    }

    /// Brush volume, calculated from tetrahedrons with a common corner
    pub fn volume(&self, planes: &PlaneRegistry) -> f64 {
        let Some(first) = self.sides.iter().position(|side| side.winding.is_some()) else {
            return 0.0;
        };
        let Some(corner) = self.sides[first].winding.as_ref().map(|winding| winding.points[0]) else {
            return 0.0;
        };

        let volume = self.sides[first..]
            .iter()
            .filter_map(|side| side.winding.as_ref().map(|winding| (side.plane, winding)))
            .map(|(plane, winding)| -planes.plane(plane).distance_to(corner) * winding.area())
            .sum::<f64>();

        volume / 3.0
    }

    /// Side of plane most of the brush is located on
    pub fn mostly_on_side(&self, plane: &Plane) -> PlaneSide {
        let mut max = 0.0;
        let mut side = PlaneSide::FRONT;

        for (_, winding) in self.windings() {
            for point in &winding.points {
                let d = plane.distance_to(*point);

                if d > max {
                    max = d;
                    side = PlaneSide::FRONT;
                }
                if -d > max {
                    max = -d;
                    side = PlaneSide::BACK;
                }
            }
        }

        side
    }

    /// Test brush against splitter candidate
    pub fn test_to_plane(&self, planes: &PlaneRegistry, plane_num: PlaneNum) -> PlaneTest {
        // if the brush actually uses the plane, the side is known for sure
        for side in &self.sides {
            if side.plane == plane_num {
                return PlaneTest { side: PlaneSide::BACK | PlaneSide::FACING, ..Default::default() };
            }
            if side.plane == plane_num.opposite() {
                return PlaneTest { side: PlaneSide::FRONT | PlaneSide::FACING, ..Default::default() };
            }
        }

        let map_plane = planes.get(plane_num);
        let mut test = PlaneTest {
            side: box_on_plane_side(&self.bounds, map_plane),
            ..Default::default()
        };

        if test.side != PlaneSide::BOTH {
            return test;
        }

        // count visible windings split
        let (mut d_front, mut d_back) = (0.0f64, 0.0f64);

        for side in &self.sides {
            if side.on_node || !side.visible {
                continue;
            }
            let Some(winding) = &side.winding else {
                continue;
            };

            let (mut front, mut back) = (false, false);
            for point in &winding.points {
                let d = map_plane.plane.distance_to(*point);

                d_front = d_front.max(d);
                d_back = d_back.min(d);
                front |= d > PLANESIDE_EPSILON;
                back |= d < -PLANESIDE_EPSILON;
            }

            if front && back && !side.surface.contains(SurfaceFlags::SKIP) {
                test.splits += 1;
                if side.surface.contains(SurfaceFlags::HINT) {
                    test.hint_split = true;
                }
            }
        }

        test.epsilon_brush = (d_front > 0.0 && d_front < 1.0) || (d_back < 0.0 && d_back > -1.0);
        test
    } // test_to_plane

    /// Split brush by plane. The original brush is left untouched.
    pub fn split(&self, planes: &PlaneRegistry, plane_num: PlaneNum) -> Result<(Option<Self>, Option<Self>)> {
        let plane = planes.plane(plane_num);

        let (d_front, d_back) = self
            .windings()
            .map(|(_, winding)| winding.plane_extents(&plane))
            .fold((0.0f64, 0.0f64), |(front, back), (f, b)| (front.max(f), back.min(b)));

        if d_front < PLANESIDE_EPSILON {
            return Ok((None, Some(self.clone())));
        }
        if d_back > -PLANESIDE_EPSILON {
            return Ok((Some(self.clone()), None));
        }

        // winding of the new side
        let mid = chop_by_sides(planes, plane_num, self.sides.iter().map(|side| side.plane))?;

        let mid = match mid {
            Some(winding) if !winding.is_tiny() => winding,
            _ => {
                // the brush isn't really split
                return Ok(if self.mostly_on_side(&plane) == PlaneSide::FRONT {
                    (Some(self.clone()), None)
                } else {
                    (None, Some(self.clone()))
                });
            }
        };

        if mid.is_huge() {
            log::warn!("large winding while splitting brush by plane {}", plane_num);
        }

        let mut halves = [Vec::with_capacity(self.sides.len() + 1), Vec::with_capacity(self.sides.len() + 1)];

        for side in &self.sides {
            let Some(winding) = &side.winding else {
                continue;
            };

            let split = winding.split(&plane, 0.0)?;
            for (half, piece) in halves.iter_mut().zip([split.front, split.back]) {
                if let Some(piece) = piece {
                    half.push(side.with_winding(piece));
                }
            }
        }

        let mut result = halves.map(|sides| {
            let mut brush = Self::from_sides(self.original, self.contents, sides);
            brush.bound();

            let (min, max) = (brush.bounds.min(), brush.bounds.max());
            let bogus = (0..3).any(|axis| min[axis] < -MAX_WORLD_WIDTH || max[axis] > MAX_WORLD_WIDTH);
            if bogus {
                log::debug!("bogus brush after clip");
            }

            (brush.sides.len() >= 3 && !bogus).then_some(brush)
        });

        match &result {
            [Some(_), Some(_)] => {}
            [None, None] => {
                log::debug!("split removed brush");
                return Ok((None, None));
            }
            [front, _] => {
                log::debug!("split not on both sides");
                return Ok(if front.is_some() {
                    (Some(self.clone()), None)
                } else {
                    (None, Some(self.clone()))
                });
            }
        }

        for (i, half) in result.iter_mut().enumerate() {
            let Some(brush) = half else {
                continue;
            };

            // front half is bounded by the flipped plane
            brush.sides.push(Side {
                winding: Some(mid.clone()),
                on_node: true,
                ..Side::new(PlaneNum(plane_num.0 ^ i as u32 ^ 1), Contents::empty(), SurfaceFlags::empty())
            });

            if brush.volume(planes) < MIN_SPLIT_VOLUME {
                log::debug!("tiny volume after clip");
                *half = None;
            }
        }

        let [front, back] = result;
        Ok((front, back))
    } // split
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vec3d;

    fn cube(planes: &mut PlaneRegistry, min: Vec3d, max: Vec3d) -> BspBrush {
        let clip = ClipBox::new(planes, BoundBox::from_minmax(min, max)).unwrap();
        let mut brush = BspBrush::from_clip_box(planes, &clip).unwrap();
        brush.contents = Contents::SOLID;
        for side in &mut brush.sides {
            side.visible = true;
        }
        brush
    }

    #[test]
    fn cube_volume_and_bounds() {
        let mut planes = PlaneRegistry::new(1024);
        let brush = cube(&mut planes, vec3d!(-8.0, -8.0, -8.0), vec3d!(8.0, 24.0, 8.0));

        assert!((brush.volume(&planes) - 16.0 * 32.0 * 16.0).abs() < 1e-6);
        assert_eq!(brush.bounds.min(), vec3d!(-8.0, -8.0, -8.0));
        assert_eq!(brush.bounds.max(), vec3d!(8.0, 24.0, 8.0));
        assert!(brush.sides.iter().all(|side| side.winding.as_ref().unwrap().points.len() == 4));
    }

    #[test]
    fn split_conserves_volume() {
        let mut planes = PlaneRegistry::new(1024);
        let brush = cube(&mut planes, vec3d!(0.0, 0.0, 0.0), vec3d!(64.0, 64.0, 64.0));
        let splitter = planes.find_plane(vec3d!(0.6, 0.8, 0.0), 40.0).unwrap();

        let (front, back) = brush.split(&planes, splitter).unwrap();
        let (front, back) = (front.unwrap(), back.unwrap());

        let total = front.volume(&planes) + back.volume(&planes);
        assert!((total - brush.volume(&planes)).abs() < 1e-3);

        // new sides are on the split plane
        let front_mid = front.sides.last().unwrap();
        let back_mid = back.sides.last().unwrap();
        assert_eq!(front_mid.plane, splitter.opposite());
        assert_eq!(back_mid.plane, splitter);
        assert!(front_mid.on_node && !front_mid.visible);
    }

    #[test]
    fn split_outside_copies_brush() {
        let mut planes = PlaneRegistry::new(1024);
        let brush = cube(&mut planes, vec3d!(0.0, 0.0, 0.0), vec3d!(16.0, 16.0, 16.0));
        let splitter = planes.find_plane(vec3d!(1.0, 0.0, 0.0), 16.05).unwrap();

        let (front, back) = brush.split(&planes, splitter).unwrap();

        assert!(front.is_none());
        assert_eq!(back.unwrap().sides.len(), 6);
    }

    #[test]
    fn plane_test_facing_and_splits() {
        let mut planes = PlaneRegistry::new(1024);
        let brush = cube(&mut planes, vec3d!(0.0, 0.0, 0.0), vec3d!(16.0, 16.0, 16.0));

        let own = planes.find_plane(vec3d!(1.0, 0.0, 0.0), 16.0).unwrap();
        assert_eq!(brush.test_to_plane(&planes, own).side, PlaneSide::BACK | PlaneSide::FACING);

        let cutting = planes.find_plane(vec3d!(0.0, 1.0, 0.0), 8.0).unwrap();
        let test = brush.test_to_plane(&planes, cutting);
        assert_eq!(test.side, PlaneSide::BOTH);
        assert_eq!(test.splits, 4);
        assert!(!test.epsilon_brush);

        let grazing = planes.find_plane(vec3d!(0.0, 0.0, 1.0), 15.5).unwrap();
        assert!(brush.test_to_plane(&planes, grazing).epsilon_brush);
    }
}

// brush.rs
