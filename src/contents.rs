///! Brush contents and surface flags

bitflags::bitflags! {
    /// Volume contents
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct Contents: u32 {
        const SOLID        = 0x00000001;
        const WINDOW       = 0x00000002;
        const AUX          = 0x00000004;
        const LAVA         = 0x00000008;
        const SLIME        = 0x00000010;
        const WATER        = 0x00000020;
        const MIST         = 0x00000040;

        const AREA_PORTAL  = 0x00008000;
        const PLAYER_CLIP  = 0x00010000;
        const MONSTER_CLIP = 0x00020000;

        const ORIGIN       = 0x01000000;
        const DETAIL       = 0x08000000;
        const TRANSLUCENT  = 0x10000000;
        const LADDER       = 0x20000000;
    }
}

/// Last content bit affecting visibility
pub const LAST_VISIBLE_CONTENTS: Contents = Contents::MIST;

impl Contents {
    /// Liquid contents
    pub const LIQUID: Self = Self::LAVA.union(Self::SLIME).union(Self::WATER);

    /// Clip contents
    pub const CLIP: Self = Self::PLAYER_CLIP.union(Self::MONSTER_CLIP);

    /// Contents that are visible (or at least affect visibility)
    pub const VISIBLE: Self = Self::SOLID
        .union(Self::WINDOW)
        .union(Self::AUX)
        .union(Self::LIQUID)
        .union(Self::MIST);

    /// Get the most significant visible content bit, which is the lowest one
    pub fn visible(self) -> Self {
        let mut bit = 1;

        while bit <= LAST_VISIBLE_CONTENTS.bits() {
            if self.bits() & bit != 0 {
                return Self::from_bits_retain(bit);
            }
            bit <<= 1;
        }

        Self::empty()
    }
}

bitflags::bitflags! {
    /// Brush side surface flags
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct SurfaceFlags: u32 {
        const LIGHT      = 0x0001;
        const SLICK      = 0x0002;
        const SKY        = 0x0004;
        const WARP       = 0x0008;
        const BLEND_33   = 0x0010;
        const BLEND_66   = 0x0020;
        const FLOWING    = 0x0040;
        const NO_DRAW    = 0x0080;
        const HINT       = 0x0100;
        const SKIP       = 0x0200;
        const ALPHA_TEST = 0x0400;
    }
}

impl SurfaceFlags {
    /// Surfaces that make brush translucent
    pub const TRANSLUCENT: Self = Self::BLEND_33.union(Self::BLEND_66).union(Self::ALPHA_TEST);
}

bitflags::bitflags! {
    /// Relation of volume and plane
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct PlaneSide: u32 {
        const FRONT  = 1;
        const BACK   = 2;
        const BOTH   = 3;
        const FACING = 4;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visible_contents_picks_lowest_bit() {
        assert_eq!((Contents::WATER | Contents::WINDOW).visible(), Contents::WINDOW);
        assert_eq!((Contents::DETAIL | Contents::MIST).visible(), Contents::MIST);
        assert_eq!((Contents::DETAIL | Contents::PLAYER_CLIP).visible(), Contents::empty());
    }
}

// contents.rs
