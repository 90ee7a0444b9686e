use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign, Not};

/// Geometry categories taking part in a ray query.
///
/// Triangles outside the mask neither occlude nor receive.
#[derive(Copy, Clone, Default, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct SceneMask(u32);

impl SceneMask {
    pub const NONE: Self = Self(0);
    pub const OPAQUE: Self = Self(1 << 0);
    pub const TRANSLUCENT: Self = Self(1 << 1);
    /// Helper geometry (ground planes, proxies) that is not part of the model.
    pub const VIRTUAL: Self = Self(1 << 2);
    pub const ALL: Self = Self(Self::OPAQUE.0 | Self::TRANSLUCENT.0 | Self::VIRTUAL.0);

    pub const fn from_bits_truncate(bits: u32) -> Self {
        Self(bits & Self::ALL.0)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for SceneMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for SceneMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for SceneMask {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl Not for SceneMask {
    type Output = Self;

    fn not(self) -> Self {
        Self(!self.0 & Self::ALL.0)
    }
}

impl fmt::Debug for SceneMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (Self::OPAQUE, "OPAQUE"),
            (Self::TRANSLUCENT, "TRANSLUCENT"),
            (Self::VIRTUAL, "VIRTUAL"),
        ];
        let mut set = f.debug_set();
        for (flag, name) in names {
            if self.contains(flag) {
                set.entry(&format_args!("{name}"));
            }
        }
        set.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_covers_every_category() {
        assert!(SceneMask::ALL.contains(SceneMask::OPAQUE | SceneMask::VIRTUAL));
        assert!(SceneMask::ALL.intersects(SceneMask::TRANSLUCENT));
        assert!(!SceneMask::NONE.intersects(SceneMask::ALL));
    }

    #[test]
    fn complement_stays_within_known_bits() {
        assert_eq!(!SceneMask::OPAQUE, SceneMask::TRANSLUCENT | SceneMask::VIRTUAL);
        assert_eq!(!SceneMask::ALL, SceneMask::NONE);
        assert_eq!(SceneMask::from_bits_truncate(u32::MAX), SceneMask::ALL);
    }

    #[test]
    fn debug_lists_flags() {
        let mask = SceneMask::OPAQUE | SceneMask::VIRTUAL;
        assert_eq!(format!("{mask:?}"), "{OPAQUE, VIRTUAL}");
    }
}
