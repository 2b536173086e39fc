use core::fmt;
use core::num::NonZeroU32;

/// Slot number of a Parameter or Expression in its graph arena.
///
/// Stored off by one so `Option<Id>` costs nothing extra. Handles compare
/// equal only when they name the same slot; Space merges rely on that to tell
/// a repeated node from a different node that shares its name.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Id(NonZeroU32);

impl Id {
    /// Handle of arena slot `index`.
    ///
    /// Panics if `index` is `u32::MAX`; arenas are capped below that.
    pub fn from_index(index: u32) -> Self {
        match NonZeroU32::MIN.checked_add(index) {
            Some(slot) => Self(slot),
            None => panic!("arena slot {index} has no handle"),
        }
    }

    pub fn index(self) -> u32 {
        self.0.get() - 1
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({})", self.index())
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.index())
    }
}

pub type ParamId = Id;
pub type ExprId = Id;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_index_survives_the_offset() {
        for i in [0_u32, 1, 7, 513, u32::MAX - 1] {
            assert_eq!(Id::from_index(i).index(), i);
        }
    }

    #[test]
    fn optional_handle_has_no_overhead() {
        assert_eq!(
            core::mem::size_of::<Option<ParamId>>(),
            core::mem::size_of::<u32>()
        );
    }

    #[test]
    fn ids_order_by_slot() {
        let a = ParamId::from_index(2);
        let b = ParamId::from_index(5);
        assert!(a < b);
        assert_eq!(format!("{a}"), "2");
        assert_eq!(format!("{b:?}"), "Id(5)");
    }
}
