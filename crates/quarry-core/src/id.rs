//! Strongly-typed IDs used across Quarry.
//!
//! These are `#[repr(transparent)]` newtypes to keep them cheap and
//! type-safe. Dump, range and result ids are assigned by indexers and are
//! opaque to the query core; repository ids come from the metadata store.

macro_rules! define_id {
    ($name:ident, $raw:ty) => {
        #[derive(
            Copy,
            Clone,
            Eq,
            PartialEq,
            Hash,
            Ord,
            PartialOrd,
            serde::Serialize,
            serde::Deserialize,
        )]
        #[repr(transparent)]
        #[serde(transparent)]
        pub struct $name($raw);

        impl $name {
            #[inline]
            pub const fn new(raw: $raw) -> Self {
                Self(raw)
            }

            #[inline]
            pub const fn to_raw(self) -> $raw {
                self.0
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

define_id!(DumpId, u64);
define_id!(RepoId, i64);

define_id!(DocumentId, u64);
define_id!(RangeId, u64);
define_id!(ResultId, u64);
define_id!(HoverResultId, u64);
define_id!(MonikerId, u64);
define_id!(PackageInformationId, u64);
