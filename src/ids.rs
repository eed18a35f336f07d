//! Fixed-width byte identifiers and the intern-service trait boundary.
//!
//! The identifier-interning service itself is out of scope (spec §1): this
//! module only defines the byte-id newtypes the rest of the crate moves
//! around, and the resolver traits a caller's real interner must implement.
//! The inline storage mirrors the teacher crate's `InternId`
//! (`core/string_intern.rs`) in spirit — a lightweight, `Copy`-ish id — but
//! here the id *is* the wire-format bytes rather than a local index, since
//! those bytes are what gets written into row keys.

use smallvec::SmallVec;
use std::fmt;

macro_rules! byte_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(SmallVec<[u8; 8]>);

        impl $name {
            /// Wrap raw id bytes as received from the intern service.
            pub fn new(bytes: &[u8]) -> Self {
                Self(SmallVec::from_slice(bytes))
            }

            /// Borrow the id's bytes.
            pub fn as_bytes(&self) -> &[u8] {
                &self.0
            }

            /// Width in bytes.
            pub fn len(&self) -> usize {
                self.0.len()
            }

            /// True if the id holds zero bytes (never valid on the wire,
            /// only used as a placeholder in tests).
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}(", stringify!($name))?;
                for b in &self.0 {
                    write!(f, "{b:02x}")?;
                }
                write!(f, ")")
            }
        }
    };
}

byte_id!(MetricId, "A metric name's interned byte id.");
byte_id!(TagNameId, "A tag name's interned byte id.");
byte_id!(TagValueId, "A tag value's interned byte id.");

/// Resolves metric names to ids (consumed collaborator, spec §6).
pub trait MetricResolver {
    /// Resolve a metric name to its id. `Err(NoSuchName)` on a miss.
    fn id(&self, name: &str) -> crate::error::Result<MetricId>;
    /// The fixed byte width of every metric id (`W_m`).
    fn width(&self) -> u8;
}

/// Resolves tag names to ids (consumed collaborator, spec §6).
pub trait TagNameResolver {
    /// Resolve a tag name to its id. `Err(NoSuchName)` on a miss.
    fn id(&self, name: &str) -> crate::error::Result<TagNameId>;
    /// The fixed byte width of every tag name id (`W_n`).
    fn width(&self) -> u8;
}

/// Resolves tag values to ids (consumed collaborator, spec §6).
pub trait TagValueResolver {
    /// Resolve a tag value to its id. `Err(NoSuchName)` on a miss.
    fn id(&self, value: &str) -> crate::error::Result<TagValueId>;
    /// The fixed byte width of every tag value id (`W_v`).
    fn width(&self) -> u8;
}
