//! Structural graph model: Workspace → Complex → Molecule → Chain → Residue → Atom/Bond.
//!
//! Parents own their children through ordered `Vec`s. The reverse link is a
//! [`ParentLink`] holding the parent's [`InstanceId`]: a non-owning handle that
//! never contributes to lifetime. Links are set when a child is attached to a
//! container, either by the decode hook or by an `add_*` method.

mod atom;
mod bond;
mod chain;
mod color;
mod complex;
mod enums;
mod math;
mod molecule;
mod residue;
mod workspace;

use std::sync::atomic::{AtomicU64, Ordering};

pub use atom::Atom;
pub use bond::{AtomRef, Bond};
pub use chain::Chain;
pub use color::{Color, ColorParseError};
pub use complex::Complex;
pub use enums::{AtomRenderingMode, BondKind, RibbonMode, SecondaryStructure};
pub(crate) use enums::wire_enum;
pub use math::{Quaternion, Vector3};
pub use molecule::Molecule;
pub use residue::Residue;
pub use workspace::Workspace;

/// Index value meaning "not yet assigned by the authoritative side".
pub const UNASSIGNED_INDEX: i64 = -1;

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

/// Process-local identity of one in-memory container instance.
///
/// Unlike `index`, which is assigned by the remote workspace and may repeat
/// (e.g. several `-1` placeholders), every constructed container gets a
/// distinct `InstanceId`. It is never sent over the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(u64);

impl InstanceId {
    pub(crate) fn next() -> Self {
        Self(NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for InstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Non-owning back-reference from a child to the container holding it.
///
/// Cloning a child yields a detached copy: the clone is not contained in the
/// original parent, so it must not claim to be.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ParentLink(Option<InstanceId>);

impl ParentLink {
    pub fn get(&self) -> Option<InstanceId> {
        self.0
    }

    pub fn is_attached(&self) -> bool {
        self.0.is_some()
    }

    pub(crate) fn attach(&mut self, parent: InstanceId) {
        self.0 = Some(parent);
    }
}

impl Clone for ParentLink {
    fn clone(&self) -> Self {
        Self(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_ids_are_distinct() {
        let a = InstanceId::next();
        let b = InstanceId::next();
        assert_ne!(a, b);
    }

    #[test]
    fn cloned_link_is_detached() {
        let mut link = ParentLink::default();
        link.attach(InstanceId::next());
        assert!(link.is_attached());
        assert!(!link.clone().is_attached());
    }
}
