use serde::{Deserialize, Serialize};

use super::{Atom, BondKind, InstanceId, ParentLink, UNASSIGNED_INDEX};

/// Index-only stub standing in for a full atom inside a bond.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AtomRef {
    pub index: i64,
}

impl From<&Atom> for AtomRef {
    fn from(atom: &Atom) -> Self {
        Self { index: atom.index }
    }
}

#[derive(Debug, Clone)]
pub struct Bond {
    pub index: i64,
    pub atom1: AtomRef,
    pub atom2: AtomRef,
    pub kind: BondKind,
    pub(crate) parent: ParentLink,
}

impl Bond {
    pub fn new(index: i64, atom1: AtomRef, atom2: AtomRef) -> Self {
        Self {
            index,
            atom1,
            atom2,
            kind: BondKind::default(),
            parent: ParentLink::default(),
        }
    }

    pub fn between(a: &Atom, b: &Atom) -> Self {
        Self::new(UNASSIGNED_INDEX, a.into(), b.into())
    }

    pub fn with_kind(mut self, kind: BondKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn parent(&self) -> Option<InstanceId> {
        self.parent.get()
    }

    pub fn connects(&self, atom_index: i64) -> bool {
        self.atom1.index == atom_index || self.atom2.index == atom_index
    }
}
