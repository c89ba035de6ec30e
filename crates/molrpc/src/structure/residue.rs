use std::collections::BTreeSet;

use super::{Atom, Bond, Color, InstanceId, ParentLink, RibbonMode, SecondaryStructure};

#[derive(Debug)]
pub struct Residue {
    pub index: i64,
    pub ribboned: bool,
    pub ribbon_size: f32,
    pub ribbon_mode: RibbonMode,
    pub ribbon_color: Color,
    pub labeled: bool,
    pub label_text: String,
    /// Residue type, e.g. `ALA`. Named `type` on the wire.
    pub residue_type: String,
    pub serial: i64,
    pub name: String,
    pub secondary_structure: SecondaryStructure,
    pub ignored_alt_locs: BTreeSet<char>,
    atoms: Vec<Atom>,
    bonds: Vec<Bond>,
    instance: InstanceId,
    pub(crate) parent: ParentLink,
}

impl Residue {
    pub fn new(index: i64) -> Self {
        Self {
            index,
            ribboned: true,
            ribbon_size: 1.0,
            ribbon_mode: RibbonMode::default(),
            ribbon_color: Color::WHITE,
            labeled: false,
            label_text: String::new(),
            residue_type: "ARG".to_string(),
            serial: 0,
            name: "res".to_string(),
            secondary_structure: SecondaryStructure::default(),
            ignored_alt_locs: BTreeSet::new(),
            atoms: Vec::new(),
            bonds: Vec::new(),
            instance: InstanceId::next(),
            parent: ParentLink::default(),
        }
    }

    pub fn instance_id(&self) -> InstanceId {
        self.instance
    }

    /// The chain holding this residue.
    pub fn parent(&self) -> Option<InstanceId> {
        self.parent.get()
    }

    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    pub fn atoms_mut(&mut self) -> &mut [Atom] {
        &mut self.atoms
    }

    pub fn bonds(&self) -> &[Bond] {
        &self.bonds
    }

    pub fn bonds_mut(&mut self) -> &mut [Bond] {
        &mut self.bonds
    }

    pub fn add_atom(&mut self, mut atom: Atom) {
        atom.parent.attach(self.instance);
        self.atoms.push(atom);
    }

    pub fn add_bond(&mut self, mut bond: Bond) {
        bond.parent.attach(self.instance);
        self.bonds.push(bond);
    }

    /// Replaces all children at once and links every one of them.
    pub(crate) fn adopt(&mut self, atoms: Vec<Atom>, bonds: Vec<Bond>) {
        self.atoms = atoms;
        self.bonds = bonds;
        for atom in &mut self.atoms {
            atom.parent.attach(self.instance);
        }
        for bond in &mut self.bonds {
            bond.parent.attach(self.instance);
        }
    }
}

/// The copy is a new, detached instance whose children link to the copy.
impl Clone for Residue {
    fn clone(&self) -> Self {
        let mut copy = Residue {
            index: self.index,
            ribboned: self.ribboned,
            ribbon_size: self.ribbon_size,
            ribbon_mode: self.ribbon_mode,
            ribbon_color: self.ribbon_color,
            labeled: self.labeled,
            label_text: self.label_text.clone(),
            residue_type: self.residue_type.clone(),
            serial: self.serial,
            name: self.name.clone(),
            secondary_structure: self.secondary_structure,
            ignored_alt_locs: self.ignored_alt_locs.clone(),
            atoms: Vec::new(),
            bonds: Vec::new(),
            instance: InstanceId::next(),
            parent: ParentLink::default(),
        };
        copy.adopt(self.atoms.clone(), self.bonds.clone());
        copy
    }
}
