use super::{Atom, Chain, InstanceId, ParentLink, Residue, UNASSIGNED_INDEX};

/// `conformer_count` is reported by the workspace and never sent back.
#[derive(Debug)]
pub struct Molecule {
    pub index: i64,
    pub name: String,
    pub associated: Vec<String>,
    pub conformer_count: i64,
    pub current_conformer: i64,
    chains: Vec<Chain>,
    instance: InstanceId,
    pub(crate) parent: ParentLink,
}

impl Molecule {
    pub fn new(index: i64) -> Self {
        Self {
            index,
            name: "molecule".to_string(),
            associated: Vec::new(),
            conformer_count: 1,
            current_conformer: 0,
            chains: Vec::new(),
            instance: InstanceId::next(),
            parent: ParentLink::default(),
        }
    }

    pub fn instance_id(&self) -> InstanceId {
        self.instance
    }

    /// The complex holding this molecule.
    pub fn parent(&self) -> Option<InstanceId> {
        self.parent.get()
    }

    pub fn chains(&self) -> &[Chain] {
        &self.chains
    }

    pub fn chains_mut(&mut self) -> &mut [Chain] {
        &mut self.chains
    }

    pub fn add_chain(&mut self, mut chain: Chain) {
        chain.parent.attach(self.instance);
        self.chains.push(chain);
    }

    pub fn residues(&self) -> impl Iterator<Item = &Residue> {
        self.chains.iter().flat_map(|c| c.residues().iter())
    }

    pub fn atoms(&self) -> impl Iterator<Item = &Atom> {
        self.residues().flat_map(|r| r.atoms().iter())
    }

    pub(crate) fn adopt(&mut self, chains: Vec<Chain>) {
        self.chains = chains;
        for chain in &mut self.chains {
            chain.parent.attach(self.instance);
        }
    }
}

impl Clone for Molecule {
    fn clone(&self) -> Self {
        let mut copy = Molecule::new(self.index);
        copy.name.clone_from(&self.name);
        copy.associated.clone_from(&self.associated);
        copy.conformer_count = self.conformer_count;
        copy.current_conformer = self.current_conformer;
        copy.adopt(self.chains.clone());
        copy
    }
}

impl Default for Molecule {
    fn default() -> Self {
        Self::new(UNASSIGNED_INDEX)
    }
}
