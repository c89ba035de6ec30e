use super::{Atom, InstanceId, ParentLink, Residue};

#[derive(Debug)]
pub struct Chain {
    pub index: i64,
    pub name: String,
    residues: Vec<Residue>,
    instance: InstanceId,
    pub(crate) parent: ParentLink,
}

impl Chain {
    pub fn new(index: i64) -> Self {
        Self {
            index,
            name: "chain".to_string(),
            residues: Vec::new(),
            instance: InstanceId::next(),
            parent: ParentLink::default(),
        }
    }

    pub fn instance_id(&self) -> InstanceId {
        self.instance
    }

    /// The molecule holding this chain.
    pub fn parent(&self) -> Option<InstanceId> {
        self.parent.get()
    }

    pub fn residues(&self) -> &[Residue] {
        &self.residues
    }

    pub fn residues_mut(&mut self) -> &mut [Residue] {
        &mut self.residues
    }

    pub fn add_residue(&mut self, mut residue: Residue) {
        residue.parent.attach(self.instance);
        self.residues.push(residue);
    }

    pub fn atoms(&self) -> impl Iterator<Item = &Atom> {
        self.residues.iter().flat_map(|r| r.atoms().iter())
    }

    pub(crate) fn adopt(&mut self, residues: Vec<Residue>) {
        self.residues = residues;
        for residue in &mut self.residues {
            residue.parent.attach(self.instance);
        }
    }
}

impl Clone for Chain {
    fn clone(&self) -> Self {
        let mut copy = Chain::new(self.index);
        copy.name.clone_from(&self.name);
        copy.adopt(self.residues.clone());
        copy
    }
}
