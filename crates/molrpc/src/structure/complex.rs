use super::{Atom, InstanceId, Molecule, ParentLink, Quaternion, Residue, Vector3};

#[derive(Debug)]
pub struct Complex {
    pub index: i64,
    pub boxed: bool,
    pub locked: bool,
    pub visible: bool,
    pub computing: bool,
    pub box_label: String,
    pub name: String,
    pub index_tag: i64,
    pub split_tag: String,
    pub position: Vector3,
    pub rotation: Quaternion,
    molecules: Vec<Molecule>,
    instance: InstanceId,
    pub(crate) parent: ParentLink,
}

impl Complex {
    pub fn new(index: i64) -> Self {
        Self {
            index,
            boxed: false,
            locked: false,
            visible: true,
            computing: false,
            box_label: String::new(),
            name: "complex".to_string(),
            index_tag: 0,
            split_tag: String::new(),
            position: Vector3::default(),
            rotation: Quaternion::IDENTITY,
            molecules: Vec::new(),
            instance: InstanceId::next(),
            parent: ParentLink::default(),
        }
    }

    pub fn named(index: i64, name: impl Into<String>) -> Self {
        let mut complex = Self::new(index);
        complex.name = name.into();
        complex
    }

    pub fn instance_id(&self) -> InstanceId {
        self.instance
    }

    /// The workspace holding this complex, if any.
    pub fn parent(&self) -> Option<InstanceId> {
        self.parent.get()
    }

    pub fn molecules(&self) -> &[Molecule] {
        &self.molecules
    }

    pub fn molecules_mut(&mut self) -> &mut [Molecule] {
        &mut self.molecules
    }

    pub fn add_molecule(&mut self, mut molecule: Molecule) {
        molecule.parent.attach(self.instance);
        self.molecules.push(molecule);
    }

    pub fn residues(&self) -> impl Iterator<Item = &Residue> {
        self.molecules.iter().flat_map(|m| m.residues())
    }

    pub fn atoms(&self) -> impl Iterator<Item = &Atom> {
        self.molecules.iter().flat_map(|m| m.atoms())
    }

    pub fn atoms_mut(&mut self) -> impl Iterator<Item = &mut Atom> {
        self.molecules
            .iter_mut()
            .flat_map(|m| m.chains_mut().iter_mut())
            .flat_map(|c| c.residues_mut().iter_mut())
            .flat_map(|r| r.atoms_mut().iter_mut())
    }

    /// Copy of the complex-level fields with no molecules, as returned by
    /// complex list requests.
    pub fn to_shallow(&self) -> Complex {
        let mut stub = Complex::new(self.index);
        stub.copy_shallow_fields(self);
        stub
    }

    /// Overwrites every complex-level field (not the index, not the molecules).
    pub fn copy_shallow_fields(&mut self, other: &Complex) {
        self.boxed = other.boxed;
        self.locked = other.locked;
        self.visible = other.visible;
        self.computing = other.computing;
        self.box_label.clone_from(&other.box_label);
        self.name.clone_from(&other.name);
        self.index_tag = other.index_tag;
        self.split_tag.clone_from(&other.split_tag);
        self.position = other.position;
        self.rotation = other.rotation;
    }

    pub(crate) fn adopt(&mut self, molecules: Vec<Molecule>) {
        self.molecules = molecules;
        for molecule in &mut self.molecules {
            molecule.parent.attach(self.instance);
        }
    }
}

impl Clone for Complex {
    fn clone(&self) -> Self {
        let mut copy = self.to_shallow();
        copy.adopt(self.molecules.clone());
        copy
    }
}
