use super::{Atom, Complex, InstanceId, ParentLink, Quaternion, Vector3};

/// Root of the structural graph. Has no index of its own.
#[derive(Debug)]
pub struct Workspace {
    pub position: Vector3,
    pub rotation: Quaternion,
    pub scale: Vector3,
    complexes: Vec<Complex>,
    instance: InstanceId,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            position: Vector3::default(),
            rotation: Quaternion::IDENTITY,
            scale: Vector3::splat(0.02),
            complexes: Vec::new(),
            instance: InstanceId::next(),
        }
    }

    pub fn instance_id(&self) -> InstanceId {
        self.instance
    }

    pub fn complexes(&self) -> &[Complex] {
        &self.complexes
    }

    pub fn complexes_mut(&mut self) -> &mut [Complex] {
        &mut self.complexes
    }

    pub fn complex(&self, index: i64) -> Option<&Complex> {
        self.complexes.iter().find(|c| c.index == index)
    }

    pub fn complex_mut(&mut self, index: i64) -> Option<&mut Complex> {
        self.complexes.iter_mut().find(|c| c.index == index)
    }

    pub fn atoms(&self) -> impl Iterator<Item = &Atom> {
        self.complexes.iter().flat_map(|c| c.atoms())
    }

    pub fn atoms_mut(&mut self) -> impl Iterator<Item = &mut Atom> {
        self.complexes.iter_mut().flat_map(|c| c.atoms_mut())
    }

    pub fn add_complex(&mut self, mut complex: Complex) {
        complex.parent.attach(self.instance);
        self.complexes.push(complex);
    }

    /// Swaps in `complex` for the stored complex with the same index.
    ///
    /// Returns the previous complex, or gives `complex` back if no complex
    /// with that index exists.
    pub fn replace_complex(&mut self, mut complex: Complex) -> Result<Complex, Complex> {
        match self.complexes.iter().position(|c| c.index == complex.index) {
            Some(pos) => {
                complex.parent.attach(self.instance);
                let mut old = std::mem::replace(&mut self.complexes[pos], complex);
                old.parent = ParentLink::default();
                Ok(old)
            }
            None => Err(complex),
        }
    }

    pub fn remove_complex(&mut self, index: i64) -> Option<Complex> {
        let pos = self.complexes.iter().position(|c| c.index == index)?;
        let mut removed = self.complexes.remove(pos);
        removed.parent = ParentLink::default();
        Some(removed)
    }

    pub(crate) fn adopt(&mut self, complexes: Vec<Complex>) {
        self.complexes = complexes;
        for complex in &mut self.complexes {
            complex.parent.attach(self.instance);
        }
    }
}

impl Clone for Workspace {
    fn clone(&self) -> Self {
        let mut copy = Workspace::new();
        copy.position = self.position;
        copy.rotation = self.rotation;
        copy.scale = self.scale;
        copy.adopt(self.complexes.clone());
        copy
    }
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new()
    }
}
