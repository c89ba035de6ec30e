//! Field tables for every structural entity.

use serde_json::{Value, json};

use super::fields::{ObjectReader, ObjectWriter};
use super::{Emit, FieldPath, Schema, ValidationError, encode_list_as};
use crate::structure::{
    Atom, AtomRef, Bond, Chain, Color, Complex, Molecule, Quaternion, Residue, UNASSIGNED_INDEX,
    Vector3, Workspace,
};

impl From<Vector3> for Value {
    fn from(v: Vector3) -> Self {
        Value::from(v.to_array().to_vec())
    }
}

impl From<Quaternion> for Value {
    fn from(q: Quaternion) -> Self {
        Value::from(q.to_array().to_vec())
    }
}

impl From<Color> for Value {
    fn from(c: Color) -> Self {
        Value::String(c.to_hex())
    }
}

impl From<AtomRef> for Value {
    fn from(r: AtomRef) -> Self {
        json!({ "index": r.index })
    }
}

impl Schema for Atom {
    // current_conformer, conformer_count and vdw_radius are decode-only:
    // only the authoritative side emits them.
    fn encode_as(&self, emit: Emit) -> Value {
        ObjectWriter::new()
            .field("index", self.index)
            .field("selected", self.selected)
            .field("labeled", self.labeled)
            .field("atom_rendering", self.atom_rendering)
            .field("surface_rendering", self.surface_rendering)
            .field("exists", self.exists)
            .field("is_het", self.is_het)
            .field("occupancy", self.occupancy)
            .field("bfactor", self.bfactor)
            .field("acceptor", self.acceptor)
            .field("donor", self.donor)
            .field("polar_hydrogen", self.polar_hydrogen)
            .field("atom_mode", self.atom_mode.as_raw())
            .field("serial", self.serial)
            .field_when(emit.is_authoritative(), "current_conformer", self.current_conformer)
            .field_when(emit.is_authoritative(), "conformer_count", self.conformer_count)
            .field(
                "positions",
                self.positions.iter().copied().map(Value::from).collect::<Vec<_>>(),
            )
            .field("label_text", self.label_text.as_str())
            .field("atom_color", self.atom_color)
            .field("atom_scale", self.atom_scale)
            .field("surface_color", self.surface_color)
            .field("symbol", self.symbol.as_str())
            .field("name", self.name.as_str())
            .field("position", self.position)
            .field("formal_charge", self.formal_charge)
            .field("partial_charge", self.partial_charge)
            .field_when(emit.is_authoritative(), "vdw_radius", self.vdw_radius)
            .field("alt_loc", self.alt_loc.to_string())
            .finish()
    }

    fn decode_at(value: &Value, path: &FieldPath) -> Result<Self, ValidationError> {
        let r = ObjectReader::new(value, path)?;
        let mut atom = Atom::new(r.required("index")?);
        r.optional("selected", &mut atom.selected)?;
        r.optional("labeled", &mut atom.labeled)?;
        r.optional("atom_rendering", &mut atom.atom_rendering)?;
        r.optional("surface_rendering", &mut atom.surface_rendering)?;
        r.optional("exists", &mut atom.exists)?;
        r.optional("is_het", &mut atom.is_het)?;
        r.optional("occupancy", &mut atom.occupancy)?;
        r.optional("bfactor", &mut atom.bfactor)?;
        r.optional("acceptor", &mut atom.acceptor)?;
        r.optional("donor", &mut atom.donor)?;
        r.optional("polar_hydrogen", &mut atom.polar_hydrogen)?;
        r.optional("atom_mode", &mut atom.atom_mode)?;
        r.optional("serial", &mut atom.serial)?;
        r.optional("current_conformer", &mut atom.current_conformer)?;
        r.optional("conformer_count", &mut atom.conformer_count)?;
        r.optional("positions", &mut atom.positions)?;
        r.optional("label_text", &mut atom.label_text)?;
        r.optional("atom_color", &mut atom.atom_color)?;
        r.optional("atom_scale", &mut atom.atom_scale)?;
        r.optional("surface_color", &mut atom.surface_color)?;
        r.optional("symbol", &mut atom.symbol)?;
        r.optional("name", &mut atom.name)?;
        r.optional("position", &mut atom.position)?;
        r.optional("formal_charge", &mut atom.formal_charge)?;
        r.optional("partial_charge", &mut atom.partial_charge)?;
        r.optional("vdw_radius", &mut atom.vdw_radius)?;
        r.optional("alt_loc", &mut atom.alt_loc)?;
        Ok(atom)
    }
}

impl Schema for Bond {
    fn encode_as(&self, _emit: Emit) -> Value {
        ObjectWriter::new()
            .field("index", self.index)
            .field("atom1", self.atom1)
            .field("atom2", self.atom2)
            .field("kind", self.kind.as_raw())
            .finish()
    }

    fn decode_at(value: &Value, path: &FieldPath) -> Result<Self, ValidationError> {
        let r = ObjectReader::new(value, path)?;
        let mut bond = Bond::new(r.required("index")?, r.required("atom1")?, r.required("atom2")?);
        r.optional("kind", &mut bond.kind)?;
        Ok(bond)
    }
}

impl Schema for Residue {
    fn encode_as(&self, emit: Emit) -> Value {
        let alt_locs: Vec<String> = self.ignored_alt_locs.iter().map(char::to_string).collect();
        ObjectWriter::new()
            .field("index", self.index)
            .field("atoms", encode_list_as(self.atoms(), emit))
            .field("bonds", encode_list_as(self.bonds(), emit))
            .field("ribboned", self.ribboned)
            .field("ribbon_size", self.ribbon_size)
            .field("ribbon_mode", self.ribbon_mode.as_raw())
            .field("ribbon_color", self.ribbon_color)
            .field("labeled", self.labeled)
            .field("label_text", self.label_text.as_str())
            .field("type", self.residue_type.as_str())
            .field("serial", self.serial)
            .field("name", self.name.as_str())
            .field("secondary_structure", self.secondary_structure.as_raw())
            .field("ignored_alt_locs", alt_locs)
            .finish()
    }

    fn decode_at(value: &Value, path: &FieldPath) -> Result<Self, ValidationError> {
        let r = ObjectReader::new(value, path)?;
        let mut residue = Residue::new(r.required("index")?);
        let atoms = r.children("atoms")?;
        let bonds = r.children("bonds")?;
        r.optional("ribboned", &mut residue.ribboned)?;
        r.optional("ribbon_size", &mut residue.ribbon_size)?;
        r.optional("ribbon_mode", &mut residue.ribbon_mode)?;
        r.optional("ribbon_color", &mut residue.ribbon_color)?;
        r.optional("labeled", &mut residue.labeled)?;
        r.optional("label_text", &mut residue.label_text)?;
        r.optional("type", &mut residue.residue_type)?;
        r.optional("serial", &mut residue.serial)?;
        r.optional("name", &mut residue.name)?;
        r.optional("secondary_structure", &mut residue.secondary_structure)?;
        r.optional("ignored_alt_locs", &mut residue.ignored_alt_locs)?;
        residue.adopt(atoms, bonds);
        Ok(residue)
    }
}

impl Schema for Chain {
    fn encode_as(&self, emit: Emit) -> Value {
        ObjectWriter::new()
            .field("index", self.index)
            .field("name", self.name.as_str())
            .field("residues", encode_list_as(self.residues(), emit))
            .finish()
    }

    fn decode_at(value: &Value, path: &FieldPath) -> Result<Self, ValidationError> {
        let r = ObjectReader::new(value, path)?;
        let mut chain = Chain::new(r.required("index")?);
        r.optional("name", &mut chain.name)?;
        let residues = r.children("residues")?;
        chain.adopt(residues);
        Ok(chain)
    }
}

impl Schema for Molecule {
    // conformer_count is decode-only.
    fn encode_as(&self, emit: Emit) -> Value {
        ObjectWriter::new()
            .field("index", self.index)
            .field("chains", encode_list_as(self.chains(), emit))
            .field("name", self.name.as_str())
            .field("associated", self.associated.clone())
            .field_when(emit.is_authoritative(), "conformer_count", self.conformer_count)
            .field("current_conformer", self.current_conformer)
            .finish()
    }

    fn decode_at(value: &Value, path: &FieldPath) -> Result<Self, ValidationError> {
        let r = ObjectReader::new(value, path)?;
        let mut molecule = Molecule::new(UNASSIGNED_INDEX);
        r.optional("index", &mut molecule.index)?;
        let chains = r.children("chains")?;
        r.optional("name", &mut molecule.name)?;
        r.optional("associated", &mut molecule.associated)?;
        r.optional("conformer_count", &mut molecule.conformer_count)?;
        r.optional("current_conformer", &mut molecule.current_conformer)?;
        molecule.adopt(chains);
        Ok(molecule)
    }
}

impl Schema for Complex {
    fn encode_as(&self, emit: Emit) -> Value {
        ObjectWriter::new()
            .field("index", self.index)
            .field("boxed", self.boxed)
            .field("locked", self.locked)
            .field("visible", self.visible)
            .field("computing", self.computing)
            .field("box_label", self.box_label.as_str())
            .field("name", self.name.as_str())
            .field("index_tag", self.index_tag)
            .field("split_tag", self.split_tag.as_str())
            .field("position", self.position)
            .field("rotation", self.rotation)
            .field("molecules", encode_list_as(self.molecules(), emit))
            .finish()
    }

    fn decode_at(value: &Value, path: &FieldPath) -> Result<Self, ValidationError> {
        let r = ObjectReader::new(value, path)?;
        let mut complex = Complex::new(r.required("index")?);
        r.optional("boxed", &mut complex.boxed)?;
        r.optional("locked", &mut complex.locked)?;
        r.optional("visible", &mut complex.visible)?;
        r.optional("computing", &mut complex.computing)?;
        r.optional("box_label", &mut complex.box_label)?;
        r.optional("name", &mut complex.name)?;
        r.optional("index_tag", &mut complex.index_tag)?;
        r.optional("split_tag", &mut complex.split_tag)?;
        r.optional("position", &mut complex.position)?;
        r.optional("rotation", &mut complex.rotation)?;
        let molecules = r.children("molecules")?;
        complex.adopt(molecules);
        Ok(complex)
    }
}

impl Schema for Workspace {
    fn encode_as(&self, emit: Emit) -> Value {
        ObjectWriter::new()
            .field("complexes", encode_list_as(self.complexes(), emit))
            .field("position", self.position)
            .field("rotation", self.rotation)
            .field("scale", self.scale)
            .finish()
    }

    fn decode_at(value: &Value, path: &FieldPath) -> Result<Self, ValidationError> {
        let r = ObjectReader::new(value, path)?;
        let mut workspace = Workspace::new();
        let complexes = r.children("complexes")?;
        r.optional("position", &mut workspace.position)?;
        r.optional("rotation", &mut workspace.rotation)?;
        r.optional("scale", &mut workspace.scale)?;
        workspace.adopt(complexes);
        Ok(workspace)
    }
}
