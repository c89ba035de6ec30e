use super::{AtomRenderingMode, Color, InstanceId, ParentLink, UNASSIGNED_INDEX, Vector3};

/// Leaf of the structural graph.
///
/// `current_conformer`, `conformer_count` and `vdw_radius` are populated by
/// decoding only; they are never sent back to the workspace.
#[derive(Debug, Clone)]
pub struct Atom {
    pub index: i64,
    pub selected: bool,
    pub labeled: bool,
    pub atom_rendering: bool,
    pub surface_rendering: bool,
    pub exists: bool,
    pub is_het: bool,
    pub occupancy: f32,
    pub bfactor: f32,
    pub acceptor: bool,
    pub donor: bool,
    pub polar_hydrogen: bool,
    pub atom_mode: AtomRenderingMode,
    pub serial: i64,
    pub current_conformer: i64,
    pub conformer_count: i64,
    pub positions: Vec<Vector3>,
    pub label_text: String,
    pub atom_color: Color,
    pub atom_scale: f32,
    pub surface_color: Color,
    pub symbol: String,
    pub name: String,
    pub position: Vector3,
    pub formal_charge: f32,
    pub partial_charge: f32,
    pub vdw_radius: f32,
    pub alt_loc: char,
    pub(crate) parent: ParentLink,
}

impl Atom {
    pub fn new(index: i64) -> Self {
        Self {
            index,
            selected: false,
            labeled: false,
            atom_rendering: true,
            surface_rendering: false,
            exists: true,
            is_het: false,
            occupancy: 1.0,
            bfactor: 0.0,
            acceptor: false,
            donor: false,
            polar_hydrogen: false,
            atom_mode: AtomRenderingMode::default(),
            serial: 0,
            current_conformer: 0,
            conformer_count: 1,
            positions: Vec::new(),
            label_text: String::new(),
            atom_color: Color::GREY,
            atom_scale: 0.5,
            surface_color: Color::WHITE,
            symbol: "C".to_string(),
            name: "default".to_string(),
            position: Vector3::default(),
            formal_charge: 0.0,
            partial_charge: 0.0,
            vdw_radius: 0.0,
            alt_loc: '.',
            parent: ParentLink::default(),
        }
    }

    /// Convenience for tests and local construction.
    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = symbol.into();
        self
    }

    pub fn with_position(mut self, position: Vector3) -> Self {
        self.position = position;
        self
    }

    /// The residue holding this atom.
    pub fn parent(&self) -> Option<InstanceId> {
        self.parent.get()
    }
}

impl Default for Atom {
    fn default() -> Self {
        Self::new(UNASSIGNED_INDEX)
    }
}
