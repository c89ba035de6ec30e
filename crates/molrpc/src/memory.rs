//! In-process collaborator holding one live workspace.
//!
//! [`InMemoryWorkspace`] is the authoritative side for local embedding and
//! tests: every entity that enters it without an index (`-1`) gets a fresh
//! non-negative one, and writing streams write straight into the stored atoms.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::dispatcher::{Collaborator, NotificationKind, RemoteError};
use crate::registry::{Payload, PluginData, ops};
use crate::streams::{LiveStream, StreamOpening, StreamType};
use crate::structure::{Color, Complex, UNASSIGNED_INDEX, Vector3, Workspace};

/// Stream error code: an atom index given at open time is not in the workspace.
pub const STREAM_ATOM_NOT_FOUND: i64 = 1;
/// Stream error code: the stream type has no in-memory writer.
pub const STREAM_UNSUPPORTED: i64 = 2;

/// Last camera request received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraFocus {
    Zoom(Vec<i64>),
    Center(Vec<i64>),
}

struct State {
    workspace: Workspace,
    next_index: i64,
    shapes: Vec<Value>,
    next_shape_index: i64,
    focus: Option<CameraFocus>,
}

pub struct InMemoryWorkspace {
    state: Arc<Mutex<State>>,
    plugin_data: PluginData,
    notifications: Mutex<Vec<(NotificationKind, String)>>,
}

impl InMemoryWorkspace {
    /// Fails when an existing index is too large to number new entities after it.
    pub fn new(mut workspace: Workspace) -> Result<Self, RemoteError> {
        let mut next_index = 0;
        for complex in workspace.complexes_mut() {
            claim_indices(&mut next_index, complex)?;
        }
        Ok(Self::with_state(workspace, next_index))
    }

    fn with_state(workspace: Workspace, next_index: i64) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                workspace,
                next_index,
                shapes: Vec::new(),
                next_shape_index: 0,
                focus: None,
            })),
            plugin_data: PluginData::default(),
            notifications: Mutex::new(Vec::new()),
        }
    }

    pub fn with_plugin_data(mut self, plugin_data: PluginData) -> Self {
        self.plugin_data = plugin_data;
        self
    }

    /// Copy of the current workspace.
    pub fn workspace(&self) -> Result<Workspace, RemoteError> {
        Ok(self.lock()?.workspace.clone())
    }

    pub fn last_focus(&self) -> Result<Option<CameraFocus>, RemoteError> {
        Ok(self.lock()?.focus.clone())
    }

    pub fn shapes(&self) -> Result<Vec<Value>, RemoteError> {
        Ok(self.lock()?.shapes.clone())
    }

    /// Notifications received so far, oldest first.
    pub fn notifications(&self) -> Vec<(NotificationKind, String)> {
        match self.notifications.lock() {
            Ok(seen) => seen.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, RemoteError> {
        lock_state(&self.state)
    }

    fn request_complexes(&self, indices: Vec<i64>) -> Result<Payload, RemoteError> {
        let state = self.lock()?;
        let found: Vec<Complex> = indices
            .iter()
            .filter_map(|index| state.workspace.complex(*index).cloned())
            .collect();
        if found.len() < indices.len() {
            tracing::debug!(
                requested = indices.len(),
                found = found.len(),
                "Skipped unknown complex indices"
            );
        }
        Ok(found.into())
    }

    fn update_workspace(&self, mut workspace: Workspace) -> Result<Payload, RemoteError> {
        let mut state = self.lock()?;
        for complex in workspace.complexes_mut() {
            claim_indices(&mut state.next_index, complex)?;
        }
        state.workspace = workspace;
        Ok(Payload::Null)
    }

    fn update_shallow(&self, complexes: Vec<Complex>) -> Result<Payload, RemoteError> {
        let mut state = self.lock()?;
        for complex in &complexes {
            let target = state
                .workspace
                .complex_mut(complex.index)
                .ok_or_else(|| unknown_complex(complex.index))?;
            target.copy_shallow_fields(complex);
        }
        Ok(Payload::Null)
    }

    fn update_deep(&self, complexes: Vec<Complex>) -> Result<Payload, RemoteError> {
        let mut guard = self.lock()?;
        let State {
            workspace,
            next_index,
            ..
        } = &mut *guard;
        for mut complex in complexes {
            let index = complex.index;
            claim_indices(next_index, &mut complex)?;
            workspace
                .replace_complex(complex)
                .map_err(|_| unknown_complex(index))?;
        }
        Ok(Payload::Null)
    }

    fn add(&self, complexes: Vec<Complex>) -> Result<Payload, RemoteError> {
        let mut guard = self.lock()?;
        let State {
            workspace,
            next_index,
            ..
        } = &mut *guard;
        let mut added = Vec::with_capacity(complexes.len());
        for mut complex in complexes {
            // Added complexes are new; a taken index is replaced with a fresh one.
            if workspace.complex(complex.index).is_some() {
                tracing::debug!(index = complex.index, "Renumbering added complex");
                complex.index = UNASSIGNED_INDEX;
            }
            claim_indices(next_index, &mut complex)?;
            added.push(complex.clone());
            workspace.add_complex(complex);
        }
        tracing::debug!(count = added.len(), "Added complexes to workspace");
        Ok(added.into())
    }

    fn remove(&self, complexes: Vec<Complex>) -> Result<Payload, RemoteError> {
        let mut state = self.lock()?;
        for complex in &complexes {
            state
                .workspace
                .remove_complex(complex.index)
                .ok_or_else(|| unknown_complex(complex.index))?;
        }
        Ok(Payload::Null)
    }

    fn focus(
        &self,
        indices: Vec<i64>,
        focus: fn(Vec<i64>) -> CameraFocus,
    ) -> Result<Payload, RemoteError> {
        let mut state = self.lock()?;
        if let Some(missing) = indices.iter().find(|i| state.workspace.complex(**i).is_none()) {
            return Err(unknown_complex(*missing));
        }
        state.focus = Some(focus(indices));
        Ok(Payload::Null)
    }

    fn upload_shapes(&self, shapes: Value) -> Result<Payload, RemoteError> {
        let Value::Array(shapes) = shapes else {
            return Err(RemoteError::new("upload_shapes expects a list of shapes"));
        };
        let mut state = self.lock()?;
        let mut uploaded = Vec::with_capacity(shapes.len());
        for shape in shapes {
            let Value::Object(mut shape) = shape else {
                return Err(RemoteError::new("every shape must be an object"));
            };
            let index = match shape.get("index").and_then(Value::as_i64) {
                Some(index) if index != UNASSIGNED_INDEX => index,
                _ => {
                    let index = state.next_shape_index;
                    shape.insert("index".to_string(), index.into());
                    index
                }
            };
            let after = index.checked_add(1).ok_or_else(|| index_exhausted(index))?;
            state.next_shape_index = state.next_shape_index.max(after);
            let shape = Value::Object(shape);
            match state
                .shapes
                .iter()
                .position(|s| s.get("index").and_then(Value::as_i64) == Some(index))
            {
                Some(slot) => state.shapes[slot] = shape.clone(),
                None => state.shapes.push(shape.clone()),
            }
            uploaded.push(shape);
        }
        Ok(Payload::Json(Value::Array(uploaded)))
    }
}

impl Default for InMemoryWorkspace {
    fn default() -> Self {
        Self::with_state(Workspace::new(), 0)
    }
}

#[async_trait]
impl Collaborator for InMemoryWorkspace {
    async fn invoke(
        &self,
        operation: &str,
        args: Vec<Payload>,
        _kwargs: Map<String, Value>,
    ) -> Result<Payload, RemoteError> {
        let mut args = args.into_iter();
        let mut next = || {
            args.next()
                .ok_or_else(|| RemoteError::new(format!("{operation}: missing argument")))
        };
        match operation {
            ops::REQUEST_WORKSPACE => Ok(Payload::Workspace(self.workspace()?)),
            ops::UPDATE_WORKSPACE => {
                self.update_workspace(expect(next()?, Payload::into_workspace, operation)?)
            }
            ops::REQUEST_COMPLEX_LIST => {
                let state = self.lock()?;
                let stubs: Vec<Complex> = state
                    .workspace
                    .complexes()
                    .iter()
                    .map(Complex::to_shallow)
                    .collect();
                Ok(stubs.into())
            }
            ops::REQUEST_COMPLEXES => {
                self.request_complexes(expect(next()?, Payload::into_int_list, operation)?)
            }
            ops::UPDATE_STRUCTURES_SHALLOW => {
                self.update_shallow(expect(next()?, Payload::into_complexes, operation)?)
            }
            ops::UPDATE_STRUCTURES_DEEP => {
                self.update_deep(expect(next()?, Payload::into_complexes, operation)?)
            }
            ops::ADD_TO_WORKSPACE => self.add(expect(next()?, Payload::into_complexes, operation)?),
            ops::REMOVE_FROM_WORKSPACE => {
                self.remove(expect(next()?, Payload::into_complexes, operation)?)
            }
            ops::ZOOM_ON_STRUCTURES => {
                self.focus(expect(next()?, Payload::into_int_list, operation)?, CameraFocus::Zoom)
            }
            ops::CENTER_ON_STRUCTURES => {
                self.focus(expect(next()?, Payload::into_int_list, operation)?, CameraFocus::Center)
            }
            ops::UPLOAD_SHAPES => {
                self.upload_shapes(expect(next()?, Payload::into_json, operation)?)
            }
            other => Err(RemoteError::new(format!("operation {other} is not supported in memory"))),
        }
    }

    async fn create_writing_stream(
        &self,
        atom_indices: Vec<i64>,
        stream_type: StreamType,
    ) -> Result<StreamOpening, RemoteError> {
        let width = match stream_type {
            StreamType::Position => 3,
            StreamType::Color => 4,
            StreamType::Scale => 1,
            _ => return Ok(StreamOpening::Refused(STREAM_UNSUPPORTED)),
        };
        let state = self.lock()?;
        let known: HashSet<i64> = state.workspace.atoms().map(|a| a.index).collect();
        if let Some(missing) = atom_indices.iter().find(|i| !known.contains(*i)) {
            tracing::debug!(atom = missing, "Writing stream refers to unknown atom");
            return Ok(StreamOpening::Refused(STREAM_ATOM_NOT_FOUND));
        }
        Ok(StreamOpening::Opened(Arc::new(MemoryStream {
            state: Arc::clone(&self.state),
            atom_indices,
            stream_type,
            width,
            destroyed: AtomicBool::new(false),
        })))
    }

    async fn plugin_data(&self) -> Result<PluginData, RemoteError> {
        Ok(self.plugin_data.clone())
    }

    async fn send_notification(
        &self,
        kind: NotificationKind,
        message: &str,
    ) -> Result<(), RemoteError> {
        tracing::info!(?kind, message, "Notification");
        self.notifications
            .lock()
            .map_err(|_| RemoteError::new("notification log poisoned"))?
            .push((kind, message.to_string()));
        Ok(())
    }
}

/// Writes stream batches into the atoms of the shared workspace.
struct MemoryStream {
    state: Arc<Mutex<State>>,
    atom_indices: Vec<i64>,
    stream_type: StreamType,
    /// Values per atom.
    width: usize,
    destroyed: AtomicBool,
}

#[async_trait]
impl LiveStream for MemoryStream {
    async fn update(&self, data: &[f64]) -> Result<(), RemoteError> {
        if self.destroyed.load(Ordering::Acquire) {
            return Err(RemoteError::new("stream already destroyed"));
        }
        let expected = self.width * self.atom_indices.len();
        if data.len() != expected {
            return Err(RemoteError::new(format!(
                "{:?} stream over {} atoms expects {} values, got {}",
                self.stream_type,
                self.atom_indices.len(),
                expected,
                data.len()
            )));
        }
        let slots: HashMap<i64, &[f64]> = self
            .atom_indices
            .iter()
            .copied()
            .zip(data.chunks_exact(self.width))
            .collect();

        let mut state = lock_state(&self.state)?;
        // Atoms removed since the stream opened are skipped.
        for atom in state.workspace.atoms_mut() {
            let Some(values) = slots.get(&atom.index) else {
                continue;
            };
            match (self.stream_type, *values) {
                (StreamType::Color, [r, g, b, a]) => {
                    atom.atom_color =
                        Color::rgba(channel(*r), channel(*g), channel(*b), channel(*a));
                }
                (StreamType::Position, [x, y, z]) => {
                    atom.position = Vector3::new(*x as f32, *y as f32, *z as f32);
                }
                (StreamType::Scale, [scale]) => atom.atom_scale = *scale as f32,
                _ => {}
            }
        }
        Ok(())
    }

    async fn destroy(&self) -> Result<(), RemoteError> {
        self.destroyed.store(true, Ordering::Release);
        Ok(())
    }
}

fn lock_state(state: &Mutex<State>) -> Result<MutexGuard<'_, State>, RemoteError> {
    state
        .lock()
        .map_err(|_| RemoteError::new("workspace state poisoned by an earlier failure"))
}

fn expect<T>(
    payload: Payload,
    extract: fn(Payload) -> Option<T>,
    operation: &str,
) -> Result<T, RemoteError> {
    let variant = payload.variant_name();
    extract(payload)
        .ok_or_else(|| RemoteError::new(format!("{operation}: unexpected {variant} argument")))
}

fn index_exhausted(index: i64) -> RemoteError {
    RemoteError::new(format!("index {index} leaves no room for new indices"))
}

fn unknown_complex(index: i64) -> RemoteError {
    RemoteError::new(format!("no complex with index {index}"))
}

fn channel(value: f64) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

/// Raises `next` past every index in `complex`, then numbers its unassigned entities.
///
/// `next` is left untouched when an index cannot be advanced.
fn claim_indices(next: &mut i64, complex: &mut Complex) -> Result<(), RemoteError> {
    let mut cursor = *next;
    let mut exhausted = None;
    visit_indices(complex, &mut |index| match index.checked_add(1) {
        Some(after) => cursor = cursor.max(after),
        None => exhausted = Some(*index),
    });
    if let Some(index) = exhausted {
        return Err(index_exhausted(index));
    }

    visit_indices(complex, &mut |index| {
        if *index != UNASSIGNED_INDEX || exhausted.is_some() {
            return;
        }
        match cursor.checked_add(1) {
            Some(after) => {
                *index = cursor;
                cursor = after;
            }
            None => exhausted = Some(cursor),
        }
    });
    if let Some(index) = exhausted {
        return Err(index_exhausted(index));
    }
    *next = cursor;
    Ok(())
}

fn visit_indices(complex: &mut Complex, visit: &mut impl FnMut(&mut i64)) {
    visit(&mut complex.index);
    for molecule in complex.molecules_mut() {
        visit(&mut molecule.index);
        for chain in molecule.chains_mut() {
            visit(&mut chain.index);
            for residue in chain.residues_mut() {
                visit(&mut residue.index);
                for atom in residue.atoms_mut() {
                    visit(&mut atom.index);
                }
                for bond in residue.bonds_mut() {
                    visit(&mut bond.index);
                }
            }
        }
    }
}
