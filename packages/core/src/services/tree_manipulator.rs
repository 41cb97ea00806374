//! Neurite Tree Manipulation
//!
//! [`NeuriteEditor`] is the only code that changes the node, anchored path and
//! note maps of a [`Neuron`]. Every operation updates both sides of each
//! parent/child edge together and records what it touched in [`TreeChanges`]
//! so the caller can persist and publish the result.
//!
//! # Atomicity
//!
//! Operations validate before they mutate, so a returned `TreeError` means the
//! neuron was not touched. The annotation model additionally runs every edit
//! against a working copy and commits it only after the store accepted the
//! snapshot.
//!
//! # Anchored paths
//!
//! A traced path is only valid while its two endpoints are parent and child.
//! Any operation that breaks an edge (move, delete, split, detach) removes
//! the path on that edge.

use crate::models::{
    AnchoredPath, AnchoredPathEndpoints, AnnotationId, GeoAnnotation, Neuron, ParametrizedLine,
    PredefinedNote, StructuredTextAnnotation, Vec3,
};
use crate::services::error::TreeError;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

/// Hands out annotation ids that are unique across all loaded neurons
#[derive(Debug)]
pub struct AnnotationIdAllocator {
    next: AtomicU64,
}

impl Default for AnnotationIdAllocator {
    fn default() -> Self {
        Self::new(1)
    }
}

impl AnnotationIdAllocator {
    pub fn new(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }

    pub fn next_id(&self) -> AnnotationId {
        AnnotationId(self.next.fetch_add(1, Ordering::SeqCst))
    }

    /// Make sure future ids are greater than `id`
    pub fn reserve_through(&self, id: AnnotationId) {
        self.next.fetch_max(id.0.saturating_add(1), Ordering::SeqCst);
    }
}

/// Record of what a structural edit touched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TreeChanges {
    pub added: Vec<AnnotationId>,
    pub moved: Vec<AnnotationId>,
    pub radius_updated: Vec<AnnotationId>,
    pub reparented: Vec<AnnotationId>,
    /// Snapshots of deleted nodes, taken before removal
    pub deleted: Vec<GeoAnnotation>,
    pub removed_paths: Vec<AnchoredPath>,
    pub added_paths: Vec<AnchoredPathEndpoints>,
    pub notes_changed: bool,
}

impl TreeChanges {
    pub fn is_empty(&self) -> bool {
        *self == TreeChanges::default()
    }

    /// Fold another change record into this one
    pub fn merge(&mut self, other: TreeChanges) {
        self.added.extend(other.added);
        self.moved.extend(other.moved);
        self.radius_updated.extend(other.radius_updated);
        self.reparented.extend(other.reparented);
        self.deleted.extend(other.deleted);
        self.removed_paths.extend(other.removed_paths);
        self.added_paths.extend(other.added_paths);
        self.notes_changed |= other.notes_changed;
    }
}

/// Structural editor over one neuron
pub struct NeuriteEditor<'a> {
    neuron: &'a mut Neuron,
    changes: TreeChanges,
}

impl<'a> NeuriteEditor<'a> {
    pub fn new(neuron: &'a mut Neuron) -> Self {
        Self {
            neuron,
            changes: TreeChanges::default(),
        }
    }

    pub fn neuron(&self) -> &Neuron {
        self.neuron
    }

    /// Finish editing and hand back the change record
    pub fn finish(self) -> TreeChanges {
        debug_assert!(
            self.neuron.validate_invariants().is_ok(),
            "neurite edit broke invariants: {:?}",
            self.neuron.validate_invariants()
        );
        self.changes
    }

    fn get(&self, id: AnnotationId) -> Result<&GeoAnnotation, TreeError> {
        self.neuron
            .annotations
            .get(&id)
            .ok_or_else(|| TreeError::annotation_not_found(id))
    }

    fn get_mut(&mut self, id: AnnotationId) -> Result<&mut GeoAnnotation, TreeError> {
        self.neuron
            .annotations
            .get_mut(&id)
            .ok_or_else(|| TreeError::annotation_not_found(id))
    }

    /// Create a new annotation, as a root when `parent` is `None`
    pub fn add_annotation(
        &mut self,
        ids: &AnnotationIdAllocator,
        parent: Option<AnnotationId>,
        location: Vec3,
        radius: f64,
    ) -> Result<AnnotationId, TreeError> {
        if let Some(parent_id) = parent {
            self.get(parent_id)?;
        }

        let id = ids.next_id();
        let annotation = GeoAnnotation::new(id, self.neuron.id, parent, location, radius);
        self.neuron.annotations.insert(id, annotation);
        match parent {
            Some(parent_id) => {
                self.get_mut(parent_id)?.child_ids.push(id);
                // A former end point is not an end any more
                self.strip_predefined_notes(parent_id)?;
            }
            None => self.neuron.root_ids.push(id),
        }

        self.changes.added.push(id);
        Ok(id)
    }

    /// Relocate an annotation; the traced paths on its edges become stale
    pub fn move_annotation(&mut self, id: AnnotationId, location: Vec3) -> Result<(), TreeError> {
        let annotation = self.get_mut(id)?;
        annotation.location = location;
        annotation.touch();
        self.remove_edge_paths(id)?;
        self.changes.moved.push(id);
        Ok(())
    }

    pub fn update_radius(&mut self, id: AnnotationId, radius: f64) -> Result<(), TreeError> {
        if !radius.is_finite() || radius <= 0.0 {
            return Err(TreeError::invalid_operation(format!(
                "radius must be positive, got {}",
                radius
            )));
        }
        let annotation = self.get_mut(id)?;
        annotation.radius = radius;
        annotation.touch();
        self.changes.radius_updated.push(id);
        Ok(())
    }

    /// Remove one annotation, joining its single child to its parent
    ///
    /// Refused when the annotation has more than one child, or is a root with
    /// a child: in both cases there is no unambiguous new parent.
    pub fn delete_link(&mut self, id: AnnotationId) -> Result<(), TreeError> {
        let annotation = self.get(id)?.clone();
        if annotation.child_ids.len() > 1 {
            return Err(TreeError::ambiguous_delete(id, "annotation has more than one child"));
        }
        if annotation.is_root() && !annotation.child_ids.is_empty() {
            return Err(TreeError::ambiguous_delete(id, "root annotation has a child"));
        }

        self.remove_edge_paths(id)?;
        let child = annotation.child_ids.first().copied();

        match (annotation.parent_id, child) {
            (Some(parent_id), Some(child_id)) => {
                // Child takes the deleted link's slot in the parent's list
                let parent = self.get_mut(parent_id)?;
                for slot in parent.child_ids.iter_mut() {
                    if *slot == id {
                        *slot = child_id;
                    }
                }
                let child_ann = self.get_mut(child_id)?;
                child_ann.parent_id = Some(parent_id);
                child_ann.touch();
                self.changes.reparented.push(child_id);
            }
            (Some(parent_id), None) => {
                self.get_mut(parent_id)?.child_ids.retain(|c| *c != id);
            }
            (None, _) => self.neuron.root_ids.retain(|r| *r != id),
        }

        if self.neuron.notes.remove(&id).is_some() {
            self.changes.notes_changed = true;
        }
        self.neuron.annotations.remove(&id);
        self.changes.deleted.push(annotation);
        Ok(())
    }

    /// Remove an annotation and everything below it
    pub fn delete_subtree(&mut self, id: AnnotationId) -> Result<(), TreeError> {
        let parent = self.get(id)?.parent_id;
        let doomed = self.neuron.subtree(id);
        let doomed_set: HashSet<AnnotationId> = doomed.iter().copied().collect();

        let stale: Vec<AnchoredPathEndpoints> = self
            .neuron
            .anchored_paths
            .keys()
            .filter(|e| doomed_set.contains(&e.first()) || doomed_set.contains(&e.second()))
            .copied()
            .collect();
        for endpoints in stale {
            self.remove_path(endpoints);
        }

        match parent {
            Some(parent_id) => self.get_mut(parent_id)?.child_ids.retain(|c| *c != id),
            None => self.neuron.root_ids.retain(|r| *r != id),
        }

        for doomed_id in doomed {
            if self.neuron.notes.remove(&doomed_id).is_some() {
                self.changes.notes_changed = true;
            }
            if let Some(annotation) = self.neuron.annotations.remove(&doomed_id) {
                self.changes.deleted.push(annotation);
            }
        }
        Ok(())
    }

    /// Insert a new annotation on the segment next to `id`
    ///
    /// The segment runs toward the parent, or toward the single child when
    /// `id` is a root. The new point sits `split_distance` from the lower
    /// endpoint of the segment but never past its midpoint; for a root it is
    /// mirrored so it sits near the root.
    pub fn split_annotation(
        &mut self,
        ids: &AnnotationIdAllocator,
        id: AnnotationId,
        split_distance: f64,
    ) -> Result<AnnotationId, TreeError> {
        let annotation = self.get(id)?;
        // `lower` is the child end of the segment, `upper` the parent end
        let (lower, upper, reverse) = match annotation.parent_id {
            Some(parent_id) => (id, parent_id, false),
            None => match annotation.child_ids.as_slice() {
                [only_child] => (*only_child, id, true),
                [] => return Err(TreeError::ambiguous_split(id, "root has no children")),
                _ => return Err(TreeError::ambiguous_split(id, "root has several children")),
            },
        };

        let line = ParametrizedLine::new(self.get(lower)?.location, self.get(upper)?.location);
        let mut t = line.parameter_at_distance(split_distance, 0.5);
        if reverse {
            t = 1.0 - t;
        }
        let location = line.point_at(t);
        let radius = self.get(lower)?.radius;

        self.remove_path(AnchoredPathEndpoints::new(lower, upper));

        let new_id = ids.next_id();
        let mut inserted = GeoAnnotation::new(new_id, self.neuron.id, Some(upper), location, radius);
        inserted.child_ids.push(lower);
        self.neuron.annotations.insert(new_id, inserted);

        let upper_ann = self.get_mut(upper)?;
        for slot in upper_ann.child_ids.iter_mut() {
            if *slot == lower {
                *slot = new_id;
            }
        }
        let lower_ann = self.get_mut(lower)?;
        lower_ann.parent_id = Some(new_id);
        lower_ann.touch();

        self.changes.added.push(new_id);
        self.changes.reparented.push(lower);
        Ok(new_id)
    }

    /// Make `new_root` the root of its neurite
    ///
    /// Edges along the path to the old root flip direction; every other edge
    /// is untouched, so anchored paths stay valid.
    pub fn reroot_neurite(&mut self, new_root: AnnotationId) -> Result<(), TreeError> {
        self.get(new_root)?;
        let mut chain = vec![new_root];
        chain.extend(self.neuron.ancestors(new_root));
        let old_root = match chain.last() {
            Some(root) if *root != new_root => *root,
            _ => return Ok(()),
        };
        if self.get(old_root)?.parent_id.is_some() {
            return Err(TreeError::circular_reference(format!(
                "no root above annotation {}",
                new_root
            )));
        }

        for pair in chain.windows(2) {
            let (child, parent) = (pair[0], pair[1]);
            let parent_ann = self.get_mut(parent)?;
            parent_ann.child_ids.retain(|c| *c != child);
            parent_ann.parent_id = Some(child);
            parent_ann.touch();
            self.get_mut(child)?.child_ids.push(parent);
            self.changes.reparented.push(parent);
        }

        let root_ann = self.get_mut(new_root)?;
        root_ann.parent_id = None;
        root_ann.touch();
        self.changes.reparented.push(new_root);

        for slot in self.neuron.root_ids.iter_mut() {
            if *slot == old_root {
                *slot = new_root;
            }
        }

        // The new root gained a child
        self.strip_predefined_notes(new_root)?;
        Ok(())
    }

    /// Detach `new_root` from its parent, starting a separate neurite
    pub fn split_neurite(&mut self, new_root: AnnotationId) -> Result<(), TreeError> {
        let parent_id = self
            .get(new_root)?
            .parent_id
            .ok_or(TreeError::AlreadyRoot { id: new_root })?;

        self.remove_path(AnchoredPathEndpoints::new(new_root, parent_id));
        self.get_mut(parent_id)?.child_ids.retain(|c| *c != new_root);
        let annotation = self.get_mut(new_root)?;
        annotation.parent_id = None;
        annotation.touch();
        self.neuron.root_ids.push(new_root);
        self.changes.reparented.push(new_root);
        Ok(())
    }

    /// Attach the root `child` under `parent`
    ///
    /// Both must be in this neuron and `parent` must not already belong to
    /// `child`'s neurite.
    pub fn attach_root(&mut self, child: AnnotationId, parent: AnnotationId) -> Result<(), TreeError> {
        if !self.get(child)?.is_root() {
            return Err(TreeError::invalid_operation(format!(
                "annotation {} is not a root",
                child
            )));
        }
        self.get(parent)?;
        if self.neuron.neurite_root(parent) == Some(child) {
            return Err(TreeError::circular_reference(format!(
                "annotation {} is in the neurite rooted at {}",
                parent, child
            )));
        }

        self.neuron.root_ids.retain(|r| *r != child);
        self.get_mut(parent)?.child_ids.push(child);
        let annotation = self.get_mut(child)?;
        annotation.parent_id = Some(parent);
        annotation.touch();
        self.changes.reparented.push(child);

        self.strip_predefined_notes(parent)?;
        self.strip_predefined_notes(child)?;
        Ok(())
    }

    /// Store a traced path between two adjacent annotations
    ///
    /// The polyline must start and end, in either order, within `tolerance`
    /// voxels (per axis, integer-truncated) of the live anchor locations. An
    /// existing path on the same edge is replaced.
    pub fn add_anchored_path(
        &mut self,
        endpoints: AnchoredPathEndpoints,
        points: Vec<[i32; 3]>,
        tolerance: i32,
    ) -> Result<(), TreeError> {
        let (a, b) = (endpoints.first(), endpoints.second());
        let first_loc = self.get(a)?.location.truncated();
        let second_loc = self.get(b)?.location.truncated();
        if !self.neuron.are_adjacent(a, b) {
            return Err(TreeError::NotAdjacent {
                first: a,
                second: b,
            });
        }

        let (start, end) = match (points.first(), points.last()) {
            (Some(start), Some(end)) => (*start, *end),
            _ => return Err(TreeError::invalid_operation("anchored path has no points")),
        };
        let near = |p: [i32; 3], q: [i32; 3]| (0..3).all(|i| (p[i] - q[i]).abs() < tolerance);
        let forward = near(start, first_loc) && near(end, second_loc);
        let backward = near(start, second_loc) && near(end, first_loc);
        if !forward && !backward {
            return Err(TreeError::EndpointMismatch {
                first: a,
                second: b,
            });
        }

        self.remove_path(endpoints);
        self.neuron
            .anchored_paths
            .insert(endpoints, AnchoredPath::new(endpoints, points));
        self.changes.added_paths.push(endpoints);
        Ok(())
    }

    /// Set, replace or (with empty text) clear the note on an annotation
    pub fn set_note(&mut self, id: AnnotationId, text: &str) -> Result<(), TreeError> {
        self.get(id)?;
        match self.neuron.notes.get_mut(&id) {
            Some(note) => {
                if note.set_note_text(text) {
                    self.neuron.notes.remove(&id);
                }
            }
            None if text.is_empty() => return Ok(()),
            None => {
                self.neuron
                    .notes
                    .insert(id, StructuredTextAnnotation::with_note(id, text));
            }
        }
        self.get_mut(id)?.touch();
        self.changes.notes_changed = true;
        Ok(())
    }

    /// Remove the whole note document of an annotation
    pub fn remove_note(&mut self, id: AnnotationId) -> Result<(), TreeError> {
        self.get(id)?;
        if self.neuron.notes.remove(&id).is_some() {
            self.get_mut(id)?.touch();
            self.changes.notes_changed = true;
        }
        Ok(())
    }

    /// Drop predefined note tokens that no longer describe the annotation
    pub fn strip_predefined_notes(&mut self, id: AnnotationId) -> Result<(), TreeError> {
        let annotation = self.get(id)?;
        let text = self.neuron.note_text(id);
        if text.is_empty() {
            return Ok(());
        }
        if let Some(cleaned) = PredefinedNote::strip_invalid(text, annotation) {
            self.set_note(id, &cleaned)?;
        }
        Ok(())
    }

    fn remove_path(&mut self, endpoints: AnchoredPathEndpoints) {
        if let Some(path) = self.neuron.anchored_paths.remove(&endpoints) {
            self.changes.removed_paths.push(path);
        }
    }

    /// Remove the paths on every edge touching `id`
    fn remove_edge_paths(&mut self, id: AnnotationId) -> Result<(), TreeError> {
        let annotation = self.get(id)?;
        let neighbors: Vec<AnnotationId> = annotation
            .parent_id
            .into_iter()
            .chain(annotation.child_ids.iter().copied())
            .collect();
        for neighbor in neighbors {
            self.remove_path(AnchoredPathEndpoints::new(id, neighbor));
        }
        Ok(())
    }
}

/// Move the whole neurite containing `id` from `source` into `dest`
///
/// Nodes keep their ids; notes and anchored paths travel with them. Returns
/// the moved ids with the neurite root first.
pub fn transplant_neurite(
    source: &mut Neuron,
    dest: &mut Neuron,
    id: AnnotationId,
) -> Result<Vec<AnnotationId>, TreeError> {
    if source.id == dest.id {
        return Err(TreeError::invalid_operation(
            "source and destination neuron are the same",
        ));
    }
    let root = source
        .neurite_root(id)
        .ok_or_else(|| TreeError::annotation_not_found(id))?;
    let moved = source.subtree(root);
    let moved_set: HashSet<AnnotationId> = moved.iter().copied().collect();

    for moved_id in &moved {
        if let Some(mut annotation) = source.annotations.remove(moved_id) {
            annotation.neuron_id = dest.id;
            annotation.touch();
            dest.annotations.insert(*moved_id, annotation);
        }
        if let Some(note) = source.notes.remove(moved_id) {
            dest.notes.insert(*moved_id, note);
        }
    }

    let paths: Vec<AnchoredPathEndpoints> = source
        .anchored_paths
        .keys()
        .filter(|e| moved_set.contains(&e.first()))
        .copied()
        .collect();
    for endpoints in paths {
        if let Some(path) = source.anchored_paths.remove(&endpoints) {
            dest.anchored_paths.insert(endpoints, path);
        }
    }

    source.root_ids.retain(|r| *r != root);
    dest.root_ids.push(root);
    Ok(moved)
}

// Comprehensive tests in separate module
#[cfg(test)]
#[path = "tree_manipulator_test.rs"]
mod tree_manipulator_test;
