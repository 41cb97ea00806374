//! Annotation Model
//!
//! The orchestrator of the annotation layer. It owns the current sample,
//! workspace and neuron selection plus the loaded neurons, and every change to
//! them follows the same template:
//!
//! 1. **Validate** - locate the neuron and annotations involved
//! 2. **Edit** - run the structural change through a [`NeuriteEditor`] on a
//!    working copy of the neuron
//! 3. **Persist** - save the working copy through the [`DomainStore`]
//! 4. **Commit** - replace the in-memory neuron with the working copy
//! 5. **Notify** - publish the resulting events, data before selection
//!
//! # Failure handling
//!
//! - Validation failures (missing annotation, ambiguous delete or split, ...)
//!   are handled locally: logged at `warn`, nothing changes, and the call
//!   returns `Ok(None)` / `Ok(false)`
//! - Persistence failures propagate as [`AnnotationError::Persistence`]; the
//!   working copy is dropped so the in-memory model stays at its last good
//!   state. A failed move also publishes `AnnotationNotMoved` so a view that
//!   moved the anchor optimistically can put it back
//!
//! # Concurrency
//!
//! Mutating methods take `&mut self`. Shared access goes through
//! [`AnnotationModelHandle`](crate::services::AnnotationModelHandle), which
//! serializes every call on one executor task.

use crate::config::ModelConfig;
use crate::db::{AnnotationEvent, DomainStore};
use crate::models::{
    AnchoredPathEndpoints, AnnotationId, BulkNeuronStyleUpdate, Color, GeoAnnotation, Matrix4,
    Neuron, NeuronId, NeuronStyle, Sample, SampleId, Vec3, Workspace, WorkspaceId,
};
use crate::services::error::{AnnotationError, AnnotationResult, TreeError};
use crate::services::notifier::{AnnotationListener, EventNotifier, InlineDispatcher, ListenerId, UiDispatcher};
use crate::services::tag_map::NeuronTagMap;
use crate::services::tree_manipulator::{
    transplant_neurite, AnnotationIdAllocator, NeuriteEditor, TreeChanges,
};
use crate::utils::progress::{CancelFlag, ProgressReporter};
use crate::utils::swc::{self, SwcData, SwcError};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;

impl From<SwcError> for AnnotationError {
    fn from(err: SwcError) -> Self {
        match err {
            SwcError::Io(e) => AnnotationError::Io(e),
            other => AnnotationError::swc(other.to_string()),
        }
    }
}

/// Model state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelState {
    NoSample,
    SampleLoaded,
    WorkspaceLoaded,
}

pub struct AnnotationModel {
    store: Arc<dyn DomainStore>,
    config: ModelConfig,
    notifier: Arc<EventNotifier>,
    ids: AnnotationIdAllocator,
    sample: Option<Sample>,
    workspace: Option<Workspace>,
    neurons: BTreeMap<NeuronId, Neuron>,
    current_neuron: Option<NeuronId>,
    tags: NeuronTagMap,
}

impl AnnotationModel {
    /// Create a model that delivers listener callbacks inline
    pub fn new(store: Arc<dyn DomainStore>, config: ModelConfig) -> AnnotationResult<Self> {
        Self::with_dispatcher(store, config, Arc::new(InlineDispatcher))
    }

    /// Create a model whose listener callbacks go through `dispatcher`
    pub fn with_dispatcher(
        store: Arc<dyn DomainStore>,
        config: ModelConfig,
        dispatcher: Arc<dyn UiDispatcher>,
    ) -> AnnotationResult<Self> {
        config.validate().map_err(AnnotationError::config)?;
        let notifier = Arc::new(EventNotifier::new(dispatcher, config.event_channel_capacity));
        let tags = NeuronTagMap::new(config.predefined_neuron_tags.clone());
        Ok(Self {
            store,
            config,
            notifier,
            ids: AnnotationIdAllocator::default(),
            sample: None,
            workspace: None,
            neurons: BTreeMap::new(),
            current_neuron: None,
            tags,
        })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn notifier(&self) -> Arc<EventNotifier> {
        self.notifier.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AnnotationEvent> {
        self.notifier.subscribe()
    }

    pub fn add_listener(&self, listener: Arc<dyn AnnotationListener>) -> ListenerId {
        self.notifier.add_listener(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.notifier.remove_listener(id)
    }

    pub fn state(&self) -> ModelState {
        match (&self.sample, &self.workspace) {
            (_, Some(_)) => ModelState::WorkspaceLoaded,
            (Some(_), None) => ModelState::SampleLoaded,
            (None, None) => ModelState::NoSample,
        }
    }

    pub fn current_sample(&self) -> Option<&Sample> {
        self.sample.as_ref()
    }

    pub fn current_workspace(&self) -> Option<&Workspace> {
        self.workspace.as_ref()
    }

    pub fn current_neuron(&self) -> Option<&Neuron> {
        self.current_neuron.and_then(|id| self.neurons.get(&id))
    }

    pub fn neuron(&self, id: NeuronId) -> Option<&Neuron> {
        self.neurons.get(&id)
    }

    pub fn neurons(&self) -> impl Iterator<Item = &Neuron> {
        self.neurons.values()
    }

    fn require_workspace(&self) -> AnnotationResult<&Workspace> {
        self.workspace.as_ref().ok_or(AnnotationError::NoWorkspaceLoaded)
    }

    fn auto_tracing(&self) -> bool {
        self.workspace.as_ref().is_some_and(|w| w.auto_tracing)
    }

    // ------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------

    /// Drop sample, workspace and neurons
    pub fn clear(&mut self) {
        self.reset_workspace_state();
        self.sample = None;
        tracing::info!("Annotation model cleared");
        self.notifier.publish(vec![AnnotationEvent::WorkspaceUnloaded]);
    }

    fn reset_workspace_state(&mut self) {
        self.workspace = None;
        self.neurons.clear();
        self.current_neuron = None;
        self.tags.clear();
    }

    pub async fn load_sample(&mut self, id: SampleId) -> AnnotationResult<()> {
        let sample = self.store.get_sample(id).await?;
        tracing::info!("Loaded sample {} ({})", sample.id, sample.name);
        self.reset_workspace_state();
        self.sample = Some(sample);
        self.notifier.publish(vec![
            AnnotationEvent::WorkspaceLoaded { workspace_id: None },
            AnnotationEvent::NeuronSelected { neuron_id: None },
        ]);
        Ok(())
    }

    /// Load a workspace, its sample if different, and all its neurons
    pub async fn load_workspace(&mut self, id: WorkspaceId) -> AnnotationResult<()> {
        let workspace = self.store.get_workspace(id).await?;
        let sample = match &self.sample {
            Some(sample) if sample.id == workspace.sample_id => sample.clone(),
            _ => self.store.get_sample(workspace.sample_id).await?,
        };
        let neurons = self.store.load_workspace_neurons(id).await?;

        self.reset_workspace_state();
        for neuron in neurons {
            if let Err(e) = neuron.validate_invariants() {
                tracing::warn!("Neuron {} loaded with broken structure: {}", neuron.id, e);
            }
            if let Some(max_id) = neuron.annotations.keys().next_back() {
                self.ids.reserve_through(*max_id);
            }
            self.neurons.insert(neuron.id, neuron);
        }
        self.tags.rebuild(self.neurons.values());
        tracing::info!(
            "Loaded workspace {} ({}) with {} neurons",
            workspace.id,
            workspace.name,
            self.neurons.len()
        );
        self.sample = Some(sample);
        self.workspace = Some(workspace);

        self.notifier.publish(vec![
            AnnotationEvent::WorkspaceLoaded {
                workspace_id: Some(id),
            },
            AnnotationEvent::NeuronSelected { neuron_id: None },
        ]);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Workspace and sample
    // ------------------------------------------------------------------

    pub async fn create_workspace(
        &mut self,
        sample_id: SampleId,
        name: &str,
    ) -> AnnotationResult<Workspace> {
        if name.trim().is_empty() {
            return Err(AnnotationError::invalid_argument("workspace name is empty"));
        }
        let workspace = self.store.create_workspace(sample_id, name).await?;
        tracing::info!("Created workspace {} ({})", workspace.id, workspace.name);
        Ok(workspace)
    }

    pub async fn copy_workspace(
        &mut self,
        id: WorkspaceId,
        name: &str,
    ) -> AnnotationResult<Workspace> {
        if name.trim().is_empty() {
            return Err(AnnotationError::invalid_argument("workspace name is empty"));
        }
        let workspace = self.store.copy_workspace(id, name).await?;
        tracing::info!("Copied workspace {} to {}", id, workspace.id);
        Ok(workspace)
    }

    pub async fn save_current_workspace(&mut self) -> AnnotationResult<()> {
        let workspace = self.require_workspace()?.clone();
        self.store.save_workspace(&workspace).await?;
        Ok(())
    }

    pub async fn set_automated_tracing(&mut self, enabled: bool) -> AnnotationResult<()> {
        self.update_workspace(|w| w.auto_tracing = enabled).await
    }

    pub async fn set_automated_refinement(&mut self, enabled: bool) -> AnnotationResult<()> {
        self.update_workspace(|w| w.auto_point_refinement = enabled)
            .await
    }

    async fn update_workspace(
        &mut self,
        change: impl FnOnce(&mut Workspace) + Send,
    ) -> AnnotationResult<()> {
        let mut working = self.require_workspace()?.clone();
        change(&mut working);
        self.store.save_workspace(&working).await?;
        self.workspace = Some(working);
        Ok(())
    }

    pub fn automated_tracing_enabled(&self) -> bool {
        self.auto_tracing()
    }

    pub fn automated_refinement_enabled(&self) -> bool {
        self.workspace
            .as_ref()
            .is_some_and(|w| w.auto_point_refinement)
    }

    pub async fn set_sample_matrices(
        &mut self,
        micron_to_vox: Matrix4,
        vox_to_micron: Matrix4,
    ) -> AnnotationResult<()> {
        let mut working = self
            .sample
            .clone()
            .ok_or(AnnotationError::NoSampleLoaded)?;
        working.micron_to_vox = micron_to_vox;
        working.vox_to_micron = vox_to_micron;
        self.store.save_sample(&working).await?;
        self.sample = Some(working);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Neurons
    // ------------------------------------------------------------------

    /// Create an empty neuron in the current workspace and select it
    pub async fn create_neuron(&mut self, name: &str) -> AnnotationResult<NeuronId> {
        let workspace_id = self.require_workspace()?.id;
        if name.trim().is_empty() {
            return Err(AnnotationError::invalid_argument("neuron name is empty"));
        }
        let neuron = self.store.create_neuron(workspace_id, name).await?;
        let id = neuron.id;
        tracing::debug!("Created neuron {} ({})", id, name);
        self.neurons.insert(id, neuron);
        self.current_neuron = Some(id);

        self.notifier.publish(vec![
            AnnotationEvent::NeuronCreated {
                neuron_id: id,
                name: name.to_string(),
            },
            AnnotationEvent::NeuronSelected {
                neuron_id: Some(id),
            },
        ]);
        Ok(id)
    }

    pub async fn rename_neuron(&mut self, id: NeuronId, name: &str) -> AnnotationResult<bool> {
        self.require_workspace()?;
        if name.trim().is_empty() {
            return Err(AnnotationError::invalid_argument("neuron name is empty"));
        }
        let Some(mut working) = self.neurons.get(&id).cloned() else {
            tracing::warn!("rename_neuron: {}", TreeError::neuron_not_found(id));
            return Ok(false);
        };
        working.name = name.to_string();
        self.store.save_neuron(&working).await?;
        self.neurons.insert(id, working);

        self.notifier.publish(vec![AnnotationEvent::NeuronRenamed {
            neuron_id: id,
            name: name.to_string(),
        }]);
        Ok(true)
    }

    pub async fn rename_current_neuron(&mut self, name: &str) -> AnnotationResult<bool> {
        match self.current_neuron {
            Some(id) => self.rename_neuron(id, name).await,
            None => {
                tracing::warn!("rename_current_neuron: no neuron selected");
                Ok(false)
            }
        }
    }

    pub async fn delete_neuron(&mut self, id: NeuronId) -> AnnotationResult<bool> {
        self.require_workspace()?;
        if !self.neurons.contains_key(&id) {
            tracing::warn!("delete_neuron: {}", TreeError::neuron_not_found(id));
            return Ok(false);
        }
        self.store.delete_neuron(id).await?;
        self.neurons.remove(&id);
        self.tags.clear_tags(id);

        let mut events = vec![AnnotationEvent::NeuronDeleted { neuron_id: id }];
        if self.current_neuron == Some(id) {
            self.current_neuron = None;
            events.push(AnnotationEvent::NeuronSelected { neuron_id: None });
        }
        self.notifier.publish(events);
        Ok(true)
    }

    pub async fn delete_current_neuron(&mut self) -> AnnotationResult<bool> {
        match self.current_neuron {
            Some(id) => self.delete_neuron(id).await,
            None => {
                tracing::warn!("delete_current_neuron: no neuron selected");
                Ok(false)
            }
        }
    }

    /// Change the current neuron; `None` clears the selection
    pub fn select_neuron(&mut self, id: Option<NeuronId>) -> bool {
        if let Some(neuron_id) = id {
            if !self.neurons.contains_key(&neuron_id) {
                tracing::warn!("select_neuron: {}", TreeError::neuron_not_found(neuron_id));
                return false;
            }
        }
        self.current_neuron = id;
        self.notifier
            .publish(vec![AnnotationEvent::NeuronSelected { neuron_id: id }]);
        true
    }

    // ------------------------------------------------------------------
    // Derived lookups
    // ------------------------------------------------------------------

    /// Neuron owning `annotation`; `None` (with a warning) if no neuron does
    pub fn neuron_for_annotation(&self, annotation: AnnotationId) -> Option<&Neuron> {
        let found = self.neurons.values().find(|n| n.contains(annotation));
        if found.is_none() {
            tracing::warn!("No neuron found for annotation {}", annotation);
        }
        found
    }

    pub fn annotation(&self, id: AnnotationId) -> Option<&GeoAnnotation> {
        self.neurons.values().find_map(|n| n.annotation(id))
    }

    /// Root of the neurite containing `id`
    pub fn neurite_root(&self, id: AnnotationId) -> Option<&GeoAnnotation> {
        let neuron = self.neuron_for_annotation(id)?;
        neuron
            .neurite_root(id)
            .and_then(|root| neuron.annotation(root))
    }

    /// Nearest annotation to `location` across all neurons
    ///
    /// Brute-force scan by squared distance. Neurons are visited in id order,
    /// roots in root-list order, each neurite depth first; on a tie the first
    /// annotation visited wins.
    pub fn closest_annotation(
        &self,
        location: Vec3,
        excluded: Option<AnnotationId>,
    ) -> Option<&GeoAnnotation> {
        let mut best: Option<(&GeoAnnotation, f64)> = None;
        for neuron in self.neurons.values() {
            for ann in neuron.annotations_in_tree_order() {
                if Some(ann.id) == excluded {
                    continue;
                }
                let d = ann.location.distance_squared(&location);
                if best.map_or(true, |(_, best_d)| d < best_d) {
                    best = Some((ann, d));
                }
            }
        }
        best.map(|(ann, _)| ann)
    }

    pub fn note(&self, annotation: AnnotationId) -> String {
        self.neuron_for_annotation(annotation)
            .map(|n| n.note_text(annotation).to_string())
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------
    // Structural edits
    // ------------------------------------------------------------------

    /// Run `edit` against a working copy of one neuron, then persist and
    /// commit it. `Ok(None)` means the edit was refused and nothing changed.
    async fn edit_neuron<T, F>(
        &mut self,
        neuron_id: NeuronId,
        operation: &'static str,
        edit: F,
    ) -> AnnotationResult<Option<(T, TreeChanges)>>
    where
        T: Send,
        F: FnOnce(&mut NeuriteEditor<'_>, &AnnotationIdAllocator) -> Result<T, TreeError> + Send,
    {
        let Some(original) = self.neurons.get(&neuron_id) else {
            tracing::warn!("{}: {}", operation, TreeError::neuron_not_found(neuron_id));
            return Ok(None);
        };
        let mut working = original.clone();
        let mut editor = NeuriteEditor::new(&mut working);
        let value = match edit(&mut editor, &self.ids) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("{} refused: {}", operation, e);
                return Ok(None);
            }
        };
        let changes = editor.finish();
        if changes.is_empty() {
            return Ok(Some((value, changes)));
        }

        self.store.save_neuron(&working).await?;
        tracing::debug!("{} applied to neuron {}", operation, neuron_id);
        self.neurons.insert(neuron_id, working);
        Ok(Some((value, changes)))
    }

    fn owning_neuron(&self, operation: &str, annotation: AnnotationId) -> Option<NeuronId> {
        let id = self
            .neurons
            .values()
            .find(|n| n.contains(annotation))
            .map(|n| n.id);
        if id.is_none() {
            tracing::warn!("{}: {}", operation, TreeError::annotation_not_found(annotation));
        }
        id
    }

    /// Data events describing `changes` to `neuron_id`
    fn change_events(
        &self,
        neuron_id: NeuronId,
        changes: &TreeChanges,
        previous_neuron: NeuronId,
    ) -> Vec<AnnotationEvent> {
        let mut events = Vec::new();
        let Some(neuron) = self.neurons.get(&neuron_id) else {
            return events;
        };
        let snapshot = |id: &AnnotationId| neuron.annotation(*id).cloned();

        if !changes.deleted.is_empty() {
            events.push(AnnotationEvent::AnnotationsDeleted {
                annotations: changes.deleted.clone(),
            });
        }
        if !changes.removed_paths.is_empty() {
            events.push(AnnotationEvent::AnchoredPathsRemoved {
                neuron_id,
                paths: changes.removed_paths.clone(),
            });
        }
        for annotation in changes.added.iter().filter_map(snapshot) {
            events.push(AnnotationEvent::AnnotationAdded { annotation });
        }
        for annotation in changes.moved.iter().filter_map(snapshot) {
            events.push(AnnotationEvent::AnnotationMoved { annotation });
        }
        for annotation in changes.radius_updated.iter().filter_map(snapshot) {
            events.push(AnnotationEvent::AnnotationRadiusUpdated { annotation });
        }
        for annotation in changes.reparented.iter().filter_map(snapshot) {
            events.push(AnnotationEvent::AnnotationReparented {
                annotation,
                previous_neuron_id: previous_neuron,
            });
        }
        for endpoints in &changes.added_paths {
            if let Some(path) = neuron.anchored_paths.get(endpoints) {
                events.push(AnnotationEvent::AnchoredPathAdded {
                    neuron_id,
                    path: path.clone(),
                });
            }
        }
        if changes.notes_changed {
            if let Some(workspace) = &self.workspace {
                events.push(AnnotationEvent::NotesUpdated {
                    workspace_id: workspace.id,
                });
            }
        }
        events
    }

    fn trace_requests(&self, neuron_id: NeuronId, ids: &[AnnotationId]) -> Vec<AnnotationEvent> {
        if !self.auto_tracing() {
            return Vec::new();
        }
        ids.iter()
            .map(|id| AnnotationEvent::PathTraceRequested {
                neuron_id,
                annotation_id: *id,
            })
            .collect()
    }

    /// Start a new neurite in `neuron_id`
    pub async fn add_root_annotation(
        &mut self,
        neuron_id: NeuronId,
        location: Vec3,
    ) -> AnnotationResult<Option<AnnotationId>> {
        self.require_workspace()?;
        let Some((id, changes)) = self
            .edit_neuron(neuron_id, "add_root_annotation", move |editor, ids| {
                editor.add_annotation(ids, None, location, GeoAnnotation::DEFAULT_RADIUS)
            })
            .await?
        else {
            return Ok(None);
        };

        let mut events = self.change_events(neuron_id, &changes, neuron_id);
        if self.current_neuron != Some(neuron_id) {
            self.current_neuron = Some(neuron_id);
            events.push(AnnotationEvent::NeuronSelected {
                neuron_id: Some(neuron_id),
            });
        }
        self.notifier.publish(events);
        Ok(Some(id))
    }

    /// Append a child to `parent`
    pub async fn add_child_annotation(
        &mut self,
        parent: AnnotationId,
        location: Vec3,
    ) -> AnnotationResult<Option<AnnotationId>> {
        self.require_workspace()?;
        let Some(neuron_id) = self.owning_neuron("add_child_annotation", parent) else {
            return Ok(None);
        };
        let Some((id, changes)) = self
            .edit_neuron(neuron_id, "add_child_annotation", move |editor, ids| {
                editor.add_annotation(ids, Some(parent), location, GeoAnnotation::DEFAULT_RADIUS)
            })
            .await?
        else {
            return Ok(None);
        };

        let mut events = self.change_events(neuron_id, &changes, neuron_id);
        events.extend(self.trace_requests(neuron_id, &[id]));
        self.notifier.publish(events);
        Ok(Some(id))
    }

    /// Move an annotation
    ///
    /// If the store rejects the change, `AnnotationNotMoved` is published with
    /// the last persisted annotation and the error is returned.
    pub async fn move_annotation(
        &mut self,
        id: AnnotationId,
        location: Vec3,
    ) -> AnnotationResult<bool> {
        self.require_workspace()?;
        let Some(neuron_id) = self.owning_neuron("move_annotation", id) else {
            return Ok(false);
        };
        let previous = self.annotation(id).cloned();

        let result = self
            .edit_neuron(neuron_id, "move_annotation", move |editor, _| {
                editor.move_annotation(id, location)
            })
            .await;
        let changes = match result {
            Ok(Some((_, changes))) => changes,
            Ok(None) => return Ok(false),
            Err(e) => {
                tracing::warn!("Move of annotation {} not persisted: {}", id, e);
                if let Some(annotation) = previous {
                    self.notifier.publish(vec![AnnotationEvent::AnnotationNotMoved {
                        annotation,
                        attempted_location: location,
                    }]);
                }
                return Err(e);
            }
        };

        let mut events = self.change_events(neuron_id, &changes, neuron_id);
        let mut retrace = vec![id];
        if let Some(ann) = self.annotation(id) {
            retrace.extend(ann.child_ids.iter().copied());
        }
        events.extend(self.trace_requests(neuron_id, &retrace));
        self.notifier.publish(events);
        Ok(true)
    }

    pub async fn update_annotation_radius(
        &mut self,
        id: AnnotationId,
        radius: f64,
    ) -> AnnotationResult<bool> {
        self.require_workspace()?;
        let Some(neuron_id) = self.owning_neuron("update_annotation_radius", id) else {
            return Ok(false);
        };
        let Some((_, changes)) = self
            .edit_neuron(neuron_id, "update_annotation_radius", move |editor, _| {
                editor.update_radius(id, radius)
            })
            .await?
        else {
            return Ok(false);
        };
        let events = self.change_events(neuron_id, &changes, neuron_id);
        self.notifier.publish(events);
        Ok(true)
    }

    /// Delete one annotation, joining its child (if any) to its parent
    pub async fn delete_link(&mut self, id: AnnotationId) -> AnnotationResult<bool> {
        self.require_workspace()?;
        let Some(neuron_id) = self.owning_neuron("delete_link", id) else {
            return Ok(false);
        };
        let Some((_, changes)) = self
            .edit_neuron(neuron_id, "delete_link", move |editor, _| editor.delete_link(id))
            .await?
        else {
            return Ok(false);
        };
        let mut events = self.change_events(neuron_id, &changes, neuron_id);
        events.extend(self.trace_requests(neuron_id, &changes.reparented));
        self.notifier.publish(events);
        Ok(true)
    }

    /// Delete an annotation and all its descendants
    pub async fn delete_subtree(&mut self, id: AnnotationId) -> AnnotationResult<bool> {
        self.require_workspace()?;
        let Some(neuron_id) = self.owning_neuron("delete_subtree", id) else {
            return Ok(false);
        };
        let Some((_, changes)) = self
            .edit_neuron(neuron_id, "delete_subtree", move |editor, _| {
                editor.delete_subtree(id)
            })
            .await?
        else {
            return Ok(false);
        };
        let events = self.change_events(neuron_id, &changes, neuron_id);
        self.notifier.publish(events);
        Ok(true)
    }

    /// Insert an annotation on the segment next to `id`
    pub async fn split_annotation(
        &mut self,
        id: AnnotationId,
    ) -> AnnotationResult<Option<AnnotationId>> {
        self.require_workspace()?;
        let Some(neuron_id) = self.owning_neuron("split_annotation", id) else {
            return Ok(None);
        };
        let distance = self.config.split_anchor_distance;
        let Some((new_id, changes)) = self
            .edit_neuron(neuron_id, "split_annotation", move |editor, ids| {
                editor.split_annotation(ids, id, distance)
            })
            .await?
        else {
            return Ok(None);
        };
        let mut events = self.change_events(neuron_id, &changes, neuron_id);
        let mut retrace = vec![new_id];
        retrace.extend(changes.reparented.iter().copied());
        events.extend(self.trace_requests(neuron_id, &retrace));
        self.notifier.publish(events);
        Ok(Some(new_id))
    }

    /// Make `new_root` the root of its neurite
    pub async fn reroot_neurite(&mut self, new_root: AnnotationId) -> AnnotationResult<bool> {
        self.require_workspace()?;
        let Some(neuron_id) = self.owning_neuron("reroot_neurite", new_root) else {
            return Ok(false);
        };
        let Some((_, changes)) = self
            .edit_neuron(neuron_id, "reroot_neurite", move |editor, _| {
                editor.reroot_neurite(new_root)
            })
            .await?
        else {
            return Ok(false);
        };
        let mut events = self.change_events(neuron_id, &changes, neuron_id);
        if self.current_neuron == Some(neuron_id) {
            events.push(AnnotationEvent::NeuronSelected {
                neuron_id: Some(neuron_id),
            });
        }
        self.notifier.publish(events);
        Ok(true)
    }

    /// Detach `new_root` from its parent as a separate neurite
    pub async fn split_neurite(&mut self, new_root: AnnotationId) -> AnnotationResult<bool> {
        self.require_workspace()?;
        let Some(neuron_id) = self.owning_neuron("split_neurite", new_root) else {
            return Ok(false);
        };
        let Some((_, changes)) = self
            .edit_neuron(neuron_id, "split_neurite", move |editor, _| {
                editor.split_neurite(new_root)
            })
            .await?
        else {
            return Ok(false);
        };
        let mut events = self.change_events(neuron_id, &changes, neuron_id);
        events.push(AnnotationEvent::NeuronSelected {
            neuron_id: Some(neuron_id),
        });
        self.notifier.publish(events);
        Ok(true)
    }

    /// Join the neurite containing `source` under `target`
    ///
    /// The source neurite is rerooted at `source`, moved into the target's
    /// neuron if they differ, and attached as a child of `target`. A donor
    /// neuron left without annotations is deleted.
    pub async fn merge_neurite(
        &mut self,
        source: AnnotationId,
        target: AnnotationId,
    ) -> AnnotationResult<bool> {
        self.require_workspace()?;
        let (Some(source_neuron), Some(target_neuron)) = (
            self.owning_neuron("merge_neurite", source),
            self.owning_neuron("merge_neurite", target),
        ) else {
            return Ok(false);
        };

        let mut source_copy = match self.neurons.get(&source_neuron) {
            Some(n) => n.clone(),
            None => return Ok(false),
        };
        if source_neuron == target_neuron
            && source_copy.neurite_root(source) == source_copy.neurite_root(target)
        {
            tracing::warn!(
                "merge_neurite refused: {}",
                TreeError::circular_reference(format!(
                    "annotations {} and {} are in the same neurite",
                    source, target
                ))
            );
            return Ok(false);
        }

        let mut changes = TreeChanges::default();
        let mut target_copy = None;
        let outcome = (|| -> Result<(), TreeError> {
            let mut editor = NeuriteEditor::new(&mut source_copy);
            editor.reroot_neurite(source)?;
            changes.merge(editor.finish());

            let dest = if source_neuron == target_neuron {
                &mut source_copy
            } else {
                let mut dest = self
                    .neurons
                    .get(&target_neuron)
                    .cloned()
                    .ok_or_else(|| TreeError::neuron_not_found(target_neuron))?;
                let moved = transplant_neurite(&mut source_copy, &mut dest, source)?;
                changes.reparented.extend(moved);
                target_copy.insert(dest)
            };
            let mut editor = NeuriteEditor::new(dest);
            editor.attach_root(source, target)?;
            changes.merge(editor.finish());
            Ok(())
        })();
        if let Err(e) = outcome {
            tracing::warn!("merge_neurite refused: {}", e);
            return Ok(false);
        }

        let donor_emptied = target_copy.is_some() && source_copy.is_empty();
        match &target_copy {
            None => self.store.save_neuron(&source_copy).await?,
            Some(dest) => {
                self.store.save_neuron(dest).await?;
                let second = if donor_emptied {
                    self.store.delete_neuron(source_neuron).await
                } else {
                    self.store.save_neuron(&source_copy).await
                };
                if let Err(e) = second {
                    // Put the target back so the store matches memory again
                    if let Some(original) = self.neurons.get(&target_neuron) {
                        if let Err(rollback) = self.store.save_neuron(original).await {
                            tracing::error!(
                                "Rollback of neuron {} after failed merge failed: {}",
                                target_neuron,
                                rollback
                            );
                        }
                    }
                    return Err(e.into());
                }
            }
        }

        // Commit
        match target_copy {
            None => {
                self.neurons.insert(source_neuron, source_copy);
            }
            Some(dest) => {
                self.neurons.insert(target_neuron, dest);
                if donor_emptied {
                    self.neurons.remove(&source_neuron);
                    self.tags.clear_tags(source_neuron);
                } else {
                    self.neurons.insert(source_neuron, source_copy);
                }
            }
        }
        tracing::debug!(
            "Merged neurite at {} into {} (neuron {})",
            source,
            target,
            target_neuron
        );

        dedup_in_order(&mut changes.reparented);
        let mut events = self.change_events(target_neuron, &changes, source_neuron);
        if donor_emptied {
            events.push(AnnotationEvent::NeuronDeleted {
                neuron_id: source_neuron,
            });
        }
        events.extend(self.trace_requests(target_neuron, &[source]));
        self.current_neuron = Some(target_neuron);
        events.push(AnnotationEvent::NeuronSelected {
            neuron_id: Some(target_neuron),
        });
        self.notifier.publish(events);
        Ok(true)
    }

    /// Move the whole neurite containing `annotation` into `dest_neuron`
    pub async fn move_neurite(
        &mut self,
        annotation: AnnotationId,
        dest_neuron: NeuronId,
    ) -> AnnotationResult<bool> {
        self.require_workspace()?;
        let Some(source_neuron) = self.owning_neuron("move_neurite", annotation) else {
            return Ok(false);
        };
        if source_neuron == dest_neuron {
            tracing::warn!("move_neurite: annotation {} already in neuron {}", annotation, dest_neuron);
            return Ok(false);
        }
        let (Some(mut source), Some(mut dest)) = (
            self.neurons.get(&source_neuron).cloned(),
            self.neurons.get(&dest_neuron).cloned(),
        ) else {
            tracing::warn!("move_neurite: {}", TreeError::neuron_not_found(dest_neuron));
            return Ok(false);
        };
        let moved = match transplant_neurite(&mut source, &mut dest, annotation) {
            Ok(moved) => moved,
            Err(e) => {
                tracing::warn!("move_neurite refused: {}", e);
                return Ok(false);
            }
        };

        self.store.save_neuron(&dest).await?;
        if let Err(e) = self.store.save_neuron(&source).await {
            if let Some(original) = self.neurons.get(&dest_neuron) {
                if let Err(rollback) = self.store.save_neuron(original).await {
                    tracing::error!(
                        "Rollback of neuron {} after failed move failed: {}",
                        dest_neuron,
                        rollback
                    );
                }
            }
            return Err(e.into());
        }
        self.neurons.insert(source_neuron, source);
        self.neurons.insert(dest_neuron, dest);
        tracing::debug!(
            "Moved {} annotations from neuron {} to {}",
            moved.len(),
            source_neuron,
            dest_neuron
        );

        let changes = TreeChanges {
            reparented: moved,
            ..Default::default()
        };
        let mut events = self.change_events(dest_neuron, &changes, source_neuron);
        self.current_neuron = Some(dest_neuron);
        events.push(AnnotationEvent::NeuronSelected {
            neuron_id: Some(dest_neuron),
        });
        self.notifier.publish(events);
        Ok(true)
    }

    /// Store a traced path between two adjacent annotations
    pub async fn add_anchored_path(
        &mut self,
        endpoints: AnchoredPathEndpoints,
        points: Vec<[i32; 3]>,
    ) -> AnnotationResult<bool> {
        self.require_workspace()?;
        let Some(neuron_id) = self.owning_neuron("add_anchored_path", endpoints.first()) else {
            return Ok(false);
        };
        let tolerance = self.config.path_endpoint_tolerance;
        let Some((_, changes)) = self
            .edit_neuron(neuron_id, "add_anchored_path", move |editor, _| {
                editor.add_anchored_path(endpoints, points, tolerance)
            })
            .await?
        else {
            return Ok(false);
        };
        let events = self.change_events(neuron_id, &changes, neuron_id);
        self.notifier.publish(events);
        Ok(true)
    }

    /// Set the note text of an annotation; empty text removes the note
    pub async fn set_note(&mut self, id: AnnotationId, text: &str) -> AnnotationResult<bool> {
        self.require_workspace()?;
        let Some(neuron_id) = self.owning_neuron("set_note", id) else {
            return Ok(false);
        };
        let text = text.to_string();
        let Some((_, changes)) = self
            .edit_neuron(neuron_id, "set_note", move |editor, _| editor.set_note(id, &text))
            .await?
        else {
            return Ok(false);
        };
        let events = self.change_events(neuron_id, &changes, neuron_id);
        self.notifier.publish(events);
        Ok(true)
    }

    pub async fn remove_note(&mut self, id: AnnotationId) -> AnnotationResult<bool> {
        self.require_workspace()?;
        let Some(neuron_id) = self.owning_neuron("remove_note", id) else {
            return Ok(false);
        };
        let Some((_, changes)) = self
            .edit_neuron(neuron_id, "remove_note", move |editor, _| editor.remove_note(id))
            .await?
        else {
            return Ok(false);
        };
        let events = self.change_events(neuron_id, &changes, neuron_id);
        self.notifier.publish(events);
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Styles
    // ------------------------------------------------------------------

    pub fn neuron_style(&self, id: NeuronId) -> Option<NeuronStyle> {
        self.neurons.get(&id).map(Neuron::style)
    }

    pub async fn set_neuron_style(
        &mut self,
        id: NeuronId,
        style: NeuronStyle,
    ) -> AnnotationResult<bool> {
        if !self.neurons.contains_key(&id) {
            tracing::warn!("set_neuron_style: {}", TreeError::neuron_not_found(id));
            return Ok(false);
        }
        let update = BulkNeuronStyleUpdate {
            neuron_ids: vec![id],
            visible: Some(style.visible),
            color: Some(style.color),
        };
        self.store.update_neuron_styles(&update).await?;
        if let Some(neuron) = self.neurons.get_mut(&id) {
            neuron.color = Some(style.color);
            neuron.visible = style.visible;
        }
        self.notifier.publish(vec![AnnotationEvent::NeuronStyleChanged {
            neuron_id: id,
            style,
        }]);
        Ok(true)
    }

    pub async fn set_neuron_colors(
        &mut self,
        ids: &[NeuronId],
        color: Color,
    ) -> AnnotationResult<bool> {
        self.bulk_style_update(BulkNeuronStyleUpdate {
            neuron_ids: self.known_neurons("set_neuron_colors", ids),
            visible: None,
            color: Some(color),
        })
        .await
    }

    pub async fn set_neuron_visibility(
        &mut self,
        ids: &[NeuronId],
        visible: bool,
    ) -> AnnotationResult<bool> {
        self.bulk_style_update(BulkNeuronStyleUpdate {
            neuron_ids: self.known_neurons("set_neuron_visibility", ids),
            visible: Some(visible),
            color: None,
        })
        .await
    }

    fn known_neurons(&self, operation: &str, ids: &[NeuronId]) -> Vec<NeuronId> {
        let mut known = Vec::with_capacity(ids.len());
        for id in ids {
            if self.neurons.contains_key(id) {
                if !known.contains(id) {
                    known.push(*id);
                }
            } else {
                tracing::warn!("{}: {}", operation, TreeError::neuron_not_found(*id));
            }
        }
        known
    }

    async fn bulk_style_update(&mut self, update: BulkNeuronStyleUpdate) -> AnnotationResult<bool> {
        if update.neuron_ids.is_empty() {
            return Ok(false);
        }
        self.store.update_neuron_styles(&update).await?;
        let mut styles = Vec::with_capacity(update.neuron_ids.len());
        for id in &update.neuron_ids {
            if let Some(neuron) = self.neurons.get_mut(id) {
                if let Some(color) = update.color {
                    neuron.color = Some(color);
                }
                if let Some(visible) = update.visible {
                    neuron.visible = visible;
                }
                styles.push((*id, neuron.style()));
            }
        }
        self.notifier
            .publish(vec![AnnotationEvent::NeuronStylesChanged { styles }]);
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Tags
    // ------------------------------------------------------------------

    pub fn predefined_neuron_tags(&self) -> BTreeSet<String> {
        self.tags.predefined_tags().clone()
    }

    pub fn available_neuron_tags(&self) -> BTreeSet<String> {
        self.tags.available_tags()
    }

    pub fn neuron_tags(&self, id: NeuronId) -> BTreeSet<String> {
        self.tags.tags(id)
    }

    pub fn all_neuron_tags(&self) -> BTreeSet<String> {
        self.tags.all_tags()
    }

    pub fn neurons_for_tag(&self, tag: &str) -> BTreeSet<NeuronId> {
        self.tags.neurons_for_tag(tag)
    }

    pub fn has_neuron_tag(&self, id: NeuronId, tag: &str) -> bool {
        self.tags.has_tag(id, tag)
    }

    pub fn tag_map(&self) -> &NeuronTagMap {
        &self.tags
    }

    pub async fn add_neuron_tag(&mut self, tag: &str, ids: &[NeuronId]) -> AnnotationResult<bool> {
        self.edit_tags(tag, ids, true).await
    }

    pub async fn remove_neuron_tag(
        &mut self,
        tag: &str,
        ids: &[NeuronId],
    ) -> AnnotationResult<bool> {
        self.edit_tags(tag, ids, false).await
    }

    async fn edit_tags(&mut self, tag: &str, ids: &[NeuronId], add: bool) -> AnnotationResult<bool> {
        let tag = tag.trim();
        if tag.is_empty() {
            return Err(AnnotationError::invalid_argument("tag is empty"));
        }
        let neuron_ids = self.known_neurons("edit_tags", ids);
        if neuron_ids.is_empty() {
            return Ok(false);
        }
        self.store
            .bulk_edit_neuron_tags(&neuron_ids, &[tag.to_string()], add)
            .await?;
        for id in &neuron_ids {
            if let Some(neuron) = self.neurons.get_mut(id) {
                if add {
                    neuron.tags.insert(tag.to_string());
                    self.tags.add_tag(tag, *id);
                } else {
                    neuron.tags.remove(tag);
                    self.tags.remove_tag(tag, *id);
                }
            }
        }
        self.notifier
            .publish(vec![AnnotationEvent::NeuronTagsChanged { neuron_ids }]);
        Ok(true)
    }

    pub async fn clear_neuron_tags(&mut self, id: NeuronId) -> AnnotationResult<bool> {
        let Some(neuron) = self.neurons.get(&id) else {
            tracing::warn!("clear_neuron_tags: {}", TreeError::neuron_not_found(id));
            return Ok(false);
        };
        let tags: Vec<String> = neuron.tags.iter().cloned().collect();
        if !tags.is_empty() {
            self.store.bulk_edit_neuron_tags(&[id], &tags, false).await?;
        }
        if let Some(neuron) = self.neurons.get_mut(&id) {
            neuron.tags.clear();
        }
        self.tags.clear_tags(id);
        self.notifier.publish(vec![AnnotationEvent::NeuronTagsChanged {
            neuron_ids: vec![id],
        }]);
        Ok(true)
    }

    // ------------------------------------------------------------------
    // SWC import / export
    // ------------------------------------------------------------------

    /// Import one SWC file as a new neuron in the current workspace
    ///
    /// Cancellation is checked before each node; a cancelled import deletes
    /// the half-built neuron from the store.
    pub async fn import_swc(
        &mut self,
        path: &Path,
        progress: &ProgressReporter,
        cancel: &CancelFlag,
    ) -> AnnotationResult<NeuronId> {
        let workspace_id = self.require_workspace()?.id;
        tracing::info!("Importing neuron from SWC file {:?}", path);
        progress.set_status("Reading SWC file");
        let data = SwcData::read(path).await?;
        data.validate()?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name = swc::import_name(&data, &file_name);
        let offset = data.offset();

        if cancel.is_cancelled() {
            return Err(AnnotationError::Cancelled);
        }
        let mut neuron = self.store.create_neuron(workspace_id, &name).await?;

        if let Err(e) = self.build_imported_neuron(&mut neuron, &data, offset, progress, cancel) {
            if let Err(cleanup) = self.store.delete_neuron(neuron.id).await {
                tracing::warn!("Could not remove partial import {}: {}", neuron.id, cleanup);
            }
            return Err(e);
        }
        if let Some(color) = data.color() {
            neuron.color = Some(color);
        }

        if let Err(e) = self.store.save_neuron(&neuron).await {
            if let Err(cleanup) = self.store.delete_neuron(neuron.id).await {
                tracing::warn!("Could not remove unsaved import {}: {}", neuron.id, cleanup);
            }
            return Err(e.into());
        }
        let id = neuron.id;
        tracing::info!(
            "Imported neuron {} ({}) with {} annotations",
            id,
            neuron.name,
            neuron.annotation_count()
        );
        self.neurons.insert(id, neuron);
        self.current_neuron = Some(id);
        progress.set_status("Done");

        self.notifier.publish(vec![
            AnnotationEvent::NeuronCreated {
                neuron_id: id,
                name,
            },
            AnnotationEvent::NeuronSelected {
                neuron_id: Some(id),
            },
        ]);
        Ok(id)
    }

    fn build_imported_neuron(
        &self,
        neuron: &mut Neuron,
        data: &SwcData,
        offset: Vec3,
        progress: &ProgressReporter,
        cancel: &CancelFlag,
    ) -> AnnotationResult<()> {
        let total = data.nodes.len() as u64;
        let update_every = (total / 20).max(1);
        progress.set_progress(0, total);

        let mut by_index: HashMap<i64, AnnotationId> = HashMap::new();
        for (i, node) in data.nodes.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(AnnotationError::Cancelled);
            }
            let id = self.ids.next_id();
            let location = Vec3::new(node.x, node.y, node.z) + offset;
            let radius = if node.radius > 0.0 {
                node.radius
            } else {
                GeoAnnotation::DEFAULT_RADIUS
            };
            neuron
                .annotations
                .insert(id, GeoAnnotation::new(id, neuron.id, None, location, radius));
            by_index.insert(node.index, id);
            if (i as u64) % update_every == 0 {
                progress.set_progress(i as u64, total);
            }
        }

        let lookup = |index: i64| {
            by_index
                .get(&index)
                .copied()
                .ok_or_else(|| AnnotationError::swc(format!("unknown node index {}", index)))
        };
        for node in &data.nodes {
            let id = lookup(node.index)?;
            if node.is_root() {
                neuron.root_ids.push(id);
                continue;
            }
            let parent = lookup(node.parent_index)?;
            if let Some(ann) = neuron.annotations.get_mut(&id) {
                ann.parent_id = Some(parent);
            }
            if let Some(parent_ann) = neuron.annotations.get_mut(&parent) {
                parent_ann.child_ids.push(id);
            }
        }
        progress.set_progress(total, total);

        neuron
            .validate_invariants()
            .map_err(|e| AnnotationError::swc(format!("inconsistent tree: {}", e)))
    }

    /// Export neurons as SWC
    ///
    /// A single neuron is written to `path`. Several neurons are written one
    /// per file (`<stem>_<n>.swc` next to `path`) plus a combined file at
    /// `path`. All files share one centroid offset. Returns the written paths.
    pub async fn export_swc(
        &self,
        path: &Path,
        neuron_ids: &[NeuronId],
        downsample_modulo: usize,
        progress: &ProgressReporter,
        cancel: &CancelFlag,
    ) -> AnnotationResult<Vec<PathBuf>> {
        let mut neurons = Vec::with_capacity(neuron_ids.len());
        for id in neuron_ids {
            let neuron = self.neurons.get(id).ok_or_else(|| {
                AnnotationError::invalid_argument(format!("unknown neuron {}", id))
            })?;
            neurons.push(neuron);
        }
        if neurons.is_empty() {
            return Err(AnnotationError::invalid_argument("no neurons to export"));
        }
        tracing::info!("Exporting {} neurons to SWC file {:?}", neurons.len(), path);

        progress.set_status("Creating headers");
        let center = swc::centroid(neurons.iter().copied());
        let multiple = neurons.len() > 1;
        let total = neurons.len() as u64 + u64::from(multiple);
        let mut written = Vec::new();

        progress.set_status("Exporting neuron files");
        for (i, neuron) in neurons.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(AnnotationError::Cancelled);
            }
            let [r, g, b] = neuron.style().color.as_floats();
            let mut headers = vec![format!("# COLOR {:.6},{:.6},{:.6}", r, g, b)];
            if multiple {
                headers.push(format!("# NAME {}", neuron.name));
            }
            let data = swc::neuron_to_swc(neuron, headers, center, downsample_modulo);
            let target = if multiple {
                numbered_path(path, i)
            } else {
                path.to_path_buf()
            };
            data.write(&target).await?;
            written.push(target);
            progress.set_progress(i as u64 + 1, total);
        }

        if multiple {
            if cancel.is_cancelled() {
                return Err(AnnotationError::Cancelled);
            }
            progress.set_status("Exporting combined file");
            let mut combined = SwcData {
                headers: vec![format!("# OFFSET {} {} {}", center.x, center.y, center.z)],
                nodes: Vec::new(),
            };
            for neuron in &neurons {
                swc::append_neuron(&mut combined, neuron, center, downsample_modulo);
            }
            combined.write(path).await?;
            written.push(path.to_path_buf());
        }

        progress.set_progress(total, total);
        progress.set_status("Done");
        Ok(written)
    }
}

/// `dir/stem_n.swc` for `dir/stem.swc`
fn numbered_path(path: &Path, n: usize) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "neuron".to_string());
    path.with_file_name(format!("{}_{}{}", stem, n, swc::SWC_EXTENSION))
}

fn dedup_in_order(ids: &mut Vec<AnnotationId>) {
    let mut seen = std::collections::HashSet::new();
    ids.retain(|id| seen.insert(*id));
}

// Comprehensive tests in separate module
#[cfg(test)]
#[path = "annotation_model_test.rs"]
mod annotation_model_test;
