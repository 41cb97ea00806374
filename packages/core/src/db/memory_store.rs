//! In-memory `DomainStore`
//!
//! Reference implementation of the remote store used by tests, benchmarks and
//! the development tools. It keeps full snapshots of every object and supports
//! failure injection so persistence error paths can be exercised:
//!
//! - `set_offline(true)` makes every call fail with `Unavailable`
//! - `fail_next_writes(n)` rejects the next `n` write calls

use crate::db::error::{StoreError, StoreResult};
use crate::db::store::DomainStore;
use crate::models::{
    BulkNeuronStyleUpdate, Neuron, NeuronId, Sample, SampleId, Workspace, WorkspaceId,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use tokio::sync::RwLock;

#[derive(Default)]
struct StoreState {
    samples: HashMap<SampleId, Sample>,
    workspaces: HashMap<WorkspaceId, Workspace>,
    neurons: HashMap<NeuronId, Neuron>,
}

pub struct InMemoryStore {
    state: RwLock<StoreState>,
    next_id: AtomicU64,
    offline: AtomicBool,
    failing_writes: AtomicUsize,
    write_count: AtomicUsize,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            next_id: AtomicU64::new(1000),
            offline: AtomicBool::new(false),
            failing_writes: AtomicUsize::new(0),
            write_count: AtomicUsize::new(0),
        }
    }

    /// Seed a sample
    pub async fn insert_sample(&self, sample: Sample) {
        self.state.write().await.samples.insert(sample.id, sample);
    }

    /// Seed a workspace
    pub async fn insert_workspace(&self, workspace: Workspace) {
        self.state
            .write()
            .await
            .workspaces
            .insert(workspace.id, workspace);
    }

    /// Seed a neuron snapshot
    pub async fn insert_neuron(&self, neuron: Neuron) {
        self.state.write().await.neurons.insert(neuron.id, neuron);
    }

    /// Current persisted snapshot of a neuron
    pub async fn neuron(&self, id: NeuronId) -> Option<Neuron> {
        self.state.read().await.neurons.get(&id).cloned()
    }

    pub async fn workspace(&self, id: WorkspaceId) -> Option<Workspace> {
        self.state.read().await.workspaces.get(&id).cloned()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Reject the next `n` write calls with `Rejected`
    pub fn fail_next_writes(&self, n: usize) {
        self.failing_writes.store(n, Ordering::SeqCst);
    }

    /// Number of successful write calls so far
    pub fn write_count(&self) -> usize {
        self.write_count.load(Ordering::SeqCst)
    }

    fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn check_online(&self) -> StoreResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable("in-memory store is offline"));
        }
        Ok(())
    }

    fn check_write(&self) -> StoreResult<()> {
        self.check_online()?;
        let rejected = self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if rejected {
            return Err(StoreError::rejected("injected write failure"));
        }
        self.write_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl DomainStore for InMemoryStore {
    async fn get_sample(&self, id: SampleId) -> StoreResult<Sample> {
        self.check_online()?;
        self.state
            .read()
            .await
            .samples
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("sample", id))
    }

    async fn save_sample(&self, sample: &Sample) -> StoreResult<()> {
        self.check_write()?;
        self.state
            .write()
            .await
            .samples
            .insert(sample.id, sample.clone());
        Ok(())
    }

    async fn create_workspace(&self, sample_id: SampleId, name: &str) -> StoreResult<Workspace> {
        self.check_write()?;
        let mut state = self.state.write().await;
        if !state.samples.contains_key(&sample_id) {
            return Err(StoreError::not_found("sample", sample_id));
        }
        let workspace = Workspace::new(WorkspaceId(self.allocate_id()), sample_id, name);
        state.workspaces.insert(workspace.id, workspace.clone());
        Ok(workspace)
    }

    async fn get_workspace(&self, id: WorkspaceId) -> StoreResult<Workspace> {
        self.check_online()?;
        self.state
            .read()
            .await
            .workspaces
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("workspace", id))
    }

    async fn save_workspace(&self, workspace: &Workspace) -> StoreResult<()> {
        self.check_write()?;
        self.state
            .write()
            .await
            .workspaces
            .insert(workspace.id, workspace.clone());
        Ok(())
    }

    async fn copy_workspace(&self, id: WorkspaceId, name: &str) -> StoreResult<Workspace> {
        self.check_write()?;
        let mut state = self.state.write().await;
        let source = state
            .workspaces
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("workspace", id))?;

        let mut copy = Workspace::new(WorkspaceId(self.allocate_id()), source.sample_id, name);
        copy.auto_tracing = source.auto_tracing;
        copy.auto_point_refinement = source.auto_point_refinement;

        let originals: Vec<Neuron> = state
            .neurons
            .values()
            .filter(|n| n.workspace_id == id)
            .cloned()
            .collect();
        for mut neuron in originals {
            neuron.id = NeuronId(self.allocate_id());
            neuron.workspace_id = copy.id;
            let neuron_id = neuron.id;
            for ann in neuron.annotations.values_mut() {
                ann.neuron_id = neuron_id;
            }
            state.neurons.insert(neuron.id, neuron);
        }
        state.workspaces.insert(copy.id, copy.clone());
        Ok(copy)
    }

    async fn load_workspace_neurons(&self, id: WorkspaceId) -> StoreResult<Vec<Neuron>> {
        self.check_online()?;
        let state = self.state.read().await;
        if !state.workspaces.contains_key(&id) {
            return Err(StoreError::not_found("workspace", id));
        }
        let mut neurons: Vec<Neuron> = state
            .neurons
            .values()
            .filter(|n| n.workspace_id == id)
            .cloned()
            .collect();
        neurons.sort_by_key(|n| n.id);
        Ok(neurons)
    }

    async fn create_neuron(&self, workspace_id: WorkspaceId, name: &str) -> StoreResult<Neuron> {
        self.check_write()?;
        let mut state = self.state.write().await;
        if !state.workspaces.contains_key(&workspace_id) {
            return Err(StoreError::not_found("workspace", workspace_id));
        }
        let neuron = Neuron::new(NeuronId(self.allocate_id()), workspace_id, name);
        state.neurons.insert(neuron.id, neuron.clone());
        Ok(neuron)
    }

    async fn save_neuron(&self, neuron: &Neuron) -> StoreResult<()> {
        self.check_write()?;
        self.state
            .write()
            .await
            .neurons
            .insert(neuron.id, neuron.clone());
        Ok(())
    }

    async fn delete_neuron(&self, id: NeuronId) -> StoreResult<()> {
        self.check_write()?;
        self.state
            .write()
            .await
            .neurons
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found("neuron", id))
    }

    async fn update_neuron_styles(&self, update: &BulkNeuronStyleUpdate) -> StoreResult<()> {
        self.check_write()?;
        let mut state = self.state.write().await;
        for id in &update.neuron_ids {
            if let Some(neuron) = state.neurons.get_mut(id) {
                if let Some(visible) = update.visible {
                    neuron.visible = visible;
                }
                if let Some(color) = update.color {
                    neuron.color = Some(color);
                }
            }
        }
        Ok(())
    }

    async fn bulk_edit_neuron_tags(
        &self,
        neuron_ids: &[NeuronId],
        tags: &[String],
        add: bool,
    ) -> StoreResult<()> {
        self.check_write()?;
        let mut state = self.state.write().await;
        for id in neuron_ids {
            if let Some(neuron) = state.neurons.get_mut(id) {
                for tag in tags {
                    if add {
                        neuron.tags.insert(tag.clone());
                    } else {
                        neuron.tags.remove(tag);
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded() -> (InMemoryStore, Workspace) {
        let store = InMemoryStore::new();
        store
            .insert_sample(Sample::new(SampleId(1), "sample", "/tiles"))
            .await;
        let ws = store.create_workspace(SampleId(1), "ws").await.unwrap();
        (store, ws)
    }

    #[tokio::test]
    async fn test_create_and_load_neurons() {
        let (store, ws) = seeded().await;
        let a = store.create_neuron(ws.id, "a").await.unwrap();
        let b = store.create_neuron(ws.id, "b").await.unwrap();
        assert_ne!(a.id, b.id);

        let loaded = store.load_workspace_neurons(ws.id).await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].name, "a");
    }

    #[tokio::test]
    async fn test_offline_store_fails_reads_and_writes() {
        let (store, ws) = seeded().await;
        store.set_offline(true);
        assert!(matches!(
            store.get_workspace(ws.id).await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.create_neuron(ws.id, "x").await.is_err());
        store.set_offline(false);
        assert!(store.create_neuron(ws.id, "x").await.is_ok());
    }

    #[tokio::test]
    async fn test_injected_write_failures_are_consumed() {
        let (store, ws) = seeded().await;
        let neuron = store.create_neuron(ws.id, "n").await.unwrap();
        store.fail_next_writes(1);
        assert!(matches!(
            store.save_neuron(&neuron).await,
            Err(StoreError::Rejected(_))
        ));
        assert!(store.save_neuron(&neuron).await.is_ok());
    }

    #[tokio::test]
    async fn test_copy_workspace_rehomes_neurons() {
        let (store, ws) = seeded().await;
        store.create_neuron(ws.id, "n").await.unwrap();
        let copy = store.copy_workspace(ws.id, "copy").await.unwrap();
        assert_ne!(copy.id, ws.id);

        let copied = store.load_workspace_neurons(copy.id).await.unwrap();
        assert_eq!(copied.len(), 1);
        assert_eq!(copied[0].workspace_id, copy.id);
        assert_eq!(store.load_workspace_neurons(ws.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_bulk_tags_and_styles() {
        let (store, ws) = seeded().await;
        let n = store.create_neuron(ws.id, "n").await.unwrap();
        store
            .bulk_edit_neuron_tags(&[n.id], &["soma".to_string()], true)
            .await
            .unwrap();
        store
            .update_neuron_styles(&BulkNeuronStyleUpdate {
                neuron_ids: vec![n.id],
                visible: Some(false),
                color: None,
            })
            .await
            .unwrap();
        let saved = store.neuron(n.id).await.unwrap();
        assert!(saved.tags.contains("soma"));
        assert!(!saved.visible);
    }
}
