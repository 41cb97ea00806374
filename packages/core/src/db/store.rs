//! Remote Domain Store Abstraction
//!
//! The annotation layer persists samples, workspaces and neurons through this
//! trait. Implementations wrap whatever service actually holds the data; the
//! core only relies on the contract below and treats every call as fallible.
//!
//! # Contract
//!
//! - `save_*` calls persist a full snapshot of the object
//! - `create_*` calls allocate ids; the returned object is authoritative
//! - Bulk calls (`update_neuron_styles`, `bulk_edit_neuron_tags`) are all or
//!   nothing from the caller's point of view

use crate::db::error::StoreResult;
use crate::models::{
    BulkNeuronStyleUpdate, Neuron, NeuronId, Sample, SampleId, Workspace, WorkspaceId,
};
use async_trait::async_trait;

#[async_trait]
pub trait DomainStore: Send + Sync {
    async fn get_sample(&self, id: SampleId) -> StoreResult<Sample>;

    async fn save_sample(&self, sample: &Sample) -> StoreResult<()>;

    async fn create_workspace(&self, sample_id: SampleId, name: &str) -> StoreResult<Workspace>;

    async fn get_workspace(&self, id: WorkspaceId) -> StoreResult<Workspace>;

    async fn save_workspace(&self, workspace: &Workspace) -> StoreResult<()>;

    /// Copy a workspace and all its neurons under a new name
    async fn copy_workspace(&self, id: WorkspaceId, name: &str) -> StoreResult<Workspace>;

    async fn load_workspace_neurons(&self, id: WorkspaceId) -> StoreResult<Vec<Neuron>>;

    async fn create_neuron(&self, workspace_id: WorkspaceId, name: &str) -> StoreResult<Neuron>;

    async fn save_neuron(&self, neuron: &Neuron) -> StoreResult<()>;

    async fn delete_neuron(&self, id: NeuronId) -> StoreResult<()>;

    async fn update_neuron_styles(&self, update: &BulkNeuronStyleUpdate) -> StoreResult<()>;

    /// Add (`add == true`) or remove `tags` on every listed neuron
    async fn bulk_edit_neuron_tags(
        &self,
        neuron_ids: &[NeuronId],
        tags: &[String],
        add: bool,
    ) -> StoreResult<()>;
}
