//! Single-writer executor for the annotation model
//!
//! The model is owned by one background task. Every caller goes through an
//! [`AnnotationModelHandle`], which queues a job and awaits its reply, so
//! operations run one at a time in the order they were submitted and a
//! persistence round trip never interleaves with another edit.
//!
//! # Architecture
//!
//! ```text
//! handle.add_child_annotation(..) ─┐
//! handle.merge_neurite(..) ────────┼─► mpsc job queue ─► executor task ─► &mut AnnotationModel
//! handle.import_swc(..) ───────────┘                            │
//!                                                               └─► oneshot reply
//! ```
//!
//! Dropping the [`ModelExecutor`] (or calling [`ModelExecutor::shutdown`])
//! stops the task after the job in progress; later calls fail with
//! [`AnnotationError::ModelClosed`].

use crate::db::AnnotationEvent;
use crate::models::{
    AnchoredPathEndpoints, AnnotationId, Color, GeoAnnotation, Neuron, NeuronId, NeuronStyle,
    SampleId, Vec3, WorkspaceId,
};
use crate::services::annotation_model::AnnotationModel;
use crate::services::error::{AnnotationError, AnnotationResult};
use crate::services::notifier::{AnnotationListener, EventNotifier, ListenerId};
use crate::utils::progress::{CancelFlag, ProgressReporter};
use std::collections::BTreeSet;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};

/// Boxed future borrowing the model for `'a`
pub type ModelFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

type Job = Box<dyn for<'a> FnOnce(&'a mut AnnotationModel) -> ModelFuture<'a, ()> + Send>;

fn boxed_job<F>(f: F) -> Job
where
    F: for<'a> FnOnce(&'a mut AnnotationModel) -> ModelFuture<'a, ()> + Send + 'static,
{
    Box::new(f)
}

/// Owns the background task running the model
pub struct ModelExecutor {
    handle: AnnotationModelHandle,
    _shutdown_tx: mpsc::Sender<()>,
}

impl ModelExecutor {
    /// Move `model` onto a background task
    pub fn spawn(mut model: AnnotationModel) -> Self {
        let capacity = model.config().command_queue_capacity;
        let notifier = model.notifier();
        let (job_tx, mut job_rx) = mpsc::channel::<Job>(capacity);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        tokio::spawn(async move {
            tracing::info!("Annotation model executor started");
            loop {
                tokio::select! {
                    biased; // Check shutdown first

                    _ = shutdown_rx.recv() => {
                        tracing::info!("Annotation model executor shutting down");
                        break;
                    }

                    job = job_rx.recv() => match job {
                        Some(job) => job(&mut model).await,
                        None => {
                            tracing::debug!("All model handles dropped");
                            break;
                        }
                    }
                }
            }
        });

        Self {
            handle: AnnotationModelHandle {
                jobs: job_tx,
                notifier,
            },
            _shutdown_tx: shutdown_tx,
        }
    }

    pub fn handle(&self) -> AnnotationModelHandle {
        self.handle.clone()
    }

    /// Stop the executor; queued jobs that have not started are dropped
    pub fn shutdown(self) {
        tracing::info!("Shutting down annotation model executor");
        // Dropping the sender wakes the shutdown branch
    }
}

/// Cloneable, `Send` entry point to the model
#[derive(Clone)]
pub struct AnnotationModelHandle {
    jobs: mpsc::Sender<Job>,
    notifier: Arc<EventNotifier>,
}

impl AnnotationModelHandle {
    /// Run `job` with exclusive access to the model and return its result
    pub async fn call<R, F>(&self, job: F) -> AnnotationResult<R>
    where
        R: Send + 'static,
        F: for<'a> FnOnce(&'a mut AnnotationModel) -> ModelFuture<'a, R> + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let wrapped = boxed_job(move |model| {
            Box::pin(async move {
                let result = job(model).await;
                // Caller may have given up waiting
                let _ = reply_tx.send(result);
            })
        });
        self.jobs
            .send(wrapped)
            .await
            .map_err(|_| AnnotationError::ModelClosed)?;
        reply_rx.await.map_err(|_| AnnotationError::ModelClosed)
    }

    /// Like [`call`](Self::call) for jobs that already return a result
    async fn call_flat<R, F>(&self, job: F) -> AnnotationResult<R>
    where
        R: Send + 'static,
        F: for<'a> FnOnce(&'a mut AnnotationModel) -> ModelFuture<'a, AnnotationResult<R>>
            + Send
            + 'static,
    {
        self.call(job).await?
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

    // Loading

    pub async fn load_sample(&self, id: SampleId) -> AnnotationResult<()> {
        self.call_flat(move |m| Box::pin(m.load_sample(id))).await
    }

    pub async fn load_workspace(&self, id: WorkspaceId) -> AnnotationResult<()> {
        self.call_flat(move |m| Box::pin(m.load_workspace(id))).await
    }

    pub async fn clear(&self) -> AnnotationResult<()> {
        self.call(|m| Box::pin(async move { m.clear() })).await
    }

    pub async fn set_automated_tracing(&self, enabled: bool) -> AnnotationResult<()> {
        self.call_flat(move |m| Box::pin(m.set_automated_tracing(enabled)))
            .await
    }

    // Neurons

    pub async fn create_neuron(&self, name: impl Into<String>) -> AnnotationResult<NeuronId> {
        let name = name.into();
        self.call_flat(move |m| Box::pin(async move { m.create_neuron(&name).await }))
            .await
    }

    pub async fn rename_neuron(
        &self,
        id: NeuronId,
        name: impl Into<String>,
    ) -> AnnotationResult<bool> {
        let name = name.into();
        self.call_flat(move |m| Box::pin(async move { m.rename_neuron(id, &name).await }))
            .await
    }

    pub async fn delete_neuron(&self, id: NeuronId) -> AnnotationResult<bool> {
        self.call_flat(move |m| Box::pin(m.delete_neuron(id))).await
    }

    pub async fn select_neuron(&self, id: Option<NeuronId>) -> AnnotationResult<bool> {
        self.call(move |m| Box::pin(async move { m.select_neuron(id) }))
            .await
    }

    pub async fn neuron(&self, id: NeuronId) -> AnnotationResult<Option<Neuron>> {
        self.call(move |m| Box::pin(async move { m.neuron(id).cloned() }))
            .await
    }

    pub async fn current_neuron_id(&self) -> AnnotationResult<Option<NeuronId>> {
        self.call(|m| Box::pin(async move { m.current_neuron().map(|n| n.id) }))
            .await
    }

    // Annotations

    pub async fn add_root_annotation(
        &self,
        neuron: NeuronId,
        location: Vec3,
    ) -> AnnotationResult<Option<AnnotationId>> {
        self.call_flat(move |m| Box::pin(m.add_root_annotation(neuron, location)))
            .await
    }

    pub async fn add_child_annotation(
        &self,
        parent: AnnotationId,
        location: Vec3,
    ) -> AnnotationResult<Option<AnnotationId>> {
        self.call_flat(move |m| Box::pin(m.add_child_annotation(parent, location)))
            .await
    }

    pub async fn move_annotation(
        &self,
        id: AnnotationId,
        location: Vec3,
    ) -> AnnotationResult<bool> {
        self.call_flat(move |m| Box::pin(m.move_annotation(id, location)))
            .await
    }

    pub async fn update_annotation_radius(
        &self,
        id: AnnotationId,
        radius: f64,
    ) -> AnnotationResult<bool> {
        self.call_flat(move |m| Box::pin(m.update_annotation_radius(id, radius)))
            .await
    }

    pub async fn delete_link(&self, id: AnnotationId) -> AnnotationResult<bool> {
        self.call_flat(move |m| Box::pin(m.delete_link(id))).await
    }

    pub async fn delete_subtree(&self, id: AnnotationId) -> AnnotationResult<bool> {
        self.call_flat(move |m| Box::pin(m.delete_subtree(id))).await
    }

    pub async fn split_annotation(
        &self,
        id: AnnotationId,
    ) -> AnnotationResult<Option<AnnotationId>> {
        self.call_flat(move |m| Box::pin(m.split_annotation(id))).await
    }

    pub async fn reroot_neurite(&self, new_root: AnnotationId) -> AnnotationResult<bool> {
        self.call_flat(move |m| Box::pin(m.reroot_neurite(new_root)))
            .await
    }

    pub async fn split_neurite(&self, new_root: AnnotationId) -> AnnotationResult<bool> {
        self.call_flat(move |m| Box::pin(m.split_neurite(new_root)))
            .await
    }

    pub async fn merge_neurite(
        &self,
        source: AnnotationId,
        target: AnnotationId,
    ) -> AnnotationResult<bool> {
        self.call_flat(move |m| Box::pin(m.merge_neurite(source, target)))
            .await
    }

    pub async fn move_neurite(
        &self,
        annotation: AnnotationId,
        dest: NeuronId,
    ) -> AnnotationResult<bool> {
        self.call_flat(move |m| Box::pin(m.move_neurite(annotation, dest)))
            .await
    }

    pub async fn add_anchored_path(
        &self,
        endpoints: AnchoredPathEndpoints,
        points: Vec<[i32; 3]>,
    ) -> AnnotationResult<bool> {
        self.call_flat(move |m| Box::pin(m.add_anchored_path(endpoints, points)))
            .await
    }

    pub async fn set_note(
        &self,
        id: AnnotationId,
        text: impl Into<String>,
    ) -> AnnotationResult<bool> {
        let text = text.into();
        self.call_flat(move |m| Box::pin(async move { m.set_note(id, &text).await }))
            .await
    }

    pub async fn annotation(&self, id: AnnotationId) -> AnnotationResult<Option<GeoAnnotation>> {
        self.call(move |m| Box::pin(async move { m.annotation(id).cloned() }))
            .await
    }

    pub async fn closest_annotation(
        &self,
        location: Vec3,
        excluded: Option<AnnotationId>,
    ) -> AnnotationResult<Option<GeoAnnotation>> {
        self.call(move |m| {
            Box::pin(async move { m.closest_annotation(location, excluded).cloned() })
        })
        .await
    }

    // Styles and tags

    pub async fn set_neuron_style(
        &self,
        id: NeuronId,
        style: NeuronStyle,
    ) -> AnnotationResult<bool> {
        self.call_flat(move |m| Box::pin(m.set_neuron_style(id, style)))
            .await
    }

    pub async fn set_neuron_colors(
        &self,
        ids: Vec<NeuronId>,
        color: Color,
    ) -> AnnotationResult<bool> {
        self.call_flat(move |m| Box::pin(async move { m.set_neuron_colors(&ids, color).await }))
            .await
    }

    pub async fn add_neuron_tag(
        &self,
        tag: impl Into<String>,
        ids: Vec<NeuronId>,
    ) -> AnnotationResult<bool> {
        let tag = tag.into();
        self.call_flat(move |m| Box::pin(async move { m.add_neuron_tag(&tag, &ids).await }))
            .await
    }

    pub async fn remove_neuron_tag(
        &self,
        tag: impl Into<String>,
        ids: Vec<NeuronId>,
    ) -> AnnotationResult<bool> {
        let tag = tag.into();
        self.call_flat(move |m| {
            Box::pin(async move { m.remove_neuron_tag(&tag, &ids).await })
        })
        .await
    }

    pub async fn neurons_for_tag(
        &self,
        tag: impl Into<String>,
    ) -> AnnotationResult<BTreeSet<NeuronId>> {
        let tag = tag.into();
        self.call(move |m| Box::pin(async move { m.neurons_for_tag(&tag) }))
            .await
    }

    // SWC

    pub async fn import_swc(
        &self,
        path: PathBuf,
        progress: ProgressReporter,
        cancel: CancelFlag,
    ) -> AnnotationResult<NeuronId> {
        self.call_flat(move |m| {
            Box::pin(async move { m.import_swc(&path, &progress, &cancel).await })
        })
        .await
    }

    pub async fn export_swc(
        &self,
        path: PathBuf,
        neurons: Vec<NeuronId>,
        downsample_modulo: usize,
        progress: ProgressReporter,
        cancel: CancelFlag,
    ) -> AnnotationResult<Vec<PathBuf>> {
        self.call_flat(move |m| {
            Box::pin(async move {
                m.export_swc(&path, &neurons, downsample_modulo, &progress, &cancel)
                    .await
            })
        })
        .await
    }
}
