//! SWC Import/Export Tests
//!
//! Drives import and export through the model against files in a temporary
//! directory: offsets, colors, multi-neuron layout, downsampling, progress
//! and cancellation.

use anyhow::Result;
use lvv_core::utils::{CancelFlag, ProgressReporter, SwcData};
use lvv_core::{
    AnnotationError, AnnotationModel, Color, InMemoryStore, ModelConfig, Sample, SampleId, Vec3,
    Workspace, WorkspaceId,
};
use std::sync::Arc;
use tempfile::TempDir;

const BRANCHED: &str = "\
# NAME branched cell
# OFFSET 100 200 300
# COLOR 1.0,0.0,0.0
1 1 0 0 0 2.0 -1
2 3 10 0 0 1.0 1
3 3 20 0 0 1.0 2
4 3 20 10 0 1.0 3
5 3 20 -10 0 1.0 3
";

async fn create_test_model() -> Result<AnnotationModel> {
    let store = Arc::new(InMemoryStore::new());
    store
        .insert_sample(Sample::new(SampleId(1), "sample", "/data"))
        .await;
    store
        .insert_workspace(Workspace::new(WorkspaceId(1), SampleId(1), "ws"))
        .await;
    let mut model = AnnotationModel::new(store, ModelConfig::default())?;
    model.load_workspace(WorkspaceId(1)).await?;
    Ok(model)
}

#[tokio::test]
async fn test_import_applies_offset_name_and_color() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("cell.swc");
    tokio::fs::write(&path, BRANCHED).await?;
    let mut model = create_test_model().await?;

    let (progress, rx) = ProgressReporter::channel();
    let id = model.import_swc(&path, &progress, &CancelFlag::new()).await?;

    let neuron = model.neuron(id).expect("imported neuron");
    assert_eq!(neuron.name, "branched cell");
    assert_eq!(neuron.color, Some(Color::rgb(255, 0, 0)));
    assert_eq!(neuron.annotation_count(), 5);
    assert_eq!(neuron.root_ids.len(), 1);
    assert!(neuron.validate_invariants().is_ok());

    let root = neuron.annotation(neuron.root_ids[0]).expect("root");
    assert_eq!(root.location, Vec3::new(100.0, 200.0, 300.0));
    assert_eq!(root.radius, 2.0);
    assert_eq!(model.current_neuron().map(|n| n.id), Some(id));

    let final_progress = rx.borrow().clone();
    assert_eq!(final_progress.done, final_progress.total);
    Ok(())
}

#[tokio::test]
async fn test_import_uses_file_name_without_name_header() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("axon_7.swc");
    tokio::fs::write(&path, "1 1 0 0 0 1 -1\n2 3 1 0 0 1 1\n").await?;
    let mut model = create_test_model().await?;

    let id = model
        .import_swc(&path, &ProgressReporter::disabled(), &CancelFlag::new())
        .await?;
    assert_eq!(model.neuron(id).map(|n| n.name.as_str()), Some("axon_7"));
    Ok(())
}

#[tokio::test]
async fn test_import_rejects_missing_parent() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("broken.swc");
    tokio::fs::write(&path, "1 1 0 0 0 1 -1\n2 3 1 0 0 1 9\n").await?;
    let mut model = create_test_model().await?;

    let err = model
        .import_swc(&path, &ProgressReporter::disabled(), &CancelFlag::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AnnotationError::Swc(_)));
    assert_eq!(model.neurons().count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_cancelled_import_creates_nothing() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("cell.swc");
    tokio::fs::write(&path, BRANCHED).await?;
    let mut model = create_test_model().await?;

    let cancel = CancelFlag::new();
    cancel.cancel();
    let err = model
        .import_swc(&path, &ProgressReporter::disabled(), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, AnnotationError::Cancelled));
    assert_eq!(model.neurons().count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_export_then_import_preserves_geometry() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let source = temp_dir.path().join("cell.swc");
    tokio::fs::write(&source, BRANCHED).await?;
    let mut model = create_test_model().await?;
    let original = model
        .import_swc(&source, &ProgressReporter::disabled(), &CancelFlag::new())
        .await?;

    let exported = temp_dir.path().join("out.swc");
    let written = model
        .export_swc(
            &exported,
            &[original],
            1,
            &ProgressReporter::disabled(),
            &CancelFlag::new(),
        )
        .await?;
    assert_eq!(written, vec![exported.clone()]);

    let data = SwcData::read(&exported).await?;
    assert!(data.headers.iter().any(|h| h.starts_with("# COLOR")));
    assert!(!data.headers.iter().any(|h| h.starts_with("# NAME")));

    let copy = model
        .import_swc(&exported, &ProgressReporter::disabled(), &CancelFlag::new())
        .await?;
    let mut before: Vec<_> = model
        .neuron(original)
        .expect("original")
        .annotations_in_tree_order()
        .map(|a| a.location)
        .collect();
    let mut after: Vec<_> = model
        .neuron(copy)
        .expect("copy")
        .annotations_in_tree_order()
        .map(|a| a.location)
        .collect();
    before.sort_by(|a, b| a.as_array().partial_cmp(&b.as_array()).unwrap());
    after.sort_by(|a, b| a.as_array().partial_cmp(&b.as_array()).unwrap());
    assert_eq!(before, after);
    Ok(())
}

#[tokio::test]
async fn test_export_many_writes_numbered_and_combined_files() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let mut model = create_test_model().await?;
    let a = model.create_neuron("a").await?;
    let root_a = model
        .add_root_annotation(a, Vec3::new(0.0, 0.0, 0.0))
        .await?
        .expect("root a");
    model
        .add_child_annotation(root_a, Vec3::new(4.0, 0.0, 0.0))
        .await?;
    let b = model.create_neuron("b").await?;
    model
        .add_root_annotation(b, Vec3::new(8.0, 0.0, 0.0))
        .await?;

    let path = temp_dir.path().join("all.swc");
    let written = model
        .export_swc(
            &path,
            &[a, b],
            1,
            &ProgressReporter::disabled(),
            &CancelFlag::new(),
        )
        .await?;

    assert_eq!(
        written,
        vec![
            temp_dir.path().join("all_0.swc"),
            temp_dir.path().join("all_1.swc"),
            path.clone(),
        ]
    );
    let first = SwcData::read(&written[0]).await?;
    assert_eq!(first.name().as_deref(), Some("a"));
    // Shared centroid (4,0,0) is written as the offset of every file
    assert_eq!(first.offset(), Vec3::new(4.0, 0.0, 0.0));

    let combined = SwcData::read(&path).await?;
    assert_eq!(combined.nodes.len(), 3);
    assert_eq!(combined.split_by_roots().len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_export_downsamples_unbranched_runs() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let mut model = create_test_model().await?;
    let n = model.create_neuron("long").await?;
    let mut parent = model
        .add_root_annotation(n, Vec3::default())
        .await?
        .expect("root");
    for i in 1..=10 {
        parent = model
            .add_child_annotation(parent, Vec3::new(i as f64, 0.0, 0.0))
            .await?
            .expect("child");
    }

    let path = temp_dir.path().join("long.swc");
    model
        .export_swc(&path, &[n], 3, &ProgressReporter::disabled(), &CancelFlag::new())
        .await?;

    let data = SwcData::read(&path).await?;
    assert!(data.nodes.len() < 11);
    assert!(data.validate().is_ok());
    // Root and end point survive
    assert_eq!(data.nodes.first().map(|n| n.x), Some(-5.0));
    assert!(data.nodes.iter().any(|n| n.x == 5.0));
    Ok(())
}
