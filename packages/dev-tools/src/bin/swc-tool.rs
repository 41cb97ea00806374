//! SWC Tool Binary
//!
//! Small utilities for SWC skeleton files.
//!
//! # Usage
//!
//! ```bash
//! # Node, root and header summary
//! cargo run --bin swc-tool -- summary cell.swc
//!
//! # One file per neurite root
//! cargo run --bin swc-tool -- split cell.swc out/
//!
//! # Import into an in-memory workspace and export again (optionally downsampled)
//! cargo run --bin swc-tool -- roundtrip cell.swc copy.swc 4
//! ```
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Logging level (e.g., "info", "debug", "trace")

use anyhow::{bail, Context};
use lvv_core::utils::{CancelFlag, ProgressReporter, SwcData};
use lvv_core::{AnnotationModel, InMemoryStore, ModelConfig, Sample, SampleId, Workspace, WorkspaceId};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const USAGE: &str = "usage: swc-tool summary <file> | split <file> <out-dir> | roundtrip <in> <out> [modulo]";

async fn summary(path: &Path) -> anyhow::Result<()> {
    let data = SwcData::read(path).await?;
    data.validate()?;
    let roots = data.nodes.iter().filter(|n| n.is_root()).count();
    println!("file:   {}", path.display());
    println!("name:   {}", data.name().unwrap_or_else(|| "-".to_string()));
    println!("nodes:  {}", data.nodes.len());
    println!("roots:  {}", roots);
    let offset = data.offset();
    println!("offset: {} {} {}", offset.x, offset.y, offset.z);
    if let Some(color) = data.color() {
        println!("color:  {}", color);
    }
    Ok(())
}

async fn split(path: &Path, out_dir: &Path) -> anyhow::Result<()> {
    let data = SwcData::read(path).await?;
    data.validate()?;
    tokio::fs::create_dir_all(out_dir).await?;
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "neurite".to_string());
    let parts = data.split_by_roots();
    for (i, part) in parts.iter().enumerate() {
        let target = out_dir.join(format!("{}_{}.swc", stem, i));
        part.write(&target).await?;
        tracing::info!("Wrote {} nodes to {}", part.nodes.len(), target.display());
    }
    println!("split into {} files", parts.len());
    Ok(())
}

async fn roundtrip(input: &Path, output: &Path, modulo: usize) -> anyhow::Result<()> {
    let store = Arc::new(InMemoryStore::new());
    store
        .insert_sample(Sample::new(SampleId(1), "scratch", "."))
        .await;
    store
        .insert_workspace(Workspace::new(WorkspaceId(1), SampleId(1), "scratch"))
        .await;
    let mut model = AnnotationModel::new(store, ModelConfig::default())?;
    model.load_workspace(WorkspaceId(1)).await?;

    let (progress, mut rx) = ProgressReporter::channel();
    let watcher = tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let p = rx.borrow().clone();
            tracing::debug!("{}: {}/{}", p.status, p.done, p.total);
        }
    });

    let cancel = CancelFlag::new();
    let neuron = model.import_swc(input, &progress, &cancel).await?;
    let written = model
        .export_swc(output, &[neuron], modulo, &progress, &cancel)
        .await?;
    drop(progress);
    let _ = watcher.await;

    for path in written {
        println!("wrote {}", path.display());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let arg = |i: usize| args.get(i).map(PathBuf::from).context(USAGE);

    match args.first().map(String::as_str) {
        Some("summary") => summary(&arg(1)?).await,
        Some("split") => split(&arg(1)?, &arg(2)?).await,
        Some("roundtrip") => {
            let modulo = match args.get(3) {
                Some(m) => m.parse().context("modulo")?,
                None => 1,
            };
            roundtrip(&arg(1)?, &arg(2)?, modulo).await
        }
        _ => bail!(USAGE),
    }
}
