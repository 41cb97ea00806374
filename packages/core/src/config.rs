/// Configuration for the annotation model
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// Upper bound for queued commands; larger queues only hide a stuck executor
const MAX_COMMAND_QUEUE_CAPACITY: usize = 65_536;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Target distance of a split anchor from the annotation being split
    pub split_anchor_distance: f64,

    /// Allowed mismatch (voxels, per axis) between a traced path's ends and
    /// the live anchor locations
    pub path_endpoint_tolerance: i32,

    /// Capacity of the broadcast channel carrying annotation events
    pub event_channel_capacity: usize,

    /// Capacity of the single-writer command queue
    pub command_queue_capacity: usize,

    /// Neuron tags offered to users even before any neuron carries them
    pub predefined_neuron_tags: BTreeSet<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            split_anchor_distance: 60.0,
            path_endpoint_tolerance: 5,
            event_channel_capacity: 128,
            command_queue_capacity: 64,
            predefined_neuron_tags: ["auto", "traced", "reviewed", "unfinished", "soma"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl ModelConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.split_anchor_distance.is_finite() || self.split_anchor_distance <= 0.0 {
            return Err("split_anchor_distance must be a positive number".to_string());
        }

        if self.path_endpoint_tolerance <= 0 {
            return Err("path_endpoint_tolerance must be greater than 0".to_string());
        }

        if self.event_channel_capacity == 0 {
            return Err("event_channel_capacity must be greater than 0".to_string());
        }

        if self.command_queue_capacity == 0 {
            return Err("command_queue_capacity must be greater than 0".to_string());
        }

        if self.command_queue_capacity > MAX_COMMAND_QUEUE_CAPACITY {
            return Err(format!(
                "command_queue_capacity cannot exceed {}",
                MAX_COMMAND_QUEUE_CAPACITY
            ));
        }

        if self.predefined_neuron_tags.iter().any(|t| t.trim().is_empty()) {
            return Err("predefined_neuron_tags cannot contain blank tags".to_string());
        }

        Ok(())
    }

    /// Load configuration from a JSON file
    ///
    /// A missing file yields the defaults; missing keys fall back to their
    /// default values.
    pub async fn load(path: &Path) -> Result<Self, String> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            tracing::debug!("No model config at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("Failed to read config {:?}: {}", path, e))?;
        let config: ModelConfig = serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse config {:?}: {}", path, e))?;
        config.validate()?;

        tracing::info!("Loaded model config from {:?}", path);
        Ok(config)
    }
}
