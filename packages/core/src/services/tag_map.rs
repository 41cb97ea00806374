//! Neuron tag index
//!
//! Keeps the two directions of the tag relation (tag -> neurons and
//! neuron -> tags) in agreement. The annotation model rebuilds it on workspace
//! load and updates it after every successful tag edit.

use crate::models::{Neuron, NeuronId};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default)]
pub struct NeuronTagMap {
    tags_by_neuron: BTreeMap<NeuronId, BTreeSet<String>>,
    neurons_by_tag: BTreeMap<String, BTreeSet<NeuronId>>,
    predefined: BTreeSet<String>,
}

impl NeuronTagMap {
    pub fn new(predefined: BTreeSet<String>) -> Self {
        Self {
            predefined,
            ..Default::default()
        }
    }

    /// Rebuild both indices from neuron snapshots
    pub fn rebuild<'a>(&mut self, neurons: impl IntoIterator<Item = &'a Neuron>) {
        self.clear();
        for neuron in neurons {
            for tag in &neuron.tags {
                self.add_tag(tag, neuron.id);
            }
        }
    }

    /// Forget every tag assignment; predefined tags stay
    pub fn clear(&mut self) {
        self.tags_by_neuron.clear();
        self.neurons_by_tag.clear();
    }

    pub fn add_tag(&mut self, tag: &str, neuron: NeuronId) {
        self.tags_by_neuron
            .entry(neuron)
            .or_default()
            .insert(tag.to_string());
        self.neurons_by_tag
            .entry(tag.to_string())
            .or_default()
            .insert(neuron);
    }

    pub fn remove_tag(&mut self, tag: &str, neuron: NeuronId) {
        if let Some(tags) = self.tags_by_neuron.get_mut(&neuron) {
            tags.remove(tag);
            if tags.is_empty() {
                self.tags_by_neuron.remove(&neuron);
            }
        }
        if let Some(neurons) = self.neurons_by_tag.get_mut(tag) {
            neurons.remove(&neuron);
            if neurons.is_empty() {
                self.neurons_by_tag.remove(tag);
            }
        }
    }

    /// Remove every tag from `neuron`, returning what was removed
    pub fn clear_tags(&mut self, neuron: NeuronId) -> BTreeSet<String> {
        let removed = self.tags_by_neuron.remove(&neuron).unwrap_or_default();
        for tag in &removed {
            if let Some(neurons) = self.neurons_by_tag.get_mut(tag) {
                neurons.remove(&neuron);
                if neurons.is_empty() {
                    self.neurons_by_tag.remove(tag);
                }
            }
        }
        removed
    }

    pub fn tags(&self, neuron: NeuronId) -> BTreeSet<String> {
        self.tags_by_neuron.get(&neuron).cloned().unwrap_or_default()
    }

    pub fn has_tag(&self, neuron: NeuronId, tag: &str) -> bool {
        self.tags_by_neuron
            .get(&neuron)
            .is_some_and(|tags| tags.contains(tag))
    }

    /// Tags carried by at least one neuron
    pub fn all_tags(&self) -> BTreeSet<String> {
        self.neurons_by_tag.keys().cloned().collect()
    }

    pub fn neurons_for_tag(&self, tag: &str) -> BTreeSet<NeuronId> {
        self.neurons_by_tag.get(tag).cloned().unwrap_or_default()
    }

    pub fn predefined_tags(&self) -> &BTreeSet<String> {
        &self.predefined
    }

    /// Tags in use plus the predefined ones
    pub fn available_tags(&self) -> BTreeSet<String> {
        let mut tags = self.all_tags();
        tags.extend(self.predefined.iter().cloned());
        tags
    }

    /// Both directions agree
    pub fn is_consistent(&self) -> bool {
        let forward = self
            .tags_by_neuron
            .iter()
            .all(|(n, tags)| tags.iter().all(|t| self.neurons_by_tag.get(t).is_some_and(|s| s.contains(n))));
        let backward = self
            .neurons_by_tag
            .iter()
            .all(|(t, neurons)| neurons.iter().all(|n| self.has_tag(*n, t)));
        forward && backward
    }
}
