//! Neuron: an arena of annotation nodes plus their anchored paths and notes.
//!
//! # Architecture
//!
//! - **Arena by id**: nodes are stored in a `BTreeMap<AnnotationId, GeoAnnotation>`;
//!   relations are ids only, never references
//! - **Root list**: roots are tracked in insertion order; one neuron may hold
//!   several disjoint neurites
//! - **Derived maps**: anchored paths keyed by unordered endpoint pair, notes
//!   keyed by node id
//!
//! Read helpers live here. Structural mutation goes through
//! [`NeuriteEditor`](crate::services::NeuriteEditor) so both sides of every
//! parent/child edge change together.

use super::anchored_path::{AnchoredPath, AnchoredPathEndpoints};
use super::annotation::{AnnotationId, GeoAnnotation, NeuronId, WorkspaceId};
use super::note::StructuredTextAnnotation;
use super::style::{Color, NeuronStyle};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// A named, colored, tagged tree (or forest) of annotations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Neuron {
    pub id: NeuronId,
    pub workspace_id: WorkspaceId,
    pub name: String,
    /// `None` until a color is assigned; see [`Neuron::style`]
    #[serde(default)]
    pub color: Option<Color>,
    #[serde(default = "default_visible")]
    pub visible: bool,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default, with = "keyed_seq")]
    pub annotations: BTreeMap<AnnotationId, GeoAnnotation>,
    #[serde(default)]
    pub root_ids: Vec<AnnotationId>,
    #[serde(default, with = "keyed_seq")]
    pub anchored_paths: BTreeMap<AnchoredPathEndpoints, AnchoredPath>,
    #[serde(default, with = "keyed_seq")]
    pub notes: BTreeMap<AnnotationId, StructuredTextAnnotation>,
    pub created_at: DateTime<Utc>,
}

fn default_visible() -> bool {
    true
}

impl Neuron {
    pub fn new(id: NeuronId, workspace_id: WorkspaceId, name: impl Into<String>) -> Self {
        Self {
            id,
            workspace_id,
            name: name.into(),
            color: None,
            visible: true,
            tags: BTreeSet::new(),
            annotations: BTreeMap::new(),
            root_ids: Vec::new(),
            anchored_paths: BTreeMap::new(),
            notes: BTreeMap::new(),
            created_at: Utc::now(),
        }
    }

    pub fn annotation(&self, id: AnnotationId) -> Option<&GeoAnnotation> {
        self.annotations.get(&id)
    }

    pub fn contains(&self, id: AnnotationId) -> bool {
        self.annotations.contains_key(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }

    pub fn annotation_count(&self) -> usize {
        self.annotations.len()
    }

    /// Effective style, falling back to a palette color
    pub fn style(&self) -> NeuronStyle {
        NeuronStyle::new(
            self.color.unwrap_or_else(|| Color::default_for(self.id)),
            self.visible,
        )
    }

    /// Note text for `id`, or an empty string
    pub fn note_text(&self, id: AnnotationId) -> &str {
        self.notes
            .get(&id)
            .map(StructuredTextAnnotation::note_text)
            .unwrap_or("")
    }

    pub fn anchored_path(&self, a: AnnotationId, b: AnnotationId) -> Option<&AnchoredPath> {
        self.anchored_paths.get(&AnchoredPathEndpoints::new(a, b))
    }

    /// Walk parent links up to the root of the neurite containing `id`
    pub fn neurite_root(&self, id: AnnotationId) -> Option<AnnotationId> {
        let mut current = self.annotations.get(&id)?;
        // A valid tree never needs more steps than it has nodes
        for _ in 0..=self.annotations.len() {
            match current.parent_id {
                None => return Some(current.id),
                Some(parent) => current = self.annotations.get(&parent)?,
            }
        }
        None
    }

    /// `id` and all its descendants, depth first, children in order
    pub fn subtree(&self, id: AnnotationId) -> Vec<AnnotationId> {
        let mut out = Vec::new();
        if !self.contains(id) {
            return out;
        }
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if out.len() > self.annotations.len() {
                break;
            }
            out.push(next);
            if let Some(ann) = self.annotations.get(&next) {
                stack.extend(ann.child_ids.iter().rev().copied());
            }
        }
        out
    }

    /// Ancestors of `id` from its parent up to the root
    pub fn ancestors(&self, id: AnnotationId) -> Vec<AnnotationId> {
        let mut out = Vec::new();
        let mut current = self.annotations.get(&id).and_then(|a| a.parent_id);
        while let Some(parent) = current {
            if out.len() > self.annotations.len() {
                break;
            }
            out.push(parent);
            current = self.annotations.get(&parent).and_then(|a| a.parent_id);
        }
        out
    }

    /// Whether `a` and `b` are joined by a parent/child edge
    pub fn are_adjacent(&self, a: AnnotationId, b: AnnotationId) -> bool {
        let parent_of = |x: AnnotationId| self.annotations.get(&x).and_then(|n| n.parent_id);
        parent_of(a) == Some(b) || parent_of(b) == Some(a)
    }

    /// Every annotation, visiting roots in root-list order and each neurite
    /// depth first
    pub fn annotations_in_tree_order(&self) -> impl Iterator<Item = &GeoAnnotation> + '_ {
        self.root_ids
            .iter()
            .flat_map(move |root| self.subtree(*root))
            .filter_map(move |id| self.annotations.get(&id))
    }

    /// Check every structural invariant of the neuron
    ///
    /// Used by tests and debug assertions after structural edits.
    pub fn validate_invariants(&self) -> Result<(), String> {
        let mut seen_roots = HashSet::new();
        for root in &self.root_ids {
            if !seen_roots.insert(*root) {
                return Err(format!("root {} listed twice", root));
            }
            match self.annotations.get(root) {
                None => return Err(format!("root {} is not in the neuron", root)),
                Some(ann) if !ann.is_root() => {
                    return Err(format!("root {} has a parent", root));
                }
                Some(_) => {}
            }
        }

        for (id, ann) in &self.annotations {
            if ann.id != *id {
                return Err(format!("annotation {} stored under key {}", ann.id, id));
            }
            if ann.neuron_id != self.id {
                return Err(format!(
                    "annotation {} claims neuron {} but lives in {}",
                    id, ann.neuron_id, self.id
                ));
            }
            match ann.parent_id {
                None => {
                    if !seen_roots.contains(id) {
                        return Err(format!("root {} missing from root list", id));
                    }
                }
                Some(parent) => {
                    let parent_ann = self
                        .annotations
                        .get(&parent)
                        .ok_or_else(|| format!("parent {} of {} does not exist", parent, id))?;
                    if !parent_ann.child_ids.contains(id) {
                        return Err(format!("parent {} does not list child {}", parent, id));
                    }
                }
            }
            let mut unique = HashSet::new();
            for child in &ann.child_ids {
                if !unique.insert(*child) {
                    return Err(format!("child {} listed twice under {}", child, id));
                }
                let child_ann = self
                    .annotations
                    .get(child)
                    .ok_or_else(|| format!("child {} of {} does not exist", child, id))?;
                if child_ann.parent_id != Some(*id) {
                    return Err(format!("child {} does not point back to {}", child, id));
                }
            }
        }

        // Every node reachable from exactly one root means no cycles
        let mut reached = HashSet::new();
        for root in &self.root_ids {
            for id in self.subtree(*root) {
                if !reached.insert(id) || reached.len() > self.annotations.len() {
                    return Err(format!("annotation {} reached twice; cycle", id));
                }
            }
        }
        if reached.len() != self.annotations.len() {
            return Err("some annotations are not reachable from a root".to_string());
        }

        for endpoints in self.anchored_paths.keys() {
            if !self.are_adjacent(endpoints.first(), endpoints.second()) {
                return Err(format!(
                    "anchored path {}-{} joins non-adjacent annotations",
                    endpoints.first(),
                    endpoints.second()
                ));
            }
        }

        for id in self.notes.keys() {
            if !self.contains(*id) {
                return Err(format!("note attached to missing annotation {}", id));
            }
        }

        Ok(())
    }
}

/// Values whose map key can be recovered from the value itself
pub(crate) trait Keyed {
    type Key: Ord;

    fn key(&self) -> Self::Key;
}

impl Keyed for GeoAnnotation {
    type Key = AnnotationId;

    fn key(&self) -> AnnotationId {
        self.id
    }
}

impl Keyed for AnchoredPath {
    type Key = AnchoredPathEndpoints;

    fn key(&self) -> AnchoredPathEndpoints {
        self.endpoints
    }
}

impl Keyed for StructuredTextAnnotation {
    type Key = AnnotationId;

    fn key(&self) -> AnnotationId {
        self.parent_id
    }
}

/// Serialize keyed maps as plain sequences of values
mod keyed_seq {
    use super::Keyed;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<S, V>(map: &BTreeMap<V::Key, V>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        V: Keyed + Serialize,
    {
        serializer.collect_seq(map.values())
    }

    pub fn deserialize<'de, D, V>(deserializer: D) -> Result<BTreeMap<V::Key, V>, D::Error>
    where
        D: Deserializer<'de>,
        V: Keyed + Deserialize<'de>,
    {
        let values = Vec::<V>::deserialize(deserializer)?;
        Ok(values.into_iter().map(|v| (v.key(), v)).collect())
    }
}
