//! Structured text annotations (notes) attached to annotation nodes.
//!
//! A note is a small JSON object keyed by the node it annotates. The free text
//! lives under the `note` key; other keys are preserved untouched.
//!
//! Some note texts are *predefined* tokens that describe the node's
//! topological role (for example "traced end"). When that role changes the
//! token becomes stale and is stripped, see [`PredefinedNote::is_valid`].

use super::annotation::{AnnotationId, GeoAnnotation};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// JSON key holding the note text
pub const NOTE_KEY: &str = "note";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredTextAnnotation {
    /// Node this note belongs to
    pub parent_id: AnnotationId,
    pub data: Value,
}

impl StructuredTextAnnotation {
    pub fn with_note(parent_id: AnnotationId, text: &str) -> Self {
        Self {
            parent_id,
            data: json!({ NOTE_KEY: text }),
        }
    }

    /// The note text, or an empty string when the document has none
    pub fn note_text(&self) -> &str {
        self.data
            .get(NOTE_KEY)
            .and_then(Value::as_str)
            .unwrap_or("")
    }

    /// Set or clear the note text.
    ///
    /// Returns `true` when the document is empty afterwards and should be
    /// dropped.
    pub fn set_note_text(&mut self, text: &str) -> bool {
        if !self.data.is_object() {
            self.data = json!({});
        }
        if let Some(map) = self.data.as_object_mut() {
            if text.is_empty() {
                map.remove(NOTE_KEY);
            } else {
                map.insert(NOTE_KEY.to_string(), Value::String(text.to_string()));
            }
            return map.is_empty();
        }
        false
    }
}

/// Note tokens with a fixed meaning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PredefinedNote {
    /// The neurite was traced to its natural end here
    TracedEnd,
    /// A branch still needs tracing from this point
    FutureBranch,
    Review,
    PointOfInterest,
}

impl PredefinedNote {
    pub const ALL: [PredefinedNote; 4] = [
        PredefinedNote::TracedEnd,
        PredefinedNote::FutureBranch,
        PredefinedNote::Review,
        PredefinedNote::PointOfInterest,
    ];

    pub fn note_text(&self) -> &'static str {
        match self {
            PredefinedNote::TracedEnd => "traced end",
            PredefinedNote::FutureBranch => "branch",
            PredefinedNote::Review => "review",
            PredefinedNote::PointOfInterest => "point of interest",
        }
    }

    /// Whether the token still describes `annotation`
    ///
    /// End and branch markers only make sense on a node without children;
    /// once a child is attached they are stale.
    pub fn is_valid(&self, annotation: &GeoAnnotation) -> bool {
        match self {
            PredefinedNote::TracedEnd | PredefinedNote::FutureBranch => annotation.is_leaf(),
            PredefinedNote::Review | PredefinedNote::PointOfInterest => true,
        }
    }

    /// All predefined tokens contained in `text`
    pub fn find_in(text: &str) -> Vec<PredefinedNote> {
        Self::ALL
            .iter()
            .copied()
            .filter(|n| text.contains(n.note_text()))
            .collect()
    }

    /// Remove every token that is stale for `annotation`.
    ///
    /// Returns the cleaned text, or `None` if nothing had to change.
    pub fn strip_invalid(text: &str, annotation: &GeoAnnotation) -> Option<String> {
        let mut cleaned = text.to_string();
        let mut modified = false;
        for note in Self::find_in(text) {
            if !note.is_valid(annotation) {
                cleaned = cleaned.replace(note.note_text(), "");
                modified = true;
            }
        }
        modified.then(|| cleaned.trim().to_string())
    }
}
