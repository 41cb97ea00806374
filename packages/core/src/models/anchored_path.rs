//! Anchored paths: traced polylines between two adjacent annotations.

use super::annotation::AnnotationId;
use serde::{Deserialize, Serialize};

/// Unordered pair of annotation ids
///
/// The smaller id is always stored first so `(a, b)` and `(b, a)` compare
/// and hash equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnchoredPathEndpoints {
    first: AnnotationId,
    second: AnnotationId,
}

impl AnchoredPathEndpoints {
    pub fn new(a: AnnotationId, b: AnnotationId) -> Self {
        if a <= b {
            Self { first: a, second: b }
        } else {
            Self { first: b, second: a }
        }
    }

    pub fn first(&self) -> AnnotationId {
        self.first
    }

    pub fn second(&self) -> AnnotationId {
        self.second
    }

    pub fn contains(&self, id: AnnotationId) -> bool {
        self.first == id || self.second == id
    }
}

/// Traced polyline of integer voxel points between two adjacent nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnchoredPath {
    pub endpoints: AnchoredPathEndpoints,
    pub points: Vec<[i32; 3]>,
}

impl AnchoredPath {
    pub fn new(endpoints: AnchoredPathEndpoints, points: Vec<[i32; 3]>) -> Self {
        Self { endpoints, points }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoints_are_unordered() {
        let a = AnchoredPathEndpoints::new(AnnotationId(9), AnnotationId(3));
        let b = AnchoredPathEndpoints::new(AnnotationId(3), AnnotationId(9));
        assert_eq!(a, b);
        assert_eq!(a.first(), AnnotationId(3));
        assert!(a.contains(AnnotationId(9)));
        assert!(!a.contains(AnnotationId(4)));
    }
}
