//! Slice axes and the stack file naming that goes with them

use serde::{Deserialize, Serialize};
use std::fmt;

/// Axis perpendicular to the viewed slice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CoordinateAxis {
    X,
    Y,
    Z,
}

impl CoordinateAxis {
    pub const ALL: [CoordinateAxis; 3] = [CoordinateAxis::X, CoordinateAxis::Y, CoordinateAxis::Z];

    pub fn index(self) -> usize {
        match self {
            CoordinateAxis::X => 0,
            CoordinateAxis::Y => 1,
            CoordinateAxis::Z => 2,
        }
    }

    /// Stack file prefix: Z slices live in `default`, Y in `ZX`, X in `YZ`
    pub fn file_prefix(self) -> &'static str {
        match self {
            CoordinateAxis::X => "YZ",
            CoordinateAxis::Y => "ZX",
            CoordinateAxis::Z => "default",
        }
    }

    /// `<prefix>.<channel>.tif`
    pub fn stack_file_name(self, channel: usize) -> String {
        format!("{}.{}.tif", self.file_prefix(), channel)
    }
}

impl fmt::Display for CoordinateAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CoordinateAxis::X => "X",
            CoordinateAxis::Y => "Y",
            CoordinateAxis::Z => "Z",
        };
        f.write_str(name)
    }
}
