//! SWC skeleton files
//!
//! Reads and writes the standard SWC record format
//! (`index type x y z radius parent`, one node per line) together with the
//! header comments the workstation understands:
//!
//! - `# COLOR r,g,b` - neuron color as floats in `[0, 1]`
//! - `# NAME <name>` - neuron name
//! - `# OFFSET x y z` - added to every coordinate on read
//!
//! Conversion between neurons and SWC records also lives here. Exports are
//! recentered on the centroid of all exported nodes and carry the centroid in
//! an `OFFSET` header, so a round trip reproduces the original coordinates.

use crate::models::{AnnotationId, Color, GeoAnnotation, Neuron, Vec3};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::path::Path;
use std::sync::LazyLock;
use thiserror::Error;

pub const SWC_EXTENSION: &str = ".swc";

/// SWC type code written for neurite roots
pub const ROOT_NODE_TYPE: i32 = 1;
/// SWC type code written for every other node
pub const NEURITE_NODE_TYPE: i32 = 3;

static OFFSET_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^#\s*OFFSET\s+(\S+)\s+(\S+)\s+(\S+)").unwrap()
});
static COLOR_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^#\s*COLOR\s+([^,\s]+)\s*,\s*([^,\s]+)\s*,\s*([^,\s]+)").unwrap()
});
static NAME_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#\s*NAME\s+(.+?)\s*$").unwrap());

#[derive(Error, Debug)]
pub enum SwcError {
    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("{0}")]
    Invalid(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One SWC record
#[derive(Debug, Clone, PartialEq)]
pub struct SwcNode {
    pub index: i64,
    pub node_type: i32,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub radius: f64,
    /// `-1` for a root
    pub parent_index: i64,
}

impl SwcNode {
    pub fn is_root(&self) -> bool {
        self.parent_index < 0
    }
}

/// Parsed SWC file: header comment lines plus node records
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SwcData {
    pub headers: Vec<String>,
    pub nodes: Vec<SwcNode>,
}

impl SwcData {
    pub fn parse(text: &str) -> Result<Self, SwcError> {
        let mut data = SwcData::default();
        for (i, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            if line.starts_with('#') {
                data.headers.push(line.to_string());
                continue;
            }
            data.nodes.push(parse_record(line, i + 1)?);
        }
        Ok(data)
    }

    pub async fn read(path: &Path) -> Result<Self, SwcError> {
        let text = tokio::fs::read_to_string(path).await?;
        Self::parse(&text)
    }

    /// Check indices are unique and every parent exists
    pub fn validate(&self) -> Result<(), SwcError> {
        if self.nodes.is_empty() {
            return Err(SwcError::Invalid("file contains no nodes".to_string()));
        }
        let mut indices = HashSet::new();
        for node in &self.nodes {
            if !indices.insert(node.index) {
                return Err(SwcError::Invalid(format!("duplicate index {}", node.index)));
            }
        }
        for node in &self.nodes {
            if !node.is_root() && !indices.contains(&node.parent_index) {
                return Err(SwcError::Invalid(format!(
                    "node {} has missing parent {}",
                    node.index, node.parent_index
                )));
            }
            if node.parent_index == node.index {
                return Err(SwcError::Invalid(format!("node {} is its own parent", node.index)));
            }
        }
        Ok(())
    }

    /// `OFFSET` header, or zero
    pub fn offset(&self) -> Vec3 {
        self.headers
            .iter()
            .find_map(|h| {
                let caps = OFFSET_HEADER.captures(h)?;
                let axis = |i: usize| caps.get(i)?.as_str().parse::<f64>().ok();
                Some(Vec3::new(axis(1)?, axis(2)?, axis(3)?))
            })
            .unwrap_or_default()
    }

    pub fn name(&self) -> Option<String> {
        self.headers.iter().find_map(|h| {
            NAME_HEADER
                .captures(h)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().to_string())
        })
    }

    pub fn color(&self) -> Option<Color> {
        self.headers.iter().find_map(|h| {
            let caps = COLOR_HEADER.captures(h)?;
            let channel = |i: usize| caps.get(i)?.as_str().parse::<f64>().ok();
            Some(Color::from_floats(channel(1)?, channel(2)?, channel(3)?))
        })
    }

    /// Render as SWC text
    pub fn to_swc_string(&self) -> String {
        let mut out = String::new();
        for header in &self.headers {
            let _ = writeln!(out, "{}", header);
        }
        for n in &self.nodes {
            let _ = writeln!(
                out,
                "{} {} {} {} {} {} {}",
                n.index, n.node_type, n.x, n.y, n.z, n.radius, n.parent_index
            );
        }
        out
    }

    pub async fn write(&self, path: &Path) -> Result<(), SwcError> {
        tokio::fs::write(path, self.to_swc_string()).await?;
        Ok(())
    }

    /// One `SwcData` per root, each keeping the original headers
    pub fn split_by_roots(&self) -> Vec<SwcData> {
        let mut children: HashMap<i64, Vec<usize>> = HashMap::new();
        for (pos, node) in self.nodes.iter().enumerate() {
            children.entry(node.parent_index).or_default().push(pos);
        }

        let mut out = Vec::new();
        for root in self.nodes.iter().filter(|n| n.is_root()) {
            let mut part = SwcData {
                headers: self.headers.clone(),
                nodes: Vec::new(),
            };
            let mut stack = vec![root.index];
            let mut visited = HashSet::new();
            while let Some(index) = stack.pop() {
                if !visited.insert(index) {
                    continue;
                }
                if let Some(kids) = children.get(&index) {
                    stack.extend(kids.iter().rev().map(|pos| self.nodes[*pos].index));
                }
            }
            part.nodes = self
                .nodes
                .iter()
                .filter(|n| visited.contains(&n.index))
                .cloned()
                .collect();
            out.push(part);
        }
        out
    }
}

fn parse_record(line: &str, line_no: usize) -> Result<SwcNode, SwcError> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 7 {
        return Err(SwcError::Parse {
            line: line_no,
            message: format!("expected 7 fields, found {}", fields.len()),
        });
    }
    let err = |what: &str, value: &str| SwcError::Parse {
        line: line_no,
        message: format!("invalid {}: {}", what, value),
    };
    let int = |i: usize, what: &str| fields[i].parse::<i64>().map_err(|_| err(what, fields[i]));
    let float = |i: usize, what: &str| fields[i].parse::<f64>().map_err(|_| err(what, fields[i]));

    Ok(SwcNode {
        index: int(0, "index")?,
        node_type: int(1, "type")? as i32,
        x: float(2, "x")?,
        y: float(3, "y")?,
        z: float(4, "z")?,
        radius: float(5, "radius")?,
        parent_index: int(6, "parent")?,
    })
}

/// Mean location of every annotation in `neurons`
pub fn centroid<'a>(neurons: impl IntoIterator<Item = &'a Neuron>) -> Vec3 {
    let mut sum = Vec3::default();
    let mut count = 0usize;
    for neuron in neurons {
        for ann in neuron.annotations.values() {
            sum = sum + ann.location;
            count += 1;
        }
    }
    if count == 0 {
        Vec3::default()
    } else {
        sum * (1.0 / count as f64)
    }
}

/// Convert one neuron to SWC records relative to `center`
///
/// With `downsample_modulo > 1` only every n-th node along unbranched runs is
/// kept; roots, branch points and ends are always kept and each kept node is
/// linked to its nearest kept ancestor.
pub fn neuron_to_swc(
    neuron: &Neuron,
    headers: Vec<String>,
    center: Vec3,
    downsample_modulo: usize,
) -> SwcData {
    let mut data = SwcData {
        headers,
        nodes: Vec::new(),
    };
    data.headers.push(format!(
        "# OFFSET {} {} {}",
        center.x, center.y, center.z
    ));
    append_neuron(&mut data, neuron, center, downsample_modulo);
    data
}

/// Append the records of `neuron` to `data`, continuing its index sequence
pub fn append_neuron(data: &mut SwcData, neuron: &Neuron, center: Vec3, downsample_modulo: usize) {
    let mut next_index = data.nodes.iter().map(|n| n.index).max().unwrap_or(0) + 1;
    let modulo = downsample_modulo.max(1);

    for root in &neuron.root_ids {
        // (annotation, index of nearest kept ancestor, steps since it)
        let mut stack: Vec<(AnnotationId, i64, usize)> = vec![(*root, -1, 0)];
        while let Some((id, kept_parent, steps)) = stack.pop() {
            let Some(ann) = neuron.annotation(id) else {
                continue;
            };
            let keep = ann.is_root() || ann.is_leaf() || ann.is_branch() || steps % modulo == 0;
            let (parent_for_children, steps_for_children) = if keep {
                let index = next_index;
                next_index += 1;
                data.nodes.push(record(ann, index, kept_parent, center));
                (index, 1)
            } else {
                (kept_parent, steps + 1)
            };
            for child in ann.child_ids.iter().rev() {
                stack.push((*child, parent_for_children, steps_for_children));
            }
        }
    }
}

fn record(ann: &GeoAnnotation, index: i64, parent_index: i64, center: Vec3) -> SwcNode {
    let p = ann.location - center;
    SwcNode {
        index,
        node_type: if ann.is_root() {
            ROOT_NODE_TYPE
        } else {
            NEURITE_NODE_TYPE
        },
        x: p.x,
        y: p.y,
        z: p.z,
        radius: ann.radius,
        parent_index,
    }
}

/// Neuron name to use for an imported file: `NAME` header, else file name
/// without the `.swc` extension
pub fn import_name(data: &SwcData, file_name: &str) -> String {
    let name = data.name().unwrap_or_else(|| file_name.to_string());
    name.strip_suffix(SWC_EXTENSION)
        .map(str::to_string)
        .unwrap_or(name)
}
