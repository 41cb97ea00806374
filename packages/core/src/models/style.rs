//! Neuron display style: color and visibility.

use super::annotation::NeuronId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 8-bit RGB color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

/// Colors handed out to neurons that never had one assigned
const DEFAULT_PALETTE: [Color; 6] = [
    Color::rgb(255, 0, 0),
    Color::rgb(0, 255, 0),
    Color::rgb(0, 0, 255),
    Color::rgb(255, 0, 255),
    Color::rgb(0, 255, 255),
    Color::rgb(255, 255, 0),
];

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Build from float components in `[0, 1]`; out-of-range values clamp
    pub fn from_floats(r: f64, g: f64, b: f64) -> Self {
        let c = |v: f64| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        Self::rgb(c(r), c(g), c(b))
    }

    pub fn as_floats(&self) -> [f64; 3] {
        [
            self.r as f64 / 255.0,
            self.g as f64 / 255.0,
            self.b as f64 / 255.0,
        ]
    }

    /// Parse `#rrggbb`
    pub fn from_hex(s: &str) -> Option<Self> {
        let hex = s.strip_prefix('#')?;
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        Some(Self::rgb(channel(0)?, channel(2)?, channel(4)?))
    }

    /// Deterministic fallback color for a neuron without one
    pub fn default_for(neuron_id: NeuronId) -> Self {
        DEFAULT_PALETTE[(neuron_id.0 % DEFAULT_PALETTE.len() as u64) as usize]
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl From<Color> for String {
    fn from(c: Color) -> String {
        c.to_string()
    }
}

impl TryFrom<String> for Color {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Color::from_hex(&s).ok_or_else(|| format!("invalid color: {}", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NeuronStyle {
    pub color: Color,
    pub visible: bool,
}

impl NeuronStyle {
    pub fn new(color: Color, visible: bool) -> Self {
        Self { color, visible }
    }
}

/// Style change applied to many neurons in one store call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkNeuronStyleUpdate {
    pub neuron_ids: Vec<NeuronId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<Color>,
}
