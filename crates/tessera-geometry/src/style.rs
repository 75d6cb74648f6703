//! The style collaborator interface.
//!
//! Style parsing and expression evaluation live outside this crate; the
//! builder only asks an evaluator for a handful of resolved values per
//! feature.

use serde::{Deserialize, Serialize};
use tessera_decode::Feature;

/// A resolved style property.
#[derive(Debug, Clone, PartialEq)]
pub enum StyleValue {
    Number(f64),
    /// Linear RGBA in `[0, 1]`.
    Color([f32; 4]),
    Bool(bool),
    Text(String),
}

impl StyleValue {
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_color(&self) -> Option<[f32; 4]> {
        match self {
            Self::Color(c) => Some(*c),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Text(t) => match t.as_str() {
                "visible" => Some(true),
                "none" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Evaluates style properties for a feature in a style layer at a zoom.
///
/// Returning `None` means "not set"; the caller falls back to a default.
/// Any `Fn(&Feature, &str, &str, f64) -> Option<StyleValue>` closure is an
/// evaluator.
pub trait StyleEvaluator: Send + Sync {
    fn evaluate(
        &self,
        feature: &Feature,
        layer_id: &str,
        property: &str,
        zoom: f64,
    ) -> Option<StyleValue>;
}

impl<F> StyleEvaluator for F
where
    F: Fn(&Feature, &str, &str, f64) -> Option<StyleValue> + Send + Sync,
{
    fn evaluate(
        &self,
        feature: &Feature,
        layer_id: &str,
        property: &str,
        zoom: f64,
    ) -> Option<StyleValue> {
        self(feature, layer_id, property, zoom)
    }
}

/// What kind of geometry a style layer draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LayerKind {
    Fill,
    Line,
    FillExtrusion,
}

/// A style layer bound to one source layer of the tiles.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LayerStyle {
    /// Style layer id; also the input to the picking layer hash.
    pub id: String,
    /// Name of the tile layer the features come from.
    pub source_layer: String,
    pub kind: LayerKind,
}

impl LayerStyle {
    #[must_use]
    pub fn new(id: impl Into<String>, source_layer: impl Into<String>, kind: LayerKind) -> Self {
        Self {
            id: id.into(),
            source_layer: source_layer.into(),
            kind,
        }
    }
}

/// Paint and layout values resolved for one feature.
#[derive(Debug, Clone, PartialEq)]
pub struct PaintValues {
    /// Fill or stroke color with opacity folded into alpha.
    pub color: [f32; 4],
    /// Line width in screen pixels.
    pub width: f64,
    /// Extrusion height in meters.
    pub height: f64,
    /// Extrusion base in meters.
    pub base: f64,
}

impl Default for PaintValues {
    fn default() -> Self {
        Self {
            color: [0.0, 0.0, 0.0, 1.0],
            width: 1.0,
            height: 0.0,
            base: 0.0,
        }
    }
}

impl PaintValues {
    /// Ask `style` for every value the builder needs.
    ///
    /// Returns `None` when the feature should not be drawn: the layer's
    /// `visibility` is off or its `filter` rejects the feature.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn resolve(
        style: &dyn StyleEvaluator,
        layer: &LayerStyle,
        feature: &Feature,
        zoom: f64,
    ) -> Option<Self> {
        let get = |property: &str| style.evaluate(feature, &layer.id, property, zoom);

        if get("visibility").and_then(|v| v.as_bool()) == Some(false) {
            return None;
        }
        if get("filter").and_then(|v| v.as_bool()) == Some(false) {
            return None;
        }

        let defaults = Self::default();
        let mut color = get("color")
            .and_then(|v| v.as_color())
            .unwrap_or(defaults.color);
        let opacity = get("opacity")
            .and_then(|v| v.as_number())
            .unwrap_or(1.0)
            .clamp(0.0, 1.0);
        color[3] *= opacity as f32;

        let number = |property: &str, default: f64| {
            get(property)
                .and_then(|v| v.as_number())
                .filter(|n| n.is_finite())
                .map_or(default, |n| n.max(0.0))
        };

        Some(Self {
            color,
            width: number("width", defaults.width),
            height: number("height", defaults.height),
            base: number("base", defaults.base),
        })
    }
}
