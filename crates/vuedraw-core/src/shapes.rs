//! Shape entries exchanged between the canvas and the shared document.
//!
//! A [`ShapeEntry`] is the serialized form of one canvas object. Only the `id`
//! is interpreted by the sync layer; every other property is an opaque JSON
//! payload owned by the canvas and round-tripped verbatim.

use kurbo::{Point, Rect, Vec2};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

/// Unique identifier of a shape, stable for the shape's lifetime.
pub type ShapeId = String;

// Property keys used by the built-in constructors.
const KEY_LEFT: &str = "left";
const KEY_TOP: &str = "top";
const KEY_WIDTH: &str = "width";
const KEY_HEIGHT: &str = "height";
const KEY_RX: &str = "rx";
const KEY_RY: &str = "ry";
const KEY_X1: &str = "x1";
const KEY_Y1: &str = "y1";
const KEY_X2: &str = "x2";
const KEY_Y2: &str = "y2";
const KEY_TEXT: &str = "text";
const KEY_FILL: &str = "fill";
const KEY_STROKE: &str = "stroke";

/// Default stroke color for new shapes.
pub const DEFAULT_STROKE: &str = "#000000";

/// Object class of a shape entry.
///
/// Serialized as its lowercase name. Classes the sync layer does not draw
/// itself are kept verbatim in [`ShapeKind::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum ShapeKind {
    Line,
    Rect,
    Ellipse,
    Triangle,
    Textbox,
    /// Explicit `"object"` tag, and the kind of entries without a tag.
    #[default]
    Object,
    /// Any other object class, e.g. `"path"` or `"i-text"`.
    Other(String),
}

impl ShapeKind {
    /// Kind for a wire tag.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "line" => ShapeKind::Line,
            "rect" => ShapeKind::Rect,
            "ellipse" => ShapeKind::Ellipse,
            "triangle" => ShapeKind::Triangle,
            "textbox" => ShapeKind::Textbox,
            "object" => ShapeKind::Object,
            other => ShapeKind::Other(other.to_string()),
        }
    }

    /// Name used on the wire and in listings.
    pub fn as_str(&self) -> &str {
        match self {
            ShapeKind::Line => "line",
            ShapeKind::Rect => "rect",
            ShapeKind::Ellipse => "ellipse",
            ShapeKind::Triangle => "triangle",
            ShapeKind::Textbox => "textbox",
            ShapeKind::Object => "object",
            ShapeKind::Other(tag) => tag,
        }
    }
}

impl Serialize for ShapeKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ShapeKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(ShapeKind::from_tag(&tag))
    }
}

/// One drawable object in serialized form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeEntry {
    /// Map key in the shared document.
    pub id: ShapeId,
    /// Object class.
    #[serde(rename = "type", default)]
    pub kind: ShapeKind,
    /// Opaque canvas payload.
    #[serde(flatten)]
    pub props: Map<String, Value>,
}

impl ShapeEntry {
    /// Create an empty entry with a fresh UUID.
    pub fn new(kind: ShapeKind) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), kind)
    }

    /// Create an empty entry with a caller-chosen id.
    pub fn with_id(id: impl Into<ShapeId>, kind: ShapeKind) -> Self {
        Self {
            id: id.into(),
            kind,
            props: Map::new(),
        }
    }

    /// Rectangle with its top-left corner at `origin`.
    pub fn rect(origin: Point, width: f64, height: f64) -> Self {
        Self::new(ShapeKind::Rect)
            .with_position(origin)
            .with_prop(KEY_WIDTH, width)
            .with_prop(KEY_HEIGHT, height)
            .with_prop(KEY_FILL, Value::Null)
            .with_prop(KEY_STROKE, DEFAULT_STROKE)
    }

    /// Ellipse centered on `center`.
    pub fn ellipse(center: Point, radius_x: f64, radius_y: f64) -> Self {
        Self::new(ShapeKind::Ellipse)
            .with_position(Point::new(center.x - radius_x, center.y - radius_y))
            .with_prop(KEY_RX, radius_x)
            .with_prop(KEY_RY, radius_y)
            .with_prop(KEY_FILL, Value::Null)
            .with_prop(KEY_STROKE, DEFAULT_STROKE)
    }

    /// Isosceles triangle inscribed in the given box.
    pub fn triangle(origin: Point, width: f64, height: f64) -> Self {
        Self::new(ShapeKind::Triangle)
            .with_position(origin)
            .with_prop(KEY_WIDTH, width)
            .with_prop(KEY_HEIGHT, height)
            .with_prop(KEY_FILL, Value::Null)
            .with_prop(KEY_STROKE, DEFAULT_STROKE)
    }

    /// Straight line between two points.
    pub fn line(start: Point, end: Point) -> Self {
        let bounds = Rect::from_points(start, end);
        Self::new(ShapeKind::Line)
            .with_position(bounds.origin())
            .with_prop(KEY_X1, start.x)
            .with_prop(KEY_Y1, start.y)
            .with_prop(KEY_X2, end.x)
            .with_prop(KEY_Y2, end.y)
            .with_prop(KEY_STROKE, DEFAULT_STROKE)
    }

    /// Text box anchored at `origin`.
    pub fn textbox(origin: Point, text: impl Into<String>) -> Self {
        Self::new(ShapeKind::Textbox)
            .with_position(origin)
            .with_prop(KEY_TEXT, text.into())
            .with_prop(KEY_FILL, DEFAULT_STROKE)
    }

    /// Builder-style property setter.
    pub fn with_prop(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.set_prop(key, value);
        self
    }

    fn with_position(self, origin: Point) -> Self {
        self.with_prop(KEY_LEFT, origin.x).with_prop(KEY_TOP, origin.y)
    }

    /// Get a payload property.
    pub fn prop(&self, key: &str) -> Option<&Value> {
        self.props.get(key)
    }

    /// Set a payload property.
    pub fn set_prop(&mut self, key: &str, value: impl Into<Value>) {
        self.props.insert(key.to_string(), value.into());
    }

    fn number(&self, key: &str) -> Option<f64> {
        self.props.get(key).and_then(Value::as_f64)
    }

    /// Top-left position, if the payload carries one.
    pub fn position(&self) -> Option<Point> {
        Some(Point::new(self.number(KEY_LEFT)?, self.number(KEY_TOP)?))
    }

    /// Move the shape by `delta`. Returns false if it has no position.
    pub fn translate(&mut self, delta: Vec2) -> bool {
        let Some(origin) = self.position() else {
            return false;
        };
        let moved = origin + delta;
        self.set_prop(KEY_LEFT, moved.x);
        self.set_prop(KEY_TOP, moved.y);

        if self.kind == ShapeKind::Line {
            for (key, offset) in [(KEY_X1, delta.x), (KEY_Y1, delta.y), (KEY_X2, delta.x), (KEY_Y2, delta.y)] {
                if let Some(v) = self.number(key) {
                    self.set_prop(key, v + offset);
                }
            }
        }
        true
    }
}

impl fmt::Display for ShapeEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind.as_str(), self.id)?;
        if let Some(p) = self.position() {
            write!(f, " @ ({}, {})", p.x, p.y)?;
        }
        if let Some(Value::String(text)) = self.prop(KEY_TEXT) {
            write!(f, " {:?}", text)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rect_has_fresh_id_and_position() {
        let a = ShapeEntry::rect(Point::new(10.0, 20.0), 100.0, 50.0);
        let b = ShapeEntry::rect(Point::new(10.0, 20.0), 100.0, 50.0);
        assert_ne!(a.id, b.id);
        assert_eq!(a.kind, ShapeKind::Rect);
        assert_eq!(a.position(), Some(Point::new(10.0, 20.0)));
    }

    #[test]
    fn test_serializes_kind_as_type() {
        let shape = ShapeEntry::with_id("r1", ShapeKind::Rect).with_prop("width", 5.0);
        let value = serde_json::to_value(&shape).unwrap();
        assert_eq!(value, json!({ "id": "r1", "type": "rect", "width": 5.0 }));
    }

    #[test]
    fn test_unknown_type_keeps_tag() {
        let input = json!({ "id": "g1", "type": "i-text", "objects": [] });
        let shape: ShapeEntry = serde_json::from_value(input.clone()).unwrap();
        assert_eq!(shape.kind, ShapeKind::Other("i-text".into()));
        assert_eq!(shape.prop("objects"), Some(&json!([])));
        assert_eq!(serde_json::to_value(&shape).unwrap(), input);
    }

    #[test]
    fn test_missing_type_is_object() {
        let shape: ShapeEntry = serde_json::from_value(json!({ "id": "o1" })).unwrap();
        assert_eq!(shape.kind, ShapeKind::Object);
        assert_eq!(ShapeKind::from_tag("object"), ShapeKind::Object);
        assert_eq!(ShapeKind::from_tag("rect"), ShapeKind::Rect);
    }

    #[test]
    fn test_translate_line_moves_endpoints() {
        let mut line = ShapeEntry::line(Point::new(0.0, 0.0), Point::new(10.0, 5.0));
        assert!(line.translate(Vec2::new(2.0, 3.0)));
        assert_eq!(line.position(), Some(Point::new(2.0, 3.0)));
        assert_eq!(line.prop("x2"), Some(&json!(12.0)));
        assert_eq!(line.prop("y2"), Some(&json!(8.0)));
    }

    #[test]
    fn test_translate_without_position() {
        let mut shape = ShapeEntry::with_id("o1", ShapeKind::Object);
        assert!(!shape.translate(Vec2::new(1.0, 1.0)));
    }

    #[test]
    fn test_display() {
        let text = ShapeEntry::with_id("t1", ShapeKind::Textbox)
            .with_prop("left", 1.0)
            .with_prop("top", 2.0)
            .with_prop("text", "hi");
        assert_eq!(text.to_string(), "textbox t1 @ (1, 2) \"hi\"");
    }
}
