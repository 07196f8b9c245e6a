//! # SAR Core
//!
//! Core domain models and types for the search-and-rescue drone server.
//! This crate provides shared types used across all backend crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub mod error;
pub mod wire;

pub use error::CoreError;
pub use wire::*;

// ============================================================================
// FRAME & DETECTION MODELS
// ============================================================================

/// One camera capture, consumed and discarded after detection + encoding.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Raw pixel buffer (BGR, row-major).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub captured_at: DateTime<Utc>,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data,
            width,
            height,
            captured_at: Utc::now(),
        }
    }

    /// An all-black frame of the given dimensions.
    pub fn blank(width: u32, height: u32) -> Self {
        Self::new(vec![0; (width * height * 3) as usize], width, height)
    }
}

/// Axis-aligned bounding box in pixel space, corner form (x1,y1)-(x2,y2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl PixelBox {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// A box is valid when both corners are strictly ordered.
    pub fn is_valid(&self) -> bool {
        self.x1 < self.x2 && self.y1 < self.y2
    }

    pub fn width(&self) -> i32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> i32 {
        self.y2 - self.y1
    }

    pub fn center(&self) -> (i32, i32) {
        ((self.x1 + self.x2) / 2, (self.y1 + self.y2) / 2)
    }

    pub fn area(&self) -> i64 {
        self.width() as i64 * self.height() as i64
    }

    /// Intersection-over-union with another box. Returns 0.0 when disjoint.
    pub fn iou(&self, other: &PixelBox) -> f64 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);

        if ix1 >= ix2 || iy1 >= iy2 {
            return 0.0;
        }

        let intersection = (ix2 - ix1) as i64 * (iy2 - iy1) as i64;
        let union = self.area() + other.area() - intersection;
        intersection as f64 / union as f64
    }

    /// Serialized form on the wire: `[x1, y1, x2, y2]`.
    pub fn to_array(&self) -> [i32; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }
}

/// One detected object in a frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    /// Confidence in [0, 1].
    pub confidence: f64,
    pub bbox: PixelBox,
}

impl Detection {
    pub fn new(label: impl Into<String>, confidence: f64, bbox: PixelBox) -> Self {
        Self {
            label: label.into(),
            confidence,
            bbox,
        }
    }

    pub fn is_person(&self) -> bool {
        self.label == "person"
    }

    /// Detections leaving the adapter must carry a sane confidence and an
    /// ordered box.
    pub fn is_well_formed(&self) -> bool {
        (0.0..=1.0).contains(&self.confidence) && self.bbox.is_valid()
    }
}

// ============================================================================
// DRONE MODELS
// ============================================================================

/// Latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_valid(&self) -> bool {
        self.lat >= -90.0 && self.lat <= 90.0 && self.lng >= -180.0 && self.lng <= 180.0
    }
}

/// Telemetry snapshot taken once per tick, appended to the status history and
/// never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DroneStatusSnapshot {
    pub name: String,
    pub is_connected: bool,
    /// Battery percentage (0-100).
    pub battery_level: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<LatLng>,
    pub timestamp: DateTime<Utc>,
}

impl DroneStatusSnapshot {
    pub fn new(name: impl Into<String>, is_connected: bool, battery_level: u8) -> Self {
        Self {
            name: name.into(),
            is_connected,
            battery_level: battery_level.min(100),
            location: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_location(mut self, location: LatLng) -> Self {
        self.location = Some(location);
        self
    }

    /// Placeholder snapshot for a drone that has not been deployed yet.
    pub fn offline(name: impl Into<String>) -> Self {
        Self::new(name, false, 0)
    }
}

/// Entry in the static drone roster returned for `GET_DRONES`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DroneIdentity {
    pub name: String,
    pub is_connected: bool,
    pub battery_level: u8,
}

impl DroneIdentity {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_connected: false,
            battery_level: 100,
        }
    }
}

/// Four-axis velocity command forwarded to the flight controller.
/// Each component is clamped to the SDK's accepted range before transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VelocityCommand {
    pub forward_back: i32,
    pub left_right: i32,
    pub up_down: i32,
    pub yaw: i32,
}

/// Accepted range for each velocity component.
pub const VELOCITY_RANGE: std::ops::RangeInclusive<i32> = -100..=100;

impl VelocityCommand {
    pub fn new(forward_back: i32, left_right: i32, up_down: i32, yaw: i32) -> Self {
        Self {
            forward_back,
            left_right,
            up_down,
            yaw,
        }
    }

    /// Zero on all axes (hover).
    pub const HOVER: Self = Self {
        forward_back: 0,
        left_right: 0,
        up_down: 0,
        yaw: 0,
    };

    /// Clamp every component into [`VELOCITY_RANGE`].
    pub fn clamped(self) -> Self {
        let clamp = |v: i32| v.clamp(*VELOCITY_RANGE.start(), *VELOCITY_RANGE.end());
        Self {
            forward_back: clamp(self.forward_back),
            left_right: clamp(self.left_right),
            up_down: clamp(self.up_down),
            yaw: clamp(self.yaw),
        }
    }
}

// ============================================================================
// HAZARD MODELS
// ============================================================================

/// Kind of reported hazard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HazardKind {
    Pole,
    Fire,
    Tree,
    Flood,
}

impl HazardKind {
    pub const ALL: [HazardKind; 4] = [
        HazardKind::Pole,
        HazardKind::Fire,
        HazardKind::Tree,
        HazardKind::Flood,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HazardKind::Pole => "pole",
            HazardKind::Fire => "fire",
            HazardKind::Tree => "tree",
            HazardKind::Flood => "flood",
        }
    }
}

impl std::str::FromStr for HazardKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pole" => Ok(HazardKind::Pole),
            "fire" => Ok(HazardKind::Fire),
            "tree" => Ok(HazardKind::Tree),
            "flood" => Ok(HazardKind::Flood),
            other => Err(CoreError::UnknownHazardKind(other.to_string())),
        }
    }
}

impl fmt::Display for HazardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Severity of a reported hazard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HazardSeverity {
    Low,
    Moderate,
    High,
    Critical,
}

impl HazardSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            HazardSeverity::Low => "Low",
            HazardSeverity::Moderate => "Moderate",
            HazardSeverity::High => "High",
            HazardSeverity::Critical => "Critical",
        }
    }
}

impl std::str::FromStr for HazardSeverity {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Low" => Ok(HazardSeverity::Low),
            "Moderate" => Ok(HazardSeverity::Moderate),
            "High" => Ok(HazardSeverity::High),
            "Critical" => Ok(HazardSeverity::Critical),
            other => Err(CoreError::UnknownSeverity(other.to_string())),
        }
    }
}

impl fmt::Display for HazardSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An operator- or agent-reported hazard. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hazard {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: HazardKind,
    pub location: LatLng,
    pub severity: HazardSeverity,
    pub details: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl Hazard {
    pub fn new(
        kind: HazardKind,
        location: LatLng,
        severity: HazardSeverity,
        details: impl Into<String>,
        created_by: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            location,
            severity,
            details: details.into(),
            created_by: created_by.into(),
            created_at: Utc::now(),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
