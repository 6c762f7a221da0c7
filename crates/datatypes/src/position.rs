use crate::sample::Sample;
use serde::Serialize;

/// Maximum length in bytes of the categorical region label.
pub const REGION_LEN: usize = 10;

/// Unit of length used to express a position.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceUnit {
    /// Measured in pixels, origin at the upper left.
    Pixels = 0,
    /// Measured in world units specified via a homography.
    World = 1,
}

impl DistanceUnit {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(DistanceUnit::Pixels),
            1 => Some(DistanceUnit::World),
            _ => None,
        }
    }
}

/// A single 2-D position sample.
///
/// Fixed-layout value type: it is published in place inside a shared
/// segment, so all fields are inline and a zero-filled value is a valid
/// "nothing detected yet" sample.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Position2D {
    sample: Sample,
    unit_of_length: u32,

    pub position_valid: bool,
    pub velocity_valid: bool,
    pub heading_valid: bool,
    pub region_valid: bool,

    pub position: [f64; 2],
    pub velocity: [f64; 2],
    pub heading: [f64; 2],

    region: [u8; REGION_LEN],
}

impl Position2D {
    pub fn new(unit: DistanceUnit, rate_hz: f64) -> Self {
        Self {
            sample: Sample::new(rate_hz),
            unit_of_length: unit as u32,
            ..Self::default()
        }
    }

    pub fn unit_of_length(&self) -> DistanceUnit {
        DistanceUnit::from_u32(self.unit_of_length).unwrap_or(DistanceUnit::Pixels)
    }

    pub fn set_unit_of_length(&mut self, unit: DistanceUnit) {
        self.unit_of_length = unit as u32;
    }

    pub fn sample(&self) -> &Sample {
        &self.sample
    }

    pub fn sample_mut(&mut self) -> &mut Sample {
        &mut self.sample
    }

    /// Categorical region label (e.g. "northwest"), truncated to fit.
    pub fn set_region(&mut self, label: &str) {
        let bytes = label.as_bytes();
        let len = bytes.len().min(REGION_LEN);
        self.region = [0; REGION_LEN];
        self.region[..len].copy_from_slice(&bytes[..len]);
        self.region_valid = true;
    }

    pub fn region(&self) -> String {
        let end = self
            .region
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(REGION_LEN);
        String::from_utf8_lossy(&self.region[..end]).into_owned()
    }

    /// Build the serializable recorder/socket document for this sample.
    ///
    /// With `verbose` set, fields carrying indeterminate data are emitted
    /// anyway, which eases sample alignment when post-processing logs.
    pub fn record(&self, verbose: bool) -> PositionRecord {
        PositionRecord {
            tick: self.sample.count(),
            usec: self.sample.usec(),
            unit: self.unit_of_length,
            pos_ok: self.position_valid || verbose,
            pos_xy: (self.position_valid || verbose).then_some(self.position),
            vel_ok: self.velocity_valid || verbose,
            vel_xy: (self.velocity_valid || verbose).then_some(self.velocity),
            head_ok: self.heading_valid || verbose,
            head_xy: (self.heading_valid || verbose).then_some(self.heading),
            reg_ok: self.region_valid || verbose,
            reg: (self.region_valid || verbose).then(|| self.region()),
        }
    }
}

/// JSON document emitted for every recorded or published position.
#[derive(Debug, Clone, Serialize)]
pub struct PositionRecord {
    pub tick: u64,
    pub usec: u64,
    pub unit: u32,
    pub pos_ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pos_xy: Option<[f64; 2]>,
    pub vel_ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vel_xy: Option<[f64; 2]>,
    pub head_ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub head_xy: Option<[f64; 2]>,
    pub reg_ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reg: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn zeroed_position_is_a_valid_empty_sample() {
        let p = Position2D::default();
        assert!(!p.position_valid);
        assert!(!p.region_valid);
        assert_eq!(p.unit_of_length(), DistanceUnit::Pixels);
        assert_eq!(p.sample().count(), 0);
    }

    #[test]
    fn region_label_truncates_and_round_trips() {
        let mut p = Position2D::default();
        p.set_region("northwest");
        assert_eq!(p.region(), "northwest");

        p.set_region("a-label-longer-than-the-slot");
        assert_eq!(p.region().len(), REGION_LEN);
    }

    #[test]
    fn record_omits_invalid_fields_unless_verbose() {
        let mut p = Position2D::new(DistanceUnit::Pixels, 20.0);
        p.position_valid = true;
        p.position = [1.5, -2.5];
        p.sample_mut().increment(42);

        let doc = serde_json::to_value(p.record(false)).unwrap();
        assert_eq!(doc["tick"], 1);
        assert_eq!(doc["usec"], 42);
        assert_eq!(doc["pos_ok"], true);
        assert_eq!(doc["pos_xy"], json!([1.5, -2.5]));
        assert_eq!(doc["vel_ok"], false);
        assert!(doc.get("vel_xy").is_none());

        let verbose = serde_json::to_value(p.record(true)).unwrap();
        assert_eq!(verbose["vel_ok"], true);
        assert_eq!(verbose["vel_xy"], json!([0.0, 0.0]));
        assert_eq!(verbose["reg"], "");
    }
}
