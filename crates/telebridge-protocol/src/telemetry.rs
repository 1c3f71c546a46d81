use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

/// Servo pulse width at 0 degrees, in microseconds.
pub const PULSE_MIN_US: f64 = 500.0;
/// Pulse width span covering 0..=180 degrees, in microseconds.
pub const PULSE_SPAN_US: f64 = 2000.0;
/// Upper bound of the actuator scale.
pub const ANGLE_MAX: u8 = 180;

/// One normalized telemetry reading.
///
/// Both readings are independently optional. `pwm` is clamped to
/// `0..=180` at construction; there is no way to build an out-of-range
/// sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TelemetrySample {
    distance_cm: Option<f64>,
    pwm: Option<u8>,
    #[serde(rename = "ts")]
    timestamp: i64,
}

impl TelemetrySample {
    /// Build a sample from raw device units (millimeters, microseconds).
    ///
    /// Non-finite inputs become absent readings.
    pub fn from_raw(distance_mm: Option<f64>, pulse_us: Option<f64>, timestamp: i64) -> Self {
        Self {
            distance_cm: distance_mm.and_then(distance_mm_to_cm),
            pwm: pulse_us.and_then(pulse_us_to_angle),
            timestamp,
        }
    }

    /// Distance in centimeters, one decimal place.
    pub fn distance_cm(&self) -> Option<f64> {
        self.distance_cm
    }

    /// Actuator position on the 0..=180 scale.
    pub fn pwm(&self) -> Option<u8> {
        self.pwm
    }

    /// Milliseconds since the Unix epoch.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

/// `round(mm / 10, 1 decimal)`, or `None` when `mm` is not finite.
pub fn distance_mm_to_cm(mm: f64) -> Option<f64> {
    if !mm.is_finite() {
        return None;
    }
    Some(round_half_up(mm / 10.0 * 10.0) / 10.0)
}

/// Map a 500..=2500 us pulse onto 0..=180, clamping outside that band.
pub fn pulse_us_to_angle(us: f64) -> Option<u8> {
    if !us.is_finite() {
        return None;
    }
    let angle = round_half_up((us - PULSE_MIN_US) * f64::from(ANGLE_MAX) / PULSE_SPAN_US);
    Some(angle.clamp(0.0, f64::from(ANGLE_MAX)) as u8)
}

/// Milliseconds since the Unix epoch, or 0 if the clock is before it.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

// Halves round toward positive infinity, so -2.5 becomes -2.
fn round_half_up(x: f64) -> f64 {
    let floor = x.floor();
    if x - floor >= 0.5 {
        floor + 1.0
    } else {
        floor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pulse_reference_points() {
        assert_eq!(pulse_us_to_angle(500.0), Some(0));
        assert_eq!(pulse_us_to_angle(1500.0), Some(90));
        assert_eq!(pulse_us_to_angle(2500.0), Some(180));
        assert_eq!(pulse_us_to_angle(3000.0), Some(180));
        assert_eq!(pulse_us_to_angle(0.0), Some(0));
    }

    #[test]
    fn pulse_rounds_to_nearest_degree() {
        // (511.2 - 500) * 0.09 = 1.008
        assert_eq!(pulse_us_to_angle(511.2), Some(1));
        // (505.5 - 500) * 0.09 = 0.495
        assert_eq!(pulse_us_to_angle(505.5), Some(0));
        // (1750 - 500) * 0.09 = 112.5
        assert_eq!(pulse_us_to_angle(1750.0), Some(113));
    }

    #[test]
    fn non_finite_inputs_are_absent() {
        assert_eq!(pulse_us_to_angle(f64::NAN), None);
        assert_eq!(pulse_us_to_angle(f64::INFINITY), None);
        assert_eq!(distance_mm_to_cm(f64::NAN), None);
        assert_eq!(distance_mm_to_cm(f64::NEG_INFINITY), None);
    }

    #[test]
    fn distance_one_decimal() {
        assert_eq!(distance_mm_to_cm(100.0), Some(10.0));
        assert_eq!(distance_mm_to_cm(250.0), Some(25.0));
        assert_eq!(distance_mm_to_cm(123.4), Some(12.3));
        assert_eq!(distance_mm_to_cm(1234.0), Some(123.4));
        assert_eq!(distance_mm_to_cm(0.0), Some(0.0));
    }

    #[test]
    fn distance_is_monotonic() {
        let mut previous = f64::MIN;
        for mm in 0..5000 {
            let cm = distance_mm_to_cm(f64::from(mm) * 0.7).unwrap();
            assert!(cm >= previous, "{cm} < {previous} at {mm}");
            previous = cm;
        }
    }

    #[test]
    fn pwm_always_in_range() {
        for us in (-5000..10000).step_by(37) {
            let angle = pulse_us_to_angle(f64::from(us)).unwrap();
            assert!(angle <= ANGLE_MAX);
        }
    }

    #[test]
    fn sample_serializes_with_nulls() {
        let sample = TelemetrySample::from_raw(Some(250.0), None, 42);
        let json = serde_json::to_value(sample).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"distance_cm": 25.0, "pwm": null, "ts": 42})
        );
    }

    #[test]
    fn now_millis_is_after_2020() {
        assert!(now_millis() > 1_577_836_800_000);
    }
}
