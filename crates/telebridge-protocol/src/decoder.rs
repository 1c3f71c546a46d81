use regex::Regex;
use serde_json::{Map, Value};

use crate::error::{ProtocolError, Result};
use crate::event::{DeviceEvent, EventKind};
use crate::telemetry::{now_millis, TelemetrySample};

const DISTANCE_ALIASES: [&str; 2] = ["distance_mm", "distance"];
const PULSE_ALIASES: [&str; 2] = ["servo_us", "pwm_us"];
const LEGACY_DISTANCE_PATTERN: &str = r"(?i)Dist:\s*(\d+)\s*mm";

/// Result of decoding one device line.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Telemetry(TelemetrySample),
    Device(DeviceEvent),
    /// No strategy matched; carries the raw line.
    Unrecognized(String),
}

impl Decoded {
    /// Short tag for logs and the `decode` command.
    pub fn kind(&self) -> &'static str {
        match self {
            Decoded::Telemetry(_) => "telemetry",
            Decoded::Device(event) => event.kind.as_str(),
            Decoded::Unrecognized(_) => "unrecognized",
        }
    }
}

/// One way of interpreting a device line.
///
/// Strategies are tried in order; the first `Some` wins. A strategy must
/// never panic on malformed input.
pub trait DecodeStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn decode(&self, line: &str, now_ms: i64) -> Option<Decoded>;
}

/// JSON records discriminated by `type`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredStrategy;

impl DecodeStrategy for StructuredStrategy {
    fn name(&self) -> &'static str {
        "structured"
    }

    fn decode(&self, line: &str, now_ms: i64) -> Option<Decoded> {
        if !line.starts_with('{') {
            return None;
        }
        let Ok(Value::Object(record)) = serde_json::from_str::<Value>(line) else {
            return None;
        };

        match record.get("type").and_then(Value::as_str) {
            Some("telemetry") => {
                let fields = match record.get("data") {
                    Some(Value::Object(data)) => data,
                    _ => &record,
                };
                let distance_mm = first_number(fields, &DISTANCE_ALIASES);
                let pulse_us = first_number(fields, &PULSE_ALIASES);
                let timestamp = number_field(fields.get("ts"))
                    .map(|ts| ts.round() as i64)
                    .unwrap_or(now_ms);
                Some(Decoded::Telemetry(TelemetrySample::from_raw(
                    distance_mm,
                    pulse_us,
                    timestamp,
                )))
            }
            Some("ack") => Some(Decoded::Device(DeviceEvent::new(
                EventKind::Ack,
                Value::Object(record),
                now_ms,
            ))),
            Some("event") => Some(Decoded::Device(DeviceEvent::new(
                EventKind::Event,
                Value::Object(record),
                now_ms,
            ))),
            _ => None,
        }
    }
}

/// Human-readable `Dist: <n> mm` reports from older firmware.
#[derive(Debug, Clone)]
pub struct LegacyDistanceStrategy {
    pattern: Regex,
}

impl LegacyDistanceStrategy {
    /// The `Dist: <n> mm` report.
    pub fn new() -> Result<Self> {
        Self::with_pattern(LEGACY_DISTANCE_PATTERN)
    }

    /// A custom report pattern; capture group 1 is the distance in mm.
    pub fn with_pattern(pattern: &str) -> Result<Self> {
        let pattern = Regex::new(pattern).map_err(|err| ProtocolError::Pattern(err.to_string()))?;
        if pattern.captures_len() < 2 {
            return Err(ProtocolError::Pattern(format!(
                "{} has no capture group for the distance",
                pattern.as_str()
            )));
        }
        Ok(Self { pattern })
    }
}

impl DecodeStrategy for LegacyDistanceStrategy {
    fn name(&self) -> &'static str {
        "legacy-distance"
    }

    fn decode(&self, line: &str, now_ms: i64) -> Option<Decoded> {
        if line.starts_with('{') {
            return None;
        }
        let captures = self.pattern.captures(line)?;
        let mm: f64 = captures.get(1)?.as_str().parse().ok()?;
        if !mm.is_finite() {
            return None;
        }
        Some(Decoded::Telemetry(TelemetrySample::from_raw(
            Some(mm),
            None,
            now_ms,
        )))
    }
}

/// Ordered list of strategies; total over all inputs.
pub struct Decoder {
    strategies: Vec<Box<dyn DecodeStrategy>>,
}

impl Decoder {
    /// Structured first, then the legacy distance report.
    pub fn new() -> Self {
        let decoder = Self::empty().with_strategy(StructuredStrategy);
        match LegacyDistanceStrategy::new() {
            Ok(legacy) => decoder.with_strategy(legacy),
            Err(err) => {
                tracing::error!(error = %err, "legacy distance decoding disabled");
                decoder
            }
        }
    }

    /// A decoder with no strategies; everything is unrecognized.
    pub fn empty() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }

    /// Append a strategy after the existing ones.
    pub fn with_strategy(mut self, strategy: impl DecodeStrategy + 'static) -> Self {
        self.strategies.push(Box::new(strategy));
        self
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub fn decode(&self, line: &str) -> Decoded {
        self.decode_at(line, now_millis())
    }

    /// Decode with an explicit "now" for records without a device timestamp.
    pub fn decode_at(&self, line: &str, now_ms: i64) -> Decoded {
        for strategy in &self.strategies {
            if let Some(decoded) = strategy.decode(line, now_ms) {
                tracing::trace!(strategy = strategy.name(), kind = decoded.kind(), "decoded line");
                return decoded;
            }
        }
        Decoded::Unrecognized(line.to_string())
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Decoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decoder")
            .field("strategies", &self.strategy_names())
            .finish()
    }
}

fn first_number(fields: &Map<String, Value>, aliases: &[&str]) -> Option<f64> {
    let value = aliases
        .iter()
        .filter_map(|alias| fields.get(*alias))
        .find(|value| !value.is_null())?;
    number_field(Some(value))
}

// Numbers and numeric strings; everything else is absent.
fn number_field(value: Option<&Value>) -> Option<f64> {
    let n = match value? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    const NOW: i64 = 1_700_000_000_000;

    fn telemetry(decoded: Decoded) -> TelemetrySample {
        match decoded {
            Decoded::Telemetry(sample) => sample,
            other => panic!("expected telemetry, got {other:?}"),
        }
    }

    #[test]
    fn structured_telemetry_is_normalized() {
        let decoder = Decoder::new();
        let sample = telemetry(decoder.decode_at(
            r#"{"type":"telemetry","data":{"distance_mm":100,"servo_us":1500}}"#,
            NOW,
        ));
        assert_eq!(sample.distance_cm(), Some(10.0));
        assert_eq!(sample.pwm(), Some(90));
        assert_eq!(sample.timestamp(), NOW);
    }

    #[test]
    fn legacy_distance_line() {
        let sample = telemetry(Decoder::new().decode_at("Dist: 250 mm", NOW));
        assert_eq!(sample.distance_cm(), Some(25.0));
        assert_eq!(sample.pwm(), None);
        assert_eq!(sample.timestamp(), NOW);
    }

    #[test]
    fn legacy_pattern_is_case_insensitive_and_embedded() {
        let sample = telemetry(Decoder::new().decode_at("sensor0 dist:1234MM ok", NOW));
        assert_eq!(sample.distance_cm(), Some(123.4));
    }

    #[test]
    fn malformed_json_is_unrecognized() {
        assert_eq!(
            Decoder::new().decode_at("{not json", NOW),
            Decoded::Unrecognized("{not json".to_string())
        );
    }

    #[test]
    fn malformed_json_containing_legacy_text_stays_unrecognized() {
        let decoded = Decoder::new().decode_at("{Dist: 250 mm", NOW);
        assert!(matches!(decoded, Decoded::Unrecognized(_)));
    }

    #[test]
    fn aliases_first_non_null_wins() {
        let decoder = Decoder::new();
        let sample = telemetry(decoder.decode_at(
            r#"{"type":"telemetry","data":{"distance":500,"pwm_us":2500}}"#,
            NOW,
        ));
        assert_eq!(sample.distance_cm(), Some(50.0));
        assert_eq!(sample.pwm(), Some(180));

        let sample = telemetry(decoder.decode_at(
            r#"{"type":"telemetry","data":{"distance_mm":null,"distance":70,"servo_us":500,"pwm_us":2500}}"#,
            NOW,
        ));
        assert_eq!(sample.distance_cm(), Some(7.0));
        assert_eq!(sample.pwm(), Some(0));
    }

    #[test]
    fn non_numeric_fields_are_absent() {
        let sample = telemetry(Decoder::new().decode_at(
            r#"{"type":"telemetry","data":{"distance_mm":"abc","servo_us":true}}"#,
            NOW,
        ));
        assert_eq!(sample.distance_cm(), None);
        assert_eq!(sample.pwm(), None);
    }

    #[test]
    fn numeric_strings_and_top_level_fields_are_accepted() {
        let sample = telemetry(Decoder::new().decode_at(
            r#"{"type":"telemetry","distance_mm":"100","servo_us":1500,"ts":42}"#,
            NOW,
        ));
        assert_eq!(sample.distance_cm(), Some(10.0));
        assert_eq!(sample.pwm(), Some(90));
        assert_eq!(sample.timestamp(), 42);
    }

    #[test]
    fn device_timestamp_used_when_finite() {
        let decoder = Decoder::new();
        let sample = telemetry(decoder.decode_at(
            r#"{"type":"telemetry","data":{"distance_mm":1,"ts":1234}}"#,
            NOW,
        ));
        assert_eq!(sample.timestamp(), 1234);

        let sample = telemetry(decoder.decode_at(
            r#"{"type":"telemetry","data":{"distance_mm":1,"ts":"soon"}}"#,
            NOW,
        ));
        assert_eq!(sample.timestamp(), NOW);
    }

    #[test]
    fn ack_and_event_carry_full_record() {
        let decoder = Decoder::new();
        match decoder.decode_at(r#"{"type":"ack","cmd":"led","ok":true}"#, NOW) {
            Decoded::Device(event) => {
                assert_eq!(event.kind, EventKind::Ack);
                assert_eq!(event.payload, json!({"type":"ack","cmd":"led","ok":true}));
            }
            other => panic!("expected ack, got {other:?}"),
        }
        match decoder.decode_at(r#"{"type":"event","name":"bumper"}"#, NOW) {
            Decoded::Device(event) => assert_eq!(event.kind, EventKind::Event),
            other => panic!("expected event, got {other:?}"),
        }
    }

    #[test]
    fn unknown_type_and_plain_text_are_unrecognized() {
        let decoder = Decoder::new();
        assert!(matches!(
            decoder.decode_at(r#"{"type":"status","x":1}"#, NOW),
            Decoded::Unrecognized(_)
        ));
        assert!(matches!(
            decoder.decode_at("boot ok", NOW),
            Decoded::Unrecognized(_)
        ));
        assert!(matches!(decoder.decode_at("[1,2,3]", NOW), Decoded::Unrecognized(_)));
    }

    #[test]
    fn strategies_are_independently_usable() {
        assert!(StructuredStrategy.decode("Dist: 5 mm", NOW).is_none());
        assert!(LegacyDistanceStrategy::new()
            .unwrap()
            .decode(r#"{"type":"telemetry"}"#, NOW)
            .is_none());
        assert_eq!(
            Decoder::empty().decode_at("Dist: 5 mm", NOW),
            Decoded::Unrecognized("Dist: 5 mm".to_string())
        );
        assert_eq!(
            Decoder::new().strategy_names(),
            vec!["structured", "legacy-distance"]
        );
    }

    #[test]
    fn custom_legacy_pattern_reads_capture_group() {
        let strategy = LegacyDistanceStrategy::with_pattern(r"Range=(\d+)").unwrap();
        match strategy.decode("Range=42", NOW) {
            Some(Decoded::Telemetry(sample)) => assert_eq!(sample.distance_cm(), Some(4.2)),
            other => panic!("expected telemetry, got {other:?}"),
        }
        assert!(strategy.decode("Dist: 5 mm", NOW).is_none());
    }

    #[test]
    fn bad_legacy_patterns_are_rejected() {
        assert!(matches!(
            LegacyDistanceStrategy::with_pattern("Dist: ("),
            Err(ProtocolError::Pattern(_))
        ));
        assert!(matches!(
            LegacyDistanceStrategy::with_pattern(r"Dist: \d+"),
            Err(ProtocolError::Pattern(msg)) if msg.contains("capture group")
        ));
    }
}
