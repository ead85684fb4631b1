//! Golden fixture integration tests.
//!
//! Each fixture in `fixtures/frames/` holds a schema envelope, an events
//! envelope and the events they must decode to. Compact fixtures are
//! written as JSON and re-encoded to CBOR before decoding, so they travel
//! the binary path.

use espstream_core::codec::{decode_binary, decode_json};
use espstream_core::{
    EventDecoder, Message, MessageEnvelope, SubscriptionId, SubscriptionRegistry, WireFormat,
};

// ─── Helpers ──────────────────────────────────────────────────────────────────

/// The fixtures live two levels above the crate root.
fn fixture_path(name: &str) -> std::path::PathBuf {
    let mut p = std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    p.push("../../fixtures/frames");
    p.push(name);
    p
}

fn load(name: &str) -> serde_json::Value {
    let text = std::fs::read_to_string(fixture_path(name)).expect("fixture not found");
    serde_json::from_str(&text).unwrap()
}

/// Encode an envelope the way the fixture's format puts it on the wire and
/// decode it back through the frame codec.
fn wire_envelope(format: WireFormat, value: &serde_json::Value) -> MessageEnvelope {
    match format {
        WireFormat::Cbor => {
            let mut buf = Vec::new();
            ciborium::into_writer(value, &mut buf).unwrap();
            decode_binary(&buf).expect("cbor envelope")
        }
        WireFormat::Json => decode_json(value.to_string().as_bytes()).expect("json envelope"),
    }
}

fn run_fixture(name: &str) {
    let fixture = load(name);
    let format: WireFormat = fixture["format"].as_str().unwrap().parse().unwrap();

    let Message::Schema(schema) = wire_envelope(format, &fixture["schema"]).classify() else {
        panic!("{name}: schema envelope did not classify as schema");
    };
    let registry = SubscriptionRegistry::new();
    registry.register(
        SubscriptionId::from(schema.subscription_id.as_str()),
        format,
        vec![],
    );
    let decoder = EventDecoder::new(registry);
    decoder.apply_schema(&schema).expect("schema applies");

    let Message::Events(events) = wire_envelope(format, &fixture["events"]).classify() else {
        panic!("{name}: events envelope did not classify as events");
    };

    let mut decoded = Vec::new();
    let mut errors = 0;
    for result in decoder.decode_events(&events) {
        match result {
            Ok(event) => decoded.push(serde_json::to_value(&event).unwrap()),
            Err(e) => {
                assert!(!e.is_contract_violation(), "{name}: unexpected fatal {e}");
                errors += 1;
            }
        }
    }

    assert_eq!(
        serde_json::Value::Array(decoded),
        fixture["expected"],
        "{name}: decoded events mismatch"
    );
    assert_eq!(
        errors,
        fixture["expected_errors"].as_u64().unwrap_or(0) as usize,
        "{name}: error count mismatch"
    );
}

// ─── Fixtures ─────────────────────────────────────────────────────────────────

#[test]
fn cbor_sensor_readings_golden() {
    run_fixture("cbor_sensor_readings.json");
}

#[test]
fn json_trades_golden() {
    run_fixture("json_trades.json");
}
