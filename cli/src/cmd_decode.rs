//! `espstream decode`: decode captured frames offline.
//!
//! The schema frame registers its subscription, then every frame file is
//! decoded against it. Files may hold either encoding.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use espstream_core::codec::{decode_bulk_element, decode_json};
use espstream_client::dispatch::DEFAULT_MAX_BULK_DEPTH;
use espstream_core::{
    EventDecoder, Frame, Message, SubscriptionId, SubscriptionRegistry, WireFormat,
};

use crate::cmd_stream::print_event;

#[derive(Debug, Default)]
struct Tally {
    decoded: usize,
    failed: usize,
}

fn read_frame(path: &Path) -> Result<Frame> {
    let bytes = std::fs::read(path).with_context(|| format!("cannot read '{}'", path.display()))?;
    Ok(Frame::Binary(bytes))
}

pub fn run(schema: &Path, frames: &[PathBuf], format: WireFormat, as_json: bool) -> Result<()> {
    let envelope = read_frame(schema)?.decode()?;
    let Message::Schema(schema_msg) = envelope.classify() else {
        bail!("'{}' is not a schema message", schema.display());
    };

    let registry = SubscriptionRegistry::new();
    registry.register(
        SubscriptionId::from(schema_msg.subscription_id.as_str()),
        format,
        vec![],
    );
    let decoder = EventDecoder::new(registry);
    let id = decoder.apply_schema(&schema_msg)?;
    eprintln!("✓ Schema for {id}: {} fields", schema_msg.fields.len());

    let mut tally = Tally::default();
    for path in frames {
        let message = read_frame(path)?.decode()?.classify();
        decode_message(&decoder, message, 0, as_json, &mut tally)?;
    }

    eprintln!("✓ {} events decoded, {} failed", tally.decoded, tally.failed);
    if tally.failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn decode_message(
    decoder: &EventDecoder,
    message: Message,
    depth: usize,
    as_json: bool,
    tally: &mut Tally,
) -> Result<()> {
    match message {
        Message::Events(events) => {
            for result in decoder.decode_events(&events) {
                match result {
                    Ok(event) => {
                        tally.decoded += 1;
                        print_event(&event, as_json)?;
                    }
                    Err(e) => {
                        tally.failed += 1;
                        eprintln!("✗ {e}");
                    }
                }
            }
        }
        Message::Bulk(_) if depth >= DEFAULT_MAX_BULK_DEPTH => {
            tally.failed += 1;
            eprintln!("✗ bulk nested deeper than {DEFAULT_MAX_BULK_DEPTH}");
        }
        Message::Bulk(elements) => {
            for encoded in &elements {
                let bytes = match decode_bulk_element(encoded) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        tally.failed += 1;
                        eprintln!("✗ {e}");
                        continue;
                    }
                };
                let inner = match decode_json(&bytes) {
                    Ok(envelope) => envelope.classify(),
                    Err(e) => {
                        tally.failed += 1;
                        eprintln!("✗ {e}, rest of bulk skipped");
                        break;
                    }
                };
                decode_message(decoder, inner, depth + 1, as_json, tally)?;
            }
        }
        other => eprintln!("- skipping {} message", other.kind()),
    }
    Ok(())
}
