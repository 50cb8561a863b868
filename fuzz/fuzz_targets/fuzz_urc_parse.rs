//! Fuzz target: `urc::parse` and the field tokenizer
//!
//! Feeds arbitrary text through the unsolicited-line classifier and
//! verifies:
//! - No panics under any input
//! - An MQTT message's payload offset always lands inside the line
//! - Field splitting terminates and yields at most one field per comma + 1
//!
//! cargo fuzz run fuzz_urc_parse

#![no_main]

use bgxx::at::fields;
use bgxx::at::urc::{self, MqttRecv, Urc};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = core::str::from_utf8(data) else {
        return;
    };

    if let Some(Urc::MqttRecv(MqttRecv::Message { payload_at, .. })) = urc::parse(text) {
        assert!(payload_at <= text.len(), "payload offset past end of line");
    }

    let commas = text.matches(',').count();
    assert!(fields::split(text).count() <= commas + 1);
});
