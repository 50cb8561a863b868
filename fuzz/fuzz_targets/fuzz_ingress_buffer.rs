//! Fuzz target: `IngressBuffer` append/consume sequences
//!
//! Each input byte is one operation: the top bit picks append or consume,
//! the low bits scale the length. Checks:
//! - No panics
//! - Length never exceeds `SOCKET_BUFFER_CAPACITY`
//! - After an append, `pending` matches whether bytes are buffered
//!
//! cargo fuzz run fuzz_ingress_buffer

#![no_main]

use bgxx::registry::{IngressBuffer, SOCKET_BUFFER_CAPACITY};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut buf = IngressBuffer::new();
    let mut scratch = [0u8; 2048];

    for &op in data {
        let len = usize::from(op & 0x7f) * 16;
        if op & 0x80 == 0 {
            buf.append(&scratch[..len.min(scratch.len())]);
            assert_eq!(buf.pending(), !buf.is_empty());
        } else {
            let got = buf.consume(&mut scratch[..len.min(scratch.len())]);
            assert!(got <= len);
        }
        assert!(buf.len() <= SOCKET_BUFFER_CAPACITY);
        assert_eq!(buf.free(), SOCKET_BUFFER_CAPACITY - buf.len());
    }
});
