//! Fuzz target: `LineReader` framing and raw reads
//!
//! The first byte picks how many raw bytes to read after the first line;
//! the rest is the serial stream. Checks:
//! - No panics, whatever the stream holds
//! - Every line fits `LINE_CAPACITY` and is never empty unless truncated
//! - `read_raw` never reports more bytes than asked for
//!
//! cargo fuzz run fuzz_line_reader

#![no_main]

use std::collections::VecDeque;

use bgxx::app::ports::{Clock, SerialPort};
use bgxx::transport::{LINE_CAPACITY, LineReader};
use libfuzzer_sys::fuzz_target;

struct Stream(VecDeque<u8>);

impl SerialPort for Stream {
    type Error = ();

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ()> {
        let mut n = 0;
        while n < buf.len() {
            let Some(b) = self.0.pop_front() else { break };
            buf[n] = b;
            n += 1;
        }
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, ()> {
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<(), ()> {
        Ok(())
    }

    fn available(&self) -> bool {
        !self.0.is_empty()
    }
}

struct Ticks(u64);

impl Clock for Ticks {
    fn now_ms(&self) -> u64 {
        self.0
    }

    fn delay_ms(&mut self, ms: u32) {
        self.0 += u64::from(ms);
    }
}

fuzz_target!(|data: &[u8]| {
    let Some((&raw_len, stream)) = data.split_first() else {
        return;
    };
    let mut reader = LineReader::new(Stream(stream.iter().copied().collect()));
    let mut clock = Ticks(0);

    if let Ok(Some(line)) = reader.poll_line() {
        assert!(line.raw().len() <= LINE_CAPACITY);
        let mut raw = vec![0u8; raw_len as usize];
        let got = reader.read_raw(&mut raw, &mut clock, 10, 1).unwrap_or(0);
        assert!(got <= raw.len());
    }

    while let Ok(Some(line)) = reader.poll_line() {
        assert!(line.raw().len() <= LINE_CAPACITY);
        assert!(!line.as_str().is_empty() || line.was_truncated());
    }
});
