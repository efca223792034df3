//! Fuzz target for the pkt-line reader.
//!
//! Reading arbitrary input must not panic, and every data packet read must
//! encode back to the bytes it was read from, up to header case.

#![no_main]

use gitgate_git::{PktLine, PktLineReader};
use libfuzzer_sys::fuzz_target;
use std::io::Cursor;

fuzz_target!(|data: &[u8]| {
    let mut reader = PktLineReader::new(Cursor::new(data));
    let mut offset = 0usize;

    // Bounded so crafted input cannot spin forever.
    for _ in 0..100 {
        match reader.read() {
            Ok(Some(pkt)) => {
                let encoded = match &pkt {
                    PktLine::Data(_) => pkt.encode().expect("read packets fit the limit"),
                    _ => {
                        offset += 4;
                        continue;
                    }
                };
                let original = &data[offset..offset + encoded.len()];
                // Headers may arrive in either case; encoding is lowercase.
                assert!(original[..4].eq_ignore_ascii_case(&encoded[..4]));
                assert_eq!(&original[4..], &encoded[4..]);
                offset += encoded.len();
            }
            Ok(None) | Err(_) => break,
        }
    }
});
