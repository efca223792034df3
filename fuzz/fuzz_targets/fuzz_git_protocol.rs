//! Fuzz target for the client side of the smart protocol: upload-pack
//! requests and receive-pack commands.

#![no_main]

use gitgate_git::{Command, UploadRequest};
use libfuzzer_sys::fuzz_target;
use std::io::Cursor;

fuzz_target!(|data: &[u8]| {
    let _ = UploadRequest::parse(&mut Cursor::new(data));

    if let Ok(text) = std::str::from_utf8(data) {
        for line in text.lines() {
            let _ = Command::parse(line);
        }
    }
});
