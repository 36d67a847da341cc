//! Fuzz target for [`Framer`] chunk boundaries
//!
//! # Strategy
//!
//! - Raw bytes: arbitrary content including separators, CR, invalid UTF-8
//! - Cut points: the same bytes split at arbitrary offsets
//!
//! # Invariants
//!
//! - Chunked delivery yields exactly the messages of whole delivery
//! - No message is empty or carries surrounding whitespace
//! - No message contains a separator
//! - Pending bytes never exceed the cap
//! - NEVER panic on any input

#![no_main]

use arbitrary::Arbitrary;
use cosim_proto::{is_separator, Framer, MAX_PENDING_BYTES};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct FuzzInput {
    data: Vec<u8>,
    cuts: Vec<u16>,
}

fn feed(framer: &mut Framer, chunk: &[u8], out: &mut Vec<String>) {
    // Inputs are far below the cap, so push never fails here.
    if let Ok(messages) = framer.push(chunk) {
        out.extend(messages);
    }
    assert!(framer.pending_len() <= MAX_PENDING_BYTES);
}

fuzz_target!(|input: FuzzInput| {
    let mut whole = Vec::new();
    let mut framer = Framer::new();
    feed(&mut framer, &input.data, &mut whole);
    let whole_tail = framer.take_partial();

    let mut offsets: Vec<usize> =
        input.cuts.iter().map(|&c| usize::from(c) % (input.data.len() + 1)).collect();
    offsets.push(0);
    offsets.push(input.data.len());
    offsets.sort_unstable();
    offsets.dedup();

    let mut chunked = Vec::new();
    let mut framer = Framer::new();
    for pair in offsets.windows(2) {
        feed(&mut framer, &input.data[pair[0]..pair[1]], &mut chunked);
    }
    let chunked_tail = framer.take_partial();

    assert_eq!(whole, chunked, "chunking changed message boundaries");
    assert_eq!(whole_tail, chunked_tail, "chunking changed the unterminated tail");

    for message in &whole {
        assert!(!message.is_empty());
        assert_eq!(message.trim(), message);
        assert!(!message.bytes().any(is_separator));
    }
});
