#![no_main]

use embedded_collections::model::CursorEquivalenceInput;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|input: CursorEquivalenceInput| {
    embedded_collections::model::run_cursor_equivalence(input.keys, input.ops);
});
