#![no_main]

use embedded_collections::model::{run_multimap_equivalence, MapOp};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|ops: Vec<MapOp>| { run_multimap_equivalence(ops) });
