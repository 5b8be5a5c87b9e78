#![no_main]

use embedded_collections::model::{run_list_equivalence, ListOp};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|ops: Vec<ListOp>| { run_list_equivalence(ops) });
