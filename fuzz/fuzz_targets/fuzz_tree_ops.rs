//! Fuzz target for tree operations.
//!
//! Replays an arbitrary operation script against a single tree. No
//! sequence of set/get/prune/graft may panic or lose unrelated state.

#![no_main]

use libfuzzer_sys::fuzz_target;
use strata_sync::Tree;

fuzz_target!(|script: Vec<(u8, Vec<u8>)>| {
    let tree: Tree<u8, u64> = Tree::new();
    let scratch: Tree<u8, u64> = Tree::new();

    for (op, path) in script {
        // Bound depth so degenerate inputs don't just build a linked list.
        let path = &path[..path.len().min(8)];
        match op % 5 {
            0 => tree.set(u64::from(op), path),
            1 => {
                let _ = tree.get(path);
            }
            2 => {
                let _ = tree.prune(path);
            }
            3 => tree.graft(&scratch, path),
            _ => {
                let _ = tree.branch(path);
            }
        }
    }
});
