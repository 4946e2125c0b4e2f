use proptest::prelude::*;

use goalwork::work::{DEFAULT_SEPARATOR, Work};
use goalwork_test_utils::manual::ManualHandle;

/// A child below the top node: (parent index or none, progress, max, finished).
type ChildSpec = (Option<usize>, u8, u8, bool);

fn children_strategy() -> impl Strategy<Value = Vec<ChildSpec>> {
    proptest::collection::vec(
        (proptest::option::of(any::<usize>()), 0u8..20, 0u8..20, any::<bool>()),
        0..12,
    )
}

/// Build `top` plus children, each attached either directly below `top` or
/// below an earlier child. Returns the tree root and the expected totals.
fn build(specs: &[ChildSpec]) -> (Work, f64, f64, bool, Vec<ManualHandle>) {
    let root = Work::root(DEFAULT_SEPARATOR);
    let top = root.add_child("top", None).unwrap();
    top.set_progress(1.0);
    top.set_max_progress(2.0);

    let mut names: Vec<String> = Vec::new();
    let mut handles = Vec::new();
    let (mut progress, mut max, mut done) = (1.0, 2.0, true);

    for (i, (parent, p, m, finished)) in specs.iter().enumerate() {
        let parent_name = match parent {
            Some(idx) if !names.is_empty() => names[idx % names.len()].clone(),
            _ => "top".to_string(),
        };
        let name = format!("{parent_name}.c{i}");

        let (handle, dynamic) = ManualHandle::shared();
        let node = root.add_child(&name, Some(dynamic)).unwrap();
        node.set_progress(f64::from(*p));
        node.set_max_progress(f64::from(*m));
        if *finished {
            handle.finish();
        } else {
            done = false;
        }

        progress += f64::from(*p);
        max += f64::from(*m);
        names.push(name);
        handles.push(handle);
    }

    (root, progress, max, done, handles)
}

proptest! {
    #[test]
    fn aggregates_equal_sums_over_the_subtree(specs in children_strategy()) {
        let (root, progress, max, done, _handles) = build(&specs);
        let top = root.find("top").unwrap();

        prop_assert_eq!(top.progress(), progress);
        prop_assert_eq!(top.max_progress(), max);
        prop_assert_eq!(top.is_done(), done);
        prop_assert_eq!(root.snapshot().progress, progress);
    }

    #[test]
    fn cleanup_keeps_every_pending_node(specs in children_strategy()) {
        let (root, _, _, _, handles) = build(&specs);
        let pending: Vec<usize> = specs
            .iter()
            .enumerate()
            .filter(|(_, (_, _, _, finished))| !finished)
            .map(|(i, _)| i)
            .collect();

        root.cleanup();

        let snap = root.snapshot();
        for i in pending {
            let suffix = format!(".c{i}");
            let found = find_by_suffix(&snap, &suffix);
            prop_assert!(found, "pending node c{} was removed", i);
        }
        // Finishing everything lets cleanup empty the tree.
        for handle in &handles {
            handle.finish();
        }
        root.cleanup();
        prop_assert!(root.children().is_empty());
    }
}

fn find_by_suffix(snap: &goalwork::work::WorkSnapshot, suffix: &str) -> bool {
    snap.full_name.ends_with(suffix) || snap.children.iter().any(|c| find_by_suffix(c, suffix))
}
