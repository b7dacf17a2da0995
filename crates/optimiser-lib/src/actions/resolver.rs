//! Raw target index to concrete node

use crate::models::{ActionFamily, Snapshot, Suggestion};

/// Resolve a family and raw target index against the live node list
///
/// The target space is sized for the largest cluster the policy was trained
/// for, while the live node count varies, so the index wraps modulo the
/// current node count. Distinct indices may therefore alias to one node.
pub fn resolve(family: ActionFamily, target_index: usize, snapshot: &Snapshot) -> Suggestion {
    if family == ActionFamily::DoNothing || snapshot.nodes.is_empty() {
        return Suggestion {
            action: family,
            target: None,
        };
    }

    let position = target_index % snapshot.nodes.len();
    let target = snapshot.nodes.keys().nth(position).cloned();

    Suggestion {
        action: family,
        target,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NodeFacts;
    use proptest::prelude::*;

    fn snapshot_with_nodes(names: &[&str]) -> Snapshot {
        let mut snapshot = Snapshot::empty();
        for name in names {
            snapshot.nodes.insert(name.to_string(), NodeFacts::default());
        }
        snapshot
    }

    fn family() -> impl Strategy<Value = ActionFamily> {
        (0..ActionFamily::COUNT).prop_map(|i| ActionFamily::ALL[i])
    }

    #[test]
    fn test_wraps_modulo_node_count() {
        let snapshot = snapshot_with_nodes(&["n1", "n2", "n3"]);
        let s = resolve(ActionFamily::Consolidate, 4, &snapshot);
        assert_eq!(s.target.as_deref(), Some("n2"));
        let s = resolve(ActionFamily::HardwareTune, 0, &snapshot);
        assert_eq!(s.target.as_deref(), Some("n1"));
    }

    #[test]
    fn test_do_nothing_has_no_target() {
        let snapshot = snapshot_with_nodes(&["n1"]);
        assert_eq!(resolve(ActionFamily::DoNothing, 0, &snapshot), Suggestion::do_nothing());
    }

    #[test]
    fn test_empty_cluster_keeps_family_without_target() {
        let s = resolve(ActionFamily::Defragment, 3, &Snapshot::empty());
        assert_eq!(s.action, ActionFamily::Defragment);
        assert!(s.target.is_none());
    }

    proptest! {
        #[test]
        fn empty_node_set_never_yields_target(f in family(), index in any::<usize>()) {
            prop_assert!(resolve(f, index, &Snapshot::empty()).target.is_none());
        }

        #[test]
        fn target_is_always_a_live_node(
            f in family(),
            index in any::<usize>(),
            count in 1usize..50,
        ) {
            let names: Vec<String> = (0..count).map(|i| format!("node-{:02}", i)).collect();
            let refs: Vec<&str> = names.iter().map(String::as_str).collect();
            let snapshot = snapshot_with_nodes(&refs);

            let suggestion = resolve(f, index, &snapshot);
            match f {
                ActionFamily::DoNothing => prop_assert!(suggestion.target.is_none()),
                _ => {
                    let target = suggestion.target.expect("non-empty cluster resolves a target");
                    prop_assert!(snapshot.nodes.contains_key(&target));
                }
            }
        }

        #[test]
        fn do_nothing_never_has_target(index in any::<usize>(), count in 0usize..10) {
            let names: Vec<String> = (0..count).map(|i| format!("n{}", i)).collect();
            let refs: Vec<&str> = names.iter().map(String::as_str).collect();
            let snapshot = snapshot_with_nodes(&refs);
            prop_assert!(resolve(ActionFamily::DoNothing, index, &snapshot).target.is_none());
        }
    }
}
