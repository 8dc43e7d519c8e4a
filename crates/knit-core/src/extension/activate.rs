//! Selection and ordering of activatable extensions.

use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

use crate::metadata::Activate;
use crate::url::ParameterCarrier;

/// Explicit-list token marking where automatic activations are spliced in.
pub const DEFAULT_TOKEN: &str = "default";
/// Explicit-list token removing every automatic activation.
pub const REMOVE_DEFAULT_TOKEN: &str = "-default";

/// Empty requested group or empty rule group matches.
pub(crate) fn group_matches(group: Option<&str>, rule: &Activate) -> bool {
    match group.map(str::trim).filter(|g| !g.is_empty()) {
        None => true,
        Some(group) => rule.group.is_empty() || rule.group.iter().any(|g| g == group),
    }
}

/// Every `value` entry must be satisfied by the carrier.
///
/// An entry is `key` (any non-empty value) or `key:expected`. A parameter
/// matches a key when it equals the key or ends with `.key`, so per-method
/// parameters count.
pub(crate) fn is_active(rule: &Activate, carrier: &dyn ParameterCarrier) -> bool {
    if rule.value.is_empty() {
        return true;
    }
    let parameters = carrier.parameters();
    rule.value.iter().all(|entry| {
        let (key, expected) = match entry.split_once(':') {
            Some((key, expected)) => (key.trim(), Some(expected.trim())),
            None => (entry.trim(), None),
        };
        parameters.iter().any(|(name, value)| {
            let key_matches = *name == key
                || name
                    .strip_suffix(key)
                    .is_some_and(|prefix| prefix.ends_with('.'));
            key_matches
                && match expected {
                    Some(expected) => *value == expected,
                    None => !value.is_empty(),
                }
        })
    })
}

/// Order candidates by `before`/`after`, then `order`, then name.
///
/// Constraints naming extensions outside the candidate set are ignored. A
/// cycle is broken by releasing its smallest `(order, name)` member.
pub fn sort_activations(candidates: &[(String, Activate)]) -> Vec<String> {
    let rules: BTreeMap<&str, &Activate> = candidates
        .iter()
        .map(|(name, rule)| (name.as_str(), rule))
        .collect();

    let mut successors: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    let mut indegree: BTreeMap<&str, usize> = rules.keys().map(|name| (*name, 0)).collect();
    let mut add_edge = |from: &'_ str, to: &'_ str| {
        if from == to {
            return;
        }
        let (Some((from, _)), Some((to, _))) = (rules.get_key_value(from), rules.get_key_value(to))
        else {
            return;
        };
        if successors.entry(*from).or_default().insert(*to) {
            *indegree.entry(*to).or_default() += 1;
        }
    };
    for (&name, rule) in &rules {
        for later in &rule.before {
            add_edge(name, later.as_str());
        }
        for earlier in &rule.after {
            add_edge(earlier.as_str(), name);
        }
    }

    let key = |name: &str| (rules[name].order, name.to_string());
    let mut ready: BTreeSet<(i32, String)> = indegree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(name, _)| key(*name))
        .collect();
    let mut done: BTreeSet<String> = BTreeSet::new();
    let mut sorted = Vec::with_capacity(rules.len());

    while sorted.len() < rules.len() {
        let next = match ready.pop_first() {
            Some(next) => next,
            None => {
                // Every remaining node waits on another: break the cycle
                let Some(stuck) = rules
                    .keys()
                    .filter(|name| !done.contains(**name))
                    .map(|name| key(*name))
                    .min()
                else {
                    break;
                };
                warn!(
                    "Activation ordering cycle detected, releasing {} first",
                    stuck.1
                );
                stuck
            }
        };
        if !done.insert(next.1.clone()) {
            continue;
        }
        if let Some(followers) = successors.get(next.1.as_str()) {
            for follower in followers {
                if let Some(degree) = indegree.get_mut(follower) {
                    *degree = degree.saturating_sub(1);
                    if *degree == 0 && !done.contains(*follower) {
                        ready.insert(key(*follower));
                    }
                }
            }
        }
        sorted.push(next.1);
    }

    sorted
}
