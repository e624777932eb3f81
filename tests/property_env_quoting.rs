use std::collections::BTreeMap;

use proptest::prelude::*;

use procrun::env::{EnvMode, Environment};
use procrun::launch::wrappers::quote_argument;
use procrun::platform::Platform;

fn env_strategy() -> impl Strategy<Value = BTreeMap<String, String>> {
    proptest::collection::btree_map("[A-Za-z_][A-Za-z0-9_]{0,6}", "[ -~]{0,12}", 0..12)
}

fn build(platform: Platform, vars: &BTreeMap<String, String>) -> Environment {
    let mut env = Environment::for_platform(platform);
    for (k, v) in vars {
        env.set(k.clone(), v.clone());
    }
    env
}

proptest! {
    /// Every override wins, every other inherited key survives, and no key
    /// appears twice.
    #[test]
    fn merge_applies_overrides_exactly_once(
        inherited in env_strategy(),
        overrides in env_strategy(),
    ) {
        let base = build(Platform::Unix, &inherited);
        let extra = build(Platform::Unix, &overrides);
        let mode = EnvMode::Merge(extra);

        let merged = mode.resolve(|| base.clone()).expect("merge yields an environment");

        for (k, v) in &overrides {
            prop_assert_eq!(merged.get(k), Some(v.as_str()));
        }
        for (k, v) in &inherited {
            if !overrides.contains_key(k) {
                prop_assert_eq!(merged.get(k), Some(v.as_str()));
            }
        }
        let keys: Vec<&str> = merged.iter().map(|(k, _)| k).collect();
        let mut deduped = keys.clone();
        deduped.dedup();
        prop_assert_eq!(keys.len(), deduped.len());
    }

    /// On case-insensitive platforms an override replaces the inherited key
    /// whatever its spelling.
    #[test]
    fn case_insensitive_merge_never_duplicates(
        key in "[a-z]{1,8}",
        old in "[ -~]{0,8}",
        new in "[ -~]{0,8}",
    ) {
        let mut base = Environment::for_platform(Platform::Windows);
        base.set(key.to_uppercase(), old);
        let mut extra = Environment::for_platform(Platform::Windows);
        extra.set(key.clone(), new.clone());

        let merged = EnvMode::Merge(extra).resolve(|| base).expect("merge");
        prop_assert_eq!(merged.len(), 1);
        prop_assert_eq!(merged.get(&key.to_uppercase()), Some(new.as_str()));
    }

    /// Quoting only ever adds a matching pair of outer quotes.
    #[test]
    fn quoting_wraps_without_altering(arg in "[ -~]{0,16}") {
        match quote_argument(&arg) {
            Ok(quoted) if quoted == arg => {
                prop_assert!(!arg.is_empty());
                prop_assert!(!arg.contains(char::is_whitespace));
                prop_assert!(!arg.contains('"') && !arg.contains('\''));
            }
            Ok(quoted) => {
                let first = quoted.chars().next().unwrap();
                prop_assert!(first == '"' || first == '\'');
                prop_assert!(quoted.ends_with(first));
                prop_assert_eq!(&quoted[1..quoted.len() - 1], arg.as_str());
            }
            Err(_) => {
                prop_assert!(arg.contains('"') && arg.contains('\''));
            }
        }
    }
}
