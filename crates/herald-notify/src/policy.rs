//! Timing policy table — pure lookup from (profile, category) to an
//! ordered list of (anchor, offset-minutes) rules.
//!
//! Offsets are minutes *before* the anchor instant (positive = earlier).
//! Lookup order: profile-specific entry, then the profile-agnostic
//! generic entry, then a minimal default of a single start notification
//! at offset 0. Adding a category is a config change, not new code.

use std::collections::HashMap;

use herald_core::config::PolicyEntry;
use herald_core::types::Anchor;

/// One (anchor, offset) rule. Multiple offsets per anchor each produce a
/// distinct notification.
pub type PolicyRule = (Anchor, i64);

/// Static timing-policy lookup. No side effects.
#[derive(Debug, Clone)]
pub struct PolicyTable {
    /// (PROFILE, category) → rules.
    profile_specific: HashMap<(String, String), Vec<PolicyRule>>,
    /// category → rules, any profile.
    generic: HashMap<String, Vec<PolicyRule>>,
}

impl PolicyTable {
    /// Empty table — resolves everything to the minimal default.
    pub fn new() -> Self {
        Self {
            profile_specific: HashMap::new(),
            generic: HashMap::new(),
        }
    }

    /// The built-in policies shipped with Herald.
    pub fn builtin() -> Self {
        let mut table = Self::new();

        // Generic categories, any profile.
        table.set_generic("Banner", &[60, 1440], &[60, 1440]);
        table.set_generic("Event", &[180], &[180, 1440]);
        table.set_generic("Maintenance", &[60], &[]);
        table.set_generic("Offer", &[180, 1440], &[1440]);

        // G1 racing-sim profile: banners get a single day-before warning,
        // story events a longer end-side runway.
        for cat in ["Character Banner", "Support Banner", "Paid Banner"] {
            table.set_profile("G1", cat, &[1440], &[1440, 1500]);
        }
        table.set_profile("G1", "Story Event", &[1440], &[4320, 4380]);
        table.set_profile("G1", "Selection Gacha", &[1440], &[1440]);

        table
    }

    /// Built-ins plus config-file additions/overrides.
    pub fn from_config(entries: &[PolicyEntry]) -> Self {
        let mut table = Self::builtin();
        for entry in entries {
            match &entry.profile {
                Some(profile) => {
                    table.set_profile(profile, &entry.category, &entry.start, &entry.end)
                }
                None => table.set_generic(&entry.category, &entry.start, &entry.end),
            }
        }
        table
    }

    /// Insert or replace a profile-specific policy.
    pub fn set_profile(&mut self, profile: &str, category: &str, start: &[i64], end: &[i64]) {
        self.profile_specific.insert(
            (profile.to_uppercase(), category.to_string()),
            build_rules(start, end),
        );
    }

    /// Insert or replace a generic (profile-agnostic) policy.
    pub fn set_generic(&mut self, category: &str, start: &[i64], end: &[i64]) {
        self.generic
            .insert(category.to_string(), build_rules(start, end));
    }

    /// Resolve the ordered rule list for an event. Never empty.
    pub fn resolve(&self, profile: &str, category: &str) -> Vec<PolicyRule> {
        let key = (profile.to_uppercase(), category.to_string());
        if let Some(rules) = self.profile_specific.get(&key) {
            return rules.clone();
        }
        if let Some(rules) = self.generic.get(category) {
            return rules.clone();
        }
        // Minimal default: one notification at event start.
        vec![(Anchor::Start, 0)]
    }
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Start rules first, then end rules, preserving the declared order.
fn build_rules(start: &[i64], end: &[i64]) -> Vec<PolicyRule> {
    let mut rules = Vec::with_capacity(start.len() + end.len());
    for &m in start {
        rules.push((Anchor::Start, m));
    }
    for &m in end {
        rules.push((Anchor::End, m));
    }
    rules
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_specific_wins() {
        let table = PolicyTable::builtin();
        let rules = table.resolve("G1", "Character Banner");
        assert_eq!(
            rules,
            vec![(Anchor::Start, 1440), (Anchor::End, 1440), (Anchor::End, 1500)]
        );
    }

    #[test]
    fn test_generic_fallback() {
        let table = PolicyTable::builtin();
        // No profile-specific entry for AK — fall back to generic Banner.
        let rules = table.resolve("AK", "Banner");
        assert_eq!(
            rules,
            vec![
                (Anchor::Start, 60),
                (Anchor::Start, 1440),
                (Anchor::End, 60),
                (Anchor::End, 1440)
            ]
        );
    }

    #[test]
    fn test_minimal_default() {
        let table = PolicyTable::builtin();
        let rules = table.resolve("AK", "Unheard-of Category");
        assert_eq!(rules, vec![(Anchor::Start, 0)]);
    }

    #[test]
    fn test_profile_lookup_case_insensitive() {
        let table = PolicyTable::builtin();
        assert_eq!(
            table.resolve("g1", "Story Event"),
            vec![(Anchor::Start, 1440), (Anchor::End, 4320), (Anchor::End, 4380)]
        );
    }

    #[test]
    fn test_config_override() {
        let entries = vec![
            PolicyEntry {
                profile: Some("G1".into()),
                category: "Character Banner".into(),
                start: vec![720],
                end: vec![],
            },
            PolicyEntry {
                profile: None,
                category: "Raid".into(),
                start: vec![30],
                end: vec![30],
            },
        ];
        let table = PolicyTable::from_config(&entries);
        assert_eq!(
            table.resolve("G1", "Character Banner"),
            vec![(Anchor::Start, 720)]
        );
        assert_eq!(
            table.resolve("AK", "Raid"),
            vec![(Anchor::Start, 30), (Anchor::End, 30)]
        );
    }
}
