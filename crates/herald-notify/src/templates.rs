//! Message template registry — format strings with named placeholders.
//!
//! Placeholders: `{role}` (mention token), `{name}` (event title),
//! `{category}`, `{phase}`, `{participant}`, `{time}` (relative-time
//! token), `{action}` ("starting"/"ending"). Unknown placeholders render
//! as empty string — a malformed template degrades, it never fails a
//! delivery. A `custom_message` on the notification bypasses templates
//! entirely (handled by the dispatcher).

use std::collections::HashMap;

use herald_core::types::Anchor;

/// Template key → format string. Extensible at runtime so operators can
/// override any key from configuration or tooling.
#[derive(Debug, Clone)]
pub struct TemplateRegistry {
    templates: HashMap<String, String>,
}

const DEFAULT_TEMPLATE: &str = "{role}, The {category} **{name}** is {action} {time}!";

impl TemplateRegistry {
    /// The built-in template set.
    pub fn builtin() -> Self {
        let mut t = HashMap::new();
        let mut set = |k: &str, v: &str| {
            t.insert(k.to_string(), v.to_string());
        };

        set("default", DEFAULT_TEMPLATE);

        // Generic event templates
        set("event_start", "{role}, **{name}** has started!");
        set("event_end", "{role}, **{name}** has ended!");
        set("event_reminder", "{role}, **{name}** starts {time}!");

        // Banner templates
        set("banner_start", "{role}, The **{name}** banner is now available!");
        set("banner_end", "{role}, The **{name}** banner ends {time}!");
        set("character_banner_start", "{role}, The **{name}** banner is now available!");
        set("character_banner_end", "{role}, The **{name}** banner ends {time}!");

        // Maintenance
        set("maintenance_start", "{role}, Maintenance for **{name}** starts {time}!");

        // Multi-phase events
        set("phase_start", "{role}, **{name}** {phase} has started!");
        set(
            "g1_competition_phase_round_1",
            "{role}, **{name}** Round 1 has started!",
        );
        set(
            "g1_competition_phase_round_2",
            "{role}, **{name}** Round 2 has started!",
        );
        set(
            "g1_competition_phase_finals",
            "{role}, **{name}** Finals have started! Good luck!",
        );

        // Sequential-unlock events
        set(
            "unlock_start",
            "{role}, **{participant}** is now available in **{name}**!",
        );
        set(
            "g1_legend_race_unlock",
            "{role}, **{participant}**'s Legend Race has started!",
        );

        Self { templates: t }
    }

    /// Insert or replace one template.
    pub fn set(&mut self, key: &str, template: &str) {
        self.templates.insert(key.into(), template.into());
    }

    /// Get a template by key, falling back to the default template.
    pub fn get(&self, key: &str) -> &str {
        self.templates
            .get(key)
            .map(String::as_str)
            .unwrap_or(DEFAULT_TEMPLATE)
    }

    /// Pick the most specific template key for a fire-time.
    ///
    /// Precedence: phase-specific > sub_item-specific > category-specific
    /// > default. `kind` is "start", "end", or "reminder".
    pub fn resolve_key(
        &self,
        profile: &str,
        category: &str,
        kind: &str,
        phase: Option<&str>,
        sub_item: Option<&str>,
    ) -> String {
        let prof = slug(profile);
        let cat = slug(category);

        let mut candidates: Vec<String> = Vec::new();
        if let Some(phase) = phase {
            candidates.push(format!("{prof}_{cat}_phase_{}", slug(phase)));
            candidates.push(format!("{prof}_{cat}_phase"));
            candidates.push("phase_start".into());
        }
        if sub_item.is_some() {
            candidates.push(format!("{prof}_{cat}_unlock"));
            candidates.push("unlock_start".into());
        }
        candidates.push(format!("{prof}_{cat}_{kind}"));
        candidates.push(format!("{cat}_{kind}"));
        candidates.push(format!("event_{kind}"));

        for key in candidates {
            if self.templates.contains_key(&key) {
                return key;
            }
        }
        "default".into()
    }

    /// Render a template, substituting `{placeholder}` tokens from `vars`.
    /// Unknown placeholders become empty string; a stray `{` is literal.
    pub fn render(&self, key: &str, vars: &[(&str, &str)]) -> String {
        let template = self.get(key);
        let mut out = String::with_capacity(template.len() + 32);
        let mut rest = template;

        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            match rest[open + 1..].find('}') {
                Some(close) => {
                    let name = &rest[open + 1..open + 1 + close];
                    if let Some((_, v)) = vars.iter().find(|(k, _)| *k == name) {
                        out.push_str(v);
                    }
                    rest = &rest[open + close + 2..];
                }
                None => {
                    out.push_str(&rest[open..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        out
    }
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Lowercase, alphanumerics kept, everything else collapsed to '_'.
fn slug(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_us = false;
    for c in s.chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
            last_us = false;
        } else if !last_us && !out.is_empty() {
            out.push('_');
            last_us = true;
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}

/// Chat-platform relative-time token; the client renders it in the
/// viewer's local timezone ("in 2 hours", "3 days ago").
pub fn format_relative(unix: i64) -> String {
    format!("<t:{unix}:R>")
}

/// Human-readable label for a timing, for management listings.
/// "1 day before start", "2 hours before end", "at start".
pub fn timing_label(anchor: Anchor, offset_minutes: i64) -> String {
    let at = match anchor {
        Anchor::Start => "start",
        Anchor::End => "end",
    };
    if offset_minutes == 0 {
        return format!("at {at}");
    }
    let span = if offset_minutes >= 1440 {
        let days = offset_minutes / 1440;
        let rem = offset_minutes % 1440;
        if rem == 0 {
            format!("{} {}", days, if days == 1 { "day" } else { "days" })
        } else {
            format!("{}d {}h", days, rem / 60)
        }
    } else if offset_minutes >= 60 {
        let hours = offset_minutes / 60;
        format!("{} {}", hours, if hours == 1 { "hour" } else { "hours" })
    } else {
        format!("{offset_minutes} min")
    };
    format!("{span} before {at}")
}
