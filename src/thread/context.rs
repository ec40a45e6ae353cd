//! System prompt rendering from thread context.
//!
//! The context map holds user-declared preferences keyed by a small
//! recognized vocabulary. Rendering is deterministic: the base
//! instruction, then one labeled line per recognized key present, in
//! fixed key order. Unrecognized keys are ignored, never an error.

use std::collections::HashMap;

/// Base instruction for the chat assistant.
const BASE_PROMPT: &str = "You are Wayfare, a relocation assistant. You help people plan \
moves abroad: destinations, budgets, timelines, visas, and day-to-day \
practicalities. Answer concretely and use the available tools when they \
help. When the user states a preference, save it with the \
save_preferences tool before answering.";

/// Recognized context keys, in render order, with their prompt labels.
const RECOGNIZED_KEYS: &[(&str, &str)] = &[
    ("name", "Name"),
    ("destination", "Destination"),
    ("budget", "Monthly budget"),
    ("timeline", "Timeline"),
    ("family_size", "Family size"),
    ("nationality", "Nationality"),
    ("occupation", "Occupation"),
    ("language", "Languages"),
];

/// Render the system prompt for a thread's context map.
pub fn render_system_prompt(context: &HashMap<String, String>) -> String {
    let mut prompt = String::from(BASE_PROMPT);

    let known: Vec<String> = RECOGNIZED_KEYS
        .iter()
        .filter_map(|(key, label)| {
            context
                .get(*key)
                .filter(|v| !v.trim().is_empty())
                .map(|v| format!("- {label}: {}", v.trim()))
        })
        .collect();

    if !known.is_empty() {
        prompt.push_str("\n\nWhat the user has told you so far:\n");
        prompt.push_str(&known.join("\n"));
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn empty_context_renders_base_only() {
        let prompt = render_system_prompt(&HashMap::new());
        assert!(prompt.starts_with("You are Wayfare"));
        assert!(!prompt.contains("told you so far"));
    }

    #[test]
    fn recognized_keys_render_in_fixed_order() {
        let prompt = render_system_prompt(&ctx(&[
            ("budget", "€2000/month"),
            ("destination", "Portugal"),
        ]));
        let dest = prompt.find("Destination: Portugal");
        let budget = prompt.find("Monthly budget: €2000/month");
        match (dest, budget) {
            (Some(d), Some(b)) => assert!(d < b, "destination renders before budget"),
            _ => unreachable!("both keys render"),
        }
    }

    #[test]
    fn unrecognized_keys_ignored() {
        let prompt = render_system_prompt(&ctx(&[
            ("destination", "Spain"),
            ("favorite_color", "green"),
            ("__proto__", "x"),
        ]));
        assert!(prompt.contains("Destination: Spain"));
        assert!(!prompt.contains("green"));
        assert!(!prompt.contains("favorite_color"));
    }

    #[test]
    fn blank_values_omitted() {
        let prompt = render_system_prompt(&ctx(&[("destination", "   ")]));
        assert!(!prompt.contains("Destination"));
    }

    #[test]
    fn rendering_is_deterministic() {
        let context = ctx(&[
            ("timeline", "next spring"),
            ("name", "Ana"),
            ("nationality", "Brazilian"),
        ]);
        assert_eq!(render_system_prompt(&context), render_system_prompt(&context));
    }
}
