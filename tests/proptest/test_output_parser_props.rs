//! Property-based tests for output parsing and label formatting

use modbar::models::{ModuleSpec, ReturnType};
use modbar::output::{escape_markup, truncate, OutputParser};
use proptest::prelude::*;

proptest! {
    #[test]
    fn test_truncate_never_exceeds_limit(s in "\\PC{0,200}", max in 0usize..64) {
        let out = truncate(&s, max);
        prop_assert!(out.chars().count() <= max);
        if s.chars().count() <= max {
            prop_assert_eq!(out, s);
        }
    }

    #[test]
    fn test_escaped_text_has_no_raw_markup(s in "\\PC{0,200}") {
        let escaped = escape_markup(&s);
        prop_assert!(!escaped.contains('<'));
        prop_assert!(!escaped.contains('>'));
        prop_assert!(!escaped.contains('"'));
    }

    #[test]
    fn test_json_mode_handles_any_line(line in "\\PC{0,300}") {
        let spec = ModuleSpec::new("custom/fuzz").with_return_type(ReturnType::Json);
        let state = OutputParser::new(&spec).parse(&line, false);
        // malformed lines degrade to text, never to an error state
        prop_assert!(!state.error);
    }

    #[test]
    fn test_json_text_field_round_trips(text in "[^\\n]{0,100}") {
        let spec = ModuleSpec::new("custom/json").with_return_type(ReturnType::Json);
        let line = serde_json::json!({ "text": text }).to_string();
        let state = OutputParser::new(&spec).parse(&line, false);
        prop_assert_eq!(&state.text, &text);
        prop_assert_eq!(state.is_visible(), !text.is_empty());
    }

    #[test]
    fn test_text_mode_preserves_single_line(text in "[^\\r\\n]{0,100}") {
        let spec = ModuleSpec::new("custom/text");
        let state = OutputParser::new(&spec).parse(&format!("{}\n", text), false);
        prop_assert_eq!(state.text, text);
    }

    #[test]
    fn test_percentage_is_clamped(pct in -1000.0f64..1000.0) {
        let spec = ModuleSpec::new("custom/pct").with_return_type(ReturnType::Json);
        let line = serde_json::json!({ "text": "x", "percentage": pct }).to_string();
        let state = OutputParser::new(&spec).parse(&line, false);
        prop_assert!(state.percentage.is_some_and(|p| p <= 100));
    }

    #[test]
    fn test_escape_with_max_length_keeps_entities_whole(
        text in "[a-z &<>\"']{0,60}",
        max in 0usize..40,
    ) {
        let mut spec = ModuleSpec::new("custom/markup").with_return_type(ReturnType::Json);
        spec.escape = true;
        spec.max_length = Some(max);
        let line = serde_json::json!({ "text": text }).to_string();
        let state = OutputParser::new(&spec).parse(&line, false);

        for (at, _) in state.text.match_indices('&') {
            let rest = &state.text[at..];
            prop_assert!(
                ["&amp;", "&lt;", "&gt;", "&quot;", "&#39;"]
                    .iter()
                    .any(|entity| rest.starts_with(entity)),
                "broken entity in {:?}",
                state.text
            );
        }
    }
}
