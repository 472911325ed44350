//! Property-based tests for log_shipper using proptest

use log_shipper::appenders::MemorySink;
use log_shipper::core::formatter::{
    format_stack_trace, redact, sanitize, split_into_chunks, MAX_TRACE_LENGTH,
};
use log_shipper::core::queue::SeverityQueue;
use log_shipper::prelude::*;
use proptest::prelude::*;
use std::sync::Arc;

fn any_level() -> impl Strategy<Value = LogLevel> {
    prop_oneof![
        Just(LogLevel::Info),
        Just(LogLevel::Error),
        Just(LogLevel::Critical),
    ]
}

// ============================================================================
// LogLevel Tests
// ============================================================================

proptest! {
    /// Level names parse back to the same level
    #[test]
    fn test_log_level_str_roundtrip(level in any_level()) {
        let parsed: LogLevel = level.to_str().parse().unwrap();
        prop_assert_eq!(level, parsed);
    }

    /// Parsing ignores case
    #[test]
    fn test_log_level_case_insensitive(level in any_level(), use_lower in any::<bool>()) {
        let name = if use_lower {
            level.to_str().to_lowercase()
        } else {
            level.to_str().to_string()
        };
        prop_assert_eq!(name.parse::<LogLevel>().unwrap(), level);
    }

    /// Only INFO maps to the INFO class
    #[test]
    fn test_level_class_mapping(level in any_level()) {
        let expected = if level == LogLevel::Info {
            SeverityClass::Info
        } else {
            SeverityClass::Error
        };
        prop_assert_eq!(level.class(), expected);
    }
}

// ============================================================================
// Chunking Tests
// ============================================================================

proptest! {
    /// No chunk exceeds the limit
    #[test]
    fn test_chunks_respect_limit(content in "[a-z \\n]{0,600}", max_len in 1usize..120) {
        for chunk in split_into_chunks(&content, max_len) {
            prop_assert!(chunk.chars().count() <= max_len);
        }
    }

    /// Short lines survive chunking intact and in order
    #[test]
    fn test_chunks_reassemble_short_lines(
        lines in prop::collection::vec("[a-z0-9]{1,30}", 1..60),
        max_len in 30usize..200,
    ) {
        let content = lines.join("\n");
        let chunks: Vec<String> = split_into_chunks(&content, max_len).collect();
        prop_assert_eq!(chunks.join("\n"), content);
    }

    /// Without newlines, hard splits concatenate back to the input
    #[test]
    fn test_hard_split_preserves_characters(content in "\\PC{1,400}", max_len in 1usize..50) {
        let content = content.replace('\n', "");
        let chunks: Vec<String> = split_into_chunks(&content, max_len).collect();
        prop_assert_eq!(chunks.concat(), content);
    }
}

// ============================================================================
// Sanitization Tests
// ============================================================================

proptest! {
    /// Sanitized messages never exceed the configured length
    #[test]
    fn test_sanitize_bounds_length(message in "\\PC{0,300}", max_chars in 1usize..200) {
        prop_assert!(sanitize(&message, max_chars).chars().count() <= max_chars);
    }

    /// Secrets after a sensitive key never survive redaction
    #[test]
    fn test_redaction_hides_secret(
        key in prop_oneof![Just("password"), Just("token"), Just("secret"), Just("api_key")],
        secret in "[0-9]{6,20}",
        prefix in "[ a-z]{0,20}",
    ) {
        let message = format!("{} {}={} trailing", prefix, key, secret);
        let redacted = redact(&message);
        prop_assert!(!redacted.contains(&secret));
        prop_assert!(redacted.contains("=***"));
    }

    /// Stack traces are always bounded and never empty
    #[test]
    fn test_stack_trace_bounded(trace in prop::option::of("\\PC{0,500}")) {
        let formatted = format_stack_trace(trace.as_deref());
        prop_assert!(!formatted.is_empty());
        prop_assert!(formatted.chars().count() <= MAX_TRACE_LENGTH);
    }
}

// ============================================================================
// Queue Tests
// ============================================================================

proptest! {
    /// The queue never holds more than its capacity and nothing is lost
    #[test]
    fn test_queue_bound_and_conservation(capacity in 1usize..20, pushes in 0usize..80) {
        let sink = Arc::new(MemorySink::new());
        let metrics = Arc::new(ShipperMetrics::new());
        let queue = SeverityQueue::new(SeverityClass::Info, capacity, sink.clone(), metrics);

        for i in 0..pushes {
            queue.push(LogItem::new(LogLevel::Info, format!("message {}", i)));
            prop_assert!(queue.len() <= capacity);
        }

        let evicted = sink.records_tagged(FallbackTag::Overflow).len();
        prop_assert_eq!(evicted, pushes.saturating_sub(capacity));

        let drained = queue.drain();
        prop_assert_eq!(drained.len() + evicted, pushes);
        // Survivors are the newest records, oldest first
        if let Some(first) = drained.first() {
            prop_assert_eq!(first.message.clone(), format!("message {}", evicted));
        }
    }
}
