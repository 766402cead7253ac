use chrono::{DateTime, Local};

/// Last clipboard text the engine acted on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipboardSnapshot {
    pub text: String,
    pub observed_at: DateTime<Local>,
}

impl ClipboardSnapshot {
    pub fn new(text: impl Into<String>) -> Self {
        ClipboardSnapshot {
            text: text.into(),
            observed_at: Local::now(),
        }
    }
}

/// Decides whether a clipboard read is new content.
pub struct ChangeDetector;

impl ChangeDetector {
    /// A read counts as a change only when it is non-empty and differs from
    /// the last known text byte for byte.
    pub fn has_changed(last: Option<&str>, current: &str) -> bool {
        !current.is_empty() && last != Some(current)
    }

    /// Same as [`has_changed`](Self::has_changed), taking the snapshot directly.
    pub fn differs_from(last: Option<&ClipboardSnapshot>, current: &str) -> bool {
        Self::has_changed(last.map(|s| s.text.as_str()), current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(None, "", false)]
    #[case(Some("abc"), "", false)]
    #[case(Some("abc"), "abc", false)]
    #[case(None, "abc", true)]
    #[case(Some("abc"), "abd", true)]
    #[case(Some("abc"), "abc ", true)]
    #[case(Some(""), "x", true)]
    fn test_has_changed(#[case] last: Option<&str>, #[case] current: &str, #[case] expected: bool) {
        assert_eq!(ChangeDetector::has_changed(last, current), expected);
    }

    #[test]
    fn test_snapshot_comparison() {
        let snapshot = ClipboardSnapshot::new("hello");
        assert!(!ChangeDetector::differs_from(Some(&snapshot), "hello"));
        assert!(ChangeDetector::differs_from(Some(&snapshot), "world"));
        assert!(ChangeDetector::differs_from(None, "world"));
    }

    #[test]
    fn test_sequence_emits_one_change_per_distinct_value() {
        let reads = ["a", "a", "", "b", "b", "", "", "a"];
        let mut last: Option<String> = None;
        let mut changes = Vec::new();

        for read in reads {
            if ChangeDetector::has_changed(last.as_deref(), read) {
                last = Some(read.to_string());
                changes.push(read);
            }
        }

        assert_eq!(changes, vec!["a", "b", "a"]);
    }
}
