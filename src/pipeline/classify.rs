use crate::catalog::OperationType;

const WRITE_KEYWORDS: &[&str] = &[
    "create", "send", "update", "add", "delete", "remove", "assign", "escalate", "transition",
];

const READ_KEYWORDS: &[&str] = &[
    "get", "search", "find", "show", "list", "display", "what", "where", "when", "why", "how",
    "which", "who", "fetch", "retrieve",
];

const READ_PHRASES: &[&str] = &["tell me", "give me", "look up"];

/// Tag a query with the kind of operation it asks for.
///
/// Matching is on whole words. A write keyword anywhere makes the query a
/// write, even if it also reads.
pub fn classify_query(query: &str) -> OperationType {
    let lowered = query.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    if words.iter().any(|w| WRITE_KEYWORDS.contains(w)) {
        return OperationType::Write;
    }

    let joined = words.join(" ");
    let is_read = words.iter().any(|w| READ_KEYWORDS.contains(w))
        || READ_PHRASES.iter().any(|phrase| contains_phrase(&joined, phrase))
        || lowered.trim_end().ends_with('?');

    if is_read {
        OperationType::Read
    } else {
        OperationType::Other
    }
}

/// Phrase match on word boundaries within a space-joined word list.
fn contains_phrase(joined: &str, phrase: &str) -> bool {
    format!(" {} ", joined).contains(&format!(" {} ", phrase))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_queries() {
        assert_eq!(classify_query("Create incident for payment outage"), OperationType::Write);
        assert_eq!(classify_query("send a message to #ops"), OperationType::Write);
        assert_eq!(classify_query("Escalate ticket 42"), OperationType::Write);
    }

    #[test]
    fn test_read_queries() {
        assert_eq!(classify_query("show open bugs in PAY"), OperationType::Read);
        assert_eq!(classify_query("Tell me about the last deploy"), OperationType::Read);
        assert_eq!(classify_query("payment service status?"), OperationType::Read);
        assert_eq!(classify_query("look up the on-call engineer"), OperationType::Read);
    }

    #[test]
    fn test_write_wins_over_read() {
        assert_eq!(classify_query("find the bug and update its status"), OperationType::Write);
        assert_eq!(classify_query("can you delete the draft?"), OperationType::Write);
    }

    #[test]
    fn test_whole_word_matching() {
        // "address" contains "add", "showcase" contains "show"
        assert_eq!(classify_query("customer address change"), OperationType::Other);
        assert_eq!(classify_query("showcase"), OperationType::Other);
    }
}
