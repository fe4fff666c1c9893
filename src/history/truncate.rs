//! Pair-truncation invariant engine
//!
//! Pure function enforcing the structural rules of a message log when
//! removing exchanges from the tail. A log is valid for truncation when it
//! is non-empty, has an even length (strict human/AI pairs), and the
//! requested pair count fits. A log whose last message is not an AI message
//! is mid-turn; truncating it would split a pair, so the engine leaves it
//! untouched rather than failing.

use crate::message::{ChatMessage, Role};
use thiserror::Error;

/// Errors from a structurally invalid truncation request
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TruncateError {
    /// The message log is empty
    #[error("No messages found")]
    EmptyHistory,

    /// The requested pair count is out of range
    #[error("{0}")]
    InvalidCount(String),

    /// The log does not consist of strict human/AI pairs
    #[error("The messages list does not consist of an even number of 'human' and 'ai' messages")]
    MalformedHistory,
}

const COUNT_TOO_LARGE: &str =
    "Amount of message sets to delete is greater than the amount of messages in the conversation";
const COUNT_NOT_POSITIVE: &str = "Amount of messages to delete must be greater than 0";

/// Removes `pairs` human/AI exchanges from the tail of a message log
///
/// Returns the remaining messages. If the last message is not an AI message
/// the log is mid-turn and is returned unchanged.
///
/// # Errors
///
/// * [`TruncateError::EmptyHistory`] when the log is empty
/// * [`TruncateError::InvalidCount`] when `pairs <= 0` or `pairs * 2`
///   exceeds the log length
/// * [`TruncateError::MalformedHistory`] when the log length is odd
///
/// # Examples
///
/// ```
/// use parley::history::truncate::truncate_pairs;
/// use parley::message::ChatMessage;
///
/// let log = vec![
///     ChatMessage::human("q1"),
///     ChatMessage::ai("a1"),
///     ChatMessage::human("q2"),
///     ChatMessage::ai("a2"),
/// ];
/// let remaining = truncate_pairs(&log, 1).unwrap();
/// assert_eq!(remaining.len(), 2);
/// ```
pub fn truncate_pairs(
    messages: &[ChatMessage],
    pairs: i64,
) -> Result<Vec<ChatMessage>, TruncateError> {
    if messages.is_empty() {
        return Err(TruncateError::EmptyHistory);
    }

    // One set is "human" + "ai".
    let to_delete = pairs.saturating_mul(2);

    if to_delete > messages.len() as i64 {
        return Err(TruncateError::InvalidCount(COUNT_TOO_LARGE.to_string()));
    }

    if pairs <= 0 {
        return Err(TruncateError::InvalidCount(COUNT_NOT_POSITIVE.to_string()));
    }

    if messages.len() % 2 != 0 {
        return Err(TruncateError::MalformedHistory);
    }

    if messages.last().map(|m| m.role) == Some(Role::Ai) {
        return Ok(messages[..messages.len() - to_delete as usize].to_vec());
    }

    // Mid-turn log: deliberately a no-op, not an error.
    Ok(messages.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exchanges(n: usize) -> Vec<ChatMessage> {
        let mut log = Vec::new();
        for i in 0..n {
            log.push(ChatMessage::human(format!("question {i}")));
            log.push(ChatMessage::ai(format!("answer {i}")));
        }
        log
    }

    #[test]
    fn test_empty_history() {
        assert_eq!(truncate_pairs(&[], 1), Err(TruncateError::EmptyHistory));
    }

    #[test]
    fn test_zero_count() {
        let log = exchanges(1);
        assert!(matches!(
            truncate_pairs(&log, 0),
            Err(TruncateError::InvalidCount(_))
        ));
    }

    #[test]
    fn test_negative_count() {
        let log = exchanges(2);
        assert!(matches!(
            truncate_pairs(&log, -3),
            Err(TruncateError::InvalidCount(_))
        ));
    }

    #[test]
    fn test_count_exceeds_pairs_present() {
        let log = exchanges(2);
        assert!(matches!(
            truncate_pairs(&log, 5),
            Err(TruncateError::InvalidCount(_))
        ));
    }

    #[test]
    fn test_odd_length_is_malformed() {
        let log = vec![
            ChatMessage::human("q1"),
            ChatMessage::ai("a1"),
            ChatMessage::human("q2"),
        ];
        assert_eq!(
            truncate_pairs(&log, 1),
            Err(TruncateError::MalformedHistory)
        );
    }

    #[test]
    fn test_removes_pairs_from_tail() {
        let log = exchanges(3);
        let remaining = truncate_pairs(&log, 2).unwrap();
        assert_eq!(remaining.len(), 2);
        assert_eq!(remaining, &log[..2]);
    }

    #[test]
    fn test_length_property_for_valid_requests() {
        for n in 1..=6usize {
            let log = exchanges(n);
            for pairs in 1..=n as i64 {
                let remaining = truncate_pairs(&log, pairs).unwrap();
                assert_eq!(remaining.len(), log.len() - 2 * pairs as usize);
            }
        }
    }

    #[test]
    fn test_non_ai_tail_is_noop() {
        // Even-length log ending in a human message: caught mid-turn.
        let log = vec![
            ChatMessage::ai("unsolicited"),
            ChatMessage::human("q1"),
            ChatMessage::ai("a1"),
            ChatMessage::human("pending"),
        ];
        let remaining = truncate_pairs(&log, 1).unwrap();
        assert_eq!(remaining, log);
        let remaining = truncate_pairs(&log, 2).unwrap();
        assert_eq!(remaining, log);
    }

    #[test]
    fn test_removing_all_pairs_leaves_empty_log() {
        let log = exchanges(2);
        let remaining = truncate_pairs(&log, 2).unwrap();
        assert!(remaining.is_empty());
    }

    #[test]
    fn test_input_is_untouched() {
        let log = exchanges(2);
        let before = log.clone();
        let _ = truncate_pairs(&log, 1).unwrap();
        assert_eq!(log, before);
    }
}
