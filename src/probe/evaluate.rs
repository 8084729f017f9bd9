//! Success decision for a completed HTTP response.

use regex::Regex;

/// Decide whether a response satisfies the endpoint's expectations.
///
/// A configured regex that does not match the body always fails the
/// response. Past that, an explicit status code must equal the actual one;
/// with no expectations at all only a 200 counts.
pub fn evaluate(
    expected_status: Option<u16>,
    response_regex: Option<&Regex>,
    actual_status: u16,
    body: &str,
) -> bool {
    if let Some(re) = response_regex {
        if !re.is_match(body) {
            return false;
        }
    }

    match (expected_status, response_regex) {
        (None, None) => actual_status == 200,
        (None, Some(_)) => true,
        (Some(expected), _) => actual_status == expected,
    }
}
