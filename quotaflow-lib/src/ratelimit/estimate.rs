/// Smallest estimate returned for any call
const MIN_ESTIMATE: usize = 256;

/// Fixed overhead of instructions sent with every call
const PROMPT_OVERHEAD: usize = 200;

/// Added for every attached page image
const IMAGE_OVERHEAD: usize = 200;

/// Rough token cost of a call that produces about `chars` characters of
/// CJK-heavy output with `images` page images attached.
///
/// Two characters count as one token. The estimate only needs to be good
/// enough to keep the tokens/minute window honest.
///
/// ```
/// use quotaflow_lib::ratelimit::estimate_tokens;
///
/// assert_eq!(estimate_tokens(1_200, 0), 800);
/// assert_eq!(estimate_tokens(1_200, 3), 1_400);
/// ```
#[must_use]
pub fn estimate_tokens(chars: usize, images: usize) -> i64 {
    let text = (chars / 2 + PROMPT_OVERHEAD).max(MIN_ESTIMATE);
    let total = text.saturating_add(images.saturating_mul(IMAGE_OVERHEAD));
    i64::try_from(total).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, 0, 256)]
    #[case(100, 0, 256)]
    #[case(1_200, 0, 800)]
    #[case(1_200, 1, 1_000)]
    #[case(0, 2, 656)]
    fn test_estimate_tokens(#[case] chars: usize, #[case] images: usize, #[case] expected: i64) {
        assert_eq!(estimate_tokens(chars, images), expected);
    }
}
