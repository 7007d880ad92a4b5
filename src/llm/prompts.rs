use crate::stages::BreakLimits;

/// System prompt for line splitting
pub const SPLIT_SYSTEM_PROMPT: &str =
    "Provide only the requested text without commentary or special formatting.";

/// Build the user prompt asking for a two-line split of `text`
pub fn build_split_prompt(text: &str, limits: &BreakLimits) -> String {
    let mut prompt = String::new();
    prompt.push_str(
        "Split the following subtitle text into two lines at a logical point \
         without modifications to the text or punctuation.\n",
    );
    prompt.push_str(&format!(
        "Aim for lines of about {} characters; neither line should exceed {}.\n",
        limits.soft_max_chars, limits.hard_max_chars
    ));
    prompt.push_str("Reply with exactly two lines.\n\n");
    prompt.push_str(text.trim());
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_carries_text_and_limits() {
        let limits = BreakLimits {
            soft_max_chars: 20,
            hard_max_chars: 50,
        };
        let prompt = build_split_prompt("  some long line of text  ", &limits);

        assert!(prompt.ends_with("some long line of text"));
        assert!(prompt.contains("about 20 characters"));
        assert!(prompt.contains("exceed 50"));
    }
}
