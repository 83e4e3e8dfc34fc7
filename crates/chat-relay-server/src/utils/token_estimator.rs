/// Word-based token estimate, used when the BPE encoder is unavailable.
/// Rule: mixed-language prose averages ~1.3 tokens per word.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }

    let words = text.split_whitespace().count();

    // Small overhead for formatting
    ((words as f64 * 1.3) + 5.0).ceil() as usize
}
