/// Output with trailing whitespace stripped from every line and trailing
/// blank lines dropped
pub fn normalize_output(output: &str) -> String {
    let lines: Vec<&str> = output.lines().map(str::trim_end).collect();
    let end = lines
        .iter()
        .rposition(|line| !line.is_empty())
        .map_or(0, |i| i + 1);
    lines[..end].join("\n")
}

/// Compare program output against the expected output, ignoring trailing whitespace
pub fn outputs_match(actual: &str, expected: &str) -> bool {
    normalize_output(actual) == normalize_output(expected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_whitespace_ignored() {
        assert!(outputs_match("1 2 3  \n4\n\n\n", "1 2 3\n4"));
        assert!(outputs_match("a\r\nb\r\n", "a\nb\n"));
        assert!(outputs_match("", "\n\n"));
    }

    #[test]
    fn test_content_differences_detected() {
        assert!(!outputs_match("1 2 3\n", "1 2  3\n"));
        assert!(!outputs_match("a\n\nb\n", "a\nb\n"));
        assert!(!outputs_match(" a\n", "a\n"));
    }
}
