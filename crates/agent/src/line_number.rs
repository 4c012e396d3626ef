//! Line-number prefixes for code shown to (and quoted back by) the model.
//!
//! `add_line_numbers` renders `"  7 | code"`; `remove_line_numbers` strips
//! such a prefix from every line that carries one, so quoting code with or
//! without numbers is equally accepted.

use regex::Regex;
use std::sync::LazyLock;

/// Separator between the number column and the code.
pub const SEPARATOR: &str = " | ";

static LINE_NUMBER_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\d+\s*\|\s").expect("line number pattern is valid"));

/// Prefix every line with its 1-based number, right-aligned to the width of
/// the largest number.
pub fn add_line_numbers(text: &str) -> String {
    let lines: Vec<&str> = text.split('\n').collect();
    let width = lines.len().ilog10() as usize + 1;
    lines
        .iter()
        .enumerate()
        .map(|(i, line)| format!("{:>width$}{SEPARATOR}{line}", i + 1))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Strip a line-number prefix from each line; lines without one are kept.
pub fn remove_line_numbers(text: &str) -> String {
    text.split('\n')
        .map(|line| LINE_NUMBER_PREFIX.replace(line, ""))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pads_to_widest_number() {
        let text = (1..=10).map(|i| format!("l{i}")).collect::<Vec<_>>().join("\n");
        let numbered = add_line_numbers(&text);
        let lines: Vec<&str> = numbered.lines().collect();
        assert_eq!(lines[0], " 1 | l1");
        assert_eq!(lines[9], "10 | l10");
    }

    #[test]
    fn single_line_and_empty_text() {
        assert_eq!(add_line_numbers("x"), "1 | x");
        assert_eq!(add_line_numbers(""), "1 | ");
        assert_eq!(remove_line_numbers("1 | "), "");
    }

    #[test]
    fn remove_is_line_by_line() {
        let quoted = "  4 |     let a = 1;\nlet b = 2;\n 6 | }";
        assert_eq!(remove_line_numbers(quoted), "    let a = 1;\nlet b = 2;\n}");
    }

    #[test]
    fn remove_keeps_code_that_merely_contains_pipes() {
        let code = "let x = a || b;\nmatch y { 1 | 2 => {} }";
        assert_eq!(remove_line_numbers(code), code);
    }

    #[test]
    fn round_trip_preserves_text() {
        let long = "x\n".repeat(120);
        let samples: [&str; 5] = [
            "fn main() {\n    println!(\"hi\");\n}\n",
            "",
            "\n\n",
            "\tindented\n  spaced  \n",
            &long,
        ];
        for sample in samples {
            assert_eq!(remove_line_numbers(&add_line_numbers(sample)), sample);
        }
    }
}
