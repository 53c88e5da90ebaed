//! Letter-coded field extraction
//!
//! Slicer output is read one line at a time. A field is a letter followed
//! directly by a number (`X10.5`, `E-2`, `M117`). Only the code part of a line
//! counts: a letter whose first occurrence sits inside a `;` comment is
//! treated as absent. Fields that fail to parse are absent as well, so every
//! function here is total over arbitrary input.

use regex::Regex;
use std::sync::OnceLock;

use gcodepost_core::{LAYER_SENTINEL, TIME_ELAPSED_SENTINEL};

fn number_regex() -> &'static Regex {
    static NUMBER_REGEX: OnceLock<Regex> = OnceLock::new();
    NUMBER_REGEX
        .get_or_init(|| Regex::new(r"^-?[0-9]+\.?[0-9]*").expect("invalid regex pattern"))
}

/// Split a line into its code part and its trailing comment (with the `;`)
pub fn split_comment(line: &str) -> (&str, &str) {
    match line.find(';') {
        Some(pos) => line.split_at(pos),
        None => (line, ""),
    }
}

/// Byte range of the number following the first `letter` in the code part
fn field_span(line: &str, letter: char) -> Option<(usize, usize)> {
    let (code, _) = split_comment(line);
    let start = code.find(letter)? + letter.len_utf8();
    let found = number_regex().find(&code[start..])?;
    Some((start, start + found.end()))
}

/// Numeric value following `letter`, if present
///
/// ```
/// use gcodepost_processing::gcode::fields::field_value;
///
/// assert_eq!(field_value("G1 X10 E2.5 ; wipe", 'E'), Some(2.5));
/// assert_eq!(field_value("G1 X10 ; E2.5", 'E'), None);
/// ```
pub fn field_value(line: &str, letter: char) -> Option<f64> {
    let (start, end) = field_span(line, letter)?;
    line[start..end].trim_end_matches('.').parse::<f64>().ok()
}

/// Numeric value following `letter`, or `default` when absent
pub fn field_value_or(line: &str, letter: char, default: f64) -> f64 {
    field_value(line, letter).unwrap_or(default)
}

/// Integral command code following `letter` (`G1` gives 1, `M117` gives 117)
pub fn command_code(line: &str, letter: char) -> Option<u32> {
    let value = field_value(line, letter)?;
    if value >= 0.0 && value.fract() == 0.0 && value <= u32::MAX as f64 {
        Some(value as u32)
    } else {
        None
    }
}

/// Check whether the line carries `letter` with one of the given codes
pub fn has_code(line: &str, letter: char, codes: &[u32]) -> bool {
    command_code(line, letter).is_some_and(|code| codes.contains(&code))
}

/// Rewrite the value of a field, appending the field when it is missing
///
/// The trailing comment and the spacing of untouched fields are preserved.
pub fn replace_field(line: &str, letter: char, value: &str) -> String {
    if let Some((start, end)) = field_span(line, letter) {
        return format!("{}{}{}", &line[..start], value, &line[end..]);
    }

    let (code, comment) = split_comment(line);
    let trimmed = code.trim_end();
    let padding = &code[trimmed.len()..];
    if comment.is_empty() {
        format!("{} {}{}{}", trimmed, letter, value, padding)
    } else if padding.is_empty() {
        format!("{} {}{} {}", trimmed, letter, value, comment)
    } else {
        format!("{} {}{}{}{}", trimmed, letter, value, padding, comment)
    }
}

/// Layer ordinal carried by a `;LAYER:<n>` sentinel line
pub fn layer_number(line: &str) -> Option<i32> {
    line.strip_prefix(LAYER_SENTINEL)?.trim().parse().ok()
}

/// Cumulative print time carried by a `;TIME_ELAPSED:<t>` sentinel line
pub fn time_elapsed(line: &str) -> Option<f64> {
    let pos = line.find(TIME_ELAPSED_SENTINEL)?;
    line[pos + TIME_ELAPSED_SENTINEL.len()..]
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|t| t.is_finite())
}

/// First time checkpoint reported inside a layer block
pub fn block_time_elapsed(block: &str) -> Option<f64> {
    block.split('\n').find_map(time_elapsed)
}

/// `"\r"` when the block uses CRLF line endings, empty otherwise
///
/// Appended to inserted lines so they match the surrounding text once the
/// block is split and rejoined on `\n`.
pub fn carriage_return(block: &str) -> &'static str {
    if block.contains("\r\n") {
        "\r"
    } else {
        ""
    }
}

/// First layer ordinal reported inside a layer block
pub fn block_layer_number(block: &str) -> Option<i32> {
    block.split('\n').find_map(layer_number)
}
