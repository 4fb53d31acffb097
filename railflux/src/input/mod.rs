//! Static configuration and train position input.

pub mod topology;
pub mod signals;
pub mod feed;

use regex::Regex;

#[derive(Debug, Fail)]
pub enum ParseError {
    #[fail(display = "error in regular expression: {}", _0)]
    RegexError(String),
    #[fail(display = "error converting number on line {}: {}", _0, _1)]
    NumberError(usize, String),
    #[fail(display = "unrecognized line {}: {}", _0, _1)]
    Unrecognized(usize, String),
    #[fail(display = "duplicate {} \"{}\"", _0, _1)]
    Duplicate(&'static str, String),
    #[fail(display = "signal \"{}\" monitors no segments", _0)]
    NoSegments(String),
}

pub(crate) fn regex(re: &str) -> Result<Regex, ParseError> {
    Regex::new(re).map_err(|e| ParseError::RegexError(format!("{:?}", e)))
}

// A `#` inside double quotes does not start a comment.
fn strip_comment(line: &str) -> &str {
    let mut quoted = false;
    for (i, c) in line.char_indices() {
        match c {
            '"' => quoted = !quoted,
            '#' if !quoted => return &line[..i],
            _ => {},
        }
    }
    line
}

/// Non-blank lines with `#` comments removed, numbered from 1.
pub(crate) fn content_lines<'a>(input: &'a str) -> impl Iterator<Item = (usize, &'a str)> + 'a {
    input.lines()
        .enumerate()
        .map(|(i, line)| (i + 1, strip_comment(line).trim()))
        .filter(|&(_, line)| !line.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comments() {
        let lines: Vec<_> = content_lines("# header\n\ntrack T1 S1 # trailing\nsignal 1 \"Starter #1\" # x").collect();
        assert_eq!(lines, vec![(3, "track T1 S1"), (4, "signal 1 \"Starter #1\"")]);
    }
}
