//! Line scanner
//!
//! Turns script text into typed lines. The first non-whitespace sigil of a
//! physical line decides its kind:
//! - `#` comment, must be alone on its line
//! - `$` command, optionally prefixed by the expected exit code (`1$ false`)
//! - `<` stdin data
//! - `>` stdout data, `2>` stderr data
//! - whitespace only: blank
//!
//! Adjacent lines of the same kind are merged into one logical line, so
//! `"# a\n# b"` scans to a single comment. Commands never merge.
//!
//! Lines end at `\n` only. A carriage return before it is part of the
//! content of a data line and ignored everywhere else.

use crate::ast::Stream;
use crate::error::ParseError;

/// A logical script line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    Blank { count: usize },
    Comment { content: String },
    Command { cmd: String, exit_code: i32 },
    Data { stream: Stream, content: String },
}

impl Line {
    /// Merge `next` into this line. Gives `next` back when the two lines
    /// cannot be merged.
    pub fn merge(&mut self, next: Line) -> Result<(), Line> {
        match (self, next) {
            (Line::Blank { count }, Line::Blank { count: more }) => {
                *count += more;
                Ok(())
            }
            (Line::Comment { content }, Line::Comment { content: more }) => {
                content.push('\n');
                content.push_str(&more);
                Ok(())
            }
            (Line::Data { stream, content }, Line::Data { stream: other, content: more })
                if *stream == other =>
            {
                content.push_str(&more);
                Ok(())
            }
            (_, next) => Err(next),
        }
    }
}

/// A logical line with the number of the physical line it starts on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedLine {
    /// 1-based
    pub number: usize,
    pub line: Line,
}

/// Scan script text into merged logical lines.
pub fn scan(text: &str) -> Result<Vec<ScannedLine>, ParseError> {
    let mut lines = Vec::new();
    let mut current: Option<ScannedLine> = None;

    for (i, raw) in physical_lines(text).enumerate() {
        let number = i + 1;
        let line = classify(raw).map_err(|e| e.at_line(number))?;

        current = match current.take() {
            None => Some(ScannedLine { number, line }),
            Some(mut cur) => match cur.line.merge(line) {
                Ok(()) => Some(cur),
                Err(line) => {
                    lines.push(cur);
                    Some(ScannedLine { number, line })
                }
            },
        };
    }
    lines.extend(current);

    Ok(lines)
}

fn physical_lines(text: &str) -> impl Iterator<Item = &str> {
    let body = (!text.is_empty()).then(|| text.strip_suffix('\n').unwrap_or(text));
    body.into_iter().flat_map(|body| body.split('\n'))
}

/// Classify a single physical line.
pub fn classify(raw: &str) -> Result<Line, ParseError> {
    if raw.trim().is_empty() {
        return Ok(Line::Blank { count: 1 });
    }

    // Whitespace is skipped anywhere before the sigil.
    let mut prefix = String::new();
    for (i, c) in raw.char_indices() {
        if c.is_whitespace() {
            continue;
        }
        let rest = &raw[i + c.len_utf8()..];
        match c {
            '#' => return parse_comment(&prefix, rest),
            '$' => return parse_command(&prefix, rest),
            '<' => return parse_input(&prefix, rest),
            '>' => return parse_output(&prefix, rest),
            _ => prefix.push(c),
        }
    }

    Err(ParseError::syntax(format!("unexpected statement: `{}`", raw.trim_end_matches('\r'))))
}

fn parse_comment(prefix: &str, rest: &str) -> Result<Line, ParseError> {
    if !prefix.is_empty() {
        return Err(ParseError::syntax("a comment must start on its own line"));
    }
    Ok(Line::Comment { content: rest.trim().to_string() })
}

fn parse_command(prefix: &str, rest: &str) -> Result<Line, ParseError> {
    let exit_code = if prefix.is_empty() {
        0
    } else {
        prefix.parse::<i32>().map_err(|_| {
            ParseError::syntax(format!("invalid command prefix: `{}`", prefix))
        })?
    };

    let cmd = rest.trim();
    if cmd.is_empty() {
        return Err(ParseError::syntax("unexpected empty command"));
    }

    Ok(Line::Command { cmd: cmd.to_string(), exit_code })
}

fn parse_input(prefix: &str, rest: &str) -> Result<Line, ParseError> {
    if !prefix.is_empty() {
        return Err(ParseError::syntax(format!("invalid data prefix: `{}`", prefix)));
    }
    Ok(parse_data(Stream::Stdin, rest))
}

fn parse_output(prefix: &str, rest: &str) -> Result<Line, ParseError> {
    let stream = match prefix {
        "" => Stream::Stdout,
        "2" => Stream::Stderr,
        _ => return Err(ParseError::syntax(format!("invalid data prefix: `{}`", prefix))),
    };
    Ok(parse_data(stream, rest))
}

/// Data content is kept verbatim. A trailing `\` marks content without a
/// final newline.
fn parse_data(stream: Stream, rest: &str) -> Line {
    let content = match rest.strip_suffix('\\') {
        Some(content) => content.to_string(),
        None => format!("{}\n", rest),
    };
    Line::Data { stream, content }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn lines(text: &str) -> Vec<Line> {
        scan(text).unwrap().into_iter().map(|l| l.line).collect()
    }

    fn scan_err(text: &str) -> ParseError {
        scan(text).unwrap_err()
    }

    fn data(stream: Stream, content: &str) -> Line {
        Line::Data { stream, content: content.into() }
    }

    #[test]
    fn test_scan_empty() {
        assert!(lines("").is_empty());
        assert_eq!(lines("   \n  \n"), vec![Line::Blank { count: 2 }]);
    }

    #[test]
    fn test_scan_comment() {
        assert_eq!(lines("# Comment on one line"), vec![
            Line::Comment { content: "Comment on one line".into() },
        ]);
        assert_eq!(lines("#"), vec![Line::Comment { content: "".into() }]);
    }

    #[test]
    fn test_scan_merges_comments() {
        assert_eq!(lines("# a\n# b\n"), vec![Line::Comment { content: "a\nb".into() }]);
        assert_eq!(lines("# Comment written \n   #on several\n#   lines "), vec![
            Line::Comment { content: "Comment written\non several\nlines".into() },
        ]);
    }

    #[test]
    fn test_scan_comment_must_be_alone() {
        let err = scan_err("$ echo\nfoo # bar");
        assert_eq!(err.message, "a comment must start on its own line");
        assert_eq!(err.line, Some(2));
    }

    #[test]
    fn test_scan_command() {
        assert_eq!(lines("$  echo 'hello world' "), vec![
            Line::Command { cmd: "echo 'hello world'".into(), exit_code: 0 },
        ]);
    }

    #[test]
    fn test_scan_command_exit_code() {
        assert_eq!(lines("1$ false"), vec![Line::Command { cmd: "false".into(), exit_code: 1 }]);
        assert_eq!(lines("  42 $ exit 42"), vec![
            Line::Command { cmd: "exit 42".into(), exit_code: 42 },
        ]);
    }

    #[test]
    fn test_scan_commands_never_merge() {
        assert_eq!(lines("$ a\n  $b c\n"), vec![
            Line::Command { cmd: "a".into(), exit_code: 0 },
            Line::Command { cmd: "b c".into(), exit_code: 0 },
        ]);
    }

    #[test]
    fn test_scan_invalid_command_prefix() {
        let err = scan_err("echo $HOME");
        assert_eq!(err.message, "invalid command prefix: `echo`");
        assert_eq!(err.kind, ErrorKind::SyntaxError);
    }

    #[test]
    fn test_scan_empty_command() {
        let err = scan_err("$   ");
        assert_eq!(err.to_string(), "line 1: unexpected empty command");
    }

    #[test]
    fn test_scan_stdin() {
        assert_eq!(lines(" <  Input sent to the program "), vec![
            data(Stream::Stdin, "  Input sent to the program \n"),
        ]);
        assert_eq!(lines("\t<"), vec![data(Stream::Stdin, "\n")]);
    }

    #[test]
    fn test_scan_merges_data_of_same_stream() {
        let text = "\t>  Output from a program \n>\t\n> which spans\n>several lines    \n\n>Another one\n";
        assert_eq!(lines(text), vec![
            data(Stream::Stdout, "  Output from a program \n\t\n which spans\nseveral lines    \n"),
            Line::Blank { count: 1 },
            data(Stream::Stdout, "Another one\n"),
        ]);
    }

    #[test]
    fn test_scan_does_not_merge_different_streams() {
        assert_eq!(lines(">out\n2>err\n<in\n"), vec![
            data(Stream::Stdout, "out\n"),
            data(Stream::Stderr, "err\n"),
            data(Stream::Stdin, "in\n"),
        ]);
    }

    #[test]
    fn test_scan_fd_disambiguation() {
        assert_eq!(lines(">out"), vec![data(Stream::Stdout, "out\n")]);
        assert_eq!(lines("2>err"), vec![data(Stream::Stderr, "err\n")]);
        assert_eq!(scan_err("1>out").message, "invalid data prefix: `1`");
        assert_eq!(scan_err("x<in").message, "invalid data prefix: `x`");
    }

    #[test]
    fn test_scan_trailing_backslash_suppresses_newline() {
        assert_eq!(lines(">no newline\\"), vec![data(Stream::Stdout, "no newline")]);
        assert_eq!(lines(">a\n>b\\\n"), vec![data(Stream::Stdout, "a\nb")]);
        assert_eq!(lines(">\\"), vec![data(Stream::Stdout, "")]);
    }

    #[test]
    fn test_scan_keeps_carriage_returns_in_data() {
        assert_eq!(lines("$ printf 'a\\r\\n'\r\n>a\r\n# note\r\n"), vec![
            Line::Command { cmd: "printf 'a\\r\\n'".into(), exit_code: 0 },
            data(Stream::Stdout, "a\r\n"),
            Line::Comment { content: "note".into() },
        ]);
        assert_eq!(lines("\r\n\r\n"), vec![Line::Blank { count: 2 }]);
    }

    #[test]
    fn test_scan_unexpected_statement() {
        let err = scan_err("$ ok\n\nplain text");
        assert_eq!(err.message, "unexpected statement: `plain text`");
        assert_eq!(err.line, Some(3));
    }

    #[test]
    fn test_scan_line_numbers() {
        let scanned = scan("# a\n# b\n$ cmd\n>x\n>y\n").unwrap();
        let numbers: Vec<usize> = scanned.iter().map(|l| l.number).collect();
        assert_eq!(numbers, vec![1, 3, 4]);
    }
}
