use std::borrow::Cow;

/// Parsing errors. The only variant is `Partial`, returned once the input is
/// exhausted; the `de` module treats it as end-of-stream rather than a hard
/// failure.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Error {
    Partial,
}

/// Arguments that follow a directive name on a single line.
#[derive(Debug, Clone, PartialEq)]
pub enum Args<'a> {
    None,
    Single(Cow<'a, str>),
    Multiple(Vec<Cow<'a, str>>),
}

/// One `name arg1 arg2 ...` line.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigValue<'a> {
    pub name: Cow<'a, str>,
    pub args: Args<'a>,
}

/// Parse the next directive out of `input`, returning the unconsumed tail.
///
/// Blank lines and `#`-comments are skipped. Arguments may be single- or
/// double-quoted to preserve embedded whitespace or spell out an empty
/// string (`logfile ''`).
pub fn parse(input: &[u8]) -> Result<(&[u8], ConfigValue<'_>), Error> {
    let text = std::str::from_utf8(input).map_err(|_| Error::Partial)?;
    let mut rest = text;
    loop {
        rest = rest.trim_start_matches(|c: char| c == '\r' || c == '\n' || c == ' ' || c == '\t');
        if rest.is_empty() {
            return Err(Error::Partial);
        }

        let line_end = rest.find('\n').unwrap_or_else(|| rest.len());
        let line = &rest[..line_end];
        let next = &rest[line_end..];

        let trimmed = strip_comment(line.trim_end_matches('\r')).trim();
        if trimmed.is_empty() {
            rest = next;
            continue;
        }

        let mut tokens = tokenize(trimmed).into_iter();
        let name = match tokens.next() {
            Some(name) => name,
            None => {
                rest = next;
                continue;
            }
        };
        let args: Vec<Cow<str>> = tokens.collect();
        let args = match args.len() {
            0 => Args::None,
            1 => Args::Single(args.into_iter().next().unwrap()),
            _ => Args::Multiple(args),
        };

        return Ok((next.as_bytes(), ConfigValue { name, args }));
    }
}

/// Cut a line at the first `#` that isn't inside a quoted argument.
fn strip_comment(line: &str) -> &str {
    let mut in_single = false;
    let mut in_double = false;
    for (i, c) in line.char_indices() {
        match c {
            '\'' if !in_double => in_single = !in_single,
            '"' if !in_single => in_double = !in_double,
            '#' if !in_single && !in_double => return &line[..i],
            _ => {}
        }
    }
    line
}

/// Split a line into whitespace-separated tokens, honoring quoted spans.
fn tokenize(line: &str) -> Vec<Cow<'_, str>> {
    let bytes = line.as_bytes();
    let len = bytes.len();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < len {
        while i < len && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= len {
            break;
        }
        if bytes[i] == b'\'' || bytes[i] == b'"' {
            let quote = bytes[i];
            i += 1;
            let start = i;
            while i < len && bytes[i] != quote {
                i += 1;
            }
            tokens.push(Cow::Borrowed(&line[start..i]));
            if i < len {
                i += 1;
            }
        } else {
            let start = i;
            while i < len && !bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            tokens.push(Cow::Borrowed(&line[start..i]));
        }
    }

    tokens
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn skips_blank_lines_and_comments() {
        let (rest, value) = parse(b"\n  # just a comment\nport 1234\n").unwrap();
        assert_eq!(value.name, "port");
        assert_eq!(value.args, Args::Single(Cow::Borrowed("1234")));
        assert_eq!(parse(rest), Err(Error::Partial));
    }

    #[test]
    fn multiple_args() {
        let (_, value) = parse(b"save 60 10000\n").unwrap();
        assert_eq!(value.name, "save");
        match value.args {
            Args::Multiple(ref args) => assert_eq!(args, &["60", "10000"]),
            _ => panic!("expected multiple args"),
        }
    }

    #[test]
    fn quoted_empty_string() {
        let (_, value) = parse(b"logfile ''\n").unwrap();
        assert_eq!(value.args, Args::Single(Cow::Borrowed("")));
    }

    #[test]
    fn inline_comment_after_value() {
        let (_, value) = parse(b"always-show-logo yes # comment\n").unwrap();
        assert_eq!(value.name, "always-show-logo");
        assert_eq!(value.args, Args::Single(Cow::Borrowed("yes")));
    }

    #[test]
    fn exhausted_input_is_partial() {
        assert_eq!(parse(b""), Err(Error::Partial));
        assert_eq!(parse(b"   \n  \n"), Err(Error::Partial));
    }
}
