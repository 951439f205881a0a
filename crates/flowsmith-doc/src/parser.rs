use serde_json::{Map, Number, Value};
use winnow::ascii::{digit1, multispace0};
use winnow::combinator::{cut_err, opt};
use winnow::error::{ContextError, ErrMode, StrContext, StrContextValue};
use winnow::token::{any, literal, one_of, take_while};
use winnow::{ModalResult, Parser};

fn make_cut_error(desc: &'static str) -> ErrMode<ContextError<StrContext>> {
    let mut e = ContextError::new();
    e.push(StrContext::Expected(StrContextValue::Description(desc)));
    ErrMode::Cut(e)
}

/// Arrays and objects may nest this deep; matches serde_json.
const MAX_DEPTH: usize = 128;

fn expected(desc: &'static str) -> StrContext {
    StrContext::Expected(StrContextValue::Description(desc))
}

/// Blank out `//` line comments and `/* */` block comments.
///
/// Comment characters are replaced by spaces of the same byte width so that
/// offsets into the result are offsets into the original text.
pub(crate) fn blank_comments(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    fn blank(out: &mut String, c: char) {
        if c == '\n' {
            out.push('\n');
        } else {
            for _ in 0..c.len_utf8() {
                out.push(' ');
            }
        }
    }

    while let Some(c) = chars.next() {
        match c {
            '/' if chars.peek() == Some(&'/') => {
                out.push_str("  ");
                chars.next();
                while let Some(&n) = chars.peek() {
                    if n == '\n' {
                        break;
                    }
                    blank(&mut out, n);
                    chars.next();
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                out.push_str("  ");
                chars.next();
                let mut prev = '\0';
                for n in chars.by_ref() {
                    blank(&mut out, n);
                    if prev == '*' && n == '/' {
                        break;
                    }
                    prev = n;
                }
            }
            '"' => {
                out.push('"');
                while let Some(n) = chars.next() {
                    out.push(n);
                    if n == '\\' {
                        if let Some(esc) = chars.next() {
                            out.push(esc);
                        }
                    } else if n == '"' {
                        break;
                    }
                }
            }
            other => out.push(other),
        }
    }
    out
}

fn ws<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    multispace0.parse_next(input)
}

/// A single punctuation character.
fn punct<'i>(c: char) -> impl Parser<&'i str, char, ErrMode<ContextError>> {
    c
}

fn next_char(input: &mut &str) -> ModalResult<char> {
    any.parse_next(input)
}

fn keyword<'i>(word: &'static str) -> impl Parser<&'i str, &'i str, ErrMode<ContextError>> {
    literal(word)
}

fn hex_digits<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    cut_err(take_while(4, |c: char| c.is_ascii_hexdigit()))
        .context(expected("four hex digits"))
        .parse_next(input)
}

fn hex4(input: &mut &str) -> ModalResult<u32> {
    let digits = hex_digits.parse_next(input)?;
    u32::from_str_radix(digits, 16).map_err(|_| make_cut_error("four hex digits"))
}

/// Parse a double-quoted JSON string with escape support.
fn quoted_string(input: &mut &str) -> ModalResult<String> {
    let _ = punct('"').parse_next(input)?;
    let mut s = String::new();
    loop {
        let c = cut_err(next_char)
            .context(expected("closing quote"))
            .parse_next(input)?;
        match c {
            '"' => break,
            '\\' => {
                let esc = cut_err(next_char)
                    .context(expected("escape sequence"))
                    .parse_next(input)?;
                match esc {
                    '"' => s.push('"'),
                    '\\' => s.push('\\'),
                    '/' => s.push('/'),
                    'b' => s.push('\u{8}'),
                    'f' => s.push('\u{c}'),
                    'n' => s.push('\n'),
                    'r' => s.push('\r'),
                    't' => s.push('\t'),
                    'u' => {
                        let high = hex4(input)?;
                        let code = if (0xD800..0xDC00).contains(&high) {
                            let _ = cut_err(keyword("\\u"))
                                .context(expected("low surrogate"))
                                .parse_next(input)?;
                            let low = hex4(input)?;
                            if !(0xDC00..0xE000).contains(&low) {
                                return Err(make_cut_error("low surrogate"));
                            }
                            0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00)
                        } else {
                            high
                        };
                        s.push(char::from_u32(code).unwrap_or('\u{FFFD}'));
                    }
                    _ => return Err(make_cut_error("valid escape sequence")),
                }
            }
            other => s.push(other),
        }
    }
    Ok(s)
}

fn number_lexeme<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    (
        opt('-'),
        digit1,
        opt(('.', digit1)),
        opt((one_of(['e', 'E']), opt(one_of(['+', '-'])), digit1)),
    )
        .take()
        .parse_next(input)
}

/// Parse a JSON number, keeping its exact textual value.
fn number(input: &mut &str) -> ModalResult<Number> {
    let lexeme = number_lexeme.parse_next(input)?;
    lexeme
        .parse::<Number>()
        .map_err(|_| make_cut_error("number"))
}

fn enter(depth: usize) -> ModalResult<usize> {
    if depth >= MAX_DEPTH {
        return Err(make_cut_error("at most 128 levels of nesting"));
    }
    Ok(depth + 1)
}

fn array(input: &mut &str, depth: usize) -> ModalResult<Vec<Value>> {
    let depth = enter(depth)?;
    let _ = punct('[').parse_next(input)?;
    let mut items = Vec::new();
    loop {
        let _ = ws.parse_next(input)?;
        // an immediate ']' also accepts a trailing comma
        if opt(punct(']')).parse_next(input)?.is_some() {
            return Ok(items);
        }
        items.push(json_value(input, depth)?);
        let _ = ws.parse_next(input)?;
        if opt(punct(',')).parse_next(input)?.is_some() {
            continue;
        }
        let _ = cut_err(punct(']'))
            .context(expected("',' or ']'"))
            .parse_next(input)?;
        return Ok(items);
    }
}

fn object(input: &mut &str, depth: usize) -> ModalResult<Map<String, Value>> {
    let depth = enter(depth)?;
    let _ = punct('{').parse_next(input)?;
    let mut map = Map::new();
    loop {
        let _ = ws.parse_next(input)?;
        if opt(punct('}')).parse_next(input)?.is_some() {
            return Ok(map);
        }
        let key = cut_err(quoted_string)
            .context(expected("object key"))
            .parse_next(input)?;
        let _ = ws.parse_next(input)?;
        let _ = cut_err(punct(':')).context(expected("':'")).parse_next(input)?;
        let value = json_value(input, depth)?;
        map.insert(key, value);
        let _ = ws.parse_next(input)?;
        if opt(punct(',')).parse_next(input)?.is_some() {
            continue;
        }
        let _ = cut_err(punct('}'))
            .context(expected("',' or '}'"))
            .parse_next(input)?;
        return Ok(map);
    }
}

/// Parse any JSON value, preceded by optional whitespace.
fn json_value(input: &mut &str, depth: usize) -> ModalResult<Value> {
    let _ = ws.parse_next(input)?;
    match input.chars().next() {
        Some('{') => object(input, depth).map(Value::Object),
        Some('[') => array(input, depth).map(Value::Array),
        Some('"') => quoted_string.map(Value::String).parse_next(input),
        Some('t') => cut_err(keyword("true"))
            .value(Value::Bool(true))
            .parse_next(input),
        Some('f') => cut_err(keyword("false"))
            .value(Value::Bool(false))
            .parse_next(input),
        Some('n') => cut_err(keyword("null"))
            .value(Value::Null)
            .parse_next(input),
        Some(c) if c == '-' || c.is_ascii_digit() => {
            cut_err(number).map(Value::Number).parse_next(input)
        }
        _ => Err(make_cut_error("JSON value")),
    }
}

/// Compute 1-based (line, col) for a byte offset.
fn offset_to_line_col(text: &str, offset: usize) -> (usize, usize) {
    let mut end = offset.min(text.len());
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    let prefix = &text[..end];
    let line = prefix.matches('\n').count() + 1;
    let col = match prefix.rfind('\n') {
        Some(pos) => prefix[pos + 1..].chars().count() + 1,
        None => prefix.chars().count() + 1,
    };
    (line, col)
}

/// Parse JSON-with-comments text into an order-preserving [`Value`].
///
/// Accepts `//` and `/* */` comments, trailing commas in arrays and objects,
/// and a leading byte-order mark.
pub fn parse(input: &str) -> flowsmith_types::Result<Value> {
    let input = input.strip_prefix('\u{feff}').unwrap_or(input);
    let blanked = blank_comments(input);
    let mut remaining = blanked.as_str();

    let parsed = json_value(&mut remaining, 0).and_then(|value| {
        let _ = ws.parse_next(&mut remaining)?;
        if remaining.is_empty() {
            Ok(value)
        } else {
            Err(make_cut_error("end of input"))
        }
    });

    parsed.map_err(|e| {
        let offset = blanked.len() - remaining.len();
        let (line, col) = offset_to_line_col(input, offset);
        let snippet = remaining.chars().take(40).collect::<String>();
        flowsmith_types::FlowError::Parse {
            line,
            col,
            message: format!("{}", e),
            source_snippet: if snippet.trim().is_empty() {
                None
            } else {
                Some(snippet)
            },
        }
    })
}
