//! A built-in converter for flat documents: a single object of scalar
//! members on the A side, one `key: value` line per member on the B side.
//!
//! It exists so the sync pipeline can run without an external engine, and
//! it reports the same kind of nested mappings a full converter would
//! (whole document, then each member, its key and its value).

use ropey::Rope;
use serde_json::Value;
use twin_core::{
  ConversionOutcome,
  Direction,
  MappedConversion,
  ParseError,
  SourceMapping,
  Span,
};

use crate::worker::ConverterService;

#[derive(Debug, Default, Clone, Copy)]
pub struct FlatConverter;

impl ConverterService for FlatConverter {
  fn convert(
    &mut self,
    direction: Direction,
    input: &str,
    width: Option<u32>,
  ) -> ConversionOutcome<String> {
    let entries = parse(direction, input)?;
    Ok(render(direction, &entries, width).output)
  }

  fn convert_with_mapping(
    &mut self,
    direction: Direction,
    input: &str,
  ) -> ConversionOutcome<MappedConversion> {
    let entries = parse(direction, input)?;
    let rendered = render(direction, &entries, None);

    let source = Rope::from_str(input);
    let target = Rope::from_str(&rendered.output);
    let span = |text: &Rope, (start, end): (usize, usize)| {
      Span::from_offsets(text.slice(..), start, end)
    };

    let mut mappings = Vec::with_capacity(1 + entries.len() * 3);
    mappings.push(SourceMapping::new(
      span(&source, (0, source.len_chars())),
      span(&target, (0, target.len_chars())),
    ));
    for (entry, placed) in entries.iter().zip(&rendered.placed) {
      for (from, to) in [
        (entry.whole(), placed.whole()),
        (entry.key_span, placed.key),
        (entry.value_span, placed.value),
      ] {
        mappings.push(SourceMapping::new(span(&source, from), span(&target, to)));
      }
    }

    Ok(MappedConversion {
      output: rendered.output,
      mappings,
    })
  }
}

type Range = (usize, usize);

#[derive(Debug, Clone, PartialEq)]
struct Entry {
  key:        String,
  value:      Value,
  key_span:   Range,
  value_span: Range,
}

/// Where a member landed, in char offsets.
#[derive(Debug, Clone, Copy)]
struct Placed {
  key:   Range,
  value: Range,
}

impl Placed {
  fn whole(&self) -> Range {
    (self.key.0, self.value.1)
  }
}

impl Entry {
  fn whole(&self) -> Range {
    (self.key_span.0, self.value_span.1)
  }
}

struct Rendered {
  output: String,
  placed: Vec<Placed>,
}

fn parse(direction: Direction, input: &str) -> ConversionOutcome<Vec<Entry>> {
  match direction {
    Direction::AToB => ObjectParser::new(input).parse(),
    Direction::BToA => parse_lines(input),
  }
}

fn render(direction: Direction, entries: &[Entry], width: Option<u32>) -> Rendered {
  match direction {
    Direction::AToB => render_lines(entries),
    Direction::BToA => render_object(entries, width),
  }
}

fn syntax_error(text: &Rope, offset: usize, message: impl Into<String>) -> ParseError {
  let end = (offset + 1).min(text.len_chars());
  ParseError::syntax(message, Span::from_offsets(text.slice(..), offset, end))
}

/// Scans one brace-delimited object with `//` and `/* */` comments and
/// trailing commas allowed.
struct ObjectParser {
  text:  Rope,
  chars: Vec<char>,
  pos:   usize,
}

impl ObjectParser {
  fn new(input: &str) -> Self {
    Self {
      text:  Rope::from_str(input),
      chars: input.chars().collect(),
      pos:   0,
    }
  }

  fn peek(&self) -> Option<char> {
    self.chars.get(self.pos).copied()
  }

  fn error(&self, offset: usize, message: impl Into<String>) -> ParseError {
    syntax_error(&self.text, offset, message)
  }

  fn skip_trivia(&mut self) -> ConversionOutcome<()> {
    loop {
      match (self.peek(), self.chars.get(self.pos + 1).copied()) {
        (Some(c), _) if c.is_whitespace() => self.pos += 1,
        (Some('/'), Some('/')) => {
          while self.peek().is_some_and(|c| c != '\n') {
            self.pos += 1;
          }
        },
        (Some('/'), Some('*')) => {
          let start = self.pos;
          self.pos += 2;
          loop {
            match self.peek() {
              None => return Err(self.error(start, "unterminated block comment")),
              Some('*') if self.chars.get(self.pos + 1) == Some(&'/') => {
                self.pos += 2;
                break;
              },
              Some(_) => self.pos += 1,
            }
          }
        },
        _ => return Ok(()),
      }
    }
  }

  fn expect(&mut self, expected: char, message: &str) -> ConversionOutcome<()> {
    if self.peek() == Some(expected) {
      self.pos += 1;
      Ok(())
    } else {
      Err(self.error(self.pos, message))
    }
  }

  fn parse(mut self) -> ConversionOutcome<Vec<Entry>> {
    self.skip_trivia()?;
    self.expect('{', "expected `{` at start of document")?;

    let mut entries = Vec::new();
    loop {
      self.skip_trivia()?;
      if self.peek() == Some('}') {
        self.pos += 1;
        break;
      }
      entries.push(self.entry()?);

      self.skip_trivia()?;
      match self.peek() {
        Some(',') => self.pos += 1,
        Some('}') => {
          self.pos += 1;
          break;
        },
        _ => return Err(self.error(self.pos, "expected `,` or `}` after member")),
      }
    }

    self.skip_trivia()?;
    if self.pos < self.chars.len() {
      return Err(self.error(self.pos, "unexpected content after document"));
    }
    Ok(entries)
  }

  fn entry(&mut self) -> ConversionOutcome<Entry> {
    if self.peek() != Some('"') {
      return Err(self.error(self.pos, "expected a string key"));
    }
    let key_start = self.pos;
    let key = match serde_json::from_str::<Value>(&self.string_literal()?) {
      Ok(Value::String(key)) => key,
      _ => return Err(self.error(key_start, "invalid escape in key")),
    };
    let key_span = (key_start, self.pos);

    self.skip_trivia()?;
    self.expect(':', "expected `:` after key")?;
    self.skip_trivia()?;

    let value_start = self.pos;
    let value = match self.peek() {
      Some('"') => {
        serde_json::from_str::<Value>(&self.string_literal()?)
          .map_err(|_| self.error(value_start, "invalid escape in string"))?
      },
      Some('{' | '[') => {
        return Err(self.error(value_start, "nested objects and arrays are not supported"));
      },
      _ => {
        let token: String = self
          .chars
          .get(self.pos..)
          .unwrap_or_default()
          .iter()
          .take_while(|&&c| !c.is_whitespace() && !matches!(c, ',' | '}' | ']' | '/'))
          .collect();
        if token.is_empty() {
          return Err(self.error(value_start, "expected a value"));
        }
        self.pos += token.chars().count();
        serde_json::from_str::<Value>(&token)
          .map_err(|_| self.error(value_start, format!("unexpected token `{token}`")))?
      },
    };

    Ok(Entry {
      key,
      value,
      key_span,
      value_span: (value_start, self.pos),
    })
  }

  /// Consume a double-quoted literal and return it verbatim, quotes
  /// included.
  fn string_literal(&mut self) -> ConversionOutcome<String> {
    let start = self.pos;
    self.pos += 1;
    loop {
      match self.peek() {
        None | Some('\n') => return Err(self.error(start, "unterminated string")),
        Some('\\') => self.pos += 2,
        Some('"') => {
          self.pos += 1;
          break;
        },
        Some(_) => self.pos += 1,
      }
    }
    Ok(self.chars[start..self.pos.min(self.chars.len())].iter().collect())
  }
}

fn parse_lines(input: &str) -> ConversionOutcome<Vec<Entry>> {
  let text = Rope::from_str(input);
  let mut entries = Vec::new();

  for (index, line) in text.lines().enumerate() {
    let line_start = text.line_to_char(index);
    let line: String = line.chars().filter(|c| !matches!(c, '\n' | '\r')).collect();
    let trimmed = line.trim_start();
    if trimmed.is_empty() || trimmed.starts_with('#') || line == "---" {
      continue;
    }
    if trimmed.len() != line.len() {
      return Err(syntax_error(
        &text,
        line_start,
        "nested values are not supported",
      ));
    }
    entries.push(parse_line(&text, line_start, &line)?);
  }

  Ok(entries)
}

fn parse_line(text: &Rope, line_start: usize, line: &str) -> ConversionOutcome<Entry> {
  let chars: Vec<char> = line.chars().collect();

  let (key, key_len) = if chars.first() == Some(&'"') {
    let mut end = 1;
    while end < chars.len() && chars[end] != '"' {
      end += if chars[end] == '\\' { 2 } else { 1 };
    }
    let literal: String = chars[..(end + 1).min(chars.len())].iter().collect();
    match serde_json::from_str::<String>(&literal) {
      Ok(key) => (key, end + 1),
      Err(_) => return Err(syntax_error(text, line_start, "invalid quoted key")),
    }
  } else {
    let Some(colon) = find_separator(&chars) else {
      return Err(syntax_error(text, line_start, "expected `key: value`"));
    };
    (chars[..colon].iter().collect::<String>().trim_end().to_string(), colon)
  };

  if chars.get(key_len) != Some(&':') {
    return Err(syntax_error(text, line_start + key_len, "expected `:` after key"));
  }

  let after = key_len + 1;
  let leading = chars[after..].iter().take_while(|c| c.is_whitespace()).count();
  let value_start = after + leading;
  let raw: String = chars[value_start..].iter().collect();
  let raw = strip_comment(&raw).trim_end();
  if raw.starts_with('{') || raw.starts_with('[') || raw == "|" || raw == ">" {
    return Err(syntax_error(
      text,
      line_start + value_start,
      "nested objects and arrays are not supported",
    ));
  }

  // An empty value is represented by its colon.
  let value_span = if raw.is_empty() {
    (line_start + key_len, line_start + key_len + 1)
  } else {
    (line_start + value_start, line_start + value_start + raw.chars().count())
  };

  Ok(Entry {
    key,
    value: scalar(raw),
    key_span: (line_start, line_start + key_len),
    value_span,
  })
}

/// First `:` followed by whitespace or the end of the line.
fn find_separator(chars: &[char]) -> Option<usize> {
  (0..chars.len()).find(|&i| {
    chars[i] == ':' && chars.get(i + 1).is_none_or(|c| c.is_whitespace())
  })
}

fn strip_comment(raw: &str) -> &str {
  if raw.starts_with('"') || raw.starts_with('\'') {
    return raw;
  }
  match raw.find(" #") {
    Some(at) => &raw[..at],
    None => raw,
  }
}

fn scalar(raw: &str) -> Value {
  if raw.is_empty() || raw == "~" {
    return Value::Null;
  }
  if raw.len() >= 2 && raw.starts_with('\'') && raw.ends_with('\'') {
    return Value::String(raw[1..raw.len() - 1].replace("''", "'"));
  }
  serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn is_bare_key(key: &str) -> bool {
  let mut chars = key.chars();
  let head_ok = chars
    .next()
    .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
  head_ok
    && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    && !matches!(key, "true" | "false" | "null" | "yes" | "no" | "on" | "off")
}

fn quote(key: &str) -> String {
  Value::String(key.to_string()).to_string()
}

/// Appends text while counting chars, so ranges line up with the rope the
/// output is later measured with.
#[derive(Default)]
struct Writer {
  output: String,
  len:    usize,
}

impl Writer {
  fn push(&mut self, text: &str) -> Range {
    let start = self.len;
    self.output.push_str(text);
    self.len += text.chars().count();
    (start, self.len)
  }
}

fn render_lines(entries: &[Entry]) -> Rendered {
  let mut out = Writer::default();
  let mut placed = Vec::with_capacity(entries.len());

  for entry in entries {
    let key = if is_bare_key(&entry.key) {
      entry.key.clone()
    } else {
      quote(&entry.key)
    };
    let key = out.push(&key);
    out.push(": ");
    let value = out.push(&entry.value.to_string());
    out.push("\n");
    placed.push(Placed { key, value });
  }

  Rendered {
    output: out.output,
    placed,
  }
}

fn render_object(entries: &[Entry], width: Option<u32>) -> Rendered {
  if entries.is_empty() {
    return Rendered {
      output: "{}".into(),
      placed: Vec::new(),
    };
  }

  let members: Vec<(String, String)> = entries
    .iter()
    .map(|entry| (quote(&entry.key), entry.value.to_string()))
    .collect();

  let inline_len = members
    .iter()
    .map(|(key, value)| key.chars().count() + value.chars().count() + 2)
    .sum::<usize>()
    + (members.len() - 1) * 2
    + 4;
  let inline = width.is_some_and(|width| inline_len <= width as usize);

  let (open, indent, separator, close) = if inline {
    ("{ ", "", ", ", " }")
  } else {
    ("{\n", "  ", ",\n", "\n}")
  };

  let mut out = Writer::default();
  let mut placed = Vec::with_capacity(members.len());
  out.push(open);
  for (index, (key, value)) in members.iter().enumerate() {
    if index > 0 {
      out.push(separator);
    }
    out.push(indent);
    let key = out.push(key);
    out.push(": ");
    let value = out.push(value);
    placed.push(Placed { key, value });
  }
  out.push(close);

  Rendered {
    output: out.output,
    placed,
  }
}

#[cfg(test)]
mod tests {
  use twin_core::{
    ErrorKind,
    MapDirection,
    Position,
    map_position,
  };

  use super::*;

  fn a_to_b(input: &str) -> ConversionOutcome<String> {
    FlatConverter.convert(Direction::AToB, input, None)
  }

  fn b_to_a(input: &str, width: Option<u32>) -> ConversionOutcome<String> {
    FlatConverter.convert(Direction::BToA, input, width)
  }

  #[test]
  fn object_becomes_key_value_lines() {
    assert_eq!(a_to_b(r#"{"a": 1}"#).unwrap(), "a: 1\n");
    assert_eq!(
      a_to_b(
        r#"{
          // service name
          "name": "twin", /* inline */
          "with space": true,
          "nothing": null,
        }"#
      )
      .unwrap(),
      "name: \"twin\"\n\"with space\": true\nnothing: null\n"
    );
    assert_eq!(a_to_b("{}").unwrap(), "");
  }

  #[test]
  fn syntax_errors_point_at_the_offending_char() {
    let err = a_to_b("{ invalid").unwrap_err();
    assert_eq!(err.kind, ErrorKind::SyntaxError);
    assert_eq!(err.span.start, Position::new(0, 2, 2));
    assert_eq!(err.to_string(), "Line 1, Column 3: expected a string key");

    let err = a_to_b("{\n  \"a\": [1]\n}").unwrap_err();
    assert_eq!(err.span.start, Position::new(1, 7, 9));

    let err = a_to_b("{\"a\": 1} trailing").unwrap_err();
    assert_eq!(err.span.start.offset, 9);

    assert!(a_to_b("{\"a\": 1 /* open").is_err());
    assert!(a_to_b("{\"a\": nope}").is_err());
    assert!(a_to_b("").is_err());
  }

  #[test]
  fn lines_become_an_object() {
    assert_eq!(
      b_to_a("# header\nname: twin\nport: 8080\n\nempty:\nquoted: 'it''s'\n", None).unwrap(),
      "{\n  \"name\": \"twin\",\n  \"port\": 8080,\n  \"empty\": null,\n  \"quoted\": \"it's\"\n}"
    );
    assert_eq!(b_to_a("", None).unwrap(), "{}");
    assert_eq!(b_to_a("url: http://x # comment\n", None).unwrap(), "{\n  \"url\": \"http://x\"\n}");
  }

  #[test]
  fn width_allows_a_single_line_object() {
    assert_eq!(b_to_a("a: 1\nb: 2\n", Some(80)).unwrap(), "{ \"a\": 1, \"b\": 2 }");
    assert_eq!(
      b_to_a("a: 1\nb: 2\n", Some(10)).unwrap(),
      "{\n  \"a\": 1,\n  \"b\": 2\n}"
    );
  }

  #[test]
  fn indented_lines_are_rejected() {
    let err = b_to_a("a:\n  b: 1\n", None).unwrap_err();
    assert_eq!(err.kind, ErrorKind::SyntaxError);
    assert_eq!(err.span.start.line, 1);

    let err = b_to_a("just words\n", None).unwrap_err();
    assert_eq!(err.span.start, Position::zero());
  }

  #[test]
  fn documents_survive_a_round_trip() {
    let input = r#"{"name": "twin", "port": 8080, "debug": false, "ratio": 0.5, "odd key": "x:y"}"#;
    let there = a_to_b(input).unwrap();
    let back = b_to_a(&there, None).unwrap();

    let before: Value = serde_json::from_str(input).unwrap();
    let after: Value = serde_json::from_str(&back).unwrap();
    assert_eq!(before, after);
  }

  #[test]
  fn mappings_nest_from_document_to_value() {
    let input = "{\n  \"name\": \"twin\"\n}";
    let converted = FlatConverter
      .convert_with_mapping(Direction::AToB, input)
      .unwrap();
    assert_eq!(converted.output, "name: \"twin\"\n");
    assert_eq!(converted.mappings.len(), 4);

    let source = Rope::from_str(input);
    let target = Rope::from_str(&converted.output);
    for mapping in &converted.mappings {
      assert!(mapping.source().start.is_consistent_with(source.slice(..)));
      assert!(mapping.target().end.is_consistent_with(target.slice(..)));
    }

    // on the `n` of the key
    let key = Position::at_offset(source.slice(..), 5);
    assert_eq!(
      map_position(&converted.mappings, MapDirection::Forward, key),
      Some(Position::new(0, 0, 0))
    );
    // inside the value
    let value = Position::at_offset(source.slice(..), 14);
    assert_eq!(
      map_position(&converted.mappings, MapDirection::Forward, value),
      Some(Position::new(0, 6, 6))
    );
  }

  #[test]
  fn reverse_mappings_point_into_the_object() {
    let converted = FlatConverter
      .convert_with_mapping(Direction::BToA, "a: 1\nbb: true\n")
      .unwrap();
    assert_eq!(converted.output, "{\n  \"a\": 1,\n  \"bb\": true\n}");

    let cursor = Position::new(1, 5, 9);
    assert_eq!(
      map_position(&converted.mappings, MapDirection::Forward, cursor),
      Some(Position::new(2, 8, 20))
    );
  }
}
