use super::ScriptError;
use crate::error::SourcePosition;

#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Num(f64),
    Str(String),
    Template(Vec<TemplateChunk>),
    Ident(String),
    Punct(&'static str),
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TemplateChunk {
    Text(String),
    /// Source of a `${...}` substitution and where it starts.
    Code(String, SourcePosition),
}

#[derive(Debug, Clone)]
pub struct Token {
    pub tok: Tok,
    pub pos: SourcePosition,
    /// A line break separates this token from the previous one.
    pub newline_before: bool,
}

// Longest first, so the scan takes the longest match.
const PUNCTUATORS: &[&str] = &[
    "===", "!==", "**=", "=>", "==", "!=", "<=", ">=", "&&", "||", "??", "++", "--", "+=", "-=",
    "*=", "/=", "%=", "**", "{", "}", "(", ")", "[", "]", ";", ",", ".", ":", "?", "+", "-", "*",
    "/", "%", "<", ">", "=", "!",
];

pub struct Lexer {
    chars: Vec<char>,
    index: usize,
    line: usize,
    column: usize,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Self::starting_at(source, SourcePosition { line: 1, column: 1 })
    }

    pub fn starting_at(source: &str, start: SourcePosition) -> Self {
        Lexer {
            chars: source.chars().collect(),
            index: 0,
            line: start.line,
            column: start.column,
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, ScriptError> {
        let mut tokens = Vec::new();
        loop {
            let newline_before = self.skip_trivia()?;
            let pos = self.position();
            let Some(c) = self.peek() else {
                tokens.push(Token {
                    tok: Tok::Eof,
                    pos,
                    newline_before,
                });
                return Ok(tokens);
            };

            let tok = if c.is_ascii_digit()
                || (c == '.' && self.peek_at(1).is_some_and(|d| d.is_ascii_digit()))
            {
                self.number(pos)?
            } else if c == '"' || c == '\'' {
                self.string(c, pos)?
            } else if c == '`' {
                self.template(pos)?
            } else if is_identifier_start(c) {
                self.identifier()
            } else {
                self.punctuator(pos)?
            };
            tokens.push(Token {
                tok,
                pos,
                newline_before,
            });
        }
    }

    fn position(&self) -> SourcePosition {
        SourcePosition {
            line: self.line,
            column: self.column,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.index).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.index + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.index += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    /// Skip whitespace and comments; report whether a newline was crossed.
    fn skip_trivia(&mut self) -> Result<bool, ScriptError> {
        let mut newline = false;
        loop {
            match self.peek() {
                Some('\n') => {
                    newline = true;
                    self.bump();
                }
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('/') if self.peek_at(1) == Some('/') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                Some('/') if self.peek_at(1) == Some('*') => {
                    let start = self.position();
                    self.bump();
                    self.bump();
                    loop {
                        match self.bump() {
                            Some('*') if self.peek() == Some('/') => {
                                self.bump();
                                break;
                            }
                            Some('\n') => newline = true,
                            Some(_) => {}
                            None => {
                                return Err(ScriptError::syntax("Unterminated comment", start))
                            }
                        }
                    }
                }
                _ => return Ok(newline),
            }
        }
    }

    fn number(&mut self, pos: SourcePosition) -> Result<Tok, ScriptError> {
        if self.peek() == Some('0') && matches!(self.peek_at(1), Some('x') | Some('X')) {
            self.bump();
            self.bump();
            let mut digits = String::new();
            while let Some(c) = self.peek().filter(|c| c.is_ascii_hexdigit()) {
                digits.push(c);
                self.bump();
            }
            return u64::from_str_radix(&digits, 16)
                .map(|n| Tok::Num(n as f64))
                .map_err(|_| ScriptError::syntax("Invalid hexadecimal number", pos));
        }

        let mut text = String::new();
        while let Some(c) = self.peek().filter(|c| c.is_ascii_digit() || *c == '_') {
            if c != '_' {
                text.push(c);
            }
            self.bump();
        }
        if self.peek() == Some('.') && self.peek_at(1).map_or(true, |c| !is_identifier_start(c))
        {
            text.push('.');
            self.bump();
            while let Some(c) = self.peek().filter(|c| c.is_ascii_digit()) {
                text.push(c);
                self.bump();
            }
        }
        if matches!(self.peek(), Some('e') | Some('E')) {
            let sign = self.peek_at(1);
            let digit_at = if matches!(sign, Some('+') | Some('-')) { 2 } else { 1 };
            if self.peek_at(digit_at).is_some_and(|c| c.is_ascii_digit()) {
                for _ in 0..digit_at {
                    text.push(self.bump().unwrap_or('e'));
                }
                while let Some(c) = self.peek().filter(|c| c.is_ascii_digit()) {
                    text.push(c);
                    self.bump();
                }
            }
        }
        if self.peek().is_some_and(is_identifier_start) {
            return Err(ScriptError::syntax(
                "Invalid or unexpected token",
                self.position(),
            ));
        }
        text.parse::<f64>()
            .map(Tok::Num)
            .map_err(|_| ScriptError::syntax("Invalid number", pos))
    }

    fn escape(&mut self, pos: SourcePosition) -> Result<Option<char>, ScriptError> {
        let Some(c) = self.bump() else {
            return Err(ScriptError::syntax("Invalid or unexpected token", pos));
        };
        let escaped = match c {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            'b' => '\u{8}',
            'f' => '\u{c}',
            'v' => '\u{b}',
            '0' => '\0',
            '\n' => return Ok(None),
            'x' => {
                let hex: String = (0..2).filter_map(|_| self.bump()).collect();
                return u32::from_str_radix(&hex, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .map(Some)
                    .ok_or_else(|| ScriptError::syntax("Invalid hexadecimal escape sequence", pos));
            }
            'u' => {
                let hex: String = if self.peek() == Some('{') {
                    self.bump();
                    let mut hex = String::new();
                    while let Some(c) = self.bump() {
                        if c == '}' {
                            break;
                        }
                        hex.push(c);
                    }
                    hex
                } else {
                    (0..4).filter_map(|_| self.bump()).collect()
                };
                let code = u32::from_str_radix(&hex, 16)
                    .map_err(|_| ScriptError::syntax("Invalid Unicode escape sequence", pos))?;
                // Surrogate pairs arrive as two escapes.
                if (0xD800..0xDC00).contains(&code)
                    && self.peek() == Some('\\')
                    && self.peek_at(1) == Some('u')
                {
                    self.bump();
                    self.bump();
                    let low: String = (0..4).filter_map(|_| self.bump()).collect();
                    let low = u32::from_str_radix(&low, 16).map_err(|_| {
                        ScriptError::syntax("Invalid Unicode escape sequence", pos)
                    })?;
                    let combined = 0x10000 + ((code - 0xD800) << 10) + (low.wrapping_sub(0xDC00));
                    return Ok(Some(char::from_u32(combined).unwrap_or('\u{FFFD}')));
                }
                return Ok(Some(char::from_u32(code).unwrap_or('\u{FFFD}')));
            }
            other => other,
        };
        Ok(Some(escaped))
    }

    fn string(&mut self, quote: char, pos: SourcePosition) -> Result<Tok, ScriptError> {
        self.bump();
        let mut value = String::new();
        loop {
            match self.bump() {
                Some(c) if c == quote => return Ok(Tok::Str(value)),
                Some('\\') => {
                    if let Some(c) = self.escape(pos)? {
                        value.push(c);
                    }
                }
                Some('\n') | None => {
                    return Err(ScriptError::syntax("Invalid or unexpected token", pos))
                }
                Some(c) => value.push(c),
            }
        }
    }

    fn template(&mut self, pos: SourcePosition) -> Result<Tok, ScriptError> {
        self.bump();
        let mut chunks = Vec::new();
        let mut text = String::new();
        loop {
            match self.bump() {
                Some('`') => {
                    if !text.is_empty() {
                        chunks.push(TemplateChunk::Text(text));
                    }
                    return Ok(Tok::Template(chunks));
                }
                Some('\\') => {
                    if let Some(c) = self.escape(pos)? {
                        text.push(c);
                    }
                }
                Some('$') if self.peek() == Some('{') => {
                    self.bump();
                    if !text.is_empty() {
                        chunks.push(TemplateChunk::Text(std::mem::take(&mut text)));
                    }
                    let start = self.position();
                    let code = self.template_code(pos)?;
                    chunks.push(TemplateChunk::Code(code, start));
                }
                Some(c) => text.push(c),
                None => return Err(ScriptError::syntax("Unterminated template literal", pos)),
            }
        }
    }

    /// Collect the source of a `${...}` substitution, up to its closing brace.
    fn template_code(&mut self, pos: SourcePosition) -> Result<String, ScriptError> {
        let mut code = String::new();
        let mut depth = 0usize;
        let mut quote: Option<char> = None;
        loop {
            let Some(c) = self.bump() else {
                return Err(ScriptError::syntax("Unterminated template literal", pos));
            };
            if let Some(q) = quote {
                code.push(c);
                if c == '\\' {
                    if let Some(next) = self.bump() {
                        code.push(next);
                    }
                } else if c == q {
                    quote = None;
                }
                continue;
            }
            match c {
                '}' if depth == 0 => return Ok(code),
                '}' => depth -= 1,
                '{' => depth += 1,
                '"' | '\'' | '`' => quote = Some(c),
                _ => {}
            }
            code.push(c);
        }
    }

    fn identifier(&mut self) -> Tok {
        let mut name = String::new();
        while let Some(c) = self.peek().filter(|c| is_identifier_part(*c)) {
            name.push(c);
            self.bump();
        }
        Tok::Ident(name)
    }

    fn punctuator(&mut self, pos: SourcePosition) -> Result<Tok, ScriptError> {
        for punct in PUNCTUATORS {
            let matches = punct
                .chars()
                .enumerate()
                .all(|(i, c)| self.peek_at(i) == Some(c));
            if matches {
                for _ in 0..punct.chars().count() {
                    self.bump();
                }
                return Ok(Tok::Punct(punct));
            }
        }
        let c = self.peek().unwrap_or(' ');
        Err(ScriptError::syntax(
            format!("Invalid or unexpected token '{}'", c),
            pos,
        ))
    }
}

fn is_identifier_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_identifier_part(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Tok> {
        Lexer::new(source)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.tok)
            .collect()
    }

    #[test]
    fn punctuators_take_longest_match() {
        assert_eq!(
            kinds("a !== b => c"),
            vec![
                Tok::Ident("a".into()),
                Tok::Punct("!=="),
                Tok::Ident("b".into()),
                Tok::Punct("=>"),
                Tok::Ident("c".into()),
                Tok::Eof
            ]
        );
    }

    #[test]
    fn strings_decode_escapes() {
        assert_eq!(
            kinds(r#""a\n\"bA""#),
            vec![Tok::Str("a\n\"bA".into()), Tok::Eof]
        );
    }

    #[test]
    fn template_keeps_code_positions() {
        let tokens = Lexer::new("x\n`a${b + 1}c`").tokenize().unwrap();
        let Tok::Template(chunks) = &tokens[1].tok else {
            panic!("expected template");
        };
        assert_eq!(chunks[0], TemplateChunk::Text("a".into()));
        assert_eq!(
            chunks[1],
            TemplateChunk::Code("b + 1".into(), SourcePosition { line: 2, column: 5 })
        );
        assert_eq!(chunks[2], TemplateChunk::Text("c".into()));
    }

    #[test]
    fn positions_and_newlines_are_tracked() {
        let tokens = Lexer::new("let x = 1;\n  // note\n  y").tokenize().unwrap();
        let y = &tokens[5];
        assert_eq!(y.tok, Tok::Ident("y".into()));
        assert_eq!(y.pos, SourcePosition { line: 3, column: 3 });
        assert!(y.newline_before);
    }

    #[test]
    fn unterminated_string_is_a_syntax_error() {
        let err = Lexer::new("let a = \"abc").tokenize().unwrap_err();
        assert_eq!(err.position, Some(SourcePosition { line: 1, column: 9 }));
    }

    #[test]
    fn numbers_parse_fraction_exponent_and_hex() {
        assert_eq!(
            kinds("1.5 2e3 0xff .5"),
            vec![
                Tok::Num(1.5),
                Tok::Num(2000.0),
                Tok::Num(255.0),
                Tok::Num(0.5),
                Tok::Eof
            ]
        );
    }
}
