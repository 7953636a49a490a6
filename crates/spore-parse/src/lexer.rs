use spore_core::error::SporeError;
use spore_core::pos::{add_pos, OriginId};

// ── Tokens ────────────────────────────────────────────────────────

/// A piece of a string or path literal as the lexer sees it. Interpolated
/// `${…}` groups are captured as raw source text and re-lexed by the
/// parser at their recorded position.
#[derive(Debug, Clone, PartialEq)]
pub enum RawPart {
    Lit(String),
    Interp { src: String, line: u32, col: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Int(i64),
    Float(f64),
    Id(String),
    /// `"…"`, possibly with interpolation.
    Str(Vec<RawPart>),
    /// `''…''`, indentation already stripped.
    IndentStr(Vec<RawPart>),
    /// `./p`, `../p`, `/p`, `~/p`, possibly with interpolation.
    PathLit(Vec<RawPart>),
    /// `<prefix/rest>`.
    SearchPath(String),
    /// A bare URI, treated as a string literal.
    Uri(String),
    /// `${…}` outside a string (dynamic attribute names).
    Interp { src: String, line: u32, col: u32 },

    // Keywords
    If,
    Then,
    Else,
    Assert,
    With,
    Let,
    In,
    Rec,
    Inherit,
    OrKw,

    // Punctuation and operators
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Semi,
    Colon,
    Comma,
    Dot,
    Ellipsis,
    At,
    Question,
    Assign,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Impl,
    Update,
    Concat,
    Plus,
    Minus,
    Star,
    Slash,
    Not,
}

#[derive(Debug, Clone)]
pub struct SpannedToken {
    pub token: Token,
    pub line: u32,
    pub col: u32,
}

// ── Character classes ─────────────────────────────────────────────

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '\'' || c == '-'
}

fn is_path_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '+' | '-')
}

fn is_uri_scheme_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '+' | '.' | '-')
}

fn is_uri_char(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(
            c,
            '%' | '/' | '?' | ':' | '@' | '&' | '=' | '+' | '$' | ',' | '-' | '_' | '.' | '!' | '~'
                | '*' | '\''
        )
}

// ── Lexer ─────────────────────────────────────────────────────────

struct Lexer {
    chars: Vec<char>,
    i: usize,
    line: u32,
    col: u32,
    origin: OriginId,
    tokens: Vec<SpannedToken>,
}

/// Tokenize a whole source buffer.
pub fn tokenize(input: &str, origin: OriginId) -> Result<Vec<SpannedToken>, SporeError> {
    tokenize_at(input, origin, 1, 1)
}

/// Tokenize starting from a given line/column, used when re-lexing the
/// source of an interpolated `${…}` group.
pub fn tokenize_at(
    input: &str,
    origin: OriginId,
    line: u32,
    col: u32,
) -> Result<Vec<SpannedToken>, SporeError> {
    let mut lexer = Lexer {
        chars: input.chars().collect(),
        i: 0,
        line,
        col,
        origin,
        tokens: Vec::new(),
    };
    lexer.run()?;
    Ok(lexer.tokens)
}

impl Lexer {
    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.i + offset).copied()
    }

    fn cur(&self) -> Option<char> {
        self.peek(0)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.cur()?;
        self.i += 1;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn error(&self, message: impl Into<String>) -> SporeError {
        SporeError::parse(message, add_pos(self.origin, self.line, self.col))
    }

    fn push(&mut self, token: Token, line: u32, col: u32) {
        self.tokens.push(SpannedToken { token, line, col });
    }

    fn run(&mut self) -> Result<(), SporeError> {
        while let Some(c) = self.cur() {
            let (line, col) = (self.line, self.col);
            match c {
                ' ' | '\t' | '\r' | '\n' => {
                    self.bump();
                }
                '#' => {
                    while let Some(c) = self.cur() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                '"' => {
                    self.bump();
                    let parts = self.scan_string()?;
                    self.push(Token::Str(parts), line, col);
                }
                '\'' if self.peek(1) == Some('\'') => {
                    self.bump();
                    self.bump();
                    let parts = self.scan_indent_string()?;
                    self.push(Token::IndentStr(strip_indentation(parts)), line, col);
                }
                '\'' => return Err(self.error("unexpected single quote")),
                '$' if self.peek(1) == Some('{') => {
                    self.bump();
                    self.bump();
                    let (src, at_line, at_col) = self.scan_interp_group()?;
                    self.push(
                        Token::Interp {
                            src,
                            line: at_line,
                            col: at_col,
                        },
                        line,
                        col,
                    );
                }
                '$' => return Err(self.error("unexpected '$'")),
                '{' => {
                    self.bump();
                    self.push(Token::LBrace, line, col);
                }
                '}' => {
                    self.bump();
                    self.push(Token::RBrace, line, col);
                }
                '[' => {
                    self.bump();
                    self.push(Token::LBracket, line, col);
                }
                ']' => {
                    self.bump();
                    self.push(Token::RBracket, line, col);
                }
                '(' => {
                    self.bump();
                    self.push(Token::LParen, line, col);
                }
                ')' => {
                    self.bump();
                    self.push(Token::RParen, line, col);
                }
                ';' => {
                    self.bump();
                    self.push(Token::Semi, line, col);
                }
                ':' => {
                    self.bump();
                    self.push(Token::Colon, line, col);
                }
                ',' => {
                    self.bump();
                    self.push(Token::Comma, line, col);
                }
                '@' => {
                    self.bump();
                    self.push(Token::At, line, col);
                }
                '?' => {
                    self.bump();
                    self.push(Token::Question, line, col);
                }
                '=' => {
                    self.bump();
                    if self.cur() == Some('=') {
                        self.bump();
                        self.push(Token::Eq, line, col);
                    } else {
                        self.push(Token::Assign, line, col);
                    }
                }
                '!' => {
                    self.bump();
                    if self.cur() == Some('=') {
                        self.bump();
                        self.push(Token::Ne, line, col);
                    } else {
                        self.push(Token::Not, line, col);
                    }
                }
                '<' => {
                    if let Some(spath) = self.try_scan_search_path() {
                        self.push(Token::SearchPath(spath), line, col);
                    } else {
                        self.bump();
                        if self.cur() == Some('=') {
                            self.bump();
                            self.push(Token::Le, line, col);
                        } else {
                            self.push(Token::Lt, line, col);
                        }
                    }
                }
                '>' => {
                    self.bump();
                    if self.cur() == Some('=') {
                        self.bump();
                        self.push(Token::Ge, line, col);
                    } else {
                        self.push(Token::Gt, line, col);
                    }
                }
                '&' => {
                    self.bump();
                    if self.cur() == Some('&') {
                        self.bump();
                        self.push(Token::AndAnd, line, col);
                    } else {
                        return Err(self.error("unexpected '&'"));
                    }
                }
                '|' => {
                    self.bump();
                    if self.cur() == Some('|') {
                        self.bump();
                        self.push(Token::OrOr, line, col);
                    } else {
                        return Err(self.error("unexpected '|'"));
                    }
                }
                '+' => {
                    self.bump();
                    if self.cur() == Some('+') {
                        self.bump();
                        self.push(Token::Concat, line, col);
                    } else {
                        self.push(Token::Plus, line, col);
                    }
                }
                '-' => {
                    self.bump();
                    if self.cur() == Some('>') {
                        self.bump();
                        self.push(Token::Impl, line, col);
                    } else {
                        self.push(Token::Minus, line, col);
                    }
                }
                '*' => {
                    self.bump();
                    self.push(Token::Star, line, col);
                }
                '/' => {
                    if self.peek(1) == Some('/') {
                        self.bump();
                        self.bump();
                        self.push(Token::Update, line, col);
                    } else if self.peek(1) == Some('*') {
                        self.skip_block_comment()?;
                    } else if self.peek(1).is_some_and(is_path_char) {
                        let parts = self.scan_path_literal()?;
                        self.push(Token::PathLit(parts), line, col);
                    } else {
                        self.bump();
                        self.push(Token::Slash, line, col);
                    }
                }
                '~' => {
                    if self.peek(1) == Some('/') {
                        let parts = self.scan_path_literal()?;
                        self.push(Token::PathLit(parts), line, col);
                    } else {
                        return Err(self.error("unexpected '~'"));
                    }
                }
                '.' => {
                    if self.peek(1).is_some_and(|c| c.is_ascii_digit()) {
                        let token = self.scan_number()?;
                        self.push(token, line, col);
                    } else if self.peek(1) == Some('/')
                        || (self.peek(1) == Some('.') && self.peek(2) == Some('/'))
                    {
                        let parts = self.scan_path_literal()?;
                        self.push(Token::PathLit(parts), line, col);
                    } else if self.peek(1) == Some('.') && self.peek(2) == Some('.') {
                        self.bump();
                        self.bump();
                        self.bump();
                        self.push(Token::Ellipsis, line, col);
                    } else {
                        self.bump();
                        self.push(Token::Dot, line, col);
                    }
                }
                c if c.is_ascii_digit() => {
                    if self.lookahead_is_path() {
                        let parts = self.scan_path_literal()?;
                        self.push(Token::PathLit(parts), line, col);
                    } else {
                        let token = self.scan_number()?;
                        self.push(token, line, col);
                    }
                }
                c if is_ident_start(c) => {
                    if self.lookahead_is_path() {
                        let parts = self.scan_path_literal()?;
                        self.push(Token::PathLit(parts), line, col);
                    } else if let Some(uri) = self.try_scan_uri() {
                        self.push(Token::Uri(uri), line, col);
                    } else {
                        let token = self.scan_ident();
                        self.push(token, line, col);
                    }
                }
                other => return Err(self.error(format!("unexpected character '{other}'"))),
            }
        }
        Ok(())
    }

    fn skip_block_comment(&mut self) -> Result<(), SporeError> {
        self.bump();
        self.bump();
        loop {
            match self.cur() {
                Some('*') if self.peek(1) == Some('/') => {
                    self.bump();
                    self.bump();
                    return Ok(());
                }
                Some(_) => {
                    self.bump();
                }
                None => return Err(self.error("unterminated block comment")),
            }
        }
    }

    /// Does a relative path literal (`seg/seg…`) start at the cursor?
    /// Paths win over identifiers and numbers when a slash directly joins
    /// two path-character runs.
    fn lookahead_is_path(&self) -> bool {
        let mut j = self.i;
        while self.chars.get(j).copied().is_some_and(is_path_char) {
            j += 1;
        }
        j > self.i
            && self.chars.get(j) == Some(&'/')
            && self.chars.get(j + 1).copied().is_some_and(is_path_char)
    }

    fn try_scan_search_path(&mut self) -> Option<String> {
        // `<` seg (`/` seg)* `>` with no spaces.
        let mut j = self.i + 1;
        let start = j;
        loop {
            let mut seg_len = 0;
            while self.chars.get(j).copied().is_some_and(is_path_char) {
                j += 1;
                seg_len += 1;
            }
            if seg_len == 0 {
                return None;
            }
            match self.chars.get(j) {
                Some('/') => j += 1,
                Some('>') => break,
                _ => return None,
            }
        }
        let inner: String = self.chars[start..j].iter().collect();
        for _ in self.i..=j {
            self.bump();
        }
        Some(inner)
    }

    fn try_scan_uri(&mut self) -> Option<String> {
        let mut j = self.i;
        while self.chars.get(j).copied().is_some_and(is_uri_scheme_char) {
            j += 1;
        }
        if self.chars.get(j) != Some(&':') {
            return None;
        }
        let body_start = j + 1;
        let mut k = body_start;
        while self.chars.get(k).copied().is_some_and(is_uri_char) {
            k += 1;
        }
        if k == body_start {
            return None;
        }
        let uri: String = self.chars[self.i..k].iter().collect();
        for _ in self.i..k {
            self.bump();
        }
        Some(uri)
    }

    fn scan_ident(&mut self) -> Token {
        let mut name = String::new();
        while let Some(c) = self.cur() {
            if is_ident_char(c) {
                name.push(c);
                self.bump();
            } else {
                break;
            }
        }
        match name.as_str() {
            "if" => Token::If,
            "then" => Token::Then,
            "else" => Token::Else,
            "assert" => Token::Assert,
            "with" => Token::With,
            "let" => Token::Let,
            "in" => Token::In,
            "rec" => Token::Rec,
            "inherit" => Token::Inherit,
            "or" => Token::OrKw,
            _ => Token::Id(name),
        }
    }

    fn scan_number(&mut self) -> Result<Token, SporeError> {
        let mut text = String::new();
        while self.cur().is_some_and(|c| c.is_ascii_digit()) {
            text.push(self.bump().unwrap());
        }
        let is_float = self.cur() == Some('.') && self.peek(1).is_some_and(|c| c.is_ascii_digit())
            || (text.is_empty() && self.cur() == Some('.'));
        if is_float {
            text.push(self.bump().unwrap()); // '.'
            while self.cur().is_some_and(|c| c.is_ascii_digit()) {
                text.push(self.bump().unwrap());
            }
            if matches!(self.cur(), Some('e') | Some('E')) {
                text.push(self.bump().unwrap());
                if matches!(self.cur(), Some('+') | Some('-')) {
                    text.push(self.bump().unwrap());
                }
                if !self.cur().is_some_and(|c| c.is_ascii_digit()) {
                    return Err(self.error("malformed float exponent"));
                }
                while self.cur().is_some_and(|c| c.is_ascii_digit()) {
                    text.push(self.bump().unwrap());
                }
            }
            let f: f64 = text
                .parse()
                .map_err(|_| self.error(format!("invalid float '{text}'")))?;
            Ok(Token::Float(f))
        } else {
            let n: i64 = text
                .parse()
                .map_err(|_| self.error(format!("invalid integer '{text}' (out of range)")))?;
            Ok(Token::Int(n))
        }
    }

    /// Scan a `${…}` group after the opening brace was consumed. Returns
    /// the raw inner source and its starting line/column. Braces, nested
    /// strings, and comments inside are balanced over.
    fn scan_interp_group(&mut self) -> Result<(String, u32, u32), SporeError> {
        let (start_line, start_col) = (self.line, self.col);
        let mut depth = 1usize;
        let mut src = String::new();
        loop {
            match self.cur() {
                None => return Err(self.error("unterminated '${' interpolation")),
                Some('{') => {
                    depth += 1;
                    src.push(self.bump().unwrap());
                }
                Some('}') => {
                    depth -= 1;
                    if depth == 0 {
                        self.bump();
                        return Ok((src, start_line, start_col));
                    }
                    src.push(self.bump().unwrap());
                }
                Some('"') => {
                    src.push(self.bump().unwrap());
                    self.copy_quoted_string(&mut src)?;
                }
                Some('\'') if self.peek(1) == Some('\'') => {
                    src.push(self.bump().unwrap());
                    src.push(self.bump().unwrap());
                    self.copy_indent_string(&mut src)?;
                }
                Some('#') => {
                    while let Some(c) = self.cur() {
                        if c == '\n' {
                            break;
                        }
                        src.push(self.bump().unwrap());
                    }
                }
                Some(_) => src.push(self.bump().unwrap()),
            }
        }
    }

    /// Copy a `"…"` literal verbatim into `src` (for interpolation groups),
    /// recursing into nested `${…}`.
    fn copy_quoted_string(&mut self, src: &mut String) -> Result<(), SporeError> {
        loop {
            match self.cur() {
                None => return Err(self.error("unterminated string")),
                Some('\\') => {
                    src.push(self.bump().unwrap());
                    if let Some(c) = self.bump() {
                        src.push(c);
                    }
                }
                Some('"') => {
                    src.push(self.bump().unwrap());
                    return Ok(());
                }
                Some('$') if self.peek(1) == Some('{') => {
                    src.push(self.bump().unwrap());
                    src.push(self.bump().unwrap());
                    let mut depth = 1usize;
                    while depth > 0 {
                        match self.cur() {
                            None => return Err(self.error("unterminated '${' interpolation")),
                            Some('{') => depth += 1,
                            Some('}') => depth -= 1,
                            Some('"') => {
                                src.push(self.bump().unwrap());
                                self.copy_quoted_string(src)?;
                                continue;
                            }
                            _ => {}
                        }
                        if depth > 0 || self.cur() == Some('}') {
                            src.push(self.bump().unwrap());
                        }
                    }
                }
                Some(_) => src.push(self.bump().unwrap()),
            }
        }
    }

    /// Copy a `''…''` literal verbatim into `src`.
    fn copy_indent_string(&mut self, src: &mut String) -> Result<(), SporeError> {
        loop {
            match self.cur() {
                None => return Err(self.error("unterminated indented string")),
                Some('\'') if self.peek(1) == Some('\'') => {
                    src.push(self.bump().unwrap());
                    src.push(self.bump().unwrap());
                    match self.cur() {
                        // escape sequences continue the string
                        Some('\'') | Some('$') | Some('\\') => {
                            src.push(self.bump().unwrap());
                        }
                        _ => return Ok(()),
                    }
                }
                Some(_) => src.push(self.bump().unwrap()),
            }
        }
    }

    fn scan_string(&mut self) -> Result<Vec<RawPart>, SporeError> {
        let mut parts = Vec::new();
        let mut lit = String::new();
        loop {
            match self.cur() {
                None => return Err(self.error("unterminated string")),
                Some('"') => {
                    self.bump();
                    break;
                }
                Some('\\') => {
                    self.bump();
                    let c = self
                        .bump()
                        .ok_or_else(|| self.error("unterminated string escape"))?;
                    match c {
                        'n' => lit.push('\n'),
                        't' => lit.push('\t'),
                        'r' => lit.push('\r'),
                        other => lit.push(other),
                    }
                }
                Some('$') if self.peek(1) == Some('{') => {
                    self.bump();
                    self.bump();
                    if !lit.is_empty() {
                        parts.push(RawPart::Lit(std::mem::take(&mut lit)));
                    }
                    let (src, line, col) = self.scan_interp_group()?;
                    parts.push(RawPart::Interp { src, line, col });
                }
                Some(_) => lit.push(self.bump().unwrap()),
            }
        }
        if !lit.is_empty() || parts.is_empty() {
            parts.push(RawPart::Lit(lit));
        }
        Ok(parts)
    }

    fn scan_indent_string(&mut self) -> Result<Vec<RawPart>, SporeError> {
        let mut parts = Vec::new();
        let mut lit = String::new();
        loop {
            match self.cur() {
                None => return Err(self.error("unterminated indented string")),
                Some('\'') if self.peek(1) == Some('\'') => {
                    self.bump();
                    self.bump();
                    match self.cur() {
                        Some('\'') => {
                            // ''' is an escaped ''
                            self.bump();
                            lit.push_str("''");
                        }
                        Some('$') => {
                            self.bump();
                            lit.push('$');
                        }
                        Some('\\') => {
                            self.bump();
                            let c = self
                                .bump()
                                .ok_or_else(|| self.error("unterminated string escape"))?;
                            match c {
                                'n' => lit.push('\n'),
                                't' => lit.push('\t'),
                                'r' => lit.push('\r'),
                                other => lit.push(other),
                            }
                        }
                        _ => break,
                    }
                }
                Some('$') if self.peek(1) == Some('{') => {
                    self.bump();
                    self.bump();
                    if !lit.is_empty() {
                        parts.push(RawPart::Lit(std::mem::take(&mut lit)));
                    }
                    let (src, line, col) = self.scan_interp_group()?;
                    parts.push(RawPart::Interp { src, line, col });
                }
                Some(_) => lit.push(self.bump().unwrap()),
            }
        }
        if !lit.is_empty() || parts.is_empty() {
            parts.push(RawPart::Lit(lit));
        }
        Ok(parts)
    }

    fn scan_path_literal(&mut self) -> Result<Vec<RawPart>, SporeError> {
        let mut parts = Vec::new();
        let mut lit = String::new();
        // Leading anchor: `~/`, `./`, `../`, `/`, or a relative first segment.
        if self.cur() == Some('~') {
            lit.push(self.bump().unwrap());
        }
        loop {
            match self.cur() {
                Some(c) if is_path_char(c) || c == '/' => {
                    lit.push(self.bump().unwrap());
                }
                Some('$') if self.peek(1) == Some('{') => {
                    self.bump();
                    self.bump();
                    if !lit.is_empty() {
                        parts.push(RawPart::Lit(std::mem::take(&mut lit)));
                    }
                    let (src, line, col) = self.scan_interp_group()?;
                    parts.push(RawPart::Interp { src, line, col });
                }
                _ => break,
            }
        }
        if !lit.is_empty() {
            parts.push(RawPart::Lit(lit));
        }
        if parts.is_empty() {
            return Err(self.error("empty path literal"));
        }
        Ok(parts)
    }
}

// ── Indented-string stripping ─────────────────────────────────────

/// Remove the common leading indentation from the lines of an indented
/// string. Whitespace-only lines do not count towards the minimum;
/// interpolation at the start of a line pins the minimum at the current
/// indent.
fn strip_indentation(parts: Vec<RawPart>) -> Vec<RawPart> {
    // Pass 1: find the minimum indentation.
    let mut min_indent = usize::MAX;
    let mut cur_indent = 0usize;
    let mut at_line_start = true;
    for part in &parts {
        match part {
            RawPart::Lit(text) => {
                for c in text.chars() {
                    if at_line_start {
                        match c {
                            ' ' => cur_indent += 1,
                            '\n' => cur_indent = 0,
                            _ => {
                                min_indent = min_indent.min(cur_indent);
                                at_line_start = false;
                            }
                        }
                    } else if c == '\n' {
                        at_line_start = true;
                        cur_indent = 0;
                    }
                }
            }
            RawPart::Interp { .. } => {
                if at_line_start {
                    min_indent = min_indent.min(cur_indent);
                    at_line_start = false;
                }
            }
        }
    }
    if min_indent == usize::MAX || min_indent == 0 {
        return drop_leading_blank_line(parts, 0);
    }

    // Pass 2: strip it.
    let mut out = Vec::with_capacity(parts.len());
    let mut dropped = 0usize;
    let mut at_line_start = true;
    for part in parts {
        match part {
            RawPart::Lit(text) => {
                let mut stripped = String::with_capacity(text.len());
                for c in text.chars() {
                    if at_line_start {
                        match c {
                            ' ' if dropped < min_indent => {
                                dropped += 1;
                                continue;
                            }
                            '\n' => {
                                dropped = 0;
                                stripped.push('\n');
                                continue;
                            }
                            _ => at_line_start = false,
                        }
                    } else if c == '\n' {
                        at_line_start = true;
                        dropped = 0;
                    }
                    stripped.push(c);
                }
                out.push(RawPart::Lit(stripped));
            }
            interp => {
                at_line_start = false;
                out.push(interp);
            }
        }
    }
    drop_leading_blank_line(out, min_indent)
}

/// `''` followed directly by a newline starts the content on the next
/// line; drop that first blank line.
fn drop_leading_blank_line(mut parts: Vec<RawPart>, _min_indent: usize) -> Vec<RawPart> {
    if let Some(RawPart::Lit(first)) = parts.first_mut() {
        if let Some(rest) = first.strip_prefix('\n') {
            *first = rest.to_string();
        }
    }
    parts
}
