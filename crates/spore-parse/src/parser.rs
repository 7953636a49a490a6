use std::path::{Path, PathBuf};
use std::rc::Rc;

use spore_core::ast::{
    AttrDef, AttrName, AttrsExpr, BinOp, DynamicAttrDef, Expr, ExprRef, ExprVar, Formal, Formals,
    LambdaExpr, PathAnchor, StrPart,
};
use spore_core::error::SporeError;
use spore_core::pos::{add_pos, OriginId, PosIdx};
use spore_core::symbol::Symbol;

use crate::lexer::{tokenize_at, RawPart, SpannedToken, Token};

// ── Parser ────────────────────────────────────────────────────────

pub struct Parser {
    tokens: Vec<SpannedToken>,
    i: usize,
    origin: OriginId,
    base_dir: PathBuf,
    home_dir: Option<PathBuf>,
}

impl Parser {
    pub fn new(
        tokens: Vec<SpannedToken>,
        origin: OriginId,
        base_dir: PathBuf,
        home_dir: Option<PathBuf>,
    ) -> Self {
        Parser {
            tokens,
            i: 0,
            origin,
            base_dir,
            home_dir,
        }
    }

    /// Parse a complete expression; trailing tokens are an error.
    pub fn parse_toplevel(&mut self) -> Result<ExprRef, SporeError> {
        let expr = self.parse_expr()?;
        if let Some(tok) = self.tokens.get(self.i) {
            return Err(SporeError::parse(
                format!("unexpected {} after expression", describe(&tok.token)),
                add_pos(self.origin, tok.line, tok.col),
            ));
        }
        Ok(expr)
    }

    // -- token helpers --

    fn peek(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.i + offset).map(|t| &t.token)
    }

    fn cur(&self) -> Option<&Token> {
        self.peek(0)
    }

    fn cur_pos(&self) -> PosIdx {
        match self.tokens.get(self.i) {
            Some(tok) => add_pos(self.origin, tok.line, tok.col),
            None => self
                .tokens
                .last()
                .map(|tok| add_pos(self.origin, tok.line, tok.col))
                .unwrap_or(spore_core::pos::NO_POS),
        }
    }

    fn bump(&mut self) -> Option<SpannedToken> {
        let tok = self.tokens.get(self.i).cloned();
        if tok.is_some() {
            self.i += 1;
        }
        tok
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.cur() == Some(expected) {
            self.i += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token, what: &str) -> Result<PosIdx, SporeError> {
        let pos = self.cur_pos();
        if self.eat(expected) {
            Ok(pos)
        } else {
            Err(self.unexpected(what))
        }
    }

    fn unexpected(&self, what: &str) -> SporeError {
        let found = match self.cur() {
            Some(tok) => describe(tok),
            None => "end of input".to_string(),
        };
        SporeError::parse(format!("expected {what}, found {found}"), self.cur_pos())
    }

    // -- expression levels --

    /// Lambdas, `let`, `with`, `assert`, `if`, then the operator ladder.
    pub fn parse_expr(&mut self) -> Result<ExprRef, SporeError> {
        match self.cur() {
            Some(Token::Id(_)) if matches!(self.peek(1), Some(Token::Colon) | Some(Token::At)) => {
                self.parse_lambda()
            }
            Some(Token::LBrace) if self.brace_starts_formals() => self.parse_lambda(),
            Some(Token::Assert) => {
                let pos = self.cur_pos();
                self.bump();
                let cond = self.parse_expr()?;
                self.expect(&Token::Semi, "';' after assert condition")?;
                let body = self.parse_expr()?;
                Ok(Rc::new(Expr::Assert { cond, body, pos }))
            }
            Some(Token::With) => {
                let pos = self.cur_pos();
                self.bump();
                let namespace = self.parse_expr()?;
                self.expect(&Token::Semi, "';' after with namespace")?;
                let body = self.parse_expr()?;
                Ok(Rc::new(Expr::With {
                    namespace,
                    body,
                    pos,
                }))
            }
            Some(Token::Let) => {
                let pos = self.cur_pos();
                self.bump();
                let bindings = self.parse_binds(Token::In, true)?;
                let body = self.parse_expr()?;
                if !bindings.dynamic.is_empty() {
                    return Err(SporeError::parse(
                        "dynamic attributes are not allowed in let",
                        bindings.dynamic[0].pos,
                    ));
                }
                Ok(Rc::new(Expr::Let {
                    bindings,
                    body,
                    pos,
                }))
            }
            Some(Token::If) => {
                let pos = self.cur_pos();
                self.bump();
                let cond = self.parse_expr()?;
                self.expect(&Token::Then, "'then'")?;
                let then = self.parse_expr()?;
                self.expect(&Token::Else, "'else'")?;
                let otherwise = self.parse_expr()?;
                Ok(Rc::new(Expr::If {
                    cond,
                    then,
                    otherwise,
                    pos,
                }))
            }
            _ => self.parse_op_impl(),
        }
    }

    /// Is the `{` at the cursor the start of a formals pattern rather than
    /// an attrset literal? Decided by finding the matching `}` and looking
    /// for `:` or `@` after it.
    fn brace_starts_formals(&self) -> bool {
        debug_assert_eq!(self.cur(), Some(&Token::LBrace));
        let mut depth = 0usize;
        let mut j = self.i;
        while let Some(tok) = self.tokens.get(j) {
            match tok.token {
                Token::LBrace => depth += 1,
                Token::RBrace => {
                    depth -= 1;
                    if depth == 0 {
                        return matches!(
                            self.tokens.get(j + 1).map(|t| &t.token),
                            Some(Token::Colon) | Some(Token::At)
                        );
                    }
                }
                _ => {}
            }
            j += 1;
        }
        false
    }

    fn parse_lambda(&mut self) -> Result<ExprRef, SporeError> {
        let pos = self.cur_pos();
        let (arg, formals) = match self.cur().cloned() {
            Some(Token::Id(name)) => {
                let sym = Symbol::intern(&name);
                self.bump();
                if self.eat(&Token::At) {
                    // name@{ formals }: body
                    self.expect(&Token::LBrace, "'{' after '@'")?;
                    let formals = self.parse_formals()?;
                    (Some(sym), Some(formals))
                } else {
                    (Some(sym), None)
                }
            }
            Some(Token::LBrace) => {
                self.bump();
                let formals = self.parse_formals()?;
                if self.eat(&Token::At) {
                    // { formals }@name: body
                    let name = match self.bump().map(|t| t.token) {
                        Some(Token::Id(name)) => Symbol::intern(&name),
                        _ => return Err(self.unexpected("argument name after '@'")),
                    };
                    (Some(name), Some(formals))
                } else {
                    (None, Some(formals))
                }
            }
            _ => return Err(self.unexpected("lambda argument")),
        };
        self.expect(&Token::Colon, "':' after lambda argument")?;
        let body = self.parse_expr()?;
        Ok(Rc::new(Expr::Lambda(Rc::new(LambdaExpr {
            name: std::cell::Cell::new(None),
            arg,
            formals,
            body,
            pos,
        }))))
    }

    /// Formals after the opening `{`; consumes the closing `}`.
    fn parse_formals(&mut self) -> Result<Formals, SporeError> {
        let mut formals: Vec<Formal> = Vec::new();
        let mut ellipsis = false;
        loop {
            match self.cur().cloned() {
                Some(Token::RBrace) => {
                    self.bump();
                    break;
                }
                Some(Token::Ellipsis) => {
                    self.bump();
                    ellipsis = true;
                    self.expect(&Token::RBrace, "'}' after '...'")?;
                    break;
                }
                Some(Token::Id(name)) => {
                    let pos = self.cur_pos();
                    self.bump();
                    let sym = Symbol::intern(&name);
                    if formals.iter().any(|f| f.name == sym) {
                        return Err(SporeError::parse(
                            format!("duplicate formal function argument '{name}'"),
                            pos,
                        ));
                    }
                    let default = if self.eat(&Token::Question) {
                        Some(self.parse_expr()?)
                    } else {
                        None
                    };
                    formals.push(Formal {
                        name: sym,
                        default,
                        pos,
                    });
                    if !self.eat(&Token::Comma) {
                        self.expect(&Token::RBrace, "'}' or ',' in formals")?;
                        break;
                    }
                }
                _ => return Err(self.unexpected("formal argument")),
            }
        }
        Ok(Formals { formals, ellipsis })
    }

    // Operator ladder, loosest first. Mirrors the original grammar's
    // precedence: -> || && ==/!= </<=/>/>= // ! +/- */ ++ ? -(unary),
    // then application and select.

    fn parse_op_impl(&mut self) -> Result<ExprRef, SporeError> {
        let lhs = self.parse_op_or()?;
        if self.cur() == Some(&Token::Impl) {
            let pos = self.cur_pos();
            self.bump();
            let rhs = self.parse_op_impl()?;
            return Ok(Rc::new(Expr::BinOp {
                op: BinOp::Impl,
                lhs,
                rhs,
                pos,
            }));
        }
        Ok(lhs)
    }

    fn parse_op_or(&mut self) -> Result<ExprRef, SporeError> {
        let mut lhs = self.parse_op_and()?;
        while self.cur() == Some(&Token::OrOr) {
            let pos = self.cur_pos();
            self.bump();
            let rhs = self.parse_op_and()?;
            lhs = Rc::new(Expr::BinOp {
                op: BinOp::Or,
                lhs,
                rhs,
                pos,
            });
        }
        Ok(lhs)
    }

    fn parse_op_and(&mut self) -> Result<ExprRef, SporeError> {
        let mut lhs = self.parse_op_eq()?;
        while self.cur() == Some(&Token::AndAnd) {
            let pos = self.cur_pos();
            self.bump();
            let rhs = self.parse_op_eq()?;
            lhs = Rc::new(Expr::BinOp {
                op: BinOp::And,
                lhs,
                rhs,
                pos,
            });
        }
        Ok(lhs)
    }

    fn parse_op_eq(&mut self) -> Result<ExprRef, SporeError> {
        let lhs = self.parse_op_cmp()?;
        let op = match self.cur() {
            Some(Token::Eq) => BinOp::Eq,
            Some(Token::Ne) => BinOp::Ne,
            _ => return Ok(lhs),
        };
        let pos = self.cur_pos();
        self.bump();
        let rhs = self.parse_op_cmp()?;
        Ok(Rc::new(Expr::BinOp { op, lhs, rhs, pos }))
    }

    fn parse_op_cmp(&mut self) -> Result<ExprRef, SporeError> {
        let lhs = self.parse_op_update()?;
        let op = match self.cur() {
            Some(Token::Lt) => BinOp::Lt,
            Some(Token::Le) => BinOp::Le,
            Some(Token::Gt) => BinOp::Gt,
            Some(Token::Ge) => BinOp::Ge,
            _ => return Ok(lhs),
        };
        let pos = self.cur_pos();
        self.bump();
        let rhs = self.parse_op_update()?;
        Ok(Rc::new(Expr::BinOp { op, lhs, rhs, pos }))
    }

    fn parse_op_update(&mut self) -> Result<ExprRef, SporeError> {
        let lhs = self.parse_op_not()?;
        if self.cur() == Some(&Token::Update) {
            let pos = self.cur_pos();
            self.bump();
            let rhs = self.parse_op_update()?;
            return Ok(Rc::new(Expr::BinOp {
                op: BinOp::Update,
                lhs,
                rhs,
                pos,
            }));
        }
        Ok(lhs)
    }

    fn parse_op_not(&mut self) -> Result<ExprRef, SporeError> {
        if self.cur() == Some(&Token::Not) {
            let pos = self.cur_pos();
            self.bump();
            let expr = self.parse_op_not()?;
            return Ok(Rc::new(Expr::Not { expr, pos }));
        }
        self.parse_op_add()
    }

    fn parse_op_add(&mut self) -> Result<ExprRef, SporeError> {
        let mut lhs = self.parse_op_mul()?;
        loop {
            match self.cur() {
                Some(Token::Plus) => {
                    let pos = self.cur_pos();
                    self.bump();
                    let rhs = self.parse_op_mul()?;
                    // Chains of + fold into one concatenation node so the
                    // first operand's type decides the result once.
                    lhs = match Rc::try_unwrap(lhs) {
                        Ok(Expr::ConcatStrings {
                            force_string: false,
                            mut parts,
                            pos: chain_pos,
                        }) => {
                            parts.push((pos, rhs));
                            Rc::new(Expr::ConcatStrings {
                                force_string: false,
                                parts,
                                pos: chain_pos,
                            })
                        }
                        Ok(other) => {
                            let lhs = Rc::new(other);
                            let chain_pos = lhs.pos().or(pos);
                            Rc::new(Expr::ConcatStrings {
                                force_string: false,
                                parts: vec![(lhs.pos(), lhs), (pos, rhs)],
                                pos: chain_pos,
                            })
                        }
                        Err(shared) => {
                            let chain_pos = shared.pos().or(pos);
                            Rc::new(Expr::ConcatStrings {
                                force_string: false,
                                parts: vec![(shared.pos(), shared), (pos, rhs)],
                                pos: chain_pos,
                            })
                        }
                    };
                }
                Some(Token::Minus) => {
                    let pos = self.cur_pos();
                    self.bump();
                    let rhs = self.parse_op_mul()?;
                    lhs = Rc::new(Expr::BinOp {
                        op: BinOp::Sub,
                        lhs,
                        rhs,
                        pos,
                    });
                }
                _ => return Ok(lhs),
            }
        }
    }

    fn parse_op_mul(&mut self) -> Result<ExprRef, SporeError> {
        let mut lhs = self.parse_op_concat()?;
        loop {
            let op = match self.cur() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                _ => return Ok(lhs),
            };
            let pos = self.cur_pos();
            self.bump();
            let rhs = self.parse_op_concat()?;
            lhs = Rc::new(Expr::BinOp { op, lhs, rhs, pos });
        }
    }

    fn parse_op_concat(&mut self) -> Result<ExprRef, SporeError> {
        let lhs = self.parse_op_has_attr()?;
        if self.cur() == Some(&Token::Concat) {
            let pos = self.cur_pos();
            self.bump();
            let rhs = self.parse_op_concat()?;
            return Ok(Rc::new(Expr::BinOp {
                op: BinOp::ListConcat,
                lhs,
                rhs,
                pos,
            }));
        }
        Ok(lhs)
    }

    fn parse_op_has_attr(&mut self) -> Result<ExprRef, SporeError> {
        let subject = self.parse_op_negate()?;
        if self.cur() == Some(&Token::Question) {
            let pos = self.cur_pos();
            self.bump();
            let path = self.parse_attrpath()?;
            return Ok(Rc::new(Expr::HasAttr { subject, path, pos }));
        }
        Ok(subject)
    }

    fn parse_op_negate(&mut self) -> Result<ExprRef, SporeError> {
        if self.cur() == Some(&Token::Minus) {
            let pos = self.cur_pos();
            self.bump();
            let expr = self.parse_op_negate()?;
            return Ok(Rc::new(Expr::Negate { expr, pos }));
        }
        self.parse_app()
    }

    fn parse_app(&mut self) -> Result<ExprRef, SporeError> {
        let pos = self.cur_pos();
        let func = self.parse_select()?;
        let mut args = Vec::new();
        while self.starts_atom() {
            args.push(self.parse_select()?);
        }
        if args.is_empty() {
            Ok(func)
        } else {
            Ok(Rc::new(Expr::Call { func, args, pos }))
        }
    }

    fn starts_atom(&self) -> bool {
        matches!(
            self.cur(),
            Some(Token::Id(_))
                | Some(Token::Int(_))
                | Some(Token::Float(_))
                | Some(Token::Str(_))
                | Some(Token::IndentStr(_))
                | Some(Token::PathLit(_))
                | Some(Token::SearchPath(_))
                | Some(Token::Uri(_))
                | Some(Token::LParen)
                | Some(Token::LBrace)
                | Some(Token::LBracket)
                | Some(Token::Rec)
        )
    }

    fn parse_select(&mut self) -> Result<ExprRef, SporeError> {
        let subject = self.parse_atom()?;
        if self.cur() != Some(&Token::Dot) {
            return Ok(subject);
        }
        let pos = self.cur_pos();
        self.bump();
        let mut path = vec![self.parse_attrpath_component()?];
        while self.eat(&Token::Dot) {
            path.push(self.parse_attrpath_component()?);
        }
        let or_default = if self.eat(&Token::OrKw) {
            Some(self.parse_select()?)
        } else {
            None
        };
        Ok(Rc::new(Expr::Select {
            subject,
            path,
            or_default,
            pos,
        }))
    }

    fn parse_attrpath(&mut self) -> Result<Vec<AttrName>, SporeError> {
        let mut path = vec![self.parse_attrpath_component()?];
        while self.eat(&Token::Dot) {
            path.push(self.parse_attrpath_component()?);
        }
        Ok(path)
    }

    fn parse_attrpath_component(&mut self) -> Result<AttrName, SporeError> {
        match self.cur().cloned() {
            Some(Token::Id(name)) => {
                self.bump();
                Ok(AttrName::Static(Symbol::intern(&name)))
            }
            Some(Token::OrKw) => {
                self.bump();
                Ok(AttrName::Static(Symbol::intern("or")))
            }
            Some(Token::Str(parts)) => {
                let pos = self.cur_pos();
                self.bump();
                match single_literal(&parts) {
                    Some(text) => Ok(AttrName::Static(Symbol::intern(text))),
                    None => Ok(AttrName::Dynamic(self.str_parts_to_expr(parts, pos, true)?)),
                }
            }
            Some(Token::Interp { src, line, col }) => {
                self.bump();
                Ok(AttrName::Dynamic(self.parse_interp(&src, line, col)?))
            }
            _ => Err(self.unexpected("attribute name")),
        }
    }

    fn parse_atom(&mut self) -> Result<ExprRef, SporeError> {
        let pos = self.cur_pos();
        match self.cur().cloned() {
            Some(Token::Int(n)) => {
                self.bump();
                Ok(Rc::new(Expr::Int { n, pos }))
            }
            Some(Token::Float(f)) => {
                self.bump();
                Ok(Rc::new(Expr::Float { f, pos }))
            }
            Some(Token::Id(name)) => {
                self.bump();
                if name == "__curPos" {
                    Ok(Rc::new(Expr::CurPos { pos }))
                } else {
                    Ok(Rc::new(Expr::Var(ExprVar::new(Symbol::intern(&name), pos))))
                }
            }
            Some(Token::Str(parts)) | Some(Token::IndentStr(parts)) => {
                self.bump();
                self.str_parts_to_expr(parts, pos, false)
            }
            Some(Token::Uri(uri)) => {
                self.bump();
                Ok(Rc::new(Expr::Str {
                    parts: vec![StrPart::Lit(uri)],
                    pos,
                }))
            }
            Some(Token::PathLit(parts)) => {
                self.bump();
                self.path_parts_to_expr(parts, pos)
            }
            Some(Token::SearchPath(inner)) => {
                self.bump();
                Ok(Rc::new(Expr::Path {
                    anchor: PathAnchor::Search,
                    base: PathBuf::from(inner),
                    parts: Vec::new(),
                    pos,
                }))
            }
            Some(Token::LParen) => {
                self.bump();
                let expr = self.parse_expr()?;
                self.expect(&Token::RParen, "')'")?;
                Ok(expr)
            }
            Some(Token::LBracket) => {
                self.bump();
                let mut items = Vec::new();
                while !self.eat(&Token::RBracket) {
                    if self.cur().is_none() {
                        return Err(self.unexpected("']'"));
                    }
                    items.push(self.parse_select()?);
                }
                Ok(Rc::new(Expr::List { items, pos }))
            }
            Some(Token::Rec) => {
                self.bump();
                self.expect(&Token::LBrace, "'{' after rec")?;
                let mut attrs = self.parse_binds(Token::RBrace, true)?;
                attrs.pos = pos;
                Ok(Rc::new(Expr::Attrs(attrs)))
            }
            Some(Token::LBrace) => {
                self.bump();
                let mut attrs = self.parse_binds(Token::RBrace, false)?;
                attrs.pos = pos;
                Ok(Rc::new(Expr::Attrs(attrs)))
            }
            _ => Err(self.unexpected("an expression")),
        }
    }

    fn parse_interp(&mut self, src: &str, line: u32, col: u32) -> Result<ExprRef, SporeError> {
        let tokens = tokenize_at(src, self.origin, line, col)?;
        let mut sub = Parser::new(
            tokens,
            self.origin,
            self.base_dir.clone(),
            self.home_dir.clone(),
        );
        sub.parse_toplevel()
    }

    /// Turn lexer string parts into an expression. A single literal part
    /// stays a plain string; interpolation becomes a string-typed
    /// concatenation node.
    fn str_parts_to_expr(
        &mut self,
        parts: Vec<RawPart>,
        pos: PosIdx,
        _dynamic_key: bool,
    ) -> Result<ExprRef, SporeError> {
        let mut out = Vec::with_capacity(parts.len());
        for part in parts {
            match part {
                RawPart::Lit(text) => out.push(StrPart::Lit(text)),
                RawPart::Interp { src, line, col } => {
                    out.push(StrPart::Interp(self.parse_interp(&src, line, col)?))
                }
            }
        }
        Ok(Rc::new(Expr::Str { parts: out, pos }))
    }

    fn path_parts_to_expr(
        &mut self,
        parts: Vec<RawPart>,
        pos: PosIdx,
    ) -> Result<ExprRef, SporeError> {
        let mut iter = parts.into_iter();
        let first = match iter.next() {
            Some(RawPart::Lit(text)) => text,
            _ => return Err(SporeError::parse("malformed path literal", pos)),
        };
        let (anchor, base) = if let Some(rest) = first.strip_prefix("~/") {
            let home = self.home_dir.clone().ok_or_else(|| {
                SporeError::parse("cannot resolve '~' without a home directory", pos)
            })?;
            (PathAnchor::Home, home.join(rest))
        } else if first.starts_with('/') {
            (PathAnchor::Absolute, PathBuf::from(first))
        } else {
            (PathAnchor::Relative, self.base_dir.join(first))
        };
        let mut rest_parts = Vec::new();
        for part in iter {
            match part {
                RawPart::Lit(text) => rest_parts.push(StrPart::Lit(text)),
                RawPart::Interp { src, line, col } => {
                    rest_parts.push(StrPart::Interp(self.parse_interp(&src, line, col)?))
                }
            }
        }
        Ok(Rc::new(Expr::Path {
            anchor,
            base,
            parts: rest_parts,
            pos,
        }))
    }

    // -- binds (attrset bodies and let) --

    /// Parse attribute definitions up to (and consuming) `terminator`.
    fn parse_binds(
        &mut self,
        terminator: Token,
        recursive: bool,
    ) -> Result<AttrsExpr, SporeError> {
        let mut builder = BindsBuilder::default();
        let start_pos = self.cur_pos();
        loop {
            if self.eat(&terminator) {
                break;
            }
            match self.cur().cloned() {
                None => return Err(self.unexpected("attribute definition")),
                Some(Token::Inherit) => {
                    self.bump();
                    let from = if self.eat(&Token::LParen) {
                        let from = self.parse_expr()?;
                        self.expect(&Token::RParen, "')'")?;
                        Some(from)
                    } else {
                        None
                    };
                    loop {
                        let pos = self.cur_pos();
                        let name = match self.cur().cloned() {
                            Some(Token::Semi) => {
                                self.bump();
                                break;
                            }
                            Some(Token::Id(name)) => {
                                self.bump();
                                Symbol::intern(&name)
                            }
                            Some(Token::Str(parts)) => {
                                self.bump();
                                match single_literal(&parts) {
                                    Some(text) => Symbol::intern(text),
                                    None => {
                                        return Err(SporeError::parse(
                                            "dynamic attributes are not allowed in inherit",
                                            pos,
                                        ))
                                    }
                                }
                            }
                            _ => return Err(self.unexpected("inherited attribute name")),
                        };
                        let (value, inherited): (ExprRef, bool) = match &from {
                            // `inherit (e) x` looks up x in e; resolves in
                            // the scope of the attrset itself.
                            Some(from) => (
                                Rc::new(Expr::Select {
                                    subject: from.clone(),
                                    path: vec![AttrName::Static(name)],
                                    or_default: None,
                                    pos,
                                }),
                                false,
                            ),
                            // `inherit x` copies x from the enclosing
                            // scope, skipping the recursive frame.
                            None => (Rc::new(Expr::Var(ExprVar::new(name, pos))), true),
                        };
                        builder.define_leaf(name, value, pos, inherited)?;
                    }
                }
                Some(_) => {
                    // attrpath '=' expr ';'
                    let pos = self.cur_pos();
                    let path = self.parse_attrpath()?;
                    self.expect(&Token::Assign, "'=' in attribute definition")?;
                    let value = self.parse_expr()?;
                    self.expect(&Token::Semi, "';' after attribute definition")?;
                    builder.define_path(&path, value, pos)?;
                }
            }
        }
        Ok(builder.finish(recursive, start_pos))
    }
}

fn single_literal(parts: &[RawPart]) -> Option<&str> {
    match parts {
        [RawPart::Lit(text)] => Some(text),
        _ => None,
    }
}

fn describe(token: &Token) -> String {
    match token {
        Token::Int(n) => format!("integer {n}"),
        Token::Float(f) => format!("float {f}"),
        Token::Id(name) => format!("identifier '{name}'"),
        Token::Str(_) | Token::IndentStr(_) => "a string".to_string(),
        Token::PathLit(_) => "a path".to_string(),
        Token::SearchPath(_) => "a search path".to_string(),
        Token::Uri(_) => "a URI".to_string(),
        Token::Interp { .. } => "'${'".to_string(),
        other => format!("'{other:?}'"),
    }
}

// ── Attrpath desugaring ───────────────────────────────────────────
//
// `a.b.c = v;` builds nested (non-recursive) attrsets, merging with
// sibling definitions that share a prefix. Leaf collisions and
// plain/nested collisions are parse errors, as in the original.

#[derive(Default)]
struct BindsBuilder {
    entries: Vec<(Symbol, BindEntry, PosIdx)>,
    dynamic: Vec<DynamicAttrDef>,
}

enum BindEntry {
    Plain { value: ExprRef, inherited: bool },
    Nested(BindsBuilder),
}

impl BindsBuilder {
    fn define_leaf(
        &mut self,
        name: Symbol,
        value: ExprRef,
        pos: PosIdx,
        inherited: bool,
    ) -> Result<(), SporeError> {
        if self.entries.iter().any(|(n, _, _)| *n == name) {
            return Err(SporeError::parse(
                format!("attribute '{name}' already defined"),
                pos,
            ));
        }
        if let Expr::Lambda(lambda) = &*value {
            if lambda.name.get().is_none() {
                lambda.name.set(Some(name));
            }
        }
        self.entries
            .push((name, BindEntry::Plain { value, inherited }, pos));
        Ok(())
    }

    fn define_path(
        &mut self,
        path: &[AttrName],
        value: ExprRef,
        pos: PosIdx,
    ) -> Result<(), SporeError> {
        match path {
            [] => unreachable!("empty attrpath"),
            [AttrName::Static(name)] => self.define_leaf(*name, value, pos, false),
            [AttrName::Dynamic(name_expr)] => {
                self.dynamic.push(DynamicAttrDef {
                    name_expr: name_expr.clone(),
                    value,
                    pos,
                });
                Ok(())
            }
            [AttrName::Static(name), rest @ ..] => {
                let idx = match self.entries.iter().position(|(n, _, _)| *n == *name) {
                    Some(i) => {
                        if !matches!(self.entries[i].1, BindEntry::Nested(_)) {
                            return Err(SporeError::parse(
                                format!("attribute '{name}' already defined"),
                                pos,
                            ));
                        }
                        i
                    }
                    None => {
                        self.entries
                            .push((*name, BindEntry::Nested(BindsBuilder::default()), pos));
                        self.entries.len() - 1
                    }
                };
                match &mut self.entries[idx].1 {
                    BindEntry::Nested(nested) => nested.define_path(rest, value, pos),
                    _ => unreachable!("checked above"),
                }
            }
            [AttrName::Dynamic(name_expr), rest @ ..] => {
                // The remainder becomes a nested attrset under a dynamic key.
                let mut nested = BindsBuilder::default();
                nested.define_path(rest, value, pos)?;
                let nested_expr = Rc::new(Expr::Attrs(nested.finish(false, pos)));
                self.dynamic.push(DynamicAttrDef {
                    name_expr: name_expr.clone(),
                    value: nested_expr,
                    pos,
                });
                Ok(())
            }
        }
    }

    fn finish(self, recursive: bool, pos: PosIdx) -> AttrsExpr {
        let attrs = self
            .entries
            .into_iter()
            .map(|(name, entry, def_pos)| match entry {
                BindEntry::Plain { value, inherited } => AttrDef {
                    name,
                    value,
                    pos: def_pos,
                    inherited,
                },
                BindEntry::Nested(nested) => AttrDef {
                    name,
                    value: Rc::new(Expr::Attrs(nested.finish(false, def_pos))),
                    pos: def_pos,
                    inherited: false,
                },
            })
            .collect();
        AttrsExpr {
            recursive,
            attrs,
            dynamic: self.dynamic,
            pos,
        }
    }
}
