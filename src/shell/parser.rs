//! Recursive-descent parser: token stream (`lexer::Token`) to AST
//! (`ast::Statement`). Grammar follows the POSIX shell grammar's shape
//! (command -> pipeline -> and_or -> list) closely enough to support the
//! constructs spec.md §4.4 names, without chasing full POSIX conformance
//! (explicitly a Non-goal).

use std::iter::Peekable;
use std::vec::IntoIter;

use super::ast::*;
use super::error::ShellError;
use super::lexer::{Lexer, Token};

/// Parse a full shell script into its top-level statement list.
pub fn parse(src: &str) -> Result<Vec<Statement>, ShellError> {
    let tokens = Lexer::new(src).tokenize()?;
    let mut parser = Parser {
        tokens: tokens.into_iter().peekable(),
    };
    parser.parse_statement_list(&[])
}

/// Parse `src` as a single word, for contexts (like `${name:-default}`)
/// that need one word's worth of parts rather than a whole statement list.
pub fn parse_word(src: &str) -> Result<Word, ShellError> {
    let tokens = Lexer::new(src).tokenize()?;
    let mut parts = Vec::new();
    for tok in tokens {
        if let Token::Word(w) = tok {
            parts.extend(w.parts);
        }
    }
    Ok(Word { parts })
}

struct Parser {
    tokens: Peekable<IntoIter<Token>>,
}

/// Tokens that terminate a statement list when parsing a nested block
/// (`then`/`fi`, `do`/`done`, a closing paren, etc). Expressed as bare
/// keywords recognized from `Word` literals, since this grammar treats
/// keywords as ordinary words at the lexer level (as real shells do).
fn word_is(tok: &Token, kw: &str) -> bool {
    matches!(tok, Token::Word(w) if is_plain_literal(w, kw))
}

fn is_plain_literal(w: &Word, s: &str) -> bool {
    matches!(&w.parts[..], [WordPart::Literal(lit)] if lit == s)
}

impl Parser {
    fn peek(&mut self) -> Option<&Token> {
        self.tokens.peek()
    }

    fn next(&mut self) -> Option<Token> {
        self.tokens.next()
    }

    fn skip_separators(&mut self) {
        while matches!(self.peek(), Some(Token::Newline) | Some(Token::Semi)) {
            self.next();
        }
    }

    fn at_stop(&mut self, stop_words: &[&str]) -> bool {
        match self.peek() {
            None => true,
            Some(tok) => stop_words.iter().any(|kw| word_is(tok, kw)),
        }
    }

    fn parse_statement_list(&mut self, stop_words: &[&str]) -> Result<Vec<Statement>, ShellError> {
        let mut statements = Vec::new();
        self.skip_separators();
        while !self.at_stop(stop_words) {
            let stmt = self.parse_statement()?;
            statements.push(stmt);
            self.skip_separators();
        }
        Ok(statements)
    }

    fn parse_statement(&mut self) -> Result<Statement, ShellError> {
        let list = self.parse_and_or()?;
        let background = matches!(self.peek(), Some(Token::Amp));
        if background {
            self.next();
        } else if matches!(self.peek(), Some(Token::Semi)) {
            self.next();
        }
        Ok(Statement { list, background })
    }

    fn parse_and_or(&mut self) -> Result<AndOrList, ShellError> {
        let first = self.parse_pipeline()?;
        let mut rest = Vec::new();
        loop {
            match self.peek() {
                Some(Token::AndAnd) => {
                    self.next();
                    self.skip_newlines();
                    rest.push((LogicOp::And, self.parse_pipeline()?));
                }
                Some(Token::OrOr) => {
                    self.next();
                    self.skip_newlines();
                    rest.push((LogicOp::Or, self.parse_pipeline()?));
                }
                _ => break,
            }
        }
        Ok(AndOrList { first, rest })
    }

    fn skip_newlines(&mut self) {
        while matches!(self.peek(), Some(Token::Newline)) {
            self.next();
        }
    }

    fn parse_pipeline(&mut self) -> Result<Pipeline, ShellError> {
        let negate = matches!(self.peek(), Some(Token::Bang));
        if negate {
            self.next();
        }
        let mut commands = vec![self.parse_command()?];
        while matches!(self.peek(), Some(Token::Pipe)) {
            self.next();
            self.skip_newlines();
            commands.push(self.parse_command()?);
        }
        Ok(Pipeline { commands, negate })
    }

    fn parse_command(&mut self) -> Result<Command, ShellError> {
        match self.peek() {
            Some(tok) if word_is(tok, "if") => self.parse_if(),
            Some(tok) if word_is(tok, "while") => self.parse_while(false),
            Some(tok) if word_is(tok, "until") => self.parse_while(true),
            Some(tok) if word_is(tok, "for") => self.parse_for(),
            Some(tok) if word_is(tok, "case") => self.parse_case(),
            Some(Token::LBrace) => {
                self.next();
                let body = self.parse_statement_list_until_rbrace()?;
                Ok(Command::Group(Box::new(body)))
            }
            Some(Token::LParen) => {
                self.next();
                let body = self.parse_statement_list(&[])?;
                self.expect(Token::RParen)?;
                Ok(Command::Subshell(Box::new(body)))
            }
            _ => self.parse_simple_or_function(),
        }
    }

    fn parse_statement_list_until_rbrace(&mut self) -> Result<Vec<Statement>, ShellError> {
        let mut statements = Vec::new();
        self.skip_separators();
        while !matches!(self.peek(), Some(Token::RBrace) | None) {
            statements.push(self.parse_statement()?);
            self.skip_separators();
        }
        self.expect(Token::RBrace)?;
        Ok(statements)
    }

    fn expect_keyword(&mut self, kw: &str) -> Result<(), ShellError> {
        match self.next() {
            Some(tok) if word_is(&tok, kw) => Ok(()),
            other => Err(ShellError::Syntax(format!("expected `{kw}`, found {other:?}"))),
        }
    }

    fn expect(&mut self, tok: Token) -> Result<(), ShellError> {
        match self.next() {
            Some(t) if t == tok => Ok(()),
            other => Err(ShellError::Syntax(format!("expected {tok:?}, found {other:?}"))),
        }
    }

    fn parse_if(&mut self) -> Result<Command, ShellError> {
        self.expect_keyword("if")?;
        let cond = self.parse_statement_list(&["then"])?;
        self.expect_keyword("then")?;
        let then_branch = self.parse_statement_list(&["elif", "else", "fi"])?;
        let mut elifs = Vec::new();
        while matches!(self.peek(), Some(tok) if word_is(tok, "elif")) {
            self.next();
            let elif_cond = self.parse_statement_list(&["then"])?;
            self.expect_keyword("then")?;
            let elif_body = self.parse_statement_list(&["elif", "else", "fi"])?;
            elifs.push((elif_cond, elif_body));
        }
        let else_branch = if matches!(self.peek(), Some(tok) if word_is(tok, "else")) {
            self.next();
            Some(Box::new(self.parse_statement_list(&["fi"])?))
        } else {
            None
        };
        self.expect_keyword("fi")?;
        Ok(Command::If {
            cond: Box::new(cond),
            then_branch: Box::new(then_branch),
            elifs,
            else_branch,
        })
    }

    fn parse_while(&mut self, until: bool) -> Result<Command, ShellError> {
        self.expect_keyword(if until { "until" } else { "while" })?;
        let cond = self.parse_statement_list(&["do"])?;
        self.expect_keyword("do")?;
        let body = self.parse_statement_list(&["done"])?;
        self.expect_keyword("done")?;
        Ok(Command::While {
            cond: Box::new(cond),
            body: Box::new(body),
            until,
        })
    }

    fn parse_for(&mut self) -> Result<Command, ShellError> {
        self.expect_keyword("for")?;
        let var = match self.next() {
            Some(Token::Word(w)) if is_literal_word(&w) => literal_text(&w),
            other => return Err(ShellError::Syntax(format!("expected loop variable, found {other:?}"))),
        };
        self.expect_keyword("in")?;
        let mut words = Vec::new();
        while let Some(Token::Word(_)) = self.peek() {
            if let Some(Token::Word(w)) = self.next() {
                words.push(w);
            }
        }
        self.skip_separators();
        self.expect_keyword("do")?;
        let body = self.parse_statement_list(&["done"])?;
        self.expect_keyword("done")?;
        Ok(Command::For {
            var,
            words,
            body: Box::new(body),
        })
    }

    fn parse_case(&mut self) -> Result<Command, ShellError> {
        self.expect_keyword("case")?;
        let subject = match self.next() {
            Some(Token::Word(w)) => w,
            other => return Err(ShellError::Syntax(format!("expected case subject, found {other:?}"))),
        };
        self.expect_keyword("in")?;
        self.skip_separators();
        let mut arms = Vec::new();
        while !matches!(self.peek(), Some(tok) if word_is(tok, "esac")) {
            if self.peek().is_none() {
                return Err(ShellError::UnexpectedEof);
            }
            let mut patterns = Vec::new();
            loop {
                match self.next() {
                    Some(Token::Word(w)) => patterns.push(w),
                    other => return Err(ShellError::Syntax(format!("expected case pattern, found {other:?}"))),
                }
                match self.peek() {
                    Some(Token::Pipe) => {
                        self.next();
                    }
                    _ => break,
                }
            }
            self.expect(Token::RParen)?;
            let body = self.parse_case_arm_body()?;
            arms.push((patterns, body));
            self.skip_separators();
        }
        self.expect_keyword("esac")?;
        Ok(Command::Case { subject, arms })
    }

    fn parse_case_arm_body(&mut self) -> Result<Vec<Statement>, ShellError> {
        let mut statements = Vec::new();
        self.skip_separators();
        loop {
            match self.peek() {
                Some(Token::DSemi) => {
                    self.next();
                    break;
                }
                Some(tok) if word_is(tok, "esac") => break,
                None => break,
                _ => {
                    statements.push(self.parse_statement()?);
                    self.skip_separators();
                }
            }
        }
        Ok(statements)
    }

    fn parse_simple_or_function(&mut self) -> Result<Command, ShellError> {
        // Function definition: `name() { ... }` or `function name { ... }`.
        if let Some(Token::Word(w)) = self.peek() {
            if is_plain_literal(w, "function") {
                self.next();
                let name = match self.next() {
                    Some(Token::Word(w)) => literal_text(&w),
                    other => return Err(ShellError::Syntax(format!("expected function name, found {other:?}"))),
                };
                if matches!(self.peek(), Some(Token::LParen)) {
                    self.next();
                    self.expect(Token::RParen)?;
                }
                self.skip_separators();
                self.expect(Token::LBrace)?;
                let body = self.parse_statement_list_until_rbrace()?;
                return Ok(Command::FunctionDef {
                    name,
                    body: Box::new(body),
                });
            }
        }
        if self.looks_like_function_def() {
            let name = match self.next() {
                Some(Token::Word(w)) => literal_text(&w),
                _ => unreachable!(),
            };
            self.next(); // LParen
            self.next(); // RParen
            self.skip_separators();
            self.expect(Token::LBrace)?;
            let body = self.parse_statement_list_until_rbrace()?;
            return Ok(Command::FunctionDef {
                name,
                body: Box::new(body),
            });
        }
        self.parse_simple_command()
    }

    fn looks_like_function_def(&mut self) -> bool {
        let mut iter = self.tokens.clone();
        matches!(
            (iter.next(), iter.next(), iter.next()),
            (Some(Token::Word(w)), Some(Token::LParen), Some(Token::RParen)) if is_literal_word(&w)
        )
    }

    fn parse_simple_command(&mut self) -> Result<Command, ShellError> {
        let mut words = Vec::new();
        let mut redirects = Vec::new();
        let mut assignments = Vec::new();
        let mut seen_command_word = false;

        loop {
            if let Some(Token::Word(w)) = self.peek() {
                if let Some(fd) = fd_digit(w) {
                    if self.peek_ahead_is_redirect_op() {
                        self.next(); // consume the fd-digit word
                        self.parse_fd_redirect(fd, &mut redirects)?;
                        continue;
                    }
                }
            }
            match self.peek() {
                Some(Token::Word(w)) if !seen_command_word && is_assignment(w) => {
                    if let Some(Token::Word(w)) = self.next() {
                        let (name, value) = split_assignment(&w);
                        assignments.push((name, value));
                    }
                }
                Some(Token::Word(_)) => {
                    seen_command_word = true;
                    if let Some(Token::Word(w)) = self.next() {
                        words.push(w);
                    }
                }
                Some(Token::Less) => {
                    self.next();
                    let target = self.expect_word("redirection target")?;
                    redirects.push(Redirect { fd: 0, op: RedirectOp::Read, target });
                }
                Some(Token::Great) => {
                    self.next();
                    let target = self.expect_word("redirection target")?;
                    redirects.push(Redirect { fd: 1, op: RedirectOp::Write, target });
                }
                Some(Token::DGreat) => {
                    self.next();
                    let target = self.expect_word("redirection target")?;
                    redirects.push(Redirect { fd: 1, op: RedirectOp::Append, target });
                }
                Some(Token::GreatAmp) => {
                    self.next();
                    let target = self.expect_word("redirection target")?;
                    redirects.push(Redirect { fd: 1, op: RedirectOp::Write, target: target.clone() });
                    redirects.push(Redirect { fd: 2, op: RedirectOp::Write, target });
                }
                Some(Token::DLess) | Some(Token::DLessDash) => {
                    self.next();
                    let _delim = self.expect_word("heredoc delimiter")?;
                    match self.next() {
                        Some(Token::HeredocBody { body, expand }) => {
                            redirects.push(Redirect {
                                fd: 0,
                                op: RedirectOp::Heredoc { body, strip_tabs: false, expand },
                                target: Word::default(),
                            });
                        }
                        other => return Err(ShellError::Syntax(format!("expected heredoc body, found {other:?}"))),
                    }
                }
                Some(Token::TLess) => {
                    self.next();
                    let target = self.expect_word("here-string operand")?;
                    redirects.push(Redirect { fd: 0, op: RedirectOp::HereString(target.clone()), target });
                }
                _ => break,
            }
        }

        if words.is_empty() && assignments.is_empty() && redirects.is_empty() {
            return Err(ShellError::Syntax("expected a command".to_string()));
        }

        Ok(Command::Simple(SimpleCommand {
            words,
            redirects,
            assignments,
        }))
    }

    fn expect_word(&mut self, what: &str) -> Result<Word, ShellError> {
        match self.next() {
            Some(Token::Word(w)) => Ok(w),
            other => Err(ShellError::Syntax(format!("expected {what}, found {other:?}"))),
        }
    }

    /// True if the token immediately after the current one (which must be
    /// the fd-digit word itself) is a redirection operator — i.e. the
    /// digit word is an fd prefix (`2>`) rather than an ordinary argument.
    fn peek_ahead_is_redirect_op(&self) -> bool {
        let mut clone = self.tokens.clone();
        clone.next();
        matches!(
            clone.next(),
            Some(Token::Great) | Some(Token::DGreat) | Some(Token::Less) | Some(Token::GreatAmp)
        )
    }

    fn parse_fd_redirect(&mut self, fd: u32, redirects: &mut Vec<Redirect>) -> Result<(), ShellError> {
        match self.next() {
            Some(Token::Great) => {
                let target = self.expect_word("redirection target")?;
                redirects.push(Redirect { fd, op: RedirectOp::Write, target });
            }
            Some(Token::DGreat) => {
                let target = self.expect_word("redirection target")?;
                redirects.push(Redirect { fd, op: RedirectOp::Append, target });
            }
            Some(Token::Less) => {
                let target = self.expect_word("redirection target")?;
                redirects.push(Redirect { fd, op: RedirectOp::Read, target });
            }
            Some(Token::GreatAmp) => {
                let target = self.expect_word("redirection target")?;
                if let Some(dup_fd) = is_literal_word(&target).then(|| literal_text(&target)).and_then(|s| s.parse::<u32>().ok()) {
                    redirects.push(Redirect { fd, op: RedirectOp::DupFd(dup_fd), target: Word::default() });
                } else {
                    redirects.push(Redirect { fd, op: RedirectOp::Write, target });
                }
            }
            other => return Err(ShellError::Syntax(format!("expected redirection operator, found {other:?}"))),
        }
        Ok(())
    }
}

/// A bare single-digit word (`"2"`), the shape a redirect's fd prefix takes.
fn fd_digit(w: &Word) -> Option<u32> {
    if let [WordPart::Literal(s)] = &w.parts[..] {
        if s.len() == 1 && s.chars().next().is_some_and(|c| c.is_ascii_digit()) {
            return s.parse().ok();
        }
    }
    None
}

fn is_literal_word(w: &Word) -> bool {
    matches!(&w.parts[..], [WordPart::Literal(_)])
}

fn literal_text(w: &Word) -> String {
    match &w.parts[..] {
        [WordPart::Literal(s)] => s.clone(),
        _ => String::new(),
    }
}

fn is_assignment(w: &Word) -> bool {
    if let [WordPart::Literal(s)] = &w.parts[..] {
        if let Some(eq) = s.find('=') {
            let name = &s[..eq];
            return !name.is_empty()
                && name.chars().next().map(|c| c.is_alphabetic() || c == '_').unwrap_or(false)
                && name.chars().all(|c| c.is_alphanumeric() || c == '_');
        }
    }
    false
}

fn split_assignment(w: &Word) -> (String, Word) {
    if let [WordPart::Literal(s)] = &w.parts[..] {
        if let Some(eq) = s.find('=') {
            let name = s[..eq].to_string();
            let value = s[eq + 1..].to_string();
            return (name, Word::literal(value));
        }
    }
    (String::new(), Word::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_pipeline() {
        let stmts = parse("echo foo | grep foo").unwrap();
        assert_eq!(stmts.len(), 1);
        assert_eq!(stmts[0].list.first.commands.len(), 2);
    }

    #[test]
    fn parses_and_or_chain() {
        let stmts = parse("true && echo yes || echo no").unwrap();
        assert_eq!(stmts[0].list.rest.len(), 2);
    }

    #[test]
    fn parses_if_statement() {
        let stmts = parse("if true; then echo yes; fi").unwrap();
        assert!(matches!(stmts[0].list.first.commands[0], Command::If { .. }));
    }

    #[test]
    fn parses_for_loop() {
        let stmts = parse("for x in a b c; do echo $x; done").unwrap();
        match &stmts[0].list.first.commands[0] {
            Command::For { var, words, .. } => {
                assert_eq!(var, "x");
                assert_eq!(words.len(), 3);
            }
            other => panic!("expected for loop, got {other:?}"),
        }
    }

    #[test]
    fn parses_function_definition() {
        let stmts = parse("greet() { echo hi; }").unwrap();
        assert!(matches!(stmts[0].list.first.commands[0], Command::FunctionDef { .. }));
    }

    #[test]
    fn parses_background_job() {
        let stmts = parse("sleep 1 &").unwrap();
        assert!(stmts[0].background);
    }

    #[test]
    fn parses_variable_assignment() {
        let stmts = parse("FOO=bar").unwrap();
        match &stmts[0].list.first.commands[0] {
            Command::Simple(cmd) => {
                assert_eq!(cmd.assignments.len(), 1);
                assert_eq!(cmd.assignments[0].0, "FOO");
            }
            other => panic!("expected simple command, got {other:?}"),
        }
    }

    #[test]
    fn parses_stderr_to_stdout_dup() {
        let stmts = parse("cmd 2>&1").unwrap();
        match &stmts[0].list.first.commands[0] {
            Command::Simple(cmd) => {
                assert_eq!(cmd.redirects.len(), 1);
                assert_eq!(cmd.redirects[0].fd, 2);
                assert!(matches!(cmd.redirects[0].op, RedirectOp::DupFd(1)));
            }
            other => panic!("expected simple command, got {other:?}"),
        }
    }

    #[test]
    fn parses_heredoc_body() {
        let stmts = parse("cat <<EOF\nhello\nworld\nEOF\n").unwrap();
        match &stmts[0].list.first.commands[0] {
            Command::Simple(cmd) => {
                assert_eq!(cmd.redirects.len(), 1);
                match &cmd.redirects[0].op {
                    RedirectOp::Heredoc { body, .. } => assert_eq!(body, "hello\nworld\n"),
                    other => panic!("expected heredoc, got {other:?}"),
                }
            }
            other => panic!("expected simple command, got {other:?}"),
        }
    }
}
