//! Tokenizer: turns raw shell source into a flat token stream, handling
//! quoting and the substitution forms (`$VAR`, `${...}`, `$(...)`,
//! backticks, `$((...))`) as it goes, since whether a character like `|`
//! is an operator or a literal depends on whether we're inside quotes.

use super::ast::{ParamOp, Word, WordPart};
use super::error::ShellError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Word(Word),
    Pipe,
    AndAnd,
    OrOr,
    Semi,
    DSemi,
    Amp,
    Newline,
    LParen,
    RParen,
    LBrace,
    RBrace,
    Less,
    Great,
    DGreat,
    DLess,
    DLessDash,
    TLess,
    GreatAmp,
    Bang,
    /// A fully-resolved heredoc body, emitted by the lexer immediately
    /// after its `DLess`/`DLessDash` operator and delimiter word (the
    /// lexer is the only place with raw-line access, so it reads the body
    /// eagerly rather than deferring to the parser). Assumes the heredoc
    /// operator is the last thing on its line, which covers every
    /// realistic script and the spec's own heredoc scenarios.
    HeredocBody { body: String, expand: bool },
}

pub struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self {
            chars: src.chars().peekable(),
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, ShellError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_blanks_and_comments();
            match self.chars.peek() {
                None => break,
                Some('\n') => {
                    self.chars.next();
                    tokens.push(Token::Newline);
                }
                Some('|') => {
                    self.chars.next();
                    if self.chars.peek() == Some(&'|') {
                        self.chars.next();
                        tokens.push(Token::OrOr);
                    } else {
                        tokens.push(Token::Pipe);
                    }
                }
                Some('&') => {
                    self.chars.next();
                    if self.chars.peek() == Some(&'&') {
                        self.chars.next();
                        tokens.push(Token::AndAnd);
                    } else {
                        tokens.push(Token::Amp);
                    }
                }
                Some(';') => {
                    self.chars.next();
                    if self.chars.peek() == Some(&';') {
                        self.chars.next();
                        tokens.push(Token::DSemi);
                    } else {
                        tokens.push(Token::Semi);
                    }
                }
                Some('(') => {
                    self.chars.next();
                    tokens.push(Token::LParen);
                }
                Some(')') => {
                    self.chars.next();
                    tokens.push(Token::RParen);
                }
                Some('{') => {
                    self.chars.next();
                    tokens.push(Token::LBrace);
                }
                Some('}') => {
                    self.chars.next();
                    tokens.push(Token::RBrace);
                }
                Some('!') => {
                    self.chars.next();
                    tokens.push(Token::Bang);
                }
                Some('<') => {
                    self.chars.next();
                    if self.chars.peek() == Some(&'<') {
                        self.chars.next();
                        if self.chars.peek() == Some(&'<') {
                            self.chars.next();
                            tokens.push(Token::TLess);
                        } else {
                            let strip_tabs = if self.chars.peek() == Some(&'-') {
                                self.chars.next();
                                true
                            } else {
                                false
                            };
                            tokens.push(if strip_tabs { Token::DLessDash } else { Token::DLess });
                            self.skip_blanks_and_comments();
                            let (delim, expand) = self.read_heredoc_delimiter()?;
                            tokens.push(Token::Word(Word::literal(delim.clone())));
                            // Skip to end of the current line, then read the
                            // heredoc body up to a line equal to `delim`.
                            while let Some(&c) = self.chars.peek() {
                                if c == '\n' {
                                    break;
                                }
                                self.chars.next();
                            }
                            self.chars.next(); // consume the newline
                            let body = self.read_heredoc_body(&delim, strip_tabs);
                            tokens.push(Token::HeredocBody { body, expand });
                            tokens.push(Token::Newline);
                        }
                    } else {
                        tokens.push(Token::Less);
                    }
                }
                Some('>') => {
                    self.chars.next();
                    if self.chars.peek() == Some(&'>') {
                        self.chars.next();
                        tokens.push(Token::DGreat);
                    } else if self.chars.peek() == Some(&'&') {
                        self.chars.next();
                        tokens.push(Token::GreatAmp);
                    } else {
                        tokens.push(Token::Great);
                    }
                }
                Some(_) => {
                    let word = self.read_word()?;
                    tokens.push(Token::Word(word));
                }
            }
        }
        Ok(tokens)
    }

    fn skip_blanks_and_comments(&mut self) {
        loop {
            while matches!(self.chars.peek(), Some(' ') | Some('\t')) {
                self.chars.next();
            }
            if self.chars.peek() == Some(&'#') {
                while let Some(&c) = self.chars.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.chars.next();
                }
            } else {
                break;
            }
        }
    }

    fn is_word_boundary(c: char) -> bool {
        matches!(
            c,
            ' ' | '\t' | '\n' | '|' | '&' | ';' | '(' | ')' | '<' | '>' | '{' | '}'
        )
    }

    /// Read a heredoc delimiter word. Returns the literal delimiter text
    /// and whether the body should still undergo expansion (`false` if the
    /// delimiter was quoted, e.g. `<<'EOF'`).
    fn read_heredoc_delimiter(&mut self) -> Result<(String, bool), ShellError> {
        let mut delim = String::new();
        let mut quoted = false;
        while let Some(&c) = self.chars.peek() {
            if Self::is_word_boundary(c) {
                break;
            }
            match c {
                '\'' | '"' => {
                    quoted = true;
                    self.chars.next();
                    while let Some(&c2) = self.chars.peek() {
                        if c2 == c {
                            self.chars.next();
                            break;
                        }
                        delim.push(c2);
                        self.chars.next();
                    }
                }
                _ => {
                    delim.push(c);
                    self.chars.next();
                }
            }
        }
        Ok((delim, !quoted))
    }

    fn read_heredoc_body(&mut self, delim: &str, strip_tabs: bool) -> String {
        let mut lines: Vec<String> = Vec::new();
        loop {
            let mut line = String::new();
            let mut saw_any = false;
            loop {
                match self.chars.next() {
                    Some('\n') => break,
                    Some(c) => {
                        saw_any = true;
                        line.push(c);
                    }
                    None => break,
                }
            }
            let check = if strip_tabs { line.trim_start_matches('\t') } else { line.as_str() };
            if check == delim {
                break;
            }
            if !saw_any && line.is_empty() {
                // Reached end of input without finding the delimiter; stop
                // rather than loop forever.
                break;
            }
            lines.push(if strip_tabs { check.to_string() } else { line });
        }
        let mut body = lines.join("\n");
        if !body.is_empty() {
            body.push('\n');
        }
        body
    }

    fn read_word(&mut self) -> Result<Word, ShellError> {
        let mut parts: Vec<WordPart> = Vec::new();
        let mut literal = String::new();

        macro_rules! flush {
            () => {
                if !literal.is_empty() {
                    parts.push(WordPart::Literal(std::mem::take(&mut literal)));
                }
            };
        }

        while let Some(&c) = self.chars.peek() {
            if Self::is_word_boundary(c) {
                break;
            }
            match c {
                '\'' => {
                    self.chars.next();
                    let mut body = String::new();
                    loop {
                        match self.chars.next() {
                            Some('\'') => break,
                            Some(ch) => body.push(ch),
                            None => return Err(ShellError::UnexpectedEof),
                        }
                    }
                    flush!();
                    parts.push(WordPart::SingleQuoted(body));
                }
                '"' => {
                    self.chars.next();
                    let inner = self.read_double_quoted()?;
                    flush!();
                    parts.push(WordPart::DoubleQuoted(inner));
                }
                '\\' => {
                    self.chars.next();
                    if let Some(next) = self.chars.next() {
                        if next == '\n' {
                            // line continuation: produces nothing
                        } else {
                            literal.push(next);
                        }
                    }
                }
                '$' => {
                    self.chars.next();
                    flush!();
                    if let Some(part) = self.read_dollar()? {
                        parts.push(part);
                    }
                }
                '`' => {
                    self.chars.next();
                    let mut body = String::new();
                    loop {
                        match self.chars.next() {
                            Some('`') => break,
                            Some('\\') if self.chars.peek() == Some(&'`') => {
                                self.chars.next();
                                body.push('`');
                            }
                            Some(ch) => body.push(ch),
                            None => return Err(ShellError::UnexpectedEof),
                        }
                    }
                    flush!();
                    let stmts = super::parser::parse(&body)?;
                    parts.push(WordPart::CommandSubstitution(Box::new(stmts)));
                }
                '~' if literal.is_empty() && parts.is_empty() => {
                    self.chars.next();
                    flush!();
                    parts.push(WordPart::Tilde);
                }
                _ => {
                    self.chars.next();
                    literal.push(c);
                }
            }
        }
        flush!();
        Ok(Word { parts })
    }

    fn read_double_quoted(&mut self) -> Result<Vec<WordPart>, ShellError> {
        let mut parts = Vec::new();
        let mut literal = String::new();
        loop {
            match self.chars.next() {
                None => return Err(ShellError::UnexpectedEof),
                Some('"') => break,
                Some('\\') => {
                    if let Some(next) = self.chars.next() {
                        if matches!(next, '"' | '\\' | '$' | '`') {
                            literal.push(next);
                        } else {
                            literal.push('\\');
                            literal.push(next);
                        }
                    }
                }
                Some('$') => {
                    if !literal.is_empty() {
                        parts.push(WordPart::Literal(std::mem::take(&mut literal)));
                    }
                    if let Some(part) = self.read_dollar()? {
                        parts.push(part);
                    }
                }
                Some(c) => literal.push(c),
            }
        }
        if !literal.is_empty() {
            parts.push(WordPart::Literal(literal));
        }
        Ok(parts)
    }

    fn read_dollar(&mut self) -> Result<Option<WordPart>, ShellError> {
        match self.chars.peek() {
            Some('(') => {
                self.chars.next();
                if self.chars.peek() == Some(&'(') {
                    self.chars.next();
                    let mut depth = 1;
                    let mut expr = String::new();
                    loop {
                        match self.chars.next() {
                            Some('(') => {
                                depth += 1;
                                expr.push('(');
                            }
                            Some(')') => {
                                if self.chars.peek() == Some(&')') && depth == 1 {
                                    self.chars.next();
                                    break;
                                }
                                depth -= 1;
                                expr.push(')');
                            }
                            Some(ch) => expr.push(ch),
                            None => return Err(ShellError::UnexpectedEof),
                        }
                    }
                    Ok(Some(WordPart::Arithmetic(expr)))
                } else {
                    let mut depth = 1;
                    let mut body = String::new();
                    loop {
                        match self.chars.next() {
                            Some('(') => {
                                depth += 1;
                                body.push('(');
                            }
                            Some(')') => {
                                depth -= 1;
                                if depth == 0 {
                                    break;
                                }
                                body.push(')');
                            }
                            Some(ch) => body.push(ch),
                            None => return Err(ShellError::UnexpectedEof),
                        }
                    }
                    let stmts = super::parser::parse(&body)?;
                    Ok(Some(WordPart::CommandSubstitution(Box::new(stmts))))
                }
            }
            Some('{') => {
                self.chars.next();
                let mut body = String::new();
                loop {
                    match self.chars.next() {
                        Some('}') => break,
                        Some(ch) => body.push(ch),
                        None => return Err(ShellError::UnexpectedEof),
                    }
                }
                Ok(Some(parse_param_expansion(&body)?))
            }
            Some(c) if c.is_alphabetic() || *c == '_' => {
                let mut name = String::new();
                while let Some(&c) = self.chars.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        name.push(c);
                        self.chars.next();
                    } else {
                        break;
                    }
                }
                Ok(Some(WordPart::Variable(name)))
            }
            Some(c) if c.is_ascii_digit() || matches!(c, '?' | '#' | '@' | '*' | '$' | '!') => {
                let c = *c;
                self.chars.next();
                Ok(Some(WordPart::Variable(c.to_string())))
            }
            _ => Ok(Some(WordPart::Literal("$".to_string()))),
        }
    }
}

fn parse_param_expansion(body: &str) -> Result<WordPart, ShellError> {
    if let Some(name) = body.strip_prefix('#') {
        return Ok(WordPart::ParameterExpansion {
            name: name.to_string(),
            op: ParamOp::Length,
        });
    }
    if let Some(idx) = body.find(":-") {
        let name = body[..idx].to_string();
        let default_src = &body[idx + 2..];
        let default_word = super::parser::parse_word(default_src)?;
        return Ok(WordPart::ParameterExpansion {
            name,
            op: ParamOp::DefaultIfUnset(Box::new(default_word)),
        });
    }
    if let Some(idx) = body.find(":+") {
        let name = body[..idx].to_string();
        let alt_src = &body[idx + 2..];
        let alt_word = super::parser::parse_word(alt_src)?;
        return Ok(WordPart::ParameterExpansion {
            name,
            op: ParamOp::AltIfSet(Box::new(alt_word)),
        });
    }
    Ok(WordPart::ParameterExpansion {
        name: body.to_string(),
        op: ParamOp::Plain,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(src: &str) -> Vec<Token> {
        Lexer::new(src).tokenize().unwrap()
    }

    #[test]
    fn splits_pipeline_operators() {
        let t = toks("echo hi | grep h");
        assert!(t.contains(&Token::Pipe));
    }

    #[test]
    fn single_quotes_suppress_expansion() {
        let t = toks("echo '$HOME'");
        if let Token::Word(w) = &t[1] {
            assert_eq!(w.parts, vec![WordPart::SingleQuoted("$HOME".to_string())]);
        } else {
            panic!("expected word");
        }
    }

    #[test]
    fn double_quotes_allow_variable_expansion() {
        let t = toks("echo \"$HOME\"");
        if let Token::Word(w) = &t[1] {
            assert_eq!(
                w.parts,
                vec![WordPart::DoubleQuoted(vec![WordPart::Variable("HOME".to_string())])]
            );
        } else {
            panic!("expected word");
        }
    }

    #[test]
    fn recognizes_heredoc_operators() {
        assert_eq!(toks("cat <<EOF")[2], Token::DLess);
        assert_eq!(toks("cat <<-EOF")[2], Token::DLessDash);
        assert_eq!(toks("cat <<<word")[2], Token::TLess);
    }
}
