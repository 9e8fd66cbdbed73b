//! POSIX arithmetic expansion, `$((expr))`. A small recursive-descent
//! expression evaluator over `i64`, supporting the operators spec.md's
//! example scenario exercises (`echo $((2**10+3*4))` -> `1036`) plus the
//! usual comparison/logical set so `while` conditions can use it too.

use super::error::ShellError;

pub fn eval(expr: &str, lookup: &dyn Fn(&str) -> String) -> Result<i64, ShellError> {
    let tokens = tokenize(expr)?;
    let mut parser = ArithParser { tokens, pos: 0, lookup };
    let value = parser.parse_expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(ShellError::Arithmetic(format!("trailing input in `{expr}`")));
    }
    Ok(value)
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Num(i64),
    Ident(String),
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    Percent,
    LParen,
    RParen,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    AndAnd,
    OrOr,
    Not,
    Assign,
}

fn tokenize(expr: &str) -> Result<Vec<Tok>, ShellError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = expr.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' => i += 1,
            '0'..='9' => {
                let start = i;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                let num: i64 = chars[start..i]
                    .iter()
                    .collect::<String>()
                    .parse()
                    .map_err(|_| ShellError::Arithmetic(format!("bad number in `{expr}`")))?;
                tokens.push(Tok::Num(num));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Tok::Ident(chars[start..i].iter().collect()));
            }
            '+' => {
                tokens.push(Tok::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Tok::Minus);
                i += 1;
            }
            '*' => {
                if chars.get(i + 1) == Some(&'*') {
                    tokens.push(Tok::StarStar);
                    i += 2;
                } else {
                    tokens.push(Tok::Star);
                    i += 1;
                }
            }
            '/' => {
                tokens.push(Tok::Slash);
                i += 1;
            }
            '%' => {
                tokens.push(Tok::Percent);
                i += 1;
            }
            '(' => {
                tokens.push(Tok::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Tok::RParen);
                i += 1;
            }
            '<' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Tok::Le);
                    i += 2;
                } else {
                    tokens.push(Tok::Lt);
                    i += 1;
                }
            }
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Tok::Ge);
                    i += 2;
                } else {
                    tokens.push(Tok::Gt);
                    i += 1;
                }
            }
            '=' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Tok::Eq);
                    i += 2;
                } else {
                    tokens.push(Tok::Assign);
                    i += 1;
                }
            }
            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Tok::Ne);
                    i += 2;
                } else {
                    tokens.push(Tok::Not);
                    i += 1;
                }
            }
            '&' if chars.get(i + 1) == Some(&'&') => {
                tokens.push(Tok::AndAnd);
                i += 2;
            }
            '|' if chars.get(i + 1) == Some(&'|') => {
                tokens.push(Tok::OrOr);
                i += 2;
            }
            _ => return Err(ShellError::Arithmetic(format!("unexpected character `{c}` in `{expr}`"))),
        }
    }
    Ok(tokens)
}

struct ArithParser<'a> {
    tokens: Vec<Tok>,
    pos: usize,
    lookup: &'a dyn Fn(&str) -> String,
}

impl<'a> ArithParser<'a> {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Tok> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn parse_expr(&mut self) -> Result<i64, ShellError> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> Result<i64, ShellError> {
        self.parse_logical_or()
    }

    fn parse_logical_or(&mut self) -> Result<i64, ShellError> {
        let mut left = self.parse_logical_and()?;
        while matches!(self.peek(), Some(Tok::OrOr)) {
            self.bump();
            let right = self.parse_logical_and()?;
            left = ((left != 0) || (right != 0)) as i64;
        }
        Ok(left)
    }

    fn parse_logical_and(&mut self) -> Result<i64, ShellError> {
        let mut left = self.parse_equality()?;
        while matches!(self.peek(), Some(Tok::AndAnd)) {
            self.bump();
            let right = self.parse_equality()?;
            left = ((left != 0) && (right != 0)) as i64;
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<i64, ShellError> {
        let mut left = self.parse_relational()?;
        loop {
            match self.peek() {
                Some(Tok::Eq) => {
                    self.bump();
                    left = (left == self.parse_relational()?) as i64;
                }
                Some(Tok::Ne) => {
                    self.bump();
                    left = (left != self.parse_relational()?) as i64;
                }
                _ => break,
            }
        }
        Ok(left)
    }

    fn parse_relational(&mut self) -> Result<i64, ShellError> {
        let mut left = self.parse_additive()?;
        loop {
            match self.peek() {
                Some(Tok::Lt) => {
                    self.bump();
                    left = (left < self.parse_additive()?) as i64;
                }
                Some(Tok::Gt) => {
                    self.bump();
                    left = (left > self.parse_additive()?) as i64;
                }
                Some(Tok::Le) => {
                    self.bump();
                    left = (left <= self.parse_additive()?) as i64;
                }
                Some(Tok::Ge) => {
                    self.bump();
                    left = (left >= self.parse_additive()?) as i64;
                }
                _ => break,
            }
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<i64, ShellError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            match self.peek() {
                Some(Tok::Plus) => {
                    self.bump();
                    left += self.parse_multiplicative()?;
                }
                Some(Tok::Minus) => {
                    self.bump();
                    left -= self.parse_multiplicative()?;
                }
                _ => break,
            }
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<i64, ShellError> {
        let mut left = self.parse_power()?;
        loop {
            match self.peek() {
                Some(Tok::Star) => {
                    self.bump();
                    left *= self.parse_power()?;
                }
                Some(Tok::Slash) => {
                    self.bump();
                    let rhs = self.parse_power()?;
                    if rhs == 0 {
                        return Err(ShellError::Arithmetic("division by zero".to_string()));
                    }
                    left /= rhs;
                }
                Some(Tok::Percent) => {
                    self.bump();
                    let rhs = self.parse_power()?;
                    if rhs == 0 {
                        return Err(ShellError::Arithmetic("division by zero".to_string()));
                    }
                    left %= rhs;
                }
                _ => break,
            }
        }
        Ok(left)
    }

    fn parse_power(&mut self) -> Result<i64, ShellError> {
        let base = self.parse_unary()?;
        if matches!(self.peek(), Some(Tok::StarStar)) {
            self.bump();
            let exp = self.parse_power()?;
            Ok(base.pow(exp.max(0) as u32))
        } else {
            Ok(base)
        }
    }

    fn parse_unary(&mut self) -> Result<i64, ShellError> {
        match self.peek() {
            Some(Tok::Minus) => {
                self.bump();
                Ok(-self.parse_unary()?)
            }
            Some(Tok::Plus) => {
                self.bump();
                self.parse_unary()
            }
            Some(Tok::Not) => {
                self.bump();
                Ok((self.parse_unary()? == 0) as i64)
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<i64, ShellError> {
        match self.bump() {
            Some(Tok::Num(n)) => Ok(n),
            Some(Tok::Ident(name)) => {
                let raw = (self.lookup)(&name);
                Ok(raw.trim().parse().unwrap_or(0))
            }
            Some(Tok::LParen) => {
                let value = self.parse_expr()?;
                match self.bump() {
                    Some(Tok::RParen) => Ok(value),
                    _ => Err(ShellError::Arithmetic("expected `)`".to_string())),
                }
            }
            other => Err(ShellError::Arithmetic(format!("unexpected token {other:?}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_vars(_: &str) -> String {
        String::new()
    }

    #[test]
    fn matches_example_scenario() {
        assert_eq!(eval("2**10+3*4", &no_vars).unwrap(), 1036);
    }

    #[test]
    fn operator_precedence() {
        assert_eq!(eval("2+3*4", &no_vars).unwrap(), 14);
        assert_eq!(eval("(2+3)*4", &no_vars).unwrap(), 20);
    }

    #[test]
    fn variables_resolve_through_lookup() {
        let lookup = |name: &str| if name == "x" { "5".to_string() } else { String::new() };
        assert_eq!(eval("x*2", &lookup).unwrap(), 10);
    }

    #[test]
    fn division_by_zero_errors() {
        assert!(eval("1/0", &no_vars).is_err());
    }

    #[test]
    fn comparisons_yield_booleans() {
        assert_eq!(eval("3 > 2", &no_vars).unwrap(), 1);
        assert_eq!(eval("3 < 2", &no_vars).unwrap(), 0);
    }
}
