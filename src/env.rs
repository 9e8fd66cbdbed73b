//! Shell environment: named variables, positional parameters, and the
//! special parameters (`$?`, `$#`, `$@`, `$*`, `$$`) §4.1/§4.5 reference.

use std::collections::HashMap;

/// A single shell session's variable and positional-parameter state.
#[derive(Debug, Clone)]
pub struct Environment {
    vars: HashMap<String, String>,
    positional: Vec<String>,
    last_exit_code: i32,
    pid: u32,
    aliases: HashMap<String, String>,
    history: Vec<String>,
    history_limit: usize,
    functions: HashMap<String, crate::shell::ast::Command>,
}

impl Environment {
    pub fn new(user: impl Into<String>, home: impl Into<String>) -> Self {
        let home = home.into();
        let mut vars = HashMap::new();
        vars.insert("USER".to_string(), user.into());
        vars.insert("HOME".to_string(), home.clone());
        vars.insert("PWD".to_string(), home.clone());
        vars.insert("OLDPWD".to_string(), home);
        vars.insert("PATH".to_string(), "/bin:/usr/bin".to_string());
        vars.insert("SHELL".to_string(), "/bin/foamsh".to_string());
        Self {
            vars,
            positional: Vec::new(),
            last_exit_code: 0,
            pid: 1,
            aliases: HashMap::new(),
            history: Vec::new(),
            history_limit: 1000,
            functions: HashMap::new(),
        }
    }

    pub fn set_history_limit(&mut self, limit: usize) {
        self.history_limit = limit;
    }

    pub fn push_history(&mut self, line: impl Into<String>) {
        self.history.push(line.into());
        if self.history.len() > self.history_limit {
            let overflow = self.history.len() - self.history_limit;
            self.history.drain(0..overflow);
        }
    }

    pub fn history(&self) -> &[String] {
        &self.history
    }

    pub fn set_alias(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.aliases.insert(name.into(), value.into());
    }

    pub fn unset_alias(&mut self, name: &str) {
        self.aliases.remove(name);
    }

    pub fn alias(&self, name: &str) -> Option<&str> {
        self.aliases.get(name).map(|s| s.as_str())
    }

    pub fn aliases(&self) -> impl Iterator<Item = (&String, &String)> {
        self.aliases.iter()
    }

    pub fn define_function(&mut self, name: impl Into<String>, body: crate::shell::ast::Command) {
        self.functions.insert(name.into(), body);
    }

    pub fn function(&self, name: &str) -> Option<&crate::shell::ast::Command> {
        self.functions.get(name)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(|s| s.as_str())
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(name.into(), value.into());
    }

    pub fn unset(&mut self, name: &str) {
        self.vars.remove(name);
    }

    pub fn all(&self) -> impl Iterator<Item = (&String, &String)> {
        self.vars.iter()
    }

    pub fn pwd(&self) -> String {
        self.vars.get("PWD").cloned().unwrap_or_else(|| "/".to_string())
    }

    pub fn home(&self) -> String {
        self.vars.get("HOME").cloned().unwrap_or_else(|| "/".to_string())
    }

    /// Change `PWD`, moving the previous value into `OLDPWD` (so `cd -`
    /// works), per SPEC_FULL.md §10.6.
    pub fn set_pwd(&mut self, new_pwd: impl Into<String>) {
        let old = self.pwd();
        self.vars.insert("OLDPWD".to_string(), old);
        self.vars.insert("PWD".to_string(), new_pwd.into());
    }

    pub fn set_positional(&mut self, args: Vec<String>) {
        self.positional = args;
    }

    pub fn positional(&self) -> &[String] {
        &self.positional
    }

    pub fn last_exit_code(&self) -> i32 {
        self.last_exit_code
    }

    pub fn set_last_exit_code(&mut self, code: i32) {
        self.last_exit_code = code;
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Resolve a `$NAME`/`${NAME}` reference, including the special
    /// parameters `?`, `#`, `$`, `@`, `*`, and `0..9` positional params.
    pub fn lookup(&self, name: &str) -> String {
        match name {
            "?" => self.last_exit_code.to_string(),
            "#" => self.positional.len().to_string(),
            "$" => self.pid.to_string(),
            "@" | "*" => self.positional.join(" "),
            "0" => "foamsh".to_string(),
            n if n.chars().all(|c| c.is_ascii_digit()) => {
                let idx: usize = n.parse().unwrap_or(0);
                if idx == 0 {
                    "foamsh".to_string()
                } else {
                    self.positional.get(idx - 1).cloned().unwrap_or_default()
                }
            }
            _ => self.get(name).unwrap_or("").to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cd_dash_round_trips_oldpwd() {
        let mut env = Environment::new("foam", "/home/foam");
        env.set_pwd("/tmp");
        assert_eq!(env.get("OLDPWD"), Some("/home/foam"));
        assert_eq!(env.pwd(), "/tmp");
    }

    #[test]
    fn special_params() {
        let mut env = Environment::new("foam", "/home/foam");
        env.set_positional(vec!["a".into(), "b".into()]);
        env.set_last_exit_code(7);
        assert_eq!(env.lookup("?"), "7");
        assert_eq!(env.lookup("#"), "2");
        assert_eq!(env.lookup("@"), "a b");
        assert_eq!(env.lookup("1"), "a");
        assert_eq!(env.lookup("2"), "b");
        assert_eq!(env.lookup("3"), "");
    }
}
