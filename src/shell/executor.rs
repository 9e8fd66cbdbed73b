//! The executor: walks the AST `parser` produces, expanding words and
//! dispatching simple commands against the `registry::CommandRegistry`,
//! exactly the way the teacher's dispatch layer turned one request shape
//! into a handler call — except here the "request" is a parsed shell
//! command rather than a model name, and the tree of control structures
//! around it (`if`/`while`/`for`/`case`/functions/subshells) has no teacher
//! analog and is built fresh against spec.md §4.5.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::FoamConfig;
use crate::env::Environment;
use crate::registry::{CommandContext, CommandRegistry};
use crate::store::Backend;
use crate::vfs::Vfs;

use super::ast::{
    Command, LogicOp, ParamOp, Redirect, RedirectOp, SimpleCommand, Statement, Word, WordPart,
};
use super::jobs::JobTable;
use super::{parser, ExecResult, ShellError};

/// A Bourne-style shell session: one `Vfs` handle, one `Environment`, one
/// command registry, and a table of backgrounded jobs. Cheap to construct
/// more of (e.g. for a subshell's isolated child or a background job's
/// detached copy) since `Vfs`/`CommandRegistry` are themselves `Arc`-backed.
pub struct Shell {
    vfs: Vfs,
    env: Environment,
    registry: CommandRegistry,
    config: FoamConfig,
    jobs: JobTable,
    /// Set by a `return` builtin; consumed by the nearest enclosing
    /// function call, short-circuiting the rest of its statement list.
    pending_return: Option<i32>,
    /// Set by an `exit` builtin; never consumed — it propagates all the way
    /// back up through every nested statement loop, ending the session's
    /// current top-level `exec()` call.
    pending_exit: Option<i32>,
    /// Guards against runaway `alias` self-reference during expansion.
    alias_depth: u32,
}

impl Shell {
    pub async fn new(config: FoamConfig, backend: Arc<dyn Backend>) -> Self {
        let vfs = Vfs::new(backend, &config.default_user, &config.default_home).await;
        let mut env = Environment::new(&config.default_user, &config.default_home);
        env.set_history_limit(config.shell_history_limit);
        Self {
            vfs,
            env,
            registry: CommandRegistry::new(),
            config,
            jobs: JobTable::new(),
            pending_return: None,
            pending_exit: None,
            alias_depth: 0,
        }
    }

    pub fn vfs(&self) -> &Vfs {
        &self.vfs
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn jobs(&self) -> &JobTable {
        &self.jobs
    }

    /// Run one line of shell source to completion, returning the combined
    /// result. Never returns an `Err` — parse failures and internal
    /// `ShellError`s are folded into a nonzero exit code and a stderr line,
    /// per spec.md §7.
    pub async fn exec(&mut self, line: &str) -> ExecResult {
        self.env.push_history(line);
        self.jobs.reap_finished();
        self.pending_return = None;
        self.pending_exit = None;

        let statements = match parser::parse(line) {
            Ok(stmts) => stmts,
            Err(err) => {
                let result = ExecResult::with_code(String::new(), format!("foam: syntax error: {err}\n"), err.exit_code());
                self.env.set_last_exit_code(result.exit_code);
                return result;
            }
        };
        let result = self.exec_statements(&statements, "").await;
        self.env.set_last_exit_code(result.exit_code);
        result
    }

    async fn exec_statements(&mut self, statements: &[Statement], initial_stdin: &str) -> ExecResult {
        let mut stdout = String::new();
        let mut stderr = String::new();
        let mut exit_code = 0;
        for (idx, stmt) in statements.iter().enumerate() {
            let stdin = if idx == 0 { initial_stdin } else { "" };
            let result = Box::pin(self.exec_statement(stmt, stdin)).await;
            stdout.push_str(&result.stdout);
            stderr.push_str(&result.stderr);
            exit_code = result.exit_code;
            self.env.set_last_exit_code(exit_code);
            if self.pending_return.is_some() || self.pending_exit.is_some() {
                break;
            }
        }
        ExecResult::with_code(stdout, stderr, exit_code)
    }

    async fn exec_statement(&mut self, stmt: &Statement, stdin: &str) -> ExecResult {
        if stmt.background {
            self.spawn_background(stmt, stdin).await
        } else {
            self.exec_and_or(&stmt.list, stdin).await
        }
    }

    async fn exec_and_or(&mut self, list: &super::ast::AndOrList, stdin: &str) -> ExecResult {
        let mut result = self.exec_pipeline(&list.first, stdin).await;
        for (op, pipeline) in &list.rest {
            if self.pending_return.is_some() || self.pending_exit.is_some() {
                break;
            }
            let should_run = match op {
                LogicOp::And => result.exit_code == 0,
                LogicOp::Or => result.exit_code != 0,
            };
            if !should_run {
                continue;
            }
            let next = self.exec_pipeline(pipeline, "").await;
            result.stdout.push_str(&next.stdout);
            result.stderr.push_str(&next.stderr);
            result.exit_code = next.exit_code;
        }
        result
    }

    async fn exec_pipeline(&mut self, pipeline: &super::ast::Pipeline, stdin: &str) -> ExecResult {
        let mut current_stdin = stdin.to_string();
        let mut combined_stderr = String::new();
        let mut last_stdout = String::new();
        let mut last_exit = 0;
        for command in &pipeline.commands {
            if self.pending_return.is_some() || self.pending_exit.is_some() {
                break;
            }
            let stage = Box::pin(self.exec_command(command, &current_stdin)).await;
            combined_stderr.push_str(&stage.stderr);
            last_stdout = stage.stdout;
            last_exit = stage.exit_code;
            current_stdin = last_stdout.clone();
        }
        if pipeline.negate {
            last_exit = if last_exit == 0 { 1 } else { 0 };
        }
        ExecResult::with_code(last_stdout, combined_stderr, last_exit)
    }

    async fn exec_command(&mut self, command: &Command, stdin: &str) -> ExecResult {
        match command {
            Command::Simple(sc) => self.exec_simple(sc, stdin).await,
            Command::If { cond, then_branch, elifs, else_branch } => {
                let cond_result = self.exec_statements(cond, "").await;
                if cond_result.exit_code == 0 {
                    return self.exec_statements(then_branch, stdin).await;
                }
                for (elif_cond, elif_body) in elifs {
                    let elif_result = self.exec_statements(elif_cond, "").await;
                    if elif_result.exit_code == 0 {
                        return self.exec_statements(elif_body, stdin).await;
                    }
                }
                match else_branch {
                    Some(body) => self.exec_statements(body, stdin).await,
                    None => ExecResult::success(String::new()),
                }
            }
            Command::While { cond, body, until } => {
                let cap = self.config.while_loop_cap;
                let mut stdout = String::new();
                let mut stderr = String::new();
                let mut exit_code = 0;
                let mut first = true;
                for _ in 0..cap {
                    let cond_result = self.exec_statements(cond, "").await;
                    let should_run = (cond_result.exit_code == 0) != *until;
                    if !should_run {
                        break;
                    }
                    let body_stdin = if first { stdin } else { "" };
                    first = false;
                    let result = self.exec_statements(body, body_stdin).await;
                    stdout.push_str(&result.stdout);
                    stderr.push_str(&result.stderr);
                    exit_code = result.exit_code;
                    if self.pending_return.is_some() || self.pending_exit.is_some() {
                        break;
                    }
                }
                ExecResult::with_code(stdout, stderr, exit_code)
            }
            Command::For { var, words, body } => {
                let mut values = Vec::new();
                for word in words {
                    values.extend(self.expand_word(word).await);
                }
                let mut stdout = String::new();
                let mut stderr = String::new();
                let mut exit_code = 0;
                for (idx, value) in values.iter().enumerate() {
                    self.env.set(var.clone(), value.clone());
                    let body_stdin = if idx == 0 { stdin } else { "" };
                    let result = self.exec_statements(body, body_stdin).await;
                    stdout.push_str(&result.stdout);
                    stderr.push_str(&result.stderr);
                    exit_code = result.exit_code;
                    if self.pending_return.is_some() || self.pending_exit.is_some() {
                        break;
                    }
                }
                ExecResult::with_code(stdout, stderr, exit_code)
            }
            Command::Case { subject, arms } => {
                let text = self.expand_word_single(subject).await;
                for (patterns, body) in arms {
                    let mut matched = false;
                    for pattern_word in patterns {
                        let pattern = self.expand_word_single(pattern_word).await;
                        if wildcard_match(&pattern, &text) {
                            matched = true;
                            break;
                        }
                    }
                    if matched {
                        return self.exec_statements(body, stdin).await;
                    }
                }
                ExecResult::success(String::new())
            }
            Command::FunctionDef { name, body } => {
                self.env.define_function(name.clone(), Command::Group(body.clone()));
                ExecResult::success(String::new())
            }
            Command::Subshell(body) => {
                let saved_env = self.env.clone();
                let result = self.exec_statements(body, stdin).await;
                self.env = saved_env;
                result
            }
            Command::Group(body) => self.exec_statements(body, stdin).await,
        }
    }

    /// Run a simple command: expand assignments and words, build any
    /// redirect plan, dispatch, then apply output redirects to the result.
    async fn exec_simple(&mut self, sc: &SimpleCommand, stdin: &str) -> ExecResult {
        if sc.words.is_empty() {
            for (name, value_word) in &sc.assignments {
                let value = self.expand_word_single(value_word).await;
                self.env.set(name.clone(), value);
            }
            return ExecResult::success(String::new());
        }

        let mut fields: Vec<String> = Vec::new();
        for word in &sc.words {
            fields.extend(self.expand_word(word).await);
        }
        if fields.is_empty() {
            return ExecResult::success(String::new());
        }
        let cmd_name = fields.remove(0);
        let args = fields;

        let redirect_plan = match self.build_redirect_plan(&sc.redirects).await {
            Ok(plan) => plan,
            Err(result) => return result,
        };
        let effective_stdin = match self.resolve_stdin(&sc.redirects, stdin).await {
            Ok(value) => value,
            Err(result) => return result,
        };

        let mut saved: Vec<(String, Option<String>)> = Vec::new();
        for (name, value_word) in &sc.assignments {
            let value = self.expand_word_single(value_word).await;
            saved.push((name.clone(), self.env.get(name).map(|s| s.to_string())));
            self.env.set(name.clone(), value);
        }

        debug!(command = %cmd_name, arg_count = args.len(), "dispatching simple command");
        let mut result = match self.dispatch_simple(&cmd_name, args, &effective_stdin).await {
            Ok(result) => result,
            Err(err) => err_result(err),
        };

        for (name, old_value) in saved {
            match old_value {
                Some(value) => self.env.set(name, value),
                None => self.env.unset(&name),
            }
        }

        self.apply_output_redirects(&redirect_plan, &mut result).await;
        result
    }

    /// Dispatch a simple command's argv to its target: shell-reserved
    /// builtins first (these aren't overridable by functions/aliases/the
    /// registry), then user functions, then aliases, then the registry,
    /// finally a command-not-found failure.
    async fn dispatch_simple(&mut self, cmd_name: &str, args: Vec<String>, stdin: &str) -> Result<ExecResult, ShellError> {
        match cmd_name {
            "exit" => {
                let code = args.first().and_then(|a| a.parse().ok()).unwrap_or(0);
                self.pending_exit = Some(code);
                return Ok(ExecResult::with_code(String::new(), String::new(), code));
            }
            "return" => {
                let code = args.first().and_then(|a| a.parse().ok()).unwrap_or(self.env.last_exit_code());
                self.pending_return = Some(code);
                return Ok(ExecResult::with_code(String::new(), String::new(), code));
            }
            "." | "source" => {
                return self.source_script(&args, stdin).await;
            }
            "env" if args.iter().take_while(|a| a.contains('=')).count() > 0
                && args.len() > args.iter().take_while(|a| a.contains('=')).count() =>
            {
                return Box::pin(self.exec_env_prefixed(args, stdin)).await;
            }
            "jobs" => {
                self.jobs.reap_finished();
                let mut out = String::new();
                for job in self.jobs.list() {
                    let state = match job.state {
                        super::jobs::JobState::Running => "Running",
                        super::jobs::JobState::Done => "Done",
                    };
                    out.push_str(&format!("[{}]  {}  {}\n", job.id, state, job.command_line));
                }
                return Ok(ExecResult::success(out));
            }
            "fg" => {
                let target = match args.first().and_then(|a| a.parse::<u32>().ok()) {
                    Some(id) => Some(id),
                    None => self.jobs.list().last().map(|j| j.id),
                };
                return Ok(match target {
                    Some(id) => match self.jobs.wait(id).await {
                        Some(result) => result,
                        None => ExecResult::failure(format!("fg: no such job: {id}\n")),
                    },
                    None => ExecResult::failure("fg: no current job\n"),
                });
            }
            "bg" => {
                return Ok(ExecResult::success(String::new()));
            }
            "wait" => {
                if let Some(id) = args.first().and_then(|a| a.parse::<u32>().ok()) {
                    return Ok(match self.jobs.wait(id).await {
                        Some(result) => ExecResult::with_code(String::new(), String::new(), result.exit_code),
                        None => ExecResult::failure(format!("wait: no such job: {id}\n")),
                    });
                }
                let ids: Vec<u32> = self.jobs.list().map(|j| j.id).collect();
                let mut last_code = 0;
                for id in ids {
                    if let Some(result) = self.jobs.wait(id).await {
                        last_code = result.exit_code;
                    }
                }
                return Ok(ExecResult::with_code(String::new(), String::new(), last_code));
            }
            "xargs" => {
                return Ok(self.exec_xargs(&args, stdin).await);
            }
            "npm" if args.first().map(|a| a.as_str()) == Some("run") => {
                if let Some(script_name) = args.get(1) {
                    if let Some(body) = crate::facades::npm::read_script(&self.vfs, &self.env.pwd(), script_name).await {
                        let stmts = parser::parse(&body)?;
                        return Ok(self.exec_statements(&stmts, stdin).await);
                    }
                }
            }
            _ => {}
        }

        if let Some(func) = self.env.function(cmd_name).cloned() {
            return Ok(self.call_function(&func, args, stdin).await);
        }

        if let Some(alias_value) = self.env.alias(cmd_name).map(|s| s.to_string()) {
            if self.alias_depth < 10 {
                self.alias_depth += 1;
                let mut line = alias_value;
                if !args.is_empty() {
                    line.push(' ');
                    line.push_str(&args.join(" "));
                }
                let stmts = parser::parse(&line)?;
                let result = self.exec_statements(&stmts, stdin).await;
                self.alias_depth -= 1;
                return Ok(result);
            }
        }

        if let Some(handler) = self.registry.get(cmd_name) {
            let ctx = CommandContext {
                args,
                vfs: &self.vfs,
                env: &mut self.env,
                stdin: stdin.to_string(),
                config: &self.config,
            };
            let output = handler(ctx).await;
            return Ok(ExecResult::with_code(output.stdout, output.stderr, output.exit_code));
        }

        Ok(ExecResult::with_code(String::new(), format!("{cmd_name}: command not found\n"), 127))
    }

    /// `env NAME=VAL... cmd [args...]`: bind `NAME=VAL` pairs for the
    /// duration of exactly one command (spec.md §9 "partially implemented"
    /// open question, resolved per SPEC_FULL.md: a temporary binding scoped
    /// to one command's execution), restoring the prior values afterward.
    async fn exec_env_prefixed(&mut self, args: Vec<String>, stdin: &str) -> Result<ExecResult, ShellError> {
        let split = args.iter().take_while(|a| a.contains('=')).count();
        let (bindings, rest) = args.split_at(split);
        let Some((cmd_name, cmd_args)) = rest.split_first() else {
            return Ok(ExecResult::failure("env: missing command operand\n"));
        };
        let mut saved = Vec::new();
        for binding in bindings {
            if let Some((name, value)) = binding.split_once('=') {
                saved.push((name.to_string(), self.env.get(name).map(|s| s.to_string())));
                self.env.set(name.to_string(), value.to_string());
            }
        }
        let result = self.dispatch_simple(cmd_name, cmd_args.to_vec(), stdin).await;
        for (name, old_value) in saved {
            match old_value {
                Some(value) => self.env.set(name, value),
                None => self.env.unset(&name),
            }
        }
        result
    }

    async fn source_script(&mut self, args: &[String], stdin: &str) -> Result<ExecResult, ShellError> {
        let Some(path_arg) = args.first() else {
            return Ok(ExecResult::failure("source: missing file operand\n"));
        };
        let path = self.vfs.resolve(&self.env.pwd(), path_arg).await;
        match self.vfs.read_file(&path).await {
            Ok(bytes) => {
                let text = String::from_utf8_lossy(&bytes).to_string();
                let stmts = parser::parse(&text)?;
                Ok(self.exec_statements(&stmts, stdin).await)
            }
            Err(err) => Ok(ExecResult::failure(format!("source: {}\n", err.short_message()))),
        }
    }

    /// Re-dispatch `xargs`' composed command line, unlike the registered
    /// `coreutils::misc::xargs` handler (which has no way to recurse back
    /// into the executor and so only returns the composed line as text).
    async fn exec_xargs(&mut self, args: &[String], stdin: &str) -> ExecResult {
        let tokens: Vec<&str> = stdin.split_whitespace().collect();
        if tokens.is_empty() {
            return ExecResult::success(String::new());
        }
        let mut line = args.join(" ");
        if !line.is_empty() {
            line.push(' ');
        }
        line.push_str(&tokens.join(" "));
        match parser::parse(&line) {
            Ok(stmts) => self.exec_statements(&stmts, "").await,
            Err(err) => err_result(err),
        }
    }

    /// Call a user-defined function: `body` is always a `Command::Group`
    /// (the shape `FunctionDef` stores it in). Positional parameters are
    /// swapped in for the call and restored afterward; a `return` sets the
    /// function's own exit code and must not leak past this call.
    async fn call_function(&mut self, body: &Command, args: Vec<String>, stdin: &str) -> ExecResult {
        let Command::Group(stmts) = body else {
            return ExecResult::failure("internal error: malformed function body\n");
        };
        let saved_positional = self.env.positional().to_vec();
        self.env.set_positional(args);
        let mut result = self.exec_statements(stmts, stdin).await;
        self.env.set_positional(saved_positional);
        if let Some(code) = self.pending_return.take() {
            result.exit_code = code;
        }
        result
    }

    /// Run `stmt` as a background job: snapshot the environment, give the
    /// detached copy its own job table, and race its execution against a
    /// cancellation token registered in this shell's job table.
    async fn spawn_background(&mut self, stmt: &Statement, stdin: &str) -> ExecResult {
        let mut inner = Shell {
            vfs: self.vfs.clone(),
            env: self.env.clone(),
            registry: self.registry.clone(),
            config: self.config.clone(),
            jobs: JobTable::new(),
            pending_return: None,
            pending_exit: None,
            alias_depth: 0,
        };
        let list = stmt.list.clone();
        let stdin_owned = stdin.to_string();
        let cancel = CancellationToken::new();
        let cancel_child = cancel.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                result = inner.exec_and_or(&list, &stdin_owned) => result,
                _ = cancel_child.cancelled() => ExecResult::failure("job cancelled\n"),
            }
        });
        let command_line = describe_and_or(&stmt.list);
        let id = self.jobs.spawn(command_line, handle, cancel);
        ExecResult::success(format!("[{id}] {}\n", 2000 + id))
    }

    // ---- word expansion -------------------------------------------------

    /// Expand a word into zero or more resulting argv fields, applying
    /// field-splitting and globbing the way an unquoted shell word would.
    async fn expand_word(&mut self, word: &Word) -> Vec<String> {
        if word.parts.is_empty() {
            return Vec::new();
        }
        if self.is_glob_candidate(word) {
            if let Some(matches) = self.try_glob(word).await {
                return matches;
            }
        }
        if word.parts.len() == 1 && Self::splits_on_whitespace(&word.parts[0]) {
            let expanded = self.expand_part(&word.parts[0]).await;
            let fields: Vec<String> = expanded.split_whitespace().map(|s| s.to_string()).collect();
            return fields;
        }
        vec![self.expand_word_single(word).await]
    }

    /// Expand a word to a single field, concatenating every part's
    /// expansion (the behavior inside double quotes, and the fallback for
    /// any word that mixes literal text with a substitution).
    async fn expand_word_single(&mut self, word: &Word) -> String {
        let mut out = String::new();
        for part in &word.parts {
            out.push_str(&self.expand_part(part).await);
        }
        out
    }

    fn expand_part<'a>(&'a mut self, part: &'a WordPart) -> std::pin::Pin<Box<dyn std::future::Future<Output = String> + 'a>> {
        Box::pin(async move {
            match part {
                WordPart::Literal(s) => s.clone(),
                WordPart::SingleQuoted(s) => s.clone(),
                WordPart::DoubleQuoted(parts) => {
                    let mut out = String::new();
                    for p in parts {
                        out.push_str(&self.expand_part(p).await);
                    }
                    out
                }
                WordPart::Variable(name) => self.env.lookup(name),
                WordPart::ParameterExpansion { name, op } => match op {
                    ParamOp::Plain => self.env.lookup(name),
                    ParamOp::Length => self.env.lookup(name).len().to_string(),
                    ParamOp::DefaultIfUnset(default_word) => {
                        let current = self.env.lookup(name);
                        if current.is_empty() {
                            self.expand_word_single(default_word).await
                        } else {
                            current
                        }
                    }
                    ParamOp::AltIfSet(alt_word) => {
                        let current = self.env.lookup(name);
                        if current.is_empty() {
                            String::new()
                        } else {
                            self.expand_word_single(alt_word).await
                        }
                    }
                },
                WordPart::CommandSubstitution(stmts) => {
                    let result = self.exec_statements(stmts, "").await;
                    result.stdout.trim_end_matches('\n').to_string()
                }
                WordPart::Arithmetic(expr) => {
                    let env = &self.env;
                    let lookup = |name: &str| env.lookup(name);
                    match super::arithmetic::eval(expr, &lookup) {
                        Ok(value) => value.to_string(),
                        Err(_) => "0".to_string(),
                    }
                }
                WordPart::Tilde => self.env.home(),
            }
        })
    }

    fn splits_on_whitespace(part: &WordPart) -> bool {
        matches!(
            part,
            WordPart::Variable(_)
                | WordPart::ParameterExpansion { .. }
                | WordPart::CommandSubstitution(_)
                | WordPart::Arithmetic(_)
        )
    }

    /// True if `word` is made entirely of literal text (plus a leading
    /// `~`) and contains a glob metacharacter — the only shape spec.md's
    /// glob expansion (§4.3) applies to; anything quoted or substituted is
    /// never glob-expanded.
    fn is_glob_candidate(&self, word: &Word) -> bool {
        let Some(text) = plain_literal_text(word) else {
            return false;
        };
        text.contains('*') || text.contains('?') || text.contains('[')
    }

    async fn try_glob(&mut self, word: &Word) -> Option<Vec<String>> {
        let text = plain_literal_text(word)?;
        let root = if text.starts_with('/') { "/".to_string() } else { self.env.pwd() };
        let matches = self.vfs.glob(&root, &text).await;
        if matches.is_empty() {
            None
        } else {
            Some(matches)
        }
    }

    /// Re-lex a heredoc body's already-captured text through the same
    /// double-quote substitution logic `"..."` words use, by wrapping it in
    /// escaped double quotes and feeding it through `parser::parse_word`
    /// rather than re-implementing substitution scanning.
    async fn expand_heredoc_body(&mut self, body: &str) -> String {
        let escaped = body.replace('\\', "\\\\").replace('"', "\\\"");
        let wrapped = format!("\"{escaped}\"");
        match parser::parse_word(&wrapped) {
            Ok(word) => self.expand_word_single(&word).await,
            Err(_) => body.to_string(),
        }
    }

    // ---- redirects --------------------------------------------------

    async fn build_redirect_plan(&mut self, redirects: &[Redirect]) -> Result<RedirectPlan, ExecResult> {
        let mut plan = RedirectPlan::default();
        for redirect in redirects {
            match (&redirect.op, redirect.fd) {
                (RedirectOp::Write, fd) => {
                    let path = self.resolve_target(&redirect.target).await;
                    plan.set(fd, RedirSink::File { path, append: false });
                }
                (RedirectOp::Append, fd) => {
                    let path = self.resolve_target(&redirect.target).await;
                    plan.set(fd, RedirSink::File { path, append: true });
                }
                (RedirectOp::DupFd(src), fd) => {
                    plan.set(fd, RedirSink::Dup(*src));
                }
                _ => {}
            }
        }
        Ok(plan)
    }

    async fn resolve_target(&mut self, target: &Word) -> String {
        let raw = self.expand_word_single(target).await;
        self.vfs.resolve(&self.env.pwd(), &raw).await
    }

    /// Read-side redirects (`<`, `<<`, `<<<`) override whatever stdin a
    /// pipeline stage would otherwise receive.
    async fn resolve_stdin(&mut self, redirects: &[Redirect], stdin: &str) -> Result<String, ExecResult> {
        for redirect in redirects {
            if redirect.fd != 0 {
                continue;
            }
            match &redirect.op {
                RedirectOp::Read => {
                    let path = self.resolve_target(&redirect.target).await;
                    return match self.vfs.read_file(&path).await {
                        Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).to_string()),
                        Err(err) => Err(ExecResult::with_code(String::new(), format!("{}\n", err.short_message()), 1)),
                    };
                }
                RedirectOp::Heredoc { body, expand, .. } => {
                    return Ok(if *expand {
                        self.expand_heredoc_body(body).await
                    } else {
                        body.clone()
                    });
                }
                RedirectOp::HereString(word) => {
                    let mut text = self.expand_word_single(word).await;
                    text.push('\n');
                    return Ok(text);
                }
                _ => {}
            }
        }
        Ok(stdin.to_string())
    }

    /// Apply any `>`/`>>`/`N>&M` redirects on fd 1 and fd 2 to `result`,
    /// writing to the VFS and clearing the corresponding in-memory buffer,
    /// or merging stderr into stdout when `2>&1` has no separate stdout
    /// file target.
    async fn apply_output_redirects(&mut self, plan: &RedirectPlan, result: &mut ExecResult) {
        let stdout_sink = self.resolve_sink(1, plan);
        let mut stdout_written_path: Option<String> = None;
        if let Some(RedirSink::File { path, append }) = stdout_sink {
            self.write_redirect(&path, append, result.stdout.as_bytes()).await;
            stdout_written_path = Some(path);
            result.stdout.clear();
        }

        let stderr_sink = self.resolve_sink(2, plan);
        match stderr_sink {
            Some(RedirSink::File { path, mut append }) => {
                if stdout_written_path.as_deref() == Some(path.as_str()) {
                    append = true;
                }
                self.write_redirect(&path, append, result.stderr.as_bytes()).await;
                result.stderr.clear();
            }
            Some(RedirSink::Inherit(1)) if stdout_written_path.is_none() => {
                result.stdout.push_str(&result.stderr);
                result.stderr.clear();
            }
            _ => {}
        }
    }

    /// Follow a chain of `N>&M` dup redirects (capped to avoid an infinite
    /// loop on a self-referential `1>&1>&1`-style construction) down to the
    /// sink it ultimately resolves to.
    fn resolve_sink(&self, fd: u32, plan: &RedirectPlan) -> Option<RedirSink> {
        let mut current = fd;
        for _ in 0..8 {
            match plan.get(current) {
                Some(RedirSink::File { path, append }) => {
                    return Some(RedirSink::File { path: path.clone(), append: *append });
                }
                Some(RedirSink::Dup(target)) => {
                    if *target == current {
                        return None;
                    }
                    current = *target;
                }
                None => return if current != fd { Some(RedirSink::Inherit(current)) } else { None },
            }
        }
        None
    }

    async fn write_redirect(&mut self, path: &str, append: bool, bytes: &[u8]) {
        let outcome = if append {
            self.vfs.append_file(path, bytes).await
        } else {
            self.vfs.write_file(path, bytes.to_vec()).await
        };
        if let Err(err) = outcome {
            tracing::warn!(path, error = %err, "redirect write failed");
        }
    }
}

/// Per-fd redirect target, resolved once per simple-command dispatch.
#[derive(Default)]
struct RedirectPlan {
    stdout: Option<RedirSink>,
    stderr: Option<RedirSink>,
}

impl RedirectPlan {
    fn set(&mut self, fd: u32, sink: RedirSink) {
        match fd {
            1 => self.stdout = Some(sink),
            2 => self.stderr = Some(sink),
            _ => {}
        }
    }

    fn get(&self, fd: u32) -> Option<&RedirSink> {
        match fd {
            1 => self.stdout.as_ref(),
            2 => self.stderr.as_ref(),
            _ => None,
        }
    }
}

#[derive(Clone)]
enum RedirSink {
    File { path: String, append: bool },
    /// Resolved a `Dup` chain with no file at its end: this fd now points
    /// at whatever `origin_fd`'s stream naturally is (e.g. `2>&1`'s stderr
    /// pointing at stdout when stdout has no file redirect of its own).
    Dup(u32),
    Inherit(u32),
}

fn err_result(err: ShellError) -> ExecResult {
    ExecResult::with_code(String::new(), format!("{err}\n"), err.exit_code())
}

/// A small `*`/`?` glob matcher for `case` patterns — distinct from
/// `vfs::glob`, which walks the file tree rather than matching a bare
/// string.
fn wildcard_match(pattern: &str, text: &str) -> bool {
    fn go(p: &[char], t: &[char]) -> bool {
        match p.first() {
            None => t.is_empty(),
            Some('*') => go(&p[1..], t) || (!t.is_empty() && go(p, &t[1..])),
            Some('?') => !t.is_empty() && go(&p[1..], &t[1..]),
            Some(c) => t.first() == Some(c) && go(&p[1..], &t[1..]),
        }
    }
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    go(&p, &t)
}

/// Extract `word`'s text if it is made up only of `Literal`/`Tilde` parts
/// (no quoting, no substitution) — the only shape eligible for glob
/// expansion.
fn plain_literal_text(word: &Word) -> Option<String> {
    let mut out = String::new();
    for part in &word.parts {
        match part {
            WordPart::Literal(s) => out.push_str(s),
            WordPart::Tilde => return None,
            _ => return None,
        }
    }
    Some(out)
}

// ---- cosmetic job-listing text --------------------------------------
//
// The AST doesn't retain original source text, so a backgrounded job's
// listing in `jobs`/the `[id] pid` line is reconstructed from the parsed
// tree rather than echoed verbatim. Good enough for a job label; not
// intended to round-trip byte-for-byte with what the user typed.

fn describe_and_or(list: &super::ast::AndOrList) -> String {
    let mut out = describe_pipeline(&list.first);
    for (op, pipeline) in &list.rest {
        out.push_str(match op {
            LogicOp::And => " && ",
            LogicOp::Or => " || ",
        });
        out.push_str(&describe_pipeline(pipeline));
    }
    out
}

fn describe_pipeline(pipeline: &super::ast::Pipeline) -> String {
    let mut out = if pipeline.negate { "! ".to_string() } else { String::new() };
    out.push_str(
        &pipeline
            .commands
            .iter()
            .map(describe_command)
            .collect::<Vec<_>>()
            .join(" | "),
    );
    out
}

fn describe_command(command: &Command) -> String {
    match command {
        Command::Simple(sc) => sc.words.iter().map(describe_word).collect::<Vec<_>>().join(" "),
        Command::If { .. } => "if ...".to_string(),
        Command::While { until: true, .. } => "until ...".to_string(),
        Command::While { .. } => "while ...".to_string(),
        Command::For { var, .. } => format!("for {var} ..."),
        Command::Case { .. } => "case ...".to_string(),
        Command::FunctionDef { name, .. } => format!("{name}()"),
        Command::Subshell(_) => "(...)".to_string(),
        Command::Group(_) => "{ ...; }".to_string(),
    }
}

fn describe_word(word: &Word) -> String {
    word.parts
        .iter()
        .map(|p| match p {
            WordPart::Literal(s) => s.clone(),
            WordPart::SingleQuoted(s) => s.clone(),
            WordPart::Variable(name) => format!("${name}"),
            _ => String::new(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryBackend;

    async fn shell() -> Shell {
        Shell::new(FoamConfig::default(), Arc::new(MemoryBackend::new())).await
    }

    #[tokio::test]
    async fn runs_simple_command() {
        let mut sh = shell().await;
        let result = sh.exec("echo hello").await;
        assert_eq!(result.stdout, "hello\n");
        assert_eq!(result.exit_code, 0);
    }

    #[tokio::test]
    async fn pipeline_feeds_stages_in_order() {
        let mut sh = shell().await;
        let result = sh.exec("echo foo | grep foo").await;
        assert_eq!(result.stdout, "foo\n");
        assert_eq!(result.exit_code, 0);
    }

    #[tokio::test]
    async fn and_or_short_circuits() {
        let mut sh = shell().await;
        let result = sh.exec("false && echo nope || echo yep").await;
        assert_eq!(result.stdout, "yep\n");
    }

    #[tokio::test]
    async fn variable_assignment_and_expansion() {
        let mut sh = shell().await;
        sh.exec("X=hello").await;
        let result = sh.exec("echo $X").await;
        assert_eq!(result.stdout, "hello\n");
    }

    #[tokio::test]
    async fn arithmetic_expansion_matches_example_scenario() {
        let mut sh = shell().await;
        let result = sh.exec("echo $((2**10+3*4))").await;
        assert_eq!(result.stdout, "1036\n");
    }

    #[tokio::test]
    async fn if_else_branches_on_exit_code() {
        let mut sh = shell().await;
        let result = sh.exec("if true; then echo yes; else echo no; fi").await;
        assert_eq!(result.stdout, "yes\n");
    }

    #[tokio::test]
    async fn for_loop_iterates_words() {
        let mut sh = shell().await;
        let result = sh.exec("for x in a b c; do echo $x; done").await;
        assert_eq!(result.stdout, "a\nb\nc\n");
    }

    #[tokio::test]
    async fn case_matches_first_pattern() {
        let mut sh = shell().await;
        let result = sh.exec("case foo in f*) echo match;; *) echo nomatch;; esac").await;
        assert_eq!(result.stdout, "match\n");
    }

    #[tokio::test]
    async fn function_definition_and_call() {
        let mut sh = shell().await;
        sh.exec("greet() { echo hi $1; }").await;
        let result = sh.exec("greet world").await;
        assert_eq!(result.stdout, "hi world\n");
    }

    #[tokio::test]
    async fn redirect_writes_to_vfs_file() {
        let mut sh = shell().await;
        sh.exec("echo hi > /home/foam/out.txt").await;
        let result = sh.exec("cat /home/foam/out.txt").await;
        assert_eq!(result.stdout, "hi\n");
    }

    #[tokio::test]
    async fn stderr_merges_into_stdout_with_2_and_1() {
        let mut sh = shell().await;
        let result = sh.exec("cat /no/such/file 2>&1").await;
        assert!(result.stderr.is_empty());
        assert!(result.stdout.contains("no such file"));
    }

    #[tokio::test]
    async fn command_not_found_is_127() {
        let mut sh = shell().await;
        let result = sh.exec("totally-not-a-command").await;
        assert_eq!(result.exit_code, 127);
    }

    #[tokio::test]
    async fn background_job_is_tracked() {
        let mut sh = shell().await;
        let result = sh.exec("sleep 0 &").await;
        assert!(result.stdout.starts_with('['));
        assert_eq!(sh.jobs().list().count(), 1);
    }
}
