//! A solver backend that talks SMT-LIB 2 to an external solver process.
//!
//! Each query spawns a fresh process, writes a complete script to its standard
//! input, and reads the verdict and model from its standard output. Nothing is
//! shared between queries, which keeps the backend stateless.

use std::{
    io::{Read, Write},
    process::{Child, ChildStdin, ChildStdout, Command, Stdio},
    thread,
    time::{Duration, Instant},
};

use crate::{
    constant::{
        DEFAULT_SOLVER_ARGUMENTS,
        DEFAULT_SOLVER_COMMAND,
        DEFAULT_SOLVER_TIMEOUT,
        SOLVER_PROCESS_POLL_INTERVAL,
    },
    error::solver::{Error, Result},
    expr::{smtlib, Expr, ExprPool, Model, Value},
    solver::{Solver, SolverResult},
    watchdog::Watchdog,
};

/// A [`Solver`] that runs an external SMT-LIB 2 solver such as `z3` or `cvc5`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SmtLibProcessSolver {
    command:   String,
    arguments: Vec<String>,
    timeout:   Duration,
}

impl Default for SmtLibProcessSolver {
    fn default() -> Self {
        Self::new(
            DEFAULT_SOLVER_COMMAND,
            DEFAULT_SOLVER_ARGUMENTS,
            DEFAULT_SOLVER_TIMEOUT,
        )
    }
}

impl SmtLibProcessSolver {
    /// Constructs a backend that runs `command` with `arguments` for each
    /// query, killing the process if it runs longer than `timeout`.
    pub fn new(
        command: impl Into<String>,
        arguments: impl IntoIterator<Item = impl Into<String>>,
        timeout: Duration,
    ) -> Self {
        Self {
            command: command.into(),
            arguments: arguments.into_iter().map(Into::into).collect(),
            timeout,
        }
    }

    /// Renders the complete script for a query over `assertions`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if an assertion mentions a slot, which has no meaning
    /// to the solver.
    pub fn script(assertions: &[Expr], pool: &ExprPool) -> Result<String> {
        let mut script = String::from("(set-option :produce-models true)\n(set-logic ALL)\n");
        for (name, sort) in pool.variables(assertions) {
            script.push_str(&format!(
                "(declare-const {} {})\n",
                smtlib::quote_symbol(&name),
                smtlib::sort_name(sort)
            ));
        }
        for assertion in assertions {
            if !pool.slots(&[*assertion]).is_empty() {
                return Err(Error::UnexpectedOutput(format!(
                    "assertion {assertion} still mentions frame slots"
                )));
            }
            script.push_str(&format!("(assert {})\n", pool.to_smtlib(*assertion)));
        }
        script.push_str("(check-sat)\n(get-model)\n(exit)\n");
        Ok(script)
    }

    /// Waits for `process` to exit, giving up once the timeout elapses or the
    /// watchdog asks to stop. A process that is given up on is killed when it
    /// is dropped.
    fn wait(&self, process: &mut SolverProcess, watchdog: &dyn Watchdog) -> Result<()> {
        let started = Instant::now();
        loop {
            if process.try_reap()? {
                return Ok(());
            }
            if watchdog.should_stop() {
                return Err(Error::Cancelled);
            }
            if started.elapsed() >= self.timeout {
                return Err(Error::Timeout {
                    millis: self.timeout.as_millis(),
                });
            }
            thread::sleep(SOLVER_PROCESS_POLL_INTERVAL);
        }
    }
}

impl Solver for SmtLibProcessSolver {
    fn name(&self) -> &str {
        &self.command
    }

    fn check_sat(
        &mut self,
        assertions: &[Expr],
        pool: &ExprPool,
        watchdog: &dyn Watchdog,
    ) -> Result<SolverResult> {
        let script = Self::script(assertions, pool)?;

        let child = Command::new(&self.command)
            .args(&self.arguments)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| Error::SpawnFailed {
                command: self.command.clone(),
                reason:  e.to_string(),
            })?;
        let mut process = SolverProcess::new(child);
        let (mut stdin, mut stdout) = process.pipes()?;

        // The output is drained on another thread so that a chatty solver can
        // never block on a full pipe while we wait for it to exit. The process
        // is dropped before the scope joins the reader, so the reader always
        // sees the end of its output.
        crossbeam::thread::scope(|scope| -> Result<SolverResult> {
            let mut process = process;
            let reader = scope.spawn(move |_| {
                let mut output = String::new();
                stdout.read_to_string(&mut output).map(|_| output)
            });

            stdin.write_all(script.as_bytes())?;
            drop(stdin);
            self.wait(&mut process, watchdog)?;

            let output = reader
                .join()
                .map_err(|_| Error::Io("the solver output reader panicked".into()))??;
            parse_response(&output)
        })
        .map_err(|_| Error::Io("the solver output reader panicked".into()))?
    }
}

/// A running solver process, which is killed and reaped when dropped unless
/// it already exited.
#[derive(Debug)]
struct SolverProcess {
    child:  Child,
    reaped: bool,
}

impl SolverProcess {
    fn new(child: Child) -> Self {
        Self {
            child,
            reaped: false,
        }
    }

    /// Takes the process's standard input and output.
    fn pipes(&mut self) -> Result<(ChildStdin, ChildStdout)> {
        let stdin = self
            .child
            .stdin
            .take()
            .ok_or_else(|| Error::Io("the solver's standard input was not captured".into()))?;
        let stdout = self
            .child
            .stdout
            .take()
            .ok_or_else(|| Error::Io("the solver's standard output was not captured".into()))?;
        Ok((stdin, stdout))
    }

    /// Checks if the process exited, reaping it if so.
    fn try_reap(&mut self) -> Result<bool> {
        if self.child.try_wait()?.is_some() {
            self.reaped = true;
        }
        Ok(self.reaped)
    }
}

impl Drop for SolverProcess {
    fn drop(&mut self) {
        if !self.reaped {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

/// Parses the verdict and, if present, the model from the solver's response.
///
/// # Errors
///
/// Returns [`Err`] if the response does not start with a verdict, or if a
/// model is present but malformed.
pub fn parse_response(output: &str) -> Result<SolverResult> {
    let trimmed = output.trim_start();
    let (verdict, rest) = trimmed.split_at(trimmed.find(char::is_whitespace).unwrap_or(trimmed.len()));

    match verdict {
        "sat" => Ok(SolverResult::Sat(parse_model(rest)?)),
        "unsat" => Ok(SolverResult::Unsat),
        "unknown" => Ok(SolverResult::Unknown),
        _ => Err(Error::UnexpectedOutput(output.to_string())),
    }
}

/// A parsed s-expression.
#[derive(Clone, Debug, Eq, PartialEq)]
enum SExpr {
    Atom(String),
    List(Vec<SExpr>),
}

/// Parses the output of `(get-model)`, keeping the nullary `define-fun`
/// entries whose values are integer or boolean literals.
fn parse_model(text: &str) -> Result<Model> {
    let mut model = Model::new();
    let tokens = tokenize(text);
    if tokens.is_empty() {
        return Ok(model);
    }

    let mut position = 0;
    let root = parse_sexpr(&tokens, &mut position)?;
    let SExpr::List(entries) = root else {
        return Err(Error::UnexpectedOutput(text.to_string()));
    };

    for entry in entries {
        let SExpr::List(items) = entry else {
            // Older solvers prefix the model with the atom `model`.
            continue;
        };
        match items.as_slice() {
            [SExpr::Atom(keyword), SExpr::Atom(name), SExpr::List(params), _sort, value]
                if keyword == "define-fun" && params.is_empty() =>
            {
                if let Some(value) = parse_value(value) {
                    model.insert(unquote(name), value);
                }
            }
            _ => (),
        }
    }

    Ok(model)
}

fn parse_value(value: &SExpr) -> Option<Value> {
    match value {
        SExpr::Atom(a) if a == "true" => Some(Value::Bool(true)),
        SExpr::Atom(a) if a == "false" => Some(Value::Bool(false)),
        SExpr::Atom(a) => a.parse().ok().map(Value::Int),
        SExpr::List(items) => match items.as_slice() {
            [SExpr::Atom(minus), SExpr::Atom(n)] if minus == "-" => {
                n.parse::<i64>().ok().and_then(i64::checked_neg).map(Value::Int)
            }
            _ => None,
        },
    }
}

fn unquote(name: &str) -> String {
    name.strip_prefix('|')
        .and_then(|n| n.strip_suffix('|'))
        .unwrap_or(name)
        .to_string()
}

fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = vec![];
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '(' | ')' => tokens.push(c.to_string()),
            '|' => {
                let mut symbol = String::from('|');
                for c in chars.by_ref() {
                    symbol.push(c);
                    if c == '|' {
                        break;
                    }
                }
                tokens.push(symbol);
            }
            c if c.is_whitespace() => (),
            c => {
                let mut atom = c.to_string();
                while let Some(next) = chars.peek() {
                    if next.is_whitespace() || *next == '(' || *next == ')' {
                        break;
                    }
                    atom.push(*next);
                    chars.next();
                }
                tokens.push(atom);
            }
        }
    }
    tokens
}

fn parse_sexpr(tokens: &[String], position: &mut usize) -> Result<SExpr> {
    let token = tokens
        .get(*position)
        .ok_or_else(|| Error::UnexpectedOutput("unexpected end of model".into()))?;
    *position += 1;

    match token.as_str() {
        "(" => {
            let mut items = vec![];
            loop {
                match tokens.get(*position).map(String::as_str) {
                    Some(")") => {
                        *position += 1;
                        return Ok(SExpr::List(items));
                    }
                    Some(_) => items.push(parse_sexpr(tokens, position)?),
                    None => return Err(Error::UnexpectedOutput("unbalanced model".into())),
                }
            }
        }
        ")" => Err(Error::UnexpectedOutput("unbalanced model".into())),
        atom => Ok(SExpr::Atom(atom.to_string())),
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use crate::{
        error::solver::Error,
        expr::{ExprPool, Sort, Value},
        solver::{
            process::{parse_response, SmtLibProcessSolver},
            Solver,
            SolverResult,
        },
        watchdog::LazyWatchdog,
    };

    #[test]
    fn renders_a_complete_script() -> anyhow::Result<()> {
        let pool = ExprPool::new();
        let x = pool.var("x", Sort::Int)?;
        let positive = pool.gt(x, pool.int(0))?;

        let script = SmtLibProcessSolver::script(&[positive], &pool)?;
        assert!(script.contains("(declare-const |x| Int)"));
        assert!(script.contains("(assert (> |x| 0))"));
        assert!(script.ends_with("(check-sat)\n(get-model)\n(exit)\n"));

        Ok(())
    }

    #[test]
    fn parses_verdicts_and_models() -> anyhow::Result<()> {
        let output = "sat\n(\n  (define-fun |x| () Int\n    (- 7))\n  (define-fun flag () Bool \
                      true)\n)\n";
        let result = parse_response(output)?;
        let model = result.model().expect("Response should contain a model");
        assert_eq!(model.get("x"), Some(Value::Int(-7)));
        assert_eq!(model.get("flag"), Some(Value::Bool(true)));

        assert_eq!(parse_response("unsat\n(error \"no model\")")?, SolverResult::Unsat);
        assert_eq!(parse_response("unknown\n")?, SolverResult::Unknown);
        assert!(parse_response("segfault").is_err());

        Ok(())
    }

    /// Held by the tests that spawn processes, so that none observes another's
    /// child between its kill and its reaping.
    #[cfg(target_os = "linux")]
    static SPAWNING: parking_lot::Mutex<()> = parking_lot::Mutex::new(());

    /// Counts the zombie processes whose parent is this test process.
    #[cfg(target_os = "linux")]
    fn zombie_children() -> usize {
        let me = std::process::id().to_string();
        std::fs::read_dir("/proc")
            .into_iter()
            .flatten()
            .flatten()
            .filter_map(|entry| std::fs::read_to_string(entry.path().join("stat")).ok())
            .filter(|stat| {
                // The command name is parenthesised and may itself contain spaces
                let Some((_, rest)) = stat.rsplit_once(") ") else {
                    return false;
                };
                let mut fields = rest.split_whitespace();
                fields.next() == Some("Z") && fields.next() == Some(me.as_str())
            })
            .count()
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn reaps_solvers_that_exit_before_reading_their_input() -> anyhow::Result<()> {
        let _spawning = SPAWNING.lock();
        let pool = ExprPool::new();
        let x = pool.var("x", Sort::Int)?;
        let assertions = (0..6000)
            .map(|i| pool.gt(x, pool.int(i)))
            .collect::<Result<Vec<_>, _>>()?;

        // The script is far larger than a pipe buffer, so the write fails
        let mut solver = SmtLibProcessSolver::new("sh", ["-c", "exit 0"], Duration::from_secs(5));
        let result = solver.check_sat(&assertions, &pool, &LazyWatchdog);
        assert!(result.is_err());
        assert_eq!(zombie_children(), 0);

        Ok(())
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn kills_solvers_that_outlive_their_timeout() -> anyhow::Result<()> {
        let _spawning = SPAWNING.lock();
        let pool = ExprPool::new();
        let x = pool.var("x", Sort::Int)?;
        let positive = pool.gt(x, pool.int(0))?;

        let mut solver =
            SmtLibProcessSolver::new("sh", ["-c", "cat > /dev/null; exec sleep 30"], Duration::from_millis(50));
        let result = solver.check_sat(&[positive], &pool, &LazyWatchdog);
        assert!(matches!(result, Err(Error::Timeout { .. })));
        assert_eq!(zombie_children(), 0);

        Ok(())
    }

    #[test]
    fn reports_missing_solver_binaries() -> anyhow::Result<()> {
        let pool = ExprPool::new();
        let x = pool.var("x", Sort::Int)?;
        let positive = pool.gt(x, pool.int(0))?;

        let mut solver = SmtLibProcessSolver::new(
            "definitely-not-a-solver-binary",
            Vec::<String>::new(),
            Duration::from_secs(1),
        );
        let result = solver.check_sat(&[positive], &pool, &LazyWatchdog);
        assert!(matches!(result, Err(Error::SpawnFailed { .. })));

        Ok(())
    }
}
