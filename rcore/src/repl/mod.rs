//! REPL (Read-Eval-Print Loop)

use crate::config::Config;
use crate::error::{Error, report_error};
use crate::interp::Interpreter;
use crate::lexer::tokenize;
use crate::parser::parse;
use rustyline::error::ReadlineError;
use rustyline::{DefaultEditor, Result as RlResult};
use std::path::PathBuf;

const CONTINUE_PROMPT: &str = "+ ";
const HISTORY_FILE: &str = ".rcore_history";

/// Result of feeding one chunk of input
#[derive(Debug, PartialEq, Eq)]
enum Status {
    Done,
    /// Input ends inside an expression; more lines are needed
    Incomplete,
}

/// REPL state
pub struct Repl {
    editor: DefaultEditor,
    interpreter: Interpreter,
    prompt: String,
    history_path: Option<PathBuf>,
}

impl Repl {
    /// Create a new REPL
    pub fn new() -> RlResult<Self> {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> RlResult<Self> {
        let editor = DefaultEditor::new()?;
        let prompt = config.repl.prompt.clone();
        let history_path = if config.repl.history {
            dirs_home().map(|h| h.join(HISTORY_FILE))
        } else {
            None
        };
        let interpreter = Interpreter::with_config(config);

        let mut repl = Repl {
            editor,
            interpreter,
            prompt,
            history_path,
        };

        if let Some(ref path) = repl.history_path
            && let Err(err) = repl.editor.load_history(path)
        {
            tracing::debug!(path = %path.display(), error = %err, "no history loaded");
        }

        Ok(repl)
    }

    /// Run the REPL
    pub fn run(&mut self) -> RlResult<()> {
        println!("rcore {}", env!("CARGO_PKG_VERSION"));
        println!("Type :help for help, :quit to exit.\n");

        let mut pending = String::new();
        loop {
            let prompt = if pending.is_empty() {
                self.prompt.as_str()
            } else {
                CONTINUE_PROMPT
            };
            match self.editor.readline(prompt) {
                Ok(line) => {
                    if pending.is_empty() {
                        let trimmed = line.trim();
                        if trimmed.is_empty() {
                            continue;
                        }
                        if trimmed.starts_with(':') {
                            let _ = self.editor.add_history_entry(trimmed);
                            if self.handle_command(trimmed) {
                                break;
                            }
                            continue;
                        }
                    }

                    pending.push_str(&line);
                    pending.push('\n');
                    if self.eval_input(&pending) == Status::Done {
                        let _ = self.editor.add_history_entry(pending.trim_end());
                        pending.clear();
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("^C");
                    pending.clear();
                    continue;
                }
                Err(ReadlineError::Eof) => {
                    break;
                }
                Err(err) => {
                    eprintln!("Error: {err}");
                    break;
                }
            }
        }

        if let Some(ref path) = self.history_path
            && let Err(err) = self.editor.save_history(path)
        {
            tracing::warn!(path = %path.display(), error = %err, "failed to save history");
        }

        Ok(())
    }

    /// Handle REPL commands (starting with :)
    fn handle_command(&mut self, cmd: &str) -> bool {
        match cmd {
            ":quit" | ":q" | ":exit" => true,
            ":help" | ":h" | ":?" => {
                self.print_help();
                false
            }
            ":clear" => {
                print!("\x1B[2J\x1B[1;1H");
                false
            }
            _ => {
                println!("Unknown command: {cmd}");
                println!("Type :help for help.");
                false
            }
        }
    }

    /// Print help message
    fn print_help(&self) {
        println!("REPL Commands:");
        println!("  :help, :h, :?   Show this help");
        println!("  :quit, :q       Exit the REPL");
        println!("  :clear          Clear the screen");
        println!();
        println!("You can enter:");
        println!("  - Expressions: 1 + 2, c(a = 1, b = 2)");
        println!("  - Assignments: f <- function(x, ...) UseMethod(\"f\")");
        println!("  - Control flow: for (i in 1:3) print(i)");
    }

    /// Evaluate one complete input, printing visible values.
    /// Errors are reported and leave the session usable.
    fn eval_input(&mut self, input: &str) -> Status {
        let program = match tokenize(input).and_then(|tokens| parse("<repl>", input, tokens)) {
            Ok(program) => program,
            Err(err) if is_incomplete(&err, input) => return Status::Incomplete,
            Err(err) => {
                report_error("<repl>", input, &err);
                return Status::Done;
            }
        };

        for expr in &program.exprs {
            let outcome = self.interpreter.eval_expr(expr).and_then(|value| {
                if self.interpreter.is_visible() {
                    self.interpreter.print_value(&value)?;
                }
                Ok(())
            });
            if let Err(err) = outcome {
                eprintln!("{err}");
                break;
            }
        }
        Status::Done
    }
}

/// Whether a parse failure is only the input running out early
fn is_incomplete(err: &Error, input: &str) -> bool {
    matches!(err, Error::Parser { span, .. } if span.start >= input.len())
}

/// Get home directory
fn dirs_home() -> Option<PathBuf> {
    #[cfg(windows)]
    {
        std::env::var("USERPROFILE").ok().map(PathBuf::from)
    }
    #[cfg(not(windows))]
    {
        std::env::var("HOME").ok().map(PathBuf::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repl() -> Repl {
        let mut config = Config::default();
        config.repl.history = false;
        let mut repl = Repl::with_config(config).unwrap();
        repl.interpreter.capture_output();
        repl
    }

    #[test]
    fn test_handle_command_quit() {
        let mut repl = repl();
        assert!(repl.handle_command(":quit"));
        assert!(repl.handle_command(":q"));
        assert!(repl.handle_command(":exit"));
    }

    #[test]
    fn test_handle_command_help() {
        let mut repl = repl();
        assert!(!repl.handle_command(":help"));
        assert!(!repl.handle_command(":h"));
        assert!(!repl.handle_command(":?"));
    }

    #[test]
    fn test_prints_only_visible_values() {
        let mut repl = repl();
        assert_eq!(repl.eval_input("x <- 2\n"), Status::Done);
        assert_eq!(repl.interpreter.take_output(), "");
        assert_eq!(repl.eval_input("x * 3\n"), Status::Done);
        assert_eq!(repl.interpreter.take_output(), "[1] 6\n");
        repl.eval_input("invisible(x); (y <- x)\n");
        assert_eq!(repl.interpreter.take_output(), "[1] 2\n");
    }

    #[test]
    fn test_incomplete_input_waits_for_more() {
        let mut repl = repl();
        assert_eq!(repl.eval_input("f <- function(x) {\n"), Status::Incomplete);
        assert_eq!(repl.eval_input("f <- function(x) {\n x + 1\n}\n"), Status::Done);
        repl.eval_input("f(1)\n");
        assert_eq!(repl.interpreter.take_output(), "[1] 2\n");
    }

    #[test]
    fn test_session_survives_errors() {
        let mut repl = repl();
        assert_eq!(repl.eval_input("undefined_thing\n"), Status::Done);
        assert_eq!(repl.eval_input("1 +* 2\n"), Status::Done);
        repl.eval_input("3\n");
        assert_eq!(repl.interpreter.take_output(), "[1] 3\n");
    }
}
