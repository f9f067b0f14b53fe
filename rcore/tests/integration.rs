//! Integration tests for rcore
//!
//! Source text goes through the lexer, parser and interpreter the way the
//! REPL drives them: every top-level value that is visible gets printed, and
//! errors are reported without ending the session.

use rcore::interp::Interpreter;
use rcore::lexer::tokenize;
use rcore::parser::parse;

/// Evaluate `source` like a REPL session and return everything it printed
fn session(source: &str) -> String {
    let tokens = tokenize(source).unwrap();
    let program = parse("test.R", source, tokens).unwrap();
    let mut interp = Interpreter::new();
    interp.capture_output();
    let mut transcript = String::new();
    for expr in &program.exprs {
        let outcome = interp.eval_expr(expr).and_then(|value| {
            if interp.is_visible() {
                interp.print_value(&value)?;
            }
            Ok(())
        });
        transcript.push_str(&interp.take_output());
        if let Err(err) = outcome {
            transcript.push_str(&format!("{err}\n"));
        }
    }
    transcript
}

// ============================================
// Scoping and promises
// ============================================

#[test]
fn test_lexical_scoping() {
    let out = session(
        r#"
x <- "global"
f <- function() x
g <- function() { x <- "local"; f() }
g()
h <- function() { x <- "local"; k <- function() x; k() }
h()
"#,
    );
    insta::assert_snapshot!(out, @r#"
    [1] "global"
    [1] "local"
    "#);
}

#[test]
fn test_promise_is_forced_once() {
    let out = session(
        r#"
n <- 0
f <- function(x) { x; x; x }
f({ n <- n + 1; n * 10 })
n
g <- function(x) "unused"
g(stop("never"))
"#,
    );
    insta::assert_snapshot!(out, @r#"
    [1] 10
    [1] 1
    [1] "unused"
    "#);
}

#[test]
fn test_defaults_are_evaluated_in_the_callee() {
    let out = session(
        r#"
f <- function(a, b = a * 2) { a <- 10; b }
f(1)
f(1, 5)
"#,
    );
    insta::assert_snapshot!(out, @r#"
    [1] 20
    [1] 5
    "#);
}

#[test]
fn test_self_referential_promise_reads_as_missing() {
    let mut interp = Interpreter::new();
    let value = interp.eval_source("delayedAssign(\"p\", p); p").unwrap();
    insta::assert_snapshot!(format!("{value:?}"), @"Missing");

    let out = session(
        r#"
delayedAssign("p", p)
r <- p
"after"
"#,
    );
    insta::assert_snapshot!(out, @r#"[1] "after""#);
}

// ============================================
// Argument matching
// ============================================

#[test]
fn test_varargs_are_spliced_in_order() {
    let out = session(
        r#"
f <- function(...) names(list(...))
g <- function(...) f(a = 1, ..., z = 3)
g(b = 2, y = 4)
count <- function(...) length(list(...))
count()
count(1, "b", NULL)
"#,
    );
    insta::assert_snapshot!(out, @r#"
    [1] "a" "b" "y" "z"
    [1] 0
    [1] 3
    "#);
}

#[test]
fn test_matching_errors() {
    let out = session(
        r#"
f <- function(value, verbose) value
f(val = 1, verb = 2)
f(v = 1)
f(1, 2, 3)
f(value = 1, value = 2)
f(verbose = 1)
"#,
    );
    insta::assert_snapshot!(out, @r#"
    [1] 1
    Error: argument 1 matches multiple formal arguments
    Error: unused argument (3)
    Error: formal argument "value" matched by multiple actual arguments
    Error: argument "value" is missing, with no default
    "#);
}

// ============================================
// Calls and visibility
// ============================================

#[test]
fn test_function_lookup_skips_values() {
    let out = session(
        r#"
c <- 1
c(c, 2)
nope(1)
c
"#,
    );
    insta::assert_snapshot!(out, @r#"
    [1] 1 2
    Error: could not find function "nope"
    [1] 1
    "#);
}

#[test]
fn test_visibility_at_top_level() {
    let out = session(
        r#"
f <- function() invisible(7)
f()
(f())
y <- 3
g <- function() y <- 4
g()
withVisible(g())$visible
"#,
    );
    insta::assert_snapshot!(out, @r#"
    [1] 7
    [1] FALSE
    "#);
}

#[test]
fn test_on_exit_runs_on_normal_and_error_exit() {
    let out = session(
        r#"
f <- function(fail) {
  on.exit(cat("cleanup\n"))
  if (fail) stop("boom")
  "ok"
}
f(FALSE)
f(TRUE)
"#,
    );
    insta::assert_snapshot!(out, @r#"
    cleanup
    [1] "ok"
    cleanup
    Error: boom
    "#);
}

#[test]
fn test_runaway_recursion() {
    let out = session(
        r#"
f <- function(n) f(n + 1)
f(1)
"after"
"#,
    );
    insta::assert_snapshot!(out, @r#"
    Error: evaluation nested too deeply: infinite recursion / options(expressions=)?
    [1] "after"
    "#);
}

// ============================================
// Environments and bindings
// ============================================

#[test]
fn test_locked_binding() {
    let out = session(
        r#"
e <- new.env()
assign("x", 1, envir = e)
lockBinding("x", e)
assign("x", 2, envir = e)
get("x", envir = e)
"#,
    );
    insta::assert_snapshot!(out, @r#"
    Error: cannot change value of locked binding for 'x'
    [1] 1
    "#);
}

#[test]
fn test_active_binding_reevaluates() {
    let out = session(
        r#"
k <- 0
makeActiveBinding("tick", function() { k <<- k + 1; k }, globalenv())
tick
tick
k
"#,
    );
    insta::assert_snapshot!(out, @r#"
    [1] 1
    [1] 2
    [1] 2
    "#);
}

#[test]
fn test_cached_lookup_follows_shape_changes() {
    let out = session(
        r#"
x <- "global"
make <- function(define) { if (define) x <- "inner"; function() x }
fs <- list(make(TRUE), make(FALSE), make(TRUE), make(FALSE))
for (f in fs) print(f())
rm(x)
fs[[2]]()
"#,
    );
    insta::assert_snapshot!(out, @r#"
    [1] "inner"
    [1] "global"
    [1] "inner"
    [1] "global"
    Error: object 'x' not found
    "#);
}

// ============================================
// S3 dispatch
// ============================================

#[test]
fn test_auto_print_dispatches() {
    let out = session(
        r#"
print.money <- function(x, ...) cat("$", unclass(x), "\n", sep = "")
m <- structure(5, class = "money")
m
unclass(m)
"#,
    );
    insta::assert_snapshot!(out, @r#"
    $5
    [1] 5
    "#);
}

#[test]
fn test_method_chain() {
    let out = session(
        r#"
area <- function(shape, ...) UseMethod("area")
area.default <- function(shape, ...) stop("unknown shape")
area.square <- function(shape, ...) shape$side^2
area.tile <- function(shape, ...) paste0("tile of ", NextMethod())
sq <- structure(list(side = 3), class = "square")
area(sq)
area(structure(list(side = 2), class = c("tile", "square")))
area(1)
"#,
    );
    insta::assert_snapshot!(out, @r#"
    [1] 9
    [1] "tile of 4"
    Error: unknown shape
    "#);
}

#[test]
fn test_group_generic_operators() {
    let out = session(
        r#"
Ops.money <- function(e1, e2) {
  v <- get(.Generic)(unclass(e1), unclass(e2))
  if (.Generic == "+") structure(v, class = "money") else v
}
print.money <- function(x, ...) cat("<money ", unclass(x), ">\n", sep = "")
m <- structure(5, class = "money")
m + m
m > 1
m * 2
"#,
    );
    insta::assert_snapshot!(out, @r#"
    <money 10>
    [1] TRUE
    [1] 10
    "#);
}

#[test]
fn test_dispatch_falls_through_to_later_class() {
    let out = session(
        r#"
print.bar <- function(x, ...) {
  cat("print.bar; .Class =", .Class)
  cat("\n")
  invisible(x)
}
obj <- structure(1, class = c("foo", "bar"))
obj
print(obj)
"#,
    );
    insta::assert_snapshot!(out, @r#"
    print.bar; .Class = bar
    print.bar; .Class = bar
    "#);
}
