//! Variable resolution
//!
//! [`Interpreter::resolve`] walks the environment chain from a starting
//! environment, forcing promises and calling active bindings on the way.
//!
//! Lookups made from a syntactic site are memoized in a [`LookupCache`]: the
//! slow path records, per chain level, the shape it saw and what it did there
//! (name absent, binding skipped, binding used). A later lookup replays the
//! recipe after checking every shape; any difference invalidates it. A site
//! that keeps invalidating is marked polymorphic and stays on the slow path.
//! Recipes hold the shapes they were recorded against, so those shapes keep
//! their ids while the recipe lives.

use super::args::Arguments;
use super::env::{EnvRef, Slot};
use super::error::{InterpResult, RuntimeError};
use super::eval::Interpreter;
use super::shape::Shape;
use super::value::Value;
use crate::ast::SiteId;
use crate::config::LookupConfig;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

/// Kind of value a lookup is looking for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedKind {
    Any,
    /// Bindings that are not functions are skipped
    Function,
}

impl ExpectedKind {
    fn accepts(self, value: &Value) -> bool {
        match self {
            ExpectedKind::Any => true,
            ExpectedKind::Function => value.is_function(),
        }
    }
}

/// How a lookup behaves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    Normal,
    /// Not found is not an error, and missing arguments read as the sentinel
    Silent,
    /// Vector results are returned as a fresh allocation
    Copying,
    /// Start at the parent of the starting environment
    SuperLookup,
    /// Unforced promises are forced and skipped when not of the expected kind
    ForcedTypeCheck,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LevelAction {
    Absent,
    Skip(usize),
    Hit(usize),
}

#[derive(Debug, Clone)]
struct Level {
    shape: Arc<Shape>,
    action: LevelAction,
}

#[derive(Debug, Default)]
struct SiteState {
    recipe: Option<Rc<[Level]>>,
    invalidations: usize,
    polymorphic: bool,
}

/// Per-site lookup memo
#[derive(Debug)]
pub struct LookupCache {
    enabled: bool,
    max_invalidations: usize,
    max_sites: usize,
    sites: HashMap<SiteId, SiteState>,
    hits: u64,
}

impl LookupCache {
    pub fn new(config: &LookupConfig) -> Self {
        LookupCache {
            enabled: config.cache,
            max_invalidations: config.max_invalidations,
            max_sites: config.max_sites,
            sites: HashMap::new(),
            hits: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Lookups answered from a recipe
    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn is_polymorphic(&self, site: SiteId) -> bool {
        self.sites.get(&site).is_some_and(|s| s.polymorphic)
    }

    pub fn invalidations(&self, site: SiteId) -> usize {
        self.sites.get(&site).map_or(0, |s| s.invalidations)
    }

    /// Sites with recorded state
    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    fn site_mut(&mut self, site: SiteId) -> &mut SiteState {
        if !self.sites.contains_key(&site) && self.sites.len() >= self.max_sites {
            evict_oldest_sites(&mut self.sites);
        }
        self.sites.entry(site).or_default()
    }

    fn recipe(&self, site: SiteId) -> Option<Rc<[Level]>> {
        self.sites.get(&site)?.recipe.clone()
    }

    fn record(&mut self, site: SiteId, levels: Vec<Level>) {
        let state = self.site_mut(site);
        if !state.polymorphic {
            state.recipe = Some(levels.into());
        }
    }

    fn invalidate(&mut self, site: SiteId, name: &str) {
        let max = self.max_invalidations;
        let state = self.site_mut(site);
        state.recipe = None;
        state.invalidations += 1;
        tracing::trace!(name, invalidations = state.invalidations, "lookup cache invalidated");
        if state.invalidations >= max && !state.polymorphic {
            state.polymorphic = true;
            tracing::debug!(name, "polymorphic (slow path) lookup of symbol");
        }
    }
}

enum SlotRead {
    Found(Value),
    Skip,
}

enum Replay {
    Found(Value),
    Stale,
}

/// `N` for a `..N` name
fn dots_index(name: &str) -> Option<usize> {
    name.strip_prefix("..")?
        .parse::<usize>()
        .ok()
        .filter(|n| *n > 0)
}

impl Interpreter {
    /// Resolve `name` starting at `env`.
    ///
    /// Returns `None` only in [`ReadMode::Silent`] when nothing is found.
    pub fn resolve(
        &mut self,
        name: &str,
        env: &EnvRef,
        expected: ExpectedKind,
        mode: ReadMode,
        site: Option<SiteId>,
    ) -> InterpResult<Option<Value>> {
        if name.is_empty() {
            return Err(RuntimeError::zero_length_identifier());
        }
        if let Some(index) = dots_index(name) {
            return self.resolve_dots_element(name, index, env).map(Some);
        }

        let start = if mode == ReadMode::SuperLookup {
            env.borrow().parent()
        } else {
            Some(Rc::clone(env))
        };
        let found = match (start, site) {
            (None, _) => None,
            (Some(start), Some(site)) if self.lookup_cache.is_enabled() => {
                self.resolve_cached(name, &start, expected, mode, site)?
            }
            (Some(start), _) => self.resolve_slow(name, &start, expected, mode, None)?,
        };

        match found {
            Some(value) if mode == ReadMode::Copying => Ok(Some(value.deep_copy())),
            Some(value) => Ok(Some(value)),
            None if mode == ReadMode::Silent => Ok(None),
            None => Err(not_found(name, expected)),
        }
    }

    /// Resolve a variable that must exist
    pub fn lookup_value(&mut self, name: &str, env: &EnvRef, site: Option<SiteId>) -> InterpResult<Value> {
        self.resolve(name, env, ExpectedKind::Any, ReadMode::Normal, site)?
            .ok_or_else(|| RuntimeError::unknown_variable(name))
    }

    /// Resolve a function for a call
    pub fn lookup_function(&mut self, name: &str, env: &EnvRef, site: Option<SiteId>) -> InterpResult<Value> {
        self.resolve(name, env, ExpectedKind::Function, ReadMode::ForcedTypeCheck, site)?
            .ok_or_else(|| RuntimeError::unknown_function(name))
    }

    fn resolve_cached(
        &mut self,
        name: &str,
        start: &EnvRef,
        expected: ExpectedKind,
        mode: ReadMode,
        site: SiteId,
    ) -> InterpResult<Option<Value>> {
        if self.lookup_cache.is_polymorphic(site) {
            return self.resolve_slow(name, start, expected, mode, None);
        }
        if let Some(recipe) = self.lookup_cache.recipe(site) {
            match self.replay(name, start, expected, mode, &recipe)? {
                Replay::Found(value) => {
                    self.lookup_cache.hits += 1;
                    return Ok(Some(value));
                }
                Replay::Stale => self.lookup_cache.invalidate(site, name),
            }
            if self.lookup_cache.is_polymorphic(site) {
                return self.resolve_slow(name, start, expected, mode, None);
            }
        }
        let mut levels = Vec::new();
        let found = self.resolve_slow(name, start, expected, mode, Some(&mut levels))?;
        if found.is_some() {
            self.lookup_cache.record(site, levels);
        }
        Ok(found)
    }

    /// The general chain walk, optionally recording what it did per level
    fn resolve_slow(
        &mut self,
        name: &str,
        start: &EnvRef,
        expected: ExpectedKind,
        mode: ReadMode,
        mut record: Option<&mut Vec<Level>>,
    ) -> InterpResult<Option<Value>> {
        let mut current = Some(Rc::clone(start));
        while let Some(env) = current {
            let (shape, slot) = {
                let borrowed = env.borrow();
                let index = borrowed.index_of(name);
                let slot = index.and_then(|i| Some((i, borrowed.binding_at(i)?.value.clone())));
                (Arc::clone(borrowed.shape()), slot)
            };
            let action = match slot {
                None => LevelAction::Absent,
                Some((index, slot)) => match self.read_slot(name, slot, &env, expected, mode)? {
                    SlotRead::Found(value) => {
                        if let Some(levels) = record.as_deref_mut() {
                            levels.push(Level {
                                shape,
                                action: LevelAction::Hit(index),
                            });
                        }
                        return Ok(Some(value));
                    }
                    SlotRead::Skip => LevelAction::Skip(index),
                },
            };
            if let Some(levels) = record.as_deref_mut() {
                levels.push(Level { shape, action });
            }
            current = env.borrow().parent();
        }
        Ok(None)
    }

    fn replay(
        &mut self,
        name: &str,
        start: &EnvRef,
        expected: ExpectedKind,
        mode: ReadMode,
        recipe: &[Level],
    ) -> InterpResult<Replay> {
        let mut current = Some(Rc::clone(start));
        for level in recipe {
            let Some(env) = current else {
                return Ok(Replay::Stale);
            };
            if env.borrow().shape_id() != level.shape.id() {
                return Ok(Replay::Stale);
            }
            match level.action {
                LevelAction::Absent => {}
                LevelAction::Skip(index) => {
                    let slot = slot_at(&env, index)?;
                    if !still_skipped(&slot, expected, mode) {
                        return Ok(Replay::Stale);
                    }
                }
                LevelAction::Hit(index) => {
                    let slot = slot_at(&env, index)?;
                    return Ok(match self.read_slot(name, slot, &env, expected, mode)? {
                        SlotRead::Found(value) => Replay::Found(value),
                        SlotRead::Skip => Replay::Stale,
                    });
                }
            }
            current = env.borrow().parent();
        }
        Ok(Replay::Stale)
    }

    fn read_slot(
        &mut self,
        name: &str,
        slot: Slot,
        owner: &EnvRef,
        expected: ExpectedKind,
        mode: ReadMode,
    ) -> InterpResult<SlotRead> {
        let accept = |value: Value| {
            if expected.accepts(&value) {
                SlotRead::Found(value)
            } else {
                SlotRead::Skip
            }
        };
        match slot {
            Slot::Missing if mode == ReadMode::Silent => Ok(SlotRead::Found(Value::Missing)),
            Slot::Missing if skips_missing(expected, mode) => Ok(SlotRead::Skip),
            Slot::Missing => Err(RuntimeError::argument_missing(name)),
            Slot::Concrete(value) => Ok(accept(value)),
            Slot::Lazy(promise) if expected == ExpectedKind::Function => {
                if let Some(value) = promise.value() {
                    return Ok(accept(value));
                }
                let value = self.force_promise(&promise)?;
                if mode == ReadMode::ForcedTypeCheck || value.is_function() || value.is_missing() {
                    Ok(accept(value))
                } else {
                    Err(RuntimeError::not_a_function(name))
                }
            }
            Slot::Lazy(promise) => Ok(SlotRead::Found(self.force_promise(&promise)?)),
            Slot::Active(fun) => {
                let value = self.invoke(&fun, Arguments::default(), owner, name, None)?;
                if value.is_missing() {
                    return Err(not_found(name, expected));
                }
                Ok(accept(value))
            }
        }
    }

    fn resolve_dots_element(&mut self, name: &str, index: usize, env: &EnvRef) -> InterpResult<Value> {
        let Some(Value::VarArgs(dots)) =
            self.resolve("...", env, ExpectedKind::Any, ReadMode::Silent, None)?
        else {
            return Err(RuntimeError::no_dots(name));
        };
        let Some(value) = dots.values().get(index - 1).cloned() else {
            return Err(RuntimeError::dots_bounds(index));
        };
        match self.force_value(value)? {
            Value::Missing => Err(RuntimeError::argument_missing(name)),
            value => Ok(value),
        }
    }
}

/// Keep the newer half of `sites`; sites from earlier parses go first
pub(super) fn evict_oldest_sites<V>(sites: &mut HashMap<SiteId, V>) {
    let mut ids: Vec<SiteId> = sites.keys().copied().collect();
    ids.sort_unstable();
    let Some(&cutoff) = ids.get(ids.len() / 2) else {
        return;
    };
    sites.retain(|id, _| *id >= cutoff);
    tracing::debug!(kept = sites.len(), "dropped state of the oldest cached sites");
}

fn not_found(name: &str, expected: ExpectedKind) -> RuntimeError {
    match expected {
        ExpectedKind::Any => RuntimeError::unknown_variable(name),
        ExpectedKind::Function => RuntimeError::unknown_function(name),
    }
}

fn slot_at(env: &EnvRef, index: usize) -> InterpResult<Slot> {
    env.borrow()
        .binding_at(index)
        .map(|b| b.value.clone())
        .ok_or_else(|| RuntimeError::internal("lookup recipe points past the bindings of its shape"))
}

/// A function lookup that type-checks passes over missing arguments
fn skips_missing(expected: ExpectedKind, mode: ReadMode) -> bool {
    expected == ExpectedKind::Function && mode == ReadMode::ForcedTypeCheck
}

/// Whether a binding skipped when the recipe was recorded would still be skipped
fn still_skipped(slot: &Slot, expected: ExpectedKind, mode: ReadMode) -> bool {
    match slot {
        Slot::Concrete(value) => !expected.accepts(value),
        Slot::Lazy(promise) => promise.value().is_some_and(|v| !expected.accepts(&v)),
        Slot::Missing => skips_missing(expected, mode),
        Slot::Active(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::interp::env::child_env;
    use crate::interp::error::ErrorKind;

    #[test]
    fn test_zero_length_name_is_an_error_in_every_mode() {
        let mut interp = Interpreter::new();
        let global = interp.global_env();
        for mode in [ReadMode::Normal, ReadMode::Silent, ReadMode::Copying] {
            let err = interp
                .resolve("", &global, ExpectedKind::Any, mode, None)
                .unwrap_err();
            assert_eq!(err.kind, ErrorKind::ZeroLengthIdentifier);
        }
    }

    #[test]
    fn test_silent_not_found() {
        let mut interp = Interpreter::new();
        let global = interp.global_env();
        let found = interp
            .resolve("nope", &global, ExpectedKind::Any, ReadMode::Silent, None)
            .unwrap();
        assert!(found.is_none());
        let err = interp
            .resolve("nope", &global, ExpectedKind::Function, ReadMode::Normal, None)
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnknownFunction);
    }

    #[test]
    fn test_function_lookup_skips_non_functions() {
        let mut interp = Interpreter::new();
        interp.eval_source("c <- 1").unwrap();
        let global = interp.global_env();
        let found = interp.lookup_function("c", &global, None).unwrap();
        assert!(matches!(found, Value::Builtin(_)));
        assert_eq!(interp.lookup_value("c", &global, None).unwrap(), Value::num(1.0));
    }

    #[test]
    fn test_forced_type_check_skips_promised_non_function() {
        let mut interp = Interpreter::new();
        let value = interp
            .eval_source("h <- function(length) length(c(1, 2, 3)); h(2 + 3)")
            .unwrap();
        assert_eq!(value, Value::int(3));
    }

    #[test]
    fn test_copying_mode_returns_fresh_vector() {
        let mut interp = Interpreter::new();
        interp.eval_source("x <- c(1, 2)").unwrap();
        let global = interp.global_env();
        let shared = interp.lookup_value("x", &global, None).unwrap();
        let copy = interp
            .resolve("x", &global, ExpectedKind::Any, ReadMode::Copying, None)
            .unwrap()
            .unwrap();
        let (Value::Vector(a), Value::Vector(b)) = (&shared, &copy) else {
            panic!("expected vectors");
        };
        assert!(!Rc::ptr_eq(a, b));
        assert_eq!(shared, copy);
    }

    #[test]
    fn test_super_lookup_starts_at_parent() {
        let mut interp = Interpreter::new();
        interp.eval_source("x <- 1").unwrap();
        let inner = child_env(&interp.global_env());
        inner.borrow_mut().define("x", Value::num(2.0).into()).unwrap();
        let outer = interp
            .resolve("x", &inner, ExpectedKind::Any, ReadMode::SuperLookup, None)
            .unwrap();
        assert_eq!(outer, Some(Value::num(1.0)));
    }

    #[test]
    fn test_missing_argument() {
        let mut interp = Interpreter::new();
        let err = interp.eval_source("f <- function(x) x; f()").unwrap_err();
        assert_eq!(err.to_string(), "Error: argument \"x\" is missing, with no default");
    }

    #[test]
    fn test_dots_elements() {
        let mut interp = Interpreter::new();
        interp.eval_source("f <- function(...) ..2").unwrap();
        assert_eq!(interp.eval_source("f(1, 2)").unwrap(), Value::num(2.0));
        let err = interp.eval_source("f(1)").unwrap_err();
        assert!(err.to_string().contains("does not contain 2 elements"));
        let err = interp.eval_source("g <- function() ..1; g()").unwrap_err();
        assert!(err.to_string().contains("no ... to look in"));
    }

    #[test]
    fn test_cached_site_tracks_shape_changes() {
        let mut interp = Interpreter::new();
        interp.eval_source("x <- 1").unwrap();
        let inner = child_env(&interp.global_env());
        let site = SiteId::fresh();
        let read = |interp: &mut Interpreter| {
            interp
                .resolve("x", &inner, ExpectedKind::Any, ReadMode::Normal, Some(site))
                .unwrap()
                .unwrap()
        };

        assert_eq!(read(&mut interp), Value::num(1.0));
        let hits = interp.lookup_cache.hits();
        assert_eq!(read(&mut interp), Value::num(1.0));
        assert_eq!(interp.lookup_cache.hits(), hits + 1);

        // Shadowing changes the inner shape, so the recipe must not be reused
        inner.borrow_mut().define("x", Value::num(2.0).into()).unwrap();
        assert_eq!(read(&mut interp), Value::num(2.0));
        assert_eq!(interp.lookup_cache.invalidations(site), 1);
    }

    #[test]
    fn test_site_becomes_polymorphic_after_repeated_invalidation() {
        let mut config = Config::default();
        config.lookup.max_invalidations = 3;
        let mut interp = Interpreter::with_config(config);
        interp.eval_source("x <- 1").unwrap();
        let inner = child_env(&interp.global_env());
        let site = SiteId::fresh();
        for i in 0..6 {
            let value = interp
                .resolve("x", &inner, ExpectedKind::Any, ReadMode::Normal, Some(site))
                .unwrap();
            assert_eq!(value, Some(Value::num(1.0)));
            inner
                .borrow_mut()
                .define(&format!("pad{i}"), Value::Null.into())
                .unwrap();
        }
        assert!(interp.lookup_cache.is_polymorphic(site));
        assert_eq!(interp.lookup_cache.invalidations(site), 3);
    }

    #[test]
    fn test_site_table_is_bounded() {
        let mut config = Config::default();
        config.lookup.max_sites = 16;
        let mut interp = Interpreter::with_config(config);
        for i in 0..200 {
            let value = interp.eval_source(&format!("x{i} <- {i}; x{i}")).unwrap();
            assert_eq!(value, Value::num(f64::from(i)));
        }
        assert!(interp.lookup_cache.len() <= 16);

        // Fresh sites keep working after older ones were dropped
        let site = SiteId::fresh();
        let global = interp.global_env();
        for _ in 0..2 {
            interp
                .resolve("x199", &global, ExpectedKind::Any, ReadMode::Normal, Some(site))
                .unwrap();
        }
        assert_eq!(interp.lookup_cache.invalidations(site), 0);
        assert!(interp.lookup_cache.hits() > 0);
    }

    #[test]
    fn test_cache_off_gives_same_results() {
        let source = "f <- function(n) { if (n == 0) 0 else n + f(n - 1) }; f(10)";
        let mut cached = Interpreter::new();
        let mut config = Config::default();
        config.lookup.cache = false;
        let mut uncached = Interpreter::with_config(config);
        assert_eq!(
            cached.eval_source(source).unwrap(),
            uncached.eval_source(source).unwrap()
        );
        assert!(cached.lookup_cache.hits() > 0);
        assert_eq!(uncached.lookup_cache.hits(), 0);
    }
}
