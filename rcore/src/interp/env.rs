//! Environment for variable bindings

use super::error::{InterpResult, RuntimeError};
use super::promise::PromiseRef;
use super::shape::{self, Shape, ShapeId};
use super::value::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

/// Shared reference to an environment
pub type EnvRef = Rc<RefCell<Environment>>;

/// Contents of a binding
#[derive(Debug, Clone)]
pub enum Slot {
    Concrete(Value),
    Lazy(PromiseRef),
    /// Accessor function called on every read (and with the value on writes)
    Active(Value),
    /// Formal argument that was not supplied and has no default
    Missing,
}

impl From<Value> for Slot {
    fn from(value: Value) -> Self {
        match value {
            Value::Promise(promise) => Slot::Lazy(promise),
            Value::Missing => Slot::Missing,
            other => Slot::Concrete(other),
        }
    }
}

/// A named binding
#[derive(Debug, Clone)]
pub struct Binding {
    pub value: Slot,
    pub locked: bool,
}

/// Outcome of [`Environment::define`]
#[derive(Debug)]
pub enum Assignment {
    Stored,
    /// The binding is active; the caller must invoke this accessor with the value
    Active(Value),
}

/// Environment holding variable bindings.
///
/// Names are kept in the order they were declared; the ordered name list is
/// identified by the environment's [`Shape`].
pub struct Environment {
    name: Option<String>,
    shape: Arc<Shape>,
    names: Vec<String>,
    index: HashMap<String, usize>,
    bindings: Vec<Binding>,
    /// Enclosing environment, `None` only for the empty environment
    parent: Option<EnvRef>,
    locked: bool,
}

impl Environment {
    /// The terminal empty environment
    pub fn new_empty() -> Self {
        Environment::named("R_EmptyEnv", None)
    }

    /// Create a new environment with a parent
    pub fn with_parent(parent: EnvRef) -> Self {
        Environment {
            name: None,
            shape: shape::empty(),
            names: Vec::new(),
            index: HashMap::new(),
            bindings: Vec::new(),
            parent: Some(parent),
            locked: false,
        }
    }

    pub fn named(name: &str, parent: Option<EnvRef>) -> Self {
        Environment {
            name: Some(name.to_string()),
            shape: shape::empty(),
            names: Vec::new(),
            index: HashMap::new(),
            bindings: Vec::new(),
            parent,
            locked: false,
        }
    }

    /// Environment populated in one step. `names` must be distinct.
    pub fn from_bindings(parent: EnvRef, names: Vec<String>, slots: Vec<Slot>) -> Self {
        debug_assert_eq!(names.len(), slots.len());
        let bindings = slots
            .into_iter()
            .map(|value| Binding {
                value,
                locked: false,
            })
            .collect();
        Environment {
            name: None,
            shape: shape::from_names(names.iter().map(String::as_str)),
            index: index_names(&names),
            names,
            bindings,
            parent: Some(parent),
            locked: false,
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    /// Wrap in Rc<RefCell<>>
    pub fn into_ref(self) -> EnvRef {
        Rc::new(RefCell::new(self))
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn shape(&self) -> &Arc<Shape> {
        &self.shape
    }

    pub fn shape_id(&self) -> ShapeId {
        self.shape.id()
    }

    pub fn parent(&self) -> Option<EnvRef> {
        self.parent.clone()
    }

    pub fn set_parent(&mut self, parent: EnvRef) {
        self.parent = Some(parent);
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Declared names, in declaration order
    pub fn names(&self) -> Vec<String> {
        self.names.clone()
    }

    /// Slot index of `name`, if declared
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Local binding for `name`
    pub fn get(&self, name: &str) -> Option<&Binding> {
        self.index_of(name).map(|i| &self.bindings[i])
    }

    pub fn binding_at(&self, index: usize) -> Option<&Binding> {
        self.bindings.get(index)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Insert or overwrite `name` in this environment only
    pub fn define(&mut self, name: &str, slot: Slot) -> InterpResult<Assignment> {
        if let Some(i) = self.index_of(name) {
            let binding = &mut self.bindings[i];
            if binding.locked {
                return Err(RuntimeError::locked_binding(name));
            }
            if let Slot::Active(fun) = &binding.value {
                return Ok(Assignment::Active(fun.clone()));
            }
            binding.value = slot;
            return Ok(Assignment::Stored);
        }
        if self.locked {
            return Err(RuntimeError::locked_environment());
        }
        self.declare(name, slot);
        Ok(Assignment::Stored)
    }

    /// Remove `name`; returns whether it existed
    pub fn remove(&mut self, name: &str) -> InterpResult<bool> {
        let Some(i) = self.index_of(name) else {
            return Ok(false);
        };
        if self.locked {
            return Err(RuntimeError::invalid_argument(
                "cannot remove bindings from a locked environment",
            ));
        }
        self.names.remove(i);
        self.bindings.remove(i);
        self.index = index_names(&self.names);
        self.shape = shape::from_names(self.names.iter().map(String::as_str));
        Ok(true)
    }

    fn declare(&mut self, name: &str, slot: Slot) {
        self.shape = self.shape.with_name(name);
        self.index.insert(name.to_string(), self.names.len());
        self.names.push(name.to_string());
        self.bindings.push(Binding {
            value: slot,
            locked: false,
        });
    }

    /// Install an active binding for `name`
    pub fn make_active(&mut self, name: &str, fun: Value) -> InterpResult<()> {
        match self.index_of(name) {
            Some(i) => {
                let binding = &mut self.bindings[i];
                if !matches!(binding.value, Slot::Active(_)) {
                    return Err(RuntimeError::invalid_argument(format!(
                        "symbol already has a regular binding: '{name}'"
                    )));
                }
                if binding.locked {
                    return Err(RuntimeError::locked_binding(name));
                }
                binding.value = Slot::Active(fun);
                Ok(())
            }
            None => {
                if self.locked {
                    return Err(RuntimeError::locked_environment());
                }
                self.declare(name, Slot::Active(fun));
                Ok(())
            }
        }
    }

    fn binding_mut(&mut self, name: &str) -> InterpResult<&mut Binding> {
        match self.index_of(name) {
            Some(i) => Ok(&mut self.bindings[i]),
            None => Err(RuntimeError::invalid_argument(format!(
                "no binding for \"{name}\""
            ))),
        }
    }

    pub fn lock_binding(&mut self, name: &str) -> InterpResult<()> {
        self.binding_mut(name)?.locked = true;
        Ok(())
    }

    pub fn unlock_binding(&mut self, name: &str) -> InterpResult<()> {
        self.binding_mut(name)?.locked = false;
        Ok(())
    }

    pub fn is_binding_locked(&mut self, name: &str) -> InterpResult<bool> {
        Ok(self.binding_mut(name)?.locked)
    }

    pub fn is_binding_active(&mut self, name: &str) -> InterpResult<bool> {
        Ok(matches!(self.binding_mut(name)?.value, Slot::Active(_)))
    }

    /// Refuse new bindings; with `bindings`, also lock every existing binding
    pub fn lock(&mut self, bindings: bool) {
        self.locked = true;
        if bindings {
            for binding in &mut self.bindings {
                binding.locked = true;
            }
        }
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }
}

impl fmt::Debug for Environment {
    // Bindings can refer back to this environment, so only names are shown
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("name", &self.name)
            .field("names", &self.names)
            .field("locked", &self.locked)
            .finish()
    }
}

fn index_names(names: &[String]) -> HashMap<String, usize> {
    names.iter().enumerate().map(|(i, name)| (name.clone(), i)).collect()
}

/// Create a child environment from a parent reference
pub fn child_env(parent: &EnvRef) -> EnvRef {
    Environment::with_parent(Rc::clone(parent)).into_ref()
}

/// Find `name` in `env` or its ancestors: the environment holding it and the binding
pub fn lookup(env: &EnvRef, name: &str) -> Option<(EnvRef, Binding)> {
    let mut current = Some(Rc::clone(env));
    while let Some(env) = current {
        let next = {
            let borrowed = env.borrow();
            if let Some(binding) = borrowed.get(name) {
                let binding = binding.clone();
                drop(borrowed);
                return Some((env, binding));
            }
            borrowed.parent()
        };
        current = next;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interp::error::ErrorKind;

    fn concrete(slot: &Slot) -> Value {
        match slot {
            Slot::Concrete(v) => v.clone(),
            other => panic!("expected a concrete slot, got {other:?}"),
        }
    }

    #[test]
    fn test_define_and_get() {
        let mut env = Environment::with_parent(Environment::new_empty().into_ref());
        env.define("x", Slot::Concrete(Value::int(42))).unwrap();
        assert_eq!(concrete(&env.get("x").unwrap().value), Value::int(42));
        assert!(env.get("y").is_none());
    }

    #[test]
    fn test_scope_chain() {
        let parent = child_env(&Environment::new_empty().into_ref());
        parent.borrow_mut().define("x", Value::int(1).into()).unwrap();

        let child = child_env(&parent);
        child.borrow_mut().define("y", Value::int(2).into()).unwrap();

        let (owner, binding) = lookup(&child, "x").unwrap();
        assert!(Rc::ptr_eq(&owner, &parent));
        assert_eq!(concrete(&binding.value), Value::int(1));
        assert!(lookup(&parent, "y").is_none());
    }

    #[test]
    fn test_shadowing() {
        let parent = child_env(&Environment::new_empty().into_ref());
        parent.borrow_mut().define("x", Value::int(1).into()).unwrap();
        let child = child_env(&parent);
        child.borrow_mut().define("x", Value::int(2).into()).unwrap();

        assert_eq!(concrete(&lookup(&child, "x").unwrap().1.value), Value::int(2));
        assert_eq!(concrete(&lookup(&parent, "x").unwrap().1.value), Value::int(1));
    }

    #[test]
    fn test_overwrite_keeps_shape_and_new_name_changes_it() {
        let mut env = Environment::with_parent(Environment::new_empty().into_ref());
        env.define("a", Value::int(1).into()).unwrap();
        let before = env.shape_id();
        env.define("a", Value::int(2).into()).unwrap();
        assert_eq!(env.shape_id(), before);
        env.define("b", Value::int(3).into()).unwrap();
        assert_ne!(env.shape_id(), before);
        env.remove("b").unwrap();
        assert_eq!(env.shape_id(), before);
    }

    #[test]
    fn test_many_bindings_share_and_release_shapes() {
        let empty = Environment::new_empty().into_ref();
        let mut first = Environment::with_parent(Rc::clone(&empty));
        let mut second = Environment::with_parent(empty);
        for i in 0..4000 {
            let name = format!("many_v{i}");
            first.define(&name, Value::int(i).into()).unwrap();
            second.define(&name, Value::int(-i).into()).unwrap();
        }
        assert_eq!(first.shape_id(), second.shape_id());
        assert_eq!(first.shape().len(), 4000);
        assert_eq!(first.index_of("many_v3999"), Some(3999));

        first.remove("many_v0").unwrap();
        assert_eq!(first.index_of("many_v3999"), Some(3998));
        assert_eq!(first.names().len(), 3999);

        let shape = Arc::downgrade(first.shape());
        drop(first);
        assert!(shape.upgrade().is_none());
        assert_eq!(concrete(&second.get("many_v7").unwrap().value), Value::int(-7));
    }

    #[test]
    fn test_locked_binding() {
        let mut env = Environment::with_parent(Environment::new_empty().into_ref());
        env.define("x", Value::int(1).into()).unwrap();
        env.lock_binding("x").unwrap();
        let err = env.define("x", Value::int(2).into()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::LockedBindingWrite);
        assert_eq!(concrete(&env.get("x").unwrap().value), Value::int(1));
        env.unlock_binding("x").unwrap();
        assert!(env.define("x", Value::int(2).into()).is_ok());
    }

    #[test]
    fn test_locked_environment_refuses_new_names() {
        let mut env = Environment::with_parent(Environment::new_empty().into_ref());
        env.define("x", Value::int(1).into()).unwrap();
        env.lock(false);
        assert!(env.define("x", Value::int(2).into()).is_ok());
        let err = env.define("y", Value::int(2).into()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::LockedEnvironment);
    }

    #[test]
    fn test_writes_visible_through_shared_reference() {
        let env = child_env(&Environment::new_empty().into_ref());
        let alias = Rc::clone(&env);
        alias.borrow_mut().define("z", Value::int(7).into()).unwrap();
        assert!(env.borrow().contains("z"));
    }

    #[test]
    fn test_value_conversion_into_slots() {
        assert!(matches!(Slot::from(Value::Missing), Slot::Missing));
        assert!(matches!(Slot::from(Value::Null), Slot::Concrete(Value::Null)));
    }
}
