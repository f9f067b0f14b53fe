//! Environment shapes
//!
//! A shape identifies the ordered list of names declared in an environment.
//! Shapes form a transition tree rooted at the empty shape: declaring a name
//! moves an environment to the child of its current shape for that name, so
//! environments that declare the same names in the same order share one
//! descriptor, and a shape id is a cheap token for validating cached lookups.
//!
//! A node keeps only its parent and its last name. Children are held weakly
//! and unlink themselves when the last environment using them goes away.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, Weak};

/// Shape identifier; never reused within a process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShapeId(u64);

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

static ROOT: LazyLock<Arc<Shape>> = LazyLock::new(|| Shape::node(None, None, 0));

/// A node of the transition tree
pub struct Shape {
    id: ShapeId,
    len: usize,
    parent: Option<Arc<Shape>>,
    /// Name declared by the transition into this node
    name: Option<String>,
    children: Mutex<HashMap<String, Weak<Shape>>>,
}

impl Shape {
    fn node(parent: Option<Arc<Shape>>, name: Option<String>, len: usize) -> Arc<Shape> {
        let id = ShapeId(NEXT_ID.fetch_add(1, Ordering::Relaxed));
        tracing::trace!(shape = id.0, len, "new environment shape");
        Arc::new(Shape {
            id,
            len,
            parent,
            name,
            children: Mutex::new(HashMap::new()),
        })
    }

    pub fn id(&self) -> ShapeId {
        self.id
    }

    /// Number of names declared
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Names of the transition path, in declaration order
    pub fn names(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(self.len);
        let mut current = Some(self);
        while let Some(shape) = current {
            if let Some(name) = &shape.name {
                names.push(name.clone());
            }
            current = shape.parent.as_deref();
        }
        names.reverse();
        names
    }

    /// Shape with `name` appended
    pub fn with_name(self: &Arc<Self>, name: &str) -> Arc<Shape> {
        let mut children = lock(&self.children);
        if let Some(child) = children.get(name).and_then(Weak::upgrade) {
            return child;
        }
        let child = Shape::node(Some(Arc::clone(self)), Some(name.to_string()), self.len + 1);
        children.insert(name.to_string(), Arc::downgrade(&child));
        child
    }

    /// Live nodes below this one, itself excluded
    pub fn descendants(&self) -> usize {
        let mut pending = live_children(self);
        let mut count = 0;
        while let Some(shape) = pending.pop() {
            count += 1;
            pending.extend(live_children(&shape));
        }
        count
    }

    /// Unlink from the parent's children; hands back the parent
    fn detach(&mut self) -> Option<Arc<Shape>> {
        let parent = self.parent.take()?;
        if let Some(name) = &self.name {
            let mut children = lock(&parent.children);
            if children.get(name).is_some_and(|w| w.strong_count() == 0) {
                children.remove(name);
            }
        }
        Some(parent)
    }
}

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shape")
            .field("id", &self.id.0)
            .field("len", &self.len)
            .field("name", &self.name)
            .finish()
    }
}

impl Drop for Shape {
    // Ancestors that die with this node are released in a loop, not recursively
    fn drop(&mut self) {
        let mut next = self.detach();
        while let Some(parent) = next {
            next = match Arc::try_unwrap(parent) {
                Ok(mut shape) => shape.detach(),
                Err(_) => None,
            };
        }
    }
}

/// A poisoned children map is still consistent: entries are inserted and removed whole.
fn lock(children: &Mutex<HashMap<String, Weak<Shape>>>) -> MutexGuard<'_, HashMap<String, Weak<Shape>>> {
    children.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn live_children(shape: &Shape) -> Vec<Arc<Shape>> {
    lock(&shape.children).values().filter_map(Weak::upgrade).collect()
}

/// The shape of an environment without bindings
pub fn empty() -> Arc<Shape> {
    Arc::clone(&ROOT)
}

/// Shape reached by declaring `names` in order
pub fn from_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Arc<Shape> {
    names.into_iter().fold(empty(), |shape, name| shape.with_name(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_names_share_shape() {
        let a = from_names(["x", "y"]);
        let b = empty().with_name("x").with_name("y");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.id(), b.id());
        assert_eq!(a.names(), vec!["x".to_string(), "y".to_string()]);
        assert_eq!(a.len(), 2);
    }

    #[test]
    fn test_order_matters() {
        let a = from_names(["p", "q"]);
        let b = from_names(["q", "p"]);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_transition_tree_grows_linearly() {
        let first = empty().with_name("linear_growth_root");
        let mut shape = Arc::clone(&first);
        for i in 0..3000 {
            shape = shape.with_name(&format!("v{i}"));
        }
        assert_eq!(shape.len(), 3001);
        assert_eq!(first.descendants(), 3000);

        // A second environment declaring the same names reuses every node
        let mut again = Arc::clone(&first);
        for i in 0..3000 {
            again = again.with_name(&format!("v{i}"));
        }
        assert!(Arc::ptr_eq(&shape, &again));
        assert_eq!(first.descendants(), 3000);
    }

    #[test]
    fn test_unused_shapes_are_released() {
        let first = empty().with_name("released_root");
        let weak_first = Arc::downgrade(&first);
        let mut shape = first;
        for i in 0..5000 {
            shape = shape.with_name(&format!("n{i}"));
        }
        let leaf = Arc::downgrade(&shape);
        drop(shape);
        assert!(leaf.upgrade().is_none());
        assert!(weak_first.upgrade().is_none());
        assert!(lock(&ROOT.children).get("released_root").is_none());
    }

    #[test]
    fn test_ids_are_not_reused() {
        let old = empty().with_name("recreated").id();
        let new = empty().with_name("recreated").id();
        assert_ne!(old, new);
    }

    #[test]
    fn test_concurrent_transitions_agree() {
        let keep = from_names(["shared_one"]);
        let handles: Vec<_> = (0..8)
            .map(|_| std::thread::spawn(|| from_names(["shared_one", "shared_two"])))
            .collect();
        let shapes: Vec<Arc<Shape>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(shapes.iter().all(|s| Arc::ptr_eq(s, &shapes[0])));
        assert_eq!(keep.descendants(), 1);
    }
}
