use std::cell::RefCell;
use std::rc::Rc;

use crate::value::Value;

// ── Dynamic environments ──────────────────────────────────────────

/// Frame kind: ordinary binder frame, or a `with` frame whose single slot
/// holds (a thunk of) the attribute set supplying names dynamically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvKind {
    Plain,
    With,
}

#[derive(Debug)]
struct EnvData {
    up: Option<Env>,
    kind: EnvKind,
    slots: RefCell<Vec<Value>>,
}

/// A runtime activation record, chained by lexical parent pointer. The
/// slot count is fixed at allocation; the i-th slot corresponds to the
/// i-th name introduced by the binder at that lexical level.
#[derive(Clone, Debug)]
pub struct Env(Rc<EnvData>);

impl Env {
    /// Allocate a frame with `size` slots, initially null. Recursive
    /// binders fill the slots before any of them can be read.
    pub fn new(up: Option<Env>, size: usize) -> Env {
        Env(Rc::new(EnvData {
            up,
            kind: EnvKind::Plain,
            slots: RefCell::new(vec![Value::Null; size]),
        }))
    }

    /// Allocate a `with` frame whose slot 0 is the namespace value.
    pub fn with_frame(up: Env, namespace: Value) -> Env {
        Env(Rc::new(EnvData {
            up: Some(up),
            kind: EnvKind::With,
            slots: RefCell::new(vec![namespace]),
        }))
    }

    pub fn kind(&self) -> EnvKind {
        self.0.kind
    }

    pub fn up(&self) -> Option<&Env> {
        self.0.up.as_ref()
    }

    /// Walk `level` frames up the parent chain.
    pub fn ancestor(&self, level: u32) -> &Env {
        let mut env = self;
        for _ in 0..level {
            env = env
                .up()
                .expect("variable resolved past the top of the environment chain");
        }
        env
    }

    pub fn slot(&self, displ: u32) -> Value {
        self.0.slots.borrow()[displ as usize].clone()
    }

    pub fn set_slot(&self, displ: u32, value: Value) {
        self.0.slots.borrow_mut()[displ as usize] = value;
    }

    pub fn slot_count(&self) -> usize {
        self.0.slots.borrow().len()
    }

    pub fn ptr_eq(a: &Env, b: &Env) -> bool {
        Rc::ptr_eq(&a.0, &b.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slots_fixed_at_alloc() {
        let env = Env::new(None, 3);
        assert_eq!(env.slot_count(), 3);
        env.set_slot(1, Value::Int(42));
        assert_eq!(env.slot(1).as_int(), Some(42));
        assert!(matches!(env.slot(0), Value::Null));
    }

    #[test]
    fn test_ancestor_walk() {
        let root = Env::new(None, 1);
        root.set_slot(0, Value::Int(7));
        let mid = Env::new(Some(root.clone()), 0);
        let leaf = Env::new(Some(mid), 0);
        assert_eq!(leaf.ancestor(2).slot(0).as_int(), Some(7));
        assert!(Env::ptr_eq(leaf.ancestor(0), &leaf));
    }

    #[test]
    fn test_with_frame_kind() {
        let root = Env::new(None, 0);
        let w = Env::with_frame(root.clone(), Value::Null);
        assert_eq!(w.kind(), EnvKind::With);
        assert_eq!(root.kind(), EnvKind::Plain);
        assert_eq!(w.slot_count(), 1);
    }
}
