//! Minimal reactive state helper.
//!
//! `use_state` hands out a (state, setter) pair over one shared cell so that
//! composables do not reach into the cell directly.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Read side of a shared cell.
pub struct State<T>(Rc<RefCell<T>>);

/// Write side of a shared cell.
pub struct Setter<T>(Rc<RefCell<T>>);

/// Create a (state, setter) pair initialized to `init`.
pub fn use_state<T>(init: T) -> (State<T>, Setter<T>) {
    let cell = Rc::new(RefCell::new(init));
    (State(cell.clone()), Setter(cell))
}

impl<T> State<T> {
    /// Borrow the current value.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.0.borrow())
    }
}

impl<T: Clone> State<T> {
    /// Clone out the current value.
    pub fn get(&self) -> T {
        self.0.borrow().clone()
    }
}

impl<T> Setter<T> {
    pub fn set(&self, value: T) {
        *self.0.borrow_mut() = value;
    }
}

impl<T> Clone for State<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Clone for Setter<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T: fmt::Debug> fmt::Debug for State<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("State").field(&self.0.borrow()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setter_updates_state() {
        let (state, set_state) = use_state(1);
        assert_eq!(state.get(), 1);
        set_state.set(5);
        assert_eq!(state.get(), 5);
    }

    #[test]
    fn test_clones_share_cell() {
        let (state, set_state) = use_state(Vec::<u32>::new());
        let other = state.clone();
        set_state.clone().set(vec![1, 2]);
        assert_eq!(other.with(|v| v.len()), 2);
    }
}
