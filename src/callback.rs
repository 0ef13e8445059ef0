//! Callback registry shared by every allocator strategy: lets callers
//! observe `free_all` and `destroy` without polling.

/// The two lifecycle events a callback can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackEvent {
    /// Fired by `free_all` after every outstanding allocation is dropped.
    FreeEvent,
    /// Fired by `destroy` (and by dropping a live handle). `destroy` fires
    /// only this event, never `FreeEvent`.
    DestroyEvent,
}

/// Opaque identifier returned by [`CallbackRegistry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CallbackId(u64);

type CallbackFn = Box<dyn FnMut(CallbackEvent) -> bool>;

struct Registration {
    id: CallbackId,
    callback: CallbackFn,
}

/// A mapping from registration id to `{function, one-shot semantics}`,
/// invoked in reverse registration order on each event.
#[derive(Default)]
pub struct CallbackRegistry {
    next_id: u64,
    registrations: Vec<Registration>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self { next_id: 0, registrations: Vec::new() }
    }

    /// Registers `callback` and returns its id. The callback runs on every
    /// `fire` call; once it returns `false` it is removed immediately
    /// after that call, so it never runs again.
    pub fn register<F>(&mut self, callback: F) -> CallbackId
    where
        F: FnMut(CallbackEvent) -> bool + 'static,
    {
        let id = CallbackId(self.next_id);
        self.next_id += 1;
        self.registrations.push(Registration { id, callback: Box::new(callback) });
        id
    }

    /// Removes a callback by id. No-op if the id is unknown (already
    /// pruned or never registered).
    pub fn unregister(&mut self, id: CallbackId) {
        self.registrations.retain(|r| r.id != id);
    }

    /// Invokes every registered callback with `event`, highest id first,
    /// pruning callbacks that return `false`.
    pub fn fire(&mut self, event: CallbackEvent) {
        let mut i = self.registrations.len();
        while i > 0 {
            i -= 1;
            let keep = (self.registrations[i].callback)(event);
            if !keep {
                self.registrations.remove(i);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    #[test]
    fn fires_in_reverse_registration_order_and_prunes() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let mut registry = CallbackRegistry::new();

        let o = order.clone();
        registry.register(move |_| {
            o.borrow_mut().push('A');
            true
        });
        let o = order.clone();
        registry.register(move |_| {
            o.borrow_mut().push('B');
            false
        });
        let o = order.clone();
        registry.register(move |_| {
            o.borrow_mut().push('C');
            true
        });

        registry.fire(CallbackEvent::FreeEvent);
        assert_eq!(*order.borrow(), vec!['C', 'B', 'A']);

        order.borrow_mut().clear();
        registry.fire(CallbackEvent::FreeEvent);
        assert_eq!(*order.borrow(), vec!['C', 'A']);
    }

    #[test]
    fn unregister_removes_by_id() {
        let mut registry = CallbackRegistry::new();
        let called = Rc::new(RefCell::new(0));
        let c = called.clone();
        let id = registry.register(move |_| {
            *c.borrow_mut() += 1;
            true
        });
        registry.unregister(id);
        registry.fire(CallbackEvent::DestroyEvent);
        assert_eq!(*called.borrow(), 0);
    }
}
