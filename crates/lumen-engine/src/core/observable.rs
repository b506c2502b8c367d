use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Identifies an observer within one [`Observable`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Per-notification state handed to every observer.
#[derive(Debug, Default)]
pub struct EventState {
    /// Set by an observer to stop the remaining observers from running.
    pub skip_next_observers: bool,
    remove_current: bool,
}

impl EventState {
    /// Unregisters the observer currently running once the notification ends.
    pub fn remove_current(&mut self) {
        self.remove_current = true;
    }
}

type Callback<T> = Box<dyn FnMut(&T, &mut EventState)>;

struct Observer<T> {
    id: ObserverId,
    callback: Callback<T>,
    once: bool,
    removed: bool,
}

/// Cloneable handle that removes observers from inside a callback.
#[derive(Clone, Default)]
pub struct ObserverRemover {
    queue: Rc<RefCell<Vec<ObserverId>>>,
}

impl ObserverRemover {
    pub fn remove(&self, id: ObserverId) {
        self.queue.borrow_mut().push(id);
    }
}

impl fmt::Debug for ObserverRemover {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverRemover").field("queued", &self.queue.borrow().len()).finish()
    }
}

/// Ordered list of callbacks notified with a `&T`.
///
/// Removal is two-phase: an observer removed while a notification is running
/// is only marked, skipped for the rest of the loop, and compacted away once
/// the loop ends.
pub struct Observable<T> {
    observers: Vec<Observer<T>>,
    next_id: u64,
    remover: ObserverRemover,
}

impl<T> Default for Observable<T> {
    fn default() -> Self {
        Self { observers: Vec::new(), next_id: 0, remover: ObserverRemover::default() }
    }
}

impl<T> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable").field("observers", &self.observers.len()).finish()
    }
}

impl<T> Observable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, callback: impl FnMut(&T, &mut EventState) + 'static) -> ObserverId {
        self.push(Box::new(callback), false)
    }

    /// Observer that unregisters itself after its first call.
    pub fn add_once(&mut self, callback: impl FnMut(&T, &mut EventState) + 'static) -> ObserverId {
        self.push(Box::new(callback), true)
    }

    fn push(&mut self, callback: Callback<T>, once: bool) -> ObserverId {
        let id = ObserverId(self.next_id);
        self.next_id += 1;
        self.observers.push(Observer { id, callback, once, removed: false });
        id
    }

    /// Returns `false` when `id` was not registered.
    pub fn remove(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|o| o.id != id);
        self.observers.len() != before
    }

    /// Handle for removing observers while a notification is running.
    pub fn remover(&self) -> ObserverRemover {
        self.remover.clone()
    }

    /// Runs every live observer in registration order.
    ///
    /// Returns `false` when an observer stopped propagation.
    pub fn notify(&mut self, value: &T) -> bool {
        let mut state = EventState::default();
        let mut completed = true;

        for i in 0..self.observers.len() {
            self.mark_queued();
            let observer = &mut self.observers[i];
            if observer.removed {
                continue;
            }
            state.remove_current = false;
            (observer.callback)(value, &mut state);
            if observer.once || state.remove_current {
                observer.removed = true;
            }
            if state.skip_next_observers {
                completed = false;
                break;
            }
        }

        self.mark_queued();
        self.observers.retain(|o| !o.removed);
        completed
    }

    fn mark_queued(&mut self) {
        let queued: Vec<ObserverId> = self.remover.queue.borrow_mut().drain(..).collect();
        for id in queued {
            if let Some(o) = self.observers.iter_mut().find(|o| o.id == id) {
                o.removed = true;
            }
        }
    }

    pub fn clear(&mut self) {
        self.observers.clear();
    }

    pub fn has_observers(&self) -> bool {
        self.observers.iter().any(|o| !o.removed)
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter() -> (Rc<RefCell<Vec<&'static str>>>, impl Fn(&'static str) -> Box<dyn FnMut(&u32, &mut EventState)>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let l = log.clone();
        (log, move |tag| {
            let l = l.clone();
            Box::new(move |_: &u32, _: &mut EventState| l.borrow_mut().push(tag))
        })
    }

    #[test]
    fn notifies_in_order_and_once_observers_leave() {
        let (log, make) = counter();
        let mut o = Observable::new();
        o.add(make("a"));
        o.add_once(make("b"));
        o.notify(&1);
        o.notify(&2);
        assert_eq!(*log.borrow(), vec!["a", "b", "a"]);
        assert_eq!(o.len(), 1);
    }

    #[test]
    fn removal_during_notify_is_deferred() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut o: Observable<u32> = Observable::new();
        let remover = o.remover();

        let l = log.clone();
        let second = Rc::new(RefCell::new(None));
        let s = second.clone();
        o.add(move |_, _| {
            l.borrow_mut().push("first");
            if let Some(id) = *s.borrow() {
                remover.remove(id);
            }
        });
        let l = log.clone();
        let id = o.add(move |_, _| l.borrow_mut().push("second"));
        *second.borrow_mut() = Some(id);

        // still registered while the loop runs, but skipped
        assert!(o.notify(&0));
        assert_eq!(*log.borrow(), vec!["first"]);
        assert_eq!(o.len(), 1);
    }

    #[test]
    fn self_removal_and_skip() {
        let mut o: Observable<u32> = Observable::new();
        let hits = Rc::new(RefCell::new(0));
        let h = hits.clone();
        o.add(|_, state| {
            state.skip_next_observers = true;
            state.remove_current();
        });
        o.add(move |_, _| *h.borrow_mut() += 1);

        assert!(!o.notify(&0));
        assert_eq!(*hits.borrow(), 0);
        assert!(o.notify(&0));
        assert_eq!(*hits.borrow(), 1);
    }

    #[test]
    fn remove_outside_notify() {
        let mut o: Observable<u32> = Observable::new();
        let id = o.add(|_, _| {});
        assert!(o.has_observers());
        assert!(o.remove(id));
        assert!(!o.remove(id));
        assert!(!o.has_observers());
    }
}
