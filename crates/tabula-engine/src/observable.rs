//! Single-producer multicast streams with deterministic delivery.
//!
//! The editor is single-threaded and cooperative, so a stream is just an
//! ordered observer list. Emission walks a snapshot of the list: observers
//! subscribed during an emission only see subsequent events, and an observer
//! unsubscribed mid-emission is not called late.

use std::cell::RefCell;
use std::rc::Rc;

type Callback<T> = Rc<RefCell<dyn FnMut(&T)>>;

struct Inner<T> {
    next_id: u64,
    observers: Vec<(u64, Callback<T>)>,
}

/// An ordered multicast stream of `T` events.
pub struct Subject<T> {
    inner: Rc<RefCell<Inner<T>>>,
}

impl<T> Clone for Subject<T> {
    fn clone(&self) -> Self {
        Subject {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: 'static> Default for Subject<T> {
    fn default() -> Self {
        Subject::new()
    }
}

impl<T: 'static> Subject<T> {
    pub fn new() -> Self {
        Subject {
            inner: Rc::new(RefCell::new(Inner {
                next_id: 0,
                observers: Vec::new(),
            })),
        }
    }

    /// Register an observer. Dropping the returned handle unsubscribes.
    pub fn subscribe(&self, observer: impl FnMut(&T) + 'static) -> Subscription {
        let id = {
            let mut inner = self.inner.borrow_mut();
            let id = inner.next_id;
            inner.next_id += 1;
            let callback: Callback<T> = Rc::new(RefCell::new(observer));
            inner.observers.push((id, callback));
            id
        };
        let weak = Rc::downgrade(&self.inner);
        Subscription {
            cancel: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.borrow_mut().observers.retain(|(oid, _)| *oid != id);
                }
            })),
        }
    }

    pub fn observer_count(&self) -> usize {
        self.inner.borrow().observers.len()
    }

    /// Deliver `value` to every observer subscribed at the time of the call,
    /// in subscription order.
    pub fn emit(&self, value: &T) {
        let snapshot: Vec<(u64, Callback<T>)> = self.inner.borrow().observers.clone();
        for (id, observer) in snapshot {
            let still_subscribed = self
                .inner
                .borrow()
                .observers
                .iter()
                .any(|(oid, _)| *oid == id);
            if still_subscribed {
                (observer.borrow_mut())(value);
            }
        }
    }

    /// Drop every observer, severing subscriber-held cycles on dispose.
    pub fn clear(&self) {
        self.inner.borrow_mut().observers.clear();
    }
}

/// Handle to an active subscription; unsubscribes on drop.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }

    /// Keep the subscription alive for the lifetime of the subject instead
    /// of the handle.
    pub fn detach(mut self) {
        self.cancel.take();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_emit_in_subscription_order() {
        let subject: Subject<u32> = Subject::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let seen_a = Rc::clone(&seen);
        let _a = subject.subscribe(move |v| seen_a.borrow_mut().push(("a", *v)));
        let seen_b = Rc::clone(&seen);
        let _b = subject.subscribe(move |v| seen_b.borrow_mut().push(("b", *v)));

        subject.emit(&1);
        assert_eq!(&*seen.borrow(), &[("a", 1), ("b", 1)]);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let subject: Subject<u32> = Subject::new();
        let seen = Rc::new(RefCell::new(0));

        let seen_inner = Rc::clone(&seen);
        let sub = subject.subscribe(move |_| *seen_inner.borrow_mut() += 1);
        subject.emit(&1);
        drop(sub);
        subject.emit(&2);

        assert_eq!(*seen.borrow(), 1);
    }

    #[test]
    fn test_subscriber_added_during_emission_sees_later_events_only() {
        let subject: Subject<u32> = Subject::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let late_sub: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));

        let subject_inner = subject.clone();
        let seen_inner = Rc::clone(&seen);
        let late_inner = Rc::clone(&late_sub);
        let _outer = subject.subscribe(move |v| {
            if *v == 1 && late_inner.borrow().is_none() {
                let seen_late = Rc::clone(&seen_inner);
                let sub = subject_inner.subscribe(move |v| seen_late.borrow_mut().push(*v));
                *late_inner.borrow_mut() = Some(sub);
            }
        });

        subject.emit(&1);
        subject.emit(&2);

        // The observer added while 1 was being delivered never saw 1.
        assert_eq!(&*seen.borrow(), &[2]);
    }

    #[test]
    fn test_detach_outlives_handle() {
        let subject: Subject<u32> = Subject::new();
        let seen = Rc::new(RefCell::new(0));

        let seen_inner = Rc::clone(&seen);
        subject
            .subscribe(move |_| *seen_inner.borrow_mut() += 1)
            .detach();
        subject.emit(&1);

        assert_eq!(*seen.borrow(), 1);
        assert_eq!(subject.observer_count(), 1);
    }
}
