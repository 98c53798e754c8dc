//! Reactive state graph.
//!
//! Three kinds of reactive objects keep the derived images of the
//! application consistent with a handful of editable primitives:
//!
//!  - [`Cell`]: holds a value and notifies observers when it changes
//!  - [`Composite`]: a fixed set of named children that re-raises any
//!    child notification as its own
//!  - [`Derived`]: a value computed from upstream reactive objects that is
//!    recomputed whenever one of them notifies
//!
//! All of them implement [`Reactive`], so a [`Derived`] can subscribe to any
//! upstream kind uniformly. Notifications run synchronously and depth-first
//! on the thread that calls [`Cell::set`].
//!
//! A change propagates in two phases. Observers of the notifying object run
//! immediately, while derived values only queue their recomputation. The
//! queue is drained in order of [`Reactive::level`] once the outermost
//! notification returns, so a derived value recomputes once per
//! propagation, after all of its inputs have settled.
//!
//! A [`Batch`] obtained from [`Reactive::batch`] suppresses notifications
//! while it is alive. When it is dropped every batched object that changed
//! notifies exactly once, children before their composite, and all of them
//! share one propagation.

mod cell;
mod composite;
mod derived;

pub use cell::{Cell, WeakCell};
pub use composite::{Composite, CompositeBuilder};
pub use derived::{Derived, WeakDerived};

use std::cell::{Cell as StdCell, RefCell};
use std::collections::{BTreeMap, HashSet};
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};

use thiserror::Error;

/// Programming mistakes in the wiring of the reactive graph.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("field `{field}` of `{composite}` is already bound to a different reactive object")]
    FieldRebound { composite: String, field: String },

    #[error("`{composite}` has no field `{field}`")]
    UnknownField { composite: String, field: String },

    #[error("cyclic reactive dependency detected while recomputing a derived value")]
    CyclicDependency,

    #[error("reactive cascade exceeded {0} nested notifications")]
    CascadeTooDeep(usize),

    #[error("rejected value: {0}")]
    InvalidValue(String),
}

/// Callback registered on a reactive object.
pub type Observer = Rc<dyn Fn()>;

/// Identity of a reactive object, shared by all handles to it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

impl NodeId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicUsize = AtomicUsize::new(1);
        NodeId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Common interface of cells, composites and derived values.
pub trait Reactive {
    fn id(&self) -> NodeId;

    /// Register an observer. Observers live as long as the object.
    fn subscribe(&self, observer: Observer);

    /// Length of the longest chain of derived values below this object.
    /// Cells are level 0.
    fn level(&self) -> usize;

    /// Put this object (and for composites, all children) into `batch`.
    fn enter_batch(&self, batch: &mut Batch);

    /// Suppress notifications until the returned guard is dropped.
    fn batch(&self) -> Batch {
        let mut batch = Batch::default();
        self.enter_batch(&mut batch);
        batch
    }
}

/// Upper bound on nested notifications within one propagation.
pub const MAX_CASCADE_DEPTH: usize = 256;

thread_local! {
    static PROPAGATION: RefCell<Option<Propagation>> = const { RefCell::new(None) };
    static NOTIFY_DEPTH: StdCell<usize> = const { StdCell::new(0) };
}

/// Recomputations queued by the running propagation.
#[derive(Default)]
struct Propagation {
    queue: BTreeMap<(usize, u64), (NodeId, Observer)>,
    queued: HashSet<NodeId>,
    next: u64,
}

/// Clears the propagation even if a recomputation panics.
struct PropagationGuard;

impl Drop for PropagationGuard {
    fn drop(&mut self) {
        PROPAGATION.with(|p| p.borrow_mut().take());
    }
}

/// Run `dispatch`. The outermost call then drains the recomputations it
/// queued, lowest level first.
pub(crate) fn propagate(dispatch: impl FnOnce()) {
    let outermost = PROPAGATION.with(|p| {
        let mut p = p.borrow_mut();
        if p.is_some() {
            return false;
        }
        *p = Some(Propagation::default());
        true
    });
    if !outermost {
        dispatch();
        return;
    }

    let _guard = PropagationGuard;
    dispatch();
    while let Some(run) = next_scheduled() {
        run();
    }
}

fn next_scheduled() -> Option<Observer> {
    PROPAGATION.with(|p| {
        let mut p = p.borrow_mut();
        let p = p.as_mut()?;
        let (_, (id, run)) = p.queue.pop_first()?;
        p.queued.remove(&id);
        Some(run)
    })
}

/// Queue `run` for the node `id` unless it is already queued. Runs it right
/// away if no propagation is in progress.
pub(crate) fn schedule(id: NodeId, level: usize, run: Observer) {
    let deferred = PROPAGATION.with(|p| {
        let mut p = p.borrow_mut();
        let Some(p) = p.as_mut() else {
            return false;
        };
        if p.queued.insert(id) {
            let order = p.next;
            p.next += 1;
            p.queue.insert((level, order), (id, Rc::clone(&run)));
        }
        true
    });
    if !deferred {
        run();
    }
}

struct NotifyDepth;

impl NotifyDepth {
    fn enter() -> Self {
        let depth = NOTIFY_DEPTH.with(|d| {
            let depth = d.get() + 1;
            d.set(depth);
            depth
        });
        let guard = NotifyDepth;
        if depth > MAX_CASCADE_DEPTH {
            panic!("{}", ConfigError::CascadeTooDeep(MAX_CASCADE_DEPTH));
        }
        guard
    }
}

impl Drop for NotifyDepth {
    fn drop(&mut self) {
        NOTIFY_DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
    }
}

/// Observer list with batch bookkeeping.
#[derive(Default)]
pub(crate) struct Notifier {
    observers: RefCell<Vec<Observer>>,
    depth: StdCell<usize>,
    pending: StdCell<bool>,
}

impl Notifier {
    pub(crate) fn subscribe(&self, observer: Observer) {
        self.observers.borrow_mut().push(observer);
    }

    pub(crate) fn notify(&self) {
        if self.depth.get() > 0 {
            self.pending.set(true);
            return;
        }
        propagate(|| self.dispatch());
    }

    fn dispatch(&self) {
        let _depth = NotifyDepth::enter();
        // observers may subscribe further observers while running
        let observers = self.observers.borrow().clone();
        for observer in observers {
            observer();
        }
    }

    fn open(&self) {
        self.depth.set(self.depth.get() + 1);
    }

    fn close(&self) {
        let depth = self.depth.get().saturating_sub(1);
        self.depth.set(depth);
        if depth == 0 && self.pending.replace(false) {
            self.dispatch();
        }
    }
}

/// Scoped batch guard, see [`Reactive::batch`].
#[must_use = "notifications are released when the batch is dropped"]
#[derive(Default)]
pub struct Batch {
    notifiers: Vec<Rc<Notifier>>,
}

impl Batch {
    pub(crate) fn push(&mut self, notifier: Rc<Notifier>) {
        notifier.open();
        self.notifiers.push(notifier);
    }

    /// Release the batch explicitly.
    pub fn close(self) {}
}

impl Drop for Batch {
    fn drop(&mut self) {
        if self.notifiers.is_empty() {
            return;
        }
        let notifiers = std::mem::take(&mut self.notifiers);
        // reverse order: children were pushed after their composite and
        // re-raise into it while it is still held
        propagate(|| {
            for notifier in notifiers.iter().rev() {
                notifier.close();
            }
        });
    }
}

/// Implement [`Reactive`] for a typed composite by delegating to one of its
/// fields.
macro_rules! impl_reactive_via {
    ($ty:ty, $field:ident) => {
        impl $crate::reactive::Reactive for $ty {
            fn id(&self) -> $crate::reactive::NodeId {
                self.$field.id()
            }

            fn subscribe(&self, observer: $crate::reactive::Observer) {
                self.$field.subscribe(observer)
            }

            fn level(&self) -> usize {
                self.$field.level()
            }

            fn enter_batch(&self, batch: &mut $crate::reactive::Batch) {
                self.$field.enter_batch(batch)
            }
        }
    };
}

pub(crate) use impl_reactive_via;
