use std::cell::Cell as StdCell;
use std::rc::{Rc, Weak};

use super::{Batch, Cell, ConfigError, NodeId, Observer, Reactive, schedule};

struct DerivedInner<T> {
    cell: Cell<T>,
    compute: Box<dyn Fn() -> T>,
    level: usize,
    active: StdCell<bool>,
    recomputes: StdCell<usize>,
}

impl<T: 'static> DerivedInner<T> {
    /// An input changed: queue one recomputation for this propagation.
    fn invalidate(self: &Rc<Self>) {
        // an input changed while this value was being computed or published
        if self.active.get() {
            panic!("{}", ConfigError::CyclicDependency);
        }
        let weak = Rc::downgrade(self);
        schedule(
            self.cell.id(),
            self.level,
            Rc::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.recompute();
                }
            }),
        );
    }

    fn recompute(&self) {
        if self.active.replace(true) {
            panic!("{}", ConfigError::CyclicDependency);
        }
        let value = (self.compute)();
        self.recomputes.set(self.recomputes.get() + 1);
        self.cell.set(value);
        self.active.set(false);
    }
}

/// Value computed from upstream reactive objects.
///
/// The value is computed eagerly on construction and recomputed whenever one
/// of the inputs notifies. Recomputations are queued by level, so a value
/// with several changed inputs recomputes once per propagation and equals
/// `compute()` of the current upstream values once the propagation is over. The compute closure
/// captures the input handles it reads; `inputs` only determines what the
/// value subscribes to.
///
/// Dependencies must form a DAG. Re-entering a recomputation that is still
/// running panics with [`ConfigError::CyclicDependency`].
pub struct Derived<T> {
    inner: Rc<DerivedInner<T>>,
}

pub struct WeakDerived<T> {
    inner: Weak<DerivedInner<T>>,
}

impl<T> Clone for Derived<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> Clone for WeakDerived<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<T> WeakDerived<T> {
    pub fn upgrade(&self) -> Option<Derived<T>> {
        self.inner.upgrade().map(|inner| Derived { inner })
    }
}

impl<T: PartialEq + 'static> Derived<T> {
    /// Derived value that only republishes when the result changes.
    pub fn new(inputs: &[&dyn Reactive], compute: impl Fn() -> T + 'static) -> Self {
        let initial = compute();
        Self::wire(inputs, Cell::new(initial), Box::new(compute))
    }
}

impl<T: 'static> Derived<T> {
    /// Derived value for large payloads; every recomputation republishes.
    pub fn object(inputs: &[&dyn Reactive], compute: impl Fn() -> T + 'static) -> Self {
        let initial = compute();
        Self::wire(inputs, Cell::object(initial), Box::new(compute))
    }

    fn wire(inputs: &[&dyn Reactive], cell: Cell<T>, compute: Box<dyn Fn() -> T>) -> Self {
        let level = inputs.iter().map(|input| input.level()).max().map_or(1, |l| l + 1);
        let inner = Rc::new(DerivedInner {
            cell,
            compute,
            level,
            active: StdCell::new(false),
            recomputes: StdCell::new(0),
        });
        for input in inputs {
            let weak = Rc::downgrade(&inner);
            input.subscribe(Rc::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.invalidate();
                }
            }));
        }
        Self { inner }
    }

    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.inner.cell.get()
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.inner.cell.with(f)
    }

    pub fn on_change(&self, callback: impl Fn(&Cell<T>) + 'static) {
        self.inner.cell.on_change(callback);
    }

    /// Number of recomputations since construction.
    pub fn recompute_count(&self) -> usize {
        self.inner.recomputes.get()
    }

    pub fn downgrade(&self) -> WeakDerived<T> {
        WeakDerived {
            inner: Rc::downgrade(&self.inner),
        }
    }
}

impl<T: 'static> Reactive for Derived<T> {
    fn id(&self) -> NodeId {
        self.inner.cell.id()
    }

    fn subscribe(&self, observer: Observer) {
        self.inner.cell.subscribe(observer);
    }

    fn level(&self) -> usize {
        self.inner.level
    }

    fn enter_batch(&self, batch: &mut Batch) {
        self.inner.cell.enter_batch(batch);
    }
}
