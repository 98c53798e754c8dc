use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use super::{Batch, ConfigError, NodeId, Notifier, Observer, Reactive};

type Validator<T> = Box<dyn Fn(&T) -> Result<(), String>>;

struct CellInner<T> {
    id: NodeId,
    value: RefCell<T>,
    notifier: Rc<Notifier>,
    equal: Option<fn(&T, &T) -> bool>,
    validate: Option<Validator<T>>,
}

/// Primitive reactive value.
///
/// Handles are cheap to clone and all clones refer to the same value.
pub struct Cell<T> {
    inner: Rc<CellInner<T>>,
}

/// Non-owning handle to a [`Cell`].
pub struct WeakCell<T> {
    inner: Weak<CellInner<T>>,
}

impl<T> Clone for Cell<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> Clone for WeakCell<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<T> WeakCell<T> {
    pub fn upgrade(&self) -> Option<Cell<T>> {
        self.inner.upgrade().map(|inner| Cell { inner })
    }
}

impl<T: PartialEq + 'static> Cell<T> {
    /// Cell that only notifies when the new value differs from the stored one.
    pub fn new(value: T) -> Self {
        Self::build(value, Some(<T as PartialEq>::eq), None)
    }
}

impl<T: 'static> Cell<T> {
    /// Cell for large payloads (volumes, images). Every assignment counts as
    /// a change.
    pub fn object(value: T) -> Self {
        Self::build(value, None, None)
    }

    /// Object cell whose every assignment has to pass `validate`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if the initial value is rejected.
    pub fn validated(
        value: T,
        validate: impl Fn(&T) -> Result<(), String> + 'static,
    ) -> Result<Self, ConfigError> {
        validate(&value).map_err(ConfigError::InvalidValue)?;
        Ok(Self::build(value, None, Some(Box::new(validate))))
    }

    fn build(value: T, equal: Option<fn(&T, &T) -> bool>, validate: Option<Validator<T>>) -> Self {
        Self {
            inner: Rc::new(CellInner {
                id: NodeId::next(),
                value: RefCell::new(value),
                notifier: Rc::new(Notifier::default()),
                equal,
                validate,
            }),
        }
    }

    /// Current value (cloned).
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.inner.value.borrow().clone()
    }

    /// Borrow the current value.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.borrow())
    }

    /// Store `value` and notify observers if it counts as a change.
    ///
    /// # Panics
    ///
    /// Panics if the cell has a validator that rejects `value`.
    pub fn set(&self, value: T) {
        if let Some(validate) = &self.inner.validate {
            if let Err(reason) = validate(&value) {
                panic!("{}", ConfigError::InvalidValue(reason));
            }
        }

        let changed = match self.inner.equal {
            Some(equal) => !equal(&self.inner.value.borrow(), &value),
            None => true,
        };
        if !changed {
            return;
        }

        *self.inner.value.borrow_mut() = value;
        self.inner.notifier.notify();
    }

    /// Register `callback`, invoked with this cell after every change.
    pub fn on_change(&self, callback: impl Fn(&Cell<T>) + 'static) {
        let weak = Rc::downgrade(&self.inner);
        self.inner.notifier.subscribe(Rc::new(move || {
            if let Some(inner) = weak.upgrade() {
                callback(&Cell { inner });
            }
        }));
    }

    pub fn downgrade(&self) -> WeakCell<T> {
        WeakCell {
            inner: Rc::downgrade(&self.inner),
        }
    }
}

impl<T: 'static> Reactive for Cell<T> {
    fn id(&self) -> NodeId {
        self.inner.id
    }

    fn subscribe(&self, observer: Observer) {
        self.inner.notifier.subscribe(observer);
    }

    fn level(&self) -> usize {
        0
    }

    fn enter_batch(&self, batch: &mut Batch) {
        batch.push(Rc::clone(&self.inner.notifier));
    }
}

impl<T: fmt::Debug> fmt::Debug for Cell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cell")
            .field("id", &self.inner.id)
            .field("value", &self.inner.value.borrow())
            .finish()
    }
}
