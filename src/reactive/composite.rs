use std::rc::Rc;

use super::{Batch, ConfigError, NodeId, Notifier, Observer, Reactive};

struct CompositeInner {
    id: NodeId,
    name: String,
    fields: Vec<(String, Box<dyn Reactive>)>,
    level: usize,
    notifier: Rc<Notifier>,
}

/// Fixed, named aggregate of reactive objects.
///
/// Any child notification is re-raised as a notification of the composite.
/// Fields are fixed at construction: a name can never be rebound to a
/// different object afterwards, so derived values that captured a child stay
/// wired to the object the composite reports.
#[derive(Clone)]
pub struct Composite {
    inner: Rc<CompositeInner>,
}

pub struct CompositeBuilder {
    name: String,
    fields: Vec<(String, Box<dyn Reactive>)>,
}

impl CompositeBuilder {
    /// Declare a field.
    ///
    /// Declaring the same name twice with the same object is a no-op.
    ///
    /// # Errors
    ///
    /// [`ConfigError::FieldRebound`] if `name` is already declared with a
    /// different object.
    pub fn field<R>(mut self, name: &str, child: &R) -> Result<Self, ConfigError>
    where
        R: Reactive + Clone + 'static,
    {
        let existing = self
            .fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, existing)| existing.id());
        match existing {
            Some(id) if id == child.id() => Ok(self),
            Some(_) => Err(ConfigError::FieldRebound {
                composite: self.name,
                field: name.to_owned(),
            }),
            None => {
                self.fields.push((name.to_owned(), Box::new(child.clone())));
                Ok(self)
            }
        }
    }

    pub fn build(self) -> Composite {
        let notifier = Rc::new(Notifier::default());
        for (_, child) in &self.fields {
            let weak = Rc::downgrade(&notifier);
            child.subscribe(Rc::new(move || {
                if let Some(notifier) = weak.upgrade() {
                    notifier.notify();
                }
            }));
        }

        let level = self.fields.iter().map(|(_, child)| child.level()).max().unwrap_or(0);
        Composite {
            inner: Rc::new(CompositeInner {
                id: NodeId::next(),
                name: self.name,
                level,
                fields: self.fields,
                notifier,
            }),
        }
    }
}

impl Composite {
    pub fn builder(name: &str) -> CompositeBuilder {
        CompositeBuilder {
            name: name.to_owned(),
            fields: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.inner.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn child(&self, name: &str) -> Option<&dyn Reactive> {
        self.inner
            .fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, child)| child.as_ref())
    }

    /// Check an attempted assignment of `child` to field `name`.
    ///
    /// Succeeds only if `name` already holds `child`.
    ///
    /// # Errors
    ///
    /// [`ConfigError::FieldRebound`] for a different object,
    /// [`ConfigError::UnknownField`] for an undeclared name.
    pub fn rebind(&self, name: &str, child: &dyn Reactive) -> Result<(), ConfigError> {
        match self.child(name) {
            None => Err(ConfigError::UnknownField {
                composite: self.inner.name.clone(),
                field: name.to_owned(),
            }),
            Some(existing) if existing.id() == child.id() => Ok(()),
            Some(_) => Err(ConfigError::FieldRebound {
                composite: self.inner.name.clone(),
                field: name.to_owned(),
            }),
        }
    }
}

impl Reactive for Composite {
    fn id(&self) -> NodeId {
        self.inner.id
    }

    fn subscribe(&self, observer: Observer) {
        self.inner.notifier.subscribe(observer);
    }

    fn level(&self) -> usize {
        self.inner.level
    }

    fn enter_batch(&self, batch: &mut Batch) {
        batch.push(Rc::clone(&self.inner.notifier));
        for (_, child) in &self.inner.fields {
            child.enter_batch(batch);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Cell;
    use std::cell::Cell as StdCell;

    fn count(reactive: &dyn Reactive) -> Rc<StdCell<usize>> {
        let calls = Rc::new(StdCell::new(0));
        let c = calls.clone();
        reactive.subscribe(Rc::new(move || c.set(c.get() + 1)));
        calls
    }

    #[test]
    fn child_change_propagates() {
        let x = Cell::new(0.0_f64);
        let y = Cell::new(0.0_f64);
        let point = Composite::builder("point")
            .field("x", &x)
            .and_then(|b| b.field("y", &y))
            .unwrap()
            .build();
        let calls = count(&point);

        x.set(1.0);
        y.set(2.0);
        y.set(2.0);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn nested_batch_notifies_once() {
        let x = Cell::new(0_i32);
        let y = Cell::new(0_i32);
        let inner = Composite::builder("inner")
            .field("x", &x)
            .and_then(|b| b.field("y", &y))
            .unwrap()
            .build();
        let outer = Composite::builder("outer").field("inner", &inner).unwrap().build();
        let outer_calls = count(&outer);
        let x_calls = count(&x);

        {
            let _batch = outer.batch();
            x.set(1);
            x.set(2);
            y.set(3);
        }
        assert_eq!(outer_calls.get(), 1);
        assert_eq!(x_calls.get(), 1);
    }

    #[test]
    fn duplicate_field_with_other_object_is_rejected() {
        let a = Cell::new(0_u8);
        let b = Cell::new(0_u8);
        let err = Composite::builder("pair")
            .field("a", &a)
            .and_then(|builder| builder.field("a", &b))
            .err()
            .unwrap();
        assert_eq!(
            err,
            ConfigError::FieldRebound {
                composite: "pair".into(),
                field: "a".into()
            }
        );
    }

    #[test]
    fn rebind_requires_identical_object() {
        let a = Cell::new(0_u8);
        let other = Cell::new(0_u8);
        let composite = Composite::builder("c").field("a", &a).unwrap().build();

        assert!(composite.rebind("a", &a).is_ok());
        assert!(composite.rebind("a", &a.clone()).is_ok());
        assert!(matches!(
            composite.rebind("a", &other),
            Err(ConfigError::FieldRebound { .. })
        ));
        assert!(matches!(
            composite.rebind("b", &a),
            Err(ConfigError::UnknownField { .. })
        ));
        assert_eq!(composite.field_names().collect::<Vec<_>>(), vec!["a"]);
    }
}
