//! Type-erased crawl results.

use std::any::Any;
use std::fmt;

/// An extracted result produced by a handler.
///
/// The item pipeline does not know the concrete type; `on_item` hooks
/// recover it with [`downcast_ref`](Self::downcast_ref) and must tolerate
/// items of other types.
pub struct Item(Box<dyn Any + Send + Sync>);

impl Item {
    #[must_use]
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Box::new(value))
    }

    /// Returns `true` if the item holds a `T`.
    #[must_use]
    pub fn is<T: Any>(&self) -> bool {
        self.0.is::<T>()
    }

    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }

    pub fn downcast_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.0.downcast_mut()
    }

    /// Unwraps the item into a `T`, handing the item back on type mismatch.
    ///
    /// # Errors
    ///
    /// Returns the unchanged item if it does not hold a `T`.
    pub fn downcast<T: Any>(self) -> Result<T, Self> {
        self.0.downcast::<T>().map(|value| *value).map_err(Self)
    }
}

impl fmt::Debug for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Item(..)")
    }
}
