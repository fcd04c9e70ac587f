//! Tri-state configuration fields.

/// A configuration field that is either left unset or explicitly given.
///
/// `Setting<Option<T>>` separates three states: not specified (`Unset`),
/// explicitly nothing (`Value(None)`) and an explicit value. Only `Unset`
/// fields are filled in from a lower configuration layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Setting<T> {
    #[default]
    Unset,
    Value(T),
}

impl<T> Setting<T> {
    pub fn is_set(&self) -> bool {
        matches!(self, Setting::Value(_))
    }

    pub fn is_unset(&self) -> bool {
        !self.is_set()
    }

    /// Keep `self` if set, otherwise take `lower`.
    pub fn or(self, lower: Setting<T>) -> Setting<T> {
        match self {
            Setting::Unset => lower,
            set => set,
        }
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Setting::Unset => None,
            Setting::Value(v) => Some(v),
        }
    }
}

impl<T> Setting<Option<T>> {
    /// Collapse to a plain option, treating `Unset` as `None`.
    pub fn flatten(self) -> Option<T> {
        self.into_option().flatten()
    }
}

impl<T> From<T> for Setting<T> {
    fn from(value: T) -> Self {
        Setting::Value(value)
    }
}
