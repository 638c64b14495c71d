//! Type descriptors.
//!
//! Records of one Rust type share an index set and a scan prefix, both named
//! after the type. The name is supplied explicitly or derived once from
//! [`std::any::type_name`]; nothing is reflected at runtime.

use std::{any, fmt};

/// Stable name of a record type.
///
/// # Examples
///
/// ```
/// use typedkv_provider::TypeDescriptor;
///
/// struct Invoice;
///
/// assert_eq!(TypeDescriptor::of::<Invoice>().name(), "Invoice");
/// assert_eq!(TypeDescriptor::of::<Vec<Invoice>>().name(), "Vec");
/// assert_eq!(TypeDescriptor::named("billing.Invoice").name(), "billing.Invoice");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeDescriptor {
    name: String,
}

impl TypeDescriptor {
    /// Describes a type under an explicit name.
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Describes `T` by its simple name: the last path segment of its type
    /// name with generic arguments removed.
    #[must_use]
    pub fn of<T: ?Sized>() -> Self {
        Self::named(simple_name(any::type_name::<T>()))
    }

    /// The type's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

fn simple_name(full: &str) -> &str {
    let without_generics = full.split('<').next().unwrap_or(full);
    without_generics.rsplit("::").next().unwrap_or(without_generics)
}
