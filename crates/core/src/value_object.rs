//! Value object trait: equality by value, not identity.
//!
//! Value objects are domain objects that have **no identity** - they are defined entirely
//! by their attribute values. Two value objects with the same values are considered equal.

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value**. An `Isbn` is a value
/// object: two ISBNs with the same digits are the same ISBN, whereas two `BookRecord`s
/// are distinguished by the identifier the store assigned them.
///
/// To "modify" a value object, create a new one. Value objects are therefore safe to
/// share across worker tasks without synchronization.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
