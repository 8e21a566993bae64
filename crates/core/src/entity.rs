//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Entities whose identity is assigned by a store (e.g. an identity column)
/// report `None` until they have been persisted.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier, if one has been assigned.
    fn id(&self) -> Option<&Self::Id>;

    /// Whether the entity has been persisted (has an identifier).
    fn is_persisted(&self) -> bool {
        self.id().is_some()
    }
}
