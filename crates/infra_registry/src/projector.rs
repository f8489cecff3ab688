//! Entity to response projection
//!
//! A projector maps an entity to its display shape. Projection is pure: it
//! never touches the store, so associations that were not eager-loaded
//! project as `None` or an empty list.

use std::sync::Arc;

/// Function mapping an entity to its response shape
pub type Projector<E, R> = Arc<dyn Fn(&E) -> R + Send + Sync>;

/// Projects an optional entity; `None` in, `None` out
pub fn project_one<E, R>(entity: Option<&E>, projector: impl Fn(&E) -> R) -> Option<R> {
    entity.map(projector)
}

/// Projects a collection, skipping absent entries
///
/// Accepts anything that yields `&E` or `Option<&E>`, which covers plain
/// slices, slices of `Option<E>` and boxed associations.
///
/// # Example
///
/// ```rust
/// use infra_registry::project_many;
///
/// let names = vec![Some("a".to_string()), None, Some("b".to_string())];
/// let upper: Vec<String> = project_many(names.iter().map(Option::as_ref), |s: &String| s.to_uppercase());
/// assert_eq!(upper, vec!["A", "B"]);
/// ```
pub fn project_many<'a, E, R, I, T>(entities: I, projector: impl Fn(&E) -> R) -> Vec<R>
where
    E: 'a,
    I: IntoIterator<Item = T>,
    T: Into<Option<&'a E>>,
{
    entities
        .into_iter()
        .filter_map(|item| item.into().map(&projector))
        .collect()
}
