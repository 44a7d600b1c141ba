use std::cmp::Ordering;
use std::fmt::{Debug, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::rc::Rc;

use ahash::{AHashMap, RandomState};
use serde::{Serialize, Serializer};

/// This type represents a reference counted pointer to an identifier of the road network. It can be
/// used in hash maps/sets in combination with NoHashHasher, to achieve fast look ups with no
/// randomness involved.
///
/// As this type wraps Rc<UntypedId>, using clone produces a new Rc pointer to the actual id and is
/// the intended way of passing around ids.
///
/// This type uses the newtype pattern https://rust-unofficial.github.io/patterns/patterns/behavioural/newtype.html
/// to hide the internal representation and to enable implementing IsEnabled for the NoHashHasher crate.
pub struct Id<T> {
    _type_marker: PhantomData<T>,
    id: Rc<UntypedId>,
}

impl<T> Id<T> {
    fn new(untyped_id: Rc<UntypedId>) -> Self {
        Self {
            _type_marker: PhantomData,
            id: untyped_id,
        }
    }

    pub fn internal(&self) -> u64 {
        self.id.internal
    }

    pub fn external(&self) -> &str {
        &self.id.external
    }
}

#[derive(Debug)]
struct UntypedId {
    internal: u64,
    external: String,
}

impl UntypedId {
    fn new(internal: u64, external: String) -> Self {
        Self { internal, external }
    }
}

/// Mark Id as enabled for the nohash_hasher::NoHashHasher trait
impl<T> nohash_hasher::IsEnabled for Id<T> {}

impl<T> nohash_hasher::IsEnabled for &Id<T> {}

/// Implement PartialEq, Eq, PartialOrd, Ord, so that Ids can be used in hash maps and ordered
/// collections. All four methods rely on the internal id.
impl<T> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.internal().eq(&other.internal())
    }
}

impl<T> Eq for Id<T> {}

impl<T> Hash for Id<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // use write u64 directly, so that we can use NoHashHasher with ids
        state.write_u64(self.internal());
    }
}

impl<T> Ord for Id<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.internal().cmp(&other.internal())
    }
}

impl<T> PartialOrd for Id<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// This creates a new struct with a cloned Rc pointer
impl<T> Clone for Id<T> {
    fn clone(&self) -> Self {
        Self {
            _type_marker: PhantomData,
            id: self.id.clone(),
        }
    }
}

impl<T> Debug for Id<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Id({})", self.external())
    }
}

impl<T> Display for Id<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.external())
    }
}

/// Ids are written with their external representation, which is what downstream analysis tooling
/// works with.
impl<T> Serialize for Id<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.external())
    }
}

/// Store for ids of one entity type. Each store is owned by the value that issues the ids, e.g.
/// the network owns the stores for node, link, and signal ids. There is deliberately no
/// process-global registry.
#[derive(Debug)]
pub struct IdStore<T> {
    ids: Vec<Rc<UntypedId>>,
    // ahasher with fixed seed, to keep iteration and look ups predictable
    mapping: AHashMap<String, u64>,
    _type_marker: PhantomData<T>,
}

impl<T> Default for IdStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> IdStore<T> {
    pub fn new() -> Self {
        Self {
            ids: Vec::new(),
            mapping: AHashMap::with_hasher(RandomState::with_seed(42)),
            _type_marker: PhantomData,
        }
    }

    /// Creates an id for the external identifier, or hands out the already interned id if the
    /// external identifier was seen before.
    pub fn create_id(&mut self, external: &str) -> Id<T> {
        if let Some(internal) = self.mapping.get(external) {
            return Id::new(self.ids[*internal as usize].clone());
        }

        let next_internal = self.ids.len() as u64;
        let next_id = Rc::new(UntypedId::new(next_internal, String::from(external)));
        self.ids.push(next_id.clone());
        self.mapping.insert(String::from(external), next_internal);
        Id::new(next_id)
    }

    pub fn get(&self, internal: u64) -> Id<T> {
        let untyped_id = self
            .ids
            .get(internal as usize)
            .unwrap_or_else(|| panic!("No id found for internal {internal}"))
            .clone();
        Id::new(untyped_id)
    }

    /// Look ups by external identifier return an Option, so that unknown identifiers coming in
    /// over the trip-request boundary can be rejected without panicking.
    pub fn get_from_ext(&self, external: &str) -> Option<Id<T>> {
        self.mapping.get(external).map(|internal| self.get(*internal))
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::IdStore;

    #[test]
    fn create_id() {
        let mut store: IdStore<()> = IdStore::new();
        let id = store.create_id("external-id");
        assert_eq!("external-id", id.external());
        assert_eq!(0, id.internal());
    }

    #[test]
    fn create_id_duplicate() {
        let mut store: IdStore<()> = IdStore::new();
        let id = store.create_id("external-id");
        let duplicate = store.create_id("external-id");

        assert_eq!(id, duplicate);
        assert_eq!(1, store.len());
    }

    #[test]
    fn get_id() {
        let mut store: IdStore<()> = IdStore::new();
        let id_1 = store.create_id("id-1");
        let id_2 = store.create_id("id-2");

        assert_eq!(store.get(id_1.internal()), id_1);
        assert_eq!(store.get(id_2.internal()), id_2);
    }

    #[test]
    fn get_from_ext() {
        let mut store: IdStore<()> = IdStore::new();
        let id = store.create_id("id-1");

        assert_eq!(Some(id), store.get_from_ext("id-1"));
        assert_eq!(None, store.get_from_ext("no-such-id"));
    }

    #[test]
    fn id_eq_ignores_external() {
        let mut store_a: IdStore<()> = IdStore::new();
        let mut store_b: IdStore<()> = IdStore::new();
        let id = store_a.create_id("a");
        let other = store_b.create_id("b");

        // both are the first id of their store and therefore compare equal
        assert_eq!(id, other);
    }
}
