//! Uniform storage for simulation state.
//!
//! Every piece of state that influences the simulation lives in a [`Field`].
//! Records holding fields implement [`Stored`] so that a [`StateVisitor`] can
//! walk all of them without per-type serialization code. Two visitors ship with
//! the kernel:
//!
//! - [`StateHasher`] folds everything into one 64-bit FNV-1a digest, used for
//!   lockstep desync detection.
//! - [`StateSnapshot`] keeps one digest per field path so that two snapshots can
//!   be diffed to find exactly which fields diverged.
//!
//! Fields perform no validation. Owners enforce their invariants before writing.

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// A named cell holding exactly one value.
///
/// Writing replaces the value and raises the field's change flag, which the
/// owner can consume with [`Field::take_changed`].
#[derive(Debug, Clone)]
pub struct Field<T> {
    name: &'static str,
    value: T,
    changed: bool,
}

impl<T: Default> Field<T> {
    /// Create a field holding the default value of `T`.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self::with_value(name, T::default())
    }
}

impl<T> Field<T> {
    /// Create a field with an initial value.
    #[must_use]
    pub fn with_value(name: &'static str, value: T) -> Self {
        Self {
            name,
            value,
            changed: false,
        }
    }

    /// Name of the field.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Borrow the current value.
    #[must_use]
    pub fn read(&self) -> &T {
        &self.value
    }

    /// Replace the value, returning the previous one.
    pub fn write(&mut self, value: T) -> T {
        self.changed = true;
        std::mem::replace(&mut self.value, value)
    }

    /// Modify the value in place. Counts as a write.
    pub fn modify<R>(&mut self, f: impl FnOnce(&mut T) -> R) -> R {
        self.changed = true;
        f(&mut self.value)
    }

    /// Return whether the field was written since the last call, clearing the flag.
    pub fn take_changed(&mut self) -> bool {
        std::mem::take(&mut self.changed)
    }
}

impl<T: Copy> Field<T> {
    /// Copy the current value out.
    #[must_use]
    pub fn get(&self) -> T {
        self.value
    }
}

impl<T: StateValue> Field<T> {
    /// Present this field to a visitor.
    pub fn accept(&self, visitor: &mut dyn StateVisitor) {
        visitor.visit(self.name, &self.value);
    }
}

/// A value that can contribute to a state digest.
pub trait StateValue {
    /// Feed the value into a hasher.
    fn digest_into(&self, hasher: &mut StateHasher);
}

impl<T: Hash> StateValue for T {
    fn digest_into(&self, hasher: &mut StateHasher) {
        self.hash(hasher);
    }
}

/// Walks the fields of [`Stored`] records.
pub trait StateVisitor {
    /// Enter a nested record.
    fn enter(&mut self, scope: &str);

    /// Leave the innermost nested record.
    fn leave(&mut self);

    /// Visit one field of the current record.
    fn visit(&mut self, name: &str, value: &dyn StateValue);
}

/// A record whose state is held in fields.
pub trait Stored {
    /// Present every field, and every nested record, to the visitor.
    fn visit_state(&self, visitor: &mut dyn StateVisitor);

    /// Visit this record inside a named scope.
    fn visit_scoped(&self, scope: &str, visitor: &mut dyn StateVisitor) {
        visitor.enter(scope);
        self.visit_state(visitor);
        visitor.leave();
    }
}

/// 64-bit FNV-1a hasher.
///
/// Integers are always fed in little-endian order and `usize` is widened to
/// 64 bits, so digests agree across platforms.
#[derive(Debug, Clone, Copy)]
pub struct StateHasher {
    state: u64,
}

impl StateHasher {
    /// Create a hasher at the FNV offset basis.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: FNV_OFFSET_BASIS,
        }
    }
}

impl Default for StateHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher for StateHasher {
    fn finish(&self) -> u64 {
        self.state
    }

    fn write(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.state ^= u64::from(byte);
            self.state = self.state.wrapping_mul(FNV_PRIME);
        }
    }

    fn write_u16(&mut self, i: u16) {
        self.write(&i.to_le_bytes());
    }

    fn write_u32(&mut self, i: u32) {
        self.write(&i.to_le_bytes());
    }

    fn write_u64(&mut self, i: u64) {
        self.write(&i.to_le_bytes());
    }

    fn write_u128(&mut self, i: u128) {
        self.write(&i.to_le_bytes());
    }

    fn write_usize(&mut self, i: usize) {
        self.write_u64(i as u64);
    }

    fn write_i16(&mut self, i: i16) {
        self.write(&i.to_le_bytes());
    }

    fn write_i32(&mut self, i: i32) {
        self.write(&i.to_le_bytes());
    }

    fn write_i64(&mut self, i: i64) {
        self.write(&i.to_le_bytes());
    }

    fn write_i128(&mut self, i: i128) {
        self.write(&i.to_le_bytes());
    }

    fn write_isize(&mut self, i: isize) {
        self.write_i64(i as i64);
    }
}

impl StateVisitor for StateHasher {
    fn enter(&mut self, scope: &str) {
        self.write(scope.as_bytes());
        self.write_u8(b'{');
    }

    fn leave(&mut self) {
        self.write_u8(b'}');
    }

    fn visit(&mut self, name: &str, value: &dyn StateValue) {
        self.write(name.as_bytes());
        value.digest_into(self);
    }
}

/// Per-field digests of a stored record tree, keyed by slash-separated path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateSnapshot {
    fields: BTreeMap<String, u64>,
    scope: Vec<String>,
}

impl StateSnapshot {
    /// Capture a snapshot of a record.
    #[must_use]
    pub fn capture(record: &dyn Stored) -> Self {
        let mut snapshot = Self::default();
        record.visit_state(&mut snapshot);
        snapshot
    }

    /// Number of fields captured.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether no fields were captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Digest of one field, if present.
    #[must_use]
    pub fn field(&self, path: &str) -> Option<u64> {
        self.fields.get(path).copied()
    }

    /// Paths whose digest differs between the snapshots, or that exist in only one.
    #[must_use]
    pub fn diff(&self, other: &Self) -> Vec<String> {
        let mut changed: Vec<String> = self
            .fields
            .iter()
            .filter(|(path, digest)| other.fields.get(*path) != Some(digest))
            .map(|(path, _)| path.clone())
            .collect();
        changed.extend(
            other
                .fields
                .keys()
                .filter(|path| !self.fields.contains_key(*path))
                .cloned(),
        );
        changed.sort();
        changed
    }

    /// Fold every field into one digest.
    #[must_use]
    pub fn digest(&self) -> u64 {
        let mut hasher = StateHasher::new();
        for (path, digest) in &self.fields {
            hasher.write(path.as_bytes());
            hasher.write_u64(*digest);
        }
        hasher.finish()
    }

    fn path(&self, name: &str) -> String {
        let mut path = self.scope.join("/");
        if !path.is_empty() {
            path.push('/');
        }
        path.push_str(name);
        path
    }
}

impl StateVisitor for StateSnapshot {
    fn enter(&mut self, scope: &str) {
        self.scope.push(scope.to_owned());
    }

    fn leave(&mut self) {
        self.scope.pop();
    }

    fn visit(&mut self, name: &str, value: &dyn StateValue) {
        let mut hasher = StateHasher::new();
        value.digest_into(&mut hasher);
        let path = self.path(name);
        self.fields.insert(path, hasher.finish());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Counter {
        count: Field<u32>,
        label: Field<String>,
    }

    impl Stored for Counter {
        fn visit_state(&self, visitor: &mut dyn StateVisitor) {
            self.count.accept(visitor);
            self.label.accept(visitor);
        }
    }

    struct Pair {
        left: Counter,
        right: Counter,
    }

    impl Stored for Pair {
        fn visit_state(&self, visitor: &mut dyn StateVisitor) {
            self.left.visit_scoped("left", visitor);
            self.right.visit_scoped("right", visitor);
        }
    }

    fn counter(count: u32) -> Counter {
        Counter {
            count: Field::with_value("count", count),
            label: Field::new("label"),
        }
    }

    #[test]
    fn test_field_defaults_and_reads() {
        let field: Field<u32> = Field::new("hp");
        assert_eq!(field.get(), 0);
        assert_eq!(field.name(), "hp");
    }

    #[test]
    fn test_write_returns_previous_and_flags_change() {
        let mut field = Field::with_value("minerals", 50u32);
        assert_eq!(field.write(80), 50);
        assert_eq!(*field.read(), 80);
        assert!(field.take_changed());
        assert!(!field.take_changed());
    }

    #[test]
    fn test_modify_counts_as_write() {
        let mut field = Field::with_value("queue", vec![1, 2]);
        field.modify(|queue| queue.push(3));
        assert_eq!(field.read(), &vec![1, 2, 3]);
        assert!(field.take_changed());
    }

    #[test]
    fn test_fnv_known_vector() {
        // FNV-1a 64 of "a".
        let mut hasher = StateHasher::new();
        hasher.write(b"a");
        assert_eq!(hasher.finish(), 0xaf63_dc4c_8601_ec8c);
    }

    #[test]
    fn test_digest_depends_on_values() {
        let mut a = StateHasher::new();
        counter(1).visit_state(&mut a);
        let mut b = StateHasher::new();
        counter(1).visit_state(&mut b);
        let mut c = StateHasher::new();
        counter(2).visit_state(&mut c);
        assert_eq!(a.finish(), b.finish());
        assert_ne!(a.finish(), c.finish());
    }

    #[test]
    fn test_snapshot_diff_names_changed_paths() {
        let mut pair = Pair {
            left: counter(1),
            right: counter(1),
        };
        let before = StateSnapshot::capture(&pair);
        assert_eq!(before.len(), 4);
        pair.right.count.write(9);
        let after = StateSnapshot::capture(&pair);

        assert_eq!(before.diff(&after), vec!["right/count".to_owned()]);
        assert_ne!(before.digest(), after.digest());
        assert!(before.diff(&before).is_empty());
    }

    #[test]
    fn test_snapshot_diff_reports_missing_paths() {
        let mut full = StateSnapshot::default();
        full.visit("a", &1u32);
        full.visit("b", &2u32);
        let mut partial = StateSnapshot::default();
        partial.visit("a", &1u32);

        assert_eq!(full.diff(&partial), vec!["b".to_owned()]);
        assert_eq!(partial.diff(&full), vec!["b".to_owned()]);
    }
}
