use itertools::Itertools;
use std::collections::BTreeSet;
use std::fmt;

pub type RelationSet = BTreeSet<Relation>;

/// A base table (or subquery) reference as it appears in a plan, identified by its name and the
/// alias it was given in the query.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct Relation {
    name: String,
    alias: String,
}

impl Relation {
    pub fn new(name: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: alias.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }
}

/// Builds the key used to correlate the same set of relations across differently shaped plans.
/// Relation sets are unordered, so the canonical strings are sorted before joining.
pub fn relation_key<'a>(relations: impl IntoIterator<Item = &'a Relation>) -> String {
    relations
        .into_iter()
        .map(|rel| rel.to_string())
        .sorted()
        .join(" ")
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.alias == self.name {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{} {}", self.name, self.alias)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_canonical_string() {
        assert_eq!(Relation::new("orders", "orders").to_string(), "orders");
        assert_eq!(Relation::new("orders", "o").to_string(), "orders o");
    }

    #[test]
    fn test_relation_key_is_sorted() {
        let a = Relation::new("supplier", "s");
        let b = Relation::new("lineitem", "lineitem");
        let c = Relation::new("nation", "n1");
        assert_eq!(relation_key([&a, &b, &c]), "lineitem nation n1 supplier s");
        assert_eq!(relation_key([&c, &a, &b]), relation_key([&b, &c, &a]));
    }

    #[test]
    fn test_value_semantics() {
        let set = RelationSet::from([
            Relation::new("part", "p"),
            Relation::new("part", "p"),
            Relation::new("part", "part"),
        ]);
        assert_eq!(set.len(), 2);
    }
}
