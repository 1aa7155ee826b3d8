use serde::{Deserialize, Serialize};

/// One step of a [`Location`]: a child index, or an attribute key at the
/// leaf (the path to a text model inside a block).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathComponent {
    Index(usize),
    Key(String),
}

/// An immutable path from the document root down to a node or one of its
/// attributes. Equality and hashing follow the component sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Location(Vec<PathComponent>);

impl Location {
    pub fn root() -> Self {
        Location(Vec::new())
    }

    pub fn from_indices(indices: impl IntoIterator<Item = usize>) -> Self {
        Location(indices.into_iter().map(PathComponent::Index).collect())
    }

    pub fn child(&self, index: usize) -> Self {
        let mut components = self.0.clone();
        components.push(PathComponent::Index(index));
        Location(components)
    }

    pub fn attribute(&self, key: &str) -> Self {
        let mut components = self.0.clone();
        components.push(PathComponent::Key(key.to_string()));
        Location(components)
    }

    pub fn components(&self) -> &[PathComponent] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last_index(&self) -> Option<usize> {
        match self.0.last() {
            Some(PathComponent::Index(i)) => Some(*i),
            _ => None,
        }
    }

    pub fn parent(&self) -> Option<Location> {
        if self.0.is_empty() {
            None
        } else {
            Some(Location(self.0[..self.0.len() - 1].to_vec()))
        }
    }

    /// Shift `loc` to account for `delta` siblings inserted (positive) or
    /// removed (negative) at `base`.
    ///
    /// The shift applies at depth `base.len() - 1`, iff both paths agree
    /// above that depth and base's index there is at or before `loc`'s.
    /// Locations shorter than the base, the root location, and bases whose
    /// last component is an attribute key are returned unchanged; an edit
    /// under an attribute never renumbers siblings.
    pub fn transform(base: &Location, loc: &Location, delta: isize) -> Location {
        if base.0.is_empty() || loc.0.is_empty() || loc.0.len() < base.0.len() {
            return loc.clone();
        }
        let depth = base.0.len() - 1;
        if base.0[..depth] != loc.0[..depth] {
            return loc.clone();
        }
        let (PathComponent::Index(base_index), PathComponent::Index(loc_index)) =
            (&base.0[depth], &loc.0[depth])
        else {
            return loc.clone();
        };
        if base_index > loc_index {
            return loc.clone();
        }
        let shifted = (*loc_index as isize + delta).max(0) as usize;
        let mut out = loc.clone();
        out.0[depth] = PathComponent::Index(shifted);
        out
    }
}
