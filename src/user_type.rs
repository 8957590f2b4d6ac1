//! User-defined composite types: named, ordered groups of primitive tags
//! that a column can reference instead of spelling out its tags inline.

use std::collections::HashMap;

use crate::crc32::Crc32;
use crate::error::{Error, Result};
use crate::primitive::{tags_to_string, PrimitiveTag};

pub const MAX_NAME_LEN: usize = 31;
pub const MAX_TAGS: usize = 15;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserType {
    pub name: String,
    pub tags: Vec<PrimitiveTag>,
    pub crc: Crc32,
}

impl UserType {
    fn new(name: &str, tags: Vec<PrimitiveTag>) -> Self {
        UserType { name: name.to_string(), tags, crc: Crc32::of_str(name) }
    }

    pub fn tag_string(&self) -> String {
        tags_to_string(&self.tags)
    }
}

/// The set of user types registered against one open stream. Registration is
/// idempotent: redefining an existing name with the same tag list is a no-op,
/// redefining it with a different one is a hard error -- the name is the
/// type's on-disk identity and can't mean two different things at once.
#[derive(Debug, Default)]
pub struct UserTypeRegistry {
    types: Vec<UserType>,
    by_name: HashMap<String, usize>,
    by_crc: HashMap<Crc32, usize>,
}

impl UserTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, tags: Vec<PrimitiveTag>) -> Result<&UserType> {
        if name.len() > MAX_NAME_LEN {
            return Err(Error::failure(format!(
                "user type name '{}' exceeds {} characters",
                name, MAX_NAME_LEN
            )));
        }
        if tags.is_empty() || tags.len() > MAX_TAGS {
            return Err(Error::failure(format!(
                "user type '{}' must declare between 1 and {} fields",
                name, MAX_TAGS
            )));
        }

        if let Some(&idx) = self.by_name.get(name) {
            if self.types[idx].tags != tags {
                return Err(Error::failure(format!(
                    "user type '{}' redefined with different fields",
                    name
                )));
            }
            return Ok(&self.types[idx]);
        }

        let user_type = UserType::new(name, tags);
        let idx = self.types.len();
        self.by_crc.insert(user_type.crc, idx);
        self.by_name.insert(user_type.name.clone(), idx);
        self.types.push(user_type);
        Ok(&self.types[idx])
    }

    pub fn by_name(&self, name: &str) -> Option<&UserType> {
        self.by_name.get(name).map(|&idx| &self.types[idx])
    }

    pub fn by_crc(&self, crc: Crc32) -> Option<&UserType> {
        self.by_crc.get(&crc).map(|&idx| &self.types[idx])
    }

    /// The registry-slot index a name was registered under -- the compact
    /// reference the binary codec writes for a user-typed column instead of
    /// repeating the type's name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn by_index(&self, index: usize) -> Option<&UserType> {
        self.types.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &UserType> {
        self.types.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitive::PrimitiveTag::*;

    #[test]
    fn register_and_lookup() {
        let mut reg = UserTypeRegistry::new();
        reg.register("V3", vec![Float32, Float32, Float32]).unwrap();
        let found = reg.by_name("V3").unwrap();
        assert_eq!(found.tag_string(), "fff");
        assert_eq!(reg.by_crc(found.crc).unwrap().name, "V3");
    }

    #[test]
    fn index_of_matches_registration_order() {
        let mut reg = UserTypeRegistry::new();
        reg.register("V3", vec![Float32, Float32, Float32]).unwrap();
        reg.register("PAIR", vec![Int32, Int32]).unwrap();
        assert_eq!(reg.index_of("V3"), Some(0));
        assert_eq!(reg.index_of("PAIR"), Some(1));
        assert_eq!(reg.by_index(1).unwrap().name, "PAIR");
        assert_eq!(reg.index_of("nope"), None);
    }

    #[test]
    fn idempotent_redefinition_is_ok() {
        let mut reg = UserTypeRegistry::new();
        reg.register("V3", vec![Float32, Float32, Float32]).unwrap();
        assert!(reg.register("V3", vec![Float32, Float32, Float32]).is_ok());
    }

    #[test]
    fn conflicting_redefinition_fails() {
        let mut reg = UserTypeRegistry::new();
        reg.register("V3", vec![Float32, Float32, Float32]).unwrap();
        assert!(reg.register("V3", vec![Float64, Float64]).is_err());
    }

    #[test]
    fn name_too_long_rejected() {
        let mut reg = UserTypeRegistry::new();
        let long_name = "x".repeat(MAX_NAME_LEN + 1);
        assert!(reg.register(&long_name, vec![Int32]).is_err());
    }
}
