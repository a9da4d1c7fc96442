//! Capability sets.
//!
//! An [`Actions`] value is a bitmask over `read`, `write`, `delete` and `admin`. Building one
//! from names is order-insensitive and collapses duplicates; on the wire it is a list of names
//! in canonical order.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{caps_to_names, name_to_cap, ADMIN, ALL_ACTIONS, DELETE, READ, WRITE};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct Actions(u64);

impl Actions {
    pub const NONE: Actions = Actions(0);
    pub const READ: Actions = Actions(READ);
    pub const WRITE: Actions = Actions(WRITE);
    pub const DELETE: Actions = Actions(DELETE);
    pub const ADMIN: Actions = Actions(ADMIN);
    pub const ALL: Actions = Actions(ALL_ACTIONS);

    /// Build from a raw mask. Bits outside the known capabilities are dropped.
    #[inline]
    pub const fn from_mask(mask: u64) -> Self {
        Actions(mask & ALL_ACTIONS)
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// True if every capability in `required` is present.
    #[inline]
    pub const fn contains(&self, required: Actions) -> bool {
        (self.0 & required.0) == required.0
    }

    #[inline]
    pub const fn union(self, other: Actions) -> Actions {
        Actions(self.0 | other.0)
    }

    pub fn names(&self) -> Vec<&'static str> {
        caps_to_names(self.0)
    }

    /// Parse capability tokens. Unknown tokens are rejected; duplicates collapse.
    pub fn parse<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut mask = 0;
        for n in names {
            let n = n.as_ref();
            mask |= name_to_cap(n)
                .ok_or_else(|| Error::InvalidArgument(format!("unknown action '{}'", n)))?;
        }
        Ok(Actions::from_mask(mask))
    }
}

impl TryFrom<Vec<String>> for Actions {
    type Error = Error;

    fn try_from(names: Vec<String>) -> Result<Self> {
        Actions::parse(names)
    }
}

impl From<Actions> for Vec<String> {
    fn from(a: Actions) -> Self {
        a.names().into_iter().map(String::from).collect()
    }
}

impl fmt::Display for Actions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self.names().join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_order_insensitive_and_dedups() {
        let a = Actions::parse(["delete", "write", "write"]).unwrap();
        let b = Actions::parse(["write", "delete"]).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.names(), vec!["write", "delete"]);
    }

    #[test]
    fn parse_rejects_unknown() {
        let e = Actions::parse(["read", "execute"]).unwrap_err();
        assert!(matches!(e, Error::InvalidArgument(_)));
    }

    #[test]
    fn empty_parse_is_empty() {
        assert!(Actions::parse(Vec::<String>::new()).unwrap().is_empty());
    }

    #[test]
    fn contains_and_union() {
        let rw = Actions::READ.union(Actions::WRITE);
        assert!(rw.contains(Actions::READ));
        assert!(!rw.contains(Actions::ADMIN));
        assert!(Actions::ALL.contains(rw));
    }

    #[test]
    fn from_mask_drops_unknown_bits() {
        assert_eq!(Actions::from_mask(u64::MAX), Actions::ALL);
    }

    #[test]
    fn serde_uses_names() {
        let json = serde_json::to_string(&Actions::ALL).unwrap();
        assert_eq!(json, r#"["read","write","delete","admin"]"#);
        let back: Actions = serde_json::from_str(r#"["admin","read"]"#).unwrap();
        assert_eq!(back, Actions::READ.union(Actions::ADMIN));
        assert!(serde_json::from_str::<Actions>(r#"["root"]"#).is_err());
    }

    #[test]
    fn display_lists_names() {
        assert_eq!(Actions::WRITE.union(Actions::DELETE).to_string(), "{write,delete}");
    }
}
