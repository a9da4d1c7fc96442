//! Capability bits and system sentinels

// Capability bit constants
pub const READ: u64 = 1;
pub const WRITE: u64 = 1 << 1;
pub const DELETE: u64 = 1 << 2;
pub const ADMIN: u64 = 1 << 3;

pub const ALL_ACTIONS: u64 = READ | WRITE | DELETE | ADMIN;

// Pseudo-subject meaning "every authenticated subject"
pub const WILDCARD_SUBJECT: &str = "*";

// Issuer recorded on synthesized entries
pub const SYSTEM_SUBJECT: &str = "_system";

// Synthesized owner entries get id "_owner:<resource>"
pub const OWNER_ID_PREFIX: &str = "_owner:";

// Write attempts before a store conflict is surfaced
pub const DEFAULT_RETRY_BUDGET: u32 = 3;

// Capability name mappings
const CAPS: &[(&str, u64)] = &[
    ("read", READ),
    ("write", WRITE),
    ("delete", DELETE),
    ("admin", ADMIN),
];

/// Convert a capability mask to a list of capability names
pub fn caps_to_names(mask: u64) -> Vec<&'static str> {
    CAPS.iter()
        .filter(|(_, b)| mask & b == *b)
        .map(|(n, _)| *n)
        .collect()
}

/// Look up the bit for a single capability name
pub fn name_to_cap(name: &str) -> Option<u64> {
    CAPS.iter().find(|(k, _)| *k == name).map(|(_, v)| *v)
}
