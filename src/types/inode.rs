//! Inode numbers as exposed across the translator boundary.
//!
//! Distinct from the host filesystem's own inode numbers: the KV leaf
//! (see [`crate::kv`]) synthesizes these by XOR-ing a host directory's
//! stat inode with a per-context salt, so they never collide with the
//! directory's own inode (data model invariant v).

pub const ROOT_INODE: Inode = Inode(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Inode(u64);

impl From<u64> for Inode {
    fn from(value: u64) -> Self {
        Inode(value)
    }
}

impl From<Inode> for u64 {
    fn from(value: Inode) -> Self {
        value.0
    }
}

/// XORs a host inode number with a context-wide salt, avoiding collision
/// with the root inode (1) and with the un-salted host inode itself.
pub fn salted_inode(host_inode: u64, salt: u64) -> Inode {
    let salted = host_inode ^ salt;
    if salted == 0 || salted == ROOT_INODE.into() {
        Inode(salted | (1 << 63))
    } else {
        Inode(salted)
    }
}
