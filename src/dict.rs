//! Typed key→value map used for translator options, extended-attribute
//! payloads, and RPC argument transport (e.g. the getspec response body).
//!
//! The reference design (§3/§9) gives a `Dictionary` manual reference
//! counting and a `Data` value with a "static/dynamic" copy-on-free flag, to
//! cope with C's lack of an owning smart pointer. In Rust the same sharing
//! discipline falls out of `Arc` for free: cloning a [`Dict`] is the
//! "ref-before-share" step, and dropping the last clone is the
//! "free-at-zero-refcount" step, so no manual counter is kept.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// A single dictionary value: a length-prefixed byte payload.
///
/// The "static/dynamic" flag from the reference design controlled whether a
/// receiving translator needed to copy the bytes before storing them past
/// the call that handed them over. `Data` always owns its bytes behind an
/// `Arc<[u8]>`, so every holder already has an independent, cheaply-cloned
/// reference; `is_locked` survives only as the dict-wide read-only marker
/// used by [`Dict::lock`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Data(Arc<[u8]>);

impl Data {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Data(bytes.into().into())
    }

    pub fn from_str(s: impl AsRef<str>) -> Self {
        Data::new(s.as_ref().as_bytes().to_vec())
    }

    pub fn from_u32(v: u32) -> Self {
        Data::new(v.to_string().into_bytes())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }

    pub fn parse<T: std::str::FromStr>(&self) -> Option<T> {
        self.as_str().and_then(|s| s.parse().ok())
    }
}

impl From<&str> for Data {
    fn from(s: &str) -> Self {
        Data::from_str(s)
    }
}

impl From<String> for Data {
    fn from(s: String) -> Self {
        Data::new(s.into_bytes())
    }
}

struct DictInner {
    members: HashMap<String, Data>,
    is_locked: bool,
}

/// A reference-counted key→value table.
///
/// `Dict::clone()` is the "acquire a reference" step; the last drop
/// releases the table, matching invariant (iii). Used both as a
/// translator's per-instance option bag and as the wire payload shape for
/// management calls like getspec (see [`Dict::to_wire`]/[`Dict::from_wire`]).
#[derive(Clone)]
pub struct Dict(Arc<Mutex<DictInner>>);

impl Dict {
    pub fn new() -> Self {
        Dict(Arc::new(Mutex::new(DictInner {
            members: HashMap::new(),
            is_locked: false,
        })))
    }

    /// Number of frame-local clones currently sharing this table.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    pub fn get(&self, key: &str) -> Option<Data> {
        self.0.lock().unwrap().members.get(key).cloned()
    }

    pub fn get_str(&self, key: &str) -> Option<String> {
        self.get(key).and_then(|d| d.as_str().map(str::to_owned))
    }

    /// Inserts or overwrites `key`. No-op (and logs) when the dict is locked.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Data>) {
        let mut inner = self.0.lock().unwrap();
        if inner.is_locked {
            log::warn!("attempted to set a key on a locked dict");
            return;
        }
        inner.members.insert(key.into(), value.into());
    }

    pub fn del(&self, key: &str) -> Option<Data> {
        self.0.lock().unwrap().members.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.lock().unwrap().members.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap().members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().unwrap().members.is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        self.0.lock().unwrap().members.keys().cloned().collect()
    }

    pub fn iter_cloned(&self) -> Vec<(String, Data)> {
        self.0
            .lock()
            .unwrap()
            .members
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Marks the table read-only. Used for option dicts handed to a
    /// translator after init, so a misbehaving handler can't mutate its own
    /// configuration out from under the graph loader.
    pub fn lock(&self) {
        self.0.lock().unwrap().is_locked = true;
    }

    pub fn is_locked(&self) -> bool {
        self.0.lock().unwrap().is_locked
    }

    /// Serializes to the wire format used to carry a dict as an RPC/getspec
    /// payload: a 4-byte big-endian member count, then per member a 4-byte
    /// key length + key bytes + 4-byte value length + value bytes.
    pub fn to_wire(&self) -> Vec<u8> {
        let members = self.iter_cloned();
        let mut out = Vec::new();
        out.extend_from_slice(&(members.len() as u32).to_be_bytes());
        for (k, v) in members {
            out.extend_from_slice(&(k.len() as u32).to_be_bytes());
            out.extend_from_slice(k.as_bytes());
            out.extend_from_slice(&(v.len() as u32).to_be_bytes());
            out.extend_from_slice(v.as_bytes());
        }
        out
    }

    pub fn from_wire(buf: &[u8]) -> Option<Self> {
        let dict = Dict::new();
        if buf.len() < 4 {
            return None;
        }
        let count = u32::from_be_bytes(buf[0..4].try_into().ok()?);
        let mut pos = 4usize;
        for _ in 0..count {
            let klen = u32::from_be_bytes(buf.get(pos..pos + 4)?.try_into().ok()?) as usize;
            pos += 4;
            let key = std::str::from_utf8(buf.get(pos..pos + klen)?).ok()?.to_owned();
            pos += klen;
            let vlen = u32::from_be_bytes(buf.get(pos..pos + 4)?.try_into().ok()?) as usize;
            pos += 4;
            let value = buf.get(pos..pos + vlen)?.to_vec();
            pos += vlen;
            dict.set(key, Data::new(value));
        }
        Some(dict)
    }
}

impl Default for Dict {
    fn default() -> Self {
        Dict::new()
    }
}

impl std::fmt::Debug for Dict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.0.lock().unwrap();
        f.debug_struct("Dict")
            .field("members", &inner.members.keys().collect::<Vec<_>>())
            .field("is_locked", &inner.is_locked)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_del_roundtrip() {
        let d = Dict::new();
        d.set("directory", "/tmp/exp");
        assert_eq!(d.get_str("directory").as_deref(), Some("/tmp/exp"));
        assert!(d.contains("directory"));
        d.del("directory");
        assert!(!d.contains("directory"));
    }

    #[test]
    fn locked_dict_refuses_writes() {
        let d = Dict::new();
        d.set("a", "1");
        d.lock();
        d.set("a", "2");
        assert_eq!(d.get_str("a").as_deref(), Some("1"));
    }

    #[test]
    fn clone_is_the_refcount() {
        let d = Dict::new();
        assert_eq!(d.ref_count(), 1);
        let d2 = d.clone();
        assert_eq!(d.ref_count(), 2);
        drop(d2);
        assert_eq!(d.ref_count(), 1);
    }

    #[test]
    fn wire_roundtrip() {
        let d = Dict::new();
        d.set("remote-host", "localhost");
        d.set("remote-port", "24007");
        let wire = d.to_wire();
        let back = Dict::from_wire(&wire).unwrap();
        assert_eq!(back.get_str("remote-host").as_deref(), Some("localhost"));
        assert_eq!(back.get_str("remote-port").as_deref(), Some("24007"));
        assert_eq!(back.len(), 2);
    }

    #[test]
    fn data_parse() {
        let d = Data::from_u32(24007);
        assert_eq!(d.parse::<u32>(), Some(24007));
    }
}
