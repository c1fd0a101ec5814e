//! Resolves a volume spec's `type` string to a translator constructor
//! (design note "polymorphism across translators"): a `HashMap<&str, fn(...)
//! -> Arc<dyn Xlator>>` populated once, at process startup, with every
//! builtin translator this crate ships.

use std::collections::HashMap;
use std::sync::Arc;

use crate::dict::Dict;

use super::{Translator, Xlator};

type Ctor = fn(&Dict) -> Arc<dyn Xlator>;

/// The known translator types. Unknown types are a fatal load-time error
/// (§4.1).
pub fn builtin_registry() -> HashMap<&'static str, Ctor> {
    let mut m: HashMap<&'static str, Ctor> = HashMap::new();
    m.insert("storage/kv", |opts| Arc::new(crate::kv::KvTranslator::new(opts)) as Arc<dyn Xlator>);
    m.insert("protocol/client", |opts| Arc::new(crate::specfetch::ClientTranslator::new(opts)) as Arc<dyn Xlator>);
    m.insert("mount/fuse", |opts| Arc::new(crate::bootstrap::fuse_top::FuseTopTranslator::new(opts)) as Arc<dyn Xlator>);
    m.insert("debug/trace", |_opts| Arc::new(PassthroughXlator) as Arc<dyn Xlator>);
    m
}

/// Looks up `type_name` in the builtin registry and constructs a node named
/// `name` with `options`. Returns `None` for an unrecognized type so the
/// graph loader can report a fatal "unknown translator type" error.
pub fn build(name: &str, type_name: &str, options: Dict) -> Option<Arc<Translator>> {
    let registry = builtin_registry();
    let ctor = registry.get(type_name)?;
    let impl_ = ctor(&options);
    Some(Translator::new(name, type_name, options, impl_))
}

/// A no-op translator that refuses every op via the trait's defaults and has
/// no private state; used by `debug/trace` (a transparent passthrough) and
/// by tests.
pub struct PassthroughXlator;

impl Xlator for PassthroughXlator {
    fn type_name(&self) -> &'static str {
        "debug/trace"
    }
}

/// A translator with no children and the trait's all-refusing defaults,
/// only meaningful as a frame/graph-plumbing test fixture.
pub fn dummy_translator(name: &str) -> Arc<Translator> {
    Translator::new(name, "debug/trace", Dict::new(), Arc::new(PassthroughXlator))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_type_resolves_to_none() {
        assert!(build("x", "no/such/type", Dict::new()).is_none());
    }

    #[test]
    fn known_types_resolve() {
        assert!(build("leaf", "storage/kv", Dict::new()).is_some());
    }
}
