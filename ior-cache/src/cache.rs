use lazy_static::lazy_static;
use std::sync::{PoisonError, RwLock};
pub use string_cache::DefaultAtom as Atom;

lazy_static! {
    static ref TEXT_INTERNER: RwLock<Vec<Atom>> = RwLock::new(Vec::new());
}

/// Intern an on-screen message and return its stable id.
pub fn intern_text(s: &str) -> usize {
    let atom = Atom::from(s);
    if let Some(idx) = TEXT_INTERNER
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .iter()
        .position(|a| *a == atom)
    {
        return idx;
    }
    let mut v = TEXT_INTERNER
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    // Another writer may have raced us between the read and write locks.
    match v.iter().position(|a| *a == atom) {
        Some(idx) => idx,
        None => {
            v.push(atom);
            v.len() - 1
        }
    }
}

/// The interned atom for `id`, if one exists.
pub fn get_text(id: usize) -> Option<Atom> {
    TEXT_INTERNER
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(id)
        .cloned()
}
