pub mod cache;

pub use cache::{Atom, get_text, intern_text};
