//! Context composition.
//!
//! A persistent, path-addressable configuration tree for hierarchies of
//! contract objects. Templates registered by each contract family are
//! instantiated under a prefix, wired together with `${}` value references
//! and `@{}` context references, and resolved lazily at read time.
//!
//! ## Placeholders
//!
//! | Form | Reads as |
//! |------|----------|
//! | `${a.b}` | value at `a.b` from the state root |
//! | `${.x}` | sibling `x` in the same table |
//! | `${..x}` | `x` one level up, each extra dot ascends again |
//! | `@{..x}` | shared view onto the subtree at `x` |

pub mod file;
pub mod initializer;
pub mod path;
mod resolve;
pub mod state;
pub mod template;
pub mod value;
pub mod view;

pub use file::{load_context_file, save_context_file};
pub use initializer::initialize_context;
pub use path::ContextPath;
pub use state::{State, CONTRACT_CACHE_DIR};
pub use template::TemplateRegistry;
pub use value::{ContextValue, Node, Reference, ReferenceKind};
pub use view::Context;
