//! Template inputs, resolution and placeholder substitution.

pub mod resolver;
pub mod substitution;

pub use resolver::{TemplateInput, resolve};
pub use substitution::{
    ATTACHMENTS_KEY, BracketEngine, PlaceholderEngine, Substitute, SubstitutionMap,
};
