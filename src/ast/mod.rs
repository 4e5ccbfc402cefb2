//! Abstract syntax tree for the supported C subset.
//!
//! The tree is a set of mutually recursive sum types with boxed, owned
//! sub-trees; traversal is exhaustive pattern matching. Expression nodes are
//! generic over the attached info so the pipeline's stages are distinct
//! types rather than in-place mutation.

mod constant;
mod expression;
mod printer;
mod statement;
mod types;

pub use constant::*;
pub use expression::*;
pub use statement::*;
pub use types::*;
