//! Strategy implementations, one per capability.

mod design;
mod folding;
mod redesign;

pub use design::{DesignStrategy, MAX_DESIGN_RECORDS};
pub use folding::FoldingStrategy;
pub use redesign::{RedesignStrategy, MAX_REDESIGN_RECORDS};
