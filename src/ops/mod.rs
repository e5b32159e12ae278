pub mod adjustments;
pub mod extract;
