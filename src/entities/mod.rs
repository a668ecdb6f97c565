pub mod product;
pub mod sale;

pub use product::{AgeGroup, Condition, GenderCategory};
