// locus_core/src/utils/mod.rs

pub mod jacobian;
pub mod linalg;
