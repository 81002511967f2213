pub mod domain;
pub mod family_b;
pub mod family_j;
