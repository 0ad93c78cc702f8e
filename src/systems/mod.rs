pub mod export;
pub mod mesh;
pub mod random;
