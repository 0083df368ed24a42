pub mod augmented_lagrangian;
pub mod lbfgs;
