// error taxonomy shared by every per-curve operation
pub mod error;

// data module
pub mod data {
    pub mod segment;
    pub mod curve;
}

// algorithm module
pub mod algorithm {
    pub mod preprocess;
    pub mod poc;
    pub mod force;
    pub mod signal;
}

// contact mechanics and rheology models
pub mod models {
    pub mod fit;
    pub mod geometry;
    pub mod hertz;
    pub mod ting;
    pub mod sine;
    pub mod rheology;
}
