pub mod density;
pub mod predictor;

pub use density::DensityHandler;
pub use predictor::Predictor;
