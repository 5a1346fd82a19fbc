pub mod ai_service;
pub mod chat; // OpenAI-compatible chat completions client
pub mod density;
pub mod extractor;
pub mod reference; // Reference density table

pub use ai_service::{DensityEstimator, VisionModel};
pub use chat::ChatCompletionsClient;
pub use density::DensityResolver;
pub use reference::DensityReference;
