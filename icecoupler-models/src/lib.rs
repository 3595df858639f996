//! Ice-sheet models that can be plugged into the coupler.
//!
//! Neither model does any ice dynamics. They exist to exercise the coupling
//! end to end and to inspect what the GCM sends.
pub mod models;

pub use models::{build_ice_models, new_ice_model, MODEL_KINDS};
