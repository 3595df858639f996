//! Couples a general-circulation model to one or more ice-sheet models.
//!
//! Re-exports the coupling machinery of [`icecoupler_core`] and the bundled
//! ice models of [`icecoupler_models`].
pub use icecoupler_core::*;
pub use icecoupler_models::{build_ice_models, models, new_ice_model, MODEL_KINDS};

#[cfg(feature = "python")]
mod python;
