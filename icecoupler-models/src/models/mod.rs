mod dismal;
mod writer;

pub use dismal::{DismalIceModel, DismalParameters};
pub use writer::{RecordedStep, WriterIceModel};

use icecoupler_core::config::CouplingConfig;
use icecoupler_core::errors::{CouplingError, CouplingResult, ErrorList};
use icecoupler_core::model::IceModel;

/// Model kinds accepted by [`new_ice_model`]
pub const MODEL_KINDS: [&str; 2] = ["dismal", "writer"];

/// Construct an uninitialised ice model by kind name
pub fn new_ice_model(kind: &str) -> CouplingResult<Box<dyn IceModel>> {
    match kind.to_ascii_lowercase().as_str() {
        "dismal" => Ok(Box::new(DismalIceModel::new())),
        "writer" => Ok(Box::new(WriterIceModel::new())),
        _ => Err(CouplingError::UnknownModelKind(kind.to_string())),
    }
}

/// Build a model for every configured ice sheet.
///
/// Sheets with an unknown model kind are skipped and reported in the
/// returned error list.
pub fn build_ice_models(config: &CouplingConfig) -> (Vec<(String, Box<dyn IceModel>)>, ErrorList) {
    let mut errors = ErrorList::new();
    let models = config
        .ice_sheets
        .iter()
        .filter_map(|sheet| {
            errors
                .check(new_ice_model(&sheet.model))
                .map(|model| (sheet.name.clone(), model))
        })
        .collect();
    (models, errors)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_ice_model() {
        for kind in MODEL_KINDS {
            assert!(new_ice_model(kind).is_ok());
        }
        assert!(new_ice_model("DISMAL").is_ok());
        assert!(matches!(
            new_ice_model("pism"),
            Err(CouplingError::UnknownModelKind(k)) if k == "pism"
        ));
    }

    #[test]
    fn test_build_ice_models() {
        let config = CouplingConfig::from_toml_str(
            r#"
hpdefs = [0.0, 1000.0]

[[ice_sheets]]
name = "greenland"
model = "dismal"

[[ice_sheets]]
name = "antarctica"
model = "sicopolis"

[[ice_sheets]]
name = "laurentide"
model = "writer"
"#,
        )
        .unwrap();
        let (models, errors) = build_ice_models(&config);
        let names: Vec<&str> = models.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["greenland", "laurentide"]);
        assert_eq!(errors.len(), 1);
    }
}
