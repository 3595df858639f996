//! End-to-end coupling of the simple ice models.
//!
//! The GCM grid has two square cells and two height points (0 m and 1000 m).
//! Greenland (dismal model) lies in cell 0 at sea level; Laurentide (writer
//! model) lies in cell 1 at 1200 m, so it only sees the top height point.

use icecoupler_core::config::CouplingConfig;
use icecoupler_core::coupler::{CouplerState, ElevationValues, GcmCoupler};
use icecoupler_core::errors::CouplingError;
use icecoupler_core::grid::{GcmGrid, MapProjection};
use icecoupler_core::recipes::{HEAT_FLUX, MASS_FLUX, SURFACE_TEMPERATURE};
use icecoupler_core::regrid::IceSheet;
use icecoupler_models::build_ice_models;
use icecoupler_models::models::WriterIceModel;
use is_close::is_close;
use ndarray::array;

const CONFIG: &str = r#"
coupling_type = "DirichletBc"
hpdefs = [0.0, 1000.0]

[[ice_sheets]]
name = "greenland"
model = "dismal"

[[ice_sheets]]
name = "laurentide"
model = "writer"
"#;

/// Specific enthalpy of melt water in the ice model's reference state
const ENTHALPY_OFFSET: f64 = 2060.0 * (273.15 - 223.15) + 334000.0;

fn grid() -> GcmGrid {
    GcmGrid::new(vec![
        vec![(0.0, 0.0), (2.0, 0.0), (2.0, 2.0), (0.0, 2.0)],
        vec![(2.0, 0.0), (4.0, 0.0), (4.0, 2.0), (2.0, 2.0)],
    ])
}

fn ice_sheet(name: &str) -> IceSheet {
    let (i1, elevation) = match name {
        "greenland" => (0, 0.0),
        _ => (1, 1200.0),
    };
    let mut sheet = IceSheet::new(name, 2, MapProjection::Planar).with_elevation(vec![elevation; 2]);
    sheet.add_overlap(i1, 0, 1.0);
    sheet.add_overlap(i1, 1, 1.0);
    sheet
}

fn coupler(text: &str) -> GcmCoupler {
    let config = CouplingConfig::from_toml_str(text).unwrap();
    let mut gcm = config.build_coupler(grid()).unwrap();
    let (models, errors) = build_ice_models(&config);
    assert!(errors.is_empty());
    for (name, model) in models {
        gcm.add_ice_model(ice_sheet(&name), model).unwrap();
    }
    gcm.set_start_time("seconds since 2000-01-01", 0.0).unwrap();
    gcm.realize().unwrap();
    gcm
}

/// GCM outputs (lismb, liseb, litg2, lits) at elevation point 0 only
fn gcm_values(lismb: f64, litg2: f64) -> ElevationValues {
    ElevationValues {
        index: vec![0],
        values: array![[lismb, 0.0, litg2, 0.0]],
    }
}

fn writer(gcm: &GcmCoupler) -> WriterIceModel {
    let model = gcm.ice_coupler("laurentide").unwrap().model();
    serde_json::from_value(serde_json::to_value(model).unwrap()).unwrap()
}

#[test]
fn test_sheets_are_ready() {
    let gcm = coupler(CONFIG);
    for coupler in gcm.ice_couplers() {
        assert_eq!(coupler.state(), CouplerState::Ready);
    }
    let input = &gcm.ice_coupler("greenland").unwrap().contracts().unwrap().input;
    assert_eq!(input.contract.index(SURFACE_TEMPERATURE), Some(2));

    let fractions = gcm.engine().compute_fhc().unwrap();
    assert_eq!(fractions.fgice.len(), 2);
}

#[test]
fn test_couple_dismal_and_writer() {
    let mut gcm = coupler(CONFIG);

    // Refresh only: nothing moves
    gcm.couple(0.0, &gcm_values(0.9166, -10.0), false).unwrap();
    assert_eq!(
        gcm.ice_coupler("greenland").unwrap().model().elevation(),
        vec![0.0, 0.0]
    );

    // 1000 s of 0.9166 kg m-2 s-1 raises the surface by 1 m of ice
    let out = gcm.couple(1000.0, &gcm_values(0.9166, -10.0), true).unwrap();
    let elevation = gcm.ice_coupler("greenland").unwrap().model().elevation();
    assert!(is_close!(elevation[0], 1.0));
    assert!(is_close!(elevation[1], 1.0));

    let elev2 = out.normalized("elev2").unwrap();
    assert!(is_close!(elev2.get(&0).unwrap(), 1.0));
    // Cell 1, height class 1
    assert!(is_close!(elev2.get(&3).unwrap(), 1200.0));
    assert_eq!(out.weight.get(&0), Some(2.0));

    // -10 degC ice, returned relative to melt water
    let enth = out.normalized("ice_surface_enth").unwrap();
    assert!(is_close!(enth.get(&0).unwrap(), 2060.0 * 40.0 - ENTHALPY_OFFSET));
    assert!(is_close!(enth.get(&3).unwrap(), -ENTHALPY_OFFSET));
}

#[test]
fn test_writer_gets_defaults() {
    let mut gcm = coupler(CONFIG);
    gcm.couple(1000.0, &gcm_values(0.9166, -10.0), true).unwrap();
    gcm.couple(2000.0, &gcm_values(0.0, -20.0), true).unwrap();

    let writer = writer(&gcm);
    assert_eq!(writer.steps().len(), 2);
    assert_eq!(writer.time_base(), Some("seconds since 2000-01-01"));

    // The GCM said nothing about elevation point 3, so the writer sees the
    // GCM output defaults: no mass flux and 0 degC
    for temperature in writer.field_history(SURFACE_TEMPERATURE).unwrap() {
        assert!(temperature.iter().all(|t| is_close!(*t, 273.15)));
    }
    for smb in writer.field_history(MASS_FLUX).unwrap() {
        assert!(smb.iter().all(|m| *m == 0.0));
    }
    // The surface it handed back each step
    for usurf in writer.output_history("usurf").unwrap() {
        assert_eq!(usurf.to_vec(), vec![1200.0, 1200.0]);
    }
}

#[test]
fn test_neumann_coupling() {
    let text = CONFIG.replace("DirichletBc", "NeumannBc");
    let mut gcm = coupler(&text);
    let input = &gcm.ice_coupler("laurentide").unwrap().contracts().unwrap().input;
    assert!(input.contract.field_by_name(HEAT_FLUX).is_some());
    assert!(input.contract.field_by_name(SURFACE_TEMPERATURE).is_none());

    let values = ElevationValues {
        index: vec![3],
        values: array![[0.0, 0.0, 0.0, 0.25]],
    };
    gcm.couple(100.0, &values, true).unwrap();
    let history = writer(&gcm).field_history(HEAT_FLUX).unwrap();
    assert_eq!(history[0].to_vec(), vec![0.25, 0.25]);
}

#[test]
fn test_unknown_model_is_reported() {
    let text = CONFIG.replace("\"writer\"", "\"sicopolis\"");
    let config = CouplingConfig::from_toml_str(&text).unwrap();
    let (models, errors) = build_ice_models(&config);
    assert_eq!(models.len(), 1);
    assert!(matches!(
        errors.into_result(),
        Err(CouplingError::UnknownModelKind(kind)) if kind == "sicopolis"
    ));
}
