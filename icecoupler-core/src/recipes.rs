//! Standard GCM contracts and the recipes translating them for an ice model.
//!
//! The GCM side is fixed ([`GcmContracts::standard`]). For every ice sheet two
//! transforms are built:
//!
//! * INPUT (GCM to ice): from the GCM outputs into the ice model's input
//!   contract, with [`setup_input`];
//! * OUTPUT (ice to GCM): from the ice model's output contract into the GCM
//!   inputs, with [`setup_output`].
//!
//! The GCM measures specific enthalpy relative to liquid water at the melting
//! point, while the ice model measures it from solid ice at a reference
//! temperature. The difference ([`enthalpy_offset`]) is added to enthalpy
//! fluxes on the way in and removed on the way out.

use crate::constants::ConstantSet;
use crate::contract::{CouplingContract, FieldFlags, FieldGrid};
use crate::errors::{CouplingResult, ErrorList};
use crate::transformer::{Axis, VarTransformer};
use log::info;
use serde::{Deserialize, Serialize};

pub const MASS_FLUX: &str = "surface_downward_mass_flux";
pub const ENTHALPY_FLUX: &str = "surface_downward_enthalpy_flux";
pub const SURFACE_TEMPERATURE: &str = "surface_temperature";
pub const HEAT_FLUX: &str = "surface_downward_conductive_heat_flux";

/// Kelvin at 0 degC
pub const C2K: f64 = 273.15;

/// Boundary condition the GCM imposes on the ice sheet surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CouplingType {
    /// Prescribe the surface temperature
    #[default]
    DirichletBc,
    /// Prescribe the conductive heat flux
    NeumannBc,
}

/// The contracts on the GCM side of the boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GcmContracts {
    /// Values the GCM provides, per elevation point
    pub gcm_outputs: CouplingContract,
    /// Values the GCM receives, per elevation point
    pub gcm_inputs: CouplingContract,
    pub ice_input_scalars: CouplingContract,
    pub ice_output_scalars: CouplingContract,
}

impl GcmContracts {
    pub fn standard() -> CouplingResult<Self> {
        let elevation = FieldFlags::on(FieldGrid::Elevation);

        let mut gcm_outputs = CouplingContract::new();
        gcm_outputs.add("lismb", 0.0, "kg m-2 s-1", elevation, "Surface mass balance")?;
        gcm_outputs.add(
            "liseb",
            0.0,
            "W m-2",
            elevation,
            "Enthalpy carried by the surface mass balance",
        )?;
        gcm_outputs.add("litg2", 0.0, "degC", elevation, "Temperature at the ice surface")?;
        gcm_outputs.add(
            "lits",
            0.0,
            "W m-2",
            elevation,
            "Conductive heat flux into the ice surface",
        )?;

        let mut gcm_inputs = CouplingContract::new();
        gcm_inputs.add(
            "elev1",
            0.0,
            "m",
            elevation.with_initial(),
            "Surface elevation used to initialize the GCM",
        )?;
        gcm_inputs.add("elev2", 0.0, "m", elevation, "Ice surface elevation")?;
        for (name, units) in [
            ("ice_surface_enth", "J kg-1"),
            ("ice_surface_enth_depth", "m"),
            ("basal_runoff.mass", "kg m-2 s-1"),
            ("basal_runoff.enth", "W m-2"),
            ("calving.mass", "kg m-2 s-1"),
            ("calving.enth", "W m-2"),
            ("strain_heating", "W m-2"),
            ("epsilon.mass", "kg m-2 s-1"),
            ("epsilon.enth", "W m-2"),
        ] {
            gcm_inputs.add(name, 0.0, units, elevation, "")?;
        }

        let mut ice_input_scalars = CouplingContract::new();
        ice_input_scalars.add("by_dt", 0.0, "s-1", FieldFlags::none(), "Inverse of the coupling interval")?;
        let ice_output_scalars = ice_input_scalars.clone();

        Ok(Self {
            gcm_outputs,
            gcm_inputs,
            ice_input_scalars,
            ice_output_scalars,
        })
    }
}

/// Everything a recipe may consult while building a sheet's contracts
#[derive(Debug, Clone, Copy)]
pub struct ContractContext<'a> {
    pub gcm: &'a GcmContracts,
    pub coupling_type: CouplingType,
    /// Constants published by the GCM
    pub gcm_constants: &'a ConstantSet,
}

/// A contract together with the transform that fills it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CouplingSide {
    pub contract: CouplingContract,
    pub transformer: VarTransformer,
}

/// Result of building the INPUT side; required to build the OUTPUT side.
#[derive(Debug, Clone, PartialEq)]
pub struct InputSetup {
    pub side: CouplingSide,
    pub constants: ConstantSet,
    /// GCM to ice model specific enthalpy (J kg-1)
    pub enthalpy_offset: f64,
}

/// Both directions of coupling for one ice sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractSet {
    /// GCM to ice
    pub input: CouplingSide,
    /// Ice to GCM
    pub output: CouplingSide,
    /// The ice model's own constants
    pub constants: ConstantSet,
    pub enthalpy_offset: f64,
}

/// The ice model's constants, translated from the GCM's.
pub fn ice_constants(gcm: &ConstantSet) -> CouplingResult<ConstantSet> {
    let mut ice = ConstantSet::new();
    let mut errors = ErrorList::new();
    for (dst, src, multiplier) in [
        ("standard_gravity", "constant::grav", 1.0),
        ("beta_CC", "seaice::dtdp", -1.0),
        ("water_melting_point_temperature", "constant::tf", 1.0),
        ("water_latent_heat_fusion", "constant::lhm", 1.0),
        ("water_specific_heat_capacity", "constant::shw", 1.0),
        ("ice_density", "constant::rhoi", 1.0),
        ("ice_thermal_conductivity", "seaice::alami0", 1.0),
        ("ice_specific_heat_capacity", "constant::shi", 1.0),
        ("fresh_water_density", "constant::rhow", 1.0),
        ("sea_water_density", "constant::rhows", 1.0),
        ("ideal_gas_constant", "constant::gasc", 1.0),
    ] {
        errors.check(ice.transfer(dst, gcm, src, multiplier));
    }
    errors.into_result()?;

    // Surface pressure is relative to 1 atm, which is where the GCM operates
    ice.set("surface_pressure", 0.0, "Pa", "Pressure at the ice surface");
    ice.set(
        "enthalpy_reference_temperature",
        223.15,
        "K",
        "Temperature at which ice enthalpy is zero",
    );
    Ok(ice)
}

/// Specific enthalpy of liquid water at the melting point, measured from
/// the ice model's reference state.
///
/// `c_i * (T_melt - T_0) + L`, in J kg-1.
pub fn enthalpy_offset(constants: &ConstantSet) -> CouplingResult<f64> {
    let c_i = constants.get_as("ice_specific_heat_capacity", "J kg-1 K-1")?;
    let t_melt = constants.get_as("water_melting_point_temperature", "K")?;
    let t_0 = constants.get_as("enthalpy_reference_temperature", "K")?;
    let latent_heat = constants.get_as("water_latent_heat_fusion", "J kg-1")?;
    Ok(c_i * (t_melt - t_0) + latent_heat)
}

fn bind(
    inputs: &CouplingContract,
    outputs: &CouplingContract,
    scalars: &CouplingContract,
) -> CouplingResult<VarTransformer> {
    let mut vt = VarTransformer::new();
    vt.set_names(Axis::Inputs, inputs)?;
    vt.set_names(Axis::Outputs, outputs)?;
    vt.set_names(Axis::Scalars, scalars)?;
    vt.allocate()?;
    Ok(vt)
}

/// Build the ice model's input contract and the GCM to ice transform.
pub fn setup_input(ctx: &ContractContext) -> CouplingResult<InputSetup> {
    info!("BEGIN setting up ice input contract ({:?})", ctx.coupling_type);
    let ice = FieldFlags::on(FieldGrid::Ice);
    let constants = ice_constants(ctx.gcm_constants)?;

    let mut contract = CouplingContract::new();
    contract.add(
        MASS_FLUX,
        0.0,
        "kg m-2 s-1",
        ice,
        "Surface mass balance over the coupling interval, down is positive",
    )?;
    contract.add(
        ENTHALPY_FLUX,
        0.0,
        "W m-2",
        ice,
        "Advective enthalpy of the surface mass flux, down is positive",
    )?;
    match ctx.coupling_type {
        CouplingType::DirichletBc => contract.add(
            SURFACE_TEMPERATURE,
            C2K,
            "K",
            ice,
            "Temperature at the interface between ice and atmosphere",
        )?,
        CouplingType::NeumannBc => contract.add(
            HEAT_FLUX,
            0.0,
            "W m-2",
            ice,
            "Conductive heat flux into the ice surface, down is positive",
        )?,
    };

    let offset = enthalpy_offset(&constants)?;
    info!("GCM to ice enthalpy offset = {} J kg-1", offset);

    let mut vt = bind(&ctx.gcm.gcm_outputs, &contract, &ctx.gcm.ice_input_scalars)?;
    let mut errors = ErrorList::new();
    errors.check(vt.set(MASS_FLUX, "lismb", "unit", 1.0));
    errors.check(vt.set(ENTHALPY_FLUX, "liseb", "unit", 1.0));
    errors.check(vt.set(ENTHALPY_FLUX, "lismb", "unit", offset));
    match ctx.coupling_type {
        CouplingType::DirichletBc => {
            errors.check(vt.set(SURFACE_TEMPERATURE, "litg2", "unit", 1.0));
            errors.check(vt.set(SURFACE_TEMPERATURE, "unit", "unit", C2K));
        }
        CouplingType::NeumannBc => {
            errors.check(vt.set(HEAT_FLUX, "lits", "unit", 1.0));
        }
    }
    errors.into_result()?;

    info!("END setting up ice input contract");
    Ok(InputSetup {
        side: CouplingSide {
            contract,
            transformer: vt,
        },
        constants,
        enthalpy_offset: offset,
    })
}

/// Build the ice model's output contract and the ice to GCM transform.
///
/// Takes the finished INPUT setup, so INPUT is always built first.
pub fn setup_output(ctx: &ContractContext, input: &InputSetup) -> CouplingResult<CouplingSide> {
    info!("BEGIN setting up ice output contract");
    let ice = FieldFlags::on(FieldGrid::Ice);
    let offset = input.enthalpy_offset;

    let mut contract = CouplingContract::new();
    contract.add("usurf", 0.0, "m", ice, "Ice upper surface elevation")?;
    contract.add("ice_surface_enth", 0.0, "J kg-1", ice, "")?;
    contract.add("ice_surface_enth_depth", 0.0, "m", ice, "")?;
    for prefix in ["basal_runoff", "calving"] {
        contract.add(&format!("{prefix}.mass"), 0.0, "kg m-2 s-1", ice, "")?;
        contract.add(&format!("{prefix}.enth"), 0.0, "W m-2", ice, "")?;
    }
    contract.add("strain_heating", 0.0, "W m-2", ice, "")?;
    contract.add("epsilon.mass", 0.0, "kg m-2 s-1", ice, "")?;
    contract.add("epsilon.enth", 0.0, "W m-2", ice, "")?;

    let mut vt = bind(&contract, &ctx.gcm.gcm_inputs, &ctx.gcm.ice_output_scalars)?;
    let mut errors = ErrorList::new();
    errors.check(vt.set("elev2", "usurf", "unit", 1.0));
    errors.check(vt.set("elev1", "usurf", "unit", 1.0));

    // Enth_e = Enth_p - offset
    errors.check(vt.set("ice_surface_enth", "ice_surface_enth", "unit", 1.0));
    errors.check(vt.set("ice_surface_enth", "unit", "unit", -offset));
    errors.check(vt.set("ice_surface_enth_depth", "ice_surface_enth_depth", "unit", 1.0));

    // X.enth_e = X.enth_p - offset * X.mass
    for prefix in ["basal_runoff", "calving", "epsilon"] {
        let mass = format!("{prefix}.mass");
        let enth = format!("{prefix}.enth");
        errors.check(vt.set(&mass, &mass, "unit", 1.0));
        errors.check(vt.set(&enth, &enth, "unit", 1.0));
        errors.check(vt.set(&enth, &mass, "unit", -offset));
    }
    errors.check(vt.set("strain_heating", "strain_heating", "unit", 1.0));
    errors.into_result()?;

    info!("END setting up ice output contract");
    Ok(CouplingSide {
        contract,
        transformer: vt,
    })
}

/// INPUT then OUTPUT with the standard recipes
pub fn standard_contracts(ctx: &ContractContext) -> CouplingResult<ContractSet> {
    let input = setup_input(ctx)?;
    let output = setup_output(ctx, &input)?;
    Ok(ContractSet {
        input: input.side,
        output,
        constants: input.constants,
        enthalpy_offset: input.enthalpy_offset,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::CouplingError;
    use is_close::is_close;

    fn contracts(coupling_type: CouplingType) -> ContractSet {
        let gcm = GcmContracts::standard().unwrap();
        let constants = ConstantSet::gcm_standard();
        let ctx = ContractContext {
            gcm: &gcm,
            coupling_type,
            gcm_constants: &constants,
        };
        standard_contracts(&ctx).unwrap()
    }

    #[test]
    fn test_enthalpy_offset() {
        let ice = ice_constants(&ConstantSet::gcm_standard()).unwrap();
        // 2060 * 50 + 334000
        assert!(is_close!(enthalpy_offset(&ice).unwrap(), 437000.0));
        assert!(is_close!(ice.get("beta_CC").unwrap(), 8.8e-8));
    }

    #[test]
    fn test_missing_gcm_constants() {
        let mut gcm = ConstantSet::new();
        gcm.set("constant::grav", 9.8, "m s-2", "");
        match ice_constants(&gcm) {
            Err(CouplingError::Multiple(errors)) => assert_eq!(errors.len(), 10),
            other => panic!("Expected Multiple, got {:?}", other),
        }
    }

    #[test]
    fn test_dirichlet_input() {
        let set = contracts(CouplingType::DirichletBc);
        let input = &set.input;
        assert_eq!(
            input.contract.names(),
            vec![MASS_FLUX, ENTHALPY_FLUX, SURFACE_TEMPERATURE]
        );

        // lismb, liseb, litg2, lits
        let out = input
            .transformer
            .apply(&[2.0, 5.0, 10.0, 99.0], &[0.0])
            .unwrap();
        assert_eq!(out[0], 2.0);
        assert!(is_close!(out[1], 5.0 + 2.0 * set.enthalpy_offset));
        assert!(is_close!(out[2], 283.15));
    }

    #[test]
    fn test_neumann_input() {
        let set = contracts(CouplingType::NeumannBc);
        assert_eq!(set.input.contract.index(HEAT_FLUX), Some(2));
        assert_eq!(set.input.contract.index(SURFACE_TEMPERATURE), None);
        let out = set
            .input
            .transformer
            .apply(&[0.0, 0.0, 10.0, 3.5], &[0.0])
            .unwrap();
        assert_eq!(out[2], 3.5);
    }

    #[test]
    fn test_output_enthalpy() {
        let set = contracts(CouplingType::DirichletBc);
        let output = &set.output;
        let offset = set.enthalpy_offset;
        let n = output.contract.len();
        let mut ice = vec![0.0; n];
        let ix = |name: &str| output.contract.index(name).unwrap();
        ice[ix("usurf")] = 1234.0;
        ice[ix("ice_surface_enth")] = 500000.0;
        ice[ix("calving.mass")] = 2.0;
        ice[ix("calving.enth")] = 1.0e6;

        let gcm = output.transformer.apply(&ice, &[0.0]).unwrap();
        let gcm_inputs = output.transformer.contract(Axis::Outputs).unwrap();
        let get = |name: &str| gcm[gcm_inputs.index(name).unwrap()];

        assert_eq!(get("elev1"), 1234.0);
        assert_eq!(get("elev2"), 1234.0);
        assert!(is_close!(get("ice_surface_enth"), 500000.0 - offset));
        assert_eq!(get("calving.mass"), 2.0);
        assert!(is_close!(get("calving.enth"), 1.0e6 - offset * 2.0));
        // No mass, no enthalpy correction
        assert_eq!(get("basal_runoff.enth"), 0.0);
    }

    #[test]
    fn test_standard_gcm_contracts() {
        let gcm = GcmContracts::standard().unwrap();
        assert_eq!(gcm.gcm_outputs.names(), vec!["lismb", "liseb", "litg2", "lits"]);
        assert!(gcm.gcm_inputs.field_by_name("elev1").unwrap().flags.initial);
        assert!(!gcm.gcm_inputs.field_by_name("elev2").unwrap().flags.initial);
        assert_eq!(gcm.gcm_inputs.len(), 11);
    }

    #[test]
    fn test_contract_set_serialisation() {
        let set = contracts(CouplingType::DirichletBc);
        let serialised = serde_json::to_string(&set).unwrap();
        let restored: ContractSet = serde_json::from_str(&serialised).unwrap();
        assert_eq!(restored, set);
    }
}
