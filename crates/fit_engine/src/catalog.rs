use shared::domain::ParameterSpec;

use crate::{
    models::{ModelKind, StructureFactorKind},
    EngineError, ModelCatalog,
};

/// Catalog of the models the reference engine can evaluate.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinCatalog;

const INF: f64 = f64::INFINITY;

fn common_parameters() -> Vec<ParameterSpec> {
    vec![
        ParameterSpec::new("scale", 1.0, 0.0, INF).describe("Volume fraction or scale factor"),
        ParameterSpec::new("background", 0.001, -INF, INF).describe("Flat background, cm^-1"),
    ]
}

fn model_parameters(kind: ModelKind) -> Vec<ParameterSpec> {
    let mut specs = common_parameters();
    match kind {
        ModelKind::Sphere => specs.extend([
            ParameterSpec::new("sld", 1.0, -INF, INF).describe("Particle SLD, 1e-6/A^2"),
            ParameterSpec::new("sld_solvent", 6.0, -INF, INF).describe("Solvent SLD, 1e-6/A^2"),
            ParameterSpec::new("radius", 60.0, 0.0, INF)
                .polydisperse()
                .describe("Sphere radius, A"),
        ]),
        ModelKind::Cylinder => specs.extend([
            ParameterSpec::new("sld", 4.0, -INF, INF).describe("Cylinder SLD, 1e-6/A^2"),
            ParameterSpec::new("sld_solvent", 1.0, -INF, INF).describe("Solvent SLD, 1e-6/A^2"),
            ParameterSpec::new("radius", 20.0, 0.0, INF)
                .polydisperse()
                .describe("Cylinder radius, A"),
            ParameterSpec::new("length", 400.0, 0.0, INF)
                .polydisperse()
                .describe("Cylinder length, A"),
        ]),
        ModelKind::Ellipsoid => specs.extend([
            ParameterSpec::new("sld", 4.0, -INF, INF).describe("Ellipsoid SLD, 1e-6/A^2"),
            ParameterSpec::new("sld_solvent", 1.0, -INF, INF).describe("Solvent SLD, 1e-6/A^2"),
            ParameterSpec::new("radius_polar", 20.0, 0.0, INF)
                .polydisperse()
                .describe("Polar radius, A"),
            ParameterSpec::new("radius_equatorial", 400.0, 0.0, INF)
                .polydisperse()
                .describe("Equatorial radius, A"),
        ]),
        ModelKind::CoreShellSphere => specs.extend([
            ParameterSpec::new("radius", 60.0, 0.0, INF)
                .polydisperse()
                .describe("Core radius, A"),
            ParameterSpec::new("thickness", 10.0, 0.0, INF)
                .polydisperse()
                .describe("Shell thickness, A"),
            ParameterSpec::new("sld_core", 1.0, -INF, INF).describe("Core SLD, 1e-6/A^2"),
            ParameterSpec::new("sld_shell", 2.0, -INF, INF).describe("Shell SLD, 1e-6/A^2"),
            ParameterSpec::new("sld_solvent", 3.0, -INF, INF).describe("Solvent SLD, 1e-6/A^2"),
        ]),
    }
    specs
}

fn structure_factor_parameters(kind: StructureFactorKind) -> Vec<ParameterSpec> {
    match kind {
        StructureFactorKind::HardSphere => vec![
            ParameterSpec::new("radius_effective", 50.0, 0.0, INF)
                .describe("Effective interaction radius, A"),
            ParameterSpec::new("volfraction", 0.2, 0.0, 0.74)
                .describe("Volume fraction of hard spheres"),
        ],
    }
}

impl ModelCatalog for BuiltinCatalog {
    fn list_models(&self) -> Vec<String> {
        let mut names: Vec<String> = ModelKind::ALL
            .iter()
            .map(|kind| kind.name().to_string())
            .collect();
        names.sort();
        names
    }

    fn get_parameters(&self, model_name: &str) -> Result<Vec<ParameterSpec>, EngineError> {
        ModelKind::from_name(model_name)
            .map(model_parameters)
            .ok_or_else(|| EngineError::UnknownModel(model_name.to_string()))
    }

    fn list_structure_factors(&self) -> Vec<String> {
        StructureFactorKind::ALL
            .iter()
            .map(|kind| kind.name().to_string())
            .collect()
    }

    fn structure_factor_parameters(
        &self,
        sf_name: &str,
    ) -> Result<Vec<ParameterSpec>, EngineError> {
        StructureFactorKind::from_name(sf_name)
            .map(structure_factor_parameters)
            .ok_or_else(|| EngineError::UnknownStructureFactor(sf_name.to_string()))
    }
}
