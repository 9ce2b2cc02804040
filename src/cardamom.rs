//! The six pool CARDAMOM carbon model.

use c14_core::errors::C14Result;
use c14_core::structure::ModelStructure;

/// Pools, flux variables and routing of CARDAMOM output datasets.
pub const CARDAMOM_STRUCTURE: &str = r#"
[[pools]]
pool_name = "Labile"
stock_var = "Labile"

[[pools]]
pool_name = "Leaf"
stock_var = "Leaf"

[[pools]]
pool_name = "Root"
stock_var = "Root"

[[pools]]
pool_name = "Wood"
stock_var = "Wood"

[[pools]]
pool_name = "Litter"
stock_var = "Litter"

[[pools]]
pool_name = "Soil"
stock_var = "Soil"

[external_inputs]
Labile = ["NPP_to_Labile"]
Leaf = ["NPP_to_Leaf"]
Root = ["NPP_to_Root"]
Wood = ["NPP_to_Wood"]

[[transfers]]
from = "Labile"
to = "Leaf"
fluxes = ["Labile_to_Leaf"]

[[transfers]]
from = "Leaf"
to = "Litter"
fluxes = ["Leaf_to_Litter"]

[[transfers]]
from = "Wood"
to = "Soil"
fluxes = ["Wood_to_Soil"]

[[transfers]]
from = "Root"
to = "Litter"
fluxes = ["Root_to_Litter"]

[[transfers]]
from = "Litter"
to = "Soil"
fluxes = ["Litter_to_Soil"]

[external_outputs]
Litter = ["Litter_to_RH"]
Soil = ["Soil_to_RH"]
"#;

/// The CARDAMOM model structure.
pub fn load_model_structure() -> C14Result<ModelStructure> {
    ModelStructure::from_toml(CARDAMOM_STRUCTURE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pools_in_order() {
        let structure = load_model_structure().unwrap();
        assert_eq!(
            structure.pool_names(),
            vec!["Labile", "Leaf", "Root", "Wood", "Litter", "Soil"]
        );
        assert_eq!(structure.nr_pools(), 6);
    }

    #[test]
    fn routing() {
        let structure = load_model_structure().unwrap();
        let idx = |name: &str| structure.pool_index(name).unwrap();

        assert_eq!(
            structure.external_input_fluxes(idx("Wood")),
            ["NPP_to_Wood".to_string()]
        );
        assert!(structure.external_input_fluxes(idx("Soil")).is_empty());
        assert_eq!(
            structure.external_output_fluxes(idx("Litter")),
            ["Litter_to_RH".to_string()]
        );
        let transfer = structure.transfer(idx("Root"), idx("Litter")).unwrap();
        assert_eq!(transfer.fluxes, ["Root_to_Litter".to_string()]);
        assert!(structure.transfer(idx("Litter"), idx("Root")).is_none());
        assert_eq!(structure.transfers().count(), 5);
    }

    #[test]
    fn variables() {
        let structure = load_model_structure().unwrap();
        assert_eq!(structure.flux_variables().len(), 11);
        assert_eq!(structure.variables().len(), 17);
        assert_eq!(structure.variables()[0], "Labile");
    }
}
