//! Compartmental model structure: pools, their stock variables, and the
//! dataset variables holding external inputs, pool-to-pool transfers and
//! external outputs.
//!
//! The pool network is held as a directed graph with one node per pool and
//! one edge per donor/receiver pair.

use crate::errors::{C14Error, C14Result};
use petgraph::dot::Dot;
use petgraph::graph::{EdgeReference, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Graph;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolDefinition {
    pub pool_name: String,
    /// Dataset variable holding the pool's stock.
    pub stock_var: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferDefinition {
    pub from: String,
    pub to: String,
    /// Dataset variables summed to give the flux.
    pub fluxes: Vec<String>,
}

/// Serialisable description of a model structure.
///
/// ```toml
/// [[pools]]
/// pool_name = "Litter"
/// stock_var = "Litter"
///
/// [[pools]]
/// pool_name = "Soil"
/// stock_var = "Soil"
///
/// [external_inputs]
/// Litter = ["Leaf_fall"]
///
/// [[transfers]]
/// from = "Litter"
/// to = "Soil"
/// fluxes = ["Litter_to_Soil"]
///
/// [external_outputs]
/// Soil = ["Soil_to_RH"]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelStructureDefinition {
    pub pools: Vec<PoolDefinition>,
    #[serde(default)]
    pub external_inputs: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub transfers: Vec<TransferDefinition>,
    #[serde(default)]
    pub external_outputs: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolNode {
    pub pool_name: String,
    pub stock_var: String,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

impl fmt::Display for PoolNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.pool_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferEdge {
    pub fluxes: Vec<String>,
}

impl fmt::Display for TransferEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.fluxes.join(" + "))
    }
}

/// A transfer between two pools, by pool index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transfer<'a> {
    pub from: usize,
    pub to: usize,
    pub fluxes: &'a [String],
}

/// Validated model structure.
///
/// Pool order follows the definition and fixes the row and column order of
/// every stock vector and flux matrix built from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "ModelStructureDefinition", into = "ModelStructureDefinition")]
pub struct ModelStructure {
    node_indexes: Vec<NodeIndex>,
    graph: Graph<PoolNode, TransferEdge>,
}

impl ModelStructure {
    /// Validates a definition.
    ///
    /// Pool names and stock variables must be unique, every referenced pool
    /// must exist, transfers must join two different pools, and a dataset
    /// variable may play only one role.
    pub fn new(definition: ModelStructureDefinition) -> C14Result<Self> {
        if definition.pools.is_empty() {
            return Err(C14Error::Structure("no pools defined".into()));
        }

        let mut graph = Graph::new();
        let mut node_indexes = Vec::with_capacity(definition.pools.len());
        let mut index_of = BTreeMap::new();
        let mut seen_vars = BTreeSet::new();
        let mut claim = |var: &str| -> C14Result<()> {
            if seen_vars.insert(var.to_string()) {
                Ok(())
            } else {
                Err(C14Error::Structure(format!(
                    "variable '{var}' is used more than once"
                )))
            }
        };

        for pool in &definition.pools {
            if index_of.contains_key(pool.pool_name.as_str()) {
                return Err(C14Error::Structure(format!(
                    "pool '{}' is defined twice",
                    pool.pool_name
                )));
            }
            claim(&pool.stock_var)?;
            index_of.insert(pool.pool_name.as_str(), node_indexes.len());
            node_indexes.push(graph.add_node(PoolNode {
                pool_name: pool.pool_name.clone(),
                stock_var: pool.stock_var.clone(),
                inputs: definition
                    .external_inputs
                    .get(&pool.pool_name)
                    .cloned()
                    .unwrap_or_default(),
                outputs: definition
                    .external_outputs
                    .get(&pool.pool_name)
                    .cloned()
                    .unwrap_or_default(),
            }));
        }

        let lookup = |name: &str, role: &str| -> C14Result<usize> {
            index_of.get(name).copied().ok_or_else(|| {
                C14Error::Structure(format!("{role} refers to unknown pool '{name}'"))
            })
        };

        for (pool, vars) in &definition.external_inputs {
            lookup(pool, "external input")?;
            vars.iter().try_for_each(|v| claim(v))?;
        }
        for (pool, vars) in &definition.external_outputs {
            lookup(pool, "external output")?;
            vars.iter().try_for_each(|v| claim(v))?;
        }

        for transfer in &definition.transfers {
            let from = lookup(&transfer.from, "transfer")?;
            let to = lookup(&transfer.to, "transfer")?;
            if from == to {
                return Err(C14Error::Structure(format!(
                    "transfer from '{}' to itself",
                    transfer.from
                )));
            }
            if graph
                .find_edge(node_indexes[from], node_indexes[to])
                .is_some()
            {
                return Err(C14Error::Structure(format!(
                    "transfer from '{}' to '{}' is defined twice",
                    transfer.from, transfer.to
                )));
            }
            transfer.fluxes.iter().try_for_each(|v| claim(v))?;
            graph.add_edge(
                node_indexes[from],
                node_indexes[to],
                TransferEdge {
                    fluxes: transfer.fluxes.clone(),
                },
            );
        }

        Ok(Self {
            node_indexes,
            graph,
        })
    }

    /// Parses and validates a TOML definition.
    pub fn from_toml(text: &str) -> C14Result<Self> {
        let definition: ModelStructureDefinition =
            toml::from_str(text).map_err(|e| C14Error::Config(e.to_string()))?;
        Self::new(definition)
    }

    pub fn nr_pools(&self) -> usize {
        self.node_indexes.len()
    }

    pub fn pools(&self) -> impl Iterator<Item = &PoolNode> + '_ {
        self.node_indexes.iter().map(|&i| &self.graph[i])
    }

    pub fn pool(&self, index: usize) -> Option<&PoolNode> {
        self.node_indexes.get(index).map(|&i| &self.graph[i])
    }

    pub fn pool_names(&self) -> Vec<&str> {
        self.pools().map(|p| p.pool_name.as_str()).collect()
    }

    pub fn pool_index(&self, pool_name: &str) -> Option<usize> {
        self.pools().position(|p| p.pool_name == pool_name)
    }

    pub fn stock_variables(&self) -> Vec<&str> {
        self.pools().map(|p| p.stock_var.as_str()).collect()
    }

    pub fn external_input_fluxes(&self, pool: usize) -> &[String] {
        self.pool(pool)
            .map(|p| p.inputs.as_slice())
            .unwrap_or_default()
    }

    pub fn external_output_fluxes(&self, pool: usize) -> &[String] {
        self.pool(pool)
            .map(|p| p.outputs.as_slice())
            .unwrap_or_default()
    }

    fn position(&self, node: NodeIndex) -> usize {
        // node indexes are assigned in pool order and never removed
        node.index()
    }

    fn to_transfer<'a>(&self, edge: EdgeReference<'a, TransferEdge>) -> Transfer<'a> {
        Transfer {
            from: self.position(edge.source()),
            to: self.position(edge.target()),
            fluxes: edge.weight().fluxes.as_slice(),
        }
    }

    /// Transfers in definition order.
    pub fn transfers(&self) -> impl Iterator<Item = Transfer<'_>> + '_ {
        self.graph.edge_references().map(|e| self.to_transfer(e))
    }

    pub fn transfer(&self, from: usize, to: usize) -> Option<Transfer<'_>> {
        let from_node = *self.node_indexes.get(from)?;
        let to_node = *self.node_indexes.get(to)?;
        let edge = self.graph.find_edge(from_node, to_node)?;
        Some(Transfer {
            from,
            to,
            fluxes: self.graph[edge].fluxes.as_slice(),
        })
    }

    /// Every flux variable: inputs by pool, then transfers, then outputs by pool.
    pub fn flux_variables(&self) -> Vec<&str> {
        let inputs = self.pools().flat_map(|p| p.inputs.iter());
        let transfers = self.graph.edge_weights().flat_map(|e| e.fluxes.iter());
        let outputs = self.pools().flat_map(|p| p.outputs.iter());
        inputs
            .chain(transfers)
            .chain(outputs)
            .map(String::as_str)
            .collect()
    }

    /// Stock variables followed by flux variables.
    pub fn variables(&self) -> Vec<&str> {
        let mut names = self.stock_variables();
        names.extend(self.flux_variables());
        names
    }

    pub fn definition(&self) -> ModelStructureDefinition {
        let mut external_inputs = BTreeMap::new();
        let mut external_outputs = BTreeMap::new();
        for pool in self.pools() {
            if !pool.inputs.is_empty() {
                external_inputs.insert(pool.pool_name.clone(), pool.inputs.clone());
            }
            if !pool.outputs.is_empty() {
                external_outputs.insert(pool.pool_name.clone(), pool.outputs.clone());
            }
        }
        ModelStructureDefinition {
            pools: self
                .pools()
                .map(|p| PoolDefinition {
                    pool_name: p.pool_name.clone(),
                    stock_var: p.stock_var.clone(),
                })
                .collect(),
            external_inputs,
            transfers: self
                .transfers()
                .map(|t| TransferDefinition {
                    from: self.graph[self.node_indexes[t.from]].pool_name.clone(),
                    to: self.graph[self.node_indexes[t.to]].pool_name.clone(),
                    fluxes: t.fluxes.to_vec(),
                })
                .collect(),
            external_outputs,
        }
    }

    /// Graphviz rendering of the pool network.
    pub fn as_dot(&self) -> Dot<'_, &Graph<PoolNode, TransferEdge>> {
        Dot::new(&self.graph)
    }
}

impl TryFrom<ModelStructureDefinition> for ModelStructure {
    type Error = C14Error;

    fn try_from(definition: ModelStructureDefinition) -> C14Result<Self> {
        Self::new(definition)
    }
}

impl From<ModelStructure> for ModelStructureDefinition {
    fn from(structure: ModelStructure) -> Self {
        structure.definition()
    }
}
