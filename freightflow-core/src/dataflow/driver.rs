//! Dataflow driver: resolves the nodes needed for the requested outputs and runs them
//! in topological order.

use crate::dataflow::graph::Dataflow;
use crate::error::{FreightError, Result};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Executes a borrowed [`Dataflow`].
pub struct Driver<'a, V> {
    flow: &'a Dataflow<V>,
}

impl<'a, V: Clone> Driver<'a, V> {
    pub fn new(flow: &'a Dataflow<V>) -> Self {
        Self { flow }
    }

    /// Nodes that must run to produce `outputs` from `available` inputs, in execution order.
    ///
    /// Supplied inputs shadow nodes of the same name.
    pub fn plan(&self, outputs: &[&str], available: &HashSet<&str>) -> Result<Vec<String>> {
        let mut graph: DiGraph<String, ()> = DiGraph::new();
        let mut index: HashMap<String, NodeIndex> = HashMap::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut stack: Vec<String> = Vec::new();

        for output in outputs {
            if available.contains(output) {
                continue;
            }
            if !self.flow.contains(output) {
                return Err(FreightError::dataflow(format!(
                    "unknown output {output}: neither a node nor a supplied input"
                )));
            }
            stack.push(output.to_string());
        }

        while let Some(name) = stack.pop() {
            if !visited.insert(name.clone()) {
                continue;
            }
            let node = self
                .flow
                .node(&name)
                .ok_or_else(|| FreightError::dataflow(format!("unknown node {name}")))?;
            let to = node_index(&mut graph, &mut index, &name);
            for dep in &node.inputs {
                if available.contains(dep.as_str()) {
                    continue;
                }
                if !self.flow.contains(dep) {
                    return Err(FreightError::dataflow(format!(
                        "node {name} needs input {dep}, which is neither supplied nor declared"
                    )));
                }
                let from = node_index(&mut graph, &mut index, dep);
                graph.update_edge(from, to, ());
                stack.push(dep.clone());
            }
        }

        let order = toposort(&graph, None).map_err(|cycle| {
            FreightError::dataflow(format!(
                "cycle through node {}",
                graph[cycle.node_id()]
            ))
        })?;
        Ok(order.into_iter().map(|i| graph[i].clone()).collect())
    }

    /// Run the dataflow. Each required node executes exactly once.
    pub fn execute(
        &self,
        outputs: &[&str],
        inputs: HashMap<String, V>,
    ) -> Result<BTreeMap<String, V>> {
        let plan = {
            let available: HashSet<&str> = inputs.keys().map(String::as_str).collect();
            self.plan(outputs, &available)?
        };

        let mut values = inputs;
        for name in &plan {
            let node = self
                .flow
                .node(name)
                .ok_or_else(|| FreightError::dataflow(format!("unknown node {name}")))?;
            let args = node
                .inputs
                .iter()
                .map(|dep| {
                    values.get(dep).ok_or_else(|| {
                        FreightError::dataflow(format!("input {dep} of {name} was not computed"))
                    })
                })
                .collect::<Result<Vec<&V>>>()?;
            let value = node.call(&args)?;
            tracing::debug!(node = %name, inputs = node.inputs.len(), "Executed dataflow node");
            values.insert(name.clone(), value);
        }

        outputs
            .iter()
            .map(|output| {
                values
                    .get(*output)
                    .cloned()
                    .map(|v| (output.to_string(), v))
                    .ok_or_else(|| FreightError::dataflow(format!("output {output} missing")))
            })
            .collect()
    }
}

fn node_index(
    graph: &mut DiGraph<String, ()>,
    index: &mut HashMap<String, NodeIndex>,
    name: &str,
) -> NodeIndex {
    if let Some(&idx) = index.get(name) {
        return idx;
    }
    let idx = graph.add_node(name.to_string());
    index.insert(name.to_string(), idx);
    idx
}
