//! Declarative dataflow: named outputs, each a function of named inputs.

use crate::error::{FreightError, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Node function: receives its inputs in declaration order.
pub type NodeFn<V> = Arc<dyn Fn(&[&V]) -> Result<V> + Send + Sync>;

/// One derivation in a dataflow.
pub struct Node<V> {
    pub name: String,
    pub inputs: Vec<String>,
    func: NodeFn<V>,
}

impl<V> Node<V> {
    pub fn call(&self, args: &[&V]) -> Result<V> {
        (self.func)(args)
    }
}

impl<V> Clone for Node<V> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            inputs: self.inputs.clone(),
            func: Arc::clone(&self.func),
        }
    }
}

impl<V> fmt::Debug for Node<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("inputs", &self.inputs)
            .finish_non_exhaustive()
    }
}

/// Mapping from output name to its function and ordered input names.
///
/// Names that are not nodes must be supplied as inputs at execution time.
pub struct Dataflow<V> {
    nodes: BTreeMap<String, Node<V>>,
}

impl<V> Default for Dataflow<V> {
    fn default() -> Self {
        Self {
            nodes: BTreeMap::new(),
        }
    }
}

impl<V> Clone for Dataflow<V> {
    fn clone(&self) -> Self {
        Self {
            nodes: self.nodes.clone(),
        }
    }
}

impl<V> fmt::Debug for Dataflow<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.nodes.values()).finish()
    }
}

impl<V> Dataflow<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `name` as `func(inputs...)`. Each name may be declared once.
    pub fn add<F>(&mut self, name: &str, inputs: &[&str], func: F) -> Result<&mut Self>
    where
        F: Fn(&[&V]) -> Result<V> + Send + Sync + 'static,
    {
        if name.is_empty() {
            return Err(FreightError::dataflow("node name must not be empty"));
        }
        if self.nodes.contains_key(name) {
            return Err(FreightError::dataflow(format!(
                "node {name} is declared twice"
            )));
        }
        if inputs.contains(&name) {
            return Err(FreightError::dataflow(format!("node {name} depends on itself")));
        }
        self.nodes.insert(
            name.to_string(),
            Node {
                name: name.to_string(),
                inputs: inputs.iter().map(|s| s.to_string()).collect(),
                func: Arc::new(func),
            },
        );
        Ok(self)
    }

    pub fn node(&self, name: &str) -> Option<&Node<V>> {
        self.nodes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Declared node names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_and_self_reference() {
        let mut flow: Dataflow<i64> = Dataflow::new();
        flow.add("a", &["x"], |args| Ok(*args[0] + 1)).unwrap();
        assert!(matches!(
            flow.add("a", &["y"], |_| Ok(0)),
            Err(FreightError::Dataflow(_))
        ));
        assert!(flow.add("b", &["b"], |_| Ok(0)).is_err());
        assert_eq!(flow.len(), 1);
        assert_eq!(flow.node("a").unwrap().inputs, vec!["x".to_string()]);
    }
}
