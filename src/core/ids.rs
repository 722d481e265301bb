use std::collections::HashMap;

pub type NodeId = u32;

/// Interns dataset identifiers, handing out dense ids in first-seen order.
pub struct NodeRegistry {
    map: HashMap<String, NodeId>,
    names: Vec<String>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
            names: Vec::new(),
        }
    }

    pub fn get_or_insert(&mut self, external_id: &str) -> NodeId {
        if let Some(id) = self.map.get(external_id) {
            return *id;
        }
        let next = self.names.len();
        if next == u32::MAX as usize {
            panic!("Nodes count exceeds the limit")
        }
        self.map.insert(external_id.to_string(), next as NodeId);
        self.names.push(external_id.to_string());
        next as NodeId
    }

    pub fn get(&self, external_id: &str) -> Option<NodeId> {
        self.map.get(external_id).copied()
    }

    pub fn external_id(&self, id: NodeId) -> &str {
        &self.names[id as usize]
    }

    /// Identifiers in the order they were first seen.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
