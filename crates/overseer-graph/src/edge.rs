//! Dependency edges. An edge points from the dependent task to the dependency it
//! waits on; the edge table is keyed `"{dependent}->{dependency}"`.

use overseer_core::identifier::{EdgeKey, TaskId};

/// What kind of dependency an edge expresses
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DependencyType {
    Task,
    Package,
    Framework,
    Tool,
    Import,
    Environment,
}

/// A directed dependency edge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyEdge {
    /// The dependent task, which must wait
    pub from: TaskId,
    /// The dependency, which must finish first
    pub to: TaskId,
    #[serde(rename = "type")]
    pub dep_type: DependencyType,
    /// Positive multiplier applied to the dependent's estimate on the critical path
    pub weight: f64,
    #[serde(default)]
    pub critical: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl DependencyEdge {
    pub fn new(from: TaskId, to: TaskId, dep_type: DependencyType) -> Self {
        Self {
            from,
            to,
            dep_type,
            weight: 1.0,
            critical: false,
            description: None,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_critical(mut self, critical: bool) -> Self {
        self.critical = critical;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// The `"{from}->{to}"` key of this edge
    pub fn key(&self) -> EdgeKey {
        EdgeKey::new(self.from.clone(), self.to.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edge_key_uses_arrow_form() {
        let edge = DependencyEdge::new(
            TaskId::new("impl").unwrap(),
            TaskId::new("setup").unwrap(),
            DependencyType::Task,
        );
        assert_eq!(edge.key().to_string(), "impl->setup");
        assert_eq!(edge.weight, 1.0);
    }

    #[test]
    fn type_serialises_lowercase() {
        let json = serde_json::to_string(&DependencyType::Environment).unwrap();
        assert_eq!(json, "\"environment\"");
        assert_eq!("package".parse::<DependencyType>().unwrap(), DependencyType::Package);
    }
}
