//! Scene loading: per-run topology (node initial state), matching the teacher's
//! `common/scene.rs` JSON scene convention but in 3-D and without obstacles (the
//! spec's world has no line-of-sight blockers).

use crate::geometry::Vec3;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SceneError {
    #[error("failed to read scene file {path}: {source}")]
    Read { path: String, #[source] source: std::io::Error },
    #[error("failed to parse scene file {path}: {source}")]
    Parse { path: String, #[source] source: serde_json::Error },
    #[error("scene has {actual} nodes but config.number_of_drones is {expected}")]
    NodeCountMismatch { expected: u32, actual: usize },
}

#[derive(Debug, Clone, Deserialize)]
pub struct SceneNode {
    pub node_id: u32,
    pub position: Vec3,
    /// Initial velocity; ignored by `StaticMobility`, used as the seed heading by
    /// `RandomWaypoint3D`.
    #[serde(default)]
    pub velocity: Vec3,
    /// Fixed destination node id for experiments that pin a single sink
    /// (spec.md §4.6: "some experiments pin dst=0").
    #[serde(default)]
    pub pinned_destination: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Scene {
    pub nodes: Vec<SceneNode>,
}

impl Scene {
    pub fn load(path: &Path) -> Result<Self, SceneError> {
        let content = std::fs::read_to_string(path).map_err(|source| SceneError::Read { path: path.display().to_string(), source })?;
        let scene: Scene = serde_json::from_str(&content).map_err(|source| SceneError::Parse { path: path.display().to_string(), source })?;
        Ok(scene)
    }

    pub fn validate_against(&self, expected_node_count: u32) -> Result<(), SceneError> {
        if self.nodes.len() != expected_node_count as usize {
            return Err(SceneError::NodeCountMismatch { expected: expected_node_count, actual: self.nodes.len() });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_against_rejects_mismatched_count() {
        let scene = Scene { nodes: vec![SceneNode { node_id: 0, position: Vec3::ZERO, velocity: Vec3::ZERO, pinned_destination: None }] };
        assert!(matches!(scene.validate_against(2), Err(SceneError::NodeCountMismatch { expected: 2, actual: 1 })));
        assert!(scene.validate_against(1).is_ok());
    }

    #[test]
    fn parses_minimal_scene_json() {
        let json = r#"{"nodes":[{"node_id":0,"position":{"x":0.0,"y":0.0,"z":10.0}}]}"#;
        let scene: Scene = serde_json::from_str(json).unwrap();
        assert_eq!(scene.nodes.len(), 1);
        assert_eq!(scene.nodes[0].position.z, 10.0);
    }
}
