//! Offline tools for Lume: mesh preprocessing, cluster subdivision, SDF generation.

pub mod cluster;
pub mod sdf;

pub use cluster::{subdivide_mesh, ClusterDesc, SubdivideOptions};
pub use sdf::{generate_mesh_sdf, MeshSdfOutput};
