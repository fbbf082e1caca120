//! The scene-provider collaborator boundary (spec §1).
//!
//! Scene loading, GLTF parsing and light sampling are explicitly out of scope; this module only
//! fixes the trait shape a scene provider must expose so `PipelinePass::update_binding_scene`
//! and pass `execute` hooks have something concrete to call.

use lume_rhi::{Buffer, RenderPass, Sampler, Texture};

/// GPU-resident bindings a scene exposes to passes, plus the ability to issue draw calls.
pub trait SceneProvider {
    fn indices(&self) -> &dyn Buffer;
    fn positions(&self) -> &dyn Buffer;
    fn vertices(&self) -> &dyn Buffer;
    fn cameras(&self) -> &dyn Buffer;
    fn geometries(&self) -> &dyn Buffer;
    fn materials(&self) -> &dyn Buffer;
    fn lights(&self) -> &dyn Buffer;
    fn light_bvh(&self) -> &dyn Buffer;
    fn scene_info(&self) -> &dyn Buffer;
    fn textures(&self) -> &[&dyn Texture];
    fn sampler(&self) -> &dyn Sampler;

    /// Issues every opaque draw call the scene needs, given a bound render pass encoder.
    fn draw(&self, pass: &mut dyn RenderPass);
}
