//! The render node manager: registry, default node sets, batch-state
//! machine, debug recorder, and the per-frame driver.

use std::collections::HashMap;
use std::rc::Rc;

use crate::camera::Camera2d;
use crate::color::Color;
use crate::gpu::GpuContext;
use crate::texture::Texture;

use super::batch::{BatchState, BatcherId, BatcherSet};
use super::camera_node::{CameraNode, CameraRenderer};
use super::compositor::ListCompositor;
use super::context::{DrawingContext, RenderContext, ViewUniforms};
use super::debug::CallGraph;
use super::light_batch::LightBatcher;
use super::object::{NodeOverrides, NodeSet, ObjectKind, RenderObject};
use super::quad_batch::{MAX_TEXTURE_SLOTS, QuadBatcher};
use super::registry::{Node, NodeCtor, NodeError, NodeRegistry};
use super::stages::{
    FrameTexturer, ObjectTinter, TileSpriteTexturer, TilesetTexturer, Tinter, Transformer,
    Texturer, WorldTransformer,
};
use super::strip_batch::StripBatcher;
use super::submitter::{
    LightSubmitter, QuadSubmitter, ShapeSubmitter, Submitter, TileSpriteSubmitter,
    TilemapSubmitter,
};
use super::tile_batch::TileSpriteBatcher;

/// Pipeline sizing and defaults.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Flush threshold for the quad-shaped batchers, in instances.
    pub instances_per_batch: u32,
    /// GPU buffer headroom: how many full batches fit per frame before the
    /// upload cursor wraps.
    pub frame_buffer_batches: u32,
    /// Initial parallel-texture-unit setting; clamped against the device.
    pub max_parallel_texture_units: u32,
    /// Flush threshold for the strip batcher, in vertices.
    pub strip_vertices_per_batch: u32,
    /// Frame clear color.
    pub clear_color: Color,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            instances_per_batch: 4096,
            frame_buffer_batches: 8,
            max_parallel_texture_units: MAX_TEXTURE_SLOTS as u32,
            strip_vertices_per_batch: 8192,
            clear_color: Color::BLACK,
        }
    }
}

/// Listeners for pipeline notifications.
///
/// Cameras notify listeners after completing a pass (camera effect systems
/// hook in here), and the texture-unit tuning setter notifies shaders'
/// owners of the new limit.
#[derive(Default)]
pub struct RenderEvents {
    camera_rendered: Vec<Box<dyn Fn(&Camera2d)>>,
    texture_units_changed: Vec<Box<dyn Fn(u32)>>,
}

impl RenderEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_camera_rendered(&mut self, listener: impl Fn(&Camera2d) + 'static) {
        self.camera_rendered.push(Box::new(listener));
    }

    pub fn on_texture_units_changed(&mut self, listener: impl Fn(u32) + 'static) {
        self.texture_units_changed.push(Box::new(listener));
    }

    pub fn emit_camera_rendered(&self, camera: &Camera2d) {
        for listener in &self.camera_rendered {
            listener(camera);
        }
    }

    pub fn emit_texture_units_changed(&self, units: u32) {
        for listener in &self.texture_units_changed {
            listener(units);
        }
    }
}

/// Default role → node-name mapping for one object kind. Read-only after
/// setup.
#[derive(Clone, Debug)]
pub struct DefaultNodes {
    pub submitter: String,
    pub texturer: Option<String>,
    pub transformer: Option<String>,
    pub tinter: Option<String>,
}

impl DefaultNodes {
    fn full(submitter: &str, texturer: &str) -> Self {
        Self {
            submitter: submitter.to_string(),
            texturer: Some(texturer.to_string()),
            transformer: Some("WorldTransformer".to_string()),
            tinter: Some("ObjectTinter".to_string()),
        }
    }
}

/// One camera's worth of work for a frame.
pub struct CameraRequest<'a> {
    pub camera: &'a Camera2d,
    pub objects: &'a [RenderObject],
    /// Camera node to use; `None` means the standard `"Camera"` node.
    pub camera_node: Option<&'a str>,
}

/// Clamps a requested parallel-texture-unit count into `[1, renderer_max]`.
pub(crate) fn clamp_texture_units(requested: u32, renderer_max: u32) -> u32 {
    requested.max(1).min(renderer_max.max(1))
}

/// Registry + factory for all render nodes, owner of the batch handlers and
/// the single current-batch state machine, and the frame driver.
pub struct RenderNodeManager {
    registry: NodeRegistry,
    defaults: HashMap<ObjectKind, DefaultNodes>,
    batchers: BatcherSet,
    state: BatchState,
    views: ViewUniforms,
    debug: CallGraph,
    events: RenderEvents,
    white: Rc<Texture>,
    renderer_max_textures: u32,
    max_parallel_texture_units: u32,
    clear_color: Color,
}

impl RenderNodeManager {
    pub fn new(gpu: &GpuContext, config: PipelineConfig) -> Self {
        let white = Texture::white(gpu);
        let views = ViewUniforms::new(gpu);

        let renderer_max_textures = gpu.max_texture_units().min(MAX_TEXTURE_SLOTS as u32);
        let units = clamp_texture_units(config.max_parallel_texture_units, renderer_max_textures);
        let config = PipelineConfig {
            max_parallel_texture_units: units,
            ..config
        };

        let batchers = BatcherSet {
            quad: QuadBatcher::new(gpu, &views.layout, &config, white.clone()),
            tile_sprite: TileSpriteBatcher::new(gpu, &views.layout, &config),
            light: LightBatcher::new(gpu, &views.layout, &config),
            strip: StripBatcher::new(gpu, &views.layout, &config),
        };

        let mut manager = Self {
            registry: NodeRegistry::new(),
            defaults: HashMap::new(),
            batchers,
            state: BatchState::new(),
            views,
            debug: CallGraph::new(),
            events: RenderEvents::new(),
            white,
            renderer_max_textures,
            max_parallel_texture_units: units,
            clear_color: config.clear_color,
        };
        manager.register_builtin_nodes();
        manager
    }

    /// Registers the standard node set and the per-kind default tables.
    fn register_builtin_nodes(&mut self) {
        let quad_submitter = Rc::new(QuadSubmitter::new());
        let compositor = Rc::new(ListCompositor);

        let nodes: [(&str, Node); 16] = [
            (
                "QuadSubmitter",
                Node::Submitter(quad_submitter.clone() as Rc<dyn Submitter>),
            ),
            ("TileSpriteSubmitter", Node::Submitter(Rc::new(TileSpriteSubmitter))),
            (
                "TilemapSubmitter",
                Node::Submitter(Rc::new(TilemapSubmitter::new(quad_submitter))),
            ),
            ("LightSubmitter", Node::Submitter(Rc::new(LightSubmitter))),
            (
                "ShapeSubmitter",
                Node::Submitter(Rc::new(ShapeSubmitter::new(self.white.clone()))),
            ),
            ("FrameTexturer", Node::Texturer(Rc::new(FrameTexturer))),
            ("TileSpriteTexturer", Node::Texturer(Rc::new(TileSpriteTexturer))),
            ("TilesetTexturer", Node::Texturer(Rc::new(TilesetTexturer))),
            ("WorldTransformer", Node::Transformer(Rc::new(WorldTransformer))),
            ("ObjectTinter", Node::Tinter(Rc::new(ObjectTinter))),
            (
                "ListCompositor",
                Node::Compositor(compositor.clone() as Rc<dyn super::compositor::Compositor>),
            ),
            (
                "Camera",
                Node::Camera(Rc::new(CameraNode::new(compositor, self.white.clone()))),
            ),
            ("QuadBatcher", Node::Batcher(BatcherId::Quad)),
            ("TileSpriteBatcher", Node::Batcher(BatcherId::TileSprite)),
            ("LightBatcher", Node::Batcher(BatcherId::Light)),
            ("StripBatcher", Node::Batcher(BatcherId::Strip)),
        ];
        for (name, node) in nodes {
            self.registry
                .add_node(name, node)
                .expect("builtin node names are unique");
        }

        self.defaults.insert(
            ObjectKind::Sprite,
            DefaultNodes::full("QuadSubmitter", "FrameTexturer"),
        );
        self.defaults.insert(
            ObjectKind::TileSprite,
            DefaultNodes::full("TileSpriteSubmitter", "TileSpriteTexturer"),
        );
        self.defaults.insert(
            ObjectKind::Tilemap,
            DefaultNodes::full("TilemapSubmitter", "TilesetTexturer"),
        );
        self.defaults.insert(
            ObjectKind::Light,
            DefaultNodes {
                submitter: "LightSubmitter".to_string(),
                texturer: None,
                transformer: None,
                tinter: None,
            },
        );
        self.defaults.insert(
            ObjectKind::Shape,
            DefaultNodes {
                submitter: "ShapeSubmitter".to_string(),
                texturer: None,
                transformer: Some("WorldTransformer".to_string()),
                tinter: Some("ObjectTinter".to_string()),
            },
        );
    }

    /// Registers a constructed node. Duplicate names fail.
    pub fn add_node(&mut self, name: impl Into<String>, node: Node) -> Result<(), NodeError> {
        self.registry.add_node(name, node)
    }

    /// Registers a node constructor, run on first lookup. Duplicate names
    /// fail.
    pub fn add_constructor(
        &mut self,
        name: impl Into<String>,
        ctor: NodeCtor,
    ) -> Result<(), NodeError> {
        self.registry.add_constructor(name, ctor)
    }

    /// Looks up a node by name, constructing it on demand. `None` when the
    /// name is unknown.
    pub fn get_node(&mut self, name: &str) -> Option<&Node> {
        self.registry.get(name)
    }

    /// Whether a node name is known; with `constructed_only`, pending
    /// constructors don't count.
    pub fn has_node(&self, name: &str, constructed_only: bool) -> bool {
        self.registry.has(name, constructed_only)
    }

    /// Replaces the default node set for an object kind. Intended for setup
    /// time, before objects resolve their node sets.
    pub fn set_default_nodes(&mut self, kind: ObjectKind, defaults: DefaultNodes) {
        self.defaults.insert(kind, defaults);
    }

    pub fn default_nodes(&self, kind: ObjectKind) -> Option<&DefaultNodes> {
        self.defaults.get(&kind)
    }

    /// Resolves an object's typed node set once, at object construction.
    ///
    /// Role names come from the object's overrides where present, falling
    /// back to the kind's defaults. Returns `None` (with a warning) when
    /// the submitter can't be resolved; optional roles that fail to resolve
    /// are dropped individually.
    pub fn resolve_node_set(
        &mut self,
        kind: ObjectKind,
        overrides: Option<&NodeOverrides>,
    ) -> Option<NodeSet> {
        let defaults = self.defaults.get(&kind)?.clone();

        let submitter_name = overrides
            .and_then(|o| o.submitter.clone())
            .unwrap_or(defaults.submitter);
        let submitter = match self.registry.get(&submitter_name) {
            Some(Node::Submitter(node)) => node.clone(),
            Some(other) => {
                log::warn!(
                    "node '{}' is a {}, not a submitter",
                    submitter_name,
                    other.role()
                );
                return None;
            }
            None => {
                log::warn!("submitter node '{}' not found", submitter_name);
                return None;
            }
        };

        let texturer = self.resolve_texturer(
            overrides.and_then(|o| o.texturer.clone()).or(defaults.texturer),
        );
        let transformer = self.resolve_transformer(
            overrides
                .and_then(|o| o.transformer.clone())
                .or(defaults.transformer),
        );
        let tinter =
            self.resolve_tinter(overrides.and_then(|o| o.tinter.clone()).or(defaults.tinter));

        Some(NodeSet {
            submitter,
            texturer,
            transformer,
            tinter,
        })
    }

    fn resolve_texturer(&mut self, name: Option<String>) -> Option<Rc<dyn Texturer>> {
        let name = name?;
        match self.registry.get(&name) {
            Some(Node::Texturer(node)) => Some(node.clone()),
            _ => {
                log::warn!("texturer node '{}' not found", name);
                None
            }
        }
    }

    fn resolve_transformer(&mut self, name: Option<String>) -> Option<Rc<dyn Transformer>> {
        let name = name?;
        match self.registry.get(&name) {
            Some(Node::Transformer(node)) => Some(node.clone()),
            _ => {
                log::warn!("transformer node '{}' not found", name);
                None
            }
        }
    }

    fn resolve_tinter(&mut self, name: Option<String>) -> Option<Rc<dyn Tinter>> {
        let name = name?;
        match self.registry.get(&name) {
            Some(Node::Tinter(node)) => Some(node.clone()),
            _ => {
                log::warn!("tinter node '{}' not found", name);
                None
            }
        }
    }

    /// Listener registration.
    pub fn events_mut(&mut self) -> &mut RenderEvents {
        &mut self.events
    }

    /// Sets the parallel-texture-unit limit, clamped into
    /// `[1, renderer max]`, and notifies listeners. Returns the applied
    /// value.
    pub fn set_max_parallel_texture_units(&mut self, units: u32) -> u32 {
        let clamped = clamp_texture_units(units, self.renderer_max_textures);
        self.max_parallel_texture_units = clamped;
        self.batchers.quad.set_max_texture_units(clamped);
        log::debug!("parallel texture units set to {}", clamped);
        self.events.emit_texture_units_changed(clamped);
        clamped
    }

    pub fn max_parallel_texture_units(&self) -> u32 {
        self.max_parallel_texture_units
    }

    pub fn renderer_max_textures(&self) -> u32 {
        self.renderer_max_textures
    }

    /// Arms the debug recorder for the next frame.
    pub fn capture_next_frame(&mut self) {
        self.debug.capture_next_frame();
    }

    /// The most recently recorded call graph, as an indented tree.
    pub fn debug_dump(&self) -> String {
        self.debug.dump()
    }

    /// Renders one frame: walks each camera request through its camera
    /// node, then presents.
    ///
    /// Draw calls reach the GPU in compositing order; batches only merge
    /// between flush boundaries, never across them. The final flush and the
    /// debug recorder's frame end happen here.
    pub fn render_frame(&mut self, gpu: &GpuContext, requests: &[CameraRequest<'_>]) {
        // Resolve camera nodes before the frame borrows the batch state.
        let camera_nodes: Vec<Option<Rc<dyn CameraRenderer>>> = requests
            .iter()
            .map(|request| {
                let name = request.camera_node.unwrap_or("Camera");
                match self.registry.get(name) {
                    Some(Node::Camera(node)) => Some(node.clone()),
                    _ => {
                        log::warn!("camera node '{}' not found; request skipped", name);
                        None
                    }
                }
            })
            .collect();

        let output = gpu.surface.get_current_texture().unwrap();
        let screen_view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Phalanx Frame Encoder"),
            });

        self.debug.begin_frame();
        self.views.begin_frame();
        self.batchers.begin_frame();

        let clear = self.clear_color;
        {
            let mut pass = encoder
                .begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("Phalanx Frame Pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: &screen_view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Clear(wgpu::Color {
                                r: clear.r as f64,
                                g: clear.g as f64,
                                b: clear.b as f64,
                                a: clear.a as f64,
                            }),
                            store: wgpu::StoreOp::Store,
                        },
                        depth_slice: None,
                    })],
                    depth_stencil_attachment: None,
                    timestamp_writes: None,
                    occlusion_query_set: None,
                })
                .forget_lifetime();

            let screen = DrawingContext::screen(gpu.width() as f32, gpu.height() as f32);
            let mut ctx = RenderContext::new(
                gpu,
                &mut pass,
                &mut self.batchers,
                &mut self.state,
                &mut self.views,
                &mut self.debug,
                &self.events,
                screen,
            );

            for (node, request) in camera_nodes.iter().zip(requests) {
                if let Some(node) = node {
                    node.run(&mut ctx, request.camera, request.objects);
                }
            }

            ctx.interrupt_batch();
        }

        gpu.queue.submit(std::iter::once(encoder.finish()));
        output.present();

        self.debug.end_frame();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn texture_units_clamp_to_at_least_one() {
        let _ = env_logger::builder().is_test(true).try_init();
        assert_eq!(clamp_texture_units(0, 16), 1);
    }

    #[test]
    fn texture_units_clamp_to_renderer_max() {
        assert_eq!(clamp_texture_units(16 + 5, 16), 16);
        assert_eq!(clamp_texture_units(8, 16), 8);
    }

    #[test]
    fn texture_unit_listeners_are_notified() {
        let seen = Rc::new(Cell::new(0u32));
        let mut events = RenderEvents::new();
        let sink = seen.clone();
        events.on_texture_units_changed(move |units| sink.set(units));

        events.emit_texture_units_changed(4);
        assert_eq!(seen.get(), 4);
    }

    #[test]
    fn camera_listeners_observe_the_completed_camera() {
        let seen = Rc::new(Cell::new(0.0f32));
        let mut events = RenderEvents::new();
        let sink = seen.clone();
        events.on_camera_rendered(move |camera| sink.set(camera.zoom));

        let camera = Camera2d::new(100.0, 100.0).with_zoom(2.5);
        events.emit_camera_rendered(&camera);
        assert_eq!(seen.get(), 2.5);
    }
}
