use std::cell::RefCell;
use std::rc::Rc;

use glam::Vec2;
use node_forge_shader_graph::draw::DrawContext;
use node_forge_shader_graph::models::{ambient_occlusion, textured};
use node_forge_shader_graph::shader_model::interface::{
    StageInterfaceConsumer, StageInterfaceProducer,
};
use node_forge_shader_graph::shader_model::nodes::ao::AO_BLOCK;
use node_forge_shader_graph::shader_model::nodes::{
    AoSettings, AoSetup, AoUniformsNode, ColorOutputNode, PushConstantNode, Texture2dNode,
    Texture2dSamplerNode, UnprojectPosNode,
};
use node_forge_shader_graph::shader_model::{
    BackendKind, CodeGenerator, CompiledShader, Dependencies, GlslType, InterfaceVar, NodeId,
    NodeIo, PushConstant, Result, SetupContext, ShaderGraphError, ShaderModel, ShaderNode,
    ShaderValue, StageChannel, Uniform, UniformBlock, UpdateError,
};

type EventLog = Rc<RefCell<Vec<String>>>;

/// Float node that records its passes and optionally reads another node.
struct Recorder {
    label: &'static str,
    log: EventLog,
    helper: bool,
    input: Option<NodeIo>,
    /// Read in `generate_code` but never reported as a dependency.
    unlisted: Option<NodeIo>,
    output: NodeIo,
}

impl Recorder {
    fn new(id: NodeId, label: &'static str, log: EventLog) -> Self {
        Self {
            label,
            log,
            helper: false,
            input: None,
            unlisted: None,
            output: NodeIo::new(
                ShaderValue::computed(id.var_name(label, "out"), GlslType::Float),
                id,
            ),
        }
    }
}

impl ShaderNode for Recorder {
    fn name(&self) -> &str {
        self.label
    }

    fn declare_dependencies(&self, deps: &mut Dependencies) {
        if let Some(input) = &self.input {
            deps.depends_on(input);
        }
    }

    fn setup(&mut self, ctx: &mut SetupContext<'_>) -> Result<()> {
        self.log
            .borrow_mut()
            .push(format!("setup {} {}", ctx.stage(), self.label));
        Ok(())
    }

    fn generate_code(&self, generator: &mut CodeGenerator<'_>) -> Result<()> {
        self.log
            .borrow_mut()
            .push(format!("emit {} {}", generator.stage(), self.label));
        if self.helper {
            generator.append_function(
                "shared_bias",
                "
                float shared_bias(float v) {
                    return v + 0.5;
                }
                ",
            );
        }
        let mut value = match &self.input {
            Some(input) => format!("{} + 1.0", input.ref1f()?),
            None => "1.0".to_string(),
        };
        if let Some(unlisted) = &self.unlisted {
            value = format!("{} * {value}", unlisted.ref1f()?);
        }
        generator.append_main(format!("{} = {value};", self.output.declare()?));
        Ok(())
    }
}

fn line_of(source: &str, needle: &str) -> usize {
    source
        .lines()
        .position(|l| l.contains(needle))
        .unwrap_or_else(|| panic!("`{needle}` not found in\n{source}"))
}

#[test]
fn every_setup_runs_before_any_emit() {
    let log = EventLog::default();
    let mut model = ShaderModel::new("passes");
    for label in ["va", "vb"] {
        let log = log.clone();
        model.vertex_stage().add_node(|id| Recorder::new(id, label, log));
    }
    for label in ["fa", "fb"] {
        let log = log.clone();
        model.fragment_stage().add_node(|id| Recorder::new(id, label, log));
    }
    model.compile(BackendKind::Vulkan).unwrap();

    let events = log.borrow();
    assert_eq!(events.len(), 8);
    let last_setup = events.iter().rposition(|e| e.starts_with("setup")).unwrap();
    let first_emit = events.iter().position(|e| e.starts_with("emit")).unwrap();
    assert!(last_setup < first_emit, "{events:?}");
}

#[test]
fn dependencies_are_emitted_before_dependents_regardless_of_registration() {
    let log = EventLog::default();
    let mut model = ShaderModel::new("chain");
    let fs = model.fragment_stage();
    let a = fs.add_node(|id| Recorder::new(id, "a", log.clone()));
    let b = fs.add_node(|id| Recorder::new(id, "b", log.clone()));
    let c = fs.add_node(|id| Recorder::new(id, "c", log.clone()));
    a.borrow_mut().input = Some(b.borrow().output.clone());
    b.borrow_mut().input = Some(c.borrow().output.clone());

    let compiled = model.compile(BackendKind::Vulkan).unwrap();
    let fs = compiled.fragment_source();
    let (la, lb, lc) = (
        line_of(fs, "float a0_out"),
        line_of(fs, "float b1_out"),
        line_of(fs, "float c2_out"),
    );
    assert!(lc < lb && lb < la, "{fs}");
    assert!(fs.contains("float a0_out = b1_out + 1.0;"));
}

#[test]
fn reading_a_value_without_declaring_its_producer_fails_the_compile() {
    let log = EventLog::default();
    let mut model = ShaderModel::new("unlisted");
    let fs = model.fragment_stage();
    let reader = fs.add_node(|id| Recorder::new(id, "reader", log.clone()));
    let producer = fs.add_node(|id| Recorder::new(id, "producer", log.clone()));
    reader.borrow_mut().unlisted = Some(producer.borrow().output.clone());

    let err = model
        .compile(BackendKind::Vulkan)
        .err()
        .expect("read before declaration must fail");
    match err.root() {
        ShaderGraphError::ReadBeforeDeclaration { value } => assert_eq!(value, "producer1_out"),
        other => panic!("unexpected error: {other}"),
    }
    let message = err.to_string();
    assert!(message.contains("reader") && message.contains("fragment"), "{message}");
    assert!(!log.borrow().iter().any(|e| e == "emit fragment producer"));
}

#[test]
fn declaring_the_producer_fixes_the_same_wiring() {
    let log = EventLog::default();
    let mut model = ShaderModel::new("listed");
    let fs = model.fragment_stage();
    let reader = fs.add_node(|id| Recorder::new(id, "reader", log.clone()));
    let producer = fs.add_node(|id| Recorder::new(id, "producer", log.clone()));
    reader.borrow_mut().input = Some(producer.borrow().output.clone());

    let compiled = model.compile(BackendKind::Vulkan).unwrap();
    let fs = compiled.fragment_source();
    assert!(
        line_of(fs, "float producer1_out = 1.0;")
            < line_of(fs, "float reader0_out = producer1_out + 1.0;"),
        "{fs}"
    );
}

#[test]
fn cyclic_wiring_is_rejected() {
    let log = EventLog::default();
    let mut model = ShaderModel::new("cycle");
    let fs = model.fragment_stage();
    let a = fs.add_node(|id| Recorder::new(id, "a", log.clone()));
    let b = fs.add_node(|id| Recorder::new(id, "b", log.clone()));
    a.borrow_mut().input = Some(b.borrow().output.clone());
    b.borrow_mut().input = Some(a.borrow().output.clone());

    let err = model.compile(BackendKind::Vulkan).err().unwrap();
    assert!(matches!(err, ShaderGraphError::DependencyCycle { .. }), "{err}");
    assert!(log.borrow().is_empty());
}

#[test]
fn values_do_not_cross_stages_without_an_interface() {
    let log = EventLog::default();
    let mut model = ShaderModel::new("cross");
    let v = model
        .vertex_stage()
        .add_node(|id| Recorder::new(id, "v", log.clone()));
    let f = model
        .fragment_stage()
        .add_node(|id| Recorder::new(id, "f", log.clone()));
    f.borrow_mut().input = Some(v.borrow().output.clone());

    let err = model.compile(BackendKind::Vulkan).err().unwrap();
    assert!(matches!(err, ShaderGraphError::CrossStageDependency { .. }), "{err}");
}

#[test]
fn shared_helper_routine_is_defined_once() {
    let log = EventLog::default();
    let mut model = ShaderModel::new("helpers");
    let fs = model.fragment_stage();
    for label in ["x", "y"] {
        let node = fs.add_node(|id| Recorder::new(id, label, log.clone()));
        node.borrow_mut().helper = true;
    }
    let texture = fs.add_node(|id| Texture2dNode::new(id, "tAlbedo"));
    for _ in 0..2 {
        let texture = texture.borrow().output.clone();
        fs.add_node(|id| Texture2dSamplerNode::new(id, texture, true));
    }

    let compiled = model.compile(BackendKind::Vulkan).unwrap();
    let fs = compiled.fragment_source();
    assert_eq!(fs.matches("float shared_bias(float v) {").count(), 1, "{fs}");
    assert_eq!(fs.matches("vec4 premultiplyAlpha(vec4 color) {").count(), 1, "{fs}");
    assert_eq!(fs.matches("premultiplyAlpha(texture(sampler2D(tAlbedo, tAlbedoSampler)").count(), 2, "{fs}");
}

/// Registers a three-member block and writes it in the given order.
struct BlockNode {
    write_order: [usize; 3],
}

impl ShaderNode for BlockNode {
    fn name(&self) -> &str {
        "block"
    }

    fn setup(&mut self, ctx: &mut SetupContext<'_>) -> Result<()> {
        let members = [
            Uniform::float("uFirst"),
            Uniform::vec2("uSecond"),
            Uniform::int("uThird"),
        ];
        let order = self.write_order;
        let written = members.clone();
        let block = UniformBlock::new("Ordered")
            .member(&members[0])
            .member(&members[1])
            .member(&members[2])
            .on_update(move |_, w| {
                for i in order {
                    match i {
                        0 => w.set_float(&written[0], 1.0)?,
                        1 => w.set_vec2(&written[1], Vec2::new(2.0, 3.0))?,
                        _ => w.set_int(&written[2], 4)?,
                    }
                }
                Ok(())
            });
        ctx.add_uniform_block(block)?;
        Ok(())
    }
}

#[test]
fn block_member_order_is_registration_order_and_write_order() {
    let mut model = ShaderModel::new("ordered");
    model
        .fragment_stage()
        .add_node(|_| BlockNode { write_order: [0, 1, 2] });
    let compiled = model.compile(BackendKind::Vulkan).unwrap();

    let block = &compiled.layout().uniform_blocks[0];
    let names: Vec<&str> = block.members.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, ["uFirst", "uSecond", "uThird"]);

    let fs = compiled.fragment_source();
    let (l1, l2, l3) = (
        line_of(fs, "float uFirst;"),
        line_of(fs, "vec2 uSecond;"),
        line_of(fs, "int uThird;"),
    );
    assert!(l1 < l2 && l2 < l3, "{fs}");

    let mut staging = compiled.create_staging_buffers();
    compiled
        .update_block(0, &DrawContext::default(), &mut staging[0])
        .unwrap();
    assert_eq!(&staging[0][0..4], &1.0f32.to_le_bytes());
    assert_eq!(&staging[0][16..20], &4i32.to_le_bytes());
}

#[test]
fn out_of_order_update_routine_fails_the_compile() {
    let mut model = ShaderModel::new("unordered");
    model
        .fragment_stage()
        .add_node(|_| BlockNode { write_order: [0, 2, 1] });
    let err = model.compile(BackendKind::Vulkan).err().unwrap();
    match err {
        ShaderGraphError::UpdateContract { block, source } => {
            assert_eq!(block, "Ordered");
            assert!(matches!(source, UpdateError::OutOfOrder { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
}

fn read_f32(buffer: &[u8], offset: u32) -> f32 {
    let o = offset as usize;
    f32::from_le_bytes(buffer[o..o + 4].try_into().unwrap())
}

#[test]
fn conditional_member_is_dropped_from_declaration_and_writes() {
    let forward = ambient_occlusion::ambient_occlusion(AoSetup::Forward, AoSettings::default())
        .compile(BackendKind::Vulkan)
        .unwrap();
    let deferred = ambient_occlusion::ambient_occlusion(AoSetup::Deferred, AoSettings::default())
        .compile(BackendKind::Vulkan)
        .unwrap();

    let block_of = |c: &CompiledShader| {
        let index = c
            .layout()
            .uniform_blocks
            .iter()
            .position(|b| b.name == AO_BLOCK)
            .unwrap();
        (index, c.layout().uniform_blocks[index].clone())
    };
    let (fi, fwd) = block_of(&forward);
    let (di, def) = block_of(&deferred);

    let fwd_names: Vec<&str> = fwd.members.iter().map(|m| m.name.as_str()).collect();
    let def_names: Vec<&str> = def.members.iter().map(|m| m.name.as_str()).collect();
    let expected: Vec<&str> = fwd_names.iter().copied().filter(|n| *n != "uInvProj").collect();
    assert_eq!(fwd_names.len(), def_names.len() + 1);
    assert_eq!(def_names, expected);
    assert!(forward.fragment_source().contains("mat4 uInvProj;"));
    assert!(!deferred.fragment_source().contains("uInvProj"));

    // The remaining members receive the same values in both variants.
    let draw = DrawContext::default();
    let mut fwd_buf = Vec::new();
    let mut def_buf = Vec::new();
    forward.update_block(fi, &draw, &mut fwd_buf).unwrap();
    deferred.update_block(di, &draw, &mut def_buf).unwrap();
    for (name, value) in [("uRadius", 1.0), ("uStrength", 1.25), ("uPower", 1.5), ("uBias", 0.05)] {
        let f = fwd.members.iter().find(|m| m.name == name).unwrap();
        let d = def.members.iter().find(|m| m.name == name).unwrap();
        assert_eq!(read_f32(&fwd_buf, f.offset), value, "{name}");
        assert_eq!(read_f32(&def_buf, d.offset), value, "{name}");
    }
}

#[test]
fn unprojection_requires_the_inverse_projection_member() {
    let mut model = ShaderModel::new("no-inverse");
    let fs = model.fragment_stage();
    let uniforms = fs.add_node(|id| AoUniformsNode::new(id, false, AoSettings::default()));
    let handles = uniforms.borrow().handles.clone();
    fs.add_node(|id| UnprojectPosNode::new(id, handles));

    let err = model.compile(BackendKind::Vulkan).err().unwrap();
    match err.root() {
        ShaderGraphError::UnconnectedInput { input } => assert_eq!(input, "uInvProj"),
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("unprojectPos"), "{err}");
}

/// Registers two different contracts at the same input slot.
struct ConflictingInputs;

impl ShaderNode for ConflictingInputs {
    fn name(&self) -> &str {
        "conflictingInputs"
    }

    fn setup(&mut self, ctx: &mut SetupContext<'_>) -> Result<()> {
        ctx.register_input(0, InterfaceVar::new("ifA", GlslType::Vec2F))?;
        ctx.register_input(0, InterfaceVar::new("ifA", GlslType::Vec3F))
    }
}

#[test]
fn one_slot_with_two_contracts_fails_before_emission() {
    let mut model = ShaderModel::new("conflict");
    model.fragment_stage().add_node(|_| ConflictingInputs);
    let err = model.compile(BackendKind::Vulkan).err().unwrap();
    match err.root() {
        ShaderGraphError::DuplicateInterfaceSlot { slot, .. } => assert_eq!(*slot, 0),
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("conflictingInputs"));
}

#[test]
fn two_readers_of_one_channel_share_its_slot() {
    let mut model = ShaderModel::new("two-readers");
    let channel = StageChannel::new(InterfaceVar::new("ifUv", GlslType::Vec2F));
    let uv: NodeIo = ShaderValue::const_vec2(Vec2::new(0.25, 0.75)).into();
    {
        let channel = channel.clone();
        model
            .vertex_stage()
            .add_node(|id| StageInterfaceProducer::new(id, channel, uv));
    }
    let fs = model.fragment_stage();
    for _ in 0..2 {
        let channel = channel.clone();
        fs.add_node(|id| StageInterfaceConsumer::new(id, channel));
    }
    let reader = fs.add_node(|id| {
        let expected = InterfaceVar::new("ifUv", GlslType::Vec2F);
        StageInterfaceConsumer::with_contract(id, channel, expected)
    });
    let out = fs.add_node(|id| ColorOutputNode::new(id, "outColor"));
    out.borrow_mut().input = reader.borrow().output.clone();

    let compiled = model.compile(BackendKind::Vulkan).unwrap();
    let fs = compiled.fragment_source();
    assert_eq!(fs.matches("in vec2 ifUv;").count(), 1, "{fs}");
    assert!(compiled.vertex_source().contains("ifUv = vec2(0.25, 0.75);"));
    assert!(fs.contains("outColor = vec4(ifUv, 0.0, 1.0);"), "{fs}");
}

#[test]
fn backends_differ_only_in_formatting() {
    let vulkan = textured::textured_quad().compile(BackendKind::Vulkan).unwrap();
    let gl = textured::textured_quad().compile(BackendKind::OpenGl).unwrap();
    let web = textured::textured_quad().compile(BackendKind::WebGl2).unwrap();

    assert!(vulkan.vertex_source().starts_with("#version 450\n"));
    assert!(
        vulkan
            .vertex_source()
            .contains("layout(std140, set = 0, binding = 0) uniform CameraUniforms {")
    );
    assert!(
        vulkan
            .fragment_source()
            .contains("layout(set = 0, binding = 1) uniform texture2D tColor;")
    );
    assert!(
        vulkan
            .fragment_source()
            .contains("layout(set = 0, binding = 2) uniform sampler tColorSampler;")
    );

    assert!(gl.vertex_source().starts_with("#version 410 core\n"));
    assert!(gl.vertex_source().contains("layout(std140) uniform CameraUniforms {"));
    assert!(gl.vertex_source().contains("layout(location = 0) out vec2 ifTexCoords;"));
    assert!(gl.fragment_source().contains("\nuniform sampler2D tColor;"));

    assert!(web.vertex_source().starts_with("#version 300 es\nprecision highp float;"));
    assert!(web.vertex_source().contains("\nout vec2 ifTexCoords;"));
    assert!(web.fragment_source().contains("\nin vec2 ifTexCoords;"));

    // Same layout and interface everywhere.
    assert_eq!(vulkan.layout(), gl.layout());
    assert_eq!(vulkan.layout(), web.layout());
    assert_eq!(vulkan.interface(), web.interface());
}

#[test]
fn push_constants_lower_to_block_or_uniforms() {
    let build = || {
        let mut model = ShaderModel::new("push");
        let fs = model.fragment_stage();
        let exposure = fs.add_node(|id| PushConstantNode::new(id, PushConstant::float("uExposure", 1.5)));
        let out = fs.add_node(|id| ColorOutputNode::new(id, "outColor"));
        out.borrow_mut().input = exposure.borrow().output.clone();
        let cell = exposure.borrow().push_constant().clone();
        (model, cell)
    };

    let (model, exposure) = build();
    let vulkan = model.compile(BackendKind::Vulkan).unwrap();
    assert!(vulkan.fragment_source().contains(
        "layout(push_constant) uniform FragmentPushConstants {\n    layout(offset = 0) float uExposure;\n};"
    ));
    assert!(vulkan.fragment_source().contains("outColor = vec4(vec3(uExposure), 1.0);"));

    let mut bytes = Vec::new();
    vulkan.encode_push_constants(&mut bytes);
    assert_eq!(bytes, 1.5f32.to_le_bytes());
    exposure.set_f32(0.5);
    vulkan.encode_push_constants(&mut bytes);
    assert_eq!(bytes, 0.5f32.to_le_bytes());

    let (model, _) = build();
    let gl = model.compile(BackendKind::OpenGl).unwrap();
    assert!(gl.fragment_source().contains("\nuniform float uExposure;"));
}
