use node_forge_shader_graph::draw::{DrawContext, Light};
use node_forge_shader_graph::models::{shadowed_lights, textured};
use node_forge_shader_graph::shader_model::interface::StageChannel;
use node_forge_shader_graph::shader_model::nodes::light::{
    DEPTH_TEXTURES, LIGHTS_BLOCK, SHADOW_INTERFACE, ShadowedLightFragmentNode,
    ShadowedLightVertexNode,
};
use node_forge_shader_graph::shader_model::nodes::{
    AttributeNode, CameraNode, ColorOutputNode, PositionOutputNode, Texture2dNode,
};
use node_forge_shader_graph::shader_model::{
    Attribute, BackendKind, ShaderGraphError, ShaderModel, ShaderStage,
};

use glam::{Mat4, Vec3, Vec4};

fn count_lines_containing(source: &str, needle: &str) -> usize {
    source.lines().filter(|l| l.contains(needle)).count()
}

#[test]
fn textured_channel_uses_slot_zero_on_both_sides() {
    let compiled = textured::textured_quad()
        .compile(BackendKind::Vulkan)
        .unwrap();

    let vs = compiled.vertex_source();
    let fs = compiled.fragment_source();
    assert!(vs.contains("layout(location = 0) out vec2 ifTexCoords;"), "{vs}");
    assert!(vs.contains("ifTexCoords = attrib_texture_coords;"), "{vs}");
    assert!(fs.contains("layout(location = 0) in vec2 ifTexCoords;"), "{fs}");
    assert!(fs.contains("texture(sampler2D(tColor, tColorSampler), ifTexCoords)"), "{fs}");

    assert_eq!(compiled.interface().len(), 1);
    assert_eq!(compiled.interface()[0].slot, 0);
    assert_eq!(compiled.interface_slot_count(), 1);
}

#[test]
fn light_array_channel_is_four_assignments_at_one_slot() {
    let compiled = shadowed_lights::shadowed_lights(4)
        .compile(BackendKind::Vulkan)
        .unwrap();

    let channel = compiled
        .interface()
        .iter()
        .find(|s| s.var.name == SHADOW_INTERFACE)
        .expect("light-space channel allocated");
    assert_eq!(channel.var.array_len, Some(4));

    let vs = compiled.vertex_source();
    let fs = compiled.fragment_source();
    let slot = channel.slot;
    assert!(
        vs.contains(&format!("layout(location = {slot}) out vec4 ifPosLightSpace[4];")),
        "{vs}"
    );
    assert!(
        fs.contains(&format!("layout(location = {slot}) in vec4 ifPosLightSpace[4];")),
        "{fs}"
    );
    for i in 0..4 {
        assert_eq!(
            count_lines_containing(vs, &format!("ifPosLightSpace[{i}] = lightMvp[{i}] *")),
            1,
            "{vs}"
        );
    }
    assert_eq!(count_lines_containing(vs, "ifPosLightSpace["), 5);

    // Four locations are reserved even though only one declaration exists.
    let end = compiled.interface().iter().map(|s| s.slot + s.var.location_count()).max();
    assert_eq!(end, Some(compiled.interface_slot_count()));
}

#[test]
fn light_array_source_does_not_depend_on_active_light_count() {
    let compiled = shadowed_lights::shadowed_lights(4)
        .compile(BackendKind::Vulkan)
        .unwrap();
    let lights_index = compiled
        .layout()
        .uniform_blocks
        .iter()
        .position(|b| b.name == LIGHTS_BLOCK)
        .unwrap();
    let count_offset = compiled.layout().uniform_blocks[lights_index]
        .members
        .iter()
        .find(|m| m.name == "lightCount")
        .unwrap()
        .offset as usize;

    for active in [0usize, 1, 4] {
        let lights = (0..active)
            .map(|i| {
                Light::point(Vec3::new(i as f32, 2.0, 0.0), Vec4::ONE)
                    .with_light_mvp(Mat4::IDENTITY)
            })
            .collect();
        let draw = DrawContext::default().with_lights(lights);
        let mut staging = compiled.create_staging_buffers();
        assert_eq!(compiled.update_uniforms(&draw, &mut staging), 0);

        let buffer = &staging[lights_index];
        let count = i32::from_le_bytes(buffer[count_offset..count_offset + 4].try_into().unwrap());
        assert_eq!(count, active as i32);
    }

    // Recompiling yields the same text; the light count never reaches codegen.
    let again = shadowed_lights::shadowed_lights(4)
        .compile(BackendKind::Vulkan)
        .unwrap();
    assert_eq!(again.vertex_source(), compiled.vertex_source());
    assert_eq!(again.fragment_source(), compiled.fragment_source());
}

#[test]
fn reader_expecting_a_different_array_length_fails_the_compile() {
    let mut model = ShaderModel::new("mismatch");
    let vs = model.vertex_stage();
    let positions = vs.add_node(|id| AttributeNode::new(id, Attribute::POSITIONS));
    let camera = vs.add_node(CameraNode::new);
    let writer = vs.add_node(|id| ShadowedLightVertexNode::new(id, 4));
    {
        let mut writer = writer.borrow_mut();
        writer.position = positions.borrow().output.clone();
        writer.model_matrix = Some(camera.borrow().model_matrix.clone());
    }
    let channel: StageChannel = writer.borrow().channel();

    let fs = model.fragment_stage();
    let textures = fs.add_node(|id| Texture2dNode::array(id, DEPTH_TEXTURES, 3));
    let textures = textures.borrow().output.clone();
    fs.add_node(|id| ShadowedLightFragmentNode::new(id, channel, 3, textures));

    let err = model.compile(BackendKind::Vulkan).err().expect("mismatch must fail");
    match err.root() {
        ShaderGraphError::InterfaceMismatch {
            consumer, producer, ..
        } => {
            assert_eq!(consumer.array_len, Some(3));
            assert_eq!(producer.array_len, Some(4));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn disallowed_stage_is_reported_before_any_source_exists() {
    let mut model = ShaderModel::new("wrong-stage");
    // A color output only makes sense in the fragment stage.
    model
        .vertex_stage()
        .add_node(|id| ColorOutputNode::new(id, "outColor"));
    model.vertex_stage().add_node(PositionOutputNode::new);

    let err = model.compile(BackendKind::Vulkan).err().expect("must fail");
    match &err {
        ShaderGraphError::StageNotAllowed { node, stage } => {
            assert_eq!(node, "colorOutput");
            assert_eq!(*stage, ShaderStage::VERTEX);
        }
        other => panic!("unexpected error: {other}"),
    }
    let message = err.to_string();
    assert!(message.contains("colorOutput") && message.contains("vertex"), "{message}");
}
