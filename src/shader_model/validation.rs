//! GLSL validation of generated Vulkan sources using naga.

use anyhow::{Context, Result, anyhow};

use super::types::ShaderStage;

fn naga_stage(stage: ShaderStage) -> Result<naga::ShaderStage> {
    if stage == ShaderStage::VERTEX {
        Ok(naga::ShaderStage::Vertex)
    } else if stage == ShaderStage::FRAGMENT {
        Ok(naga::ShaderStage::Fragment)
    } else {
        Err(anyhow!("cannot validate a {stage} stage mask as one shader"))
    }
}

/// Parse and validate Vulkan-flavoured GLSL with naga's GLSL frontend.
///
/// Returns the module and its validation info on success, or an error with a
/// numbered listing of the source on failure.
pub fn validate_glsl(source: &str, stage: ShaderStage) -> Result<(naga::Module, naga::valid::ModuleInfo)> {
    let mut frontend = naga::front::glsl::Frontend::default();
    let options = naga::front::glsl::Options {
        stage: naga_stage(stage)?,
        defines: Default::default(),
    };

    let module = frontend
        .parse(&options, source)
        .map_err(|e| anyhow!("GLSL parse failed: {e:?}\n{}", numbered(source)))?;

    let info = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    )
    .validate(&module)
    .map_err(|e| anyhow!("GLSL validation failed: {e:?}\n{}", numbered(source)))?;

    Ok((module, info))
}

/// Validate and add context naming what produced the source.
pub fn validate_glsl_with_context(source: &str, stage: ShaderStage, context: &str) -> Result<()> {
    validate_glsl(source, stage)
        .map(|_| ())
        .with_context(|| format!("{context} generated invalid {stage} GLSL"))
}

/// Translate validated GLSL to WGSL.
pub fn glsl_to_wgsl(source: &str, stage: ShaderStage) -> Result<String> {
    let (module, info) = validate_glsl(source, stage)?;
    naga::back::wgsl::write_string(&module, &info, naga::back::wgsl::WriterFlags::EXPLICIT_TYPES)
        .map_err(|e| anyhow!("WGSL writer failed: {e:?}"))
}

fn numbered(source: &str) -> String {
    let mut output = String::from("---\n");
    for (line_num, line) in source.lines().enumerate() {
        output.push_str(&format!("{:4} | {}\n", line_num + 1, line));
    }
    output.push_str("---");
    output
}
