use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use node_forge_shader_graph::{
    config::{self, CompileConfig},
    models::ModelKind,
    shader_model::{BackendKind, CompiledShader, ShaderStage, validation},
};

#[derive(Debug, Default, Clone)]
struct Cli {
    model: Option<ModelKind>,
    backend: Option<BackendKind>,
    config: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    validate: bool,
}

fn parse_cli(args: &[String]) -> Result<Cli> {
    let mut cli = Cli::default();
    let mut i = 0;
    while i < args.len() {
        let value = |flag: &str| {
            args.get(i + 1)
                .ok_or_else(|| anyhow!("missing value for {flag}"))
        };
        match args[i].as_str() {
            "--model" => {
                cli.model = Some(value("--model")?.parse()?);
                i += 2;
            }
            "--backend" => {
                cli.backend = Some(value("--backend")?.parse().map_err(|e: String| anyhow!(e))?);
                i += 2;
            }
            "--config" => {
                cli.config = Some(PathBuf::from(value("--config")?));
                i += 2;
            }
            "--outputdir" | "--output-dir" => {
                cli.output_dir = Some(PathBuf::from(value("--output-dir")?));
                i += 2;
            }
            "--validate" => {
                cli.validate = true;
                i += 1;
            }
            other => {
                return Err(anyhow!(
                    "unknown argument: {other} (supported: --model <name>, --backend <vulkan|opengl|webgl2>, --config <file.json>, --output-dir <dir>, --validate)"
                ));
            }
        }
    }
    Ok(cli)
}

fn write_outputs(compiled: &CompiledShader, output_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create output dir {}", output_dir.display()))?;

    let write = |ext: &str, contents: &str| -> Result<()> {
        let path = output_dir.join(format!("{}.{ext}", compiled.name()));
        std::fs::write(&path, contents)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("[shaderc] wrote: {}", path.display());
        Ok(())
    };
    write("vert", compiled.vertex_source())?;
    write("frag", compiled.fragment_source())?;
    let manifest = serde_json::to_string_pretty(&compiled.manifest())
        .context("failed to serialize binding layout")?;
    write("layout.json", &manifest)
}

fn validate(compiled: &CompiledShader) -> Result<()> {
    if compiled.backend() != BackendKind::Vulkan {
        log::warn!(
            "--validate only checks Vulkan GLSL; skipping {} sources",
            compiled.backend()
        );
        return Ok(());
    }
    for stage in [ShaderStage::VERTEX, ShaderStage::FRAGMENT] {
        validation::validate_glsl(compiled.source(stage), stage)
            .with_context(|| format!("{} {} shader failed validation", compiled.name(), stage))?;
    }
    log::info!("{}: naga validation passed", compiled.name());
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let argv: Vec<String> = std::env::args().skip(1).collect();
    let cli = parse_cli(&argv)?;

    let mut config = match cli.config.as_deref() {
        Some(path) => config::load_config_from_path(path)?,
        None => CompileConfig::default(),
    };
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }
    config.validate |= cli.validate;

    let kind = cli
        .model
        .ok_or_else(|| anyhow!("--model is required (e.g. --model textured)"))?;
    let compiled = kind
        .build(&config)
        .compile(config.backend)
        .with_context(|| format!("failed to compile model '{kind}'"))?;

    if config.validate {
        validate(&compiled)?;
    }

    match cli.output_dir.as_deref() {
        Some(dir) => write_outputs(&compiled, dir)?,
        None => {
            println!("// {}.vert\n{}", compiled.name(), compiled.vertex_source());
            println!("// {}.frag\n{}", compiled.name(), compiled.fragment_source());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_cli_model_backend_outputdir() {
        let args: Vec<String> = [
            "--model",
            "shadowed-lights",
            "--backend",
            "webgl2",
            "--outputdir",
            "out",
            "--validate",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        let cli = parse_cli(&args).unwrap();
        assert_eq!(cli.model, Some(ModelKind::ShadowedLights));
        assert_eq!(cli.backend, Some(BackendKind::WebGl2));
        assert_eq!(cli.output_dir.as_ref().unwrap(), &PathBuf::from("out"));
        assert!(cli.validate);
    }

    #[test]
    fn parse_cli_rejects_missing_value_and_unknown_flag() {
        assert!(parse_cli(&["--model".to_string()]).is_err());
        assert!(parse_cli(&["--headless".to_string()]).is_err());
    }
}
