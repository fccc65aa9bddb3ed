//! Code generation: the per-stage emission sink handed to nodes, and the
//! section builder that joins a stage's source exactly once.

use indexmap::IndexMap;

use super::backend::ShaderBackend;
use super::binding::BindingSet;
use super::interface::InterfaceSlot;
use super::stage_graph::{AttributeBinding, ColorOutput};
use super::types::ShaderStage;

const INDENT: &str = "    ";

/// Collects what nodes emit during the emit pass of one stage.
pub struct CodeGenerator<'a> {
    backend: &'a dyn ShaderBackend,
    stage: ShaderStage,
    functions: IndexMap<String, String>,
    main: Vec<String>,
}

impl<'a> CodeGenerator<'a> {
    pub fn new(backend: &'a dyn ShaderBackend, stage: ShaderStage) -> Self {
        Self {
            backend,
            stage,
            functions: IndexMap::new(),
            main: Vec::new(),
        }
    }

    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    pub fn backend(&self) -> &'a dyn ShaderBackend {
        self.backend
    }

    /// Append statements to the main routine. Multi-line code is re-indented,
    /// so nodes can pass raw string literals.
    pub fn append_main(&mut self, code: impl AsRef<str>) {
        for line in trim_indent(code.as_ref()).lines() {
            self.main.push(line.to_string());
        }
    }

    /// Register a shared helper routine. The first body registered under a
    /// name wins; later registrations are ignored. Returns whether the body
    /// was added.
    pub fn append_function(&mut self, name: &str, body: impl AsRef<str>) -> bool {
        if self.functions.contains_key(name) {
            return false;
        }
        self.functions
            .insert(name.to_string(), trim_indent(body.as_ref()));
        true
    }

    /// Backend-specific 2D texture sample expression.
    pub fn sample_texture_2d(&self, texture: &str, coord: &str) -> String {
        self.backend
            .sample_texture_2d(&self.backend.texture_2d(texture, None), coord)
    }

    /// Sample element `index` of a 2D texture array.
    pub fn sample_texture_2d_at(&self, texture: &str, index: u32, coord: &str) -> String {
        self.backend
            .sample_texture_2d(&self.backend.texture_2d(texture, Some(index)), coord)
    }

    /// Backend-specific `ivec2` size expression of a 2D texture or of one
    /// element of a texture array.
    pub fn texture_size_2d(&self, texture: &str, index: Option<u32>, lod: &str) -> String {
        self.backend
            .texture_size_2d(&self.backend.texture_2d(texture, index), lod)
    }

    pub(crate) fn into_sections(self) -> (IndexMap<String, String>, Vec<String>) {
        (self.functions, self.main)
    }
}

/// Strip blank leading/trailing lines and the common leading whitespace.
pub fn trim_indent(code: &str) -> String {
    let lines: Vec<&str> = code.lines().collect();
    let first = lines.iter().position(|l| !l.trim().is_empty());
    let last = lines.iter().rposition(|l| !l.trim().is_empty());
    let (Some(first), Some(last)) = (first, last) else {
        return String::new();
    };
    let lines = &lines[first..=last];

    let indent = lines
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| ascii_indent(l))
        .min()
        .unwrap_or(0);

    lines
        .iter()
        .map(|l| l[ascii_indent(l).min(indent)..].trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Leading spaces and tabs in bytes. Other whitespace counts as content, so
/// the cut always lands on a char boundary.
fn ascii_indent(line: &str) -> usize {
    line.len() - line.trim_start_matches([' ', '\t']).len()
}

/// Everything a stage contributes to its final source text.
pub(crate) struct StageSections<'s> {
    pub stage: ShaderStage,
    pub attributes: &'s [AttributeBinding],
    pub inputs: &'s [InterfaceSlot],
    pub outputs: &'s [InterfaceSlot],
    pub color_outputs: &'s [ColorOutput],
    pub bindings: &'s BindingSet,
    pub functions: &'s IndexMap<String, String>,
    pub main: &'s [String],
}

/// Join the sections of one stage in their fixed order: preamble, inputs,
/// interface variables, bindings, helper routines, main.
pub(crate) fn assemble_stage(backend: &dyn ShaderBackend, s: StageSections<'_>) -> String {
    let mut sections: Vec<String> = vec![backend.preamble(s.stage)];

    let inputs: Vec<String> = s
        .attributes
        .iter()
        .map(|a| backend.vertex_input(a))
        .collect();
    push_section(&mut sections, inputs);

    let mut inputs: Vec<&InterfaceSlot> = s.inputs.iter().collect();
    inputs.sort_by_key(|i| i.slot);
    let mut interface: Vec<String> = inputs
        .into_iter()
        .map(|i| backend.interface_var(i, InterfaceDirection::In))
        .collect();
    interface.extend(
        s.outputs
            .iter()
            .map(|o| backend.interface_var(o, InterfaceDirection::Out)),
    );
    interface.extend(s.color_outputs.iter().map(|c| backend.color_output(c)));
    push_section(&mut sections, interface);

    let mut bindings: Vec<String> = s
        .bindings
        .blocks()
        .iter()
        .map(|b| backend.uniform_block(&b.layout))
        .collect();
    if !s.bindings.push_constants().is_empty() {
        let layouts: Vec<_> = s
            .bindings
            .push_constants()
            .iter()
            .map(|p| p.layout.clone())
            .collect();
        bindings.push(backend.push_constants(s.stage, &layouts));
    }
    bindings.extend(s.bindings.samplers().iter().map(|t| backend.sampler(t)));
    push_section(&mut sections, bindings);

    for body in s.functions.values() {
        sections.push(body.clone());
    }

    let mut main = String::from("void main() {\n");
    for line in s.main {
        if line.is_empty() {
            main.push('\n');
        } else {
            main.push_str(INDENT);
            main.push_str(line);
            main.push('\n');
        }
    }
    main.push('}');
    sections.push(main);

    let mut source = sections.join("\n\n");
    source.push('\n');
    source
}

fn push_section(sections: &mut Vec<String>, lines: Vec<String>) {
    if !lines.is_empty() {
        sections.push(lines.join("\n"));
    }
}

/// Direction of an interface variable relative to the stage declaring it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InterfaceDirection {
    In,
    Out,
}

impl InterfaceDirection {
    pub fn keyword(self) -> &'static str {
        match self {
            InterfaceDirection::In => "in",
            InterfaceDirection::Out => "out",
        }
    }
}
