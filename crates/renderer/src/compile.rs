use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::process::Command;

use wgpu::naga::ShaderStage;

use crate::error::CompileError;

/// A compiled user shader: one SPIR-V module holding every pass entry point.
#[derive(Debug, Clone)]
pub struct ShaderProgram {
    pub spirv: Vec<u8>,
    /// Fragment entry points in pass order (`pass0`, `pass1`, ...).
    pub passes: Vec<String>,
    /// Warnings the compiler printed on success.
    pub warnings: String,
}

impl ShaderProgram {
    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }
}

pub trait ShaderCompiler: Send + Sync {
    fn compile(&self, source_path: &Path, source: &str) -> Result<ShaderProgram, CompileError>;
}

pub type BoxedShaderCompiler = Box<dyn ShaderCompiler + Send + Sync>;

/// Runs an external compiler that writes a SPIR-V module.
///
/// Arguments may contain `{input}` (the preprocessed source, written to a
/// scratch file named like the original) and `{output}` (where the module must
/// be written).
#[derive(Debug, Clone)]
pub struct ShellCompiler {
    program: String,
    args: Vec<String>,
}

impl ShellCompiler {
    pub const DEFAULT_PROGRAM: &'static str = "slangc";

    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn default_args() -> Vec<String> {
        ["{input}", "-target", "spirv", "-o", "{output}"]
            .iter()
            .map(|arg| arg.to_string())
            .collect()
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn expand_args(&self, input: &Path, output: &Path) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{input}", &input.to_string_lossy())
                    .replace("{output}", &output.to_string_lossy())
            })
            .collect()
    }
}

impl Default for ShellCompiler {
    fn default() -> Self {
        Self::new(Self::DEFAULT_PROGRAM, Self::default_args())
    }
}

impl ShaderCompiler for ShellCompiler {
    fn compile(&self, source_path: &Path, source: &str) -> Result<ShaderProgram, CompileError> {
        let scratch = tempfile::Builder::new().prefix("shadelive-").tempdir()?;
        let file_name = source_path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_else(|| "shader.slang".into());
        let input = scratch.path().join(file_name);
        let output = scratch.path().join("shader.spv");
        fs::write(&input, source)?;

        let args = self.expand_args(&input, &output);
        let mut command = Command::new(&self.program);
        command.args(&args);
        if let Some(dir) = source_path.parent().filter(|dir| dir.is_dir()) {
            command.current_dir(dir);
        }
        tracing::debug!(program = %self.program, ?args, "running shader compiler");

        let result = command.output().map_err(|source| CompileError::Spawn {
            program: self.program.clone(),
            source,
        })?;
        let mut diagnostics = String::from_utf8_lossy(&result.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&result.stderr);
        if !stderr.trim().is_empty() {
            if !diagnostics.is_empty() {
                diagnostics.push('\n');
            }
            diagnostics.push_str(stderr.trim());
        }

        if !result.status.success() {
            if diagnostics.is_empty() {
                diagnostics = format!("`{}` exited with {}", self.program, result.status);
            }
            return Err(CompileError::Diagnostics { diagnostics });
        }

        let spirv = fs::read(&output)?;
        let passes = pass_entry_points(&fragment_entry_points(&spirv)?)?;
        tracing::debug!(
            shader = %source_path.display(),
            passes = passes.len(),
            bytes = spirv.len(),
            "compiled shader"
        );
        Ok(ShaderProgram {
            spirv,
            passes,
            warnings: diagnostics,
        })
    }
}

/// Names of every fragment-stage entry point in a SPIR-V module.
pub fn fragment_entry_points(spirv: &[u8]) -> Result<Vec<String>, CompileError> {
    let options = wgpu::naga::front::spv::Options::default();
    let module = wgpu::naga::front::spv::parse_u8_slice(spirv, &options)
        .map_err(|err| CompileError::InvalidModule(err.to_string()))?;
    Ok(module
        .entry_points
        .iter()
        .filter(|entry| entry.stage == ShaderStage::Fragment)
        .map(|entry| entry.name.clone())
        .collect())
}

/// Orders `passN` entry points and keeps the run contiguous from zero; passes
/// above the first missing index are ignored.
pub fn pass_entry_points(names: &[String]) -> Result<Vec<String>, CompileError> {
    let mut passes = BTreeMap::new();
    for name in names {
        match name.strip_prefix("pass").and_then(|n| n.parse::<usize>().ok()) {
            Some(index) => {
                passes.insert(index, name.clone());
            }
            None => tracing::debug!(entry_point = %name, "ignoring non-pass fragment entry point"),
        }
    }
    let mut ordered = Vec::with_capacity(passes.len());
    while let Some(name) = passes.remove(&ordered.len()) {
        ordered.push(name);
    }
    if ordered.is_empty() {
        return Err(CompileError::NoPasses);
    }
    if !passes.is_empty() {
        let ignored: Vec<String> = passes.into_values().collect();
        tracing::warn!(
            missing = %format!("pass{}", ordered.len()),
            ignored = ?ignored,
            "ignoring pass entry points after a gap"
        );
    }
    Ok(ordered)
}

pub(crate) fn compile_vertex_shader(device: &wgpu::Device) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("fullscreen triangle vertex"),
        source: wgpu::ShaderSource::Glsl {
            shader: Cow::Borrowed(VERTEX_SHADER_GLSL),
            stage: ShaderStage::Vertex,
            defines: &[],
        },
    })
}

pub(crate) fn compile_present_shader(device: &wgpu::Device) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("present fragment"),
        source: wgpu::ShaderSource::Glsl {
            shader: Cow::Borrowed(PRESENT_SHADER_GLSL),
            stage: ShaderStage::Fragment,
            defines: &[],
        },
    })
}

/// Minimal full-screen triangle vertex shader.
const VERTEX_SHADER_GLSL: &str = r"#version 450
layout(location = 0) out vec2 v_uv;

const vec2 positions[3] = vec2[3](
    vec2(-1.0, -3.0),
    vec2(3.0, 1.0),
    vec2(-1.0, 1.0)
);

void main() {
    uint vertex_index = uint(gl_VertexIndex);
    vec2 pos = positions[vertex_index];
    v_uv = pos * 0.5 + vec2(0.5, 0.5);
    gl_Position = vec4(pos, 0.0, 1.0);
}
";

/// Copies the last pass target to the surface.
const PRESENT_SHADER_GLSL: &str = r"#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 outColor;

layout(set = 1, binding = 0) uniform sampler present_sampler;
layout(set = 1, binding = 1) uniform texture2D present_source;

void main() {
    outColor = texture(sampler2D(present_source, present_sampler), vec2(v_uv.x, 1.0 - v_uv.y));
}
";
