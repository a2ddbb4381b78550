//! C++ compile rule

use async_trait::async_trait;
use kiln_core::config::CppRule;
use kiln_core::Os;
use kiln_tasks::{ConfigError, Engine, ProcessRunner, TargetId, Task, TaskAction, TaskError, Tracked};

use crate::{depfile, ensure_parent, normalize_posix, Platform};

/// Output paths of one compilation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOutputs {
    pub object: String,
    pub depfile: String,
}

/// Object and dependency file paths for a source.
///
/// Without an explicit base, the source's extension is replaced and the
/// toolchain's object prefix is prepended.
pub fn outputs(platform: &Platform, source: &str, object_base: Option<&str>) -> CompileOutputs {
    let base = match object_base {
        Some(base) => base.to_string(),
        None => normalize_posix(&format!(
            "{}{}",
            platform.toolchain.obj_prefix,
            strip_extension(source)
        )),
    };

    CompileOutputs {
        object: format!("{}{}", base, platform.toolchain.obj_suffix),
        depfile: format!("{}.d", base),
    }
}

fn strip_extension(path: &str) -> &str {
    let name_start = path.rfind(|c: char| c == '/' || c == '\\').map_or(0, |i| i + 1);
    match path[name_start..].rfind('.') {
        Some(dot) if dot > 0 => &path[..name_start + dot],
        _ => path,
    }
}

/// Full compiler invocation, including dependency output flags
pub fn compile_command(platform: &Platform, source: &str, outputs: &CompileOutputs) -> Vec<String> {
    let toolchain = &platform.toolchain;
    let mut command: Vec<String> = toolchain
        .cpp
        .iter()
        .chain(&toolchain.cpp_flags)
        .cloned()
        .collect();

    match platform.os {
        Os::Linux | Os::MacOs => command.extend([
            "-MD".to_string(),
            "-MT".to_string(),
            "x ".to_string(),
            "-MF".to_string(),
            outputs.depfile.clone(),
            "-c".to_string(),
            "-o".to_string(),
            outputs.object.clone(),
            source.to_string(),
        ]),
        Os::Windows => command.extend([
            "/c".to_string(),
            format!("/Fo{}", outputs.object),
            "/sourceDependencies".to_string(),
            outputs.depfile.clone(),
            "/Tp".to_string(),
            source.to_string(),
        ]),
    }
    command
}

/// Compiles one source; tracks the prerequisites the compiler reports
#[derive(Debug, Clone)]
pub struct CompileAction {
    command: Vec<String>,
    label: String,
    outputs: CompileOutputs,
    os: Os,
}

#[async_trait]
impl TaskAction for CompileAction {
    async fn run(&self, runner: ProcessRunner) -> Result<(), TaskError> {
        ensure_parent(&self.outputs.object).await?;
        ensure_parent(&self.outputs.depfile).await?;

        let label = format!("{}: compile + prerequisites", self.label);
        let outputs = self.outputs.clone();
        let os = self.os;
        runner
            .run(&self.command, &label, move || async move {
                let read = depfile::load(&outputs.depfile, os).await?;
                Ok::<_, TaskError>(Tracked::new(read, [outputs.object, outputs.depfile]))
            })
            .await
    }
}

/// Register a task compiling `rule.source`; returns the object target
pub fn register(
    engine: &mut Engine,
    platform: &Platform,
    rule: &CppRule,
) -> Result<TargetId, ConfigError> {
    let outputs = outputs(platform, &rule.source, rule.object.as_deref());
    let command = compile_command(platform, &rule.source, &outputs);
    let label = format!("CPP {}", outputs.object);

    let task = Task::new(
        outputs.object.as_str(),
        label.clone(),
        CompileAction {
            command,
            label,
            outputs: outputs.clone(),
            os: platform.os,
        },
    )
    .with_dependency(rule.source.as_str())
    .with_dependencies(rule.depends.iter().map(String::as_str));

    engine.register(task)
}
