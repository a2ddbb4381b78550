//! Link rule

use async_trait::async_trait;
use kiln_core::config::LinkRule;
use kiln_core::Os;
use kiln_tasks::{ConfigError, Engine, ProcessRunner, TargetId, Task, TaskAction, TaskError, Tracked};

use crate::{ensure_parent, Platform};

/// Executable path for a base name
pub fn executable(platform: &Platform, output: &str) -> String {
    format!("{}{}", output, platform.toolchain.exe_suffix)
}

/// Full linker invocation
pub fn link_command(platform: &Platform, objects: &[String], exe: &str) -> Vec<String> {
    let toolchain = &platform.toolchain;
    let mut command = toolchain.link.clone();

    match platform.os {
        Os::Linux | Os::MacOs => {
            command.push("-o".to_string());
            command.push(exe.to_string());
        }
        Os::Windows => command.push(format!("/out:{}", exe)),
    }
    command.extend(objects.iter().cloned());
    command.extend(toolchain.link_libs.iter().cloned());
    command
}

/// Links objects into an executable
#[derive(Debug, Clone)]
pub struct LinkAction {
    command: Vec<String>,
    label: String,
    objects: Vec<String>,
    exe: String,
}

#[async_trait]
impl TaskAction for LinkAction {
    async fn run(&self, runner: ProcessRunner) -> Result<(), TaskError> {
        ensure_parent(&self.exe).await?;

        let label = format!("{}: link", self.label);
        let tracked = Tracked::new(self.objects.clone(), [self.exe.clone()]);
        runner
            .run(&self.command, &label, move || async move { Ok(tracked) })
            .await
    }
}

/// Register a task linking `rule.objects`; returns the executable target
pub fn register(
    engine: &mut Engine,
    platform: &Platform,
    rule: &LinkRule,
) -> Result<TargetId, ConfigError> {
    let exe = executable(platform, &rule.output);
    let command = link_command(platform, &rule.objects, &exe);
    let label = format!("LINK {}", exe);

    let task = Task::new(
        exe.as_str(),
        label.clone(),
        LinkAction {
            command,
            label,
            objects: rule.objects.clone(),
            exe: exe.clone(),
        },
    )
    .with_dependencies(rule.objects.iter().chain(&rule.depends).map(String::as_str));

    engine.register(task)
}
