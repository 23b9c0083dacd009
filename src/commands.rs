use anyhow::{Context, Result, bail};
use chrono::Local;

use kdev_browser::{CacheKey, Completion, Controller, CopyDirection, Presenter, first_match};

use crate::config::KdevConfig;
use crate::{Command, ListArgs, PodArgs};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Mirrors kubectl activity to stderr
pub struct ActivityLog;

impl Presenter for ActivityLog {
    fn on_complete(&self, completion: Completion) {
        if let Completion::Failed { operation, error } = &completion {
            tracing::debug!(%operation, %error, "operation failed");
        }
    }

    fn on_activity(&self, line: &str) {
        eprintln!("{} {line}", Local::now().format(TIMESTAMP_FORMAT));
    }
}

pub async fn run(controller: &Controller, config: &KdevConfig, command: Command) -> Result<()> {
    match command {
        Command::Contexts(list) => print_listing(controller, CacheKey::Contexts, list).await,
        Command::Namespaces { context, list } => {
            print_listing(controller, CacheKey::namespaces(context), list).await
        }
        Command::Pods {
            context,
            namespace,
            list,
        } => print_listing(controller, CacheKey::pods(context, namespace), list).await,
        Command::Use { context, namespace } => {
            controller.select_context(&context)?.await?;
            if let Some(namespace) = namespace {
                controller.select_namespace(&namespace)?.await?;
            }
            println!("{}", controller.status());
            Ok(())
        }
        Command::Containers(target) => {
            select(controller, &target).await?;
            for name in controller.containers()?.await? {
                println!("{name}");
            }
            Ok(())
        }
        Command::Logs {
            target,
            container,
            tail,
        } => {
            select(controller, &target).await?;
            let logs = controller
                .get_logs(container, tail.unwrap_or(config.log_tail))?
                .await?;
            println!("{}", logs.text);
            Ok(())
        }
        Command::Describe(target) => {
            select(controller, &target).await?;
            print!("{}", controller.describe_pod()?.await?.render());
            Ok(())
        }
        Command::Delete(target) => {
            select(controller, &target).await?;
            let remaining = controller.delete_pod()?.await?;
            eprintln!("pod {} deleted", target.pod);
            for pod in remaining {
                println!("{pod}");
            }
            Ok(())
        }
        Command::Exec(target) => {
            select(controller, &target).await?;
            let shell = controller.exec_shell()?;
            let status = shell
                .to_command()
                .status()
                .await
                .with_context(|| format!("failed to run {}", shell.command_line()))?;
            if !status.success() {
                bail!("shell exited with {status}");
            }
            Ok(())
        }
        Command::PortForward { target, mapping } => {
            select(controller, &target).await?;
            let forward = controller.port_forward(mapping)?;
            eprintln!("forwarding {mapping} to {}, press Ctrl-C to stop", forward.pod());

            tokio::select! {
                result = forward.wait() => result?,
                _ = tokio::signal::ctrl_c() => {}
            }
            Ok(())
        }
        Command::Upload {
            target,
            local,
            remote,
        } => {
            select(controller, &target).await?;
            let remote = remote.unwrap_or_else(|| config.upload_target(&local));
            controller
                .copy_file(CopyDirection::Upload, local.clone(), remote.clone())?
                .await?;
            eprintln!("uploaded {} to {}:{remote}", local.display(), target.pod);
            Ok(())
        }
        Command::Download {
            target,
            remote,
            local,
        } => {
            select(controller, &target).await?;
            let local = local.unwrap_or_else(|| config.download_target(&remote, Local::now().date_naive()));
            controller
                .copy_file(CopyDirection::Download, local.clone(), remote.clone())?
                .await?;
            eprintln!("downloaded {}:{remote} to {}", target.pod, local.display());
            Ok(())
        }
        Command::Invalidate { key } => {
            controller.cache().invalidate(&key.to_string())?;
            Ok(())
        }
        // Answered before the cache is opened
        Command::CachePath => Ok(()),
    }
}

async fn print_listing(controller: &Controller, key: CacheKey, list: ListArgs) -> Result<()> {
    let items = controller.refresh(key.clone(), list.refresh).await?;

    match list.filter {
        Some(query) => match first_match(&items, &query) {
            Some(index) => println!("{}", items[index]),
            None => bail!("no entry in {key} matches '{query}'"),
        },
        None => {
            for item in &items {
                println!("{item}");
            }
        }
    }
    Ok(())
}

/// Walk the selection flow down to the target pod
async fn select(controller: &Controller, target: &PodArgs) -> Result<()> {
    controller.select_context(&target.context)?.await?;
    controller.select_namespace(&target.namespace)?.await?;
    controller.select_pod(&target.pod)?;
    tracing::debug!(status = %controller.status(), "pod selected");
    Ok(())
}
