//! Context / namespace / pod selection flow and pod operations

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use kdev_cache::ResourceCache;
use kdev_kubectl::{InteractiveCommand, Kubectl, PortForward, container_names, describe};
use kdev_types::{CacheKey, CopyDirection, KdevError, PodDescription, PortMapping, Result};

use crate::dispatcher::{Dispatcher, TaskHandle};

/// Receives the outcome of dispatched operations
///
/// Both methods are called from background tasks; implementations hand the
/// data over to the interactive thread instead of touching UI state directly.
pub trait Presenter: Send + Sync + 'static {
    fn on_complete(&self, completion: Completion);

    /// A kubectl command line about to run
    fn on_activity(&self, _line: &str) {}
}

impl Presenter for mpsc::UnboundedSender<Completion> {
    fn on_complete(&self, completion: Completion) {
        // Receiver gone means the presentation layer is shutting down
        let _ = self.send(completion);
    }
}

/// Dispatched operation kinds, for failure reporting
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    ListContexts,
    ListNamespaces,
    ListPods,
    Containers,
    Logs,
    Describe,
    DeletePod,
    CopyFile,
}

impl Operation {
    fn listing(key: &CacheKey) -> Self {
        match key {
            CacheKey::Contexts => Self::ListContexts,
            CacheKey::Namespaces { .. } => Self::ListNamespaces,
            CacheKey::Pods { .. } => Self::ListPods,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ListContexts => "list contexts",
            Self::ListNamespaces => "list namespaces",
            Self::ListPods => "list pods",
            Self::Containers => "list containers",
            Self::Logs => "fetch logs",
            Self::Describe => "describe pod",
            Self::DeletePod => "delete pod",
            Self::CopyFile => "copy file",
        })
    }
}

/// Outcome of a dispatched operation
#[derive(Clone, Debug, PartialEq)]
pub enum Completion {
    Listed {
        key: CacheKey,
        items: Vec<String>,
    },
    Containers {
        pod: String,
        names: Vec<String>,
    },
    Logs {
        pod: String,
        container: Option<String>,
        text: String,
    },
    Described(Box<PodDescription>),
    Deleted {
        pod: String,
        /// Pod listing fetched after the delete
        remaining: Vec<String>,
    },
    Copied {
        direction: CopyDirection,
        local: PathBuf,
        remote: String,
    },
    Failed {
        operation: Operation,
        error: KdevError,
    },
}

/// Log text of one pod container
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PodLogs {
    /// Container the logs came from
    pub container: Option<String>,
    pub text: String,
}

/// Where the selection flow currently stands
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BrowserState {
    NoContext,
    ContextSelected,
    NamespaceSelected,
    PodSelected,
}

/// Current context / namespace / pod choice
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Selection {
    pub context: Option<String>,
    pub namespace: Option<String>,
    pub pod: Option<String>,
}

impl Selection {
    pub fn state(&self) -> BrowserState {
        match (&self.context, &self.namespace, &self.pod) {
            (None, _, _) => BrowserState::NoContext,
            (Some(_), None, _) => BrowserState::ContextSelected,
            (Some(_), Some(_), None) => BrowserState::NamespaceSelected,
            (Some(_), Some(_), Some(_)) => BrowserState::PodSelected,
        }
    }
}

/// Listings currently shown to the user
#[derive(Default)]
struct Browser {
    selection: Selection,
    contexts: Vec<String>,
    namespaces: Vec<String>,
    pods: Vec<String>,
}

/// Fully qualified pod an operation works on
#[derive(Clone, Debug)]
struct PodTarget {
    context: String,
    namespace: String,
    pod: String,
}

struct Shared {
    kubectl: Kubectl,
    cache: Arc<ResourceCache>,
    dispatcher: Dispatcher,
    presenter: Arc<dyn Presenter>,
    browser: Mutex<Browser>,
}

/// Orchestrates listings and pod operations for the presentation layer
///
/// Cheap to clone; clones share state. Methods that dispatch work must be
/// called from within a tokio runtime.
#[derive(Clone)]
pub struct Controller {
    shared: Arc<Shared>,
}

impl Controller {
    pub fn new(kubectl: Kubectl, cache: Arc<ResourceCache>, presenter: Arc<dyn Presenter>) -> Self {
        let activity = Arc::clone(&presenter);
        let kubectl = kubectl.with_activity(Arc::new(move |line: &str| activity.on_activity(line)));

        Self {
            shared: Arc::new(Shared {
                kubectl,
                cache,
                dispatcher: Dispatcher::new(),
                presenter,
                browser: Mutex::new(Browser::default()),
            }),
        }
    }

    // ------------------------------------------------------------------------
    // Cheap reads
    // ------------------------------------------------------------------------

    pub fn selection(&self) -> Selection {
        self.shared.browser.lock().selection.clone()
    }

    pub fn state(&self) -> BrowserState {
        self.shared.browser.lock().selection.state()
    }

    pub fn contexts(&self) -> Vec<String> {
        self.shared.browser.lock().contexts.clone()
    }

    pub fn namespaces(&self) -> Vec<String> {
        self.shared.browser.lock().namespaces.clone()
    }

    pub fn pods(&self) -> Vec<String> {
        self.shared.browser.lock().pods.clone()
    }

    /// Whether a dispatched operation is still running
    pub fn is_busy(&self) -> bool {
        self.shared.dispatcher.is_busy()
    }

    pub fn cache(&self) -> &ResourceCache {
        &self.shared.cache
    }

    /// One-line summary of the selection
    pub fn status(&self) -> String {
        let selection = self.selection();
        match (selection.context, selection.namespace, selection.pod) {
            (Some(ctx), Some(ns), Some(pod)) => format!("selected {ctx}/{ns}/{pod}"),
            (Some(ctx), Some(ns), None) => format!("selected {ctx}/{ns}"),
            (Some(ctx), None, _) => format!("selected context: {ctx}"),
            (None, _, _) => "No Pod selected".to_string(),
        }
    }

    /// Stop every outstanding operation at its next kubectl call
    pub fn shutdown(&self) {
        self.shared.dispatcher.shutdown();
    }

    // ------------------------------------------------------------------------
    // Selection flow
    // ------------------------------------------------------------------------

    /// Switch kubectl to `context` and list its namespaces
    pub fn select_context(&self, context: &str) -> Result<TaskHandle<Vec<String>>> {
        self.ensure_idle()?;

        {
            let mut browser = self.shared.browser.lock();
            browser.selection = Selection {
                context: Some(context.to_string()),
                ..Default::default()
            };
            browser.namespaces.clear();
            browser.pods.clear();
        }
        tracing::info!(context, "context selected");

        let context = context.to_string();
        let key = CacheKey::namespaces(context.clone());
        Ok(self.dispatch_listing(key.clone(), move |this, cancel| async move {
            this.shared.kubectl.use_context(&context, &cancel).await?;
            this.list(&key, false, &cancel).await
        }))
    }

    /// Switch the current context to `namespace` and list its pods
    pub fn select_namespace(&self, namespace: &str) -> Result<TaskHandle<Vec<String>>> {
        self.ensure_idle()?;

        let context = {
            let mut browser = self.shared.browser.lock();
            let context = browser
                .selection
                .context
                .clone()
                .ok_or(KdevError::NotSelected("context"))?;
            browser.selection.namespace = Some(namespace.to_string());
            browser.selection.pod = None;
            browser.pods.clear();
            context
        };
        tracing::info!(context, namespace, "namespace selected");

        let namespace = namespace.to_string();
        let key = CacheKey::pods(context, namespace.clone());
        Ok(self.dispatch_listing(key.clone(), move |this, cancel| async move {
            this.shared.kubectl.set_namespace(&namespace, &cancel).await?;
            this.list(&key, false, &cancel).await
        }))
    }

    /// Mark `pod` as the target of pod operations
    pub fn select_pod(&self, pod: &str) -> Result<()> {
        let mut browser = self.shared.browser.lock();
        if browser.selection.namespace.is_none() {
            return Err(KdevError::NotSelected("namespace"));
        }
        browser.selection.pod = Some(pod.to_string());
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Listings
    // ------------------------------------------------------------------------

    /// List `key` through the cache, bypassing it when `force` is set
    ///
    /// Shown listings are only replaced while their parent is still selected.
    pub fn refresh(&self, key: CacheKey, force: bool) -> TaskHandle<Vec<String>> {
        let listed = key.clone();
        self.dispatch_listing(key, move |this, cancel| async move {
            this.list(&listed, force, &cancel).await
        })
    }

    pub fn load_contexts(&self, force: bool) -> TaskHandle<Vec<String>> {
        self.refresh(CacheKey::Contexts, force)
    }

    /// Forced refresh of the selected context's namespaces
    pub fn refresh_namespaces(&self) -> Result<TaskHandle<Vec<String>>> {
        let context = self
            .selection()
            .context
            .ok_or(KdevError::NotSelected("context"))?;
        Ok(self.refresh(CacheKey::namespaces(context), true))
    }

    /// Forced refresh of the selected namespace's pods
    pub fn refresh_pods(&self) -> Result<TaskHandle<Vec<String>>> {
        let selection = self.selection();
        let context = selection.context.ok_or(KdevError::NotSelected("context"))?;
        let namespace = selection.namespace.ok_or(KdevError::NotSelected("namespace"))?;
        Ok(self.refresh(CacheKey::pods(context, namespace), true))
    }

    // ------------------------------------------------------------------------
    // Pod operations
    // ------------------------------------------------------------------------

    /// Delete the selected pod, then drop and re-list its namespace's pods
    pub fn delete_pod(&self) -> Result<TaskHandle<Vec<String>>> {
        let target = self.target()?;
        let pod = target.pod.clone();

        Ok(self.dispatch(
            Operation::DeletePod,
            move |this, cancel| async move {
                let PodTarget {
                    context,
                    namespace,
                    pod,
                } = target;
                this.shared
                    .kubectl
                    .delete_pod(&context, &namespace, &pod, &cancel)
                    .await?;

                let key = CacheKey::pods(context, namespace);
                this.shared.cache.invalidate(&key.to_string())?;
                {
                    let mut browser = this.shared.browser.lock();
                    if browser.selection.pod.as_deref() == Some(pod.as_str()) {
                        browser.selection.pod = None;
                    }
                }

                this.list(&key, false, &cancel).await
            },
            move |remaining| Completion::Deleted {
                pod,
                remaining: remaining.clone(),
            },
        ))
    }

    /// Container names of the selected pod, always fetched fresh
    pub fn containers(&self) -> Result<TaskHandle<Vec<String>>> {
        let target = self.target()?;
        let pod = target.pod.clone();

        Ok(self.dispatch(
            Operation::Containers,
            move |this, cancel| async move { this.fetch_containers(&target, &cancel).await },
            move |names| Completion::Containers {
                pod,
                names: names.clone(),
            },
        ))
    }

    /// Last `tail` log lines of the selected pod
    ///
    /// Multi-container pods need `container`; single-container pods accept
    /// none.
    pub fn get_logs(&self, container: Option<String>, tail: u32) -> Result<TaskHandle<PodLogs>> {
        let target = self.target()?;
        let pod = target.pod.clone();

        Ok(self.dispatch(
            Operation::Logs,
            move |this, cancel| async move {
                let available = this.fetch_containers(&target, &cancel).await?;
                let chosen = choose_container(&available, container)?;
                let text = this
                    .shared
                    .kubectl
                    .logs(
                        &target.context,
                        &target.namespace,
                        &target.pod,
                        chosen.as_deref(),
                        tail,
                        &cancel,
                    )
                    .await?;

                Ok(PodLogs {
                    container: chosen.or_else(|| available.into_iter().next()),
                    text,
                })
            },
            move |logs| Completion::Logs {
                pod,
                container: logs.container.clone(),
                text: logs.text.clone(),
            },
        ))
    }

    pub fn describe_pod(&self) -> Result<TaskHandle<PodDescription>> {
        let target = self.target()?;

        Ok(self.dispatch(
            Operation::Describe,
            move |this, cancel| async move {
                let pod = this
                    .shared
                    .kubectl
                    .pod(&target.context, &target.namespace, &target.pod, &cancel)
                    .await?;
                Ok(describe(&pod))
            },
            |description| Completion::Described(Box::new(description.clone())),
        ))
    }

    /// Shell command for the selected pod, to be run in the caller's terminal
    pub fn exec_shell(&self) -> Result<InteractiveCommand> {
        let target = self.target()?;
        self.shared
            .kubectl
            .exec_shell(&target.context, &target.namespace, &target.pod)
    }

    /// Start forwarding `mapping` to the selected pod
    pub fn port_forward(&self, mapping: PortMapping) -> Result<PortForward> {
        let target = self.target()?;
        tracing::info!(pod = %target.pod, %mapping, "starting port-forward");
        self.shared
            .kubectl
            .port_forward(&target.context, &target.namespace, &target.pod, mapping)
    }

    /// Copy between `local_path` and `remote_path` inside the selected pod
    pub fn copy_file(
        &self,
        direction: CopyDirection,
        local_path: PathBuf,
        remote_path: String,
    ) -> Result<TaskHandle<()>> {
        let target = self.target()?;
        let (local, remote) = (local_path.clone(), remote_path.clone());

        Ok(self.dispatch(
            Operation::CopyFile,
            move |this, cancel| async move {
                this.shared
                    .kubectl
                    .copy(
                        &target.context,
                        &target.namespace,
                        &target.pod,
                        direction,
                        &local_path,
                        &remote_path,
                        &cancel,
                    )
                    .await
            },
            move |_| Completion::Copied {
                direction,
                local,
                remote,
            },
        ))
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn ensure_idle(&self) -> Result<()> {
        if self.is_busy() {
            tracing::debug!("selection rejected while busy");
            return Err(KdevError::Busy);
        }
        Ok(())
    }

    fn target(&self) -> Result<PodTarget> {
        let selection = self.selection();
        Ok(PodTarget {
            context: selection.context.ok_or(KdevError::NotSelected("context"))?,
            namespace: selection.namespace.ok_or(KdevError::NotSelected("namespace"))?,
            pod: selection.pod.ok_or(KdevError::NotSelected("pod"))?,
        })
    }

    /// Run `task` in the background and report its outcome to the presenter
    fn dispatch<T, F, Fut, S>(&self, operation: Operation, task: F, on_success: S) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: FnOnce(Controller, CancellationToken) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
        S: FnOnce(&T) -> Completion + Send + 'static,
    {
        let this = self.clone();
        let presenter = Arc::clone(&self.shared.presenter);

        self.shared.dispatcher.run_then(
            move |cancel| task(this, cancel),
            move |result| {
                let completion = match result {
                    Ok(value) => on_success(value),
                    Err(error) => {
                        tracing::debug!(%operation, %error, "operation failed");
                        Completion::Failed {
                            operation,
                            error: error.clone(),
                        }
                    }
                };
                presenter.on_complete(completion);
            },
        )
    }

    fn dispatch_listing<F, Fut>(&self, key: CacheKey, task: F) -> TaskHandle<Vec<String>>
    where
        F: FnOnce(Controller, CancellationToken) -> Fut,
        Fut: Future<Output = Result<Vec<String>>> + Send + 'static,
    {
        let operation = Operation::listing(&key);
        self.dispatch(operation, task, move |items| Completion::Listed {
            key,
            items: items.clone(),
        })
    }

    /// Cached listing for `key`, fetched through kubectl on miss or `force`
    async fn list(
        &self,
        key: &CacheKey,
        force: bool,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        let kubectl = &self.shared.kubectl;
        let items = self
            .shared
            .cache
            .list_or_fetch(&key.to_string(), force, move || async move {
                match key {
                    CacheKey::Contexts => kubectl.contexts(cancel).await,
                    CacheKey::Namespaces { context } => kubectl.namespaces(context, cancel).await,
                    CacheKey::Pods { context, namespace } => {
                        kubectl.pods(context, namespace, cancel).await
                    }
                }
            })
            .await?;

        self.show_listing(key, &items);
        Ok(items)
    }

    fn show_listing(&self, key: &CacheKey, items: &[String]) {
        let mut guard = self.shared.browser.lock();
        let browser = &mut *guard;
        let selection = &browser.selection;

        match key {
            CacheKey::Contexts => browser.contexts = items.to_vec(),
            CacheKey::Namespaces { context } => {
                if selection.context.as_ref() == Some(context) {
                    browser.namespaces = items.to_vec();
                }
            }
            CacheKey::Pods { context, namespace } => {
                if selection.context.as_ref() == Some(context)
                    && selection.namespace.as_ref() == Some(namespace)
                {
                    browser.pods = items.to_vec();
                }
            }
        }
    }

    async fn fetch_containers(
        &self,
        target: &PodTarget,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        let pod = self
            .shared
            .kubectl
            .pod(&target.context, &target.namespace, &target.pod, cancel)
            .await?;
        Ok(container_names(&pod))
    }
}

fn choose_container(available: &[String], requested: Option<String>) -> Result<Option<String>> {
    match requested {
        Some(name) if available.contains(&name) => Ok(Some(name)),
        Some(name) => Err(KdevError::InvalidInput(format!(
            "container '{name}' not found, available: {}",
            available.join(", ")
        ))),
        None if available.len() > 1 => Err(KdevError::ContainerRequired(available.to_vec())),
        None => Ok(None),
    }
}
