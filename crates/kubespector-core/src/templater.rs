//! Render a manifest, stage it, apply it remotely, clean up
//!
//! Render -> Stage -> Upload -> Apply -> Cleanup. The local temp file is
//! removed right after upload; the remote copy is removed after apply
//! whatever the apply result was.
//!
//! Manifests are staged in a private directory so the staged path never
//! equals the `/tmp/<name>` upload target, which matters on the local node.

use std::io::Write;
use std::path::Path;

use kubespector_exec::{CommandOutput, ExecError};
use minijinja::{Environment, UndefinedBehavior};
use serde::Serialize;
use tempfile::{NamedTempFile, TempDir};
use tracing::{debug, trace, warn};

use crate::error::CoreError;
use crate::executor::CommandExecutor;

/// Prefix of staged manifest files
pub const TEMP_FILE_PREFIX: &str = "kubespector-";
/// Remote directory manifests are uploaded to
pub const REMOTE_TEMP_DIR: &str = "/tmp";

/// Renders manifests with minijinja
///
/// Templates use Jinja syntax (`{{ name }}`, `{% for p in ports %}`).
/// Go-template syntax such as `{{.Name}}` is not understood and fails with
/// `CoreError::Template`. Undefined variables are errors too.
#[derive(Debug)]
pub struct ResourceTemplater {
    env: Environment<'static>,
}

impl Default for ResourceTemplater {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceTemplater {
    #[must_use]
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_keep_trailing_newline(true);
        Self { env }
    }

    /// Render `template` against `data`
    ///
    /// # Errors
    /// Returns `CoreError::Template` on a syntax error or undefined variable
    pub fn render<T: Serialize>(&self, template: &str, data: &T) -> Result<String, CoreError> {
        self.env
            .render_str(template, data)
            .map_err(|e| CoreError::Template(e.to_string()))
    }

    /// Render and `kubectl apply` a manifest on the executor's node
    ///
    /// # Errors
    /// - `CoreError::Template` before any I/O if rendering fails
    /// - `CoreError::Exec` if staging or upload fails
    /// - `CoreError::Resource` if kubectl rejects the manifest
    pub async fn deploy<T: Serialize + Sync>(
        &self,
        executor: &CommandExecutor,
        template: &str,
        data: &T,
    ) -> Result<CommandOutput, CoreError> {
        let manifest = self.render(template, data)?;
        trace!(manifest = %manifest, "generated template");

        let staged = stage(&manifest)?;
        let remote_path = remote_path_for(staged.path());

        let uploaded = executor.upload_file(&remote_path, staged.path()).await;
        staged.close();

        let applied = match uploaded {
            Ok(()) => executor
                .run_kubectl_command(&["apply", "-f", remote_path.as_str()])
                .await
                .map_err(kubectl_error("apply")),
            Err(e) => Err(CoreError::Exec(e)),
        };

        if let Err(e) = executor.delete_remote_file(&remote_path).await {
            warn!(path = %remote_path, error = %e, "failed to remove remote manifest");
        }

        if let Ok(output) = &applied {
            debug!(node = %executor.node(), stdout = %output.stdout, "resource applied");
        }
        applied
    }
}

/// A rendered manifest on local disk
struct Staged {
    file: NamedTempFile,
    dir: TempDir,
}

impl Staged {
    fn path(&self) -> &Path {
        self.file.path()
    }

    fn close(self) {
        if let Err(e) = self.file.close() {
            warn!(error = %e, "failed to remove staged manifest");
        }
        if let Err(e) = self.dir.close() {
            warn!(error = %e, "failed to remove staging directory");
        }
    }
}

fn stage(manifest: &str) -> Result<Staged, CoreError> {
    let io_err = |e: std::io::Error| CoreError::Exec(ExecError::Io(format!("stage manifest: {e}")));

    let dir = tempfile::Builder::new()
        .prefix(TEMP_FILE_PREFIX)
        .tempdir()
        .map_err(io_err)?;
    let mut file = tempfile::Builder::new()
        .prefix(TEMP_FILE_PREFIX)
        .tempfile_in(dir.path())
        .map_err(io_err)?;
    file.write_all(manifest.as_bytes()).map_err(io_err)?;
    file.flush().map_err(io_err)?;
    Ok(Staged { file, dir })
}

/// `/tmp/<basename of the staged file>`
fn remote_path_for(local: &Path) -> String {
    let name = local
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{REMOTE_TEMP_DIR}/{name}")
}

/// Turn a failed kubectl run into `CoreError::Resource`, keeping its output
pub(crate) fn kubectl_error(action: &str) -> impl FnOnce(ExecError) -> CoreError + '_ {
    move |e| match e {
        ExecError::Command {
            status,
            stdout,
            stderr,
        } => {
            let output = CommandOutput {
                stdout,
                stderr,
                exit_status: status,
                ..CommandOutput::default()
            };
            let message = if output.stderr.is_empty() {
                format!("kubectl {action} exited with status {status}")
            } else {
                output.stderr.clone()
            };
            CoreError::Resource { message, output }
        }
        other => CoreError::Exec(other),
    }
}
