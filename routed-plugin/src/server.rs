//! Unix-socket serving for the two plugin services.
//!
//! Each service binds `<dir>/<name>.sock` under the Docker plugin
//! directory, removing any stale socket file left by a previous run, and
//! serves until SIGINT or SIGTERM. The socket file is unlinked again on
//! shutdown so Docker does not try to activate a dead plugin.

use std::io;
use std::path::{Path, PathBuf};

use axum::Router;
use plugin_proto::PLUGIN_SOCKET_DIR;
use tokio::net::UnixListener;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    #[error("could not bind socket {path}: {source}")]
    Bind {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("server error on {path}: {source}")]
    Serve {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Socket file path for a plugin name inside `dir`.
fn socket_path_in(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.sock"))
}

/// Create the socket directory and remove a stale socket file, if any.
async fn prepare_socket(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            info!(socket = %path.display(), "removed stale socket file");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Serve a router on the named plugin socket until a shutdown signal.
pub async fn serve(router: Router, name: &str) -> Result<(), ServeError> {
    serve_at(router, &socket_path_in(Path::new(PLUGIN_SOCKET_DIR), name)).await
}

async fn serve_at(router: Router, path: &Path) -> Result<(), ServeError> {
    prepare_socket(path).await.map_err(|source| ServeError::Bind {
        path: path.to_path_buf(),
        source,
    })?;
    let listener = UnixListener::bind(path).map_err(|source| ServeError::Bind {
        path: path.to_path_buf(),
        source,
    })?;
    info!(socket = %path.display(), "listening");

    let result = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    // Unlink so Docker does not activate a dead plugin next time.
    let _ = tokio::fs::remove_file(path).await;
    info!(socket = %path.display(), "stopped");

    result.map_err(|source| ServeError::Serve {
        path: path.to_path_buf(),
        source,
    })
}

async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(_) => return tokio::signal::ctrl_c().await.unwrap_or(()),
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
    info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_path_appends_sock_suffix() {
        let path = socket_path_in(Path::new("/run/docker/plugins"), "ipam-routed");
        assert_eq!(path, Path::new("/run/docker/plugins/ipam-routed.sock"));
    }

    #[tokio::test]
    async fn prepare_socket_removes_stale_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = socket_path_in(dir.path(), "net-routed");
        tokio::fs::write(&path, b"stale").await.unwrap();
        prepare_socket(&path).await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn prepare_socket_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = socket_path_in(&dir.path().join("plugins"), "ipam-routed");
        prepare_socket(&path).await.unwrap();
        assert!(path.parent().unwrap().is_dir());
    }

    #[tokio::test]
    async fn prepare_socket_is_fine_with_no_stale_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = socket_path_in(dir.path(), "ipam-routed");
        prepare_socket(&path).await.unwrap();
    }
}
