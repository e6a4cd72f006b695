use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use renderer::{PreviewConfig, PreviewWindow, SharedReloadObserver};
use tracing_subscriber::EnvFilter;
use uniforms::{DebouncePump, UndoHistory, UniformStore};

use crate::cli::Cli;
use crate::config::ShadeliveConfig;
use crate::osc::OscListener;
use crate::paths::AppPaths;
use crate::watch::{DependencyWatcher, ReloadForwarder};

pub fn run(cli: Cli) -> Result<()> {
    let paths = AppPaths::discover()?;
    let config_path = cli.config.clone().unwrap_or_else(|| paths.config_file());
    let mut config = ShadeliveConfig::load(&config_path, cli.config.is_some())?;
    config.apply_cli(&cli);

    let shader = resolve_shader(&config, &config_path)?;
    let uniforms_file = config
        .uniforms
        .file
        .as_deref()
        .map(shaderschema::absolutize)
        .unwrap_or_else(|| paths.uniforms_file(&shader));
    if let Some(dir) = uniforms_file.parent() {
        fs::create_dir_all(dir).with_context(|| {
            format!("failed to prepare uniforms directory at {}", dir.display())
        })?;
    }
    tracing::debug!(
        config = %config_path.display(),
        data = %paths.data_dir().display(),
        shader = %shader.display(),
        uniforms = %uniforms_file.display(),
        mode = ?config.driver_mode(),
        "resolved shadelive paths"
    );

    let history = Arc::new(UndoHistory::new(config.uniforms.undo_limit));
    let store = Arc::new(
        UniformStore::new(config.debounce_settings())
            .with_undo_sink(history.clone())
            .with_persist_path(&uniforms_file),
    );

    let (watcher, changes) = DependencyWatcher::new(&shader)?;
    let observer: SharedReloadObserver = watcher.clone();
    let window = PreviewWindow::spawn(PreviewConfig {
        title: window_title(&config, &shader),
        size: (config.window.width, config.window.height),
        mode: config.driver_mode(),
        shader_path: shader.clone(),
        analyzer: config.analyzer(),
        compiler: Box::new(config.compiler()),
        store: store.clone(),
        observers: vec![observer],
    })?;

    let _pump = DebouncePump::spawn(store.clone(), Some(Box::new(window.refresher())));
    let manager = window.manager().clone();
    let _forwarder = ReloadForwarder::spawn(changes, move || manager.request_reload())?;
    let _osc = match config.osc.bind.as_deref() {
        Some(bind) => match OscListener::spawn(bind, &config.osc.prefix, store.clone()) {
            Ok(listener) => Some(listener),
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "OSC control disabled");
                None
            }
        },
        None => None,
    };

    tracing::info!(shader = %shader.display(), "shadelive running; F5 reloads, Esc quits");
    let result = window.wait();
    store.flush_all();
    tracing::debug!(
        undo = history.can_undo(),
        redo = history.can_redo(),
        "shadelive exiting"
    );
    result
}

fn resolve_shader(config: &ShadeliveConfig, config_path: &Path) -> Result<PathBuf> {
    let shader = config.shader.as_deref().ok_or_else(|| {
        anyhow!(
            "no shader given; pass SHADER or set `shader` in {}",
            config_path.display()
        )
    })?;
    let shader = shaderschema::absolutize(shader);
    if !shader.is_file() {
        bail!("shader file {} does not exist", shader.display());
    }
    Ok(shader)
}

fn window_title(config: &ShadeliveConfig, shader: &Path) -> String {
    if let Some(title) = &config.window.title {
        return title.clone();
    }
    let name = shader
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("shadelive: {name}")
}

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn shader_must_be_given_and_exist() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("shadelive.toml");
        let mut config = ShadeliveConfig::default();

        let err = resolve_shader(&config, &config_path).unwrap_err();
        assert!(err.to_string().contains("no shader given"));

        config.shader = Some(dir.path().join("missing.slang"));
        let err = resolve_shader(&config, &config_path).unwrap_err();
        assert!(err.to_string().contains("does not exist"));

        let shader = dir.path().join("plasma.slang");
        fs::write(&shader, "").unwrap();
        config.shader = Some(shader.clone());
        assert_eq!(resolve_shader(&config, &config_path).unwrap(), shader);
    }

    #[test]
    fn title_defaults_to_the_file_name() {
        let mut config = ShadeliveConfig::default();
        let shader = Path::new("/work/plasma.slang");
        assert_eq!(window_title(&config, shader), "shadelive: plasma.slang");
        config.window.title = Some("stage".into());
        assert_eq!(window_title(&config, shader), "stage");
    }
}
