//! Filesystem-backed persistence and configuration for grocery lists.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use gl_core::{
    Category, CoreError, CoreResult, GroceryList, ListRepository, Store, SystemClock, UuidGenerator,
};
use gl_utils::slugify;

/// Default directory name for stored data and configuration.
pub const APP_DIR_NAME: &str = "grocery-lists";

/// Fixed key the collection is stored under.
pub const STORAGE_KEY: &str = "grocery-lists-v1";

/// Environment variable overriding the data directory.
pub const PATH_ENV_VAR: &str = "GROCERY_LISTS_PATH";

const CONFIG_FILE_NAME: &str = "config.yaml";

/// Filesystem-backed list repository.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Create a new store rooted at the provided directory.
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Get the root directory of the store.
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Resolve the platform data directory (e.g. `~/.local/share/grocery-lists`).
    pub fn default_path() -> CoreResult<PathBuf> {
        if let Some(dir) = dirs::data_dir() {
            return Ok(dir.join(APP_DIR_NAME));
        }
        if let Some(dir) = dirs::home_dir() {
            return Ok(dir.join(format!(".{APP_DIR_NAME}")));
        }
        Err(CoreError::Storage(
            "unable to determine a default data path".into(),
        ))
    }

    /// Check if the data directory exists.
    pub fn exists(&self) -> bool {
        self.root.is_dir()
    }

    /// Create the data directory.
    pub fn init(&self) -> CoreResult<()> {
        fs::create_dir_all(&self.root).map_err(|err| CoreError::Storage(err.to_string()))
    }

    /// File holding the serialized collection.
    pub fn document_path(&self) -> PathBuf {
        self.root.join(format!("{STORAGE_KEY}.json"))
    }

    /// Copy of an unreadable document, kept before the seed replaces it.
    pub fn backup_path(&self) -> PathBuf {
        self.root.join(format!("{STORAGE_KEY}.json.bak"))
    }

    /// Directory for rolling log files.
    pub fn logs_path(&self) -> PathBuf {
        self.root.join("logs")
    }
}

impl ListRepository for FsStore {
    fn load_raw(&self) -> CoreResult<Option<Value>> {
        let path = self.document_path();
        if !path.exists() {
            return Ok(None);
        }
        let contents =
            fs::read_to_string(&path).map_err(|err| CoreError::Storage(err.to_string()))?;
        if contents.trim().is_empty() {
            return Ok(None);
        }
        let value = serde_json::from_str(&contents)
            .map_err(|err| CoreError::Storage(format!("{}: {err}", path.display())))?;
        info!(
            "event=document_read module=fs status=ok bytes={}",
            contents.len()
        );
        Ok(Some(value))
    }

    fn save(&self, lists: &[GroceryList]) -> CoreResult<()> {
        let path = self.document_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| CoreError::Storage(err.to_string()))?;
        }
        let contents = serde_json::to_string_pretty(lists)
            .map_err(|err| CoreError::Storage(err.to_string()))?;
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, &contents).map_err(|err| CoreError::Storage(err.to_string()))?;
        fs::rename(&staging, &path).map_err(|err| CoreError::Storage(err.to_string()))?;
        debug!(
            "event=document_write module=fs status=ok lists={} bytes={}",
            lists.len(),
            contents.len()
        );
        Ok(())
    }

    fn back_up(&self) -> CoreResult<()> {
        let path = self.document_path();
        if !path.exists() {
            return Ok(());
        }
        let backup = self.backup_path();
        fs::copy(&path, &backup).map_err(|err| CoreError::Storage(err.to_string()))?;
        info!(
            "event=document_backup module=fs status=ok path={}",
            backup.display()
        );
        Ok(())
    }
}

/// Open a store persisting into `fs_store`, with random ids and wall clock time.
pub fn open_store(fs_store: &FsStore) -> Store {
    Store::load(
        Box::new(fs_store.clone()),
        Box::new(UuidGenerator),
        Box::new(SystemClock),
    )
}

/// User configuration stored as YAML in the platform config directory.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AppConfig {
    /// Data directory override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Log level for the rolling file logs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
    /// List selected when the app starts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_list: Option<String>,
}

/// Location of the config file.
pub fn config_path() -> CoreResult<PathBuf> {
    if let Some(dir) = dirs::config_dir() {
        return Ok(dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME));
    }
    Err(CoreError::Storage(
        "unable to determine config directory".into(),
    ))
}

/// Load the config file, or the defaults when it does not exist.
pub fn load_config() -> CoreResult<AppConfig> {
    load_config_from(&config_path()?)
}

pub fn load_config_from(path: &Path) -> CoreResult<AppConfig> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let contents = fs::read_to_string(path).map_err(|err| CoreError::Storage(err.to_string()))?;
    if contents.trim().is_empty() {
        return Ok(AppConfig::default());
    }
    serde_yaml::from_str(&contents).map_err(|err| CoreError::Storage(err.to_string()))
}

pub fn save_config(config: &AppConfig) -> CoreResult<()> {
    save_config_to(&config_path()?, config)
}

pub fn save_config_to(path: &Path, config: &AppConfig) -> CoreResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| CoreError::Storage(err.to_string()))?;
    }
    let contents =
        serde_yaml::to_string(config).map_err(|err| CoreError::Storage(err.to_string()))?;
    fs::write(path, contents).map_err(|err| CoreError::Storage(err.to_string()))?;
    Ok(())
}

/// Remember `path` as the data directory, keeping other settings.
pub fn set_config_path(path: &Path) -> CoreResult<()> {
    let mut config = load_config()?;
    config.path = Some(path.to_string_lossy().to_string());
    save_config(&config)
}

/// Remember `id` as the list selected on startup, keeping other settings.
pub fn set_default_list(id: &str) -> CoreResult<()> {
    let mut config = load_config()?;
    config.default_list = Some(id.to_string());
    save_config(&config)
}

/// Resolve the data directory from the environment, the config file, or the
/// platform default, in that order.
pub fn resolve_data_path() -> CoreResult<PathBuf> {
    let env = std::env::var(PATH_ENV_VAR).ok();
    let config = load_config()?;
    resolve_data_path_from(env.as_deref(), &config)
}

pub fn resolve_data_path_from(env: Option<&str>, config: &AppConfig) -> CoreResult<PathBuf> {
    if let Some(value) = env {
        if !value.trim().is_empty() {
            return Ok(PathBuf::from(value));
        }
    }

    if let Some(path) = &config.path {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }

    FsStore::default_path()
}

/// Render a list as a Markdown checklist grouped by category.
///
/// Empty categories are skipped unless they carry a note.
pub fn render_list_markdown(list: &GroceryList) -> String {
    let mut content = format!("# {}\n", list.name);
    for category in Category::ALL {
        let items: Vec<_> = list
            .items
            .iter()
            .filter(|item| item.category == category)
            .collect();
        if items.is_empty() && !list.has_note(category) {
            continue;
        }
        content.push_str(&format!("\n## {category}\n"));
        if let Some(note) = list.note(category).filter(|note| !note.trim().is_empty()) {
            for line in note.lines() {
                content.push_str(&format!("> {line}\n"));
            }
        }
        for item in items {
            let mark = if item.purchased { 'x' } else { ' ' };
            content.push_str(&format!("- [{mark}] {} ×{}\n", item.name, item.quantity));
        }
    }
    content
}

/// Write every list as `<slug>-<id>.md` into `target` and return the paths.
pub fn export_lists(lists: &[GroceryList], target: &Path) -> CoreResult<Vec<PathBuf>> {
    fs::create_dir_all(target).map_err(|err| CoreError::Storage(err.to_string()))?;
    let mut written = Vec::with_capacity(lists.len());
    for list in lists {
        let slug = slugify(&list.name);
        let slug = if slug.is_empty() { "list" } else { slug.as_str() };
        let dest = target.join(format!("{slug}-{}.md", list.id));
        fs::write(&dest, render_list_markdown(list))
            .map_err(|err| CoreError::Storage(err.to_string()))?;
        written.push(dest);
    }
    info!(
        "event=export module=fs status=ok lists={} target={}",
        written.len(),
        target.display()
    );
    Ok(written)
}
