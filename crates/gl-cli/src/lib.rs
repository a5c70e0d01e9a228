use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use log::info;

use gl_core::{Category, Filter, ItemId, ListId, Snapshot, Store};
use gl_fs::{
    export_lists, load_config, open_store, resolve_data_path_from, set_config_path,
    set_default_list, AppConfig, FsStore, PATH_ENV_VAR,
};
use gl_utils::logging::{default_log_level, init_logging};

#[derive(Parser)]
#[command(name = "gl", version, about = "Grocery list manager")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Initialize the data directory.
    Init {
        /// Optional path to store lists at.
        #[arg(long)]
        path: Option<String>,
    },
    /// Show every list with its item count.
    Lists,
    /// Print a list grouped by category.
    Show {
        /// List id or name.
        #[arg(long)]
        list: Option<String>,
        #[arg(long, value_enum, default_value = "all")]
        filter: FilterArg,
    },
    /// Add an item to the top of a list.
    Add {
        name: String,
        #[arg(long, default_value_t = 1, allow_hyphen_values = true)]
        qty: i64,
        /// Category label, e.g. `dairy` or `personal-care`.
        #[arg(long, default_value_t = Category::default())]
        category: Category,
        /// List id or name.
        #[arg(long)]
        list: Option<String>,
    },
    /// Flip the purchased flag of an item.
    Toggle { id: String },
    /// Remove an item.
    Remove { id: String },
    /// Rename an item, optionally changing its quantity.
    Edit {
        id: String,
        name: String,
        #[arg(long, allow_hyphen_values = true)]
        qty: Option<i64>,
    },
    /// Move an item into the slot another item occupies.
    Move { id: String, target: String },
    /// Set the note attached to a category.
    Note {
        category: Category,
        text: String,
        /// List id or name.
        #[arg(long)]
        list: Option<String>,
    },
    /// Create a new list.
    NewList { name: String },
    /// Rename a list.
    RenameList { id: String, name: String },
    /// Delete a list. The last list cannot be deleted.
    DeleteList { id: String },
    /// Select the list opened on startup.
    Use { list: String },
    /// Export every list as Markdown into a directory.
    Export { path: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum FilterArg {
    All,
    Active,
    Purchased,
}

impl From<FilterArg> for Filter {
    fn from(value: FilterArg) -> Self {
        match value {
            FilterArg::All => Filter::All,
            FilterArg::Active => Filter::Active,
            FilterArg::Purchased => Filter::Purchased,
        }
    }
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Some(Command::Init { path }) = &cli.command {
        let path = match path {
            Some(path) => PathBuf::from(path),
            None => FsStore::default_path()?,
        };
        let fs_store = FsStore::new(path.clone());
        fs_store.init().context("failed to initialize data directory")?;
        set_config_path(&path)?;
        println!("Lists stored at {}", path.display());
        return Ok(());
    }

    let config = load_config().context("failed to load config")?;
    let env = std::env::var(PATH_ENV_VAR).ok();
    let fs_store = FsStore::new(resolve_data_path_from(env.as_deref(), &config)?);
    fs_store.init().context("failed to create data directory")?;
    start_logging(&config, &fs_store);

    let mut store = open_store(&fs_store);
    select_default_list(&mut store, config.default_list.as_deref());

    match cli.command {
        None => gl_tui::run(store),
        Some(Command::Use { list }) => {
            let id = resolve_list(store.state(), &list)?;
            set_default_list(id.as_str()).context("failed to save config")?;
            println!("Default list is now {id}");
            Ok(())
        }
        Some(command) => dispatch(command, &mut store, &mut io::stdout().lock()),
    }
}

fn start_logging(config: &AppConfig, fs_store: &FsStore) {
    let level = config.log_level.as_deref().unwrap_or(default_log_level());
    if let Err(err) = init_logging(level, &fs_store.logs_path()) {
        eprintln!("warning: file logging disabled: {err}");
    }
}

fn select_default_list(store: &mut Store, default_list: Option<&str>) {
    let Some(key) = default_list else {
        return;
    };
    match store.state().find_list(key).map(|list| list.id.clone()) {
        Some(id) => {
            let _ = store.set_current_list(&id);
        }
        None => info!("event=default_list module=cli status=missing list={key}"),
    }
}

fn dispatch(command: Command, store: &mut Store, out: &mut dyn Write) -> Result<()> {
    match command {
        Command::Lists => {
            for summary in store.state().list_summaries() {
                let marker = if summary.is_current { '*' } else { ' ' };
                writeln!(
                    out,
                    "{marker} {}\t{}\t{} items",
                    summary.id, summary.name, summary.item_count
                )?;
            }
        }
        Command::Show { list, filter } => {
            select_list(store, list.as_deref())?;
            let _ = store.set_filter(filter.into());
            write!(out, "{}", format_list(store.state()))?;
        }
        Command::Add {
            name,
            qty,
            category,
            list,
        } => {
            select_list(store, list.as_deref())?;
            let id = store
                .add_item(&name, qty, category)
                .ok_or_else(|| anyhow!("item name cannot be blank"))?;
            writeln!(out, "{id}")?;
        }
        Command::Toggle { id } => {
            let id = select_item_list(store, &id)?;
            let _ = store.toggle_item(&id);
        }
        Command::Remove { id } => {
            let id = select_item_list(store, &id)?;
            let _ = store.delete_item(&id);
        }
        Command::Edit { id, name, qty } => {
            let id = select_item_list(store, &id)?;
            let quantity = match qty {
                Some(qty) => qty,
                None => store
                    .state()
                    .current_list()
                    .item(&id)
                    .map_or(1, |item| i64::from(item.quantity)),
            };
            if name.trim().is_empty() {
                bail!("item name cannot be blank; use `remove` to delete an item");
            }
            let _ = store.save_edit(&id, &name, quantity);
        }
        Command::Move { id, target } => {
            let id = select_item_list(store, &id)?;
            let target = ItemId::new(target);
            if store.state().current_list().item(&target).is_none() {
                bail!("target item not found in the same list");
            }
            let _ = store.reorder_item(&id, &target);
        }
        Command::Note {
            category,
            text,
            list,
        } => {
            select_list(store, list.as_deref())?;
            let _ = store.set_group_note(category, &text);
        }
        Command::NewList { name } => {
            let id = store
                .create_list(&name)
                .ok_or_else(|| anyhow!("list name cannot be blank"))?;
            writeln!(out, "{id}")?;
        }
        Command::RenameList { id, name } => {
            let id = resolve_list(store.state(), &id)?;
            if name.trim().is_empty() {
                bail!("list name cannot be blank");
            }
            let _ = store.rename_list(&id, &name);
        }
        Command::DeleteList { id } => {
            let id = resolve_list(store.state(), &id)?;
            if !store.delete_list(&id).is_applied() {
                bail!("cannot delete the last list");
            }
        }
        Command::Export { path } => {
            let written = export_lists(store.state().lists(), &PathBuf::from(path))
                .context("failed to export lists")?;
            for path in written {
                writeln!(out, "{}", path.display())?;
            }
        }
        Command::Init { .. } | Command::Use { .. } => unreachable!("handled in run"),
    }
    Ok(())
}

fn resolve_list(state: &Snapshot, key: &str) -> Result<ListId> {
    state
        .find_list(key)
        .map(|list| list.id.clone())
        .ok_or_else(|| anyhow!("list not found: {key}"))
}

fn select_list(store: &mut Store, key: Option<&str>) -> Result<()> {
    if let Some(key) = key {
        let id = resolve_list(store.state(), key)?;
        let _ = store.set_current_list(&id);
    }
    Ok(())
}

/// Select the list holding `id` so item transitions can reach it.
fn select_item_list(store: &mut Store, id: &str) -> Result<ItemId> {
    let id = ItemId::new(id);
    let list = store
        .state()
        .list_containing(&id)
        .map(|list| list.id.clone())
        .ok_or_else(|| anyhow!("item not found: {id}"))?;
    let _ = store.set_current_list(&list);
    Ok(id)
}

/// Plain-text rendering of the current list under the active filter.
fn format_list(state: &Snapshot) -> String {
    let list = state.current_list();
    let stats = state.stats();
    let mut content = format!(
        "{} ({})\n{} left • {} purchased\n",
        list.name, list.id, stats.remaining, stats.done
    );
    let groups: Vec<_> = state
        .grouped_by_category()
        .into_iter()
        .filter(|group| !group.is_empty())
        .collect();
    if groups.is_empty() {
        content.push_str(match state.filter() {
            Filter::All => "\nNo items yet.\n",
            Filter::Active => "\nNothing left to buy.\n",
            Filter::Purchased => "\nNothing purchased yet.\n",
        });
    }
    for group in groups {
        content.push_str(&format!("\n{}\n", group.category));
        if let Some(note) = list.note(group.category).filter(|note| !note.trim().is_empty()) {
            content.push_str(&format!("  note: {}\n", note.replace('\n', " ")));
        }
        for item in group.items {
            let mark = if item.purchased { 'x' } else { ' ' };
            content.push_str(&format!(
                "  [{mark}] {} ×{}  ({})\n",
                item.name, item.quantity, item.id
            ));
        }
    }
    content
}
