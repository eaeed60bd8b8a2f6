use crate::app_logic::presenter;
use crate::app_logic::{SessionError, TreeSession};
use crate::core::config::APP_NAME;
use crate::core::path_utils::normalize_lexically;
use crate::core::{
    ConfigError, ConfigManagerOperations, CoreConfigManager, CoreDirectoryLister, CoreFlattener,
    CorePresetStore, PresetError, PresetStoreOperations, create_token_counter,
};
use clap::{Args, Parser, Subcommand};
use simplelog::LevelFilter;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/*
 * Command line front end. Each invocation builds a fresh session over the local
 * services configured in `settings.json`, performs one command and exits.
 */

#[derive(Parser, Debug)]
#[command(name = "treepacker", author, version, about = "Select source files from a directory tree and flatten them into one text.", long_about = None)]
pub struct Cli {
    /// Log debug output to stderr
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn log_level(&self) -> LevelFilter {
        if self.verbose {
            LevelFilter::Debug
        } else if self.quiet {
            LevelFilter::Error
        } else {
            LevelFilter::Warn
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct SelectionArgs {
    /// Root directory (default: last used root, then the current directory)
    #[arg(value_name = "ROOT")]
    pub root: Option<PathBuf>,

    /// Apply a stored preset, e.g. `user/backend`
    #[arg(long, value_name = "ID")]
    pub preset: Option<String>,

    /// Check a file or directory (repeatable)
    #[arg(long = "select", value_name = "PATH")]
    pub select: Vec<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the tree with its selection markers
    Tree {
        #[command(flatten)]
        selection: SelectionArgs,

        /// Number of directory levels to load below the root
        #[arg(long, default_value_t = 1, value_name = "N")]
        depth: usize,
    },

    /// Flatten the selection into a single text
    Generate {
        #[command(flatten)]
        selection: SelectionArgs,

        /// Write the text to FILE instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Manage stored selection presets
    Presets {
        #[command(subcommand)]
        action: PresetsCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum PresetsCommand {
    /// List all presets
    List,

    /// Print the paths stored in a preset
    Show {
        #[arg(value_name = "ID")]
        id: String,
    },

    /// Save the given selection as a user preset
    Save {
        #[arg(value_name = "NAME")]
        name: String,

        #[arg(value_name = "ROOT")]
        root: Option<PathBuf>,

        #[arg(long = "select", value_name = "PATH", required = true)]
        select: Vec<PathBuf>,
    },

    /// Delete a user preset
    Delete {
        #[arg(value_name = "ID")]
        id: String,
    },
}

#[derive(Debug)]
pub enum CliError {
    Config(ConfigError),
    Presets(PresetError),
    Session(SessionError),
    Io(io::Error),
    NoTextGenerated(String),
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        CliError::Config(err)
    }
}

impl From<PresetError> for CliError {
    fn from(err: PresetError) -> Self {
        CliError::Presets(err)
    }
}

impl From<SessionError> for CliError {
    fn from(err: SessionError) -> Self {
        CliError::Session(err)
    }
}

impl From<io::Error> for CliError {
    fn from(err: io::Error) -> Self {
        CliError::Io(err)
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Config(e) => write!(f, "{e}"),
            CliError::Presets(e) => write!(f, "{e}"),
            CliError::Session(e) => write!(f, "{e}"),
            CliError::Io(e) => write!(f, "I/O error: {e}"),
            CliError::NoTextGenerated(message) => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Config(e) => Some(e),
            CliError::Presets(e) => Some(e),
            CliError::Session(e) => Some(e),
            CliError::Io(e) => Some(e),
            CliError::NoTextGenerated(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CliError>;

/*
 * The services and session one command runs against.
 */
struct CliContext {
    config_manager: Arc<dyn ConfigManagerOperations>,
    preset_store: Arc<CorePresetStore>,
    session: TreeSession,
}

impl CliContext {
    fn create(config_manager: Arc<dyn ConfigManagerOperations>) -> Result<Self> {
        let settings = config_manager.load_settings(APP_NAME)?;
        let config_dir = config_manager.config_dir(APP_NAME)?;

        let lister = Arc::new(CoreDirectoryLister::new(&settings.exclusion_rules));
        let flattener = Arc::new(CoreFlattener::new(
            &settings.exclusion_rules,
            settings.models.clone(),
            create_token_counter(settings.tokenizer),
        ));
        let preset_store = Arc::new(CorePresetStore::new(
            settings.resolved_presets_dir(&config_dir),
            settings.resolved_app_root(&config_dir),
        )?);
        log::debug!(
            "CliContext: Using presets in {:?}, tokenizer {:?}.",
            preset_store.presets_dir(),
            settings.tokenizer
        );

        let session = TreeSession::new(lister, preset_store.clone(), flattener);
        Ok(CliContext {
            config_manager,
            preset_store,
            session,
        })
    }

    fn resolve_root(&self, root: Option<&Path>) -> Result<PathBuf> {
        if let Some(root) = root {
            return Ok(absolutize(root)?);
        }
        match self.config_manager.load_last_root_path(APP_NAME) {
            Ok(Some(last)) if last.is_dir() => {
                log::debug!("CliContext: Using last root {last:?}.");
                return Ok(last);
            }
            Ok(_) => {}
            Err(e) => log::warn!("CliContext: Could not read last root: {e}"),
        }
        Ok(absolutize(&std::env::current_dir()?)?)
    }

    /*
     * Builds the tree at the resolved root and applies the preset and explicit
     * selections, in that order. The root is remembered once the tree exists.
     */
    fn open(&mut self, root: Option<&Path>, preset: Option<&str>, select: &[PathBuf]) -> Result<()> {
        let root = self.resolve_root(root)?;
        self.session.rebuild_tree(&root)?;
        if let Err(e) = self
            .config_manager
            .save_last_root_path(APP_NAME, Some(&root))
        {
            log::warn!("CliContext: Could not remember root {root:?}: {e}");
        }

        if let Some(id) = preset {
            let report = self.session.load_preset(id)?;
            eprintln!("{}", presenter::render_reconcile_report(id, &report));
        }
        if !select.is_empty() {
            let paths = select
                .iter()
                .map(|p| absolutize(p))
                .collect::<io::Result<Vec<_>>>()?;
            let report = self.session.apply_selection(&paths)?;
            for path in &report.excluded {
                eprintln!("Not selected: {} is excluded.", path.display());
            }
            for path in &report.absent {
                eprintln!("Not selected: {} was not found.", path.display());
            }
        }
        Ok(())
    }
}

fn absolutize(path: &Path) -> io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(normalize_lexically(path))
    } else {
        Ok(normalize_lexically(&std::env::current_dir()?.join(path)))
    }
}

pub fn run(cli: Cli) -> Result<()> {
    let config_manager: Arc<dyn ConfigManagerOperations> = Arc::new(CoreConfigManager::new());
    let mut ctx = CliContext::create(config_manager)?;
    match cli.command {
        Command::Tree { selection, depth } => run_tree(&mut ctx, &selection, depth),
        Command::Generate { selection, output } => {
            run_generate(&mut ctx, &selection, output.as_deref())
        }
        Command::Presets { action } => run_presets(&mut ctx, action),
    }
}

fn run_tree(ctx: &mut CliContext, selection: &SelectionArgs, depth: usize) -> Result<()> {
    ctx.open(
        selection.root.as_deref(),
        selection.preset.as_deref(),
        &selection.select,
    )?;
    ctx.session.expand_to_depth(depth)?;
    if let Some(store) = ctx.session.store() {
        print!("{}", presenter::render_tree(store));
    }
    Ok(())
}

fn run_generate(
    ctx: &mut CliContext,
    selection: &SelectionArgs,
    output: Option<&Path>,
) -> Result<()> {
    ctx.open(
        selection.root.as_deref(),
        selection.preset.as_deref(),
        &selection.select,
    )?;
    let display = ctx.session.generate()?;
    if !display.text_available {
        return Err(CliError::NoTextGenerated(display.text));
    }
    match output {
        Some(file) => {
            fs::write(file, &display.text)?;
            eprintln!("Wrote {file:?}.");
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(display.text.as_bytes())?;
            stdout.flush()?;
        }
    }
    eprint!("{}", presenter::render_usage(&display));
    Ok(())
}

fn run_presets(ctx: &mut CliContext, action: PresetsCommand) -> Result<()> {
    match action {
        PresetsCommand::List => {
            print!("{}", presenter::render_preset_list(&ctx.session.list_presets()?));
        }
        PresetsCommand::Show { id } => {
            for path in ctx.preset_store.load(&id)? {
                println!("{}", path.display());
            }
        }
        PresetsCommand::Save { name, root, select } => {
            ctx.open(root.as_deref(), None, &select)?;
            let saved = ctx.session.save_preset(&name)?;
            println!("Saved preset '{}'.", saved.id);
        }
        PresetsCommand::Delete { id } => {
            ctx.session.delete_preset(&id)?;
            println!("Deleted preset '{id}'.");
        }
    }
    Ok(())
}
