use crate::cli::{Commands, Tejs};
use std::fs;
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;
use tejs_core::config::get_settings_file_path;
use tejs_core::rewriter::rewrite_async_calls;
use tejs_core::script::{Sandbox, ScriptRuntime};
use tejs_core::{
    parse_shortcut_file, ExpansionEngine, FsStore, ParseOptions, Reporter, Result, Settings,
    SharedRuleTable, ShellRunner, ShortcutLoader, TejsError,
};
use tejs_daemon::{ConsoleReporter, Session};
use tracing::debug;

pub fn handle_command(args: Tejs) -> Result<()> {
    let settings = load_settings(args.settings.as_deref())?;
    let reporter: Rc<dyn Reporter> = Rc::new(ConsoleReporter::stderr(args.verbose));

    match args.commands.unwrap_or(Commands::Session { poll_ms: 1000 }) {
        Commands::Expand { trigger, silent } => handle_expand(&settings, reporter, &trigger, silent),
        Commands::List => handle_list(&settings, reporter),
        Commands::Check { file } => handle_check(&file),
        Commands::Session { poll_ms } => handle_session(&settings, reporter, poll_ms),
        Commands::Config => handle_config(&settings, args.settings.as_deref()),
    }
}

fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let settings = match path {
        Some(path) => Settings::load_from(path)?,
        None => Settings::load()?,
    };
    debug!(files = settings.shortcut_files.len(), "loaded settings");
    Ok(settings)
}

/// Build an engine over a freshly loaded rule table.
fn load_engine(settings: &Settings, reporter: Rc<dyn Reporter>) -> ExpansionEngine {
    let root = settings.resolved_vault_root();
    let engine = ExpansionEngine::builder(SharedRuleTable::default(), reporter)
        .external_runner(Rc::new(ShellRunner::in_dir(&root)))
        .allow_external(settings.allow_external)
        .build();
    let loader = ShortcutLoader::new(Rc::new(FsStore::new(&root)), engine.clone());
    loader.rebuild(&settings.settings_shortcuts, &settings.shortcut_files);
    engine
}

fn handle_expand(settings: &Settings, reporter: Rc<dyn Reporter>, trigger: &str, silent: bool) -> Result<()> {
    let engine = load_engine(settings, reporter);
    match engine.expand(trigger, silent, None)? {
        Some(text) => {
            println!("{}", text);
            Ok(())
        }
        // The missing match was already reported (or silenced).
        None => Err(TejsError::AlreadyReported),
    }
}

fn handle_list(settings: &Settings, reporter: Rc<dyn Reporter>) -> Result<()> {
    let engine = load_engine(settings, reporter);
    let table = engine.table().snapshot();

    if table.syntaxes.is_empty() {
        println!("No documented shortcuts found.");
        return Ok(());
    }

    for source in &table.sources {
        let syntaxes: Vec<_> = table
            .syntaxes
            .iter()
            .filter(|s| s.source_group == source.identity)
            .collect();
        if syntaxes.is_empty() {
            continue;
        }
        println!("{}", source.identity);
        if !source.file_about.is_empty() {
            println!("  {}", source.file_about.lines().next().unwrap_or_default());
        }
        let width = syntaxes.iter().map(|s| s.display_text.chars().count()).max().unwrap_or(0);
        for syntax in syntaxes {
            println!("    {:<width$}  {}", syntax.display_text, syntax.description, width = width);
        }
    }
    Ok(())
}

fn handle_check(file: &Path) -> Result<()> {
    let raw = fs::read_to_string(file)?;
    let identity = file.to_string_lossy();
    let options = ParseOptions {
        keep_about: true,
        ..ParseOptions::default()
    };
    let parsed = parse_shortcut_file(&identity, &raw, options);

    let mut problems: Vec<String> = parsed.issues.iter().map(|i| i.to_string()).collect();
    let sandbox = Sandbox::default();
    for (index, rule) in parsed.rules.iter().enumerate() {
        let source = rewrite_async_calls(&rule.expansion, &["expand"]);
        if let Err(e) = sandbox.check_syntax(&source) {
            let error = match e.position {
                Some(position) => TejsError::ScriptSyntax {
                    position,
                    message: e.message,
                },
                None => TejsError::ScriptRuntime {
                    position: None,
                    message: e.message,
                },
            };
            problems.push(format!("shortcut #{} /{}/: {}", index + 1, rule.pattern_source(), error));
        }
    }

    println!("{}: {} shortcut(s)", identity, parsed.rules.len());
    if problems.is_empty() {
        println!("No problems found.");
        return Ok(());
    }
    for problem in &problems {
        println!("  {}", problem);
    }
    Err(TejsError::Parse {
        identity: identity.to_string(),
        message: format!("{} problem(s) found", problems.len()),
    })
}

fn handle_session(settings: &Settings, reporter: Rc<dyn Reporter>, poll_ms: u64) -> Result<()> {
    // The engine is single-threaded, so the session runs on one thread.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let session = Session::new(settings, reporter);
        session.run(Duration::from_millis(poll_ms.max(10))).await
    })
}

fn handle_config(settings: &Settings, path: Option<&Path>) -> Result<()> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(get_settings_file_path);
    println!("# {}", path.display());
    println!("{}", serde_json::to_string_pretty(settings)?);
    Ok(())
}
