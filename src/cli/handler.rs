use crate::app::config::Config;
use crate::bridge::Session;
use crate::cli::error;
use crate::cli::output::{self, ScriptEntry};
use crate::cli::Commands;
use crate::host::{BridgeHost, HeadlessBrowser, ScriptContext, ValueStore};
use crate::script::{ScriptLoader, ScriptMatcher, ScriptResult, Userscript};
use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tokio::io::BufReader;

/// Handle CLI command and return exit code
pub async fn handle_command(command: Commands, config: Config) -> i32 {
    let result = match command {
        Commands::Serve { script, url } => handle_serve(&script, &url, &config).await,
        Commands::Info { script, json } => handle_info(&script, json, &config),
        Commands::Check { script, url } => handle_check(&script, &url),
        Commands::Scripts { json } => handle_scripts(json, &config),
        Commands::Init { force } => handle_init(force),
        Commands::Values { namespace, json } => handle_values(&namespace, json, &config).await,
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            error::ERROR
        }
    }
}

fn load_script(path: &Path) -> ScriptResult<Userscript> {
    let loader = ScriptLoader::new(path.parent().unwrap_or(Path::new(".")));
    loader.load(path)
}

/// Load a script, printing the failure and mapping it to an exit code
fn load_or_report(path: &Path) -> std::result::Result<Userscript, i32> {
    load_script(path).map_err(|e| {
        eprintln!("Error: {}", e);
        error::script_error_code(&e)
    })
}

fn open_store(config: &Config) -> ValueStore {
    if config.storage.persist {
        ValueStore::persistent(&config.storage.data_dir)
    } else {
        ValueStore::in_memory()
    }
}

/// Serve one bridge session over stdio
async fn handle_serve(path: &Path, url: &str, config: &Config) -> Result<i32> {
    let script = match load_or_report(path) {
        Ok(script) => script,
        Err(code) => return Ok(code),
    };

    if url != "about:blank" {
        match ScriptMatcher::new(&script.meta) {
            Ok(matcher) if !matcher.applies_to(url) => {
                tracing::warn!("{} does not apply to {}", script.meta.name, url);
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("Ignoring URL patterns: {}", e),
        }
    }

    let browser = Arc::new(HeadlessBrowser::new());
    let tab = browser.open_initial_tab(url).await;
    let host = BridgeHost::new(config, Arc::new(open_store(config)), browser)?;
    let ctx = ScriptContext::new(&script, &config.general.script_handler, tab.id);

    tracing::info!("Serving {} on stdio", ctx.namespace);
    Session::new(Arc::new(host), ctx)
        .serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
        .await?;

    Ok(error::SUCCESS)
}

/// Print GM.info for a script
fn handle_info(path: &Path, json: bool, config: &Config) -> Result<i32> {
    let script = match load_or_report(path) {
        Ok(script) => script,
        Err(code) => return Ok(code),
    };

    let info = script.info(&config.general.script_handler, env!("CARGO_PKG_VERSION"));
    println!("{}", output::format_info(&info, json));
    Ok(error::SUCCESS)
}

/// Report whether a script applies to a URL
fn handle_check(path: &Path, url: &str) -> Result<i32> {
    let script = match load_or_report(path) {
        Ok(script) => script,
        Err(code) => return Ok(code),
    };

    let matcher = match ScriptMatcher::new(&script.meta) {
        Ok(matcher) => matcher,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(error::script_error_code(&e));
        }
    };

    if matcher.applies_to(url) {
        println!("{} runs on {}", script.meta.name, url);
        Ok(error::SUCCESS)
    } else {
        println!("{} does not run on {}", script.meta.name, url);
        Ok(error::NOT_FOUND)
    }
}

/// List userscripts in the configured directory
fn handle_scripts(json: bool, config: &Config) -> Result<i32> {
    let loader = ScriptLoader::new(&config.scripts.directory);
    let entries: Vec<ScriptEntry> = loader
        .list_scripts()?
        .into_iter()
        .map(|path| match loader.load(&path) {
            Ok(script) => ScriptEntry::loaded(path, &script.meta),
            Err(e) => {
                tracing::warn!("Failed to load {:?}: {}", path, e);
                ScriptEntry::failed(path, e)
            }
        })
        .collect();

    println!("{}", output::format_scripts(&entries, json));
    Ok(error::SUCCESS)
}

/// Write the default configuration
fn handle_init(force: bool) -> Result<i32> {
    let config_path = crate::util::paths::get_app_config_path()?;
    if config_path.exists() && !force {
        eprintln!("{} already exists (use --force to overwrite)", config_path.display());
        return Ok(error::ERROR);
    }

    Config::default().save()?;
    println!("Wrote {}", config_path.display());
    Ok(error::SUCCESS)
}

/// Dump the persisted values of a namespace
async fn handle_values(namespace: &str, json: bool, config: &Config) -> Result<i32> {
    let store = ValueStore::persistent(&config.storage.data_dir);
    let values = store.snapshot(namespace).await?;
    println!("{}", output::format_values(namespace, &values, json));
    Ok(error::SUCCESS)
}
