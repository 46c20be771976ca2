use std::{
    env,
    io::{self, IsTerminal},
    path::PathBuf,
    process::Command,
    time::Duration,
};

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Parser};
use dialoguer::{Input, theme::ColorfulTheme};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::{
    LaunchSession, SubmitOutcome,
    api::{ApiClient, ApiHttp, BlockingApiHttp},
    config::{LauncherSettings, Platform, default_config_path},
    language::SUPPORTED_LANGUAGES,
    store::{JsonFileStore, KeyValueStore},
};

#[derive(Parser, Debug)]
#[command(name = "deepwiki-launcher", version, about = "Launch DeepWiki generation for a repository or local folder", long_about = None)]
pub struct Cli {
    /// Repository URL or absolute local folder path (defaults to the last demo repository).
    #[arg(value_name = "REPOSITORY")]
    pub repository: Option<String>,

    /// Wiki language code (en, ja, zh, zh-tw, es, kr, vi, pt-br, fr, ru).
    #[arg(long, value_name = "CODE")]
    pub language: Option<String>,

    /// Hosting platform for non-local repositories.
    #[arg(long, value_enum)]
    pub platform: Option<Platform>,

    /// Model provider (e.g. google, openai, openrouter, ollama).
    #[arg(long)]
    pub provider: Option<String>,

    /// Model offered by the provider.
    #[arg(long)]
    pub model: Option<String>,

    /// Free-form model name; enables the custom model toggle.
    #[arg(long, value_name = "NAME")]
    pub custom_model: Option<String>,

    /// Generate the concise wiki instead of the comprehensive one.
    #[arg(long, action = ArgAction::SetTrue)]
    pub concise: bool,

    /// Generate the comprehensive wiki (overrides a cached concise choice).
    #[arg(long, action = ArgAction::SetTrue, conflicts_with = "concise")]
    pub comprehensive: bool,

    /// Directory to exclude (repeatable).
    #[arg(long, value_name = "DIR")]
    pub excluded_dirs: Vec<String>,

    /// File pattern to exclude (repeatable).
    #[arg(long, value_name = "PATTERN")]
    pub excluded_files: Vec<String>,

    /// Directory to include exclusively (repeatable).
    #[arg(long, value_name = "DIR")]
    pub included_dirs: Vec<String>,

    /// File pattern to include exclusively (repeatable).
    #[arg(long, value_name = "PATTERN")]
    pub included_files: Vec<String>,

    /// Access token for private repositories.
    #[arg(long, value_name = "TOKEN")]
    pub token: Option<String>,

    /// Authorization code for servers that require one (prompted when omitted).
    #[arg(long, value_name = "CODE")]
    pub auth_code: Option<String>,

    /// Override the wiki server origin.
    #[arg(long, value_name = "URL")]
    pub server: Option<String>,

    /// Custom config path.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Open the wiki page with the desktop URL opener.
    #[arg(long, action = ArgAction::SetTrue)]
    pub open: bool,

    /// List wikis the server has already generated and exit.
    #[arg(long, action = ArgAction::SetTrue)]
    pub projects: bool,

    /// Print the options cached for REPOSITORY and exit.
    #[arg(long, action = ArgAction::SetTrue)]
    pub show_cached: bool,

    /// List supported wiki languages and exit.
    #[arg(long, action = ArgAction::SetTrue)]
    pub languages: bool,

    /// Increase logging verbosity.
    #[arg(long, action = ArgAction::SetTrue)]
    pub verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long, action = ArgAction::SetTrue)]
    pub log_json: bool,
}

fn init_tracing(verbose: bool, json: bool) {
    let default_level = if verbose {
        "deepwiki_launcher=debug"
    } else {
        "deepwiki_launcher=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

fn environment_locale() -> Option<String> {
    ["LC_ALL", "LC_MESSAGES", "LANG"]
        .iter()
        .filter_map(|name| env::var(name).ok())
        .find(|value| !value.trim().is_empty())
}

/// Command-line flags win over cached options; omitted flags keep them.
fn apply_overrides<H: ApiHttp, S: KeyValueStore>(session: &mut LaunchSession<H, S>, cli: &Cli) {
    if let Some(language) = &cli.language {
        session.set_language(language);
    }
    if let Some(platform) = cli.platform {
        session.set_platform(platform);
    }
    if let Some(provider) = &cli.provider {
        session.set_provider(provider);
    }
    if let Some(model) = &cli.model {
        session.set_model(model);
    }
    if let Some(custom_model) = &cli.custom_model {
        session.set_custom_model(Some(custom_model));
    }
    if cli.concise {
        session.set_comprehensive(false);
    } else if cli.comprehensive {
        session.set_comprehensive(true);
    }

    let options = session.options_mut();
    for (values, slot) in [
        (&cli.excluded_dirs, &mut options.excluded_dirs),
        (&cli.excluded_files, &mut options.excluded_files),
        (&cli.included_dirs, &mut options.included_dirs),
        (&cli.included_files, &mut options.included_files),
    ] {
        if !values.is_empty() {
            *slot = values.join("\n");
        }
    }

    if let Some(token) = &cli.token {
        session.set_access_token(token);
    }
}

fn prompt_auth_code() -> Result<String> {
    if !io::stdin().is_terminal() {
        warn!("authorization code required but stdin is not a terminal; pass --auth-code");
        return Ok(String::new());
    }
    Input::<String>::with_theme(&ColorfulTheme::default())
        .with_prompt("Authorization code")
        .allow_empty(true)
        .interact_text()
        .context("failed to read authorization code")
}

fn open_url(settings: &LauncherSettings, url: &str) -> Result<()> {
    let opener = match &settings.open_command {
        Some(command) => PathBuf::from(command),
        None => match ["xdg-open", "open"]
            .iter()
            .find_map(|candidate| which::which(candidate).ok())
        {
            Some(path) => path,
            None => bail!("no URL opener found; install xdg-open or set open_command in the config"),
        },
    };
    Command::new(&opener)
        .arg(url)
        .spawn()
        .with_context(|| format!("Failed to spawn {}", opener.display()))?;
    info!(opener = %opener.display(), "opened wiki page");
    Ok(())
}

fn print_languages() {
    println!("Supported wiki languages:");
    for (code, name) in SUPPORTED_LANGUAGES {
        println!("  {code:<6} {name}");
    }
}

fn print_projects<H: ApiHttp>(api: &ApiClient<H>) -> Result<()> {
    let projects = api.list_projects()?;
    if projects.is_empty() {
        println!("No processed projects on {}", api.origin());
        return Ok(());
    }
    println!("{} processed project(s) on {}", projects.len(), api.origin());
    for project in &projects {
        let submitted = project
            .submitted_at_utc()
            .map(|timestamp| timestamp.to_rfc3339())
            .unwrap_or_else(|| "-".into());
        println!(
            "  {owner}/{repo} [{kind}] lang={language} submitted={submitted}",
            owner = project.owner,
            repo = project.repo,
            kind = project.repo_type,
            language = project.language,
        );
    }
    Ok(())
}

fn print_cached<H: ApiHttp, S: KeyValueStore>(session: &LaunchSession<H, S>) -> Result<()> {
    let input = session.repository_input().trim();
    match session.cache().load(input) {
        Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
        None => println!("No cached options for {input}"),
    }
    Ok(())
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    if cli.languages {
        print_languages();
        return Ok(());
    }

    let config_path = match cli.config.clone() {
        Some(path) => path,
        None => default_config_path()?,
    };
    let mut settings = LauncherSettings::load_or_default(&config_path)?;
    if let Some(server) = &cli.server {
        settings.server_url = server.clone();
    }
    info!(path = %config_path.display(), server = settings.server_origin(), "using launcher config");

    let http = BlockingApiHttp::new(Duration::from_secs(settings.request_timeout_secs))?;
    let api = ApiClient::new(settings.server_origin(), http);

    if cli.projects {
        return print_projects(&api);
    }

    let store = JsonFileStore::new(settings.resolve_storage_path()?);
    let locale = environment_locale();
    let mut session = LaunchSession::start(api, store, &settings, locale.as_deref());
    if let Some(repository) = &cli.repository {
        session.set_repository_input(repository);
    }

    if cli.show_cached {
        return print_cached(&session);
    }

    apply_overrides(&mut session, &cli);
    if session.auth_required() {
        let code = match &cli.auth_code {
            Some(code) => code.clone(),
            None => prompt_auth_code()?,
        };
        session.set_auth_code(&code);
    }

    match session.submit()? {
        SubmitOutcome::Navigate(target) => {
            let url = target.absolute_url(settings.server_origin());
            println!("{url}");
            if cli.open {
                open_url(&settings, &url)?;
            }
            session.dispose();
        }
        SubmitOutcome::Ignored => {}
    }
    Ok(())
}
